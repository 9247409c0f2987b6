use std::future::Future;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

use async_trait::async_trait;
use futures::future::BoxFuture;
use futures::FutureExt;

use crate::error::{AppError, Result};
use crate::models::{
    EmailItem, ExternalAccount, Feed, FeedItem, Layout, Tab, TabSummary, User, Widget,
};

/// Work handed to [`Repository::transaction`]. It receives a transactional view of the
/// repository that it owns for the duration of the transaction.
pub type TxWork<'a> =
    Box<dyn FnOnce(Arc<dyn Repository>) -> BoxFuture<'a, Result<()>> + Send + 'a>;

/// Storage contract for tabs, widgets, feeds, read flags, accounts and cached email.
///
/// Every backend implements the full surface. Backends that cannot support an
/// operation fail with [`AppError::NotImplemented`] instead of silently doing nothing.
#[async_trait]
pub trait Repository: Send + Sync {
    /// Short backend name, used in logs and errors.
    fn backend(&self) -> &'static str;

    /// Whether `err` means "no such row" for this backend, however deeply it is wrapped.
    fn is_not_found(&self, err: &AppError) -> bool;

    /// True for the view handed to a transaction's work.
    fn in_transaction(&self) -> bool;

    /// Runs `work` so that either all of its writes commit or none do.
    /// Calling this on a transactional view, or from inside running work, fails with
    /// [`AppError::TransactionMisuse`] without running `work`.
    async fn transaction<'a>(&'a self, work: TxWork<'a>) -> Result<()>;

    // Users

    async fn get_user(&self, user_id: &str) -> Result<User>;
    async fn store_user(&self, user: &User) -> Result<()>;

    // Tab access

    async fn get_tabs(&self, user_id: &str) -> Result<Vec<TabSummary>>;
    /// Fails with [`AppError::NotAuthorized`] when the user has no access to the tab.
    async fn is_tab_access_allowed(&self, user_id: &str, tab_id: i64) -> Result<()>;
    async fn allow_tab_access(&self, user_id: &str, tab_id: i64) -> Result<()>;

    // Tabs

    async fn get_tab(&self, tab_id: i64) -> Result<Tab>;
    /// Inserts the tab when its id is 0 (and assigns the id), updates it otherwise.
    async fn store_tab(&self, tab: &mut Tab) -> Result<()>;
    async fn delete_tab(&self, tab_id: i64) -> Result<()>;

    // Widgets

    async fn get_widget(&self, tab_id: i64, widget_id: i64) -> Result<Widget>;
    /// Inserts the widget when its id is 0 (and assigns the id), updates it otherwise.
    async fn store_widget(&self, tab_id: i64, widget: &mut Widget) -> Result<()>;
    async fn delete_widget(&self, tab_id: i64, widget_id: i64) -> Result<()>;

    /// Replaces the tab layout; `layout` must be a permutation of the tab's widgets.
    async fn update_tab_layout(&self, tab_id: i64, layout: &Layout) -> Result<()>;
    /// Removes the widget from the tab layout, leaving the widget row in place.
    async fn delete_widget_from_tab(&self, tab_id: i64, widget_id: i64) -> Result<()>;

    // Feeds

    async fn get_or_create_feed_id(&self, url: &str) -> Result<i64>;
    async fn get_feed(&self, feed_id: i64) -> Result<Feed>;
    async fn get_feed_items(&self, feed_id: i64) -> Result<Vec<FeedItem>>;
    /// Stores the feed and replaces its whole item set.
    async fn store_feed(&self, feed: &mut Feed, items: &[FeedItem]) -> Result<()>;

    // Read states

    async fn are_items_read(&self, user_id: &str, feed_id: i64, guids: &[String])
        -> Result<Vec<bool>>;
    async fn set_item_read(&self, user_id: &str, feed_id: i64, guid: &str, read: bool)
        -> Result<()>;
    async fn set_items_read(
        &self,
        user_id: &str,
        feed_id: i64,
        guids: &[String],
        read: bool,
    ) -> Result<()>;

    // External accounts

    async fn get_account(&self, user_id: &str, account_id: i64) -> Result<ExternalAccount>;
    async fn get_accounts(&self, user_id: &str) -> Result<Vec<ExternalAccount>>;
    async fn delete_account(&self, user_id: &str, account_id: i64) -> Result<()>;
    async fn store_account(&self, user_id: &str, account: &mut ExternalAccount) -> Result<()>;

    // OAuth2 state codes

    async fn get_user_from_temporary_code(&self, provider: &str, code: &str) -> Result<String>;
    async fn store_temporary_code(&self, user_id: &str, provider: &str, code: &str)
        -> Result<()>;
    async fn delete_temporary_code(&self, user_id: &str, provider: &str) -> Result<()>;

    // Cached email items

    /// The cached item, if one is stored with a version of at least `min_version`.
    async fn get_email_item(
        &self,
        account_id: i64,
        guid: &str,
        min_version: u64,
    ) -> Result<Option<EmailItem>>;
    /// Stores the item unless a version at least as new is already cached.
    /// Returns whether the item was written.
    async fn store_email_item(&self, account_id: i64, version: u64, item: &EmailItem)
        -> Result<bool>;
}

/// Runs `f` through [`Repository::transaction`] and hands back its output.
pub async fn run_in_transaction<'a, T, F, Fut>(repo: &'a dyn Repository, f: F) -> Result<T>
where
    F: FnOnce(Arc<dyn Repository>) -> Fut + Send + 'a,
    Fut: Future<Output = Result<T>> + Send + 'a,
    T: Send + 'a,
{
    let mut output = None;
    let slot = &mut output;
    let work: TxWork<'_> = Box::new(move |tx| {
        async move {
            *slot = Some(f(tx).await?);
            Ok(())
        }
        .boxed()
    });
    repo.transaction(work).await?;

    output.ok_or_else(|| AppError::TransactionMisuse("transaction work did not complete".into()))
}

tokio::task_local! {
    static TRANSACTION_SCOPE: Vec<(u64, &'static str)>;
}

static NEXT_INSTANCE_ID: AtomicU64 = AtomicU64::new(1);

/// Identifies one root backend instance; transaction views share their root's id.
pub(crate) fn next_instance_id() -> u64 {
    NEXT_INSTANCE_ID.fetch_add(1, Ordering::Relaxed)
}

/// Runs transaction work with the task marked as being inside a transaction of `instance`.
pub(crate) async fn transaction_scope<F: Future>(
    instance: u64,
    backend: &'static str,
    work: F,
) -> F::Output {
    let mut open = TRANSACTION_SCOPE
        .try_with(|open| open.clone())
        .unwrap_or_default();
    open.push((instance, backend));
    TRANSACTION_SCOPE.scope(open, work).await
}

/// Fails when the current task is already running transaction work on `instance`.
pub(crate) fn reject_nested(instance: u64, operation: &str) -> Result<()> {
    let running = TRANSACTION_SCOPE
        .try_with(|open| {
            open.iter()
                .find(|(id, _)| *id == instance)
                .map(|(_, backend)| *backend)
        })
        .ok()
        .flatten();
    match running {
        Some(backend) => Err(AppError::TransactionMisuse(format!(
            "{operation} called inside a running {backend} transaction; \
             nested transactions are prohibited"
        ))),
        None => Ok(()),
    }
}

/// Converts a caller-supplied version into the signed column type of the SQL backends.
pub(crate) fn version_column(version: u64) -> Result<i64> {
    i64::try_from(version)
        .map_err(|_| AppError::InvalidInput(format!("item version {version} is out of range")))
}
