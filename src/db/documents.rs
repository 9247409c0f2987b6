//! Schemaless document backend.
//!
//! Documents are JSON values keyed by kind and name. Only users are modelled so far;
//! every other operation reports [`AppError::NotImplemented`].

use std::collections::HashMap;
use std::sync::Arc;

use async_trait::async_trait;
use serde_json::Value;
use tokio::sync::{Mutex, RwLock};

use crate::error::{AppError, Result, ResultExt};
use crate::models::{EmailItem, ExternalAccount, Feed, FeedItem, Layout, Tab, TabSummary, User, Widget};

use super::repository::{
    next_instance_id, reject_nested, transaction_scope, Repository, TxWork,
};

const BACKEND: &str = "documents";
const USER_KIND: &str = "User";

#[derive(Debug, Clone, PartialEq, Eq, Hash)]
struct DocumentKey {
    kind: &'static str,
    name: String,
}

impl DocumentKey {
    fn user(user_id: &str) -> Self {
        Self {
            kind: USER_KIND,
            name: user_id.to_string(),
        }
    }
}

type Documents = HashMap<DocumentKey, Value>;

/// Writes buffered by a transaction; `None` once it has ended.
type Pending = Arc<Mutex<Option<Documents>>>;

pub struct DocumentRepository {
    id: u64,
    documents: Arc<RwLock<Documents>>,
    pending: Option<Pending>,
}

impl Default for DocumentRepository {
    fn default() -> Self {
        Self::new()
    }
}

impl DocumentRepository {
    pub fn new() -> Self {
        Self {
            id: next_instance_id(),
            documents: Arc::default(),
            pending: None,
        }
    }

    async fn get(&self, key: &DocumentKey) -> Result<Option<Value>> {
        if let Some(pending) = &self.pending {
            let pending = pending.lock().await;
            let writes = pending.as_ref().ok_or_else(finished)?;
            if let Some(value) = writes.get(key) {
                return Ok(Some(value.clone()));
            }
        }
        Ok(self.documents.read().await.get(key).cloned())
    }

    async fn put(&self, key: DocumentKey, value: Value) -> Result<()> {
        match &self.pending {
            Some(pending) => {
                let mut pending = pending.lock().await;
                pending.as_mut().ok_or_else(finished)?.insert(key, value);
            }
            None => {
                self.documents.write().await.insert(key, value);
            }
        }
        Ok(())
    }
}

fn finished() -> AppError {
    AppError::TransactionMisuse("transaction view used after commit or rollback".into())
}

fn unsupported<T>(operation: &'static str) -> Result<T> {
    Err(AppError::NotImplemented {
        backend: BACKEND,
        operation,
    })
}

#[async_trait]
impl Repository for DocumentRepository {
    fn backend(&self) -> &'static str {
        BACKEND
    }

    fn is_not_found(&self, err: &AppError) -> bool {
        matches!(err.root(), AppError::NotFound(_))
    }

    fn in_transaction(&self) -> bool {
        self.pending.is_some()
    }

    async fn transaction<'a>(&'a self, work: TxWork<'a>) -> Result<()> {
        if self.in_transaction() {
            return Err(AppError::TransactionMisuse(
                "nested transactions are prohibited".into(),
            ));
        }
        reject_nested(self.id, "transaction")?;

        let pending: Pending = Arc::new(Mutex::new(Some(Documents::new())));
        let view: Arc<dyn Repository> = Arc::new(DocumentRepository {
            id: self.id,
            documents: Arc::clone(&self.documents),
            pending: Some(Arc::clone(&pending)),
        });

        let outcome = transaction_scope(self.id, BACKEND, work(view)).await;
        let writes = pending.lock().await.take().unwrap_or_default();
        outcome?;

        tracing::debug!("committing {} document(s)", writes.len());
        self.documents.write().await.extend(writes);
        Ok(())
    }

    async fn get_user(&self, user_id: &str) -> Result<User> {
        let value = self
            .get(&DocumentKey::user(user_id))
            .await?
            .ok_or_else(|| AppError::NotFound(format!("user {user_id}")))
            .context("fetching user failed")?;
        serde_json::from_value(value).context("decoding user document failed")
    }

    async fn store_user(&self, user: &User) -> Result<()> {
        let value = serde_json::to_value(user)?;
        self.put(DocumentKey::user(&user.user_id), value)
            .await
            .context("storing user failed")
    }

    async fn get_tabs(&self, _user_id: &str) -> Result<Vec<TabSummary>> {
        unsupported("get_tabs")
    }

    async fn is_tab_access_allowed(&self, _user_id: &str, _tab_id: i64) -> Result<()> {
        unsupported("is_tab_access_allowed")
    }

    async fn allow_tab_access(&self, _user_id: &str, _tab_id: i64) -> Result<()> {
        unsupported("allow_tab_access")
    }

    async fn get_tab(&self, _tab_id: i64) -> Result<Tab> {
        unsupported("get_tab")
    }

    async fn store_tab(&self, _tab: &mut Tab) -> Result<()> {
        unsupported("store_tab")
    }

    async fn delete_tab(&self, _tab_id: i64) -> Result<()> {
        unsupported("delete_tab")
    }

    async fn get_widget(&self, _tab_id: i64, _widget_id: i64) -> Result<Widget> {
        unsupported("get_widget")
    }

    async fn store_widget(&self, _tab_id: i64, _widget: &mut Widget) -> Result<()> {
        unsupported("store_widget")
    }

    async fn delete_widget(&self, _tab_id: i64, _widget_id: i64) -> Result<()> {
        unsupported("delete_widget")
    }

    async fn update_tab_layout(&self, _tab_id: i64, _layout: &Layout) -> Result<()> {
        unsupported("update_tab_layout")
    }

    async fn delete_widget_from_tab(&self, _tab_id: i64, _widget_id: i64) -> Result<()> {
        unsupported("delete_widget_from_tab")
    }

    async fn get_or_create_feed_id(&self, _url: &str) -> Result<i64> {
        unsupported("get_or_create_feed_id")
    }

    async fn get_feed(&self, _feed_id: i64) -> Result<Feed> {
        unsupported("get_feed")
    }

    async fn get_feed_items(&self, _feed_id: i64) -> Result<Vec<FeedItem>> {
        unsupported("get_feed_items")
    }

    async fn store_feed(&self, _feed: &mut Feed, _items: &[FeedItem]) -> Result<()> {
        unsupported("store_feed")
    }

    async fn are_items_read(
        &self,
        _user_id: &str,
        _feed_id: i64,
        _guids: &[String],
    ) -> Result<Vec<bool>> {
        unsupported("are_items_read")
    }

    async fn set_item_read(&self, _user_id: &str, _feed_id: i64, _guid: &str, _read: bool) -> Result<()> {
        unsupported("set_item_read")
    }

    async fn set_items_read(
        &self,
        _user_id: &str,
        _feed_id: i64,
        _guids: &[String],
        _read: bool,
    ) -> Result<()> {
        unsupported("set_items_read")
    }

    async fn get_account(&self, _user_id: &str, _account_id: i64) -> Result<ExternalAccount> {
        unsupported("get_account")
    }

    async fn get_accounts(&self, _user_id: &str) -> Result<Vec<ExternalAccount>> {
        unsupported("get_accounts")
    }

    async fn delete_account(&self, _user_id: &str, _account_id: i64) -> Result<()> {
        unsupported("delete_account")
    }

    async fn store_account(&self, _user_id: &str, _account: &mut ExternalAccount) -> Result<()> {
        unsupported("store_account")
    }

    async fn get_user_from_temporary_code(&self, _provider: &str, _code: &str) -> Result<String> {
        unsupported("get_user_from_temporary_code")
    }

    async fn store_temporary_code(&self, _user_id: &str, _provider: &str, _code: &str) -> Result<()> {
        unsupported("store_temporary_code")
    }

    async fn delete_temporary_code(&self, _user_id: &str, _provider: &str) -> Result<()> {
        unsupported("delete_temporary_code")
    }

    async fn get_email_item(
        &self,
        _account_id: i64,
        _guid: &str,
        _min_version: u64,
    ) -> Result<Option<EmailItem>> {
        unsupported("get_email_item")
    }

    async fn store_email_item(&self, _account_id: i64, _version: u64, _item: &EmailItem) -> Result<bool> {
        unsupported("store_email_item")
    }
}
