use std::future::Future;

use async_trait::async_trait;
use tokio::sync::RwLock;

use crate::error::{AppError, Result};
use crate::models::{
    EmailItem, ExternalAccount, Feed, FeedItem, Layout, Tab, TabSummary, User, Widget,
};

use super::repository::{
    next_instance_id, reject_nested, transaction_scope, Repository, TxWork,
};

/// Serializes access to a backend that cannot isolate concurrent callers itself.
///
/// Reads share the lock, writes and transactions hold it exclusively. Transaction work
/// receives the inner backend's view, so it never re-enters this wrapper; calling the
/// wrapper from inside that work fails instead of waiting forever on its own lock.
pub struct Locked<R> {
    id: u64,
    inner: R,
    lock: RwLock<()>,
}

impl<R: Repository> Locked<R> {
    pub fn new(inner: R) -> Self {
        Self {
            id: next_instance_id(),
            inner,
            lock: RwLock::new(()),
        }
    }

    async fn shared<'a, T>(
        &'a self,
        operation: &'static str,
        call: impl Future<Output = Result<T>> + Send + 'a,
    ) -> Result<T> {
        reject_nested(self.id, operation)?;
        tracing::trace!(operation, "waiting for read lock");
        let _guard = self.lock.read().await;
        tracing::trace!(operation, "read lock acquired");
        call.await
    }

    async fn exclusive<'a, T>(
        &'a self,
        operation: &'static str,
        call: impl Future<Output = Result<T>> + Send + 'a,
    ) -> Result<T> {
        reject_nested(self.id, operation)?;
        tracing::trace!(operation, "waiting for write lock");
        let _guard = self.lock.write().await;
        tracing::trace!(operation, "write lock acquired");
        call.await
    }
}

#[async_trait]
impl<R: Repository> Repository for Locked<R> {
    fn backend(&self) -> &'static str {
        self.inner.backend()
    }

    fn is_not_found(&self, err: &AppError) -> bool {
        self.inner.is_not_found(err)
    }

    fn in_transaction(&self) -> bool {
        false
    }

    async fn transaction<'a>(&'a self, work: TxWork<'a>) -> Result<()> {
        let backend = self.inner.backend();
        self.exclusive(
            "transaction",
            transaction_scope(self.id, backend, self.inner.transaction(work)),
        )
        .await
    }

    async fn get_user(&self, user_id: &str) -> Result<User> {
        self.shared("get_user", self.inner.get_user(user_id)).await
    }

    async fn store_user(&self, user: &User) -> Result<()> {
        self.exclusive("store_user", self.inner.store_user(user))
            .await
    }

    async fn get_tabs(&self, user_id: &str) -> Result<Vec<TabSummary>> {
        self.shared("get_tabs", self.inner.get_tabs(user_id)).await
    }

    async fn is_tab_access_allowed(&self, user_id: &str, tab_id: i64) -> Result<()> {
        self.shared(
            "is_tab_access_allowed",
            self.inner.is_tab_access_allowed(user_id, tab_id),
        )
        .await
    }

    async fn allow_tab_access(&self, user_id: &str, tab_id: i64) -> Result<()> {
        self.exclusive(
            "allow_tab_access",
            self.inner.allow_tab_access(user_id, tab_id),
        )
        .await
    }

    async fn get_tab(&self, tab_id: i64) -> Result<Tab> {
        self.shared("get_tab", self.inner.get_tab(tab_id)).await
    }

    async fn store_tab(&self, tab: &mut Tab) -> Result<()> {
        self.exclusive("store_tab", self.inner.store_tab(tab)).await
    }

    async fn delete_tab(&self, tab_id: i64) -> Result<()> {
        self.exclusive("delete_tab", self.inner.delete_tab(tab_id))
            .await
    }

    async fn get_widget(&self, tab_id: i64, widget_id: i64) -> Result<Widget> {
        self.shared("get_widget", self.inner.get_widget(tab_id, widget_id))
            .await
    }

    async fn store_widget(&self, tab_id: i64, widget: &mut Widget) -> Result<()> {
        self.exclusive("store_widget", self.inner.store_widget(tab_id, widget))
            .await
    }

    async fn delete_widget(&self, tab_id: i64, widget_id: i64) -> Result<()> {
        self.exclusive("delete_widget", self.inner.delete_widget(tab_id, widget_id))
            .await
    }

    async fn update_tab_layout(&self, tab_id: i64, layout: &Layout) -> Result<()> {
        self.exclusive(
            "update_tab_layout",
            self.inner.update_tab_layout(tab_id, layout),
        )
        .await
    }

    async fn delete_widget_from_tab(&self, tab_id: i64, widget_id: i64) -> Result<()> {
        self.exclusive(
            "delete_widget_from_tab",
            self.inner.delete_widget_from_tab(tab_id, widget_id),
        )
        .await
    }

    async fn get_or_create_feed_id(&self, url: &str) -> Result<i64> {
        self.exclusive("get_or_create_feed_id", self.inner.get_or_create_feed_id(url))
            .await
    }

    async fn get_feed(&self, feed_id: i64) -> Result<Feed> {
        self.shared("get_feed", self.inner.get_feed(feed_id)).await
    }

    async fn get_feed_items(&self, feed_id: i64) -> Result<Vec<FeedItem>> {
        self.shared("get_feed_items", self.inner.get_feed_items(feed_id))
            .await
    }

    async fn store_feed(&self, feed: &mut Feed, items: &[FeedItem]) -> Result<()> {
        self.exclusive("store_feed", self.inner.store_feed(feed, items))
            .await
    }

    async fn are_items_read(
        &self,
        user_id: &str,
        feed_id: i64,
        guids: &[String],
    ) -> Result<Vec<bool>> {
        self.shared(
            "are_items_read",
            self.inner.are_items_read(user_id, feed_id, guids),
        )
        .await
    }

    async fn set_item_read(&self, user_id: &str, feed_id: i64, guid: &str, read: bool) -> Result<()> {
        self.exclusive(
            "set_item_read",
            self.inner.set_item_read(user_id, feed_id, guid, read),
        )
        .await
    }

    async fn set_items_read(
        &self,
        user_id: &str,
        feed_id: i64,
        guids: &[String],
        read: bool,
    ) -> Result<()> {
        self.exclusive(
            "set_items_read",
            self.inner.set_items_read(user_id, feed_id, guids, read),
        )
        .await
    }

    async fn get_account(&self, user_id: &str, account_id: i64) -> Result<ExternalAccount> {
        self.shared("get_account", self.inner.get_account(user_id, account_id))
            .await
    }

    async fn get_accounts(&self, user_id: &str) -> Result<Vec<ExternalAccount>> {
        self.shared("get_accounts", self.inner.get_accounts(user_id))
            .await
    }

    async fn delete_account(&self, user_id: &str, account_id: i64) -> Result<()> {
        self.exclusive(
            "delete_account",
            self.inner.delete_account(user_id, account_id),
        )
        .await
    }

    async fn store_account(&self, user_id: &str, account: &mut ExternalAccount) -> Result<()> {
        self.exclusive("store_account", self.inner.store_account(user_id, account))
            .await
    }

    async fn get_user_from_temporary_code(&self, provider: &str, code: &str) -> Result<String> {
        self.shared(
            "get_user_from_temporary_code",
            self.inner.get_user_from_temporary_code(provider, code),
        )
        .await
    }

    async fn store_temporary_code(&self, user_id: &str, provider: &str, code: &str) -> Result<()> {
        self.exclusive(
            "store_temporary_code",
            self.inner.store_temporary_code(user_id, provider, code),
        )
        .await
    }

    async fn delete_temporary_code(&self, user_id: &str, provider: &str) -> Result<()> {
        self.exclusive(
            "delete_temporary_code",
            self.inner.delete_temporary_code(user_id, provider),
        )
        .await
    }

    async fn get_email_item(
        &self,
        account_id: i64,
        guid: &str,
        min_version: u64,
    ) -> Result<Option<EmailItem>> {
        self.shared(
            "get_email_item",
            self.inner.get_email_item(account_id, guid, min_version),
        )
        .await
    }

    async fn store_email_item(&self, account_id: i64, version: u64, item: &EmailItem) -> Result<bool> {
        self.exclusive(
            "store_email_item",
            self.inner.store_email_item(account_id, version, item),
        )
        .await
    }
}
