//! Pooled relational backend on `sqlx`.
//!
//! Every call borrows a connection from the pool, so independent requests run
//! concurrently. A transaction pins one connection for its whole duration and its
//! view routes every statement through that connection.

use std::ops::{Deref, DerefMut};
use std::path::Path;
use std::str::FromStr;
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use chrono::Utc;
use sqlx::pool::PoolConnection;
use sqlx::sqlite::{
    SqliteConnectOptions, SqliteConnection, SqliteJournalMode, SqlitePool, SqlitePoolOptions,
};
use sqlx::{ConnectOptions, Sqlite};
use tokio::sync::{MappedMutexGuard, Mutex, MutexGuard};

use crate::error::{AppError, Result, ResultExt};
use crate::models::{
    EmailItem, ExternalAccount, Feed, FeedItem, ItemForUser, Layout, Tab, TabSummary, User,
    Widget, WidgetConfig, WidgetKind,
};

use super::repository::{
    next_instance_id, reject_nested, run_in_transaction, transaction_scope, version_column,
    Repository, TxWork,
};
use super::schema::{
    INSERT_FEED_IF_MISSING, SCHEMA, SELECT_EMAIL_ITEM, SELECT_TAB, SELECT_WIDGET,
    UPSERT_ACCOUNT, UPSERT_EMAIL_ITEM,
};
use super::{layout, parse_datetime, parse_datetime_or_epoch};

const BACKEND: &str = "pooled";

/// The connection pinned by a running transaction; `None` once it has ended.
type TxSlot = Arc<Mutex<Option<PoolConnection<Sqlite>>>>;

pub struct PoolRepository {
    id: u64,
    pool: SqlitePool,
    tx: Option<TxSlot>,
    /// Keeps an in-memory database alive while pooled connections are closed.
    keepalive: Option<Arc<Mutex<SqliteConnection>>>,
}

/// A connection to run statements on: a fresh one from the pool, or the transaction's.
enum Handle<'a> {
    Pool(PoolConnection<Sqlite>),
    Tx(MappedMutexGuard<'a, PoolConnection<Sqlite>>),
}

impl Deref for Handle<'_> {
    type Target = SqliteConnection;

    fn deref(&self) -> &SqliteConnection {
        match self {
            Handle::Pool(conn) => conn,
            Handle::Tx(conn) => conn,
        }
    }
}

impl DerefMut for Handle<'_> {
    fn deref_mut(&mut self) -> &mut SqliteConnection {
        match self {
            Handle::Pool(conn) => &mut *conn,
            Handle::Tx(conn) => &mut *conn,
        }
    }
}

/// Drops the pinned connection out of the pool if the transaction future is abandoned;
/// closing it makes SQLite roll back.
struct AbandonGuard(TxSlot);

impl Drop for AbandonGuard {
    fn drop(&mut self) {
        if let Ok(mut slot) = self.0.try_lock() {
            if let Some(conn) = slot.take() {
                tracing::warn!("pooled transaction abandoned, closing its connection");
                drop(conn.detach());
            }
        }
    }
}

impl PoolRepository {
    pub async fn open(db_path: impl AsRef<Path>, max_connections: u32) -> Result<Self> {
        let options = SqliteConnectOptions::new()
            .filename(db_path)
            .create_if_missing(true)
            .foreign_keys(true)
            .journal_mode(SqliteJournalMode::Wal)
            .busy_timeout(Duration::from_secs(5));

        let pool = SqlitePoolOptions::new()
            .max_connections(max_connections.max(1))
            .connect_with(options)
            .await
            .context("connecting to database failed")?;

        Self::init(pool).await
    }

    /// Single-connection in-memory database; transactions block every other caller.
    ///
    /// The database is shared-cache, so it survives an abandoned transaction closing
    /// the pooled connection as long as the keepalive connection stays open.
    pub async fn open_in_memory() -> Result<Self> {
        let options = SqliteConnectOptions::from_str("sqlite::memory:")?.foreign_keys(true);
        let keepalive = options
            .connect()
            .await
            .context("connecting to database failed")?;
        let pool = SqlitePoolOptions::new()
            .max_connections(1)
            .connect_with(options)
            .await
            .context("connecting to database failed")?;

        let mut repo = Self::init(pool).await?;
        repo.keepalive = Some(Arc::new(Mutex::new(keepalive)));
        Ok(repo)
    }

    async fn init(pool: SqlitePool) -> Result<Self> {
        sqlx::raw_sql(SCHEMA)
            .execute(&pool)
            .await
            .context("creating schema failed")?;
        Ok(Self {
            id: next_instance_id(),
            pool,
            tx: None,
            keepalive: None,
        })
    }

    async fn handle(&self) -> Result<Handle<'_>> {
        match &self.tx {
            None => Ok(Handle::Pool(self.pool.acquire().await?)),
            Some(slot) => {
                let guard = slot.lock().await;
                MutexGuard::try_map(guard, |conn| conn.as_mut())
                    .map(Handle::Tx)
                    .map_err(|_| {
                        AppError::TransactionMisuse(
                            "transaction view used after commit or rollback".into(),
                        )
                    })
            }
        }
    }
}

async fn rollback(conn: &mut PoolConnection<Sqlite>) -> Result<()> {
    sqlx::query("ROLLBACK").execute(&mut **conn).await?;
    Ok(())
}

#[async_trait]
impl Repository for PoolRepository {
    fn backend(&self) -> &'static str {
        BACKEND
    }

    fn is_not_found(&self, err: &AppError) -> bool {
        matches!(
            err.root(),
            AppError::NotFound(_) | AppError::Sql(sqlx::Error::RowNotFound)
        )
    }

    fn in_transaction(&self) -> bool {
        self.tx.is_some()
    }

    async fn transaction<'a>(&'a self, work: TxWork<'a>) -> Result<()> {
        if self.in_transaction() {
            return Err(AppError::TransactionMisuse(
                "nested transactions are prohibited".into(),
            ));
        }
        reject_nested(self.id, "transaction")?;

        let mut conn = self
            .pool
            .acquire()
            .await
            .context("unable to start transaction")?;
        sqlx::query("BEGIN IMMEDIATE")
            .execute(&mut *conn)
            .await
            .context("unable to start transaction")?;

        let slot: TxSlot = Arc::new(Mutex::new(Some(conn)));
        let _guard = AbandonGuard(Arc::clone(&slot));
        let view: Arc<dyn Repository> = Arc::new(PoolRepository {
            id: self.id,
            pool: self.pool.clone(),
            tx: Some(Arc::clone(&slot)),
            keepalive: self.keepalive.clone(),
        });

        let outcome = transaction_scope(self.id, BACKEND, work(view)).await;

        let Some(mut conn) = slot.lock().await.take() else {
            return Err(AppError::TransactionMisuse(
                "transaction connection lost before commit".into(),
            ));
        };

        match outcome {
            Ok(()) => {
                if let Err(e) = sqlx::query("COMMIT").execute(&mut *conn).await {
                    if let Err(rollback_err) = rollback(&mut conn).await {
                        tracing::error!("Rollback after failed commit failed: {}", rollback_err);
                        drop(conn.detach());
                    }
                    return Err(e).context("commit failed");
                }
                Ok(())
            }
            Err(err) => {
                if let Err(rollback_err) = rollback(&mut conn).await {
                    drop(conn.detach());
                    return Err(err).context(format!("rollback failed: {rollback_err}"));
                }
                Err(err)
            }
        }
    }

    // User operations

    async fn get_user(&self, user_id: &str) -> Result<User> {
        let mut conn = self.handle().await?;
        let (user_id, display_name, email, is_admin) =
            sqlx::query_as::<_, (String, String, String, bool)>(
                "SELECT id, display_name, email, is_admin FROM users WHERE id = ?1",
            )
            .bind(user_id)
            .fetch_one(&mut *conn)
            .await
            .context("fetching user failed")?;

        Ok(User {
            user_id,
            display_name,
            email,
            is_admin,
        })
    }

    async fn store_user(&self, user: &User) -> Result<()> {
        let mut conn = self.handle().await?;
        sqlx::query(
            r#"INSERT INTO users (id, display_name, email, is_admin) VALUES (?1, ?2, ?3, ?4)
               ON CONFLICT(id) DO UPDATE SET
                   display_name = excluded.display_name,
                   email = excluded.email,
                   is_admin = excluded.is_admin"#,
        )
        .bind(&user.user_id)
        .bind(&user.display_name)
        .bind(&user.email)
        .bind(user.is_admin)
        .execute(&mut *conn)
        .await
        .context("storing user failed")?;
        Ok(())
    }

    // Tab access operations

    async fn get_tabs(&self, user_id: &str) -> Result<Vec<TabSummary>> {
        let mut conn = self.handle().await?;
        let rows = sqlx::query_as::<_, (i64, String)>(
            r#"SELECT tabs.id, tabs.title
               FROM tabs
               JOIN tab_access ON tabs.id = tab_access.tab_id
               WHERE tab_access.user_id = ?1
               ORDER BY tabs.id"#,
        )
        .bind(user_id)
        .fetch_all(&mut *conn)
        .await
        .context("fetching tabs failed")?;

        Ok(rows
            .into_iter()
            .map(|(id, title)| TabSummary { id, title })
            .collect())
    }

    async fn is_tab_access_allowed(&self, user_id: &str, tab_id: i64) -> Result<()> {
        let mut conn = self.handle().await?;
        let (count,) = sqlx::query_as::<_, (i64,)>(
            "SELECT COUNT(*) FROM tab_access WHERE user_id = ?1 AND tab_id = ?2",
        )
        .bind(user_id)
        .bind(tab_id)
        .fetch_one(&mut *conn)
        .await
        .context("checking tab access failed")?;

        if count != 1 {
            return Err(AppError::NotAuthorized(format!(
                "tab {tab_id} access not allowed for {user_id}"
            )));
        }
        Ok(())
    }

    async fn allow_tab_access(&self, user_id: &str, tab_id: i64) -> Result<()> {
        let mut conn = self.handle().await?;
        sqlx::query("INSERT OR IGNORE INTO tab_access (user_id, tab_id) VALUES (?1, ?2)")
            .bind(user_id)
            .bind(tab_id)
            .execute(&mut *conn)
            .await
            .context("adding tab access failed")?;
        Ok(())
    }

    // Tab operations

    async fn get_tab(&self, tab_id: i64) -> Result<Tab> {
        let mut conn = self.handle().await?;
        fetch_tab(&mut conn, tab_id)
            .await
            .context("retrieving tab failed")
    }

    async fn store_tab(&self, tab: &mut Tab) -> Result<()> {
        let layout = serde_json::to_string(&tab.layout())?;
        let mut conn = self.handle().await?;

        if tab.id() > 0 {
            let result = sqlx::query("UPDATE tabs SET title = ?1, layout = ?2 WHERE id = ?3")
                .bind(&tab.summary.title)
                .bind(&layout)
                .bind(tab.id())
                .execute(&mut *conn)
                .await
                .context("storing tab failed")?;
            if result.rows_affected() == 0 {
                return Err(sqlx::Error::RowNotFound).context("storing tab failed");
            }
        } else {
            let (id,) = sqlx::query_as::<_, (i64,)>(
                "INSERT INTO tabs (title, layout) VALUES (?1, ?2) RETURNING id",
            )
            .bind(&tab.summary.title)
            .bind(&layout)
            .fetch_one(&mut *conn)
            .await
            .context("storing tab failed")?;
            tab.summary.id = id;
        }
        Ok(())
    }

    async fn delete_tab(&self, tab_id: i64) -> Result<()> {
        let mut conn = self.handle().await?;
        sqlx::query("DELETE FROM tabs WHERE id = ?1")
            .bind(tab_id)
            .execute(&mut *conn)
            .await
            .context("removing tab failed")?;
        Ok(())
    }

    // Widget operations

    async fn get_widget(&self, tab_id: i64, widget_id: i64) -> Result<Widget> {
        let mut conn = self.handle().await?;
        fetch_widget(&mut conn, tab_id, widget_id)
            .await
            .context("retrieving widget failed")
    }

    async fn store_widget(&self, tab_id: i64, widget: &mut Widget) -> Result<()> {
        let config = widget.config.to_json()?;
        let kind = widget.kind().as_str();
        let mut conn = self.handle().await?;

        if widget.id > 0 {
            let result = sqlx::query(
                "UPDATE widgets SET widget_type = ?1, config = ?2 WHERE id = ?3 AND tab_id = ?4",
            )
            .bind(kind)
            .bind(&config)
            .bind(widget.id)
            .bind(tab_id)
            .execute(&mut *conn)
            .await
            .context("storing widget failed")?;
            if result.rows_affected() == 0 {
                return Err(sqlx::Error::RowNotFound).context("storing widget failed");
            }
        } else {
            let (id,) = sqlx::query_as::<_, (i64,)>(
                "INSERT INTO widgets (tab_id, widget_type, config) VALUES (?1, ?2, ?3) RETURNING id",
            )
            .bind(tab_id)
            .bind(kind)
            .bind(&config)
            .fetch_one(&mut *conn)
            .await
            .context("storing widget failed")?;
            widget.id = id;
        }
        Ok(())
    }

    async fn delete_widget(&self, tab_id: i64, widget_id: i64) -> Result<()> {
        let mut conn = self.handle().await?;
        sqlx::query("DELETE FROM widgets WHERE id = ?1 AND tab_id = ?2")
            .bind(widget_id)
            .bind(tab_id)
            .execute(&mut *conn)
            .await
            .context("removing widget failed")?;
        Ok(())
    }

    async fn update_tab_layout(&self, tab_id: i64, new_layout: &Layout) -> Result<()> {
        if self.in_transaction() {
            return layout::replace_layout(self, tab_id, new_layout).await;
        }
        let new_layout = new_layout.clone();
        run_in_transaction(self, move |tx| async move {
            layout::replace_layout(&*tx, tab_id, &new_layout).await
        })
        .await
    }

    async fn delete_widget_from_tab(&self, tab_id: i64, widget_id: i64) -> Result<()> {
        if self.in_transaction() {
            return layout::remove_widget(self, tab_id, widget_id).await;
        }
        run_in_transaction(self, move |tx| async move {
            layout::remove_widget(&*tx, tab_id, widget_id).await
        })
        .await
    }

    // Feed operations

    async fn get_or_create_feed_id(&self, url: &str) -> Result<i64> {
        let mut conn = self.handle().await?;
        sqlx::query(INSERT_FEED_IF_MISSING)
            .bind(url)
            .bind(Utc::now().to_rfc3339())
            .execute(&mut *conn)
            .await
            .context("creating feed failed")?;

        let (id,) = sqlx::query_as::<_, (i64,)>("SELECT id FROM feeds WHERE url = ?1")
            .bind(url)
            .fetch_one(&mut *conn)
            .await
            .context("retrieving feed id failed")?;
        Ok(id)
    }

    async fn get_feed(&self, feed_id: i64) -> Result<Feed> {
        let mut conn = self.handle().await?;
        let (id, url, next_retrieval, title) =
            sqlx::query_as::<_, (i64, String, String, Option<String>)>(
                "SELECT id, url, next_retrieval, title FROM feeds WHERE id = ?1",
            )
            .bind(feed_id)
            .fetch_one(&mut *conn)
            .await
            .context("retrieving feed failed")?;

        Ok(Feed {
            id,
            url,
            next_retrieval: parse_datetime_or_epoch(&next_retrieval),
            title: title.unwrap_or_default(),
        })
    }

    async fn get_feed_items(&self, feed_id: i64) -> Result<Vec<FeedItem>> {
        let mut conn = self.handle().await?;
        let rows = sqlx::query_as::<_, (String, String, String, String)>(
            r#"SELECT guid, title, published, link FROM feed_items
               WHERE feed_id = ?1 ORDER BY published DESC"#,
        )
        .bind(feed_id)
        .fetch_all(&mut *conn)
        .await
        .context("retrieving feed items failed")?;

        Ok(rows
            .into_iter()
            .map(|(guid, title, published, link)| FeedItem {
                guid,
                title,
                published: parse_datetime(&published).unwrap_or_else(Utc::now),
                link,
            })
            .collect())
    }

    async fn store_feed(&self, feed: &mut Feed, items: &[FeedItem]) -> Result<()> {
        if !self.in_transaction() {
            let mut stored = feed.clone();
            let items = items.to_vec();
            feed.id = run_in_transaction(self, move |tx| async move {
                tx.store_feed(&mut stored, &items).await?;
                Ok(stored.id)
            })
            .await?;
            return Ok(());
        }

        let mut conn = self.handle().await?;
        let next_retrieval = feed.next_retrieval.to_rfc3339();
        if feed.id > 0 {
            sqlx::query("UPDATE feeds SET url = ?1, next_retrieval = ?2, title = ?3 WHERE id = ?4")
                .bind(&feed.url)
                .bind(&next_retrieval)
                .bind(&feed.title)
                .bind(feed.id)
                .execute(&mut *conn)
                .await
                .context("storing feed failed")?;
            sqlx::query("DELETE FROM feed_items WHERE feed_id = ?1")
                .bind(feed.id)
                .execute(&mut *conn)
                .await
                .context("clearing feed items failed")?;
        } else {
            let (id,) = sqlx::query_as::<_, (i64,)>(
                "INSERT INTO feeds (url, next_retrieval, title) VALUES (?1, ?2, ?3) RETURNING id",
            )
            .bind(&feed.url)
            .bind(&next_retrieval)
            .bind(&feed.title)
            .fetch_one(&mut *conn)
            .await
            .context("storing feed failed")?;
            feed.id = id;
        }

        for item in items {
            sqlx::query(
                r#"INSERT OR REPLACE INTO feed_items (feed_id, guid, title, published, link)
                   VALUES (?1, ?2, ?3, ?4, ?5)"#,
            )
            .bind(feed.id)
            .bind(&item.guid)
            .bind(&item.title)
            .bind(item.published.to_rfc3339())
            .bind(&item.link)
            .execute(&mut *conn)
            .await
            .context("storing feed item failed")?;
        }
        Ok(())
    }

    // Read state operations

    async fn are_items_read(
        &self,
        user_id: &str,
        feed_id: i64,
        guids: &[String],
    ) -> Result<Vec<bool>> {
        let mut conn = self.handle().await?;
        let mut states = Vec::with_capacity(guids.len());
        for guid in guids {
            let read = sqlx::query_as::<_, (bool,)>(
                "SELECT read FROM read_states WHERE user_id = ?1 AND feed_id = ?2 AND guid = ?3",
            )
            .bind(user_id)
            .bind(feed_id)
            .bind(guid)
            .fetch_optional(&mut *conn)
            .await
            .context("getting read status failed")?;
            states.push(read.map(|(read,)| read).unwrap_or(false));
        }
        Ok(states)
    }

    async fn set_item_read(&self, user_id: &str, feed_id: i64, guid: &str, read: bool) -> Result<()> {
        let mut conn = self.handle().await?;
        upsert_read_state(&mut conn, user_id, feed_id, guid, read).await
    }

    async fn set_items_read(
        &self,
        user_id: &str,
        feed_id: i64,
        guids: &[String],
        read: bool,
    ) -> Result<()> {
        if !self.in_transaction() {
            let user_id = user_id.to_string();
            let guids = guids.to_vec();
            return run_in_transaction(self, move |tx| async move {
                tx.set_items_read(&user_id, feed_id, &guids, read).await
            })
            .await;
        }

        let mut conn = self.handle().await?;
        for guid in guids {
            upsert_read_state(&mut conn, user_id, feed_id, guid, read).await?;
        }
        Ok(())
    }

    // Account operations

    async fn get_account(&self, user_id: &str, account_id: i64) -> Result<ExternalAccount> {
        let mut conn = self.handle().await?;
        let row = sqlx::query_as::<_, AccountRow>(
            r#"SELECT id, provider, account_id, token FROM accounts
               WHERE id = ?1 AND user_id = ?2"#,
        )
        .bind(account_id)
        .bind(user_id)
        .fetch_one(&mut *conn)
        .await
        .context("retrieving account failed")?;
        account_from_row(row)
    }

    async fn get_accounts(&self, user_id: &str) -> Result<Vec<ExternalAccount>> {
        let mut conn = self.handle().await?;
        let rows = sqlx::query_as::<_, AccountRow>(
            "SELECT id, provider, account_id, token FROM accounts WHERE user_id = ?1 ORDER BY id",
        )
        .bind(user_id)
        .fetch_all(&mut *conn)
        .await
        .context("fetching accounts failed")?;
        rows.into_iter().map(account_from_row).collect()
    }

    async fn delete_account(&self, user_id: &str, account_id: i64) -> Result<()> {
        let mut conn = self.handle().await?;
        sqlx::query("DELETE FROM accounts WHERE id = ?1 AND user_id = ?2")
            .bind(account_id)
            .bind(user_id)
            .execute(&mut *conn)
            .await
            .context("removing account failed")?;
        Ok(())
    }

    async fn store_account(&self, user_id: &str, account: &mut ExternalAccount) -> Result<()> {
        let token = serde_json::to_string(&account.token)?;
        let mut conn = self.handle().await?;

        if account.id > 0 {
            let result = sqlx::query(
                r#"UPDATE accounts SET provider = ?1, account_id = ?2, token = ?3
                   WHERE id = ?4 AND user_id = ?5"#,
            )
            .bind(&account.provider_name)
            .bind(&account.account_id)
            .bind(&token)
            .bind(account.id)
            .bind(user_id)
            .execute(&mut *conn)
            .await
            .context("storing account failed")?;
            if result.rows_affected() == 0 {
                return Err(sqlx::Error::RowNotFound).context("storing account failed");
            }
        } else {
            let (id,) = sqlx::query_as::<_, (i64,)>(UPSERT_ACCOUNT)
                .bind(user_id)
                .bind(&account.provider_name)
                .bind(&account.account_id)
                .bind(&token)
                .fetch_one(&mut *conn)
                .await
                .context("storing account failed")?;
            account.id = id;
        }
        Ok(())
    }

    // Temporary code operations

    async fn get_user_from_temporary_code(&self, provider: &str, code: &str) -> Result<String> {
        let mut conn = self.handle().await?;
        let (user_id,) = sqlx::query_as::<_, (String,)>(
            "SELECT user_id FROM temporary_codes WHERE provider = ?1 AND code = ?2",
        )
        .bind(provider)
        .bind(code)
        .fetch_one(&mut *conn)
        .await
        .context("retrieving user from temporary code failed")?;
        Ok(user_id)
    }

    async fn store_temporary_code(&self, user_id: &str, provider: &str, code: &str) -> Result<()> {
        let mut conn = self.handle().await?;
        sqlx::query(
            "INSERT OR REPLACE INTO temporary_codes (provider, code, user_id) VALUES (?1, ?2, ?3)",
        )
        .bind(provider)
        .bind(code)
        .bind(user_id)
        .execute(&mut *conn)
        .await
        .context("storing temporary code failed")?;
        Ok(())
    }

    async fn delete_temporary_code(&self, user_id: &str, provider: &str) -> Result<()> {
        let mut conn = self.handle().await?;
        sqlx::query("DELETE FROM temporary_codes WHERE user_id = ?1 AND provider = ?2")
            .bind(user_id)
            .bind(provider)
            .execute(&mut *conn)
            .await
            .context("deleting temporary code failed")?;
        Ok(())
    }

    // Email cache operations

    async fn get_email_item(
        &self,
        account_id: i64,
        guid: &str,
        min_version: u64,
    ) -> Result<Option<EmailItem>> {
        let min_version = version_column(min_version)?;
        let mut conn = self.handle().await?;
        let row = sqlx::query_as::<_, (String, String, String, String, String, String, bool)>(
            SELECT_EMAIL_ITEM,
        )
        .bind(account_id)
        .bind(guid)
        .bind(min_version)
        .fetch_optional(&mut *conn)
        .await
        .context("retrieving email item failed")?;

        Ok(row.map(
            |(guid, title, published, link, from, snippet, read)| EmailItem {
                item: ItemForUser {
                    item: FeedItem {
                        guid,
                        title,
                        published: parse_datetime(&published).unwrap_or_else(Utc::now),
                        link,
                    },
                    read,
                },
                from,
                snippet,
            },
        ))
    }

    async fn store_email_item(&self, account_id: i64, version: u64, item: &EmailItem) -> Result<bool> {
        let version = version_column(version)?;
        let entry = &item.item.item;
        let mut conn = self.handle().await?;
        let result = sqlx::query(UPSERT_EMAIL_ITEM)
            .bind(account_id)
            .bind(&entry.guid)
            .bind(&entry.title)
            .bind(entry.published.to_rfc3339())
            .bind(&entry.link)
            .bind(&item.from)
            .bind(&item.snippet)
            .bind(item.item.read)
            .bind(version)
            .execute(&mut *conn)
            .await
            .context("storing email item failed")?;
        Ok(result.rows_affected() > 0)
    }
}

type AccountRow = (i64, String, String, String);

fn account_from_row((id, provider_name, account_id, token): AccountRow) -> Result<ExternalAccount> {
    Ok(ExternalAccount {
        id,
        provider_name,
        account_id,
        token: serde_json::from_str(&token).context("unmarshaling account token failed")?,
    })
}

async fn fetch_tab(conn: &mut SqliteConnection, tab_id: i64) -> Result<Tab> {
    let (id, title, layout) = sqlx::query_as::<_, (i64, String, Option<String>)>(SELECT_TAB)
        .bind(tab_id)
        .fetch_one(&mut *conn)
        .await?;

    let mut widgets = Vec::new();
    if let Some(layout) = layout {
        let layout: Layout = serde_json::from_str(&layout)?;
        for column in layout {
            let mut resolved = Vec::with_capacity(column.len());
            for widget_id in column {
                resolved.push(fetch_widget(conn, tab_id, widget_id).await?);
            }
            widgets.push(resolved);
        }
    }

    Ok(Tab {
        summary: TabSummary { id, title },
        widgets,
    })
}

async fn fetch_widget(conn: &mut SqliteConnection, tab_id: i64, widget_id: i64) -> Result<Widget> {
    let (id, kind, config) = sqlx::query_as::<_, (i64, String, String)>(SELECT_WIDGET)
        .bind(widget_id)
        .bind(tab_id)
        .fetch_one(&mut *conn)
        .await?;
    let kind: WidgetKind = kind.parse()?;
    Ok(Widget::new(id, WidgetConfig::from_json(kind, &config)?))
}

async fn upsert_read_state(
    conn: &mut SqliteConnection,
    user_id: &str,
    feed_id: i64,
    guid: &str,
    read: bool,
) -> Result<()> {
    sqlx::query(
        r#"INSERT INTO read_states (user_id, feed_id, guid, read) VALUES (?1, ?2, ?3, ?4)
           ON CONFLICT(user_id, feed_id, guid) DO UPDATE SET read = excluded.read"#,
    )
    .bind(user_id)
    .bind(feed_id)
    .bind(guid)
    .bind(read)
    .execute(&mut *conn)
    .await
    .context("saving read status failed")?;
    Ok(())
}
