//! Embedded single-writer backend.
//!
//! All statements run on one `tokio_rusqlite` connection thread. Transactions are
//! simulated on that shared connection, so a running transaction holds the handle's
//! gate exclusively and statements on the root handle wait for it to finish.

use std::ops::Deref;
use std::path::Path;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use async_trait::async_trait;
use chrono::Utc;
use rusqlite::{params, OptionalExtension, Row};
use tokio::sync::{OwnedRwLockWriteGuard, RwLock, RwLockReadGuard};
use tokio_rusqlite::Connection;

use crate::error::{AppError, Result, ResultExt};
use crate::models::{
    EmailItem, ExternalAccount, Feed, FeedItem, ItemForUser, Layout, Tab, TabSummary, Token,
    User, Widget, WidgetConfig, WidgetKind,
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

const BACKEND: &str = "embedded";

pub struct SqliteRepository {
    id: u64,
    conn: Connection,
    /// Shared by root statements, held exclusively by a running transaction.
    gate: Arc<RwLock<()>>,
    tx: Option<Arc<TxState>>,
}

/// The connection for one statement, with the gate held when issued on a root handle.
struct Gated<'a> {
    conn: &'a Connection,
    _gate: Option<RwLockReadGuard<'a, ()>>,
}

impl Deref for Gated<'_> {
    type Target = Connection;

    fn deref(&self) -> &Connection {
        self.conn
    }
}

/// Shared between a transaction and the view handed to its work.
#[derive(Default)]
struct TxState {
    finished: AtomicBool,
}

impl SqliteRepository {
    pub async fn open(db_path: impl AsRef<Path>) -> Result<Self> {
        let conn = Connection::open(db_path).await?;
        Self::init(conn).await
    }

    pub async fn open_in_memory() -> Result<Self> {
        let conn = Connection::open_in_memory().await?;
        Self::init(conn).await
    }

    async fn init(conn: Connection) -> Result<Self> {
        conn.call(|conn| {
            conn.execute_batch("PRAGMA foreign_keys = ON;")?;
            conn.execute_batch(SCHEMA)?;
            Ok(())
        })
        .await
        .context("initializing embedded database failed")?;

        Ok(Self {
            id: next_instance_id(),
            conn,
            gate: Arc::new(RwLock::new(())),
            tx: None,
        })
    }

    /// The connection, unless this is a view of a transaction that already ended.
    ///
    /// Root handles wait until no transaction is running on the connection.
    async fn conn(&self) -> Result<Gated<'_>> {
        match &self.tx {
            Some(state) if state.finished.load(Ordering::SeqCst) => Err(
                AppError::TransactionMisuse("transaction view used after commit or rollback".into()),
            ),
            Some(_) => Ok(Gated {
                conn: &self.conn,
                _gate: None,
            }),
            None => {
                reject_nested(self.id, "statement on the root handle")?;
                let gate = self.gate.read().await;
                Ok(Gated {
                    conn: &self.conn,
                    _gate: Some(gate),
                })
            }
        }
    }

    async fn execute_batch(&self, sql: &'static str) -> Result<()> {
        self.conn
            .call(move |conn| {
                conn.execute_batch(sql)?;
                Ok(())
            })
            .await?;
        Ok(())
    }
}

/// Rolls back a simulated transaction whose future was dropped before finishing.
/// The gate stays held until the rollback has run.
struct RollbackGuard {
    conn: Option<Connection>,
    state: Arc<TxState>,
    permit: Option<OwnedRwLockWriteGuard<()>>,
}

impl RollbackGuard {
    fn disarm(&mut self) {
        self.conn = None;
    }
}

impl Drop for RollbackGuard {
    fn drop(&mut self) {
        let Some(conn) = self.conn.take() else {
            return;
        };
        self.state.finished.store(true, Ordering::SeqCst);
        tracing::warn!("embedded transaction abandoned, rolling back");
        let permit = self.permit.take();
        if let Ok(handle) = tokio::runtime::Handle::try_current() {
            handle.spawn(async move {
                let result = conn
                    .call(|conn| {
                        conn.execute_batch("ROLLBACK")?;
                        Ok(())
                    })
                    .await;
                if let Err(e) = result {
                    tracing::error!("Rollback of abandoned transaction failed: {}", e);
                }
                drop(permit);
            });
        }
    }
}

#[async_trait]
impl Repository for SqliteRepository {
    fn backend(&self) -> &'static str {
        BACKEND
    }

    fn is_not_found(&self, err: &AppError) -> bool {
        matches!(
            err.root(),
            AppError::NotFound(_)
                | AppError::Database(rusqlite::Error::QueryReturnedNoRows)
                | AppError::Connection(tokio_rusqlite::Error::Rusqlite(
                    rusqlite::Error::QueryReturnedNoRows
                ))
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

        let permit = Arc::clone(&self.gate).write_owned().await;
        let state = Arc::new(TxState::default());
        let mut guard = RollbackGuard {
            conn: Some(self.conn.clone()),
            state: Arc::clone(&state),
            permit: Some(permit),
        };
        if let Err(e) = self.execute_batch("BEGIN IMMEDIATE").await {
            guard.disarm();
            return Err(e).context("unable to start transaction");
        }

        let view: Arc<dyn Repository> = Arc::new(SqliteRepository {
            id: self.id,
            conn: self.conn.clone(),
            gate: Arc::clone(&self.gate),
            tx: Some(Arc::clone(&state)),
        });

        let outcome = transaction_scope(self.id, BACKEND, work(view)).await;
        state.finished.store(true, Ordering::SeqCst);
        guard.disarm();

        match outcome {
            Ok(()) => {
                if let Err(e) = self.execute_batch("COMMIT").await {
                    if let Err(rollback) = self.execute_batch("ROLLBACK").await {
                        tracing::error!("Rollback after failed commit failed: {}", rollback);
                    }
                    return Err(e).context("commit failed");
                }
                Ok(())
            }
            Err(err) => {
                if let Err(rollback) = self.execute_batch("ROLLBACK").await {
                    return Err(err).context(format!("rollback failed: {rollback}"));
                }
                Err(err)
            }
        }
    }

    // User operations

    async fn get_user(&self, user_id: &str) -> Result<User> {
        let user_id = user_id.to_string();
        let user = self
            .conn()
            .await?
            .call(move |conn| {
                let user = conn.query_row(
                    "SELECT id, display_name, email, is_admin FROM users WHERE id = ?1",
                    params![user_id],
                    user_from_row,
                )?;
                Ok(user)
            })
            .await
            .context("fetching user failed")?;
        Ok(user)
    }

    async fn store_user(&self, user: &User) -> Result<()> {
        let user = user.clone();
        self.conn()
            .await?
            .call(move |conn| {
                conn.execute(
                    r#"INSERT INTO users (id, display_name, email, is_admin) VALUES (?1, ?2, ?3, ?4)
                       ON CONFLICT(id) DO UPDATE SET
                           display_name = excluded.display_name,
                           email = excluded.email,
                           is_admin = excluded.is_admin"#,
                    params![user.user_id, user.display_name, user.email, user.is_admin],
                )?;
                Ok(())
            })
            .await
            .context("storing user failed")?;
        Ok(())
    }

    // Tab access operations

    async fn get_tabs(&self, user_id: &str) -> Result<Vec<TabSummary>> {
        let user_id = user_id.to_string();
        let tabs = self
            .conn()
            .await?
            .call(move |conn| {
                let mut stmt = conn.prepare(
                    r#"SELECT tabs.id, tabs.title
                       FROM tabs
                       JOIN tab_access ON tabs.id = tab_access.tab_id
                       WHERE tab_access.user_id = ?1
                       ORDER BY tabs.id"#,
                )?;
                let tabs = stmt
                    .query_map(params![user_id], |row| {
                        Ok(TabSummary {
                            id: row.get(0)?,
                            title: row.get(1)?,
                        })
                    })?
                    .collect::<std::result::Result<Vec<_>, _>>()?;
                Ok(tabs)
            })
            .await
            .context("fetching tabs failed")?;
        Ok(tabs)
    }

    async fn is_tab_access_allowed(&self, user_id: &str, tab_id: i64) -> Result<()> {
        let owned_user_id = user_id.to_string();
        let count: i64 = self
            .conn()
            .await?
            .call(move |conn| {
                let count = conn.query_row(
                    "SELECT COUNT(*) FROM tab_access WHERE user_id = ?1 AND tab_id = ?2",
                    params![owned_user_id, tab_id],
                    |row| row.get(0),
                )?;
                Ok(count)
            })
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
        let user_id = user_id.to_string();
        self.conn()
            .await?
            .call(move |conn| {
                conn.execute(
                    "INSERT OR IGNORE INTO tab_access (user_id, tab_id) VALUES (?1, ?2)",
                    params![user_id, tab_id],
                )?;
                Ok(())
            })
            .await
            .context("adding tab access failed")?;
        Ok(())
    }

    // Tab operations

    async fn get_tab(&self, tab_id: i64) -> Result<Tab> {
        let tab = self
            .conn()
            .await?
            .call(move |conn| {
                let (summary, layout) = conn.query_row(SELECT_TAB, params![tab_id], |row| {
                    Ok((
                        TabSummary {
                            id: row.get(0)?,
                            title: row.get(1)?,
                        },
                        row.get::<_, Option<String>>(2)?,
                    ))
                })?;

                let mut widgets = Vec::new();
                if let Some(layout) = layout {
                    let layout: Layout = serde_json::from_str(&layout).map_err(other)?;
                    for column in layout {
                        let mut resolved = Vec::with_capacity(column.len());
                        for widget_id in column {
                            resolved.push(read_widget(conn, tab_id, widget_id)?);
                        }
                        widgets.push(resolved);
                    }
                }

                Ok(Tab { summary, widgets })
            })
            .await
            .context("retrieving tab failed")?;
        Ok(tab)
    }

    async fn store_tab(&self, tab: &mut Tab) -> Result<()> {
        let layout = serde_json::to_string(&tab.layout())?;
        let title = tab.summary.title.clone();
        let id = tab.id();

        let id = self
            .conn()
            .await?
            .call(move |conn| {
                if id > 0 {
                    let updated = conn.execute(
                        "UPDATE tabs SET title = ?1, layout = ?2 WHERE id = ?3",
                        params![title, layout, id],
                    )?;
                    if updated == 0 {
                        return Err(rusqlite::Error::QueryReturnedNoRows.into());
                    }
                    Ok(id)
                } else {
                    conn.execute(
                        "INSERT INTO tabs (title, layout) VALUES (?1, ?2)",
                        params![title, layout],
                    )?;
                    Ok(conn.last_insert_rowid())
                }
            })
            .await
            .context("storing tab failed")?;

        tab.summary.id = id;
        Ok(())
    }

    async fn delete_tab(&self, tab_id: i64) -> Result<()> {
        self.conn()
            .await?
            .call(move |conn| {
                conn.execute("DELETE FROM tabs WHERE id = ?1", params![tab_id])?;
                Ok(())
            })
            .await
            .context("removing tab failed")?;
        Ok(())
    }

    // Widget operations

    async fn get_widget(&self, tab_id: i64, widget_id: i64) -> Result<Widget> {
        let widget = self
            .conn()
            .await?
            .call(move |conn| read_widget(conn, tab_id, widget_id))
            .await
            .context("retrieving widget failed")?;
        Ok(widget)
    }

    async fn store_widget(&self, tab_id: i64, widget: &mut Widget) -> Result<()> {
        let config = widget.config.to_json()?;
        let kind = widget.kind().as_str();
        let id = widget.id;

        let id = self
            .conn()
            .await?
            .call(move |conn| {
                if id > 0 {
                    let updated = conn.execute(
                        "UPDATE widgets SET widget_type = ?1, config = ?2 WHERE id = ?3 AND tab_id = ?4",
                        params![kind, config, id, tab_id],
                    )?;
                    if updated == 0 {
                        return Err(rusqlite::Error::QueryReturnedNoRows.into());
                    }
                    Ok(id)
                } else {
                    conn.execute(
                        "INSERT INTO widgets (tab_id, widget_type, config) VALUES (?1, ?2, ?3)",
                        params![tab_id, kind, config],
                    )?;
                    Ok(conn.last_insert_rowid())
                }
            })
            .await
            .context("storing widget failed")?;

        widget.id = id;
        Ok(())
    }

    async fn delete_widget(&self, tab_id: i64, widget_id: i64) -> Result<()> {
        self.conn()
            .await?
            .call(move |conn| {
                conn.execute(
                    "DELETE FROM widgets WHERE id = ?1 AND tab_id = ?2",
                    params![widget_id, tab_id],
                )?;
                Ok(())
            })
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
        let url = url.to_string();
        let id = self
            .conn()
            .await?
            .call(move |conn| {
                conn.execute(INSERT_FEED_IF_MISSING, params![url, Utc::now().to_rfc3339()])?;
                let id = conn.query_row(
                    "SELECT id FROM feeds WHERE url = ?1",
                    params![url],
                    |row| row.get(0),
                )?;
                Ok(id)
            })
            .await
            .context("getting or creating feed failed")?;
        Ok(id)
    }

    async fn get_feed(&self, feed_id: i64) -> Result<Feed> {
        let feed = self
            .conn()
            .await?
            .call(move |conn| {
                let feed = conn.query_row(
                    "SELECT id, url, next_retrieval, title FROM feeds WHERE id = ?1",
                    params![feed_id],
                    feed_from_row,
                )?;
                Ok(feed)
            })
            .await
            .context("retrieving feed failed")?;
        Ok(feed)
    }

    async fn get_feed_items(&self, feed_id: i64) -> Result<Vec<FeedItem>> {
        let items = self
            .conn()
            .await?
            .call(move |conn| {
                let mut stmt = conn.prepare(
                    r#"SELECT guid, title, published, link FROM feed_items
                       WHERE feed_id = ?1 ORDER BY published DESC"#,
                )?;
                let items = stmt
                    .query_map(params![feed_id], feed_item_from_row)?
                    .collect::<std::result::Result<Vec<_>, _>>()?;
                Ok(items)
            })
            .await
            .context("retrieving feed items failed")?;
        Ok(items)
    }

    async fn store_feed(&self, feed: &mut Feed, items: &[FeedItem]) -> Result<()> {
        let stored = feed.clone();
        let items = items.to_vec();

        let id = self
            .conn()
            .await?
            .call(move |conn| {
                let sp = conn.savepoint()?;
                let next_retrieval = stored.next_retrieval.to_rfc3339();
                let id = if stored.id > 0 {
                    sp.execute(
                        "UPDATE feeds SET url = ?1, next_retrieval = ?2, title = ?3 WHERE id = ?4",
                        params![stored.url, next_retrieval, stored.title, stored.id],
                    )?;
                    sp.execute("DELETE FROM feed_items WHERE feed_id = ?1", params![stored.id])?;
                    stored.id
                } else {
                    sp.execute(
                        "INSERT INTO feeds (url, next_retrieval, title) VALUES (?1, ?2, ?3)",
                        params![stored.url, next_retrieval, stored.title],
                    )?;
                    sp.last_insert_rowid()
                };

                for item in &items {
                    sp.execute(
                        r#"INSERT OR REPLACE INTO feed_items (feed_id, guid, title, published, link)
                           VALUES (?1, ?2, ?3, ?4, ?5)"#,
                        params![id, item.guid, item.title, item.published.to_rfc3339(), item.link],
                    )?;
                }
                sp.commit()?;
                Ok(id)
            })
            .await
            .context("storing feed failed")?;

        feed.id = id;
        Ok(())
    }

    // Read state operations

    async fn are_items_read(
        &self,
        user_id: &str,
        feed_id: i64,
        guids: &[String],
    ) -> Result<Vec<bool>> {
        let user_id = user_id.to_string();
        let guids = guids.to_vec();
        let states = self
            .conn()
            .await?
            .call(move |conn| {
                let mut stmt = conn.prepare(
                    "SELECT read FROM read_states WHERE user_id = ?1 AND feed_id = ?2 AND guid = ?3",
                )?;
                let mut states = Vec::with_capacity(guids.len());
                for guid in &guids {
                    let read: Option<bool> = stmt
                        .query_row(params![user_id, feed_id, guid], |row| row.get(0))
                        .optional()?;
                    states.push(read.unwrap_or(false));
                }
                Ok(states)
            })
            .await
            .context("getting read status failed")?;
        Ok(states)
    }

    async fn set_item_read(&self, user_id: &str, feed_id: i64, guid: &str, read: bool) -> Result<()> {
        self.set_items_read(user_id, feed_id, &[guid.to_string()], read)
            .await
    }

    async fn set_items_read(
        &self,
        user_id: &str,
        feed_id: i64,
        guids: &[String],
        read: bool,
    ) -> Result<()> {
        let user_id = user_id.to_string();
        let guids = guids.to_vec();
        self.conn()
            .await?
            .call(move |conn| {
                let sp = conn.savepoint()?;
                for guid in &guids {
                    sp.execute(
                        r#"INSERT INTO read_states (user_id, feed_id, guid, read) VALUES (?1, ?2, ?3, ?4)
                           ON CONFLICT(user_id, feed_id, guid) DO UPDATE SET read = excluded.read"#,
                        params![user_id, feed_id, guid, read],
                    )?;
                }
                sp.commit()?;
                Ok(())
            })
            .await
            .context("saving read status failed")?;
        Ok(())
    }

    // Account operations

    async fn get_account(&self, user_id: &str, account_id: i64) -> Result<ExternalAccount> {
        let user_id = user_id.to_string();
        let (account, token) = self
            .conn()
            .await?
            .call(move |conn| {
                let row = conn.query_row(
                    r#"SELECT id, provider, account_id, token FROM accounts
                       WHERE id = ?1 AND user_id = ?2"#,
                    params![account_id, user_id],
                    account_from_row,
                )?;
                Ok(row)
            })
            .await
            .context("retrieving account failed")?;
        with_token(account, &token)
    }

    async fn get_accounts(&self, user_id: &str) -> Result<Vec<ExternalAccount>> {
        let user_id = user_id.to_string();
        let rows = self
            .conn()
            .await?
            .call(move |conn| {
                let mut stmt = conn.prepare(
                    "SELECT id, provider, account_id, token FROM accounts WHERE user_id = ?1 ORDER BY id",
                )?;
                let rows = stmt
                    .query_map(params![user_id], account_from_row)?
                    .collect::<std::result::Result<Vec<_>, _>>()?;
                Ok(rows)
            })
            .await
            .context("fetching accounts failed")?;

        rows.into_iter()
            .map(|(account, token)| with_token(account, &token))
            .collect()
    }

    async fn delete_account(&self, user_id: &str, account_id: i64) -> Result<()> {
        let user_id = user_id.to_string();
        self.conn()
            .await?
            .call(move |conn| {
                conn.execute(
                    "DELETE FROM accounts WHERE id = ?1 AND user_id = ?2",
                    params![account_id, user_id],
                )?;
                Ok(())
            })
            .await
            .context("removing account failed")?;
        Ok(())
    }

    async fn store_account(&self, user_id: &str, account: &mut ExternalAccount) -> Result<()> {
        let token = serde_json::to_string(&account.token)?;
        let user_id = user_id.to_string();
        let stored = account.clone();

        let id = self
            .conn()
            .await?
            .call(move |conn| {
                if stored.id > 0 {
                    let updated = conn.execute(
                        r#"UPDATE accounts SET provider = ?1, account_id = ?2, token = ?3
                           WHERE id = ?4 AND user_id = ?5"#,
                        params![stored.provider_name, stored.account_id, token, stored.id, user_id],
                    )?;
                    if updated == 0 {
                        return Err(rusqlite::Error::QueryReturnedNoRows.into());
                    }
                    Ok(stored.id)
                } else {
                    let id = conn.query_row(
                        UPSERT_ACCOUNT,
                        params![user_id, stored.provider_name, stored.account_id, token],
                        |row| row.get(0),
                    )?;
                    Ok(id)
                }
            })
            .await
            .context("storing account failed")?;

        account.id = id;
        Ok(())
    }

    // Temporary code operations

    async fn get_user_from_temporary_code(&self, provider: &str, code: &str) -> Result<String> {
        let provider = provider.to_string();
        let code = code.to_string();
        let user_id = self
            .conn()
            .await?
            .call(move |conn| {
                let user_id = conn.query_row(
                    "SELECT user_id FROM temporary_codes WHERE provider = ?1 AND code = ?2",
                    params![provider, code],
                    |row| row.get(0),
                )?;
                Ok(user_id)
            })
            .await
            .context("retrieving user from temporary code failed")?;
        Ok(user_id)
    }

    async fn store_temporary_code(&self, user_id: &str, provider: &str, code: &str) -> Result<()> {
        let (user_id, provider, code) = (user_id.to_string(), provider.to_string(), code.to_string());
        self.conn()
            .await?
            .call(move |conn| {
                conn.execute(
                    "INSERT OR REPLACE INTO temporary_codes (provider, code, user_id) VALUES (?1, ?2, ?3)",
                    params![provider, code, user_id],
                )?;
                Ok(())
            })
            .await
            .context("storing temporary code failed")?;
        Ok(())
    }

    async fn delete_temporary_code(&self, user_id: &str, provider: &str) -> Result<()> {
        let (user_id, provider) = (user_id.to_string(), provider.to_string());
        self.conn()
            .await?
            .call(move |conn| {
                conn.execute(
                    "DELETE FROM temporary_codes WHERE user_id = ?1 AND provider = ?2",
                    params![user_id, provider],
                )?;
                Ok(())
            })
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
        let guid = guid.to_string();
        let min_version = version_column(min_version)?;
        let item = self
            .conn()
            .await?
            .call(move |conn| {
                let item = conn
                    .query_row(
                        SELECT_EMAIL_ITEM,
                        params![account_id, guid, min_version],
                        email_item_from_row,
                    )
                    .optional()?;
                Ok(item)
            })
            .await
            .context("retrieving email item failed")?;
        Ok(item)
    }

    async fn store_email_item(&self, account_id: i64, version: u64, item: &EmailItem) -> Result<bool> {
        let version = version_column(version)?;
        let item = item.clone();
        let written = self
            .conn()
            .await?
            .call(move |conn| {
                let entry = &item.item.item;
                let changed = conn.execute(
                    UPSERT_EMAIL_ITEM,
                    params![
                        account_id,
                        entry.guid,
                        entry.title,
                        entry.published.to_rfc3339(),
                        entry.link,
                        item.from,
                        item.snippet,
                        item.item.read,
                        version,
                    ],
                )?;
                Ok(changed > 0)
            })
            .await
            .context("storing email item failed")?;
        Ok(written)
    }
}

fn other<E: std::error::Error + Send + Sync + 'static>(err: E) -> tokio_rusqlite::Error {
    tokio_rusqlite::Error::Other(Box::new(err))
}

fn read_widget(
    conn: &rusqlite::Connection,
    tab_id: i64,
    widget_id: i64,
) -> tokio_rusqlite::Result<Widget> {
    let (id, kind, config): (i64, String, String) =
        conn.query_row(SELECT_WIDGET, params![widget_id, tab_id], |row| {
            Ok((row.get(0)?, row.get(1)?, row.get(2)?))
        })?;
    let kind: WidgetKind = kind.parse().map_err(other)?;
    let config = WidgetConfig::from_json(kind, &config).map_err(other)?;
    Ok(Widget::new(id, config))
}

fn user_from_row(row: &Row) -> rusqlite::Result<User> {
    Ok(User {
        user_id: row.get(0)?,
        display_name: row.get(1)?,
        email: row.get(2)?,
        is_admin: row.get(3)?,
    })
}

fn feed_from_row(row: &Row) -> rusqlite::Result<Feed> {
    Ok(Feed {
        id: row.get(0)?,
        url: row.get(1)?,
        next_retrieval: parse_datetime_or_epoch(&row.get::<_, String>(2)?),
        title: row.get::<_, Option<String>>(3)?.unwrap_or_default(),
    })
}

fn feed_item_from_row(row: &Row) -> rusqlite::Result<FeedItem> {
    Ok(FeedItem {
        guid: row.get(0)?,
        title: row.get(1)?,
        published: parse_datetime(&row.get::<_, String>(2)?).unwrap_or_else(Utc::now),
        link: row.get(3)?,
    })
}

fn account_from_row(row: &Row) -> rusqlite::Result<(ExternalAccount, String)> {
    Ok((
        ExternalAccount {
            id: row.get(0)?,
            provider_name: row.get(1)?,
            account_id: row.get(2)?,
            token: Token::default(),
        },
        row.get(3)?,
    ))
}

fn with_token(mut account: ExternalAccount, token: &str) -> Result<ExternalAccount> {
    account.token = serde_json::from_str(token).context("unmarshaling account token failed")?;
    Ok(account)
}

fn email_item_from_row(row: &Row) -> rusqlite::Result<EmailItem> {
    Ok(EmailItem {
        item: ItemForUser {
            item: FeedItem {
                guid: row.get(0)?,
                title: row.get(1)?,
                published: parse_datetime(&row.get::<_, String>(2)?).unwrap_or_else(Utc::now),
                link: row.get(3)?,
            },
            read: row.get(6)?,
        },
        from: row.get(4)?,
        snippet: row.get(5)?,
    })
}
