pub mod layout;

mod documents;
mod locked;
mod pool;
mod repository;
mod schema;
mod sqlite;

#[cfg(test)]
mod conformance;

use std::sync::Arc;

use chrono::{DateTime, Utc};

use crate::config::{Backend, StorageConfig};
use crate::error::{Result, ResultExt};

pub use documents::DocumentRepository;
pub use locked::Locked;
pub use pool::PoolRepository;
pub use repository::{run_in_transaction, Repository, TxWork};
pub use sqlite::SqliteRepository;

/// Opens the configured backend, wrapped in the concurrency guard when asked to.
pub async fn open(config: &StorageConfig) -> Result<Arc<dyn Repository>> {
    if let Some(parent) = config.db_path.parent() {
        if config.backend != Backend::Documents && !parent.as_os_str().is_empty() {
            std::fs::create_dir_all(parent)
                .with_context(|| format!("creating {} failed", parent.display()))?;
        }
    }

    let lock = config.use_lock();
    let repo: Arc<dyn Repository> = match (config.backend, lock) {
        (Backend::Embedded, true) => {
            Arc::new(Locked::new(SqliteRepository::open(&config.db_path).await?))
        }
        (Backend::Embedded, false) => Arc::new(SqliteRepository::open(&config.db_path).await?),
        (Backend::Pooled, true) => Arc::new(Locked::new(
            PoolRepository::open(&config.db_path, config.max_connections).await?,
        )),
        (Backend::Pooled, false) => {
            Arc::new(PoolRepository::open(&config.db_path, config.max_connections).await?)
        }
        (Backend::Documents, true) => Arc::new(Locked::new(DocumentRepository::new())),
        (Backend::Documents, false) => Arc::new(DocumentRepository::new()),
    };

    tracing::info!(
        backend = repo.backend(),
        locked = lock,
        "Opened storage at {}",
        config.db_path.display()
    );
    Ok(repo)
}

pub(crate) fn parse_datetime(s: &str) -> Option<DateTime<Utc>> {
    // Try RFC3339 first (e.g., "2026-01-11T12:34:56+00:00")
    if let Ok(dt) = DateTime::parse_from_rfc3339(s) {
        return Some(dt.with_timezone(&Utc));
    }
    // Try SQLite datetime format (e.g., "2026-01-11 12:34:56")
    if let Ok(naive) = chrono::NaiveDateTime::parse_from_str(s, "%Y-%m-%d %H:%M:%S") {
        return Some(naive.and_utc());
    }
    None
}

/// Unreadable retrieval times count as long past, so the feed gets refreshed.
pub(crate) fn parse_datetime_or_epoch(s: &str) -> DateTime<Utc> {
    parse_datetime(s).unwrap_or(DateTime::<Utc>::UNIX_EPOCH)
}
