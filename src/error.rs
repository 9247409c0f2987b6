use thiserror::Error;

pub type Result<T> = std::result::Result<T, AppError>;

#[derive(Debug, Error)]
pub enum AppError {
    #[error("not found: {0}")]
    NotFound(String),

    #[error("not authorized: {0}")]
    NotAuthorized(String),

    #[error("invalid input: {0}")]
    InvalidInput(String),

    #[error("transaction misuse: {0}")]
    TransactionMisuse(String),

    #[error("{operation} is not implemented by the {backend} backend")]
    NotImplemented {
        backend: &'static str,
        operation: &'static str,
    },

    #[error("operation cancelled: {0}")]
    Cancelled(String),

    #[error("{context}: {source}")]
    Context {
        context: String,
        #[source]
        source: Box<AppError>,
    },

    #[error("database error: {0}")]
    Database(#[from] rusqlite::Error),

    #[error("database error: {0}")]
    Connection(#[from] tokio_rusqlite::Error),

    #[error("database error: {0}")]
    Sql(#[from] sqlx::Error),

    #[error("HTTP error: {0}")]
    Http(#[from] reqwest::Error),

    #[error("feed parse error: {0}")]
    FeedParse(#[from] feed_rs::parser::ParseFeedError),

    #[error("provider error: {0}")]
    Provider(String),

    #[error("serialization error: {0}")]
    Json(#[from] serde_json::Error),

    #[error("configuration error: {0}")]
    Config(String),

    #[error("config file error: {0}")]
    Toml(#[from] toml::de::Error),

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error(transparent)]
    Other(#[from] anyhow::Error),
}

/// Coarse classification used at the boundary of the core.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorKind {
    NotFound,
    NotAuthorized,
    InvalidInput,
    TransactionMisuse,
    NotImplemented,
    Cancelled,
    Internal,
}

impl AppError {
    /// Follows `Context` layers down to the error that started it all.
    pub fn root(&self) -> &AppError {
        match self {
            AppError::Context { source, .. } => source.root(),
            other => other,
        }
    }

    pub fn kind(&self) -> ErrorKind {
        match self.root() {
            AppError::NotFound(_) => ErrorKind::NotFound,
            AppError::NotAuthorized(_) => ErrorKind::NotAuthorized,
            AppError::InvalidInput(_) => ErrorKind::InvalidInput,
            AppError::TransactionMisuse(_) => ErrorKind::TransactionMisuse,
            AppError::NotImplemented { .. } => ErrorKind::NotImplemented,
            AppError::Cancelled(_) => ErrorKind::Cancelled,
            root if root.is_missing_row() => ErrorKind::NotFound,
            _ => ErrorKind::Internal,
        }
    }

    pub fn is_not_found(&self) -> bool {
        self.kind() == ErrorKind::NotFound
    }

    pub fn is_not_authorized(&self) -> bool {
        self.kind() == ErrorKind::NotAuthorized
    }

    /// Message safe to hand to a client: storage and collaborator details stay inside.
    pub fn public_message(&self) -> String {
        match self.kind() {
            ErrorKind::Internal => "internal error".to_string(),
            _ => self.root().to_string(),
        }
    }

    /// True for the "no rows" errors of the SQL drivers.
    pub(crate) fn is_missing_row(&self) -> bool {
        matches!(
            self,
            AppError::Database(rusqlite::Error::QueryReturnedNoRows)
                | AppError::Connection(tokio_rusqlite::Error::Rusqlite(
                    rusqlite::Error::QueryReturnedNoRows
                ))
                | AppError::Sql(sqlx::Error::RowNotFound)
        )
    }
}

/// Adds an operation description to an error while keeping its root cause reachable.
pub trait ResultExt<T> {
    fn context<C: Into<String>>(self, context: C) -> Result<T>;

    fn with_context<C: Into<String>, F: FnOnce() -> C>(self, f: F) -> Result<T>;
}

impl<T, E: Into<AppError>> ResultExt<T> for std::result::Result<T, E> {
    fn context<C: Into<String>>(self, context: C) -> Result<T> {
        self.map_err(|err| AppError::Context {
            context: context.into(),
            source: Box::new(err.into()),
        })
    }

    fn with_context<C: Into<String>, F: FnOnce() -> C>(self, f: F) -> Result<T> {
        self.map_err(|err| AppError::Context {
            context: f().into(),
            source: Box::new(err.into()),
        })
    }
}
