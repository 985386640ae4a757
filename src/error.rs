// Error taxonomy for the cache engine (spec section 7).

use thiserror::Error;

/// Errors surfaced by the cache engine's public API.
///
/// `Clone` is required because a single loader failure must be delivered to
/// every single-flight joiner waiting on the same key without re-running the
/// query; non-`Clone` sources (`sqlx::Error`) are flattened into owned
/// `String` payloads at the point of conversion.
#[derive(Error, Debug, Clone)]
pub enum CacheError {
    #[error("validation error: {0}")]
    Validation(String),

    #[error("unknown cache: {0}")]
    UnknownCache(String),

    #[error("duplicate cache name: {0}")]
    DuplicateName(String),

    #[error("connection error: {0}")]
    ConnectionError(String),

    #[error("pool exhausted: {0}")]
    PoolExhausted(String),

    #[error("query error: {0}")]
    QueryError(String),

    #[error("column {column:?} not found in result set; available columns: {available:?}")]
    ColumnMissing {
        column: String,
        available: Vec<String>,
    },

    #[error("internal error: {0}")]
    Internal(String),
}

impl CacheError {
    pub fn validation(msg: impl Into<String>) -> Self {
        CacheError::Validation(msg.into())
    }

    pub fn unknown_cache(id_or_name: impl Into<String>) -> Self {
        CacheError::UnknownCache(id_or_name.into())
    }
}

impl From<sqlx::Error> for CacheError {
    fn from(err: sqlx::Error) -> Self {
        match err {
            sqlx::Error::PoolTimedOut => CacheError::PoolExhausted(err.to_string()),
            sqlx::Error::PoolClosed | sqlx::Error::Io(_) => {
                CacheError::ConnectionError(err.to_string())
            }
            other => CacheError::QueryError(other.to_string()),
        }
    }
}

pub type Result<T> = std::result::Result<T, CacheError>;
