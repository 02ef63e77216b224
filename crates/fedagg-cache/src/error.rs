use crate::migrations::MigrationError;

/// Errors raised when writing to or opening a cache store.
///
/// Lookups never fail: an unreadable entry is reported as absent.
#[derive(Debug, thiserror::Error)]
pub enum CacheError {
    #[error("cache I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("cache database error: {0}")]
    Database(#[from] rusqlite::Error),

    #[error("failed to create cache connection pool: {0}")]
    Pool(#[from] r2d2::Error),

    #[error(transparent)]
    Migration(#[from] MigrationError),

    /// The id cannot be used as a cache key.
    #[error("invalid cache id '{0}'")]
    InvalidId(String),
}
