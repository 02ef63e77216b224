//! Connection pool for the SQLite cache backend.
//!
//! The cache database is shared by the long-running server and by
//! `fedagg-refresh` runs started from cron, so every connection is set up
//! for several processes touching one file: WAL lets `/get` readers keep
//! serving while a refresh writes, and the busy timeout makes a second
//! writer wait for the lock instead of failing with `SQLITE_BUSY`.

use r2d2::Pool;
use r2d2_sqlite::SqliteConnectionManager;
use rusqlite::{Connection, OpenFlags};

use crate::error::CacheError;

/// Runtime tunables for SQLite connection behavior.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PoolSettings {
    /// How long a writer waits for another process's lock, in milliseconds.
    /// Should exceed the longest refresh write.
    pub busy_timeout_ms: u64,

    /// Maximum number of pooled SQLite connections.
    pub pool_max_size: u32,
}

impl Default for PoolSettings {
    fn default() -> Self {
        Self {
            busy_timeout_ms: 5_000,
            pool_max_size: 4,
        }
    }
}

/// Pooled connections to the cache database.
pub type CachePool = Pool<SqliteConnectionManager>;

/// Applies the cache's per-connection pragmas.
///
/// `synchronous = NORMAL` may lose the last committed entry on power loss;
/// the next fetch rewrites it, so cache writes skip the extra fsync.
fn configure_connection(conn: &Connection, settings: PoolSettings) -> rusqlite::Result<()> {
    // In-memory databases report "memory".
    let journal_mode: String =
        conn.query_row("PRAGMA journal_mode = WAL;", [], |row| row.get(0))?;
    if journal_mode != "wal" && journal_mode != "memory" {
        return Err(rusqlite::Error::SqliteFailure(
            rusqlite::ffi::Error::new(rusqlite::ffi::SQLITE_ERROR),
            Some(format!(
                "cache database refused WAL journal mode (got {journal_mode}); \
                 is it on a network filesystem?"
            )),
        ));
    }
    conn.execute_batch(&format!(
        "PRAGMA synchronous = NORMAL;
         PRAGMA busy_timeout = {};",
        settings.busy_timeout_ms
    ))
}

/// Opens a pool over the cache database at `db_path`.
///
/// `db_path` may be `:memory:`; every pooled connection then sees its own
/// database, so tests use a pool of size one.
///
/// # Errors
///
/// Returns `CacheError::Pool` if the pool cannot be built.
pub fn create_pool(db_path: &str, settings: PoolSettings) -> Result<CachePool, CacheError> {
    let flags = OpenFlags::SQLITE_OPEN_READ_WRITE
        | OpenFlags::SQLITE_OPEN_CREATE
        | OpenFlags::SQLITE_OPEN_FULL_MUTEX;

    let manager = SqliteConnectionManager::file(db_path)
        .with_flags(flags)
        .with_init(move |conn| configure_connection(conn, settings));

    Ok(Pool::builder()
        .max_size(settings.pool_max_size)
        .build(manager)?)
}
