//! SQLite-backed cache store.

use chrono::{DateTime, Utc};
use rusqlite::{params, OptionalExtension};

use crate::error::CacheError;
use crate::migrations::run_migrations;
use crate::pool::{create_pool, CachePool, PoolSettings};
use crate::store::{CacheRecord, CacheStore};

/// Cache entries in the `cache_entries` table of a SQLite database.
#[derive(Clone)]
pub struct SqliteCacheStore {
    pool: CachePool,
}

impl std::fmt::Debug for SqliteCacheStore {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SqliteCacheStore")
            .field("max_size", &self.pool.max_size())
            .finish()
    }
}

impl SqliteCacheStore {
    /// Opens (creating if needed) the database at `path` and applies
    /// pending migrations.
    ///
    /// # Errors
    ///
    /// Returns `CacheError` if the pool cannot be created or a migration fails.
    pub fn open(path: &str, settings: PoolSettings) -> Result<Self, CacheError> {
        let pool = create_pool(path, settings)?;
        Self::from_pool(pool)
    }

    /// Wraps an existing pool, applying pending migrations.
    ///
    /// # Errors
    ///
    /// Returns `CacheError` if no connection is available or a migration fails.
    pub fn from_pool(pool: CachePool) -> Result<Self, CacheError> {
        let conn = pool.get()?;
        run_migrations(&conn)?;
        drop(conn);
        Ok(Self { pool })
    }

    fn read(&self, id: &str) -> Result<Option<CacheRecord>, CacheError> {
        let conn = self.pool.get()?;
        let row = conn
            .query_row(
                "SELECT data, expires_at, tag FROM cache_entries WHERE id = ?1",
                [id],
                |row| {
                    Ok((
                        row.get::<_, Vec<u8>>(0)?,
                        row.get::<_, i64>(1)?,
                        row.get::<_, Option<String>>(2)?,
                    ))
                },
            )
            .optional()?;
        Ok(row.and_then(|(data, expires_at, tag)| {
            DateTime::from_timestamp(expires_at, 0).map(|expires_at| CacheRecord {
                data,
                expires_at,
                tag,
            })
        }))
    }
}

impl CacheStore for SqliteCacheStore {
    fn lookup(&self, id: &str) -> Option<CacheRecord> {
        match self.read(id) {
            Ok(record) => record,
            Err(e) => {
                tracing::warn!(id, error = %e, "cache lookup failed");
                None
            }
        }
    }

    fn put(
        &self,
        id: &str,
        data: &[u8],
        expires_at: DateTime<Utc>,
        tag: Option<&str>,
    ) -> Result<(), CacheError> {
        let conn = self.pool.get()?;
        conn.execute(
            "INSERT INTO cache_entries (id, data, expires_at, tag) VALUES (?1, ?2, ?3, ?4)
             ON CONFLICT(id) DO UPDATE SET
                data = excluded.data,
                expires_at = excluded.expires_at,
                tag = excluded.tag",
            params![id, data, expires_at.timestamp(), tag],
        )?;
        Ok(())
    }
}
