//! Async access to a blocking [`CacheStore`].

use std::sync::Arc;

use chrono::{DateTime, Utc};
use fedagg_cache::{CacheError, CacheStore};

/// Runs store operations on the blocking pool.
#[derive(Clone)]
pub struct CacheHandle {
    store: Arc<dyn CacheStore>,
}

impl CacheHandle {
    pub fn new(store: Arc<dyn CacheStore>) -> Self {
        Self { store }
    }

    pub async fn is_valid(&self, id: &str, tag: &str) -> bool {
        let (store, id, tag) = (Arc::clone(&self.store), id.to_string(), tag.to_string());
        tokio::task::spawn_blocking(move || store.is_valid(&id, Some(&tag)))
            .await
            .unwrap_or(false)
    }

    pub async fn get(&self, id: &str, tag: &str) -> Option<Vec<u8>> {
        let (store, id, tag) = (Arc::clone(&self.store), id.to_string(), tag.to_string());
        tokio::task::spawn_blocking(move || store.get(&id, Some(&tag)))
            .await
            .ok()
            .flatten()
    }

    /// Data stored under `id` and `tag`, even when expired.
    pub async fn get_stale(&self, id: &str, tag: &str) -> Option<Vec<u8>> {
        let (store, id, tag) = (Arc::clone(&self.store), id.to_string(), tag.to_string());
        tokio::task::spawn_blocking(move || store.get_stale(&id, Some(&tag)))
            .await
            .ok()
            .flatten()
    }

    /// Stores an entry; failures are logged at warn and otherwise ignored.
    pub async fn put(&self, id: &str, data: Vec<u8>, expires_at: DateTime<Utc>, tag: &str) {
        let (store, key, tag) = (Arc::clone(&self.store), id.to_string(), tag.to_string());
        let result = tokio::task::spawn_blocking(move || {
            store.put(&key, &data, expires_at, Some(&tag))
        })
        .await
        .unwrap_or_else(|e| Err(CacheError::Io(std::io::Error::other(e.to_string()))));
        if let Err(e) = result {
            tracing::warn!(cache_id = %id, error = %e, "failed to write cache entry");
        }
    }
}
