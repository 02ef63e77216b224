//! File-backed cache: data file `<id>` plus sidecar `<id>.expire`.

use std::path::{Path, PathBuf};

use chrono::{DateTime, Utc};

use crate::error::CacheError;
use crate::store::{CacheRecord, CacheStore};

/// Cache entries stored as plain files under one directory.
#[derive(Debug, Clone)]
pub struct FileCacheStore {
    dir: PathBuf,
}

impl FileCacheStore {
    /// Creates a store rooted at `dir`. The directory is created on first write.
    pub fn new(dir: impl Into<PathBuf>) -> Self {
        Self { dir: dir.into() }
    }

    pub fn dir(&self) -> &Path {
        &self.dir
    }

    fn data_path(&self, id: &str) -> Option<PathBuf> {
        is_safe_id(id).then(|| self.dir.join(id))
    }

    fn expire_path(&self, id: &str) -> Option<PathBuf> {
        is_safe_id(id).then(|| self.dir.join(format!("{id}.expire")))
    }
}

fn is_safe_id(id: &str) -> bool {
    !id.is_empty()
        && id != "."
        && id != ".."
        && !id.contains(['/', '\\'])
        && !id.ends_with(".expire")
}

/// Parses `"<unix-expiry>[:<tag>]"`.
fn parse_expire(contents: &str) -> Option<(DateTime<Utc>, Option<String>)> {
    let line = contents.trim_end_matches(['\n', '\r']);
    let (timestamp, tag) = match line.split_once(':') {
        Some((timestamp, tag)) => (timestamp, Some(tag.to_string())),
        None => (line, None),
    };
    let seconds: i64 = timestamp.trim().parse().ok()?;
    Some((DateTime::from_timestamp(seconds, 0)?, tag))
}

fn format_expire(expires_at: DateTime<Utc>, tag: Option<&str>) -> String {
    match tag {
        Some(tag) => format!("{}:{tag}", expires_at.timestamp()),
        None => expires_at.timestamp().to_string(),
    }
}

impl CacheStore for FileCacheStore {
    fn lookup(&self, id: &str) -> Option<CacheRecord> {
        let expire_path = self.expire_path(id)?;
        let contents = std::fs::read_to_string(&expire_path).ok()?;
        let Some((expires_at, tag)) = parse_expire(&contents) else {
            tracing::debug!(path = %expire_path.display(), "unparseable cache expiry file");
            return None;
        };
        let data = std::fs::read(self.data_path(id)?).ok()?;
        Some(CacheRecord {
            data,
            expires_at,
            tag,
        })
    }

    fn put(
        &self,
        id: &str,
        data: &[u8],
        expires_at: DateTime<Utc>,
        tag: Option<&str>,
    ) -> Result<(), CacheError> {
        let (Some(data_path), Some(expire_path)) = (self.data_path(id), self.expire_path(id)) else {
            return Err(CacheError::InvalidId(id.to_string()));
        };
        std::fs::create_dir_all(&self.dir)?;
        std::fs::write(&data_path, data)?;
        std::fs::write(&expire_path, format_expire(expires_at, tag))?;
        tracing::debug!(path = %data_path.display(), expires_at = %expires_at, "cache entry written");
        Ok(())
    }
}
