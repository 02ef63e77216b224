//! The storage interface the aggregation engine depends on.

use chrono::{DateTime, Utc};

use crate::error::CacheError;

/// One stored entry.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CacheRecord {
    pub data: Vec<u8>,
    pub expires_at: DateTime<Utc>,
    pub tag: Option<String>,
}

impl CacheRecord {
    /// True when the entry has not expired at `now` and carries exactly `tag`.
    pub fn is_valid_at(&self, tag: Option<&str>, now: DateTime<Utc>) -> bool {
        now < self.expires_at && self.has_tag(tag)
    }

    /// True when the entry was written under exactly `tag`. An absent tag
    /// only matches an absent tag.
    pub fn has_tag(&self, tag: Option<&str>) -> bool {
        self.tag.as_deref() == tag
    }
}

/// A key/value store with expiry and tag invalidation.
///
/// Implementations only provide raw [`lookup`](CacheStore::lookup) and
/// [`put`](CacheStore::put); validity checks are shared.
pub trait CacheStore: Send + Sync {
    /// Returns the stored entry regardless of expiry or tag, or `None` when
    /// there is none or it cannot be read.
    fn lookup(&self, id: &str) -> Option<CacheRecord>;

    /// Stores `data` under `id`, replacing any previous entry.
    ///
    /// # Errors
    ///
    /// Returns `CacheError` when the entry cannot be written.
    fn put(
        &self,
        id: &str,
        data: &[u8],
        expires_at: DateTime<Utc>,
        tag: Option<&str>,
    ) -> Result<(), CacheError>;

    fn is_valid_at(&self, id: &str, tag: Option<&str>, now: DateTime<Utc>) -> bool {
        self.lookup(id)
            .is_some_and(|record| record.is_valid_at(tag, now))
    }

    fn is_valid(&self, id: &str, tag: Option<&str>) -> bool {
        self.is_valid_at(id, tag, Utc::now())
    }

    /// Returns the data of a valid entry.
    fn get(&self, id: &str, tag: Option<&str>) -> Option<Vec<u8>> {
        let now = Utc::now();
        self.lookup(id)
            .filter(|record| record.is_valid_at(tag, now))
            .map(|record| record.data)
    }

    /// Returns the data stored under `id` and `tag`, expired or not.
    ///
    /// An entry written under another tag was produced by a different
    /// configuration and reads as absent here too.
    fn get_stale(&self, id: &str, tag: Option<&str>) -> Option<Vec<u8>> {
        self.lookup(id)
            .filter(|record| record.has_tag(tag))
            .map(|record| record.data)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Duration;

    fn record(tag: Option<&str>) -> CacheRecord {
        CacheRecord {
            data: b"x".to_vec(),
            expires_at: DateTime::from_timestamp(1_000, 0).unwrap(),
            tag: tag.map(str::to_string),
        }
    }

    #[test]
    fn valid_strictly_before_expiry() {
        let r = record(Some("t"));
        let expiry = r.expires_at;
        assert!(r.is_valid_at(Some("t"), expiry - Duration::seconds(1)));
        assert!(!r.is_valid_at(Some("t"), expiry));
        assert!(!r.is_valid_at(Some("t"), expiry + Duration::seconds(1)));
    }

    #[test]
    fn tag_must_match_exactly() {
        let now = DateTime::from_timestamp(0, 0).unwrap();
        assert!(!record(Some("t")).is_valid_at(Some("u"), now));
        assert!(!record(Some("t")).is_valid_at(None, now));
        assert!(!record(None).is_valid_at(Some("t"), now));
        assert!(record(None).is_valid_at(None, now));
    }

    #[test]
    fn tag_check_ignores_expiry() {
        assert!(record(Some("t")).has_tag(Some("t")));
        assert!(!record(Some("t")).has_tag(Some("u")));
        assert!(!record(Some("t")).has_tag(None));
        assert!(record(None).has_tag(None));
    }
}
