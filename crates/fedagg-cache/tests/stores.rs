use std::sync::Arc;

use chrono::{Duration, Utc};
use fedagg_cache::{
    create_pool, CacheStore, FileCacheStore, PoolSettings, SqliteCacheStore,
};
use tempfile::TempDir;

fn in_memory_sqlite() -> SqliteCacheStore {
    let settings = PoolSettings {
        pool_max_size: 1,
        ..PoolSettings::default()
    };
    SqliteCacheStore::from_pool(create_pool(":memory:", settings).unwrap()).unwrap()
}

/// Behaviour every backend must share.
fn exercise_store(store: &dyn CacheStore) {
    let now = Utc::now();
    let expiry = now + Duration::hours(1);

    assert!(store.lookup("abc").is_none());
    assert!(store.get("abc", Some("tag")).is_none());
    assert!(store.get_stale("abc", Some("tag")).is_none());

    store.put("abc", b"payload", expiry, Some("tag")).unwrap();

    assert!(store.is_valid("abc", Some("tag")));
    assert_eq!(store.get("abc", Some("tag")).as_deref(), Some(&b"payload"[..]));

    // Monotonic validity: valid before expiry, invalid from expiry on.
    let expires = store.lookup("abc").unwrap().expires_at;
    assert!(store.is_valid_at("abc", Some("tag"), expires - Duration::seconds(1)));
    assert!(!store.is_valid_at("abc", Some("tag"), expires));
    assert!(!store.is_valid_at("abc", Some("tag"), expires + Duration::days(1)));

    // Tag mismatch reads as absent, for the stale fallback as well.
    assert!(!store.is_valid("abc", Some("other")));
    assert!(!store.is_valid("abc", None));
    assert!(store.get("abc", Some("other")).is_none());
    assert!(store.get_stale("abc", Some("other")).is_none());
    assert!(store.get_stale("abc", None).is_none());
    assert_eq!(store.get_stale("abc", Some("tag")).as_deref(), Some(&b"payload"[..]));

    // Overwrite replaces data, expiry and tag.
    store.put("abc", b"second", now - Duration::seconds(5), None).unwrap();
    assert!(!store.is_valid("abc", None));
    assert!(store.get("abc", None).is_none());
    assert_eq!(store.get_stale("abc", None).as_deref(), Some(&b"second"[..]));
    assert!(store.get_stale("abc", Some("tag")).is_none());
    let record = store.lookup("abc").unwrap();
    assert!(record.tag.is_none());
}

#[test]
fn file_store_contract() {
    let dir = TempDir::new().unwrap();
    exercise_store(&FileCacheStore::new(dir.path().join("cache")));
}

#[test]
fn sqlite_store_contract() {
    exercise_store(&in_memory_sqlite());
}

#[test]
fn sqlite_store_persists_across_reopen() {
    let dir = TempDir::new().unwrap();
    let path = dir.path().join("cache.sqlite");
    let path = path.to_str().unwrap();
    let expiry = Utc::now() + Duration::minutes(5);
    {
        let store = SqliteCacheStore::open(path, PoolSettings::default()).unwrap();
        store.put("k", b"v", expiry, Some("t")).unwrap();
    }
    let reopened = SqliteCacheStore::open(path, PoolSettings::default()).unwrap();
    assert_eq!(reopened.get("k", Some("t")).as_deref(), Some(&b"v"[..]));
}

#[test]
fn file_store_layout_matches_sidecar_format() {
    let dir = TempDir::new().unwrap();
    let store = FileCacheStore::new(dir.path());
    let expiry = chrono::DateTime::from_timestamp(4_102_444_800, 0).unwrap();
    store.put("feed", b"<xml/>", expiry, Some("deadbeef")).unwrap();

    assert_eq!(std::fs::read(dir.path().join("feed")).unwrap(), b"<xml/>");
    assert_eq!(
        std::fs::read_to_string(dir.path().join("feed.expire")).unwrap(),
        "4102444800:deadbeef"
    );
}

#[test]
fn file_store_treats_broken_sidecar_as_absent() {
    let dir = TempDir::new().unwrap();
    std::fs::write(dir.path().join("feed"), b"data").unwrap();
    let store = FileCacheStore::new(dir.path());

    // No sidecar at all: the producing configuration is unknown.
    assert!(store.lookup("feed").is_none());
    assert!(!store.is_valid("feed", None));
    assert!(store.get_stale("feed", None).is_none());

    std::fs::write(dir.path().join("feed.expire"), "not-a-number:tag").unwrap();
    assert!(store.lookup("feed").is_none());
    assert!(store.get("feed", Some("tag")).is_none());
}

#[test]
fn file_store_sidecar_without_data_is_absent() {
    let dir = TempDir::new().unwrap();
    std::fs::write(dir.path().join("feed.expire"), "4102444800:tag").unwrap();
    let store = FileCacheStore::new(dir.path());
    assert!(!store.is_valid("feed", Some("tag")));
    assert!(store.get_stale("feed", Some("tag")).is_none());
}

#[test]
fn file_store_refuses_path_ids() {
    let dir = TempDir::new().unwrap();
    let store = FileCacheStore::new(dir.path());
    let err = store
        .put("../escape", b"x", Utc::now() + Duration::hours(1), None)
        .unwrap_err();
    assert!(matches!(err, fedagg_cache::CacheError::InvalidId(_)));
}

#[test]
fn stores_are_usable_as_shared_trait_objects() {
    let dir = TempDir::new().unwrap();
    let store: Arc<dyn CacheStore> = Arc::new(FileCacheStore::new(dir.path()));
    let writer = Arc::clone(&store);
    std::thread::spawn(move || {
        writer
            .put("shared", b"1", Utc::now() + Duration::hours(1), Some("t"))
            .unwrap();
    })
    .join()
    .unwrap();
    assert!(store.is_valid("shared", Some("t")));
}
