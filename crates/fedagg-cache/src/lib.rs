//! Cache stores for per-source and aggregate metadata.
//!
//! Every entry is a blob keyed by an opaque id, with an expiry and an
//! optional tag naming the configuration that produced it. An entry is
//! valid only while `now < expiry` and its tag equals the tag presented at
//! lookup; anything else reads as absent, never as an error.
//!
//! Two backends implement [`CacheStore`]:
//!
//! - [`FileCacheStore`]: one data file per id plus a sidecar `<id>.expire`
//!   holding `"<unix-expiry>[:<tag>]"`. Several processes may share the
//!   directory; concurrent writers for the same tag are last-writer-wins.
//! - [`SqliteCacheStore`]: a single `cache_entries` table behind an `r2d2`
//!   pool in WAL mode, created by an embedded migration.

mod error;
mod file;
mod migrations;
mod pool;
mod sqlite;
mod store;

pub use error::CacheError;
pub use file::FileCacheStore;
pub use migrations::{run_migrations, MigrationError};
pub use pool::{create_pool, CachePool, PoolSettings};
pub use sqlite::SqliteCacheStore;
pub use store::{CacheRecord, CacheStore};
