//! Federation metadata aggregation engine.
//!
//! An [`Aggregator`] owns one [`EntitySource`] per configured upstream,
//! merges their metadata into a single flat `EntitiesDescriptor`, removes
//! excluded entities, applies role/protocol filters, signs the result and
//! caches it. Sources keep their own cache entries so a feed can still be
//! served, slightly outdated, while an upstream is down.
//!
//! Aggregators are built per request or refresh run from an
//! [`AggregatorRegistry`], which holds the explicit configuration map and
//! the shared cache store.

mod aggregator;
mod cache;
mod error;
mod filter;
mod hash;
mod registry;
mod signer;
mod source;

use std::path::{Path, PathBuf};

pub use aggregator::{Aggregator, FeedSelection};
pub use cache::CacheHandle;
pub use error::AggregatorError;
pub use filter::FilterSet;
pub use hash::sha256_hex;
pub use registry::{AggregatorRegistry, RefreshSummary};
pub use signer::MetadataSigner;
pub use source::{EntitySource, FetchError, FetchSettings, FetchState};

/// Resolves `path` against `base` unless it is absolute.
pub fn resolve_path(base: Option<&Path>, path: &str) -> PathBuf {
    let candidate = Path::new(path);
    match base {
        Some(base) if candidate.is_relative() => base.join(candidate),
        _ => candidate.to_path_buf(),
    }
}
