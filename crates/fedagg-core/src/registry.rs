//! Aggregator factory over an explicit configuration map.

use std::collections::BTreeMap;
use std::path::PathBuf;
use std::sync::Arc;

use fedagg_cache::CacheStore;
use fedagg_types::AggregatorConfig;

use crate::aggregator::Aggregator;
use crate::error::AggregatorError;
use crate::source::FetchSettings;

/// Every configured feed plus what is needed to construct them.
#[derive(Clone)]
pub struct AggregatorRegistry {
    aggregators: BTreeMap<String, AggregatorConfig>,
    cert_dir: Option<PathBuf>,
    fetch: FetchSettings,
    store: Arc<dyn CacheStore>,
}

impl std::fmt::Debug for AggregatorRegistry {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("AggregatorRegistry")
            .field("aggregators", &self.aggregators.keys().collect::<Vec<_>>())
            .field("cert_dir", &self.cert_dir)
            .field("fetch", &self.fetch)
            .finish_non_exhaustive()
    }
}

/// Result of refreshing a batch of aggregators.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct RefreshSummary {
    pub refreshed: Vec<String>,
    /// Aggregator id and error message.
    pub failed: Vec<(String, String)>,
}

impl RefreshSummary {
    pub fn is_success(&self) -> bool {
        self.failed.is_empty()
    }
}

impl AggregatorRegistry {
    pub fn new(aggregators: BTreeMap<String, AggregatorConfig>, store: Arc<dyn CacheStore>) -> Self {
        Self {
            aggregators,
            cert_dir: None,
            fetch: FetchSettings::default(),
            store,
        }
    }

    /// Directory relative key, certificate and CA paths resolve against.
    pub fn with_cert_dir(mut self, cert_dir: impl Into<PathBuf>) -> Self {
        self.cert_dir = Some(cert_dir.into());
        self
    }

    pub fn with_fetch_settings(mut self, fetch: FetchSettings) -> Self {
        self.fetch = fetch;
        self
    }

    pub fn ids(&self) -> impl Iterator<Item = &str> {
        self.aggregators.keys().map(String::as_str)
    }

    pub fn config(&self, id: &str) -> Option<&AggregatorConfig> {
        self.aggregators.get(id)
    }

    /// Ids of the aggregators whose `cron_tag` equals `tag`.
    pub fn ids_for_tag(&self, tag: &str) -> Vec<String> {
        self.aggregators
            .iter()
            .filter(|(_, config)| config.cron_tag.as_deref() == Some(tag))
            .map(|(id, _)| id.clone())
            .collect()
    }

    /// Constructs the aggregator configured under `id`.
    ///
    /// # Errors
    ///
    /// Returns `AggregatorError::NotFound` for an unknown id and the
    /// construction errors of [`Aggregator::new`].
    pub fn get_aggregator(&self, id: &str) -> Result<Aggregator, AggregatorError> {
        let config = self
            .aggregators
            .get(id)
            .ok_or_else(|| AggregatorError::NotFound(id.to_string()))?;
        Aggregator::new(
            id,
            config,
            self.cert_dir.as_deref(),
            &self.fetch,
            Arc::clone(&self.store),
        )
    }

    /// Runs [`Aggregator::update_cache`] for each id in turn, collecting
    /// failures instead of stopping at the first one.
    pub async fn refresh<I, S>(&self, ids: I) -> RefreshSummary
    where
        I: IntoIterator<Item = S>,
        S: AsRef<str>,
    {
        let mut summary = RefreshSummary::default();
        for id in ids {
            let id = id.as_ref();
            let result = match self.get_aggregator(id) {
                Ok(mut aggregator) => aggregator.update_cache().await.map(|_| ()),
                Err(e) => Err(e),
            };
            match result {
                Ok(()) => {
                    tracing::info!(aggregator = %id, "refreshed aggregate");
                    summary.refreshed.push(id.to_string());
                }
                Err(e) => {
                    tracing::error!(aggregator = %id, error = %e, "failed to refresh aggregate");
                    summary.failed.push((id.to_string(), e.to_string()));
                }
            }
        }
        summary
    }
}
