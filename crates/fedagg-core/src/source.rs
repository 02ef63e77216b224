//! One upstream metadata source with its own cache entry.

use std::path::Path;
use std::time::Duration;

use chrono::{DateTime, Utc};
use fedagg_metadata::{parse_document, MetadataError, MetadataNode};
use fedagg_types::SourceConfig;
use fedagg_xmlsec::{verify_enveloped, RsaPublicKey, X509Certificate, XmlSecError};
use reqwest::header;
use url::Url;

use crate::cache::CacheHandle;
use crate::error::AggregatorError;
use crate::hash::sha256_hex;
use crate::resolve_path;

/// Upper bound on how long a fetched source document is cached.
const MAX_SOURCE_LIFETIME_HOURS: i64 = 24;

/// HTTP client settings shared by every source.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FetchSettings {
    /// Per-request timeout; an expired request counts as a failed fetch.
    pub timeout: Duration,
    pub user_agent: String,
}

impl Default for FetchSettings {
    fn default() -> Self {
        Self {
            timeout: Duration::from_secs(30),
            user_agent: format!("fedagg/{}", env!("CARGO_PKG_VERSION")),
        }
    }
}

/// Outcome of the single fetch a source instance may perform.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub enum FetchState {
    #[default]
    NotAttempted,
    Fetched(MetadataNode),
    Failed,
}

/// Why a fetch produced no metadata.
#[derive(Debug, thiserror::Error)]
pub enum FetchError {
    #[error("request failed: {0}")]
    Transport(#[from] reqwest::Error),

    #[error("upstream answered {0}")]
    Status(reqwest::StatusCode),

    #[error(transparent)]
    Metadata(#[from] MetadataError),

    #[error("signature verification failed: {0}")]
    Signature(#[from] XmlSecError),

    #[error("parser task failed: {0}")]
    Task(#[from] tokio::task::JoinError),
}

/// A configured upstream.
pub struct EntitySource {
    url: String,
    client: reqwest::Client,
    verification_keys: Vec<RsaPublicKey>,
    cache_id: String,
    cache_tag: String,
    cache: CacheHandle,
    state: FetchState,
}

impl std::fmt::Debug for EntitySource {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("EntitySource")
            .field("url", &self.url)
            .field("verification_keys", &self.verification_keys.len())
            .field("cache_id", &self.cache_id)
            .field("state", &self.state)
            .finish_non_exhaustive()
    }
}

impl EntitySource {
    /// Builds a source, loading its CA bundle and verification certificates.
    ///
    /// `inherited_ca` is the aggregator-level CA file used when the source
    /// has none. Relative paths resolve against `cert_dir`.
    ///
    /// # Errors
    ///
    /// Returns `AggregatorError::Config` for a URL that is not `http(s)` or
    /// an unreadable CA bundle, and `AggregatorError::Crypto` for an
    /// unreadable certificate.
    pub fn new(
        config: &SourceConfig,
        inherited_ca: Option<&str>,
        cert_dir: Option<&Path>,
        fetch: &FetchSettings,
        cache: CacheHandle,
    ) -> Result<Self, AggregatorError> {
        let url = Url::parse(&config.url)
            .map_err(|e| AggregatorError::Config(format!("source url {}: {e}", config.url)))?;
        if !matches!(url.scheme(), "http" | "https") {
            return Err(AggregatorError::Config(format!(
                "source url {}: unsupported scheme '{}'",
                config.url,
                url.scheme()
            )));
        }

        let ca_file = config
            .ssl_cafile
            .as_deref()
            .or(inherited_ca)
            .map(|p| resolve_path(cert_dir, p));
        let client = build_client(fetch, ca_file.as_deref())?;

        let verification_keys = config
            .certificates
            .iter()
            .map(|p| {
                X509Certificate::from_file(&resolve_path(cert_dir, p))
                    .map(|cert| cert.public_key().clone())
            })
            .collect::<Result<Vec<_>, _>>()?;

        let serialized = serde_json::to_string(config)
            .map_err(|e| AggregatorError::Config(format!("source {}: {e}", config.url)))?;

        Ok(Self {
            url: config.url.clone(),
            client,
            verification_keys,
            cache_id: sha256_hex([&config.url]),
            cache_tag: sha256_hex([serialized]),
            cache,
            state: FetchState::NotAttempted,
        })
    }

    pub fn url(&self) -> &str {
        &self.url
    }

    pub fn cache_id(&self) -> &str {
        &self.cache_id
    }

    pub fn cache_tag(&self) -> &str {
        &self.cache_tag
    }

    pub fn state(&self) -> &FetchState {
        &self.state
    }

    /// Downloads, parses and, when certificates are configured, verifies
    /// the source document.
    ///
    /// # Errors
    ///
    /// Returns `FetchError` describing the first failure.
    pub async fn try_fetch(&self) -> Result<MetadataNode, FetchError> {
        let response = self
            .client
            .get(&self.url)
            .header(
                header::ACCEPT,
                "application/samlmetadata+xml, application/xml;q=0.9, */*;q=0.1",
            )
            .send()
            .await?;
        if !response.status().is_success() {
            return Err(FetchError::Status(response.status()));
        }
        let body = response.text().await?;

        let keys = self.verification_keys.clone();
        tokio::task::spawn_blocking(move || parse_and_verify(&body, &keys)).await?
    }

    /// Like [`try_fetch`](Self::try_fetch) but fails soft: errors are logged
    /// and reported as `None`.
    pub async fn fetch_and_parse(&self) -> Option<MetadataNode> {
        match self.try_fetch().await {
            Ok(node) => {
                tracing::debug!(url = %self.url, entities = node.entities().len(), "fetched source metadata");
                Some(node)
            }
            Err(e) => {
                tracing::error!(url = %self.url, error = %e, "failed to load metadata from source");
                None
            }
        }
    }

    /// Fetches the source once per instance and caches the result.
    ///
    /// Later calls return the outcome of the first attempt without touching
    /// the network.
    pub async fn refresh_cache(&mut self) -> Option<MetadataNode> {
        match &self.state {
            FetchState::Fetched(node) => return Some(node.clone()),
            FetchState::Failed => return None,
            FetchState::NotAttempted => {}
        }

        let Some(node) = self.fetch_and_parse().await else {
            self.state = FetchState::Failed;
            return None;
        };
        let expires_at = source_expiry(&node, Utc::now());
        self.cache
            .put(&self.cache_id, node.to_xml().into_bytes(), expires_at, &self.cache_tag)
            .await;
        self.state = FetchState::Fetched(node.clone());
        Some(node)
    }

    /// Freshest available metadata: this instance's fetch result, a fetch
    /// when the cache entry is stale, or the stored entry regardless of
    /// expiry. Entries written under another source configuration are never
    /// served, so adding `certificates` cannot fall back to unverified data.
    pub async fn get_metadata(&mut self) -> Option<MetadataNode> {
        if let FetchState::Fetched(node) = &self.state {
            return Some(node.clone());
        }
        if !self.cache.is_valid(&self.cache_id, &self.cache_tag).await {
            if let Some(node) = self.refresh_cache().await {
                return Some(node);
            }
        }

        let Some(bytes) = self.cache.get_stale(&self.cache_id, &self.cache_tag).await else {
            tracing::error!(url = %self.url, "no cached metadata available");
            return None;
        };
        let parsed = String::from_utf8(bytes)
            .map_err(|e| MetadataError::Xml(e.to_string()))
            .and_then(|text| MetadataNode::parse(&text));
        match parsed {
            Ok(node) => Some(node),
            Err(e) => {
                tracing::error!(url = %self.url, error = %e, "cached metadata is unreadable");
                None
            }
        }
    }
}

fn parse_and_verify(body: &str, keys: &[RsaPublicKey]) -> Result<MetadataNode, FetchError> {
    let root = parse_document(body)?;
    if !keys.is_empty() {
        verify_enveloped(&root, keys)?;
    }
    Ok(MetadataNode::from_document_element(root)?)
}

/// `min(now + 24h, validUntil)`.
pub(crate) fn source_expiry(node: &MetadataNode, now: DateTime<Utc>) -> DateTime<Utc> {
    let cap = now + chrono::Duration::hours(MAX_SOURCE_LIFETIME_HOURS);
    match node.valid_until() {
        Some(valid_until) if valid_until < cap => valid_until,
        _ => cap,
    }
}

fn build_client(
    settings: &FetchSettings,
    ca_file: Option<&Path>,
) -> Result<reqwest::Client, AggregatorError> {
    let mut builder = reqwest::Client::builder()
        .timeout(settings.timeout)
        .redirect(reqwest::redirect::Policy::limited(5))
        .user_agent(settings.user_agent.clone());

    if let Some(path) = ca_file {
        let pem = std::fs::read(path).map_err(|e| {
            AggregatorError::Config(format!("cannot read CA file {}: {e}", path.display()))
        })?;
        let certs = reqwest::Certificate::from_pem_bundle(&pem).map_err(|e| {
            AggregatorError::Config(format!("invalid CA file {}: {e}", path.display()))
        })?;
        if certs.is_empty() {
            return Err(AggregatorError::Config(format!(
                "CA file {} contains no certificates",
                path.display()
            )));
        }
        // Only the configured bundle is trusted.
        builder = builder.tls_built_in_root_certs(false);
        for cert in certs {
            builder = builder.add_root_certificate(cert);
        }
    }

    builder
        .build()
        .map_err(|e| AggregatorError::Config(format!("failed to build HTTP client: {e}")))
}
