//! The aggregation engine: merge, exclude, filter, sign, cache.

use std::collections::{BTreeSet, HashSet};
use std::path::Path;
use std::sync::Arc;

use chrono::{DateTime, Utc};
use fedagg_cache::CacheStore;
use fedagg_metadata::{
    format_instant, parse_instant, to_xml_string, EntitiesDescriptor, EntityDescriptor,
    MetadataNode, XmlAttribute, XmlElement,
};
use fedagg_types::{
    AggregatorConfig, PublicationInfoConfig, RegistrationInfoConfig, NS_MDRPI, NS_XML,
};
use futures_util::future::join_all;

use crate::cache::CacheHandle;
use crate::error::AggregatorError;
use crate::filter::FilterSet;
use crate::hash::sha256_hex;
use crate::signer::MetadataSigner;
use crate::source::{EntitySource, FetchSettings};

/// Which entities a feed serves: role/protocol filters and excluded IDs.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct FeedSelection {
    pub filters: FilterSet,
    pub excluded: BTreeSet<String>,
}

impl FeedSelection {
    /// Cache id of the aggregate `aggregator_id` produces under this
    /// selection. Depends only on the final selection, not on the order in
    /// which filters and exclusions were applied.
    pub fn cache_id(&self, aggregator_id: &str) -> String {
        let excluded = self
            .excluded
            .iter()
            .map(String::as_str)
            .collect::<Vec<_>>()
            .join("\n");
        sha256_hex([aggregator_id, self.filters.canonical().as_str(), excluded.as_str()])
    }
}

/// One aggregated feed, built from configuration for a single request or
/// refresh run.
pub struct Aggregator {
    id: String,
    name: Option<String>,
    cron_tag: Option<String>,
    sources: Vec<EntitySource>,
    selection: FeedSelection,
    signer: Option<MetadataSigner>,
    valid_length: chrono::Duration,
    cache_generated: Option<chrono::Duration>,
    registration_info: Option<RegistrationInfoConfig>,
    publication_info: Option<PublicationInfoConfig>,
    cache_id: String,
    cache_tag: String,
    cache: CacheHandle,
}

impl std::fmt::Debug for Aggregator {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Aggregator")
            .field("id", &self.id)
            .field("sources", &self.sources)
            .field("selection", &self.selection)
            .field("signed", &self.signer.is_some())
            .field("cache_id", &self.cache_id)
            .finish_non_exhaustive()
    }
}

impl Aggregator {
    /// Builds an aggregator and its sources from configuration.
    ///
    /// Signing material, verification certificates and CA bundles are
    /// loaded here, so an unusable configuration fails before any fetch.
    /// The configured default `filter` and `exclude` lists are applied.
    ///
    /// # Errors
    ///
    /// Returns `AggregatorError::Config` or `AggregatorError::Crypto` for
    /// invalid configuration or unreadable key material.
    pub fn new(
        id: &str,
        config: &AggregatorConfig,
        cert_dir: Option<&Path>,
        fetch: &FetchSettings,
        store: Arc<dyn CacheStore>,
    ) -> Result<Self, AggregatorError> {
        let cache = CacheHandle::new(store);

        let signer = config
            .sign
            .as_ref()
            .map(|s| MetadataSigner::from_config(s, cert_dir))
            .transpose()?;

        let sources = config
            .sources
            .iter()
            .map(|s| {
                EntitySource::new(
                    s,
                    config.ssl_cafile.as_deref(),
                    cert_dir,
                    fetch,
                    cache.clone(),
                )
            })
            .collect::<Result<Vec<_>, _>>()?;

        if let Some(instant) = config
            .registration_info
            .as_ref()
            .and_then(|r| r.instant.as_deref())
        {
            parse_instant(instant)
                .map_err(|e| AggregatorError::Config(format!("registration_info: {e}")))?;
        }
        if let Some(instant) = config
            .publication_info
            .as_ref()
            .and_then(|p| p.creation_instant.as_deref())
        {
            parse_instant(instant)
                .map_err(|e| AggregatorError::Config(format!("publication_info: {e}")))?;
        }

        let serialized = serde_json::to_string(config)
            .map_err(|e| AggregatorError::Config(e.to_string()))?;

        let mut aggregator = Self {
            id: id.to_string(),
            name: config.name.clone(),
            cron_tag: config.cron_tag.clone(),
            sources,
            selection: FeedSelection::default(),
            signer,
            valid_length: seconds(config.valid_length_secs, "valid_length_secs")?,
            cache_generated: config
                .cache_generated_secs
                .map(|s| seconds(s, "cache_generated_secs"))
                .transpose()?,
            registration_info: config.registration_info.clone(),
            publication_info: config.publication_info.clone(),
            cache_id: String::new(),
            cache_tag: sha256_hex([id, serialized.as_str()]),
            cache,
        };
        aggregator.set_filters(&config.filter);
        aggregator.exclude_entities(&config.exclude);
        aggregator.cache_id = aggregator.selection.cache_id(id);
        Ok(aggregator)
    }

    pub fn id(&self) -> &str {
        &self.id
    }

    pub fn name(&self) -> Option<&str> {
        self.name.as_deref()
    }

    pub fn cron_tag(&self) -> Option<&str> {
        self.cron_tag.as_deref()
    }

    pub fn cache_id(&self) -> &str {
        &self.cache_id
    }

    pub fn cache_tag(&self) -> &str {
        &self.cache_tag
    }

    pub fn selection(&self) -> &FeedSelection {
        &self.selection
    }

    pub fn sources(&self) -> &[EntitySource] {
        &self.sources
    }

    /// Replaces the role/protocol filters. An empty token list keeps the
    /// current filters.
    pub fn set_filters<I, S>(&mut self, tokens: I)
    where
        I: IntoIterator<Item = S>,
        S: AsRef<str>,
    {
        if let Some(filters) = FilterSet::from_tokens(tokens) {
            self.selection.filters = filters;
            self.cache_id = self.selection.cache_id(&self.id);
        }
    }

    /// Replaces the set of excluded entity IDs, including any configured
    /// defaults. An empty list clears the set.
    pub fn exclude_entities<I, S>(&mut self, ids: I)
    where
        I: IntoIterator<Item = S>,
        S: AsRef<str>,
    {
        self.selection.excluded = ids
            .into_iter()
            .map(|id| id.as_ref().trim().to_string())
            .filter(|id| !id.is_empty())
            .collect();
        self.cache_id = self.selection.cache_id(&self.id);
    }

    /// Merges every source into one flat container.
    ///
    /// Sources are fetched concurrently and merged in declaration order.
    /// Nested containers are flattened, duplicate entities dropped (first
    /// occurrence wins) and configured extensions attached.
    pub async fn build_entities_container(&mut self) -> EntitiesDescriptor {
        let now = Utc::now();
        let nodes = join_all(self.sources.iter_mut().map(|s| s.get_metadata())).await;

        let entities: Vec<EntityDescriptor> = nodes
            .into_iter()
            .flatten()
            .flat_map(MetadataNode::into_entities)
            .collect();
        let entities = dedup(entities);

        let mut container = EntitiesDescriptor::new();
        container.valid_until = Some(now + self.valid_length);
        container.extensions = self.extensions(now);
        container.children = entities.into_iter().map(MetadataNode::Entity).collect();
        container
    }

    /// Drops every entity whose ID is excluded, at any depth.
    pub fn exclude(&self, mut container: EntitiesDescriptor) -> EntitiesDescriptor {
        if self.selection.excluded.is_empty() {
            return container;
        }
        container.children = container
            .children
            .into_iter()
            .filter_map(|child| match child {
                MetadataNode::Entity(e) if self.selection.excluded.contains(&e.entity_id) => None,
                MetadataNode::Entity(e) => Some(MetadataNode::Entity(e)),
                MetadataNode::Container(c) => Some(MetadataNode::Container(self.exclude(c))),
            })
            .collect();
        container
    }

    /// Keeps only entities accepted by the role/protocol filters, at any
    /// depth. Without filters the container passes through unchanged.
    pub fn filter(&self, mut container: EntitiesDescriptor) -> EntitiesDescriptor {
        if self.selection.filters.is_empty() {
            return container;
        }
        container.children = container
            .children
            .into_iter()
            .filter_map(|child| match child {
                MetadataNode::Entity(e) if self.selection.filters.accepts(&e) => {
                    Some(MetadataNode::Entity(e))
                }
                MetadataNode::Entity(_) => None,
                MetadataNode::Container(c) => Some(MetadataNode::Container(self.filter(c))),
            })
            .collect();
        container
    }

    /// Renders the container, signed when signing material is configured.
    ///
    /// # Errors
    ///
    /// Returns `AggregatorError::Signing` when signing fails.
    pub fn sign(&self, container: &EntitiesDescriptor) -> Result<XmlElement, AggregatorError> {
        let mut element = container.to_element();
        if let Some(signer) = &self.signer {
            signer.sign(&mut element)?;
        }
        Ok(element)
    }

    /// Builds, excludes, filters, signs and serializes the aggregate, and
    /// caches the text when a cache lifetime is configured.
    ///
    /// # Errors
    ///
    /// Returns `AggregatorError::Signing` when signing fails.
    pub async fn update_cached_metadata(&mut self) -> Result<String, AggregatorError> {
        let built = self.build_entities_container().await;
        let selected = self.filter(self.exclude(built));
        let element = self.sign(&selected)?;
        let xml = to_xml_string(&element);

        if let Some(lifetime) = self.cache_generated {
            self.cache
                .put(
                    &self.cache_id,
                    xml.clone().into_bytes(),
                    Utc::now() + lifetime,
                    &self.cache_tag,
                )
                .await;
        }
        tracing::info!(
            aggregator = %self.id,
            entities = selected.children.len(),
            signed = self.signer.is_some(),
            "generated aggregate"
        );
        Ok(xml)
    }

    /// Serves the cached aggregate while it is valid, otherwise regenerates it.
    ///
    /// # Errors
    ///
    /// See [`update_cached_metadata`](Self::update_cached_metadata).
    pub async fn get_metadata(&mut self) -> Result<String, AggregatorError> {
        if self.cache_generated.is_some() {
            if let Some(bytes) = self.cache.get(&self.cache_id, &self.cache_tag).await {
                match String::from_utf8(bytes) {
                    Ok(text) => {
                        tracing::debug!(aggregator = %self.id, "serving cached aggregate");
                        return Ok(text);
                    }
                    Err(e) => {
                        tracing::warn!(aggregator = %self.id, error = %e, "cached aggregate is not UTF-8");
                    }
                }
            }
        }
        self.update_cached_metadata().await
    }

    /// Refetches every source regardless of its cache state, then
    /// regenerates and re-caches the aggregate.
    ///
    /// # Errors
    ///
    /// See [`update_cached_metadata`](Self::update_cached_metadata).
    pub async fn update_cache(&mut self) -> Result<String, AggregatorError> {
        join_all(self.sources.iter_mut().map(|s| s.refresh_cache())).await;
        self.update_cached_metadata().await
    }

    fn extensions(&self, now: DateTime<Utc>) -> Vec<XmlElement> {
        let mut extensions = Vec::new();

        if let Some(info) = &self.registration_info {
            let instant = info.instant.clone().unwrap_or_else(|| format_instant(now));
            let mut element = mdrpi("RegistrationInfo")
                .with_attribute("registrationAuthority", info.authority.clone())
                .with_attribute("registrationInstant", instant);
            for (lang, url) in &info.policies {
                element.push_element(localized("RegistrationPolicy", lang, url));
            }
            extensions.push(element);
        }

        if let Some(info) = &self.publication_info {
            let instant = info
                .creation_instant
                .clone()
                .unwrap_or_else(|| format_instant(now));
            let mut element = mdrpi("PublicationInfo")
                .with_attribute("publisher", info.publisher.clone())
                .with_attribute("creationInstant", instant);
            if let Some(publication_id) = &info.publication_id {
                element.set_attribute("publicationId", publication_id.clone());
            }
            for (lang, url) in &info.usage_policies {
                element.push_element(localized("UsagePolicy", lang, url));
            }
            extensions.push(element);
        }

        extensions
    }
}

/// Keeps the first entity published under each entityID.
///
/// Namespace declarations inherited from different source containers make
/// otherwise identical descriptors differ structurally, so identity is the
/// entityID alone.
fn dedup(entities: Vec<EntityDescriptor>) -> Vec<EntityDescriptor> {
    let mut seen = HashSet::with_capacity(entities.len());
    entities
        .into_iter()
        .filter(|e| {
            let first = seen.insert(e.entity_id.clone());
            if !first {
                tracing::debug!(entity_id = %e.entity_id, "dropping duplicate entity");
            }
            first
        })
        .collect()
}

fn mdrpi(local_name: &str) -> XmlElement {
    let mut element = XmlElement::new(Some("mdrpi"), local_name, Some(NS_MDRPI));
    element.declare_namespace(Some("mdrpi"), NS_MDRPI);
    element
}

fn localized(local_name: &str, lang: &str, url: &str) -> XmlElement {
    let mut element = XmlElement::new(Some("mdrpi"), local_name, Some(NS_MDRPI));
    element
        .attributes
        .push(XmlAttribute::namespaced("xml", NS_XML, "lang", lang));
    element.push_text(url);
    element
}

fn seconds(value: u64, field: &str) -> Result<chrono::Duration, AggregatorError> {
    i64::try_from(value)
        .ok()
        .and_then(chrono::Duration::try_seconds)
        .ok_or_else(|| AggregatorError::Config(format!("{field} is out of range")))
}
