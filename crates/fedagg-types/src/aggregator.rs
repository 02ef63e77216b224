//! Aggregator feed configuration.

use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

/// Default lifetime of a produced aggregate: seven days.
pub const DEFAULT_VALID_LENGTH_SECS: u64 = 7 * 24 * 60 * 60;

/// Defines one aggregated metadata feed.
///
/// The whole struct is serialized to JSON and hashed to form the cache tag
/// of the feed, so any configuration change invalidates previously cached
/// aggregates.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct AggregatorConfig {
    /// Human-readable name shown in listings.
    #[serde(default)]
    pub name: Option<String>,
    /// Schedule tag; feeds with a matching tag are refreshed by that schedule.
    #[serde(default)]
    pub cron_tag: Option<String>,
    /// Lifetime of the produced aggregate (`validUntil = now + valid_length`).
    #[serde(default = "default_valid_length")]
    pub valid_length_secs: u64,
    /// How long a generated aggregate is served from cache. `None` disables
    /// caching of the combined document.
    #[serde(default)]
    pub cache_generated_secs: Option<u64>,
    /// CA bundle used for TLS validation of sources without their own.
    #[serde(default)]
    pub ssl_cafile: Option<String>,
    /// Entity IDs removed from the aggregate by default.
    #[serde(default)]
    pub exclude: Vec<String>,
    /// Filter tokens applied by default (e.g. `saml20-idp`).
    #[serde(default)]
    pub filter: Vec<String>,
    /// Signing material for the aggregate.
    #[serde(default)]
    pub sign: Option<SigningConfig>,
    /// `mdrpi:RegistrationInfo` extension attached to the aggregate.
    #[serde(default)]
    pub registration_info: Option<RegistrationInfoConfig>,
    /// `mdrpi:PublicationInfo` extension attached to the aggregate.
    #[serde(default)]
    pub publication_info: Option<PublicationInfoConfig>,
    /// Upstream metadata sources, merged in declaration order.
    #[serde(default)]
    pub sources: Vec<SourceConfig>,
}

/// One upstream metadata location.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct SourceConfig {
    /// URL the metadata document is fetched from.
    pub url: String,
    /// CA bundle for TLS validation; overrides the aggregator's.
    #[serde(default)]
    pub ssl_cafile: Option<String>,
    /// Certificates the document signature must verify against (any of them).
    #[serde(default)]
    pub certificates: Vec<String>,
}

/// Key material used to sign the aggregate.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct SigningConfig {
    /// PEM private key file (PKCS#1, PKCS#8 or encrypted PKCS#8).
    pub private_key: String,
    /// Passphrase for an encrypted private key.
    #[serde(default)]
    pub private_key_pass: Option<String>,
    /// PEM certificate embedded in the signature's `KeyInfo`.
    #[serde(default)]
    pub certificate: Option<String>,
    /// Signature algorithm URI or short name; defaults to RSA-SHA256.
    #[serde(default)]
    pub algorithm: Option<String>,
}

/// Settings for the `mdrpi:RegistrationInfo` extension.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct RegistrationInfoConfig {
    /// Value of `registrationAuthority`.
    pub authority: String,
    /// Fixed `registrationInstant` (xs:dateTime). Defaults to build time.
    #[serde(default)]
    pub instant: Option<String>,
    /// `RegistrationPolicy` URLs keyed by language tag.
    #[serde(default)]
    pub policies: BTreeMap<String, String>,
}

/// Settings for the `mdrpi:PublicationInfo` extension.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct PublicationInfoConfig {
    /// Value of `publisher`.
    pub publisher: String,
    /// Fixed `creationInstant` (xs:dateTime). Defaults to build time.
    #[serde(default)]
    pub creation_instant: Option<String>,
    /// Value of `publicationId`.
    #[serde(default)]
    pub publication_id: Option<String>,
    /// `UsagePolicy` URLs keyed by language tag.
    #[serde(default)]
    pub usage_policies: BTreeMap<String, String>,
}

fn default_valid_length() -> u64 {
    DEFAULT_VALID_LENGTH_SECS
}

impl Default for AggregatorConfig {
    fn default() -> Self {
        Self {
            name: None,
            cron_tag: None,
            valid_length_secs: default_valid_length(),
            cache_generated_secs: None,
            ssl_cafile: None,
            exclude: Vec::new(),
            filter: Vec::new(),
            sign: None,
            registration_info: None,
            publication_info: None,
            sources: Vec::new(),
        }
    }
}

impl SourceConfig {
    /// Creates a source with no TLS or signature settings.
    pub fn new(url: impl Into<String>) -> Self {
        Self {
            url: url.into(),
            ssl_cafile: None,
            certificates: Vec::new(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn default_config_values() {
        let config = AggregatorConfig::default();
        assert_eq!(config.valid_length_secs, 7 * 24 * 60 * 60);
        assert!(config.cache_generated_secs.is_none());
        assert!(config.sources.is_empty());
        assert!(config.sign.is_none());
    }

    #[test]
    fn missing_fields_take_defaults() {
        let config: AggregatorConfig =
            serde_json::from_str(r#"{"sources":[{"url":"https://md.example.org/"}]}"#)
                .expect("should deserialize");
        assert_eq!(config.valid_length_secs, DEFAULT_VALID_LENGTH_SECS);
        assert_eq!(config.sources.len(), 1);
        assert!(config.sources[0].certificates.is_empty());
        assert!(config.exclude.is_empty());
    }

    #[test]
    fn serialization_round_trip() {
        let mut config = AggregatorConfig::default();
        config.sources.push(SourceConfig::new("https://md.example.org/feed.xml"));
        config.filter = vec!["saml20-idp".to_string()];
        let json = serde_json::to_string(&config).expect("should serialize");
        let decoded: AggregatorConfig = serde_json::from_str(&json).expect("should deserialize");
        assert_eq!(config, decoded);
    }
}
