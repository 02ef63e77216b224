use fedagg_metadata::MetadataError;
use fedagg_xmlsec::XmlSecError;

/// Errors surfaced by aggregator construction and metadata generation.
///
/// Source fetch failures never show up here: they are logged and the
/// source is left out of the aggregate.
#[derive(Debug, thiserror::Error)]
pub enum AggregatorError {
    /// No aggregator is configured under this id.
    #[error("aggregator '{0}' not found")]
    NotFound(String),

    /// The aggregator configuration cannot be used.
    #[error("invalid aggregator configuration: {0}")]
    Config(String),

    /// Signing or verification material failed to load.
    #[error("key material error: {0}")]
    Crypto(#[from] XmlSecError),

    #[error("metadata error: {0}")]
    Metadata(#[from] MetadataError),

    /// The aggregate could not be signed.
    #[error("failed to sign aggregate: {0}")]
    Signing(String),
}
