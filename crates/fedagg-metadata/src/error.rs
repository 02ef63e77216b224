//! Error types for metadata parsing and model construction.

/// Errors that can occur while reading or interpreting a metadata document.
#[derive(Debug, thiserror::Error)]
pub enum MetadataError {
    /// The input is not well-formed XML.
    #[error("malformed XML: {0}")]
    Xml(String),

    /// The document element is not an `EntityDescriptor` or `EntitiesDescriptor`.
    #[error("no EntityDescriptor or EntitiesDescriptor root, found {0}")]
    UnexpectedRoot(String),

    /// A required attribute is missing or has an invalid value.
    #[error("invalid metadata: {0}")]
    Model(String),
}

impl From<quick_xml::Error> for MetadataError {
    fn from(e: quick_xml::Error) -> Self {
        MetadataError::Xml(e.to_string())
    }
}

impl From<quick_xml::escape::EscapeError> for MetadataError {
    fn from(e: quick_xml::escape::EscapeError) -> Self {
        MetadataError::Xml(e.to_string())
    }
}

impl From<std::str::Utf8Error> for MetadataError {
    fn from(e: std::str::Utf8Error) -> Self {
        MetadataError::Xml(e.to_string())
    }
}
