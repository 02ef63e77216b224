//! Error types for XML signature operations.

/// Errors that can occur while loading keys, signing or verifying.
#[derive(Debug, thiserror::Error)]
pub enum XmlSecError {
    /// The private key could not be decoded.
    #[error("invalid private key: {0}")]
    PrivateKey(String),

    /// The certificate could not be decoded or carries no RSA key.
    #[error("invalid certificate: {0}")]
    Certificate(String),

    /// An algorithm URI or name is not supported.
    #[error("unsupported algorithm: {0}")]
    UnsupportedAlgorithm(String),

    /// The document has no enveloped signature.
    #[error("document is not signed")]
    MissingSignature,

    /// The signature block is structurally invalid.
    #[error("malformed signature: {0}")]
    Malformed(String),

    /// The referenced content does not match its digest.
    #[error("digest mismatch for reference '{0}'")]
    DigestMismatch(String),

    /// The signature value does not verify against any trusted key.
    #[error("signature value does not verify against any trusted key")]
    InvalidSignature,

    /// The RSA operation itself failed.
    #[error("signing failed: {0}")]
    Signing(String),
}
