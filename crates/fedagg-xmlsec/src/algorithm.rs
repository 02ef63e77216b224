//! Signature and digest algorithm identifiers.

use sha1::Sha1;
use sha2::{Digest, Sha256, Sha384, Sha512};

use crate::error::XmlSecError;

/// RSA PKCS#1 v1.5 signature algorithms accepted for metadata.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum SignatureAlgorithm {
    RsaSha1,
    #[default]
    RsaSha256,
    RsaSha384,
    RsaSha512,
}

impl SignatureAlgorithm {
    /// XML-DSig algorithm URI.
    pub fn uri(self) -> &'static str {
        match self {
            Self::RsaSha1 => "http://www.w3.org/2000/09/xmldsig#rsa-sha1",
            Self::RsaSha256 => "http://www.w3.org/2001/04/xmldsig-more#rsa-sha256",
            Self::RsaSha384 => "http://www.w3.org/2001/04/xmldsig-more#rsa-sha384",
            Self::RsaSha512 => "http://www.w3.org/2001/04/xmldsig-more#rsa-sha512",
        }
    }

    /// Parses an algorithm URI or a short name such as `rsa-sha256`.
    ///
    /// # Errors
    ///
    /// Returns `XmlSecError::UnsupportedAlgorithm` for anything else.
    pub fn parse(value: &str) -> Result<Self, XmlSecError> {
        let all = [
            Self::RsaSha1,
            Self::RsaSha256,
            Self::RsaSha384,
            Self::RsaSha512,
        ];
        let trimmed = value.trim();
        all.into_iter()
            .find(|alg| {
                alg.uri() == trimmed
                    || alg
                        .uri()
                        .rsplit_once('#')
                        .is_some_and(|(_, short)| short.eq_ignore_ascii_case(trimmed))
            })
            .ok_or_else(|| XmlSecError::UnsupportedAlgorithm(trimmed.to_string()))
    }
}

/// Digest algorithms for `ds:Reference`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DigestAlgorithm {
    Sha1,
    Sha256,
    Sha384,
    Sha512,
}

impl DigestAlgorithm {
    /// XML-DSig / XML-Enc algorithm URI.
    pub fn uri(self) -> &'static str {
        match self {
            Self::Sha1 => "http://www.w3.org/2000/09/xmldsig#sha1",
            Self::Sha256 => "http://www.w3.org/2001/04/xmlenc#sha256",
            Self::Sha384 => "http://www.w3.org/2001/04/xmldsig-more#sha384",
            Self::Sha512 => "http://www.w3.org/2001/04/xmlenc#sha512",
        }
    }

    /// Parses a digest algorithm URI.
    ///
    /// # Errors
    ///
    /// Returns `XmlSecError::UnsupportedAlgorithm` for unknown URIs.
    pub fn from_uri(uri: &str) -> Result<Self, XmlSecError> {
        [Self::Sha1, Self::Sha256, Self::Sha384, Self::Sha512]
            .into_iter()
            .find(|alg| alg.uri() == uri.trim())
            .ok_or_else(|| XmlSecError::UnsupportedAlgorithm(uri.to_string()))
    }

    /// Hashes `data`.
    pub fn digest(self, data: &[u8]) -> Vec<u8> {
        match self {
            Self::Sha1 => Sha1::digest(data).to_vec(),
            Self::Sha256 => Sha256::digest(data).to_vec(),
            Self::Sha384 => Sha384::digest(data).to_vec(),
            Self::Sha512 => Sha512::digest(data).to_vec(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_uris_and_short_names() {
        assert_eq!(
            SignatureAlgorithm::parse("http://www.w3.org/2001/04/xmldsig-more#rsa-sha512").unwrap(),
            SignatureAlgorithm::RsaSha512
        );
        assert_eq!(
            SignatureAlgorithm::parse("RSA-SHA1").unwrap(),
            SignatureAlgorithm::RsaSha1
        );
        assert_eq!(SignatureAlgorithm::default(), SignatureAlgorithm::RsaSha256);
    }

    #[test]
    fn rejects_unknown_signature_algorithms() {
        let err = SignatureAlgorithm::parse("http://www.w3.org/2001/04/xmldsig-more#hmac-sha256")
            .unwrap_err();
        assert!(matches!(err, XmlSecError::UnsupportedAlgorithm(_)));
        assert!(SignatureAlgorithm::parse("ecdsa-sha256").is_err());
    }

    #[test]
    fn digest_lengths_match_algorithm() {
        assert_eq!(DigestAlgorithm::Sha1.digest(b"x").len(), 20);
        assert_eq!(DigestAlgorithm::Sha256.digest(b"x").len(), 32);
        assert_eq!(DigestAlgorithm::Sha384.digest(b"x").len(), 48);
        assert_eq!(DigestAlgorithm::Sha512.digest(b"x").len(), 64);
        assert!(DigestAlgorithm::from_uri("urn:md5").is_err());
    }
}
