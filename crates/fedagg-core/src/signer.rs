use std::path::Path;

use fedagg_metadata::XmlElement;
use fedagg_types::SigningConfig;
use fedagg_xmlsec::{sign_enveloped, SignatureAlgorithm, SigningKey, X509Certificate};

use crate::error::AggregatorError;
use crate::resolve_path;

/// Key, certificate and algorithm used to sign an aggregate.
#[derive(Debug, Clone)]
pub struct MetadataSigner {
    key: SigningKey,
    certificate: Option<X509Certificate>,
    algorithm: SignatureAlgorithm,
}

impl MetadataSigner {
    /// Loads signing material; relative paths resolve against `cert_dir`.
    ///
    /// # Errors
    ///
    /// Returns `AggregatorError::Config` for an unsupported algorithm or a
    /// certificate that does not belong to the key, and
    /// `AggregatorError::Crypto` for unreadable key or certificate files.
    pub fn from_config(
        config: &SigningConfig,
        cert_dir: Option<&Path>,
    ) -> Result<Self, AggregatorError> {
        let algorithm = match config.algorithm.as_deref() {
            Some(name) => SignatureAlgorithm::parse(name)
                .map_err(|e| AggregatorError::Config(e.to_string()))?,
            None => SignatureAlgorithm::default(),
        };
        let key = SigningKey::from_file(
            &resolve_path(cert_dir, &config.private_key),
            config.private_key_pass.as_deref(),
        )?;
        let certificate = config
            .certificate
            .as_deref()
            .map(|p| X509Certificate::from_file(&resolve_path(cert_dir, p)))
            .transpose()?;

        if let Some(cert) = &certificate {
            if *cert.public_key() != key.public_key() {
                return Err(AggregatorError::Config(
                    "signing certificate does not match the private key".to_string(),
                ));
            }
        }

        Ok(Self {
            key,
            certificate,
            algorithm,
        })
    }

    pub fn algorithm(&self) -> SignatureAlgorithm {
        self.algorithm
    }

    /// Adds an enveloped signature to `element`.
    ///
    /// # Errors
    ///
    /// Returns `AggregatorError::Signing` when the RSA operation fails.
    pub fn sign(&self, element: &mut XmlElement) -> Result<(), AggregatorError> {
        sign_enveloped(element, &self.key, self.algorithm, self.certificate.as_ref())
            .map_err(|e| AggregatorError::Signing(e.to_string()))
    }
}
