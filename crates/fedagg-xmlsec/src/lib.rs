//! XML digital signatures for federation metadata.
//!
//! Implements the subset of XML-DSig that SAML metadata uses: enveloped RSA
//! signatures over the whole document with exclusive or inclusive
//! canonicalization. Verification only trusts keys supplied by the caller.

mod algorithm;
mod c14n;
mod error;
mod keys;
mod sign;
mod verify;

pub use algorithm::{DigestAlgorithm, SignatureAlgorithm};
pub use c14n::{canonicalize, Canonicalization};
pub use error::XmlSecError;
pub use keys::{verify_signature, SigningKey, X509Certificate};
pub use rsa::RsaPublicKey;
pub use sign::sign_enveloped;
pub use verify::{is_signed, verify_enveloped};

/// Transform URI that removes the enclosing signature before digesting.
pub const ENVELOPED_SIGNATURE: &str = "http://www.w3.org/2000/09/xmldsig#enveloped-signature";
