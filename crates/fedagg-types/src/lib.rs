//! Shared types and constants for the fedagg workspace.
//!
//! This crate provides the configuration structures that describe an
//! aggregator feed and its upstream sources, together with the XML
//! namespace and protocol identifiers used across the other crates.
//!
//! No crate in the workspace depends on anything *except* `fedagg-types` for
//! cross-cutting type definitions. This keeps the dependency graph clean and
//! prevents circular dependencies.

mod aggregator;

pub use aggregator::{
    AggregatorConfig, PublicationInfoConfig, RegistrationInfoConfig, SigningConfig, SourceConfig,
    DEFAULT_VALID_LENGTH_SECS,
};

/// SAML 2.0 metadata namespace.
pub const NS_MD: &str = "urn:oasis:names:tc:SAML:2.0:metadata";

/// SAML metadata registration and publication info namespace.
pub const NS_MDRPI: &str = "urn:oasis:names:tc:SAML:metadata:rpi";

/// W3C XML-DSig namespace.
pub const NS_DSIG: &str = "http://www.w3.org/2000/09/xmldsig#";

/// Reserved `xml:` prefix namespace.
pub const NS_XML: &str = "http://www.w3.org/XML/1998/namespace";

/// Namespace of `xmlns` declarations themselves.
pub const NS_XMLNS: &str = "http://www.w3.org/2000/xmlns/";

/// XML Schema instance namespace (for `xsi:type` on generic role descriptors).
pub const NS_XSI: &str = "http://www.w3.org/2001/XMLSchema-instance";

/// SAML 2.0 protocol identifier as advertised in `protocolSupportEnumeration`.
pub const PROTOCOL_SAML2: &str = "urn:oasis:names:tc:SAML:2.0:protocol";

/// SAML 1.1 protocol identifier as advertised in `protocolSupportEnumeration`.
pub const PROTOCOL_SAML11: &str = "urn:oasis:names:tc:SAML:1.1:protocol";
