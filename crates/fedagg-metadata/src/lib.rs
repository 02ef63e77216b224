//! SAML 2.0 metadata documents for the aggregator.
//!
//! Provides a namespace-aware XML tree ([`XmlElement`]) with a parser and
//! serializer, and the metadata node model ([`MetadataNode`]) built on top
//! of it: a tagged union of a single entity and a container of nodes.
//!
//! # Example
//!
//! ```rust,ignore
//! use fedagg_metadata::MetadataNode;
//!
//! let node = MetadataNode::parse(&body)?;
//! for entity in node.entities() {
//!     println!("{}", entity.entity_id);
//! }
//! ```

mod error;
mod model;
mod writer;
mod xml;

pub use error::MetadataError;
pub use model::{
    format_instant, parse_instant, EntitiesDescriptor, EntityDescriptor, MetadataNode,
    RoleDescriptor, RoleKind,
};
pub use writer::{
    element_to_string, escape_attribute, escape_text, to_pretty_xml_string, to_xml_string,
};
pub use xml::{
    parse_document, root_scope, NamespaceDecl, NamespaceScope, XmlAttribute, XmlElement, XmlNode,
};
