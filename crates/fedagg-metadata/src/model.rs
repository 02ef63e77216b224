//! SAML 2.0 metadata node model.
//!
//! A metadata document is either a single [`EntityDescriptor`] or an
//! [`EntitiesDescriptor`] grouping further nodes. Entities keep their full
//! element so they can be re-emitted unchanged; only the parts needed for
//! aggregation (entity ID, role kinds and protocols, validity) are lifted
//! into typed fields.

use chrono::{DateTime, SecondsFormat, Utc};
use fedagg_types::{NS_DSIG, NS_MD, NS_XSI};

use crate::error::MetadataError;
use crate::writer::to_xml_string;
use crate::xml::{parse_document, root_scope, NamespaceScope, XmlElement};

/// Kind of role an entity plays in the federation.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum RoleKind {
    /// `IDPSSODescriptor`.
    IdentityProvider,
    /// `SPSSODescriptor`.
    ServiceProvider,
    /// `AttributeAuthorityDescriptor`.
    AttributeAuthority,
    /// Any other role descriptor, by element name or `xsi:type`.
    Other(String),
}

impl RoleKind {
    fn from_element(element: &XmlElement) -> Option<Self> {
        if element.namespace.as_deref() != Some(NS_MD) {
            return None;
        }
        match element.local_name.as_str() {
            "IDPSSODescriptor" => Some(Self::IdentityProvider),
            "SPSSODescriptor" => Some(Self::ServiceProvider),
            "AttributeAuthorityDescriptor" => Some(Self::AttributeAuthority),
            "AuthnAuthorityDescriptor" | "PDPDescriptor" => {
                Some(Self::Other(element.local_name.clone()))
            }
            "RoleDescriptor" => Some(Self::Other(
                element
                    .attribute_ns(NS_XSI, "type")
                    .unwrap_or("RoleDescriptor")
                    .to_string(),
            )),
            _ => None,
        }
    }
}

/// A typed capability block of an entity.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct RoleDescriptor {
    pub kind: RoleKind,
    /// Protocol identifiers from `protocolSupportEnumeration`.
    pub protocols: Vec<String>,
}

/// One federation participant.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct EntityDescriptor {
    pub entity_id: String,
    pub roles: Vec<RoleDescriptor>,
    pub valid_until: Option<DateTime<Utc>>,
    /// The complete `EntityDescriptor` element, self-contained with respect
    /// to namespace declarations.
    pub element: XmlElement,
}

/// An ordered group of metadata nodes.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct EntitiesDescriptor {
    pub name: Option<String>,
    pub id: Option<String>,
    pub valid_until: Option<DateTime<Utc>>,
    /// Children of `md:Extensions`.
    pub extensions: Vec<XmlElement>,
    pub children: Vec<MetadataNode>,
}

/// A metadata document root or one of its descendants.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum MetadataNode {
    Entity(EntityDescriptor),
    Container(EntitiesDescriptor),
}

impl EntityDescriptor {
    /// Builds an entity from its element.
    ///
    /// `scope` holds the namespace bindings in scope at the element's parent;
    /// they are copied onto the element. An enveloped `ds:Signature` is
    /// dropped since it no longer covers the entity once it is re-homed.
    ///
    /// # Errors
    ///
    /// Returns `MetadataError::Model` when `entityID` is missing or empty, a
    /// role descriptor lacks `protocolSupportEnumeration`, or `validUntil`
    /// is not a valid xs:dateTime.
    pub fn from_element(
        mut element: XmlElement,
        scope: &NamespaceScope,
    ) -> Result<Self, MetadataError> {
        let entity_id = element
            .attribute("entityID")
            .map(str::trim)
            .filter(|id| !id.is_empty())
            .ok_or_else(|| MetadataError::Model("EntityDescriptor without entityID".to_string()))?
            .to_string();

        let valid_until = element
            .attribute("validUntil")
            .map(parse_instant)
            .transpose()?;

        let mut roles = Vec::new();
        for child in element.child_elements() {
            let Some(kind) = RoleKind::from_element(child) else {
                continue;
            };
            let protocols = child
                .attribute("protocolSupportEnumeration")
                .ok_or_else(|| {
                    MetadataError::Model(format!(
                        "{} of {entity_id} without protocolSupportEnumeration",
                        child.local_name
                    ))
                })?
                .split_whitespace()
                .map(str::to_string)
                .collect();
            roles.push(RoleDescriptor { kind, protocols });
        }

        element.remove_children(NS_DSIG, "Signature");
        element.adopt_namespaces(scope);

        Ok(Self {
            entity_id,
            roles,
            valid_until,
            element,
        })
    }
}

impl EntitiesDescriptor {
    /// Creates an empty container.
    pub fn new() -> Self {
        Self::default()
    }

    /// Builds a container and all of its descendants from an element.
    ///
    /// # Errors
    ///
    /// Returns `MetadataError::Model` when any descendant entity is invalid.
    pub fn from_element(element: XmlElement, scope: &NamespaceScope) -> Result<Self, MetadataError> {
        let inner_scope = element.scope_within(scope);
        let valid_until = element
            .attribute("validUntil")
            .map(parse_instant)
            .transpose()?;
        let name = element.attribute("Name").map(str::to_string);
        let id = element.attribute("ID").map(str::to_string);

        let mut extensions = Vec::new();
        let mut children = Vec::new();
        for child in element.children.into_iter().filter_map(|c| match c {
            crate::xml::XmlNode::Element(e) => Some(e),
            crate::xml::XmlNode::Text(_) => None,
        }) {
            if child.namespace.as_deref() != Some(NS_MD) {
                continue;
            }
            match child.local_name.as_str() {
                "Extensions" => {
                    let ext_scope = child.scope_within(&inner_scope);
                    for mut ext in child.child_elements().cloned() {
                        ext.adopt_namespaces(&ext_scope);
                        extensions.push(ext);
                    }
                }
                "EntityDescriptor" => children.push(MetadataNode::Entity(
                    EntityDescriptor::from_element(child, &inner_scope)?,
                )),
                "EntitiesDescriptor" => children.push(MetadataNode::Container(
                    EntitiesDescriptor::from_element(child, &inner_scope)?,
                )),
                _ => {}
            }
        }

        Ok(Self {
            name,
            id,
            valid_until,
            extensions,
            children,
        })
    }

    /// Renders the container as an `md:EntitiesDescriptor` element.
    pub fn to_element(&self) -> XmlElement {
        let mut element = XmlElement::new(Some("md"), "EntitiesDescriptor", Some(NS_MD));
        element.declare_namespace(Some("md"), NS_MD);
        if let Some(id) = &self.id {
            element.set_attribute("ID", id.clone());
        }
        if let Some(name) = &self.name {
            element.set_attribute("Name", name.clone());
        }
        if let Some(valid_until) = self.valid_until {
            element.set_attribute("validUntil", format_instant(valid_until));
        }
        if !self.extensions.is_empty() {
            let mut extensions = XmlElement::new(Some("md"), "Extensions", Some(NS_MD));
            for ext in &self.extensions {
                extensions.push_element(ext.clone());
            }
            element.push_element(extensions);
        }
        for child in &self.children {
            element.push_element(child.to_element());
        }
        element
    }
}

impl MetadataNode {
    /// Parses a metadata document.
    ///
    /// # Errors
    ///
    /// Returns `MetadataError::Xml` for malformed XML,
    /// `MetadataError::UnexpectedRoot` when the document element is not a
    /// SAML 2.0 `EntityDescriptor` or `EntitiesDescriptor`, and
    /// `MetadataError::Model` for invalid descriptors.
    pub fn parse(text: &str) -> Result<Self, MetadataError> {
        Self::from_document_element(parse_document(text)?)
    }

    /// Builds a node from an already parsed document element.
    ///
    /// # Errors
    ///
    /// See [`MetadataNode::parse`].
    pub fn from_document_element(element: XmlElement) -> Result<Self, MetadataError> {
        let scope = root_scope();
        if element.is(NS_MD, "EntityDescriptor") {
            Ok(Self::Entity(EntityDescriptor::from_element(element, &scope)?))
        } else if element.is(NS_MD, "EntitiesDescriptor") {
            Ok(Self::Container(EntitiesDescriptor::from_element(
                element, &scope,
            )?))
        } else {
            Err(MetadataError::UnexpectedRoot(match &element.namespace {
                Some(ns) => format!("{{{ns}}}{}", element.local_name),
                None => element.local_name.clone(),
            }))
        }
    }

    /// Validity deadline declared on this node.
    pub fn valid_until(&self) -> Option<DateTime<Utc>> {
        match self {
            Self::Entity(e) => e.valid_until,
            Self::Container(c) => c.valid_until,
        }
    }

    /// Renders the node as an element.
    pub fn to_element(&self) -> XmlElement {
        match self {
            Self::Entity(e) => e.element.clone(),
            Self::Container(c) => c.to_element(),
        }
    }

    /// Serializes the node as a standalone document.
    pub fn to_xml(&self) -> String {
        to_xml_string(&self.to_element())
    }

    /// Every entity in this subtree, depth first, in document order.
    pub fn entities(&self) -> Vec<&EntityDescriptor> {
        let mut out = Vec::new();
        collect_entities(self, &mut out);
        out
    }

    /// Consumes the node and returns every entity in it, depth first.
    pub fn into_entities(self) -> Vec<EntityDescriptor> {
        match self {
            Self::Entity(e) => vec![e],
            Self::Container(c) => c
                .children
                .into_iter()
                .flat_map(MetadataNode::into_entities)
                .collect(),
        }
    }
}

fn collect_entities<'a>(node: &'a MetadataNode, out: &mut Vec<&'a EntityDescriptor>) {
    match node {
        MetadataNode::Entity(e) => out.push(e),
        MetadataNode::Container(c) => {
            for child in &c.children {
                collect_entities(child, out);
            }
        }
    }
}

/// Formats an instant as xs:dateTime in UTC with second precision.
pub fn format_instant(instant: DateTime<Utc>) -> String {
    instant.to_rfc3339_opts(SecondsFormat::Secs, true)
}

/// Parses an xs:dateTime value.
///
/// # Errors
///
/// Returns `MetadataError::Model` when the value is not a valid timestamp
/// with a time zone.
pub fn parse_instant(value: &str) -> Result<DateTime<Utc>, MetadataError> {
    DateTime::parse_from_rfc3339(value.trim())
        .map(|dt| dt.with_timezone(&Utc))
        .map_err(|e| MetadataError::Model(format!("invalid xs:dateTime '{value}': {e}")))
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    const IDP: &str = r#"<md:EntityDescriptor xmlns:md="urn:oasis:names:tc:SAML:2.0:metadata" xmlns:ds="http://www.w3.org/2000/09/xmldsig#" entityID="https://idp.example.org/" validUntil="2030-01-01T00:00:00Z">
  <ds:Signature><ds:SignedInfo/></ds:Signature>
  <md:IDPSSODescriptor protocolSupportEnumeration="urn:oasis:names:tc:SAML:2.0:protocol urn:oasis:names:tc:SAML:1.1:protocol"/>
  <md:AttributeAuthorityDescriptor protocolSupportEnumeration="urn:oasis:names:tc:SAML:2.0:protocol"/>
</md:EntityDescriptor>"#;

    #[test]
    fn parses_entity_roles_and_protocols() {
        let node = MetadataNode::parse(IDP).expect("should parse");
        let MetadataNode::Entity(entity) = node else {
            panic!("expected an entity");
        };
        assert_eq!(entity.entity_id, "https://idp.example.org/");
        assert_eq!(entity.roles.len(), 2);
        assert_eq!(entity.roles[0].kind, RoleKind::IdentityProvider);
        assert_eq!(entity.roles[0].protocols.len(), 2);
        assert_eq!(entity.roles[1].kind, RoleKind::AttributeAuthority);
        assert_eq!(
            entity.valid_until,
            Some(Utc.with_ymd_and_hms(2030, 1, 1, 0, 0, 0).unwrap())
        );
    }

    #[test]
    fn drops_entity_signature() {
        let node = MetadataNode::parse(IDP).unwrap();
        let MetadataNode::Entity(entity) = node else {
            panic!("expected an entity");
        };
        assert!(entity.element.find_child(NS_DSIG, "Signature").is_none());
    }

    #[test]
    fn nested_entities_carry_ancestor_namespaces() {
        let doc = r#"<EntitiesDescriptor xmlns="urn:oasis:names:tc:SAML:2.0:metadata" xmlns:mdui="urn:oasis:names:tc:SAML:metadata:ui">
  <EntitiesDescriptor Name="inner">
    <EntityDescriptor entityID="urn:a"><SPSSODescriptor protocolSupportEnumeration="urn:oasis:names:tc:SAML:2.0:protocol"><Extensions><mdui:UIInfo/></Extensions></SPSSODescriptor></EntityDescriptor>
  </EntitiesDescriptor>
  <EntityDescriptor entityID="urn:b"/>
</EntitiesDescriptor>"#;
        let node = MetadataNode::parse(doc).unwrap();
        let entities = node.entities();
        assert_eq!(entities.len(), 2);
        assert_eq!(entities[0].entity_id, "urn:a");
        assert_eq!(entities[1].entity_id, "urn:b");

        // The extracted entity serializes and re-parses on its own.
        let standalone = MetadataNode::Entity(entities[0].clone()).to_xml();
        let reparsed = MetadataNode::parse(&standalone).unwrap();
        assert_eq!(reparsed.entities()[0].entity_id, "urn:a");
        assert_eq!(reparsed.entities()[0].roles[0].kind, RoleKind::ServiceProvider);
    }

    #[test]
    fn rejects_unexpected_root() {
        let err = MetadataNode::parse(r#"<html xmlns="http://www.w3.org/1999/xhtml"/>"#).unwrap_err();
        assert!(matches!(err, MetadataError::UnexpectedRoot(_)));
    }

    #[test]
    fn rejects_root_in_wrong_namespace() {
        let err = MetadataNode::parse(r#"<EntityDescriptor entityID="urn:x"/>"#).unwrap_err();
        assert!(matches!(err, MetadataError::UnexpectedRoot(_)));
    }

    #[test]
    fn rejects_entity_without_entity_id() {
        let err = MetadataNode::parse(
            r#"<md:EntityDescriptor xmlns:md="urn:oasis:names:tc:SAML:2.0:metadata"/>"#,
        )
        .unwrap_err();
        assert!(matches!(err, MetadataError::Model(_)));
    }

    #[test]
    fn rejects_role_without_protocols() {
        let err = MetadataNode::parse(
            r#"<md:EntityDescriptor xmlns:md="urn:oasis:names:tc:SAML:2.0:metadata" entityID="urn:x"><md:SPSSODescriptor/></md:EntityDescriptor>"#,
        )
        .unwrap_err();
        assert!(matches!(err, MetadataError::Model(ref m) if m.contains("protocolSupportEnumeration")));
    }

    #[test]
    fn rejects_invalid_valid_until() {
        let err = MetadataNode::parse(
            r#"<md:EntitiesDescriptor xmlns:md="urn:oasis:names:tc:SAML:2.0:metadata" validUntil="tomorrow"/>"#,
        )
        .unwrap_err();
        assert!(matches!(err, MetadataError::Model(_)));
    }

    #[test]
    fn generic_role_descriptor_uses_xsi_type() {
        let node = MetadataNode::parse(
            r#"<md:EntityDescriptor xmlns:md="urn:oasis:names:tc:SAML:2.0:metadata" xmlns:xsi="http://www.w3.org/2001/XMLSchema-instance" entityID="urn:x"><md:RoleDescriptor xsi:type="fed:SecurityTokenServiceType" protocolSupportEnumeration="http://docs.oasis-open.org/wsfed/federation/200706"/></md:EntityDescriptor>"#,
        )
        .unwrap();
        let entities = node.entities();
        assert_eq!(
            entities[0].roles[0].kind,
            RoleKind::Other("fed:SecurityTokenServiceType".to_string())
        );
    }

    #[test]
    fn container_round_trips_through_xml() {
        let mut container = EntitiesDescriptor::new();
        container.valid_until = Some(Utc.with_ymd_and_hms(2031, 5, 6, 7, 8, 9).unwrap());
        container.children.push(MetadataNode::parse(IDP).unwrap());
        let xml = MetadataNode::Container(container.clone()).to_xml();
        assert!(xml.contains(r#"validUntil="2031-05-06T07:08:09Z""#));

        let reparsed = MetadataNode::parse(&xml).unwrap();
        let MetadataNode::Container(again) = reparsed else {
            panic!("expected a container");
        };
        assert_eq!(again.valid_until, container.valid_until);
        assert_eq!(again.children.len(), 1);
        assert_eq!(
            again.children[0].entities()[0].entity_id,
            "https://idp.example.org/"
        );
    }
}
