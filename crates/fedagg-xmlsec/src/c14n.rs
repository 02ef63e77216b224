//! Canonical XML 1.0 and Exclusive XML Canonicalization over element trees.
//!
//! Comments are never part of the tree, so the `#WithComments` variants
//! produce the same octets as their plain counterparts.

use std::collections::BTreeSet;

use fedagg_metadata::{escape_attribute, escape_text, NamespaceScope, XmlElement, XmlNode};

use crate::error::XmlSecError;

pub const EXC_C14N: &str = "http://www.w3.org/2001/10/xml-exc-c14n#";
pub const EXC_C14N_WITH_COMMENTS: &str = "http://www.w3.org/2001/10/xml-exc-c14n#WithComments";
pub const C14N: &str = "http://www.w3.org/TR/2001/REC-xml-c14n-20010315";
pub const C14N_WITH_COMMENTS: &str =
    "http://www.w3.org/TR/2001/REC-xml-c14n-20010315#WithComments";

/// A canonicalization algorithm.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Canonicalization {
    Inclusive { with_comments: bool },
    /// Exclusive canonicalization with its `InclusiveNamespaces` prefix
    /// list; `#default` names the default namespace.
    Exclusive {
        with_comments: bool,
        inclusive_prefixes: Vec<String>,
    },
}

impl Canonicalization {
    /// Plain exclusive canonicalization, the method used when signing.
    pub fn exclusive() -> Self {
        Self::Exclusive {
            with_comments: false,
            inclusive_prefixes: Vec::new(),
        }
    }

    /// Algorithm URI.
    pub fn uri(&self) -> &'static str {
        match self {
            Self::Inclusive { with_comments: false } => C14N,
            Self::Inclusive { with_comments: true } => C14N_WITH_COMMENTS,
            Self::Exclusive {
                with_comments: false,
                ..
            } => EXC_C14N,
            Self::Exclusive {
                with_comments: true,
                ..
            } => EXC_C14N_WITH_COMMENTS,
        }
    }

    /// Parses an algorithm URI together with an optional prefix list.
    ///
    /// # Errors
    ///
    /// Returns `XmlSecError::UnsupportedAlgorithm` for unknown URIs.
    pub fn from_uri(uri: &str, inclusive_prefixes: Vec<String>) -> Result<Self, XmlSecError> {
        match uri.trim() {
            C14N => Ok(Self::Inclusive {
                with_comments: false,
            }),
            C14N_WITH_COMMENTS => Ok(Self::Inclusive {
                with_comments: true,
            }),
            EXC_C14N => Ok(Self::Exclusive {
                with_comments: false,
                inclusive_prefixes,
            }),
            EXC_C14N_WITH_COMMENTS => Ok(Self::Exclusive {
                with_comments: true,
                inclusive_prefixes,
            }),
            other => Err(XmlSecError::UnsupportedAlgorithm(other.to_string())),
        }
    }

    /// Returns true when `uri` names any supported canonicalization method.
    pub fn is_canonicalization_uri(uri: &str) -> bool {
        matches!(
            uri.trim(),
            C14N | C14N_WITH_COMMENTS | EXC_C14N | EXC_C14N_WITH_COMMENTS
        )
    }
}

/// Canonicalizes the subtree rooted at `element`.
///
/// `inherited` holds the namespace bindings in scope at the element's
/// parent in its document; it is what makes the canonical form of a
/// `SignedInfo` independent of where the signature sits.
pub fn canonicalize(
    element: &XmlElement,
    inherited: &NamespaceScope,
    method: &Canonicalization,
) -> String {
    let mut out = String::new();
    write_canonical(element, inherited, &NamespaceScope::new(), method, &mut out);
    out
}

fn write_canonical(
    element: &XmlElement,
    parent_scope: &NamespaceScope,
    rendered_by_ancestors: &NamespaceScope,
    method: &Canonicalization,
    out: &mut String,
) {
    let scope = effective_scope(element, parent_scope);

    let candidates: BTreeSet<Option<String>> = match method {
        Canonicalization::Inclusive { .. } => scope.keys().cloned().collect(),
        Canonicalization::Exclusive {
            inclusive_prefixes, ..
        } => {
            let mut used = BTreeSet::new();
            used.insert(element.prefix.clone());
            for attr in &element.attributes {
                if attr.prefix.is_some() {
                    used.insert(attr.prefix.clone());
                }
            }
            for listed in inclusive_prefixes {
                let key = if listed == "#default" {
                    None
                } else {
                    Some(listed.clone())
                };
                if scope.contains_key(&key) {
                    used.insert(key);
                }
            }
            used
        }
    };

    let mut rendered = rendered_by_ancestors.clone();
    let mut declarations: Vec<(Option<String>, String)> = Vec::new();
    for prefix in candidates {
        if prefix.as_deref() == Some("xml") {
            continue;
        }
        let value = scope.get(&prefix).cloned().unwrap_or_default();
        let current = rendered.get(&prefix).cloned();
        let needed = match &prefix {
            None => value != current.unwrap_or_default(),
            Some(_) => !value.is_empty() && current.as_deref() != Some(value.as_str()),
        };
        if needed {
            rendered.insert(prefix.clone(), value.clone());
            declarations.push((prefix, value));
        }
    }
    declarations.sort_by(|a, b| {
        a.0.as_deref()
            .unwrap_or_default()
            .cmp(b.0.as_deref().unwrap_or_default())
    });

    let mut attributes: Vec<_> = element.attributes.iter().collect();
    attributes.sort_by(|a, b| {
        let left = (a.namespace.as_deref().unwrap_or_default(), a.local_name.as_str());
        let right = (b.namespace.as_deref().unwrap_or_default(), b.local_name.as_str());
        left.cmp(&right)
    });

    let name = element.qualified_name();
    out.push('<');
    out.push_str(&name);
    for (prefix, uri) in &declarations {
        match prefix {
            Some(p) => {
                out.push_str(" xmlns:");
                out.push_str(p);
            }
            None => out.push_str(" xmlns"),
        }
        out.push_str("=\"");
        out.push_str(&escape_attribute(uri));
        out.push('"');
    }
    for attr in attributes {
        out.push(' ');
        out.push_str(&attr.qualified_name());
        out.push_str("=\"");
        out.push_str(&escape_attribute(&attr.value));
        out.push('"');
    }
    out.push('>');

    for child in &element.children {
        match child {
            XmlNode::Element(e) => write_canonical(e, &scope, &rendered, method, out),
            XmlNode::Text(t) => out.push_str(&escape_text(t)),
        }
    }

    out.push_str("</");
    out.push_str(&name);
    out.push('>');
}

/// In-scope bindings at `element`, including the ones its own name and
/// attribute prefixes imply. Trees built in code carry namespaces on the
/// nodes without declaring them.
fn effective_scope(element: &XmlElement, parent_scope: &NamespaceScope) -> NamespaceScope {
    let mut scope = element.scope_within(parent_scope);
    if element.prefix.as_deref() != Some("xml") {
        scope.insert(
            element.prefix.clone(),
            element.namespace.clone().unwrap_or_default(),
        );
    }
    for attr in &element.attributes {
        if let (Some(prefix), Some(uri)) = (&attr.prefix, &attr.namespace) {
            if prefix != "xml" {
                scope.insert(Some(prefix.clone()), uri.clone());
            }
        }
    }
    scope
}

#[cfg(test)]
mod tests {
    use super::*;
    use fedagg_metadata::{parse_document, root_scope};

    fn inclusive() -> Canonicalization {
        Canonicalization::Inclusive {
            with_comments: false,
        }
    }

    #[test]
    fn exclusive_drops_unused_namespaces_and_sorts_attributes() {
        let doc = parse_document(
            r#"<a:root xmlns:a="urn:a" xmlns:b="urn:b" z="1" a:y="2" b="3"><a:child/></a:root>"#,
        )
        .unwrap();
        let c14n = canonicalize(&doc, &root_scope(), &Canonicalization::exclusive());
        assert_eq!(
            c14n,
            r#"<a:root xmlns:a="urn:a" b="3" z="1" a:y="2"><a:child></a:child></a:root>"#
        );
    }

    #[test]
    fn inclusive_keeps_all_in_scope_namespaces_on_apex() {
        let doc = parse_document(
            r#"<a:root xmlns:b="urn:b" xmlns:a="urn:a"><a:child xmlns:b="urn:b"/></a:root>"#,
        )
        .unwrap();
        let c14n = canonicalize(&doc, &root_scope(), &inclusive());
        assert_eq!(
            c14n,
            r#"<a:root xmlns:a="urn:a" xmlns:b="urn:b"><a:child></a:child></a:root>"#
        );
    }

    #[test]
    fn exclusive_declares_namespace_where_first_used() {
        let doc = parse_document(
            r#"<root xmlns:x="urn:x"><child><x:leaf/></child></root>"#,
        )
        .unwrap();
        let c14n = canonicalize(&doc, &root_scope(), &Canonicalization::exclusive());
        assert_eq!(
            c14n,
            r#"<root><child><x:leaf xmlns:x="urn:x"></x:leaf></child></root>"#
        );
    }

    #[test]
    fn inclusive_prefix_list_forces_declaration() {
        let doc = parse_document(r#"<root xmlns:x="urn:x" xmlns:y="urn:y"/>"#).unwrap();
        let method = Canonicalization::Exclusive {
            with_comments: false,
            inclusive_prefixes: vec!["y".to_string()],
        };
        assert_eq!(
            canonicalize(&doc, &root_scope(), &method),
            r#"<root xmlns:y="urn:y"></root>"#
        );
    }

    #[test]
    fn subtree_uses_inherited_bindings() {
        let doc = parse_document(
            r#"<p:outer xmlns:p="urn:p" xmlns="urn:d"><p:inner><leaf/></p:inner></p:outer>"#,
        )
        .unwrap();
        let inner = doc.child_elements().next().unwrap();
        let inherited = doc.scope_within(&root_scope());
        assert_eq!(
            canonicalize(inner, &inherited, &Canonicalization::exclusive()),
            r#"<p:inner xmlns:p="urn:p"><leaf xmlns="urn:d"></leaf></p:inner>"#
        );
        assert_eq!(
            canonicalize(inner, &inherited, &inclusive()),
            r#"<p:inner xmlns="urn:d" xmlns:p="urn:p"><leaf></leaf></p:inner>"#
        );
    }

    #[test]
    fn escapes_text_and_attribute_characters() {
        let doc = parse_document("<a v=\"&quot;&#9;&lt;>\">&lt;&amp;&gt;&#13;</a>").unwrap();
        assert_eq!(
            canonicalize(&doc, &root_scope(), &inclusive()),
            "<a v=\"&quot;&#x9;&lt;>\">&lt;&amp;&gt;&#xD;</a>"
        );
    }

    #[test]
    fn undeclares_default_namespace_only_when_rendered() {
        let doc = parse_document(r#"<a xmlns="urn:a"><b xmlns=""/></a>"#).unwrap();
        assert_eq!(
            canonicalize(&doc, &root_scope(), &Canonicalization::exclusive()),
            r#"<a xmlns="urn:a"><b xmlns=""></b></a>"#
        );
        let plain = parse_document(r#"<a><b xmlns=""/></a>"#).unwrap();
        assert_eq!(
            canonicalize(&plain, &root_scope(), &inclusive()),
            "<a><b></b></a>"
        );
    }

    #[test]
    fn parses_method_uris() {
        assert_eq!(
            Canonicalization::from_uri(EXC_C14N, Vec::new()).unwrap(),
            Canonicalization::exclusive()
        );
        assert!(Canonicalization::from_uri("urn:unknown", Vec::new()).is_err());
        assert!(Canonicalization::is_canonicalization_uri(C14N_WITH_COMMENTS));
    }
}
