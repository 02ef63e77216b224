//! XML serialization for [`XmlElement`] trees.
//!
//! The writer tracks which namespace bindings are already rendered by
//! ancestors: redundant declarations are skipped, and bindings needed by an
//! element or attribute prefix but not declared anywhere are added on the
//! spot. Trees built in code therefore need no explicit declarations.

use crate::xml::{NamespaceScope, XmlElement, XmlNode};

const INDENT: &str = "  ";

/// Serializes a document element with an XML declaration.
pub fn to_xml_string(root: &XmlElement) -> String {
    let mut out = String::from("<?xml version=\"1.0\"?>\n");
    write_element(root, &NamespaceScope::new(), &mut out, None);
    out.push('\n');
    out
}

/// Serializes a document element with an XML declaration and indentation.
///
/// Only element-only content is re-indented; elements holding text keep
/// their content verbatim.
pub fn to_pretty_xml_string(root: &XmlElement) -> String {
    let mut out = String::from("<?xml version=\"1.0\"?>\n");
    write_element(root, &NamespaceScope::new(), &mut out, Some(0));
    out.push('\n');
    out
}

/// Serializes an element without an XML declaration.
pub fn element_to_string(element: &XmlElement) -> String {
    let mut out = String::new();
    write_element(element, &NamespaceScope::new(), &mut out, None);
    out
}

fn write_element(
    element: &XmlElement,
    rendered: &NamespaceScope,
    out: &mut String,
    depth: Option<usize>,
) {
    let mut scope = rendered.clone();
    let mut declarations: Vec<(Option<String>, String)> = Vec::new();

    let mut bind = |prefix: Option<String>, uri: String, scope: &mut NamespaceScope| {
        if prefix.as_deref() == Some("xml") {
            return;
        }
        let current = scope.get(&prefix).cloned().unwrap_or_default();
        if current != uri {
            scope.insert(prefix.clone(), uri.clone());
            declarations.retain(|(p, _)| *p != prefix);
            declarations.push((prefix, uri));
        }
    };

    for decl in &element.namespaces {
        bind(decl.prefix.clone(), decl.uri.clone(), &mut scope);
    }
    bind(
        element.prefix.clone(),
        element.namespace.clone().unwrap_or_default(),
        &mut scope,
    );
    for attr in &element.attributes {
        if let (Some(prefix), Some(uri)) = (&attr.prefix, &attr.namespace) {
            bind(Some(prefix.clone()), uri.clone(), &mut scope);
        }
    }

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
    for attr in &element.attributes {
        out.push(' ');
        out.push_str(&attr.qualified_name());
        out.push_str("=\"");
        out.push_str(&escape_attribute(&attr.value));
        out.push('"');
    }

    if element.children.is_empty() {
        out.push_str("/>");
        return;
    }
    out.push('>');

    let element_only = element.children.iter().all(|c| match c {
        XmlNode::Element(_) => true,
        XmlNode::Text(t) => t.trim().is_empty(),
    });

    match depth {
        Some(level) if element_only => {
            for child in &element.children {
                if let XmlNode::Element(e) = child {
                    out.push('\n');
                    out.push_str(&INDENT.repeat(level + 1));
                    write_element(e, &scope, out, Some(level + 1));
                }
            }
            out.push('\n');
            out.push_str(&INDENT.repeat(level));
        }
        _ => {
            for child in &element.children {
                match child {
                    XmlNode::Element(e) => write_element(e, &scope, out, None),
                    XmlNode::Text(t) => out.push_str(&escape_text(t)),
                }
            }
        }
    }

    out.push_str("</");
    out.push_str(&name);
    out.push('>');
}

/// Escapes character data for element content.
pub fn escape_text(value: &str) -> String {
    let mut out = String::with_capacity(value.len());
    for c in value.chars() {
        match c {
            '&' => out.push_str("&amp;"),
            '<' => out.push_str("&lt;"),
            '>' => out.push_str("&gt;"),
            '\r' => out.push_str("&#xD;"),
            _ => out.push(c),
        }
    }
    out
}

/// Escapes an attribute value for a double-quoted attribute.
///
/// Whitespace characters other than space are written as character
/// references so they survive attribute-value normalization on re-parse.
pub fn escape_attribute(value: &str) -> String {
    let mut out = String::with_capacity(value.len());
    for c in value.chars() {
        match c {
            '&' => out.push_str("&amp;"),
            '<' => out.push_str("&lt;"),
            '"' => out.push_str("&quot;"),
            '\t' => out.push_str("&#x9;"),
            '\n' => out.push_str("&#xA;"),
            '\r' => out.push_str("&#xD;"),
            _ => out.push(c),
        }
    }
    out
}
