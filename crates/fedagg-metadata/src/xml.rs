//! Namespace-aware XML element tree.
//!
//! Metadata documents are read into a small owned tree instead of a typed
//! schema binding: entity descriptors are carried through the aggregate
//! untouched, so every element, attribute and text node has to survive a
//! parse/serialize cycle. Each element records the namespace URI its prefix
//! resolved to and the namespace declarations written on it.

use std::collections::BTreeMap;

use quick_xml::events::{BytesStart, Event};
use quick_xml::Reader;

use crate::error::MetadataError;

/// Prefix to namespace URI bindings in scope at some element.
///
/// `None` is the default namespace. An empty URI undeclares the default
/// namespace.
pub type NamespaceScope = BTreeMap<Option<String>, String>;

/// A namespace declaration (`xmlns` or `xmlns:prefix`) written on an element.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct NamespaceDecl {
    pub prefix: Option<String>,
    pub uri: String,
}

/// A non-declaration attribute.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct XmlAttribute {
    pub prefix: Option<String>,
    pub local_name: String,
    /// Namespace URI for prefixed attributes; unprefixed attributes have none.
    pub namespace: Option<String>,
    pub value: String,
}

/// A child node of an element.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum XmlNode {
    Element(XmlElement),
    Text(String),
}

/// An element with its attributes, declarations and children.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct XmlElement {
    pub prefix: Option<String>,
    pub local_name: String,
    pub namespace: Option<String>,
    pub namespaces: Vec<NamespaceDecl>,
    pub attributes: Vec<XmlAttribute>,
    pub children: Vec<XmlNode>,
}

impl XmlAttribute {
    /// Creates an unprefixed attribute.
    pub fn new(local_name: impl Into<String>, value: impl Into<String>) -> Self {
        Self {
            prefix: None,
            local_name: local_name.into(),
            namespace: None,
            value: value.into(),
        }
    }

    /// Creates a namespaced attribute such as `xml:lang`.
    pub fn namespaced(
        prefix: impl Into<String>,
        namespace: impl Into<String>,
        local_name: impl Into<String>,
        value: impl Into<String>,
    ) -> Self {
        Self {
            prefix: Some(prefix.into()),
            local_name: local_name.into(),
            namespace: Some(namespace.into()),
            value: value.into(),
        }
    }

    /// Returns the name as written, `prefix:local` or `local`.
    pub fn qualified_name(&self) -> String {
        qualify(self.prefix.as_deref(), &self.local_name)
    }
}

impl XmlElement {
    /// Creates an empty element bound to `namespace` with the given prefix.
    pub fn new(prefix: Option<&str>, local_name: &str, namespace: Option<&str>) -> Self {
        Self {
            prefix: prefix.map(str::to_string),
            local_name: local_name.to_string(),
            namespace: namespace.map(str::to_string),
            namespaces: Vec::new(),
            attributes: Vec::new(),
            children: Vec::new(),
        }
    }

    /// Returns the name as written, `prefix:local` or `local`.
    pub fn qualified_name(&self) -> String {
        qualify(self.prefix.as_deref(), &self.local_name)
    }

    /// Returns true when the element has the given namespace and local name.
    pub fn is(&self, namespace: &str, local_name: &str) -> bool {
        self.local_name == local_name && self.namespace.as_deref() == Some(namespace)
    }

    /// Value of an unprefixed attribute.
    pub fn attribute(&self, local_name: &str) -> Option<&str> {
        self.attributes
            .iter()
            .find(|a| a.namespace.is_none() && a.local_name == local_name)
            .map(|a| a.value.as_str())
    }

    /// Value of a namespaced attribute.
    pub fn attribute_ns(&self, namespace: &str, local_name: &str) -> Option<&str> {
        self.attributes
            .iter()
            .find(|a| a.namespace.as_deref() == Some(namespace) && a.local_name == local_name)
            .map(|a| a.value.as_str())
    }

    /// Sets an unprefixed attribute, replacing any existing value.
    pub fn set_attribute(&mut self, local_name: &str, value: impl Into<String>) {
        let value = value.into();
        match self
            .attributes
            .iter_mut()
            .find(|a| a.namespace.is_none() && a.local_name == local_name)
        {
            Some(existing) => existing.value = value,
            None => self.attributes.push(XmlAttribute::new(local_name, value)),
        }
    }

    /// Builder form of [`XmlElement::set_attribute`].
    pub fn with_attribute(mut self, local_name: &str, value: impl Into<String>) -> Self {
        self.set_attribute(local_name, value);
        self
    }

    /// Adds a namespace declaration unless the same prefix is already declared here.
    pub fn declare_namespace(&mut self, prefix: Option<&str>, uri: &str) {
        if self
            .namespaces
            .iter()
            .any(|d| d.prefix.as_deref() == prefix)
        {
            return;
        }
        self.namespaces.push(NamespaceDecl {
            prefix: prefix.map(str::to_string),
            uri: uri.to_string(),
        });
    }

    /// Appends a child element.
    pub fn push_element(&mut self, child: XmlElement) {
        self.children.push(XmlNode::Element(child));
    }

    /// Appends a text node.
    pub fn push_text(&mut self, text: impl Into<String>) {
        self.children.push(XmlNode::Text(text.into()));
    }

    /// Iterates over child elements, skipping text.
    pub fn child_elements(&self) -> impl Iterator<Item = &XmlElement> {
        self.children.iter().filter_map(|c| match c {
            XmlNode::Element(e) => Some(e),
            XmlNode::Text(_) => None,
        })
    }

    /// First child element with the given namespace and local name.
    pub fn find_child(&self, namespace: &str, local_name: &str) -> Option<&XmlElement> {
        self.child_elements().find(|e| e.is(namespace, local_name))
    }

    /// Removes every child element with the given namespace and local name.
    ///
    /// Returns the number of removed elements.
    pub fn remove_children(&mut self, namespace: &str, local_name: &str) -> usize {
        let before = self.children.len();
        self.children
            .retain(|c| !matches!(c, XmlNode::Element(e) if e.is(namespace, local_name)));
        let removed = before - self.children.len();
        if removed > 0 {
            self.merge_adjacent_text();
        }
        removed
    }

    fn merge_adjacent_text(&mut self) {
        let mut merged: Vec<XmlNode> = Vec::with_capacity(self.children.len());
        for child in std::mem::take(&mut self.children) {
            if let XmlNode::Text(next) = &child {
                if let Some(XmlNode::Text(previous)) = merged.last_mut() {
                    previous.push_str(next);
                    continue;
                }
            }
            merged.push(child);
        }
        self.children = merged;
    }

    /// Concatenated text content of this element and its descendants.
    pub fn text(&self) -> String {
        let mut out = String::new();
        collect_text(self, &mut out);
        out
    }

    /// Namespace bindings in scope at this element given the parent's scope.
    pub fn scope_within(&self, parent: &NamespaceScope) -> NamespaceScope {
        let mut scope = parent.clone();
        for decl in &self.namespaces {
            scope.insert(decl.prefix.clone(), decl.uri.clone());
        }
        scope
    }

    /// Declares on this element every binding of `scope` it does not declare
    /// itself, so it can be serialized outside its original document.
    pub fn adopt_namespaces(&mut self, scope: &NamespaceScope) {
        for (prefix, uri) in scope {
            if prefix.as_deref() == Some("xml") {
                continue;
            }
            if prefix.is_none() && uri.is_empty() {
                continue;
            }
            self.declare_namespace(prefix.as_deref(), uri);
        }
        self.namespaces.sort_by(|a, b| a.prefix.cmp(&b.prefix));
    }
}

fn collect_text(element: &XmlElement, out: &mut String) {
    for child in &element.children {
        match child {
            XmlNode::Text(t) => out.push_str(t),
            XmlNode::Element(e) => collect_text(e, out),
        }
    }
}

pub(crate) fn qualify(prefix: Option<&str>, local: &str) -> String {
    match prefix {
        Some(p) => format!("{p}:{local}"),
        None => local.to_string(),
    }
}

fn split_qname(qname: &str) -> (Option<&str>, &str) {
    match qname.split_once(':') {
        Some((prefix, local)) => (Some(prefix), local),
        None => (None, qname),
    }
}

/// Scope every document starts with: only the reserved `xml` prefix.
pub fn root_scope() -> NamespaceScope {
    let mut scope = NamespaceScope::new();
    scope.insert(
        Some("xml".to_string()),
        fedagg_types::NS_XML.to_string(),
    );
    scope
}

/// Parses a complete document and returns its document element.
///
/// Comments, processing instructions and the doctype are dropped. Line
/// endings are normalized to `\n` and literal whitespace in attribute values
/// is normalized to spaces, as an XML processor would.
///
/// # Errors
///
/// Returns `MetadataError::Xml` for syntax errors, unbound prefixes, text
/// outside the document element, or more than one document element.
pub fn parse_document(text: &str) -> Result<XmlElement, MetadataError> {
    let normalized = text.replace("\r\n", "\n").replace('\r', "\n");
    let mut reader = Reader::from_str(&normalized);

    let mut stack: Vec<(XmlElement, NamespaceScope)> = Vec::new();
    let mut root: Option<XmlElement> = None;

    loop {
        match reader.read_event()? {
            Event::Start(start) => {
                let parent_scope = stack.last().map(|(_, s)| s.clone()).unwrap_or_else(root_scope);
                ensure_single_root(&root, &stack)?;
                let (element, scope) = open_element(&start, &parent_scope)?;
                stack.push((element, scope));
            }
            Event::Empty(start) => {
                let parent_scope = stack.last().map(|(_, s)| s.clone()).unwrap_or_else(root_scope);
                ensure_single_root(&root, &stack)?;
                let (element, _) = open_element(&start, &parent_scope)?;
                close_element(element, &mut stack, &mut root);
            }
            Event::End(_) => {
                let (element, _) = stack
                    .pop()
                    .ok_or_else(|| MetadataError::Xml("unexpected closing tag".to_string()))?;
                close_element(element, &mut stack, &mut root);
            }
            Event::Text(t) => {
                let raw = std::str::from_utf8(&t)?;
                let value = quick_xml::escape::unescape(raw)?;
                push_text(&mut stack, &value)?;
            }
            Event::CData(c) => {
                let value = std::str::from_utf8(&c)?.to_string();
                push_text(&mut stack, &value)?;
            }
            Event::Eof => break,
            // Declarations, comments, processing instructions and doctype
            // carry nothing the metadata model needs.
            _ => {}
        }
    }

    if !stack.is_empty() {
        return Err(MetadataError::Xml("unexpected end of document".to_string()));
    }
    root.ok_or_else(|| MetadataError::Xml("document has no root element".to_string()))
}

fn ensure_single_root(
    root: &Option<XmlElement>,
    stack: &[(XmlElement, NamespaceScope)],
) -> Result<(), MetadataError> {
    if stack.is_empty() && root.is_some() {
        return Err(MetadataError::Xml(
            "more than one document element".to_string(),
        ));
    }
    Ok(())
}

fn close_element(
    element: XmlElement,
    stack: &mut [(XmlElement, NamespaceScope)],
    root: &mut Option<XmlElement>,
) {
    match stack.last_mut() {
        Some((parent, _)) => parent.push_element(element),
        None => *root = Some(element),
    }
}

fn push_text(
    stack: &mut [(XmlElement, NamespaceScope)],
    value: &str,
) -> Result<(), MetadataError> {
    match stack.last_mut() {
        Some((parent, _)) => {
            if let Some(XmlNode::Text(previous)) = parent.children.last_mut() {
                previous.push_str(value);
            } else {
                parent.push_text(value);
            }
            Ok(())
        }
        None if value.trim().is_empty() => Ok(()),
        None => Err(MetadataError::Xml(
            "text outside the document element".to_string(),
        )),
    }
}

fn open_element(
    start: &BytesStart<'_>,
    parent_scope: &NamespaceScope,
) -> Result<(XmlElement, NamespaceScope), MetadataError> {
    let name = start.name();
    let qname = std::str::from_utf8(name.as_ref())?;
    let (prefix, local_name) = split_qname(qname);

    let mut scope = parent_scope.clone();
    let mut namespaces = Vec::new();
    let mut raw_attributes = Vec::new();

    for attr in start.attributes() {
        let attr = attr.map_err(|e| MetadataError::Xml(e.to_string()))?;
        let key = std::str::from_utf8(attr.key.as_ref())?.to_string();
        let raw = std::str::from_utf8(&attr.value)?;
        let value = quick_xml::escape::unescape(&normalize_attribute_whitespace(raw))?.into_owned();

        if key == "xmlns" {
            scope.insert(None, value.clone());
            namespaces.push(NamespaceDecl {
                prefix: None,
                uri: value,
            });
        } else if let Some(declared) = key.strip_prefix("xmlns:") {
            scope.insert(Some(declared.to_string()), value.clone());
            namespaces.push(NamespaceDecl {
                prefix: Some(declared.to_string()),
                uri: value,
            });
        } else {
            raw_attributes.push((key, value));
        }
    }

    let namespace = resolve(&scope, prefix)?;
    let mut attributes = Vec::with_capacity(raw_attributes.len());
    for (key, value) in raw_attributes {
        let (attr_prefix, attr_local) = split_qname(&key);
        let attr_namespace = match attr_prefix {
            Some(_) => resolve(&scope, attr_prefix)?,
            None => None,
        };
        attributes.push(XmlAttribute {
            prefix: attr_prefix.map(str::to_string),
            local_name: attr_local.to_string(),
            namespace: attr_namespace,
            value,
        });
    }

    let element = XmlElement {
        prefix: prefix.map(str::to_string),
        local_name: local_name.to_string(),
        namespace,
        namespaces,
        attributes,
        children: Vec::new(),
    };
    Ok((element, scope))
}

fn resolve(scope: &NamespaceScope, prefix: Option<&str>) -> Result<Option<String>, MetadataError> {
    match scope.get(&prefix.map(str::to_string)) {
        Some(uri) if !uri.is_empty() => Ok(Some(uri.clone())),
        _ if prefix.is_none() => Ok(None),
        _ => Err(MetadataError::Xml(format!(
            "unbound namespace prefix '{}'",
            prefix.unwrap_or_default()
        ))),
    }
}

fn normalize_attribute_whitespace(raw: &str) -> String {
    raw.chars()
        .map(|c| if matches!(c, '\t' | '\n' | '\r') { ' ' } else { c })
        .collect()
}
