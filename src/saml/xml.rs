// src/saml/xml.rs
//! Minimal namespace-aware XML element tree used for every SAML message.
//!
//! SAML protocol messages never use mixed content, so an element carries
//! either child elements or a single text value. Text of leaf elements is
//! kept exactly as received; whitespace-only text between child elements is
//! dropped. Parsing goes through `quick-xml`'s namespace-resolving reader;
//! DOCTYPE declarations and undeclared prefixes are rejected outright.
//!
//! Element lookups match on namespace URI and local name, never on the
//! prefix a sender happened to choose. Canonicalization for signatures is
//! Exclusive XML Canonicalization via `xml_canonicalization`.

use quick_xml::events::{BytesDecl, BytesEnd, BytesStart, BytesText, Event};
use quick_xml::name::ResolveResult;
use quick_xml::reader::NsReader;
use quick_xml::Writer;
use thiserror::Error;
use xml_canonicalization::Canonicalizer;

/// SAML 2.0 protocol namespace.
pub const NS_PROTOCOL: &str = "urn:oasis:names:tc:SAML:2.0:protocol";
/// SAML 2.0 assertion namespace.
pub const NS_ASSERTION: &str = "urn:oasis:names:tc:SAML:2.0:assertion";
/// XML Signature namespace.
pub const NS_DSIG: &str = "http://www.w3.org/2000/09/xmldsig#";
/// SOAP 1.1 envelope namespace.
pub const NS_SOAP11: &str = "http://schemas.xmlsoap.org/soap/envelope/";
/// XML Schema instance namespace (for `xsi:type` on attribute values).
pub const NS_XSI: &str = "http://www.w3.org/2001/XMLSchema-instance";
/// XML Schema namespace.
pub const NS_XS: &str = "http://www.w3.org/2001/XMLSchema";

/// Maximum element nesting accepted by the parser.
const MAX_DEPTH: usize = 64;

#[derive(Debug, Error)]
pub enum XmlError {
    #[error("XML parse error: {0}")]
    Parse(String),

    #[error("DOCTYPE declarations are not accepted")]
    DoctypeRejected,

    #[error("namespace prefix '{0}' is not declared")]
    UnboundPrefix(String),

    #[error("document has no root element")]
    NoRoot,

    #[error("document has more than one root element")]
    MultipleRoots,

    #[error("element nesting exceeds {0} levels")]
    TooDeep(usize),

    #[error("XML write error: {0}")]
    Write(String),

    #[error("canonicalization failed: {0}")]
    Canonicalization(String),
}

/// One XML element.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct Element {
    /// Namespace URI the element name resolves to
    pub namespace: Option<String>,
    /// Namespace prefix as written (`saml` in `saml:Issuer`)
    pub prefix: Option<String>,
    /// Local name (`Issuer` in `saml:Issuer`)
    pub name: String,
    /// Attributes in document order, keys as written (including `xmlns*`)
    pub attributes: Vec<(String, String)>,
    pub children: Vec<Element>,
    pub text: Option<String>,
    /// Prefix bindings inherited from the ancestors of a parsed element
    scope: Vec<(String, String)>,
}

impl Element {
    /// Creates an element in `namespace` (empty for none), written with `prefix`.
    pub fn new(namespace: &str, prefix: &str, name: &str) -> Self {
        Self {
            namespace: non_empty(namespace),
            prefix: non_empty(prefix),
            name: name.to_string(),
            ..Default::default()
        }
    }

    /// `saml:` element of the assertion namespace.
    pub fn saml(name: &str) -> Self {
        Self::new(NS_ASSERTION, "saml", name)
    }

    /// `samlp:` element of the protocol namespace.
    pub fn samlp(name: &str) -> Self {
        Self::new(NS_PROTOCOL, "samlp", name)
    }

    /// `ds:` element of the XML Signature namespace.
    pub fn ds(name: &str) -> Self {
        Self::new(NS_DSIG, "ds", name)
    }

    /// `soap11:` element of the SOAP 1.1 envelope namespace.
    pub fn soap(name: &str) -> Self {
        Self::new(NS_SOAP11, "soap11", name)
    }

    /// Builder-style attribute setter.
    pub fn attr(mut self, key: &str, value: impl Into<String>) -> Self {
        self.set_attribute(key, value);
        self
    }

    /// Builder-style text setter.
    pub fn text(mut self, text: impl Into<String>) -> Self {
        self.text = Some(text.into());
        self
    }

    /// Builder-style child append.
    pub fn child(mut self, child: Element) -> Self {
        self.children.push(child);
        self
    }

    pub fn set_attribute(&mut self, key: &str, value: impl Into<String>) {
        let value = value.into();
        match self.attributes.iter_mut().find(|(k, _)| k == key) {
            Some(slot) => slot.1 = value,
            None => self.attributes.push((key.to_string(), value)),
        }
    }

    /// Qualified name as written.
    pub fn qualified_name(&self) -> String {
        match &self.prefix {
            Some(prefix) => format!("{}:{}", prefix, self.name),
            None => self.name.clone(),
        }
    }

    /// Whether this element is `name` in `namespace`.
    pub fn is(&self, namespace: &str, name: &str) -> bool {
        self.name == name && self.namespace.as_deref() == Some(namespace)
    }

    /// Looks up an unqualified attribute (`ID`, `Name`).
    ///
    /// Prefixed attributes belong to a namespace and never match, so
    /// `xx:Name` is not `Name`.
    pub fn attribute(&self, key: &str) -> Option<&str> {
        self.attributes
            .iter()
            .find(|(k, _)| k == key)
            .map(|(_, v)| v.as_str())
    }

    /// First direct child that is `name` in `namespace`.
    pub fn find_child(&self, namespace: &str, name: &str) -> Option<&Element> {
        self.children.iter().find(|c| c.is(namespace, name))
    }

    /// All direct children that are `name` in `namespace`.
    pub fn find_children<'a>(
        &'a self,
        namespace: &'a str,
        name: &'a str,
    ) -> impl Iterator<Item = &'a Element> + 'a {
        self.children.iter().filter(move |c| c.is(namespace, name))
    }

    /// Follows a path of local names, all in `namespace`, through
    /// first-matching children.
    pub fn find_path(&self, namespace: &str, path: &[&str]) -> Option<&Element> {
        path.iter()
            .try_fold(self, |current, name| current.find_child(namespace, name))
    }

    /// Trimmed text content, `None` when absent or empty.
    ///
    /// For identifiers and URIs. Values that must survive byte for byte are
    /// read from [`Element::text`].
    pub fn text_value(&self) -> Option<&str> {
        self.text.as_deref().map(str::trim).filter(|t| !t.is_empty())
    }
}

fn non_empty(value: &str) -> Option<String> {
    if value.is_empty() {
        None
    } else {
        Some(value.to_string())
    }
}

/// Prefix declared by an `xmlns` / `xmlns:p` attribute key.
fn declared_prefix(key: &str) -> Option<&str> {
    if key == "xmlns" {
        Some("")
    } else {
        key.strip_prefix("xmlns:")
    }
}

fn lookup<'a>(bindings: &'a [(String, String)], prefix: &str) -> Option<&'a str> {
    bindings
        .iter()
        .rev()
        .find(|(p, _)| p == prefix)
        .map(|(_, uri)| uri.as_str())
}

/// Parses a complete XML document into its root element.
pub fn parse(xml: &str) -> Result<Element, XmlError> {
    let mut reader = NsReader::from_str(xml);

    let mut stack: Vec<Element> = Vec::new();
    let mut root: Option<Element> = None;
    // prefix bindings in effect at the top of the stack, and where each
    // open element's own declarations start
    let mut bindings: Vec<(String, String)> = Vec::new();
    let mut marks: Vec<usize> = Vec::new();

    loop {
        match reader.read_event() {
            Ok(Event::Start(e)) => {
                if stack.len() >= MAX_DEPTH {
                    return Err(XmlError::TooDeep(MAX_DEPTH));
                }
                let element = element_from_start(&reader, &e, &bindings)?;
                marks.push(bindings.len());
                bindings.extend(own_declarations(&element));
                stack.push(element);
            }
            Ok(Event::Empty(e)) => {
                let element = element_from_start(&reader, &e, &bindings)?;
                attach(&mut stack, &mut root, element)?;
            }
            Ok(Event::End(_)) => {
                let mut element = stack
                    .pop()
                    .ok_or_else(|| XmlError::Parse("unbalanced end tag".to_string()))?;
                if let Some(mark) = marks.pop() {
                    bindings.truncate(mark);
                }
                if !element.children.is_empty()
                    && element.text.as_deref().is_some_and(|t| t.trim().is_empty())
                {
                    element.text = None;
                }
                attach(&mut stack, &mut root, element)?;
            }
            Ok(Event::Text(e)) => {
                let text = e
                    .unescape()
                    .map_err(|err| XmlError::Parse(err.to_string()))?;
                append_text(&mut stack, &text);
            }
            Ok(Event::CData(e)) => {
                let text = String::from_utf8_lossy(&e).to_string();
                append_text(&mut stack, &text);
            }
            Ok(Event::DocType(_)) => return Err(XmlError::DoctypeRejected),
            Ok(Event::Eof) => break,
            Ok(_) => {}
            Err(e) => return Err(XmlError::Parse(e.to_string())),
        }
    }

    if !stack.is_empty() {
        return Err(XmlError::Parse("unexpected end of document".to_string()));
    }
    root.ok_or(XmlError::NoRoot)
}

fn own_declarations(element: &Element) -> Vec<(String, String)> {
    element
        .attributes
        .iter()
        .filter_map(|(k, v)| declared_prefix(k).map(|p| (p.to_string(), v.clone())))
        .collect()
}

fn utf8(bytes: &[u8]) -> Result<String, XmlError> {
    std::str::from_utf8(bytes)
        .map(str::to_string)
        .map_err(|e| XmlError::Parse(e.to_string()))
}

fn resolved(result: ResolveResult<'_>) -> Result<Option<String>, XmlError> {
    match result {
        ResolveResult::Bound(namespace) => utf8(namespace.0).map(Some),
        ResolveResult::Unbound => Ok(None),
        ResolveResult::Unknown(prefix) => Err(XmlError::UnboundPrefix(
            String::from_utf8_lossy(&prefix).to_string(),
        )),
    }
}

fn element_from_start(
    reader: &NsReader<&[u8]>,
    start: &BytesStart<'_>,
    inherited: &[(String, String)],
) -> Result<Element, XmlError> {
    let qname = utf8(start.name().as_ref())?;
    let (namespace, local) = reader.resolve_element(start.name());
    let namespace = resolved(namespace)?;
    let name = utf8(local.as_ref())?;
    let prefix = qname.split_once(':').map(|(p, _)| p.to_string());

    let mut attributes = Vec::new();
    for attr in start.attributes() {
        let attr = attr.map_err(|e| XmlError::Parse(e.to_string()))?;
        let key = utf8(attr.key.as_ref())?;
        if declared_prefix(&key).is_none() && !key.starts_with("xml:") {
            resolved(reader.resolve_attribute(attr.key).0)?;
        }
        let value = attr
            .unescape_value()
            .map_err(|e| XmlError::Parse(e.to_string()))?
            .to_string();
        attributes.push((key, value));
    }

    Ok(Element {
        namespace,
        prefix,
        name,
        attributes,
        children: Vec::new(),
        text: None,
        scope: inherited.to_vec(),
    })
}

fn attach(
    stack: &mut [Element],
    root: &mut Option<Element>,
    element: Element,
) -> Result<(), XmlError> {
    match stack.last_mut() {
        Some(parent) => {
            parent.children.push(element);
            Ok(())
        }
        None if root.is_none() => {
            *root = Some(element);
            Ok(())
        }
        None => Err(XmlError::MultipleRoots),
    }
}

fn append_text(stack: &mut [Element], text: &str) {
    if let Some(current) = stack.last_mut() {
        match &mut current.text {
            Some(existing) => existing.push_str(text),
            None => current.text = Some(text.to_string()),
        }
    }
}

/// Serializes an element as a standalone document with an XML declaration.
pub fn to_document(element: &Element) -> Result<String, XmlError> {
    let mut writer = Writer::new(Vec::new());
    writer
        .write_event(Event::Decl(BytesDecl::new("1.0", Some("UTF-8"), None)))
        .map_err(|e| XmlError::Write(e.to_string()))?;
    write_element(&mut writer, element, &mut Vec::new())?;
    String::from_utf8(writer.into_inner()).map_err(|e| XmlError::Write(e.to_string()))
}

/// Serializes an element without an XML declaration.
///
/// Every prefix the element or its descendants use is declared in the
/// output, including prefixes a parsed element inherited from ancestors
/// that are not part of the fragment.
pub fn to_fragment(element: &Element) -> Result<String, XmlError> {
    let mut writer = Writer::new(Vec::new());
    write_element(&mut writer, element, &mut Vec::new())?;
    String::from_utf8(writer.into_inner()).map_err(|e| XmlError::Write(e.to_string()))
}

fn write_element(
    writer: &mut Writer<Vec<u8>>,
    element: &Element,
    bindings: &mut Vec<(String, String)>,
) -> Result<(), XmlError> {
    let mark = bindings.len();
    let qname = element.qualified_name();
    let mut start = BytesStart::new(qname.as_str());

    for (key, value) in &element.attributes {
        if let Some(prefix) = declared_prefix(key) {
            bindings.push((prefix.to_string(), value.clone()));
        }
        start.push_attribute((key.as_str(), value.as_str()));
    }

    let mut missing: Vec<(String, String)> = Vec::new();
    let prefix = element.prefix.clone().unwrap_or_default();
    let namespace = element.namespace.clone().unwrap_or_default();
    let declarable = prefix.is_empty() || !namespace.is_empty();
    if declarable && lookup(bindings, &prefix).unwrap_or_default() != namespace {
        missing.push((prefix, namespace));
    }
    for (key, _) in &element.attributes {
        let prefix = match key.split_once(':') {
            Some((prefix, _)) if prefix != "xmlns" && prefix != "xml" => prefix,
            _ => continue,
        };
        if lookup(bindings, prefix).is_none() && !missing.iter().any(|(p, _)| p == prefix) {
            if let Some(uri) = lookup(&element.scope, prefix) {
                missing.push((prefix.to_string(), uri.to_string()));
            }
        }
    }
    for (prefix, uri) in missing {
        let key = if prefix.is_empty() {
            "xmlns".to_string()
        } else {
            format!("xmlns:{}", prefix)
        };
        start.push_attribute((key.as_str(), uri.as_str()));
        bindings.push((prefix, uri));
    }

    let result = if element.children.is_empty() && element.text.is_none() {
        writer
            .write_event(Event::Empty(start))
            .map_err(|e| XmlError::Write(e.to_string()))
    } else {
        write_content(writer, element, start, &qname, bindings)
    };
    bindings.truncate(mark);
    result
}

fn write_content(
    writer: &mut Writer<Vec<u8>>,
    element: &Element,
    start: BytesStart<'_>,
    qname: &str,
    bindings: &mut Vec<(String, String)>,
) -> Result<(), XmlError> {
    writer
        .write_event(Event::Start(start))
        .map_err(|e| XmlError::Write(e.to_string()))?;
    if let Some(text) = &element.text {
        writer
            .write_event(Event::Text(BytesText::new(text)))
            .map_err(|e| XmlError::Write(e.to_string()))?;
    }
    for child in &element.children {
        write_element(writer, child, bindings)?;
    }
    writer
        .write_event(Event::End(BytesEnd::new(qname)))
        .map_err(|e| XmlError::Write(e.to_string()))
}

/// Exclusive canonical form (without comments) used for digests and
/// signatures.
///
/// With `exclude_signature` set, a direct `ds:Signature` child of `element`
/// is left out (the enveloped-signature transform); nested signatures stay.
pub fn canonicalize(element: &Element, exclude_signature: bool) -> Result<Vec<u8>, XmlError> {
    let fragment = if exclude_signature {
        let mut unsigned = element.clone();
        unsigned.children.retain(|c| !c.is(NS_DSIG, "Signature"));
        to_fragment(&unsigned)?
    } else {
        to_fragment(element)?
    };

    let mut output = Vec::new();
    Canonicalizer::read_from_str(&fragment)
        .write_to_writer(&mut output)
        .canonicalize(false)
        .map_err(|e| XmlError::Canonicalization(e.to_string()))?;
    Ok(output)
}
