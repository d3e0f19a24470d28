//! A namespace-aware, generic XML tree, parsed once up front so the
//! version-specific decoders (`xml1`, `xml2`) and the hierarchical field
//! flattener (`flatten`) can all walk the same shape instead of each owning
//! their own `quick_xml::Reader` state machine.

use std::collections::HashMap;

use quick_xml::events::{BytesStart, Event};
use quick_xml::reader::Reader;

use crate::error::{CodecError, CodecResult};

/// One element of the parsed document, with its namespace prefix already
/// resolved to a URI (or left as the raw prefix if the document never
/// declared it — decoders treat an unresolved prefix as its own namespace
/// key, which is enough to keep sibling custom elements distinct).
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct XmlNode {
    pub namespace: String,
    pub local_name: String,
    /// `(namespace, local_name, value)` per attribute, in document order.
    pub attributes: Vec<(String, String, String)>,
    pub children: Vec<XmlNode>,
    /// Concatenated text content, empty if the element has only child
    /// elements (EPCIS documents never mix significant text with child
    /// elements in the same node).
    pub text: String,
}

impl XmlNode {
    pub fn child(&self, local_name: &str) -> Option<&XmlNode> {
        self.children.iter().find(|c| c.local_name == local_name)
    }

    pub fn children_named<'a>(&'a self, local_name: &'a str) -> impl Iterator<Item = &'a XmlNode> {
        self.children.iter().filter(move |c| c.local_name == local_name)
    }

    pub fn text_trimmed(&self) -> &str {
        self.text.trim()
    }

    /// True if this element carries no EPCIS-standard semantics of its own
    /// — i.e. it is an extension/ILMD payload candidate for `flatten`.
    pub fn is_empty_node(&self) -> bool {
        self.children.is_empty() && self.text_trimmed().is_empty()
    }
}

struct NamespaceScope {
    /// prefix -> URI, including the default (`""`) prefix.
    bindings: HashMap<String, String>,
}

fn split_qname(qname: &str) -> (Option<&str>, &str) {
    match qname.split_once(':') {
        Some((prefix, local)) => (Some(prefix), local),
        None => (None, qname),
    }
}

fn resolve(scopes: &[NamespaceScope], prefix: Option<&str>) -> String {
    let key = prefix.unwrap_or("");
    for scope in scopes.iter().rev() {
        if let Some(uri) = scope.bindings.get(key) {
            return uri.clone();
        }
    }
    prefix.unwrap_or("").to_string()
}

/// Parse an entire document into one `XmlNode` tree, bounded by `byte_budget`
/// (spec.md §4.1 step 1 "decoders MAY stream... bounded by a configured byte
/// budget").
pub fn parse(bytes: &[u8], byte_budget: usize) -> CodecResult<XmlNode> {
    if bytes.len() > byte_budget {
        return Err(CodecError::OversizedDocument { actual: bytes.len(), limit: byte_budget });
    }

    let mut reader = Reader::from_reader(bytes);
    reader.config_mut().trim_text(true);

    let mut scopes: Vec<NamespaceScope> = Vec::new();
    let mut stack: Vec<XmlNode> = Vec::new();
    let mut root: Option<XmlNode> = None;
    let mut buf = Vec::new();

    loop {
        let event = reader
            .read_event_into(&mut buf)
            .map_err(|e| CodecError::MalformedDocument(e.to_string()))?;

        match event {
            Event::Eof => break,
            Event::Start(e) => open_element(&reader, &mut scopes, &mut stack, e, false)?,
            Event::Empty(e) => {
                open_element(&reader, &mut scopes, &mut stack, e, true)
                    .map(|node| push_node(&mut stack, &mut root, node.expect("empty element yields a node")))?;
            }
            Event::End(_) => {
                scopes.pop();
                let node = stack
                    .pop()
                    .ok_or_else(|| CodecError::MalformedDocument("unbalanced end tag".to_string()))?;
                push_node(&mut stack, &mut root, node);
            }
            Event::Text(t) => {
                let text = t.unescape().map_err(|e| CodecError::MalformedDocument(e.to_string()))?.to_string();
                if let Some(top) = stack.last_mut() {
                    top.text.push_str(&text);
                }
            }
            Event::CData(t) => {
                let text = String::from_utf8_lossy(t.as_ref()).to_string();
                if let Some(top) = stack.last_mut() {
                    top.text.push_str(&text);
                }
            }
            _ => {}
        }
        buf.clear();
    }

    root.ok_or_else(|| CodecError::MalformedDocument("empty document".to_string()))
}

/// Push one new namespace scope, build the `XmlNode` shell for `e`, and
/// either leave it on `stack` awaiting its `End` (returns `None`) or, for a
/// self-closing element, pop the scope immediately and return the finished
/// node for the caller to attach.
fn open_element(
    reader: &Reader<&[u8]>,
    scopes: &mut Vec<NamespaceScope>,
    stack: &mut Vec<XmlNode>,
    e: BytesStart<'_>,
    is_empty_element: bool,
) -> CodecResult<Option<XmlNode>> {
    let mut bindings = HashMap::new();
    let mut raw_attrs = Vec::new();
    for attr in e.attributes() {
        let attr = attr.map_err(|err| CodecError::MalformedDocument(err.to_string()))?;
        let key = String::from_utf8_lossy(attr.key.as_ref()).to_string();
        let value = attr
            .decode_and_unescape_value(reader.decoder())
            .map_err(|err| CodecError::MalformedDocument(err.to_string()))?
            .to_string();

        if key == "xmlns" {
            bindings.insert(String::new(), value.clone());
        } else if let Some(prefix) = key.strip_prefix("xmlns:") {
            bindings.insert(prefix.to_string(), value.clone());
        }
        raw_attrs.push((key, value));
    }
    scopes.push(NamespaceScope { bindings });

    let qname = String::from_utf8_lossy(e.name().as_ref()).to_string();
    let (prefix, local_name) = split_qname(&qname);
    let namespace = resolve(scopes, prefix);

    let mut attributes = Vec::new();
    for (key, value) in raw_attrs {
        if key == "xmlns" || key.starts_with("xmlns:") {
            continue;
        }
        let (aprefix, alocal) = split_qname(&key);
        // Unprefixed attributes have no namespace in XML, unlike unprefixed
        // elements (which inherit the default xmlns).
        let ans = aprefix.map(|p| resolve(scopes, Some(p))).unwrap_or_default();
        attributes.push((ans, alocal.to_string(), value));
    }

    let node = XmlNode {
        namespace,
        local_name: local_name.to_string(),
        attributes,
        children: Vec::new(),
        text: String::new(),
    };

    if is_empty_element {
        scopes.pop();
        Ok(Some(node))
    } else {
        stack.push(node);
        Ok(None)
    }
}

fn push_node(stack: &mut [XmlNode], root: &mut Option<XmlNode>, node: XmlNode) {
    match stack.last_mut() {
        Some(parent) => parent.children.push(node),
        None => *root = Some(node),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_nested_elements_and_attributes() {
        let xml = br#"<root xmlns:ext="urn:example:ext"><child ext:unit="kg">42</child></root>"#;
        let tree = parse(xml, 1 << 20).unwrap();
        assert_eq!(tree.local_name, "root");
        let child = tree.child("child").unwrap();
        assert_eq!(child.text_trimmed(), "42");
        assert_eq!(child.attributes[0].0, "urn:example:ext");
        assert_eq!(child.attributes[0].1, "unit");
    }

    #[test]
    fn oversized_document_is_rejected() {
        let xml = b"<root></root>";
        let err = parse(xml, 2).unwrap_err();
        assert!(matches!(err, CodecError::OversizedDocument { .. }));
    }
}
