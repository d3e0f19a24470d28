//! Generic `XmlNode` → bytes serialization, shared by the 1.x and 2.0
//! encoders. Foreign namespaces collected from extension/ILMD/sensor
//! subtrees are assigned synthetic prefixes and declared once on the
//! document root, so re-decoding recovers the same namespace URI per Field
//! (the idempotency law, spec.md §4.3/§8, does not require the *prefix* to
//! round-trip — only the resolved URI).

use std::collections::BTreeMap;
use std::io::Cursor;

use quick_xml::events::{BytesEnd, BytesStart, BytesText, Event};
use quick_xml::writer::Writer;

use crate::error::{CodecError, CodecResult};
use crate::flatten::ReconstructedNode;
use crate::xml_tree::XmlNode;

pub fn reconstructed_to_xmlnode(n: &ReconstructedNode) -> XmlNode {
    XmlNode {
        namespace: n.namespace.clone(),
        local_name: n.local_name.clone(),
        attributes: n.attributes.clone(),
        children: n.children.iter().map(reconstructed_to_xmlnode).collect(),
        text: n.text.clone(),
    }
}

/// Walk `nodes` and every descendant, collecting distinct non-empty
/// namespaces in first-seen order, assigned `ns0`, `ns1`, ... .
pub fn collect_namespaces(nodes: &[XmlNode]) -> BTreeMap<String, String> {
    let mut seen = Vec::new();
    fn walk(node: &XmlNode, seen: &mut Vec<String>) {
        if !node.namespace.is_empty() && !seen.contains(&node.namespace) {
            seen.push(node.namespace.clone());
        }
        for (ns, _, _) in &node.attributes {
            if !ns.is_empty() && !seen.contains(ns) {
                seen.push(ns.clone());
            }
        }
        for child in &node.children {
            walk(child, seen);
        }
    }
    for node in nodes {
        walk(node, &mut seen);
    }
    seen.into_iter().enumerate().map(|(i, ns)| (ns, format!("ns{i}"))).collect()
}

fn qualified_name(node: &XmlNode, prefixes: &BTreeMap<String, String>) -> String {
    match prefixes.get(&node.namespace) {
        Some(prefix) => format!("{prefix}:{}", node.local_name),
        None => node.local_name.clone(),
    }
}

pub fn write_node(
    writer: &mut Writer<Cursor<Vec<u8>>>,
    node: &XmlNode,
    prefixes: &BTreeMap<String, String>,
) -> CodecResult<()> {
    let qname = qualified_name(node, prefixes);

    if node.children.is_empty() && node.text.is_empty() {
        let mut start = BytesStart::new(qname.clone());
        push_attrs(&mut start, node, prefixes);
        writer.write_event(Event::Empty(start)).map_err(io_err)?;
        return Ok(());
    }

    let mut start = BytesStart::new(qname.clone());
    push_attrs(&mut start, node, prefixes);
    writer.write_event(Event::Start(start)).map_err(io_err)?;

    if !node.text.is_empty() {
        writer.write_event(Event::Text(BytesText::new(&node.text))).map_err(io_err)?;
    }
    for child in &node.children {
        write_node(writer, child, prefixes)?;
    }

    writer.write_event(Event::End(BytesEnd::new(qname))).map_err(io_err)?;
    Ok(())
}

fn push_attrs(start: &mut BytesStart<'_>, node: &XmlNode, prefixes: &BTreeMap<String, String>) {
    for (ns, name, value) in &node.attributes {
        let attr_name = match prefixes.get(ns) {
            Some(prefix) => format!("{prefix}:{name}"),
            None => name.clone(),
        };
        start.push_attribute((attr_name.as_str(), value.as_str()));
    }
}

pub fn io_err(e: quick_xml::Error) -> CodecError {
    CodecError::MalformedDocument(e.to_string())
}

/// Declare every collected namespace as `xmlns:nsN="uri"` on `root`, plus
/// the default EPCIS element namespace.
pub fn declare_namespaces(root: &mut BytesStart<'_>, default_ns: &str, prefixes: &BTreeMap<String, String>) {
    root.push_attribute(("xmlns", default_ns));
    for (uri, prefix) in prefixes {
        root.push_attribute((format!("xmlns:{prefix}").as_str(), uri.as_str()));
    }
}
