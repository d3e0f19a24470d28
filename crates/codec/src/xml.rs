//! Top-level XML document codec: ties `xml_tree::parse` (bytes → `XmlNode`),
//! version dispatch between `xml1`/`xml2`, and `xml_write` (namespace
//! collection + `Writer` → bytes) into one entrypoint per direction.
//!
//! Version dispatch happens once, here, on the root's `schemaVersion`
//! attribute (spec.md §4.1 "stream a document... version sniffed from
//! `schemaVersion`") — `xml1`/`xml2` each assume they've already been
//! handed the right shape.

use std::io::Cursor;

use quick_xml::events::{BytesDecl, BytesStart, Event};
use quick_xml::writer::Writer;

use epcis_core::SchemaVersion;

use crate::document::EpcisDocument;
use crate::error::{CodecError, CodecResult};
use crate::xml_tree::{self, XmlNode};
use crate::xml_write::{collect_namespaces, declare_namespaces, io_err, write_node};

const EPCIS_1_NAMESPACE: &str = "urn:epcglobal:epcis:xsd:1";
const EPCIS_2_NAMESPACE: &str = "urn:epcglobal:epcis:xsd:2";

fn schema_version_of(root: &XmlNode) -> CodecResult<SchemaVersion> {
    let attr = root
        .attributes
        .iter()
        .find(|(_, name, _)| name == "schemaVersion")
        .map(|(_, _, v)| v.clone())
        .unwrap_or_else(|| "1.2".to_string());
    SchemaVersion::parse(&attr).ok_or_else(|| CodecError::UnsupportedVersion(attr))
}

/// Decode a full EPCIS XML document, bounded by `byte_budget` bytes.
pub fn decode(bytes: &[u8], byte_budget: usize) -> CodecResult<EpcisDocument> {
    let root = xml_tree::parse(bytes, byte_budget)?;
    match schema_version_of(&root)? {
        SchemaVersion::V2_0 => crate::xml2::decode_document(&root),
        _ => crate::xml1::decode_document(&root),
    }
}

/// Encode a full EPCIS XML document, including the `<?xml ... ?>`
/// declaration and every foreign namespace used by the document's Fields
/// declared once on the document element.
pub fn encode(doc: &EpcisDocument) -> CodecResult<Vec<u8>> {
    let node = match doc.schema_version {
        SchemaVersion::V2_0 => crate::xml2::encode_document(doc),
        _ => crate::xml1::encode_document(doc),
    };

    let default_ns = if doc.schema_version.is_xml_1x() { EPCIS_1_NAMESPACE } else { EPCIS_2_NAMESPACE };
    let prefixes = collect_namespaces(std::slice::from_ref(&node));

    let mut writer = Writer::new(Cursor::new(Vec::new()));
    writer
        .write_event(Event::Decl(BytesDecl::new("1.0", Some("UTF-8"), None)))
        .map_err(io_err)?;

    let mut root_start = BytesStart::new(node.local_name.clone());
    for (_, name, value) in &node.attributes {
        root_start.push_attribute((name.as_str(), value.as_str()));
    }
    declare_namespaces(&mut root_start, default_ns, &prefixes);

    if node.children.is_empty() && node.text.is_empty() {
        writer.write_event(Event::Empty(root_start)).map_err(io_err)?;
    } else {
        writer.write_event(Event::Start(root_start)).map_err(io_err)?;
        for child in &node.children {
            write_node(&mut writer, child, &prefixes)?;
        }
        writer
            .write_event(Event::End(quick_xml::events::BytesEnd::new(node.local_name.clone())))
            .map_err(io_err)?;
    }

    Ok(writer.into_inner().into_inner())
}

#[cfg(test)]
mod tests {
    use super::*;
    use epcis_core::{Event, EventType, SchemaVersion};

    #[test]
    fn encode_then_decode_round_trips_a_minimal_document() {
        let event = Event::new(EventType::ObjectEvent, chrono::Utc::now(), "+00:00");
        let doc = EpcisDocument {
            schema_version: SchemaVersion::V2_0,
            creation_date: None,
            standard_business_header: None,
            events: vec![event],
            master_data: Vec::new(),
        };

        let bytes = encode(&doc).unwrap();
        let decoded = decode(&bytes, 1 << 20).unwrap();
        assert_eq!(decoded.events.len(), 1);
        assert_eq!(decoded.events[0].event_type, EventType::ObjectEvent);
    }
}
