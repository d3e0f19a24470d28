//! EPCIS 1.x (1.0/1.1/1.2) XML decode/encode.
//!
//! Spec.md §4.1 "Version specifics": nested `extension`/`baseExtension`
//! wrappers are transparent — their children are hoisted by one level
//! (recursively, for the rare document nesting both) before the rest of the
//! event-shape dispatch runs.

use chrono::{DateTime, Utc};

use epcis_core::{
    Action, Epc, EpcType, Event, EventId, EventType, Field, FieldType, MasterData, SchemaVersion,
    StandardBusinessHeader,
};

use crate::document::EpcisDocument;
use crate::error::{CodecError, CodecResult};
use crate::field_index::FieldIndexer;
use crate::flatten::rebuild_tree;
use crate::xml_common::{
    branch, encode_business_transaction_list, encode_epc_list, encode_quantity_list,
    encode_sensor_element_list, encode_source_dest_list, leaf, parse_business_transactions,
    parse_epc_list, parse_parent_id, parse_quantity_list, parse_sensor_element_list,
    parse_source_dest, wrap_id,
};
use crate::xml_tree::XmlNode;
use crate::xml_write::reconstructed_to_xmlnode;

/// Recursively hoist `extension`/`baseExtension` wrapper children so the
/// rest of decoding can treat an event's semantic sub-elements uniformly
/// regardless of which 1.x vendor wrapped them.
fn hoisted_children(node: &XmlNode) -> Vec<&XmlNode> {
    let mut out = Vec::new();
    for child in &node.children {
        if child.local_name == "extension" || child.local_name == "baseExtension" {
            out.extend(hoisted_children(child));
        } else {
            out.push(child);
        }
    }
    out
}

fn find<'a>(children: &[&'a XmlNode], name: &str) -> Option<&'a XmlNode> {
    children.iter().find(|c| c.local_name == name).copied()
}

fn parse_time(s: &str) -> CodecResult<DateTime<Utc>> {
    DateTime::parse_from_rfc3339(s)
        .map(|dt| dt.with_timezone(&Utc))
        .map_err(|e| CodecError::MalformedDocument(format!("bad timestamp '{s}': {e}")))
}

/// Decode one event element (`ObjectEvent`, `AggregationEvent`, ...) given
/// its local name as the EventType tag.
pub fn decode_event(node: &XmlNode) -> CodecResult<Event> {
    let event_type = EventType::parse(&node.local_name)
        .ok_or_else(|| CodecError::SchemaInvalid(format!("unknown event element '{}'", node.local_name)))?;

    let children = hoisted_children(node);

    let event_time = find(&children, "eventTime")
        .map(|n| n.text_trimmed())
        .ok_or_else(|| CodecError::SchemaInvalid("missing eventTime".to_string()))
        .and_then(parse_time)?;
    let tz_offset = find(&children, "eventTimeZoneOffset")
        .map(|n| n.text_trimmed().to_string())
        .ok_or_else(|| CodecError::SchemaInvalid("missing eventTimeZoneOffset".to_string()))?;

    let mut event = Event::new(event_type, event_time, tz_offset);

    if let Some(id_node) = find(&children, "eventID") {
        event.event_id = EventId::new(id_node.text_trimmed());
    }

    if event_type.requires_action() {
        event.action = find(&children, "action")
            .map(|n| n.text_trimmed())
            .and_then(|s| Action::parse(&s));
    }

    event.business_step = text_or_none_top(&children, "bizStep");
    event.disposition = text_or_none_top(&children, "disposition");
    event.read_point = find(&children, "readPoint").and_then(|n| n.child("id")).map(|n| n.text_trimmed().to_string());
    event.business_location =
        find(&children, "bizLocation").and_then(|n| n.child("id")).map(|n| n.text_trimmed().to_string());
    event.transformation_id = text_or_none_top(&children, "transformationID");
    event.certification_info = text_or_none_top(&children, "certificationInfo");

    if let Some(err) = find(&children, "errorDeclaration") {
        event.corrective_declaration_time =
            err.child("declarationTime").map(|n| parse_time(n.text_trimmed())).transpose()?;
        event.corrective_reason = err.child("reason").map(|n| n.text_trimmed().to_string());
        if let Some(list) = err.child("correctiveEventIDs") {
            event.corrective_event_ids = list
                .children_named("correctiveEventID")
                .map(|n| EventId::new(n.text_trimmed()))
                .collect();
        }
    }

    // EPC partitioning (spec.md §4.1 step 5).
    match event_type {
        EventType::ObjectEvent => {
            if let Some(list) = find(&children, "epcList") {
                event.epcs.extend(parse_epc_list(list, EpcType::List));
            }
            if let Some(list) = find(&children, "quantityList") {
                event.epcs.extend(parse_quantity_list(list));
            }
        }
        EventType::AggregationEvent | EventType::TransactionEvent => {
            if let Some(parent) = parse_parent_id(node).or_else(|| find(&children, "parentID").map(|n| Epc::new(EpcType::ParentId, n.text_trimmed()))) {
                event.epcs.push(parent);
            }
            if let Some(list) = find(&children, "childEPCs") {
                event.epcs.extend(parse_epc_list(list, EpcType::ChildEpc));
            }
            if let Some(list) = find(&children, "epcList") {
                event.epcs.extend(parse_epc_list(list, EpcType::List));
            }
            if let Some(list) = find(&children, "childQuantityList") {
                event.epcs.extend(parse_quantity_list(list));
            }
        }
        EventType::TransformationEvent => {
            if let Some(list) = find(&children, "inputEPCList") {
                event.epcs.extend(parse_epc_list(list, EpcType::InputEpc));
            }
            if let Some(list) = find(&children, "outputEPCList") {
                event.epcs.extend(parse_epc_list(list, EpcType::OutputEpc));
            }
            if let Some(list) = find(&children, "inputQuantityList") {
                event.epcs.extend(parse_quantity_list(list));
            }
            if let Some(list) = find(&children, "outputQuantityList") {
                event.epcs.extend(parse_quantity_list(list));
            }
        }
        EventType::QuantityEvent => {
            // EPCIS 1.0 QuantityEvent: a single epcClass+quantity pair, not a list.
            if let (Some(class), Some(qty)) = (find(&children, "epcClass"), find(&children, "quantity")) {
                if let Ok(qty) = qty.text_trimmed().parse::<f64>() {
                    event.epcs.push(Epc::new(EpcType::Quantity, class.text_trimmed()).with_quantity(qty, None));
                }
            }
        }
    }

    if let Some(list) = find(&children, "bizTransactionList") {
        event.business_transactions = parse_business_transactions(list);
    }
    if let Some(list) = find(&children, "sourceList") {
        event.sources = parse_source_dest(list, "source");
    }
    if let Some(list) = find(&children, "destinationList") {
        event.destinations = parse_source_dest(list, "destination");
    }

    let mut indexer = FieldIndexer::new();
    let mut fields: Vec<Field> = Vec::new();

    if let Some(ilmd) = find(&children, "ilmd") {
        indexer.flatten_into(ilmd, FieldType::Ilmd, None, &mut fields);
    }
    if let Some(list) = find(&children, "sensorElementList") {
        event.sensor_elements = parse_sensor_element_list(list, &mut indexer, &mut fields)?;
    }

    // Any remaining hoisted child not recognized above is a foreign
    // event-level extension (spec.md §4.1 step 4).
    const KNOWN: &[&str] = &[
        "eventTime", "eventTimeZoneOffset", "eventID", "action", "bizStep", "disposition",
        "readPoint", "bizLocation", "transformationID", "certificationInfo", "errorDeclaration",
        "epcList", "quantityList", "parentID", "childEPCs", "childQuantityList", "inputEPCList",
        "outputEPCList", "inputQuantityList", "outputQuantityList", "bizTransactionList",
        "sourceList", "destinationList", "ilmd", "sensorElementList",
    ];
    for child in &children {
        if !KNOWN.contains(&child.local_name.as_str()) {
            indexer.flatten_with_skip(
                &XmlNode {
                    namespace: String::new(),
                    local_name: String::new(),
                    attributes: Vec::new(),
                    children: vec![(*child).clone()],
                    text: String::new(),
                },
                &[],
                FieldType::EventExtension,
                None,
                &mut fields,
            );
        }
    }

    event.fields = fields;
    Ok(event)
}

fn text_or_none_top(children: &[&XmlNode], name: &str) -> Option<String> {
    find(children, name).map(|n| n.text_trimmed().to_string()).filter(|s| !s.is_empty())
}

/// Decode an `EPCISMasterDataDocument`-style `VocabularyList` element.
pub fn decode_vocabulary_list(node: &XmlNode) -> Vec<MasterData> {
    let mut out = Vec::new();
    for vocab in node.children_named("Vocabulary") {
        let vocab_type = vocab.attributes.iter().find(|(_, n, _)| n == "type").map(|(_, _, v)| v.clone()).unwrap_or_default();
        let Some(elements) = vocab.child("VocabularyElementList") else { continue };
        for element in elements.children_named("VocabularyElement") {
            let id = element.attributes.iter().find(|(_, n, _)| n == "id").map(|(_, _, v)| v.clone()).unwrap_or_default();
            let mut md = MasterData::new(vocab_type.clone(), id);
            for attribute in element.children_named("attribute") {
                let name = attribute.attributes.iter().find(|(_, n, _)| n == "id").map(|(_, _, v)| v.clone()).unwrap_or_default();
                md.attributes.insert(name, attribute.text_trimmed().to_string());
            }
            if let Some(children_node) = element.child("children") {
                md.children = children_node.children_named("id").map(|n| n.text_trimmed().to_string()).collect();
            }
            out.push(md);
        }
    }
    out
}

/// Extract the `StandardBusinessDocumentHeader` from an `EPCISHeader`, if
/// present (spec.md §4.1 step 2 "Header extraction").
pub fn decode_header(root: &XmlNode) -> Option<StandardBusinessHeader> {
    let header = root.child("EPCISHeader")?.child("StandardBusinessDocumentHeader")?;
    let sender = header.child("Sender").and_then(|n| n.child("Identifier")).map(|n| n.text_trimmed().to_string());
    let receiver = header.child("Receiver").and_then(|n| n.child("Identifier")).map(|n| n.text_trimmed().to_string());
    let doc_id = header.child("DocumentIdentification");
    let document_identification = doc_id.and_then(|n| n.child("InstanceIdentifier")).map(|n| n.text_trimmed().to_string());
    let creation_date_time = doc_id
        .and_then(|n| n.child("CreationDateAndTime"))
        .and_then(|n| parse_time(n.text_trimmed()).ok());

    Some(StandardBusinessHeader { document_identification, sender, receiver, creation_date_time })
}

/// Top-level EPCIS 1.x document decode: header + EventList + optional
/// VocabularyList.
pub fn decode_document(root: &XmlNode) -> CodecResult<EpcisDocument> {
    let version_attr = root
        .attributes
        .iter()
        .find(|(_, name, _)| name == "schemaVersion")
        .map(|(_, _, v)| v.clone())
        .unwrap_or_else(|| "1.2".to_string());
    let schema_version = SchemaVersion::parse(&version_attr)
        .ok_or_else(|| CodecError::UnsupportedVersion(version_attr.clone()))?;

    let creation_date = root
        .attributes
        .iter()
        .find(|(_, name, _)| name == "creationDate")
        .map(|(_, _, v)| v.clone())
        .map(|s| parse_time(&s))
        .transpose()?;

    let standard_business_header = decode_header(root);

    let body = root
        .child("EPCISBody")
        .ok_or_else(|| CodecError::SchemaInvalid("missing EPCISBody".to_string()))?;

    let mut events = Vec::new();
    if let Some(list) = body.child("EventList") {
        for node in &list.children {
            events.push(decode_event(node)?);
        }
    }

    let mut master_data = Vec::new();
    if let Some(list) = body.child("VocabularyList") {
        master_data.extend(decode_vocabulary_list(list));
    }

    Ok(EpcisDocument { schema_version, creation_date, standard_business_header, events, master_data })
}

/// Encode one event, wrapping `sourceList`/`destinationList`/`ilmd`/foreign
/// extensions in an `<extension>` element (spec.md §4.1 "Version specifics",
/// the 1.x half of the transparent-wrapper rule — this is what a 1.x
/// document must look like, not what it reads like).
pub fn encode_event(event: &Event) -> XmlNode {
    let mut top: Vec<XmlNode> = Vec::new();

    top.push(leaf("eventTime", epcis_core::hash::canonical_timestamp(event.event_time)));
    top.push(leaf("eventTimeZoneOffset", event.event_time_zone_offset.clone()));
    if !event.event_id.is_empty() {
        top.push(leaf("eventID", event.event_id.to_string()));
    }

    match event.event_type {
        EventType::ObjectEvent => {
            let plain: Vec<&Epc> = event.epcs.iter().filter(|e| e.epc_type == EpcType::List).collect();
            let qty: Vec<&Epc> = event.epcs.iter().filter(|e| e.epc_type == EpcType::Quantity).collect();
            if let Some(node) = encode_epc_list("epcList", &plain) {
                top.push(node);
            }
            if let Some(node) = encode_quantity_list("quantityList", &qty) {
                top.push(node);
            }
        }
        EventType::AggregationEvent | EventType::TransactionEvent => {
            if let Some(parent) = event.epcs.iter().find(|e| e.epc_type == EpcType::ParentId) {
                top.push(leaf("parentID", parent.id.clone()));
            }
            let children: Vec<&Epc> = event.epcs.iter().filter(|e| e.epc_type == EpcType::ChildEpc).collect();
            let plain: Vec<&Epc> = event.epcs.iter().filter(|e| e.epc_type == EpcType::List).collect();
            let qty: Vec<&Epc> = event.epcs.iter().filter(|e| e.epc_type == EpcType::Quantity).collect();
            if let Some(node) = encode_epc_list("childEPCs", &children) {
                top.push(node);
            }
            if let Some(node) = encode_epc_list("epcList", &plain) {
                top.push(node);
            }
            if let Some(node) = encode_quantity_list("childQuantityList", &qty) {
                top.push(node);
            }
        }
        EventType::TransformationEvent => {
            let input: Vec<&Epc> = event.epcs.iter().filter(|e| e.epc_type == EpcType::InputEpc).collect();
            let output: Vec<&Epc> = event.epcs.iter().filter(|e| e.epc_type == EpcType::OutputEpc).collect();
            if let Some(node) = encode_epc_list("inputEPCList", &input) {
                top.push(node);
            }
            if let Some(node) = encode_epc_list("outputEPCList", &output) {
                top.push(node);
            }
        }
        EventType::QuantityEvent => {
            if let Some(q) = event.epcs.iter().find(|e| e.epc_type == EpcType::Quantity) {
                top.push(leaf("epcClass", q.id.clone()));
                top.push(leaf("quantity", epcis_core::hash::canonical_number(q.quantity.unwrap_or_default())));
            }
        }
    }

    if event.event_type.requires_action() {
        if let Some(action) = event.action {
            top.push(leaf("action", action.as_str()));
        }
    }
    if let Some(v) = &event.business_step {
        top.push(leaf("bizStep", v.clone()));
    }
    if let Some(v) = &event.disposition {
        top.push(leaf("disposition", v.clone()));
    }
    if let Some(v) = &event.read_point {
        top.push(wrap_id("readPoint", v.clone()));
    }
    if let Some(v) = &event.business_location {
        top.push(wrap_id("bizLocation", v.clone()));
    }
    if let Some(node) = encode_business_transaction_list(&event.business_transactions) {
        top.push(node);
    }

    let mut ext_children = Vec::new();
    if let Some(node) = encode_source_dest_list("sourceList", "source", &event.sources) {
        ext_children.push(node);
    }
    if let Some(node) = encode_source_dest_list("destinationList", "destination", &event.destinations) {
        ext_children.push(node);
    }
    let ilmd_fields: Vec<&Field> = event.fields.iter().filter(|f| f.field_type == FieldType::Ilmd).collect();
    if !ilmd_fields.is_empty() {
        let rebuilt = rebuild_tree(&ilmd_fields);
        ext_children.push(branch("ilmd", rebuilt.iter().map(reconstructed_to_xmlnode).collect()));
    }
    let event_ext_fields: Vec<&Field> =
        event.fields.iter().filter(|f| f.field_type == FieldType::EventExtension).collect();
    if !event_ext_fields.is_empty() {
        ext_children.extend(rebuild_tree(&event_ext_fields).iter().map(reconstructed_to_xmlnode));
    }
    if !ext_children.is_empty() {
        top.push(branch("extension", ext_children));
    }

    if let Some(node) = encode_sensor_element_list(&event.sensor_elements) {
        top.push(node);
    }
    if let Some(v) = &event.transformation_id {
        top.push(leaf("transformationID", v.clone()));
    }
    if let Some(v) = &event.certification_info {
        top.push(leaf("certificationInfo", v.clone()));
    }

    if event.corrective_declaration_time.is_some()
        || event.corrective_reason.is_some()
        || !event.corrective_event_ids.is_empty()
    {
        let mut err_children = Vec::new();
        if let Some(t) = event.corrective_declaration_time {
            err_children.push(leaf("declarationTime", epcis_core::hash::canonical_timestamp(t)));
        }
        if let Some(r) = &event.corrective_reason {
            err_children.push(leaf("reason", r.clone()));
        }
        if !event.corrective_event_ids.is_empty() {
            err_children.push(branch(
                "correctiveEventIDs",
                event.corrective_event_ids.iter().map(|id| leaf("correctiveEventID", id.to_string())).collect(),
            ));
        }
        top.push(branch("errorDeclaration", err_children));
    }

    branch(event.event_type.as_str(), top)
}

/// Encode a full EPCIS 1.x document: header, EventList, and VocabularyList
/// if any master data is present.
pub fn encode_document(doc: &EpcisDocument) -> XmlNode {
    let event_nodes: Vec<XmlNode> = doc.events.iter().map(encode_event).collect();
    let mut body_children = vec![branch("EventList", event_nodes)];

    if !doc.master_data.is_empty() {
        body_children.push(encode_vocabulary_list(&doc.master_data));
    }

    let mut root_attrs = vec![
        (String::new(), "schemaVersion".to_string(), doc.schema_version.as_str().to_string()),
    ];
    if let Some(cd) = doc.creation_date {
        root_attrs.push((String::new(), "creationDate".to_string(), epcis_core::hash::canonical_timestamp(cd)));
    }

    let mut children = Vec::new();
    if let Some(header) = &doc.standard_business_header {
        children.push(encode_header(header));
    }
    children.push(branch("EPCISBody", body_children));

    XmlNode {
        namespace: String::new(),
        local_name: "EPCISDocument".to_string(),
        attributes: root_attrs,
        children,
        text: String::new(),
    }
}

pub fn encode_header(header: &StandardBusinessHeader) -> XmlNode {
    let mut doc_id_children = Vec::new();
    if let Some(v) = &header.document_identification {
        doc_id_children.push(leaf("InstanceIdentifier", v.clone()));
    }
    if let Some(t) = header.creation_date_time {
        doc_id_children.push(leaf("CreationDateAndTime", epcis_core::hash::canonical_timestamp(t)));
    }

    let mut sbdh_children = Vec::new();
    if let Some(v) = &header.sender {
        sbdh_children.push(branch("Sender", vec![leaf("Identifier", v.clone())]));
    }
    if let Some(v) = &header.receiver {
        sbdh_children.push(branch("Receiver", vec![leaf("Identifier", v.clone())]));
    }
    if !doc_id_children.is_empty() {
        sbdh_children.push(branch("DocumentIdentification", doc_id_children));
    }

    branch("EPCISHeader", vec![branch("StandardBusinessDocumentHeader", sbdh_children)])
}

pub fn encode_vocabulary_list(master_data: &[MasterData]) -> XmlNode {
    let mut by_type: std::collections::BTreeMap<&str, Vec<&MasterData>> = std::collections::BTreeMap::new();
    for md in master_data {
        by_type.entry(&md.vocabulary_type).or_default().push(md);
    }

    let vocabularies = by_type
        .into_iter()
        .map(|(vtype, entries)| {
            let elements = entries
                .iter()
                .map(|md| {
                    let mut element = branch("VocabularyElement", Vec::new());
                    element.attributes.push((String::new(), "id".to_string(), md.id.clone()));
                    let mut attr_nodes: Vec<XmlNode> = md
                        .attributes
                        .iter()
                        .map(|(name, value)| {
                            let mut node = leaf("attribute", value.clone());
                            node.attributes.push((String::new(), "id".to_string(), name.clone()));
                            node
                        })
                        .collect();
                    attr_nodes.sort_by(|a, b| a.attributes[0].2.cmp(&b.attributes[0].2));
                    element.children.extend(attr_nodes);
                    if !md.children.is_empty() {
                        element.children.push(branch(
                            "children",
                            md.children.iter().map(|c| leaf("id", c.clone())).collect(),
                        ));
                    }
                    element
                })
                .collect();
            let mut vocab = branch("Vocabulary", vec![branch("VocabularyElementList", elements)]);
            vocab.attributes.push((String::new(), "type".to_string(), vtype.to_string()));
            vocab
        })
        .collect();

    branch("VocabularyList", vocabularies)
}
