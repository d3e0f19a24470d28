//! EPCIS 2.0 XML decode/encode: flat event shape, no legacy
//! `extension`/`baseExtension` wrappers, explicit `sensorElementList` and
//! `persistentDisposition` (spec.md §4.1 "Version specifics").

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
    branch, encode_business_transaction_list, encode_epc_list, encode_persistent_disposition,
    encode_quantity_list, encode_sensor_element_list, encode_source_dest_list, leaf,
    parse_business_transactions, parse_epc_list, parse_persistent_disposition, parse_quantity_list,
    parse_sensor_element_list, parse_source_dest, wrap_id,
};
use crate::xml_tree::XmlNode;
use crate::xml_write::reconstructed_to_xmlnode;

fn parse_time(s: &str) -> CodecResult<DateTime<Utc>> {
    DateTime::parse_from_rfc3339(s)
        .map(|dt| dt.with_timezone(&Utc))
        .map_err(|e| CodecError::MalformedDocument(format!("bad timestamp '{s}': {e}")))
}

const KNOWN: &[&str] = &[
    "eventTime", "eventTimeZoneOffset", "eventID", "action", "bizStep", "disposition",
    "readPoint", "bizLocation", "transformationID", "certificationInfo", "errorDeclaration",
    "epcList", "quantityList", "parentID", "childEPCs", "childQuantityList", "inputEPCList",
    "outputEPCList", "inputQuantityList", "outputQuantityList", "bizTransactionList",
    "sourceList", "destinationList", "ilmd", "sensorElementList", "persistentDisposition",
];

pub fn decode_event(node: &XmlNode) -> CodecResult<Event> {
    let event_type = EventType::parse(&node.local_name)
        .ok_or_else(|| CodecError::SchemaInvalid(format!("unknown event element '{}'", node.local_name)))?;

    let event_time = node
        .child("eventTime")
        .map(|n| n.text_trimmed())
        .ok_or_else(|| CodecError::SchemaInvalid("missing eventTime".to_string()))
        .and_then(parse_time)?;
    let tz_offset = node
        .child("eventTimeZoneOffset")
        .map(|n| n.text_trimmed().to_string())
        .ok_or_else(|| CodecError::SchemaInvalid("missing eventTimeZoneOffset".to_string()))?;

    let mut event = Event::new(event_type, event_time, tz_offset);

    if let Some(id_node) = node.child("eventID") {
        event.event_id = EventId::new(id_node.text_trimmed());
    }
    if event_type.requires_action() {
        event.action = node.child("action").map(|n| n.text_trimmed()).and_then(|s| Action::parse(&s));
    }

    event.business_step = node.child("bizStep").map(|n| n.text_trimmed().to_string()).filter(|s| !s.is_empty());
    event.disposition = node.child("disposition").map(|n| n.text_trimmed().to_string()).filter(|s| !s.is_empty());
    event.read_point = node.child("readPoint").and_then(|n| n.child("id")).map(|n| n.text_trimmed().to_string());
    event.business_location =
        node.child("bizLocation").and_then(|n| n.child("id")).map(|n| n.text_trimmed().to_string());
    event.transformation_id =
        node.child("transformationID").map(|n| n.text_trimmed().to_string()).filter(|s| !s.is_empty());
    event.certification_info =
        node.child("certificationInfo").map(|n| n.text_trimmed().to_string()).filter(|s| !s.is_empty());

    if let Some(err) = node.child("errorDeclaration") {
        event.corrective_declaration_time =
            err.child("declarationTime").map(|n| parse_time(n.text_trimmed())).transpose()?;
        event.corrective_reason = err.child("reason").map(|n| n.text_trimmed().to_string());
        if let Some(list) = err.child("correctiveEventIDs") {
            event.corrective_event_ids =
                list.children_named("correctiveEventID").map(|n| EventId::new(n.text_trimmed())).collect();
        }
    }

    match event_type {
        EventType::ObjectEvent => {
            if let Some(list) = node.child("epcList") {
                event.epcs.extend(parse_epc_list(list, EpcType::List));
            }
            if let Some(list) = node.child("quantityList") {
                event.epcs.extend(parse_quantity_list(list));
            }
        }
        EventType::AggregationEvent | EventType::TransactionEvent => {
            if let Some(parent) = node.child("parentID") {
                event.epcs.push(Epc::new(EpcType::ParentId, parent.text_trimmed()));
            }
            if let Some(list) = node.child("childEPCs") {
                event.epcs.extend(parse_epc_list(list, EpcType::ChildEpc));
            }
            if let Some(list) = node.child("epcList") {
                event.epcs.extend(parse_epc_list(list, EpcType::List));
            }
            if let Some(list) = node.child("childQuantityList") {
                event.epcs.extend(parse_quantity_list(list));
            }
        }
        EventType::TransformationEvent => {
            if let Some(list) = node.child("inputEPCList") {
                event.epcs.extend(parse_epc_list(list, EpcType::InputEpc));
            }
            if let Some(list) = node.child("outputEPCList") {
                event.epcs.extend(parse_epc_list(list, EpcType::OutputEpc));
            }
            if let Some(list) = node.child("inputQuantityList") {
                event.epcs.extend(parse_quantity_list(list));
            }
            if let Some(list) = node.child("outputQuantityList") {
                event.epcs.extend(parse_quantity_list(list));
            }
        }
        EventType::QuantityEvent => {
            if let (Some(class), Some(qty)) = (node.child("epcClass"), node.child("quantity")) {
                if let Ok(qty) = qty.text_trimmed().parse::<f64>() {
                    event.epcs.push(Epc::new(EpcType::Quantity, class.text_trimmed()).with_quantity(qty, None));
                }
            }
        }
    }

    if let Some(list) = node.child("bizTransactionList") {
        event.business_transactions = parse_business_transactions(list);
    }
    if let Some(list) = node.child("sourceList") {
        event.sources = parse_source_dest(list, "source");
    }
    if let Some(list) = node.child("destinationList") {
        event.destinations = parse_source_dest(list, "destination");
    }
    if let Some(pd) = node.child("persistentDisposition") {
        event.persistent_disposition = Some(parse_persistent_disposition(pd));
    }

    let mut indexer = FieldIndexer::new();
    let mut fields: Vec<Field> = Vec::new();

    if let Some(ilmd) = node.child("ilmd") {
        indexer.flatten_into(ilmd, FieldType::Ilmd, None, &mut fields);
    }
    if let Some(list) = node.child("sensorElementList") {
        event.sensor_elements = parse_sensor_element_list(list, &mut indexer, &mut fields)?;
    }

    for child in &node.children {
        if !KNOWN.contains(&child.local_name.as_str()) {
            indexer.flatten_with_skip(
                &XmlNode { namespace: String::new(), local_name: String::new(), attributes: Vec::new(), children: vec![child.clone()], text: String::new() },
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

pub fn decode_header(root: &XmlNode) -> Option<StandardBusinessHeader> {
    crate::xml1::decode_header(root)
}

pub fn decode_vocabulary_list(node: &XmlNode) -> Vec<MasterData> {
    crate::xml1::decode_vocabulary_list(node)
}

pub fn decode_document(root: &XmlNode) -> CodecResult<EpcisDocument> {
    let version_attr = root
        .attributes
        .iter()
        .find(|(_, name, _)| name == "schemaVersion")
        .map(|(_, _, v)| v.clone())
        .unwrap_or_else(|| "2.0".to_string());
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

    let body = root.child("EPCISBody").ok_or_else(|| CodecError::SchemaInvalid("missing EPCISBody".to_string()))?;

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
    if let Some(node) = encode_source_dest_list("sourceList", "source", &event.sources) {
        top.push(node);
    }
    if let Some(node) = encode_source_dest_list("destinationList", "destination", &event.destinations) {
        top.push(node);
    }

    let ilmd_fields: Vec<&Field> = event.fields.iter().filter(|f| f.field_type == FieldType::Ilmd).collect();
    if !ilmd_fields.is_empty() {
        let rebuilt = rebuild_tree(&ilmd_fields);
        top.push(branch("ilmd", rebuilt.iter().map(reconstructed_to_xmlnode).collect()));
    }

    if let Some(node) = encode_sensor_element_list(&event.sensor_elements) {
        top.push(node);
    }
    if let Some(pd) = &event.persistent_disposition {
        if let Some(node) = encode_persistent_disposition(pd) {
            top.push(node);
        }
    }
    if let Some(v) = &event.transformation_id {
        top.push(leaf("transformationID", v.clone()));
    }
    if let Some(v) = &event.certification_info {
        top.push(leaf("certificationInfo", v.clone()));
    }

    let event_ext_fields: Vec<&Field> = event.fields.iter().filter(|f| f.field_type == FieldType::EventExtension).collect();
    if !event_ext_fields.is_empty() {
        top.extend(rebuild_tree(&event_ext_fields).iter().map(reconstructed_to_xmlnode));
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

pub fn encode_document(doc: &EpcisDocument) -> XmlNode {
    let event_nodes: Vec<XmlNode> = doc.events.iter().map(encode_event).collect();
    let mut body_children = vec![branch("EventList", event_nodes)];

    if !doc.master_data.is_empty() {
        body_children.push(crate::xml1::encode_vocabulary_list(&doc.master_data));
    }

    let mut root_attrs = vec![(String::new(), "schemaVersion".to_string(), doc.schema_version.as_str().to_string())];
    if let Some(cd) = doc.creation_date {
        root_attrs.push((String::new(), "creationDate".to_string(), epcis_core::hash::canonical_timestamp(cd)));
    }

    let mut children = Vec::new();
    if let Some(header) = &doc.standard_business_header {
        children.push(crate::xml1::encode_header(header));
    }
    children.push(branch("EPCISBody", body_children));

    XmlNode { namespace: String::new(), local_name: "EPCISDocument".to_string(), attributes: root_attrs, children, text: String::new() }
}
