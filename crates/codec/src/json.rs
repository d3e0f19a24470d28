//! EPCIS 2.0 JSON-LD decoder/encoder.
//!
//! Mirrors `xml2`'s element shapes (this format only exists at 2.0), but
//! custom extension content is carried as prefixed JSON keys
//! (`"ext1:lotNumber": "..."`) rather than foreign-namespaced elements, and
//! the prefix→namespace mapping lives in `@context` instead of `xmlns:*`
//! (spec.md §4.1 step 6, §4.7 "Namespace prefix generation for JSON-LD").

use std::collections::BTreeMap;

use chrono::{DateTime, Utc};
use serde_json::{Map, Value};

use epcis_core::{
    Action, BusinessTransaction, Epc, EpcType, Event, EventType, Field, FieldType, MasterData,
    PersistentDisposition, SchemaVersion, SensorElement, SensorReport, SourceDest,
    StandardBusinessHeader,
};

use crate::document::EpcisDocument;
use crate::error::{CodecError, CodecResult};
use crate::field_index::FieldIndexer;

const EPCIS_CONTEXT_URL: &str = "https://ref.gs1.org/standards/epcis/2.0.0/epcis-context.jsonld";

/// Keys every event variant may carry that are not extension content.
const EVENT_KEYS: &[&str] = &[
    "type", "isA", "eventTime", "eventTimeZoneOffset", "eventID", "action", "bizStep",
    "disposition", "readPoint", "bizLocation", "transformationID", "certificationInfo",
    "errorDeclaration", "epcList", "childEPCs", "parentID", "inputEPCList", "outputEPCList",
    "quantityList", "childQuantityList", "inputQuantityList", "outputQuantityList",
    "bizTransactionList", "sourceList", "destinationList", "sensorElementList",
    "persistentDisposition", "ilmd",
];

const ERROR_DECLARATION_KEYS: &[&str] = &["declarationTime", "reason", "correctiveEventIDs"];

/// Prefix → namespace URI pairs pulled from every non-string member of
/// `@context` (the first, standard-context entry is always a bare string
/// and is skipped).
fn parse_context(value: &Value) -> BTreeMap<String, String> {
    let mut prefixes = BTreeMap::new();
    let entries = match value.get("@context") {
        Some(Value::Array(items)) => items.clone(),
        Some(other) => vec![other.clone()],
        None => Vec::new(),
    };
    for entry in entries {
        if let Value::Object(map) = entry {
            for (prefix, uri) in map {
                if let Value::String(uri) = uri {
                    prefixes.insert(prefix, uri);
                }
            }
        }
    }
    prefixes
}

fn namespace_of(prefixed: &str, prefixes: &BTreeMap<String, String>) -> (String, String) {
    match prefixed.split_once(':') {
        Some((prefix, local)) if prefix != "cbvmda" => match prefixes.get(prefix) {
            Some(ns) => (ns.clone(), local.to_string()),
            None => (prefix.to_string(), local.to_string()),
        },
        _ => (String::new(), prefixed.to_string()),
    }
}

fn parse_time(s: &str) -> CodecResult<DateTime<Utc>> {
    DateTime::parse_from_rfc3339(s)
        .map(|dt| dt.with_timezone(&Utc))
        .map_err(|e| CodecError::MalformedDocument(format!("bad timestamp '{s}': {e}")))
}

fn str_field(obj: &Map<String, Value>, key: &str) -> Option<String> {
    obj.get(key).and_then(|v| v.as_str()).map(str::to_string)
}

fn epc_list(obj: &Map<String, Value>, key: &str, epc_type: EpcType) -> Vec<Epc> {
    obj.get(key)
        .and_then(Value::as_array)
        .map(|items| {
            items
                .iter()
                .filter_map(Value::as_str)
                .map(|id| Epc::new(epc_type, id))
                .collect()
        })
        .unwrap_or_default()
}

fn quantity_list(obj: &Map<String, Value>, key: &str, epc_type: EpcType) -> Vec<Epc> {
    obj.get(key)
        .and_then(Value::as_array)
        .map(|items| {
            items
                .iter()
                .filter_map(Value::as_object)
                .filter_map(|q| {
                    let class = str_field(q, "epcClass")?;
                    let quantity = q.get("quantity")?.as_f64()?;
                    let uom = str_field(q, "uom");
                    Some(Epc::new(epc_type, class).with_quantity(quantity, uom))
                })
                .collect()
        })
        .unwrap_or_default()
}

fn biz_transaction_list(obj: &Map<String, Value>) -> Vec<BusinessTransaction> {
    obj.get("bizTransactionList")
        .and_then(Value::as_array)
        .map(|items| {
            items
                .iter()
                .filter_map(Value::as_object)
                .map(|t| BusinessTransaction {
                    transaction_type: str_field(t, "type").unwrap_or_default(),
                    id: str_field(t, "bizTransaction").unwrap_or_default(),
                })
                .collect()
        })
        .unwrap_or_default()
}

fn source_dest_list(obj: &Map<String, Value>, key: &str, member_key: &str) -> Vec<SourceDest> {
    obj.get(key)
        .and_then(Value::as_array)
        .map(|items| {
            items
                .iter()
                .filter_map(Value::as_object)
                .map(|s| SourceDest {
                    sdt_type: str_field(s, "type").unwrap_or_default(),
                    id: str_field(s, member_key).unwrap_or_default(),
                })
                .collect()
        })
        .unwrap_or_default()
}

fn persistent_disposition(obj: &Map<String, Value>) -> Option<PersistentDisposition> {
    let node = obj.get("persistentDisposition")?.as_object()?;
    let set = node
        .get("set")
        .and_then(Value::as_array)
        .map(|v| v.iter().filter_map(Value::as_str).map(str::to_string).collect())
        .unwrap_or_default();
    let unset = node
        .get("unset")
        .and_then(Value::as_array)
        .map(|v| v.iter().filter_map(Value::as_str).map(str::to_string).collect())
        .unwrap_or_default();
    Some(PersistentDisposition { set, unset })
}

fn sensor_element_list(
    obj: &Map<String, Value>,
    indexer: &mut FieldIndexer,
    prefixes: &BTreeMap<String, String>,
    fields: &mut Vec<Field>,
) -> CodecResult<Vec<SensorElement>> {
    let Some(items) = obj.get("sensorElementList").and_then(Value::as_array) else {
        return Ok(Vec::new());
    };

    let mut elements = Vec::new();
    for (element_index, item) in items.iter().enumerate() {
        let element_index = element_index as u32;
        let Some(item) = item.as_object() else { continue };
        let mut element = SensorElement::new(element_index);

        if let Some(metadata) = item.get("sensorMetadata").and_then(Value::as_object) {
            element.sensor_metadata_time =
                str_field(metadata, "time").map(|s| parse_time(&s)).transpose()?;
            element.sensor_metadata_start_time =
                str_field(metadata, "startTime").map(|s| parse_time(&s)).transpose()?;
            element.sensor_metadata_end_time =
                str_field(metadata, "endTime").map(|s| parse_time(&s)).transpose()?;
            element.sensor_metadata_device_id = str_field(metadata, "deviceID");
            element.sensor_metadata_device_metadata = str_field(metadata, "deviceMetadata");
            element.sensor_metadata_raw_data = str_field(metadata, "rawData");

            flatten_extension_object(
                metadata,
                &["time", "startTime", "endTime", "deviceID", "deviceMetadata", "rawData"],
                FieldType::SensorElementExtension,
                Some(element.index),
                indexer,
                prefixes,
                fields,
            );
        }

        if let Some(reports) = item.get("sensorReport").and_then(Value::as_array) {
            for (report_index, report) in reports.iter().enumerate() {
                let Some(report) = report.as_object() else { continue };
                let mut r = SensorReport::new(report_index as u32, element_index);
                r.sensor_type = str_field(report, "type");
                r.device_id = str_field(report, "deviceID");
                r.device_metadata = str_field(report, "deviceMetadata");
                r.raw_data = str_field(report, "rawData");
                r.time = str_field(report, "time").map(|s| parse_time(&s)).transpose()?;
                r.value = report.get("value").and_then(Value::as_f64);
                r.component = str_field(report, "component");
                r.min_value = report.get("minValue").and_then(Value::as_f64);
                r.max_value = report.get("maxValue").and_then(Value::as_f64);
                r.mean_value = report.get("meanValue").and_then(Value::as_f64);
                r.sdev = report.get("sDev").and_then(Value::as_f64);
                r.perc_rank = report.get("percRank").and_then(Value::as_f64);
                r.perc_value = report.get("percValue").and_then(Value::as_f64);
                r.uom = str_field(report, "uom");
                r.string_value = str_field(report, "stringValue");
                r.boolean_value = report.get("booleanValue").and_then(Value::as_bool);
                r.hex_binary_value = str_field(report, "hexBinaryValue");
                r.uri_value = str_field(report, "uriValue");

                const KNOWN: &[&str] = &[
                    "type", "deviceID", "deviceMetadata", "rawData", "time", "value", "component",
                    "minValue", "maxValue", "meanValue", "sDev", "percRank", "percValue", "uom",
                    "stringValue", "booleanValue", "hexBinaryValue", "uriValue",
                ];
                flatten_extension_object(
                    report,
                    KNOWN,
                    FieldType::SensorReportExtension,
                    Some(r.index),
                    indexer,
                    prefixes,
                    fields,
                );
                element.reports.push(r);
            }
        }

        elements.push(element);
    }
    Ok(elements)
}

/// Flatten every key of `obj` not in `skip` as an extension Field, rewriting
/// prefixed keys through `@context` (spec.md §4.1 step 6).
fn flatten_extension_object(
    obj: &Map<String, Value>,
    skip: &[&str],
    field_type: FieldType,
    entity_index: Option<u32>,
    indexer: &mut FieldIndexer,
    prefixes: &BTreeMap<String, String>,
    out: &mut Vec<Field>,
) {
    for (key, value) in obj {
        if skip.contains(&key.as_str()) {
            continue;
        }
        flatten_value(key, value, None, field_type, entity_index, indexer, prefixes, out);
    }
}

fn flatten_value(
    key: &str,
    value: &Value,
    parent_index: Option<u32>,
    field_type: FieldType,
    entity_index: Option<u32>,
    indexer: &mut FieldIndexer,
    prefixes: &BTreeMap<String, String>,
    out: &mut Vec<Field>,
) {
    let (namespace, local_name) = namespace_of(key, prefixes);
    match value {
        Value::Object(map) => {
            let index = indexer.next_index_branch(field_type, &namespace, &local_name, parent_index, entity_index, out);
            for (child_key, child_value) in map {
                flatten_value(child_key, child_value, Some(index), field_type, entity_index, indexer, prefixes, out);
            }
        }
        Value::Array(items) => {
            for item in items {
                flatten_value(key, item, parent_index, field_type, entity_index, indexer, prefixes, out);
            }
        }
        Value::String(s) => {
            indexer.push_leaf(field_type, &namespace, &local_name, s.clone(), parent_index, entity_index, out);
        }
        Value::Number(n) => {
            indexer.push_leaf(field_type, &namespace, &local_name, n.to_string(), parent_index, entity_index, out);
        }
        Value::Bool(b) => {
            indexer.push_leaf(field_type, &namespace, &local_name, b.to_string(), parent_index, entity_index, out);
        }
        Value::Null => {}
    }
}

pub fn decode_event(obj: &Map<String, Value>, prefixes: &BTreeMap<String, String>) -> CodecResult<Event> {
    let event_type_name = str_field(obj, "type")
        .or_else(|| str_field(obj, "isA"))
        .ok_or_else(|| CodecError::SchemaInvalid("event missing type/isA".to_string()))?;
    let event_type = EventType::parse(&event_type_name)
        .ok_or_else(|| CodecError::SchemaInvalid(format!("unknown event type '{event_type_name}'")))?;

    let event_time = str_field(obj, "eventTime")
        .ok_or_else(|| CodecError::SchemaInvalid("event missing eventTime".to_string()))?;
    let tz = str_field(obj, "eventTimeZoneOffset").unwrap_or_default();

    let mut event = Event::new(event_type, parse_time(&event_time)?, tz);
    event.event_id = str_field(obj, "eventID").unwrap_or_default().into();
    event.action = str_field(obj, "action").and_then(|s| Action::parse(&s));
    event.business_step = str_field(obj, "bizStep");
    event.disposition = str_field(obj, "disposition");
    event.read_point = obj.get("readPoint").and_then(Value::as_object).and_then(|r| str_field(r, "id"));
    event.business_location = obj.get("bizLocation").and_then(Value::as_object).and_then(|r| str_field(r, "id"));
    event.transformation_id = str_field(obj, "transformationID");
    event.certification_info = str_field(obj, "certificationInfo");

    if let Some(decl) = obj.get("errorDeclaration").and_then(Value::as_object) {
        event.corrective_declaration_time =
            str_field(decl, "declarationTime").map(|s| parse_time(&s)).transpose()?;
        event.corrective_reason = str_field(decl, "reason");
        event.corrective_event_ids = decl
            .get("correctiveEventIDs")
            .and_then(Value::as_array)
            .map(|v| v.iter().filter_map(Value::as_str).map(|s| s.to_string().into()).collect())
            .unwrap_or_default();
    }

    event.epcs.extend(epc_list(obj, "epcList", EpcType::List));
    event.epcs.extend(epc_list(obj, "childEPCs", EpcType::ChildEpc));
    event.epcs.extend(epc_list(obj, "inputEPCList", EpcType::InputEpc));
    event.epcs.extend(epc_list(obj, "outputEPCList", EpcType::OutputEpc));
    if let Some(parent) = str_field(obj, "parentID") {
        event.epcs.push(Epc::new(EpcType::ParentId, parent));
    }
    event.epcs.extend(quantity_list(obj, "quantityList", EpcType::Quantity));
    event.epcs.extend(quantity_list(obj, "childQuantityList", EpcType::Quantity));
    event.epcs.extend(quantity_list(obj, "inputQuantityList", EpcType::Quantity));
    event.epcs.extend(quantity_list(obj, "outputQuantityList", EpcType::Quantity));

    event.business_transactions = biz_transaction_list(obj);
    event.sources = source_dest_list(obj, "sourceList", "source");
    event.destinations = source_dest_list(obj, "destinationList", "destination");
    event.persistent_disposition = persistent_disposition(obj);

    let mut indexer = FieldIndexer::new();
    let mut fields = Vec::new();

    if let Some(ilmd) = obj.get("ilmd").and_then(Value::as_object) {
        flatten_extension_object(ilmd, &[], FieldType::Ilmd, None, &mut indexer, prefixes, &mut fields);
    }
    event.sensor_elements = sensor_element_list(obj, &mut indexer, prefixes, &mut fields)?;

    let mut known: Vec<&str> = EVENT_KEYS.to_vec();
    known.extend(ERROR_DECLARATION_KEYS);
    for (key, value) in obj {
        if known.contains(&key.as_str()) {
            continue;
        }
        flatten_value(key, value, None, FieldType::EventExtension, None, &mut indexer, prefixes, &mut fields);
    }
    event.fields = fields;

    Ok(event)
}

pub fn decode_vocabulary_list(items: &[Value]) -> Vec<MasterData> {
    let mut out = Vec::new();
    for entry in items {
        let Some(entry) = entry.as_object() else { continue };
        let Some(vtype) = str_field(entry, "type") else { continue };
        let Some(elements) = entry.get("vocabularyElementList").and_then(Value::as_array) else { continue };
        for element in elements {
            let Some(element) = element.as_object() else { continue };
            let Some(id) = str_field(element, "id") else { continue };
            let mut md = MasterData::new(vtype.clone(), id);
            if let Some(attrs) = element.get("attributes").and_then(Value::as_array) {
                for attr in attrs.iter().filter_map(Value::as_object) {
                    if let (Some(id), Some(value)) = (str_field(attr, "id"), str_field(attr, "attribute")) {
                        md.attributes.insert(id, value);
                    }
                }
            }
            if let Some(children) = element.get("children").and_then(Value::as_array) {
                md.children = children.iter().filter_map(Value::as_str).map(str::to_string).collect();
            }
            out.push(md);
        }
    }
    out
}

pub fn decode_header(root: &Map<String, Value>) -> Option<StandardBusinessHeader> {
    let header = root.get("epcisHeader")?.as_object()?;
    let sbdh = header.get("sbdh")?.as_object()?;
    Some(StandardBusinessHeader {
        sender: sbdh
            .get("sender")
            .and_then(Value::as_object)
            .and_then(|s| str_field(s, "identifier")),
        receiver: sbdh
            .get("receiver")
            .and_then(Value::as_object)
            .and_then(|s| str_field(s, "identifier")),
        document_identification: sbdh
            .get("documentIdentification")
            .and_then(Value::as_object)
            .and_then(|d| str_field(d, "instanceIdentifier")),
        creation_date_time: sbdh
            .get("documentIdentification")
            .and_then(Value::as_object)
            .and_then(|d| str_field(d, "creationDateAndTime"))
            .map(|s| parse_time(&s))
            .transpose()
            .ok()
            .flatten(),
    })
}

pub fn decode_document(root: &Value) -> CodecResult<EpcisDocument> {
    let root_obj = root.as_object().ok_or_else(|| CodecError::MalformedDocument("top-level value is not an object".to_string()))?;

    let version_attr = str_field(root_obj, "schemaVersion").unwrap_or_else(|| "2.0".to_string());
    let schema_version = SchemaVersion::parse(&version_attr)
        .ok_or_else(|| CodecError::UnsupportedVersion(version_attr.clone()))?;

    let creation_date = str_field(root_obj, "creationDate").map(|s| parse_time(&s)).transpose()?;
    let prefixes = parse_context(root);
    let standard_business_header = decode_header(root_obj);

    let body = root_obj
        .get("epcisBody")
        .and_then(Value::as_object)
        .ok_or_else(|| CodecError::SchemaInvalid("missing epcisBody".to_string()))?;

    let mut events = Vec::new();
    if let Some(list) = body.get("eventList").and_then(Value::as_array) {
        for node in list {
            let obj = node.as_object().ok_or_else(|| CodecError::MalformedDocument("event is not an object".to_string()))?;
            events.push(decode_event(obj, &prefixes)?);
        }
    }

    let mut master_data = Vec::new();
    if let Some(list) = body
        .get("vocabularyList")
        .and_then(Value::as_object)
        .and_then(|v| v.get("vocabularyList"))
        .and_then(Value::as_array)
    {
        master_data.extend(decode_vocabulary_list(list));
    }

    Ok(EpcisDocument { schema_version, creation_date, standard_business_header, events, master_data })
}

// --- Encode side -----------------------------------------------------

fn obj(pairs: Vec<(&'static str, Value)>) -> Value {
    Value::Object(pairs.into_iter().collect())
}

fn collect_namespaces(doc: &EpcisDocument) -> BTreeMap<String, String> {
    let mut seen = Vec::new();
    for event in &doc.events {
        for field in &event.fields {
            if !field.namespace.is_empty() && !seen.contains(&field.namespace) {
                seen.push(field.namespace.clone());
            }
        }
    }
    seen.into_iter().enumerate().map(|(i, ns)| (ns, format!("ext{}", i + 1))).collect()
}

fn qualified_key(namespace: &str, local_name: &str, prefixes: &BTreeMap<String, String>) -> String {
    match prefixes.get(namespace) {
        Some(prefix) => format!("{prefix}:{local_name}"),
        None => local_name.to_string(),
    }
}

/// Rebuild the JSON object/value for one reconstructed extension node.
fn encode_reconstructed(node: &crate::flatten::ReconstructedNode, prefixes: &BTreeMap<String, String>) -> Value {
    if node.children.is_empty() {
        return Value::String(node.text.clone());
    }
    let mut map = Map::new();
    for child in &node.children {
        let key = qualified_key(&child.namespace, &child.local_name, prefixes);
        map.insert(key, encode_reconstructed(child, prefixes));
    }
    for (ns, name, value) in &node.attributes {
        map.insert(qualified_key(ns, name, prefixes), Value::String(value.clone()));
    }
    Value::Object(map)
}

fn encode_extension_fields(
    fields: &[Field],
    field_type: FieldType,
    entity_index: Option<u32>,
    prefixes: &BTreeMap<String, String>,
) -> Map<String, Value> {
    let matching: Vec<&Field> = fields
        .iter()
        .filter(|f| f.field_type == field_type && f.entity_index == entity_index)
        .collect();
    let mut map = Map::new();
    for node in crate::flatten::rebuild_tree(&matching) {
        let key = qualified_key(&node.namespace, &node.local_name, prefixes);
        map.insert(key, encode_reconstructed(&node, prefixes));
    }
    map
}

pub fn encode_event(event: &Event, prefixes: &BTreeMap<String, String>) -> Value {
    let mut map = Map::new();
    map.insert("type".to_string(), Value::String(event.event_type.as_str().to_string()));
    map.insert("eventTime".to_string(), Value::String(epcis_core::hash::canonical_timestamp(event.event_time)));
    map.insert("eventTimeZoneOffset".to_string(), Value::String(event.event_time_zone_offset.clone()));
    if !event.event_id.is_empty() {
        map.insert("eventID".to_string(), Value::String(event.event_id.to_string()));
    }
    if let Some(action) = event.action {
        map.insert("action".to_string(), Value::String(action.as_str().to_string()));
    }
    if let Some(v) = &event.business_step {
        map.insert("bizStep".to_string(), Value::String(v.clone()));
    }
    if let Some(v) = &event.disposition {
        map.insert("disposition".to_string(), Value::String(v.clone()));
    }
    if let Some(v) = &event.read_point {
        map.insert("readPoint".to_string(), obj(vec![("id", Value::String(v.clone()))]));
    }
    if let Some(v) = &event.business_location {
        map.insert("bizLocation".to_string(), obj(vec![("id", Value::String(v.clone()))]));
    }
    if let Some(v) = &event.transformation_id {
        map.insert("transformationID".to_string(), Value::String(v.clone()));
    }
    if let Some(v) = &event.certification_info {
        map.insert("certificationInfo".to_string(), Value::String(v.clone()));
    }

    if event.corrective_reason.is_some() || !event.corrective_event_ids.is_empty() {
        let mut decl = Map::new();
        if let Some(t) = event.corrective_declaration_time {
            decl.insert("declarationTime".to_string(), Value::String(epcis_core::hash::canonical_timestamp(t)));
        }
        if let Some(r) = &event.corrective_reason {
            decl.insert("reason".to_string(), Value::String(r.clone()));
        }
        decl.insert(
            "correctiveEventIDs".to_string(),
            Value::Array(event.corrective_event_ids.iter().map(|id| Value::String(id.to_string())).collect()),
        );
        map.insert("errorDeclaration".to_string(), Value::Object(decl));
    }

    let plain: Vec<&Epc> = event.epcs.iter().filter(|e| e.epc_type == EpcType::List).collect();
    if !plain.is_empty() {
        map.insert("epcList".to_string(), Value::Array(plain.iter().map(|e| Value::String(e.id.clone())).collect()));
    }
    let children: Vec<&Epc> = event.epcs.iter().filter(|e| e.epc_type == EpcType::ChildEpc).collect();
    if !children.is_empty() {
        map.insert("childEPCs".to_string(), Value::Array(children.iter().map(|e| Value::String(e.id.clone())).collect()));
    }
    if let Some(parent) = event.epcs.iter().find(|e| e.epc_type == EpcType::ParentId) {
        map.insert("parentID".to_string(), Value::String(parent.id.clone()));
    }
    let inputs: Vec<&Epc> = event.epcs.iter().filter(|e| e.epc_type == EpcType::InputEpc).collect();
    if !inputs.is_empty() {
        map.insert("inputEPCList".to_string(), Value::Array(inputs.iter().map(|e| Value::String(e.id.clone())).collect()));
    }
    let outputs: Vec<&Epc> = event.epcs.iter().filter(|e| e.epc_type == EpcType::OutputEpc).collect();
    if !outputs.is_empty() {
        map.insert("outputEPCList".to_string(), Value::Array(outputs.iter().map(|e| Value::String(e.id.clone())).collect()));
    }
    let qty: Vec<&Epc> = event.epcs.iter().filter(|e| e.epc_type == EpcType::Quantity).collect();
    if !qty.is_empty() {
        let key = match event.event_type {
            EventType::AggregationEvent => "childQuantityList",
            EventType::TransformationEvent => "outputQuantityList",
            _ => "quantityList",
        };
        map.insert(key.to_string(), Value::Array(qty.iter().map(encode_quantity_element).collect()));
    }

    if !event.business_transactions.is_empty() {
        map.insert(
            "bizTransactionList".to_string(),
            Value::Array(
                event
                    .business_transactions
                    .iter()
                    .map(|bt| obj(vec![("type", Value::String(bt.transaction_type.clone())), ("bizTransaction", Value::String(bt.id.clone()))]))
                    .collect(),
            ),
        );
    }
    if !event.sources.is_empty() {
        map.insert("sourceList".to_string(), encode_source_dest_list(&event.sources, "source"));
    }
    if !event.destinations.is_empty() {
        map.insert("destinationList".to_string(), encode_source_dest_list(&event.destinations, "destination"));
    }

    if let Some(pd) = &event.persistent_disposition {
        if !pd.set.is_empty() || !pd.unset.is_empty() {
            let mut node = Map::new();
            if !pd.set.is_empty() {
                node.insert("set".to_string(), Value::Array(pd.set.iter().map(|d| Value::String(d.clone())).collect()));
            }
            if !pd.unset.is_empty() {
                node.insert("unset".to_string(), Value::Array(pd.unset.iter().map(|d| Value::String(d.clone())).collect()));
            }
            map.insert("persistentDisposition".to_string(), Value::Object(node));
        }
    }

    if !event.sensor_elements.is_empty() {
        map.insert("sensorElementList".to_string(), encode_sensor_element_list(&event.sensor_elements, &event.fields, prefixes));
    }

    let ilmd = encode_extension_fields(&event.fields, FieldType::Ilmd, None, prefixes);
    if !ilmd.is_empty() {
        map.insert("ilmd".to_string(), Value::Object(ilmd));
    }

    for (key, value) in encode_extension_fields(&event.fields, FieldType::EventExtension, None, prefixes) {
        map.insert(key, value);
    }

    Value::Object(map)
}

fn encode_quantity_element(e: &&Epc) -> Value {
    let mut map = vec![("epcClass", Value::String(e.id.clone())), ("quantity", serde_json::json!(e.quantity.unwrap_or_default()))];
    if let Some(uom) = &e.unit_of_measure {
        map.push(("uom", Value::String(uom.clone())));
    }
    obj(map)
}

fn encode_source_dest_list(items: &[SourceDest], member_key: &str) -> Value {
    Value::Array(
        items
            .iter()
            .map(|sd| {
                let mut map = Map::new();
                map.insert("type".to_string(), Value::String(sd.sdt_type.clone()));
                map.insert(member_key.to_string(), Value::String(sd.id.clone()));
                Value::Object(map)
            })
            .collect(),
    )
}

fn encode_sensor_element_list(elements: &[SensorElement], fields: &[Field], prefixes: &BTreeMap<String, String>) -> Value {
    Value::Array(
        elements
            .iter()
            .map(|element| {
                let mut map = Map::new();

                let mut metadata = Map::new();
                if let Some(t) = element.sensor_metadata_time {
                    metadata.insert("time".to_string(), Value::String(epcis_core::hash::canonical_timestamp(t)));
                }
                if let Some(t) = element.sensor_metadata_start_time {
                    metadata.insert("startTime".to_string(), Value::String(epcis_core::hash::canonical_timestamp(t)));
                }
                if let Some(t) = element.sensor_metadata_end_time {
                    metadata.insert("endTime".to_string(), Value::String(epcis_core::hash::canonical_timestamp(t)));
                }
                if let Some(v) = &element.sensor_metadata_device_id {
                    metadata.insert("deviceID".to_string(), Value::String(v.clone()));
                }
                if let Some(v) = &element.sensor_metadata_device_metadata {
                    metadata.insert("deviceMetadata".to_string(), Value::String(v.clone()));
                }
                if let Some(v) = &element.sensor_metadata_raw_data {
                    metadata.insert("rawData".to_string(), Value::String(v.clone()));
                }
                for (key, value) in encode_extension_fields(fields, FieldType::SensorElementExtension, Some(element.index), prefixes) {
                    metadata.insert(key, value);
                }
                if !metadata.is_empty() {
                    map.insert("sensorMetadata".to_string(), Value::Object(metadata));
                }

                if !element.reports.is_empty() {
                    let reports = element
                        .reports
                        .iter()
                        .map(|report| {
                            let mut node = Map::new();
                            macro_rules! push_opt {
                                ($key:literal, $field:expr) => {
                                    if let Some(v) = $field {
                                        node.insert($key.to_string(), v);
                                    }
                                };
                            }
                            push_opt!("type", report.sensor_type.clone().map(Value::String));
                            push_opt!("deviceID", report.device_id.clone().map(Value::String));
                            push_opt!("deviceMetadata", report.device_metadata.clone().map(Value::String));
                            push_opt!("rawData", report.raw_data.clone().map(Value::String));
                            push_opt!("time", report.time.map(|t| Value::String(epcis_core::hash::canonical_timestamp(t))));
                            push_opt!("value", report.value.map(|v| serde_json::json!(v)));
                            push_opt!("component", report.component.clone().map(Value::String));
                            push_opt!("minValue", report.min_value.map(|v| serde_json::json!(v)));
                            push_opt!("maxValue", report.max_value.map(|v| serde_json::json!(v)));
                            push_opt!("meanValue", report.mean_value.map(|v| serde_json::json!(v)));
                            push_opt!("sDev", report.sdev.map(|v| serde_json::json!(v)));
                            push_opt!("percRank", report.perc_rank.map(|v| serde_json::json!(v)));
                            push_opt!("percValue", report.perc_value.map(|v| serde_json::json!(v)));
                            push_opt!("uom", report.uom.clone().map(Value::String));
                            push_opt!("stringValue", report.string_value.clone().map(Value::String));
                            push_opt!("booleanValue", report.boolean_value.map(Value::Bool));
                            push_opt!("hexBinaryValue", report.hex_binary_value.clone().map(Value::String));
                            push_opt!("uriValue", report.uri_value.clone().map(Value::String));
                            for (key, value) in encode_extension_fields(fields, FieldType::SensorReportExtension, Some(report.index), prefixes) {
                                node.insert(key, value);
                            }
                            Value::Object(node)
                        })
                        .collect();
                    map.insert("sensorReport".to_string(), Value::Array(reports));
                }

                Value::Object(map)
            })
            .collect(),
    )
}

pub fn encode_header(header: &StandardBusinessHeader) -> Value {
    let mut doc_id = Map::new();
    if let Some(v) = &header.document_identification {
        doc_id.insert("instanceIdentifier".to_string(), Value::String(v.clone()));
    }
    if let Some(t) = header.creation_date_time {
        doc_id.insert("creationDateAndTime".to_string(), Value::String(epcis_core::hash::canonical_timestamp(t)));
    }
    let mut sbdh = Map::new();
    if let Some(v) = &header.sender {
        sbdh.insert("sender".to_string(), obj(vec![("identifier", Value::String(v.clone()))]));
    }
    if let Some(v) = &header.receiver {
        sbdh.insert("receiver".to_string(), obj(vec![("identifier", Value::String(v.clone()))]));
    }
    if !doc_id.is_empty() {
        sbdh.insert("documentIdentification".to_string(), Value::Object(doc_id));
    }
    obj(vec![("sbdh", Value::Object(sbdh))])
}

pub fn encode_vocabulary_list(master_data: &[MasterData]) -> Value {
    let mut by_type: BTreeMap<&str, Vec<&MasterData>> = BTreeMap::new();
    for entry in master_data {
        by_type.entry(entry.vocabulary_type.as_str()).or_default().push(entry);
    }
    let lists: Vec<Value> = by_type
        .into_iter()
        .map(|(vtype, entries)| {
            let elements: Vec<Value> = entries
                .iter()
                .map(|e| {
                    let attrs: Vec<Value> = e
                        .attributes
                        .iter()
                        .map(|(k, v)| obj(vec![("id", Value::String(k.clone())), ("attribute", Value::String(v.clone()))]))
                        .collect();
                    obj(vec![
                        ("id", Value::String(e.id.clone())),
                        ("attributes", Value::Array(attrs)),
                        ("children", Value::Array(e.children.iter().map(|c| Value::String(c.clone())).collect())),
                    ])
                })
                .collect();
            obj(vec![("type", Value::String(vtype.to_string())), ("vocabularyElementList", Value::Array(elements))])
        })
        .collect();
    obj(vec![("vocabularyList", Value::Array(lists))])
}

pub fn encode_document(doc: &EpcisDocument) -> Value {
    let prefixes = collect_namespaces(doc);

    let mut context = vec![Value::String(EPCIS_CONTEXT_URL.to_string())];
    if !prefixes.is_empty() {
        let mut ctx_obj = Map::new();
        for (namespace, prefix) in &prefixes {
            ctx_obj.insert(prefix.clone(), Value::String(namespace.clone()));
        }
        context.push(Value::Object(ctx_obj));
    }

    let event_nodes: Vec<Value> = doc.events.iter().map(|e| encode_event(e, &prefixes)).collect();
    let mut body = Map::new();
    body.insert("eventList".to_string(), Value::Array(event_nodes));
    if !doc.master_data.is_empty() {
        body.insert("vocabularyList".to_string(), encode_vocabulary_list(&doc.master_data));
    }

    let mut root = Map::new();
    root.insert("@context".to_string(), Value::Array(context));
    root.insert("type".to_string(), Value::String("EPCISDocument".to_string()));
    root.insert("schemaVersion".to_string(), Value::String(doc.schema_version.as_str().to_string()));
    if let Some(cd) = doc.creation_date {
        root.insert("creationDate".to_string(), Value::String(epcis_core::hash::canonical_timestamp(cd)));
    }
    if let Some(header) = &doc.standard_business_header {
        root.insert("epcisHeader".to_string(), encode_header(header));
    }
    root.insert("epcisBody".to_string(), Value::Object(body));

    Value::Object(root)
}
