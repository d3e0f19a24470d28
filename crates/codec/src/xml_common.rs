//! Element-level decode/encode helpers shared by the EPCIS 1.x and 2.0 XML
//! decoders: EPC partitioning, business transactions, source/destination,
//! sensor elements, and persistentDisposition. Both version modules drive
//! these from their own event-shape dispatch (`xml1::decode_event`,
//! `xml2::decode_event`) since only the *wrapping* differs between versions
//! (spec.md §4.1 "Version specifics").

use chrono::{DateTime, Utc};

use epcis_core::{
    BusinessTransaction, Epc, EpcType, Field, FieldType, PersistentDisposition, SensorElement,
    SensorReport, SourceDest,
};

use crate::error::{CodecError, CodecResult};
use crate::field_index::FieldIndexer;
use crate::xml_tree::XmlNode;

fn parse_time(s: &str) -> CodecResult<DateTime<Utc>> {
    DateTime::parse_from_rfc3339(s)
        .map(|dt| dt.with_timezone(&Utc))
        .map_err(|e| CodecError::MalformedDocument(format!("bad timestamp '{s}': {e}")))
}

/// `<epcList><epc>urn:...</epc>...</epcList>` (or `childEPCs`/`inputEPCList`/...).
pub fn parse_epc_list(list: &XmlNode, epc_type: EpcType) -> Vec<Epc> {
    list.children_named("epc").map(|e| Epc::new(epc_type, e.text_trimmed())).collect()
}

/// `<parentID>urn:...</parentID>`, an AggregationEvent singleton.
pub fn parse_parent_id(event: &XmlNode) -> Option<Epc> {
    event.child("parentID").map(|n| Epc::new(EpcType::ParentId, n.text_trimmed()))
}

/// `<quantityList><quantityElement><epcClass>.../epcClass><quantity>1</quantity><uom>KGM</uom></quantityElement></quantityList>`.
pub fn parse_quantity_list(list: &XmlNode) -> Vec<Epc> {
    list.children_named("quantityElement")
        .filter_map(|q| {
            let class = q.child("epcClass")?.text_trimmed().to_string();
            let quantity: f64 = q.child("quantity")?.text_trimmed().parse().ok()?;
            let uom = q.child("uom").map(|n| n.text_trimmed().to_string());
            Some(Epc::new(EpcType::Quantity, class).with_quantity(quantity, uom))
        })
        .collect()
}

pub fn parse_business_transactions(list: &XmlNode) -> Vec<BusinessTransaction> {
    list.children_named("bizTransaction")
        .map(|n| BusinessTransaction {
            transaction_type: attr(n, "type").unwrap_or_default(),
            id: n.text_trimmed().to_string(),
        })
        .collect()
}

pub fn parse_source_dest(list: &XmlNode, tag: &str) -> Vec<SourceDest> {
    list.children_named(tag)
        .map(|n| SourceDest { sdt_type: attr(n, "type").unwrap_or_default(), id: n.text_trimmed().to_string() })
        .collect()
}

fn attr<'a>(node: &'a XmlNode, local_name: &str) -> Option<String> {
    node.attributes.iter().find(|(_, name, _)| name == local_name).map(|(_, _, v)| v.clone())
}

fn opt_f64(node: &XmlNode, tag: &str) -> Option<f64> {
    node.child(tag).and_then(|n| n.text_trimmed().parse().ok())
}

fn opt_text(node: &XmlNode, tag: &str) -> Option<String> {
    node.child(tag).map(|n| n.text_trimmed().to_string()).filter(|s| !s.is_empty())
}

fn opt_time(node: &XmlNode, tag: &str) -> CodecResult<Option<DateTime<Utc>>> {
    match node.child(tag) {
        Some(n) if !n.text_trimmed().is_empty() => Ok(Some(parse_time(n.text_trimmed())?)),
        _ => Ok(None),
    }
}

/// `<sensorElementList><sensorElement>...<sensorReport .../></sensorElement></sensorElementList>`
/// (EPCIS 2.0 shape — used directly by `xml2`, and by `xml1` for the rare
/// 1.x documents that already carry the 2.0 sensor extension).
pub fn parse_sensor_element_list(
    list: &XmlNode,
    indexer: &mut FieldIndexer,
    fields: &mut Vec<Field>,
) -> CodecResult<Vec<SensorElement>> {
    let mut elements = Vec::new();
    for (element_index, elem_node) in list.children_named("sensorElement").enumerate() {
        let element_index = element_index as u32;
        let mut element = SensorElement::new(element_index);

        if let Some(metadata) = elem_node.child("sensorMetadata") {
            element.sensor_metadata_time = opt_time(metadata, "time")?;
            element.sensor_metadata_start_time = opt_time(metadata, "startTime")?;
            element.sensor_metadata_end_time = opt_time(metadata, "endTime")?;
            element.sensor_metadata_device_id = attr(metadata, "deviceID");
            element.sensor_metadata_device_metadata = attr(metadata, "deviceMetadata");
            element.sensor_metadata_raw_data = attr(metadata, "rawData");
        }

        if let Some(report_list) = elem_node.child("sensorReportList") {
            for (report_index, report_node) in report_list.children_named("sensorReport").enumerate() {
                let mut report = SensorReport::new(report_index as u32, element_index);
                report.sensor_type = attr(report_node, "type");
                report.device_id = attr(report_node, "deviceID");
                report.device_metadata = attr(report_node, "deviceMetadata");
                report.raw_data = attr(report_node, "rawData");
                report.time = attr(report_node, "time").map(|s| parse_time(&s)).transpose()?;
                report.value = attr(report_node, "value").and_then(|s| s.parse().ok());
                report.component = attr(report_node, "component");
                report.min_value = attr(report_node, "minValue").and_then(|s| s.parse().ok());
                report.max_value = attr(report_node, "maxValue").and_then(|s| s.parse().ok());
                report.mean_value = attr(report_node, "meanValue").and_then(|s| s.parse().ok());
                report.sdev = attr(report_node, "sDev").and_then(|s| s.parse().ok());
                report.perc_rank = attr(report_node, "percRank").and_then(|s| s.parse().ok());
                report.perc_value = attr(report_node, "percValue").and_then(|s| s.parse().ok());
                report.uom = attr(report_node, "uom");
                report.string_value = attr(report_node, "stringValue");
                report.boolean_value = attr(report_node, "booleanValue").and_then(|s| s.parse().ok());
                report.hex_binary_value = attr(report_node, "hexBinaryValue");
                report.uri_value = attr(report_node, "uriValue");

                indexer.flatten_into(report_node, FieldType::SensorReportExtension, Some(report.index), fields);
                elements_push_report(&mut element, report);
            }
        }

        indexer.flatten_with_skip(
            elem_node,
            &["sensorMetadata", "sensorReportList"],
            FieldType::SensorElementExtension,
            Some(element.index),
            fields,
        );
        elements.push(element);
    }
    Ok(elements)
}

fn elements_push_report(element: &mut SensorElement, report: SensorReport) {
    element.reports.push(report);
}

pub fn parse_persistent_disposition(node: &XmlNode) -> PersistentDisposition {
    let mut pd = PersistentDisposition::default();
    if let Some(set) = node.child("set") {
        pd.set = set.children_named("disposition").map(|n| n.text_trimmed().to_string()).collect();
    }
    if let Some(unset) = node.child("unset") {
        pd.unset = unset.children_named("disposition").map(|n| n.text_trimmed().to_string()).collect();
    }
    pd
}

pub fn f64_or_none(node: &XmlNode, tag: &str) -> Option<f64> {
    opt_f64(node, tag)
}

pub fn text_or_none(node: &XmlNode, tag: &str) -> Option<String> {
    opt_text(node, tag)
}

// --- Encode side -----------------------------------------------------

pub fn leaf(local_name: &str, text: impl Into<String>) -> XmlNode {
    XmlNode { namespace: String::new(), local_name: local_name.to_string(), attributes: Vec::new(), children: Vec::new(), text: text.into() }
}

pub fn branch(local_name: &str, children: Vec<XmlNode>) -> XmlNode {
    XmlNode { namespace: String::new(), local_name: local_name.to_string(), attributes: Vec::new(), children, text: String::new() }
}

pub fn wrap_id(local_name: &str, id: impl Into<String>) -> XmlNode {
    branch(local_name, vec![leaf("id", id)])
}

fn canonical_timestamp(dt: DateTime<Utc>) -> String {
    epcis_core::hash::canonical_timestamp(dt)
}

pub fn encode_epc_list(local_name: &str, epcs: &[&Epc]) -> Option<XmlNode> {
    if epcs.is_empty() {
        return None;
    }
    Some(branch(local_name, epcs.iter().map(|e| leaf("epc", e.id.clone())).collect()))
}

pub fn encode_quantity_list(local_name: &str, epcs: &[&Epc]) -> Option<XmlNode> {
    if epcs.is_empty() {
        return None;
    }
    let elements = epcs
        .iter()
        .map(|e| {
            let mut children = vec![leaf("epcClass", e.id.clone())];
            children.push(leaf("quantity", epcis_core::hash::canonical_number(e.quantity.unwrap_or_default())));
            if let Some(uom) = &e.unit_of_measure {
                children.push(leaf("uom", uom.clone()));
            }
            branch("quantityElement", children)
        })
        .collect();
    Some(branch(local_name, elements))
}

pub fn encode_business_transaction_list(items: &[BusinessTransaction]) -> Option<XmlNode> {
    if items.is_empty() {
        return None;
    }
    Some(branch(
        "bizTransactionList",
        items
            .iter()
            .map(|bt| {
                let mut node = leaf("bizTransaction", bt.id.clone());
                node.attributes.push((String::new(), "type".to_string(), bt.transaction_type.clone()));
                node
            })
            .collect(),
    ))
}

pub fn encode_source_dest_list(local_name: &str, tag: &str, items: &[SourceDest]) -> Option<XmlNode> {
    if items.is_empty() {
        return None;
    }
    Some(branch(
        local_name,
        items
            .iter()
            .map(|sd| {
                let mut node = leaf(tag, sd.id.clone());
                node.attributes.push((String::new(), "type".to_string(), sd.sdt_type.clone()));
                node
            })
            .collect(),
    ))
}

fn attr_node(node: &mut XmlNode, name: &str, value: impl Into<String>) {
    node.attributes.push((String::new(), name.to_string(), value.into()));
}

pub fn encode_sensor_element_list(elements: &[SensorElement]) -> Option<XmlNode> {
    if elements.is_empty() {
        return None;
    }
    let element_nodes = elements
        .iter()
        .map(|element| {
            let mut metadata = XmlNode { namespace: String::new(), local_name: "sensorMetadata".to_string(), attributes: Vec::new(), children: Vec::new(), text: String::new() };
            if let Some(t) = element.sensor_metadata_time {
                attr_node(&mut metadata, "time", canonical_timestamp(t));
            }
            if let Some(t) = element.sensor_metadata_start_time {
                attr_node(&mut metadata, "startTime", canonical_timestamp(t));
            }
            if let Some(t) = element.sensor_metadata_end_time {
                attr_node(&mut metadata, "endTime", canonical_timestamp(t));
            }
            if let Some(v) = &element.sensor_metadata_device_id {
                attr_node(&mut metadata, "deviceID", v.clone());
            }
            if let Some(v) = &element.sensor_metadata_device_metadata {
                attr_node(&mut metadata, "deviceMetadata", v.clone());
            }
            if let Some(v) = &element.sensor_metadata_raw_data {
                attr_node(&mut metadata, "rawData", v.clone());
            }

            let report_nodes = element
                .reports
                .iter()
                .map(|report| {
                    let mut node = XmlNode { namespace: String::new(), local_name: "sensorReport".to_string(), attributes: Vec::new(), children: Vec::new(), text: String::new() };
                    if let Some(v) = &report.sensor_type {
                        attr_node(&mut node, "type", v.clone());
                    }
                    if let Some(v) = &report.device_id {
                        attr_node(&mut node, "deviceID", v.clone());
                    }
                    if let Some(v) = &report.device_metadata {
                        attr_node(&mut node, "deviceMetadata", v.clone());
                    }
                    if let Some(v) = &report.raw_data {
                        attr_node(&mut node, "rawData", v.clone());
                    }
                    if let Some(v) = report.time {
                        attr_node(&mut node, "time", canonical_timestamp(v));
                    }
                    if let Some(v) = report.value {
                        attr_node(&mut node, "value", epcis_core::hash::canonical_number(v));
                    }
                    if let Some(v) = &report.component {
                        attr_node(&mut node, "component", v.clone());
                    }
                    if let Some(v) = report.min_value {
                        attr_node(&mut node, "minValue", epcis_core::hash::canonical_number(v));
                    }
                    if let Some(v) = report.max_value {
                        attr_node(&mut node, "maxValue", epcis_core::hash::canonical_number(v));
                    }
                    if let Some(v) = report.mean_value {
                        attr_node(&mut node, "meanValue", epcis_core::hash::canonical_number(v));
                    }
                    if let Some(v) = report.sdev {
                        attr_node(&mut node, "sDev", epcis_core::hash::canonical_number(v));
                    }
                    if let Some(v) = report.perc_rank {
                        attr_node(&mut node, "percRank", epcis_core::hash::canonical_number(v));
                    }
                    if let Some(v) = report.perc_value {
                        attr_node(&mut node, "percValue", epcis_core::hash::canonical_number(v));
                    }
                    if let Some(v) = &report.uom {
                        attr_node(&mut node, "uom", v.clone());
                    }
                    if let Some(v) = &report.string_value {
                        attr_node(&mut node, "stringValue", v.clone());
                    }
                    if let Some(v) = report.boolean_value {
                        attr_node(&mut node, "booleanValue", v.to_string());
                    }
                    if let Some(v) = &report.hex_binary_value {
                        attr_node(&mut node, "hexBinaryValue", v.clone());
                    }
                    if let Some(v) = &report.uri_value {
                        attr_node(&mut node, "uriValue", v.clone());
                    }
                    node
                })
                .collect();

            let mut children = Vec::new();
            if !metadata.attributes.is_empty() {
                children.push(metadata);
            }
            if !report_nodes.is_empty() {
                children.push(branch("sensorReportList", report_nodes));
            }
            branch("sensorElement", children)
        })
        .collect();
    Some(branch("sensorElementList", element_nodes))
}

pub fn encode_persistent_disposition(pd: &PersistentDisposition) -> Option<XmlNode> {
    if pd.set.is_empty() && pd.unset.is_empty() {
        return None;
    }
    let mut children = Vec::new();
    if !pd.set.is_empty() {
        children.push(branch("set", pd.set.iter().map(|d| leaf("disposition", d.clone())).collect()));
    }
    if !pd.unset.is_empty() {
        children.push(branch("unset", pd.unset.iter().map(|d| leaf("disposition", d.clone())).collect()));
    }
    Some(branch("persistentDisposition", children))
}
