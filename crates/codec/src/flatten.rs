//! DFS flattening of a custom-namespace XML/JSON subtree into `Field` rows,
//! and the inverse bucket-by-`parent_index` reconstruction used by encoders.
//!
//! Spec.md Design Notes "Hierarchical fields → flat indexed entries": both
//! directions here are O(n) in the subtree size — flatten is a single DFS
//! walk, rebuild is a single descending pass keyed by `parent_index` rather
//! than a `Vec::iter().find()` per node.

use std::collections::HashMap;

use epcis_core::{Field, FieldType};

use crate::xml_tree::XmlNode;

/// DFS-flatten every child of `container` not named in `skip` (an `ilmd`,
/// event-level extension wrapper, or SensorElement/SensorReport whose
/// standard sub-elements — `sensorMetadata`, `sensorReportList`, and so on —
/// must not be reinterpreted as generic extension fields) into `out`,
/// assigning indices from `next_index` onward.
pub fn flatten_children(
    container: &XmlNode,
    skip: &[&str],
    field_type: FieldType,
    entity_index: Option<u32>,
    next_index: &mut u32,
    out: &mut Vec<Field>,
) {
    for child in &container.children {
        if skip.contains(&child.local_name.as_str()) {
            continue;
        }
        flatten_node(child, field_type, None, entity_index, next_index, out);
    }
}

fn flatten_node(
    node: &XmlNode,
    field_type: FieldType,
    parent_index: Option<u32>,
    entity_index: Option<u32>,
    next_index: &mut u32,
    out: &mut Vec<Field>,
) {
    let index = *next_index;
    *next_index += 1;

    if node.children.is_empty() {
        out.push(Field::leaf(
            field_type,
            node.namespace.clone(),
            node.local_name.clone(),
            node.text.clone(),
            index,
            parent_index,
            entity_index,
        ));
    } else {
        out.push(Field::branch(
            field_type,
            node.namespace.clone(),
            node.local_name.clone(),
            index,
            parent_index,
            entity_index,
        ));
        for child in &node.children {
            flatten_node(child, field_type, Some(index), entity_index, next_index, out);
        }
    }

    for (namespace, name, value) in &node.attributes {
        let attr_index = *next_index;
        *next_index += 1;
        out.push(
            Field::leaf(
                field_type,
                namespace.clone(),
                name.clone(),
                value.clone(),
                attr_index,
                Some(index),
                entity_index,
            )
            .as_attribute(),
        );
    }
}

/// A reconstructed tree node, independent of any particular output format —
/// XML encoders turn this into elements/attributes, the JSON-LD encoder
/// turns it into an object.
#[derive(Debug, Clone, PartialEq)]
pub struct ReconstructedNode {
    pub namespace: String,
    pub local_name: String,
    pub attributes: Vec<(String, String, String)>,
    pub children: Vec<ReconstructedNode>,
    pub text: String,
}

/// Rebuild the subtree(s) formed by `fields` (already filtered to one
/// `field_type`/`entity_index` partition) back into document order.
///
/// A single descending pass over `index` suffices because the flatten
/// invariant (`field.rs`: parent_index is always a strictly smaller index)
/// guarantees every node's children and attributes are visited before the
/// node itself when walking from the highest index down.
pub fn rebuild_tree(fields: &[&Field]) -> Vec<ReconstructedNode> {
    let mut children_of: HashMap<u32, Vec<ReconstructedNode>> = HashMap::new();
    let mut attrs_of: HashMap<u32, Vec<(String, String, String)>> = HashMap::new();
    let mut roots: Vec<ReconstructedNode> = Vec::new();

    let mut sorted: Vec<&Field> = fields.to_vec();
    sorted.sort_by_key(|f| std::cmp::Reverse(f.index));

    for field in sorted {
        if field.is_attribute {
            if let Some(parent) = field.parent_index {
                attrs_of.entry(parent).or_default().push((
                    field.namespace.clone(),
                    field.name.clone(),
                    field.text_value.clone().unwrap_or_default(),
                ));
            }
            continue;
        }

        let mut children = children_of.remove(&field.index).unwrap_or_default();
        children.reverse();
        let mut attributes = attrs_of.remove(&field.index).unwrap_or_default();
        attributes.reverse();

        let node = ReconstructedNode {
            namespace: field.namespace.clone(),
            local_name: field.name.clone(),
            attributes,
            children,
            text: field.text_value.clone().unwrap_or_default(),
        };

        match field.parent_index {
            Some(parent) => children_of.entry(parent).or_default().push(node),
            None => roots.push(node),
        }
    }

    roots.reverse();
    roots
}

#[cfg(test)]
mod tests {
    use super::*;

    fn leaf(ns: &str, name: &str, text: &str) -> XmlNode {
        XmlNode { namespace: ns.to_string(), local_name: name.to_string(), attributes: Vec::new(), children: Vec::new(), text: text.to_string() }
    }

    #[test]
    fn flatten_then_rebuild_round_trips_nested_extension() {
        let mut lot = leaf("urn:ex:ilmd", "lotNumber", "LOT-1");
        lot.attributes.push(("urn:ex:ilmd".to_string(), "unit".to_string(), "kg".to_string()));
        let container = XmlNode {
            namespace: "urn:ex:ilmd".to_string(),
            local_name: "ilmd".to_string(),
            attributes: Vec::new(),
            children: vec![lot, leaf("urn:ex:ilmd", "bestBefore", "2025-06-01T00:00:00Z")],
            text: String::new(),
        };

        let mut next_index = 0u32;
        let mut fields = Vec::new();
        flatten_children(&container, &[], FieldType::Ilmd, None, &mut next_index, &mut fields);
        assert_eq!(fields.len(), 3);

        let refs: Vec<&Field> = fields.iter().collect();
        let rebuilt = rebuild_tree(&refs);
        assert_eq!(rebuilt.len(), 2);
        assert_eq!(rebuilt[0].local_name, "lotNumber");
        assert_eq!(rebuilt[0].text, "LOT-1");
        assert_eq!(rebuilt[0].attributes[0].1, "unit");
        assert_eq!(rebuilt[1].local_name, "bestBefore");
    }

    #[test]
    fn flatten_assigns_strictly_increasing_indices() {
        let branch = XmlNode {
            namespace: "urn:ex".to_string(),
            local_name: "branch".to_string(),
            attributes: Vec::new(),
            children: vec![leaf("urn:ex", "a", "1"), leaf("urn:ex", "b", "2")],
            text: String::new(),
        };
        let container = XmlNode { namespace: String::new(), local_name: "ext".to_string(), attributes: Vec::new(), children: vec![branch], text: String::new() };

        let mut next_index = 0u32;
        let mut fields = Vec::new();
        flatten_children(&container, &[], FieldType::EventExtension, None, &mut next_index, &mut fields);

        for f in &fields {
            if let Some(parent) = f.parent_index {
                assert!(parent < f.index);
            }
        }
    }
}
