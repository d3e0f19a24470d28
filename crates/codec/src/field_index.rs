//! A per-event running DFS index, shared by every extension/ILMD/sensor
//! subtree flattened while decoding one event (spec.md §4.1 step 4: `index`
//! is "a monotonically increasing index per event", not per subtree).

use epcis_core::{Field, FieldType};

use crate::flatten::flatten_children;
use crate::xml_tree::XmlNode;

#[derive(Debug, Default)]
pub struct FieldIndexer {
    next_index: u32,
}

impl FieldIndexer {
    pub fn new() -> Self {
        Self { next_index: 0 }
    }

    /// Flatten `container`'s non-standard children (those not named in
    /// `skip`) into `out`, continuing this indexer's running sequence.
    pub fn flatten_with_skip(
        &mut self,
        container: &XmlNode,
        skip: &[&str],
        field_type: FieldType,
        entity_index: Option<u32>,
        out: &mut Vec<Field>,
    ) {
        flatten_children(container, skip, field_type, entity_index, &mut self.next_index, out);
    }

    /// Flatten every child of `container` (no standard sub-elements to
    /// exclude — used for plain `ilmd`/event-extension wrappers).
    pub fn flatten_into(
        &mut self,
        container: &XmlNode,
        field_type: FieldType,
        entity_index: Option<u32>,
        out: &mut Vec<Field>,
    ) {
        self.flatten_with_skip(container, &[], field_type, entity_index, out);
    }

    /// Push a branch Field (a JSON object with nested extension content) and
    /// return its index, for callers walking a `serde_json::Value` tree
    /// directly rather than an `XmlNode` (the JSON-LD decoder — JSON arrays
    /// don't map onto `flatten_children`'s one-element-per-child shape).
    pub fn next_index_branch(
        &mut self,
        field_type: FieldType,
        namespace: &str,
        local_name: &str,
        parent_index: Option<u32>,
        entity_index: Option<u32>,
        out: &mut Vec<Field>,
    ) -> u32 {
        let index = self.next_index;
        self.next_index += 1;
        out.push(Field::branch(field_type, namespace, local_name, index, parent_index, entity_index));
        index
    }

    /// Push a leaf Field, continuing this indexer's running sequence.
    pub fn push_leaf(
        &mut self,
        field_type: FieldType,
        namespace: &str,
        local_name: &str,
        text: String,
        parent_index: Option<u32>,
        entity_index: Option<u32>,
        out: &mut Vec<Field>,
    ) {
        let index = self.next_index;
        self.next_index += 1;
        out.push(Field::leaf(field_type, namespace, local_name, text, index, parent_index, entity_index));
    }
}
