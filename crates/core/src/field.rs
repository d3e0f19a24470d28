//! Flat, indexed representation of hierarchical custom-namespace trees.
//!
//! Spec.md §3.1 / Design Notes: a naive nested-object Field tree would need
//! linked/cyclic structures and makes filter-chain SQL harder to express.
//! Instead every custom-namespaced subtree (ILMD, foreign event extensions,
//! SensorElement/SensorReport extensions) is flattened by a DFS walk at
//! decode time into a list of `Field` rows carrying enough structure
//! (`index`, `parent_index`, `entity_index`) to be both queried directly and
//! re-materialized into a tree at encode time (see `epcis-codec::tree`).

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// What kind of hierarchical payload this field belongs to.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum FieldType {
    /// Instance/Lot Master Data (`ilmd` element).
    Ilmd,
    /// A foreign-namespaced extension directly under the event element.
    EventExtension,
    /// A foreign-namespaced extension under a specific SensorElement.
    SensorElementExtension,
    /// A foreign-namespaced extension under a specific SensorReport.
    SensorReportExtension,
    /// A generic custom field not covered by the above (reserved for
    /// future extension points; current decoders never emit it directly).
    CustomField,
}

/// One flattened node (element or attribute) of a custom-namespace subtree.
///
/// Invariant (spec.md §3.1, tested in `epcis-core::validate`): within one
/// event, `index` is unique, and `parent_index` either is `None` or refers
/// to a strictly smaller `index` within the same `entity_index` partition.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Field {
    pub field_type: FieldType,
    pub namespace: String,
    pub name: String,

    /// Raw text content, always populated when the source node had text.
    pub text_value: Option<String>,
    /// Speculative numeric parse of `text_value` (spec.md §9 Open Question,
    /// option (a): replicate the reference system's speculative parsing).
    pub numeric_value: Option<f64>,
    /// Speculative ISO-8601 parse of `text_value`, normalized to UTC.
    pub date_value: Option<DateTime<Utc>>,

    /// Whether this Field represents an XML/JSON attribute of its parent
    /// element rather than a child element. Attributes share their
    /// parent's `index` as their own `parent_index`, as XML attributes have
    /// no position of their own in document order.
    pub is_attribute: bool,

    /// Position in DFS order of the source subtree, unique per event.
    pub index: u32,
    /// `index` of this field's parent node, or `None` for subtree roots.
    pub parent_index: Option<u32>,
    /// When this field belongs to a specific owned SensorElement/SensorReport,
    /// that entity's own index within the event (disambiguates which sensor
    /// entity's extension subtree this field belongs to).
    pub entity_index: Option<u32>,
}

impl Field {
    /// Build a Field from raw text, filling in the speculative numeric/date
    /// parses per spec.md §4.1 step 4.
    pub fn leaf(
        field_type: FieldType,
        namespace: impl Into<String>,
        name: impl Into<String>,
        text: impl Into<String>,
        index: u32,
        parent_index: Option<u32>,
        entity_index: Option<u32>,
    ) -> Self {
        let text = text.into();
        let numeric_value = text.parse::<f64>().ok().filter(|v| v.is_finite());
        let date_value = parse_iso8601_utc(&text);
        Self {
            field_type,
            namespace: namespace.into(),
            name: name.into(),
            text_value: Some(text),
            numeric_value,
            date_value,
            is_attribute: false,
            index,
            parent_index,
            entity_index,
        }
    }

    /// Build a Field for an element with no text content (a pure branch node).
    pub fn branch(
        field_type: FieldType,
        namespace: impl Into<String>,
        name: impl Into<String>,
        index: u32,
        parent_index: Option<u32>,
        entity_index: Option<u32>,
    ) -> Self {
        Self {
            field_type,
            namespace: namespace.into(),
            name: name.into(),
            text_value: None,
            numeric_value: None,
            date_value: None,
            is_attribute: false,
            index,
            parent_index,
            entity_index,
        }
    }

    pub fn as_attribute(mut self) -> Self {
        self.is_attribute = true;
        self
    }
}

/// Parse `s` as an ISO-8601 / RFC-3339 timestamp, normalized to UTC.
///
/// Shared by the speculative Field parser and the event hasher's timestamp
/// canonicalization (spec.md §4.3 rule 2).
pub fn parse_iso8601_utc(s: &str) -> Option<DateTime<Utc>> {
    DateTime::parse_from_rfc3339(s)
        .ok()
        .map(|dt| dt.with_timezone(&Utc))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn leaf_speculatively_parses_numeric_and_date() {
        let numeric = Field::leaf(FieldType::Ilmd, "ns", "lotNumber", "6", 0, None, None);
        assert_eq!(numeric.numeric_value, Some(6.0));
        assert!(numeric.date_value.is_none());

        let date = Field::leaf(
            FieldType::Ilmd,
            "ns",
            "bestBefore",
            "2025-01-15T10:30:00Z",
            1,
            None,
            None,
        );
        assert!(date.date_value.is_some());
        assert!(date.numeric_value.is_none());

        let text = Field::leaf(FieldType::Ilmd, "ns", "batch", "B-1234", 2, None, None);
        assert!(text.numeric_value.is_none());
        assert!(text.date_value.is_none());
    }
}
