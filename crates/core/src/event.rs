//! The canonical Event record: one shape, a `type` tag, variant invariants.
//!
//! Spec.md Design Notes "Inheritance → variants": the source EPCIS model
//! treats events as a polymorphic class hierarchy (ObjectEvent,
//! AggregationEvent, TransactionEvent, TransformationEvent, QuantityEvent).
//! Here that becomes one record with an `EventType` tag; variant-specific
//! invariants are enforced by `epcis-core::validate`, and encoders/decoders
//! dispatch on `event_type`.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::epc::{BusinessTransaction, Epc, SourceDest};
use crate::field::Field;
use crate::id::EventId;
use crate::sensor::{PersistentDisposition, SensorElement, SensorReport};

/// The EPCIS schema version a Capture (and, transitively, its events) was
/// submitted under.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum SchemaVersion {
    V1_0,
    V1_1,
    V1_2,
    V2_0,
}

impl SchemaVersion {
    pub fn parse(s: &str) -> Option<Self> {
        match s {
            "1.0" => Some(Self::V1_0),
            "1.1" => Some(Self::V1_1),
            "1.2" => Some(Self::V1_2),
            "2.0" => Some(Self::V2_0),
            _ => None,
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            Self::V1_0 => "1.0",
            Self::V1_1 => "1.1",
            Self::V1_2 => "1.2",
            Self::V2_0 => "2.0",
        }
    }

    pub fn is_xml_1x(&self) -> bool {
        matches!(self, Self::V1_0 | Self::V1_1 | Self::V1_2)
    }
}

/// The four (EPCIS 2.0) / five (EPCIS 1.2, `QuantityEvent` retained for
/// source compatibility) event variants sharing one record shape.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "PascalCase")]
pub enum EventType {
    ObjectEvent,
    AggregationEvent,
    TransactionEvent,
    TransformationEvent,
    QuantityEvent,
}

impl EventType {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::ObjectEvent => "ObjectEvent",
            Self::AggregationEvent => "AggregationEvent",
            Self::TransactionEvent => "TransactionEvent",
            Self::TransformationEvent => "TransformationEvent",
            Self::QuantityEvent => "QuantityEvent",
        }
    }

    pub fn parse(s: &str) -> Option<Self> {
        match s {
            "ObjectEvent" => Some(Self::ObjectEvent),
            "AggregationEvent" => Some(Self::AggregationEvent),
            "TransactionEvent" => Some(Self::TransactionEvent),
            "TransformationEvent" => Some(Self::TransformationEvent),
            "QuantityEvent" => Some(Self::QuantityEvent),
            _ => None,
        }
    }

    /// Transformation events have no `action` field (spec.md §3.1).
    pub fn requires_action(&self) -> bool {
        !matches!(self, Self::TransformationEvent)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum Action {
    Add,
    Observe,
    Delete,
}

impl Action {
    pub fn parse(s: &str) -> Option<Self> {
        match s.to_ascii_uppercase().as_str() {
            "ADD" => Some(Self::Add),
            "OBSERVE" => Some(Self::Observe),
            "DELETE" => Some(Self::Delete),
            _ => None,
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Add => "ADD",
            Self::Observe => "OBSERVE",
            Self::Delete => "DELETE",
        }
    }
}

/// One EPCIS event, in the canonical shared shape.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Event {
    /// Stable content hash or client-supplied URI. Empty until
    /// `epcis-core::hash` (via the capture handler) assigns one.
    pub event_id: EventId,
    pub event_type: EventType,

    pub event_time: DateTime<Utc>,
    /// `±HH:MM`, validated by `epcis-core::validate` against
    /// `-?\d\d:\d\d`.
    pub event_time_zone_offset: String,

    /// Absent for TransformationEvent.
    pub action: Option<Action>,

    pub business_step: Option<String>,
    pub disposition: Option<String>,
    pub read_point: Option<String>,
    pub business_location: Option<String>,
    /// TransformationEvent only.
    pub transformation_id: Option<String>,
    pub certification_info: Option<String>,

    pub corrective_declaration_time: Option<DateTime<Utc>>,
    pub corrective_reason: Option<String>,
    pub corrective_event_ids: Vec<EventId>,

    pub epcs: Vec<Epc>,
    pub business_transactions: Vec<BusinessTransaction>,
    pub sources: Vec<SourceDest>,
    pub destinations: Vec<SourceDest>,
    pub sensor_elements: Vec<SensorElement>,
    pub persistent_disposition: Option<PersistentDisposition>,

    /// Flattened ILMD + foreign-namespace extension tree for this event
    /// (see `epcis-core::field`).
    pub fields: Vec<Field>,
}

impl Event {
    pub fn new(event_type: EventType, event_time: DateTime<Utc>, tz_offset: impl Into<String>) -> Self {
        Self {
            event_id: EventId::new(""),
            event_type,
            event_time,
            event_time_zone_offset: tz_offset.into(),
            action: None,
            business_step: None,
            disposition: None,
            read_point: None,
            business_location: None,
            transformation_id: None,
            certification_info: None,
            corrective_declaration_time: None,
            corrective_reason: None,
            corrective_event_ids: Vec::new(),
            epcs: Vec::new(),
            business_transactions: Vec::new(),
            sources: Vec::new(),
            destinations: Vec::new(),
            sensor_elements: Vec::new(),
            persistent_disposition: None,
            fields: Vec::new(),
        }
    }

    /// Sensor reports owned transitively by this event, flattened for the
    /// sensor-predicate EXISTS join in `epcis-storage`.
    pub fn all_sensor_reports(&self) -> impl Iterator<Item = &SensorReport> {
        self.sensor_elements.iter().flat_map(|e| e.reports.iter())
    }

    pub fn epcs_of_type(&self, epc_type: crate::epc::EpcType) -> impl Iterator<Item = &Epc> {
        self.epcs.iter().filter(move |e| e.epc_type == epc_type)
    }
}
