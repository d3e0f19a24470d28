//! SensorElement / SensorReport: owned sequences under an Event.
//!
//! Their extension payload (arbitrary custom-namespaced sub-trees) lives in
//! the owning Event's `fields` list, tagged with
//! `FieldType::SensorElementExtension` / `SensorReportExtension` and bound
//! via `entity_index` back to the element/report's own `index` below.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// A sensor device/metadata block; owns zero or more `SensorReport`s.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SensorElement {
    /// Position of this SensorElement within the event's `sensor_elements`
    /// list; used as `entity_index` for this element's own extension Fields
    /// and referenced by its `SensorReport`s' `sensor_index`.
    pub index: u32,

    pub sensor_metadata_time: Option<DateTime<Utc>>,
    pub sensor_metadata_start_time: Option<DateTime<Utc>>,
    pub sensor_metadata_end_time: Option<DateTime<Utc>>,
    pub sensor_metadata_device_id: Option<String>,
    pub sensor_metadata_device_metadata: Option<String>,
    pub sensor_metadata_raw_data: Option<String>,

    pub reports: Vec<SensorReport>,
}

impl SensorElement {
    pub fn new(index: u32) -> Self {
        Self {
            index,
            sensor_metadata_time: None,
            sensor_metadata_start_time: None,
            sensor_metadata_end_time: None,
            sensor_metadata_device_id: None,
            sensor_metadata_device_metadata: None,
            sensor_metadata_raw_data: None,
            reports: Vec::new(),
        }
    }
}

/// A single sensor observation within a `SensorElement`.
///
/// Spec.md §4.6 "Sensor-report predicates — tie-break rule": a query
/// predicate like `EQ_type=Temperature & GE_value=5 & LT_value=10` must
/// match an event that has at least one report satisfying *all three*
/// conditions conjunctively, not three independently-satisfied reports.
/// Implementations (here, `epcis-storage`) realize this as an EXISTS join
/// over this struct's fields, never as independent per-field predicates.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SensorReport {
    /// Position of this report within its owning event (unique per event,
    /// shared index space with `SensorElement::index`... no: reports have
    /// their own index space, see `sensor_index` below for the backref).
    pub index: u32,
    /// Index (within the event's `sensor_elements`) of the SensorElement
    /// this report belongs to. Validated by `epcis-core::validate`
    /// ("sensor reports reference a sensorIndex that names an existing
    /// SensorElement in the same event").
    pub sensor_index: u32,

    pub sensor_type: Option<String>,
    pub device_id: Option<String>,
    pub device_metadata: Option<String>,
    pub raw_data: Option<String>,
    pub time: Option<DateTime<Utc>>,

    pub value: Option<f64>,
    pub component: Option<String>,
    pub min_value: Option<f64>,
    pub max_value: Option<f64>,
    pub mean_value: Option<f64>,
    pub sdev: Option<f64>,
    pub perc_rank: Option<f64>,
    pub perc_value: Option<f64>,
    pub uom: Option<String>,

    pub string_value: Option<String>,
    pub boolean_value: Option<bool>,
    pub hex_binary_value: Option<String>,
    pub uri_value: Option<String>,
}

impl SensorReport {
    pub fn new(index: u32, sensor_index: u32) -> Self {
        Self {
            index,
            sensor_index,
            sensor_type: None,
            device_id: None,
            device_metadata: None,
            raw_data: None,
            time: None,
            value: None,
            component: None,
            min_value: None,
            max_value: None,
            mean_value: None,
            sdev: None,
            perc_rank: None,
            perc_value: None,
            uom: None,
            string_value: None,
            boolean_value: None,
            hex_binary_value: None,
            uri_value: None,
        }
    }
}

/// A `persistentDisposition` block (EPCIS 2.0): dispositions asserted to
/// hold (`set`) or no longer hold (`unset`) as of this event.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct PersistentDisposition {
    pub set: Vec<String>,
    pub unset: Vec<String>,
}
