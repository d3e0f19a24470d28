//! The event-selection AST that `epcis-query` compiles ad-hoc/subscription
//! parameters into, and that every `Storage` backend must be able to
//! execute against its own representation (rows, in-memory index, whatever)
//! without materializing full events (spec.md §4.6, §4.7 "Phase 1").

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use epcis_core::{Action, EpcType, EventId, EventType};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum Comparator {
    Gt,
    Gte,
    Lt,
    Lte,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum TimeField {
    EventTime,
    RecordTime,
}

/// A field-value match against the flattened ILMD/extension `Field` tree
/// (spec.md §4.1 "DFS-indexed"). `namespace`/`name` identify the field;
/// `comparator` is `None` for an equality match.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FieldMatch {
    pub namespace: String,
    pub name: String,
    pub text_value: Option<String>,
    pub numeric_value: Option<f64>,
    /// Populated instead of `numeric_value` when the comparator literal
    /// parses as ISO-8601 (spec.md §4.6 "ILMD / INNER predicates —
    /// correctness": `GE_/LE_/GT_/LT_` select `numericValue` for numeric
    /// literals, `dateValue` for ISO-8601 ones).
    pub date_value: Option<DateTime<Utc>>,
    pub comparator: Option<Comparator>,
}

/// One predicate in the conjunction `epcis-query` builds from a parsed
/// parameter set. There is deliberately no `Or` / `Not` — every EPCIS query
/// parameter family ANDs together with every other (spec.md §4.6).
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum Predicate {
    All(Vec<Predicate>),

    EventTypeIn(Vec<EventType>),
    ActionIn(Vec<Action>),

    Time {
        field: TimeField,
        cmp: Comparator,
        value: DateTime<Utc>,
    },

    /// Pagination seek predicate: `(field, id)` strictly after (or before,
    /// for descending order) the last row emitted on the previous page
    /// (spec.md §4.6 "Pagination"). `epcis-query` appends this to the
    /// predicate chain it builds from a decoded `nextPageToken`; storage
    /// backends compile it as a single indexable range condition rather
    /// than an `OFFSET`, which would drift under concurrent inserts.
    SeekAfter {
        field: TimeField,
        direction: OrderDirection,
        value: DateTime<Utc>,
        id: EventId,
    },

    BizStepIn(Vec<String>),
    DispositionIn(Vec<String>),
    /// Resolved by `epcis-query` before reaching storage: a `WD_bizLocation`
    /// or plain `EQ_bizLocation` parameter is expanded into the full set of
    /// matching ids (including descendants, via
    /// `epcis_core::masterdata::descendants_of`) ahead of time, so storage
    /// only ever sees a flat `IN`.
    ReadPointIn(Vec<String>),
    BizLocationIn(Vec<String>),

    TransformationIdIn(Vec<String>),

    /// `MATCH_epc` / `MATCH_parentID` / `MATCH_inputEPC` / etc: `patterns`
    /// may contain a trailing `*` wildcard (spec.md §4.6).
    EpcMatches {
        epc_type: Option<EpcType>,
        patterns: Vec<String>,
    },

    CorrectiveEventIdIn(Vec<EventId>),

    /// One or more sensor-field conditions that must all hold on a *single*
    /// `SensorReport` (spec.md §4.6 "tie-break rule": `EQ_type=Temperature &
    /// GE_value=5 & LT_value=10` matches only if one report satisfies every
    /// condition, not three reports each satisfying one). `epcis-query`
    /// accumulates every `*_<sensorField>` parameter of one ad-hoc query
    /// into a single `SensorReportMatch`, never several independent
    /// predicates, so storage can compile it as one EXISTS join.
    SensorReportMatch(Vec<SensorFieldCondition>),

    FieldEq(FieldMatch),
    FieldExists { namespace: String, name: String },

    EventIdIn(Vec<EventId>),
}

/// Which `SensorReport` attribute one `SensorFieldCondition` constrains
/// (spec.md §4.6 parameter family table, `EQ_<sensorField>` / `GE_.../...`).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum SensorField {
    Type,
    DeviceId,
    Value,
    MinValue,
    MaxValue,
    MeanValue,
    Sdev,
    PercRank,
    PercValue,
    Uom,
    Time,
    Component,
    StringValue,
    UriValue,
}

/// Comparator for a sensor-field condition; `Exists` needs neither
/// `text`/`numeric`/`time` (spec.md §4.6 `EXISTS_<field>`).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum SensorCmp {
    Eq,
    Gt,
    Gte,
    Lt,
    Lte,
    Exists,
}

/// One condition within a `Predicate::SensorReportMatch` conjunction.
/// Exactly one of `text`/`numeric`/`time` is populated, matching which
/// `SensorReport` column `field` names.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SensorFieldCondition {
    pub field: SensorField,
    pub cmp: SensorCmp,
    pub text: Option<String>,
    pub numeric: Option<f64>,
    pub time: Option<DateTime<Utc>>,
}

impl SensorFieldCondition {
    pub fn eq_text(field: SensorField, text: impl Into<String>) -> Self {
        Self { field, cmp: SensorCmp::Eq, text: Some(text.into()), numeric: None, time: None }
    }

    pub fn numeric(field: SensorField, cmp: SensorCmp, value: f64) -> Self {
        Self { field, cmp, text: None, numeric: Some(value), time: None }
    }

    pub fn time(field: SensorField, cmp: SensorCmp, value: DateTime<Utc>) -> Self {
        Self { field, cmp, text: None, numeric: None, time: Some(value) }
    }

    pub fn exists(field: SensorField) -> Self {
        Self { field, cmp: SensorCmp::Exists, text: None, numeric: None, time: None }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum OrderDirection {
    Asc,
    Desc,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct Order {
    pub field: TimeField,
    pub direction: OrderDirection,
}

impl Default for Order {
    /// Spec.md §4.7: default result order is ascending event time.
    fn default() -> Self {
        Self {
            field: TimeField::EventTime,
            direction: OrderDirection::Asc,
        }
    }
}
