//! Semantic rule validation (spec.md §4.2).
//!
//! Schema-level structural validation belongs to the decoders (an external
//! XSD/JSON-schema validator per spec.md §1 "Out of scope"); this module
//! enforces the rules that are not captured by schema alone.

use regex::Regex;
use std::sync::OnceLock;

use crate::capture::Capture;
use crate::epc::EpcType;
use crate::error::{DomainError, RuleViolation};
use crate::event::{Action, Event, EventType, SchemaVersion};

fn tz_offset_re() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| Regex::new(r"^[+-]\d\d:\d\d$").unwrap())
}

const PERMITTED_SCHEMA_VERSIONS: &[&str] = &["1.0", "1.1", "1.2", "2.0"];

/// Validate a decoded Capture before it is handed to the capture handler.
/// Returns every violated rule, not just the first (spec.md §4.2: "return
/// the full rule-violation list").
pub fn validate_capture(capture: &Capture) -> Result<(), DomainError> {
    let mut violations = Vec::new();

    if !PERMITTED_SCHEMA_VERSIONS.contains(&capture.schema_version.as_str()) {
        violations.push(RuleViolation::new(
            "UnsupportedSchemaVersion",
            capture.schema_version.as_str(),
        ));
    }

    let mut seen_event_ids = std::collections::HashSet::new();
    for (i, event) in capture.events.iter().enumerate() {
        validate_event(event, i, &mut violations);

        if !event.event_id.is_empty() && !seen_event_ids.insert(event.event_id.clone()) {
            violations.push(RuleViolation::new(
                "DuplicateEventIdInCapture",
                format!("event[{i}]: duplicate eventId {}", event.event_id),
            ));
        }
    }

    if violations.is_empty() {
        Ok(())
    } else {
        Err(DomainError::validation_failed(violations))
    }
}

fn validate_event(event: &Event, index: usize, violations: &mut Vec<RuleViolation>) {
    if !tz_offset_re().is_match(&event.event_time_zone_offset) {
        violations.push(RuleViolation::new(
            "InvalidEventTimeZoneOffset",
            format!("event[{index}]: {:?}", event.event_time_zone_offset),
        ));
    }

    match (event.event_type.requires_action(), event.action) {
        (true, None) => violations.push(RuleViolation::new(
            "ActionRequired",
            format!("event[{index}]: {} requires action", event.event_type.as_str()),
        )),
        (false, Some(_)) => violations.push(RuleViolation::new(
            "ActionNotAllowed",
            format!(
                "event[{index}]: {} must not carry an action",
                event.event_type.as_str()
            ),
        )),
        _ => {}
    }

    match event.event_type {
        EventType::AggregationEvent => {
            if matches!(event.action, Some(Action::Add) | Some(Action::Delete)) {
                let parent_count = event.epcs_of_type(EpcType::ParentId).count();
                if parent_count != 1 {
                    violations.push(RuleViolation::new(
                        "AggregationAddRequiresParent",
                        format!(
                            "event[{index}]: expected exactly one ParentId EPC, found {parent_count}"
                        ),
                    ));
                }
            }
        }
        EventType::TransformationEvent => {
            let input_count = event.epcs_of_type(EpcType::InputEpc).count();
            let output_count = event.epcs_of_type(EpcType::OutputEpc).count();
            if input_count == 0 && output_count == 0 {
                violations.push(RuleViolation::new(
                    "TransformationRequiresEpc",
                    format!("event[{index}]: requires at least one input or output EPC"),
                ));
            }
        }
        _ => {}
    }

    for (ri, report) in event.all_sensor_reports().enumerate() {
        let exists = event
            .sensor_elements
            .iter()
            .any(|se| se.index == report.sensor_index);
        if !exists {
            violations.push(RuleViolation::new(
                "SensorReportUnknownSensorIndex",
                format!(
                    "event[{index}] report[{ri}]: sensorIndex {} has no matching SensorElement",
                    report.sensor_index
                ),
            ));
        }
    }
}

/// Post-persist invariant (spec.md §8, invariant 3): `record_time >=
/// document_time`. The capture handler asserts this right after stamping
/// `record_time`; exposed here so tests can check it directly.
pub fn record_time_not_before_document_time(capture: &Capture) -> bool {
    match capture.record_time {
        Some(record_time) => record_time >= capture.document_time,
        None => true,
    }
}

/// Also expose `SchemaVersion::parse` failure as a validation entry point
/// used by decoders before a `Capture` can even be constructed.
pub fn parse_schema_version(raw: &str) -> Result<SchemaVersion, DomainError> {
    SchemaVersion::parse(raw)
        .ok_or_else(|| DomainError::single_violation("UnsupportedSchemaVersion", raw))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::epc::Epc;
    use crate::id::TenantId;
    use chrono::{TimeZone, Utc};

    fn base_capture() -> Capture {
        Capture::new(TenantId::new("t1"), SchemaVersion::V2_0, Utc::now())
    }

    #[test]
    fn aggregation_add_without_parent_is_rejected() {
        let mut capture = base_capture();
        let mut event = Event::new(
            EventType::AggregationEvent,
            Utc.with_ymd_and_hms(2025, 1, 1, 0, 0, 0).unwrap(),
            "+00:00",
        );
        event.action = Some(Action::Add);
        event.epcs.push(Epc::new(EpcType::ChildEpc, "urn:epc:id:sgtin:1"));
        event.epcs.push(Epc::new(EpcType::ChildEpc, "urn:epc:id:sgtin:2"));
        capture.events.push(event);

        let err = validate_capture(&capture).unwrap_err();
        assert_eq!(err.violations()[0].rule, "AggregationAddRequiresParent");
    }

    #[test]
    fn transformation_without_epcs_is_rejected() {
        let mut capture = base_capture();
        let event = Event::new(
            EventType::TransformationEvent,
            Utc.with_ymd_and_hms(2025, 1, 1, 0, 0, 0).unwrap(),
            "+00:00",
        );
        capture.events.push(event);

        let err = validate_capture(&capture).unwrap_err();
        assert!(err.violations().iter().any(|v| v.rule == "TransformationRequiresEpc"));
    }

    #[test]
    fn duplicate_event_id_within_capture_is_rejected() {
        let mut capture = base_capture();
        for _ in 0..2 {
            let mut event = Event::new(
                EventType::ObjectEvent,
                Utc.with_ymd_and_hms(2025, 1, 1, 0, 0, 0).unwrap(),
                "+00:00",
            );
            event.action = Some(Action::Observe);
            event.event_id = "urn:uuid:same-id".to_string().into();
            capture.events.push(event);
        }

        let err = validate_capture(&capture).unwrap_err();
        assert!(err
            .violations()
            .iter()
            .any(|v| v.rule == "DuplicateEventIdInCapture"));
    }

    #[test]
    fn valid_object_event_passes() {
        let mut capture = base_capture();
        let mut event = Event::new(
            EventType::ObjectEvent,
            Utc.with_ymd_and_hms(2025, 1, 1, 0, 0, 0).unwrap(),
            "+00:00",
        );
        event.action = Some(Action::Observe);
        capture.events.push(event);

        assert!(validate_capture(&capture).is_ok());
    }
}
