//! Parameter-family parser: turns the ~40 `(name, value)` query-parameter
//! families into an `epcis_storage::predicate::Predicate` tree, an `Order`,
//! and the result-cap/pagination knobs the engine applies afterward.
//!
//! `WD_`/`HASATTR_`/`EQATTR_` resolve against masterdata *here*, ahead of
//! storage, expanding into flat `ReadPointIn`/`BizLocationIn` predicates
//! exactly as spec.md §4.6 requires for `WD_`.

use chrono::{DateTime, Utc};

use epcis_core::{Action, EpcType, EventType, MasterData, masterdata::descendants_of};
use epcis_storage::predicate::{
    Comparator, FieldMatch, Order, OrderDirection, Predicate, SensorCmp, SensorField,
    SensorFieldCondition, TimeField,
};

use crate::error::QueryError;

pub struct ParsedQuery {
    pub predicate: Predicate,
    pub order: Order,
    pub event_count_limit: Option<u32>,
    pub max_event_count: Option<u32>,
    pub per_page: Option<u32>,
    pub next_page_token: Option<String>,
}

fn split_csv(value: &str) -> Vec<String> {
    value.split(',').map(|s| s.trim().to_string()).filter(|s| !s.is_empty()).collect()
}

fn invalid(name: &str, detail: impl Into<String>) -> QueryError {
    QueryError::InvalidParameterValue { name: name.to_string(), detail: detail.into() }
}

fn parse_u32(name: &str, value: &str) -> Result<u32, QueryError> {
    value.parse::<u32>().map_err(|_| invalid(name, format!("expected a non-negative integer, got '{value}'")))
}

fn parse_event_type(name: &str, value: &str) -> Result<EventType, QueryError> {
    EventType::parse(value).ok_or_else(|| invalid(name, format!("unknown eventType '{value}'")))
}

fn parse_action(name: &str, value: &str) -> Result<Action, QueryError> {
    Action::parse(value).ok_or_else(|| invalid(name, format!("unknown action '{value}'")))
}

fn parse_timestamp(name: &str, value: &str) -> Result<DateTime<Utc>, QueryError> {
    DateTime::parse_from_rfc3339(value)
        .map(|dt| dt.with_timezone(&Utc))
        .map_err(|_| invalid(name, format!("expected an ISO-8601 timestamp, got '{value}'")))
}

fn sensor_field_named(name: &str) -> Option<SensorField> {
    Some(match name {
        "type" => SensorField::Type,
        "deviceID" => SensorField::DeviceId,
        "value" => SensorField::Value,
        "minValue" => SensorField::MinValue,
        "maxValue" => SensorField::MaxValue,
        "meanValue" => SensorField::MeanValue,
        "sdev" => SensorField::Sdev,
        "percRank" => SensorField::PercRank,
        "percValue" => SensorField::PercValue,
        "uom" => SensorField::Uom,
        "time" => SensorField::Time,
        "component" => SensorField::Component,
        "stringValue" => SensorField::StringValue,
        "uriValue" => SensorField::UriValue,
        _ => return None,
    })
}

fn time_field_named(name: &str) -> Option<TimeField> {
    match name {
        "eventTime" => Some(TimeField::EventTime),
        "recordTime" => Some(TimeField::RecordTime),
        _ => None,
    }
}

/// Splits a `<ns>_<name>` suffix on its last underscore: the namespace is
/// everything before it, the field name everything after. Real namespace
/// URIs don't embed underscores in their local-name suffix in practice, so
/// this is unambiguous for the vocabularies this repository has seen.
fn split_ns_name(name: &str, raw: &str) -> Result<(String, String), QueryError> {
    let (ns, field) = raw
        .rsplit_once('_')
        .ok_or_else(|| invalid(name, format!("expected '<namespace>_<name>', got '{raw}'")))?;
    Ok((ns.to_string(), field.to_string()))
}

fn epc_type_for_match_field(name: &str, field: &str) -> Result<Option<EpcType>, QueryError> {
    match field {
        "epc" => Ok(Some(EpcType::List)),
        "anyEPC" => Ok(None),
        "parentID" => Ok(Some(EpcType::ParentId)),
        "inputEPC" => Ok(Some(EpcType::InputEpc)),
        "outputEPC" => Ok(Some(EpcType::OutputEpc)),
        "epcClass" => Ok(Some(EpcType::Quantity)),
        "anyEPCClass" => Ok(None),
        _ => Err(QueryError::UnsupportedParameter(name.to_string())),
    }
}

fn comparator_for_prefix(prefix: &str) -> Option<Comparator> {
    match prefix {
        "GE" => Some(Comparator::Gte),
        "GT" => Some(Comparator::Gt),
        "LE" => Some(Comparator::Lte),
        "LT" => Some(Comparator::Lt),
        _ => None,
    }
}

/// Resolve a masterdata URI set for a `WD_`/`HASATTR_`/`EQATTR_` family into
/// a flat list that can be ANDed into the predicate chain as a plain `IN`.
fn location_ids_with_descendants(root: &str, master_data: &[MasterData]) -> Vec<String> {
    let mut ids = vec![root.to_string()];
    ids.extend(descendants_of(root, master_data).into_iter().map(str::to_string));
    ids
}

#[allow(clippy::too_many_lines)]
pub fn parse(params: &[(String, String)], master_data: &[MasterData]) -> Result<ParsedQuery, QueryError> {
    let mut predicates: Vec<Predicate> = Vec::new();
    let mut sensor_conditions: Vec<SensorFieldCondition> = Vec::new();

    let mut event_types: Vec<EventType> = Vec::new();
    let mut order_field = TimeField::EventTime;
    let mut order_direction = OrderDirection::Asc;
    let mut event_count_limit = None;
    let mut max_event_count = None;
    let mut per_page = None;
    let mut next_page_token = None;

    for (name, value) in params {
        match name.as_str() {
            "eventType" => {
                for v in split_csv(value) {
                    event_types.push(parse_event_type(name, &v)?);
                }
                continue;
            }
            "orderBy" => {
                order_field = time_field_named(value)
                    .ok_or_else(|| invalid(name, format!("unknown orderBy field '{value}'")))?;
                continue;
            }
            "orderDirection" => {
                order_direction = match value.as_str() {
                    "asc" => OrderDirection::Asc,
                    "desc" => OrderDirection::Desc,
                    other => return Err(invalid(name, format!("expected 'asc' or 'desc', got '{other}'"))),
                };
                continue;
            }
            "eventCountLimit" => {
                event_count_limit = Some(parse_u32(name, value)?);
                continue;
            }
            "maxEventCount" => {
                max_event_count = Some(parse_u32(name, value)?);
                continue;
            }
            "perPage" => {
                per_page = Some(parse_u32(name, value)?);
                continue;
            }
            "nextPageToken" => {
                next_page_token = Some(value.clone());
                continue;
            }
            _ => {}
        }

        if let Some(field) = name.strip_prefix("MATCH_") {
            let epc_type = epc_type_for_match_field(name, field)?;
            predicates.push(Predicate::EpcMatches { epc_type, patterns: split_csv(value) });
        } else if let Some(field) = name.strip_prefix("WD_") {
            let ids = location_ids_with_descendants(value, master_data);
            match field {
                "readPoint" => predicates.push(Predicate::ReadPointIn(ids)),
                "bizLocation" => predicates.push(Predicate::BizLocationIn(ids)),
                _ => return Err(QueryError::UnsupportedParameter(name.clone())),
            }
        } else if let Some(vocab) = name.strip_prefix("HASATTR_") {
            let ids = master_data
                .iter()
                .filter(|m| m.vocabulary_type == vocab && m.attributes.contains_key(value.as_str()))
                .map(|m| m.id.clone())
                .collect();
            predicates.push(Predicate::BizLocationIn(ids));
        } else if let Some(raw) = name.strip_prefix("EQATTR_") {
            let (vocab, attr) = split_ns_name(name, raw)?;
            let ids = master_data
                .iter()
                .filter(|m| m.vocabulary_type == vocab && m.attributes.get(&attr) == Some(value))
                .map(|m| m.id.clone())
                .collect();
            predicates.push(Predicate::BizLocationIn(ids));
        } else if let Some(raw) = name.strip_prefix("EXISTS_ILMD_").or_else(|| name.strip_prefix("EXISTS_INNER_")) {
            let (ns, field) = split_ns_name(name, raw)?;
            predicates.push(Predicate::FieldExists { namespace: ns, name: field });
        } else if let Some(field) = name.strip_prefix("EXISTS_") {
            if let Some(sensor_field) = sensor_field_named(field) {
                sensor_conditions.push(SensorFieldCondition::exists(sensor_field));
            } else {
                let (ns, field) = split_ns_name(name, field)?;
                predicates.push(Predicate::FieldExists { namespace: ns, name: field });
            }
        } else if let Some(raw) = name.strip_prefix("EQ_ILMD_").or_else(|| name.strip_prefix("EQ_INNER_")) {
            let (ns, field) = split_ns_name(name, raw)?;
            predicates.push(Predicate::FieldEq(field_eq(ns, field, value, None)));
        } else if let Some((prefix, raw)) = split_comparator_family(name, &["GE_ILMD_", "GT_ILMD_", "LE_ILMD_", "LT_ILMD_", "GE_INNER_", "GT_INNER_", "LE_INNER_", "LT_INNER_"]) {
            let comparator = comparator_for_prefix(prefix).expect("prefix list only contains comparator prefixes");
            let (ns, field) = split_ns_name(name, raw)?;
            predicates.push(Predicate::FieldEq(field_eq(ns, field, value, Some(comparator))));
        } else if let Some(field) = name.strip_prefix("EQ_") {
            if let Some(sensor_field) = sensor_field_named(field) {
                sensor_conditions.push(sensor_eq(name, sensor_field, value)?);
            } else {
                push_scalar_in(name, field, value, &mut predicates)?;
            }
        } else if let Some((prefix, field)) = split_comparator_family(name, &["GE_", "GT_", "LE_", "LT_"]) {
            let comparator = comparator_for_prefix(prefix).expect("prefix list only contains comparator prefixes");
            if let Some(tf) = time_field_named(field) {
                predicates.push(Predicate::Time { field: tf, cmp: comparator, value: parse_timestamp(name, value)? });
            } else if let Some(sensor_field) = sensor_field_named(field) {
                sensor_conditions.push(sensor_inequality(name, sensor_field, comparator, value)?);
            } else {
                return Err(invalid(name, format!("'{field}' does not support inequality comparison")));
            }
        } else {
            return Err(QueryError::UnsupportedParameter(name.clone()));
        }
    }

    if !event_types.is_empty() {
        predicates.push(Predicate::EventTypeIn(event_types));
    }
    if !sensor_conditions.is_empty() {
        predicates.push(Predicate::SensorReportMatch(sensor_conditions));
    }

    let predicate = match predicates.len() {
        0 => Predicate::All(Vec::new()),
        1 => predicates.into_iter().next().unwrap(),
        _ => Predicate::All(predicates),
    };

    Ok(ParsedQuery {
        predicate,
        order: Order { field: order_field, direction: order_direction },
        event_count_limit,
        max_event_count,
        per_page,
        next_page_token,
    })
}

/// Tries each prefix in `candidates`; on the first match returns
/// `(GE|GT|LE|LT, remainder)`.
fn split_comparator_family<'a>(name: &'a str, candidates: &[&str]) -> Option<(&'a str, &'a str)> {
    for candidate in candidates {
        if let Some(rest) = name.strip_prefix(candidate) {
            let prefix_len = candidate.find('_').unwrap_or(candidate.len());
            return Some((&name[..prefix_len], rest));
        }
    }
    None
}

fn field_eq(namespace: String, name: String, value: &str, comparator: Option<Comparator>) -> FieldMatch {
    if comparator.is_none() {
        return FieldMatch {
            namespace,
            name,
            text_value: Some(value.to_string()),
            numeric_value: value.parse::<f64>().ok(),
            date_value: None,
            comparator: None,
        };
    }
    match DateTime::parse_from_rfc3339(value) {
        Ok(dt) => FieldMatch {
            namespace,
            name,
            text_value: None,
            numeric_value: None,
            date_value: Some(dt.with_timezone(&Utc)),
            comparator,
        },
        Err(_) => FieldMatch {
            namespace,
            name,
            text_value: None,
            numeric_value: value.parse::<f64>().ok(),
            date_value: None,
            comparator,
        },
    }
}

fn sensor_eq(name: &str, field: SensorField, value: &str) -> Result<SensorFieldCondition, QueryError> {
    if matches!(field, SensorField::Time) {
        return Ok(SensorFieldCondition::time(field, SensorCmp::Eq, parse_timestamp(name, value)?));
    }
    if let Ok(num) = value.parse::<f64>() {
        return Ok(SensorFieldCondition::numeric(field, SensorCmp::Eq, num));
    }
    Ok(SensorFieldCondition::eq_text(field, value))
}

fn sensor_inequality(
    name: &str,
    field: SensorField,
    comparator: Comparator,
    value: &str,
) -> Result<SensorFieldCondition, QueryError> {
    let cmp = match comparator {
        Comparator::Gt => SensorCmp::Gt,
        Comparator::Gte => SensorCmp::Gte,
        Comparator::Lt => SensorCmp::Lt,
        Comparator::Lte => SensorCmp::Lte,
    };
    if matches!(field, SensorField::Time) {
        return Ok(SensorFieldCondition::time(field, cmp, parse_timestamp(name, value)?));
    }
    let num = value.parse::<f64>().map_err(|_| invalid(name, format!("expected a number, got '{value}'")))?;
    Ok(SensorFieldCondition::numeric(field, cmp, num))
}

fn push_scalar_in(name: &str, field: &str, value: &str, predicates: &mut Vec<Predicate>) -> Result<(), QueryError> {
    let values = split_csv(value);
    match field {
        "action" => {
            let actions = values.iter().map(|v| parse_action(name, v)).collect::<Result<Vec<_>, _>>()?;
            predicates.push(Predicate::ActionIn(actions));
        }
        "bizStep" => predicates.push(Predicate::BizStepIn(values)),
        "disposition" => predicates.push(Predicate::DispositionIn(values)),
        "readPoint" => predicates.push(Predicate::ReadPointIn(values)),
        "bizLocation" => predicates.push(Predicate::BizLocationIn(values)),
        "transformationID" => predicates.push(Predicate::TransformationIdIn(values)),
        "eventID" => predicates.push(Predicate::EventIdIn(values.into_iter().map(Into::into).collect())),
        "correctiveEventID" => {
            predicates.push(Predicate::CorrectiveEventIdIn(values.into_iter().map(Into::into).collect()))
        }
        "eventTime" | "recordTime" => {
            let tf = time_field_named(field).unwrap();
            let at = parse_timestamp(name, value)?;
            predicates.push(Predicate::All(vec![
                Predicate::Time { field: tf, cmp: Comparator::Gte, value: at },
                Predicate::Time { field: tf, cmp: Comparator::Lte, value: at },
            ]));
        }
        _ => return Err(QueryError::UnsupportedParameter(name.to_string())),
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    fn p(name: &str, value: &str) -> (String, String) {
        (name.to_string(), value.to_string())
    }

    #[test]
    fn unknown_parameter_is_rejected() {
        let err = parse(&[p("totallyMadeUp", "x")], &[]).unwrap_err();
        assert!(matches!(err, QueryError::UnsupportedParameter(n) if n == "totallyMadeUp"));
    }

    #[test]
    fn event_type_accepts_a_csv_set() {
        let parsed = parse(&[p("eventType", "ObjectEvent,AggregationEvent")], &[]).unwrap();
        assert_eq!(
            parsed.predicate,
            Predicate::EventTypeIn(vec![EventType::ObjectEvent, EventType::AggregationEvent])
        );
    }

    #[test]
    fn ge_event_time_builds_a_time_predicate() {
        let parsed = parse(&[p("GE_eventTime", "2026-01-01T00:00:00Z")], &[]).unwrap();
        assert!(matches!(
            parsed.predicate,
            Predicate::Time { field: TimeField::EventTime, cmp: Comparator::Gte, .. }
        ));
    }

    #[test]
    fn invalid_timestamp_is_an_invalid_parameter_value() {
        let err = parse(&[p("GE_eventTime", "not-a-date")], &[]).unwrap_err();
        assert!(matches!(err, QueryError::InvalidParameterValue { .. }));
    }

    #[test]
    fn sensor_tie_break_family_collapses_into_one_match() {
        let parsed = parse(
            &[p("EQ_type", "Temperature"), p("GE_value", "5"), p("LT_value", "10")],
            &[],
        )
        .unwrap();
        match parsed.predicate {
            Predicate::SensorReportMatch(conditions) => assert_eq!(conditions.len(), 3),
            other => panic!("expected SensorReportMatch, got {other:?}"),
        }
    }

    #[test]
    fn wd_biz_location_expands_descendants() {
        let mut region = MasterData::new("BusinessLocation", "region:east");
        region.children = vec!["site:a".into()];
        let site_a = MasterData::new("BusinessLocation", "site:a");
        let master_data = vec![region, site_a];

        let parsed = parse(&[p("WD_bizLocation", "region:east")], &master_data).unwrap();
        match parsed.predicate {
            Predicate::BizLocationIn(ids) => {
                assert!(ids.contains(&"region:east".to_string()));
                assert!(ids.contains(&"site:a".to_string()));
            }
            other => panic!("expected BizLocationIn, got {other:?}"),
        }
    }

    #[test]
    fn order_by_and_direction_are_parsed() {
        let parsed = parse(&[p("orderBy", "recordTime"), p("orderDirection", "desc")], &[]).unwrap();
        assert_eq!(parsed.order.field, TimeField::RecordTime);
        assert_eq!(parsed.order.direction, OrderDirection::Desc);
    }

    #[test]
    fn ilmd_date_literal_uses_date_value_slot() {
        let parsed = parse(&[p("GE_ILMD_cbvmda_bestBeforeDate", "2026-01-01T00:00:00Z")], &[]).unwrap();
        match parsed.predicate {
            Predicate::FieldEq(m) => {
                assert_eq!(m.namespace, "cbvmda");
                assert_eq!(m.name, "bestBeforeDate");
                assert!(m.date_value.is_some());
            }
            other => panic!("expected FieldEq, got {other:?}"),
        }
    }
}
