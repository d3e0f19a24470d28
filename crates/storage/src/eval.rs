//! Reference predicate evaluator, shared by `InMemoryStore` and by
//! `epcis-query`'s tests. `PostgresStore` compiles the same `Predicate` tree
//! to SQL instead of calling this, but must agree with it on semantics.

use chrono::{DateTime, Utc};

use epcis_core::{Event, SensorReport};

use crate::predicate::{
    Comparator, FieldMatch, Order, OrderDirection, Predicate, SensorCmp, SensorField,
    SensorFieldCondition, TimeField,
};

fn cmp(value: std::cmp::Ordering, comparator: Comparator) -> bool {
    use std::cmp::Ordering::*;
    match (comparator, value) {
        (Comparator::Gt, Greater) => true,
        (Comparator::Gte, Greater | Equal) => true,
        (Comparator::Lt, Less) => true,
        (Comparator::Lte, Less | Equal) => true,
        _ => false,
    }
}

fn field_matches(event: &Event, m: &FieldMatch) -> bool {
    event.fields.iter().any(|f| {
        if f.namespace != m.namespace || f.name != m.name {
            return false;
        }
        match m.comparator {
            None => {
                (m.text_value.is_none() || m.text_value == f.text_value)
                    && (m.numeric_value.is_none() || m.numeric_value == f.numeric_value)
            }
            Some(comparator) => {
                if let Some(want) = m.date_value {
                    return f.date_value.is_some_and(|have| cmp(have.cmp(&want), comparator));
                }
                match (m.numeric_value, f.numeric_value) {
                    (Some(want), Some(have)) => {
                        have.partial_cmp(&want).is_some_and(|o| cmp(o, comparator))
                    }
                    _ => false,
                }
            }
        }
    })
}

fn sensor_condition_holds(report: &SensorReport, cond: &SensorFieldCondition) -> bool {
    if cond.cmp == SensorCmp::Exists {
        return match cond.field {
            SensorField::Type => report.sensor_type.is_some(),
            SensorField::DeviceId => report.device_id.is_some(),
            SensorField::Value => report.value.is_some(),
            SensorField::MinValue => report.min_value.is_some(),
            SensorField::MaxValue => report.max_value.is_some(),
            SensorField::MeanValue => report.mean_value.is_some(),
            SensorField::Sdev => report.sdev.is_some(),
            SensorField::PercRank => report.perc_rank.is_some(),
            SensorField::PercValue => report.perc_value.is_some(),
            SensorField::Uom => report.uom.is_some(),
            SensorField::Time => report.time.is_some(),
            SensorField::Component => report.component.is_some(),
            SensorField::StringValue => report.string_value.is_some(),
            SensorField::UriValue => report.uri_value.is_some(),
        };
    }

    // Text-valued fields only support equality (spec.md §4.6: comparators
    // other than EQ only make sense for numeric/time sensor fields).
    match cond.field {
        SensorField::Type | SensorField::DeviceId | SensorField::Uom | SensorField::Component
        | SensorField::StringValue | SensorField::UriValue => {
            if cond.cmp != SensorCmp::Eq {
                return false;
            }
            let have = match cond.field {
                SensorField::Type => report.sensor_type.as_deref(),
                SensorField::DeviceId => report.device_id.as_deref(),
                SensorField::Uom => report.uom.as_deref(),
                SensorField::Component => report.component.as_deref(),
                SensorField::StringValue => report.string_value.as_deref(),
                SensorField::UriValue => report.uri_value.as_deref(),
                _ => unreachable!(),
            };
            cond.text.as_deref().is_some() && have == cond.text.as_deref()
        }
        SensorField::Time => {
            let (Some(have), Some(want)) = (report.time, cond.time) else { return false };
            match cond.cmp {
                SensorCmp::Eq => have == want,
                other => have.partial_cmp(&want).is_some_and(|o| cmp(o, to_comparator(other))),
            }
        }
        SensorField::Value
        | SensorField::MinValue
        | SensorField::MaxValue
        | SensorField::MeanValue
        | SensorField::Sdev
        | SensorField::PercRank
        | SensorField::PercValue => {
            let have = match cond.field {
                SensorField::Value => report.value,
                SensorField::MinValue => report.min_value,
                SensorField::MaxValue => report.max_value,
                SensorField::MeanValue => report.mean_value,
                SensorField::Sdev => report.sdev,
                SensorField::PercRank => report.perc_rank,
                SensorField::PercValue => report.perc_value,
                _ => unreachable!(),
            };
            match (have, cond.numeric) {
                (Some(have), Some(want)) => match cond.cmp {
                    SensorCmp::Eq => have == want,
                    other => have.partial_cmp(&want).is_some_and(|o| cmp(o, to_comparator(other))),
                },
                _ => false,
            }
        }
    }
}

fn to_comparator(sensor_cmp: SensorCmp) -> Comparator {
    match sensor_cmp {
        SensorCmp::Gt => Comparator::Gt,
        SensorCmp::Gte => Comparator::Gte,
        SensorCmp::Lt => Comparator::Lt,
        SensorCmp::Lte => Comparator::Lte,
        SensorCmp::Eq | SensorCmp::Exists => unreachable!("handled by caller before reaching cmp()"),
    }
}

/// Evaluate `predicate` against one event (spec.md §4.6's conjunction of
/// parameter families, all AND-ed together). `record_time` is the owning
/// Capture's server-assigned record time — events don't carry one of their
/// own, so callers (here, `InMemoryStore`) pass their parent capture's.
pub fn matches(event: &Event, record_time: DateTime<Utc>, predicate: &Predicate) -> bool {
    match predicate {
        Predicate::All(ps) => ps.iter().all(|p| matches(event, record_time, p)),

        Predicate::EventTypeIn(types) => types.contains(&event.event_type),
        Predicate::ActionIn(actions) => event.action.is_some_and(|a| actions.contains(&a)),

        Predicate::Time { field, cmp: comparator, value } => {
            let subject = match field {
                TimeField::EventTime => event.event_time,
                TimeField::RecordTime => record_time,
            };
            subject.partial_cmp(value).is_some_and(|o| cmp(o, *comparator))
        }

        Predicate::SeekAfter { field, direction, value, id } => {
            let subject = match field {
                TimeField::EventTime => event.event_time,
                TimeField::RecordTime => record_time,
            };
            match direction {
                OrderDirection::Asc => {
                    subject > *value || (subject == *value && &event.event_id > id)
                }
                OrderDirection::Desc => {
                    subject < *value || (subject == *value && &event.event_id < id)
                }
            }
        }

        Predicate::BizStepIn(values) => event
            .business_step
            .as_deref()
            .is_some_and(|v| values.iter().any(|want| want == v)),

        Predicate::DispositionIn(values) => event
            .disposition
            .as_deref()
            .is_some_and(|v| values.iter().any(|want| want == v)),

        Predicate::ReadPointIn(values) => event
            .read_point
            .as_deref()
            .is_some_and(|v| values.iter().any(|want| want == v)),

        Predicate::BizLocationIn(values) => event
            .business_location
            .as_deref()
            .is_some_and(|v| values.iter().any(|want| want == v)),

        Predicate::TransformationIdIn(values) => event
            .transformation_id
            .as_deref()
            .is_some_and(|v| values.iter().any(|want| want == v)),

        Predicate::EpcMatches { epc_type, patterns } => event.epcs.iter().any(|epc| {
            epc_type.is_none_or(|t| t == epc.epc_type)
                && patterns.iter().any(|p| epc.matches_prefix(p))
        }),

        Predicate::CorrectiveEventIdIn(ids) => {
            event.corrective_event_ids.iter().any(|id| ids.contains(id))
        }

        Predicate::SensorReportMatch(conditions) => event
            .all_sensor_reports()
            .any(|report| conditions.iter().all(|c| sensor_condition_holds(report, c))),

        Predicate::FieldEq(m) => field_matches(event, m),
        Predicate::FieldExists { namespace, name } => event
            .fields
            .iter()
            .any(|f| &f.namespace == namespace && &f.name == name),

        Predicate::EventIdIn(ids) => ids.contains(&event.event_id),
    }
}

/// Sort `(event, record_time)` pairs in place per `order`. Record time is
/// uniform across all events of one capture but `select_event_ids` draws
/// candidates from many captures, so it must still be compared per-row.
pub fn sort_by_order(events: &mut [(Event, DateTime<Utc>)], order: Order) {
    events.sort_by(|(a, a_rt), (b, b_rt)| {
        let ord = match order.field {
            TimeField::EventTime => a.event_time.cmp(&b.event_time),
            TimeField::RecordTime => a_rt.cmp(b_rt),
        }
        // Secondary sort by event id: ties on the order field (same
        // eventTime, distinct captures) must still resolve to one
        // deterministic order, or pagination (spec.md §4.6 "Pagination")
        // cannot draw a stable boundary between pages.
        .then_with(|| a.event_id.cmp(&b.event_id));
        match order.direction {
            OrderDirection::Asc => ord,
            OrderDirection::Desc => ord.reverse(),
        }
    });
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;
    use epcis_core::{Action, EventType, SensorElement, SensorReport};

    fn event_with_reports(reports: Vec<SensorReport>) -> Event {
        let mut e = Event::new(
            EventType::ObjectEvent,
            Utc.with_ymd_and_hms(2025, 1, 1, 0, 0, 0).unwrap(),
            "+00:00",
        );
        e.action = Some(Action::Observe);
        let mut element = SensorElement::new(0);
        element.reports = reports;
        e.sensor_elements.push(element);
        e
    }

    fn report(sensor_type: &str, value: f64) -> SensorReport {
        let mut r = SensorReport::new(0, 0);
        r.sensor_type = Some(sensor_type.to_string());
        r.value = Some(value);
        r
    }

    /// Spec.md §4.6 tie-break rule / §8 scenario 4: `EQ_type=Temperature &
    /// GE_value=5 & LT_value=10` must match only a report satisfying all
    /// three, not separately-satisfied reports on the same event.
    #[test]
    fn sensor_report_match_binds_within_one_report() {
        let conditions = vec![
            SensorFieldCondition::eq_text(SensorField::Type, "Temperature"),
            SensorFieldCondition::numeric(SensorField::Value, SensorCmp::Gte, 5.0),
            SensorFieldCondition::numeric(SensorField::Value, SensorCmp::Lt, 10.0),
        ];
        let predicate = Predicate::SensorReportMatch(conditions);

        let e1 = event_with_reports(vec![report("Temperature", 6.0)]);
        assert!(matches(&e1, Utc::now(), &predicate));

        // Humidity=6 satisfies the value range but not the type; Temperature
        // never appears with a matching value on this event.
        let e2 = event_with_reports(vec![report("Temperature", 12.0), report("Humidity", 6.0)]);
        assert!(!matches(&e2, Utc::now(), &predicate));
    }

    fn event_at(event_time: DateTime<Utc>, id: &str) -> Event {
        let mut e = Event::new(EventType::ObjectEvent, event_time, "+00:00");
        e.action = Some(Action::Observe);
        e.event_id = epcis_core::EventId::new(id);
        e
    }

    #[test]
    fn seek_after_excludes_the_cursor_row_and_earlier_ties() {
        let t = Utc.with_ymd_and_hms(2026, 1, 1, 0, 0, 0).unwrap();
        let predicate = Predicate::SeekAfter {
            field: TimeField::EventTime,
            direction: OrderDirection::Asc,
            value: t,
            id: epcis_core::EventId::new("urn:event:5"),
        };

        // Same timestamp, lexicographically smaller/equal id: excluded.
        assert!(!matches(&event_at(t, "urn:event:5"), Utc::now(), &predicate));
        assert!(!matches(&event_at(t, "urn:event:1"), Utc::now(), &predicate));
        // Same timestamp, later id: included.
        assert!(matches(&event_at(t, "urn:event:9"), Utc::now(), &predicate));
        // Later timestamp: included regardless of id.
        let later = t + chrono::Duration::seconds(1);
        assert!(matches(&event_at(later, "urn:event:0"), Utc::now(), &predicate));
    }
}
