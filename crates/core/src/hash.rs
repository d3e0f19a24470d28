//! Event Hasher: stable content-addressed `eventId` derivation.
//!
//! Spec.md §4.3. Produces `ni:///sha-256;<base64url-no-pad>?ver=CBV2.0` from
//! a canonical serialization of the event, so that two documents describing
//! the same logical event — regardless of source format (XML 1.2, XML 2.0,
//! JSON-LD) — hash to the same id (the idempotency law tested in
//! spec.md §8: `hash(x) = hash(decode(encode(x)))`).
//!
//! DESIGN.md records that this canonicalization is spec.md's normative
//! CBV-style form and does not claim byte-for-byte parity with any specific
//! reference EPCIS implementation's hash function.

use std::collections::BTreeMap;

use base64::Engine;
use sha2::{Digest, Sha256};

use crate::epc::{BusinessTransaction, Epc, SourceDest};
use crate::event::Event;
use crate::field::Field;
use crate::sensor::{SensorElement, SensorReport};

/// An intermediate canonical value: sorted maps, and lists in one of two
/// flavors — `Set` (sorted by each member's own canonical rendering, for
/// EPCIS element collections with no meaningful order) or `Seq` (kept in
/// document order, for collections whose position is itself meaningful).
enum CanonVal {
    Str(String),
    Obj(BTreeMap<&'static str, CanonVal>),
    Set(Vec<CanonVal>),
    Seq(Vec<CanonVal>),
}

impl CanonVal {
    fn opt(value: &Option<String>) -> Self {
        Self::Str(value.clone().unwrap_or_default())
    }

    /// Render this value into `path=value` lines, appended to `out`.
    fn flatten(&self, path: &str, out: &mut Vec<String>) {
        match self {
            CanonVal::Str(s) => out.push(format!("{path}={s}")),
            CanonVal::Obj(map) => {
                for (key, val) in map {
                    let child_path = if path.is_empty() {
                        key.to_string()
                    } else {
                        format!("{path}.{key}")
                    };
                    val.flatten(&child_path, out);
                }
            }
            CanonVal::Set(items) => {
                let mut rendered: Vec<String> = items
                    .iter()
                    .map(|item| {
                        let mut lines = Vec::new();
                        item.flatten("", &mut lines);
                        lines.join("\u{1}")
                    })
                    .collect();
                rendered.sort();
                for (i, member) in rendered.iter().enumerate() {
                    for line in member.split('\u{1}') {
                        if line.is_empty() {
                            continue;
                        }
                        if let Some((k, v)) = line.split_once('=') {
                            let child_path = format!("{path}[{i}].{k}");
                            out.push(format!("{child_path}={v}"));
                        }
                    }
                }
            }
            CanonVal::Seq(items) => {
                for (i, item) in items.iter().enumerate() {
                    item.flatten(&format!("{path}[{i}]"), out);
                }
            }
        }
    }
}

/// Render a float per spec.md §4.3 rule 3: no exponent, no trailing zeros
/// after the decimal point, mandatory leading zero for fractional values.
pub fn canonical_number(value: f64) -> String {
    if value == value.trunc() && value.abs() < 1e15 {
        return format!("{}", value as i64);
    }
    let mut s = format!("{value:.12}");
    while s.ends_with('0') {
        s.pop();
    }
    if s.ends_with('.') {
        s.pop();
    }
    if let Some(rest) = s.strip_prefix('.') {
        s = format!("0.{rest}");
    } else if let Some(rest) = s.strip_prefix("-.") {
        s = format!("-0.{rest}");
    }
    s
}

/// Render a UTC timestamp per spec.md §4.3 rule 2.
pub fn canonical_timestamp(dt: chrono::DateTime<chrono::Utc>) -> String {
    dt.format("%Y-%m-%dT%H:%M:%S%.3fZ").to_string()
}

fn canon_epc(epc: &Epc) -> CanonVal {
    let mut map = BTreeMap::new();
    map.insert("type", CanonVal::Str(format!("{:?}", epc.epc_type)));
    map.insert("id", CanonVal::Str(epc.id.clone()));
    map.insert(
        "quantity",
        CanonVal::Str(
            epc.quantity
                .map(canonical_number)
                .unwrap_or_default(),
        ),
    );
    map.insert("uom", CanonVal::opt(&epc.unit_of_measure));
    CanonVal::Obj(map)
}

fn canon_bt(bt: &BusinessTransaction) -> CanonVal {
    let mut map = BTreeMap::new();
    map.insert("type", CanonVal::Str(bt.transaction_type.clone()));
    map.insert("id", CanonVal::Str(bt.id.clone()));
    CanonVal::Obj(map)
}

fn canon_sdt(sdt: &SourceDest) -> CanonVal {
    let mut map = BTreeMap::new();
    map.insert("type", CanonVal::Str(sdt.sdt_type.clone()));
    map.insert("id", CanonVal::Str(sdt.id.clone()));
    CanonVal::Obj(map)
}

fn canon_field(f: &Field) -> CanonVal {
    let mut map = BTreeMap::new();
    map.insert("namespace", CanonVal::Str(f.namespace.clone()));
    map.insert("name", CanonVal::Str(f.name.clone()));
    map.insert("text", CanonVal::opt(&f.text_value));
    map.insert(
        "numeric",
        CanonVal::Str(f.numeric_value.map(canonical_number).unwrap_or_default()),
    );
    map.insert(
        "date",
        CanonVal::Str(
            f.date_value
                .map(canonical_timestamp)
                .unwrap_or_default(),
        ),
    );
    map.insert("attr", CanonVal::Str(f.is_attribute.to_string()));
    CanonVal::Obj(map)
}

fn canon_sensor_report(r: &SensorReport) -> CanonVal {
    let mut map = BTreeMap::new();
    map.insert("sensorIndex", CanonVal::Str(r.sensor_index.to_string()));
    map.insert("type", CanonVal::opt(&r.sensor_type));
    map.insert("deviceID", CanonVal::opt(&r.device_id));
    map.insert(
        "time",
        CanonVal::Str(r.time.map(canonical_timestamp).unwrap_or_default()),
    );
    map.insert(
        "value",
        CanonVal::Str(r.value.map(canonical_number).unwrap_or_default()),
    );
    map.insert(
        "minValue",
        CanonVal::Str(r.min_value.map(canonical_number).unwrap_or_default()),
    );
    map.insert(
        "maxValue",
        CanonVal::Str(r.max_value.map(canonical_number).unwrap_or_default()),
    );
    map.insert(
        "meanValue",
        CanonVal::Str(r.mean_value.map(canonical_number).unwrap_or_default()),
    );
    map.insert("uom", CanonVal::opt(&r.uom));
    CanonVal::Obj(map)
}

fn canon_sensor_element(e: &SensorElement) -> CanonVal {
    let mut map = BTreeMap::new();
    map.insert(
        "time",
        CanonVal::Str(
            e.sensor_metadata_time
                .map(canonical_timestamp)
                .unwrap_or_default(),
        ),
    );
    map.insert("deviceID", CanonVal::opt(&e.sensor_metadata_device_id));
    map.insert(
        "reports",
        CanonVal::Set(e.reports.iter().map(canon_sensor_report).collect()),
    );
    CanonVal::Obj(map)
}

/// Build the canonical form of `event` (ignoring any existing `event_id` —
/// the hash is a function of everything *except* the id it produces).
fn canonicalize(event: &Event) -> CanonVal {
    let mut map = BTreeMap::new();
    map.insert("eventType", CanonVal::Str(event.event_type.as_str().to_string()));
    map.insert("eventTime", CanonVal::Str(canonical_timestamp(event.event_time)));
    map.insert(
        "action",
        CanonVal::Str(event.action.map(|a| a.as_str().to_string()).unwrap_or_default()),
    );
    map.insert("bizStep", CanonVal::opt(&event.business_step));
    map.insert("disposition", CanonVal::opt(&event.disposition));
    map.insert("readPoint", CanonVal::opt(&event.read_point));
    map.insert("bizLocation", CanonVal::opt(&event.business_location));
    map.insert("transformationId", CanonVal::opt(&event.transformation_id));
    map.insert("certificationInfo", CanonVal::opt(&event.certification_info));
    map.insert(
        "correctiveReason",
        CanonVal::opt(&event.corrective_reason),
    );
    map.insert(
        "correctiveEventIds",
        CanonVal::Set(
            event
                .corrective_event_ids
                .iter()
                .map(|id| CanonVal::Str(id.as_str().to_string()))
                .collect(),
        ),
    );
    map.insert("epcs", CanonVal::Set(event.epcs.iter().map(canon_epc).collect()));
    map.insert(
        "businessTransactions",
        CanonVal::Set(
            event
                .business_transactions
                .iter()
                .map(canon_bt)
                .collect(),
        ),
    );
    map.insert(
        "sources",
        CanonVal::Set(event.sources.iter().map(canon_sdt).collect()),
    );
    map.insert(
        "destinations",
        CanonVal::Set(event.destinations.iter().map(canon_sdt).collect()),
    );
    map.insert(
        "sensorElements",
        CanonVal::Seq(event.sensor_elements.iter().map(canon_sensor_element).collect()),
    );
    map.insert(
        "fields",
        CanonVal::Set(event.fields.iter().map(canon_field).collect()),
    );
    CanonVal::Obj(map)
}

/// Derive a stable `eventId` URI for `event` (spec.md §4.3).
pub fn hash(event: &Event) -> String {
    let canon = canonicalize(event);
    let mut lines = Vec::new();
    canon.flatten("", &mut lines);
    lines.sort();
    let document = lines.join("\n");

    let digest = Sha256::digest(document.as_bytes());
    let encoded = base64::engine::general_purpose::URL_SAFE_NO_PAD.encode(digest);
    format!("ni:///sha-256;{encoded}?ver=CBV2.0")
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::epc::EpcType;
    use crate::event::EventType;
    use chrono::TimeZone;

    fn sample_event() -> Event {
        let mut e = Event::new(
            EventType::ObjectEvent,
            chrono::Utc.with_ymd_and_hms(2025, 1, 15, 10, 30, 0).unwrap(),
            "+00:00",
        );
        e.action = Some(crate::event::Action::Observe);
        e.business_step = Some("urn:epcglobal:cbv:bizstep:receiving".into());
        e.epcs.push(Epc::new(
            EpcType::List,
            "urn:epc:id:sgtin:8901213.105919.000000",
        ));
        e
    }

    #[test]
    fn hash_is_deterministic() {
        let e = sample_event();
        assert_eq!(hash(&e), hash(&e));
    }

    #[test]
    fn hash_ignores_epc_list_order() {
        let mut a = sample_event();
        a.epcs.push(Epc::new(EpcType::List, "urn:epc:id:sgtin:8901213.105919.000001"));

        let mut b = sample_event();
        b.epcs.insert(0, Epc::new(EpcType::List, "urn:epc:id:sgtin:8901213.105919.000001"));

        assert_eq!(hash(&a), hash(&b));
    }

    #[test]
    fn hash_changes_with_content() {
        let a = sample_event();
        let mut b = sample_event();
        b.business_step = Some("urn:epcglobal:cbv:bizstep:shipping".into());
        assert_ne!(hash(&a), hash(&b));
    }

    #[test]
    fn hash_uri_shape() {
        let h = hash(&sample_event());
        assert!(h.starts_with("ni:///sha-256;"));
        assert!(h.ends_with("?ver=CBV2.0"));
    }

    #[test]
    fn canonical_number_strips_trailing_zeros() {
        assert_eq!(canonical_number(6.0), "6");
        assert_eq!(canonical_number(0.5), "0.5");
        assert_eq!(canonical_number(-0.25), "-0.25");
    }
}
