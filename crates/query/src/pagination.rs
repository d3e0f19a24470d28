//! Opaque, tamper-evident `nextPageToken`s.
//!
//! A token encodes `(orderKey, orderValue, id)` of the last row emitted on
//! the previous page. The next page re-applies the same predicate plus
//! `(orderKey, id) > tokenValue` (or `<` descending) so paging never needs
//! an `OFFSET` that drifts under concurrent inserts.

use base64::Engine;
use chrono::{DateTime, Utc};
use hmac::{Hmac, Mac};
use serde::{Deserialize, Serialize};
use sha2::Sha256;

use epcis_core::EventId;
use epcis_storage::predicate::{Order, OrderDirection, TimeField};

use crate::error::QueryError;

type HmacSha256 = Hmac<Sha256>;

#[derive(Debug, Clone, Serialize, Deserialize)]
struct CursorPayload {
    order_field: TimeFieldWire,
    direction: DirectionWire,
    order_value: DateTime<Utc>,
    id: String,
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
enum TimeFieldWire {
    EventTime,
    RecordTime,
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
enum DirectionWire {
    Asc,
    Desc,
}

impl From<TimeField> for TimeFieldWire {
    fn from(value: TimeField) -> Self {
        match value {
            TimeField::EventTime => Self::EventTime,
            TimeField::RecordTime => Self::RecordTime,
        }
    }
}

impl From<TimeFieldWire> for TimeField {
    fn from(value: TimeFieldWire) -> Self {
        match value {
            TimeFieldWire::EventTime => Self::EventTime,
            TimeFieldWire::RecordTime => Self::RecordTime,
        }
    }
}

impl From<OrderDirection> for DirectionWire {
    fn from(value: OrderDirection) -> Self {
        match value {
            OrderDirection::Asc => Self::Asc,
            OrderDirection::Desc => Self::Desc,
        }
    }
}

/// A decoded cursor, ready to be folded into the predicate for the next page.
pub struct Cursor {
    pub order: Order,
    pub order_value: DateTime<Utc>,
    pub id: EventId,
}

/// Signs and verifies `nextPageToken`s with a server-held secret so a
/// caller cannot forge a cursor that reaches past a tenant boundary or
/// skips a predicate the server applied.
#[derive(Clone)]
pub struct CursorCodec {
    secret: Vec<u8>,
}

impl CursorCodec {
    pub fn new(secret: impl Into<Vec<u8>>) -> Self {
        Self { secret: secret.into() }
    }

    pub fn encode(&self, order: Order, order_value: DateTime<Utc>, id: &EventId) -> String {
        let payload = CursorPayload {
            order_field: order.field.into(),
            direction: order.direction.into(),
            order_value,
            id: id.as_str().to_string(),
        };
        let body = serde_json::to_vec(&payload).expect("CursorPayload is always serializable");
        let body_b64 = base64::engine::general_purpose::URL_SAFE_NO_PAD.encode(&body);

        let mut mac = HmacSha256::new_from_slice(&self.secret).expect("HMAC accepts any key length");
        mac.update(body_b64.as_bytes());
        let tag = mac.finalize().into_bytes();
        let tag_b64 = base64::engine::general_purpose::URL_SAFE_NO_PAD.encode(tag);

        format!("{body_b64}.{tag_b64}")
    }

    pub fn decode(&self, token: &str) -> Result<Cursor, QueryError> {
        let invalid = || QueryError::InvalidParameterValue {
            name: "nextPageToken".into(),
            detail: "malformed cursor".into(),
        };

        let (body_b64, tag_b64) = token.split_once('.').ok_or_else(invalid)?;

        let mut mac = HmacSha256::new_from_slice(&self.secret).expect("HMAC accepts any key length");
        mac.update(body_b64.as_bytes());
        let expected_tag = mac.finalize().into_bytes();

        let given_tag = base64::engine::general_purpose::URL_SAFE_NO_PAD
            .decode(tag_b64)
            .map_err(|_| invalid())?;
        if given_tag.as_slice() != expected_tag.as_slice() {
            return Err(invalid());
        }

        let body = base64::engine::general_purpose::URL_SAFE_NO_PAD
            .decode(body_b64)
            .map_err(|_| invalid())?;
        let payload: CursorPayload = serde_json::from_slice(&body).map_err(|_| invalid())?;

        Ok(Cursor {
            order: Order {
                field: payload.order_field.into(),
                direction: match payload.direction {
                    DirectionWire::Asc => OrderDirection::Asc,
                    DirectionWire::Desc => OrderDirection::Desc,
                },
            },
            order_value: payload.order_value,
            id: EventId::new(payload.id),
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    #[test]
    fn round_trips_a_cursor() {
        let codec = CursorCodec::new(b"test-secret".to_vec());
        let order = Order { field: TimeField::EventTime, direction: OrderDirection::Asc };
        let value = Utc.with_ymd_and_hms(2026, 1, 1, 0, 0, 0).unwrap();
        let id = EventId::new("urn:event:1");

        let token = codec.encode(order, value, &id);
        let decoded = codec.decode(&token).unwrap();

        assert_eq!(decoded.order, order);
        assert_eq!(decoded.order_value, value);
        assert_eq!(decoded.id, id);
    }

    #[test]
    fn rejects_a_tampered_token() {
        let codec = CursorCodec::new(b"test-secret".to_vec());
        let order = Order { field: TimeField::EventTime, direction: OrderDirection::Asc };
        let value = Utc.with_ymd_and_hms(2026, 1, 1, 0, 0, 0).unwrap();
        let token = codec.encode(order, value, &EventId::new("urn:event:1"));

        let mut tampered = token.clone();
        tampered.push('x');
        assert!(codec.decode(&tampered).is_err());
    }

    #[test]
    fn rejects_a_token_signed_with_a_different_secret() {
        let a = CursorCodec::new(b"secret-a".to_vec());
        let b = CursorCodec::new(b"secret-b".to_vec());
        let order = Order { field: TimeField::EventTime, direction: OrderDirection::Asc };
        let value = Utc.with_ymd_and_hms(2026, 1, 1, 0, 0, 0).unwrap();
        let token = a.encode(order, value, &EventId::new("urn:event:1"));

        assert!(b.decode(&token).is_err());
    }
}
