//! Canonical EPCIS domain model: captures, events, masterdata, subscriptions.
//!
//! This crate owns the in-memory representation described by the EPCIS
//! repository's data model and the invariants it must uphold. It has no
//! knowledge of wire formats (XML/JSON-LD, see `epcis-codec`), storage
//! engines (see `epcis-storage`), or transport (see `epcis-api`).

pub mod cancel;
pub mod capture;
pub mod epc;
pub mod error;
pub mod event;
pub mod field;
pub mod hash;
pub mod id;
pub mod masterdata;
pub mod sensor;
pub mod subscription;
pub mod validate;

pub use cancel::CancellationToken;
pub use capture::{Capture, StandardBusinessHeader};
pub use epc::{Epc, EpcType};
pub use error::{DomainError, DomainResult, RuleViolation};
pub use event::{Action, Event, EventType, SchemaVersion};
pub use field::{Field, FieldType};
pub use id::{CaptureId, EventId, SubscriptionId, TenantId};
pub use masterdata::MasterData;
pub use sensor::{SensorElement, SensorReport};
pub use subscription::{Subscription, Trigger};
