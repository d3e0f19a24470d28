//! Standing-query subscriptions: OnCapture/OnSchedule triggers, re-entrancy
//! coalescing, cursor-based delivery over the recordTime watermark, and
//! webhook delivery with exponential backoff.
//!
//! `supervisor` is the entry point `epcis-api` drives: `SubscriptionEngine`
//! for CRUD plus ad-hoc triggering, `SubscriptionSupervisor` for the
//! background OnCapture/OnSchedule loops.

pub mod backoff;
pub mod coalesce;
pub mod delivery;
pub mod error;
pub mod oncapture;
pub mod runner;
pub mod schedule;
pub mod supervisor;

pub use backoff::RetryPolicy;
pub use delivery::{deliver, DeliveryOutcome};
pub use error::{SubscriptionError, SubscriptionResult};
pub use runner::{RunOutcome, SubscriptionRunner};
pub use schedule::next_fire_after;
pub use supervisor::{SubscriptionEngine, SubscriptionEngineConfig, SubscriptionSupervisor};
