//! The message published to the bus once a Capture commits.
//!
//! Unlike the event-sourcing envelope this crate's predecessor carried
//! (aggregate id, aggregate type, stream sequence number), a capture commit
//! is not itself an aggregate stream — `RepositoryNotification` only needs to
//! say *which tenant, which capture, how many events, as of what record
//! time*, so `epcis-subscriptions` OnCapture triggers can decide whether to
//! run (spec.md §4.8).

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use epcis_core::{CaptureId, TenantId};

/// Published by `epcis-capture` after a Capture transaction commits.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RepositoryNotification {
    pub tenant_id: TenantId,
    pub capture_id: CaptureId,
    pub record_time: DateTime<Utc>,
    pub event_count: usize,
}

impl RepositoryNotification {
    pub fn new(
        tenant_id: TenantId,
        capture_id: CaptureId,
        record_time: DateTime<Utc>,
        event_count: usize,
    ) -> Self {
        Self {
            tenant_id,
            capture_id,
            record_time,
            event_count,
        }
    }
}
