//! The Capture aggregate: the transactional unit of ingestion.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::event::{Event, SchemaVersion};
use crate::id::{CaptureId, TenantId};
use crate::masterdata::MasterData;

/// The optional GS1 StandardBusinessDocumentHeader carried by a Capture.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct StandardBusinessHeader {
    pub document_identification: Option<String>,
    pub sender: Option<String>,
    pub receiver: Option<String>,
    pub creation_date_time: Option<DateTime<Utc>>,
}

/// One EPCIS document submission: the transactional unit of ingestion.
///
/// Strict ownership (spec.md §3.1): a Capture owns its Events and
/// MasterData; both are cascade-deleted with the Capture (which, per the
/// lifecycle rules, never actually happens from within this crate — see
/// spec.md §3.2 "Destroyed: not by the core").
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Capture {
    pub capture_id: CaptureId,
    pub tenant_id: TenantId,

    /// Client-supplied document creation time.
    pub document_time: DateTime<Utc>,
    /// Server-assigned at persistence; `None` until the capture handler
    /// commits the transaction (spec.md §3.1/§3.2).
    pub record_time: Option<DateTime<Utc>>,

    pub schema_version: SchemaVersion,
    pub standard_business_header: Option<StandardBusinessHeader>,

    pub events: Vec<Event>,
    pub master_data: Vec<MasterData>,

    /// Correlation id for subscription-delivery debugging (spec.md §3.1
    /// "optional subscription-delivery correlation"); `None` for ordinary
    /// client submissions.
    pub subscription_correlation: Option<String>,
}

impl Capture {
    pub fn new(
        tenant_id: TenantId,
        schema_version: SchemaVersion,
        document_time: DateTime<Utc>,
    ) -> Self {
        Self {
            capture_id: CaptureId::new(),
            tenant_id,
            document_time,
            record_time: None,
            schema_version,
            standard_business_header: None,
            events: Vec::new(),
            master_data: Vec::new(),
            subscription_correlation: None,
        }
    }

    /// True once this aggregate has been durably persisted (spec.md §3.2:
    /// "once persisted, the Capture aggregate is immutable").
    pub fn is_persisted(&self) -> bool {
        self.record_time.is_some()
    }
}
