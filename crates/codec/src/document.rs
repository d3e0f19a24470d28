//! `EpcisDocument`: the decoder-version-agnostic shape every decoder
//! produces and every encoder consumes (spec.md §4.1/§4.7). Distinct from
//! `epcis_core::Capture` — a Capture additionally carries a `tenant_id` and
//! server-assigned `record_time` that only exist once the capture handler
//! (not the codec) has processed the document.

use chrono::{DateTime, Utc};

use epcis_core::{Event, MasterData, SchemaVersion, StandardBusinessHeader};

#[derive(Debug, Clone, PartialEq)]
pub struct EpcisDocument {
    pub schema_version: SchemaVersion,
    pub creation_date: Option<DateTime<Utc>>,
    pub standard_business_header: Option<StandardBusinessHeader>,
    pub events: Vec<Event>,
    pub master_data: Vec<MasterData>,
}
