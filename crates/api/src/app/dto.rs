//! Wire shapes the codec crate doesn't already own: capture listing,
//! discovery responses, and named-query/subscription CRUD bodies.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use epcis_core::{Capture, CaptureId, Subscription, Trigger};

#[derive(Debug, Serialize)]
pub struct CaptureSummary {
    pub capture_id: String,
    pub document_time: DateTime<Utc>,
    pub record_time: Option<DateTime<Utc>>,
    pub event_count: usize,
    pub schema_version: String,
}

impl From<&Capture> for CaptureSummary {
    fn from(capture: &Capture) -> Self {
        Self {
            capture_id: capture.capture_id.to_string(),
            document_time: capture.document_time,
            record_time: capture.record_time,
            event_count: capture.events.len(),
            schema_version: capture.schema_version.as_str().to_string(),
        }
    }
}

#[derive(Debug, Deserialize)]
pub struct ListCapturesQuery {
    pub limit: Option<u32>,
    pub offset: Option<u32>,
}

pub fn parse_capture_id(raw: &str) -> Result<CaptureId, ()> {
    raw.parse::<CaptureId>().map_err(|_| ())
}

/// `POST /queries` request body: a named, reusable set of query parameters
/// (SPEC_FULL.md §2.5). `params` mirrors the flat `(name, value)` shape the
/// `GET /events` query string carries, so the same parser handles both.
#[derive(Debug, Deserialize)]
pub struct CreateNamedQueryRequest {
    pub name: String,
    #[serde(default)]
    pub params: Vec<NamedQueryParam>,
}

#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct NamedQueryParam {
    pub name: String,
    pub value: String,
}

pub fn params_to_pairs(params: &[NamedQueryParam]) -> Vec<(String, String)> {
    params.iter().map(|p| (p.name.clone(), p.value.clone())).collect()
}

#[derive(Debug, Deserialize)]
pub struct CreateSubscriptionRequest {
    pub name: String,
    pub destination: String,
    #[serde(default)]
    pub report_if_empty: bool,
    #[serde(default)]
    pub initial_record_time: Option<DateTime<Utc>>,
    pub trigger: SubscriptionTriggerDto,
}

#[derive(Debug, Deserialize)]
#[serde(tag = "type", rename_all = "camelCase")]
pub enum SubscriptionTriggerDto {
    OnCapture,
    OnSchedule { schedule: String },
}

impl From<SubscriptionTriggerDto> for Trigger {
    fn from(value: SubscriptionTriggerDto) -> Self {
        match value {
            SubscriptionTriggerDto::OnCapture => Trigger::OnCapture,
            SubscriptionTriggerDto::OnSchedule { schedule } => Trigger::OnSchedule(schedule),
        }
    }
}

#[derive(Debug, Serialize)]
pub struct SubscriptionDto {
    pub subscription_id: String,
    pub name: String,
    pub query_name: String,
    pub destination: String,
    pub report_if_empty: bool,
    pub active: bool,
}

impl From<&Subscription> for SubscriptionDto {
    fn from(subscription: &Subscription) -> Self {
        Self {
            subscription_id: subscription.subscription_id.to_string(),
            name: subscription.name.clone(),
            query_name: subscription.query_name.clone(),
            destination: subscription.destination.clone(),
            report_if_empty: subscription.report_if_empty,
            active: subscription.active,
        }
    }
}

#[derive(Debug, Serialize)]
pub struct DiscoveryListResponse {
    pub values: Vec<String>,
}
