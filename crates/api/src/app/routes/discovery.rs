//! Discovery endpoints (SPEC_FULL.md §2.5): distinct values a client can
//! plug into query parameters, computed from a tenant-scoped scan bounded
//! by `maxEventsReturnedInQuery` rather than a dedicated storage
//! projection — acceptable because these are operator/integration aids,
//! not part of the query hot path.

use std::collections::BTreeSet;
use std::sync::Arc;

use axum::extract::{Extension, State};
use axum::response::IntoResponse;
use axum::Json;

use epcis_storage::predicate::{Order, Predicate};

use crate::app::dto::DiscoveryListResponse;
use crate::app::errors::json_error;
use crate::app::state::AppState;
use crate::context::TenantContext;

async fn scan_distinct<F>(state: &AppState, tenant: &TenantContext, extract: F) -> Result<Vec<String>, axum::response::Response>
where
    F: Fn(&epcis_core::Event) -> Vec<String>,
{
    let cap = state.config.max_events_returned_in_query;
    let ids = state
        .storage
        .as_ref()
        .select_event_ids(tenant.tenant_id(), &Predicate::All(Vec::new()), Order::default(), cap)
        .await
        .map_err(|e| json_error(axum::http::StatusCode::INTERNAL_SERVER_ERROR, "storage_error", e.to_string()))?;

    let event_ids: Vec<_> = ids.into_iter().map(|(id, _)| id).collect();
    let events = state
        .storage
        .as_ref()
        .hydrate_events(tenant.tenant_id(), &event_ids)
        .await
        .map_err(|e| json_error(axum::http::StatusCode::INTERNAL_SERVER_ERROR, "storage_error", e.to_string()))?;

    let mut values = BTreeSet::new();
    for event in &events {
        for value in extract(event) {
            values.insert(value);
        }
    }
    Ok(values.into_iter().collect())
}

macro_rules! discovery_handler {
    ($name:ident, $extract:expr) => {
        pub async fn $name(State(state): State<Arc<AppState>>, Extension(tenant): Extension<TenantContext>) -> axum::response::Response {
            match scan_distinct(&state, &tenant, $extract).await {
                Ok(values) => Json(DiscoveryListResponse { values }).into_response(),
                Err(response) => response,
            }
        }
    };
}

discovery_handler!(event_types, |event: &epcis_core::Event| vec![event.event_type.as_str().to_string()]);
discovery_handler!(biz_steps, |event: &epcis_core::Event| event.business_step.clone().into_iter().collect());
discovery_handler!(dispositions, |event: &epcis_core::Event| event.disposition.clone().into_iter().collect());
discovery_handler!(read_points, |event: &epcis_core::Event| event.read_point.clone().into_iter().collect());
discovery_handler!(biz_locations, |event: &epcis_core::Event| event.business_location.clone().into_iter().collect());
discovery_handler!(epcs, |event: &epcis_core::Event| event.epcs.iter().map(|e| e.id.clone()).collect());
