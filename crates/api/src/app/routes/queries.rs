//! `POST /queries`, `GET /queries/{name}/events`, `DELETE /queries/{name}`
//! (spec.md §6.1, SPEC_FULL.md §2.5 "named queries").

use std::sync::Arc;

use axum::extract::{Extension, Path, State};
use axum::http::StatusCode;
use axum::response::IntoResponse;
use axum::Json;

use epcis_core::cancel::CancellationToken;

use crate::app::dto::{params_to_pairs, CreateNamedQueryRequest};
use crate::app::errors::{json_error, query_error_response};
use crate::app::state::AppState;
use crate::context::TenantContext;

pub async fn create_named_query(
    State(state): State<Arc<AppState>>,
    Extension(tenant): Extension<TenantContext>,
    Json(request): Json<CreateNamedQueryRequest>,
) -> axum::response::Response {
    let pairs = params_to_pairs(&request.params);
    match state.named_queries.create(tenant.tenant_id(), &request.name, pairs) {
        Ok(()) => StatusCode::CREATED.into_response(),
        Err(()) => json_error(StatusCode::CONFLICT, "query_already_exists", format!("query '{}' already exists", request.name)),
    }
}

pub async fn delete_named_query(
    State(state): State<Arc<AppState>>,
    Extension(tenant): Extension<TenantContext>,
    Path(name): Path<String>,
) -> axum::response::Response {
    if state.named_queries.delete(tenant.tenant_id(), &name) {
        StatusCode::NO_CONTENT.into_response()
    } else {
        json_error(StatusCode::NOT_FOUND, "not_found", format!("no query named '{name}'"))
    }
}

pub async fn run_named_query(
    State(state): State<Arc<AppState>>,
    Extension(tenant): Extension<TenantContext>,
    Path(name): Path<String>,
) -> axum::response::Response {
    let Some(params) = state.named_queries.get(tenant.tenant_id(), &name) else {
        return json_error(StatusCode::NOT_FOUND, "not_found", format!("no query named '{name}'"));
    };

    let token = CancellationToken::new();
    match state.query_engine.execute(tenant.tenant_id(), &params, &token).await {
        Ok(results) => Json(serde_json::json!({
            "eventCount": results.events.len(),
            "events": results.events.iter().map(|e| epcis_codec::json::encode_event(e, &Default::default())).collect::<Vec<_>>(),
            "nextPageToken": results.next_page_token,
        }))
        .into_response(),
        Err(error) => query_error_response(error),
    }
}
