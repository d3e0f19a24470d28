//! Unauthenticated health check and an authenticated identity echo, useful
//! for verifying Basic-auth/tenant resolution end to end.

use axum::response::IntoResponse;
use axum::Json;

use crate::context::TenantContext;

pub async fn health() -> axum::http::StatusCode {
    axum::http::StatusCode::OK
}

pub async fn whoami(axum::extract::Extension(tenant): axum::extract::Extension<TenantContext>) -> impl IntoResponse {
    Json(serde_json::json!({ "tenantId": tenant.tenant_id().as_str() }))
}
