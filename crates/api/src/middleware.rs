//! HTTP Basic authentication (spec.md §6.3): resolves the `Authorization`
//! header to a tenant id via an `IdentityOracle` and stashes it as request
//! state for every downstream handler.

use std::sync::Arc;

use axum::{
    extract::State,
    http::{HeaderMap, StatusCode},
    middleware::Next,
    response::Response,
};

use epcis_auth::{Credentials, IdentityOracle};
use epcis_core::TenantId;

use crate::context::TenantContext;

/// A super-user caller may name the tenant it wants to act on behalf of via
/// this header (spec.md §4.6 "A configured super-user bypass may be applied
/// but MUST be explicit").
const ON_BEHALF_OF_HEADER: &str = "x-epcis-tenant";

#[derive(Clone)]
pub struct AuthState {
    pub identity: Arc<dyn IdentityOracle>,
}

pub async fn auth_middleware(
    State(state): State<AuthState>,
    mut req: axum::http::Request<axum::body::Body>,
    next: Next,
) -> Result<Response, StatusCode> {
    let credentials = extract_basic(req.headers())?;
    let on_behalf_of = req
        .headers()
        .get(ON_BEHALF_OF_HEADER)
        .and_then(|v| v.to_str().ok())
        .map(TenantId::new);

    let tenant_id = state
        .identity
        .resolve(&credentials, on_behalf_of.as_ref())
        .map_err(|_| StatusCode::UNAUTHORIZED)?;

    req.extensions_mut().insert(TenantContext::new(tenant_id));

    Ok(next.run(req).await)
}

fn extract_basic(headers: &HeaderMap) -> Result<Credentials, StatusCode> {
    let header = headers
        .get(axum::http::header::AUTHORIZATION)
        .ok_or(StatusCode::UNAUTHORIZED)?;
    let header = header.to_str().map_err(|_| StatusCode::UNAUTHORIZED)?;
    Credentials::from_header(header).map_err(|_| StatusCode::UNAUTHORIZED)
}
