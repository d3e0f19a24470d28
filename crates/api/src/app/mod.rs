//! HTTP API application wiring (Axum router + service wiring).
//!
//! Structured the way the teacher lays this folder out:
//! - `state.rs`: infrastructure wiring (storage, capture/query/subscription engines)
//! - `routes/`: HTTP routes + handlers (one file per domain area)
//! - `dto.rs`: request/response DTOs and JSON mapping helpers
//! - `errors.rs`: consistent error responses

use std::sync::Arc;

use axum::routing::get;
use axum::Router;

use crate::config::RepositoryConfig;
use crate::middleware::{self, AuthState};

pub mod dto;
pub mod errors;
pub mod routes;
pub mod state;

use state::{build_services, Services};

/// Build the full HTTP router plus the background-task handle `main.rs`
/// is responsible for shutting down on SIGTERM.
pub async fn build_app(config: RepositoryConfig) -> anyhow::Result<(Router, Services)> {
    let services = build_services(config).await?;

    let auth_state = AuthState { identity: services.state.identity.clone() };

    let protected = routes::router()
        .layer(axum::middleware::from_fn_with_state(auth_state, middleware::auth_middleware))
        .with_state(services.state.clone());

    let router = Router::new().route("/health", get(routes::system::health)).merge(protected);

    Ok((router, services))
}
