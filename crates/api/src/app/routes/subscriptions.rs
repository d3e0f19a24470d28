//! `POST /queries/{name}/subscriptions`, `GET .../subscriptions`,
//! `DELETE .../subscriptions/{subscriptionId}` (spec.md §6.1, §4.8).

use std::sync::Arc;

use axum::extract::{Extension, Path, State};
use axum::http::StatusCode;
use axum::response::IntoResponse;
use axum::Json;

use epcis_core::{Subscription, SubscriptionId};

use crate::app::dto::{CreateSubscriptionRequest, SubscriptionDto};
use crate::app::errors::{json_error, subscription_error_response};
use crate::app::state::AppState;
use crate::context::TenantContext;

pub async fn create_subscription(
    State(state): State<Arc<AppState>>,
    Extension(tenant): Extension<TenantContext>,
    Path(query_name): Path<String>,
    Json(request): Json<CreateSubscriptionRequest>,
) -> axum::response::Response {
    let Some(params) = state.named_queries.get(tenant.tenant_id(), &query_name) else {
        return json_error(StatusCode::NOT_FOUND, "not_found", format!("no query named '{query_name}'"));
    };

    let mut subscription = Subscription::new(
        tenant.tenant_id().clone(),
        request.name,
        query_name,
        params,
        request.destination,
        request.trigger.into(),
    );
    subscription.report_if_empty = request.report_if_empty;
    subscription.initial_record_time = request.initial_record_time;

    match state.subscription_engine.create_subscription(subscription.clone()).await {
        Ok(()) => (StatusCode::CREATED, Json(SubscriptionDto::from(&subscription))).into_response(),
        Err(error) => subscription_error_response(error),
    }
}

pub async fn list_subscriptions(
    State(state): State<Arc<AppState>>,
    Extension(tenant): Extension<TenantContext>,
) -> axum::response::Response {
    match state.subscription_engine.list_subscriptions(tenant.tenant_id()).await {
        Ok(subscriptions) => {
            let dtos: Vec<SubscriptionDto> = subscriptions.iter().map(SubscriptionDto::from).collect();
            Json(dtos).into_response()
        }
        Err(error) => subscription_error_response(error),
    }
}

pub async fn delete_subscription(
    State(state): State<Arc<AppState>>,
    Extension(tenant): Extension<TenantContext>,
    Path((_query_name, subscription_id)): Path<(String, String)>,
) -> axum::response::Response {
    let subscription_id: SubscriptionId = match subscription_id.parse() {
        Ok(id) => id,
        Err(_) => return json_error(StatusCode::BAD_REQUEST, "invalid_id", "invalid subscription id"),
    };

    match state
        .subscription_engine
        .delete_subscription(tenant.tenant_id(), &subscription_id)
        .await
    {
        Ok(()) => StatusCode::NO_CONTENT.into_response(),
        Err(error) => subscription_error_response(error),
    }
}
