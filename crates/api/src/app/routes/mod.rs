use std::sync::Arc;

use axum::routing::{delete, get, post};
use axum::Router;

use crate::app::state::AppState;

pub mod capture;
pub mod discovery;
pub mod events;
pub mod queries;
pub mod subscriptions;
pub mod system;

/// All tenant-scoped endpoints (spec.md §6.1/§6.2); mounted behind the
/// Basic-auth middleware layer in `app::build_app`.
pub fn router() -> Router<Arc<AppState>> {
    Router::new()
        .route("/whoami", get(system::whoami))
        .route("/capture", post(capture::capture).get(capture::list_captures))
        .route("/capture/:capture_id", get(capture::get_capture))
        .route("/events", get(events::query_events))
        .route("/eventTypes", get(discovery::event_types))
        .route("/bizSteps", get(discovery::biz_steps))
        .route("/dispositions", get(discovery::dispositions))
        .route("/readPoints", get(discovery::read_points))
        .route("/bizLocations", get(discovery::biz_locations))
        .route("/epcs", get(discovery::epcs))
        .route("/queries", post(queries::create_named_query))
        .route(
            "/queries/:name",
            delete(queries::delete_named_query),
        )
        .route("/queries/:name/events", get(queries::run_named_query))
        .route(
            "/queries/:name/subscriptions",
            post(subscriptions::create_subscription).get(subscriptions::list_subscriptions),
        )
        .route(
            "/queries/:name/subscriptions/:subscription_id",
            delete(subscriptions::delete_subscription),
        )
        .route("/Query.svc", post(crate::soap::query_service))
}
