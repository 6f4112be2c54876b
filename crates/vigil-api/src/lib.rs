//! vigil-api — REST API for Vigil.
//!
//! Thin axum layer over the check engine and the state store.
//!
//! # API Routes
//!
//! | Method | Path | Description |
//! |---|---|---|
//! | POST | `/api/v1/host-services/{id}/check/{old_status}` | Run a check now |
//! | PUT | `/api/v1/host-services/{id}/active` | Activate or deactivate |
//! | PUT | `/api/v1/host-services/{id}/schedule` | Change the check interval |
//! | GET | `/api/v1/host-services?status=` | Host services, optionally by status |
//! | GET | `/api/v1/status-counts` | Active host services per status |
//! | GET | `/api/v1/events?limit=` | Most recent events |
//! | GET | `/api/v1/schedule` | Live check jobs |
//! | PUT | `/api/v1/monitoring` | Turn scheduled monitoring on or off |
//! | GET | `/api/v1/stream` | Server-sent events relay of every broadcast |

pub mod handlers;
pub mod stream;

use axum::Router;
use axum::routing::{get, post, put};
use vigil_health::Monitor;
use vigil_notify::ChannelHub;
use vigil_state::StateStore;

/// Shared state for API handlers.
#[derive(Clone)]
pub struct ApiState {
    pub store: StateStore,
    pub monitor: Monitor,
    pub hub: ChannelHub,
}

/// Build the complete API router.
pub fn build_router(state: ApiState) -> Router {
    let api_routes = Router::new()
        .route("/host-services", get(handlers::list_host_services))
        .route(
            "/host-services/{id}/check/{old_status}",
            post(handlers::check_host_service),
        )
        .route("/host-services/{id}/active", put(handlers::set_active))
        .route("/host-services/{id}/schedule", put(handlers::set_schedule))
        .route("/status-counts", get(handlers::status_counts))
        .route("/events", get(handlers::list_events))
        .route("/schedule", get(handlers::schedule))
        .route("/monitoring", put(handlers::set_monitoring))
        .route("/stream", get(stream::live_stream))
        .with_state(state);

    Router::new().nest("/api/v1", api_routes)
}
