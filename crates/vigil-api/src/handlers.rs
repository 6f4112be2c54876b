//! REST API handlers.
//!
//! Reads go straight to the `StateStore`; anything that touches checks or
//! jobs goes through the `Monitor`.

use axum::Json;
use axum::extract::{Path, Query, State};
use axum::http::StatusCode;
use axum::response::IntoResponse;
use serde::{Deserialize, Serialize};
use tracing::{info, warn};

use vigil_health::emitter::NEXT_RUN_PENDING;
use vigil_health::{MonitorError, ScheduleEntry, format_timestamp};
use vigil_state::{HostServiceId, ScheduleUnit, ServiceStatus};

use crate::ApiState;

const DEFAULT_EVENT_LIMIT: usize = 50;

/// Response wrapper for consistent API format.
#[derive(Serialize)]
struct ApiResponse<T: Serialize> {
    success: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    data: Option<T>,
    #[serde(skip_serializing_if = "Option::is_none")]
    error: Option<String>,
}

impl<T: Serialize> ApiResponse<T> {
    fn ok(data: T) -> Json<Self> {
        Json(Self {
            success: true,
            data: Some(data),
            error: None,
        })
    }
}

fn error_response(msg: &str, status: StatusCode) -> impl IntoResponse {
    (
        status,
        Json(ApiResponse::<()> {
            success: false,
            data: None,
            error: Some(msg.to_string()),
        }),
    )
}

fn host_service_not_found(id: HostServiceId) -> axum::response::Response {
    error_response(&format!("host service {id} not found"), StatusCode::NOT_FOUND).into_response()
}

fn internal(e: impl std::fmt::Display) -> axum::response::Response {
    error_response(&e.to_string(), StatusCode::INTERNAL_SERVER_ERROR).into_response()
}

// ── Checks ─────────────────────────────────────────────────────

/// POST /api/v1/host-services/{id}/check/{old_status}
pub async fn check_host_service(
    State(state): State<ApiState>,
    Path((id, old_status)): Path<(HostServiceId, String)>,
) -> impl IntoResponse {
    let result = state.monitor.run_manual_check(id, &old_status).await;
    Json(ApiResponse {
        success: result.ok,
        error: (!result.ok).then(|| result.message.clone()),
        data: Some(result),
    })
}

// ── Activation and scheduling ──────────────────────────────────

#[derive(Debug, Deserialize)]
pub struct ActiveRequest {
    pub active: bool,
}

/// PUT /api/v1/host-services/{id}/active
pub async fn set_active(
    State(state): State<ApiState>,
    Path(id): Path<HostServiceId>,
    Json(req): Json<ActiveRequest>,
) -> impl IntoResponse {
    match state.monitor.set_active(id, req.active).await {
        Ok(hs) => ApiResponse::ok(hs).into_response(),
        Err(e) => monitor_error(id, e),
    }
}

#[derive(Debug, Deserialize)]
pub struct ScheduleRequest {
    pub schedule_number: u32,
    pub schedule_unit: ScheduleUnit,
}

/// PUT /api/v1/host-services/{id}/schedule
pub async fn set_schedule(
    State(state): State<ApiState>,
    Path(id): Path<HostServiceId>,
    Json(req): Json<ScheduleRequest>,
) -> impl IntoResponse {
    match state
        .monitor
        .set_schedule(id, req.schedule_number, req.schedule_unit)
        .await
    {
        Ok(hs) => ApiResponse::ok(hs).into_response(),
        Err(MonitorError::InvalidSchedule(_)) => {
            error_response("schedule_number must be at least 1", StatusCode::BAD_REQUEST)
                .into_response()
        }
        Err(e) => monitor_error(id, e),
    }
}

fn monitor_error(id: HostServiceId, e: MonitorError) -> axum::response::Response {
    match e {
        MonitorError::State(ref inner) if inner.is_not_found() => host_service_not_found(id),
        e => {
            warn!(host_service_id = id, error = %e, "host service update failed");
            internal(e)
        }
    }
}

// ── Views ──────────────────────────────────────────────────────

#[derive(Debug, Deserialize)]
pub struct StatusQuery {
    pub status: Option<String>,
}

/// GET /api/v1/host-services?status=
pub async fn list_host_services(
    State(state): State<ApiState>,
    Query(query): Query<StatusQuery>,
) -> impl IntoResponse {
    let result = match query.status.as_deref() {
        Some(raw) => match raw.parse::<ServiceStatus>() {
            Ok(status) => state.store.services_by_status(status),
            Err(e) => return error_response(&e, StatusCode::BAD_REQUEST).into_response(),
        },
        None => state.store.list_host_services(),
    };
    match result {
        Ok(services) => ApiResponse::ok(services).into_response(),
        Err(e) => internal(e),
    }
}

/// GET /api/v1/status-counts
pub async fn status_counts(State(state): State<ApiState>) -> impl IntoResponse {
    match state.store.service_status_counts() {
        Ok(counts) => ApiResponse::ok(counts).into_response(),
        Err(e) => internal(e),
    }
}

#[derive(Debug, Deserialize)]
pub struct EventsQuery {
    pub limit: Option<usize>,
}

/// GET /api/v1/events?limit=
pub async fn list_events(
    State(state): State<ApiState>,
    Query(query): Query<EventsQuery>,
) -> impl IntoResponse {
    match state
        .store
        .list_events(query.limit.unwrap_or(DEFAULT_EVENT_LIMIT))
    {
        Ok(events) => ApiResponse::ok(events).into_response(),
        Err(e) => internal(e),
    }
}

/// One row of the schedule view.
#[derive(Debug, Serialize)]
pub struct ScheduleRow {
    #[serde(flatten)]
    pub entry: ScheduleEntry,
    /// `next_run` rendered for display, or the pending placeholder.
    pub next_run_at: String,
}

/// GET /api/v1/schedule
pub async fn schedule(State(state): State<ApiState>) -> impl IntoResponse {
    let rows: Vec<ScheduleRow> = state
        .monitor
        .schedule_entries()
        .await
        .into_iter()
        .map(|entry| ScheduleRow {
            next_run_at: entry
                .next_run
                .map(format_timestamp)
                .unwrap_or_else(|| NEXT_RUN_PENDING.to_string()),
            entry,
        })
        .collect();
    ApiResponse::ok(rows)
}

// ── Monitoring switch ──────────────────────────────────────────

#[derive(Debug, Deserialize)]
pub struct MonitoringRequest {
    pub enabled: bool,
}

#[derive(Debug, Serialize)]
pub struct MonitoringState {
    pub monitoring_live: bool,
    pub scheduled: usize,
}

/// PUT /api/v1/monitoring
pub async fn set_monitoring(
    State(state): State<ApiState>,
    Json(req): Json<MonitoringRequest>,
) -> impl IntoResponse {
    match state.monitor.set_monitoring_live(req.enabled).await {
        Ok(scheduled) => {
            info!(enabled = req.enabled, scheduled, "monitoring switched");
            ApiResponse::ok(MonitoringState {
                monitoring_live: state.monitor.preferences().monitoring_live(),
                scheduled,
            })
            .into_response()
        }
        Err(e) => internal(e),
    }
}
