//! REST read endpoints over the sensor store, alert history and hub.

use crate::client_kind::ClientKind;
use crate::hub::HubStats;
use crate::ws_server::AppState;
use alerts::{HistoryStats, ProcessedAlert};
use axum::{
    extract::{Path, Query, State},
    http::StatusCode,
    response::Json,
    routing::get,
    Router,
};
use sensor_store::{AnalyticsSummary, DataPage, DataQuery, SensorRecord, TimeRange};
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use tracing::error;

/// Default number of alerts returned by `/api/alerts/recent`.
pub const DEFAULT_RECENT_ALERTS: usize = 20;

type ApiResult<T> = Result<Json<T>, (StatusCode, Json<ErrorResponse>)>;

/// REST routes.
pub fn routes() -> Router<Arc<AppState>> {
    Router::new()
        .route("/health", get(health_handler))
        .route("/api/devices", get(list_devices_handler))
        .route("/api/devices/{device_id}/latest", get(device_latest_handler))
        .route("/api/devices/{device_id}/data", get(device_data_handler))
        .route("/api/data/latest", get(latest_handler))
        .route("/api/analytics", get(analytics_handler))
        .route("/api/alerts/recent", get(recent_alerts_handler))
        .route("/api/alerts/stats", get(alert_stats_handler))
        .route("/api/realtime/stats", get(realtime_stats_handler))
}

// =============================================================================
// Request/Response Types
// =============================================================================

#[derive(Serialize)]
struct HealthResponse {
    status: String,
    clients: usize,
    rooms: usize,
    alerts: usize,
}

#[derive(Serialize)]
struct DeviceListResponse {
    devices: Vec<String>,
    count: usize,
}

#[derive(Serialize)]
struct RecentAlertsResponse {
    alerts: Vec<ProcessedAlert>,
    count: usize,
}

#[derive(Serialize)]
pub struct ErrorResponse {
    success: bool,
    error: String,
}

impl ErrorResponse {
    fn new(error: impl Into<String>) -> Self {
        Self {
            success: false,
            error: error.into(),
        }
    }
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct AnalyticsParams {
    device_id: Option<String>,
    time_range: Option<String>,
}

#[derive(Debug, Deserialize)]
struct RecentParams {
    limit: Option<usize>,
}

/// Map a store error to a response. Internals are hidden unless
/// `debug_errors` is set.
fn store_failure(
    state: &AppState,
    context: &str,
    e: sensor_store::Error,
) -> (StatusCode, Json<ErrorResponse>) {
    if let sensor_store::Error::InvalidCursor(_) = e {
        return (StatusCode::BAD_REQUEST, Json(ErrorResponse::new(e.to_string())));
    }

    error!("{}: {}", context, e);
    let message = if state.debug_errors {
        format!("{}: {}", context, e)
    } else {
        "Internal server error".to_string()
    };
    (StatusCode::INTERNAL_SERVER_ERROR, Json(ErrorResponse::new(message)))
}

fn not_found(message: String) -> (StatusCode, Json<ErrorResponse>) {
    (StatusCode::NOT_FOUND, Json(ErrorResponse::new(message)))
}

// =============================================================================
// Handlers
// =============================================================================

/// Health check endpoint.
async fn health_handler(State(state): State<Arc<AppState>>) -> Json<HealthResponse> {
    let hub = state.hub.stats();
    Json(HealthResponse {
        status: "ok".to_string(),
        clients: hub.connected_clients,
        rooms: hub.rooms.len(),
        alerts: state.history.len(),
    })
}

/// List known devices.
async fn list_devices_handler(State(state): State<Arc<AppState>>) -> ApiResult<DeviceListResponse> {
    match state.store.get_device_list().await {
        Ok(devices) => {
            let count = devices.len();
            Ok(Json(DeviceListResponse { devices, count }))
        }
        Err(e) => Err(store_failure(&state, "Failed to list devices", e)),
    }
}

/// Latest reading of one device.
async fn device_latest_handler(
    State(state): State<Arc<AppState>>,
    Path(device_id): Path<String>,
) -> ApiResult<SensorRecord> {
    match state.store.get_latest_record(Some(&device_id)).await {
        Ok(Some(record)) => Ok(Json(record)),
        Ok(None) => Err(not_found(format!("No data for device: {}", device_id))),
        Err(e) => Err(store_failure(&state, "Failed to get latest record", e)),
    }
}

/// Page of readings for one device.
async fn device_data_handler(
    State(state): State<Arc<AppState>>,
    Path(device_id): Path<String>,
    kind: ClientKind,
    Query(mut query): Query<DataQuery>,
) -> ApiResult<DataPage> {
    if query.limit.is_none() {
        query.limit = Some(kind.default_page_limit());
    }
    match state.store.get_device_data(Some(&device_id), &query).await {
        Ok(page) => Ok(Json(page)),
        Err(e) => Err(store_failure(&state, "Failed to get device data", e)),
    }
}

/// Latest reading across all devices.
async fn latest_handler(State(state): State<Arc<AppState>>) -> ApiResult<SensorRecord> {
    match state.store.get_latest_record(None).await {
        Ok(Some(record)) => Ok(Json(record)),
        Ok(None) => Err(not_found("No sensor data available".to_string())),
        Err(e) => Err(store_failure(&state, "Failed to get latest record", e)),
    }
}

async fn analytics_handler(
    State(state): State<Arc<AppState>>,
    Query(params): Query<AnalyticsParams>,
) -> ApiResult<AnalyticsSummary> {
    let time_range = TimeRange::parse_or_default(params.time_range.as_deref());
    let device_id = params.device_id.as_deref().filter(|id| !id.is_empty());
    match state.store.get_analytics_summary(device_id, time_range).await {
        Ok(summary) => Ok(Json(summary)),
        Err(e) => Err(store_failure(&state, "Failed to compute analytics", e)),
    }
}

/// Most recent alerts from the history ring.
async fn recent_alerts_handler(
    State(state): State<Arc<AppState>>,
    Query(params): Query<RecentParams>,
) -> Json<RecentAlertsResponse> {
    let alerts = state
        .history
        .recent(params.limit.unwrap_or(DEFAULT_RECENT_ALERTS));
    let count = alerts.len();
    Json(RecentAlertsResponse { alerts, count })
}

async fn alert_stats_handler(State(state): State<Arc<AppState>>) -> Json<HistoryStats> {
    Json(state.history.stats())
}

async fn realtime_stats_handler(State(state): State<Arc<AppState>>) -> Json<HubStats> {
    Json(state.hub.stats())
}
