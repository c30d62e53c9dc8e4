//! Webhook routes for push-notification deliveries and manual test alerts.

use crate::ingress::{DeliveryHeaders, PipelineOutcome};
use crate::ws_server::AppState;
use alerts::ProcessedAlert;
use axum::{
    body::Bytes,
    extract::State,
    http::{HeaderMap, StatusCode},
    response::{IntoResponse, Json, Response},
    routing::{get, post},
    Router,
};
use metrics::counter;
use sensor_store::SensorRecord;
use serde::Serialize;
use serde_json::{json, Value};
use std::sync::Arc;
use tracing::{error, info};

/// Webhook routes.
pub fn routes() -> Router<Arc<AppState>> {
    Router::new()
        .route("/sns/webhook", post(webhook_handler))
        .route("/webhook/fire-alert", post(webhook_handler))
        .route("/sns/test", get(test_alert_handler).post(test_alert_handler))
}

#[derive(Serialize)]
struct FailureResponse {
    success: bool,
    error: String,
}

#[derive(Serialize)]
struct TestAlertResponse {
    success: bool,
    message: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    alert: Option<ProcessedAlert>,
    #[serde(skip_serializing_if = "Option::is_none")]
    record: Option<SensorRecord>,
}

/// Payload used when `/sns/test` is called without a body.
pub fn sample_emergency_payload() -> Value {
    json!({
        "device": "TEST-NODE",
        "is_emergency": true,
        "temperature": 58.0,
        "humidity": 18.0,
        "smoke_level": 350.0,
        "air_quality": 180.0,
        "location": {"lat": 36.8065, "lng": 10.1815}
    })
}

/// Accept one delivery. Any parseable envelope is acknowledged.
async fn webhook_handler(
    State(state): State<Arc<AppState>>,
    headers: HeaderMap,
    body: Bytes,
) -> Response {
    let headers = DeliveryHeaders::from_header_map(&headers);
    match state.ingress.handle_delivery(&headers, &body) {
        Ok(ack) => (StatusCode::OK, Json(ack)).into_response(),
        Err(e) => {
            error!("Rejected webhook delivery ({} bytes): {}", body.len(), e);
            counter!("gateway_webhook_failures_total").increment(1);
            (
                StatusCode::INTERNAL_SERVER_ERROR,
                Json(FailureResponse {
                    success: false,
                    error: e.to_string(),
                }),
            )
                .into_response()
        }
    }
}

/// Run a payload through the pipeline, bypassing the subject filter.
async fn test_alert_handler(State(state): State<Arc<AppState>>, body: Bytes) -> Response {
    let payload = if body.iter().all(u8::is_ascii_whitespace) {
        sample_emergency_payload()
    } else {
        match serde_json::from_slice::<Value>(&body) {
            Ok(payload) => payload,
            Err(e) => {
                return (
                    StatusCode::BAD_REQUEST,
                    Json(FailureResponse {
                        success: false,
                        error: format!("Invalid JSON payload: {}", e),
                    }),
                )
                    .into_response()
            }
        }
    };

    info!("Processing test alert");
    let response = match state.ingress.process_payload(&payload) {
        PipelineOutcome::Emergency(alert) => TestAlertResponse {
            success: true,
            message: format!("Test emergency {} broadcast", alert.id),
            alert: Some(alert),
            record: None,
        },
        PipelineOutcome::Routine(record) => TestAlertResponse {
            success: true,
            message: "Test reading broadcast, no emergency".to_string(),
            alert: None,
            record: Some(record),
        },
    };
    (StatusCode::OK, Json(response)).into_response()
}
