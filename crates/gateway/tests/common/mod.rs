#![allow(dead_code)]

use axum::body::Body;
use axum::http::{header, Request, Response};
use chrono::Utc;
use gateway::{AppState, GatewayConfig};
use sensor_store::{GeoPoint, SensorRecord, SharedStore};
use serde_json::Value;
use std::sync::Arc;
use std::time::Duration;

pub fn test_config() -> GatewayConfig {
    GatewayConfig {
        confirmation_timeout: Duration::from_secs(2),
        ..Default::default()
    }
}

pub fn test_state(store: SharedStore) -> Arc<AppState> {
    test_state_with(test_config(), store)
}

pub fn test_state_with(config: GatewayConfig, store: SharedStore) -> Arc<AppState> {
    Arc::new(AppState::new(&config, store).unwrap())
}

pub async fn body_json(resp: Response<Body>) -> Value {
    let body = axum::body::to_bytes(resp.into_body(), usize::MAX)
        .await
        .unwrap();
    serde_json::from_slice(&body).unwrap()
}

pub fn get(uri: &str) -> Request<Body> {
    Request::builder().uri(uri).body(Body::empty()).unwrap()
}

pub fn post(uri: &str, message_type: Option<&str>, body: impl Into<Body>) -> Request<Body> {
    let mut builder = Request::builder()
        .method("POST")
        .uri(uri)
        .header(header::CONTENT_TYPE, "text/plain; charset=UTF-8");
    if let Some(kind) = message_type {
        builder = builder.header("x-amz-sns-message-type", kind);
    }
    builder.body(body.into()).unwrap()
}

/// Notification envelope carrying `payload` as its JSON-encoded message.
pub fn notification(message_id: &str, subject: &str, payload: &Value) -> String {
    serde_json::json!({
        "Type": "Notification",
        "MessageId": message_id,
        "TopicArn": "arn:aws:sns:eu-west-1:123456789012:fire-alerts",
        "Subject": subject,
        "Message": payload.to_string(),
        "Timestamp": Utc::now().to_rfc3339(),
    })
    .to_string()
}

/// Reading of an extreme fire: scores 3 + 3 + 3 + 1.
pub fn fire_payload(device: &str) -> Value {
    serde_json::json!({
        "device": device,
        "temperature": 65.0,
        "humidity": 15.0,
        "smoke_level": 350.0,
        "air_quality": 200.0,
    })
}

/// Comfortable indoor reading: scores 0.
pub fn calm_payload(device: &str) -> Value {
    serde_json::json!({
        "device": device,
        "temperature": 22.0,
        "humidity": 55.0,
        "smoke_level": 10.0,
        "air_quality": 40.0,
    })
}

pub fn record(device_id: &str, timestamp: i64, temperature: f64) -> SensorRecord {
    SensorRecord {
        device_id: device_id.to_string(),
        timestamp,
        temperature,
        humidity: 50.0,
        smoke_level: 12.0,
        air_quality: 35.0,
        is_emergency: false,
        location: Some(GeoPoint {
            latitude: 36.8065,
            longitude: 10.1815,
        }),
    }
}
