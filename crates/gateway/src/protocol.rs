//! WebSocket protocol message types.
//!
//! Every frame is JSON of the form `{"event": <name>, "data": <payload>}`
//! in both directions.

use alerts::{ProcessedAlert, Severity};
use chrono::{DateTime, Utc};
use sensor_store::SensorRecord;
use serde::{Deserialize, Serialize};

// ============================================================================
// Client → Server Messages
// ============================================================================

/// Message sent from client to server.
#[derive(Debug, Clone, PartialEq, Deserialize)]
#[serde(tag = "event", content = "data", rename_all = "kebab-case")]
pub enum ClientMessage {
    /// Join the room of one device.
    SubscribeDevice(String),
    /// Leave the room of one device.
    UnsubscribeDevice(String),
    /// Join the fire alerts room.
    SubscribeFireAlerts,
    /// Leave the fire alerts room.
    UnsubscribeFireAlerts,
    /// Ask for the most recent stored reading of a device.
    RequestLatest(String),
    /// Keepalive.
    Ping,
}

// ============================================================================
// Server → Client Messages
// ============================================================================

/// Message sent from server to client.
#[derive(Debug, Clone, Serialize)]
#[serde(tag = "event", content = "data", rename_all = "kebab-case")]
pub enum ServerMessage {
    /// Welcome sent right after the upgrade.
    Connected(ConnectedData),
    /// Emergency sent to every client.
    FireEmergency(EmergencyEnvelope),
    /// Emergency sent to the fire alerts room.
    EmergencyPopup(EmergencyEnvelope),
    /// Emergency sent to the device room.
    DeviceEmergency(EmergencyEnvelope),
    /// Routine reading sent to every client.
    NewData(SensorRecord),
    /// Routine reading sent to every client.
    DeviceUpdate(SensorRecord),
    /// Routine reading sent to the device room.
    DeviceDataUpdate(SensorRecord),
    /// Answer to `request-latest`.
    LatestData(LatestData),
    /// Confirmation of a room join.
    Subscribed(RoomAck),
    /// Confirmation of a room leave.
    Unsubscribed(RoomAck),
    /// Pong response to ping.
    Pong(PongData),
    /// Error message.
    Error(ErrorData),
}

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ConnectedData {
    pub message: String,
    pub connection_id: String,
    pub timestamp: DateTime<Utc>,
}

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct RoomAck {
    pub room: String,
    pub timestamp: DateTime<Utc>,
}

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct PongData {
    /// Milliseconds since the Unix epoch.
    pub timestamp: i64,
    pub server_time: DateTime<Utc>,
}

impl PongData {
    pub fn now() -> Self {
        let now = Utc::now();
        Self {
            timestamp: now.timestamp_millis(),
            server_time: now,
        }
    }
}

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct LatestData {
    pub device_id: String,
    /// `None` when the device has no stored readings.
    pub record: Option<SensorRecord>,
}

#[derive(Debug, Clone, Serialize)]
pub struct ErrorData {
    pub message: String,
    pub code: String,
}

// ============================================================================
// Emergency envelope
// ============================================================================

/// Discriminator carried in every emergency envelope.
pub const FIRE_EMERGENCY: &str = "FIRE_EMERGENCY";

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum Priority {
    High,
    Normal,
}

/// Presentation hints for clients rendering the alert.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct UiHints {
    pub show_popup: bool,
    pub auto_expire: bool,
    pub sound: bool,
    pub vibrate: bool,
    pub priority: Priority,
}

impl UiHints {
    pub fn for_severity(severity: Severity) -> Self {
        Self {
            show_popup: true,
            auto_expire: matches!(severity, Severity::Low | Severity::Moderate),
            sound: true,
            vibrate: true,
            priority: if matches!(severity, Severity::Critical | Severity::Extreme) {
                Priority::High
            } else {
                Priority::Normal
            },
        }
    }
}

/// Presentation-ready emergency broadcast.
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct EmergencyEnvelope {
    #[serde(rename = "type")]
    pub kind: &'static str,
    pub severity_tier: Severity,
    pub title: String,
    pub message: String,
    pub data: ProcessedAlert,
    pub ui_hints: UiHints,
    pub emitted_at: DateTime<Utc>,
}

impl EmergencyEnvelope {
    pub fn from_alert(alert: &ProcessedAlert) -> Self {
        let a = &alert.assessment;
        Self {
            kind: FIRE_EMERGENCY,
            severity_tier: a.severity,
            title: format!("Fire emergency: {}", a.severity),
            message: format!(
                "Fire emergency detected at device {}: temperature {:.1}°C, humidity {:.1}%, smoke level {:.0}",
                a.device_id, a.temperature, a.humidity, a.smoke_level
            ),
            data: alert.clone(),
            ui_hints: UiHints::for_severity(a.severity),
            emitted_at: Utc::now(),
        }
    }
}
