//! Gateway error types.

use thiserror::Error;

/// Gateway error type.
#[derive(Debug, Error)]
pub enum GatewayError {
    /// JSON serialization/deserialization error.
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    /// Outbound HTTP error.
    #[error("HTTP error: {0}")]
    Http(#[from] reqwest::Error),

    /// Sensor store error.
    #[error("Store error: {0}")]
    Store(#[from] sensor_store::Error),

    /// Webhook body is not a recognizable envelope.
    #[error("Malformed envelope: {0}")]
    MalformedEnvelope(String),

    /// Client not found.
    #[error("Client not found: {0}")]
    ClientNotFound(String),

    /// Invalid room or device id.
    #[error("Invalid room: {0}")]
    InvalidRoom(String),

    /// Channel send error.
    #[error("Channel send error")]
    ChannelSend,
}

/// Result type for gateway operations.
pub type Result<T> = std::result::Result<T, GatewayError>;
