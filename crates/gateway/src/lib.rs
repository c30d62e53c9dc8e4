//! Gateway service relaying sensor readings and fire emergency alerts.
//!
//! This service:
//! - Accepts push-notification webhook deliveries and completes the
//!   subscription handshake
//! - Classifies sensor payloads and records emergencies in a bounded history
//! - Streams emergencies and routine readings to WebSocket clients in rooms
//! - Serves read endpoints over the sensor store
//!
//! ## Architecture
//!
//! ```text
//! POST /sns/webhook
//!         ↓
//! NotificationIngress (envelope → classifier)
//!         ↓                    ↓
//! AlertHistory          RealtimeHub (DashMap-based rooms)
//!                              ↓
//!                      WebSocket clients
//! ```

pub mod api;
pub mod client;
pub mod client_kind;
pub mod config;
pub mod envelope;
pub mod error;
pub mod handshake;
pub mod hub;
pub mod ingress;
pub mod protocol;
pub mod subscription;
pub mod webhook;
pub mod ws_server;

pub use client::{ClientId, ClientState};
pub use client_kind::ClientKind;
pub use config::{GatewayConfig, StoreBackend};
pub use envelope::{Envelope, MessageKind};
pub use error::{GatewayError, Result};
pub use handshake::SubscriptionConfirmer;
pub use hub::{HubStats, RealtimeHub};
pub use ingress::{Ack, DeliveryHeaders, IngressConfig, NotificationIngress, PipelineOutcome};
pub use protocol::{ClientMessage, EmergencyEnvelope, ServerMessage};
pub use ws_server::{create_router, AppState};
