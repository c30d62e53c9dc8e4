//! Per-connection state.

use crate::error::{GatewayError, Result};
use crate::protocol::ServerMessage;
use axum::extract::ws::Message;
use chrono::Utc;
use dashmap::DashSet;
use std::sync::atomic::{AtomicI64, Ordering};
use tokio::sync::mpsc;
use uuid::Uuid;

/// Unique client identifier.
pub type ClientId = Uuid;

/// Outbound frames a connection may have queued before broadcasts to it
/// start being dropped.
pub const CLIENT_CHANNEL_BUFFER_SIZE: usize = 256;

/// One live WebSocket connection as the hub sees it.
pub struct ClientState {
    /// Also the `connectionId` sent in the welcome frame.
    pub id: ClientId,
    /// Feeds the connection's writer task.
    pub tx: mpsc::Sender<Message>,
    /// Mirror of the hub's room index, used to leave every room on disconnect.
    pub rooms: DashSet<String>,
    /// Epoch milliseconds.
    pub connected_at: i64,
    /// Epoch milliseconds of the last inbound frame of any kind.
    pub last_seen: AtomicI64,
}

impl ClientState {
    pub fn new(tx: mpsc::Sender<Message>) -> Self {
        let now = Utc::now().timestamp_millis();
        Self {
            id: Uuid::new_v4(),
            tx,
            rooms: DashSet::new(),
            connected_at: now,
            last_seen: AtomicI64::new(now),
        }
    }

    /// Serialize and queue one frame. `ChannelSend` when the queue is full
    /// or the writer is gone.
    pub fn send(&self, msg: &ServerMessage) -> Result<()> {
        let json = serde_json::to_string(msg)?;
        if self.try_send_text(json) {
            Ok(())
        } else {
            Err(GatewayError::ChannelSend)
        }
    }

    /// Queue a pre-serialized frame. Returns false if the client is slow or gone.
    pub fn try_send_text(&self, json: String) -> bool {
        self.tx.try_send(Message::Text(json.into())).is_ok()
    }

    pub fn touch(&self) {
        self.last_seen
            .store(Utc::now().timestamp_millis(), Ordering::Relaxed);
    }

    /// Milliseconds since the last inbound frame.
    pub fn idle_ms(&self) -> i64 {
        Utc::now().timestamp_millis() - self.last_seen.load(Ordering::Relaxed)
    }

    pub fn is_in_room(&self, room: &str) -> bool {
        self.rooms.contains(room)
    }
}
