//! Real-time hub: live connections, room membership and multicast.
//!
//! Membership is kept in two lock-free indexes: client → rooms (on the
//! client state) and room → clients. Every broadcast serializes its frame
//! once and queues it on each target's bounded channel; delivery is
//! fire-and-forget and a full queue only drops the frame for that client.

use crate::client::{ClientId, ClientState};
use crate::error::{GatewayError, Result};
use crate::protocol::{ConnectedData, EmergencyEnvelope, RoomAck, ServerMessage};
use crate::subscription::{device_room, FIRE_ALERTS_ROOM};
use alerts::ProcessedAlert;
use axum::extract::ws::Message;
use chrono::Utc;
use dashmap::{DashMap, DashSet};
use metrics::counter;
use sensor_store::SensorRecord;
use serde::Serialize;
use std::sync::Arc;
use tokio::sync::mpsc;
use tracing::{debug, info, warn};

/// Snapshot of hub state.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct HubStats {
    pub connected_clients: usize,
    /// Rooms with at least one member, sorted.
    pub rooms: Vec<String>,
}

/// Registry of connected clients and the rooms they joined.
pub struct RealtimeHub {
    /// Client ID → Client State.
    clients: DashMap<ClientId, Arc<ClientState>>,
    /// Room name → Client IDs.
    rooms: DashMap<String, DashSet<ClientId>>,
}

impl RealtimeHub {
    pub fn new() -> Self {
        Self {
            clients: DashMap::new(),
            rooms: DashMap::new(),
        }
    }

    /// Register a new connection and send it the welcome frame.
    pub fn connect(&self, tx: mpsc::Sender<Message>) -> Arc<ClientState> {
        let client = Arc::new(ClientState::new(tx));
        self.clients.insert(client.id, client.clone());

        let welcome = ServerMessage::Connected(ConnectedData {
            message: "Connected to fire alert gateway".to_string(),
            connection_id: client.id.to_string(),
            timestamp: Utc::now(),
        });
        if let Err(e) = client.send(&welcome) {
            warn!("Failed to send welcome to {}: {}", client.id, e);
        }

        info!("Client {} connected", client.id);
        client
    }

    /// Remove a connection; it implicitly leaves every room.
    pub fn disconnect(&self, client_id: &ClientId) {
        if let Some((_, client)) = self.clients.remove(client_id) {
            let rooms: Vec<String> = client.rooms.iter().map(|r| r.clone()).collect();
            for room in rooms {
                self.remove_member(&room, client_id);
            }
            let seconds = (Utc::now().timestamp_millis() - client.connected_at) / 1000;
            info!("Client {} disconnected after {}s", client_id, seconds);
        }
    }

    pub fn get(&self, client_id: &ClientId) -> Option<Arc<ClientState>> {
        self.clients.get(client_id).map(|c| c.clone())
    }

    /// Add a client to a room and confirm to that client only.
    pub fn join(&self, client_id: &ClientId, room: &str) -> Result<()> {
        let client = self
            .get(client_id)
            .ok_or_else(|| GatewayError::ClientNotFound(client_id.to_string()))?;

        client.rooms.insert(room.to_string());
        self.rooms
            .entry(room.to_string())
            .or_default()
            .insert(*client_id);

        debug!("Client {} joined {}", client_id, room);
        client.send(&ServerMessage::Subscribed(RoomAck {
            room: room.to_string(),
            timestamp: Utc::now(),
        }))
    }

    /// Remove a client from a room and confirm to that client only.
    pub fn leave(&self, client_id: &ClientId, room: &str) -> Result<()> {
        let client = self
            .get(client_id)
            .ok_or_else(|| GatewayError::ClientNotFound(client_id.to_string()))?;

        client.rooms.remove(room);
        self.remove_member(room, client_id);

        debug!("Client {} left {}", client_id, room);
        client.send(&ServerMessage::Unsubscribed(RoomAck {
            room: room.to_string(),
            timestamp: Utc::now(),
        }))
    }

    fn remove_member(&self, room: &str, client_id: &ClientId) {
        if let Some(members) = self.rooms.get(room) {
            members.remove(client_id);
        }
        self.rooms.remove_if(room, |_, members| members.is_empty());
    }

    /// Broadcast an emergency: every client first, then the device room,
    /// then the fire alerts room.
    pub fn broadcast_emergency(&self, alert: &ProcessedAlert) {
        let envelope = EmergencyEnvelope::from_alert(alert);
        let room = device_room(&alert.assessment.device_id);

        let all = self.emit_all(&ServerMessage::FireEmergency(envelope.clone()));
        let device = self.emit_room(&room, &ServerMessage::DeviceEmergency(envelope.clone()));
        let opted_in = self.emit_room(FIRE_ALERTS_ROOM, &ServerMessage::EmergencyPopup(envelope));

        counter!("gateway_emergencies_broadcast_total").increment(1);
        info!(
            "Broadcast {} emergency for {} ({} clients, {} in {}, {} in {})",
            alert.assessment.severity,
            alert.assessment.device_id,
            all,
            device,
            room,
            opted_in,
            FIRE_ALERTS_ROOM
        );
    }

    /// Broadcast a routine reading to every client and the device room.
    pub fn broadcast_data_update(&self, record: &SensorRecord) {
        let room = device_room(&record.device_id);

        self.emit_all(&ServerMessage::NewData(record.clone()));
        self.emit_all(&ServerMessage::DeviceUpdate(record.clone()));
        let device = self.emit_room(&room, &ServerMessage::DeviceDataUpdate(record.clone()));

        counter!("gateway_data_updates_broadcast_total").increment(1);
        debug!(
            "Broadcast data update for {} ({} in {})",
            record.device_id, device, room
        );
    }

    /// Send to every connected client. Returns how many frames were queued.
    pub fn emit_all(&self, msg: &ServerMessage) -> usize {
        let targets: Vec<Arc<ClientState>> = self.clients.iter().map(|c| c.clone()).collect();
        Self::deliver(msg, targets)
    }

    /// Send to the current members of a room. Returns how many frames were queued.
    pub fn emit_room(&self, room: &str, msg: &ServerMessage) -> usize {
        let member_ids: Vec<ClientId> = match self.rooms.get(room) {
            Some(members) => members.iter().map(|id| *id).collect(),
            None => return 0,
        };
        let targets: Vec<Arc<ClientState>> = member_ids
            .iter()
            .filter_map(|id| self.get(id))
            .collect();
        Self::deliver(msg, targets)
    }

    fn deliver(msg: &ServerMessage, targets: Vec<Arc<ClientState>>) -> usize {
        if targets.is_empty() {
            return 0;
        }

        // Pre-serialize the message once
        let json = match serde_json::to_string(msg) {
            Ok(j) => j,
            Err(e) => {
                warn!("Failed to serialize broadcast message: {}", e);
                return 0;
            }
        };

        let mut delivered = 0;
        for client in targets {
            if client.try_send_text(json.clone()) {
                delivered += 1;
            } else {
                debug!("Dropped frame for slow or closed client {}", client.id);
                counter!("gateway_frames_dropped_total").increment(1);
            }
        }
        delivered
    }

    pub fn client_count(&self) -> usize {
        self.clients.len()
    }

    pub fn is_member(&self, client_id: &ClientId, room: &str) -> bool {
        self.rooms
            .get(room)
            .is_some_and(|members| members.contains(client_id))
    }

    pub fn stats(&self) -> HubStats {
        let mut rooms: Vec<String> = self
            .rooms
            .iter()
            .filter(|entry| !entry.value().is_empty())
            .map(|entry| entry.key().clone())
            .collect();
        rooms.sort();
        HubStats {
            connected_clients: self.clients.len(),
            rooms,
        }
    }
}

impl Default for RealtimeHub {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use alerts::assess;
    use serde_json::{json, Value};

    fn connect(hub: &RealtimeHub) -> (Arc<ClientState>, mpsc::Receiver<Message>) {
        let (tx, rx) = mpsc::channel(64);
        let client = hub.connect(tx);
        (client, rx)
    }

    /// Drain queued frames as (event, data) pairs.
    fn drain(rx: &mut mpsc::Receiver<Message>) -> Vec<(String, Value)> {
        let mut frames = Vec::new();
        while let Ok(Message::Text(text)) = rx.try_recv() {
            let v: Value = serde_json::from_str(text.as_str()).unwrap();
            frames.push((v["event"].as_str().unwrap().to_string(), v["data"].clone()));
        }
        frames
    }

    fn events(rx: &mut mpsc::Receiver<Message>) -> Vec<String> {
        drain(rx).into_iter().map(|(e, _)| e).collect()
    }

    fn fire_alert(device: &str) -> ProcessedAlert {
        ProcessedAlert::new(assess(&json!({
            "deviceId": device, "temperature": 90, "humidity": 10, "smoke_level": 500
        })))
    }

    fn record(device: &str) -> SensorRecord {
        SensorRecord {
            device_id: device.to_string(),
            timestamp: 1,
            temperature: 21.0,
            humidity: 55.0,
            smoke_level: 0.0,
            air_quality: 30.0,
            is_emergency: false,
            location: None,
        }
    }

    #[test]
    fn test_welcome_on_connect() {
        let hub = RealtimeHub::new();
        let (client, mut rx) = connect(&hub);
        let frames = drain(&mut rx);
        assert_eq!(frames.len(), 1);
        assert_eq!(frames[0].0, "connected");
        assert_eq!(frames[0].1["connectionId"], client.id.to_string());
        assert_eq!(hub.client_count(), 1);
    }

    #[test]
    fn test_join_confirms_only_to_joiner() {
        let hub = RealtimeHub::new();
        let (a, mut rx_a) = connect(&hub);
        let (_b, mut rx_b) = connect(&hub);
        drain(&mut rx_a);
        drain(&mut rx_b);

        hub.join(&a.id, "device-Node-1").unwrap();
        let frames = drain(&mut rx_a);
        assert_eq!(frames[0].0, "subscribed");
        assert_eq!(frames[0].1["room"], "device-Node-1");
        assert!(drain(&mut rx_b).is_empty());
        assert!(hub.is_member(&a.id, "device-Node-1"));
        assert!(a.is_in_room("device-Node-1"));
    }

    #[test]
    fn test_join_unknown_client() {
        let hub = RealtimeHub::new();
        let err = hub.join(&uuid::Uuid::new_v4(), "device-x").unwrap_err();
        assert!(matches!(err, GatewayError::ClientNotFound(_)));
    }

    #[test]
    fn test_room_broadcast_reaches_members_only() {
        let hub = RealtimeHub::new();
        let (joined, mut rx_joined) = connect(&hub);
        let (_other, mut rx_other) = connect(&hub);
        hub.join(&joined.id, &device_room("Node-1")).unwrap();
        drain(&mut rx_joined);
        drain(&mut rx_other);

        hub.broadcast_emergency(&fire_alert("Node-1"));

        assert_eq!(
            events(&mut rx_joined),
            vec!["fire-emergency", "device-emergency"]
        );
        assert_eq!(events(&mut rx_other), vec!["fire-emergency"]);
    }

    #[test]
    fn test_fire_alerts_room_gets_popup_last() {
        let hub = RealtimeHub::new();
        let (client, mut rx) = connect(&hub);
        hub.join(&client.id, &device_room("Node-1")).unwrap();
        hub.join(&client.id, FIRE_ALERTS_ROOM).unwrap();
        drain(&mut rx);

        hub.broadcast_emergency(&fire_alert("Node-1"));
        assert_eq!(
            events(&mut rx),
            vec!["fire-emergency", "device-emergency", "emergency-popup"]
        );
    }

    #[test]
    fn test_left_room_not_delivered() {
        let hub = RealtimeHub::new();
        let (client, mut rx) = connect(&hub);
        hub.join(&client.id, &device_room("Node-1")).unwrap();
        hub.leave(&client.id, &device_room("Node-1")).unwrap();
        let acks = events(&mut rx);
        assert_eq!(acks, vec!["connected", "subscribed", "unsubscribed"]);

        hub.broadcast_emergency(&fire_alert("Node-1"));
        assert_eq!(events(&mut rx), vec!["fire-emergency"]);
        assert!(hub.stats().rooms.is_empty());
    }

    #[test]
    fn test_data_update_fan_out() {
        let hub = RealtimeHub::new();
        let (joined, mut rx_joined) = connect(&hub);
        let (_other, mut rx_other) = connect(&hub);
        hub.join(&joined.id, &device_room("Node-2")).unwrap();
        drain(&mut rx_joined);
        drain(&mut rx_other);

        hub.broadcast_data_update(&record("Node-2"));
        assert_eq!(
            events(&mut rx_joined),
            vec!["new-data", "device-update", "device-data-update"]
        );
        assert_eq!(events(&mut rx_other), vec!["new-data", "device-update"]);
    }

    #[test]
    fn test_disconnect_leaves_all_rooms() {
        let hub = RealtimeHub::new();
        let (client, _rx) = connect(&hub);
        let (stayer, _rx2) = connect(&hub);
        hub.join(&client.id, &device_room("a")).unwrap();
        hub.join(&client.id, FIRE_ALERTS_ROOM).unwrap();
        hub.join(&stayer.id, FIRE_ALERTS_ROOM).unwrap();

        hub.disconnect(&client.id);

        let stats = hub.stats();
        assert_eq!(stats.connected_clients, 1);
        assert_eq!(stats.rooms, vec![FIRE_ALERTS_ROOM.to_string()]);
        assert!(!hub.is_member(&client.id, FIRE_ALERTS_ROOM));
    }

    #[test]
    fn test_slow_client_does_not_block_others() {
        let hub = RealtimeHub::new();
        let (tx_slow, _rx_slow) = mpsc::channel(1);
        let _slow = hub.connect(tx_slow); // welcome fills its buffer
        let (_fast, mut rx_fast) = connect(&hub);
        drain(&mut rx_fast);

        let delivered = hub.emit_all(&ServerMessage::NewData(record("x")));
        assert_eq!(delivered, 1);
        assert_eq!(events(&mut rx_fast), vec!["new-data"]);
    }

    #[test]
    fn test_broadcast_with_no_clients() {
        let hub = RealtimeHub::new();
        hub.broadcast_emergency(&fire_alert("nobody"));
        assert_eq!(hub.stats().connected_clients, 0);
    }
}
