//! Room naming and validation.
//!
//! Rooms are named multicast groups:
//! - `device-<id>` receives updates and emergencies for one device
//! - `fire-alerts` receives the emergency popup for opted-in clients

/// Room for clients that sent `subscribe-fire-alerts`.
pub const FIRE_ALERTS_ROOM: &str = "fire-alerts";

const DEVICE_ROOM_PREFIX: &str = "device-";

const MAX_DEVICE_ID_LEN: usize = 128;

/// Room name for a device.
pub fn device_room(device_id: &str) -> String {
    format!("{}{}", DEVICE_ROOM_PREFIX, device_id)
}

/// Device id of a device room, if it is one.
pub fn device_of_room(room: &str) -> Option<&str> {
    room.strip_prefix(DEVICE_ROOM_PREFIX).filter(|id| !id.is_empty())
}

/// Validate a device id sent by a client.
/// Returns an error message if invalid, None if valid.
pub fn validate_device_id(device_id: &str) -> Option<String> {
    if device_id.trim().is_empty() {
        return Some("Empty device id".to_string());
    }
    if device_id.len() > MAX_DEVICE_ID_LEN {
        return Some(format!(
            "Device id longer than {} characters",
            MAX_DEVICE_ID_LEN
        ));
    }
    if device_id.chars().any(|c| c.is_control() || c.is_whitespace()) {
        return Some("Device id contains whitespace or control characters".to_string());
    }
    None
}
