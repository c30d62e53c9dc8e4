//! Ordered field probing for heterogeneous sensor payloads.
//!
//! Upstream producers disagree on naming and nesting (`device` vs
//! `deviceId`, `emergency` vs `is_emergency`, `gps` vs `location`, fields
//! at the top level or under `payload`). Each logical field is described
//! by an ordered list of [`FieldSource`]s; probing returns the first one
//! that is present.

use chrono::{DateTime, TimeZone, Utc};
use serde_json::Value;

/// Key under which some producers nest the reading.
pub const NESTED_KEY: &str = "payload";

/// One place a logical field may live.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FieldSource {
    /// `raw.<key>`
    Top(&'static str),
    /// `raw.payload.<key>`
    Nested(&'static str),
}

impl FieldSource {
    /// Resolve this source against a payload. `null` counts as absent.
    pub fn resolve<'a>(&self, raw: &'a Value) -> Option<&'a Value> {
        let found = match self {
            FieldSource::Top(key) => raw.get(key),
            FieldSource::Nested(key) => raw.get(NESTED_KEY).and_then(|p| p.get(key)),
        };
        found.filter(|v| !v.is_null())
    }
}

/// Probe order: direct key, synonyms, nested direct key, nested synonyms.
pub type FieldSpec = &'static [FieldSource];

use FieldSource::{Nested, Top};

pub const DEVICE_ID: FieldSpec = &[
    Top("deviceId"),
    Top("device"),
    Top("device_id"),
    Nested("deviceId"),
    Nested("device"),
    Nested("device_id"),
];

pub const EMERGENCY_FLAG: FieldSpec = &[
    Top("is_emergency"),
    Top("emergency"),
    Top("isEmergency"),
    Nested("is_emergency"),
    Nested("emergency"),
    Nested("isEmergency"),
];

pub const TEMPERATURE: FieldSpec = &[
    Top("temperature"),
    Top("temp"),
    Nested("temperature"),
    Nested("temp"),
];

pub const HUMIDITY: FieldSpec = &[
    Top("humidity"),
    Top("hum"),
    Nested("humidity"),
    Nested("hum"),
];

pub const SMOKE_LEVEL: FieldSpec = &[
    Top("smoke_level"),
    Top("smokeLevel"),
    Top("smoke"),
    Nested("smoke_level"),
    Nested("smokeLevel"),
    Nested("smoke"),
];

pub const AIR_QUALITY: FieldSpec = &[
    Top("air_quality"),
    Top("airQuality"),
    Top("aqi"),
    Nested("air_quality"),
    Nested("airQuality"),
    Nested("aqi"),
];

pub const LOCATION: FieldSpec = &[
    Top("location"),
    Top("gps"),
    Nested("location"),
    Nested("gps"),
];

pub const OBSERVED_AT: FieldSpec = &[
    Top("timestamp"),
    Top("observedAt"),
    Nested("timestamp"),
    Nested("observedAt"),
];

const LATITUDE_KEYS: &[&str] = &["latitude", "lat"];
const LONGITUDE_KEYS: &[&str] = &["longitude", "lon", "lng"];

/// First present value for a field.
pub fn probe<'a>(raw: &'a Value, spec: FieldSpec) -> Option<&'a Value> {
    spec.iter().find_map(|source| source.resolve(raw))
}

/// First present value, coerced to a finite number.
pub fn probe_number(raw: &Value, spec: FieldSpec) -> Option<f64> {
    probe(raw, spec).and_then(as_number)
}

/// First present value, as a non-empty string.
pub fn probe_string(raw: &Value, spec: FieldSpec) -> Option<String> {
    match probe(raw, spec)? {
        Value::String(s) if !s.trim().is_empty() => Some(s.trim().to_string()),
        Value::Number(n) => Some(n.to_string()),
        _ => None,
    }
}

/// True if any source of the field holds a truthy value.
pub fn any_truthy(raw: &Value, spec: FieldSpec) -> bool {
    spec.iter()
        .filter_map(|source| source.resolve(raw))
        .any(is_truthy)
}

/// Latitude/longitude pair from the first source that carries one.
/// `None` when no source has either coordinate.
pub fn probe_location(raw: &Value) -> Option<(f64, f64)> {
    LOCATION
        .iter()
        .filter_map(|source| source.resolve(raw))
        .find_map(coordinates)
}

fn coordinates(obj: &Value) -> Option<(f64, f64)> {
    let lat = LATITUDE_KEYS
        .iter()
        .find_map(|k| obj.get(k).and_then(as_number));
    let lon = LONGITUDE_KEYS
        .iter()
        .find_map(|k| obj.get(k).and_then(as_number));
    match (lat, lon) {
        (None, None) => None,
        (lat, lon) => Some((lat.unwrap_or(0.0), lon.unwrap_or(0.0))),
    }
}

/// Observation time from an RFC 3339 string or an epoch number
/// (milliseconds when large enough, seconds otherwise).
pub fn probe_timestamp(raw: &Value) -> Option<DateTime<Utc>> {
    match probe(raw, OBSERVED_AT)? {
        Value::String(s) => DateTime::parse_from_rfc3339(s.trim())
            .map(|dt| dt.with_timezone(&Utc))
            .ok()
            .or_else(|| s.trim().parse::<f64>().ok().and_then(epoch_to_datetime)),
        Value::Number(n) => n.as_f64().and_then(epoch_to_datetime),
        _ => None,
    }
}

fn epoch_to_datetime(value: f64) -> Option<DateTime<Utc>> {
    if !value.is_finite() || value < 0.0 {
        return None;
    }
    // 1e11 seconds is past the year 5000, so anything larger is milliseconds.
    let millis = if value >= 1e11 { value } else { value * 1000.0 };
    Utc.timestamp_millis_opt(millis as i64).single()
}

fn as_number(value: &Value) -> Option<f64> {
    let n = match value {
        Value::Number(n) => n.as_f64(),
        Value::String(s) => s.trim().parse::<f64>().ok(),
        _ => None,
    }?;
    n.is_finite().then_some(n)
}

fn is_truthy(value: &Value) -> bool {
    match value {
        Value::Bool(b) => *b,
        Value::Number(n) => n.as_f64().is_some_and(|f| f != 0.0),
        Value::String(s) => matches!(
            s.trim().to_ascii_lowercase().as_str(),
            "true" | "1" | "yes"
        ),
        _ => false,
    }
}
