//! Gateway configuration from environment variables.

use crate::client::CLIENT_CHANNEL_BUFFER_SIZE;
use crate::handshake::DEFAULT_CONFIRMATION_TIMEOUT;
use crate::ingress::DEFAULT_EMERGENCY_KEYWORD;
use alerts::{Location, DEFAULT_FALLBACK_LOCATION, DEFAULT_HISTORY_CAPACITY};
use std::str::FromStr;
use std::time::Duration;
use tracing::{info, warn};

/// Which sensor store backs the read endpoints.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StoreBackend {
    Redis,
    Memory,
}

impl FromStr for StoreBackend {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "redis" => Ok(StoreBackend::Redis),
            "memory" => Ok(StoreBackend::Memory),
            other => Err(format!("unknown store backend: {}", other)),
        }
    }
}

#[derive(Debug, Clone)]
pub struct GatewayConfig {
    pub http_port: u16,
    pub metrics_port: u16,
    pub redis_url: String,
    pub store_backend: StoreBackend,
    pub emergency_keyword: String,
    pub fallback_location: Location,
    pub history_capacity: usize,
    pub confirmation_timeout: Duration,
    pub client_channel_buffer: usize,
    /// Include internal error text in HTTP error bodies.
    pub debug_errors: bool,
}

impl Default for GatewayConfig {
    fn default() -> Self {
        Self {
            http_port: 3000,
            metrics_port: 9093,
            redis_url: "redis://localhost:6379".to_string(),
            store_backend: StoreBackend::Redis,
            emergency_keyword: DEFAULT_EMERGENCY_KEYWORD.to_string(),
            fallback_location: DEFAULT_FALLBACK_LOCATION,
            history_capacity: DEFAULT_HISTORY_CAPACITY,
            confirmation_timeout: DEFAULT_CONFIRMATION_TIMEOUT,
            client_channel_buffer: CLIENT_CHANNEL_BUFFER_SIZE,
            debug_errors: false,
        }
    }
}

impl GatewayConfig {
    /// Read configuration from the process environment.
    pub fn from_env() -> Self {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    /// Read configuration through a lookup function; unset or unparseable
    /// values keep their defaults.
    pub fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Self {
        let d = Self::default();
        let keyword = lookup("EMERGENCY_KEYWORD")
            .map(|k| k.trim().to_string())
            .filter(|k| !k.is_empty())
            .unwrap_or(d.emergency_keyword);

        Self {
            http_port: parse_or(&lookup, "HTTP_PORT", d.http_port),
            metrics_port: parse_or(&lookup, "METRICS_PORT", d.metrics_port),
            redis_url: lookup("REDIS_URL").unwrap_or(d.redis_url),
            store_backend: parse_or(&lookup, "STORE_BACKEND", d.store_backend),
            emergency_keyword: keyword,
            fallback_location: Location {
                latitude: parse_or(&lookup, "FALLBACK_LATITUDE", d.fallback_location.latitude),
                longitude: parse_or(&lookup, "FALLBACK_LONGITUDE", d.fallback_location.longitude),
            },
            history_capacity: parse_or(&lookup, "ALERT_HISTORY_CAPACITY", d.history_capacity).max(1),
            confirmation_timeout: Duration::from_secs(parse_or(
                &lookup,
                "CONFIRMATION_TIMEOUT_SECS",
                d.confirmation_timeout.as_secs(),
            )),
            client_channel_buffer: parse_or(&lookup, "CLIENT_CHANNEL_BUFFER", d.client_channel_buffer)
                .max(1),
            debug_errors: parse_or(&lookup, "DEBUG_ERRORS", d.debug_errors),
        }
    }

    pub fn log_summary(&self) {
        info!("Configuration:");
        info!("  HTTP_PORT: {}", self.http_port);
        info!("  METRICS_PORT: {}", self.metrics_port);
        info!("  STORE_BACKEND: {:?}", self.store_backend);
        info!("  REDIS_URL: {}", self.redis_url);
        info!("  EMERGENCY_KEYWORD: {}", self.emergency_keyword);
        info!(
            "  FALLBACK_LOCATION: {}, {}",
            self.fallback_location.latitude, self.fallback_location.longitude
        );
        info!("  ALERT_HISTORY_CAPACITY: {}", self.history_capacity);
        info!(
            "  CONFIRMATION_TIMEOUT_SECS: {}",
            self.confirmation_timeout.as_secs()
        );
        info!("  DEBUG_ERRORS: {}", self.debug_errors);
    }
}

fn parse_or<T: FromStr>(lookup: &impl Fn(&str) -> Option<String>, key: &str, default: T) -> T {
    match lookup(key) {
        Some(raw) => match raw.trim().parse() {
            Ok(value) => value,
            Err(_) => {
                warn!("Ignoring invalid {}={:?}, using default", key, raw);
                default
            }
        },
        None => default,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;

    fn config(pairs: &[(&str, &str)]) -> GatewayConfig {
        let env: HashMap<String, String> = pairs
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect();
        GatewayConfig::from_lookup(|key| env.get(key).cloned())
    }

    #[test]
    fn test_defaults() {
        let c = config(&[]);
        assert_eq!(c.http_port, 3000);
        assert_eq!(c.emergency_keyword, "fire");
        assert_eq!(c.history_capacity, 100);
        assert_eq!(c.confirmation_timeout, Duration::from_secs(10));
        assert_eq!(c.store_backend, StoreBackend::Redis);
        assert!(!c.debug_errors);
    }

    #[test]
    fn test_overrides() {
        let c = config(&[
            ("HTTP_PORT", "8080"),
            ("EMERGENCY_KEYWORD", "smoke"),
            ("FALLBACK_LATITUDE", "1.5"),
            ("FALLBACK_LONGITUDE", "-2.5"),
            ("ALERT_HISTORY_CAPACITY", "5"),
            ("STORE_BACKEND", "Memory"),
            ("DEBUG_ERRORS", "true"),
        ]);
        assert_eq!(c.http_port, 8080);
        assert_eq!(c.emergency_keyword, "smoke");
        assert_eq!(c.fallback_location.latitude, 1.5);
        assert_eq!(c.fallback_location.longitude, -2.5);
        assert_eq!(c.history_capacity, 5);
        assert_eq!(c.store_backend, StoreBackend::Memory);
        assert!(c.debug_errors);
    }

    #[test]
    fn test_invalid_values_fall_back() {
        let c = config(&[
            ("HTTP_PORT", "not-a-port"),
            ("ALERT_HISTORY_CAPACITY", "0"),
            ("EMERGENCY_KEYWORD", "   "),
        ]);
        assert_eq!(c.http_port, 3000);
        assert_eq!(c.history_capacity, 1);
        assert_eq!(c.emergency_keyword, "fire");
    }
}
