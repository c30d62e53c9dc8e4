//! Sensor reading store.
//!
//! Readings live in a key-value time-series layout: one sorted set per
//! device, scored by timestamp, plus a set of known device ids. The
//! [`SensorStore`] trait is what the gateway consumes; [`RedisStore`] is
//! the production backend and [`MemoryStore`] serves tests and local runs.

pub mod analytics;
pub mod error;
pub mod memory;
pub mod record;
pub mod redis_store;
pub mod store;

pub use analytics::{summarize, AnalyticsSummary, MetricSummary, TimeRange};
pub use error::{Error, Result};
pub use memory::MemoryStore;
pub use record::{DataPage, DataQuery, GeoPoint, PageCursor, SensorRecord};
pub use redis_store::RedisStore;
pub use store::{SensorStore, SharedStore};
