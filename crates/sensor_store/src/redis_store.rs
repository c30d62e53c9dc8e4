//! Redis-backed reading store.

use crate::error::Result;
use crate::record::{sort_newest_first, DataPage, DataQuery, SensorRecord};
use crate::store::SensorStore;
use async_trait::async_trait;
use redis::AsyncCommands;
use tracing::{debug, warn};

/// Sorted set of JSON readings per device: readings:{device_id}
const READINGS_KEY_PREFIX: &str = "readings:";

/// Set of known device ids.
const DEVICES_KEY: &str = "devices";

fn readings_key(device_id: &str) -> String {
    format!("{}{}", READINGS_KEY_PREFIX, device_id)
}

fn score_bound(bound: Option<i64>, unbounded: &str) -> String {
    bound.map_or_else(|| unbounded.to_string(), |b| b.to_string())
}

/// Redis store wrapper.
#[derive(Clone)]
pub struct RedisStore {
    client: redis::Client,
}

impl RedisStore {
    /// Create a new store. Connections are opened lazily per operation.
    pub fn new(redis_url: &str) -> Result<Self> {
        let client = redis::Client::open(redis_url)?;
        Ok(Self { client })
    }

    async fn get_connection(&self) -> Result<redis::aio::MultiplexedConnection> {
        let conn = self.client.get_multiplexed_async_connection().await?;
        Ok(conn)
    }

    /// Devices a query spans.
    async fn target_devices(
        &self,
        conn: &mut redis::aio::MultiplexedConnection,
        device_id: Option<&str>,
    ) -> Result<Vec<String>> {
        match device_id {
            Some(id) => Ok(vec![id.to_string()]),
            None => {
                let mut ids: Vec<String> = conn.smembers(DEVICES_KEY).await?;
                ids.sort();
                Ok(ids)
            }
        }
    }

    /// Newest-first readings of one device within inclusive score bounds.
    async fn range(
        &self,
        conn: &mut redis::aio::MultiplexedConnection,
        device_id: &str,
        lower: Option<i64>,
        upper: Option<i64>,
        count: Option<usize>,
    ) -> Result<Vec<SensorRecord>> {
        let key = readings_key(device_id);
        let max = score_bound(upper, "+inf");
        let min = score_bound(lower, "-inf");

        let members: Vec<String> = match count {
            Some(count) => {
                conn.zrevrangebyscore_limit(&key, max, min, 0, count as isize)
                    .await?
            }
            None => conn.zrevrangebyscore(&key, max, min).await?,
        };

        Ok(members
            .into_iter()
            .filter_map(|json| match serde_json::from_str::<SensorRecord>(&json) {
                Ok(record) => Some(record),
                Err(e) => {
                    warn!("Skipping unreadable reading in {}: {}", key, e);
                    None
                }
            })
            .collect())
    }

    async fn collect(
        &self,
        device_id: Option<&str>,
        lower: Option<i64>,
        upper: Option<i64>,
        count: Option<usize>,
    ) -> Result<Vec<SensorRecord>> {
        let mut conn = self.get_connection().await?;
        let devices = self.target_devices(&mut conn, device_id).await?;

        let mut records = Vec::new();
        for device in &devices {
            records.extend(self.range(&mut conn, device, lower, upper, count).await?);
        }
        sort_newest_first(&mut records);
        if let Some(count) = count {
            records.truncate(count);
        }

        debug!(
            "Fetched {} readings across {} devices",
            records.len(),
            devices.len()
        );
        Ok(records)
    }
}

#[async_trait]
impl SensorStore for RedisStore {
    async fn put_record(&self, record: &SensorRecord) -> Result<()> {
        let mut conn = self.get_connection().await?;
        let json = serde_json::to_string(record)?;

        let _: () = redis::pipe()
            .atomic()
            .zadd(readings_key(&record.device_id), json, record.timestamp)
            .ignore()
            .sadd(DEVICES_KEY, &record.device_id)
            .ignore()
            .query_async(&mut conn)
            .await?;

        debug!(
            "Stored reading for {} at {}",
            record.device_id, record.timestamp
        );
        Ok(())
    }

    async fn get_device_data(&self, device_id: Option<&str>, query: &DataQuery) -> Result<DataPage> {
        let candidates = self
            .collect(
                device_id,
                query.start_time,
                query.upper_bound()?,
                Some(query.fetch_count()?),
            )
            .await?;
        Ok(DataPage::from_candidates(
            candidates,
            query.effective_limit(),
            query.cursor_position()?,
        ))
    }

    async fn records_between(
        &self,
        device_id: Option<&str>,
        start_ms: i64,
        end_ms: i64,
    ) -> Result<Vec<SensorRecord>> {
        self.collect(device_id, Some(start_ms), Some(end_ms), None)
            .await
    }

    async fn get_device_list(&self) -> Result<Vec<String>> {
        let mut conn = self.get_connection().await?;
        let mut ids: Vec<String> = conn.smembers(DEVICES_KEY).await?;
        ids.sort();
        Ok(ids)
    }
}
