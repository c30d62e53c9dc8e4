//! In-memory store for tests and local runs without Redis.

use crate::error::Result;
use crate::record::{sort_newest_first, DataPage, DataQuery, SensorRecord};
use crate::store::SensorStore;
use async_trait::async_trait;
use parking_lot::RwLock;
use std::collections::BTreeMap;

/// Readings grouped by device, kept in memory.
#[derive(Default)]
pub struct MemoryStore {
    devices: RwLock<BTreeMap<String, Vec<SensorRecord>>>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Newest-first readings within the inclusive bounds.
    fn collect(
        &self,
        device_id: Option<&str>,
        lower: Option<i64>,
        upper: Option<i64>,
    ) -> Vec<SensorRecord> {
        let devices = self.devices.read();
        let mut records: Vec<SensorRecord> = devices
            .iter()
            .filter(|(id, _)| device_id.map_or(true, |wanted| wanted == id.as_str()))
            .flat_map(|(_, records)| records.iter())
            .filter(|r| lower.map_or(true, |l| r.timestamp >= l))
            .filter(|r| upper.map_or(true, |u| r.timestamp <= u))
            .cloned()
            .collect();
        sort_newest_first(&mut records);
        records
    }
}

#[async_trait]
impl SensorStore for MemoryStore {
    async fn put_record(&self, record: &SensorRecord) -> Result<()> {
        self.devices
            .write()
            .entry(record.device_id.clone())
            .or_default()
            .push(record.clone());
        Ok(())
    }

    async fn get_device_data(&self, device_id: Option<&str>, query: &DataQuery) -> Result<DataPage> {
        let mut candidates = self.collect(device_id, query.start_time, query.upper_bound()?);
        candidates.truncate(query.fetch_count()?);
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
        Ok(self.collect(device_id, Some(start_ms), Some(end_ms)))
    }

    async fn get_device_list(&self) -> Result<Vec<String>> {
        Ok(self.devices.read().keys().cloned().collect())
    }
}
