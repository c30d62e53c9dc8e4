//! Store trait consumed by the gateway.

use crate::analytics::{summarize, AnalyticsSummary, TimeRange};
use crate::error::Result;
use crate::record::{DataPage, DataQuery, SensorRecord};
use async_trait::async_trait;
use chrono::Utc;
use std::sync::Arc;

/// Shared handle to a store implementation.
pub type SharedStore = Arc<dyn SensorStore>;

/// Time-series store of sensor readings.
///
/// `device_id: None` means "across all known devices".
#[async_trait]
pub trait SensorStore: Send + Sync + 'static {
    /// Append a reading.
    async fn put_record(&self, record: &SensorRecord) -> Result<()>;

    /// Page of readings, newest first.
    async fn get_device_data(&self, device_id: Option<&str>, query: &DataQuery) -> Result<DataPage>;

    /// All readings with `start_ms <= timestamp <= end_ms`, newest first.
    async fn records_between(
        &self,
        device_id: Option<&str>,
        start_ms: i64,
        end_ms: i64,
    ) -> Result<Vec<SensorRecord>>;

    /// Known device ids, sorted.
    async fn get_device_list(&self) -> Result<Vec<String>>;

    /// Most recent reading.
    async fn get_latest_record(&self, device_id: Option<&str>) -> Result<Option<SensorRecord>> {
        let page = self
            .get_device_data(device_id, &DataQuery::with_limit(1))
            .await?;
        Ok(page.items.into_iter().next())
    }

    /// Summary of the readings inside `time_range`.
    async fn get_analytics_summary(
        &self,
        device_id: Option<&str>,
        time_range: TimeRange,
    ) -> Result<AnalyticsSummary> {
        let end = Utc::now().timestamp_millis();
        let start = end - time_range.duration().as_millis() as i64;
        let records = self.records_between(device_id, start, end).await?;
        Ok(summarize(device_id, time_range, &records))
    }
}
