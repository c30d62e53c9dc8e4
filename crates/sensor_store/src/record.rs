//! Stored reading and pagination types.

use crate::error::{Error, Result};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

/// Default page size for device data queries.
pub const DEFAULT_PAGE_LIMIT: usize = 50;

/// Largest page a single query may return.
pub const MAX_PAGE_LIMIT: usize = 1000;

/// Coordinates attached to a reading.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct GeoPoint {
    pub latitude: f64,
    pub longitude: f64,
}

/// One stored sensor reading.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SensorRecord {
    pub device_id: String,
    /// Milliseconds since the Unix epoch.
    pub timestamp: i64,
    #[serde(default)]
    pub temperature: f64,
    #[serde(default)]
    pub humidity: f64,
    #[serde(default)]
    pub smoke_level: f64,
    #[serde(default)]
    pub air_quality: f64,
    #[serde(default)]
    pub is_emergency: bool,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub location: Option<GeoPoint>,
}

/// Filters for a device data query. All times are epoch milliseconds.
#[derive(Debug, Clone, Default, PartialEq, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct DataQuery {
    pub limit: Option<usize>,
    /// Opaque cursor from a previous [`DataPage`].
    pub cursor: Option<String>,
    pub start_time: Option<i64>,
    pub end_time: Option<i64>,
}

impl DataQuery {
    pub fn with_limit(limit: usize) -> Self {
        Self {
            limit: Some(limit),
            ..Default::default()
        }
    }

    /// Requested limit clamped to `1..=MAX_PAGE_LIMIT`.
    pub fn effective_limit(&self) -> usize {
        self.limit
            .unwrap_or(DEFAULT_PAGE_LIMIT)
            .clamp(1, MAX_PAGE_LIMIT)
    }

    /// Decoded cursor, `None` on the first page.
    pub fn cursor_position(&self) -> Result<Option<PageCursor>> {
        match self.cursor.as_deref() {
            None | Some("") => Ok(None),
            Some(raw) => raw.parse().map(Some),
        }
    }

    /// Inclusive upper bound for the next page, combining cursor and end time.
    pub(crate) fn upper_bound(&self) -> Result<Option<i64>> {
        let at_cursor = self.cursor_position()?.map(|c| c.timestamp);
        Ok(match (at_cursor, self.end_time) {
            (Some(a), Some(b)) => Some(a.min(b)),
            (a, b) => a.or(b),
        })
    }

    /// Candidates a backend must fetch to fill one page: the page, one
    /// extra to detect more data, and the already returned ties.
    pub(crate) fn fetch_count(&self) -> Result<usize> {
        let skip = self.cursor_position()?.map_or(0, |c| c.skip);
        Ok(self.effective_limit() + 1 + skip)
    }
}

/// Position after the last returned reading: its timestamp and how many
/// readings with that timestamp were already returned.
///
/// Encoded as `<timestamp>:<skip>`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PageCursor {
    pub timestamp: i64,
    pub skip: usize,
}

impl FromStr for PageCursor {
    type Err = Error;

    fn from_str(raw: &str) -> Result<Self> {
        let invalid = || Error::InvalidCursor(raw.to_string());
        let (timestamp, skip) = raw.split_once(':').ok_or_else(invalid)?;
        Ok(Self {
            timestamp: timestamp.parse().map_err(|_| invalid())?,
            skip: skip.parse().map_err(|_| invalid())?,
        })
    }
}

impl fmt::Display for PageCursor {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}:{}", self.timestamp, self.skip)
    }
}

/// Order readings newest first; ties by device id, then stable.
///
/// Every backend must return candidates in this order for cursors to
/// resume at the right place.
pub(crate) fn sort_newest_first(records: &mut [SensorRecord]) {
    records.sort_by(|a, b| {
        b.timestamp
            .cmp(&a.timestamp)
            .then_with(|| a.device_id.cmp(&b.device_id))
    });
}

/// One page of readings, newest first.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct DataPage {
    pub items: Vec<SensorRecord>,
    pub count: usize,
    pub has_more: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub cursor: Option<String>,
}

impl DataPage {
    /// Build a page from newest-first candidates bounded above by the
    /// cursor timestamp. Ties already returned under `after` are dropped
    /// first; one candidate beyond `limit` only signals that more exist.
    pub fn from_candidates(
        candidates: Vec<SensorRecord>,
        limit: usize,
        after: Option<PageCursor>,
    ) -> Self {
        let mut remaining = after.map_or(0, |c| c.skip);
        let mut items: Vec<SensorRecord> = candidates
            .into_iter()
            .skip_while(|r| {
                let already_returned =
                    remaining > 0 && after.is_some_and(|c| c.timestamp == r.timestamp);
                if already_returned {
                    remaining -= 1;
                }
                already_returned
            })
            .collect();

        let has_more = items.len() > limit;
        items.truncate(limit);

        let cursor = if has_more {
            items.last().map(|last| {
                let mut skip = items
                    .iter()
                    .filter(|r| r.timestamp == last.timestamp)
                    .count();
                if let Some(prev) = after.filter(|c| c.timestamp == last.timestamp) {
                    skip += prev.skip;
                }
                PageCursor {
                    timestamp: last.timestamp,
                    skip,
                }
                .to_string()
            })
        } else {
            None
        };

        Self {
            count: items.len(),
            items,
            has_more,
            cursor,
        }
    }
}
