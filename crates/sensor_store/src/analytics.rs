//! Analytics summaries over a window of readings.

use crate::record::SensorRecord;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;
use std::time::Duration;

/// Analytics window, measured back from now.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub enum TimeRange {
    #[serde(rename = "1h")]
    OneHour,
    #[default]
    #[serde(rename = "24h")]
    Day,
    #[serde(rename = "7d")]
    Week,
    #[serde(rename = "30d")]
    Month,
}

impl TimeRange {
    pub fn as_str(&self) -> &'static str {
        match self {
            TimeRange::OneHour => "1h",
            TimeRange::Day => "24h",
            TimeRange::Week => "7d",
            TimeRange::Month => "30d",
        }
    }

    pub fn duration(&self) -> Duration {
        let hours = match self {
            TimeRange::OneHour => 1,
            TimeRange::Day => 24,
            TimeRange::Week => 24 * 7,
            TimeRange::Month => 24 * 30,
        };
        Duration::from_secs(hours * 3600)
    }

    /// Parse a range, falling back to 24h for unknown input.
    pub fn parse_or_default(raw: Option<&str>) -> Self {
        raw.and_then(|s| s.parse().ok()).unwrap_or_default()
    }
}

impl FromStr for TimeRange {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim() {
            "1h" => Ok(TimeRange::OneHour),
            "24h" | "1d" => Ok(TimeRange::Day),
            "7d" => Ok(TimeRange::Week),
            "30d" => Ok(TimeRange::Month),
            other => Err(format!("unknown time range: {}", other)),
        }
    }
}

impl fmt::Display for TimeRange {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Min/max/average of one metric. All `None` when there are no readings.
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct MetricSummary {
    pub min: Option<f64>,
    pub max: Option<f64>,
    pub avg: Option<f64>,
}

impl MetricSummary {
    fn from_values(values: impl Iterator<Item = f64>) -> Self {
        let mut min = f64::INFINITY;
        let mut max = f64::NEG_INFINITY;
        let mut sum = 0.0;
        let mut n = 0usize;
        for v in values {
            min = min.min(v);
            max = max.max(v);
            sum += v;
            n += 1;
        }
        if n == 0 {
            return Self::default();
        }
        Self {
            min: Some(min),
            max: Some(max),
            avg: Some(sum / n as f64),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct AnalyticsSummary {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub device_id: Option<String>,
    pub time_range: TimeRange,
    pub count: usize,
    pub emergency_count: usize,
    pub temperature: MetricSummary,
    pub humidity: MetricSummary,
    pub smoke_level: MetricSummary,
    pub air_quality: MetricSummary,
}

/// Summarize a set of readings.
pub fn summarize(
    device_id: Option<&str>,
    time_range: TimeRange,
    records: &[SensorRecord],
) -> AnalyticsSummary {
    AnalyticsSummary {
        device_id: device_id.map(str::to_string),
        time_range,
        count: records.len(),
        emergency_count: records.iter().filter(|r| r.is_emergency).count(),
        temperature: MetricSummary::from_values(records.iter().map(|r| r.temperature)),
        humidity: MetricSummary::from_values(records.iter().map(|r| r.humidity)),
        smoke_level: MetricSummary::from_values(records.iter().map(|r| r.smoke_level)),
        air_quality: MetricSummary::from_values(records.iter().map(|r| r.air_quality)),
    }
}
