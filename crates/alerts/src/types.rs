//! Alert domain types.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;
use uuid::Uuid;

/// Emergency severity tiers, in ascending order.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum Severity {
    Low,
    Moderate,
    High,
    Critical,
    Extreme,
}

impl Severity {
    /// All tiers, lowest first.
    pub const ALL: [Severity; 5] = [
        Severity::Low,
        Severity::Moderate,
        Severity::High,
        Severity::Critical,
        Severity::Extreme,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            Severity::Low => "LOW",
            Severity::Moderate => "MODERATE",
            Severity::High => "HIGH",
            Severity::Critical => "CRITICAL",
            Severity::Extreme => "EXTREME",
        }
    }

    /// HIGH and above always count as an emergency.
    pub fn is_emergency_tier(&self) -> bool {
        *self >= Severity::High
    }
}

impl fmt::Display for Severity {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Geographic coordinate of a sensor.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Location {
    pub latitude: f64,
    pub longitude: f64,
}

/// Normalized result of classifying one sensor payload.
///
/// Built once per inbound notification and never mutated.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct EmergencyAssessment {
    pub device_id: String,
    pub is_emergency: bool,
    pub severity: Severity,
    pub temperature: f64,
    pub humidity: f64,
    pub smoke_level: f64,
    pub air_quality: f64,
    pub location: Location,
    pub observed_at: DateTime<Utc>,
}

/// An assessment that went through the pipeline and was recorded.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ProcessedAlert {
    pub id: String,
    #[serde(flatten)]
    pub assessment: EmergencyAssessment,
    pub processed: bool,
    pub processed_at: DateTime<Utc>,
}

impl ProcessedAlert {
    /// Wrap an assessment, stamping it with a fresh id and the current time.
    pub fn new(assessment: EmergencyAssessment) -> Self {
        Self::processed_at(assessment, Utc::now())
    }

    /// Like [`ProcessedAlert::new`] with an explicit processing time.
    pub fn processed_at(assessment: EmergencyAssessment, processed_at: DateTime<Utc>) -> Self {
        Self {
            id: alert_id(processed_at),
            assessment,
            processed: true,
            processed_at,
        }
    }

    pub fn severity(&self) -> Severity {
        self.assessment.severity
    }
}

/// Timestamp plus a random suffix; collisions are practically impossible
/// within one process.
fn alert_id(at: DateTime<Utc>) -> String {
    let suffix = Uuid::new_v4().simple().to_string();
    format!("alert-{}-{}", at.timestamp_millis(), &suffix[..8])
}
