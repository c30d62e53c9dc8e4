//! Table-driven emergency classification.
//!
//! Each metric contributes points from its own threshold table (only the
//! highest matching tier counts), the sum maps to a [`Severity`] through a
//! second table. The tables are data so the policy can be tested apart from
//! the probing logic.

use crate::fields;
use crate::types::{EmergencyAssessment, Location, Severity};
use chrono::{DateTime, Utc};
use serde_json::Value;

/// Which side of a threshold counts as dangerous.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Direction {
    /// Strictly greater than the threshold.
    Above,
    /// Strictly less than the threshold.
    Below,
}

/// Threshold table for one metric, most severe tier first.
#[derive(Debug, Clone, Copy)]
pub struct MetricRule {
    pub direction: Direction,
    pub tiers: &'static [(f64, u32)],
}

impl MetricRule {
    /// Points for the highest tier the value reaches, 0 if none.
    pub fn points(&self, value: f64) -> u32 {
        self.tiers
            .iter()
            .find(|(threshold, _)| match self.direction {
                Direction::Above => value > *threshold,
                Direction::Below => value < *threshold,
            })
            .map(|(_, points)| *points)
            .unwrap_or(0)
    }
}

pub const TEMPERATURE_RULE: MetricRule = MetricRule {
    direction: Direction::Above,
    tiers: &[(60.0, 3), (45.0, 2), (35.0, 1)],
};

pub const HUMIDITY_RULE: MetricRule = MetricRule {
    direction: Direction::Below,
    tiers: &[(20.0, 3), (35.0, 2), (50.0, 1)],
};

pub const SMOKE_RULE: MetricRule = MetricRule {
    direction: Direction::Above,
    tiers: &[(300.0, 3), (200.0, 2), (100.0, 1)],
};

pub const AIR_QUALITY_RULE: MetricRule = MetricRule {
    direction: Direction::Above,
    tiers: &[(250.0, 2), (150.0, 1)],
};

/// Minimum total score for each tier above LOW, highest first.
pub const SEVERITY_TIERS: &[(u32, Severity)] = &[
    (8, Severity::Extreme),
    (6, Severity::Critical),
    (4, Severity::High),
    (2, Severity::Moderate),
];

/// Used when a payload carries no coordinates at all.
pub const DEFAULT_FALLBACK_LOCATION: Location = Location {
    latitude: 36.8065,
    longitude: 10.1815,
};

/// Device id used when no producer field names the device.
pub const UNKNOWN_DEVICE: &str = "unknown";

/// Total score across the four metrics.
pub fn score(temperature: f64, humidity: f64, smoke_level: f64, air_quality: f64) -> u32 {
    TEMPERATURE_RULE.points(temperature)
        + HUMIDITY_RULE.points(humidity)
        + SMOKE_RULE.points(smoke_level)
        + AIR_QUALITY_RULE.points(air_quality)
}

pub fn severity_for_score(score: u32) -> Severity {
    SEVERITY_TIERS
        .iter()
        .find(|(min, _)| score >= *min)
        .map(|(_, severity)| *severity)
        .unwrap_or(Severity::Low)
}

/// Configurable inputs to classification.
#[derive(Debug, Clone)]
pub struct ClassifierPolicy {
    pub fallback_location: Location,
}

impl Default for ClassifierPolicy {
    fn default() -> Self {
        Self {
            fallback_location: DEFAULT_FALLBACK_LOCATION,
        }
    }
}

/// Classifies raw sensor payloads.
#[derive(Debug, Clone, Default)]
pub struct Classifier {
    policy: ClassifierPolicy,
}

impl Classifier {
    pub fn new(policy: ClassifierPolicy) -> Self {
        Self { policy }
    }

    pub fn policy(&self) -> &ClassifierPolicy {
        &self.policy
    }

    /// Classify a payload. Never fails: absent numbers become 0, absent
    /// flags false, absent coordinates the fallback location.
    pub fn assess(&self, raw: &Value) -> EmergencyAssessment {
        self.assess_at(raw, Utc::now())
    }

    /// Like [`Classifier::assess`], with `now` used when the payload has no timestamp.
    pub fn assess_at(&self, raw: &Value, now: DateTime<Utc>) -> EmergencyAssessment {
        let temperature = fields::probe_number(raw, fields::TEMPERATURE).unwrap_or(0.0);
        let humidity = fields::probe_number(raw, fields::HUMIDITY).unwrap_or(0.0);
        let smoke_level = fields::probe_number(raw, fields::SMOKE_LEVEL).unwrap_or(0.0);
        let air_quality = fields::probe_number(raw, fields::AIR_QUALITY).unwrap_or(0.0);

        let severity = severity_for_score(score(temperature, humidity, smoke_level, air_quality));
        let flagged = fields::any_truthy(raw, fields::EMERGENCY_FLAG);

        let location = fields::probe_location(raw)
            .map(|(latitude, longitude)| Location {
                latitude,
                longitude,
            })
            .unwrap_or(self.policy.fallback_location);

        EmergencyAssessment {
            device_id: fields::probe_string(raw, fields::DEVICE_ID)
                .unwrap_or_else(|| UNKNOWN_DEVICE.to_string()),
            is_emergency: flagged || severity.is_emergency_tier(),
            severity,
            temperature,
            humidity,
            smoke_level,
            air_quality,
            location,
            observed_at: fields::probe_timestamp(raw).unwrap_or(now),
        }
    }
}

/// Classify with the default policy.
pub fn assess(raw: &Value) -> EmergencyAssessment {
    Classifier::default().assess(raw)
}
