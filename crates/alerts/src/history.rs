//! Bounded in-memory history of processed alerts.
//!
//! Newest first. Process-wide and never persisted; access is serialized
//! through an `RwLock` because ingress handlers run on many tasks.

use crate::types::{ProcessedAlert, Severity};
use chrono::{DateTime, Duration, Utc};
use parking_lot::RwLock;
use serde::Serialize;
use std::collections::{BTreeMap, VecDeque};
use tracing::debug;

/// Default number of alerts retained.
pub const DEFAULT_HISTORY_CAPACITY: usize = 100;

/// Derived statistics over the retained window.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct HistoryStats {
    pub total: usize,
    pub last_24h: usize,
    pub last_7d: usize,
    /// Every tier is present, zero-filled.
    pub by_severity: BTreeMap<Severity, usize>,
}

/// Fixed-capacity ring of recent alerts.
pub struct AlertHistory {
    capacity: usize,
    entries: RwLock<VecDeque<ProcessedAlert>>,
}

impl AlertHistory {
    /// Create an empty history. A capacity of 0 is treated as 1.
    pub fn new(capacity: usize) -> Self {
        let capacity = capacity.max(1);
        Self {
            capacity,
            entries: RwLock::new(VecDeque::with_capacity(capacity)),
        }
    }

    pub fn capacity(&self) -> usize {
        self.capacity
    }

    pub fn len(&self) -> usize {
        self.entries.read().len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.read().is_empty()
    }

    /// Insert at the head, evicting the oldest entry when full.
    pub fn add(&self, alert: ProcessedAlert) {
        let mut entries = self.entries.write();
        entries.push_front(alert);
        if entries.len() > self.capacity {
            if let Some(evicted) = entries.pop_back() {
                debug!("Evicted alert {} from history", evicted.id);
            }
        }
    }

    /// Up to `limit` most recent alerts, newest first.
    pub fn recent(&self, limit: usize) -> Vec<ProcessedAlert> {
        self.entries.read().iter().take(limit).cloned().collect()
    }

    pub fn stats(&self) -> HistoryStats {
        self.stats_at(Utc::now())
    }

    /// Statistics with windows measured back from `now`.
    pub fn stats_at(&self, now: DateTime<Utc>) -> HistoryStats {
        let day_ago = now - Duration::hours(24);
        let week_ago = now - Duration::days(7);

        let mut by_severity: BTreeMap<Severity, usize> =
            Severity::ALL.iter().map(|s| (*s, 0)).collect();
        let mut last_24h = 0;
        let mut last_7d = 0;

        let entries = self.entries.read();
        for alert in entries.iter() {
            if alert.processed_at >= day_ago {
                last_24h += 1;
            }
            if alert.processed_at >= week_ago {
                last_7d += 1;
            }
            *by_severity.entry(alert.severity()).or_default() += 1;
        }

        HistoryStats {
            total: entries.len(),
            last_24h,
            last_7d,
            by_severity,
        }
    }
}

impl Default for AlertHistory {
    fn default() -> Self {
        Self::new(DEFAULT_HISTORY_CAPACITY)
    }
}
