//! Fire alert domain logic.
//!
//! Turns loosely-structured sensor payloads into normalized emergency
//! assessments and keeps a bounded history of processed alerts.
//!
//! ## Pipeline
//!
//! ```text
//! raw JSON payload
//!         ↓
//! fields (ordered source probing)
//!         ↓
//! classifier (table-driven severity scoring)
//!         ↓
//! ProcessedAlert → AlertHistory (bounded ring)
//! ```
//!
//! Nothing in this crate performs I/O and nothing in it fails: every
//! missing or malformed field is replaced by a default.

pub mod classifier;
pub mod fields;
pub mod history;
pub mod types;

pub use classifier::{assess, Classifier, ClassifierPolicy, DEFAULT_FALLBACK_LOCATION};
pub use history::{AlertHistory, HistoryStats, DEFAULT_HISTORY_CAPACITY};
pub use types::{EmergencyAssessment, Location, ProcessedAlert, Severity};
