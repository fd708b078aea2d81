//! Core data types for tracked streamers and their point history.

use std::hash::{Hash, Hasher};

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// A single (timestamp, value) sample.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Observation {
    pub at: DateTime<Utc>,
    pub value: f64,
}

impl Observation {
    pub fn new(at: DateTime<Utc>, value: f64) -> Self {
        Self { at, value }
    }

    /// Seconds since the Unix epoch, as used by the trend fit.
    pub fn seconds(&self) -> f64 {
        self.at.timestamp() as f64 + f64::from(self.at.timestamp_subsec_nanos()) * 1e-9
    }
}

/// A tracked subject with a point history and an optional target.
///
/// Identity is the generated `id`; the `name` is a display key that a
/// [`Roster`](crate::Roster) keeps unique and that may change on rename.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Streamer {
    pub id: Uuid,
    pub name: String,
    pub observations: Vec<Observation>,
    pub target: Option<f64>,
}

impl Streamer {
    /// Create a streamer with its first observation.
    pub fn new(name: impl Into<String>, first: Observation, target: Option<f64>) -> Self {
        Self {
            id: Uuid::new_v4(),
            name: name.into(),
            observations: vec![first],
            target,
        }
    }

    /// Append an observation in arrival order.
    pub fn push(&mut self, obs: Observation) {
        self.observations.push(obs);
    }

    /// Return the number of observations.
    pub fn count(&self) -> usize {
        self.observations.len()
    }

    /// The most recent observation by timestamp (not by arrival).
    pub fn latest(&self) -> Option<&Observation> {
        self.observations.iter().max_by_key(|o| o.at)
    }

    /// The current point value, if any observation exists.
    pub fn current_value(&self) -> Option<f64> {
        self.latest().map(|o| o.value)
    }
}

impl PartialEq for Streamer {
    fn eq(&self, other: &Self) -> bool {
        self.id == other.id
    }
}

impl Eq for Streamer {}

impl Hash for Streamer {
    fn hash<H: Hasher>(&self, state: &mut H) {
        self.id.hash(state);
    }
}

/// Errors that can occur in the tracker library.
#[derive(thiserror::Error, Debug)]
pub enum TrackerError {
    #[error("Insufficient data: need {required} distinct timestamps, have {actual}")]
    InsufficientData { required: usize, actual: usize },

    #[error("Degenerate model: {0}")]
    DegenerateModel(String),

    #[error("Streamer not found: {0}")]
    StreamerNotFound(String),

    #[error("No trend model cached for: {0}")]
    ModelNotFound(String),

    #[error("Name already in use: {0}")]
    NameTaken(String),

    #[error("Invalid window policy: {0}")]
    InvalidWindow(String),

    #[error("Invalid value: {0}")]
    InvalidValue(String),

    #[error("Invalid record on line {line}: {reason}")]
    InvalidRecord { line: u64, reason: String },

    #[error("Corrupt model file: {0}")]
    CorruptPersistence(String),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("CSV error: {0}")]
    Csv(#[from] csv::Error),
}

/// Convenience result type.
pub type TrackerResult<T> = Result<T, TrackerError>;
