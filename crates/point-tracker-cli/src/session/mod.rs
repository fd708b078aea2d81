//! Tracker session lifecycle.

pub mod manager;

pub use manager::{EstimateReport, TrackerSession};
