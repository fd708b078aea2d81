//! Error types and process exit codes for the CLI.

use point_tracker::TrackerError;

/// Process exit codes.
pub mod exit_codes {
    pub const FAILURE: i32 = 1;
    pub const NOT_FOUND: i32 = 2;
    pub const CORRUPT_DATA: i32 = 3;
    pub const USAGE: i32 = 64;
}

/// All errors that can occur in the CLI.
#[derive(thiserror::Error, Debug)]
pub enum CliError {
    #[error(transparent)]
    Tracker(#[from] TrackerError),

    #[error("Invalid arguments: {0}")]
    InvalidArgs(String),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),
}

impl CliError {
    pub fn exit_code(&self) -> i32 {
        use exit_codes::*;
        match self {
            CliError::Tracker(TrackerError::StreamerNotFound(_))
            | CliError::Tracker(TrackerError::ModelNotFound(_)) => NOT_FOUND,
            CliError::Tracker(TrackerError::CorruptPersistence(_))
            | CliError::Tracker(TrackerError::InvalidRecord { .. }) => CORRUPT_DATA,
            CliError::Tracker(TrackerError::InvalidWindow(_))
            | CliError::Tracker(TrackerError::InvalidValue(_))
            | CliError::Tracker(TrackerError::NameTaken(_))
            | CliError::InvalidArgs(_) => USAGE,
            _ => FAILURE,
        }
    }
}

pub type CliResult<T> = Result<T, CliError>;
