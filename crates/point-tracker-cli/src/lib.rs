//! Point Tracker CLI: command-line and REPL access to tracked point targets.

pub mod config;
pub mod output;
pub mod repl;
pub mod session;
pub mod types;

pub use config::{resolve_models_path, resolve_roster_path, resolve_window_policy, TrackerConfig};
pub use session::TrackerSession;
pub use types::{CliError, CliResult};
