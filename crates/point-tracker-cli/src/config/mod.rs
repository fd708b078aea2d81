//! Configuration loading and resolution.

use std::path::{Path, PathBuf};

use point_tracker::WindowPolicy;

use crate::types::CliResult;

/// Environment variable overriding the roster CSV path.
pub const ROSTER_ENV: &str = "POINT_TRACKER_ROSTER";
/// Environment variable overriding the model snapshot path.
pub const MODELS_ENV: &str = "POINT_TRACKER_MODELS";
/// Environment variable overriding the window policy.
pub const WINDOW_ENV: &str = "POINT_TRACKER_WINDOW";

/// Roster file name picked up from the working directory when present.
const CWD_ROSTER: &str = "twitch_points.csv";
const MODELS_FILE: &str = "models.ptm";

/// Resolved file locations and fitting policy for one run.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TrackerConfig {
    pub roster_path: String,
    pub models_path: String,
    pub policy: WindowPolicy,
}

impl TrackerConfig {
    /// Resolve every setting: explicit value, then environment, then defaults.
    pub fn resolve(
        roster: Option<&str>,
        models: Option<&str>,
        window: Option<&str>,
    ) -> CliResult<Self> {
        let roster_path = resolve_roster_path(roster);
        let models_path = resolve_models_path(models, &roster_path);
        let policy = resolve_window_policy(window)?;
        Ok(Self {
            roster_path,
            models_path,
            policy,
        })
    }
}

/// Resolve the roster CSV path.
pub fn resolve_roster_path(explicit: Option<&str>) -> String {
    if let Some(path) = explicit {
        return path.to_string();
    }

    if let Ok(env_path) = std::env::var(ROSTER_ENV) {
        return env_path;
    }

    let cwd_roster = PathBuf::from(CWD_ROSTER);
    if cwd_roster.exists() {
        return cwd_roster.display().to_string();
    }

    resolve_default_roster_path()
}

/// Resolve the model snapshot path; defaults to a sibling of the roster.
pub fn resolve_models_path(explicit: Option<&str>, roster_path: &str) -> String {
    if let Some(path) = explicit {
        return path.to_string();
    }

    if let Ok(env_path) = std::env::var(MODELS_ENV) {
        return env_path;
    }

    Path::new(roster_path)
        .with_file_name(MODELS_FILE)
        .display()
        .to_string()
}

/// Resolve the window policy.
pub fn resolve_window_policy(explicit: Option<&str>) -> CliResult<WindowPolicy> {
    if let Some(raw) = explicit {
        return Ok(raw.parse()?);
    }

    if let Ok(raw) = std::env::var(WINDOW_ENV) {
        return Ok(raw.parse()?);
    }

    Ok(WindowPolicy::default())
}

fn resolve_default_roster_path() -> String {
    let home = dirs::home_dir().unwrap_or_else(|| PathBuf::from("."));
    home.join(".point-tracker")
        .join("roster.csv")
        .display()
        .to_string()
}
