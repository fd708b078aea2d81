//! Tracker session: roster and model cache lifecycle plus file I/O.

use std::path::{Path, PathBuf};

use chrono::{DateTime, Local, Utc};
use serde::Serialize;

use point_tracker::{
    predict, summarize, when_target, ModelReader, ModelStore, ModelWriter, Projection, Roster,
    RosterReader, RosterWriter, StreamerSummary, TrendModel, TrendOverlay, WindowPolicy,
};

use crate::types::{CliError, CliResult};

/// Owns the roster, the model cache and the files they persist to.
///
/// Every mutation refits the affected model before returning, so readers
/// never see a model that predates the change.
pub struct TrackerSession {
    roster: Roster,
    models: ModelStore,
    roster_path: PathBuf,
    models_path: PathBuf,
    dirty: bool,
}

impl TrackerSession {
    /// Open or create the roster and model files at the given paths.
    pub fn open(roster_path: &str, models_path: &str, policy: WindowPolicy) -> CliResult<Self> {
        policy.validate()?;
        let roster_path = PathBuf::from(roster_path);
        let models_path = PathBuf::from(models_path);

        let roster = if roster_path.exists() {
            tracing::info!("Opening roster: {}", roster_path.display());
            RosterReader::read_from_file(&roster_path)?
        } else {
            tracing::info!("Starting new roster: {}", roster_path.display());
            ensure_parent(&roster_path)?;
            Roster::new()
        };

        let mut models = if models_path.exists() {
            tracing::info!("Loading models: {}", models_path.display());
            ModelReader::read_from_file(&models_path)?
        } else {
            ModelStore::new(policy)
        };

        let mut dirty = false;
        if models.policy() != policy {
            tracing::warn!(
                "Model file was fit with {}, configured {}; refitting",
                models.policy(),
                policy
            );
            models.set_policy(policy);
            dirty = true;
        }

        let orphans: Vec<String> = models
            .iter()
            .map(|(name, _)| name.clone())
            .filter(|name| roster.get(name).is_none())
            .collect();
        for name in orphans {
            tracing::warn!("Dropping model with no roster entry: {name}");
            models.invalidate(&name);
            dirty = true;
        }

        let mut session = Self {
            roster,
            models,
            roster_path,
            models_path,
            dirty,
        };
        session.refresh();

        tracing::info!(
            "Session ready: {} streamers, {} models, window {}",
            session.roster.count(),
            session.models.len(),
            session.models.policy()
        );
        Ok(session)
    }

    /// Bring the model cache up to date with the roster and today's date.
    ///
    /// Expires models whose window has moved and fits any streamer without
    /// one. Returns the number of models built.
    pub fn refresh(&mut self) -> usize {
        let now = Local::now();
        if self.models.expire_if_stale(&now) {
            self.dirty = true;
        }

        let mut built = 0;
        for streamer in self.roster.iter() {
            if !self.models.contains(&streamer.name)
                && self.models.get_or_build(streamer, &now).is_some()
            {
                built += 1;
            }
        }
        if built > 0 {
            self.dirty = true;
            tracing::debug!("Fitted {built} missing models");
        }
        built
    }

    pub fn roster(&self) -> &Roster {
        &self.roster
    }

    pub fn models(&self) -> &ModelStore {
        &self.models
    }

    pub fn policy(&self) -> WindowPolicy {
        self.models.policy()
    }

    /// Record a point value, creating the streamer if needed.
    pub fn record(
        &mut self,
        name: &str,
        value: f64,
        at: Option<DateTime<Utc>>,
        target: Option<f64>,
    ) -> CliResult<Projection> {
        let at = at.unwrap_or_else(Utc::now);
        self.roster.record(name, value, at, target)?;
        self.dirty = true;
        self.refit(name)
    }

    /// Set or clear a streamer's target.
    pub fn set_target(&mut self, name: &str, target: Option<f64>) -> CliResult<Projection> {
        self.roster.set_target(name, target)?;
        self.dirty = true;
        self.refit(name)
    }

    /// Rename a streamer and move its cached model with it.
    pub fn rename(&mut self, old: &str, new: &str) -> CliResult<()> {
        self.roster.rename(old, new)?;
        if old != new {
            if self.models.contains(old) {
                self.models.rename(old, new)?;
            } else {
                self.refit(new)?;
            }
        }
        self.dirty = true;
        tracing::info!("Renamed {old} -> {new}");
        Ok(())
    }

    /// Remove a streamer and its model.
    pub fn remove(&mut self, name: &str) -> CliResult<()> {
        self.roster.remove(name)?;
        if self.models.contains(name) {
            self.models.remove(name)?;
        }
        self.dirty = true;
        tracing::info!("Removed {name}");
        Ok(())
    }

    /// Refit every streamer from scratch. Returns the number of models built.
    pub fn rebuild_all(&mut self) -> usize {
        let now = Local::now();
        self.models.clear();
        let built = self
            .roster
            .iter()
            .filter(|s| self.models.get_or_build(s, &now).is_some())
            .count();
        self.dirty = true;
        tracing::info!("Rebuilt {built} models");
        built
    }

    /// Switch window policy and refit everything under it.
    pub fn set_policy(&mut self, policy: WindowPolicy) -> CliResult<usize> {
        policy.validate()?;
        self.models.set_policy(policy);
        Ok(self.rebuild_all())
    }

    /// Display rows for every streamer, in roster order.
    pub fn summaries(&self) -> Vec<StreamerSummary> {
        self.roster
            .iter()
            .map(|s| summarize(s, self.models.get(&s.name)))
            .collect()
    }

    /// Detailed trend report for one streamer.
    pub fn estimate(&self, name: &str, at: Option<DateTime<Utc>>) -> CliResult<EstimateReport> {
        let streamer = self.roster.require(name)?;
        let model = self.models.get(name).copied();
        let window = self.policy().apply(&streamer.observations, &Local::now());

        Ok(EstimateReport {
            name: streamer.name.clone(),
            observations: streamer.count(),
            window_size: window.len(),
            policy: self.policy().to_string(),
            slope_per_day: model.map(|m| m.slope_per_day()),
            r_squared: model.map(|m| m.r_squared(&window)),
            model,
            target: streamer.target,
            projection: when_target(streamer, model.as_ref()),
            prediction: at.map(|at| (at, predict(streamer, model.as_ref(), at))),
        })
    }

    /// Observed series with the fitted line evaluated at each point.
    pub fn overlay(&self, name: &str, raw: bool) -> CliResult<TrendOverlay> {
        let streamer = self.roster.require(name)?;
        let series = if raw {
            let mut all = streamer.observations.clone();
            all.sort_by(|a, b| a.at.cmp(&b.at));
            all
        } else {
            self.policy().apply(&streamer.observations, &Local::now())
        };
        Ok(TrendOverlay::build(&streamer.name, &series, self.models.get(name)))
    }

    /// Write roster and models if anything changed.
    pub fn save(&mut self) -> CliResult<()> {
        if !self.dirty {
            return Ok(());
        }

        RosterWriter::write_to_file(&self.roster, &self.roster_path)?;
        ModelWriter::write_to_file(&self.models, &self.models_path)?;

        self.dirty = false;
        tracing::debug!(
            "Saved {} and {}",
            self.roster_path.display(),
            self.models_path.display()
        );
        Ok(())
    }

    pub fn is_dirty(&self) -> bool {
        self.dirty
    }

    pub fn roster_path(&self) -> &Path {
        &self.roster_path
    }

    pub fn models_path(&self) -> &Path {
        &self.models_path
    }

    fn refit(&mut self, name: &str) -> CliResult<Projection> {
        self.refresh();
        let streamer = self.roster.require(name)?;
        let model = self.models.rebuild(streamer, &Local::now());
        Ok(when_target(streamer, model.as_ref()))
    }
}

impl Drop for TrackerSession {
    fn drop(&mut self) {
        if self.dirty {
            if let Err(e) = self.save() {
                tracing::error!("Failed to save on drop: {e}");
            }
        }
    }
}

/// Everything known about one streamer's trend.
#[derive(Debug, Clone, Serialize)]
pub struct EstimateReport {
    pub name: String,
    pub observations: usize,
    pub window_size: usize,
    pub policy: String,
    pub model: Option<TrendModel>,
    pub slope_per_day: Option<f64>,
    pub r_squared: Option<f64>,
    pub target: Option<f64>,
    pub projection: Projection,
    pub prediction: Option<(DateTime<Utc>, Option<f64>)>,
}

fn ensure_parent(path: &Path) -> CliResult<()> {
    if let Some(parent) = path.parent() {
        if !parent.as_os_str().is_empty() {
            std::fs::create_dir_all(parent).map_err(|e| {
                CliError::Io(std::io::Error::other(format!(
                    "Failed to create directory {}: {e}",
                    parent.display()
                )))
            })?;
        }
    }
    Ok(())
}
