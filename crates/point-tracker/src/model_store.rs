//! Name-keyed cache of fitted trend models, one per streamer.

use std::collections::HashMap;

use chrono::{DateTime, NaiveDate, TimeZone};

use crate::regression::TrendModel;
use crate::types::{Streamer, TrackerError, TrackerResult};
use crate::window::WindowPolicy;

/// Cache of one [`TrendModel`] per streamer name.
///
/// Models are derived from the windowed history and are never patched in
/// place: callers `invalidate` or `rebuild` after any change to a streamer.
/// Under a time-dependent policy the cache is only valid for the local date
/// it was fit on.
#[derive(Debug, Clone, Default)]
pub struct ModelStore {
    policy: WindowPolicy,
    models: HashMap<String, TrendModel>,
    pub(crate) fitted_on: Option<NaiveDate>,
}

impl ModelStore {
    /// Create an empty store that fits with `policy`.
    pub fn new(policy: WindowPolicy) -> Self {
        Self {
            policy,
            models: HashMap::new(),
            fitted_on: None,
        }
    }

    /// Create a store pre-populated with loaded models.
    pub fn with_models(policy: WindowPolicy, models: HashMap<String, TrendModel>) -> Self {
        Self {
            policy,
            models,
            fitted_on: None,
        }
    }

    pub fn policy(&self) -> WindowPolicy {
        self.policy
    }

    /// Switch policy. Every cached model was fit under the old one, so the cache is cleared.
    pub fn set_policy(&mut self, policy: WindowPolicy) {
        if policy != self.policy {
            tracing::info!(
                "Window policy changed {} -> {}; dropping {} cached models",
                self.policy,
                policy,
                self.models.len()
            );
            self.policy = policy;
            self.clear();
        }
    }

    /// Local date the cached models were fit on, for time-dependent policies.
    pub fn fitted_on(&self) -> Option<NaiveDate> {
        self.fitted_on
    }

    /// Drop every cached model if the policy's window has moved since they
    /// were fit. Returns whether the cache was reset.
    pub fn expire_if_stale<Tz: TimeZone>(&mut self, now: &DateTime<Tz>) -> bool {
        if !self.policy.is_time_dependent() {
            return false;
        }
        let today = now.date_naive();
        if self.fitted_on == Some(today) {
            return false;
        }
        if !self.models.is_empty() {
            tracing::info!(
                "Window {} moved to {today}; dropping {} cached models",
                self.policy,
                self.models.len()
            );
        }
        self.models.clear();
        self.fitted_on = Some(today);
        true
    }

    /// Get a cached model by streamer name.
    pub fn get(&self, name: &str) -> Option<&TrendModel> {
        self.models.get(name)
    }

    pub fn contains(&self, name: &str) -> bool {
        self.models.contains_key(name)
    }

    /// Return the cached model, fitting and caching it first if needed.
    ///
    /// Returns `None` when the windowed history cannot support a fit; nothing
    /// is cached in that case.
    pub fn get_or_build<Tz: TimeZone>(
        &mut self,
        streamer: &Streamer,
        now: &DateTime<Tz>,
    ) -> Option<TrendModel> {
        self.expire_if_stale(now);
        if let Some(model) = self.models.get(&streamer.name) {
            return Some(*model);
        }
        self.build(streamer, now)
    }

    /// Drop the cached model for `name`. Returns whether one was cached.
    pub fn invalidate(&mut self, name: &str) -> bool {
        let removed = self.models.remove(name).is_some();
        if removed {
            tracing::debug!("Invalidated model for {name}");
        }
        removed
    }

    /// Refit the streamer from its full history, replacing any cached model.
    pub fn rebuild<Tz: TimeZone>(
        &mut self,
        streamer: &Streamer,
        now: &DateTime<Tz>,
    ) -> Option<TrendModel> {
        self.expire_if_stale(now);
        self.invalidate(&streamer.name);
        self.build(streamer, now)
    }

    /// Evict the model for `name`, failing if none is cached.
    pub fn remove(&mut self, name: &str) -> TrackerResult<TrendModel> {
        self.models
            .remove(name)
            .ok_or_else(|| TrackerError::ModelNotFound(name.to_string()))
    }

    /// Move the model cached under `old` to `new`.
    pub fn rename(&mut self, old: &str, new: &str) -> TrackerResult<()> {
        if old == new {
            return if self.models.contains_key(old) {
                Ok(())
            } else {
                Err(TrackerError::ModelNotFound(old.to_string()))
            };
        }
        if self.models.contains_key(new) {
            return Err(TrackerError::NameTaken(new.to_string()));
        }
        let model = self
            .models
            .remove(old)
            .ok_or_else(|| TrackerError::ModelNotFound(old.to_string()))?;
        self.models.insert(new.to_string(), model);
        tracing::debug!("Re-keyed model {old} -> {new}");
        Ok(())
    }

    /// Drop every cached model.
    pub fn clear(&mut self) {
        self.models.clear();
        self.fitted_on = None;
    }

    /// Return the number of cached models.
    pub fn len(&self) -> usize {
        self.models.len()
    }

    pub fn is_empty(&self) -> bool {
        self.models.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = (&String, &TrendModel)> {
        self.models.iter()
    }

    pub fn models(&self) -> &HashMap<String, TrendModel> {
        &self.models
    }

    fn build<Tz: TimeZone>(&mut self, streamer: &Streamer, now: &DateTime<Tz>) -> Option<TrendModel> {
        if streamer.count() < 2 {
            tracing::debug!("Skipping fit for {}: single observation", streamer.name);
            return None;
        }

        let window = self.policy.apply(&streamer.observations, now);
        match TrendModel::fit(&window) {
            Ok(model) => {
                self.models.insert(streamer.name.clone(), model);
                Some(model)
            }
            Err(e) => {
                tracing::debug!("No model for {}: {e}", streamer.name);
                None
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::Observation;
    use chrono::{Duration, Utc};

    fn day(n: i64) -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2024, 1, 1, 12, 0, 0).unwrap() + Duration::days(n)
    }

    fn alice() -> Streamer {
        let mut s = Streamer::new("Alice", Observation::new(day(0), 100.0), Some(300.0));
        s.push(Observation::new(day(10), 200.0));
        s
    }

    #[test]
    fn test_get_or_build_caches() {
        let mut store = ModelStore::default();
        let s = alice();
        assert!(store.get("Alice").is_none());

        let built = store.get_or_build(&s, &day(11)).unwrap();
        assert!((built.slope_per_day() - 10.0).abs() < 1e-9);
        assert_eq!(store.get("Alice"), Some(&built));
        assert_eq!(store.len(), 1);
    }

    #[test]
    fn test_single_observation_not_cached() {
        let mut store = ModelStore::default();
        let bob = Streamer::new("Bob", Observation::new(day(0), 50.0), Some(100.0));
        assert!(store.get_or_build(&bob, &day(1)).is_none());
        assert!(store.is_empty());
    }

    #[test]
    fn test_window_reducing_to_one_point_skips_fit() {
        let mut store = ModelStore::new(WindowPolicy::LastPerDay);
        let mut s = Streamer::new("Cy", Observation::new(day(0), 1.0), None);
        s.push(Observation::new(day(0) + Duration::hours(1), 2.0));
        assert!(store.get_or_build(&s, &day(1)).is_none());
    }

    #[test]
    fn test_rebuild_replaces_model() {
        let mut store = ModelStore::default();
        let mut s = alice();
        store.get_or_build(&s, &day(11));

        s.push(Observation::new(day(20), 500.0));
        let stale = *store.get("Alice").unwrap();
        let fresh = store.rebuild(&s, &day(21)).unwrap();
        assert_ne!(stale, fresh);
        assert_eq!(store.get("Alice"), Some(&fresh));
    }

    #[test]
    fn test_invalidate_is_idempotent() {
        let mut store = ModelStore::default();
        store.get_or_build(&alice(), &day(11));
        assert!(store.invalidate("Alice"));
        assert!(!store.invalidate("Alice"));
    }

    #[test]
    fn test_remove_missing_fails() {
        let mut store = ModelStore::default();
        let err = store.remove("Nobody").unwrap_err();
        assert!(matches!(err, TrackerError::ModelNotFound(ref n) if n == "Nobody"));
    }

    #[test]
    fn test_rename_rekeys_model() {
        let mut store = ModelStore::default();
        let model = store.get_or_build(&alice(), &day(11)).unwrap();

        store.rename("Alice", "Alicia").unwrap();
        assert!(store.get("Alice").is_none());
        assert_eq!(store.get("Alicia"), Some(&model));
        assert_eq!(store.len(), 1);
    }

    #[test]
    fn test_rename_errors() {
        let mut store = ModelStore::default();
        assert!(matches!(
            store.rename("Ghost", "Other"),
            Err(TrackerError::ModelNotFound(_))
        ));

        store.get_or_build(&alice(), &day(11));
        let mut other = alice();
        other.name = "Other".to_string();
        store.get_or_build(&other, &day(11));
        assert!(matches!(
            store.rename("Alice", "Other"),
            Err(TrackerError::NameTaken(_))
        ));
        assert!(store.contains("Alice"));
    }

    #[test]
    fn test_rolling_cache_valid_for_one_day() {
        let mut store = ModelStore::new(WindowPolicy::RollingDays { days: 30 });
        let mut s = alice();
        let first = store.get_or_build(&s, &day(11)).unwrap();
        assert_eq!(store.fitted_on(), Some(day(11).date_naive()));

        // Same day: the cached model is served even though history grew.
        s.push(Observation::new(day(11), 500.0));
        assert_eq!(store.get_or_build(&s, &day(11)), Some(first));

        // Next day: the window moved, so the model is refit.
        let next = store.get_or_build(&s, &day(12)).unwrap();
        assert_ne!(next, first);
        assert_eq!(store.fitted_on(), Some(day(12).date_naive()));
    }

    #[test]
    fn test_rolling_loaded_models_without_date_are_stale() {
        let mut models = HashMap::new();
        models.insert("Alice".to_string(), TrendModel::new(999.0, 0.0));
        let mut store = ModelStore::with_models(WindowPolicy::RollingDays { days: 30 }, models);

        assert!(store.expire_if_stale(&day(11)));
        assert!(store.is_empty());
        assert!(!store.expire_if_stale(&day(11)));
    }

    #[test]
    fn test_day_capped_cache_never_expires() {
        let mut store = ModelStore::default();
        let model = store.get_or_build(&alice(), &day(11)).unwrap();
        assert!(!store.expire_if_stale(&day(400)));
        assert_eq!(store.get("Alice"), Some(&model));
        assert_eq!(store.fitted_on(), None);
    }

    #[test]
    fn test_policy_change_clears_cache() {
        let mut store = ModelStore::default();
        store.get_or_build(&alice(), &day(11));
        store.set_policy(WindowPolicy::default());
        assert_eq!(store.len(), 1);
        store.set_policy(WindowPolicy::LastPerDay);
        assert!(store.is_empty());
        assert_eq!(store.policy(), WindowPolicy::LastPerDay);
    }
}
