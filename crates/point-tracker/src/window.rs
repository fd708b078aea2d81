//! Windowing policies that select which observations feed the trend fit.
//!
//! Every policy is a pure function of the observation slice and the current
//! instant. The time zone of `now` decides what a calendar day is, so callers
//! pass `Local::now()` for local-date semantics or a fixed UTC instant in tests.
//! Output is always in ascending timestamp order.

use std::collections::HashSet;
use std::fmt;
use std::str::FromStr;

use chrono::{DateTime, Days, NaiveDate, TimeZone};
use serde::{Deserialize, Serialize};

use crate::types::{Observation, TrackerError, TrackerResult};

/// Default number of days kept by the day-capped policies.
pub const DEFAULT_WINDOW_DAYS: u32 = 30;

/// How an entity's history is reduced before fitting.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum WindowPolicy {
    /// Latest observation of each of the most recent `days` distinct dates.
    LastDistinctDays { days: u32 },
    /// Latest observation of every date, over the full history.
    LastPerDay,
    /// Every observation dated within `days` of today, inclusive.
    RollingDays { days: u32 },
}

impl Default for WindowPolicy {
    fn default() -> Self {
        WindowPolicy::LastDistinctDays {
            days: DEFAULT_WINDOW_DAYS,
        }
    }
}

impl WindowPolicy {
    /// Reject policies that can never keep an observation.
    pub fn validate(&self) -> TrackerResult<()> {
        match *self {
            WindowPolicy::LastDistinctDays { days: 0 } | WindowPolicy::RollingDays { days: 0 } => {
                Err(TrackerError::InvalidWindow(format!(
                    "{}: window must cover at least one day",
                    self
                )))
            }
            _ => Ok(()),
        }
    }

    /// Whether the selected window moves with today's date.
    pub fn is_time_dependent(&self) -> bool {
        matches!(self, WindowPolicy::RollingDays { .. })
    }

    /// Apply the policy to an unordered observation history.
    pub fn apply<Tz: TimeZone>(
        &self,
        observations: &[Observation],
        now: &DateTime<Tz>,
    ) -> Vec<Observation> {
        let tz = now.timezone();
        let local_date = |o: &Observation| -> NaiveDate { o.at.with_timezone(&tz).date_naive() };

        let windowed = match *self {
            WindowPolicy::LastDistinctDays { days } => {
                let mut sorted = observations.to_vec();
                sorted.sort_by(|a, b| b.at.cmp(&a.at).then_with(|| b.value.total_cmp(&a.value)));

                let mut seen: HashSet<NaiveDate> = HashSet::new();
                let mut kept = Vec::new();
                for obs in sorted {
                    if seen.len() >= days as usize {
                        break;
                    }
                    if seen.insert(local_date(&obs)) {
                        kept.push(obs);
                    }
                }
                kept.reverse();
                kept
            }
            WindowPolicy::LastPerDay => {
                // Stable sort: equal instants keep arrival order, so the last arrival wins.
                let mut sorted = observations.to_vec();
                sorted.sort_by(|a, b| a.at.cmp(&b.at));

                let mut kept: Vec<Observation> = Vec::with_capacity(sorted.len());
                for obs in sorted {
                    match kept.last_mut() {
                        Some(last) if local_date(last) == local_date(&obs) => *last = obs,
                        _ => kept.push(obs),
                    }
                }
                kept
            }
            WindowPolicy::RollingDays { days } => {
                let today = now.date_naive();
                let cutoff = today
                    .checked_sub_days(Days::new(u64::from(days)))
                    .unwrap_or(NaiveDate::MIN);

                let mut kept: Vec<Observation> = observations
                    .iter()
                    .filter(|o| local_date(o) >= cutoff)
                    .copied()
                    .collect();
                kept.sort_by(|a, b| a.at.cmp(&b.at));
                kept
            }
        };

        tracing::debug!(
            "Window {}: kept {} of {} observations",
            self,
            windowed.len(),
            observations.len()
        );
        windowed
    }
}

impl fmt::Display for WindowPolicy {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            WindowPolicy::LastDistinctDays { days } => write!(f, "last-days:{days}"),
            WindowPolicy::LastPerDay => write!(f, "per-day"),
            WindowPolicy::RollingDays { days } => write!(f, "rolling:{days}"),
        }
    }
}

impl FromStr for WindowPolicy {
    type Err = TrackerError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let s = s.trim();
        let (kind, arg) = match s.split_once(':') {
            Some((kind, arg)) => (kind, Some(arg)),
            None => (s, None),
        };

        let days = || -> TrackerResult<u32> {
            match arg {
                None => Ok(DEFAULT_WINDOW_DAYS),
                Some(raw) => raw.trim().parse::<u32>().map_err(|e| {
                    TrackerError::InvalidWindow(format!("'{s}': bad day count '{raw}': {e}"))
                }),
            }
        };

        let policy = match kind.to_ascii_lowercase().as_str() {
            "last-days" | "last_days" => WindowPolicy::LastDistinctDays { days: days()? },
            "per-day" | "per_day" => {
                if arg.is_some() {
                    return Err(TrackerError::InvalidWindow(format!(
                        "'{s}': per-day takes no day count"
                    )));
                }
                WindowPolicy::LastPerDay
            }
            "rolling" => WindowPolicy::RollingDays { days: days()? },
            _ => {
                return Err(TrackerError::InvalidWindow(format!(
                    "'{s}': expected last-days[:N], per-day or rolling[:N]"
                )))
            }
        };
        policy.validate()?;
        Ok(policy)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::{Duration, Utc};

    fn day(n: i64, hour: u32) -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2024, 1, 1, hour, 0, 0).unwrap() + Duration::days(n)
    }

    fn obs(n: i64, hour: u32, value: f64) -> Observation {
        Observation::new(day(n, hour), value)
    }

    #[test]
    fn test_last_days_caps_at_thirty() {
        let history: Vec<_> = (0..45).map(|d| obs(d, 12, d as f64)).collect();
        let now = day(45, 0);
        let out = WindowPolicy::default().apply(&history, &now);

        assert_eq!(out.len(), 30);
        assert!(out.windows(2).all(|w| w[0].at < w[1].at));
        assert_eq!(out.first().unwrap().at, day(15, 12));
        assert_eq!(out.last().unwrap().at, day(44, 12));
    }

    #[test]
    fn test_last_days_keeps_latest_per_day() {
        let history = vec![obs(0, 9, 1.0), obs(0, 18, 2.0), obs(1, 8, 3.0), obs(0, 12, 9.0)];
        let out = WindowPolicy::default().apply(&history, &day(2, 0));

        assert_eq!(out.len(), 2);
        assert_eq!(out[0].value, 2.0);
        assert_eq!(out[1].value, 3.0);
    }

    #[test]
    fn test_last_days_small_cap() {
        let history: Vec<_> = (0..5).map(|d| obs(d, 12, d as f64)).collect();
        let policy = WindowPolicy::LastDistinctDays { days: 2 };
        let out = policy.apply(&history, &day(5, 0));
        let values: Vec<f64> = out.iter().map(|o| o.value).collect();
        assert_eq!(values, vec![3.0, 4.0]);
    }

    #[test]
    fn test_per_day_keeps_later_same_date() {
        let history = vec![obs(3, 15, 20.0), obs(3, 10, 10.0)];
        let out = WindowPolicy::LastPerDay.apply(&history, &day(4, 0));

        assert_eq!(out.len(), 1);
        assert_eq!(out[0].value, 20.0);
        assert_eq!(out[0].at, day(3, 15));
    }

    #[test]
    fn test_per_day_has_no_cap() {
        let history: Vec<_> = (0..45).map(|d| obs(d, 12, d as f64)).collect();
        let out = WindowPolicy::LastPerDay.apply(&history, &day(45, 0));
        assert_eq!(out.len(), 45);
    }

    #[test]
    fn test_rolling_window_is_inclusive() {
        let history: Vec<_> = (0..45).map(|d| obs(d, 12, d as f64)).collect();
        let now = day(44, 20);
        let out = WindowPolicy::default_rolling().apply(&history, &now);

        // Dates 14..=44 are within 30 days of day 44.
        assert_eq!(out.len(), 31);
        assert_eq!(out[0].at, day(14, 12));
    }

    #[test]
    fn test_rolling_does_not_collapse() {
        let history = vec![obs(0, 9, 1.0), obs(0, 10, 2.0), obs(0, 11, 3.0)];
        let out = WindowPolicy::default_rolling().apply(&history, &day(1, 0));
        assert_eq!(out.len(), 3);
    }

    #[test]
    fn test_only_rolling_is_time_dependent() {
        assert!(WindowPolicy::default_rolling().is_time_dependent());
        assert!(!WindowPolicy::default().is_time_dependent());
        assert!(!WindowPolicy::LastPerDay.is_time_dependent());
    }

    #[test]
    fn test_calendar_day_follows_now_timezone() {
        let east = chrono::FixedOffset::east_opt(3 * 3600).unwrap();
        // 20:00 and 23:00 UTC on day 0 fall on different dates at UTC+3.
        let history = vec![obs(0, 20, 1.0), Observation::new(day(0, 23), 2.0)];
        let utc_out = WindowPolicy::LastPerDay.apply(&history, &day(1, 0));
        let east_out = WindowPolicy::LastPerDay.apply(&history, &day(1, 0).with_timezone(&east));
        assert_eq!(utc_out.len(), 1);
        assert_eq!(east_out.len(), 2);
    }

    #[test]
    fn test_parse_and_display() {
        let cases = ["last-days:30", "per-day", "rolling:14"];
        for case in cases {
            let policy: WindowPolicy = case.parse().unwrap();
            assert_eq!(policy.to_string(), case);
        }
        assert_eq!("rolling".parse::<WindowPolicy>().unwrap(), WindowPolicy::default_rolling());
        assert_eq!("last-days".parse::<WindowPolicy>().unwrap(), WindowPolicy::default());
    }

    #[test]
    fn test_parse_rejects_bad_input() {
        assert!("weekly".parse::<WindowPolicy>().is_err());
        assert!("last-days:abc".parse::<WindowPolicy>().is_err());
        assert!("last-days:0".parse::<WindowPolicy>().is_err());
        assert!("per-day:3".parse::<WindowPolicy>().is_err());
    }

    impl WindowPolicy {
        fn default_rolling() -> Self {
            WindowPolicy::RollingDays {
                days: DEFAULT_WINDOW_DAYS,
            }
        }
    }
}
