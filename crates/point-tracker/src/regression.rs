//! Ordinary least-squares trend fit of point value against time.

use std::collections::HashSet;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::types::{Observation, TrackerError, TrackerResult};

/// Seconds in one day.
pub const SECONDS_PER_DAY: f64 = 86_400.0;

/// Fitted affine trend: `value = slope * unix_seconds + intercept`.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct TrendModel {
    /// Points gained per second.
    pub slope: f64,
    pub intercept: f64,
}

impl TrendModel {
    pub fn new(slope: f64, intercept: f64) -> Self {
        Self { slope, intercept }
    }

    /// Fit a line through the given observations.
    ///
    /// Needs at least two distinct timestamps. The sums are taken around the
    /// means, since squared epoch seconds would swamp the raw-sum form. A
    /// window of identical values yields a slope of exactly zero.
    pub fn fit(points: &[Observation]) -> TrackerResult<Self> {
        if let Some(bad) = points.iter().find(|o| !o.value.is_finite()) {
            return Err(TrackerError::InvalidValue(format!(
                "non-finite value {} at {}",
                bad.value, bad.at
            )));
        }

        let distinct = points.iter().map(|o| o.at).collect::<HashSet<_>>().len();
        if distinct < 2 {
            return Err(TrackerError::InsufficientData {
                required: 2,
                actual: distinct,
            });
        }

        let n = points.len() as f64;
        let mean_x = points.iter().map(Observation::seconds).sum::<f64>() / n;
        let mean_y = points.iter().map(|o| o.value).sum::<f64>() / n;

        let (sxx, sxy) = points.iter().fold((0.0f64, 0.0f64), |(sxx, sxy), o| {
            let dx = o.seconds() - mean_x;
            (sxx + dx * dx, sxy + dx * (o.value - mean_y))
        });

        if sxx <= 0.0 {
            return Err(TrackerError::InsufficientData {
                required: 2,
                actual: 1,
            });
        }

        let first = points[0].value;
        let model = if points.iter().all(|o| o.value == first) {
            TrendModel::new(0.0, first)
        } else {
            let slope = sxy / sxx;
            TrendModel::new(slope, mean_y - slope * mean_x)
        };

        if !model.slope.is_finite() || !model.intercept.is_finite() {
            return Err(TrackerError::DegenerateModel(format!(
                "fit produced slope={} intercept={}",
                model.slope, model.intercept
            )));
        }

        tracing::debug!(
            "Fitted {} points: slope={:.6e}/s intercept={:.6e}",
            points.len(),
            model.slope,
            model.intercept
        );
        Ok(model)
    }

    /// Evaluate the line at a raw epoch-seconds value.
    pub fn predict_seconds(&self, seconds: f64) -> f64 {
        self.slope * seconds + self.intercept
    }

    /// Evaluate the line at an instant.
    pub fn predict(&self, at: DateTime<Utc>) -> f64 {
        self.predict_seconds(Observation::new(at, 0.0).seconds())
    }

    /// Slope expressed in points per day.
    pub fn slope_per_day(&self) -> f64 {
        self.slope * SECONDS_PER_DAY
    }

    /// Whether the line never changes value.
    pub fn is_flat(&self) -> bool {
        self.slope == 0.0
    }

    /// Epoch seconds at which the line reaches `value`; `None` on a flat line.
    pub fn solve_for(&self, value: f64) -> Option<f64> {
        if self.is_flat() {
            return None;
        }
        Some((value - self.intercept) / self.slope)
    }

    /// Coefficient of determination over `points`.
    pub fn r_squared(&self, points: &[Observation]) -> f64 {
        if points.is_empty() {
            return 0.0;
        }
        let mean_y = points.iter().map(|o| o.value).sum::<f64>() / points.len() as f64;
        let ss_tot: f64 = points.iter().map(|o| (o.value - mean_y).powi(2)).sum();
        let ss_res: f64 = points
            .iter()
            .map(|o| (o.value - self.predict_seconds(o.seconds())).powi(2))
            .sum();

        if ss_tot > 0.0 {
            1.0 - ss_res / ss_tot
        } else {
            1.0
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::{Duration, TimeZone};

    fn day(n: i64) -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2024, 3, 1, 12, 0, 0).unwrap() + Duration::days(n)
    }

    fn obs(n: i64, value: f64) -> Observation {
        Observation::new(day(n), value)
    }

    #[test]
    fn test_two_points_exact_line() {
        let model = TrendModel::fit(&[obs(0, 100.0), obs(10, 200.0)]).unwrap();
        assert!((model.slope_per_day() - 10.0).abs() < 1e-9);
        assert!((model.predict(day(0)) - 100.0).abs() < 1e-6);
        assert!((model.predict(day(10)) - 200.0).abs() < 1e-6);
        assert!((model.predict(day(20)) - 300.0).abs() < 1e-6);
    }

    #[test]
    fn test_matches_manual_estimate() {
        let points = [obs(0, 1.0), obs(1, 3.0), obs(2, 2.0), obs(3, 5.0)];
        let model = TrendModel::fit(&points).unwrap();
        // sxy = 5.5, sxx = 5 (in days)
        assert!((model.slope_per_day() - 1.1).abs() < 1e-9);
        assert!((model.predict(day(0)) - 1.1).abs() < 1e-6);
        let r2 = model.r_squared(&points);
        assert!(r2 > 0.0 && r2 < 1.0);
    }

    #[test]
    fn test_order_independent() {
        let a = TrendModel::fit(&[obs(0, 1.0), obs(1, 3.0), obs(2, 2.0)]).unwrap();
        let b = TrendModel::fit(&[obs(2, 2.0), obs(0, 1.0), obs(1, 3.0)]).unwrap();
        assert!((a.slope - b.slope).abs() < 1e-15);
        assert!((a.intercept - b.intercept).abs() < 1e-6);
    }

    #[test]
    fn test_flat_values_give_zero_slope() {
        let model = TrendModel::fit(&[obs(0, 0.1), obs(1, 0.1), obs(2, 0.1)]).unwrap();
        assert_eq!(model.slope, 0.0);
        assert!(model.is_flat());
        assert_eq!(model.solve_for(1.0), None);
        assert_eq!(model.r_squared(&[obs(0, 0.1)]), 1.0);
    }

    #[test]
    fn test_single_point_is_insufficient() {
        let err = TrendModel::fit(&[obs(0, 50.0)]).unwrap_err();
        assert!(matches!(
            err,
            TrackerError::InsufficientData {
                required: 2,
                actual: 1
            }
        ));
    }

    #[test]
    fn test_duplicate_timestamps_are_insufficient() {
        let err = TrendModel::fit(&[obs(0, 1.0), obs(0, 2.0)]).unwrap_err();
        assert!(matches!(err, TrackerError::InsufficientData { actual: 1, .. }));
    }

    #[test]
    fn test_empty_is_insufficient() {
        assert!(TrendModel::fit(&[]).is_err());
    }

    #[test]
    fn test_non_finite_value_rejected() {
        let err = TrendModel::fit(&[obs(0, 1.0), obs(1, f64::NAN)]).unwrap_err();
        assert!(matches!(err, TrackerError::InvalidValue(_)));
    }

    #[test]
    fn test_precision_on_long_series() {
        let points: Vec<_> = (0..30).map(|d| obs(d, 1_000_000.0 + 2_500.0 * d as f64)).collect();
        let model = TrendModel::fit(&points).unwrap();
        assert!((model.slope_per_day() - 2_500.0).abs() < 1e-6);
        for p in &points {
            let rel = (model.predict(p.at) - p.value).abs() / p.value;
            assert!(rel < 1e-9);
        }
    }

    #[test]
    fn test_solve_for_inverts_predict() {
        let model = TrendModel::fit(&[obs(0, 10.0), obs(4, 30.0), obs(9, 41.0)]).unwrap();
        let t = model.solve_for(100.0).unwrap();
        assert!((model.predict_seconds(t) - 100.0).abs() < 1e-6);
    }
}
