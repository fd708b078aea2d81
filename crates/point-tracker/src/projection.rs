//! Target-date projection and the per-streamer views built on it.

use std::fmt;

use chrono::{DateTime, SubsecRound, Utc};
use serde::{Deserialize, Serialize};

use crate::regression::TrendModel;
use crate::types::{Observation, Streamer};

/// Why no estimate exists.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum UnknownReason {
    /// Fewer than two usable observations, or no fitted model.
    InsufficientData,
    /// The fitted slope is zero, so the target is never reached.
    FlatTrend,
    /// The streamer has no target.
    NoTarget,
    /// The solved instant is not a representable date.
    OutOfRange,
}

impl fmt::Display for UnknownReason {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let text = match self {
            UnknownReason::InsufficientData => "not enough data",
            UnknownReason::FlatTrend => "flat trend",
            UnknownReason::NoTarget => "no target set",
            UnknownReason::OutOfRange => "date out of range",
        };
        f.write_str(text)
    }
}

/// Estimated instant at which a streamer reaches its target.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "status", rename_all = "snake_case")]
pub enum Projection {
    Reached { at: DateTime<Utc> },
    Unknown { reason: UnknownReason },
}

impl Projection {
    pub fn unknown(reason: UnknownReason) -> Self {
        Projection::Unknown { reason }
    }

    /// The estimated instant, if one exists.
    pub fn date(&self) -> Option<DateTime<Utc>> {
        match self {
            Projection::Reached { at } => Some(*at),
            Projection::Unknown { .. } => None,
        }
    }

    pub fn is_unknown(&self) -> bool {
        matches!(self, Projection::Unknown { .. })
    }
}

impl fmt::Display for Projection {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Projection::Reached { at } => {
                write!(f, "{} UTC", at.round_subsecs(0).format("%Y-%m-%d %H:%M:%S"))
            }
            Projection::Unknown { .. } => f.write_str("N/A"),
        }
    }
}

/// Evaluate the streamer's trend at `at`.
///
/// Returns `None` when the streamer has fewer than two observations or no model.
pub fn predict(streamer: &Streamer, model: Option<&TrendModel>, at: DateTime<Utc>) -> Option<f64> {
    if streamer.count() < 2 {
        return None;
    }
    model.map(|m| m.predict(at))
}

/// Solve the streamer's trend for its target value.
pub fn when_target(streamer: &Streamer, model: Option<&TrendModel>) -> Projection {
    let model = match model {
        Some(m) if streamer.count() >= 2 => m,
        _ => return Projection::unknown(UnknownReason::InsufficientData),
    };

    if model.is_flat() {
        return Projection::unknown(UnknownReason::FlatTrend);
    }

    let target = match streamer.target {
        Some(t) => t,
        None => return Projection::unknown(UnknownReason::NoTarget),
    };

    match model.solve_for(target).and_then(instant_from_seconds) {
        Some(at) => Projection::Reached { at },
        None => Projection::unknown(UnknownReason::OutOfRange),
    }
}

/// Convert fractional epoch seconds to an instant, keeping the sub-second part.
fn instant_from_seconds(seconds: f64) -> Option<DateTime<Utc>> {
    if !seconds.is_finite() {
        return None;
    }
    let whole = seconds.floor();
    let nanos = ((seconds - whole) * 1e9).round().min(999_999_999.0) as u32;

    // i64 casts saturate, so out-of-range values fail the comparison below.
    let at = DateTime::from_timestamp(whole as i64, nanos)?;
    ((at.timestamp() as f64) == whole).then_some(at)
}

/// Row-level view for the display layer.
#[derive(Debug, Clone, Serialize)]
pub struct StreamerSummary {
    pub name: String,
    pub current_value: Option<f64>,
    pub target: Option<f64>,
    /// `value / target * 100`; absent without a (non-zero) target.
    pub percent_complete: Option<f64>,
    pub estimate: Projection,
}

/// Build the display row for one streamer.
pub fn summarize(streamer: &Streamer, model: Option<&TrendModel>) -> StreamerSummary {
    let current_value = streamer.current_value();
    let percent_complete = match (current_value, streamer.target) {
        (Some(value), Some(target)) if target != 0.0 => Some(value / target * 100.0),
        _ => None,
    };

    StreamerSummary {
        name: streamer.name.clone(),
        current_value,
        target: streamer.target,
        percent_complete,
        estimate: when_target(streamer, model),
    }
}

/// One point of a chart overlay.
#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
pub struct OverlayPoint {
    pub at: DateTime<Utc>,
    pub observed: f64,
    pub fitted: Option<f64>,
}

/// Series plus fitted-line values, for the chart layer.
#[derive(Debug, Clone, Serialize)]
pub struct TrendOverlay {
    pub name: String,
    pub points: Vec<OverlayPoint>,
}

impl TrendOverlay {
    /// Pair each observation with the model's value at the same instant.
    ///
    /// `series` is expected in display order; it is used as given.
    pub fn build(name: &str, series: &[Observation], model: Option<&TrendModel>) -> Self {
        let points = series
            .iter()
            .map(|o| OverlayPoint {
                at: o.at,
                observed: o.value,
                fitted: model.map(|m| m.predict(o.at)),
            })
            .collect();

        Self {
            name: name.to_string(),
            points,
        }
    }
}
