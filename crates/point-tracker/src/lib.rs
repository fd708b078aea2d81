//! Point Tracker: trend fitting and target-date projection for tracked point series.

pub mod model_store;
pub mod projection;
pub mod regression;
pub mod roster;
pub mod storage;
pub mod types;
pub mod window;

pub use model_store::ModelStore;
pub use projection::{
    predict, summarize, when_target, OverlayPoint, Projection, StreamerSummary, TrendOverlay,
    UnknownReason,
};
pub use regression::{TrendModel, SECONDS_PER_DAY};
pub use roster::{parse_date, Roster, RosterReader, RosterWriter};
pub use storage::{ModelReader, ModelWriter};
pub use types::*;
pub use window::{WindowPolicy, DEFAULT_WINDOW_DAYS};
