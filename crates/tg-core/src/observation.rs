//! Focus observations and hour-boundary arithmetic.

use chrono::{TimeDelta, Timelike};
use serde::{Deserialize, Serialize};

use crate::types::{SubjectId, Timestamp};

/// A raw focus sample reported by a monitored endpoint.
///
/// Observations are point samples: the duration of each one is inferred from
/// the gap to the next sample (see [`crate::annotate`]).
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct FocusObservation {
    /// When the sample was taken, in the processing zone.
    pub timestamp: Timestamp,

    /// The endpoint that produced the sample.
    pub subject_id: SubjectId,

    /// Application that owned the foreground window.
    pub app_name: String,

    /// Title of the foreground window.
    #[serde(default)]
    pub window_name: String,

    /// Whether the window held input focus.
    #[serde(default = "default_focused")]
    pub focused: bool,
}

const fn default_focused() -> bool {
    true
}

/// An observation with its inferred duration. Never persisted.
#[derive(Debug, Clone, PartialEq)]
pub struct TimedObservation {
    pub observation: FocusObservation,

    /// Inferred seconds attributed to this sample. Always `>= 0`.
    pub duration_seconds: f64,

    /// Whether the duration counts as active (focused) time.
    pub is_active: bool,
}

/// Truncates a timestamp to the start of its wall-clock hour.
pub fn floor_to_hour(ts: Timestamp) -> Timestamp {
    let into_hour = TimeDelta::seconds(i64::from(ts.minute()) * 60 + i64::from(ts.second()))
        + TimeDelta::nanoseconds(i64::from(ts.nanosecond()));
    ts - into_hour
}

/// Rounds a timestamp up to the next hour boundary (identity on a boundary).
pub fn ceil_to_hour(ts: Timestamp) -> Timestamp {
    let floored = floor_to_hour(ts);
    if floored == ts {
        ts
    } else {
        floored + TimeDelta::hours(1)
    }
}

/// Signed seconds from `from` to `to`, at millisecond resolution.
pub fn seconds_between(from: Timestamp, to: Timestamp) -> f64 {
    (to - from).num_milliseconds() as f64 / 1000.0
}
