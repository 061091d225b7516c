//! Duration inference and session segmentation.
//!
//! Both run in one linear pass over a subject's time-ascending observations:
//!
//! 1. Each observation lasts until the next one starts (any application).
//! 2. The lock-screen sentinel always lasts zero seconds.
//! 3. The final observation has no successor, so it gets the mean duration of
//!    earlier samples of the same application (capped), or a fixed default.
//! 4. Sessions are tracked per application: a sample more than
//!    `session_gap_secs` after the application's previous sample opens a new one.
//!    Lock samples are invisible to sessions, so a short lock between two
//!    samples of the same application does not split its session.

use std::collections::HashMap;

use serde::{Deserialize, Serialize};
use tracing::warn;

use crate::observation::{FocusObservation, TimedObservation, seconds_between};
use crate::types::{Timestamp, ValidationError};

/// Tuning knobs for duration inference and session segmentation.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct AggregationConfig {
    /// Gap in seconds after which the same application starts a new session.
    /// Default: 120.
    pub session_gap_secs: u64,

    /// Application name of the lock/idle screen. Compared case-insensitively.
    /// Default: `LockApp`.
    pub lock_app: String,

    /// Duration of a final sample with no same-app history. Default: 5.
    pub last_sample_default_secs: f64,

    /// Upper bound for the final sample's averaged duration. Default: 10.
    pub last_sample_cap_secs: f64,
}

impl Default for AggregationConfig {
    fn default() -> Self {
        Self {
            session_gap_secs: 120,
            lock_app: "LockApp".to_string(),
            last_sample_default_secs: 5.0,
            last_sample_cap_secs: 10.0,
        }
    }
}

impl AggregationConfig {
    /// Returns true if `app_name` is the lock/idle sentinel.
    pub fn is_lock(&self, app_name: &str) -> bool {
        app_name.eq_ignore_ascii_case(&self.lock_app)
    }

    /// Checks that durations are usable and the sentinel is named.
    pub fn validate(&self) -> Result<(), ValidationError> {
        if self.lock_app.trim().is_empty() {
            return Err(ValidationError::Empty { field: "lock_app" });
        }
        for value in [self.last_sample_default_secs, self.last_sample_cap_secs] {
            if !value.is_finite() || value < 0.0 {
                return Err(ValidationError::InvalidDuration { value });
            }
        }
        Ok(())
    }
}

/// A run of samples of one application without a gap above the threshold.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Session {
    pub app_name: String,
    pub start: Timestamp,
    pub end: Timestamp,
    pub observation_count: usize,
}

/// Output of [`annotate`].
#[derive(Debug, Clone, Default)]
pub struct AnnotatedPass {
    /// Observations with inferred durations, in input order.
    pub observations: Vec<TimedObservation>,

    /// Sessions in order of their first sample.
    pub sessions: Vec<Session>,

    /// Out-of-order pairs whose negative gap was clamped to zero.
    pub anomalies: usize,

    /// Samples discarded before inference (blank application name).
    pub dropped: usize,
}

/// Infers durations and segments sessions for time-ascending observations.
///
/// Never fails: malformed samples are dropped and negative gaps clamped, both
/// with a warning.
pub fn annotate(observations: Vec<FocusObservation>, config: &AggregationConfig) -> AnnotatedPass {
    let mut dropped = 0;
    let observations: Vec<FocusObservation> = observations
        .into_iter()
        .filter(|obs| {
            if obs.app_name.trim().is_empty() {
                warn!(subject = %obs.subject_id, timestamp = %obs.timestamp, "dropping observation without app name");
                dropped += 1;
                false
            } else {
                true
            }
        })
        .collect();

    let mut anomalies = 0;
    let mut durations = Vec::with_capacity(observations.len());
    let mut sessions = Sessions::new(config);

    for (i, obs) in observations.iter().enumerate() {
        let duration = if config.is_lock(&obs.app_name) {
            0.0
        } else if let Some(next) = observations.get(i + 1) {
            let gap = seconds_between(obs.timestamp, next.timestamp);
            if gap < 0.0 {
                warn!(
                    subject = %obs.subject_id,
                    timestamp = %obs.timestamp,
                    next = %next.timestamp,
                    "observations out of order, clamping duration to zero"
                );
                anomalies += 1;
                0.0
            } else {
                gap
            }
        } else {
            last_sample_duration(&observations[..i], &durations, &obs.app_name, config)
        };
        durations.push(duration);
        sessions.track(obs);
    }
    let sessions = sessions.finish();

    let observations = observations
        .into_iter()
        .zip(durations)
        .map(|(observation, duration_seconds)| TimedObservation {
            is_active: observation.focused,
            observation,
            duration_seconds,
        })
        .collect();

    AnnotatedPass {
        observations,
        sessions,
        anomalies,
        dropped,
    }
}

fn last_sample_duration(
    prior: &[FocusObservation],
    prior_durations: &[f64],
    app_name: &str,
    config: &AggregationConfig,
) -> f64 {
    let (sum, count) = prior
        .iter()
        .zip(prior_durations)
        .filter(|(obs, _)| obs.app_name == app_name)
        .fold((0.0, 0_usize), |(sum, count), (_, d)| (sum + d, count + 1));

    if count == 0 {
        config.last_sample_default_secs
    } else {
        (sum / count as f64).min(config.last_sample_cap_secs)
    }
}

/// Open session per application; locks are not tracked and do not close one.
struct Sessions<'a> {
    config: &'a AggregationConfig,
    sessions: Vec<Session>,
    // app name -> index of its open session
    open: HashMap<&'a str, usize>,
}

impl<'a> Sessions<'a> {
    fn new(config: &'a AggregationConfig) -> Self {
        Self {
            config,
            sessions: Vec::new(),
            open: HashMap::new(),
        }
    }

    fn track(&mut self, obs: &'a FocusObservation) {
        if self.config.is_lock(&obs.app_name) {
            return;
        }

        let gap_threshold = self.config.session_gap_secs as f64;
        let sessions = &self.sessions;
        let extend = self.open.get(obs.app_name.as_str()).copied().filter(|&idx| {
            seconds_between(sessions[idx].end, obs.timestamp) <= gap_threshold
        });

        if let Some(idx) = extend {
            let session = &mut self.sessions[idx];
            session.end = session.end.max(obs.timestamp);
            session.observation_count += 1;
        } else {
            self.open.insert(obs.app_name.as_str(), self.sessions.len());
            self.sessions.push(Session {
                app_name: obs.app_name.clone(),
                start: obs.timestamp,
                end: obs.timestamp,
                observation_count: 1,
            });
        }
    }

    fn finish(self) -> Vec<Session> {
        self.sessions
    }
}
