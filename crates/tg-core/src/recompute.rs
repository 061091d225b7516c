//! Recomputation of hourly statistics for a time window.
//!
//! Each subject moves through `Fetching → Processing → Clearing → Writing`
//! and back to `Idle`; a failure at any step leaves that subject `Failed`
//! without touching the others. Subjects run in parallel on a bounded pool.

use std::fmt;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};

use chrono::{DateTime, TimeDelta, Utc};
use rayon::prelude::*;
use tracing::{debug, error, info};
use uuid::Uuid;

use crate::aggregate::{PipelineConfig, compute_buckets};
use crate::category::CategoryRegistry;
use crate::error::EngineError;
use crate::observation::{ceil_to_hour, floor_to_hour};
use crate::store::{EventSource, StatsStore, WritePhase};
use crate::types::{SubjectId, Timestamp, ValidationError};

/// Longest look-back accepted for a relative window, about a century.
pub const MAX_HOURS_BACK: u32 = 100 * 366 * 24;

/// Which subjects a recomputation covers.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SubjectScope {
    One(SubjectId),
    /// Every subject with observations in the window.
    All,
}

/// A half-open time window `[start, end)` to recompute.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RecomputeWindow {
    pub scope: SubjectScope,
    pub start: Timestamp,
    pub end: Timestamp,
}

impl RecomputeWindow {
    pub fn new(scope: SubjectScope, start: Timestamp, end: Timestamp) -> Result<Self, ValidationError> {
        if end <= start {
            return Err(ValidationError::InvalidWindow {
                start: start.to_rfc3339(),
                end: end.to_rfc3339(),
            });
        }
        Ok(Self { scope, start, end })
    }

    /// The window covering the last `hours` hours up to `now`.
    pub fn hours_back(scope: SubjectScope, hours: u32, now: Timestamp) -> Result<Self, ValidationError> {
        let too_long = ValidationError::LookBackTooLong {
            hours,
            max: MAX_HOURS_BACK,
        };
        if hours > MAX_HOURS_BACK {
            return Err(too_long);
        }
        let start = TimeDelta::try_hours(i64::from(hours))
            .and_then(|span| now.checked_sub_signed(span))
            .ok_or(too_long)?;
        Self::new(scope, start, now)
    }

    /// Widens the window outwards to whole hours.
    #[must_use]
    pub fn aligned(&self) -> Self {
        Self {
            scope: self.scope.clone(),
            start: floor_to_hour(self.start),
            end: ceil_to_hour(self.end),
        }
    }
}

/// Per-subject recomputation state.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RecomputeState {
    Idle,
    Fetching,
    Processing,
    Clearing,
    Writing,
    Failed,
}

impl RecomputeState {
    pub const fn as_str(&self) -> &'static str {
        match self {
            Self::Idle => "idle",
            Self::Fetching => "fetching",
            Self::Processing => "processing",
            Self::Clearing => "clearing",
            Self::Writing => "writing",
            Self::Failed => "failed",
        }
    }
}

impl fmt::Display for RecomputeState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl From<WritePhase> for RecomputeState {
    fn from(phase: WritePhase) -> Self {
        match phase {
            WritePhase::Clearing => Self::Clearing,
            WritePhase::Writing => Self::Writing,
        }
    }
}

/// Shared flag for stopping a run between subjects.
#[derive(Debug, Clone, Default)]
pub struct CancelFlag(Arc<AtomicBool>);

impl CancelFlag {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn cancel(&self) {
        self.0.store(true, Ordering::SeqCst);
    }

    pub fn is_cancelled(&self) -> bool {
        self.0.load(Ordering::SeqCst)
    }
}

/// How one subject's recomputation ended.
#[derive(Debug)]
pub enum SubjectStatus {
    Completed {
        observations: usize,
        cleared: usize,
        written: usize,
    },
    Failed {
        /// The step that failed.
        state: RecomputeState,
        error: EngineError,
    },
    /// Skipped because the run was cancelled; nothing was changed.
    Cancelled,
}

#[derive(Debug)]
pub struct SubjectOutcome {
    pub subject_id: SubjectId,
    pub status: SubjectStatus,
}

/// Result of a recomputation run.
#[derive(Debug)]
pub struct RecomputeReport {
    /// Correlates log lines from one run.
    pub run_id: Uuid,
    /// Aligned window start.
    pub start: Timestamp,
    /// Aligned window end.
    pub end: Timestamp,
    /// One entry per subject, ordered by subject ID.
    pub outcomes: Vec<SubjectOutcome>,
}

impl RecomputeReport {
    pub fn completed(&self) -> usize {
        self.count(|s| matches!(s, SubjectStatus::Completed { .. }))
    }

    pub fn failed(&self) -> usize {
        self.count(|s| matches!(s, SubjectStatus::Failed { .. }))
    }

    pub fn cancelled(&self) -> usize {
        self.count(|s| matches!(s, SubjectStatus::Cancelled))
    }

    /// Total buckets written across completed subjects.
    pub fn written(&self) -> usize {
        self.outcomes
            .iter()
            .map(|o| match o.status {
                SubjectStatus::Completed { written, .. } => written,
                _ => 0,
            })
            .sum()
    }

    pub fn is_success(&self) -> bool {
        self.failed() == 0 && self.cancelled() == 0
    }

    fn count(&self, pred: impl Fn(&SubjectStatus) -> bool) -> usize {
        self.outcomes.iter().filter(|o| pred(&o.status)).count()
    }
}

/// Regenerates hourly buckets from source observations.
pub struct Recomputer<'a, S, R, W> {
    source: &'a S,
    registry: &'a R,
    store: &'a W,
    config: &'a PipelineConfig,
    cancel: CancelFlag,
    workers: usize,
}

impl<'a, S, R, W> Recomputer<'a, S, R, W>
where
    S: EventSource + Sync,
    R: CategoryRegistry + Sync,
    W: StatsStore + Sync,
{
    pub fn new(source: &'a S, registry: &'a R, store: &'a W, config: &'a PipelineConfig) -> Self {
        Self {
            source,
            registry,
            store,
            config,
            cancel: CancelFlag::default(),
            workers: 0,
        }
    }

    /// Caps the number of subjects processed at once. Zero means one per core.
    #[must_use]
    pub const fn with_workers(mut self, workers: usize) -> Self {
        self.workers = workers;
        self
    }

    #[must_use]
    pub fn with_cancel(mut self, cancel: CancelFlag) -> Self {
        self.cancel = cancel;
        self
    }

    /// Recomputes every subject in the window.
    ///
    /// The window is widened to whole hours first. Returns an error only if
    /// the subject list or the worker pool cannot be obtained; per-subject
    /// failures are reported in the outcome list.
    pub fn recompute(
        &self,
        window: &RecomputeWindow,
        as_of: DateTime<Utc>,
    ) -> Result<RecomputeReport, EngineError> {
        let run_id = Uuid::new_v4();
        let window = window.aligned();

        let mut subjects = match &window.scope {
            SubjectScope::One(subject) => vec![subject.clone()],
            SubjectScope::All => self
                .source
                .list_subjects(window.start, window.end)
                .map_err(EngineError::source_err)?,
        };
        subjects.sort();
        subjects.dedup();

        info!(
            %run_id,
            start = %window.start,
            end = %window.end,
            subjects = subjects.len(),
            "recomputing hourly statistics"
        );

        let pool = rayon::ThreadPoolBuilder::new()
            .num_threads(self.workers)
            .build()?;
        let outcomes: Vec<SubjectOutcome> = pool.install(|| {
            subjects
                .par_iter()
                .map(|subject| SubjectOutcome {
                    subject_id: subject.clone(),
                    status: self.recompute_subject(run_id, subject, &window, as_of),
                })
                .collect()
        });

        let report = RecomputeReport {
            run_id,
            start: window.start,
            end: window.end,
            outcomes,
        };
        info!(
            %run_id,
            completed = report.completed(),
            failed = report.failed(),
            cancelled = report.cancelled(),
            written = report.written(),
            "recomputation finished"
        );
        Ok(report)
    }

    fn recompute_subject(
        &self,
        run_id: Uuid,
        subject: &SubjectId,
        window: &RecomputeWindow,
        as_of: DateTime<Utc>,
    ) -> SubjectStatus {
        if self.cancel.is_cancelled() {
            info!(%run_id, %subject, "recomputation cancelled before start");
            return SubjectStatus::Cancelled;
        }

        let fail = |state: RecomputeState, error: EngineError| {
            error!(
                %run_id,
                %subject,
                start = %window.start,
                end = %window.end,
                %state,
                %error,
                "subject recomputation failed"
            );
            SubjectStatus::Failed { state, error }
        };

        transition(run_id, subject, RecomputeState::Fetching);
        let observations = match self
            .source
            .fetch_observations(subject, window.start, window.end)
        {
            Ok(observations) => observations,
            Err(e) => return fail(RecomputeState::Fetching, EngineError::source_err(e)),
        };

        transition(run_id, subject, RecomputeState::Processing);
        let aggregation =
            match compute_buckets(subject, observations, self.registry, self.config, as_of) {
                Ok(aggregation) => aggregation,
                Err(e) => return fail(RecomputeState::Processing, EngineError::registry_err(e)),
            };

        let mut state = RecomputeState::Clearing;
        let result = self.store.replace_window(
            subject,
            window.start,
            window.end,
            &aggregation.buckets,
            &mut |phase| {
                state = phase.into();
                transition(run_id, subject, state);
            },
        );

        match result {
            Ok(outcome) => {
                transition(run_id, subject, RecomputeState::Idle);
                debug!(
                    %run_id,
                    %subject,
                    observations = aggregation.observations,
                    anomalies = aggregation.anomalies,
                    dropped = aggregation.dropped,
                    cleared = outcome.cleared,
                    written = outcome.written,
                    "subject recomputed"
                );
                SubjectStatus::Completed {
                    observations: aggregation.observations,
                    cleared: outcome.cleared,
                    written: outcome.written,
                }
            }
            Err(e) => fail(state, EngineError::store_err(e)),
        }
    }
}

fn transition(run_id: Uuid, subject: &SubjectId, state: RecomputeState) {
    debug!(%run_id, %subject, %state, "state transition");
}
