//! Collaborator traits for reading observations and persisting buckets.

use crate::aggregate::HourlyUsageBucket;
use crate::observation::FocusObservation;
use crate::types::{SubjectId, Timestamp};

/// Read access to raw focus observations.
///
/// Implementations return timestamps already normalized to the processing
/// zone. Windows are half-open: `start <= timestamp < end`.
pub trait EventSource {
    type Error: std::error::Error + Send + Sync + 'static;

    /// Subjects with at least one observation in the window.
    fn list_subjects(&self, start: Timestamp, end: Timestamp)
    -> Result<Vec<SubjectId>, Self::Error>;

    /// One subject's observations in the window, ascending by timestamp.
    fn fetch_observations(
        &self,
        subject: &SubjectId,
        start: Timestamp,
        end: Timestamp,
    ) -> Result<Vec<FocusObservation>, Self::Error>;
}

/// Step of a window replacement, reported as it begins.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum WritePhase {
    Clearing,
    Writing,
}

/// Row counts from [`StatsStore::replace_window`].
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct ReplaceOutcome {
    pub cleared: usize,
    pub written: usize,
}

/// Persistent store of hourly usage buckets.
pub trait StatsStore {
    type Error: std::error::Error + Send + Sync + 'static;

    /// Deletes a subject's buckets with `start <= hour_start < end`.
    /// Returns the number of rows removed; an empty window is a no-op.
    fn clear(
        &self,
        subject: &SubjectId,
        start: Timestamp,
        end: Timestamp,
    ) -> Result<usize, Self::Error>;

    /// Adds the bucket's totals and session count to an existing row, or
    /// inserts it. Used by incremental ingestion.
    fn upsert_or_accumulate(&self, bucket: &HourlyUsageBucket) -> Result<(), Self::Error>;

    /// Writes buckets, replacing any row with the same key.
    fn batch_write(&self, buckets: &[HourlyUsageBucket]) -> Result<usize, Self::Error>;

    /// Clears the window then writes `buckets` into it.
    ///
    /// `on_phase` is called as each step starts. The default runs the two
    /// steps back to back; transactional stores override it so the pair
    /// commits atomically. Overrides should also keep the stored
    /// `updated_at` of rows whose statistics did not change.
    fn replace_window(
        &self,
        subject: &SubjectId,
        start: Timestamp,
        end: Timestamp,
        buckets: &[HourlyUsageBucket],
        on_phase: &mut dyn FnMut(WritePhase),
    ) -> Result<ReplaceOutcome, Self::Error> {
        on_phase(WritePhase::Clearing);
        let cleared = self.clear(subject, start, end)?;
        on_phase(WritePhase::Writing);
        let written = self.batch_write(buckets)?;
        Ok(ReplaceOutcome { cleared, written })
    }
}
