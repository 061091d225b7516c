//! Incremental ingestion: adds to existing buckets instead of replacing them.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use tracing::debug;

use crate::aggregate::{HourlyUsageBucket, PipelineConfig, compute_buckets};
use crate::category::{CategoryRegistry, classify};
use crate::error::EngineError;
use crate::observation::FocusObservation;
use crate::store::StatsStore;
use crate::types::{SubjectId, Timestamp, ValidationError};

/// Pre-aggregated usage reported for one application and hour.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct UsageReport {
    pub subject_id: SubjectId,
    pub app_name: String,
    #[serde(default)]
    pub window_name: String,
    /// Any instant within the hour; floored before storage.
    pub hour: Timestamp,
    pub duration_minutes: f64,

    /// Sessions this report adds to the bucket. Default: 1. A reporter that
    /// sends one report per minute of a single session should send 1 with
    /// the first report and 0 after it.
    #[serde(default = "one_session")]
    pub session_count: u32,
}

const fn one_session() -> u32 {
    1
}

impl UsageReport {
    pub fn validate(&self) -> Result<(), ValidationError> {
        if self.app_name.trim().is_empty() {
            return Err(ValidationError::Empty { field: "app name" });
        }
        if !self.duration_minutes.is_finite() || self.duration_minutes < 0.0 {
            return Err(ValidationError::InvalidDuration {
                value: self.duration_minutes,
            });
        }
        Ok(())
    }
}

/// Classifies a usage report and accumulates it into its hourly bucket.
///
/// Returns the delta that was added. Repeating a call adds the duration again.
pub fn ingest_usage<R, W>(
    report: &UsageReport,
    registry: &R,
    store: &W,
    config: &PipelineConfig,
    as_of: DateTime<Utc>,
) -> Result<HourlyUsageBucket, EngineError>
where
    R: CategoryRegistry + ?Sized,
    W: StatsStore + ?Sized,
{
    report.validate()?;

    let category_id = classify(registry, &report.app_name, &config.default_category)
        .map_err(EngineError::registry_err)?;

    let seconds = report.duration_minutes * 60.0;
    let mut bucket = HourlyUsageBucket::new(
        report.subject_id.clone(),
        report.app_name.clone(),
        report.hour,
        category_id,
        &config.working_hours,
        as_of,
    );
    bucket.total_time_seconds = seconds;
    bucket.active_time_seconds = seconds;
    bucket.session_count = report.session_count;
    bucket.dominant_window_name.clone_from(&report.window_name);

    store
        .upsert_or_accumulate(&bucket)
        .map_err(EngineError::store_err)?;
    debug!(
        subject = %bucket.subject_id,
        app = %bucket.app_name,
        hour = %bucket.hour_start,
        seconds,
        "usage accumulated"
    );
    Ok(bucket)
}

/// Counts from [`ingest_observations`].
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct IngestSummary {
    pub observations: usize,
    pub buckets: usize,
    pub anomalies: usize,
    pub dropped: usize,
}

/// Aggregates one batch of raw observations and accumulates every bucket.
///
/// Each batch is treated as self-contained: durations do not look at samples
/// from earlier batches.
pub fn ingest_observations<R, W>(
    subject_id: &SubjectId,
    observations: Vec<FocusObservation>,
    registry: &R,
    store: &W,
    config: &PipelineConfig,
    as_of: DateTime<Utc>,
) -> Result<IngestSummary, EngineError>
where
    R: CategoryRegistry + ?Sized,
    W: StatsStore + ?Sized,
{
    let aggregation = compute_buckets(subject_id, observations, registry, config, as_of)
        .map_err(EngineError::registry_err)?;

    for bucket in &aggregation.buckets {
        store
            .upsert_or_accumulate(bucket)
            .map_err(EngineError::store_err)?;
    }

    Ok(IngestSummary {
        observations: aggregation.observations,
        buckets: aggregation.buckets.len(),
        anomalies: aggregation.anomalies,
        dropped: aggregation.dropped,
    })
}
