//! Focus telemetry aggregation engine.
//!
//! Turns raw "which application was in front" samples into hourly,
//! per-application usage statistics with a productivity category:
//! - Duration inference and session segmentation (`annotate`)
//! - Category classification against an injected registry
//! - Hourly folding into `HourlyUsageBucket`s
//! - Window recomputation and incremental ingestion over storage traits

mod aggregate;
mod category;
mod duration;
mod error;
mod ingest;
mod observation;
mod recompute;
mod store;
pub mod types;

#[cfg(test)]
mod testing;

pub use aggregate::{
    Aggregation, HourlyTotals, HourlyUsageBucket, PipelineConfig, WorkingHours, compute_buckets,
    fold_hourly,
};
pub use category::{Category, CategoryRegistry, Classifier, DEFAULT_CATEGORY_NAME, classify};
pub use duration::{AggregationConfig, AnnotatedPass, Session, annotate};
pub use error::{BoxError, EngineError};
pub use ingest::{IngestSummary, UsageReport, ingest_observations, ingest_usage};
pub use observation::{
    FocusObservation, TimedObservation, ceil_to_hour, floor_to_hour, seconds_between,
};
pub use recompute::{
    CancelFlag, MAX_HOURS_BACK, RecomputeReport, RecomputeState, RecomputeWindow, Recomputer,
    SubjectOutcome, SubjectScope, SubjectStatus,
};
pub use store::{EventSource, ReplaceOutcome, StatsStore, WritePhase};
pub use types::{CategoryId, ProductivityType, SubjectId, Timestamp, ValidationError};
