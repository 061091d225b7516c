//! Hourly per-application aggregation.

use std::collections::BTreeMap;

use chrono::{DateTime, Datelike, Timelike, Utc, Weekday};
use serde::{Deserialize, Serialize};

use crate::category::{CategoryRegistry, Classifier, DEFAULT_CATEGORY_NAME};
use crate::duration::{AggregationConfig, AnnotatedPass, annotate};
use crate::observation::{FocusObservation, floor_to_hour};
use crate::types::{CategoryId, SubjectId, Timestamp, ValidationError};

/// Local working schedule used to flag buckets.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct WorkingHours {
    /// First working hour, inclusive. Default: 9.
    pub start_hour: u32,

    /// End of the working day, exclusive. Default: 18.
    pub end_hour: u32,

    /// Working days. Default: Monday to Friday.
    pub weekdays: Vec<Weekday>,
}

impl Default for WorkingHours {
    fn default() -> Self {
        Self {
            start_hour: 9,
            end_hour: 18,
            weekdays: vec![
                Weekday::Mon,
                Weekday::Tue,
                Weekday::Wed,
                Weekday::Thu,
                Weekday::Fri,
            ],
        }
    }
}

impl WorkingHours {
    /// Returns true if the local hour containing `ts` is a working hour.
    pub fn is_working(&self, ts: Timestamp) -> bool {
        self.weekdays.contains(&ts.weekday())
            && (self.start_hour..self.end_hour).contains(&ts.hour())
    }

    pub fn validate(&self) -> Result<(), ValidationError> {
        for value in [self.start_hour, self.end_hour] {
            if value > 24 {
                return Err(ValidationError::InvalidHour { value });
            }
        }
        Ok(())
    }
}

/// Everything needed to turn observations into buckets.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct PipelineConfig {
    pub aggregation: AggregationConfig,
    pub working_hours: WorkingHours,

    /// Category assigned to applications nothing else matches.
    pub default_category: String,
}

impl Default for PipelineConfig {
    fn default() -> Self {
        Self {
            aggregation: AggregationConfig::default(),
            working_hours: WorkingHours::default(),
            default_category: DEFAULT_CATEGORY_NAME.to_string(),
        }
    }
}

impl PipelineConfig {
    pub fn validate(&self) -> Result<(), ValidationError> {
        self.aggregation.validate()?;
        self.working_hours.validate()?;
        if self.default_category.trim().is_empty() {
            return Err(ValidationError::Empty {
                field: "default category",
            });
        }
        Ok(())
    }
}

/// Usage of one application by one subject during one local hour.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct HourlyUsageBucket {
    pub subject_id: SubjectId,
    pub app_name: String,

    /// Start of the local wall-clock hour.
    pub hour_start: Timestamp,

    pub hour_of_day: u32,

    /// Days from Monday (0) to Sunday (6).
    pub day_of_week: u32,

    pub is_working_hour: bool,
    pub total_time_seconds: f64,
    pub active_time_seconds: f64,
    pub session_count: u32,

    /// Window with the most time in this hour.
    pub dominant_window_name: String,

    pub category_id: CategoryId,
    pub updated_at: DateTime<Utc>,
}

impl HourlyUsageBucket {
    /// Creates an empty bucket for the hour containing `at`.
    pub fn new(
        subject_id: SubjectId,
        app_name: impl Into<String>,
        at: Timestamp,
        category_id: CategoryId,
        working_hours: &WorkingHours,
        updated_at: DateTime<Utc>,
    ) -> Self {
        let hour_start = floor_to_hour(at);
        Self {
            subject_id,
            app_name: app_name.into(),
            hour_start,
            hour_of_day: hour_start.hour(),
            day_of_week: hour_start.weekday().num_days_from_monday(),
            is_working_hour: working_hours.is_working(hour_start),
            total_time_seconds: 0.0,
            active_time_seconds: 0.0,
            session_count: 0,
            dominant_window_name: String::new(),
            category_id,
            updated_at,
        }
    }
}

/// Running totals for one `(hour, app)` key.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct HourlyTotals {
    pub total_seconds: f64,
    pub active_seconds: f64,
    pub session_count: u32,
    pub window_seconds: BTreeMap<String, f64>,
}

impl HourlyTotals {
    /// Window with the greatest cumulative time; ties go to the smallest name.
    pub fn dominant_window(&self) -> Option<&str> {
        let mut best: Option<(&str, f64)> = None;
        for (name, &seconds) in &self.window_seconds {
            if best.is_none_or(|(_, top)| seconds > top) {
                best = Some((name, seconds));
            }
        }
        best.map(|(name, _)| name)
    }
}

/// Folds an annotated pass into totals keyed by `(hour_start, app_name)`.
///
/// Lock-sentinel samples and keys with zero total time are left out.
pub fn fold_hourly(
    pass: &AnnotatedPass,
    config: &AggregationConfig,
) -> BTreeMap<(Timestamp, String), HourlyTotals> {
    let mut buckets: BTreeMap<(Timestamp, String), HourlyTotals> = BTreeMap::new();

    for timed in &pass.observations {
        let obs = &timed.observation;
        if config.is_lock(&obs.app_name) {
            continue;
        }

        let totals = buckets
            .entry((floor_to_hour(obs.timestamp), obs.app_name.clone()))
            .or_default();
        totals.total_seconds += timed.duration_seconds;
        if timed.is_active {
            totals.active_seconds += timed.duration_seconds;
        }
        *totals
            .window_seconds
            .entry(obs.window_name.clone())
            .or_default() += timed.duration_seconds;
    }

    for session in &pass.sessions {
        let key = (floor_to_hour(session.start), session.app_name.clone());
        if let Some(totals) = buckets.get_mut(&key) {
            totals.session_count += 1;
        }
    }

    buckets.retain(|_, totals| totals.total_seconds > 0.0);
    buckets
}

/// Buckets produced from one subject's observations.
#[derive(Debug, Clone, Default)]
pub struct Aggregation {
    /// Sorted by `(hour_start, app_name)`.
    pub buckets: Vec<HourlyUsageBucket>,
    pub observations: usize,
    pub anomalies: usize,
    pub dropped: usize,
}

/// Runs duration inference, session segmentation, classification and hourly
/// folding over one subject's time-ascending observations.
///
/// Categories are cached for this call only. Fails only if the default
/// category cannot be obtained.
pub fn compute_buckets<R: CategoryRegistry + ?Sized>(
    subject_id: &SubjectId,
    observations: Vec<FocusObservation>,
    registry: &R,
    config: &PipelineConfig,
    as_of: DateTime<Utc>,
) -> Result<Aggregation, R::Error> {
    let observation_count = observations.len();
    let pass = annotate(observations, &config.aggregation);
    let totals = fold_hourly(&pass, &config.aggregation);

    let mut classifier = Classifier::new(registry, &config.default_category);
    let mut buckets = Vec::with_capacity(totals.len());

    for ((hour_start, app_name), totals) in totals {
        let category_id = classifier.classify(&app_name)?;
        let mut bucket = HourlyUsageBucket::new(
            subject_id.clone(),
            app_name,
            hour_start,
            category_id,
            &config.working_hours,
            as_of,
        );
        bucket.total_time_seconds = totals.total_seconds;
        bucket.active_time_seconds = totals.active_seconds;
        bucket.session_count = totals.session_count;
        bucket.dominant_window_name = totals.dominant_window().unwrap_or_default().to_string();
        buckets.push(bucket);
    }

    Ok(Aggregation {
        buckets,
        observations: observation_count,
        anomalies: pass.anomalies,
        dropped: pass.dropped,
    })
}
