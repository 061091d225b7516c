//! Hourly usage statistics: the stats store and its read-side queries.

use std::collections::HashMap;

use chrono::{DateTime, NaiveDate, Utc};
use rusqlite::{Connection, Row, params};
use serde::Serialize;
use tg_core::{
    CategoryId, HourlyUsageBucket, ProductivityType, ReplaceOutcome, StatsStore, SubjectId,
    Timestamp, WritePhase,
};
use tracing::debug;

use crate::{Database, DbError, format_timestamp, parse_offset, parse_timestamp};

macro_rules! insert_bucket_sql {
    () => {
        "
        INSERT INTO hourly_app_usage (
            subject_id, app_name, hour_start, utc_offset_secs, usage_date,
            hour_of_day, day_of_week, is_working_hour,
            total_time_seconds, active_time_seconds, session_count,
            dominant_window_name, category_id, updated_at
        )
        VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10, ?11, ?12, ?13, ?14)
        "
    };
}

/// Adds to an existing row's totals; keeps its window unless a new one is given.
const ACCUMULATE_SQL: &str = concat!(
    insert_bucket_sql!(),
    "
    ON CONFLICT(subject_id, app_name, hour_start) DO UPDATE SET
        total_time_seconds = total_time_seconds + excluded.total_time_seconds,
        active_time_seconds = active_time_seconds + excluded.active_time_seconds,
        session_count = session_count + excluded.session_count,
        dominant_window_name = CASE
            WHEN excluded.dominant_window_name <> '' THEN excluded.dominant_window_name
            ELSE dominant_window_name
        END,
        category_id = excluded.category_id,
        updated_at = excluded.updated_at
    "
);

/// Overwrites every column of an existing row.
const REPLACE_SQL: &str = concat!(
    insert_bucket_sql!(),
    "
    ON CONFLICT(subject_id, app_name, hour_start) DO UPDATE SET
        utc_offset_secs = excluded.utc_offset_secs,
        usage_date = excluded.usage_date,
        hour_of_day = excluded.hour_of_day,
        day_of_week = excluded.day_of_week,
        is_working_hour = excluded.is_working_hour,
        total_time_seconds = excluded.total_time_seconds,
        active_time_seconds = excluded.active_time_seconds,
        session_count = excluded.session_count,
        dominant_window_name = excluded.dominant_window_name,
        category_id = excluded.category_id,
        updated_at = excluded.updated_at
    "
);

const BUCKET_COLUMNS: &str = "
    subject_id, app_name, hour_start, utc_offset_secs, hour_of_day, day_of_week,
    is_working_hour, total_time_seconds, active_time_seconds, session_count,
    dominant_window_name, category_id, updated_at
";

const FILTER_CLAUSE: &str = "
    WHERE (?1 IS NULL OR subject_id = ?1)
      AND (?2 IS NULL OR app_name = ?2 COLLATE NOCASE)
      AND (?3 IS NULL OR category_id = ?3)
      AND (?4 IS NULL OR usage_date >= ?4)
      AND (?5 IS NULL OR usage_date <= ?5)
";

/// Filters for listing hourly usage. Dates are local calendar dates, inclusive.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct UsageFilter {
    pub subject_id: Option<SubjectId>,
    pub app_name: Option<String>,
    pub category_id: Option<CategoryId>,
    pub start_date: Option<NaiveDate>,
    pub end_date: Option<NaiveDate>,
    pub limit: Option<usize>,
    pub offset: usize,
}

/// Seconds of usage per productivity type.
#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize)]
pub struct ProductivitySummary {
    pub productive_seconds: f64,
    pub neutral_seconds: f64,
    pub distracting_seconds: f64,
}

impl ProductivitySummary {
    pub fn total_seconds(&self) -> f64 {
        self.productive_seconds + self.neutral_seconds + self.distracting_seconds
    }

    /// Percentage of total time spent in `productivity_type`; 0 when empty.
    pub fn percent(&self, productivity_type: ProductivityType) -> f64 {
        let total = self.total_seconds();
        if total <= 0.0 {
            return 0.0;
        }
        let part = match productivity_type {
            ProductivityType::Productive => self.productive_seconds,
            ProductivityType::Neutral => self.neutral_seconds,
            ProductivityType::Distracting => self.distracting_seconds,
        };
        part / total * 100.0
    }
}

/// One application's usage on one local day.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct DailyAppUsage {
    pub date: NaiveDate,
    pub app_name: String,
    pub total_time_seconds: f64,
    pub active_time_seconds: f64,
    pub session_count: u32,
    pub category_name: String,
    pub productivity_type: ProductivityType,
}

struct BucketRow {
    subject_id: String,
    app_name: String,
    hour_start: String,
    utc_offset_secs: i64,
    hour_of_day: u32,
    day_of_week: u32,
    is_working_hour: bool,
    total_time_seconds: f64,
    active_time_seconds: f64,
    session_count: u32,
    dominant_window_name: String,
    category_id: CategoryId,
    updated_at: String,
}

impl BucketRow {
    fn read(row: &Row<'_>) -> rusqlite::Result<Self> {
        Ok(Self {
            subject_id: row.get(0)?,
            app_name: row.get(1)?,
            hour_start: row.get(2)?,
            utc_offset_secs: row.get(3)?,
            hour_of_day: row.get(4)?,
            day_of_week: row.get(5)?,
            is_working_hour: row.get(6)?,
            total_time_seconds: row.get(7)?,
            active_time_seconds: row.get(8)?,
            session_count: row.get(9)?,
            dominant_window_name: row.get(10)?,
            category_id: row.get(11)?,
            updated_at: row.get(12)?,
        })
    }

    fn into_bucket(self) -> Result<HourlyUsageBucket, DbError> {
        let offset = parse_offset(self.utc_offset_secs)?;
        Ok(HourlyUsageBucket {
            subject_id: SubjectId::new(self.subject_id)?,
            app_name: self.app_name,
            hour_start: parse_timestamp(&self.hour_start)?.with_timezone(&offset),
            hour_of_day: self.hour_of_day,
            day_of_week: self.day_of_week,
            is_working_hour: self.is_working_hour,
            total_time_seconds: self.total_time_seconds,
            active_time_seconds: self.active_time_seconds,
            session_count: self.session_count,
            dominant_window_name: self.dominant_window_name,
            category_id: self.category_id,
            updated_at: parse_timestamp(&self.updated_at)?,
        })
    }
}

fn write_bucket(conn: &Connection, sql: &str, bucket: &HourlyUsageBucket) -> Result<(), DbError> {
    let mut stmt = conn.prepare_cached(sql)?;
    stmt.execute(params![
        bucket.subject_id.as_str(),
        bucket.app_name,
        format_timestamp(&bucket.hour_start),
        bucket.hour_start.offset().local_minus_utc(),
        bucket.hour_start.date_naive().to_string(),
        bucket.hour_of_day,
        bucket.day_of_week,
        bucket.is_working_hour,
        bucket.total_time_seconds,
        bucket.active_time_seconds,
        bucket.session_count,
        bucket.dominant_window_name,
        bucket.category_id,
        format_timestamp(&bucket.updated_at),
    ])?;
    Ok(())
}

fn clear_window(
    conn: &Connection,
    subject: &SubjectId,
    start: Timestamp,
    end: Timestamp,
) -> Result<usize, DbError> {
    if end <= start {
        return Ok(0);
    }
    let cleared = conn.execute(
        "
        DELETE FROM hourly_app_usage
        WHERE subject_id = ? AND hour_start >= ? AND hour_start < ?
        ",
        params![
            subject.as_str(),
            format_timestamp(&start),
            format_timestamp(&end)
        ],
    )?;
    Ok(cleared)
}

/// Rows already stored for the window, keyed by app and stored hour.
fn stored_window(
    conn: &Connection,
    subject: &SubjectId,
    start: Timestamp,
    end: Timestamp,
) -> Result<HashMap<(String, String), HourlyUsageBucket>, DbError> {
    let mut stmt = conn.prepare(&format!(
        "
        SELECT {BUCKET_COLUMNS}
        FROM hourly_app_usage
        WHERE subject_id = ? AND hour_start >= ? AND hour_start < ?
        "
    ))?;
    let rows = stmt.query_map(
        params![
            subject.as_str(),
            format_timestamp(&start),
            format_timestamp(&end)
        ],
        BucketRow::read,
    )?;

    let mut stored = HashMap::new();
    for row in rows {
        let bucket = row?.into_bucket()?;
        let key = (bucket.app_name.clone(), format_timestamp(&bucket.hour_start));
        stored.insert(key, bucket);
    }
    Ok(stored)
}

/// Equal in every column except `updated_at`.
fn same_statistics(stored: &HourlyUsageBucket, fresh: &HourlyUsageBucket) -> bool {
    stored.hour_start.offset() == fresh.hour_start.offset()
        && *stored
            == HourlyUsageBucket {
                updated_at: stored.updated_at,
                ..fresh.clone()
            }
}

fn parse_date(value: &str) -> Result<NaiveDate, DbError> {
    NaiveDate::parse_from_str(value, "%Y-%m-%d").map_err(|source| DbError::TimestampParse {
        value: value.to_string(),
        source,
    })
}

impl StatsStore for Database {
    type Error = DbError;

    fn clear(&self, subject: &SubjectId, start: Timestamp, end: Timestamp) -> Result<usize, DbError> {
        clear_window(&self.conn(), subject, start, end)
    }

    fn upsert_or_accumulate(&self, bucket: &HourlyUsageBucket) -> Result<(), DbError> {
        write_bucket(&self.conn(), ACCUMULATE_SQL, bucket)
    }

    fn batch_write(&self, buckets: &[HourlyUsageBucket]) -> Result<usize, DbError> {
        if buckets.is_empty() {
            return Ok(0);
        }
        let mut conn = self.conn();
        let tx = conn.transaction()?;
        for bucket in buckets {
            write_bucket(&tx, REPLACE_SQL, bucket)?;
        }
        tx.commit()?;
        Ok(buckets.len())
    }

    /// Clears and writes inside one transaction: either both land or neither.
    ///
    /// A bucket whose statistics match the row it replaces keeps that row's
    /// `updated_at`, so rebuilding unchanged data leaves the table identical.
    fn replace_window(
        &self,
        subject: &SubjectId,
        start: Timestamp,
        end: Timestamp,
        buckets: &[HourlyUsageBucket],
        on_phase: &mut dyn FnMut(WritePhase),
    ) -> Result<ReplaceOutcome, DbError> {
        let mut conn = self.conn();
        let tx = conn.transaction()?;

        on_phase(WritePhase::Clearing);
        let stored = stored_window(&tx, subject, start, end)?;
        let cleared = clear_window(&tx, subject, start, end)?;

        on_phase(WritePhase::Writing);
        let mut unchanged = 0;
        for bucket in buckets {
            let key = (bucket.app_name.clone(), format_timestamp(&bucket.hour_start));
            match stored.get(&key) {
                Some(previous) if same_statistics(previous, bucket) => {
                    unchanged += 1;
                    let kept = HourlyUsageBucket {
                        updated_at: previous.updated_at,
                        ..bucket.clone()
                    };
                    write_bucket(&tx, REPLACE_SQL, &kept)?;
                }
                _ => write_bucket(&tx, REPLACE_SQL, bucket)?,
            }
        }
        debug!(%subject, cleared, written = buckets.len(), unchanged, "window replaced");

        tx.commit()?;
        Ok(ReplaceOutcome {
            cleared,
            written: buckets.len(),
        })
    }
}

impl Database {
    /// Lists hourly usage ordered by hour, subject, then application.
    pub fn list_hourly_usage(&self, filter: &UsageFilter) -> Result<Vec<HourlyUsageBucket>, DbError> {
        let limit = filter
            .limit
            .map_or(-1, |limit| i64::try_from(limit).unwrap_or(i64::MAX));
        let offset = i64::try_from(filter.offset).unwrap_or(i64::MAX);

        let conn = self.conn();
        let mut stmt = conn.prepare(&format!(
            "
            SELECT {BUCKET_COLUMNS}
            FROM hourly_app_usage
            {FILTER_CLAUSE}
            ORDER BY hour_start ASC, subject_id ASC, app_name ASC
            LIMIT ?6 OFFSET ?7
            "
        ))?;
        let rows = stmt.query_map(
            params![
                filter.subject_id.as_ref().map(SubjectId::as_str),
                filter.app_name,
                filter.category_id,
                filter.start_date.map(|d| d.to_string()),
                filter.end_date.map(|d| d.to_string()),
                limit,
                offset,
            ],
            BucketRow::read,
        )?;

        let mut buckets = Vec::new();
        for row in rows {
            buckets.push(row?.into_bucket()?);
        }
        Ok(buckets)
    }

    /// Counts rows matching `filter`, ignoring its pagination.
    pub fn count_hourly_usage(&self, filter: &UsageFilter) -> Result<usize, DbError> {
        let count: i64 = self.conn().query_row(
            &format!("SELECT COUNT(*) FROM hourly_app_usage {FILTER_CLAUSE}"),
            params![
                filter.subject_id.as_ref().map(SubjectId::as_str),
                filter.app_name,
                filter.category_id,
                filter.start_date.map(|d| d.to_string()),
                filter.end_date.map(|d| d.to_string()),
            ],
            |row| row.get(0),
        )?;
        Ok(usize::try_from(count).unwrap_or_default())
    }

    /// Sums usage per productivity type over local dates `start..=end`.
    pub fn productivity_summary(
        &self,
        subject: Option<&SubjectId>,
        start: NaiveDate,
        end: NaiveDate,
    ) -> Result<ProductivitySummary, DbError> {
        let conn = self.conn();
        let mut stmt = conn.prepare(
            "
            SELECT c.productivity_type, SUM(u.total_time_seconds)
            FROM hourly_app_usage u
            JOIN app_categories c ON c.id = u.category_id
            WHERE (?1 IS NULL OR u.subject_id = ?1)
              AND u.usage_date >= ?2 AND u.usage_date <= ?3
            GROUP BY c.productivity_type
            ",
        )?;
        let rows = stmt.query_map(
            params![
                subject.map(SubjectId::as_str),
                start.to_string(),
                end.to_string()
            ],
            |row| Ok((row.get::<_, String>(0)?, row.get::<_, f64>(1)?)),
        )?;

        let mut summary = ProductivitySummary::default();
        for row in rows {
            let (kind, seconds) = row?;
            match kind.parse::<ProductivityType>()? {
                ProductivityType::Productive => summary.productive_seconds += seconds,
                ProductivityType::Neutral => summary.neutral_seconds += seconds,
                ProductivityType::Distracting => summary.distracting_seconds += seconds,
            }
        }
        Ok(summary)
    }

    /// Per-day, per-application totals over local dates `start..=end`,
    /// busiest application first within each day.
    pub fn daily_app_usage(
        &self,
        subject: Option<&SubjectId>,
        start: NaiveDate,
        end: NaiveDate,
    ) -> Result<Vec<DailyAppUsage>, DbError> {
        let conn = self.conn();
        let mut stmt = conn.prepare(
            "
            SELECT u.usage_date, u.app_name,
                   SUM(u.total_time_seconds) AS total,
                   SUM(u.active_time_seconds),
                   SUM(u.session_count),
                   c.name, c.productivity_type
            FROM hourly_app_usage u
            JOIN app_categories c ON c.id = u.category_id
            WHERE (?1 IS NULL OR u.subject_id = ?1)
              AND u.usage_date >= ?2 AND u.usage_date <= ?3
            GROUP BY u.usage_date, u.app_name, c.id
            ORDER BY u.usage_date ASC, total DESC, u.app_name ASC
            ",
        )?;
        let rows = stmt.query_map(
            params![
                subject.map(SubjectId::as_str),
                start.to_string(),
                end.to_string()
            ],
            |row| {
                Ok((
                    row.get::<_, String>(0)?,
                    row.get::<_, String>(1)?,
                    row.get::<_, f64>(2)?,
                    row.get::<_, f64>(3)?,
                    row.get::<_, u32>(4)?,
                    row.get::<_, String>(5)?,
                    row.get::<_, String>(6)?,
                ))
            },
        )?;

        let mut usage = Vec::new();
        for row in rows {
            let (date, app_name, total, active, sessions, category_name, kind) = row?;
            usage.push(DailyAppUsage {
                date: parse_date(&date)?,
                app_name,
                total_time_seconds: total,
                active_time_seconds: active,
                session_count: sessions,
                category_name,
                productivity_type: kind.parse()?,
            });
        }
        Ok(usage)
    }

    pub fn bucket_count(&self) -> Result<i64, DbError> {
        let count = self
            .conn()
            .query_row("SELECT COUNT(*) FROM hourly_app_usage", [], |row| row.get(0))?;
        Ok(count)
    }

    /// Most recent `updated_at` across all buckets.
    pub fn last_bucket_update(&self) -> Result<Option<DateTime<Utc>>, DbError> {
        let latest: Option<String> = self.conn().query_row(
            "SELECT MAX(updated_at) FROM hourly_app_usage",
            [],
            |row| row.get(0),
        )?;
        latest.as_deref().map(parse_timestamp).transpose()
    }
}
