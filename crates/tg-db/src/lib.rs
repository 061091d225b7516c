//! Storage layer for timeglass.
//!
//! Persists raw focus observations, productivity categories and hourly usage
//! buckets using `rusqlite`, and implements the engine's collaborator traits
//! on top of them:
//! - [`ObservationSource`] implements `EventSource`
//! - [`Database`] implements `CategoryRegistry` and `StatsStore`
//!
//! # Thread Safety
//!
//! [`Database`] guards its connection with a mutex, so one handle can be shared
//! by the recompute worker pool. Statements are serialized; SQLite would
//! serialize writers anyway.
//!
//! # Timestamp Format
//!
//! Instants are stored as UTC TEXT with millisecond precision
//! (`2025-03-03T01:00:00.000Z`), so lexicographic order matches chronological
//! order. Hourly buckets additionally store the UTC offset they were cut in
//! and their local calendar date, so local hours survive a round trip.

mod categories;
mod observations;
mod usage;

use std::path::Path;
use std::sync::{Mutex, MutexGuard, PoisonError};

use chrono::{DateTime, FixedOffset, SecondsFormat, Utc};
use rusqlite::Connection;
use thiserror::Error;
use tg_core::{CategoryId, ValidationError};

pub use categories::CategoryUpdate;
pub use observations::{ObservationRecord, ObservationSource, ObservationSpan};
pub use usage::{DailyAppUsage, ProductivitySummary, UsageFilter};

/// Database errors.
#[derive(Debug, Error)]
pub enum DbError {
    /// An error from the underlying database.
    #[error("sqlite error: {0}")]
    Sqlite(#[from] rusqlite::Error),

    /// A stored timestamp could not be parsed.
    #[error("invalid stored timestamp: {value}")]
    TimestampParse {
        value: String,
        #[source]
        source: chrono::ParseError,
    },

    /// A stored UTC offset is out of range.
    #[error("invalid stored utc offset: {0} seconds")]
    InvalidOffset(i64),

    /// A stored or supplied value failed domain validation.
    #[error(transparent)]
    Validation(#[from] ValidationError),

    /// A category with this name (ignoring case) already exists.
    #[error("category already exists: {name}")]
    DuplicateCategory { name: String },

    /// The category is still referenced by usage buckets.
    #[error("category {id} is used by {count} usage records")]
    CategoryInUse { id: CategoryId, count: i64 },

    #[error("category not found: {0}")]
    CategoryNotFound(CategoryId),
}

/// Database connection wrapper.
///
/// See the [module documentation](self) for thread safety considerations.
pub struct Database {
    conn: Mutex<Connection>,
}

impl Database {
    /// Opens a database at the given path, creating it if necessary.
    ///
    /// The database schema is automatically initialized on first open.
    pub fn open(path: &Path) -> Result<Self, DbError> {
        let conn = Connection::open(path)?;
        Self::with_connection(conn)
    }

    /// Opens an in-memory database.
    ///
    /// Useful for testing. The database is destroyed when the connection closes.
    pub fn open_in_memory() -> Result<Self, DbError> {
        let conn = Connection::open_in_memory()?;
        Self::with_connection(conn)
    }

    fn with_connection(conn: Connection) -> Result<Self, DbError> {
        let db = Self {
            conn: Mutex::new(conn),
        };
        db.init()?;
        Ok(db)
    }

    /// Locks the connection. A panic in another holder does not corrupt
    /// SQLite state, so a poisoned lock is recovered.
    fn conn(&self) -> MutexGuard<'_, Connection> {
        self.conn.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Initializes the database schema.
    ///
    /// This is idempotent - safe to call on an already-initialized database.
    fn init(&self) -> Result<(), DbError> {
        let conn = self.conn();
        conn.execute_batch("PRAGMA foreign_keys = ON;")?;
        conn.execute_batch(
            "
            -- Raw focus samples, one row per report line
            -- timestamp: UTC, e.g. '2025-03-03T01:00:00.000Z'
            CREATE TABLE IF NOT EXISTS observations (
                id INTEGER PRIMARY KEY AUTOINCREMENT,
                subject_id TEXT NOT NULL,
                timestamp TEXT NOT NULL,
                app_name TEXT NOT NULL,
                window_name TEXT NOT NULL DEFAULT '',
                focused INTEGER NOT NULL DEFAULT 1,
                UNIQUE (subject_id, timestamp, app_name, window_name)
            );

            CREATE INDEX IF NOT EXISTS idx_observations_subject_time
                ON observations(subject_id, timestamp);
            CREATE INDEX IF NOT EXISTS idx_observations_timestamp ON observations(timestamp);

            CREATE TABLE IF NOT EXISTS app_categories (
                id INTEGER PRIMARY KEY AUTOINCREMENT,
                name TEXT NOT NULL UNIQUE COLLATE NOCASE,
                productivity_type TEXT NOT NULL,
                description TEXT,
                created_at TEXT NOT NULL,
                updated_at TEXT NOT NULL
            );

            CREATE INDEX IF NOT EXISTS idx_app_categories_type
                ON app_categories(productivity_type);

            -- One row per (subject, app, local hour)
            -- hour_start: UTC instant of the local hour start
            -- utc_offset_secs: offset the hour was cut in
            -- usage_date: local calendar date, e.g. '2025-03-03'
            CREATE TABLE IF NOT EXISTS hourly_app_usage (
                id INTEGER PRIMARY KEY AUTOINCREMENT,
                subject_id TEXT NOT NULL,
                app_name TEXT NOT NULL,
                hour_start TEXT NOT NULL,
                utc_offset_secs INTEGER NOT NULL,
                usage_date TEXT NOT NULL,
                hour_of_day INTEGER NOT NULL,
                day_of_week INTEGER NOT NULL,
                is_working_hour INTEGER NOT NULL,
                total_time_seconds REAL NOT NULL DEFAULT 0,
                active_time_seconds REAL NOT NULL DEFAULT 0,
                session_count INTEGER NOT NULL DEFAULT 0,
                dominant_window_name TEXT NOT NULL DEFAULT '',
                category_id INTEGER NOT NULL,
                updated_at TEXT NOT NULL,
                UNIQUE (subject_id, app_name, hour_start),
                FOREIGN KEY (category_id) REFERENCES app_categories(id)
            );

            CREATE INDEX IF NOT EXISTS idx_hourly_usage_subject_hour
                ON hourly_app_usage(subject_id, hour_start);
            CREATE INDEX IF NOT EXISTS idx_hourly_usage_date ON hourly_app_usage(usage_date);
            CREATE INDEX IF NOT EXISTS idx_hourly_usage_category ON hourly_app_usage(category_id);
            ",
        )?;
        Ok(())
    }
}

fn format_timestamp<Tz: chrono::TimeZone>(timestamp: &DateTime<Tz>) -> String {
    timestamp
        .with_timezone(&Utc)
        .to_rfc3339_opts(SecondsFormat::Millis, true)
}

fn parse_timestamp(value: &str) -> Result<DateTime<Utc>, DbError> {
    DateTime::parse_from_rfc3339(value)
        .map(|parsed| parsed.with_timezone(&Utc))
        .map_err(|source| DbError::TimestampParse {
            value: value.to_string(),
            source,
        })
}

fn parse_offset(seconds: i64) -> Result<FixedOffset, DbError> {
    i32::try_from(seconds)
        .ok()
        .and_then(FixedOffset::east_opt)
        .ok_or(DbError::InvalidOffset(seconds))
}

#[cfg(test)]
mod tests {
    use std::collections::HashSet;

    use super::*;

    #[test]
    fn open_in_memory_database() {
        let db = Database::open_in_memory();
        assert!(db.is_ok());
    }

    #[test]
    fn open_file_database_is_reopenable() {
        let dir = tempfile::tempdir().expect("tempdir");
        let path = dir.path().join("tg.db");

        drop(Database::open(&path).expect("first open"));
        let db = Database::open(&path).expect("second open");
        assert_eq!(db.observation_count().expect("count"), 0);
    }

    #[test]
    fn schema_matches_data_model() {
        let db = Database::open_in_memory().expect("open in-memory db");
        let conn = db.conn();

        assert_eq!(
            table_columns(&conn, "observations"),
            vec![
                "id",
                "subject_id",
                "timestamp",
                "app_name",
                "window_name",
                "focused"
            ]
        );
        assert_eq!(
            table_columns(&conn, "app_categories"),
            vec![
                "id",
                "name",
                "productivity_type",
                "description",
                "created_at",
                "updated_at"
            ]
        );
        assert_eq!(
            table_columns(&conn, "hourly_app_usage"),
            vec![
                "id",
                "subject_id",
                "app_name",
                "hour_start",
                "utc_offset_secs",
                "usage_date",
                "hour_of_day",
                "day_of_week",
                "is_working_hour",
                "total_time_seconds",
                "active_time_seconds",
                "session_count",
                "dominant_window_name",
                "category_id",
                "updated_at",
            ]
        );

        let usage_indexes = index_names(&conn, "hourly_app_usage");
        let expected: HashSet<String> = [
            "idx_hourly_usage_subject_hour",
            "idx_hourly_usage_date",
            "idx_hourly_usage_category",
        ]
        .into_iter()
        .map(String::from)
        .collect();
        assert!(expected.is_subset(&usage_indexes));
        assert!(index_names(&conn, "observations").contains("idx_observations_subject_time"));
    }

    #[test]
    fn timestamps_format_as_utc_millis() {
        let local = DateTime::parse_from_rfc3339("2025-03-03T09:00:00+08:00").unwrap();
        assert_eq!(format_timestamp(&local), "2025-03-03T01:00:00.000Z");
        assert_eq!(
            parse_timestamp("2025-03-03T01:00:00.000Z").unwrap(),
            local.with_timezone(&Utc)
        );
        assert!(matches!(
            parse_timestamp("yesterday"),
            Err(DbError::TimestampParse { .. })
        ));
    }

    #[test]
    fn offsets_out_of_range_are_rejected() {
        assert_eq!(parse_offset(8 * 3600).unwrap().local_minus_utc(), 8 * 3600);
        assert!(matches!(
            parse_offset(90_000),
            Err(DbError::InvalidOffset(90_000))
        ));
    }

    fn table_columns(conn: &Connection, table: &str) -> Vec<String> {
        let mut stmt = conn
            .prepare(&format!("PRAGMA table_info({table})"))
            .expect("prepare table_info");
        let rows = stmt
            .query_map([], |row| row.get::<_, String>(1))
            .expect("query table_info");
        rows.map(|row| row.expect("table_info row")).collect()
    }

    fn index_names(conn: &Connection, table: &str) -> HashSet<String> {
        let mut stmt = conn
            .prepare(&format!("PRAGMA index_list({table})"))
            .expect("prepare index_list");
        let rows = stmt
            .query_map([], |row| row.get::<_, String>(1))
            .expect("query index_list");
        rows.map(|row| row.expect("index_list row")).collect()
    }
}
