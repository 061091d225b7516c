//! Ingest command: add externally measured usage to one hourly bucket.

use anyhow::{Context, Result};
use chrono::Utc;
use tg_core::{HourlyUsageBucket, SubjectId, UsageReport, ingest_usage};
use tg_db::Database;

use crate::Config;

use super::util::parse_timestamp;

/// One externally measured slice of application use.
#[derive(Debug, Clone)]
pub struct UsageArgs {
    pub subject: String,
    pub app: String,
    pub window: String,
    /// Any instant inside the hour.
    pub hour: String,
    pub minutes: f64,
    pub sessions: u32,
}

/// Accumulates the reported minutes into the hour containing `args.hour`.
pub fn run(db: &Database, config: &Config, args: &UsageArgs) -> Result<HourlyUsageBucket> {
    let zone = config.zone()?;
    let report = UsageReport {
        subject_id: SubjectId::new(args.subject.as_str())?,
        app_name: args.app.clone(),
        window_name: args.window.clone(),
        hour: parse_timestamp(&args.hour, zone).context("invalid --hour")?,
        duration_minutes: args.minutes,
        session_count: args.sessions,
    };
    let bucket = ingest_usage(&report, db, db, &config.pipeline(), Utc::now())?;
    Ok(bucket)
}

#[cfg(test)]
mod tests {
    use tg_core::CategoryRegistry;
    use tg_db::UsageFilter;

    use super::*;

    fn config() -> Config {
        Config {
            utc_offset: "+08:00".to_string(),
            ..Config::default()
        }
    }

    fn usage(subject: &str, app: &str, hour: &str, minutes: f64) -> UsageArgs {
        UsageArgs {
            subject: subject.to_string(),
            app: app.to_string(),
            window: String::new(),
            hour: hour.to_string(),
            minutes,
            sessions: 1,
        }
    }

    #[test]
    fn repeated_ingest_accumulates() {
        let db = Database::open_in_memory().unwrap();
        let config = config();

        let first = UsageArgs {
            window: "main.rs".to_string(),
            ..usage("pc-1", "Code", "2025-03-03 09:45", 10.0)
        };
        let bucket = run(&db, &config, &first).unwrap();
        assert_eq!(bucket.hour_of_day, 9);
        assert_eq!(bucket.hour_start.to_rfc3339(), "2025-03-03T09:00:00+08:00");
        run(&db, &config, &usage("pc-1", "Code", "2025-03-03 09:05", 5.0)).unwrap();

        let stored = db.list_hourly_usage(&UsageFilter::default()).unwrap();
        assert_eq!(stored.len(), 1);
        assert!((stored[0].total_time_seconds - 900.0).abs() < 1e-9);
        assert_eq!(stored[0].session_count, 2);
        assert_eq!(stored[0].dominant_window_name, "main.rs");

        let default = db.find_by_name("Uncategorized").unwrap().unwrap();
        assert_eq!(stored[0].category_id, default.id);
    }

    #[test]
    fn negative_minutes_are_rejected() {
        let db = Database::open_in_memory().unwrap();
        let args = usage("pc-1", "Code", "2025-03-03 09:00", -1.0);
        let err = run(&db, &config(), &args).unwrap_err();
        assert!(err.to_string().contains("duration"), "{err}");
        assert_eq!(db.bucket_count().unwrap(), 0);
    }

    #[test]
    fn blank_subject_is_rejected() {
        let db = Database::open_in_memory().unwrap();
        let args = usage(" ", "Code", "2025-03-03 09:00", 1.0);
        assert!(run(&db, &config(), &args).is_err());
    }

    #[test]
    fn zero_sessions_extends_time_only() {
        let db = Database::open_in_memory().unwrap();
        let config = config();
        run(&db, &config, &usage("pc-1", "Code", "2025-03-03 09:00", 1.0)).unwrap();
        let continued = UsageArgs {
            sessions: 0,
            ..usage("pc-1", "Code", "2025-03-03 09:01", 1.0)
        };
        run(&db, &config, &continued).unwrap();

        let stored = db.list_hourly_usage(&UsageFilter::default()).unwrap();
        assert!((stored[0].total_time_seconds - 120.0).abs() < 1e-9);
        assert_eq!(stored[0].session_count, 1);
    }
}
