//! Raw observation storage and the event-source adapter over it.

use chrono::{DateTime, FixedOffset, Utc};
use rusqlite::{OptionalExtension, params};
use tg_core::{EventSource, FocusObservation, SubjectId, Timestamp};
use tracing::warn;

use crate::{Database, DbError, format_timestamp, parse_timestamp};

/// A raw focus sample ready to be stored.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ObservationRecord {
    pub subject_id: SubjectId,
    pub timestamp: DateTime<Utc>,
    pub app_name: String,
    pub window_name: String,
    pub focused: bool,
}

/// First and last stored observation times.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ObservationSpan {
    pub first: DateTime<Utc>,
    pub last: DateTime<Utc>,
}

impl Database {
    /// Inserts a batch of observations, ignoring exact duplicates.
    ///
    /// Returns the number of rows actually inserted.
    pub fn insert_observations(&self, records: &[ObservationRecord]) -> Result<usize, DbError> {
        if records.is_empty() {
            return Ok(0);
        }
        let mut conn = self.conn();
        let tx = conn.transaction()?;
        let mut inserted = 0;
        {
            let mut stmt = tx.prepare(
                "
                INSERT OR IGNORE INTO observations
                (subject_id, timestamp, app_name, window_name, focused)
                VALUES (?, ?, ?, ?, ?)
                ",
            )?;
            for record in records {
                inserted += stmt.execute(params![
                    record.subject_id.as_str(),
                    format_timestamp(&record.timestamp),
                    record.app_name,
                    record.window_name,
                    record.focused,
                ])?;
            }
        }
        tx.commit()?;
        Ok(inserted)
    }

    pub fn observation_count(&self) -> Result<i64, DbError> {
        let count = self
            .conn()
            .query_row("SELECT COUNT(*) FROM observations", [], |row| row.get(0))?;
        Ok(count)
    }

    pub fn subject_count(&self) -> Result<i64, DbError> {
        let count = self.conn().query_row(
            "SELECT COUNT(DISTINCT subject_id) FROM observations",
            [],
            |row| row.get(0),
        )?;
        Ok(count)
    }

    /// Returns the time span covered by stored observations, if any.
    pub fn observation_span(&self) -> Result<Option<ObservationSpan>, DbError> {
        let bounds: Option<(Option<String>, Option<String>)> = self
            .conn()
            .query_row(
                "SELECT MIN(timestamp), MAX(timestamp) FROM observations",
                [],
                |row| Ok((row.get(0)?, row.get(1)?)),
            )
            .optional()?;

        match bounds {
            Some((Some(first), Some(last))) => Ok(Some(ObservationSpan {
                first: parse_timestamp(&first)?,
                last: parse_timestamp(&last)?,
            })),
            _ => Ok(None),
        }
    }
}

/// Reads stored observations for the engine, converting UTC storage
/// timestamps into the processing zone.
///
/// This is the only place timestamps change zone on the way into the engine.
pub struct ObservationSource<'a> {
    db: &'a Database,
    zone: FixedOffset,
}

impl<'a> ObservationSource<'a> {
    pub const fn new(db: &'a Database, zone: FixedOffset) -> Self {
        Self { db, zone }
    }
}

impl EventSource for ObservationSource<'_> {
    type Error = DbError;

    fn list_subjects(&self, start: Timestamp, end: Timestamp) -> Result<Vec<SubjectId>, DbError> {
        let conn = self.db.conn();
        let mut stmt = conn.prepare(
            "
            SELECT DISTINCT subject_id
            FROM observations
            WHERE timestamp >= ? AND timestamp < ?
            ORDER BY subject_id ASC
            ",
        )?;
        let rows = stmt.query_map(
            [format_timestamp(&start), format_timestamp(&end)],
            |row| row.get::<_, String>(0),
        )?;

        let mut subjects = Vec::new();
        for row in rows {
            let raw = row?;
            match SubjectId::new(raw) {
                Ok(subject) => subjects.push(subject),
                Err(e) => warn!(error = %e, "skipping stored observation with invalid subject"),
            }
        }
        Ok(subjects)
    }

    fn fetch_observations(
        &self,
        subject: &SubjectId,
        start: Timestamp,
        end: Timestamp,
    ) -> Result<Vec<FocusObservation>, DbError> {
        let conn = self.db.conn();
        let mut stmt = conn.prepare(
            "
            SELECT timestamp, app_name, window_name, focused
            FROM observations
            WHERE subject_id = ? AND timestamp >= ? AND timestamp < ?
            ORDER BY timestamp ASC, id ASC
            ",
        )?;
        let rows = stmt.query_map(
            params![
                subject.as_str(),
                format_timestamp(&start),
                format_timestamp(&end)
            ],
            |row| {
                Ok((
                    row.get::<_, String>(0)?,
                    row.get::<_, String>(1)?,
                    row.get::<_, String>(2)?,
                    row.get::<_, bool>(3)?,
                ))
            },
        )?;

        let mut observations = Vec::new();
        for row in rows {
            let (timestamp, app_name, window_name, focused) = row?;
            let timestamp = match parse_timestamp(&timestamp) {
                Ok(ts) => ts.with_timezone(&self.zone),
                Err(e) => {
                    warn!(%subject, error = %e, "skipping stored observation with bad timestamp");
                    continue;
                }
            };
            observations.push(FocusObservation {
                timestamp,
                subject_id: subject.clone(),
                app_name,
                window_name,
                focused,
            });
        }
        Ok(observations)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn utc(s: &str) -> DateTime<Utc> {
        DateTime::parse_from_rfc3339(s).unwrap().with_timezone(&Utc)
    }

    fn zone() -> FixedOffset {
        FixedOffset::east_opt(8 * 3600).unwrap()
    }

    fn record(subject: &str, ts: &str, app: &str) -> ObservationRecord {
        ObservationRecord {
            subject_id: SubjectId::new(subject).unwrap(),
            timestamp: utc(ts),
            app_name: app.to_string(),
            window_name: String::new(),
            focused: true,
        }
    }

    #[test]
    fn duplicate_observations_are_ignored() {
        let db = Database::open_in_memory().expect("open db");
        let records = vec![
            record("pc-1", "2025-03-03T01:00:00Z", "Code"),
            record("pc-1", "2025-03-03T01:00:30Z", "Code"),
        ];

        assert_eq!(db.insert_observations(&records).unwrap(), 2);
        assert_eq!(db.insert_observations(&records).unwrap(), 0);
        assert_eq!(db.observation_count().unwrap(), 2);
        assert_eq!(db.subject_count().unwrap(), 1);
    }

    #[test]
    fn span_covers_first_and_last() {
        let db = Database::open_in_memory().expect("open db");
        assert_eq!(db.observation_span().unwrap(), None);

        db.insert_observations(&[
            record("pc-1", "2025-03-03T05:00:00Z", "Code"),
            record("pc-2", "2025-03-03T01:00:00Z", "Slack"),
        ])
        .unwrap();

        let span = db.observation_span().unwrap().unwrap();
        assert_eq!(span.first, utc("2025-03-03T01:00:00Z"));
        assert_eq!(span.last, utc("2025-03-03T05:00:00Z"));
    }

    #[test]
    fn source_converts_into_processing_zone() {
        let db = Database::open_in_memory().expect("open db");
        db.insert_observations(&[
            record("pc-1", "2025-03-03T01:00:30Z", "Code"),
            record("pc-1", "2025-03-03T01:00:00Z", "Code"),
            record("pc-1", "2025-03-03T02:00:00Z", "Code"),
        ])
        .unwrap();

        let source = ObservationSource::new(&db, zone());
        let start = DateTime::parse_from_rfc3339("2025-03-03T09:00:00+08:00").unwrap();
        let end = DateTime::parse_from_rfc3339("2025-03-03T10:00:00+08:00").unwrap();
        let observations = source
            .fetch_observations(&SubjectId::new("pc-1").unwrap(), start, end)
            .unwrap();

        // Ascending, half-open: the 10:00 local sample is excluded.
        assert_eq!(observations.len(), 2);
        assert_eq!(
            observations[0].timestamp,
            DateTime::parse_from_rfc3339("2025-03-03T09:00:00+08:00").unwrap()
        );
        assert_eq!(observations[0].timestamp.offset().local_minus_utc(), 8 * 3600);
        assert!(observations[0].timestamp < observations[1].timestamp);
    }

    #[test]
    fn subjects_are_listed_per_window() {
        let db = Database::open_in_memory().expect("open db");
        db.insert_observations(&[
            record("pc-2", "2025-03-03T01:00:00Z", "Code"),
            record("pc-1", "2025-03-03T01:30:00Z", "Code"),
            record("pc-3", "2025-03-04T01:00:00Z", "Code"),
        ])
        .unwrap();

        let source = ObservationSource::new(&db, zone());
        let start = DateTime::parse_from_rfc3339("2025-03-03T00:00:00+08:00").unwrap();
        let end = DateTime::parse_from_rfc3339("2025-03-04T00:00:00+08:00").unwrap();
        let subjects = source.list_subjects(start, end).unwrap();

        let names: Vec<&str> = subjects.iter().map(SubjectId::as_str).collect();
        assert_eq!(names, vec!["pc-1", "pc-2"]);
    }

    #[test]
    fn bad_stored_timestamps_are_skipped() {
        let db = Database::open_in_memory().expect("open db");
        db.insert_observations(&[record("pc-1", "2025-03-03T01:00:00Z", "Code")])
            .unwrap();
        db.conn()
            .execute(
                "INSERT INTO observations (subject_id, timestamp, app_name) VALUES ('pc-1', '2025-03-03T01:00:0xZ', 'Code')",
                [],
            )
            .unwrap();

        let source = ObservationSource::new(&db, zone());
        let start = DateTime::parse_from_rfc3339("2025-03-03T09:00:00+08:00").unwrap();
        let end = DateTime::parse_from_rfc3339("2025-03-03T10:00:00+08:00").unwrap();
        let observations = source
            .fetch_observations(&SubjectId::new("pc-1").unwrap(), start, end)
            .unwrap();
        assert_eq!(observations.len(), 1);
    }
}
