//! Import command for loading focus observations into the local store.

use std::collections::BTreeMap;
use std::io::BufRead;

use anyhow::{Context, Result};
use chrono::{FixedOffset, Utc};
use serde::Deserialize;
use tracing::{debug, warn};

use tg_core::{FocusObservation, IngestSummary, SubjectId, ingest_observations};
use tg_db::{Database, ObservationRecord};

use crate::Config;

use super::util::parse_timestamp;

/// Counts reported back to the user after an import.
#[derive(Debug, Default, Clone, PartialEq, Eq)]
pub struct ImportOutcome {
    /// Well-formed lines read.
    pub parsed: usize,
    /// Lines that were not new to the store.
    pub duplicates: usize,
    /// Lines skipped because they could not be parsed.
    pub malformed: usize,
    /// Per-subject accumulation counts, when requested.
    pub accumulated: Vec<(SubjectId, IngestSummary)>,
}

impl ImportOutcome {
    pub const fn inserted(&self) -> usize {
        self.parsed - self.duplicates
    }
}

/// One JSONL line.
#[derive(Debug, Deserialize)]
struct ImportLine {
    #[serde(default, alias = "client_id")]
    subject_id: Option<String>,
    timestamp: String,
    app_name: String,
    #[serde(default)]
    window_name: String,
    #[serde(default = "default_focused")]
    focused: bool,
}

const fn default_focused() -> bool {
    true
}

impl ImportLine {
    fn into_record(self, default_subject: Option<&str>, zone: FixedOffset) -> Result<ObservationRecord> {
        let subject = match self.subject_id {
            Some(subject) if !subject.trim().is_empty() => subject,
            _ => default_subject
                .map(str::to_string)
                .ok_or_else(|| anyhow::anyhow!("missing subject_id"))?,
        };
        if self.app_name.trim().is_empty() {
            anyhow::bail!("missing app_name");
        }
        let timestamp = parse_timestamp(&self.timestamp, zone)?;
        Ok(ObservationRecord {
            subject_id: SubjectId::new(subject)?,
            timestamp: timestamp.with_timezone(&Utc),
            app_name: self.app_name,
            window_name: self.window_name,
            focused: self.focused,
        })
    }
}

/// Reads JSONL observations, skipping malformed lines.
///
/// Read errors abort the import; bad content does not.
fn parse_observations<R: BufRead>(
    reader: R,
    default_subject: Option<&str>,
    zone: FixedOffset,
) -> Result<(Vec<ObservationRecord>, usize)> {
    let mut records = Vec::new();
    let mut malformed = 0;
    for (idx, line) in reader.lines().enumerate() {
        let line = line.with_context(|| format!("failed to read line {}", idx + 1))?;
        let trimmed = line.trim();
        if trimmed.is_empty() {
            continue;
        }
        let parsed = serde_json::from_str::<ImportLine>(trimmed)
            .map_err(anyhow::Error::from)
            .and_then(|parsed| parsed.into_record(default_subject, zone));
        match parsed {
            Ok(record) => records.push(record),
            Err(e) => {
                warn!(line = idx + 1, error = %e, "skipping malformed observation");
                malformed += 1;
            }
        }
    }
    Ok((records, malformed))
}

/// Imports observations and optionally accumulates them into hourly buckets.
///
/// Accumulation treats the batch as self-contained and adds to whatever is
/// stored, so importing the same batch twice with `accumulate` counts it twice.
pub fn run<R: BufRead>(
    reader: R,
    db: &Database,
    config: &Config,
    default_subject: Option<&str>,
    accumulate: bool,
) -> Result<ImportOutcome> {
    let zone = config.zone()?;
    let (records, malformed) = parse_observations(reader, default_subject, zone)?;
    let inserted = db.insert_observations(&records)?;
    debug!(parsed = records.len(), inserted, malformed, "observations imported");

    let mut outcome = ImportOutcome {
        parsed: records.len(),
        duplicates: records.len() - inserted,
        malformed,
        accumulated: Vec::new(),
    };

    if accumulate {
        let pipeline = config.pipeline();
        let as_of = Utc::now();
        for (subject, mut observations) in group_by_subject(records, zone) {
            observations.sort_by_key(|o| o.timestamp);
            let summary = ingest_observations(&subject, observations, db, db, &pipeline, as_of)
                .with_context(|| format!("failed to accumulate usage for {subject}"))?;
            outcome.accumulated.push((subject, summary));
        }
    }

    Ok(outcome)
}

fn group_by_subject(
    records: Vec<ObservationRecord>,
    zone: FixedOffset,
) -> BTreeMap<SubjectId, Vec<FocusObservation>> {
    let mut grouped: BTreeMap<SubjectId, Vec<FocusObservation>> = BTreeMap::new();
    for record in records {
        grouped
            .entry(record.subject_id.clone())
            .or_default()
            .push(FocusObservation {
                timestamp: record.timestamp.with_timezone(&zone),
                subject_id: record.subject_id,
                app_name: record.app_name,
                window_name: record.window_name,
                focused: record.focused,
            });
    }
    grouped
}

#[cfg(test)]
mod tests {
    use std::io::Cursor;

    use tg_db::UsageFilter;

    use super::*;

    fn config() -> Config {
        Config {
            utc_offset: "+08:00".to_string(),
            ..Config::default()
        }
    }

    fn zone() -> FixedOffset {
        FixedOffset::east_opt(8 * 3600).unwrap()
    }

    #[test]
    fn parse_uses_default_subject_and_client_id_alias() {
        let input = concat!(
            r#"{"timestamp":"2025-03-03T09:00:00","app_name":"Code"}"#,
            "\n",
            r#"{"client_id":"pc-2","timestamp":"2025-03-03T01:00:00Z","app_name":"Slack","focused":false}"#,
            "\n",
        );
        let (records, malformed) = parse_observations(Cursor::new(input), Some("pc-1"), zone()).unwrap();
        assert_eq!(malformed, 0);
        assert_eq!(records[0].subject_id.as_str(), "pc-1");
        assert_eq!(records[0].timestamp.to_rfc3339(), "2025-03-03T01:00:00+00:00");
        assert!(records[0].focused);
        assert_eq!(records[1].subject_id.as_str(), "pc-2");
        assert!(!records[1].focused);
    }

    #[test]
    fn malformed_lines_are_counted_not_fatal() {
        let input = concat!(
            "not json\n",
            "\n",
            r#"{"timestamp":"2025-03-03T09:00:00","app_name":"Code"}"#,
            "\n",
            r#"{"subject_id":"pc-1","timestamp":"yesterday","app_name":"Code"}"#,
            "\n",
            r#"{"subject_id":"pc-1","timestamp":"2025-03-03T09:00:00","app_name":" "}"#,
            "\n",
            r#"{"subject_id":"pc-1","timestamp":"2025-03-03T09:00:30","app_name":"Code"}"#,
            "\n",
        );
        let (records, malformed) = parse_observations(Cursor::new(input), None, zone()).unwrap();
        assert_eq!(records.len(), 1);
        assert_eq!(malformed, 4);
    }

    #[test]
    fn reimport_counts_duplicates() {
        let db = Database::open_in_memory().unwrap();
        let input = concat!(
            r#"{"subject_id":"pc-1","timestamp":"2025-03-03T09:00:00","app_name":"Code"}"#,
            "\n",
            r#"{"subject_id":"pc-1","timestamp":"2025-03-03T09:00:30","app_name":"Code"}"#,
            "\n",
        );

        let first = run(Cursor::new(input), &db, &config(), None, false).unwrap();
        assert_eq!(first.inserted(), 2);
        let second = run(Cursor::new(input), &db, &config(), None, false).unwrap();
        assert_eq!(second.inserted(), 0);
        assert_eq!(second.duplicates, 2);
        assert_eq!(db.observation_count().unwrap(), 2);
        assert_eq!(db.bucket_count().unwrap(), 0);
    }

    #[test]
    fn accumulate_folds_batch_into_buckets() {
        let db = Database::open_in_memory().unwrap();
        let input = concat!(
            r#"{"subject_id":"pc-1","timestamp":"2025-03-03T09:00:30","app_name":"Code"}"#,
            "\n",
            r#"{"subject_id":"pc-1","timestamp":"2025-03-03T09:00:00","app_name":"Code"}"#,
            "\n",
            r#"{"subject_id":"pc-1","timestamp":"2025-03-03T09:01:00","app_name":"Slack"}"#,
            "\n",
        );

        let outcome = run(Cursor::new(input), &db, &config(), None, true).unwrap();
        assert_eq!(outcome.accumulated.len(), 1);
        assert_eq!(outcome.accumulated[0].1.buckets, 2);

        let buckets = db.list_hourly_usage(&UsageFilter::default()).unwrap();
        let code = buckets.iter().find(|b| b.app_name == "Code").unwrap();
        assert!((code.total_time_seconds - 60.0).abs() < 1e-9);
        assert_eq!(code.hour_of_day, 9);
    }

    #[test]
    fn empty_input_imports_nothing() {
        let db = Database::open_in_memory().unwrap();
        let outcome = run(Cursor::new(""), &db, &config(), None, true).unwrap();
        assert_eq!(outcome, ImportOutcome::default());
    }
}
