//! Productivity report over stored hourly buckets.

use std::io::Write;

use anyhow::Result;
use chrono::{NaiveDate, Utc};
use serde::Serialize;
use tg_core::{ProductivityType, SubjectId};
use tg_db::{DailyAppUsage, Database, ProductivitySummary};

use crate::Config;

use super::util::{format_duration, progress_bar};

/// Apps listed per day before the rest are folded into "... and N more".
const MAX_APPS_PER_DAY: usize = 10;

/// Everything a report shows, in both output formats.
#[derive(Debug, Clone, Serialize)]
pub struct ReportData {
    pub start: NaiveDate,
    pub end: NaiveDate,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub subject_id: Option<SubjectId>,
    pub summary: ProductivitySummary,
    pub days: Vec<DayReport>,
}

#[derive(Debug, Clone, Serialize)]
pub struct DayReport {
    pub date: NaiveDate,
    pub total_time_seconds: f64,
    /// Busiest first.
    pub apps: Vec<DailyAppUsage>,
}

/// Collects report data for local dates `start..=end`.
pub fn generate_report_data(
    db: &Database,
    start: NaiveDate,
    end: NaiveDate,
    subject_id: Option<SubjectId>,
) -> Result<ReportData> {
    if end < start {
        anyhow::bail!("report end {end} is before start {start}");
    }
    let summary = db.productivity_summary(subject_id.as_ref(), start, end)?;

    let mut days: Vec<DayReport> = Vec::new();
    for usage in db.daily_app_usage(subject_id.as_ref(), start, end)? {
        match days.last_mut() {
            Some(day) if day.date == usage.date => {
                day.total_time_seconds += usage.total_time_seconds;
                day.apps.push(usage);
            }
            _ => days.push(DayReport {
                date: usage.date,
                total_time_seconds: usage.total_time_seconds,
                apps: vec![usage],
            }),
        }
    }

    Ok(ReportData {
        start,
        end,
        subject_id,
        summary,
        days,
    })
}

fn period_description(start: NaiveDate, end: NaiveDate) -> String {
    if start == end {
        start.format("%A, %b %-d, %Y").to_string()
    } else {
        format!("{} - {}", start.format("%b %-d, %Y"), end.format("%b %-d, %Y"))
    }
}

/// Renders the human-readable report.
pub fn write_report<W: Write>(writer: &mut W, data: &ReportData) -> Result<()> {
    writeln!(writer, "TIME REPORT: {}", period_description(data.start, data.end))?;
    if let Some(subject) = &data.subject_id {
        writeln!(writer, "Subject: {subject}")?;
    }

    if data.days.is_empty() {
        writeln!(writer)?;
        writeln!(writer, "No usage recorded in this period.")?;
        writeln!(writer)?;
        writeln!(writer, "Hint: Run 'tg recompute' to rebuild hourly statistics.")?;
        return Ok(());
    }

    writeln!(writer)?;
    writeln!(writer, "SUMMARY")?;
    writeln!(writer, "───────")?;
    writeln!(
        writer,
        "{:<15} {:>7}",
        "Total tracked:",
        format_duration(data.summary.total_seconds())
    )?;
    for (label, kind, seconds) in [
        (
            "Productive:",
            ProductivityType::Productive,
            data.summary.productive_seconds,
        ),
        (
            "Neutral:",
            ProductivityType::Neutral,
            data.summary.neutral_seconds,
        ),
        (
            "Distracting:",
            ProductivityType::Distracting,
            data.summary.distracting_seconds,
        ),
    ] {
        let percent = data.summary.percent(kind);
        writeln!(
            writer,
            "{label:<15} {:>7}  {}  {percent:>3.0}%",
            format_duration(seconds),
            progress_bar(percent)
        )?;
    }

    writeln!(writer)?;
    writeln!(writer, "BY DAY")?;
    writeln!(writer, "──────")?;
    for day in &data.days {
        writeln!(
            writer,
            "{}  {}",
            day.date.format("%Y-%m-%d (%a)"),
            format_duration(day.total_time_seconds)
        )?;
        for app in day.apps.iter().take(MAX_APPS_PER_DAY) {
            writeln!(
                writer,
                "  {:<20} {:>7}  {}",
                app.app_name,
                format_duration(app.total_time_seconds),
                app.category_name
            )?;
        }
        if day.apps.len() > MAX_APPS_PER_DAY {
            writeln!(writer, "  ... and {} more", day.apps.len() - MAX_APPS_PER_DAY)?;
        }
    }
    Ok(())
}

/// Prints the report for `start..=end`, defaulting to today in the
/// processing zone.
pub fn run<W: Write>(
    writer: &mut W,
    db: &Database,
    config: &Config,
    start: Option<NaiveDate>,
    end: Option<NaiveDate>,
    subject: Option<&str>,
    json: bool,
) -> Result<()> {
    let today = Utc::now().with_timezone(&config.zone()?).date_naive();
    let start = start.unwrap_or(today);
    let end = end.unwrap_or(start);
    let subject_id = subject.map(SubjectId::new).transpose()?;

    let data = generate_report_data(db, start, end, subject_id)?;
    if json {
        writeln!(writer, "{}", serde_json::to_string_pretty(&data)?)?;
    } else {
        write_report(writer, &data)?;
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use insta::assert_snapshot;

    use super::*;
    use crate::commands::{categories, ingest};

    fn config() -> Config {
        Config {
            utc_offset: "+08:00".to_string(),
            ..Config::default()
        }
    }

    fn date(s: &str) -> NaiveDate {
        NaiveDate::parse_from_str(s, "%Y-%m-%d").unwrap()
    }

    fn seeded() -> Database {
        let db = Database::open_in_memory().unwrap();
        let config = config();
        categories::add(&db, "Code", ProductivityType::Productive, None).unwrap();
        categories::add(&db, "Chrome", ProductivityType::Distracting, None).unwrap();

        ingest::run(
            &db,
            &config,
            &ingest::UsageArgs {
                subject: "pc-1".to_string(),
                app: "Code".to_string(),
                window: "".to_string(),
                hour: "2025-03-03 09:00".to_string(),
                minutes: 30.0,
                sessions: 1,
            },
        ).unwrap();
        ingest::run(
            &db,
            &config,
            &ingest::UsageArgs {
                subject: "pc-1".to_string(),
                app: "Chrome".to_string(),
                window: "".to_string(),
                hour: "2025-03-03 09:00".to_string(),
                minutes: 10.0,
                sessions: 1,
            },
        ).unwrap();
        ingest::run(
            &db,
            &config,
            &ingest::UsageArgs {
                subject: "pc-1".to_string(),
                app: "Code".to_string(),
                window: "".to_string(),
                hour: "2025-03-04 10:00".to_string(),
                minutes: 20.0,
                sessions: 1,
            },
        ).unwrap();
        ingest::run(
            &db,
            &config,
            &ingest::UsageArgs {
                subject: "pc-2".to_string(),
                app: "Slack".to_string(),
                window: "".to_string(),
                hour: "2025-03-04 11:00".to_string(),
                minutes: 5.0,
                sessions: 1,
            },
        ).unwrap();
        db
    }

    #[test]
    fn report_groups_usage_by_day() {
        let db = seeded();
        let mut output = Vec::new();
        run(
            &mut output,
            &db,
            &config(),
            Some(date("2025-03-03")),
            Some(date("2025-03-04")),
            None,
            false,
        )
        .unwrap();

        assert_snapshot!(String::from_utf8(output).unwrap(), @r"
        TIME REPORT: Mar 3, 2025 - Mar 4, 2025

        SUMMARY
        ───────
        Total tracked:    1h 5m
        Productive:         50m  ████████░░   77%
        Neutral:             5m  █░░░░░░░░░    8%
        Distracting:        10m  ██░░░░░░░░   15%

        BY DAY
        ──────
        2025-03-03 (Mon)  40m
          Code                     30m  Code
          Chrome                   10m  Chrome
        2025-03-04 (Tue)  25m
          Code                     20m  Code
          Slack                     5m  Uncategorized
        ");
    }

    #[test]
    fn subject_filter_narrows_report() {
        let db = seeded();
        let data = generate_report_data(
            &db,
            date("2025-03-04"),
            date("2025-03-04"),
            Some(SubjectId::new("pc-2").unwrap()),
        )
        .unwrap();

        assert_eq!(data.days.len(), 1);
        assert_eq!(data.days[0].apps.len(), 1);
        assert_eq!(data.days[0].apps[0].app_name, "Slack");
        assert!((data.summary.neutral_seconds - 300.0).abs() < 1e-9);
        assert!(data.summary.productive_seconds.abs() < 1e-9);
    }

    #[test]
    fn json_report_is_machine_readable() {
        let db = seeded();
        let mut output = Vec::new();
        run(
            &mut output,
            &db,
            &config(),
            Some(date("2025-03-03")),
            None,
            Some("pc-1"),
            true,
        )
        .unwrap();

        let parsed: serde_json::Value = serde_json::from_slice(&output).unwrap();
        assert_eq!(parsed["start"], "2025-03-03");
        assert_eq!(parsed["end"], "2025-03-03");
        assert_eq!(parsed["subject_id"], "pc-1");
        assert_eq!(parsed["summary"]["productive_seconds"], 1800.0);
        assert_eq!(parsed["days"][0]["apps"][1]["app_name"], "Chrome");
        assert_eq!(parsed["days"][0]["apps"][1]["productivity_type"], "DISTRACTING");
    }

    #[test]
    fn empty_period_prints_hint() {
        let db = Database::open_in_memory().unwrap();
        let mut output = Vec::new();
        run(
            &mut output,
            &db,
            &config(),
            Some(date("2025-03-03")),
            None,
            None,
            false,
        )
        .unwrap();

        assert_snapshot!(String::from_utf8(output).unwrap(), @r"
        TIME REPORT: Monday, Mar 3, 2025

        No usage recorded in this period.

        Hint: Run 'tg recompute' to rebuild hourly statistics.
        ");
    }

    #[test]
    fn inverted_range_is_rejected() {
        let db = Database::open_in_memory().unwrap();
        assert!(generate_report_data(&db, date("2025-03-04"), date("2025-03-03"), None).is_err());
    }
}
