//! Recompute command: rebuild hourly buckets from stored observations.

use std::io::Write;

use anyhow::{Context, Result};
use chrono::Utc;
use tg_core::{
    RecomputeReport, RecomputeWindow, Recomputer, SubjectId, SubjectScope, SubjectStatus, Timestamp,
};
use tg_db::{Database, ObservationSource};

use crate::Config;

use super::util::parse_datetime;

/// Which hours to rebuild.
#[derive(Debug, Clone, Default)]
pub struct WindowArgs {
    pub subject: Option<String>,
    pub hours_back: Option<u32>,
    pub start: Option<String>,
    pub end: Option<String>,
}

/// Resolves command-line window arguments against `now`.
pub fn resolve_window(args: &WindowArgs, config: &Config, now: Timestamp) -> Result<RecomputeWindow> {
    let zone = config.zone()?;
    let scope = match &args.subject {
        Some(subject) => SubjectScope::One(SubjectId::new(subject.as_str())?),
        None => SubjectScope::All,
    };

    let window = match (&args.start, &args.end) {
        (Some(start), Some(end)) => {
            let start = parse_datetime(start, zone, now).context("invalid --start")?;
            let end = parse_datetime(end, zone, now).context("invalid --end")?;
            RecomputeWindow::new(scope, start, end)?
        }
        _ => {
            let hours = args.hours_back.unwrap_or(config.recompute.hours_back);
            RecomputeWindow::hours_back(scope, hours, now.with_timezone(&zone))?
        }
    };
    Ok(window)
}

/// Rebuilds the window and prints one line per subject.
pub fn run<W: Write>(
    writer: &mut W,
    db: &Database,
    config: &Config,
    args: &WindowArgs,
) -> Result<RecomputeReport> {
    let now = Utc::now();
    let zone = config.zone()?;
    let window = resolve_window(args, config, now.with_timezone(&zone))?;

    let source = ObservationSource::new(db, zone);
    let pipeline = config.pipeline();
    let report = Recomputer::new(&source, db, db, &pipeline)
        .with_workers(config.recompute.workers)
        .recompute(&window, now)?;

    write_report(writer, &report)?;
    Ok(report)
}

fn write_report<W: Write>(writer: &mut W, report: &RecomputeReport) -> Result<()> {
    writeln!(writer, "Recomputed {} .. {}", report.start, report.end)?;
    if report.outcomes.is_empty() {
        writeln!(writer, "No observations in window.")?;
        return Ok(());
    }

    for outcome in &report.outcomes {
        match &outcome.status {
            SubjectStatus::Completed {
                observations,
                cleared,
                written,
            } => writeln!(
                writer,
                "- {}: {observations} observations, {cleared} buckets cleared, {written} written",
                outcome.subject_id
            )?,
            SubjectStatus::Failed { state, error } => writeln!(
                writer,
                "- {}: failed while {state}: {error}",
                outcome.subject_id
            )?,
            SubjectStatus::Cancelled => writeln!(writer, "- {}: cancelled", outcome.subject_id)?,
        }
    }
    writeln!(
        writer,
        "{} completed, {} failed, {} buckets written",
        report.completed(),
        report.failed(),
        report.written()
    )?;
    Ok(())
}
