//! Status command: what is stored and how fresh it is.

use std::io::Write;

use anyhow::Result;
use tg_db::Database;

use crate::Config;

pub fn run<W: Write>(writer: &mut W, db: &Database, config: &Config) -> Result<()> {
    writeln!(writer, "timeglass status")?;
    writeln!(writer, "Database: {}", config.database_path.display())?;
    writeln!(writer, "Time zone: UTC{}", config.utc_offset)?;

    let Some(span) = db.observation_span()? else {
        writeln!(writer, "No observations recorded.")?;
        return Ok(());
    };
    let zone = config.zone()?;

    writeln!(
        writer,
        "Observations: {} from {} subjects",
        db.observation_count()?,
        db.subject_count()?
    )?;
    writeln!(
        writer,
        "Covering: {} .. {}",
        span.first.with_timezone(&zone),
        span.last.with_timezone(&zone)
    )?;
    writeln!(writer, "Hourly buckets: {}", db.bucket_count()?)?;
    match db.last_bucket_update()? {
        Some(updated) => writeln!(writer, "Last updated: {}", updated.with_timezone(&zone))?,
        None => writeln!(writer, "Last updated: never (run 'tg recompute')")?,
    }
    Ok(())
}
