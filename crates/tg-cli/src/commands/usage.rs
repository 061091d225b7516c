//! Lists stored hourly buckets.

use std::io::Write;

use anyhow::Result;
use serde::Serialize;
use tg_core::HourlyUsageBucket;
use tg_db::{Database, UsageFilter};

use super::util::format_duration;

#[derive(Debug, Serialize)]
struct UsagePage<'a> {
    total: usize,
    limit: Option<usize>,
    offset: usize,
    items: &'a [HourlyUsageBucket],
}

/// Prints one page of buckets matching `filter`.
pub fn run<W: Write>(writer: &mut W, db: &Database, filter: &UsageFilter, json: bool) -> Result<()> {
    let total = db.count_hourly_usage(filter)?;
    let buckets = db.list_hourly_usage(filter)?;

    if json {
        let page = UsagePage {
            total,
            limit: filter.limit,
            offset: filter.offset,
            items: &buckets,
        };
        writeln!(writer, "{}", serde_json::to_string_pretty(&page)?)?;
        return Ok(());
    }

    if buckets.is_empty() {
        writeln!(writer, "No hourly usage matches.")?;
        return Ok(());
    }

    for bucket in &buckets {
        let marker = if bucket.is_working_hour { '*' } else { ' ' };
        write!(
            writer,
            "{}{marker} {:<10} {:<20} {:>7} active {:>7} sessions {:>3}",
            bucket.hour_start.format("%Y-%m-%d %H:00"),
            bucket.subject_id.as_str(),
            bucket.app_name,
            format_duration(bucket.total_time_seconds),
            format_duration(bucket.active_time_seconds),
            bucket.session_count,
        )?;
        if !bucket.dominant_window_name.is_empty() {
            write!(writer, "  {}", bucket.dominant_window_name)?;
        }
        writeln!(writer)?;
    }
    let shown_to = filter.offset + buckets.len();
    writeln!(writer, "Showing {}-{shown_to} of {total}", filter.offset + 1)?;
    Ok(())
}
