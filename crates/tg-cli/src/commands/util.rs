//! Shared utilities for CLI commands.

use std::sync::LazyLock;

use anyhow::Context;
use chrono::{DateTime, Duration, FixedOffset, NaiveDate, NaiveDateTime};
use regex::Regex;
use tg_core::Timestamp;

/// Pre-compiled regex for relative time parsing.
static RELATIVE_TIME_RE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"^(\d+)\s+(minute|hour|day|week)s?\s+ago$").unwrap());

/// Conservative bounds for relative time parsing (~1000 years in minutes).
const MAX_RELATIVE_MINUTES: i64 = 1000 * 365 * 24 * 60;

/// Wall-clock formats accepted without an offset; read in the processing zone.
const NAIVE_FORMATS: &[&str] = &[
    "%Y-%m-%dT%H:%M:%S%.f",
    "%Y-%m-%d %H:%M:%S%.f",
    "%Y-%m-%dT%H:%M",
    "%Y-%m-%d %H:%M",
    // Log exports, e.g. "Mar 2, 2025 @ 15:20:24.000"
    "%b %d, %Y @ %H:%M:%S%.f",
];

fn in_zone(naive: NaiveDateTime, zone: FixedOffset) -> anyhow::Result<Timestamp> {
    naive
        .and_local_timezone(zone)
        .single()
        .with_context(|| format!("{naive} does not exist in {zone}"))
}

/// Parses an absolute timestamp. Values with an offset keep their instant;
/// values without one are read as wall-clock time in `zone`.
pub fn parse_timestamp(s: &str, zone: FixedOffset) -> anyhow::Result<Timestamp> {
    let s = s.trim();
    if let Ok(dt) = DateTime::parse_from_rfc3339(s) {
        return Ok(dt.with_timezone(&zone));
    }
    for format in NAIVE_FORMATS {
        if let Ok(naive) = NaiveDateTime::parse_from_str(s, format) {
            return in_zone(naive, zone);
        }
    }
    if let Ok(date) = NaiveDate::parse_from_str(s, "%Y-%m-%d") {
        return in_zone(date.and_time(chrono::NaiveTime::MIN), zone);
    }
    anyhow::bail!(
        "Invalid timestamp: {s}. Use ISO 8601 (e.g., 2025-03-03T09:00:00+08:00) or local time (e.g., 2025-03-03 09:00:00)"
    )
}

/// Parses a datetime string as an absolute timestamp or a relative time.
///
/// Supports everything [`parse_timestamp`] does plus
/// "2 hours ago", "30 minutes ago", "1 day ago", "1 week ago" measured from `now`.
pub fn parse_datetime(s: &str, zone: FixedOffset, now: Timestamp) -> anyhow::Result<Timestamp> {
    let Some(caps) = RELATIVE_TIME_RE.captures(s.trim()) else {
        return parse_timestamp(s, zone);
    };

    let n: i64 = caps[1]
        .parse()
        .context("failed to parse number in relative time")?;

    let (max_for_unit, minutes_per_unit) = match &caps[2] {
        "minute" => (MAX_RELATIVE_MINUTES, 1),
        "hour" => (MAX_RELATIVE_MINUTES / 60, 60),
        "day" => (MAX_RELATIVE_MINUTES / (60 * 24), 60 * 24),
        "week" => (MAX_RELATIVE_MINUTES / (60 * 24 * 7), 60 * 24 * 7),
        unit => anyhow::bail!("Unknown time unit: {unit}"),
    };

    if n > max_for_unit {
        anyhow::bail!("Relative time value too large: {n} {}", &caps[2]);
    }

    Ok(now.with_timezone(&zone) - Duration::minutes(n * minutes_per_unit))
}

/// Formats seconds as "Xh Ym" or "Ym".
#[allow(clippy::cast_possible_truncation)]
pub fn format_duration(seconds: f64) -> String {
    if seconds <= 0.0 || !seconds.is_finite() {
        return "0m".to_string();
    }
    let total_minutes = (seconds / 60.0) as i64;
    let hours = total_minutes / 60;
    let minutes = total_minutes % 60;

    if hours >= 1 {
        format!("{hours}h {minutes}m")
    } else {
        format!("{minutes}m")
    }
}

/// Generates a 10-character progress bar for a percentage.
/// Non-zero values under 5% get a single block for visibility.
#[allow(clippy::cast_possible_truncation, clippy::cast_sign_loss)]
pub fn progress_bar(percent: f64) -> String {
    let filled = if percent > 0.0 && percent < 5.0 {
        1
    } else {
        (percent / 10.0).round().clamp(0.0, 10.0) as usize
    };

    let empty = 10 - filled;
    format!("{}{}", "█".repeat(filled), "░".repeat(empty))
}
