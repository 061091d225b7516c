//! Command-line argument definitions.

use std::path::PathBuf;

use chrono::NaiveDate;
use clap::{Parser, Subcommand};
use tg_core::{CategoryId, ProductivityType};

/// Hourly app usage statistics from focus telemetry.
///
/// Imports per-machine focus samples, attributes time to applications and
/// rolls it up into hourly buckets classified by productivity.
#[derive(Debug, Parser)]
#[command(name = "tg", version, about, long_about = None)]
pub struct Cli {
    /// Enable verbose output.
    #[arg(short, long, global = true)]
    pub verbose: bool,

    /// Path to config file.
    #[arg(short, long, global = true)]
    pub config: Option<PathBuf>,

    #[command(subcommand)]
    pub command: Option<Commands>,
}

/// Available subcommands.
#[derive(Debug, Subcommand)]
pub enum Commands {
    /// Show database contents and freshness.
    Status,

    /// Import focus observations from stdin (JSONL).
    Import {
        /// Subject for lines that carry no `subject_id`.
        #[arg(long)]
        subject: Option<String>,

        /// Also fold the imported observations into hourly buckets,
        /// adding to what is already stored.
        #[arg(long)]
        accumulate: bool,
    },

    /// Rebuild hourly buckets for a time window from stored observations.
    ///
    /// Without --start/--end, covers the last `recompute.hours_back` hours.
    Recompute {
        /// Only recompute this subject.
        #[arg(long)]
        subject: Option<String>,

        /// Window size in hours, ending now.
        #[arg(long, conflicts_with_all = ["start", "end"])]
        hours_back: Option<u32>,

        /// Window start (ISO 8601, local time or relative like "2 days ago").
        #[arg(long, requires = "end")]
        start: Option<String>,

        /// Window end (exclusive).
        #[arg(long, requires = "start")]
        end: Option<String>,
    },

    /// Add externally measured usage to one hourly bucket.
    Ingest {
        #[arg(long)]
        subject: String,

        #[arg(long)]
        app: String,

        #[arg(long, default_value = "")]
        window: String,

        /// Any instant inside the hour (ISO 8601 or local time).
        #[arg(long)]
        hour: String,

        /// Minutes of use to add.
        #[arg(long)]
        minutes: f64,

        /// Sessions to add; use 0 when continuing an already counted session.
        #[arg(long, default_value_t = 1)]
        sessions: u32,
    },

    /// Manage productivity categories.
    #[command(subcommand)]
    Categories(CategoriesAction),

    /// Show a productivity report for a date range.
    Report {
        /// First day (inclusive). Defaults to today.
        #[arg(long)]
        start: Option<NaiveDate>,

        /// Last day (inclusive). Defaults to the start day.
        #[arg(long)]
        end: Option<NaiveDate>,

        #[arg(long)]
        subject: Option<String>,

        /// Output as JSON.
        #[arg(long)]
        json: bool,
    },

    /// List stored hourly buckets.
    Usage {
        #[arg(long)]
        subject: Option<String>,

        /// Exact app name, ignoring case.
        #[arg(long)]
        app: Option<String>,

        #[arg(long)]
        category: Option<CategoryId>,

        #[arg(long)]
        start: Option<NaiveDate>,

        #[arg(long)]
        end: Option<NaiveDate>,

        #[arg(long, default_value_t = 50)]
        limit: usize,

        #[arg(long, default_value_t = 0)]
        offset: usize,

        /// Output as JSON.
        #[arg(long)]
        json: bool,
    },
}

/// Category administration.
#[derive(Debug, Subcommand)]
pub enum CategoriesAction {
    /// List categories.
    List {
        /// Only categories of this type.
        #[arg(long = "type")]
        productivity_type: Option<ProductivityType>,

        /// Output as JSON.
        #[arg(long)]
        json: bool,
    },

    /// Create a category.
    Add {
        name: String,

        /// PRODUCTIVE, NEUTRAL or DISTRACTING.
        #[arg(long = "type")]
        productivity_type: ProductivityType,

        #[arg(long)]
        description: Option<String>,
    },

    /// Rename, retype or redescribe a category.
    Update {
        id: CategoryId,

        #[arg(long)]
        name: Option<String>,

        #[arg(long = "type")]
        productivity_type: Option<ProductivityType>,

        #[arg(long)]
        description: Option<String>,
    },

    /// Delete a category no bucket references.
    Remove { id: CategoryId },
}

#[cfg(test)]
mod tests {
    use clap::CommandFactory;

    use super::*;

    #[test]
    fn cli_definition_is_consistent() {
        Cli::command().debug_assert();
    }

    #[test]
    fn categories_add_parses_type_case_insensitively() {
        let cli = Cli::try_parse_from(["tg", "categories", "add", "Code", "--type", "productive"])
            .unwrap();
        let Some(Commands::Categories(CategoriesAction::Add {
            name,
            productivity_type,
            description,
        })) = cli.command
        else {
            panic!("expected categories add");
        };
        assert_eq!(name, "Code");
        assert_eq!(productivity_type, ProductivityType::Productive);
        assert_eq!(description, None);
    }

    #[test]
    fn recompute_rejects_half_open_range() {
        assert!(Cli::try_parse_from(["tg", "recompute", "--start", "2025-03-03T09:00:00"]).is_err());
        assert!(
            Cli::try_parse_from(["tg", "recompute", "--hours-back", "4", "--start", "a", "--end", "b"])
                .is_err()
        );
    }
}
