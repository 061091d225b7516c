//! CLI subcommand implementations.

pub mod categories;
pub mod import;
pub mod ingest;
pub mod recompute;
pub mod report;
pub mod status;
pub mod usage;
pub mod util;
