//! Configuration loading and management.

use std::path::{Path, PathBuf};

use anyhow::Context;
use chrono::FixedOffset;
use figment::Figment;
use figment::providers::{Env, Format, Serialized, Toml};
use serde::{Deserialize, Serialize};
use tg_core::{
    AggregationConfig, DEFAULT_CATEGORY_NAME, MAX_HOURS_BACK, PipelineConfig, WorkingHours,
};

/// Application configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Config {
    /// Path to the database file.
    pub database_path: PathBuf,

    /// Processing time zone as a UTC offset, e.g. `+08:00`. Hour buckets are
    /// cut on this zone's wall clock.
    pub utc_offset: String,

    /// Category for applications no other category matches.
    pub default_category: String,

    #[serde(default)]
    pub aggregation: AggregationConfig,

    #[serde(default)]
    pub working_hours: WorkingHours,

    #[serde(default)]
    pub recompute: RecomputeSettings,
}

/// Defaults for `tg recompute`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct RecomputeSettings {
    /// Window size when no explicit range is given. Default: 24.
    pub hours_back: u32,

    /// Subjects processed in parallel; 0 means one per core.
    pub workers: usize,
}

impl Default for RecomputeSettings {
    fn default() -> Self {
        Self {
            hours_back: 24,
            workers: 0,
        }
    }
}

impl Default for Config {
    fn default() -> Self {
        let data_dir = dirs_data_path().unwrap_or_else(|| PathBuf::from("."));
        Self {
            database_path: data_dir.join("tg.db"),
            utc_offset: "+00:00".to_string(),
            default_category: DEFAULT_CATEGORY_NAME.to_string(),
            aggregation: AggregationConfig::default(),
            working_hours: WorkingHours::default(),
            recompute: RecomputeSettings::default(),
        }
    }
}

impl Config {
    /// Loads configuration, optionally from a specific file.
    ///
    /// Later sources win: defaults, `~/.config/tg/config.toml`, the given
    /// file, then `TG_*` environment variables (`__` separates nested keys,
    /// e.g. `TG_AGGREGATION__SESSION_GAP_SECS=300`).
    #[expect(
        clippy::result_large_err,
        reason = "figment::Error is large but only returned at startup"
    )]
    pub fn load_from(config_path: Option<&Path>) -> Result<Self, figment::Error> {
        let mut figment = Figment::from(Serialized::defaults(Self::default()));

        if let Some(config_dir) = dirs_config_path() {
            figment = figment.merge(Toml::file(config_dir.join("config.toml")));
        }

        if let Some(path) = config_path {
            figment = figment.merge(Toml::file(path));
        }

        figment = figment.merge(Env::prefixed("TG_").split("__"));

        figment.extract()
    }

    /// The processing zone.
    pub fn zone(&self) -> anyhow::Result<FixedOffset> {
        self.utc_offset
            .parse()
            .with_context(|| format!("invalid utc_offset {:?}, expected e.g. \"+08:00\"", self.utc_offset))
    }

    /// Settings for the aggregation pipeline.
    pub fn pipeline(&self) -> PipelineConfig {
        PipelineConfig {
            aggregation: self.aggregation.clone(),
            working_hours: self.working_hours.clone(),
            default_category: self.default_category.clone(),
        }
    }

    /// Checks every setting that could make later commands misbehave.
    pub fn validate(&self) -> anyhow::Result<()> {
        self.zone()?;
        self.pipeline()
            .validate()
            .context("invalid aggregation settings")?;
        if self.recompute.hours_back > MAX_HOURS_BACK {
            anyhow::bail!(
                "invalid recompute.hours_back {}: the limit is {MAX_HOURS_BACK}",
                self.recompute.hours_back
            );
        }
        Ok(())
    }
}

/// Returns the platform-specific config directory for tg.
fn dirs_config_path() -> Option<PathBuf> {
    dirs::config_dir().map(|p| p.join("tg"))
}

/// Returns the platform-specific data directory for tg.
///
/// On Linux: `~/.local/share/tg`
pub fn dirs_data_path() -> Option<PathBuf> {
    dirs::data_dir().map(|p| p.join("tg"))
}
