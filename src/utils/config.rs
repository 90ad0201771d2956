// src/utils/config.rs
//! Engine configuration
//!
//! Loaded from an optional config file and `RECORDING_ENGINE__*` environment
//! overrides, e.g. `RECORDING_ENGINE__RECORDING__COMMIT_WAIT_SECS=60`.

use crate::utils::errors::{RecorderError, Result};
use serde::{Deserialize, Serialize};
use std::path::PathBuf;
use std::time::Duration;

/// Environment variable prefix for overrides
pub const ENV_PREFIX: &str = "RECORDING_ENGINE";

/// Top-level engine configuration
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct EngineConfig {
    pub recording: RecordingConfig,
    pub sweeper: SweeperConfig,
    pub storage: StorageConfig,
    pub observability: ObservabilityConfig,
}

/// Recording lease and commit timings
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct RecordingConfig {
    /// Lifetime of the "open" lease, renewed on activity
    pub open_rec_ttl_secs: u64,

    /// Lifetime of the per-file commit-wait lease
    pub commit_wait_secs: u64,

    /// Extension of generated index files
    pub index_ext: String,
}

impl Default for RecordingConfig {
    fn default() -> Self {
        Self {
            open_rec_ttl_secs: 5400,
            commit_wait_secs: 30,
            index_ext: "cdxj".to_string(),
        }
    }
}

impl RecordingConfig {
    pub fn open_rec_ttl(&self) -> Duration {
        Duration::from_secs(self.open_rec_ttl_secs)
    }

    pub fn commit_wait(&self) -> Duration {
        Duration::from_secs(self.commit_wait_secs)
    }
}

/// Background commit sweeper settings
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct SweeperConfig {
    /// Delay between commit passes (milliseconds)
    pub interval_ms: u64,

    /// Give up on a recording after this many incomplete passes
    pub max_passes: Option<u32>,
}

impl Default for SweeperConfig {
    fn default() -> Self {
        Self {
            interval_ms: 30_000,
            max_passes: None,
        }
    }
}

impl SweeperConfig {
    pub fn interval(&self) -> Duration {
        Duration::from_millis(self.interval_ms)
    }
}

/// Directory storage backend settings
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct StorageConfig {
    /// Root directory committed files are copied into
    pub base_dir: PathBuf,

    /// SQLite upload ledger file name
    pub db_name: String,
}

impl Default for StorageConfig {
    fn default() -> Self {
        Self {
            base_dir: PathBuf::from("./data/storage"),
            db_name: "uploads.db".to_string(),
        }
    }
}

/// Log output format
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum LogFormat {
    #[default]
    Plain,
    Json,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct ObservabilityConfig {
    pub log_format: LogFormat,
}

impl EngineConfig {
    /// Load configuration from environment overrides only
    pub fn load() -> Result<Self> {
        Self::load_from(None)
    }

    /// Load configuration from an optional file plus environment overrides
    pub fn load_from(path: Option<&str>) -> Result<Self> {
        let mut builder = config::Config::builder();

        if let Some(path) = path {
            builder = builder.add_source(config::File::with_name(path).required(false));
        }

        let settings = builder
            .add_source(
                config::Environment::with_prefix(ENV_PREFIX)
                    .prefix_separator("__")
                    .separator("__"),
            )
            .build()?;

        let config: EngineConfig = settings.try_deserialize()?;
        config.validate()?;
        Ok(config)
    }

    /// Reject settings that would disable the soft locks or spin the sweeper
    pub fn validate(&self) -> Result<()> {
        if self.recording.open_rec_ttl_secs == 0 {
            return Err(RecorderError::Config(
                "open_rec_ttl_secs cannot be 0".to_string(),
            ));
        }
        if self.recording.commit_wait_secs == 0 {
            return Err(RecorderError::Config(
                "commit_wait_secs cannot be 0".to_string(),
            ));
        }
        if self.recording.index_ext.is_empty() {
            return Err(RecorderError::Config("index_ext cannot be empty".to_string()));
        }
        if self.sweeper.interval_ms == 0 {
            return Err(RecorderError::Config(
                "sweeper interval_ms cannot be 0".to_string(),
            ));
        }
        Ok(())
    }
}
