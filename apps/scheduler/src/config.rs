//! Scheduler configuration loaded from environment variables
//!
//! Shared settings (database, catalog, environment) come from
//! `encore-shared-config`; this module adds the scheduler's own knobs.

use std::path::PathBuf;

use anyhow::{Context, Result};
use encore_shared_config::{
    get_env_or_default, parse_env, CatalogConfig, CommonConfig, DatabaseConfig, Environment,
};

const DEFAULT_PORT: u16 = 8090;
const DEFAULT_LOG_DIR: &str = "./logs/tasks";
const DEFAULT_BATCH_SIZE: i64 = 200;

/// Scheduler configuration
#[derive(Debug, Clone)]
pub struct Config {
    /// Common configuration shared with other services
    pub common: CommonConfig,

    /// Admin HTTP port
    pub port: u16,

    /// Base directory for per-task log folders
    pub log_dir: PathBuf,

    /// Items loaded per backfill run
    pub batch_size: i64,
}

impl Config {
    /// Load configuration from environment variables
    pub fn from_env() -> Result<Self> {
        let common = CommonConfig::from_env().context("Failed to load common config")?;

        let batch_size: i64 = parse_env("BACKFILL_BATCH_SIZE", DEFAULT_BATCH_SIZE)
            .context("Invalid BACKFILL_BATCH_SIZE value")?;
        if batch_size <= 0 {
            anyhow::bail!("BACKFILL_BATCH_SIZE must be positive, got {}", batch_size);
        }

        Ok(Self {
            common,
            port: parse_env("SCHEDULER_PORT", DEFAULT_PORT)
                .context("Invalid SCHEDULER_PORT value")?,
            log_dir: PathBuf::from(get_env_or_default("TASK_LOG_DIR", DEFAULT_LOG_DIR)),
            batch_size,
        })
    }

    pub fn database(&self) -> &DatabaseConfig {
        &self.common.database
    }

    pub fn catalog(&self) -> &CatalogConfig {
        &self.common.catalog
    }

    pub fn environment(&self) -> Environment {
        self.common.environment
    }
}
