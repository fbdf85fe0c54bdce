//! Runtime configuration
//!
//! Defaults, then an optional TOML file, then environment variables. CLI flags
//! are applied last by the binary.

use std::path::{Path, PathBuf};
use std::time::Duration;

use anyhow::{bail, Context, Result};
use serde::{Deserialize, Serialize};

use crate::filter::{FilterPolicy, DEFAULT_DENYLIST, DEFAULT_MAX_FILE_SIZE};

pub const DEFAULT_BATCH_SIZE: usize = 50;
pub const DEFAULT_FETCH_TIMEOUT_SECS: u64 = 300;

#[derive(Debug, Clone, Default, Deserialize, Serialize)]
#[serde(default)]
pub struct AppConfig {
    pub database: DatabaseConfig,
    pub ingest: IngestConfig,
}

#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct DatabaseConfig {
    pub url: Option<String>,
    pub max_connections: u32,
    pub connect_timeout_secs: u64,
}

impl Default for DatabaseConfig {
    fn default() -> Self {
        Self {
            url: None,
            max_connections: 5,
            connect_timeout_secs: 30,
        }
    }
}

/// Settings for the import pipeline
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct IngestConfig {
    /// Parent of the per-project scratch directories
    pub scratch_dir: PathBuf,
    pub max_file_size: u64,
    pub batch_size: usize,
    pub denylist: Vec<String>,
    pub fetch_timeout_secs: u64,
}

impl Default for IngestConfig {
    fn default() -> Self {
        Self {
            scratch_dir: std::env::temp_dir().join("coframe-scratch"),
            max_file_size: DEFAULT_MAX_FILE_SIZE,
            batch_size: DEFAULT_BATCH_SIZE,
            denylist: DEFAULT_DENYLIST.iter().map(|d| d.to_string()).collect(),
            fetch_timeout_secs: DEFAULT_FETCH_TIMEOUT_SECS,
        }
    }
}

impl IngestConfig {
    pub fn validate(&self) -> Result<()> {
        if self.batch_size == 0 {
            bail!("batch_size must be at least 1");
        }
        if self.max_file_size == 0 {
            bail!("max_file_size must be at least 1 byte");
        }
        if self.fetch_timeout_secs == 0 {
            bail!("fetch_timeout_secs must be at least 1");
        }
        Ok(())
    }

    pub fn filter_policy(&self) -> FilterPolicy {
        FilterPolicy::new(self.denylist.iter().cloned(), self.max_file_size)
    }

    pub fn fetch_timeout(&self) -> Duration {
        Duration::from_secs(self.fetch_timeout_secs)
    }
}

impl AppConfig {
    /// Load configuration from a TOML file
    pub fn from_file(path: &Path) -> Result<Self> {
        let content = std::fs::read_to_string(path)
            .with_context(|| format!("Failed to read config file {}", path.display()))?;
        let config: AppConfig = toml::from_str(&content)
            .with_context(|| format!("Failed to parse config file {}", path.display()))?;
        Ok(config)
    }

    /// Load configuration from an optional file and the process environment
    pub fn load(path: Option<&Path>) -> Result<Self> {
        let mut config = match path {
            Some(path) => Self::from_file(path)?,
            None => Self::default(),
        };
        config.apply_env(|key| std::env::var(key).ok())?;
        config.ingest.validate()?;
        Ok(config)
    }

    /// Override fields from environment variables provided by `lookup`
    pub fn apply_env(&mut self, lookup: impl Fn(&str) -> Option<String>) -> Result<()> {
        if let Some(url) = lookup("COFRAME_DATABASE_URL").or_else(|| lookup("DATABASE_URL")) {
            self.database.url = Some(url);
        }
        if let Some(value) = lookup("COFRAME_DATABASE_MAX_CONNECTIONS") {
            self.database.max_connections = value
                .parse()
                .context("Invalid COFRAME_DATABASE_MAX_CONNECTIONS")?;
        }
        if let Some(dir) = lookup("COFRAME_SCRATCH_DIR") {
            self.ingest.scratch_dir = PathBuf::from(dir);
        }
        if let Some(value) = lookup("COFRAME_MAX_FILE_SIZE") {
            self.ingest.max_file_size = value.parse().context("Invalid COFRAME_MAX_FILE_SIZE")?;
        }
        if let Some(value) = lookup("COFRAME_BATCH_SIZE") {
            self.ingest.batch_size = value.parse().context("Invalid COFRAME_BATCH_SIZE")?;
        }
        if let Some(value) = lookup("COFRAME_FETCH_TIMEOUT_SECS") {
            self.ingest.fetch_timeout_secs = value
                .parse()
                .context("Invalid COFRAME_FETCH_TIMEOUT_SECS")?;
        }
        if let Some(value) = lookup("COFRAME_DENYLIST") {
            self.ingest.denylist = value
                .split(',')
                .map(str::trim)
                .filter(|name| !name.is_empty())
                .map(String::from)
                .collect();
        }
        Ok(())
    }
}
