//! TOML configuration: store, fetch policy, and the source list.

use std::collections::HashSet;
use std::path::{Path, PathBuf};
use std::time::Duration;

use chrono_tz::Tz;
use serde::Deserialize;
use thiserror::Error;

use drawwatch_core::{DEFAULT_GRACE_MINUTES, ScheduleError, SlotSchedule};
use drawwatch_extract::{DrawExtractor, ExtractError, ExtractorSpec};
use drawwatch_fetch::http::DEFAULT_USER_AGENT;
use drawwatch_fetch::{FetchSpec, RetryPolicy};
use drawwatch_store::SourceMeta;

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("read {path}: {source}")]
    Io {
        path: PathBuf,
        source: std::io::Error,
    },
    #[error("parse config: {0}")]
    Parse(#[from] toml::de::Error),
    #[error("duplicate source id {0:?}")]
    DuplicateSource(String),
    #[error("source {id:?}: unknown time zone {zone:?}")]
    TimeZone { id: String, zone: String },
    #[error("source {id:?}: schedule: {source}")]
    Schedule { id: String, source: ScheduleError },
    #[error("source {id:?}: extractor: {source}")]
    Extractor { id: String, source: ExtractError },
    #[error("source {id:?}: {reason}")]
    Invalid { id: String, reason: String },
    #[error("{0}")]
    Other(String),
}

fn default_store_timeout() -> u64 {
    5
}

fn default_fetch_timeout() -> u64 {
    30
}

fn default_max_attempts() -> u32 {
    3
}

fn default_backoff() -> u64 {
    10
}

fn default_user_agent() -> String {
    DEFAULT_USER_AGENT.to_string()
}

fn default_timezone() -> String {
    "America/New_York".to_string()
}

fn default_grace() -> i64 {
    DEFAULT_GRACE_MINUTES
}

#[derive(Debug, Clone, Deserialize)]
pub struct StoreConfig {
    /// DuckDB file. Omitted means an in-memory database.
    #[serde(default)]
    pub path: Option<PathBuf>,
    #[serde(default = "default_store_timeout")]
    pub timeout_secs: u64,
}

impl Default for StoreConfig {
    fn default() -> Self {
        Self {
            path: None,
            timeout_secs: default_store_timeout(),
        }
    }
}

impl StoreConfig {
    pub fn timeout(&self) -> Duration {
        Duration::from_secs(self.timeout_secs)
    }
}

#[derive(Debug, Clone, Deserialize)]
pub struct FetchConfig {
    #[serde(default = "default_fetch_timeout")]
    pub timeout_secs: u64,
    #[serde(default = "default_max_attempts")]
    pub max_attempts: u32,
    #[serde(default = "default_backoff")]
    pub backoff_secs: u64,
    #[serde(default = "default_user_agent")]
    pub user_agent: String,
    /// Base URL of the headless render service, for `rendered` sources.
    #[serde(default)]
    pub render_service: Option<String>,
}

impl Default for FetchConfig {
    fn default() -> Self {
        Self {
            timeout_secs: default_fetch_timeout(),
            max_attempts: default_max_attempts(),
            backoff_secs: default_backoff(),
            user_agent: default_user_agent(),
            render_service: None,
        }
    }
}

impl FetchConfig {
    pub fn timeout(&self) -> Duration {
        Duration::from_secs(self.timeout_secs)
    }

    pub fn retry_policy(&self) -> RetryPolicy {
        RetryPolicy {
            max_attempts: self.max_attempts,
            backoff: Duration::from_secs(self.backoff_secs),
            attempt_timeout: self.timeout(),
        }
    }
}

#[derive(Debug, Clone, Deserialize)]
pub struct SourceConfig {
    pub id: String,
    pub lottery_name: String,
    pub draw_name: String,
    pub country: String,
    #[serde(default = "default_timezone")]
    pub timezone: String,
    #[serde(default = "default_grace")]
    pub grace_minutes: i64,
    pub fetch: FetchSpec,
    pub extractor: ExtractorSpec,
    #[serde(default)]
    pub schedule: Option<SlotSchedule>,
}

impl SourceConfig {
    pub fn meta(&self) -> SourceMeta {
        SourceMeta {
            source_id: self.id.clone(),
            lottery_name: self.lottery_name.clone(),
            draw_name: self.draw_name.clone(),
            country: self.country.clone(),
        }
    }

    pub fn tz(&self) -> Result<Tz, ConfigError> {
        self.timezone
            .parse::<Tz>()
            .map_err(|_| ConfigError::TimeZone {
                id: self.id.clone(),
                zone: self.timezone.clone(),
            })
    }

    pub fn grace(&self) -> chrono::Duration {
        chrono::Duration::minutes(self.grace_minutes)
    }

    /// Build the configured extractor, validating selectors and patterns.
    pub fn build_extractor(&self) -> Result<Box<dyn DrawExtractor>, ConfigError> {
        self.extractor
            .build()
            .map_err(|source| ConfigError::Extractor {
                id: self.id.clone(),
                source,
            })
    }

    fn validate(&self) -> Result<(), ConfigError> {
        let invalid = |reason: &str| ConfigError::Invalid {
            id: self.id.clone(),
            reason: reason.to_string(),
        };
        if self.id.trim().is_empty() {
            return Err(ConfigError::Other("source with empty id".into()));
        }
        if self.grace_minutes < 0 {
            return Err(invalid("grace_minutes must not be negative"));
        }
        if self.fetch.url().trim().is_empty() {
            return Err(invalid("fetch url is empty"));
        }
        self.tz()?;
        if let Some(schedule) = &self.schedule {
            schedule.validate().map_err(|source| ConfigError::Schedule {
                id: self.id.clone(),
                source,
            })?;
        }
        self.build_extractor()?;
        Ok(())
    }
}

#[derive(Debug, Clone, Deserialize)]
pub struct Config {
    #[serde(default)]
    pub store: StoreConfig,
    #[serde(default)]
    pub fetch: FetchConfig,
    #[serde(default)]
    pub sources: Vec<SourceConfig>,
}

impl Config {
    pub fn load(path: &Path) -> Result<Self, ConfigError> {
        let content = std::fs::read_to_string(path).map_err(|source| ConfigError::Io {
            path: path.to_path_buf(),
            source,
        })?;
        Self::from_toml(&content)
    }

    /// Parse and validate.
    pub fn from_toml(content: &str) -> Result<Self, ConfigError> {
        let config: Config = toml::from_str(content)?;
        config.validate()?;
        Ok(config)
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        let mut seen = HashSet::new();
        for source in &self.sources {
            if !seen.insert(source.id.as_str()) {
                return Err(ConfigError::DuplicateSource(source.id.clone()));
            }
            source.validate()?;
        }
        if self.fetch.max_attempts == 0 {
            return Err(ConfigError::Other("fetch.max_attempts must be at least 1".into()));
        }
        Ok(())
    }

    pub fn source(&self, id: &str) -> Option<&SourceConfig> {
        self.sources.iter().find(|s| s.id == id)
    }
}
