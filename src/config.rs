use regex::Regex;
use serde::{Deserialize, Serialize};
use std::path::Path;
use std::sync::LazyLock;
use std::time::Duration;
use thiserror::Error;

static S3_LOCATION: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"^s3://[a-z0-9][a-z0-9.\-]{1,61}[a-z0-9](/.*)?$").expect("valid regex"));

static SQL_IDENTIFIER: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"^[A-Za-z_][A-Za-z0-9_]*(\.[A-Za-z_][A-Za-z0-9_]*)?$").expect("valid regex"));

#[derive(Error, Debug, PartialEq)]
pub enum ValidationError {
    #[error("athena.region must not be empty")]
    MissingRegion,
    #[error("athena.database must not be empty")]
    MissingDatabase,
    #[error("athena.output_location must be an s3:// URI, got '{0}'")]
    InvalidOutputLocation(String),
    #[error("queries.table must be a plain SQL identifier, got '{0}'")]
    InvalidTable(String),
    #[error("runner.poll_interval_ms must be greater than zero")]
    ZeroPollInterval,
    #[error("runner.page_size must be between 1 and 1000, got {0}")]
    InvalidPageSize(i32),
}

#[derive(Debug, Serialize, Deserialize, Clone)]
pub struct AthenaConfig {
    pub region: String,
    #[serde(default = "default_database")]
    pub database: String,
    pub output_location: String,
    pub workgroup: Option<String>,
}

#[derive(Debug, Serialize, Deserialize, Clone)]
pub struct RunnerConfig {
    #[serde(default = "default_poll_interval_ms")]
    pub poll_interval_ms: u64,
    /// Deadline for polling and fetching one execution. No deadline when unset.
    pub timeout_secs: Option<u64>,
    #[serde(default = "default_page_size")]
    pub page_size: i32,
    #[serde(default = "default_submit_retry_secs")]
    pub submit_retry_secs: u64,
}

impl Default for RunnerConfig {
    fn default() -> Self {
        Self {
            poll_interval_ms: default_poll_interval_ms(),
            timeout_secs: None,
            page_size: default_page_size(),
            submit_retry_secs: default_submit_retry_secs(),
        }
    }
}

impl RunnerConfig {
    pub fn poll_interval(&self) -> Duration {
        Duration::from_millis(self.poll_interval_ms)
    }

    pub fn timeout(&self) -> Option<Duration> {
        self.timeout_secs.map(Duration::from_secs)
    }

    pub fn submit_retry_window(&self) -> Duration {
        Duration::from_secs(self.submit_retry_secs)
    }
}

#[derive(Debug, Serialize, Deserialize, Clone)]
pub struct CacheConfig {
    #[serde(default = "default_ttl_secs")]
    pub ttl_secs: u64,
}

impl Default for CacheConfig {
    fn default() -> Self {
        Self {
            ttl_secs: default_ttl_secs(),
        }
    }
}

impl CacheConfig {
    pub fn ttl(&self) -> Duration {
        Duration::from_secs(self.ttl_secs)
    }
}

#[derive(Debug, Serialize, Deserialize, Clone)]
pub struct ServerConfig {
    #[serde(default = "default_listen_addr")]
    pub listen_addr: String,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            listen_addr: default_listen_addr(),
        }
    }
}

/// Parameters interpolated into the dashboard queries
#[derive(Debug, Serialize, Deserialize, Clone)]
pub struct QuerySettings {
    #[serde(default = "default_table")]
    pub table: String,
    #[serde(default = "default_window_hours")]
    pub window_hours: u32,
    #[serde(default = "default_ddos_window_minutes")]
    pub ddos_window_minutes: u32,
    #[serde(default = "default_threshold")]
    pub ddos_min_connections: u32,
    #[serde(default = "default_threshold")]
    pub port_scan_min_ports: u32,
    #[serde(default = "default_top_limit")]
    pub top_limit: u32,
    #[serde(default = "default_recent_limit")]
    pub recent_limit: u32,
}

impl Default for QuerySettings {
    fn default() -> Self {
        Self {
            table: default_table(),
            window_hours: default_window_hours(),
            ddos_window_minutes: default_ddos_window_minutes(),
            ddos_min_connections: default_threshold(),
            port_scan_min_ports: default_threshold(),
            top_limit: default_top_limit(),
            recent_limit: default_recent_limit(),
        }
    }
}

#[derive(Debug, Serialize, Deserialize, Clone)]
pub struct Config {
    pub athena: AthenaConfig,
    #[serde(default)]
    pub runner: RunnerConfig,
    #[serde(default)]
    pub cache: CacheConfig,
    #[serde(default)]
    pub server: ServerConfig,
    #[serde(default)]
    pub queries: QuerySettings,
}

fn default_database() -> String {
    "default".to_string()
}

fn default_poll_interval_ms() -> u64 {
    1000
}

fn default_page_size() -> i32 {
    1000
}

fn default_submit_retry_secs() -> u64 {
    30
}

fn default_ttl_secs() -> u64 {
    300
}

fn default_listen_addr() -> String {
    "0.0.0.0:8501".to_string()
}

fn default_table() -> String {
    "vpc_flow_logs".to_string()
}

fn default_window_hours() -> u32 {
    3
}

fn default_ddos_window_minutes() -> u32 {
    15
}

fn default_threshold() -> u32 {
    5
}

fn default_top_limit() -> u32 {
    10
}

fn default_recent_limit() -> u32 {
    50
}

impl Config {
    /// Load the file at `path`, then apply `FLOWDASH__SECTION__KEY`
    /// environment overrides.
    pub fn load(path: &Path) -> Result<Self, config::ConfigError> {
        let settings = config::Config::builder()
            .add_source(config::File::from(path))
            .add_source(
                config::Environment::with_prefix("FLOWDASH")
                    .separator("__")
                    .try_parsing(true),
            )
            .build()
            .map_err(|e| {
                config::ConfigError::NotFound(format!(
                    "Failed to load config file at '{}': {}",
                    path.display(),
                    e
                ))
            })?;

        settings.try_deserialize().map_err(|e| {
            config::ConfigError::Message(format!(
                "Failed to parse config file at '{}': {}",
                path.display(),
                e
            ))
        })
    }

    pub fn validate(&self) -> Result<(), ValidationError> {
        if self.athena.region.trim().is_empty() {
            return Err(ValidationError::MissingRegion);
        }
        if self.athena.database.trim().is_empty() {
            return Err(ValidationError::MissingDatabase);
        }
        if !S3_LOCATION.is_match(&self.athena.output_location) {
            return Err(ValidationError::InvalidOutputLocation(
                self.athena.output_location.clone(),
            ));
        }
        if !SQL_IDENTIFIER.is_match(&self.queries.table) {
            return Err(ValidationError::InvalidTable(self.queries.table.clone()));
        }
        if self.runner.poll_interval_ms == 0 {
            return Err(ValidationError::ZeroPollInterval);
        }
        if !(1..=1000).contains(&self.runner.page_size) {
            return Err(ValidationError::InvalidPageSize(self.runner.page_size));
        }
        Ok(())
    }
}
