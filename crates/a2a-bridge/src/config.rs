//! Bridge configuration.
//!
//! Loaded once at startup from a TOML file. Required keys are the DingTalk
//! robot credentials and the default A2A endpoint; everything else has a
//! default. Any error here is fatal.

use std::path::{Path, PathBuf};
use std::time::Duration;

use a2a_bridge_client::ClientOptions;
use serde::Deserialize;
use thiserror::Error;

/// Environment variable naming the config file.
pub const CONFIG_PATH_ENV: &str = "A2A_BRIDGE_CONFIG";

/// File looked up in the working directory when nothing else is given.
pub const DEFAULT_CONFIG_FILE: &str = "config.toml";

/// Configuration errors.
#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("no configuration file found (tried: {0})")]
    NotFound(String),

    #[error("failed to read config file '{path}': {source}")]
    Read {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("failed to parse config: {0}")]
    Parse(#[from] toml::de::Error),

    #[error("invalid config value for {key}: {reason}")]
    Invalid { key: &'static str, reason: String },
}

/// Top-level configuration.
#[derive(Debug, Clone, Deserialize)]
pub struct Config {
    pub dingtalk: DingTalkConfig,
    pub a2a: A2aConfig,
    #[serde(default)]
    pub client_pool: ClientPoolConfig,
    #[serde(default)]
    pub bridge: BridgeConfig,
    #[serde(default)]
    pub logging: LoggingConfig,
}

/// DingTalk robot credentials.
#[derive(Debug, Clone, Deserialize)]
pub struct DingTalkConfig {
    pub client_id: String,
    pub client_secret: String,
    pub robot_code: String,
    #[serde(default = "default_robot_name")]
    pub robot_name: String,
    #[serde(default = "default_api_base")]
    pub api_base: String,
}

/// Default A2A backend.
#[derive(Debug, Clone, Deserialize)]
pub struct A2aConfig {
    pub server_url: String,
    #[serde(default = "default_request_timeout_secs")]
    pub request_timeout_secs: u64,
    #[serde(default = "default_health_timeout_secs")]
    pub health_timeout_secs: u64,
}

/// Idle client reclamation.
#[derive(Debug, Clone, Deserialize)]
pub struct ClientPoolConfig {
    /// How often the sweeper runs (seconds).
    #[serde(default = "default_cleanup_interval_secs")]
    pub cleanup_interval_secs: u64,

    /// Idle time after which a tenant's client is closed (seconds).
    #[serde(default = "default_client_inactive_timeout_secs")]
    pub client_inactive_timeout_secs: u64,
}

/// Ingress, storage and outbound pacing.
#[derive(Debug, Clone, Deserialize)]
pub struct BridgeConfig {
    #[serde(default = "default_bind_addr")]
    pub bind_addr: String,

    #[serde(default = "default_database_path")]
    pub database_path: PathBuf,

    /// Text longer than this (chars) is split into labelled segments.
    #[serde(default = "default_max_message_length")]
    pub max_message_length: usize,

    /// Pause between consecutive outbound messages (ms).
    #[serde(default = "default_send_interval_ms")]
    pub send_interval_ms: u64,

    /// Upper bound on inbound messages processed at once.
    #[serde(default = "default_max_concurrent_dispatches")]
    pub max_concurrent_dispatches: usize,
}

/// Log output.
#[derive(Debug, Clone, Deserialize)]
pub struct LoggingConfig {
    /// Directory for daily-rotated log files. Console only when unset.
    #[serde(default)]
    pub dir: Option<PathBuf>,

    /// Rotated files kept before the oldest is deleted.
    #[serde(default = "default_max_log_files")]
    pub max_files: usize,

    /// Filter used when neither RUST_LOG nor the command line sets one.
    #[serde(default)]
    pub level: Option<String>,
}

fn default_robot_name() -> String {
    "A2A Assistant".to_string()
}

fn default_api_base() -> String {
    "https://api.dingtalk.com".to_string()
}

fn default_request_timeout_secs() -> u64 {
    120
}

fn default_health_timeout_secs() -> u64 {
    10
}

fn default_cleanup_interval_secs() -> u64 {
    3600
}

fn default_client_inactive_timeout_secs() -> u64 {
    4 * 3600
}

fn default_bind_addr() -> String {
    "0.0.0.0:8080".to_string()
}

fn default_database_path() -> PathBuf {
    PathBuf::from("user_config.db")
}

fn default_max_message_length() -> usize {
    2000
}

fn default_send_interval_ms() -> u64 {
    500
}

fn default_max_concurrent_dispatches() -> usize {
    64
}

fn default_max_log_files() -> usize {
    5
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            dir: None,
            max_files: default_max_log_files(),
            level: None,
        }
    }
}

impl Default for ClientPoolConfig {
    fn default() -> Self {
        Self {
            cleanup_interval_secs: default_cleanup_interval_secs(),
            client_inactive_timeout_secs: default_client_inactive_timeout_secs(),
        }
    }
}

impl Default for BridgeConfig {
    fn default() -> Self {
        Self {
            bind_addr: default_bind_addr(),
            database_path: default_database_path(),
            max_message_length: default_max_message_length(),
            send_interval_ms: default_send_interval_ms(),
            max_concurrent_dispatches: default_max_concurrent_dispatches(),
        }
    }
}

impl Config {
    /// Locate and load the config file.
    ///
    /// Lookup order: `explicit` path, `$A2A_BRIDGE_CONFIG`, `./config.toml`.
    pub fn discover(explicit: Option<&Path>) -> Result<Self, ConfigError> {
        let candidates: Vec<PathBuf> = explicit
            .map(Path::to_path_buf)
            .into_iter()
            .chain(std::env::var_os(CONFIG_PATH_ENV).map(PathBuf::from))
            .chain(std::iter::once(PathBuf::from(DEFAULT_CONFIG_FILE)))
            .collect();

        match candidates.iter().find(|p| p.is_file()) {
            Some(path) => Self::from_file(path),
            None => Err(ConfigError::NotFound(
                candidates
                    .iter()
                    .map(|p| p.display().to_string())
                    .collect::<Vec<_>>()
                    .join(", "),
            )),
        }
    }

    /// Load and validate a config file.
    pub fn from_file(path: &Path) -> Result<Self, ConfigError> {
        let raw = std::fs::read_to_string(path).map_err(|source| ConfigError::Read {
            path: path.to_path_buf(),
            source,
        })?;
        let config = Self::parse(&raw)?;
        tracing::info!(path = %path.display(), "Loaded configuration");
        Ok(config)
    }

    /// Parse and validate TOML text.
    pub fn parse(raw: &str) -> Result<Self, ConfigError> {
        let config: Self = toml::from_str(raw)?;
        config.validate()?;
        Ok(config)
    }

    /// Check values that deserialize fine but cannot run.
    pub fn validate(&self) -> Result<(), ConfigError> {
        let required = [
            ("dingtalk.client_id", &self.dingtalk.client_id),
            ("dingtalk.client_secret", &self.dingtalk.client_secret),
            ("dingtalk.robot_code", &self.dingtalk.robot_code),
            ("a2a.server_url", &self.a2a.server_url),
        ];
        for (key, value) in required {
            if value.trim().is_empty() {
                return Err(ConfigError::Invalid {
                    key,
                    reason: "must not be empty".to_string(),
                });
            }
        }

        if !is_http_url(&self.a2a.server_url) {
            return Err(ConfigError::Invalid {
                key: "a2a.server_url",
                reason: "must start with http:// or https://".to_string(),
            });
        }

        let positive = [
            ("a2a.request_timeout_secs", self.a2a.request_timeout_secs),
            ("a2a.health_timeout_secs", self.a2a.health_timeout_secs),
            ("client_pool.cleanup_interval_secs", self.client_pool.cleanup_interval_secs),
            (
                "client_pool.client_inactive_timeout_secs",
                self.client_pool.client_inactive_timeout_secs,
            ),
            ("bridge.max_message_length", self.bridge.max_message_length as u64),
            (
                "bridge.max_concurrent_dispatches",
                self.bridge.max_concurrent_dispatches as u64,
            ),
            ("logging.max_files", self.logging.max_files as u64),
        ];
        for (key, value) in positive {
            if value == 0 {
                return Err(ConfigError::Invalid {
                    key,
                    reason: "must be greater than zero".to_string(),
                });
            }
        }

        Ok(())
    }

    /// Override the default A2A endpoint (from the command line).
    pub fn set_server_url(&mut self, url: impl Into<String>) -> Result<(), ConfigError> {
        self.a2a.server_url = url.into();
        self.validate()
    }

    /// Timeouts for every backend client the pool creates.
    pub fn client_options(&self) -> ClientOptions {
        ClientOptions {
            request_timeout: Duration::from_secs(self.a2a.request_timeout_secs),
            health_timeout: Duration::from_secs(self.a2a.health_timeout_secs),
        }
    }

    pub fn cleanup_interval(&self) -> Duration {
        Duration::from_secs(self.client_pool.cleanup_interval_secs)
    }

    pub fn inactive_timeout(&self) -> Duration {
        Duration::from_secs(self.client_pool.client_inactive_timeout_secs)
    }

    pub fn send_interval(&self) -> Duration {
        Duration::from_millis(self.bridge.send_interval_ms)
    }
}

/// Returns true if `url` has an http or https scheme prefix.
pub fn is_http_url(url: &str) -> bool {
    url.starts_with("http://") || url.starts_with("https://")
}
