//! Session configuration
//!
//! TOML-loadable configuration for connecting to an agent.

use marionette_common::error::{Error, Result};
use marionette_common::logging::LogConfig;
use serde::{Deserialize, Serialize};
use std::path::Path;

/// Configuration for one remote session
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SessionConfig {
    /// Agent host
    #[serde(default = "default_host")]
    pub agent_host: String,
    /// Agent TCP port
    #[serde(default = "default_agent_port")]
    pub agent_port: u16,
    /// Local port for the reverse callback channel (0 = ephemeral)
    #[serde(default)]
    pub callback_port: u16,
    /// Host address reported to the agent for reverse calls
    #[serde(default = "default_host")]
    pub callback_host: String,
    /// Socket read timeout in milliseconds
    #[serde(default = "default_timeout_ms")]
    pub read_timeout_ms: u64,
    /// Socket write timeout in milliseconds
    #[serde(default = "default_timeout_ms")]
    pub write_timeout_ms: u64,
    /// Poll interval for the reverse channel stop flag in milliseconds
    #[serde(default = "default_poll_interval_ms")]
    pub callback_poll_interval_ms: u64,
    /// Retry configuration for the initial connect
    #[serde(default)]
    pub retry: RetryConfig,
    /// Logging configuration
    #[serde(default)]
    pub logging: LogConfig,
}

/// Retry configuration for connecting to the agent
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RetryConfig {
    /// Maximum retry attempts after the first failure
    #[serde(default = "default_max_retries")]
    pub max_retries: u32,
    /// Initial backoff delay in milliseconds
    #[serde(default = "default_initial_backoff_ms")]
    pub initial_backoff_ms: u64,
    /// Maximum backoff delay in milliseconds
    #[serde(default = "default_max_backoff_ms")]
    pub max_backoff_ms: u64,
    /// Backoff multiplier
    #[serde(default = "default_backoff_multiplier")]
    pub backoff_multiplier: f64,
}

fn default_host() -> String {
    "127.0.0.1".to_string()
}

fn default_agent_port() -> u16 {
    13640
}

fn default_timeout_ms() -> u64 {
    30000
}

fn default_poll_interval_ms() -> u64 {
    100
}

fn default_max_retries() -> u32 {
    3
}

fn default_initial_backoff_ms() -> u64 {
    500
}

fn default_max_backoff_ms() -> u64 {
    10000
}

fn default_backoff_multiplier() -> f64 {
    2.0
}

impl Default for SessionConfig {
    fn default() -> Self {
        Self {
            agent_host: default_host(),
            agent_port: default_agent_port(),
            callback_port: 0,
            callback_host: default_host(),
            read_timeout_ms: default_timeout_ms(),
            write_timeout_ms: default_timeout_ms(),
            callback_poll_interval_ms: default_poll_interval_ms(),
            retry: RetryConfig::default(),
            logging: LogConfig::default(),
        }
    }
}

impl Default for RetryConfig {
    fn default() -> Self {
        Self {
            max_retries: default_max_retries(),
            initial_backoff_ms: default_initial_backoff_ms(),
            max_backoff_ms: default_max_backoff_ms(),
            backoff_multiplier: default_backoff_multiplier(),
        }
    }
}

impl SessionConfig {
    /// Config pointing at a specific agent port
    pub fn with_port(port: u16) -> Self {
        Self {
            agent_port: port,
            ..Default::default()
        }
    }

    /// Disable connect retries (fail on the first refused attempt)
    pub fn without_retries(mut self) -> Self {
        self.retry.max_retries = 0;
        self
    }

    /// Load configuration from a TOML file
    pub fn from_file(path: impl AsRef<Path>) -> Result<Self> {
        let content = std::fs::read_to_string(path.as_ref())
            .map_err(|e| Error::Config(format!("Failed to read config file: {}", e)))?;
        Self::from_toml(&content)
    }

    /// Parse configuration from a TOML string
    pub fn from_toml(content: &str) -> Result<Self> {
        toml::from_str(content).map_err(|e| Error::Config(format!("Failed to parse config: {}", e)))
    }

    /// Agent address in `host:port` form
    pub fn agent_addr(&self) -> String {
        format!("{}:{}", self.agent_host, self.agent_port)
    }
}
