use std::env;
use std::fs;
use std::path::Path;

use serde::{Deserialize, Serialize};

use crate::error::{AguiError, Result};
use crate::runner::{DEFAULT_CHANNEL_CAPACITY, DEFAULT_USER_ID};

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct ServerConfig {
    #[serde(default = "default_host")]
    pub host: String,
    #[serde(default = "default_port")]
    pub port: u16,
    /// Route the AG-UI endpoint is mounted on.
    #[serde(default = "default_path")]
    pub path: String,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            host: default_host(),
            port: default_port(),
            path: default_path(),
        }
    }
}

impl ServerConfig {
    pub fn address(&self) -> String {
        format!("{}:{}", self.host, self.port)
    }
}

fn default_host() -> String {
    "0.0.0.0".into()
}

fn default_port() -> u16 {
    8080
}

fn default_path() -> String {
    "/".into()
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct RunnerConfig {
    #[serde(default = "default_user_id")]
    pub default_user_id: String,
    /// Wire events buffered between a run and its HTTP response.
    #[serde(default = "default_channel_capacity")]
    pub channel_capacity: usize,
}

impl Default for RunnerConfig {
    fn default() -> Self {
        Self {
            default_user_id: default_user_id(),
            channel_capacity: default_channel_capacity(),
        }
    }
}

fn default_user_id() -> String {
    DEFAULT_USER_ID.into()
}

fn default_channel_capacity() -> usize {
    DEFAULT_CHANNEL_CAPACITY
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct LoggingConfig {
    #[serde(default = "default_filter")]
    pub filter: String,
    #[serde(default)]
    pub json: bool,
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            filter: default_filter(),
            json: false,
        }
    }
}

fn default_filter() -> String {
    "info".into()
}

#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq)]
pub struct AppConfig {
    #[serde(default)]
    pub server: ServerConfig,
    #[serde(default)]
    pub runner: RunnerConfig,
    #[serde(default)]
    pub logging: LoggingConfig,
}

impl AppConfig {
    pub fn from_file(path: impl AsRef<Path>) -> Result<Self> {
        let raw = fs::read_to_string(path)?;
        let cfg: Self = toml::from_str(&raw)
            .map_err(|err| AguiError::Config(format!("Failed to parse configuration: {err}")))?;
        Ok(cfg)
    }

    pub fn from_env_or_file(path: impl AsRef<Path>) -> Result<Self> {
        let mut cfg = Self::from_file(path)?;
        cfg.apply_env();
        Ok(cfg)
    }

    /// Defaults overridden by the environment, for deployments without a
    /// configuration file.
    pub fn from_env() -> Self {
        let mut cfg = Self::default();
        cfg.apply_env();
        cfg
    }

    fn apply_env(&mut self) {
        if let Ok(host) = env::var("AGUI_HOST") {
            self.server.host = host;
        }
        if let Ok(port) = env::var("AGUI_PORT") {
            if let Ok(parsed) = port.parse::<u16>() {
                self.server.port = parsed;
            }
        }
        if let Ok(path) = env::var("AGUI_PATH") {
            self.server.path = path;
        }
        if let Ok(user) = env::var("AGUI_USER_ID") {
            self.runner.default_user_id = user;
        }
        if let Ok(capacity) = env::var("AGUI_CHANNEL_CAPACITY") {
            if let Ok(parsed) = capacity.parse::<usize>() {
                self.runner.channel_capacity = parsed.max(1);
            }
        }
        if let Ok(filter) = env::var("AGUI_LOG") {
            self.logging.filter = filter;
        }
        if let Ok(json) = env::var("AGUI_LOG_JSON") {
            if let Ok(parsed) = json.parse::<bool>() {
                self.logging.json = parsed;
            }
        }
    }
}
