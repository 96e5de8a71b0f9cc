//! Session configuration.
//!
//! Values come from, lowest precedence first: built-in defaults, an optional
//! `KEY=VALUE` file, and `IRISLINK_*` environment variables.
use std::path::Path;
use std::time::Duration;

use config::{Config, ConfigBuilder, Environment, File, FileFormat};
use serde::Deserialize;

use crate::serial::LinkSettings;

#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("Configuration error: {0}")]
    Load(#[from] config::ConfigError),
}

pub type Result<T> = std::result::Result<T, ConfigError>;

#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
#[serde(default)]
pub struct SessionConfig {
    /// Seconds to wait after a reconnect or reboot before talking to the device
    #[serde(alias = "SWITCH_MODE_REBOOT_TIME")]
    pub switch_mode_reboot_time: u64,
    /// Seconds to wait for a command's response
    #[serde(alias = "COMMAND_TIMEOUT")]
    pub command_timeout: u64,
    #[serde(alias = "READ_TIMEOUT_MS")]
    pub read_timeout_ms: u64,
    #[serde(alias = "WRITE_TIMEOUT_MS")]
    pub write_timeout_ms: u64,
    #[serde(alias = "BAUD_RATE")]
    pub baud_rate: u32,

    // Used by network scenarios only
    #[serde(alias = "WIFI_SSID")]
    pub wifi_ssid: Option<String>,
    #[serde(alias = "WIFI_BSSID")]
    pub wifi_bssid: Option<String>,
    #[serde(alias = "WIFI_PASS")]
    pub wifi_pass: Option<String>,
    #[serde(alias = "WIFI_CONNECTION_TIMEOUT")]
    pub wifi_connection_timeout: Option<u64>,
    #[serde(alias = "INVALID_WIFI_CONNECTION_TIMEOUT")]
    pub invalid_wifi_connection_timeout: Option<u64>,
}

impl Default for SessionConfig {
    fn default() -> Self {
        Self {
            switch_mode_reboot_time: 5,
            command_timeout: 15,
            read_timeout_ms: 1000,
            write_timeout_ms: 1000,
            baud_rate: crate::serial::interface::BAUD_RATE,
            wifi_ssid: None,
            wifi_bssid: None,
            wifi_pass: None,
            wifi_connection_timeout: None,
            invalid_wifi_connection_timeout: None,
        }
    }
}

impl SessionConfig {
    /// Load from the optional `path` and the environment
    pub fn load(path: Option<&Path>) -> Result<Self> {
        let mut builder = Config::builder();
        if let Some(path) = path {
            builder = builder.add_source(File::from(path).format(FileFormat::Ini).required(false));
        }
        builder = builder.add_source(Environment::with_prefix("IRISLINK").try_parsing(true));
        Self::build(builder)
    }

    /// Parse `KEY=VALUE` lines, ignoring the environment
    pub fn from_key_values(contents: &str) -> Result<Self> {
        let builder = Config::builder().add_source(File::from_str(contents, FileFormat::Ini));
        Self::build(builder)
    }

    fn build(builder: ConfigBuilder<config::builder::DefaultState>) -> Result<Self> {
        let settings = builder.build()?;
        let config: SessionConfig = settings.try_deserialize()?;
        log::debug!("Loaded session config: {:?}", config.redacted());
        Ok(config)
    }

    fn redacted(&self) -> Self {
        Self {
            wifi_pass: self.wifi_pass.as_ref().map(|_| "***".to_string()),
            ..self.clone()
        }
    }

    pub fn settle_duration(&self) -> Duration {
        Duration::from_secs(self.switch_mode_reboot_time)
    }

    pub fn command_timeout(&self) -> Duration {
        Duration::from_secs(self.command_timeout)
    }

    pub fn link_settings(&self) -> LinkSettings {
        LinkSettings {
            baud_rate: self.baud_rate,
            read_timeout: Duration::from_millis(self.read_timeout_ms),
            write_timeout: Duration::from_millis(self.write_timeout_ms),
        }
    }
}
