//! Runtime settings shared by the server, client and launchers.
//!
//! Settings live in `{config_dir}/config.json`. Every field has a serde default,
//! so a partial (or missing) file is always usable.

use crate::ASP_SERVER_HOSTNAME;
use crate::error::config::ConfigError;

use common::ErrorLocation;

use std::net::IpAddr;
use std::panic::Location;
use std::path::{Path, PathBuf};
use std::time::Duration;

use log::{info, warn};
use serde::{Deserialize, Serialize};

const CONFIG_FILE_NAME: &str = "config.json";
const CONFIG_VERSION: u32 = 1;

// ============================================
// CONFIG STRUCTS
// ============================================

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct ServerSettings {
    #[serde(default = "default_host")]
    pub host: String,
    /// How long the dispatcher waits for a canceled engine call to return
    /// before abandoning its worker.
    #[serde(default = "default_cancel_grace_period_ms")]
    pub cancel_grace_period_ms: u64,
    /// Deadline for a connection to finish the handshake and send its request.
    #[serde(default = "default_request_read_timeout_ms")]
    pub request_read_timeout_ms: u64,
}

impl Default for ServerSettings {
    fn default() -> Self {
        Self {
            host: default_host(),
            cancel_grace_period_ms: default_cancel_grace_period_ms(),
            request_read_timeout_ms: default_request_read_timeout_ms(),
        }
    }
}

impl ServerSettings {
    pub fn cancel_grace_period(&self) -> Duration {
        Duration::from_millis(self.cancel_grace_period_ms)
    }

    pub fn request_read_timeout(&self) -> Duration {
        Duration::from_millis(self.request_read_timeout_ms)
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct ClientSettings {
    #[serde(default = "default_host")]
    pub host: String,
    #[serde(default = "default_connect_timeout_ms")]
    pub connect_timeout_ms: u64,
    #[serde(default = "default_ping_timeout_ms")]
    pub ping_timeout_ms: u64,
    #[serde(default = "default_monitor_poll_interval_ms")]
    pub monitor_poll_interval_ms: u64,
    #[serde(default = "default_cancel_ack_timeout_ms")]
    pub cancel_ack_timeout_ms: u64,
}

impl Default for ClientSettings {
    fn default() -> Self {
        Self {
            host: default_host(),
            connect_timeout_ms: default_connect_timeout_ms(),
            ping_timeout_ms: default_ping_timeout_ms(),
            monitor_poll_interval_ms: default_monitor_poll_interval_ms(),
            cancel_ack_timeout_ms: default_cancel_ack_timeout_ms(),
        }
    }
}

impl ClientSettings {
    pub fn connect_timeout(&self) -> Duration {
        Duration::from_millis(self.connect_timeout_ms)
    }

    pub fn ping_timeout(&self) -> Duration {
        Duration::from_millis(self.ping_timeout_ms)
    }

    pub fn monitor_poll_interval(&self) -> Duration {
        Duration::from_millis(self.monitor_poll_interval_ms)
    }

    pub fn cancel_ack_timeout(&self) -> Duration {
        Duration::from_millis(self.cancel_ack_timeout_ms)
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct LauncherSettings {
    #[serde(default = "default_startup_timeout_secs")]
    pub startup_timeout_secs: u64,
    #[serde(default = "default_stop_grace_period_ms")]
    pub stop_grace_period_ms: u64,
}

impl Default for LauncherSettings {
    fn default() -> Self {
        Self {
            startup_timeout_secs: default_startup_timeout_secs(),
            stop_grace_period_ms: default_stop_grace_period_ms(),
        }
    }
}

impl LauncherSettings {
    pub fn stop_grace_period(&self) -> Duration {
        Duration::from_millis(self.stop_grace_period_ms)
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct EngineSettings {
    #[serde(default = "default_html_command")]
    pub html_command: String,
    #[serde(default = "default_pdf_command")]
    pub pdf_command: String,
    /// Where artifacts are written. `None` writes next to the source file.
    pub output_dir: Option<PathBuf>,
    #[serde(default = "default_engine_poll_interval_ms")]
    pub poll_interval_ms: u64,
}

impl Default for EngineSettings {
    fn default() -> Self {
        Self {
            html_command: default_html_command(),
            pdf_command: default_pdf_command(),
            output_dir: None,
            poll_interval_ms: default_engine_poll_interval_ms(),
        }
    }
}

impl EngineSettings {
    pub fn poll_interval(&self) -> Duration {
        Duration::from_millis(self.poll_interval_ms)
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct AspConfig {
    #[serde(default = "default_version")]
    pub version: u32,

    #[serde(default)]
    pub server: ServerSettings,

    #[serde(default)]
    pub client: ClientSettings,

    #[serde(default)]
    pub launcher: LauncherSettings,

    #[serde(default)]
    pub engine: EngineSettings,
}

impl Default for AspConfig {
    fn default() -> Self {
        Self {
            version: CONFIG_VERSION,
            server: ServerSettings::default(),
            client: ClientSettings::default(),
            launcher: LauncherSettings::default(),
            engine: EngineSettings::default(),
        }
    }
}

// ============================================
// DEFAULT FUNCTIONS
// ============================================

fn default_version() -> u32 {
    CONFIG_VERSION
}
fn default_host() -> String {
    ASP_SERVER_HOSTNAME.to_string()
}
fn default_cancel_grace_period_ms() -> u64 {
    2_000
}
fn default_request_read_timeout_ms() -> u64 {
    10_000
}
fn default_connect_timeout_ms() -> u64 {
    3_000
}
fn default_ping_timeout_ms() -> u64 {
    3_000
}
fn default_monitor_poll_interval_ms() -> u64 {
    50
}
fn default_cancel_ack_timeout_ms() -> u64 {
    1_000
}
fn default_startup_timeout_secs() -> u64 {
    30
}
fn default_stop_grace_period_ms() -> u64 {
    5_000
}
fn default_html_command() -> String {
    "asciidoctor".to_string()
}
fn default_pdf_command() -> String {
    "asciidoctor-pdf".to_string()
}
fn default_engine_poll_interval_ms() -> u64 {
    50
}

// ============================================
// IMPLEMENTATION
// ============================================

impl AspConfig {
    /// Load config from {config_dir}/config.json.
    ///
    /// # Returns
    ///
    /// Returns `Ok(AspConfig)` if loaded successfully or defaults if file missing.
    /// Returns `Err(ConfigError)` if file exists but is corrupted/invalid.
    pub fn load(config_dir: &Path) -> Result<Self, ConfigError> {
        let config_path = config_dir.join(CONFIG_FILE_NAME);

        if !config_path.exists() {
            info!(
                "Config file not found at {}, using defaults",
                config_path.display()
            );
            return Ok(Self::default());
        }

        let contents = std::fs::read_to_string(&config_path).map_err(|e| {
            warn!("Failed to read config file: {}", e);
            ConfigError::ReadError {
                location: ErrorLocation::from(Location::caller()),
                path: config_path.clone(),
                source: e,
            }
        })?;

        let config: AspConfig = serde_json::from_str(&contents).map_err(|e| {
            warn!("Failed to parse config JSON: {}", e);
            ConfigError::ParseError {
                location: ErrorLocation::from(Location::caller()),
                path: config_path.clone(),
                reason: e.to_string(),
            }
        })?;

        config.validate()?;

        info!("Config loaded from {}", config_path.display());
        Ok(config)
    }

    /// Save config to {config_dir}/config.json using atomic write.
    ///
    /// # Errors
    ///
    /// Returns [`ConfigError`] if validation, directory creation, serialization,
    /// the temp-file write or the final rename fails.
    pub fn save(&self, config_dir: &Path) -> Result<(), ConfigError> {
        self.validate()?;

        std::fs::create_dir_all(config_dir).map_err(|e| ConfigError::WriteError {
            location: ErrorLocation::from(Location::caller()),
            path: config_dir.to_path_buf(),
            source: e,
        })?;

        let config_path = config_dir.join(CONFIG_FILE_NAME);
        let temp_path = config_dir.join(format!("{}.tmp", CONFIG_FILE_NAME));

        let json = serde_json::to_string_pretty(self).map_err(|e| ConfigError::SerializeError {
            location: ErrorLocation::from(Location::caller()),
            reason: e.to_string(),
        })?;

        std::fs::write(&temp_path, json).map_err(|e| ConfigError::WriteError {
            location: ErrorLocation::from(Location::caller()),
            path: temp_path.clone(),
            source: e,
        })?;

        std::fs::rename(&temp_path, &config_path).map_err(|e| ConfigError::WriteError {
            location: ErrorLocation::from(Location::caller()),
            path: config_path.clone(),
            source: e,
        })?;

        info!("Config saved to {}", config_path.display());
        Ok(())
    }

    /// Validate config values.
    ///
    /// # Errors
    ///
    /// Returns [`ConfigError::ValidationError`] if any value is invalid.
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.version == 0 || self.version > CONFIG_VERSION {
            return Err(ConfigError::validation(format!(
                "Invalid version: {} (expected 1-{})",
                self.version, CONFIG_VERSION
            )));
        }

        for (field, host) in [("server.host", &self.server.host), ("client.host", &self.client.host)] {
            if host.parse::<IpAddr>().is_err() {
                return Err(ConfigError::validation(format!(
                    "{field} must be an IP address, got '{host}'"
                )));
            }
        }

        let durations = [
            ("server.cancel_grace_period_ms", self.server.cancel_grace_period_ms),
            ("server.request_read_timeout_ms", self.server.request_read_timeout_ms),
            ("client.connect_timeout_ms", self.client.connect_timeout_ms),
            ("client.ping_timeout_ms", self.client.ping_timeout_ms),
            ("client.monitor_poll_interval_ms", self.client.monitor_poll_interval_ms),
            ("client.cancel_ack_timeout_ms", self.client.cancel_ack_timeout_ms),
            ("launcher.startup_timeout_secs", self.launcher.startup_timeout_secs),
            ("launcher.stop_grace_period_ms", self.launcher.stop_grace_period_ms),
            ("engine.poll_interval_ms", self.engine.poll_interval_ms),
        ];

        if let Some((field, _)) = durations.iter().find(|(_, value)| *value == 0) {
            return Err(ConfigError::validation(format!("{field} must be greater than zero")));
        }

        if self.engine.html_command.trim().is_empty() || self.engine.pdf_command.trim().is_empty() {
            return Err(ConfigError::validation("engine commands cannot be empty"));
        }

        Ok(())
    }
}
