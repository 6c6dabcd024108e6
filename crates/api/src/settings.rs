//! Layered server configuration
//!
//! Sources, later ones winning:
//! 1. Built-in defaults
//! 2. Optional config file (`driver-monitor.toml`, or the path in `DRIVER_MONITOR_CONFIG`)
//! 3. Environment variables, e.g. `DMS_SERVER__ADDR=0.0.0.0:9000`

use alerting::DispatchConfig;
use cloud_sync::MqttSettings;
use config::{Config, ConfigError, Environment, File};
use dms::DmsConfig;
use monitor::SessionConfig;
use serde::{Deserialize, Serialize};

/// Environment variable naming the config file
pub const CONFIG_PATH_ENV: &str = "DRIVER_MONITOR_CONFIG";

const DEFAULT_CONFIG_FILE: &str = "driver-monitor";

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ServerSettings {
    pub addr: String,
}

impl Default for ServerSettings {
    fn default() -> Self {
        Self {
            addr: "0.0.0.0:8080".to_string(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct LoggingSettings {
    /// trace, debug, info, warn or error
    pub level: String,
    /// Emit JSON lines instead of human-readable output
    pub json: bool,
}

impl Default for LoggingSettings {
    fn default() -> Self {
        Self {
            level: "info".to_string(),
            json: false,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct StorageSettings {
    /// Alerts kept in memory before the oldest are evicted
    pub max_alerts: usize,
    /// Fleet backend base URL; session alerts go there instead of the local repository
    pub remote_url: Option<String>,
    /// Per-request timeout for the remote store (ms)
    pub remote_timeout_ms: u64,
}

impl Default for StorageSettings {
    fn default() -> Self {
        Self {
            max_alerts: 100_000,
            remote_url: None,
            remote_timeout_ms: 2_000,
        }
    }
}

/// Complete server configuration
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct Settings {
    pub server: ServerSettings,
    pub logging: LoggingSettings,
    pub dms: DmsConfig,
    pub dispatch: DispatchConfig,
    pub session: SessionConfig,
    pub storage: StorageSettings,
    /// Publish alerts over MQTT instead of in-process only
    pub mqtt: Option<MqttSettings>,
}

impl Settings {
    /// Load from the default file location and the environment
    pub fn load() -> Result<Self, ConfigError> {
        let path =
            std::env::var(CONFIG_PATH_ENV).unwrap_or_else(|_| DEFAULT_CONFIG_FILE.to_string());
        Self::load_from(&path)
    }

    /// Load from a config file path (extension optional) and the environment
    pub fn load_from(path: &str) -> Result<Self, ConfigError> {
        Config::builder()
            .add_source(File::with_name(path).required(false))
            .add_source(
                Environment::with_prefix("DMS")
                    .prefix_separator("_")
                    .separator("__"),
            )
            .build()?
            .try_deserialize()
    }
}
