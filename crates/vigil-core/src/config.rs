//! vigil.toml configuration parser.

use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::time::Duration;

use crate::duration::parse_duration;

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct VigilConfig {
    #[serde(default)]
    pub server: ServerConfig,
    #[serde(default)]
    pub monitor: MonitorConfig,
    /// Seed values for the preference source.
    #[serde(default)]
    pub preferences: HashMap<String, String>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ServerConfig {
    #[serde(default = "default_port")]
    pub port: u16,
    #[serde(default = "default_data_dir")]
    pub data_dir: PathBuf,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MonitorConfig {
    /// Upper bound for a single probe request (e.g. "5s").
    #[serde(default = "default_probe_timeout")]
    pub probe_timeout: String,
    /// Upper bound for a single store call (e.g. "3s").
    #[serde(default = "default_store_timeout")]
    pub store_timeout: String,
    /// Live-dashboard channel every broadcast is published on.
    #[serde(default = "default_channel")]
    pub channel: String,
}

fn default_port() -> u16 {
    4000
}

fn default_data_dir() -> PathBuf {
    PathBuf::from("./data")
}

fn default_probe_timeout() -> String {
    "5s".to_string()
}

fn default_store_timeout() -> String {
    "3s".to_string()
}

fn default_channel() -> String {
    "public-channel".to_string()
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            port: default_port(),
            data_dir: default_data_dir(),
        }
    }
}

impl Default for MonitorConfig {
    fn default() -> Self {
        Self {
            probe_timeout: default_probe_timeout(),
            store_timeout: default_store_timeout(),
            channel: default_channel(),
        }
    }
}

impl MonitorConfig {
    pub fn probe_timeout(&self) -> Duration {
        parse_duration(&self.probe_timeout).unwrap_or(Duration::from_secs(5))
    }

    pub fn store_timeout(&self) -> Duration {
        parse_duration(&self.store_timeout).unwrap_or(Duration::from_secs(3))
    }
}

impl VigilConfig {
    pub fn from_file(path: &Path) -> anyhow::Result<Self> {
        let content = std::fs::read_to_string(path)?;
        let config: VigilConfig = toml::from_str(&content)?;
        Ok(config)
    }

    /// Load the file if it exists, otherwise fall back to defaults.
    pub fn load_or_default(path: &Path) -> anyhow::Result<Self> {
        if path.exists() {
            Self::from_file(path)
        } else {
            tracing::debug!(?path, "config file not found, using defaults");
            Ok(Self::default())
        }
    }

    pub fn to_toml_string(&self) -> anyhow::Result<String> {
        Ok(toml::to_string_pretty(self)?)
    }

    /// Scaffold a vigil.toml with monitoring on and notifications off.
    pub fn scaffold() -> Self {
        let preferences = [
            ("monitoring_live", "1"),
            ("notify_via_email", "0"),
            ("notify_via_sms", "0"),
            ("notify_name", "Operator"),
            ("notify_email", "ops@example.com"),
        ]
        .into_iter()
        .map(|(k, v)| (k.to_string(), v.to_string()))
        .collect();

        VigilConfig {
            server: ServerConfig::default(),
            monitor: MonitorConfig::default(),
            preferences,
        }
    }
}
