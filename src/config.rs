//! Sniffer configuration: defaults, an optional `key = value` file and
//! `WIREFISH_*` environment overrides, in that order of precedence.

use std::path::{Path, PathBuf};
use std::time::Duration;

use crate::capture::CaptureSettings;
use crate::error::ConfigError;
use crate::session::DEFAULT_CHANNEL_CAPACITY;

const DEFAULT_CONFIG_PATH: &str = "/etc/wirefish.conf";
const DEFAULT_REPORT_INTERVAL: Duration = Duration::from_secs(30);
const DEFAULT_READ_TIMEOUT: Duration = Duration::from_millis(100);
const DEFAULT_LOG_FILTER: &str = "wirefish=info";

/// Environment variable → config file key.
const ENV_OVERRIDES: [(&str, &str); 7] = [
    ("WIREFISH_INTERFACE", "interface"),
    ("WIREFISH_REPORT_PATH", "report_path"),
    ("WIREFISH_REPORT_INTERVAL", "report_interval"),
    ("WIREFISH_CHANNEL_CAPACITY", "channel_capacity"),
    ("WIREFISH_READ_TIMEOUT_MS", "read_timeout_ms"),
    ("WIREFISH_PROMISCUOUS", "promiscuous"),
    ("WIREFISH_LOG", "log"),
];

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SnifferConfig {
    pub interface: Option<String>,
    pub report_path: Option<PathBuf>,
    pub report_interval: Duration,
    pub channel_capacity: usize,
    pub read_timeout: Duration,
    pub promiscuous: bool,
    pub log_filter: String,
}

impl Default for SnifferConfig {
    fn default() -> Self {
        Self {
            interface: None,
            report_path: None,
            report_interval: DEFAULT_REPORT_INTERVAL,
            channel_capacity: DEFAULT_CHANNEL_CAPACITY,
            read_timeout: DEFAULT_READ_TIMEOUT,
            promiscuous: true,
            log_filter: DEFAULT_LOG_FILTER.to_string(),
        }
    }
}

impl SnifferConfig {
    /// Load from the file named by `WIREFISH_CONFIG` (or the default path),
    /// then apply environment overrides.
    pub fn load() -> Result<Self, ConfigError> {
        let config_path = std::env::var("WIREFISH_CONFIG")
            .unwrap_or_else(|_| DEFAULT_CONFIG_PATH.to_string());
        Self::load_from(Path::new(&config_path))
    }

    /// A missing file is not an error; defaults apply.
    pub fn load_from(path: &Path) -> Result<Self, ConfigError> {
        let mut config = Self::default();

        if path.exists() {
            let content = std::fs::read_to_string(path).map_err(|source| ConfigError::Read {
                path: path.to_path_buf(),
                source,
            })?;
            for line in content.lines() {
                let line = line.trim();
                if line.is_empty() || line.starts_with('#') {
                    continue;
                }
                if let Some((key, value)) = line.split_once('=') {
                    config.set(key.trim(), value.trim())?;
                }
            }
        }

        for (var, key) in ENV_OVERRIDES {
            if let Ok(val) = std::env::var(var) {
                config.set(key, val.trim())?;
            }
        }

        Ok(config)
    }

    fn set(&mut self, key: &str, value: &str) -> Result<(), ConfigError> {
        let invalid = || ConfigError::InvalidValue {
            key: key.to_string(),
            value: value.to_string(),
        };

        match key {
            "interface" => {
                self.interface = (!value.is_empty()).then(|| value.to_string());
            }
            "report_path" => {
                self.report_path = (!value.is_empty()).then(|| PathBuf::from(value));
            }
            "report_interval" => {
                let secs: u64 = value.parse().map_err(|_| invalid())?;
                if secs == 0 {
                    return Err(invalid());
                }
                self.report_interval = Duration::from_secs(secs);
            }
            "channel_capacity" => {
                let capacity: usize = value.parse().map_err(|_| invalid())?;
                if capacity == 0 {
                    return Err(invalid());
                }
                self.channel_capacity = capacity;
            }
            "read_timeout_ms" => {
                let millis: u64 = value.parse().map_err(|_| invalid())?;
                self.read_timeout = Duration::from_millis(millis);
            }
            "promiscuous" => {
                self.promiscuous = match value.to_ascii_lowercase().as_str() {
                    "1" | "true" | "yes" | "on" => true,
                    "0" | "false" | "no" | "off" => false,
                    _ => return Err(invalid()),
                };
            }
            "log" => self.log_filter = value.to_string(),
            _ => tracing::debug!("Ignoring unknown config key: {}", key),
        }
        Ok(())
    }

    /// Filter directive for the tracing subscriber when `RUST_LOG` is unset.
    pub fn tracing_filter(&self) -> &str {
        &self.log_filter
    }

    pub fn capture_settings(&self) -> CaptureSettings {
        CaptureSettings {
            read_timeout: self.read_timeout,
            promiscuous: self.promiscuous,
            ..CaptureSettings::default()
        }
    }
}
