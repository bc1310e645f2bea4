//! Configuration management for the inverter monitor
//!
//! This module handles loading, validation, and management of the host
//! configuration from YAML files. Device-side settings (allowed charging
//! currents, rated voltages) are not configured here; the monitor reads them
//! from the inverter at startup.

use crate::error::{MonitorError, Result};
use serde::{Deserialize, Serialize};
use std::path::Path;
use std::time::Duration;

mod defaults;

/// Main configuration structure
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct Config {
    /// inverterd connection configuration
    pub inverterd: InverterdConfig,

    /// Poll loop and charging ramp configuration
    pub monitor: MonitorConfig,

    /// Logging configuration
    pub logging: LoggingConfig,
}

/// inverterd TCP connection parameters
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct InverterdConfig {
    /// Host running inverterd
    pub host: String,

    /// TCP port (inverterd listens on 8305 by default)
    pub port: u16,

    /// Connection timeout in milliseconds
    pub connect_timeout_ms: u64,

    /// Timeout for a single command round trip in milliseconds
    pub operation_timeout_ms: u64,
}

/// Poll loop and charging ramp parameters
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct MonitorConfig {
    /// Polling interval in milliseconds
    pub poll_interval_ms: u64,

    /// Lowest AC charging current of the ramp, in amperes. Must be one of the
    /// values the inverter reports as allowed.
    pub min_ac_current: u32,

    /// Highest AC charging current of the ramp, in amperes. Must be one of the
    /// values the inverter reports as allowed.
    pub max_ac_current: u32,
}

/// Logging configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct LoggingConfig {
    /// Log level (TRACE, DEBUG, INFO, WARN, ERROR)
    pub level: String,

    /// Optional override for console output level
    #[serde(skip_serializing_if = "Option::is_none")]
    pub console_level: Option<String>,

    /// Optional override for file output level
    #[serde(skip_serializing_if = "Option::is_none")]
    pub file_level: Option<String>,

    /// Path to log file (its directory receives the rotated files)
    pub file: String,

    /// Number of rotated files to keep
    pub backup_count: u32,

    /// Whether to log to console
    pub console_output: bool,

    /// Whether to use JSON format
    pub json_format: bool,
}

impl InverterdConfig {
    /// `host:port` string for connecting
    pub fn address(&self) -> String {
        format!("{}:{}", self.host, self.port)
    }

    pub fn connect_timeout(&self) -> Duration {
        Duration::from_millis(self.connect_timeout_ms)
    }

    pub fn operation_timeout(&self) -> Duration {
        Duration::from_millis(self.operation_timeout_ms)
    }
}

impl MonitorConfig {
    pub fn poll_interval(&self) -> Duration {
        Duration::from_millis(self.poll_interval_ms)
    }
}

impl Config {
    /// Load configuration from a YAML file
    pub fn from_file<P: AsRef<Path>>(path: P) -> Result<Self> {
        let contents = std::fs::read_to_string(path)?;
        let config: Config = serde_yaml::from_str(&contents)?;
        Ok(config)
    }

    /// Load configuration from the first default location that exists
    pub fn load() -> Result<Self> {
        let default_paths = [
            "inverter_monitor.yaml",
            "/etc/inverter-monitor/config.yaml",
        ];

        for path in &default_paths {
            if Path::new(path).exists() {
                return Self::from_file(path);
            }
        }

        // Fall back to default configuration
        Ok(Config::default())
    }

    /// Save configuration to a YAML file
    pub fn save_to_file<P: AsRef<Path>>(&self, path: P) -> Result<()> {
        let yaml = serde_yaml::to_string(self)?;
        std::fs::write(path, yaml)?;
        Ok(())
    }

    /// Validate the configuration
    pub fn validate(&self) -> Result<()> {
        if self.inverterd.host.is_empty() {
            return Err(MonitorError::validation(
                "inverterd.host",
                "Host cannot be empty",
            ));
        }

        if self.inverterd.port == 0 {
            return Err(MonitorError::validation(
                "inverterd.port",
                "Port must be greater than 0",
            ));
        }

        if self.inverterd.connect_timeout_ms == 0 || self.inverterd.operation_timeout_ms == 0 {
            return Err(MonitorError::validation(
                "inverterd.timeouts",
                "Timeouts must be greater than 0",
            ));
        }

        if self.monitor.poll_interval_ms == 0 {
            return Err(MonitorError::validation(
                "monitor.poll_interval_ms",
                "Must be greater than 0",
            ));
        }

        if self.monitor.min_ac_current == 0 {
            return Err(MonitorError::validation(
                "monitor.min_ac_current",
                "Must be positive",
            ));
        }

        if self.monitor.min_ac_current > self.monitor.max_ac_current {
            return Err(MonitorError::validation(
                "monitor.max_ac_current",
                "Must not be lower than min_ac_current",
            ));
        }

        Ok(())
    }
}
