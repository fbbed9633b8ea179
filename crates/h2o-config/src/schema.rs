// SPDX-License-Identifier: PolyForm-Noncommercial-1.0.0
// Copyright (c) 2025 Sylvex. All rights reserved.

//! Configuration schema definitions for H2O.
//!
//! # Schema Structure
//!
//! ```text
//! H2oConfig
//! ├── bus: SerialConfig
//! ├── sensors: Vec<SensorConfig>
//! ├── scheduler: SchedulerSettings
//! ├── adapters: AdapterSettings
//! ├── control: ControlSettings
//! ├── state: StateConfig
//! ├── telemetry: TelemetryConfig
//! ├── api: ApiConfig
//! └── logging: LoggingConfig
//! ```
//!
//! Sections other than `sensors` reuse the settings types of the crates that
//! consume them, so the file maps one-to-one onto the runtime.

use crate::error::{ConfigError, ConfigResult};
use h2o_core::{AdapterSettings, ControlSettings, RetryPolicy, SchedulerSettings, SensorConfig};
use h2o_modbus::SerialConfig;
use serde::{Deserialize, Serialize};
use std::collections::HashSet;
use std::net::SocketAddr;
use std::path::PathBuf;
use std::time::Duration;

// =============================================================================
// Constants
// =============================================================================

/// Default API bind address.
pub const DEFAULT_API_BIND: &str = "0.0.0.0:8080";

/// Default state directory.
pub const DEFAULT_STATE_DIR: &str = "./data";

// =============================================================================
// Top-Level Configuration
// =============================================================================

/// The root configuration structure for H2O.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct H2oConfig {
    /// RS-485 line.
    #[serde(default)]
    pub bus: SerialConfig,

    /// Instruments on the bus.
    #[serde(default)]
    pub sensors: Vec<SensorConfig>,

    /// Polling and backoff.
    #[serde(default)]
    pub scheduler: SchedulerSettings,

    /// Per-kind adapter tunables.
    #[serde(default)]
    pub adapters: AdapterSettings,

    /// Controller defaults.
    #[serde(default)]
    pub control: ControlSettings,

    /// Persistence.
    #[serde(default)]
    pub state: StateConfig,

    /// Telemetry delivery.
    #[serde(default)]
    pub telemetry: TelemetryConfig,

    /// Remote control server.
    #[serde(default)]
    pub api: ApiConfig,

    /// Logging.
    #[serde(default)]
    pub logging: LoggingConfig,
}

impl H2oConfig {
    /// Validates the entire configuration.
    ///
    /// Sensor ids must be unique. Unknown sensor types pass validation and
    /// are skipped at startup.
    pub fn validate(&self) -> ConfigResult<()> {
        self.bus
            .validate()
            .map_err(|e| ConfigError::validation("bus", e.to_string()))?;

        let mut ids = HashSet::new();
        for sensor in &self.sensors {
            if !ids.insert(sensor.id.as_str()) {
                return Err(ConfigError::validation(
                    "sensors",
                    format!("duplicate sensor id '{}'", sensor.id),
                ));
            }
            sensor
                .validate()
                .map_err(|message| ConfigError::validation("sensors", message))?;
        }

        self.scheduler
            .validate()
            .map_err(|message| ConfigError::validation("scheduler", message))?;
        self.adapters
            .validate()
            .map_err(|message| ConfigError::validation("adapters.turbidity", message))?;
        self.control
            .validate()
            .map_err(|message| ConfigError::validation("control", message))?;
        self.state.validate()?;
        self.telemetry.validate()?;
        Ok(())
    }

    /// Returns a sensor configuration by id.
    pub fn get_sensor(&self, id: &str) -> Option<&SensorConfig> {
        self.sensors.iter().find(|s| s.id == id)
    }
}

// =============================================================================
// State Configuration
// =============================================================================

/// Persistence settings.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct StateConfig {
    /// Directory holding the JSON state files.
    #[serde(default = "default_state_dir")]
    pub dir: PathBuf,

    /// Period of the total-flow flush.
    #[serde(default = "default_save_interval", with = "humantime_serde")]
    pub save_interval: Duration,
}

fn default_state_dir() -> PathBuf {
    PathBuf::from(DEFAULT_STATE_DIR)
}

fn default_save_interval() -> Duration {
    Duration::from_secs(60)
}

impl StateConfig {
    /// Validates the state configuration.
    pub fn validate(&self) -> ConfigResult<()> {
        if self.dir.as_os_str().is_empty() {
            return Err(ConfigError::validation("state.dir", "cannot be empty"));
        }
        if self.save_interval.is_zero() {
            return Err(ConfigError::validation("state.save_interval", "cannot be zero"));
        }
        Ok(())
    }
}

impl Default for StateConfig {
    fn default() -> Self {
        Self {
            dir: default_state_dir(),
            save_interval: default_save_interval(),
        }
    }
}

// =============================================================================
// Telemetry Configuration
// =============================================================================

/// Telemetry delivery settings.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct TelemetryConfig {
    /// Delivery retry.
    #[serde(default)]
    pub retry: RetryPolicy,

    /// Where payloads go.
    #[serde(default)]
    pub sink: SinkConfig,
}

impl TelemetryConfig {
    /// Validates the telemetry configuration.
    pub fn validate(&self) -> ConfigResult<()> {
        if self.retry.max_attempts == 0 {
            return Err(ConfigError::validation(
                "telemetry.retry.max_attempts",
                "must be at least 1",
            ));
        }
        if let SinkConfig::JsonLines { path } = &self.sink {
            if path.as_os_str().is_empty() {
                return Err(ConfigError::validation("telemetry.sink.path", "cannot be empty"));
            }
        }
        Ok(())
    }
}

/// Telemetry sink selection.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum SinkConfig {
    /// Emit payloads as log events.
    #[default]
    Log,
    /// Append newline-delimited JSON to a file.
    JsonLines {
        /// Output file.
        path: PathBuf,
    },
}

// =============================================================================
// API Configuration
// =============================================================================

/// Remote control server settings.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct ApiConfig {
    /// Whether the server is started.
    #[serde(default)]
    pub enabled: bool,

    /// Listen address.
    #[serde(default = "default_bind")]
    pub bind: SocketAddr,

    /// Per-request timeout.
    #[serde(default = "default_request_timeout", with = "humantime_serde")]
    pub request_timeout: Duration,
}

fn default_bind() -> SocketAddr {
    SocketAddr::from(([0, 0, 0, 0], 8080))
}

fn default_request_timeout() -> Duration {
    Duration::from_secs(30)
}

impl Default for ApiConfig {
    fn default() -> Self {
        Self {
            enabled: false,
            bind: default_bind(),
            request_timeout: default_request_timeout(),
        }
    }
}

// =============================================================================
// Logging Configuration
// =============================================================================

/// Logging settings.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct LoggingConfig {
    /// Log level.
    #[serde(default)]
    pub level: LogLevel,

    /// Output format.
    #[serde(default)]
    pub format: LogFormat,
}

/// Log level.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum LogLevel {
    /// Trace level.
    Trace,
    /// Debug level.
    Debug,
    /// Info level.
    #[default]
    Info,
    /// Warning level.
    Warn,
    /// Error level.
    Error,
}

impl LogLevel {
    /// Filter directive.
    pub fn as_str(&self) -> &'static str {
        match self {
            LogLevel::Trace => "trace",
            LogLevel::Debug => "debug",
            LogLevel::Info => "info",
            LogLevel::Warn => "warn",
            LogLevel::Error => "error",
        }
    }

    /// Parses a level name, case-insensitively.
    pub fn parse(s: &str) -> Option<Self> {
        match s.to_lowercase().as_str() {
            "trace" => Some(LogLevel::Trace),
            "debug" => Some(LogLevel::Debug),
            "info" => Some(LogLevel::Info),
            "warn" | "warning" => Some(LogLevel::Warn),
            "error" => Some(LogLevel::Error),
            _ => None,
        }
    }
}

/// Log format.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum LogFormat {
    /// Human-readable text.
    #[default]
    Text,
    /// Single-line compact text.
    Compact,
    /// JSON lines.
    Json,
}

#[cfg(test)]
mod tests {
    use super::*;
    use h2o_core::SensorKind;

    #[test]
    fn test_default_config_is_valid() {
        let config = H2oConfig::default();
        assert!(config.sensors.is_empty());
        assert!(!config.api.enabled);
        assert_eq!(config.state.save_interval, Duration::from_secs(60));
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_duplicate_sensor_id() {
        let config = H2oConfig {
            sensors: vec![
                SensorConfig::new("ph_1", SensorKind::Ph, 3),
                SensorConfig::new("ph_1", SensorKind::Ph, 4),
            ],
            ..Default::default()
        };
        let err = config.validate().unwrap_err();
        assert!(matches!(err, ConfigError::Validation { ref field, .. } if field == "sensors"));
    }

    #[test]
    fn test_unknown_type_passes_validation() {
        let mut sensor = SensorConfig::new("do_1", SensorKind::Ph, 9);
        sensor.sensor_type = "dissolved_oxygen".to_string();
        let config = H2oConfig {
            sensors: vec![sensor],
            ..Default::default()
        };
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_device_id_out_of_range() {
        let config = H2oConfig {
            sensors: vec![SensorConfig::new("ph_1", SensorKind::Ph, 0)],
            ..Default::default()
        };
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_inverted_turbidity_band_is_rejected() {
        let mut config = H2oConfig::default();
        config.adapters.turbidity.band_min = 5.0;
        config.adapters.turbidity.band_max = 1.0;
        let err = config.validate().unwrap_err();
        assert!(matches!(err, ConfigError::Validation { ref field, .. } if field == "adapters.turbidity"));
        assert_eq!(err.section(), Some("adapters"));
    }

    #[test]
    fn test_zero_retry_attempts() {
        let mut config = H2oConfig::default();
        config.telemetry.retry.max_attempts = 0;
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_log_level() {
        assert_eq!(LogLevel::parse("WARNING"), Some(LogLevel::Warn));
        assert_eq!(LogLevel::Debug.as_str(), "debug");
        assert_eq!(LogLevel::parse("loud"), None);
    }
}
