// SPDX-License-Identifier: PolyForm-Noncommercial-1.0.0
// Copyright (c) 2025 Sylvex. All rights reserved.

//! Error hierarchy for the acquisition and control core.
//!
//! # Error Hierarchy
//!
//! ```text
//! CoreError (root)
//! ├── TransportError   - framing/serial failures (h2o-modbus)
//! ├── SensorError      - a mandatory register could not be read
//! ├── CalibrationError - degenerate calibration input
//! ├── PersistError     - state file read/write failure
//! ├── TelemetryError   - sink rejected a payload
//! └── RemoteError      - bad remote method or attribute
//! ```
//!
//! None of these stop the process. Transport failures are absorbed by the
//! registry fallback, sensor failures by the scheduler's backoff, persistence
//! failures by keeping the in-memory value until the next successful write.

use std::path::PathBuf;

use h2o_modbus::TransportError;
use thiserror::Error;

// =============================================================================
// CoreError - Root Error Type
// =============================================================================

/// The root error type for the core.
#[derive(Debug, Error)]
pub enum CoreError {
    /// Transport failure that escaped the fallback.
    #[error("Transport error: {0}")]
    Transport(#[from] TransportError),

    /// Sensor read failure.
    #[error("Sensor error: {0}")]
    Sensor(#[from] SensorError),

    /// Calibration failure.
    #[error("Calibration error: {0}")]
    Calibration(#[from] CalibrationError),

    /// Persistence failure.
    #[error("Persistence error: {0}")]
    Persist(#[from] PersistError),

    /// Telemetry failure.
    #[error("Telemetry error: {0}")]
    Telemetry(#[from] TelemetryError),

    /// Remote control failure.
    #[error("Remote control error: {0}")]
    Remote(#[from] RemoteError),
}

impl CoreError {
    /// Returns the error type as a string for logging.
    pub fn error_type(&self) -> &'static str {
        match self {
            Self::Transport(_) => "transport",
            Self::Sensor(_) => "sensor",
            Self::Calibration(_) => "calibration",
            Self::Persist(_) => "persist",
            Self::Telemetry(_) => "telemetry",
            Self::Remote(_) => "remote",
        }
    }
}

/// Result alias for core operations.
pub type CoreResult<T> = Result<T, CoreError>;

// =============================================================================
// SensorError
// =============================================================================

/// A sensor adapter could not produce a reading.
#[derive(Debug, Error)]
pub enum SensorError {
    /// A mandatory register could not be read.
    #[error("sensor '{sensor_id}' failed to read {quantity} at {register:#06X}: {source}")]
    Register {
        /// Sensor id.
        sensor_id: String,
        /// What was being read.
        quantity: &'static str,
        /// Start register.
        register: u16,
        /// Underlying transport error.
        #[source]
        source: TransportError,
    },
}

impl SensorError {
    /// Creates a register read error.
    pub fn register(
        sensor_id: impl Into<String>,
        quantity: &'static str,
        register: u16,
        source: TransportError,
    ) -> Self {
        Self::Register {
            sensor_id: sensor_id.into(),
            quantity,
            register,
            source,
        }
    }

    /// Short description used in error telemetry.
    pub fn summary(&self) -> String {
        match self {
            Self::Register {
                quantity, source, ..
            } => format!("{quantity}: {source}"),
        }
    }
}

// =============================================================================
// CalibrationError
// =============================================================================

/// Calibration failures.
#[derive(Debug, Error)]
pub enum CalibrationError {
    /// The two measured reference points are identical.
    #[error("measured high and low references are equal ({0}); slope is undefined")]
    DivisionByZero(f64),

    /// A calibration input is not a finite number.
    #[error("calibration input '{0}' is not finite")]
    NonFinite(&'static str),

    /// The new calibration could not be persisted.
    #[error(transparent)]
    Persist(#[from] PersistError),
}

// =============================================================================
// PersistError
// =============================================================================

/// State file failures.
#[derive(Debug, Error)]
pub enum PersistError {
    /// Filesystem failure.
    #[error("I/O error on '{path}': {source}")]
    Io {
        /// File path.
        path: PathBuf,
        /// Underlying error.
        #[source]
        source: std::io::Error,
    },

    /// The value could not be encoded.
    #[error("failed to encode '{path}': {source}")]
    Serialize {
        /// File path.
        path: PathBuf,
        /// Underlying error.
        #[source]
        source: serde_json::Error,
    },

    /// The file content could not be decoded.
    #[error("corrupt state file '{path}': {source}")]
    Deserialize {
        /// File path.
        path: PathBuf,
        /// Underlying error.
        #[source]
        source: serde_json::Error,
    },
}

impl PersistError {
    /// Creates an I/O error.
    pub fn io(path: impl Into<PathBuf>, source: std::io::Error) -> Self {
        Self::Io {
            path: path.into(),
            source,
        }
    }

    /// Returns `true` if the file simply does not exist.
    pub fn is_not_found(&self) -> bool {
        matches!(self, Self::Io { source, .. } if source.kind() == std::io::ErrorKind::NotFound)
    }
}

/// Result alias for persistence.
pub type PersistResult<T> = Result<T, PersistError>;

// =============================================================================
// TelemetryError
// =============================================================================

/// Telemetry delivery failures.
#[derive(Debug, Error)]
pub enum TelemetryError {
    /// A single delivery attempt failed.
    #[error("telemetry sink '{sink}' rejected payload: {message}")]
    Send {
        /// Sink name.
        sink: String,
        /// Failure description.
        message: String,
    },

    /// All delivery attempts failed; the payload was dropped.
    #[error("telemetry dropped after {attempts} attempt(s): {last}")]
    Exhausted {
        /// Attempts made.
        attempts: u32,
        /// Last failure description.
        last: String,
    },
}

impl TelemetryError {
    /// Creates a send error.
    pub fn send(sink: impl Into<String>, message: impl Into<String>) -> Self {
        Self::Send {
            sink: sink.into(),
            message: message.into(),
        }
    }
}

// =============================================================================
// RemoteError
// =============================================================================

/// Remote method and attribute failures.
#[derive(Debug, Error)]
pub enum RemoteError {
    /// The method name is not recognized.
    #[error("unknown method '{0}'")]
    UnknownMethod(String),

    /// The attribute name is not recognized.
    #[error("unknown attribute '{0}'")]
    UnknownAttribute(String),

    /// The value has the wrong type or is out of range.
    #[error("invalid value for '{key}': expected {expected}")]
    InvalidValue {
        /// Attribute or parameter name.
        key: String,
        /// What was expected.
        expected: &'static str,
    },

    /// Calibration requested remotely failed.
    #[error(transparent)]
    Calibration(#[from] CalibrationError),
}

impl RemoteError {
    /// Creates an invalid value error.
    pub fn invalid(key: impl Into<String>, expected: &'static str) -> Self {
        Self::InvalidValue {
            key: key.into(),
            expected,
        }
    }

    /// Returns an HTTP-like status code for the API layer.
    pub fn status_code(&self) -> u16 {
        match self {
            Self::UnknownMethod(_) | Self::UnknownAttribute(_) => 404,
            Self::InvalidValue { .. } => 400,
            Self::Calibration(CalibrationError::Persist(_)) => 500,
            Self::Calibration(_) => 422,
        }
    }
}

/// Result alias for remote control.
pub type RemoteResult<T> = Result<T, RemoteError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_sensor_error_summary() {
        let err = SensorError::register(
            "ph_1",
            "ph_value",
            0x0001,
            TransportError::NoData {
                device: 3,
                register: 1,
            },
        );
        assert!(err.summary().starts_with("ph_value: no data"));
        let core: CoreError = err.into();
        assert_eq!(core.error_type(), "sensor");
    }

    #[test]
    fn test_remote_status_codes() {
        assert_eq!(RemoteError::UnknownMethod("x".into()).status_code(), 404);
        assert_eq!(RemoteError::invalid("targetPHValue", "number").status_code(), 400);
        assert_eq!(
            RemoteError::Calibration(CalibrationError::DivisionByZero(7.0)).status_code(),
            422
        );
    }

    #[test]
    fn test_persist_not_found() {
        let err = PersistError::io(
            "/tmp/x.json",
            std::io::Error::new(std::io::ErrorKind::NotFound, "missing"),
        );
        assert!(err.is_not_found());
    }
}
