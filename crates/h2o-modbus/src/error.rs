// SPDX-License-Identifier: PolyForm-Noncommercial-1.0.0
// Copyright (c) 2025 Sylvex. All rights reserved.

//! Transport error types for the RS-485 bus.
//!
//! # Error Categories
//!
//! ```text
//! TransportError
//! ├── Open           - serial device could not be opened (fatal at startup)
//! ├── Io             - write/read failure on an open line
//! ├── Timeout        - no response within the configured window
//! ├── ShortResponse  - fewer bytes than a CRC trailer
//! ├── CrcMismatch    - trailer does not match the frame body
//! ├── Decode         - payload too short for the requested format
//! ├── NoData         - validation failed and nothing is cached
//! ├── UnknownDevice  - address was never registered
//! └── Configuration  - invalid serial settings
//! ```
//!
//! Everything except `Open` and `Configuration` is recovered locally, either by
//! the last-known-value fallback in the registry or by the scheduler's backoff.

use std::fmt;
use std::io;
use std::time::Duration;

use thiserror::Error;
use tracing::Level;

// =============================================================================
// TransportError
// =============================================================================

/// Errors raised by the framing and serial transport layer.
#[derive(Debug, Error)]
pub enum TransportError {
    /// The serial device could not be opened.
    #[error("failed to open serial port '{port}': {message}")]
    Open {
        /// Port path.
        port: String,
        /// Underlying error message.
        message: String,
    },

    /// I/O failure while talking to an open line.
    #[error("serial I/O error: {0}")]
    Io(#[from] io::Error),

    /// No bytes arrived within the configured timeout.
    #[error("device {device} did not respond within {timeout:?}")]
    Timeout {
        /// Device address.
        device: u8,
        /// Timeout that elapsed.
        timeout: Duration,
    },

    /// The response was shorter than a CRC trailer.
    #[error("short response from device {device}: {len} byte(s)")]
    ShortResponse {
        /// Device address.
        device: u8,
        /// Received length.
        len: usize,
    },

    /// The CRC trailer does not match the frame body.
    #[error("CRC mismatch from device {device}: expected {expected:#06X}, got {actual:#06X}")]
    CrcMismatch {
        /// Device address.
        device: u8,
        /// CRC computed over the body.
        expected: u16,
        /// CRC carried in the trailer.
        actual: u16,
    },

    /// The payload could not be interpreted in the requested format.
    #[error("cannot decode {format} from {len} payload byte(s)")]
    Decode {
        /// Requested format name.
        format: &'static str,
        /// Payload length.
        len: usize,
    },

    /// Validation failed and there is no cached value to fall back on.
    #[error("no data for device {device} register {register:#06X}")]
    NoData {
        /// Device address.
        device: u8,
        /// Start register.
        register: u16,
    },

    /// The address was never registered with the bus.
    #[error("device {0} is not registered on the bus")]
    UnknownDevice(u8),

    /// Invalid serial settings.
    #[error("invalid serial configuration: {0}")]
    Configuration(String),
}

impl TransportError {
    /// Creates a configuration error.
    pub fn configuration(message: impl Into<String>) -> Self {
        Self::Configuration(message.into())
    }

    /// Returns `true` for failures that the last-known-value fallback covers.
    pub fn is_validation_failure(&self) -> bool {
        matches!(
            self,
            Self::Timeout { .. }
                | Self::ShortResponse { .. }
                | Self::CrcMismatch { .. }
                | Self::Decode { .. }
                | Self::Io(_)
        )
    }

    /// Returns the error severity.
    pub fn severity(&self) -> ErrorSeverity {
        match self {
            Self::Open { .. } | Self::Configuration(_) => ErrorSeverity::Critical,
            Self::UnknownDevice(_) => ErrorSeverity::Error,
            Self::NoData { .. } | Self::Io(_) => ErrorSeverity::Warning,
            Self::Timeout { .. }
            | Self::ShortResponse { .. }
            | Self::CrcMismatch { .. }
            | Self::Decode { .. } => ErrorSeverity::Info,
        }
    }

    /// Returns the error category for logging.
    pub fn category(&self) -> &'static str {
        match self {
            Self::Open { .. } | Self::Io(_) => "connection",
            Self::Timeout { .. } => "timeout",
            Self::ShortResponse { .. } | Self::CrcMismatch { .. } => "framing",
            Self::Decode { .. } => "decode",
            Self::NoData { .. } | Self::UnknownDevice(_) => "device",
            Self::Configuration(_) => "configuration",
        }
    }

    /// Returns the structured error code.
    pub fn error_code(&self) -> ErrorCode {
        match self {
            Self::Open { .. } => ErrorCode::new(1, 1),
            Self::Io(_) => ErrorCode::new(1, 2),
            Self::Timeout { .. } => ErrorCode::new(2, 1),
            Self::ShortResponse { .. } => ErrorCode::new(3, 1),
            Self::CrcMismatch { .. } => ErrorCode::new(3, 2),
            Self::Decode { .. } => ErrorCode::new(4, 1),
            Self::NoData { .. } => ErrorCode::new(5, 1),
            Self::UnknownDevice(_) => ErrorCode::new(5, 2),
            Self::Configuration(_) => ErrorCode::new(6, 1),
        }
    }

    /// Logs this error at its severity level.
    pub fn log(&self, context: &str) {
        let code = self.error_code();
        match self.severity().to_tracing_level() {
            Level::ERROR => tracing::error!(
                error_code = %code,
                category = self.category(),
                context = context,
                "{self}"
            ),
            Level::WARN => tracing::warn!(
                error_code = %code,
                category = self.category(),
                context = context,
                "{self}"
            ),
            _ => tracing::debug!(
                error_code = %code,
                category = self.category(),
                context = context,
                "{self}"
            ),
        }
    }
}

/// Result alias for transport operations.
pub type TransportResult<T> = Result<T, TransportError>;

// =============================================================================
// ErrorSeverity
// =============================================================================

/// Error severity levels.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub enum ErrorSeverity {
    /// Expected on a noisy bus; no action required.
    Info,
    /// Action may be required.
    Warning,
    /// Action required, but recoverable.
    Error,
    /// Process cannot continue.
    Critical,
}

impl ErrorSeverity {
    /// Converts to a tracing level.
    pub fn to_tracing_level(self) -> Level {
        match self {
            Self::Info => Level::DEBUG,
            Self::Warning => Level::WARN,
            Self::Error | Self::Critical => Level::ERROR,
        }
    }

    /// Returns the string representation.
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Info => "info",
            Self::Warning => "warning",
            Self::Error => "error",
            Self::Critical => "critical",
        }
    }
}

impl fmt::Display for ErrorSeverity {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

// =============================================================================
// ErrorCode
// =============================================================================

/// Structured error code for categorization.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct ErrorCode {
    /// Category (1=connection, 2=timeout, 3=framing, 4=decode, 5=device, 6=config).
    pub category: u8,
    /// Specific error within category.
    pub code: u8,
}

impl ErrorCode {
    /// Creates a new error code.
    pub const fn new(category: u8, code: u8) -> Self {
        Self { category, code }
    }
}

impl fmt::Display for ErrorCode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "RS-{:02X}{:02X}", self.category, self.code)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_error_code_display() {
        let err = TransportError::CrcMismatch {
            device: 3,
            expected: 0x1234,
            actual: 0x4321,
        };
        assert_eq!(err.error_code().to_string(), "RS-0302");
        assert_eq!(err.category(), "framing");
    }

    #[test]
    fn test_validation_failures_are_recoverable() {
        let err = TransportError::ShortResponse { device: 1, len: 1 };
        assert!(err.is_validation_failure());

        let err = TransportError::Open {
            port: "/dev/ttyS0".into(),
            message: "no such device".into(),
        };
        assert!(!err.is_validation_failure());
        assert_eq!(err.severity(), ErrorSeverity::Critical);
    }
}
