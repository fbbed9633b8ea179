// SPDX-License-Identifier: PolyForm-Noncommercial-1.0.0
// Copyright (c) 2025 Sylvex. All rights reserved.

//! Command failures and process exit codes.
//!
//! | exit code | cause                                  |
//! |-----------|----------------------------------------|
//! | 1         | any other failure                      |
//! | 2         | configuration missing or invalid       |
//! | 3         | serial port could not be opened        |

use thiserror::Error;

/// Result alias for commands.
pub type BinResult<T> = Result<T, BinError>;

/// Why a command failed.
#[derive(Debug, Error)]
pub enum BinError {
    /// No usable configuration, or a setting the command cannot accept.
    #[error("configuration: {0}")]
    Configuration(String),

    /// Startup could not prepare the state directory or another resource.
    #[error("startup: {0}")]
    Initialization(String),

    /// A command failed after it started.
    #[error("{0}")]
    Runtime(String),

    /// File system or terminal I/O.
    #[error("I/O: {0}")]
    Io(#[from] std::io::Error),

    /// The RS-485 line.
    #[error("RS-485 bus: {0}")]
    Bus(#[from] h2o_modbus::TransportError),

    /// The configuration file.
    #[error(transparent)]
    Config(#[from] h2o_config::ConfigError),

    /// Rejected calibration input.
    #[error("calibration: {0}")]
    Calibration(#[from] h2o_core::CalibrationError),

    /// An error annotated with what was being attempted.
    #[error("{context}: {source}")]
    WithContext {
        /// What was being attempted.
        context: String,
        /// Underlying failure.
        #[source]
        source: Box<BinError>,
    },
}

impl BinError {
    /// A configuration failure.
    pub fn config(msg: impl Into<String>) -> Self {
        Self::Configuration(msg.into())
    }

    /// A startup failure.
    pub fn init(msg: impl Into<String>) -> Self {
        Self::Initialization(msg.into())
    }

    /// Wraps `self` with `context`.
    pub fn with_context(self, context: impl Into<String>) -> Self {
        Self::WithContext {
            context: context.into(),
            source: Box::new(self),
        }
    }

    /// Process exit code; context wrappers defer to the wrapped error.
    pub fn exit_code(&self) -> i32 {
        match self {
            Self::Configuration(_) | Self::Config(_) => 2,
            Self::Bus(h2o_modbus::TransportError::Open { .. }) => 3,
            Self::WithContext { source, .. } => source.exit_code(),
            _ => 1,
        }
    }
}

impl From<anyhow::Error> for BinError {
    fn from(err: anyhow::Error) -> Self {
        Self::Runtime(format!("{err:#}"))
    }
}

/// Prints `error` and its causes to stderr.
pub fn report_error(error: &BinError) {
    eprintln!("error: {error}");

    let mut source = std::error::Error::source(error);
    while let Some(cause) = source {
        eprintln!("  caused by: {cause}");
        source = cause.source();
    }
}

/// Prints `error` and exits with its code.
pub fn report_error_and_exit(error: BinError) -> ! {
    let code = error.exit_code();
    tracing::error!(error = %error, exit_code = code, "Exiting");
    report_error(&error);
    std::process::exit(code)
}

#[cfg(test)]
mod tests {
    use super::*;
    use anyhow::Context;

    #[test]
    fn test_error_with_context() {
        let err = BinError::config("no sensors").with_context("validate");
        assert_eq!(err.to_string(), "validate: configuration: no sensors");
    }

    #[test]
    fn test_exit_codes() {
        assert_eq!(BinError::config("test").exit_code(), 2);
        assert_eq!(
            BinError::Config(h2o_config::ConfigError::file_not_found("h2o.yaml")).exit_code(),
            2
        );
        let open = h2o_modbus::TransportError::Open {
            port: "/dev/ttyUSB0".into(),
            message: "No such file or directory".into(),
        };
        assert_eq!(BinError::from(open).with_context("startup").exit_code(), 3);
        assert_eq!(BinError::init("test").exit_code(), 1);
    }

    #[test]
    fn test_anyhow_chain_is_kept() {
        let err: anyhow::Result<()> = Err(std::io::Error::other("disk full")).context("render");
        let err = BinError::from(err.unwrap_err());
        assert_eq!(err.to_string(), "render: disk full");
        assert_eq!(err.exit_code(), 1);
    }
}
