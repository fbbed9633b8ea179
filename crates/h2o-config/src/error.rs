// SPDX-License-Identifier: PolyForm-Noncommercial-1.0.0
// Copyright (c) 2025 Sylvex. All rights reserved.

//! Errors raised while reading and checking the controller configuration.

use std::path::PathBuf;
use thiserror::Error;

/// Result alias for configuration loading.
pub type ConfigResult<T> = Result<T, ConfigError>;

/// Why a configuration could not be used.
#[derive(Debug, Error)]
pub enum ConfigError {
    /// The content is not valid for its format, or does not match the schema.
    #[error("{path}: {message}")]
    Parse {
        /// Source file, or `<string>` for in-memory content.
        path: PathBuf,
        /// Parser message.
        message: String,
    },

    /// A section parsed but holds an unusable value.
    #[error("invalid {field}: {message}")]
    Validation {
        /// Dotted section path, e.g. `state.dir`.
        field: String,
        /// What is wrong with it.
        message: String,
    },

    /// The file exists but could not be read.
    #[error("cannot read {path}: {source}")]
    Io {
        /// Source file.
        path: PathBuf,
        /// Underlying error.
        #[source]
        source: std::io::Error,
    },

    /// An `H2O_*` override could not be applied.
    #[error("{name}: {message}")]
    InvalidEnvVar {
        /// Variable name.
        name: String,
        /// Accepted values.
        message: String,
    },

    /// No file at the given path.
    #[error("configuration file {} does not exist", path.display())]
    FileNotFound {
        /// Requested path.
        path: PathBuf,
    },

    /// The file extension names no supported format.
    #[error("unsupported configuration format '{format}' (use yaml, toml or json)")]
    UnsupportedFormat {
        /// Offending extension.
        format: String,
    },
}

impl ConfigError {
    pub(crate) fn parse(path: impl Into<PathBuf>, message: impl Into<String>) -> Self {
        Self::Parse {
            path: path.into(),
            message: message.into(),
        }
    }

    pub(crate) fn validation(field: impl Into<String>, message: impl Into<String>) -> Self {
        Self::Validation {
            field: field.into(),
            message: message.into(),
        }
    }

    pub(crate) fn io(path: impl Into<PathBuf>, source: std::io::Error) -> Self {
        Self::Io {
            path: path.into(),
            source,
        }
    }

    pub(crate) fn invalid_env_var(name: impl Into<String>, message: impl Into<String>) -> Self {
        Self::InvalidEnvVar {
            name: name.into(),
            message: message.into(),
        }
    }

    /// A missing-file error for `path`.
    pub fn file_not_found(path: impl Into<PathBuf>) -> Self {
        Self::FileNotFound { path: path.into() }
    }

    pub(crate) fn unsupported_format(format: impl Into<String>) -> Self {
        Self::UnsupportedFormat {
            format: format.into(),
        }
    }

    /// The configuration section at fault, when one is known.
    pub fn section(&self) -> Option<&str> {
        match self {
            Self::Validation { field, .. } => field.split('.').next(),
            Self::InvalidEnvVar { name, .. } => Some(match name.rsplit('_').next() {
                Some("LEVEL") => "logging",
                Some("DIR") => "state",
                Some("PORT") => "bus",
                _ => "api",
            }),
            _ => None,
        }
    }
}
