// SPDX-License-Identifier: PolyForm-Noncommercial-1.0.0
// Copyright (c) 2025 Sylvex. All rights reserved.

//! # h2o-config
//!
//! Controller configuration: one section per runtime component, read from
//! YAML, TOML or JSON, with `H2O_*` overrides and `${VAR:fallback}`
//! placeholders.
//!
//! ```no_run
//! let config = h2o_config::load_config("/etc/h2o/h2o.yaml").unwrap();
//! println!("{} sensors on {}", config.sensors.len(), config.bus.port);
//! ```
//!
//! ```yaml
//! bus:
//!   port: "${H2O_SERIAL:/dev/ttyS0}"
//! ```

#![warn(missing_docs)]
#![deny(unsafe_code)]

pub mod error;
pub mod loader;
pub mod schema;

pub use error::{ConfigError, ConfigResult};
pub use loader::{load_config, load_config_str, ConfigFormat, ConfigLoader};
pub use schema::{
    ApiConfig, H2oConfig, LogFormat, LogLevel, LoggingConfig, SinkConfig, StateConfig,
    TelemetryConfig,
};

/// Crate version
pub const VERSION: &str = env!("CARGO_PKG_VERSION");
