// SPDX-License-Identifier: PolyForm-Noncommercial-1.0.0
// Copyright (c) 2025 Sylvex. All rights reserved.

//! Fixtures and recorders shared by the integration suites.

pub mod fixtures;
pub mod mocks;

pub use fixtures::*;
pub use mocks::*;

/// Routes controller logs to the test harness once per process.
///
/// `RUST_LOG` overrides the default of debug for the controller crates and
/// warn for everything else.
pub fn init_test_logging() {
    static LOGGING: std::sync::OnceLock<()> = std::sync::OnceLock::new();
    LOGGING.get_or_init(|| {
        let filter = tracing_subscriber::EnvFilter::try_from_default_env().unwrap_or_else(|_| {
            tracing_subscriber::EnvFilter::new("warn,h2o_core=debug,h2o_modbus=debug")
        });
        let _ = tracing_subscriber::fmt()
            .with_env_filter(filter)
            .with_test_writer()
            .try_init();
    });
}
