// SPDX-License-Identifier: PolyForm-Noncommercial-1.0.0
// Copyright (c) 2025 Sylvex. All rights reserved.

//! # h2o-bin
//!
//! The `h2o` controller daemon.
//!
//! ```text
//!                 main.rs
//!                    │
//!                 cli.rs ──► logging
//!                    │
//!                commands
//!        ┌─────────┼──────────┬──────────┐
//!       run    validate   calibrate   version
//!        │
//!     runtime ──► scheduler, control loop, saver, api
//!        │
//!     shutdown (StopSignal)
//! ```
//!
//! ## Usage
//!
//! ```bash
//! # Start the controller (default command)
//! h2o -c /etc/h2o/h2o.yaml
//!
//! # Validate configuration
//! h2o validate --strict
//!
//! # Store a pH calibration from two buffers
//! h2o calibrate --high-ref 10 --low-ref 4 --measured-high 9.8 --measured-low 4.1
//! ```

#![warn(missing_docs)]
#![deny(unsafe_code)]

pub mod cli;
pub mod commands;
pub mod error;
pub mod logging;
pub mod runtime;
pub mod shutdown;

pub use cli::{Cli, Commands};
pub use error::{BinError, BinResult};
pub use logging::init_logging;
pub use runtime::{ControllerRuntime, RuntimeBuilder};
pub use shutdown::{StopReason, StopSignal};

/// Crate version.
pub const VERSION: &str = env!("CARGO_PKG_VERSION");
