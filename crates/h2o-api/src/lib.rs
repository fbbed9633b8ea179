// SPDX-License-Identifier: PolyForm-Noncommercial-1.0.0
// Copyright (c) 2025 Sylvex. All rights reserved.

//! # h2o-api
//!
//! HTTP remote-control server for the H2O controller.
//!
//! | route                     | method | purpose                         |
//! |---------------------------|--------|---------------------------------|
//! | `/health`                 | GET    | liveness and switch state       |
//! | `/api/v1/rpc`             | POST   | `{method, params}` remote call  |
//! | `/api/v1/attributes`      | POST   | attribute map update            |
//! | `/api/v1/telemetry`       | GET    | controller snapshot             |

#![warn(missing_docs)]
#![deny(unsafe_code)]

pub mod error;
pub mod handlers;
pub mod response;
pub mod server;
pub mod state;

pub use error::{ApiError, ApiResult};
pub use server::ApiServer;
pub use state::AppState;

/// Crate version
pub const VERSION: &str = env!("CARGO_PKG_VERSION");
