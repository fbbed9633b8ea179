// SPDX-License-Identifier: PolyForm-Noncommercial-1.0.0
// Copyright (c) 2025 Sylvex. All rights reserved.

//! API handlers for all endpoints.
//!
//! - [`health`]: liveness
//! - [`rpc`]: remote method calls
//! - [`update_attributes`]: controller attribute updates
//! - [`telemetry`]: controller snapshot

mod attributes;
mod health;
mod rpc;
mod telemetry;

pub use attributes::*;
pub use health::*;
pub use rpc::*;
pub use telemetry::*;
