// SPDX-License-Identifier: PolyForm-Noncommercial-1.0.0
// Copyright (c) 2025 Sylvex. All rights reserved.

//! # h2o-tests
//!
//! Cross-crate suites that drive the controller over a scripted RS-485 line
//! instead of a serial port.
//!
//! | suite                      | covers                                        |
//! |----------------------------|-----------------------------------------------|
//! | `integration_bus`          | framing, cached fallback, bus arbitration     |
//! | `integration_scheduler`    | polling, suppression, total flow, telemetry   |
//! | `integration_control`      | pH loop, remote control, HTTP API             |
//! | `integration_config`       | the shipped `config/h2o.yaml`                 |
//!
//! Fixtures live in [`common`]: sensor configs, calibrations, a temporary
//! plant, and recorders for telemetry and relay writes.

#![warn(missing_docs)]
#![deny(unsafe_code)]

pub mod common;
