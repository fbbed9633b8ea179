// SPDX-License-Identifier: PolyForm-Noncommercial-1.0.0
// Copyright (c) 2025 Sylvex. All rights reserved.

//! # h2o-core
//!
//! Acquisition and process control for the H2O water treatment controller.
//!
//! This crate sits on top of `h2o-modbus` and provides:
//!
//! - **Sensors**: pH, turbidity, flow meter and radar level adapters
//! - **Scheduler**: paced polling with per-sensor backoff and suppression
//! - **Calibration**: two-point pH correction and the level-to-flow curve
//! - **Accumulators**: total flow and controller run time, both persisted
//! - **Controller**: pH hysteresis with trip timers driving three relays
//! - **Telemetry**: payload layouts and pluggable sinks
//! - **Remote**: operator methods and attribute updates
//!
//! ## Example
//!
//! ```rust,ignore
//! use std::sync::Arc;
//! use h2o_core::{LogSink, Scheduler, SchedulerSettings};
//!
//! let mut scheduler = Scheduler::new(bus, SchedulerSettings::default(), Arc::new(LogSink));
//! scheduler.add_sensor(config, adapter).await;
//! scheduler.run(shutdown.subscribe()).await;
//! ```

#![warn(missing_docs)]
#![warn(rustdoc::missing_crate_level_docs)]
#![deny(unsafe_code)]

// =============================================================================
// Foundation
// =============================================================================

pub mod error;
pub mod persist;

// =============================================================================
// Acquisition
// =============================================================================

pub mod backoff;
pub mod calibration;
pub mod flow;
pub mod scheduler;
pub mod sensor;

// =============================================================================
// Control
// =============================================================================

pub mod accumulator;
pub mod controller;
pub mod runtime;
pub mod state;

// =============================================================================
// Boundary
// =============================================================================

pub mod remote;
pub mod telemetry;

// =============================================================================
// Re-exports for convenience
// =============================================================================

pub use error::{
    CalibrationError, CoreError, CoreResult, PersistError, PersistResult, RemoteError,
    RemoteResult, SensorError, TelemetryError,
};

pub use accumulator::{run_periodic_save, TotalFlow};
pub use backoff::{Admission, BackoffPolicy, HealthState, RetrySchedule, SensorRuntime};
pub use calibration::{CalibrationStore, FlowCalibration, FlowCurve, PhCalibration, PhReference};
pub use controller::{tick, ControlLoop, LoggingRelayDriver, RelayDriver, TickOutcome, TripReason};
pub use flow::{derive_level, FlowRates, LevelReading, VesselGeometry};
pub use persist::JsonStore;
pub use remote::{AttributeReport, Method, RemoteControl};
pub use runtime::RuntimeAccumulator;
pub use scheduler::{PassReport, PollPacing, Scheduler, SchedulerSettings};
pub use sensor::{
    build_adapter, AdapterSettings, Measurement, Readings, SensorAdapter, SensorConfig,
    SensorKind, TransmissionFormat,
};
pub use state::{Attribute, AttributeKey, ControlSettings, ControlState, Relays};
pub use telemetry::{
    JsonLinesSink, LatestValues, LogSink, Payload, RetryPolicy, RetryingSink, TelemetrySink,
};

/// Crate version
pub const VERSION: &str = env!("CARGO_PKG_VERSION");
