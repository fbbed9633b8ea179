// SPDX-License-Identifier: PolyForm-Noncommercial-1.0.0
// Copyright (c) 2025 Sylvex. All rights reserved.

//! # h2o-modbus
//!
//! Modbus RTU acquisition layer for the H2O sensor bus.
//!
//! This crate covers the subset of Modbus the field instruments use:
//!
//! - **Framing**: function code 0x03 requests with CRC16/Modbus trailers
//! - **Decoding**: half-word swapped IEEE-754 floats and single 16-bit registers
//! - **Fallback**: last-known value per (device, register) on transient failure
//! - **Arbitration**: one transaction at a time with a post-transaction debounce
//!
//! ## Architecture
//!
//! ```text
//! ┌─────────────────────────────────────────────┐
//! │          Bus = Arbiter<DeviceRegistry>      │
//! │      (mutex + release timestamp, 500 ms)    │
//! └─────────────────────────────────────────────┘
//!                       │
//!                       ▼
//! ┌─────────────────────────────────────────────┐
//! │               DeviceRegistry                │
//! │   (devices, last-known-value cache, stats)  │
//! └─────────────────────────────────────────────┘
//!                       │
//!                       ▼
//! ┌─────────────────────────────────────────────┐
//! │           SerialLine (RtuLine)              │
//! │                (tokio-serial)               │
//! └─────────────────────────────────────────────┘
//! ```
//!
//! ## Quick Start
//!
//! ```rust,ignore
//! use h2o_modbus::{Bus, RegisterFormat, RtuLine, SerialConfig};
//!
//! let config = SerialConfig::new("/dev/ttyS0");
//! let bus = Bus::open_with(RtuLine::open(&config)?, &config);
//! bus.acquire().await.add_device(0x03);
//!
//! let ph = bus.read(0x03, 0x0001, RegisterFormat::Float32).await?;
//! println!("pH raw = {}", ph.value);
//! ```

#![warn(missing_docs)]
#![deny(unsafe_code)]

// =============================================================================
// Modules
// =============================================================================

pub mod arbiter;
pub mod error;
pub mod frame;
pub mod registry;
pub mod transport;
pub mod types;

#[cfg(any(test, feature = "test-util"))]
pub mod mock;

// =============================================================================
// Re-exports
// =============================================================================

pub use arbiter::{Arbiter, BusGuard};
pub use error::{ErrorCode, ErrorSeverity, TransportError, TransportResult};
pub use frame::{crc16, decode_payload, validate_response, ReadRequest};
pub use registry::{Bus, Device, DeviceRegistry, ReadSource, RegisterRead, RegistryStats};
pub use transport::{RtuLine, SerialLine};
pub use types::{Framing, Parity, RegisterFormat, SerialConfig, READ_HOLDING_REGISTERS};

/// Crate version.
pub const VERSION: &str = env!("CARGO_PKG_VERSION");

/// Crate name.
pub const NAME: &str = env!("CARGO_PKG_NAME");
