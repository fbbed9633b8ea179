// SPDX-License-Identifier: PolyForm-Noncommercial-1.0.0
// Copyright (c) 2025 Sylvex. All rights reserved.

//! Device registry with last-known-value fallback.
//!
//! The registry owns the serial line and one [`Device`] per bus address. A
//! read that fails validation (timeout, short response, CRC mismatch, decode)
//! is answered from the device's cache when a previous read of the same start
//! register succeeded; the result is then marked [`ReadSource::Cached`] so the
//! caller can still count it as a failure.

use std::collections::HashMap;
use std::fmt;
use std::time::Duration;

use crate::arbiter::Arbiter;
use crate::error::{TransportError, TransportResult};
use crate::frame::{decode_payload, validate_response, ReadRequest};
use crate::transport::SerialLine;
use crate::types::{RegisterFormat, SerialConfig, READ_HOLDING_REGISTERS};

// =============================================================================
// Device
// =============================================================================

/// A physical instrument on the bus.
#[derive(Debug, Clone, Default)]
pub struct Device {
    address: u8,
    cache: HashMap<u16, f64>,
}

impl Device {
    /// Creates a device with an empty cache.
    pub fn new(address: u8) -> Self {
        Self {
            address,
            cache: HashMap::new(),
        }
    }

    /// Returns the bus address.
    pub fn address(&self) -> u8 {
        self.address
    }

    /// Returns the last decoded value for `register`.
    pub fn cached(&self, register: u16) -> Option<f64> {
        self.cache.get(&register).copied()
    }
}

// =============================================================================
// RegisterRead
// =============================================================================

/// Where a returned value came from.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ReadSource {
    /// Decoded from the response to this transaction.
    Fresh,
    /// Transaction failed validation; value is the last good one.
    Cached,
}

/// A decoded register value.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct RegisterRead {
    /// Decoded value.
    pub value: f64,
    /// Where the value came from.
    pub source: ReadSource,
}

impl RegisterRead {
    /// Returns `true` if the value came from the cache.
    pub fn is_degraded(&self) -> bool {
        self.source == ReadSource::Cached
    }
}

// =============================================================================
// RegistryStats
// =============================================================================

/// Transaction counters.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct RegistryStats {
    /// Transactions attempted.
    pub transactions: u64,
    /// Transactions that failed validation.
    pub failures: u64,
    /// Failures answered from the cache.
    pub fallbacks: u64,
}

impl fmt::Display for RegistryStats {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{} transactions, {} failures, {} fallbacks",
            self.transactions, self.failures, self.fallbacks
        )
    }
}

// =============================================================================
// DeviceRegistry
// =============================================================================

/// Owns the serial line and all devices attached to it.
pub struct DeviceRegistry {
    line: Box<dyn SerialLine>,
    devices: HashMap<u8, Device>,
    timeout: Duration,
    read_budget: usize,
    stats: RegistryStats,
}

impl DeviceRegistry {
    /// Creates a registry over `line`.
    pub fn new(line: impl SerialLine + 'static, config: &SerialConfig) -> Self {
        Self {
            line: Box::new(line),
            devices: HashMap::new(),
            timeout: config.timeout,
            read_budget: config.read_budget,
            stats: RegistryStats::default(),
        }
    }

    /// Registers a device. Registering the same address twice is a no-op.
    pub fn add_device(&mut self, address: u8) -> &Device {
        self.devices
            .entry(address)
            .or_insert_with(|| Device::new(address))
    }

    /// Returns the device at `address`.
    pub fn device(&self, address: u8) -> Option<&Device> {
        self.devices.get(&address)
    }

    /// Returns the number of registered devices.
    pub fn device_count(&self) -> usize {
        self.devices.len()
    }

    /// Returns transaction counters.
    pub fn stats(&self) -> RegistryStats {
        self.stats
    }

    /// Runs one raw transaction and returns the validated payload.
    ///
    /// No fallback is applied here.
    pub async fn transact(
        &mut self,
        device: u8,
        function: u8,
        start: u16,
        count: u16,
    ) -> TransportResult<Vec<u8>> {
        if !self.devices.contains_key(&device) {
            return Err(TransportError::UnknownDevice(device));
        }

        self.stats.transactions += 1;
        let frame = ReadRequest::new(device, function, start, count).encode();
        self.line.write_frame(&frame).await?;

        let response = self
            .line
            .read_response(self.read_budget, self.timeout)
            .await?;
        if response.is_empty() {
            return Err(TransportError::Timeout {
                device,
                timeout: self.timeout,
            });
        }

        validate_response(device, &response).map(<[u8]>::to_vec)
    }

    /// Reads `format` starting at `start`, falling back to the cached value.
    pub async fn read(
        &mut self,
        device: u8,
        start: u16,
        format: RegisterFormat,
    ) -> TransportResult<RegisterRead> {
        let outcome = match self
            .transact(device, READ_HOLDING_REGISTERS, start, format.register_count())
            .await
        {
            Ok(payload) => decode_payload(&payload, format),
            Err(e) => Err(e),
        };

        match outcome {
            Ok(value) => {
                if let Some(dev) = self.devices.get_mut(&device) {
                    dev.cache.insert(start, value);
                }
                Ok(RegisterRead {
                    value,
                    source: ReadSource::Fresh,
                })
            }
            Err(e) if e.is_validation_failure() => {
                self.stats.failures += 1;
                e.log(self.line.name());
                match self.device(device).and_then(|d| d.cached(start)) {
                    Some(value) => {
                        self.stats.fallbacks += 1;
                        tracing::debug!(device, register = start, value, "Using last known value");
                        Ok(RegisterRead {
                            value,
                            source: ReadSource::Cached,
                        })
                    }
                    None => Err(TransportError::NoData {
                        device,
                        register: start,
                    }),
                }
            }
            Err(e) => Err(e),
        }
    }
}

impl fmt::Debug for DeviceRegistry {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("DeviceRegistry")
            .field("line", &self.line.name())
            .field("devices", &self.devices.len())
            .field("stats", &self.stats)
            .finish()
    }
}

// =============================================================================
// Bus
// =============================================================================

/// The shared RS-485 bus: a registry behind the arbiter.
pub type Bus = Arbiter<DeviceRegistry>;

impl Arbiter<DeviceRegistry> {
    /// Creates a bus over `line` with the debounce from `config`.
    pub fn open_with(line: impl SerialLine + 'static, config: &SerialConfig) -> Self {
        Arbiter::new(DeviceRegistry::new(line, config), config.debounce)
    }

    /// Acquires the bus and performs one register read.
    pub async fn read(
        &self,
        device: u8,
        start: u16,
        format: RegisterFormat,
    ) -> TransportResult<RegisterRead> {
        let mut registry = self.acquire().await;
        registry.read(device, start, format).await
    }
}
