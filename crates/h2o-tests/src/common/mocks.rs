// SPDX-License-Identifier: PolyForm-Noncommercial-1.0.0
// Copyright (c) 2025 Sylvex. All rights reserved.

//! # Mock Implementations
//!
//! Recording doubles for the controller's outward seams.

use std::collections::BTreeMap;
use std::sync::atomic::{AtomicU32, Ordering};
use std::sync::Arc;

use async_trait::async_trait;
use parking_lot::Mutex;
use serde_json::Value;

use h2o_core::{Payload, RelayDriver, Relays, TelemetryError, TelemetrySink};

// =============================================================================
// RecordingSink
// =============================================================================

/// A telemetry sink that keeps every delivered payload.
#[derive(Debug, Default)]
pub struct RecordingSink {
    payloads: Mutex<Vec<Payload>>,
    failures_left: AtomicU32,
    attempts: AtomicU32,
}

impl RecordingSink {
    /// Creates an empty sink.
    pub fn new() -> Arc<Self> {
        Arc::new(Self::default())
    }

    /// Rejects the next `count` sends.
    pub fn fail_next(&self, count: u32) {
        self.failures_left.store(count, Ordering::SeqCst);
    }

    /// Every accepted payload, in order.
    pub fn payloads(&self) -> Vec<Payload> {
        self.payloads.lock().clone()
    }

    /// Number of send attempts, accepted or not.
    pub fn attempts(&self) -> u32 {
        self.attempts.load(Ordering::SeqCst)
    }

    /// Accepted flat payloads merged, later values winning.
    pub fn merged_flat(&self) -> BTreeMap<String, Value> {
        let mut merged = BTreeMap::new();
        for payload in self.payloads.lock().iter() {
            if let Payload::Flat(map) = payload {
                merged.extend(map.clone());
            }
        }
        merged
    }

    /// Accepted payloads that carry `key` at the top level.
    pub fn with_key(&self, key: &str) -> Vec<Payload> {
        self.payloads
            .lock()
            .iter()
            .filter(|p| p.keys().any(|k| k == key))
            .cloned()
            .collect()
    }

    /// Forgets everything recorded so far.
    pub fn clear(&self) {
        self.payloads.lock().clear();
    }
}

#[async_trait]
impl TelemetrySink for RecordingSink {
    fn name(&self) -> &str {
        "recording"
    }

    async fn send(&self, payload: &Payload) -> Result<(), TelemetryError> {
        self.attempts.fetch_add(1, Ordering::SeqCst);
        let rejected = self
            .failures_left
            .fetch_update(Ordering::SeqCst, Ordering::SeqCst, |n| n.checked_sub(1))
            .is_ok();
        if rejected {
            return Err(TelemetryError::send(self.name(), "scripted rejection"));
        }
        self.payloads.lock().push(payload.clone());
        Ok(())
    }
}

// =============================================================================
// RecordingRelays
// =============================================================================

/// A relay driver that records every output it is given.
#[derive(Debug, Clone, Default)]
pub struct RecordingRelays {
    history: Arc<Mutex<Vec<Relays>>>,
}

impl RecordingRelays {
    /// Creates the driver.
    pub fn new() -> Self {
        Self::default()
    }

    /// All applied outputs, in order.
    pub fn history(&self) -> Vec<Relays> {
        self.history.lock().clone()
    }

    /// The most recent output.
    pub fn last(&self) -> Option<Relays> {
        self.history.lock().last().copied()
    }
}

impl RelayDriver for RecordingRelays {
    fn apply(&mut self, relays: Relays) {
        self.history.lock().push(relays);
    }
}
