// SPDX-License-Identifier: PolyForm-Noncommercial-1.0.0
// Copyright (c) 2025 Sylvex. All rights reserved.

//! Cumulative powered-on time of the process plant.

use serde::{Deserialize, Serialize};
use tokio::time::Instant;

use crate::persist::{JsonStore, RUN_TIME_FILE};

#[derive(Debug, Default, Serialize, Deserialize)]
struct RunTimeFile {
    total_seconds: f64,
}

/// Accumulates the time spent with power enabled.
#[derive(Debug)]
pub struct RuntimeAccumulator {
    store: JsonStore,
    total_seconds: f64,
    started: Option<Instant>,
}

impl RuntimeAccumulator {
    /// Loads the persisted runtime.
    pub fn load(store: JsonStore) -> Self {
        let file: RunTimeFile = store.load_or_init(RUN_TIME_FILE);
        Self {
            store,
            total_seconds: file.total_seconds.max(0.0),
            started: None,
        }
    }

    /// Starts a run segment. Calling it while running has no effect.
    pub fn start(&mut self, now: Instant) {
        if self.started.is_none() {
            self.started = Some(now);
            tracing::debug!("Runtime segment started");
        }
    }

    /// Ends the running segment, if any, and persists the total.
    pub fn stop(&mut self, now: Instant) {
        let Some(started) = self.started.take() else {
            return;
        };
        self.total_seconds += now.saturating_duration_since(started).as_secs_f64();
        let file = RunTimeFile {
            total_seconds: self.total_seconds,
        };
        if let Err(e) = self.store.save(RUN_TIME_FILE, &file) {
            tracing::warn!(error = %e, "Failed to persist runtime");
        }
    }

    /// Returns `true` while a segment is running.
    pub fn is_running(&self) -> bool {
        self.started.is_some()
    }

    /// Total seconds including the running segment.
    pub fn total_seconds(&self, now: Instant) -> f64 {
        let running = self
            .started
            .map_or(0.0, |s| now.saturating_duration_since(s).as_secs_f64());
        self.total_seconds + running
    }

    /// Total hours including the running segment.
    pub fn total_hours(&self, now: Instant) -> f64 {
        self.total_seconds(now) / 3600.0
    }
}
