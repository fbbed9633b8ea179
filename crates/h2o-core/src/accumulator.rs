// SPDX-License-Identifier: PolyForm-Noncommercial-1.0.0
// Copyright (c) 2025 Sylvex. All rights reserved.

//! Time-integrated total flow.
//!
//! The accumulator integrates a flow rate (L/min) over wall-clock time between
//! successive updates. It is persisted on every update and periodically by
//! [`run_periodic_save`], so at most one save interval is lost on power cut.

use std::sync::Arc;
use std::time::Duration;

use parking_lot::Mutex;
use serde::{Deserialize, Serialize};
use tokio::sync::broadcast;
use tokio::time::Instant;

use crate::error::PersistResult;
use crate::persist::{JsonStore, TOTAL_FLOW_FILE};

#[derive(Debug, Default, Serialize, Deserialize)]
struct TotalFlowFile {
    total_flow: f64,
}

/// Accumulated flow in litres.
#[derive(Debug)]
pub struct TotalFlow {
    store: JsonStore,
    total_litres: f64,
    last_update: Option<Instant>,
}

impl TotalFlow {
    /// Loads the persisted total.
    pub fn load(store: JsonStore) -> Self {
        let file: TotalFlowFile = store.load_or_init(TOTAL_FLOW_FILE);
        let total_litres = if file.total_flow.is_finite() && file.total_flow >= 0.0 {
            file.total_flow
        } else {
            tracing::warn!(value = file.total_flow, "Discarding invalid persisted total flow");
            0.0
        };
        Self {
            store,
            total_litres,
            last_update: None,
        }
    }

    /// Current total in litres.
    pub fn total(&self) -> f64 {
        self.total_litres
    }

    /// Integrates `rate_l_min` since the previous update and persists.
    ///
    /// The first call only establishes the baseline.
    pub fn update(&mut self, rate_l_min: f64, now: Instant) {
        let rate = if rate_l_min.is_finite() { rate_l_min.max(0.0) } else { 0.0 };
        if let Some(last) = self.last_update {
            let minutes = now.saturating_duration_since(last).as_secs_f64() / 60.0;
            self.total_litres += rate * minutes;
        }
        self.last_update = Some(now);
        self.persist();
    }

    /// Sets the total to zero and persists.
    pub fn reset(&mut self) {
        tracing::info!(previous = self.total_litres, "Total flow reset");
        self.total_litres = 0.0;
        self.persist();
    }

    /// Writes the current total.
    pub fn save(&self) -> PersistResult<()> {
        self.store.save(
            TOTAL_FLOW_FILE,
            &TotalFlowFile {
                total_flow: self.total_litres,
            },
        )
    }

    fn persist(&self) {
        if let Err(e) = self.save() {
            tracing::warn!(error = %e, "Failed to persist total flow");
        }
    }
}

/// Saves `total` every `interval` until shutdown, then once more.
pub async fn run_periodic_save(
    total: Arc<Mutex<TotalFlow>>,
    interval: Duration,
    mut shutdown: broadcast::Receiver<()>,
) {
    let mut ticker = tokio::time::interval(interval);
    ticker.tick().await;
    loop {
        tokio::select! {
            _ = ticker.tick() => {
                if let Err(e) = total.lock().save() {
                    tracing::warn!(error = %e, "Periodic total flow save failed");
                }
            }
            _ = shutdown.recv() => break,
        }
    }
    if let Err(e) = total.lock().save() {
        tracing::warn!(error = %e, "Final total flow save failed");
    }
    tracing::debug!("Total flow saver stopped");
}
