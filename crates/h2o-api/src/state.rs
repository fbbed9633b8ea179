// SPDX-License-Identifier: PolyForm-Noncommercial-1.0.0
// Copyright (c) 2025 Sylvex. All rights reserved.

//! Application state shared across handlers.

use std::time::Instant;

use h2o_core::RemoteControl;

/// Application state shared across all handlers.
#[derive(Clone)]
pub struct AppState {
    /// Operator command handler.
    pub remote: RemoteControl,
    /// Creation time, for uptime.
    pub started: Instant,
}

impl AppState {
    /// Creates the state.
    pub fn new(remote: RemoteControl) -> Self {
        Self {
            remote,
            started: Instant::now(),
        }
    }

    /// Returns the remote control handler.
    pub fn remote(&self) -> &RemoteControl {
        &self.remote
    }
}
