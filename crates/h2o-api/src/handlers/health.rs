// SPDX-License-Identifier: PolyForm-Noncommercial-1.0.0
// Copyright (c) 2025 Sylvex. All rights reserved.

//! Health check handler.

use axum::{extract::State, Json};

use crate::response::HealthResponse;
use crate::state::AppState;

/// GET /health
///
/// Liveness check with the controller switches.
pub async fn health(State(state): State<AppState>) -> Json<HealthResponse> {
    let (power_enabled, auto_enabled) = {
        let control = state.remote().state().lock();
        (control.power_enabled, control.auto_enabled)
    };
    Json(HealthResponse {
        status: "ok".to_string(),
        version: crate::VERSION.to_string(),
        uptime_seconds: state.started.elapsed().as_secs(),
        power_enabled,
        auto_enabled,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::state::test_support::test_state;

    #[tokio::test]
    async fn test_health_endpoint() {
        let dir = tempfile::tempdir().unwrap();
        let Json(body) = health(State(test_state(dir.path()))).await;
        assert_eq!(body.status, "ok");
        assert!(!body.power_enabled);
    }
}
