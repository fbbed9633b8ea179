// SPDX-License-Identifier: PolyForm-Noncommercial-1.0.0
// Copyright (c) 2025 Sylvex. All rights reserved.

//! Success bodies. Failures are rendered by [`crate::error::ApiError`].

use axum::response::{IntoResponse, Response};
use axum::Json;
use h2o_core::telemetry::timestamp_ms;
use serde::{Deserialize, Serialize};

/// `{"success": true, "data": ..., "timestamp": ms}`.
#[derive(Debug, Serialize, Deserialize)]
pub struct ApiResponse<T> {
    /// Always `true`; kept so clients can branch on one field.
    pub success: bool,
    /// Handler result.
    pub data: T,
    /// Server time in Unix milliseconds.
    pub timestamp: i64,
}

impl<T> ApiResponse<T> {
    /// Wraps `data`, stamped with the current time.
    pub fn success(data: T) -> Self {
        Self {
            success: true,
            data,
            timestamp: timestamp_ms(),
        }
    }
}

impl<T: Serialize> IntoResponse for ApiResponse<T> {
    fn into_response(self) -> Response {
        Json(self).into_response()
    }
}

/// Body of `GET /health`.
#[derive(Debug, Serialize, Deserialize)]
pub struct HealthResponse {
    /// `ok` while the process serves requests.
    pub status: String,
    /// Controller version.
    pub version: String,
    /// Seconds since the server state was created.
    pub uptime_seconds: u64,
    /// Plant power switch.
    pub power_enabled: bool,
    /// Closed-loop control armed.
    pub auto_enabled: bool,
}
