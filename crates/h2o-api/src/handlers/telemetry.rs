// SPDX-License-Identifier: PolyForm-Noncommercial-1.0.0
// Copyright (c) 2025 Sylvex. All rights reserved.

//! Controller snapshot handler.

use std::collections::BTreeMap;

use axum::extract::State;
use serde_json::Value;

use crate::response::ApiResponse;
use crate::state::AppState;

/// GET /api/v1/telemetry
///
/// Returns the snapshot without pushing it to the telemetry sink.
pub async fn telemetry(State(state): State<AppState>) -> ApiResponse<BTreeMap<String, Value>> {
    ApiResponse::success(state.remote().snapshot())
}
