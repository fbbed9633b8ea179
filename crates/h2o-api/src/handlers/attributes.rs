// SPDX-License-Identifier: PolyForm-Noncommercial-1.0.0
// Copyright (c) 2025 Sylvex. All rights reserved.

//! Attribute update handler.

use axum::{extract::State, Json};
use h2o_core::AttributeReport;
use serde_json::{Map, Value};

use crate::error::{ApiError, ApiResult};
use crate::response::ApiResponse;
use crate::state::AppState;

/// POST /api/v1/attributes
///
/// Applies every valid entry. Fails with 400 only if nothing was applied.
pub async fn update_attributes(
    State(state): State<AppState>,
    Json(attributes): Json<Map<String, Value>>,
) -> ApiResult<ApiResponse<AttributeReport>> {
    if attributes.is_empty() {
        return Err(ApiError::bad_request("no attributes given"));
    }

    let report = state.remote().apply_attributes(&attributes);
    if report.applied.is_empty() {
        let details = serde_json::to_value(&report.rejected).unwrap_or_default();
        return Err(ApiError::bad_request_with("no attribute was applied", details));
    }
    Ok(ApiResponse::success(report))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::state::test_support::test_state;
    use serde_json::json;

    fn body(value: Value) -> Json<Map<String, Value>> {
        Json(value.as_object().cloned().unwrap())
    }

    #[tokio::test]
    async fn test_partial_update() {
        let dir = tempfile::tempdir().unwrap();
        let state = test_state(dir.path());

        let response = update_attributes(
            State(state.clone()),
            body(json!({ "targetPHtolerrance": 0.3, "color": "blue" })),
        )
        .await
        .unwrap();

        let report = response.data;
        assert_eq!(report.applied, vec!["targetPHtolerrance".to_string()]);
        assert!(report.rejected.contains_key("color"));
        assert_eq!(state.remote().state().lock().tolerance, 0.3);
    }

    #[tokio::test]
    async fn test_all_rejected() {
        let dir = tempfile::tempdir().unwrap();
        let err = update_attributes(
            State(test_state(dir.path())),
            body(json!({ "powerButton": "maybe" })),
        )
        .await
        .unwrap_err();
        assert!(matches!(err, ApiError::BadRequest { details: Some(_), .. }));
    }
}
