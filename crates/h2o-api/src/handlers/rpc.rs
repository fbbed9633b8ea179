// SPDX-License-Identifier: PolyForm-Noncommercial-1.0.0
// Copyright (c) 2025 Sylvex. All rights reserved.

//! Remote method call handler.

use axum::{extract::State, Json};
use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::error::ApiResult;
use crate::response::ApiResponse;
use crate::state::AppState;

/// Remote method call body.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RpcRequest {
    /// Method name, e.g. `setPower`.
    pub method: String,
    /// Method parameters.
    #[serde(default)]
    pub params: Value,
}

/// POST /api/v1/rpc
pub async fn rpc(
    State(state): State<AppState>,
    Json(request): Json<RpcRequest>,
) -> ApiResult<ApiResponse<Value>> {
    let result = state.remote().call(&request.method, &request.params).await?;
    Ok(ApiResponse::success(result))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::ApiError;
    use crate::state::test_support::test_state;
    use axum::http::StatusCode;
    use axum::response::IntoResponse;
    use serde_json::json;

    fn request(method: &str, params: Value) -> Json<RpcRequest> {
        Json(RpcRequest {
            method: method.to_string(),
            params,
        })
    }

    #[tokio::test]
    async fn test_set_power() {
        let dir = tempfile::tempdir().unwrap();
        let state = test_state(dir.path());

        let response = rpc(State(state.clone()), request("setPower", json!(true)))
            .await
            .unwrap();
        assert_eq!(response.data, json!({ "power_enabled": true }));
        assert!(state.remote().state().lock().power_enabled);
    }

    #[tokio::test]
    async fn test_unknown_method_is_404() {
        let dir = tempfile::tempdir().unwrap();
        let err = rpc(State(test_state(dir.path())), request("selfDestruct", Value::Null))
            .await
            .unwrap_err();
        assert!(matches!(err, ApiError::Remote(_)));
        assert_eq!(err.into_response().status(), StatusCode::NOT_FOUND);
    }
}
