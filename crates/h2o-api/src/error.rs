// SPDX-License-Identifier: PolyForm-Noncommercial-1.0.0
// Copyright (c) 2025 Sylvex. All rights reserved.

//! Handler failures and their JSON rendering.
//!
//! ```text
//! {"error": {"code": "INVALID_VALUE", "message": "...", "details": {...}}}
//! ```

use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use axum::Json;
use h2o_core::RemoteError;
use serde::Serialize;
use serde_json::Value;
use thiserror::Error;

/// Result alias for handlers.
pub type ApiResult<T> = Result<T, ApiError>;

/// A failed request.
#[derive(Debug, Error)]
pub enum ApiError {
    /// The request body was understood but cannot be acted on (400).
    #[error("{message}")]
    BadRequest {
        /// Client-facing reason.
        message: String,
        /// Per-key reasons, when the request carried several entries.
        details: Option<Value>,
    },

    /// The server itself failed (500). The message is only logged.
    #[error("{message}")]
    Internal {
        /// Log-only description.
        message: String,
    },

    /// Rejected by the remote control handler; status follows the error kind.
    #[error(transparent)]
    Remote(#[from] RemoteError),
}

impl ApiError {
    /// A 400 with a reason.
    pub fn bad_request(message: impl Into<String>) -> Self {
        Self::BadRequest {
            message: message.into(),
            details: None,
        }
    }

    /// A 400 with a reason and per-key details.
    pub fn bad_request_with(message: impl Into<String>, details: Value) -> Self {
        Self::BadRequest {
            message: message.into(),
            details: Some(details),
        }
    }

    /// A 500.
    pub fn internal(message: impl Into<String>) -> Self {
        Self::Internal {
            message: message.into(),
        }
    }

    /// HTTP status for this failure.
    pub fn status_code(&self) -> StatusCode {
        match self {
            Self::BadRequest { .. } => StatusCode::BAD_REQUEST,
            Self::Internal { .. } => StatusCode::INTERNAL_SERVER_ERROR,
            Self::Remote(e) => {
                StatusCode::from_u16(e.status_code()).unwrap_or(StatusCode::INTERNAL_SERVER_ERROR)
            }
        }
    }

    /// Stable machine-readable code.
    pub fn error_code(&self) -> &'static str {
        match self {
            Self::BadRequest { .. } => "BAD_REQUEST",
            Self::Internal { .. } => "INTERNAL_ERROR",
            Self::Remote(RemoteError::UnknownMethod(_)) => "UNKNOWN_METHOD",
            Self::Remote(RemoteError::UnknownAttribute(_)) => "UNKNOWN_ATTRIBUTE",
            Self::Remote(RemoteError::InvalidValue { .. }) => "INVALID_VALUE",
            Self::Remote(RemoteError::Calibration(_)) => "CALIBRATION_ERROR",
        }
    }

    /// Returns `true` for 5xx failures.
    pub fn is_server_error(&self) -> bool {
        self.status_code().is_server_error()
    }
}

#[derive(Serialize)]
struct ErrorEnvelope<'a> {
    error: ErrorBody<'a>,
}

#[derive(Serialize)]
struct ErrorBody<'a> {
    code: &'a str,
    message: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    details: Option<&'a Value>,
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let status = self.status_code();
        let code = self.error_code();

        let message = if self.is_server_error() {
            tracing::error!(error = %self, code, %status, "Request failed");
            "internal server error".to_string()
        } else {
            tracing::debug!(error = %self, code, %status, "Request rejected");
            self.to_string()
        };

        let details = match &self {
            Self::BadRequest { details, .. } => details.as_ref(),
            _ => None,
        };
        let body = ErrorEnvelope {
            error: ErrorBody {
                code,
                message,
                details,
            },
        };
        (status, Json(body)).into_response()
    }
}
