// SPDX-License-Identifier: PolyForm-Noncommercial-1.0.0
// Copyright (c) 2025 Sylvex. All rights reserved.

//! Routes, middleware and the listener for the remote control server.

use std::future::Future;
use std::net::SocketAddr;

use axum::routing::{get, post};
use axum::Router;
use h2o_config::ApiConfig;
use tower::ServiceBuilder;
use tower_http::{timeout::TimeoutLayer, trace::TraceLayer};
use tracing::info;

use crate::error::{ApiError, ApiResult};
use crate::handlers;
use crate::state::AppState;

/// Remote control over HTTP, in front of one [`AppState`].
pub struct ApiServer {
    state: AppState,
    config: ApiConfig,
}

impl ApiServer {
    /// Serves `state` with the bind address and timeout from `config`.
    pub fn new(state: AppState, config: ApiConfig) -> Self {
        Self { state, config }
    }

    /// All routes, traced, with each request bounded by `request_timeout`.
    pub fn router(&self) -> Router {
        let api = Router::new()
            .route("/rpc", post(handlers::rpc))
            .route("/attributes", post(handlers::update_attributes))
            .route("/telemetry", get(handlers::telemetry));

        Router::new()
            .route("/health", get(handlers::health))
            .nest("/api/v1", api)
            .layer(
                ServiceBuilder::new()
                    .layer(TraceLayer::new_for_http())
                    .layer(TimeoutLayer::new(self.config.request_timeout)),
            )
            .with_state(self.state.clone())
    }

    /// Listens on [`addr`](Self::addr) until `stop` resolves, then drains
    /// in-flight requests.
    ///
    /// # Errors
    ///
    /// [`ApiError::Internal`] when the address cannot be bound or the
    /// listener fails.
    pub async fn run_with_shutdown(
        self,
        stop: impl Future<Output = ()> + Send + 'static,
    ) -> ApiResult<()> {
        let addr = self.addr();
        let listener = tokio::net::TcpListener::bind(addr)
            .await
            .map_err(|e| ApiError::internal(format!("cannot bind {addr}: {e}")))?;
        info!(%addr, "Remote control server listening");

        let service = self.router().into_make_service_with_connect_info::<SocketAddr>();
        axum::serve(listener, service)
            .with_graceful_shutdown(stop)
            .await
            .map_err(|e| ApiError::internal(format!("listener on {addr} failed: {e}")))?;

        info!(%addr, "Remote control server stopped");
        Ok(())
    }

    /// Configured bind address.
    pub fn addr(&self) -> SocketAddr {
        self.config.bind
    }
}
