// SPDX-License-Identifier: PolyForm-Noncommercial-1.0.0
// Copyright (c) 2025 Sylvex. All rights reserved.

//! Stop signal shared by the controller tasks.
//!
//! The scheduler, the control loop, the state saver and the API server each
//! hold a receiver from [`StopSignal::subscribe`]. The signal fires once, on
//! the first of: SIGINT, SIGTERM, SIGQUIT, or a call to [`StopSignal::stop`].

use std::future::Future;
use std::sync::Arc;

use parking_lot::Mutex;
use tokio::sync::broadcast;
use tracing::{info, warn};

/// Why the controller is stopping.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StopReason {
    /// An OS signal arrived.
    Signal(&'static str),
    /// A task could not continue.
    TaskFailed(&'static str),
    /// Requested in-process.
    Requested,
}

/// One-shot stop broadcast. Clones share the same signal.
#[derive(Clone)]
pub struct StopSignal {
    sender: broadcast::Sender<()>,
    reason: Arc<Mutex<Option<StopReason>>>,
}

impl StopSignal {
    /// A signal that has not fired.
    pub fn new() -> Self {
        let (sender, _) = broadcast::channel(1);
        Self {
            sender,
            reason: Arc::new(Mutex::new(None)),
        }
    }

    /// A receiver that yields once when the signal fires.
    pub fn subscribe(&self) -> broadcast::Receiver<()> {
        self.sender.subscribe()
    }

    /// Resolves when the signal fires, or at once if it already has.
    ///
    /// Owns its state, so it can be handed to axum's graceful shutdown.
    pub fn fired(&self) -> impl Future<Output = ()> + Send + 'static {
        let mut receiver = self.sender.subscribe();
        let reason = self.reason.clone();
        async move {
            if reason.lock().is_some() {
                return;
            }
            let _ = receiver.recv().await;
        }
    }

    /// Fires the signal. Later calls keep the first reason and notify nobody.
    pub fn stop(&self, reason: StopReason) {
        {
            let mut current = self.reason.lock();
            if current.is_some() {
                return;
            }
            *current = Some(reason);
        }
        info!(?reason, "Stopping controller");
        let _ = self.sender.send(());
    }

    /// The reason the signal fired, if it has.
    pub fn reason(&self) -> Option<StopReason> {
        *self.reason.lock()
    }

    /// Blocks until an OS signal or [`stop`](Self::stop), then fires.
    pub async fn wait(&self) {
        if self.reason().is_some() {
            return;
        }
        tokio::select! {
            name = os_signal() => self.stop(StopReason::Signal(name)),
            _ = self.fired() => {}
        }
    }
}

impl Default for StopSignal {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(unix)]
async fn os_signal() -> &'static str {
    use tokio::signal::unix::{signal, SignalKind};

    match (
        signal(SignalKind::terminate()),
        signal(SignalKind::interrupt()),
        signal(SignalKind::quit()),
    ) {
        (Ok(mut term), Ok(mut int), Ok(mut quit)) => tokio::select! {
            _ = term.recv() => "SIGTERM",
            _ = int.recv() => "SIGINT",
            _ = quit.recv() => "SIGQUIT",
        },
        _ => {
            warn!("Signal handlers unavailable, listening for Ctrl+C only");
            ctrl_c().await
        }
    }
}

#[cfg(not(unix))]
async fn os_signal() -> &'static str {
    ctrl_c().await
}

async fn ctrl_c() -> &'static str {
    if let Err(e) = tokio::signal::ctrl_c().await {
        warn!(error = %e, "Ctrl+C listener failed");
        std::future::pending::<()>().await;
    }
    "Ctrl+C"
}
