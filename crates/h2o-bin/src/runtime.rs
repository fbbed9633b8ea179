// SPDX-License-Identifier: PolyForm-Noncommercial-1.0.0
// Copyright (c) 2025 Sylvex. All rights reserved.

//! Controller runtime orchestration.
//!
//! Startup order:
//!
//! 1. Persisted state (calibration, totals, control snapshot)
//! 2. Telemetry sink
//! 3. RS-485 bus and sensor adapters
//! 4. Scheduler, control loop, total-flow saver
//! 5. Remote control server (optional)
//!
//! On shutdown every task is joined, the relays are released and the
//! snapshot, run time and total flow are written once more.

use std::path::Path;
use std::sync::Arc;
use std::time::Duration;

use parking_lot::Mutex;
use tokio::sync::watch;
use tokio::task::JoinHandle;
use tokio::time::Instant;
use tracing::{info, warn};

use h2o_api::{ApiServer, AppState};
use h2o_config::{load_config, H2oConfig, SinkConfig};
use h2o_core::{
    build_adapter, run_periodic_save, CalibrationStore, ControlLoop, ControlState, JsonLinesSink,
    JsonStore, LatestValues, LogSink, LoggingRelayDriver, Relays, RemoteControl, RetryingSink,
    RuntimeAccumulator, Scheduler, TelemetrySink, TotalFlow,
};
use h2o_modbus::{Bus, RtuLine, SerialLine};

use crate::error::{BinError, BinResult};
use crate::shutdown::{StopReason, StopSignal};

/// Upper bound on joining each task after shutdown.
const JOIN_TIMEOUT: Duration = Duration::from_secs(10);

// =============================================================================
// ControllerRuntime
// =============================================================================

/// The controller runtime that owns every long-running task.
pub struct ControllerRuntime {
    config: Arc<H2oConfig>,
    stop: StopSignal,
}

impl ControllerRuntime {
    /// Creates a new runtime.
    pub fn new(config: H2oConfig) -> Self {
        Self {
            config: Arc::new(config),
            stop: StopSignal::new(),
        }
    }

    /// Returns the configuration.
    pub fn config(&self) -> &H2oConfig {
        &self.config
    }

    /// Returns a handle that can stop the runtime.
    pub fn stop_handle(&self) -> StopSignal {
        self.stop.clone()
    }

    /// Opens the configured serial port and runs until shutdown.
    ///
    /// # Errors
    ///
    /// Fails with [`BinError::Bus`] when the port cannot be opened.
    pub async fn run(self) -> BinResult<()> {
        let line = RtuLine::open(&self.config.bus)
            .map_err(|e| BinError::from(e).with_context("Failed to open RS-485 bus"))?;
        self.run_with_line(line).await
    }

    /// Runs over an already opened line until shutdown.
    pub async fn run_with_line(self, line: impl SerialLine + 'static) -> BinResult<()> {
        info!("Starting H2O controller v{}", h2o_core::VERSION);

        let (components, scheduler, ph_rx) = self.initialize_components(line).await?;
        let sensors = scheduler.sensor_count();
        let tasks = self.spawn_tasks(&components, scheduler, ph_rx);

        info!(sensors, api = self.config.api.enabled, "H2O controller is ready");
        self.stop.wait().await;
        info!(reason = ?self.stop.reason(), "Joining controller tasks");

        for (name, handle) in tasks {
            match tokio::time::timeout(JOIN_TIMEOUT, handle).await {
                Ok(Ok(())) => {}
                Ok(Err(e)) => warn!(task = name, error = %e, "Task ended abnormally"),
                Err(_) => warn!(task = name, "Task did not stop in time"),
            }
        }

        components.flush();
        info!("H2O controller shutdown complete");
        Ok(())
    }

    /// Loads persisted state, opens the bus and registers the sensors.
    async fn initialize_components(
        &self,
        line: impl SerialLine + 'static,
    ) -> BinResult<(Components, Scheduler, watch::Receiver<Option<f64>>)> {
        let config = &self.config;

        std::fs::create_dir_all(&config.state.dir).map_err(|e| {
            BinError::init(format!(
                "Failed to create state directory {}: {}",
                config.state.dir.display(),
                e
            ))
        })?;
        let store = JsonStore::new(&config.state.dir);

        let calibration = Arc::new(CalibrationStore::load(store.clone()));
        let total_flow = Arc::new(Mutex::new(TotalFlow::load(store.clone())));
        let runtime = Arc::new(Mutex::new(RuntimeAccumulator::load(store.clone())));
        let state = Arc::new(Mutex::new(ControlState::load(&store, &config.control)));
        let latest = LatestValues::new();
        let sink = create_sink(config);

        let bus = Arc::new(Bus::open_with(line, &config.bus));
        let (ph_tx, ph_rx) = watch::channel(None);

        let mut scheduler = Scheduler::new(bus, config.scheduler.clone(), sink.clone())
            .with_latest(latest.clone())
            .with_total_flow(total_flow.clone())
            .with_ph_channel(ph_tx);

        for sensor in &config.sensors {
            if let Some(adapter) = build_adapter(sensor, &config.adapters, calibration.clone()) {
                scheduler.add_sensor(sensor.clone(), adapter).await;
            }
        }
        if scheduler.sensor_count() == 0 {
            warn!("No usable sensors configured");
        }

        let remote = RemoteControl::new(
            state.clone(),
            store.clone(),
            calibration,
            total_flow.clone(),
            runtime.clone(),
            latest,
            sink,
        );

        let components = Components {
            store,
            state,
            runtime,
            total_flow,
            remote,
        };
        Ok((components, scheduler, ph_rx))
    }

    /// Spawns the scheduler, control loop, saver and API server.
    fn spawn_tasks(
        &self,
        components: &Components,
        scheduler: Scheduler,
        ph_rx: watch::Receiver<Option<f64>>,
    ) -> Vec<(&'static str, JoinHandle<()>)> {
        let config = &self.config;
        let mut tasks = Vec::new();

        tasks.push(("scheduler", tokio::spawn(scheduler.run(self.stop.subscribe()))));

        let control = ControlLoop::new(
            components.state.clone(),
            components.runtime.clone(),
            ph_rx,
            LoggingRelayDriver::new(),
            components.store.clone(),
            config.control.tick,
        );
        tasks.push(("control", tokio::spawn(control.run(self.stop.subscribe()))));

        tasks.push((
            "total-flow-saver",
            tokio::spawn(run_periodic_save(
                components.total_flow.clone(),
                config.state.save_interval,
                self.stop.subscribe(),
            )),
        ));

        if config.api.enabled {
            let server = ApiServer::new(AppState::new(components.remote.clone()), config.api.clone());
            let fired = self.stop.fired();
            let stop = self.stop.clone();
            tasks.push((
                "api",
                tokio::spawn(async move {
                    if let Err(e) = server.run_with_shutdown(fired).await {
                        warn!(error = %e, "API server failed, stopping controller");
                        stop.stop(StopReason::TaskFailed("api"));
                    }
                }),
            ));
        } else {
            info!("Remote control server disabled");
        }

        tasks
    }
}

// =============================================================================
// Components
// =============================================================================

/// Shared objects that outlive the tasks.
struct Components {
    store: JsonStore,
    state: Arc<Mutex<ControlState>>,
    runtime: Arc<Mutex<RuntimeAccumulator>>,
    total_flow: Arc<Mutex<TotalFlow>>,
    remote: RemoteControl,
}

impl Components {
    /// Final writes after every task has stopped.
    fn flush(&self) {
        {
            let mut state = self.state.lock();
            state.relays = Relays::OFF;
            if let Err(e) = state.save(&self.store) {
                warn!(error = %e, "Failed to save control state on shutdown");
            }
        }
        self.runtime.lock().stop(Instant::now());
        if let Err(e) = self.total_flow.lock().save() {
            warn!(error = %e, "Failed to save total flow on shutdown");
        }
    }
}

/// Builds the configured sink behind the retry wrapper.
fn create_sink(config: &H2oConfig) -> Arc<dyn TelemetrySink> {
    let inner: Arc<dyn TelemetrySink> = match &config.telemetry.sink {
        SinkConfig::Log => Arc::new(LogSink),
        SinkConfig::JsonLines { path } => {
            info!(path = %path.display(), "Telemetry written as JSON lines");
            Arc::new(JsonLinesSink::new(path))
        }
    };
    Arc::new(RetryingSink::new(inner, config.telemetry.retry.clone()))
}

// =============================================================================
// RuntimeBuilder
// =============================================================================

/// Builder for constructing the controller runtime.
#[derive(Default)]
pub struct RuntimeBuilder {
    config_path: Option<std::path::PathBuf>,
    config: Option<H2oConfig>,
    force_api: bool,
}

impl RuntimeBuilder {
    /// Creates a new runtime builder.
    pub fn new() -> Self {
        Self::default()
    }

    /// Sets the configuration file path.
    pub fn config_path(mut self, path: impl AsRef<Path>) -> Self {
        self.config_path = Some(path.as_ref().to_path_buf());
        self
    }

    /// Sets the configuration directly.
    pub fn config(mut self, config: H2oConfig) -> Self {
        self.config = Some(config);
        self
    }

    /// Enables the remote control server regardless of the file.
    pub fn force_api(mut self, enabled: bool) -> Self {
        self.force_api = enabled;
        self
    }

    /// Builds the runtime.
    pub fn build(self) -> BinResult<ControllerRuntime> {
        let mut config = match self.config {
            Some(cfg) => cfg,
            None => {
                let path = self
                    .config_path
                    .ok_or_else(|| BinError::config("No configuration provided"))?;
                load_config(&path).map_err(|e| {
                    BinError::from(e).with_context(format!("Failed to load {}", path.display()))
                })?
            }
        };

        if self.force_api {
            config.api.enabled = true;
        }

        Ok(ControllerRuntime::new(config))
    }
}

// =============================================================================
// Tests
// =============================================================================
