// SPDX-License-Identifier: PolyForm-Noncommercial-1.0.0
// Copyright (c) 2025 Sylvex. All rights reserved.

//! # Test Fixtures
//!
//! Sensor configurations and a self-contained plant in a temporary
//! directory, wired the same way the daemon wires it.

use std::sync::Arc;
use std::time::Duration;

use parking_lot::Mutex;
use tokio::sync::watch;

use h2o_core::{
    build_adapter, AdapterSettings, CalibrationStore, ControlSettings, ControlState,
    FlowCalibration, FlowCurve, JsonStore, LatestValues, PhCalibration, PollPacing,
    RemoteControl, RuntimeAccumulator, Scheduler, SchedulerSettings, SensorConfig, SensorKind,
    TelemetrySink, TotalFlow,
};
use h2o_modbus::mock::ScriptedLine;
use h2o_modbus::{Bus, SerialConfig};

use super::mocks::RecordingSink;

// =============================================================================
// Sensor Fixtures
// =============================================================================

/// Standard sensor configurations.
pub struct SensorFixtures;

impl SensorFixtures {
    /// pH probe polled every second.
    pub fn ph(device: u8) -> SensorConfig {
        Self::every_second(SensorConfig::new(format!("ph_{device}"), SensorKind::Ph, device))
    }

    /// Turbidity probe polled every second.
    pub fn turbidity(device: u8) -> SensorConfig {
        Self::every_second(SensorConfig::new(
            format!("turbidity_{device}"),
            SensorKind::Turbidity,
            device,
        ))
    }

    /// Radar level gauge polled every second.
    pub fn radar(device: u8) -> SensorConfig {
        Self::every_second(SensorConfig::new(format!("radar_{device}"), SensorKind::Radar, device))
    }

    fn every_second(mut config: SensorConfig) -> SensorConfig {
        config.poll_interval = Duration::from_secs(1);
        config
    }
}

// =============================================================================
// Settings Fixtures
// =============================================================================

/// Line settings with short waits.
pub fn fast_serial() -> SerialConfig {
    SerialConfig::new("/dev/null").with_timing(Duration::from_millis(100), Duration::from_millis(10))
}

/// Scheduler settings without pacing delays.
pub fn fast_scheduler() -> SchedulerSettings {
    SchedulerSettings {
        tick: Duration::from_secs(1),
        pacing: PollPacing {
            normal: Duration::ZERO,
            long_cable: Duration::ZERO,
            settle: Duration::ZERO,
        },
        ..SchedulerSettings::default()
    }
}

/// A calibration of `1.0 * raw + offset`.
pub fn ph_offset(offset: f64) -> PhCalibration {
    PhCalibration::linear(1.0, offset)
}

/// A constant flow curve of `l_s` litres per second above zero level.
pub fn constant_flow(l_s: f64) -> FlowCalibration {
    FlowCalibration {
        zero_reference: 250.0,
        curve: FlowCurve {
            coefficients: vec![l_s],
        },
    }
}

// =============================================================================
// Plant
// =============================================================================

/// Shared controller objects over a scripted line in a temporary directory.
pub struct Plant {
    /// Holds the state directory alive.
    pub dir: tempfile::TempDir,
    /// State files.
    pub store: JsonStore,
    /// Scripted RS-485 line.
    pub line: ScriptedLine,
    /// Shared bus over `line`.
    pub bus: Arc<Bus>,
    /// Calibration values.
    pub calibration: Arc<CalibrationStore>,
    /// Total flow accumulator.
    pub total_flow: Arc<Mutex<TotalFlow>>,
    /// Run-time accumulator.
    pub runtime: Arc<Mutex<RuntimeAccumulator>>,
    /// Controller state.
    pub state: Arc<Mutex<ControlState>>,
    /// Latest flat values.
    pub latest: LatestValues,
    /// Recording telemetry sink.
    pub sink: Arc<RecordingSink>,
}

impl Plant {
    /// Creates a plant with default calibrations.
    pub fn new() -> Self {
        Self::with_calibration(PhCalibration::default(), FlowCalibration::default())
    }

    /// Creates a plant with the given calibrations.
    pub fn with_calibration(ph: PhCalibration, flow: FlowCalibration) -> Self {
        let dir = tempfile::tempdir().expect("temp dir");
        let store = JsonStore::new(dir.path());
        let line = ScriptedLine::new();
        let bus = Arc::new(Bus::open_with(line.clone(), &fast_serial()));
        let calibration = Arc::new(CalibrationStore::with_values(store.clone(), ph, flow));
        let total_flow = Arc::new(Mutex::new(TotalFlow::load(store.clone())));
        let runtime = Arc::new(Mutex::new(RuntimeAccumulator::load(store.clone())));
        let state = Arc::new(Mutex::new(ControlState::load(&store, &ControlSettings::default())));

        Self {
            dir,
            store,
            line,
            bus,
            calibration,
            total_flow,
            runtime,
            state,
            latest: LatestValues::new(),
            sink: RecordingSink::new(),
        }
    }

    /// The sink as the trait object the controller expects.
    pub fn sink(&self) -> Arc<dyn TelemetrySink> {
        self.sink.clone()
    }

    /// A scheduler over this plant with `sensors` registered.
    pub async fn scheduler(
        &self,
        settings: SchedulerSettings,
        sensors: Vec<SensorConfig>,
    ) -> (Scheduler, watch::Receiver<Option<f64>>) {
        let (tx, rx) = watch::channel(None);
        let mut scheduler = Scheduler::new(self.bus.clone(), settings, self.sink())
            .with_latest(self.latest.clone())
            .with_total_flow(self.total_flow.clone())
            .with_ph_channel(tx);

        for config in sensors {
            let adapter = build_adapter(&config, &AdapterSettings::default(), self.calibration.clone())
                .expect("known sensor type");
            scheduler.add_sensor(config, adapter).await;
        }
        (scheduler, rx)
    }

    /// The remote control handler over this plant.
    pub fn remote(&self) -> RemoteControl {
        RemoteControl::new(
            self.state.clone(),
            self.store.clone(),
            self.calibration.clone(),
            self.total_flow.clone(),
            self.runtime.clone(),
            self.latest.clone(),
            self.sink(),
        )
    }
}

impl Default for Plant {
    fn default() -> Self {
        Self::new()
    }
}
