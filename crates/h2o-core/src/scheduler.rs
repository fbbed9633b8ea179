// SPDX-License-Identifier: PolyForm-Noncommercial-1.0.0
// Copyright (c) 2025 Sylvex. All rights reserved.

//! Polling scheduler.
//!
//! Every tick the scheduler walks the configured sensors in order. A sensor is
//! polled when it is not suppressed and its poll interval has elapsed since
//! its last successful read. Each poll is preceded by a pacing delay (longer
//! for long-cable installations) and goes through the shared [`Bus`].
//!
//! ```text
//!  tick ──▶ check backoff ──▶ due? ──▶ pacing ──▶ adapter.read(bus)
//!                                                   │
//!                        ┌──────────────────────────┴───────────────┐
//!                        ▼ Ok (fresh)                               ▼ Err / degraded
//!         telemetry, latest values, pH channel,         error telemetry, backoff
//!         total flow, settle delay                      failure count (degraded
//!                                                       reads still publish pH)
//! ```
//!
//! Read failures are never propagated out of the scheduler.

use std::sync::Arc;
use std::time::Duration;

use h2o_modbus::Bus;
use parking_lot::Mutex;
use serde::{Deserialize, Serialize};
use tokio::sync::{broadcast, watch};
use tokio::time::{sleep, Instant, MissedTickBehavior};

use crate::accumulator::TotalFlow;
use crate::backoff::{Admission, BackoffPolicy, SensorRuntime};
use crate::sensor::{Readings, SensorAdapter, SensorConfig, SensorKind, FLOW_RATE_L_MIN};
use crate::telemetry::{
    error_payload, flat_values, format_readings, timestamp_ms, LatestValues, Payload, TelemetrySink,
};

// =============================================================================
// Settings
// =============================================================================

/// Delays around each poll.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct PollPacing {
    /// Before polling a regular sensor.
    #[serde(with = "humantime_serde")]
    pub normal: Duration,

    /// Before polling a long-cable sensor.
    #[serde(with = "humantime_serde")]
    pub long_cable: Duration,

    /// After a successful poll.
    #[serde(with = "humantime_serde")]
    pub settle: Duration,
}

impl Default for PollPacing {
    fn default() -> Self {
        Self {
            normal: Duration::from_millis(500),
            long_cable: Duration::from_secs(1),
            settle: Duration::from_millis(200),
        }
    }
}

/// Scheduler settings.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct SchedulerSettings {
    /// Pass period.
    #[serde(with = "humantime_serde")]
    pub tick: Duration,

    /// Suppression policy.
    #[serde(flatten)]
    pub backoff: BackoffPolicy,

    /// Poll pacing.
    pub pacing: PollPacing,
}

impl Default for SchedulerSettings {
    fn default() -> Self {
        Self {
            tick: Duration::from_secs(1),
            backoff: BackoffPolicy::default(),
            pacing: PollPacing::default(),
        }
    }
}

impl SchedulerSettings {
    /// Validates the settings.
    pub fn validate(&self) -> Result<(), String> {
        if self.tick.is_zero() {
            return Err("scheduler tick must be non-zero".to_string());
        }
        self.backoff.validate()
    }
}

// =============================================================================
// Scheduler
// =============================================================================

/// Counters for one pass.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct PassReport {
    /// Sensors read.
    pub polled: usize,
    /// Fresh successful reads.
    pub succeeded: usize,
    /// Failed or degraded reads.
    pub failed: usize,
    /// Sensors skipped due to suppression.
    pub suppressed: usize,
}

struct Slot {
    config: SensorConfig,
    adapter: Arc<dyn SensorAdapter>,
    runtime: SensorRuntime,
}

/// Owns per-sensor runtime state and drives the polling passes.
pub struct Scheduler {
    bus: Arc<Bus>,
    settings: SchedulerSettings,
    sink: Arc<dyn TelemetrySink>,
    slots: Vec<Slot>,
    latest: LatestValues,
    total_flow: Option<Arc<Mutex<TotalFlow>>>,
    ph: Option<watch::Sender<Option<f64>>>,
}

impl Scheduler {
    /// Creates an empty scheduler.
    pub fn new(bus: Arc<Bus>, settings: SchedulerSettings, sink: Arc<dyn TelemetrySink>) -> Self {
        Self {
            bus,
            settings,
            sink,
            slots: Vec::new(),
            latest: LatestValues::new(),
            total_flow: None,
            ph: None,
        }
    }

    /// Shares the latest-values table.
    pub fn with_latest(mut self, latest: LatestValues) -> Self {
        self.latest = latest;
        self
    }

    /// Feeds radar flow into `total`.
    pub fn with_total_flow(mut self, total: Arc<Mutex<TotalFlow>>) -> Self {
        self.total_flow = Some(total);
        self
    }

    /// Publishes pH readings on `tx`.
    pub fn with_ph_channel(mut self, tx: watch::Sender<Option<f64>>) -> Self {
        self.ph = Some(tx);
        self
    }

    /// Registers a sensor and its bus address.
    pub async fn add_sensor(&mut self, config: SensorConfig, adapter: Arc<dyn SensorAdapter>) {
        self.bus.acquire().await.add_device(config.device_id);
        tracing::info!(
            sensor_id = %config.id,
            kind = %adapter.kind(),
            device = config.device_id,
            long_cable = config.is_long_cable(),
            interval = ?config.poll_interval,
            "Sensor registered"
        );
        let runtime = SensorRuntime::new(config.is_long_cable());
        self.slots.push(Slot {
            config,
            adapter,
            runtime,
        });
    }

    /// Number of registered sensors.
    pub fn sensor_count(&self) -> usize {
        self.slots.len()
    }

    /// Runtime state of a sensor.
    pub fn runtime(&self, sensor_id: &str) -> Option<&SensorRuntime> {
        self.slots
            .iter()
            .find(|s| s.config.id == sensor_id)
            .map(|s| &s.runtime)
    }

    /// Runs one pass over all sensors.
    pub async fn pass(&mut self) -> PassReport {
        let mut report = PassReport::default();
        let policy = &self.settings.backoff;

        for slot in self.slots.iter_mut() {
            let now = Instant::now();
            let id = slot.config.id.as_str();

            if slot.runtime.check(id, now, policy) == Admission::Suppressed {
                report.suppressed += 1;
                continue;
            }
            if !slot.runtime.is_due(now, slot.config.poll_interval) {
                continue;
            }

            let pacing = if slot.config.is_long_cable() {
                self.settings.pacing.long_cable
            } else {
                self.settings.pacing.normal
            };
            sleep(pacing).await;

            report.polled += 1;
            let outcome = slot.adapter.read(&self.bus).await;

            match outcome {
                Ok(mut readings) => {
                    if slot.adapter.kind() == SensorKind::Radar {
                        if let Some(total) = &self.total_flow {
                            let rate = readings.number(FLOW_RATE_L_MIN).unwrap_or(0.0);
                            let mut total = total.lock();
                            total.update(rate, Instant::now());
                            readings.insert("total_flow", total.total());
                        }
                    }

                    for payload in format_readings(&slot.config, &readings, timestamp_ms()) {
                        deliver(self.sink.as_ref(), &payload).await;
                    }
                    self.latest.extend(flat_values(id, &readings));

                    if readings.is_degraded() {
                        report.failed += 1;
                        // the controller keeps the cached pH; backoff still counts the miss
                        publish_ph(&self.ph, slot.adapter.kind(), Some(&readings));
                        fail(
                            self.sink.as_ref(),
                            slot,
                            "served from last known value",
                            now,
                            policy,
                        )
                        .await;
                    } else {
                        report.succeeded += 1;
                        publish_ph(&self.ph, slot.adapter.kind(), Some(&readings));
                        if slot.runtime.consecutive_errors() > 0 {
                            tracing::info!(
                                sensor_id = %id,
                                errors = slot.runtime.consecutive_errors(),
                                "Sensor recovered"
                            );
                        }
                        slot.runtime.record_success(now);
                        sleep(self.settings.pacing.settle).await;
                    }
                }
                Err(e) => {
                    report.failed += 1;
                    publish_ph(&self.ph, slot.adapter.kind(), None);
                    fail(self.sink.as_ref(), slot, &e.summary(), now, policy).await;
                }
            }
        }

        report
    }

    /// Runs passes until shutdown. A pass in progress is finished first.
    pub async fn run(mut self, mut shutdown: broadcast::Receiver<()>) {
        let mut ticker = tokio::time::interval(self.settings.tick);
        ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);
        tracing::info!(sensors = self.slots.len(), tick = ?self.settings.tick, "Scheduler started");

        loop {
            tokio::select! {
                biased;
                _ = shutdown.recv() => break,
                _ = ticker.tick() => {}
            }
            let report = self.pass().await;
            tracing::trace!(?report, "Polling pass finished");
        }

        tracing::info!("Scheduler stopped");
    }
}

async fn deliver(sink: &dyn TelemetrySink, payload: &Payload) {
    if let Err(e) = sink.send(payload).await {
        tracing::warn!(sink = %sink.name(), error = %e, "Telemetry dropped");
    }
}

async fn fail(
    sink: &dyn TelemetrySink,
    slot: &mut Slot,
    reason: &str,
    now: Instant,
    policy: &BackoffPolicy,
) {
    let id = slot.config.id.as_str();
    slot.runtime.record_failure(id, now, policy);
    let count = slot.runtime.consecutive_errors();
    tracing::warn!(sensor_id = %id, errors = count, reason, "Sensor read failed");
    deliver(sink, &error_payload(id, reason, count)).await;
}

fn publish_ph(tx: &Option<watch::Sender<Option<f64>>>, kind: SensorKind, readings: Option<&Readings>) {
    if kind != SensorKind::Ph {
        return;
    }
    if let Some(tx) = tx {
        tx.send_replace(readings.and_then(|r| r.number("ph_value")));
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::SensorError;
    use async_trait::async_trait;
    use h2o_modbus::mock::ScriptedLine;
    use h2o_modbus::SerialConfig;
    use std::sync::atomic::{AtomicUsize, Ordering};

    struct Scripted {
        kind: SensorKind,
        ok: Mutex<Vec<bool>>,
        calls: AtomicUsize,
    }

    #[async_trait]
    impl SensorAdapter for Scripted {
        fn kind(&self) -> SensorKind {
            self.kind
        }
        fn id(&self) -> &str {
            "s"
        }
        fn device_id(&self) -> u8 {
            1
        }
        async fn read(&self, _bus: &Bus) -> Result<Readings, SensorError> {
            self.calls.fetch_add(1, Ordering::SeqCst);
            let ok = self.ok.lock().pop().unwrap_or(false);
            if ok {
                let mut r = Readings::new();
                r.insert("ph_value", 7.2);
                Ok(r)
            } else {
                Err(SensorError::register(
                    "s",
                    "ph_value",
                    1,
                    h2o_modbus::TransportError::NoData { device: 1, register: 1 },
                ))
            }
        }
    }

    struct Nop;

    #[async_trait]
    impl TelemetrySink for Nop {
        fn name(&self) -> &str {
            "nop"
        }
        async fn send(&self, _: &Payload) -> Result<(), crate::error::TelemetryError> {
            Ok(())
        }
    }

    fn scheduler() -> Scheduler {
        let bus = Arc::new(Bus::open_with(ScriptedLine::new(), &SerialConfig::default()));
        Scheduler::new(bus, SchedulerSettings::default(), Arc::new(Nop))
    }

    #[tokio::test(start_paused = true)]
    async fn test_failures_never_escape_and_suppress() {
        let mut scheduler = scheduler();
        let adapter = Arc::new(Scripted {
            kind: SensorKind::Turbidity,
            ok: Mutex::new(vec![]),
            calls: AtomicUsize::new(0),
        });
        scheduler
            .add_sensor(SensorConfig::new("s", SensorKind::Turbidity, 1), adapter.clone())
            .await;

        for _ in 0..8 {
            scheduler.pass().await;
        }
        assert_eq!(adapter.calls.load(Ordering::SeqCst), 5);
        assert!(scheduler.runtime("s").unwrap().is_suppressed());
    }

    #[tokio::test(start_paused = true)]
    async fn test_ph_published_and_cleared() {
        let (tx, rx) = watch::channel(None);
        let mut scheduler = scheduler().with_ph_channel(tx);
        let mut config = SensorConfig::new("ph", SensorKind::Ph, 1);
        config.poll_interval = Duration::from_secs(1);
        // popped from the back: success, then failure
        let adapter = Arc::new(Scripted {
            kind: SensorKind::Ph,
            ok: Mutex::new(vec![false, true]),
            calls: AtomicUsize::new(0),
        });
        scheduler.add_sensor(config, adapter).await;

        scheduler.pass().await;
        assert_eq!(*rx.borrow(), Some(7.2));
        tokio::time::advance(Duration::from_secs(2)).await;
        scheduler.pass().await;
        assert_eq!(*rx.borrow(), None);
    }

    #[tokio::test(start_paused = true)]
    async fn test_pacing_delays() {
        let mut scheduler = scheduler();
        let adapter = Arc::new(Scripted {
            kind: SensorKind::Flow,
            ok: Mutex::new(vec![true]),
            calls: AtomicUsize::new(0),
        });
        let mut config = SensorConfig::new("flow_9", SensorKind::Flow, 0x2A);
        config.long_cable = Some(true);
        scheduler.add_sensor(config, adapter).await;

        let start = Instant::now();
        let report = scheduler.pass().await;
        assert_eq!(report.succeeded, 1);
        // long-cable pacing + settle
        assert_eq!(start.elapsed(), Duration::from_millis(1200));
    }
}
