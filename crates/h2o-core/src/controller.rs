// SPDX-License-Identifier: PolyForm-Noncommercial-1.0.0
// Copyright (c) 2025 Sylvex. All rights reserved.

//! pH hysteresis controller.
//!
//! # Decision Table
//!
//! | power | auto | pH                 | relays            | timers        |
//! |-------|------|--------------------|-------------------|---------------|
//! | off   | any  | any                | off (auto → off)  | cleared       |
//! | on    | off  | any                | off               | cleared       |
//! | on    | on   | missing            | hold              | keep running  |
//! | on    | on   | > target + tol     | co2 + heater      | high runs     |
//! | on    | on   | within band        | pump              | both cleared  |
//! | on    | on   | < target − tol     | hold              | low runs      |
//! | on    | on   | < hard stop        | trip              | cleared       |
//!
//! A timer that has run for its full delay trips the plant: power and auto
//! are switched off and every relay is released. This holds while pH is
//! missing too. A closed pH feed trips an armed plant at once.

use std::fmt;
use std::sync::Arc;

use parking_lot::Mutex;
use tokio::sync::{broadcast, watch};
use tokio::time::Instant;

use crate::persist::JsonStore;
use crate::runtime::RuntimeAccumulator;
use crate::state::{ControlState, Relays};

// =============================================================================
// Tick
// =============================================================================

/// Why the plant was tripped.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TripReason {
    /// pH stayed above the band for the high delay.
    HighTimeout,
    /// pH stayed below the band for the low delay.
    LowTimeout,
    /// pH fell below the hard-stop threshold.
    HardStop,
    /// The pH publisher is gone; no reading will ever arrive again.
    PhFeedLost,
}

impl fmt::Display for TripReason {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::HighTimeout => f.write_str("high_timeout"),
            Self::LowTimeout => f.write_str("low_timeout"),
            Self::HardStop => f.write_str("hard_stop"),
            Self::PhFeedLost => f.write_str("ph_feed_lost"),
        }
    }
}

/// Result of one controller tick.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct TickOutcome {
    /// Relay outputs after the tick.
    pub relays: Relays,
    /// Set if this tick tripped the plant.
    pub trip: Option<TripReason>,
    /// Power state after the tick.
    pub powered: bool,
}

/// Runs one control step against `state`.
pub fn tick(state: &mut ControlState, ph: Option<f64>, now: Instant) -> TickOutcome {
    let trip = evaluate(state, ph, now);
    settle(state, trip, ph)
}

fn settle(state: &mut ControlState, trip: Option<TripReason>, ph: Option<f64>) -> TickOutcome {
    if let Some(reason) = trip {
        state.set_power(false);
        tracing::warn!(
            event = "ControlSafetyTrip",
            reason = %reason,
            ph = ?ph,
            target = state.target_ph,
            tolerance = state.tolerance,
            "Process tripped, all relays released"
        );
    }
    TickOutcome {
        relays: state.relays,
        trip,
        powered: state.power_enabled,
    }
}

fn evaluate(state: &mut ControlState, ph: Option<f64>, now: Instant) -> Option<TripReason> {
    if !state.power_enabled {
        state.set_power(false);
        return None;
    }
    if !state.auto_enabled {
        state.set_auto(false);
        return None;
    }
    let Some(ph) = ph else {
        return expired_timer(state, now);
    };

    let (min, max) = (state.min_ph(), state.max_ph());
    let mut trip = None;

    if ph > max {
        state.relays = Relays::DOSING;
        let started = *state.high_started.get_or_insert(now);
        if now.saturating_duration_since(started) >= state.high_delay {
            trip = Some(TripReason::HighTimeout);
        }
    } else {
        state.high_started = None;
    }

    if ph < min {
        if ph < state.hard_stop_ph {
            trip = trip.or(Some(TripReason::HardStop));
        } else {
            let started = *state.low_started.get_or_insert(now);
            if now.saturating_duration_since(started) >= state.low_delay {
                trip = trip.or(Some(TripReason::LowTimeout));
            }
        }
    } else {
        state.low_started = None;
    }

    if trip.is_none() && (min..=max).contains(&ph) {
        state.relays = Relays::PUMP;
    }
    trip
}

/// A high or low timer left running by an earlier reading that has now
/// outlived its delay.
fn expired_timer(state: &ControlState, now: Instant) -> Option<TripReason> {
    let expired = |started: Option<Instant>, delay| {
        started.is_some_and(|s| now.saturating_duration_since(s) >= delay)
    };
    if expired(state.high_started, state.high_delay) {
        Some(TripReason::HighTimeout)
    } else if expired(state.low_started, state.low_delay) {
        Some(TripReason::LowTimeout)
    } else {
        None
    }
}

// =============================================================================
// RelayDriver
// =============================================================================

/// Drives the physical relay outputs.
pub trait RelayDriver: Send {
    /// Sets all outputs.
    fn apply(&mut self, relays: Relays);
}

/// A driver that only logs output changes.
#[derive(Debug, Default)]
pub struct LoggingRelayDriver {
    last: Option<Relays>,
}

impl LoggingRelayDriver {
    /// Creates the driver.
    pub fn new() -> Self {
        Self::default()
    }
}

impl RelayDriver for LoggingRelayDriver {
    fn apply(&mut self, relays: Relays) {
        if self.last != Some(relays) {
            tracing::info!(
                pump = relays.pump,
                co2 = relays.co2,
                heater = relays.heater,
                "Relay outputs changed"
            );
            self.last = Some(relays);
        }
    }
}

// =============================================================================
// ControlLoop
// =============================================================================

/// Periodic controller task.
pub struct ControlLoop {
    state: Arc<Mutex<ControlState>>,
    runtime: Arc<Mutex<RuntimeAccumulator>>,
    ph: watch::Receiver<Option<f64>>,
    driver: Box<dyn RelayDriver>,
    store: JsonStore,
    period: std::time::Duration,
}

impl ControlLoop {
    /// Creates the loop.
    pub fn new(
        state: Arc<Mutex<ControlState>>,
        runtime: Arc<Mutex<RuntimeAccumulator>>,
        ph: watch::Receiver<Option<f64>>,
        driver: impl RelayDriver + 'static,
        store: JsonStore,
        period: std::time::Duration,
    ) -> Self {
        Self {
            state,
            runtime,
            ph,
            driver: Box::new(driver),
            store,
            period,
        }
    }

    /// Runs one step with the latest published pH.
    pub fn step(&mut self, now: Instant) -> TickOutcome {
        let feed_lost = self.ph.has_changed().is_err();
        let ph = if feed_lost {
            None
        } else {
            *self.ph.borrow_and_update()
        };
        let outcome = {
            let mut state = self.state.lock();
            let outcome = if feed_lost && state.power_enabled && state.auto_enabled {
                settle(&mut state, Some(TripReason::PhFeedLost), None)
            } else {
                tick(&mut state, ph, now)
            };
            if outcome.trip.is_some() {
                if let Err(e) = state.save(&self.store) {
                    tracing::warn!(error = %e, "Failed to persist control state after trip");
                }
            }
            outcome
        };

        {
            let mut runtime = self.runtime.lock();
            if outcome.powered {
                runtime.start(now);
            } else {
                runtime.stop(now);
            }
        }

        self.driver.apply(outcome.relays);
        outcome
    }

    /// Ticks until shutdown, then releases every relay.
    pub async fn run(mut self, mut shutdown: broadcast::Receiver<()>) {
        let mut ticker = tokio::time::interval(self.period);
        ticker.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Delay);
        tracing::info!(period = ?self.period, "Control loop started");

        loop {
            tokio::select! {
                _ = ticker.tick() => {
                    self.step(Instant::now());
                }
                _ = shutdown.recv() => break,
            }
        }

        self.state.lock().relays = Relays::OFF;
        self.driver.apply(Relays::OFF);
        tracing::info!("Control loop stopped");
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::Duration;

    fn armed(target: f64, tolerance: f64, delay: Duration) -> ControlState {
        let mut state = ControlState::default();
        state.target_ph = target;
        state.tolerance = tolerance;
        state.high_delay = delay;
        state.low_delay = delay;
        state.set_power(true);
        state.set_auto(true);
        state
    }

    #[tokio::test(start_paused = true)]
    async fn test_hysteresis_sequence() {
        let mut state = armed(7.0, 1.0, Duration::from_secs(2));
        let t0 = Instant::now();
        let seq = [7.0, 9.0, 9.0, 9.0];

        let outcomes: Vec<_> = seq
            .iter()
            .enumerate()
            .map(|(i, ph)| tick(&mut state, Some(*ph), t0 + Duration::from_secs(i as u64)))
            .collect();

        assert_eq!(outcomes[0].relays, Relays::PUMP);
        assert_eq!(outcomes[1].relays, Relays::DOSING);
        assert_eq!(outcomes[2].relays, Relays::DOSING);
        assert_eq!(outcomes[3].relays, Relays::OFF);
        assert_eq!(outcomes[3].trip, Some(TripReason::HighTimeout));
        assert!(!state.auto_enabled);
        assert!(!state.power_enabled);
    }

    #[tokio::test(start_paused = true)]
    async fn test_hard_stop_trips_immediately() {
        let mut state = armed(7.0, 0.5, Duration::from_secs(600));
        let out = tick(&mut state, Some(4.2), Instant::now());
        assert_eq!(out.trip, Some(TripReason::HardStop));
        assert!(!out.relays.any());
    }

    #[tokio::test(start_paused = true)]
    async fn test_low_side_holds_then_trips() {
        let mut state = armed(7.0, 0.5, Duration::from_secs(10));
        let t0 = Instant::now();
        tick(&mut state, Some(8.0), t0);
        assert_eq!(state.relays, Relays::DOSING);

        let out = tick(&mut state, Some(6.0), t0 + Duration::from_secs(1));
        assert_eq!(out.relays, Relays::DOSING);
        assert!(state.low_timer_running());
        assert!(!state.high_timer_running());
        assert_eq!(state.countdown_low(t0 + Duration::from_secs(4)), Duration::from_secs(7));

        let out = tick(&mut state, Some(6.0), t0 + Duration::from_secs(11));
        assert_eq!(out.trip, Some(TripReason::LowTimeout));
    }

    #[tokio::test(start_paused = true)]
    async fn test_missing_ph_holds_until_delay() {
        let mut state = armed(7.0, 0.5, Duration::from_secs(10));
        let t0 = Instant::now();
        tick(&mut state, Some(8.0), t0);

        let out = tick(&mut state, None, t0 + Duration::from_secs(5));
        assert_eq!(out.relays, Relays::DOSING);
        assert_eq!(out.trip, None);
        assert!(state.high_timer_running());

        let out = tick(&mut state, None, t0 + Duration::from_secs(3600));
        assert_eq!(out.trip, Some(TripReason::HighTimeout));
        assert_eq!(out.relays, Relays::OFF);
        assert!(!out.powered);
    }

    #[tokio::test(start_paused = true)]
    async fn test_missing_ph_trips_low_timer() {
        let mut state = armed(7.0, 0.5, Duration::from_secs(10));
        let t0 = Instant::now();
        tick(&mut state, Some(7.0), t0);
        tick(&mut state, Some(6.0), t0 + Duration::from_secs(1));

        let out = tick(&mut state, None, t0 + Duration::from_secs(11));
        assert_eq!(out.trip, Some(TripReason::LowTimeout));
    }

    #[tokio::test(start_paused = true)]
    async fn test_missing_ph_without_timer_holds() {
        let mut state = armed(7.0, 0.5, Duration::from_secs(10));
        let t0 = Instant::now();
        tick(&mut state, Some(7.0), t0);
        let out = tick(&mut state, None, t0 + Duration::from_secs(3600));
        assert_eq!(out.relays, Relays::PUMP);
        assert_eq!(out.trip, None);
    }

    #[tokio::test(start_paused = true)]
    async fn test_closed_ph_feed_trips_armed_plant() {
        let dir = tempfile::tempdir().unwrap();
        let store = JsonStore::new(dir.path());
        let state = Arc::new(Mutex::new(armed(7.0, 0.5, Duration::from_secs(600))));
        let runtime = Arc::new(Mutex::new(RuntimeAccumulator::load(store.clone())));
        let (tx, rx) = watch::channel(Some(9.0));

        let mut control = ControlLoop::new(
            Arc::clone(&state),
            runtime,
            rx,
            LoggingRelayDriver::new(),
            store.clone(),
            Duration::from_secs(1),
        );

        let t0 = Instant::now();
        assert_eq!(control.step(t0).relays, Relays::DOSING);

        drop(tx);
        let out = control.step(t0 + Duration::from_secs(1));
        assert_eq!(out.trip, Some(TripReason::PhFeedLost));
        assert_eq!(out.relays, Relays::OFF);
        assert!(!state.lock().power_enabled);

        let saved: ControlState = store.load(crate::persist::CONTROL_STATE_FILE).unwrap();
        assert!(!saved.power_enabled);

        // Still off on later ticks.
        let out = control.step(t0 + Duration::from_secs(2));
        assert_eq!(out.trip, None);
        assert_eq!(out.relays, Relays::OFF);
    }

    #[tokio::test(start_paused = true)]
    async fn test_back_in_band_clears_timers() {
        let mut state = armed(7.0, 0.5, Duration::from_secs(10));
        let t0 = Instant::now();
        tick(&mut state, Some(8.0), t0);
        tick(&mut state, Some(7.2), t0 + Duration::from_secs(5));
        assert_eq!(state.relays, Relays::PUMP);
        assert_eq!(state.countdown_high(t0 + Duration::from_secs(5)), Duration::from_secs(10));
    }

    #[tokio::test(start_paused = true)]
    async fn test_disarmed_releases_relays() {
        let mut state = armed(7.0, 0.5, Duration::from_secs(10));
        let t0 = Instant::now();
        tick(&mut state, Some(7.0), t0);
        state.auto_enabled = false;
        let out = tick(&mut state, Some(9.0), t0);
        assert_eq!(out.relays, Relays::OFF);
        assert!(out.powered);

        state.power_enabled = false;
        state.auto_enabled = true;
        let out = tick(&mut state, Some(7.0), t0);
        assert_eq!(out.relays, Relays::OFF);
        assert!(!state.auto_enabled);
    }

    #[tokio::test(start_paused = true)]
    async fn test_loop_drives_runtime() {
        let dir = tempfile::tempdir().unwrap();
        let store = JsonStore::new(dir.path());
        let state = Arc::new(Mutex::new(armed(7.0, 0.5, Duration::from_secs(600))));
        let runtime = Arc::new(Mutex::new(RuntimeAccumulator::load(store.clone())));
        let (tx, rx) = watch::channel(Some(7.0));

        let mut control = ControlLoop::new(
            Arc::clone(&state),
            Arc::clone(&runtime),
            rx,
            LoggingRelayDriver::new(),
            store,
            Duration::from_secs(1),
        );

        let t0 = Instant::now();
        assert_eq!(control.step(t0).relays, Relays::PUMP);
        assert!(runtime.lock().is_running());

        tx.send(Some(3.0)).unwrap();
        let out = control.step(t0 + Duration::from_secs(60));
        assert_eq!(out.trip, Some(TripReason::HardStop));
        assert!(!runtime.lock().is_running());
        assert_eq!(runtime.lock().total_seconds(t0), 60.0);
    }
}
