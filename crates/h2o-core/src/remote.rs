// SPDX-License-Identifier: PolyForm-Noncommercial-1.0.0
// Copyright (c) 2025 Sylvex. All rights reserved.

//! Remote control surface.
//!
//! [`RemoteControl`] is the single entry point for operator commands, whatever
//! transport carries them. It mutates the shared [`ControlState`], persists it
//! after every change, and can push a snapshot of the controller to the
//! telemetry sink.
//!
//! | method           | params                                                  |
//! |------------------|---------------------------------------------------------|
//! | `setPower`       | `true` / `false` or `{"value": bool}`                   |
//! | `setAuto`        | `true` / `false` or `{"value": bool}`                   |
//! | `getTelemetry`   | none                                                    |
//! | `calibratePh`    | `{high_ref, low_ref, measured_high, measured_low}`      |
//! | `resetTotalFlow` | none                                                    |

use std::collections::BTreeMap;
use std::sync::Arc;

use parking_lot::Mutex;
use serde::Serialize;
use serde_json::{json, Value};
use tokio::time::Instant;

use crate::accumulator::TotalFlow;
use crate::calibration::CalibrationStore;
use crate::error::{RemoteError, RemoteResult};
use crate::persist::JsonStore;
use crate::runtime::RuntimeAccumulator;
use crate::state::{Attribute, ControlState};
use crate::telemetry::{LatestValues, Payload, TelemetrySink};

// =============================================================================
// Method
// =============================================================================

/// Known remote methods.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Method {
    /// Switch plant power.
    SetPower,
    /// Arm or disarm closed-loop control.
    SetAuto,
    /// Push and return a controller snapshot.
    GetTelemetry,
    /// Two-point pH calibration.
    CalibratePh,
    /// Zero the total-flow accumulator.
    ResetTotalFlow,
}

impl Method {
    /// All methods.
    pub const ALL: [Self; 5] = [
        Self::SetPower,
        Self::SetAuto,
        Self::GetTelemetry,
        Self::CalibratePh,
        Self::ResetTotalFlow,
    ];

    /// Wire name.
    pub const fn as_str(&self) -> &'static str {
        match self {
            Self::SetPower => "setPower",
            Self::SetAuto => "setAuto",
            Self::GetTelemetry => "getTelemetry",
            Self::CalibratePh => "calibratePh",
            Self::ResetTotalFlow => "resetTotalFlow",
        }
    }

    /// Looks up a method by wire name.
    pub fn from_name(name: &str) -> Option<Self> {
        Self::ALL.into_iter().find(|m| m.as_str() == name)
    }
}

// =============================================================================
// Attribute updates
// =============================================================================

/// Outcome of an attribute update.
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct AttributeReport {
    /// Keys that were applied.
    pub applied: Vec<String>,
    /// Keys that were rejected, with the reason.
    pub rejected: BTreeMap<String, String>,
}

impl AttributeReport {
    /// Returns `true` if nothing was rejected.
    pub fn is_clean(&self) -> bool {
        self.rejected.is_empty()
    }
}

// =============================================================================
// RemoteControl
// =============================================================================

/// Operator command handler.
#[derive(Clone)]
pub struct RemoteControl {
    state: Arc<Mutex<ControlState>>,
    store: JsonStore,
    calibration: Arc<CalibrationStore>,
    total_flow: Arc<Mutex<TotalFlow>>,
    runtime: Arc<Mutex<RuntimeAccumulator>>,
    latest: LatestValues,
    sink: Arc<dyn TelemetrySink>,
}

impl RemoteControl {
    /// Creates the handler over the shared runtime objects.
    pub fn new(
        state: Arc<Mutex<ControlState>>,
        store: JsonStore,
        calibration: Arc<CalibrationStore>,
        total_flow: Arc<Mutex<TotalFlow>>,
        runtime: Arc<Mutex<RuntimeAccumulator>>,
        latest: LatestValues,
        sink: Arc<dyn TelemetrySink>,
    ) -> Self {
        Self {
            state,
            store,
            calibration,
            total_flow,
            runtime,
            latest,
            sink,
        }
    }

    /// Dispatches a remote method call.
    pub async fn call(&self, method: &str, params: &Value) -> RemoteResult<Value> {
        let Some(known) = Method::from_name(method) else {
            tracing::warn!(method, "Unknown remote method");
            return Err(RemoteError::UnknownMethod(method.to_string()));
        };
        tracing::info!(method, "Remote method call");

        match known {
            Method::SetPower => {
                let on = flag_param("value", params)?;
                self.update(Attribute::Power(on));
                Ok(json!({ "power_enabled": on }))
            }
            Method::SetAuto => {
                let on = flag_param("value", params)?;
                self.update(Attribute::Auto(on));
                Ok(json!({ "auto_enabled": on }))
            }
            Method::GetTelemetry => {
                let snapshot = self.snapshot();
                if let Err(e) = self.sink.send(&Payload::Flat(snapshot.clone())).await {
                    tracing::warn!(error = %e, "Failed to push controller snapshot");
                }
                Ok(Value::Object(snapshot.into_iter().collect()))
            }
            Method::CalibratePh => {
                let high_ref = number_param("high_ref", params)?;
                let low_ref = number_param("low_ref", params)?;
                let measured_high = number_param("measured_high", params)?;
                let measured_low = number_param("measured_low", params)?;
                let cal = self
                    .calibration
                    .calibrate_ph(high_ref, low_ref, measured_high, measured_low)?;
                Ok(json!({ "ph_slope": cal.slope, "ph_intercept": cal.intercept }))
            }
            Method::ResetTotalFlow => {
                self.total_flow.lock().reset();
                Ok(json!({ "total_flow": 0.0 }))
            }
        }
    }

    /// Applies a batch of `key: value` attribute updates.
    ///
    /// Valid entries are applied even if others are rejected. The state is
    /// persisted once if anything changed.
    pub fn apply_attributes(&self, attributes: &serde_json::Map<String, Value>) -> AttributeReport {
        let mut report = AttributeReport::default();
        let mut parsed = Vec::new();

        for (key, value) in attributes {
            match Attribute::parse(key, value) {
                Ok(attribute) => parsed.push(attribute),
                Err(e) => {
                    tracing::warn!(key = %key, error = %e, "Attribute rejected");
                    report.rejected.insert(key.clone(), e.to_string());
                }
            }
        }

        if !parsed.is_empty() {
            let mut state = self.state.lock();
            for attribute in parsed {
                tracing::info!(key = %attribute.key(), ?attribute, "Attribute applied");
                report.applied.push(attribute.key().to_string());
                state.apply(attribute);
            }
            if let Err(e) = state.save(&self.store) {
                tracing::warn!(error = %e, "Failed to persist control state");
            }
        }
        report
    }

    /// Controller snapshot merged with the latest sensor values.
    pub fn snapshot(&self) -> BTreeMap<String, Value> {
        let now = Instant::now();
        let mut out = self.latest.snapshot();
        {
            let state = self.state.lock();
            out.insert("pump_relay".into(), state.relays.pump.into());
            out.insert("co2_relay".into(), state.relays.co2.into());
            out.insert("heater_relay".into(), state.relays.heater.into());
            out.insert("auto_enabled".into(), state.auto_enabled.into());
            out.insert("power_enabled".into(), state.power_enabled.into());
            out.insert(
                "countdown_ph_high_s".into(),
                state.countdown_high(now).as_secs().into(),
            );
            out.insert(
                "countdown_ph_low_s".into(),
                state.countdown_low(now).as_secs().into(),
            );
        }
        out.insert(
            "runtime_hours".into(),
            json!(self.runtime.lock().total_hours(now)),
        );
        out.insert("total_flow_l".into(), json!(self.total_flow.lock().total()));
        out
    }

    /// Shared control state.
    pub fn state(&self) -> &Arc<Mutex<ControlState>> {
        &self.state
    }

    fn update(&self, attribute: Attribute) {
        let mut state = self.state.lock();
        state.apply(attribute);
        if let Err(e) = state.save(&self.store) {
            tracing::warn!(error = %e, "Failed to persist control state");
        }
    }
}

fn flag_param(key: &'static str, params: &Value) -> RemoteResult<bool> {
    params
        .as_bool()
        .or_else(|| params.get(key).and_then(Value::as_bool))
        .ok_or_else(|| RemoteError::invalid(key, "boolean"))
}

fn number_param(key: &'static str, params: &Value) -> RemoteResult<f64> {
    params
        .get(key)
        .and_then(Value::as_f64)
        .ok_or_else(|| RemoteError::invalid(key, "number"))
}
