// SPDX-License-Identifier: PolyForm-Noncommercial-1.0.0
// Copyright (c) 2025 Sylvex. All rights reserved.

//! pH two-point calibration and the flow level curve.
//!
//! # Examples
//!
//! ```
//! use h2o_core::calibration::PhCalibration;
//!
//! let cal = PhCalibration::compute(10.0, 7.0, 8.5, 7.0).unwrap();
//! assert_eq!(cal.correct(8.5), 10.0);
//! assert_eq!(cal.correct(7.0), 7.0);
//! ```

use parking_lot::RwLock;
use serde::{Deserialize, Serialize};

use crate::error::CalibrationError;
use crate::persist::{JsonStore, FLOW_CALIBRATION_FILE, PH_CALIBRATION_FILE};

// =============================================================================
// PhCalibration
// =============================================================================

/// The two buffers a pH calibration was taken against.
///
/// Correction interpolates between these points so that a reading equal to
/// either measured value returns its reference exactly.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct PhReference {
    /// High buffer pH.
    pub high_ref: f64,
    /// Low buffer pH.
    pub low_ref: f64,
    /// Raw reading in the high buffer.
    pub measured_high: f64,
    /// Raw reading in the low buffer.
    pub measured_low: f64,
}

impl PhReference {
    fn is_usable(&self) -> bool {
        [self.high_ref, self.low_ref, self.measured_high, self.measured_low]
            .iter()
            .all(|v| v.is_finite())
            && self.measured_high != self.measured_low
    }

    fn interpolate(&self, raw: f64) -> f64 {
        let t = (raw - self.measured_low) / (self.measured_high - self.measured_low);
        self.low_ref * (1.0 - t) + self.high_ref * t
    }
}

/// pH correction: `slope * raw + intercept`, or two-point interpolation when
/// the reference buffers are known.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct PhCalibration {
    /// Gain.
    #[serde(rename = "ph_slope")]
    pub slope: f64,
    /// Offset.
    #[serde(rename = "ph_intercept")]
    pub intercept: f64,
    /// Buffers of the last calibration. Absent in files written before
    /// references were recorded and for hand-set values.
    #[serde(rename = "ph_reference", default, skip_serializing_if = "Option::is_none")]
    pub reference: Option<PhReference>,
}

impl Default for PhCalibration {
    fn default() -> Self {
        Self::linear(1.0, 0.0)
    }
}

impl PhCalibration {
    /// A plain gain and offset with no recorded buffers.
    pub const fn linear(slope: f64, intercept: f64) -> Self {
        Self {
            slope,
            intercept,
            reference: None,
        }
    }

    /// Applies the correction to a raw reading.
    pub fn correct(&self, raw: f64) -> f64 {
        match self.reference {
            Some(reference) if reference.is_usable() => reference.interpolate(raw),
            _ => self.slope * raw + self.intercept,
        }
    }

    /// Derives a calibration from two reference buffers and what the probe
    /// measured in each.
    pub fn compute(
        high_ref: f64,
        low_ref: f64,
        measured_high: f64,
        measured_low: f64,
    ) -> Result<Self, CalibrationError> {
        for (name, v) in [
            ("high_ref", high_ref),
            ("low_ref", low_ref),
            ("measured_high", measured_high),
            ("measured_low", measured_low),
        ] {
            if !v.is_finite() {
                return Err(CalibrationError::NonFinite(name));
            }
        }

        let span = measured_high - measured_low;
        if span == 0.0 {
            return Err(CalibrationError::DivisionByZero(measured_high));
        }
        let slope = (high_ref - low_ref) / span;
        Ok(Self {
            slope,
            intercept: high_ref - slope * measured_high,
            reference: Some(PhReference {
                high_ref,
                low_ref,
                measured_high,
                measured_low,
            }),
        })
    }
}

// =============================================================================
// FlowCalibration
// =============================================================================

/// Polynomial level-to-flow curve.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct FlowCurve {
    /// Coefficients, lowest order first. Empty means zero flow.
    #[serde(default)]
    pub coefficients: Vec<f64>,
}

/// Radar zero reference and the level-to-flow curve.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FlowCalibration {
    /// Distance from the radar to the channel floor, in mm.
    pub zero_reference: f64,
    /// Level to flow curve.
    #[serde(flatten)]
    pub curve: FlowCurve,
}

impl Default for FlowCalibration {
    fn default() -> Self {
        Self {
            zero_reference: 250.0,
            curve: FlowCurve::default(),
        }
    }
}

impl FlowCalibration {
    /// Flow rate in L/s for a water level in mm.
    ///
    /// Levels at or below zero and negative curve results give zero.
    pub fn flow_rate(&self, level_mm: f64) -> f64 {
        if level_mm <= 0.0 {
            return 0.0;
        }
        let rate = self
            .curve
            .coefficients
            .iter()
            .rev()
            .fold(0.0, |acc, c| acc * level_mm + c);
        rate.max(0.0)
    }
}

// =============================================================================
// CalibrationStore
// =============================================================================

/// Shared, persisted calibration values.
#[derive(Debug)]
pub struct CalibrationStore {
    store: JsonStore,
    ph: RwLock<PhCalibration>,
    flow: RwLock<FlowCalibration>,
}

impl CalibrationStore {
    /// Loads both calibration files, writing defaults where missing or corrupt.
    pub fn load(store: JsonStore) -> Self {
        let ph: PhCalibration = store.load_or_init(PH_CALIBRATION_FILE);
        let flow: FlowCalibration = store.load_or_init(FLOW_CALIBRATION_FILE);
        tracing::info!(
            ph_slope = ph.slope,
            ph_intercept = ph.intercept,
            zero_reference = flow.zero_reference,
            curve_order = flow.curve.coefficients.len(),
            "Calibration loaded"
        );
        Self {
            store,
            ph: RwLock::new(ph),
            flow: RwLock::new(flow),
        }
    }

    /// Creates an in-memory store with the given values; nothing is written
    /// until the next calibration.
    pub fn with_values(store: JsonStore, ph: PhCalibration, flow: FlowCalibration) -> Self {
        Self {
            store,
            ph: RwLock::new(ph),
            flow: RwLock::new(flow),
        }
    }

    /// Current pH calibration.
    pub fn ph(&self) -> PhCalibration {
        *self.ph.read()
    }

    /// Current flow calibration.
    pub fn flow(&self) -> FlowCalibration {
        self.flow.read().clone()
    }

    /// Recomputes and persists the pH calibration.
    ///
    /// The in-memory value is updated only if the file was written.
    pub fn calibrate_ph(
        &self,
        high_ref: f64,
        low_ref: f64,
        measured_high: f64,
        measured_low: f64,
    ) -> Result<PhCalibration, CalibrationError> {
        let cal = PhCalibration::compute(high_ref, low_ref, measured_high, measured_low)?;
        self.store.save(PH_CALIBRATION_FILE, &cal)?;
        *self.ph.write() = cal;
        tracing::info!(slope = cal.slope, intercept = cal.intercept, "pH calibration updated");
        Ok(cal)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_ph_round_trip() {
        let cal = PhCalibration::compute(10.0, 7.0, 8.5, 7.0).unwrap();
        assert_eq!(cal.slope, 2.0);
        assert_eq!(cal.intercept, -7.0);
        assert_eq!(cal.correct(8.5), 10.0);
        assert_eq!(cal.correct(7.0), 7.0);
    }

    #[test]
    fn test_ph_endpoints_are_exact() {
        let cal = PhCalibration::compute(10.0, 7.0, 9.87, 7.12).unwrap();
        assert_eq!(cal.correct(9.87), 10.0);
        assert_eq!(cal.correct(7.12), 7.0);

        let mut measured_high = 8.01;
        while measured_high < 12.0 {
            let mut measured_low = 2.03;
            while measured_low < 7.9 {
                for (high_ref, low_ref) in [(10.0, 7.0), (10.0, 4.0), (7.0, 4.0), (9.18, 4.01)] {
                    let cal =
                        PhCalibration::compute(high_ref, low_ref, measured_high, measured_low)
                            .unwrap();
                    assert_eq!(cal.correct(measured_high), high_ref, "{measured_high}");
                    assert_eq!(cal.correct(measured_low), low_ref, "{measured_low}");
                    let mid = cal.correct((measured_high + measured_low) / 2.0);
                    assert!((mid - (high_ref + low_ref) / 2.0).abs() < 1e-9);
                }
                measured_low += 0.37;
            }
            measured_high += 0.13;
        }
    }

    #[test]
    fn test_ph_linear_without_reference() {
        let cal = PhCalibration::linear(1.0, 0.25);
        assert_eq!(cal.correct(7.0), 7.25);

        // a corrupt reference falls back to slope and intercept
        let mut cal = PhCalibration::compute(10.0, 4.0, 9.0, 3.0).unwrap();
        if let Some(reference) = cal.reference.as_mut() {
            reference.measured_low = reference.measured_high;
        }
        assert_eq!(cal.correct(6.0), 7.0);
    }

    #[test]
    fn test_ph_equal_measurements() {
        assert!(matches!(
            PhCalibration::compute(10.0, 7.0, 6.0, 6.0),
            Err(CalibrationError::DivisionByZero(_))
        ));
        assert!(matches!(
            PhCalibration::compute(f64::NAN, 7.0, 6.0, 5.0),
            Err(CalibrationError::NonFinite("high_ref"))
        ));
    }

    #[test]
    fn test_ph_file_keys() {
        let json = serde_json::to_value(PhCalibration::default()).unwrap();
        assert_eq!(json, serde_json::json!({"ph_slope": 1.0, "ph_intercept": 0.0}));
    }

    #[test]
    fn test_flow_curve() {
        let flat = FlowCalibration::default();
        assert_eq!(flat.flow_rate(500.0), 0.0);

        let cal = FlowCalibration {
            zero_reference: 250.0,
            curve: FlowCurve {
                coefficients: vec![1.0, 0.5, 0.01],
            },
        };
        // 1 + 0.5*10 + 0.01*100
        assert!((cal.flow_rate(10.0) - 7.0).abs() < 1e-12);
        assert_eq!(cal.flow_rate(0.0), 0.0);
        assert_eq!(cal.flow_rate(-40.0), 0.0);

        let negative = FlowCalibration {
            zero_reference: 250.0,
            curve: FlowCurve {
                coefficients: vec![-5.0, 0.1],
            },
        };
        assert_eq!(negative.flow_rate(10.0), 0.0);
    }

    #[test]
    fn test_flow_file_layout() {
        let json = serde_json::to_value(FlowCalibration::default()).unwrap();
        assert_eq!(json, serde_json::json!({"zero_reference": 250.0, "coefficients": []}));
    }

    #[test]
    fn test_store_persists_calibration() {
        let dir = tempfile::tempdir().unwrap();
        let store = CalibrationStore::load(JsonStore::new(dir.path()));
        assert_eq!(store.ph(), PhCalibration::default());
        assert!(dir.path().join(FLOW_CALIBRATION_FILE).exists());

        store.calibrate_ph(10.0, 7.0, 8.5, 7.0).unwrap();
        let reloaded = CalibrationStore::load(JsonStore::new(dir.path()));
        assert_eq!(reloaded.ph().slope, 2.0);
        assert_eq!(reloaded.ph().intercept, -7.0);
        assert_eq!(reloaded.ph().correct(8.5), 10.0);

        let text = std::fs::read_to_string(dir.path().join(PH_CALIBRATION_FILE)).unwrap();
        let json: serde_json::Value = serde_json::from_str(&text).unwrap();
        assert_eq!(json["ph_reference"]["measured_low"], serde_json::json!(7.0));
    }

    #[test]
    fn test_ph_file_without_reference_loads() {
        let cal: PhCalibration =
            serde_json::from_str(r#"{"ph_slope": 1.0, "ph_intercept": 0.5}"#).unwrap();
        assert_eq!(cal, PhCalibration::linear(1.0, 0.5));
    }

    #[test]
    fn test_failed_calibration_keeps_previous() {
        let dir = tempfile::tempdir().unwrap();
        let store = CalibrationStore::load(JsonStore::new(dir.path()));
        assert!(store.calibrate_ph(10.0, 7.0, 7.0, 7.0).is_err());
        assert_eq!(store.ph(), PhCalibration::default());
    }
}
