// SPDX-License-Identifier: PolyForm-Noncommercial-1.0.0
// Copyright (c) 2025 Sylvex. All rights reserved.

//! Level, volume and flow-rate derivation for the radar channel.

use serde::{Deserialize, Serialize};

use crate::calibration::FlowCalibration;

/// Vessel dimensions in mm.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct VesselGeometry {
    /// Inner width.
    pub width: f64,
    /// Inner length.
    pub length: f64,
    /// Level at 100 %.
    pub max_level: f64,
    /// Expected operating level.
    pub normal_level: f64,
}

impl Default for VesselGeometry {
    fn default() -> Self {
        Self {
            width: 2500.0,
            length: 4000.0,
            max_level: 1500.0,
            normal_level: 800.0,
        }
    }
}

impl VesselGeometry {
    /// Validates the geometry.
    pub fn validate(&self) -> Result<(), String> {
        if self.width <= 0.0 || self.length <= 0.0 {
            return Err("vessel width and length must be positive".to_string());
        }
        if self.max_level <= 0.0 {
            return Err("vessel max_level must be positive".to_string());
        }
        Ok(())
    }
}

/// Quantities derived from one radar air-gap reading.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct LevelReading {
    /// Measured distance from radar to surface, mm.
    pub air_gap: f64,
    /// Water level, mm. Negative when the surface is below the zero reference.
    pub level: f64,
    /// Stored volume, m³, never negative.
    pub volume_m3: f64,
    /// Fill percentage, 0..=100.
    pub percent: f64,
    /// Level relative to the normal operating level, mm.
    pub level_above_normal: f64,
    /// High-level alarm (≥ 90 % of max level).
    pub alarm: bool,
}

/// Derives level, volume and fill from an air gap.
pub fn derive_level(air_gap: f64, zero_reference: f64, geometry: &VesselGeometry) -> LevelReading {
    let level = zero_reference - air_gap;
    let volume_m3 = (level * geometry.width * geometry.length / 1e9).max(0.0);
    let percent = (level / geometry.max_level * 100.0).clamp(0.0, 100.0);
    LevelReading {
        air_gap,
        level,
        volume_m3,
        percent,
        level_above_normal: level - geometry.normal_level,
        alarm: level >= 0.9 * geometry.max_level,
    }
}

/// A flow rate in the units reported upstream.
#[derive(Debug, Clone, Copy, Default, PartialEq)]
pub struct FlowRates {
    /// Litres per second.
    pub l_s: f64,
    /// Litres per minute.
    pub l_min: f64,
    /// Litres per hour.
    pub l_h: f64,
    /// Cubic metres per minute.
    pub m3_min: f64,
}

impl FlowRates {
    /// Expands a rate in L/s.
    pub fn from_l_s(l_s: f64) -> Self {
        Self {
            l_s,
            l_min: l_s * 60.0,
            l_h: l_s * 3600.0,
            m3_min: l_s * 60.0 / 1000.0,
        }
    }

    /// Flow rates for `level` under `calibration`.
    pub fn for_level(level: f64, calibration: &FlowCalibration) -> Self {
        Self::from_l_s(calibration.flow_rate(level))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_gap_above_zero_reference() {
        let reading = derive_level(300.0, 250.0, &VesselGeometry::default());
        assert_eq!(reading.level, -50.0);
        assert_eq!(reading.volume_m3, 0.0);
        assert_eq!(reading.percent, 0.0);
        assert_eq!(reading.level_above_normal, -850.0);
        assert!(!reading.alarm);
    }

    #[test]
    fn test_full_vessel() {
        let geometry = VesselGeometry::default();
        let reading = derive_level(100.0, 1500.0, &geometry);
        assert_eq!(reading.level, 1400.0);
        // 1400 * 2500 * 4000 / 1e9
        assert!((reading.volume_m3 - 14.0).abs() < 1e-9);
        assert!(reading.alarm);

        let overfull = derive_level(0.0, 2000.0, &geometry);
        assert_eq!(overfull.percent, 100.0);
    }

    #[test]
    fn test_rate_conversions() {
        let rates = FlowRates::from_l_s(2.0);
        assert_eq!(rates.l_min, 120.0);
        assert_eq!(rates.l_h, 7200.0);
        assert_eq!(rates.m3_min, 0.12);
    }

    #[test]
    fn test_negative_level_has_no_flow() {
        let cal = FlowCalibration {
            zero_reference: 250.0,
            curve: crate::calibration::FlowCurve {
                coefficients: vec![3.0],
            },
        };
        assert_eq!(FlowRates::for_level(-50.0, &cal), FlowRates::default());
        assert_eq!(FlowRates::for_level(10.0, &cal).l_s, 3.0);
    }
}
