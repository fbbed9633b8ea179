// SPDX-License-Identifier: PolyForm-Noncommercial-1.0.0
// Copyright (c) 2025 Sylvex. All rights reserved.

//! Radar level gauge.

use std::sync::Arc;

use async_trait::async_trait;
use h2o_modbus::{Bus, RegisterFormat};

use super::{round_to, RegisterReader, Readings, SensorAdapter, SensorKind};
use crate::calibration::CalibrationStore;
use crate::error::SensorError;
use crate::flow::{derive_level, FlowRates, VesselGeometry};

const REG_AIR_GAP: u16 = 0x0001;

/// Key of the derived flow rate in L/min.
pub const FLOW_RATE_L_MIN: &str = "flow_rate_l_min";

/// Reads the air gap and derives level, volume and flow.
pub struct RadarAdapter {
    id: String,
    device: u8,
    geometry: VesselGeometry,
    calibration: Arc<CalibrationStore>,
}

impl RadarAdapter {
    /// Creates the adapter.
    pub fn new(
        id: impl Into<String>,
        device: u8,
        geometry: VesselGeometry,
        calibration: Arc<CalibrationStore>,
    ) -> Self {
        Self {
            id: id.into(),
            device,
            geometry,
            calibration,
        }
    }
}

#[async_trait]
impl SensorAdapter for RadarAdapter {
    fn kind(&self) -> SensorKind {
        SensorKind::Radar
    }

    fn id(&self) -> &str {
        &self.id
    }

    fn device_id(&self) -> u8 {
        self.device
    }

    async fn read(&self, bus: &Bus) -> Result<Readings, SensorError> {
        let mut reader = RegisterReader::new(bus, &self.id, self.device);
        let gap = reader.required("air_gap", REG_AIR_GAP, RegisterFormat::U16).await?;

        let calibration = self.calibration.flow();
        let level = derive_level(gap, calibration.zero_reference, &self.geometry);
        let rates = FlowRates::for_level(level.level, &calibration);

        tracing::debug!(
            sensor_id = %self.id,
            air_gap = gap,
            level = level.level,
            volume_m3 = level.volume_m3,
            flow_l_s = rates.l_s,
            "Radar read"
        );

        let mut readings = Readings::new();
        readings
            .insert("measured_air_distance", gap)
            .insert("actual_water_level", level.level)
            .insert("actual_volume", round_to(level.volume_m3, 3))
            .insert("volume_percentage", round_to(level.percent, 1))
            .insert("level_above_normal", level.level_above_normal)
            .insert("water_level_alarm", level.alarm)
            .insert("flow_rate_l_s", rates.l_s)
            .insert(FLOW_RATE_L_MIN, rates.l_min)
            .insert("flow_rate_l_h", rates.l_h)
            .insert("flow_rate_m3_min", rates.m3_min);
        Ok(reader.finish(readings))
    }
}
