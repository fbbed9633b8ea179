// SPDX-License-Identifier: PolyForm-Noncommercial-1.0.0
// Copyright (c) 2025 Sylvex. All rights reserved.

//! pH probe.

use std::sync::Arc;

use async_trait::async_trait;
use h2o_modbus::{Bus, RegisterFormat};

use super::{RegisterReader, Readings, SensorAdapter, SensorKind};
use crate::calibration::CalibrationStore;
use crate::error::SensorError;

const REG_PH: u16 = 0x0001;
const REG_TEMPERATURE: u16 = 0x0003;

/// Reads the probe and applies the pH calibration.
pub struct PhAdapter {
    id: String,
    device: u8,
    calibration: Arc<CalibrationStore>,
}

impl PhAdapter {
    /// Creates the adapter.
    pub fn new(id: impl Into<String>, device: u8, calibration: Arc<CalibrationStore>) -> Self {
        Self {
            id: id.into(),
            device,
            calibration,
        }
    }
}

#[async_trait]
impl SensorAdapter for PhAdapter {
    fn kind(&self) -> SensorKind {
        SensorKind::Ph
    }

    fn id(&self) -> &str {
        &self.id
    }

    fn device_id(&self) -> u8 {
        self.device
    }

    async fn read(&self, bus: &Bus) -> Result<Readings, SensorError> {
        let mut reader = RegisterReader::new(bus, &self.id, self.device);
        let raw = reader.required("ph_value", REG_PH, RegisterFormat::Float32).await?;
        let temperature = reader
            .required("temperature", REG_TEMPERATURE, RegisterFormat::Float32)
            .await?;

        let ph = self.calibration.ph().correct(raw);
        tracing::debug!(sensor_id = %self.id, raw, ph, temperature, "pH read");

        let mut readings = Readings::new();
        readings
            .insert("ph_value", ph)
            .insert("ph_raw", raw)
            .insert("temperature", temperature);
        Ok(reader.finish(readings))
    }
}
