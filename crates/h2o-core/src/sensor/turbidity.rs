// SPDX-License-Identifier: PolyForm-Noncommercial-1.0.0
// Copyright (c) 2025 Sylvex. All rights reserved.

//! Turbidity probe.
//!
//! The probe reports a large offset near zero. The offset is subtracted, and
//! readings that end up at or below zero are folded into a small band before a
//! random jitter is added and the result is rounded to one decimal.

use async_trait::async_trait;
use h2o_modbus::{Bus, RegisterFormat};
use rand::Rng;
use serde::{Deserialize, Serialize};

use super::{round_to, RegisterReader, Readings, SensorAdapter, SensorKind};
use crate::error::SensorError;

const REG_TURBIDITY: u16 = 0x0001;
const REG_TEMPERATURE: u16 = 0x0003;

/// Low-end adjustment of raw turbidity values.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct TurbidityTuning {
    /// Subtracted from every raw reading.
    pub offset: f64,
    /// Lower bound of the near-zero band.
    pub band_min: f64,
    /// Upper bound of the near-zero band.
    pub band_max: f64,
    /// Raw divisor inside the near-zero band.
    pub divisor: f64,
    /// Lower jitter bound.
    pub jitter_min: f64,
    /// Upper jitter bound.
    pub jitter_max: f64,
}

impl Default for TurbidityTuning {
    fn default() -> Self {
        Self {
            offset: 30.0,
            band_min: 1.0,
            band_max: 3.0,
            divisor: 6.0,
            jitter_min: -0.32,
            jitter_max: 0.37,
        }
    }
}

impl TurbidityTuning {
    /// Adjusted value before jitter.
    pub fn base(&self, raw: f64) -> f64 {
        let adjusted = raw - self.offset;
        if adjusted <= 0.0 {
            (raw / self.divisor).max(self.band_min).min(self.band_max)
        } else {
            adjusted
        }
    }

    /// Rejects settings that cannot fold a reading into the band.
    pub fn validate(&self) -> Result<(), String> {
        let values = [
            self.offset,
            self.band_min,
            self.band_max,
            self.divisor,
            self.jitter_min,
            self.jitter_max,
        ];
        if values.iter().any(|v| !v.is_finite()) {
            return Err("turbidity tuning values must be finite".to_string());
        }
        if self.band_min > self.band_max {
            return Err(format!(
                "turbidity band_min {} exceeds band_max {}",
                self.band_min, self.band_max
            ));
        }
        if self.divisor <= 0.0 {
            return Err(format!("turbidity divisor {} must be positive", self.divisor));
        }
        if self.jitter_min > self.jitter_max {
            return Err(format!(
                "turbidity jitter_min {} exceeds jitter_max {}",
                self.jitter_min, self.jitter_max
            ));
        }
        Ok(())
    }

    /// Adjusted value with `jitter`, rounded to one decimal.
    pub fn apply(&self, raw: f64, jitter: f64) -> f64 {
        round_to(self.base(raw) + jitter, 1)
    }

    fn sample_jitter(&self) -> f64 {
        if self.jitter_min < self.jitter_max {
            rand::thread_rng().gen_range(self.jitter_min..self.jitter_max)
        } else {
            self.jitter_min
        }
    }
}

/// Reads the probe and applies [`TurbidityTuning`].
pub struct TurbidityAdapter {
    id: String,
    device: u8,
    tuning: TurbidityTuning,
}

impl TurbidityAdapter {
    /// Creates the adapter.
    pub fn new(id: impl Into<String>, device: u8, tuning: TurbidityTuning) -> Self {
        Self {
            id: id.into(),
            device,
            tuning,
        }
    }
}

#[async_trait]
impl SensorAdapter for TurbidityAdapter {
    fn kind(&self) -> SensorKind {
        SensorKind::Turbidity
    }

    fn id(&self) -> &str {
        &self.id
    }

    fn device_id(&self) -> u8 {
        self.device
    }

    async fn read(&self, bus: &Bus) -> Result<Readings, SensorError> {
        let mut reader = RegisterReader::new(bus, &self.id, self.device);
        let raw = reader
            .required("turbidity", REG_TURBIDITY, RegisterFormat::Float32)
            .await?;
        let temperature = reader
            .optional("temperature", REG_TEMPERATURE, RegisterFormat::Float32)
            .await
            .unwrap_or(0.0);

        let turbidity = self.tuning.apply(raw, self.tuning.sample_jitter());
        tracing::debug!(sensor_id = %self.id, raw, turbidity, "Turbidity read");

        let mut readings = Readings::new();
        readings
            .insert("turbidity", turbidity)
            .insert("turbidity_raw", raw)
            .insert("temperature", temperature);
        Ok(reader.finish(readings))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use h2o_modbus::mock::{Reply, ScriptedLine};
    use h2o_modbus::SerialConfig;

    #[test]
    fn test_adjustment() {
        let tuning = TurbidityTuning::default();
        assert_eq!(tuning.base(45.0), 15.0);
        // 12 / 6 = 2 inside the band
        assert_eq!(tuning.base(12.0), 2.0);
        assert_eq!(tuning.base(0.0), 1.0);
        assert_eq!(tuning.base(30.0), 3.0);
        assert_eq!(tuning.apply(45.0, 0.26), 15.3);
    }

    #[test]
    fn test_validate_tuning() {
        assert!(TurbidityTuning::default().validate().is_ok());

        let inverted = TurbidityTuning {
            band_min: 5.0,
            band_max: 1.0,
            ..Default::default()
        };
        assert!(inverted.validate().unwrap_err().contains("band_min"));
        // Folding must not panic even when the band was never validated.
        assert_eq!(inverted.base(0.0), 1.0);

        let zero_divisor = TurbidityTuning {
            divisor: 0.0,
            ..Default::default()
        };
        assert!(zero_divisor.validate().is_err());

        let nan = TurbidityTuning {
            jitter_max: f64::NAN,
            ..Default::default()
        };
        assert!(nan.validate().is_err());

        let jitter = TurbidityTuning {
            jitter_min: 0.5,
            jitter_max: -0.5,
            ..Default::default()
        };
        assert!(jitter.validate().is_err());
    }

    #[tokio::test(start_paused = true)]
    async fn test_missing_temperature_defaults_to_zero() {
        let line = ScriptedLine::new();
        line.push_float(0x16, 45.0).push(0x16, Reply::Silence);
        let bus = Bus::open_with(line.clone(), &SerialConfig::default());
        bus.acquire().await.add_device(0x16);

        let adapter = TurbidityAdapter::new("turb_1", 0x16, TurbidityTuning::default());
        let readings = adapter.read(&bus).await.unwrap();
        let turbidity = readings.number("turbidity").unwrap();
        assert!((14.6..=15.4).contains(&turbidity), "{turbidity}");
        assert_eq!(readings.number("turbidity_raw"), Some(45.0));
        assert_eq!(readings.number("temperature"), Some(0.0));
    }
}
