// SPDX-License-Identifier: PolyForm-Noncommercial-1.0.0
// Copyright (c) 2025 Sylvex. All rights reserved.

//! Electromagnetic flow meter.
//!
//! The meter drops requests that arrive too quickly after the previous one,
//! so registers are read in a fixed order with pauses in between. The
//! totalizer is split over two 16-bit registers and scaled by the configured
//! decimal point.

use std::time::Duration;

use async_trait::async_trait;
use h2o_modbus::{Bus, RegisterFormat};
use serde::{Deserialize, Serialize};
use tokio::time::sleep;

use super::{RegisterReader, Readings, SensorAdapter, SensorKind};
use crate::error::SensorError;

const REG_RATE: u16 = 0x0001;
const REG_VELOCITY: u16 = 0x0005;
const REG_TOTAL_LOW: u16 = 0x000A;
const REG_TOTAL_HIGH: u16 = 0x0011;
const REG_SUPPLY_TEMP: u16 = 0x0033;
const REG_RETURN_TEMP: u16 = 0x0035;
const REG_UNIT: u16 = 0x1438;
const REG_DECIMAL_POINT: u16 = 0x1439;

const UNSET: f64 = 65535.0;
const DEFAULT_DECIMAL_POINT: i32 = 3;

/// Pauses between flow meter register reads.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct FlowPacing {
    /// Before the first read.
    #[serde(with = "humantime_serde")]
    pub initial: Duration,
    /// After the totalizer low word.
    #[serde(with = "humantime_serde")]
    pub after_total_low: Duration,
    /// After the totalizer high word.
    #[serde(with = "humantime_serde")]
    pub after_total_high: Duration,
    /// After the unit register.
    #[serde(with = "humantime_serde")]
    pub after_unit: Duration,
    /// After the decimal point register.
    #[serde(with = "humantime_serde")]
    pub after_decimal_point: Duration,
}

impl Default for FlowPacing {
    fn default() -> Self {
        Self {
            initial: Duration::from_millis(300),
            after_total_low: Duration::from_millis(500),
            after_total_high: Duration::from_millis(500),
            after_unit: Duration::from_millis(300),
            after_decimal_point: Duration::from_millis(1000),
        }
    }
}

/// Unit label for the totalizer unit register.
pub fn unit_label(code: u16) -> &'static str {
    match code {
        1 => "L",
        2 => "GAL",
        3 => "CF",
        5 => "ft³",
        _ => "m³",
    }
}

/// Scales the raw totalizer words.
pub fn scaled_total(low: Option<f64>, high: Option<f64>, decimal_point: i32) -> f64 {
    match (low, high) {
        (Some(low), Some(high)) => {
            let raw = (u32::from(high as u16) << 16) | u32::from(low as u16);
            f64::from(raw) * 10f64.powi(decimal_point - 3)
        }
        _ => 0.0,
    }
}

/// Reads rate and totalizer from the meter.
pub struct FlowAdapter {
    id: String,
    device: u8,
    pacing: FlowPacing,
}

impl FlowAdapter {
    /// Creates the adapter.
    pub fn new(id: impl Into<String>, device: u8, pacing: FlowPacing) -> Self {
        Self {
            id: id.into(),
            device,
            pacing,
        }
    }
}

#[async_trait]
impl SensorAdapter for FlowAdapter {
    fn kind(&self) -> SensorKind {
        SensorKind::Flow
    }

    fn id(&self) -> &str {
        &self.id
    }

    fn device_id(&self) -> u8 {
        self.device
    }

    async fn read(&self, bus: &Bus) -> Result<Readings, SensorError> {
        let mut reader = RegisterReader::new(bus, &self.id, self.device);

        sleep(self.pacing.initial).await;
        let low = reader.optional("total_low", REG_TOTAL_LOW, RegisterFormat::U16).await;
        sleep(self.pacing.after_total_low).await;
        let high = reader.optional("total_high", REG_TOTAL_HIGH, RegisterFormat::U16).await;
        sleep(self.pacing.after_total_high).await;
        let unit = reader.optional("unit", REG_UNIT, RegisterFormat::U16).await;
        sleep(self.pacing.after_unit).await;
        let decimal_point = reader
            .optional("decimal_point", REG_DECIMAL_POINT, RegisterFormat::U16)
            .await;
        sleep(self.pacing.after_decimal_point).await;

        let rate = reader.required("flow_rate", REG_RATE, RegisterFormat::Float32).await?;

        let velocity = reader
            .optional("velocity", REG_VELOCITY, RegisterFormat::Float32)
            .await
            .unwrap_or(0.0);
        let supply = reader
            .optional("supply_temperature", REG_SUPPLY_TEMP, RegisterFormat::Float32)
            .await
            .unwrap_or(0.0);
        let ret = reader
            .optional("return_temperature", REG_RETURN_TEMP, RegisterFormat::Float32)
            .await
            .unwrap_or(0.0);

        let unit = unit.filter(|u| *u != UNSET).map_or(0, |u| u as u16);
        let decimal_point = decimal_point
            .filter(|d| *d != UNSET)
            .map_or(DEFAULT_DECIMAL_POINT, |d| d as i32);
        let total = scaled_total(low, high, decimal_point);

        tracing::debug!(
            sensor_id = %self.id,
            rate,
            total,
            unit,
            decimal_point,
            velocity,
            supply_temperature = supply,
            return_temperature = ret,
            "Flow meter read"
        );

        let mut readings = Readings::new();
        readings
            .insert("flow_rate", rate)
            .insert("total_flow", total)
            .insert("total_flow_unit", unit_label(unit));
        Ok(reader.finish(readings))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::sensor::Measurement;
    use h2o_modbus::mock::{Reply, ScriptedLine};
    use h2o_modbus::SerialConfig;

    fn bus(line: &ScriptedLine) -> Bus {
        Bus::open_with(line.clone(), &SerialConfig::default())
    }

    #[test]
    fn test_total_scaling() {
        assert_eq!(scaled_total(Some(0x0010 as f64), Some(1.0), 3), 65552.0);
        assert_eq!(scaled_total(Some(1500.0), Some(0.0), 2), 150.0);
        assert_eq!(scaled_total(None, Some(1.0), 3), 0.0);
    }

    #[test]
    fn test_unit_labels() {
        assert_eq!(unit_label(0), "m³");
        assert_eq!(unit_label(1), "L");
        assert_eq!(unit_label(5), "ft³");
        assert_eq!(unit_label(4), "m³");
    }

    #[tokio::test(start_paused = true)]
    async fn test_register_order_and_defaults() {
        let line = ScriptedLine::new();
        line.push_u16(0x2A, 1000)
            .push_u16(0x2A, 0)
            .push_u16(0x2A, 0xFFFF)
            .push(0x2A, Reply::Silence)
            .push_float(0x2A, 12.5);
        let bus = bus(&line);
        bus.acquire().await.add_device(0x2A);

        let adapter = FlowAdapter::new("flow_1", 0x2A, FlowPacing::default());
        let readings = adapter.read(&bus).await.unwrap();

        assert_eq!(readings.number("flow_rate"), Some(12.5));
        assert_eq!(readings.number("total_flow"), Some(1000.0));
        assert_eq!(
            readings.get("total_flow_unit"),
            Some(&Measurement::from("m³"))
        );
        assert_eq!(
            line.registers_requested(0x2A),
            vec![0x000A, 0x0011, 0x1438, 0x1439, 0x0001, 0x0005, 0x0033, 0x0035]
        );
    }

    #[tokio::test(start_paused = true)]
    async fn test_pacing_before_rate() {
        let line = ScriptedLine::new();
        for v in [1u16, 0, 1, 3] {
            line.push_u16(0x2A, v);
        }
        line.push_float(0x2A, 1.0);
        let bus = bus(&line);
        bus.acquire().await.add_device(0x2A);

        let start = tokio::time::Instant::now();
        FlowAdapter::new("flow_1", 0x2A, FlowPacing::default())
            .read(&bus)
            .await
            .unwrap();

        let times = line.write_times();
        assert!(times[0] - start >= Duration::from_millis(300));
        assert!(times[4] - times[3] >= Duration::from_millis(1000));
    }

    #[tokio::test(start_paused = true)]
    async fn test_rate_is_mandatory() {
        let line = ScriptedLine::new();
        line.set_fallback(0x2A, Reply::Silence);
        let bus = bus(&line);
        bus.acquire().await.add_device(0x2A);

        let err = FlowAdapter::new("flow_1", 0x2A, FlowPacing::default())
            .read(&bus)
            .await
            .unwrap_err();
        assert!(matches!(err, SensorError::Register { register: REG_RATE, .. }));
    }
}
