// SPDX-License-Identifier: PolyForm-Noncommercial-1.0.0
// Copyright (c) 2025 Sylvex. All rights reserved.

//! Sensor adapters.
//!
//! An adapter knows the register map of one instrument type. It issues its
//! reads through the shared [`Bus`] and turns the raw values into named
//! [`Readings`]. A failed mandatory read aborts the cycle with
//! [`SensorError`]; a failed optional read falls back to a default.
//!
//! | kind        | registers                                   |
//! |-------------|---------------------------------------------|
//! | `ph`        | 0x0001 pH (f32), 0x0003 temperature (f32)   |
//! | `turbidity` | 0x0001 turbidity (f32), 0x0003 temp (f32)   |
//! | `flow`      | 0x000A/0x0011 totalizer, 0x1438/0x1439 unit/decimals, 0x0001 rate |
//! | `radar`     | 0x0001 air gap (u16)                        |

mod flow;
mod ph;
mod radar;
mod turbidity;

pub use flow::{FlowAdapter, FlowPacing};
pub use ph::PhAdapter;
pub use radar::{RadarAdapter, FLOW_RATE_L_MIN};
pub use turbidity::{TurbidityAdapter, TurbidityTuning};

use std::collections::BTreeMap;
use std::fmt;
use std::str::FromStr;
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use h2o_modbus::{Bus, RegisterFormat};
use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::calibration::CalibrationStore;
use crate::error::SensorError;
use crate::flow::VesselGeometry;

// =============================================================================
// SensorKind
// =============================================================================

/// Supported instrument types.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SensorKind {
    /// pH probe.
    Ph,
    /// Turbidity probe.
    Turbidity,
    /// Electromagnetic flow meter.
    Flow,
    /// Radar level gauge.
    Radar,
}

impl SensorKind {
    /// All kinds.
    pub const ALL: [Self; 4] = [Self::Ph, Self::Turbidity, Self::Flow, Self::Radar];

    /// Config name.
    pub const fn as_str(&self) -> &'static str {
        match self {
            Self::Ph => "ph",
            Self::Turbidity => "turbidity",
            Self::Flow => "flow",
            Self::Radar => "radar",
        }
    }
}

impl fmt::Display for SensorKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for SensorKind {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "ph" => Ok(Self::Ph),
            "turbidity" => Ok(Self::Turbidity),
            "flow" => Ok(Self::Flow),
            "radar" => Ok(Self::Radar),
            other => Err(format!("unknown sensor type '{other}'")),
        }
    }
}

// =============================================================================
// SensorConfig
// =============================================================================

/// Telemetry layouts a sensor can publish.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TransmissionFormat {
    /// `{id}_{measurement}: value` pairs.
    Simple,
    /// One `{id}_data` object with info, metadata and measurements.
    Json,
}

fn default_poll_interval() -> Duration {
    Duration::from_secs(15)
}

fn default_formats() -> Vec<TransmissionFormat> {
    vec![TransmissionFormat::Simple]
}

/// One configured instrument.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SensorConfig {
    /// Unique sensor id, used as the telemetry key prefix.
    pub id: String,

    /// Instrument type name; unknown names are skipped at startup.
    #[serde(rename = "type")]
    pub sensor_type: String,

    /// Bus address.
    pub device_id: u8,

    /// Display name.
    #[serde(default)]
    pub name: String,

    /// Installation location.
    #[serde(default)]
    pub location: String,

    /// Minimum time between successful reads.
    #[serde(default = "default_poll_interval", with = "humantime_serde")]
    pub poll_interval: Duration,

    /// Long-cable installation. When unset, turbidity probes at address 2 or
    /// 22 and flow meters at 42 and above are treated as long-cable.
    #[serde(default)]
    pub long_cable: Option<bool>,

    /// Telemetry layouts.
    #[serde(default = "default_formats")]
    pub formats: Vec<TransmissionFormat>,

    /// Free-form metadata forwarded in the JSON layout.
    #[serde(default)]
    pub metadata: BTreeMap<String, Value>,

    /// Vessel geometry (radar only).
    #[serde(default)]
    pub geometry: Option<VesselGeometry>,
}

impl SensorConfig {
    /// Creates a config with defaults for the optional fields.
    pub fn new(id: impl Into<String>, kind: SensorKind, device_id: u8) -> Self {
        Self {
            id: id.into(),
            sensor_type: kind.as_str().to_string(),
            device_id,
            name: String::new(),
            location: String::new(),
            poll_interval: default_poll_interval(),
            long_cable: None,
            formats: default_formats(),
            metadata: BTreeMap::new(),
            geometry: None,
        }
    }

    /// Parsed instrument type.
    pub fn kind(&self) -> Option<SensorKind> {
        self.sensor_type.parse().ok()
    }

    /// Whether this sensor uses the long-cable pacing and retry.
    pub fn is_long_cable(&self) -> bool {
        self.long_cable.unwrap_or_else(|| match self.kind() {
            Some(SensorKind::Turbidity) => matches!(self.device_id, 2 | 22),
            Some(SensorKind::Flow) => self.device_id >= 42,
            _ => false,
        })
    }

    /// Vessel geometry, falling back to the default.
    pub fn geometry(&self) -> VesselGeometry {
        self.geometry.unwrap_or_default()
    }

    /// Validates the entry.
    pub fn validate(&self) -> Result<(), String> {
        if self.id.trim().is_empty() {
            return Err("sensor id must not be empty".to_string());
        }
        if self.device_id == 0 || self.device_id > 247 {
            return Err(format!(
                "sensor '{}': device_id {} is outside 1..=247",
                self.id, self.device_id
            ));
        }
        if self.poll_interval.is_zero() {
            return Err(format!("sensor '{}': poll_interval must be non-zero", self.id));
        }
        if self.formats.is_empty() {
            return Err(format!("sensor '{}': at least one format is required", self.id));
        }
        if let Some(geometry) = &self.geometry {
            geometry
                .validate()
                .map_err(|e| format!("sensor '{}': {e}", self.id))?;
        }
        Ok(())
    }
}

/// Tunables shared by all adapters of a kind.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct AdapterSettings {
    /// Flow meter inter-register pauses.
    pub flow: FlowPacing,
    /// Turbidity low-end adjustment.
    pub turbidity: TurbidityTuning,
}

impl AdapterSettings {
    /// Checks the tunables that shape readings.
    pub fn validate(&self) -> Result<(), String> {
        self.turbidity.validate()
    }
}

// =============================================================================
// Readings
// =============================================================================

/// One measured or derived value.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(untagged)]
pub enum Measurement {
    /// Numeric value.
    Number(f64),
    /// Text value (units).
    Text(String),
    /// Boolean value (alarms).
    Flag(bool),
}

impl Measurement {
    /// Numeric value, if any.
    pub fn as_f64(&self) -> Option<f64> {
        match self {
            Self::Number(v) => Some(*v),
            _ => None,
        }
    }
}

impl From<f64> for Measurement {
    fn from(v: f64) -> Self {
        Self::Number(v)
    }
}

impl From<bool> for Measurement {
    fn from(v: bool) -> Self {
        Self::Flag(v)
    }
}

impl From<&str> for Measurement {
    fn from(v: &str) -> Self {
        Self::Text(v.to_string())
    }
}

impl From<String> for Measurement {
    fn from(v: String) -> Self {
        Self::Text(v)
    }
}

impl From<&Measurement> for Value {
    fn from(m: &Measurement) -> Self {
        match m {
            Measurement::Number(v) => Value::from(*v),
            Measurement::Text(s) => Value::from(s.as_str()),
            Measurement::Flag(b) => Value::from(*b),
        }
    }
}

/// Named values from one adapter cycle.
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct Readings {
    values: BTreeMap<String, Measurement>,
    #[serde(skip)]
    degraded: bool,
}

impl Readings {
    /// Creates an empty set.
    pub fn new() -> Self {
        Self::default()
    }

    /// Adds or replaces a value.
    pub fn insert(&mut self, key: impl Into<String>, value: impl Into<Measurement>) -> &mut Self {
        self.values.insert(key.into(), value.into());
        self
    }

    /// Returns a value.
    pub fn get(&self, key: &str) -> Option<&Measurement> {
        self.values.get(key)
    }

    /// Returns a numeric value.
    pub fn number(&self, key: &str) -> Option<f64> {
        self.get(key).and_then(Measurement::as_f64)
    }

    /// Iterates over the values in key order.
    pub fn iter(&self) -> impl Iterator<Item = (&String, &Measurement)> {
        self.values.iter()
    }

    /// Number of values.
    pub fn len(&self) -> usize {
        self.values.len()
    }

    /// Returns `true` if there are no values.
    pub fn is_empty(&self) -> bool {
        self.values.is_empty()
    }

    /// Returns `true` if a mandatory value came from the fallback cache.
    pub fn is_degraded(&self) -> bool {
        self.degraded
    }

    /// Marks the readings as degraded.
    pub fn mark_degraded(&mut self) {
        self.degraded = true;
    }

    /// Values as a JSON object.
    pub fn to_json(&self) -> Value {
        Value::Object(self.values.iter().map(|(k, v)| (k.clone(), v.into())).collect())
    }
}

/// Rounds to `decimals` places.
pub(crate) fn round_to(value: f64, decimals: i32) -> f64 {
    let factor = 10f64.powi(decimals);
    (value * factor).round() / factor
}

// =============================================================================
// SensorAdapter
// =============================================================================

/// Reads one instrument.
#[async_trait]
pub trait SensorAdapter: Send + Sync {
    /// Instrument type.
    fn kind(&self) -> SensorKind;

    /// Sensor id.
    fn id(&self) -> &str;

    /// Bus address.
    fn device_id(&self) -> u8;

    /// Runs one read cycle.
    async fn read(&self, bus: &Bus) -> Result<Readings, SensorError>;
}

/// Builds the adapter for `config`, or `None` for an unknown type.
pub fn build_adapter(
    config: &SensorConfig,
    settings: &AdapterSettings,
    calibration: Arc<CalibrationStore>,
) -> Option<Arc<dyn SensorAdapter>> {
    let Some(kind) = config.kind() else {
        tracing::warn!(
            sensor_id = %config.id,
            sensor_type = %config.sensor_type,
            "Unknown sensor type, skipping"
        );
        return None;
    };

    let id = config.id.clone();
    let device = config.device_id;
    let adapter: Arc<dyn SensorAdapter> = match kind {
        SensorKind::Ph => Arc::new(PhAdapter::new(id, device, calibration)),
        SensorKind::Turbidity => {
            Arc::new(TurbidityAdapter::new(id, device, settings.turbidity.clone()))
        }
        SensorKind::Flow => Arc::new(FlowAdapter::new(id, device, settings.flow.clone())),
        SensorKind::Radar => {
            Arc::new(RadarAdapter::new(id, device, config.geometry(), calibration))
        }
    };
    Some(adapter)
}

// =============================================================================
// RegisterReader
// =============================================================================

/// Register access for one adapter cycle.
pub(crate) struct RegisterReader<'a> {
    bus: &'a Bus,
    sensor_id: &'a str,
    device: u8,
    degraded: bool,
}

impl<'a> RegisterReader<'a> {
    pub(crate) fn new(bus: &'a Bus, sensor_id: &'a str, device: u8) -> Self {
        Self {
            bus,
            sensor_id,
            device,
            degraded: false,
        }
    }

    /// Reads a register the cycle cannot do without.
    pub(crate) async fn required(
        &mut self,
        quantity: &'static str,
        register: u16,
        format: RegisterFormat,
    ) -> Result<f64, SensorError> {
        match self.bus.read(self.device, register, format).await {
            Ok(read) => {
                self.degraded |= read.is_degraded();
                Ok(read.value)
            }
            Err(e) => Err(SensorError::register(self.sensor_id, quantity, register, e)),
        }
    }

    /// Reads a secondary register; failures yield `None`.
    pub(crate) async fn optional(
        &mut self,
        quantity: &'static str,
        register: u16,
        format: RegisterFormat,
    ) -> Option<f64> {
        match self.bus.read(self.device, register, format).await {
            Ok(read) => Some(read.value),
            Err(e) => {
                tracing::debug!(
                    sensor_id = %self.sensor_id,
                    quantity,
                    register,
                    error = %e,
                    "Optional register unavailable"
                );
                None
            }
        }
    }

    /// Wraps up the cycle.
    pub(crate) fn finish(self, mut readings: Readings) -> Readings {
        if self.degraded {
            readings.mark_degraded();
        }
        readings
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_kind_parsing() {
        assert_eq!("pH".parse::<SensorKind>().unwrap(), SensorKind::Ph);
        assert!("gps".parse::<SensorKind>().is_err());
    }

    #[test]
    fn test_sensor_config_defaults() {
        let config: SensorConfig = serde_json::from_value(serde_json::json!({
            "id": "turb_1",
            "type": "turbidity",
            "device_id": 22
        }))
        .unwrap();
        assert_eq!(config.poll_interval, Duration::from_secs(15));
        assert_eq!(config.formats, vec![TransmissionFormat::Simple]);
        assert!(config.is_long_cable());
        assert!(config.validate().is_ok());

        let mut flow = SensorConfig::new("flow_1", SensorKind::Flow, 0x2A);
        assert!(flow.is_long_cable());
        flow.long_cable = Some(false);
        assert!(!flow.is_long_cable());
    }

    #[test]
    fn test_sensor_config_validation() {
        let config = SensorConfig::new("ph", SensorKind::Ph, 0);
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_readings_json() {
        let mut readings = Readings::new();
        readings
            .insert("level", 12.5)
            .insert("alarm", false)
            .insert("unit", "m³");
        assert_eq!(
            readings.to_json(),
            serde_json::json!({"level": 12.5, "alarm": false, "unit": "m³"})
        );
        assert_eq!(readings.number("level"), Some(12.5));
        assert_eq!(readings.number("unit"), None);
    }

    #[test]
    fn test_unknown_type_is_skipped() {
        let dir = tempfile::tempdir().unwrap();
        let calibration = Arc::new(CalibrationStore::load(crate::persist::JsonStore::new(
            dir.path(),
        )));
        let mut config = SensorConfig::new("gps", SensorKind::Ph, 5);
        config.sensor_type = "gps".to_string();
        assert!(build_adapter(&config, &AdapterSettings::default(), calibration).is_none());
    }

    #[test]
    fn test_round_to() {
        assert_eq!(round_to(1.26, 1), 1.3);
        assert_eq!(round_to(2.0004, 3), 2.0);
    }
}
