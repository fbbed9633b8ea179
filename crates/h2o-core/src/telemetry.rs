// SPDX-License-Identifier: PolyForm-Noncommercial-1.0.0
// Copyright (c) 2025 Sylvex. All rights reserved.

//! Telemetry payloads and sinks.
//!
//! # Payload Layouts
//!
//! ```text
//! Flat:    { "ph_1_ph_value": 7.02, "ph_1_temperature": 21.4 }
//! Nested:  { "ph_1_data": { "info": {...}, "metadata": {...},
//!                           "measurements": {...}, "timestamp": 1700000000000,
//!                           "status": "active" | "degraded" } }
//! ```
//!
//! Delivery is best effort. [`RetryingSink`] retries a fixed number of times
//! and then gives up; callers log and drop the payload.

use std::collections::BTreeMap;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use parking_lot::RwLock;
use serde::{Deserialize, Serialize};
use serde_json::{json, Map, Value};
use tokio::io::AsyncWriteExt;

use crate::error::TelemetryError;
use crate::sensor::{Readings, SensorConfig, TransmissionFormat};

// =============================================================================
// Payload
// =============================================================================

/// One telemetry message.
#[derive(Debug, Clone, PartialEq)]
pub enum Payload {
    /// Flat key/value pairs.
    Flat(BTreeMap<String, Value>),
    /// One object per sensor, keyed `{id}_data`.
    Nested(BTreeMap<String, Value>),
}

impl Payload {
    /// JSON body.
    pub fn to_json(&self) -> Value {
        let (Self::Flat(map) | Self::Nested(map)) = self;
        Value::Object(map.iter().map(|(k, v)| (k.clone(), v.clone())).collect())
    }

    /// Top-level keys.
    pub fn keys(&self) -> impl Iterator<Item = &String> {
        let (Self::Flat(map) | Self::Nested(map)) = self;
        map.keys()
    }

    /// Layout name.
    pub fn layout(&self) -> &'static str {
        match self {
            Self::Flat(_) => "flat",
            Self::Nested(_) => "nested",
        }
    }
}

/// Current time in milliseconds since the Unix epoch.
pub fn timestamp_ms() -> i64 {
    chrono::Utc::now().timestamp_millis()
}

/// `{id}_{measurement}` pairs for `readings`.
pub fn flat_values(sensor_id: &str, readings: &Readings) -> BTreeMap<String, Value> {
    readings
        .iter()
        .map(|(k, v)| (format!("{sensor_id}_{k}"), Value::from(v)))
        .collect()
}

/// Builds one payload per configured format.
pub fn format_readings(config: &SensorConfig, readings: &Readings, timestamp: i64) -> Vec<Payload> {
    config
        .formats
        .iter()
        .map(|format| match format {
            TransmissionFormat::Simple => Payload::Flat(flat_values(&config.id, readings)),
            TransmissionFormat::Json => {
                let metadata: Map<String, Value> = config
                    .metadata
                    .iter()
                    .map(|(k, v)| (k.clone(), v.clone()))
                    .collect();
                let body = json!({
                    "info": {
                        "name": config.name,
                        "location": config.location,
                        "type": config.sensor_type,
                        "device_id": config.device_id,
                    },
                    "metadata": metadata,
                    "measurements": readings.to_json(),
                    "timestamp": timestamp,
                    "status": if readings.is_degraded() { "degraded" } else { "active" },
                });
                Payload::Nested(BTreeMap::from([(format!("{}_data", config.id), body)]))
            }
        })
        .collect()
}

/// Error status for a failed read.
pub fn error_payload(sensor_id: &str, error: &str, error_count: u32) -> Payload {
    Payload::Flat(BTreeMap::from([
        (format!("{sensor_id}_error"), Value::from(error)),
        (format!("{sensor_id}_error_count"), Value::from(error_count)),
    ]))
}

// =============================================================================
// TelemetrySink
// =============================================================================

/// Upstream telemetry consumer.
#[async_trait]
pub trait TelemetrySink: Send + Sync {
    /// Sink name for logs.
    fn name(&self) -> &str;

    /// Delivers one payload.
    async fn send(&self, payload: &Payload) -> Result<(), TelemetryError>;
}

/// Emits payloads as tracing events.
#[derive(Debug, Default, Clone)]
pub struct LogSink;

#[async_trait]
impl TelemetrySink for LogSink {
    fn name(&self) -> &str {
        "log"
    }

    async fn send(&self, payload: &Payload) -> Result<(), TelemetryError> {
        tracing::info!(
            target: "h2o::telemetry",
            layout = payload.layout(),
            payload = %payload.to_json(),
            "telemetry"
        );
        Ok(())
    }
}

/// Appends payloads to a newline-delimited JSON file.
#[derive(Debug)]
pub struct JsonLinesSink {
    path: PathBuf,
    lock: tokio::sync::Mutex<()>,
}

impl JsonLinesSink {
    /// Creates the sink. The file is created on first write.
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self {
            path: path.into(),
            lock: tokio::sync::Mutex::new(()),
        }
    }

    /// Output file.
    pub fn path(&self) -> &Path {
        &self.path
    }
}

#[async_trait]
impl TelemetrySink for JsonLinesSink {
    fn name(&self) -> &str {
        "json_lines"
    }

    async fn send(&self, payload: &Payload) -> Result<(), TelemetryError> {
        let mut line = payload.to_json().to_string();
        line.push('\n');

        let _guard = self.lock.lock().await;
        let mut file = tokio::fs::OpenOptions::new()
            .create(true)
            .append(true)
            .open(&self.path)
            .await
            .map_err(|e| TelemetryError::send(self.name(), e.to_string()))?;
        file.write_all(line.as_bytes())
            .await
            .map_err(|e| TelemetryError::send(self.name(), e.to_string()))?;
        file.flush()
            .await
            .map_err(|e| TelemetryError::send(self.name(), e.to_string()))
    }
}

// =============================================================================
// RetryingSink
// =============================================================================

/// Fixed-delay delivery retry.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct RetryPolicy {
    /// Total attempts per payload.
    pub max_attempts: u32,

    /// Pause between attempts.
    #[serde(with = "humantime_serde")]
    pub delay: Duration,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            max_attempts: 3,
            delay: Duration::from_secs(1),
        }
    }
}

/// Retries the inner sink with a fixed delay.
pub struct RetryingSink {
    inner: Arc<dyn TelemetrySink>,
    policy: RetryPolicy,
}

impl RetryingSink {
    /// Wraps `inner`.
    pub fn new(inner: Arc<dyn TelemetrySink>, policy: RetryPolicy) -> Self {
        Self { inner, policy }
    }
}

#[async_trait]
impl TelemetrySink for RetryingSink {
    fn name(&self) -> &str {
        self.inner.name()
    }

    async fn send(&self, payload: &Payload) -> Result<(), TelemetryError> {
        let attempts = self.policy.max_attempts.max(1);
        let mut last = String::new();

        for attempt in 1..=attempts {
            match self.inner.send(payload).await {
                Ok(()) => return Ok(()),
                Err(e) => {
                    tracing::debug!(
                        sink = %self.inner.name(),
                        attempt,
                        error = %e,
                        "Telemetry send failed"
                    );
                    last = e.to_string();
                }
            }
            if attempt < attempts {
                tokio::time::sleep(self.policy.delay).await;
            }
        }

        Err(TelemetryError::Exhausted { attempts, last })
    }
}

// =============================================================================
// LatestValues
// =============================================================================

/// Last published flat value per key.
#[derive(Debug, Clone, Default)]
pub struct LatestValues {
    inner: Arc<RwLock<BTreeMap<String, Value>>>,
}

impl LatestValues {
    /// Creates an empty table.
    pub fn new() -> Self {
        Self::default()
    }

    /// Merges `values`.
    pub fn extend(&self, values: impl IntoIterator<Item = (String, Value)>) {
        self.inner.write().extend(values);
    }

    /// Sets one value.
    pub fn set(&self, key: impl Into<String>, value: impl Into<Value>) {
        self.inner.write().insert(key.into(), value.into());
    }

    /// Returns one value.
    pub fn get(&self, key: &str) -> Option<Value> {
        self.inner.read().get(key).cloned()
    }

    /// Copies the table.
    pub fn snapshot(&self) -> BTreeMap<String, Value> {
        self.inner.read().clone()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::sensor::SensorKind;
    use std::sync::atomic::{AtomicU32, Ordering};

    struct Flaky {
        failures: AtomicU32,
        calls: AtomicU32,
    }

    #[async_trait]
    impl TelemetrySink for Flaky {
        fn name(&self) -> &str {
            "flaky"
        }

        async fn send(&self, _payload: &Payload) -> Result<(), TelemetryError> {
            self.calls.fetch_add(1, Ordering::SeqCst);
            if self.failures.load(Ordering::SeqCst) > 0 {
                self.failures.fetch_sub(1, Ordering::SeqCst);
                return Err(TelemetryError::send("flaky", "down"));
            }
            Ok(())
        }
    }

    fn readings() -> Readings {
        let mut r = Readings::new();
        r.insert("ph_value", 7.1).insert("temperature", 20.0);
        r
    }

    #[test]
    fn test_simple_layout() {
        let config = SensorConfig::new("ph_1", SensorKind::Ph, 3);
        let payloads = format_readings(&config, &readings(), 0);
        assert_eq!(payloads.len(), 1);
        assert_eq!(
            payloads[0].to_json(),
            json!({"ph_1_ph_value": 7.1, "ph_1_temperature": 20.0})
        );
    }

    #[test]
    fn test_json_layout() {
        let mut config = SensorConfig::new("ph_1", SensorKind::Ph, 3);
        config.name = "Inlet pH".into();
        config.location = "Basin A".into();
        config.formats = vec![TransmissionFormat::Json];
        config.metadata.insert("electrode".into(), json!("glass"));

        let payloads = format_readings(&config, &readings(), 1_700_000_000_000);
        let body = &payloads[0].to_json()["ph_1_data"];
        assert_eq!(body["info"]["type"], "ph");
        assert_eq!(body["info"]["device_id"], 3);
        assert_eq!(body["metadata"]["electrode"], "glass");
        assert_eq!(body["measurements"]["ph_value"], 7.1);
        assert_eq!(body["timestamp"], 1_700_000_000_000i64);
        assert_eq!(body["status"], "active");
    }

    #[test]
    fn test_json_layout_marks_cached_reads() {
        let mut config = SensorConfig::new("ph_1", SensorKind::Ph, 3);
        config.formats = vec![TransmissionFormat::Simple, TransmissionFormat::Json];
        let mut cached = readings();
        cached.mark_degraded();

        let payloads = format_readings(&config, &cached, 0);
        assert_eq!(payloads.len(), 2);
        let body = &payloads[1].to_json()["ph_1_data"];
        assert_eq!(body["status"], "degraded");
        assert_eq!(body["measurements"]["ph_value"], 7.1);
    }

    #[test]
    fn test_error_payload() {
        let payload = error_payload("turb_1", "timeout", 4);
        assert_eq!(
            payload.to_json(),
            json!({"turb_1_error": "timeout", "turb_1_error_count": 4})
        );
    }

    #[tokio::test(start_paused = true)]
    async fn test_retry_then_succeed() {
        let inner = Arc::new(Flaky {
            failures: AtomicU32::new(2),
            calls: AtomicU32::new(0),
        });
        let sink = RetryingSink::new(inner.clone(), RetryPolicy::default());
        let start = tokio::time::Instant::now();
        sink.send(&error_payload("x", "e", 1)).await.unwrap();
        assert_eq!(inner.calls.load(Ordering::SeqCst), 3);
        assert_eq!(start.elapsed(), Duration::from_secs(2));
    }

    #[tokio::test(start_paused = true)]
    async fn test_retry_exhausted() {
        let inner = Arc::new(Flaky {
            failures: AtomicU32::new(10),
            calls: AtomicU32::new(0),
        });
        let sink = RetryingSink::new(inner.clone(), RetryPolicy::default());
        let err = sink.send(&error_payload("x", "e", 1)).await.unwrap_err();
        assert!(matches!(err, TelemetryError::Exhausted { attempts: 3, .. }));
        assert_eq!(inner.calls.load(Ordering::SeqCst), 3);
    }

    #[tokio::test]
    async fn test_json_lines_sink() {
        let dir = tempfile::tempdir().unwrap();
        let sink = JsonLinesSink::new(dir.path().join("telemetry.jsonl"));
        sink.send(&error_payload("a", "e", 1)).await.unwrap();
        sink.send(&error_payload("b", "e", 2)).await.unwrap();

        let content = std::fs::read_to_string(sink.path()).unwrap();
        let lines: Vec<Value> = content
            .lines()
            .map(|l| serde_json::from_str(l).unwrap())
            .collect();
        assert_eq!(lines.len(), 2);
        assert_eq!(lines[1]["b_error_count"], 2);
    }

    #[test]
    fn test_latest_values() {
        let latest = LatestValues::new();
        latest.extend(flat_values("ph_1", &readings()));
        latest.set("ph_1_ph_value", 7.3);
        assert_eq!(latest.get("ph_1_ph_value"), Some(json!(7.3)));
        assert_eq!(latest.snapshot().len(), 2);
    }
}
