// SPDX-License-Identifier: PolyForm-Noncommercial-1.0.0
// Copyright (c) 2025 Sylvex. All rights reserved.

//! Per-sensor error backoff.
//!
//! Each configured sensor carries a [`SensorRuntime`]. After
//! `error_threshold` consecutive failures the sensor is suppressed and the
//! scheduler skips it until the suppression delay has elapsed:
//!
//! ```text
//!            failure × threshold
//!   Active ─────────────────────────▶ Suppressed { since }
//!     ▲                                   │
//!     └───────── delay elapsed ───────────┘  (errors reset, retry index + 1)
//! ```
//!
//! Long-cable sensors always wait `long_cable_retry`. Other sensors walk the
//! [`RetrySchedule`], which sticks at its last entry. Only a successful read
//! rewinds the schedule.

use std::fmt;
use std::time::Duration;

use serde::{Deserialize, Serialize};
use tokio::time::Instant;

// =============================================================================
// RetrySchedule
// =============================================================================

/// A predefined sequence of delays; indices past the end use the last entry.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct RetrySchedule {
    #[serde(with = "delay_list")]
    delays: Vec<Duration>,
}

impl RetrySchedule {
    /// Creates a schedule from the given delays.
    pub fn new(delays: Vec<Duration>) -> Self {
        Self { delays }
    }

    /// Creates a schedule from a slice of seconds.
    pub fn from_secs(delays: &[u64]) -> Self {
        Self {
            delays: delays.iter().map(|&s| Duration::from_secs(s)).collect(),
        }
    }

    /// Returns the delay for `index`.
    pub fn delay(&self, index: usize) -> Duration {
        self.delays
            .get(index)
            .or_else(|| self.delays.last())
            .copied()
            .unwrap_or_default()
    }

    /// Returns the highest meaningful index.
    pub fn last_index(&self) -> usize {
        self.delays.len().saturating_sub(1)
    }

    /// Returns `true` if the schedule has no entries.
    pub fn is_empty(&self) -> bool {
        self.delays.is_empty()
    }

    /// Returns the delays.
    pub fn delays(&self) -> &[Duration] {
        &self.delays
    }
}

impl Default for RetrySchedule {
    fn default() -> Self {
        Self::from_secs(&[300, 600, 1800, 3600])
    }
}

mod delay_list {
    use std::time::Duration;

    use serde::{de::Error as _, Deserialize, Deserializer, Serialize, Serializer};

    pub fn serialize<S: Serializer>(delays: &[Duration], s: S) -> Result<S::Ok, S::Error> {
        delays
            .iter()
            .map(|d| humantime::format_duration(*d).to_string())
            .collect::<Vec<_>>()
            .serialize(s)
    }

    pub fn deserialize<'de, D: Deserializer<'de>>(d: D) -> Result<Vec<Duration>, D::Error> {
        Vec::<String>::deserialize(d)?
            .iter()
            .map(|s| humantime::parse_duration(s).map_err(D::Error::custom))
            .collect()
    }
}

// =============================================================================
// BackoffPolicy
// =============================================================================

/// Suppression thresholds and delays shared by all sensors.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct BackoffPolicy {
    /// Consecutive failures before a sensor is suppressed.
    pub error_threshold: u32,

    /// Suppression delay for long-cable sensors.
    #[serde(with = "humantime_serde")]
    pub long_cable_retry: Duration,

    /// Suppression delays for other sensors.
    pub retry_schedule: RetrySchedule,

    /// Minimum gap between "still suppressed" warnings.
    #[serde(with = "humantime_serde")]
    pub warn_interval: Duration,
}

impl Default for BackoffPolicy {
    fn default() -> Self {
        Self {
            error_threshold: 5,
            long_cable_retry: Duration::from_secs(120),
            retry_schedule: RetrySchedule::default(),
            warn_interval: Duration::from_secs(300),
        }
    }
}

impl BackoffPolicy {
    /// Validates the policy.
    pub fn validate(&self) -> Result<(), String> {
        if self.error_threshold == 0 {
            return Err("error_threshold must be at least 1".to_string());
        }
        if self.retry_schedule.is_empty() {
            return Err("retry_schedule must have at least one entry".to_string());
        }
        Ok(())
    }
}

// =============================================================================
// SensorRuntime
// =============================================================================

/// Whether a sensor is being polled.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum HealthState {
    /// Polled normally.
    Active,
    /// Skipped until the suppression delay has elapsed.
    Suppressed {
        /// When the sensor was suppressed.
        since: Instant,
    },
}

impl fmt::Display for HealthState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Active => f.write_str("active"),
            Self::Suppressed { .. } => f.write_str("suppressed"),
        }
    }
}

/// Scheduler decision for one sensor on one tick.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Admission {
    /// Active; poll if due.
    Poll,
    /// Suppression delay has not elapsed yet.
    Suppressed,
    /// Suppression just ended; poll now.
    Reactivated,
}

/// Mutable polling state of one sensor.
#[derive(Debug, Clone)]
pub struct SensorRuntime {
    last_read: Option<Instant>,
    consecutive_errors: u32,
    retry_index: usize,
    last_error_log: Option<Instant>,
    state: HealthState,
    long_cable: bool,
}

impl SensorRuntime {
    /// Creates the runtime for a sensor.
    pub fn new(long_cable: bool) -> Self {
        Self {
            last_read: None,
            consecutive_errors: 0,
            retry_index: 0,
            last_error_log: None,
            state: HealthState::Active,
            long_cable,
        }
    }

    /// Consecutive failures since the last success or reactivation.
    pub fn consecutive_errors(&self) -> u32 {
        self.consecutive_errors
    }

    /// Current position in the retry schedule.
    pub fn retry_index(&self) -> usize {
        self.retry_index
    }

    /// Current health state.
    pub fn state(&self) -> HealthState {
        self.state
    }

    /// Instant of the last successful read.
    pub fn last_read(&self) -> Option<Instant> {
        self.last_read
    }

    /// Returns `true` if the sensor is suppressed.
    pub fn is_suppressed(&self) -> bool {
        matches!(self.state, HealthState::Suppressed { .. })
    }

    /// Returns `true` if `poll_interval` has elapsed since the last success.
    pub fn is_due(&self, now: Instant, poll_interval: Duration) -> bool {
        self.last_read
            .map_or(true, |last| now.saturating_duration_since(last) >= poll_interval)
    }

    /// Suppression delay that applies right now.
    pub fn suppression_delay(&self, policy: &BackoffPolicy) -> Duration {
        if self.long_cable {
            policy.long_cable_retry
        } else {
            policy.retry_schedule.delay(self.retry_index)
        }
    }

    /// Decides whether the sensor may be polled at `now`.
    pub fn check(&mut self, sensor_id: &str, now: Instant, policy: &BackoffPolicy) -> Admission {
        let HealthState::Suppressed { since } = self.state else {
            return Admission::Poll;
        };

        let delay = self.suppression_delay(policy);
        let elapsed = now.saturating_duration_since(since);
        if elapsed >= delay {
            self.state = HealthState::Active;
            self.consecutive_errors = 0;
            if !self.long_cable {
                self.retry_index = (self.retry_index + 1).min(policy.retry_schedule.last_index());
            }
            tracing::info!(
                sensor_id = %sensor_id,
                suppressed_for = ?elapsed,
                next_delay = ?self.suppression_delay(policy),
                "Reactivating suppressed sensor"
            );
            return Admission::Reactivated;
        }

        let warn_due = self
            .last_error_log
            .map_or(true, |t| now.saturating_duration_since(t) >= policy.warn_interval);
        if warn_due {
            self.last_error_log = Some(now);
            tracing::warn!(
                sensor_id = %sensor_id,
                remaining = ?(delay - elapsed),
                "Sensor suppressed after repeated errors"
            );
        }
        Admission::Suppressed
    }

    /// Records a successful read.
    pub fn record_success(&mut self, now: Instant) {
        self.consecutive_errors = 0;
        self.retry_index = 0;
        self.last_read = Some(now);
        self.state = HealthState::Active;
    }

    /// Records a failed (or degraded) read.
    ///
    /// Returns `true` if this failure suppressed the sensor.
    pub fn record_failure(&mut self, sensor_id: &str, now: Instant, policy: &BackoffPolicy) -> bool {
        self.consecutive_errors = self.consecutive_errors.saturating_add(1);
        if self.is_suppressed() || self.consecutive_errors < policy.error_threshold {
            return false;
        }

        self.state = HealthState::Suppressed { since: now };
        self.last_error_log = Some(now);
        tracing::warn!(
            sensor_id = %sensor_id,
            errors = self.consecutive_errors,
            delay = ?self.suppression_delay(policy),
            "Suppressing sensor"
        );
        true
    }
}
