// SPDX-License-Identifier: PolyForm-Noncommercial-1.0.0
// Copyright (c) 2025 Sylvex. All rights reserved.

//! Process control state and its remote attributes.
//!
//! [`ControlState`] is the single source of truth for relay outputs, the
//! operator switches and the pH setpoints. It is shared between the control
//! loop and the remote-control surface as `Arc<parking_lot::Mutex<_>>` and is
//! snapshotted to `state.json`.
//!
//! Remote attributes are parsed into the closed [`Attribute`] enum before they
//! touch the state, so an unknown key or a mistyped value never changes
//! anything.

use std::fmt;
use std::str::FromStr;
use std::time::Duration;

use serde::{Deserialize, Serialize};
use serde_json::Value;
use tokio::time::Instant;

use crate::error::{PersistResult, RemoteError, RemoteResult};
use crate::persist::{JsonStore, CONTROL_STATE_FILE};

// =============================================================================
// ControlSettings
// =============================================================================

/// Setpoint defaults used when no snapshot exists.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ControlSettings {
    /// Target pH.
    pub target_ph: f64,

    /// Allowed deviation either side of the target.
    pub tolerance: f64,

    /// pH below which the plant trips immediately.
    pub hard_stop_ph: f64,

    /// How long pH may stay above the band before tripping.
    #[serde(with = "humantime_serde")]
    pub high_delay: Duration,

    /// How long pH may stay below the band before tripping.
    #[serde(with = "humantime_serde")]
    pub low_delay: Duration,

    /// Control loop period.
    #[serde(with = "humantime_serde")]
    pub tick: Duration,
}

impl Default for ControlSettings {
    fn default() -> Self {
        Self {
            target_ph: 7.0,
            tolerance: 0.5,
            hard_stop_ph: 5.0,
            high_delay: Duration::from_secs(600),
            low_delay: Duration::from_secs(600),
            tick: Duration::from_secs(1),
        }
    }
}

impl ControlSettings {
    /// Validates the settings.
    pub fn validate(&self) -> Result<(), String> {
        if !(0.0..=14.0).contains(&self.target_ph) {
            return Err(format!("target_ph {} is outside 0..=14", self.target_ph));
        }
        if !(self.tolerance >= 0.0) {
            return Err("tolerance must be non-negative".to_string());
        }
        if self.tick.is_zero() {
            return Err("control tick must be non-zero".to_string());
        }
        Ok(())
    }
}

// =============================================================================
// Relays
// =============================================================================

/// Relay outputs.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Relays {
    /// Circulation pump.
    pub pump: bool,
    /// CO2 dosing valve.
    pub co2: bool,
    /// CO2 heater.
    pub heater: bool,
}

impl Relays {
    /// All relays off.
    pub const OFF: Self = Self {
        pump: false,
        co2: false,
        heater: false,
    };

    /// Pump only.
    pub const PUMP: Self = Self {
        pump: true,
        co2: false,
        heater: false,
    };

    /// CO2 dosing with heater, pump off.
    pub const DOSING: Self = Self {
        pump: false,
        co2: true,
        heater: true,
    };

    /// Returns `true` if any relay is on.
    pub fn any(&self) -> bool {
        self.pump || self.co2 || self.heater
    }
}

impl fmt::Display for Relays {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let flag = |on: bool, name: &'static str| if on { name } else { "-" };
        write!(
            f,
            "{},{},{}",
            flag(self.pump, "pump"),
            flag(self.co2, "co2"),
            flag(self.heater, "heat")
        )
    }
}

// =============================================================================
// ControlState
// =============================================================================

/// Operator switches, setpoints, relay outputs and trip timers.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ControlState {
    /// Relay outputs.
    #[serde(default)]
    pub relays: Relays,

    /// Closed-loop control armed.
    #[serde(default)]
    pub auto_enabled: bool,

    /// Plant powered.
    #[serde(default)]
    pub power_enabled: bool,

    /// Target pH.
    pub target_ph: f64,

    /// Band half-width.
    pub tolerance: f64,

    /// Immediate trip threshold.
    pub hard_stop_ph: f64,

    /// High-side trip delay.
    #[serde(with = "humantime_serde")]
    pub high_delay: Duration,

    /// Low-side trip delay.
    #[serde(with = "humantime_serde")]
    pub low_delay: Duration,

    #[serde(skip)]
    pub(crate) high_started: Option<Instant>,

    #[serde(skip)]
    pub(crate) low_started: Option<Instant>,
}

impl Default for ControlState {
    fn default() -> Self {
        Self::from_settings(&ControlSettings::default())
    }
}

impl ControlState {
    /// Creates an unpowered state with the given setpoints.
    pub fn from_settings(settings: &ControlSettings) -> Self {
        Self {
            relays: Relays::OFF,
            auto_enabled: false,
            power_enabled: false,
            target_ph: settings.target_ph,
            tolerance: settings.tolerance,
            hard_stop_ph: settings.hard_stop_ph,
            high_delay: settings.high_delay,
            low_delay: settings.low_delay,
            high_started: None,
            low_started: None,
        }
    }

    /// Loads the snapshot, or builds one from `settings` if there is none.
    ///
    /// Relays always start off; the control loop drives them on its first
    /// tick.
    pub fn load(store: &JsonStore, settings: &ControlSettings) -> Self {
        let mut state = match store.load::<Self>(CONTROL_STATE_FILE) {
            Ok(state) => state,
            Err(e) => {
                if !e.is_not_found() {
                    tracing::warn!(error = %e, "Control state unreadable, using configured defaults");
                }
                let state = Self::from_settings(settings);
                if let Err(e) = store.save(CONTROL_STATE_FILE, &state) {
                    tracing::warn!(error = %e, "Failed to write control state");
                }
                state
            }
        };
        state.relays = Relays::OFF;
        state
    }

    /// Writes the snapshot.
    pub fn save(&self, store: &JsonStore) -> PersistResult<()> {
        store.save(CONTROL_STATE_FILE, self)
    }

    /// Upper band edge.
    pub fn max_ph(&self) -> f64 {
        self.target_ph + self.tolerance
    }

    /// Lower band edge.
    pub fn min_ph(&self) -> f64 {
        self.target_ph - self.tolerance
    }

    /// Time left before a high-side trip; the full delay when not running.
    pub fn countdown_high(&self, now: Instant) -> Duration {
        countdown(self.high_delay, self.high_started, now)
    }

    /// Time left before a low-side trip; the full delay when not running.
    pub fn countdown_low(&self, now: Instant) -> Duration {
        countdown(self.low_delay, self.low_started, now)
    }

    /// Returns `true` if the high-side timer is running.
    pub fn high_timer_running(&self) -> bool {
        self.high_started.is_some()
    }

    /// Returns `true` if the low-side timer is running.
    pub fn low_timer_running(&self) -> bool {
        self.low_started.is_some()
    }

    /// Stops both trip timers.
    pub fn clear_timers(&mut self) {
        self.high_started = None;
        self.low_started = None;
    }

    /// Switches plant power. Turning power off also disarms and de-energizes.
    pub fn set_power(&mut self, on: bool) {
        self.power_enabled = on;
        if !on {
            self.auto_enabled = false;
            self.relays = Relays::OFF;
            self.clear_timers();
        }
    }

    /// Arms or disarms closed-loop control.
    pub fn set_auto(&mut self, on: bool) {
        self.auto_enabled = on;
        if !on {
            self.relays = Relays::OFF;
            self.clear_timers();
        }
    }

    /// Applies one parsed attribute.
    pub fn apply(&mut self, attribute: Attribute) {
        match attribute {
            Attribute::Power(on) => self.set_power(on),
            Attribute::Auto(on) => self.set_auto(on),
            Attribute::TargetPh(v) => self.target_ph = v,
            Attribute::Tolerance(v) => self.tolerance = v,
            Attribute::HardStopPh(v) => self.hard_stop_ph = v,
            Attribute::HighDelay(d) => self.high_delay = d,
            Attribute::LowDelay(d) => self.low_delay = d,
        }
    }
}

fn countdown(delay: Duration, started: Option<Instant>, now: Instant) -> Duration {
    started.map_or(delay, |s| delay.saturating_sub(now.saturating_duration_since(s)))
}

// =============================================================================
// Attribute
// =============================================================================

/// Remote attribute names.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum AttributeKey {
    /// `powerButton`
    PowerButton,
    /// `autoSwitch`
    AutoSwitch,
    /// `targetPHValue`
    TargetPhValue,
    /// `targetPHtolerrance` (spelling is fixed by the dashboard)
    TargetPhTolerance,
    /// `minimumPHValStop`
    MinimumPhValStop,
    /// `ph_high_delay_duration`
    PhHighDelayDuration,
    /// `ph_low_delay_duration`
    PhLowDelayDuration,
}

impl AttributeKey {
    /// All keys.
    pub const ALL: [Self; 7] = [
        Self::PowerButton,
        Self::AutoSwitch,
        Self::TargetPhValue,
        Self::TargetPhTolerance,
        Self::MinimumPhValStop,
        Self::PhHighDelayDuration,
        Self::PhLowDelayDuration,
    ];

    /// Wire name.
    pub const fn as_str(&self) -> &'static str {
        match self {
            Self::PowerButton => "powerButton",
            Self::AutoSwitch => "autoSwitch",
            Self::TargetPhValue => "targetPHValue",
            Self::TargetPhTolerance => "targetPHtolerrance",
            Self::MinimumPhValStop => "minimumPHValStop",
            Self::PhHighDelayDuration => "ph_high_delay_duration",
            Self::PhLowDelayDuration => "ph_low_delay_duration",
        }
    }
}

impl fmt::Display for AttributeKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for AttributeKey {
    type Err = RemoteError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::ALL
            .into_iter()
            .find(|k| k.as_str() == s)
            .ok_or_else(|| RemoteError::UnknownAttribute(s.to_string()))
    }
}

/// A typed attribute update.
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum Attribute {
    /// Plant power.
    Power(bool),
    /// Closed-loop control.
    Auto(bool),
    /// Target pH.
    TargetPh(f64),
    /// Band half-width.
    Tolerance(f64),
    /// Hard-stop pH.
    HardStopPh(f64),
    /// High-side trip delay.
    HighDelay(Duration),
    /// Low-side trip delay.
    LowDelay(Duration),
}

impl Attribute {
    /// Parses a remote `key: value` pair.
    pub fn parse(key: &str, value: &Value) -> RemoteResult<Self> {
        let key: AttributeKey = key.parse()?;
        let flag = || {
            value
                .as_bool()
                .ok_or_else(|| RemoteError::invalid(key.as_str(), "boolean"))
        };
        let number = |range: std::ops::RangeInclusive<f64>, expected: &'static str| {
            value
                .as_f64()
                .filter(|v| range.contains(v))
                .ok_or_else(|| RemoteError::invalid(key.as_str(), expected))
        };
        let seconds = || {
            number(0.0..=f64::from(u32::MAX), "non-negative number of seconds")
                .map(Duration::from_secs_f64)
        };

        Ok(match key {
            AttributeKey::PowerButton => Self::Power(flag()?),
            AttributeKey::AutoSwitch => Self::Auto(flag()?),
            AttributeKey::TargetPhValue => Self::TargetPh(number(0.0..=14.0, "pH between 0 and 14")?),
            AttributeKey::TargetPhTolerance => {
                Self::Tolerance(number(0.0..=14.0, "tolerance between 0 and 14")?)
            }
            AttributeKey::MinimumPhValStop => {
                Self::HardStopPh(number(0.0..=14.0, "pH between 0 and 14")?)
            }
            AttributeKey::PhHighDelayDuration => Self::HighDelay(seconds()?),
            AttributeKey::PhLowDelayDuration => Self::LowDelay(seconds()?),
        })
    }

    /// Attribute key.
    pub fn key(&self) -> AttributeKey {
        match self {
            Self::Power(_) => AttributeKey::PowerButton,
            Self::Auto(_) => AttributeKey::AutoSwitch,
            Self::TargetPh(_) => AttributeKey::TargetPhValue,
            Self::Tolerance(_) => AttributeKey::TargetPhTolerance,
            Self::HardStopPh(_) => AttributeKey::MinimumPhValStop,
            Self::HighDelay(_) => AttributeKey::PhHighDelayDuration,
            Self::LowDelay(_) => AttributeKey::PhLowDelayDuration,
        }
    }
}
