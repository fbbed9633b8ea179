// SPDX-License-Identifier: PolyForm-Noncommercial-1.0.0
// Copyright (c) 2025 Sylvex. All rights reserved.

//! Serial line settings and register formats.
//!
//! ```
//! use h2o_modbus::types::{Framing, Parity, SerialConfig};
//!
//! let config: SerialConfig = serde_json::from_str(
//!     r#"{"port": "/dev/ttyUSB0", "framing": "8E1", "timeout": "800ms"}"#,
//! ).unwrap();
//!
//! assert_eq!(config.framing.parity, Parity::Even);
//! assert_eq!(config.baud_rate, 9600);
//! assert_eq!(Framing::default().to_string(), "8N1");
//! ```

use std::fmt;
use std::str::FromStr;
use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::error::{TransportError, TransportResult};

/// Modbus function code for "read holding registers".
pub const READ_HOLDING_REGISTERS: u8 = 0x03;

/// Number of bytes requested from the line per transaction.
pub const DEFAULT_READ_BUDGET: usize = 100;

/// Address, function, byte count and the two CRC bytes.
const MIN_FRAME_LEN: usize = 5;

const BAUD_RATES: [u32; 9] = [1200, 2400, 4800, 9600, 14400, 19200, 38400, 57600, 115200];

/// How a response payload is interpreted.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RegisterFormat {
    /// Two registers, half-words swapped, big-endian IEEE-754.
    Float32,
    /// One register, big-endian unsigned.
    U16,
}

impl RegisterFormat {
    /// Registers requested for one value.
    pub const fn register_count(&self) -> u16 {
        match self {
            Self::Float32 => 2,
            Self::U16 => 1,
        }
    }

    /// Config and log name.
    pub const fn name(&self) -> &'static str {
        match self {
            Self::Float32 => "float32",
            Self::U16 => "u16",
        }
    }
}

impl fmt::Display for RegisterFormat {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

/// Parity bit.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub enum Parity {
    /// `N`
    #[default]
    None,
    /// `O`
    Odd,
    /// `E`
    Even,
}

/// Character framing, written the usual way: `8N1`, `7E1`, `8N2`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub struct Framing {
    /// 7 or 8.
    pub data_bits: u8,
    /// Parity bit.
    pub parity: Parity,
    /// 1 or 2.
    pub stop_bits: u8,
}

impl Framing {
    /// Bits on the wire per character, start bit included.
    pub fn char_bits(&self) -> u8 {
        let parity = u8::from(self.parity != Parity::None);
        1 + self.data_bits + parity + self.stop_bits
    }
}

impl Default for Framing {
    fn default() -> Self {
        Self {
            data_bits: 8,
            parity: Parity::None,
            stop_bits: 1,
        }
    }
}

impl FromStr for Framing {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let invalid = || format!("invalid framing '{s}', expected e.g. 8N1 or 7E1");
        let &[data, parity, stop] = s.trim().as_bytes() else {
            return Err(invalid());
        };
        let data_bits = match data {
            b'7' => 7,
            b'8' => 8,
            _ => return Err(invalid()),
        };
        let parity = match parity.to_ascii_uppercase() {
            b'N' => Parity::None,
            b'O' => Parity::Odd,
            b'E' => Parity::Even,
            _ => return Err(invalid()),
        };
        let stop_bits = match stop {
            b'1' => 1,
            b'2' => 2,
            _ => return Err(invalid()),
        };
        Ok(Self {
            data_bits,
            parity,
            stop_bits,
        })
    }
}

impl TryFrom<String> for Framing {
    type Error = String;

    fn try_from(value: String) -> Result<Self, Self::Error> {
        value.parse()
    }
}

impl From<Framing> for String {
    fn from(framing: Framing) -> Self {
        framing.to_string()
    }
}

impl fmt::Display for Framing {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let parity = match self.parity {
            Parity::None => 'N',
            Parity::Odd => 'O',
            Parity::Even => 'E',
        };
        write!(f, "{}{}{}", self.data_bits, parity, self.stop_bits)
    }
}

/// RS-485 line configuration.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct SerialConfig {
    /// Device path, e.g. `/dev/ttyUSB0`.
    pub port: String,

    /// One of the standard rates from 1200 to 115200.
    pub baud_rate: u32,

    /// Character framing.
    pub framing: Framing,

    /// Response timeout per transaction.
    #[serde(with = "humantime_serde")]
    pub timeout: Duration,

    /// Minimum quiet time between two transactions on the bus.
    #[serde(with = "humantime_serde")]
    pub debounce: Duration,

    /// Maximum number of bytes read per response.
    pub read_budget: usize,
}

impl SerialConfig {
    /// Defaults on `port`.
    pub fn new(port: impl Into<String>) -> Self {
        Self {
            port: port.into(),
            ..Default::default()
        }
    }

    /// Replaces the response timeout and the bus debounce.
    pub fn with_timing(mut self, timeout: Duration, debounce: Duration) -> Self {
        self.timeout = timeout;
        self.debounce = debounce;
        self
    }

    /// Silence that marks the end of a response frame: 3.5 character times,
    /// never below 5 ms.
    pub fn inter_frame_gap(&self) -> Duration {
        let secs = 3.5 * f64::from(self.framing.char_bits()) / f64::from(self.baud_rate);
        Duration::from_secs_f64(secs).max(Duration::from_millis(5))
    }

    /// Rejects settings no RS-485 instrument on this bus can use.
    pub fn validate(&self) -> TransportResult<()> {
        if self.port.trim().is_empty() {
            return Err(TransportError::configuration("port must not be empty"));
        }
        if !BAUD_RATES.contains(&self.baud_rate) {
            return Err(TransportError::configuration(format!(
                "unsupported baud rate {}",
                self.baud_rate
            )));
        }
        if self.timeout.is_zero() {
            return Err(TransportError::configuration("timeout must be non-zero"));
        }
        if self.read_budget < MIN_FRAME_LEN {
            return Err(TransportError::configuration(format!(
                "read budget {} cannot hold a {MIN_FRAME_LEN}-byte frame",
                self.read_budget
            )));
        }
        Ok(())
    }
}

impl Default for SerialConfig {
    fn default() -> Self {
        Self {
            port: "/dev/ttyS0".to_string(),
            baud_rate: 9600,
            framing: Framing::default(),
            timeout: Duration::from_secs(1),
            debounce: Duration::from_millis(500),
            read_budget: DEFAULT_READ_BUDGET,
        }
    }
}

impl fmt::Display for SerialConfig {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} {} {}", self.port, self.baud_rate, self.framing)
    }
}
