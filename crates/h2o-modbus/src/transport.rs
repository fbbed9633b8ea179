// SPDX-License-Identifier: PolyForm-Noncommercial-1.0.0
// Copyright (c) 2025 Sylvex. All rights reserved.

//! Raw serial line abstraction.
//!
//! [`SerialLine`] moves bytes; it knows nothing about framing. The RS-485
//! implementation is [`RtuLine`], built on `tokio-serial`.

use std::time::Duration;

use async_trait::async_trait;
use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tokio::time::{timeout, Instant};
use tokio_serial::{ClearBuffer, SerialPort, SerialPortBuilderExt, SerialStream};

use crate::error::{TransportError, TransportResult};
use crate::types::{Framing, Parity, SerialConfig};

// =============================================================================
// SerialLine Trait
// =============================================================================

/// A half-duplex byte line.
///
/// Implementations must never block past the supplied timeout.
#[async_trait]
pub trait SerialLine: Send {
    /// Writes a complete request frame.
    async fn write_frame(&mut self, frame: &[u8]) -> TransportResult<()>;

    /// Reads up to `budget` bytes, waiting at most `timeout` overall.
    ///
    /// Returns whatever arrived; an empty vector means the device stayed silent.
    async fn read_response(&mut self, budget: usize, timeout: Duration) -> TransportResult<Vec<u8>>;

    /// Human-readable line name for logs.
    fn name(&self) -> &str;
}

// =============================================================================
// RtuLine
// =============================================================================

/// RS-485 line backed by a native serial port.
pub struct RtuLine {
    port: String,
    stream: SerialStream,
    inter_frame_gap: Duration,
}

impl RtuLine {
    /// Opens the serial port described by `config`.
    ///
    /// # Errors
    ///
    /// Returns [`TransportError::Open`] if the device cannot be opened.
    pub fn open(config: &SerialConfig) -> TransportResult<Self> {
        config.validate()?;

        let stream = tokio_serial::new(&config.port, config.baud_rate)
            .data_bits(data_bits(config.framing))
            .parity(parity(config.framing))
            .stop_bits(stop_bits(config.framing))
            .timeout(config.timeout)
            .open_native_async()
            .map_err(|e| TransportError::Open {
                port: config.port.clone(),
                message: e.to_string(),
            })?;

        tracing::info!(port = %config.port, settings = %config, "Opened RS-485 line");

        Ok(Self {
            port: config.port.clone(),
            stream,
            inter_frame_gap: config.inter_frame_gap(),
        })
    }
}

#[async_trait]
impl SerialLine for RtuLine {
    async fn write_frame(&mut self, frame: &[u8]) -> TransportResult<()> {
        // Drop bytes left over from an earlier, abandoned response.
        if let Err(e) = self.stream.clear(ClearBuffer::Input) {
            tracing::debug!(port = %self.port, error = %e, "Failed to clear input buffer");
        }
        self.stream.write_all(frame).await?;
        self.stream.flush().await?;
        Ok(())
    }

    async fn read_response(&mut self, budget: usize, window: Duration) -> TransportResult<Vec<u8>> {
        let deadline = Instant::now() + window;
        let mut buf = vec![0u8; budget];
        let mut filled = 0;

        while filled < budget {
            let remaining = deadline.saturating_duration_since(Instant::now());
            if remaining.is_zero() {
                break;
            }
            // After the first bytes, a quiet gap ends the frame.
            let wait = if filled == 0 {
                remaining
            } else {
                remaining.min(self.inter_frame_gap)
            };

            match timeout(wait, self.stream.read(&mut buf[filled..])).await {
                Ok(Ok(0)) | Err(_) => break,
                Ok(Ok(n)) => filled += n,
                Ok(Err(e)) => return Err(e.into()),
            }
        }

        buf.truncate(filled);
        Ok(buf)
    }

    fn name(&self) -> &str {
        &self.port
    }
}

fn data_bits(framing: Framing) -> tokio_serial::DataBits {
    match framing.data_bits {
        7 => tokio_serial::DataBits::Seven,
        _ => tokio_serial::DataBits::Eight,
    }
}

fn parity(framing: Framing) -> tokio_serial::Parity {
    match framing.parity {
        Parity::None => tokio_serial::Parity::None,
        Parity::Odd => tokio_serial::Parity::Odd,
        Parity::Even => tokio_serial::Parity::Even,
    }
}

fn stop_bits(framing: Framing) -> tokio_serial::StopBits {
    match framing.stop_bits {
        2 => tokio_serial::StopBits::Two,
        _ => tokio_serial::StopBits::One,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_open_missing_port_fails() {
        let config = SerialConfig::new("/dev/h2o-does-not-exist");
        match RtuLine::open(&config) {
            Err(TransportError::Open { port, .. }) => assert_eq!(port, "/dev/h2o-does-not-exist"),
            Err(other) => panic!("unexpected error: {other}"),
            Ok(_) => panic!("opened a port that does not exist"),
        }
    }
}
