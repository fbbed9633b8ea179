// SPDX-License-Identifier: PolyForm-Noncommercial-1.0.0
// Copyright (c) 2025 Sylvex. All rights reserved.

//! Scripted serial line for tests.
//!
//! Responses are served per device address in FIFO order; a device with an
//! empty script stays silent. Every written frame is recorded together with the
//! (tokio) instant it was written, so tests can assert on ordering and pacing.

use std::collections::{HashMap, VecDeque};
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use parking_lot::Mutex;
use tokio::time::Instant;

use crate::error::{TransportError, TransportResult};
use crate::frame::crc16;
use crate::transport::SerialLine;

/// One scripted reply.
#[derive(Debug, Clone)]
pub enum Reply {
    /// Raw bytes returned verbatim.
    Bytes(Vec<u8>),
    /// No bytes at all.
    Silence,
    /// I/O failure.
    IoError,
}

#[derive(Debug, Default)]
struct Script {
    replies: HashMap<u8, VecDeque<Reply>>,
    fallback: HashMap<u8, Reply>,
    written: Vec<(Instant, Vec<u8>)>,
    pending: Option<u8>,
}

/// A [`SerialLine`] whose responses are scripted by the test.
#[derive(Debug, Clone, Default)]
pub struct ScriptedLine {
    script: Arc<Mutex<Script>>,
}

impl ScriptedLine {
    /// Creates an empty scripted line.
    pub fn new() -> Self {
        Self {
            script: Arc::default(),
        }
    }

    fn with<R>(&self, f: impl FnOnce(&mut Script) -> R) -> R {
        f(&mut self.script.lock())
    }

    /// Queues a reply for `device`.
    pub fn push(&self, device: u8, reply: Reply) -> &Self {
        self.with(|s| s.replies.entry(device).or_default().push_back(reply));
        self
    }

    /// Queues a well-formed response carrying `payload`.
    pub fn push_payload(&self, device: u8, payload: &[u8]) -> &Self {
        self.push(device, Reply::Bytes(response_frame(device, payload)))
    }

    /// Queues a well-formed float response in the instruments' byte order.
    pub fn push_float(&self, device: u8, value: f32) -> &Self {
        self.push_payload(device, &swapped_float(value))
    }

    /// Queues a well-formed single-register response.
    pub fn push_u16(&self, device: u8, value: u16) -> &Self {
        self.push_payload(device, &value.to_be_bytes())
    }

    /// Sets the reply used once the queue for `device` is exhausted.
    pub fn set_fallback(&self, device: u8, reply: Reply) -> &Self {
        self.with(|s| s.fallback.insert(device, reply));
        self
    }

    /// Returns all frames written so far.
    pub fn written(&self) -> Vec<Vec<u8>> {
        self.with(|s| s.written.iter().map(|(_, f)| f.clone()).collect())
    }

    /// Returns the instants at which frames were written.
    pub fn write_times(&self) -> Vec<Instant> {
        self.with(|s| s.written.iter().map(|(t, _)| *t).collect())
    }

    /// Returns the number of frames written to `device`.
    pub fn requests_to(&self, device: u8) -> usize {
        self.with(|s| s.written.iter().filter(|(_, f)| f.first() == Some(&device)).count())
    }

    /// Returns the start registers requested from `device`, in order.
    pub fn registers_requested(&self, device: u8) -> Vec<u16> {
        self.with(|s| {
            s.written
                .iter()
                .filter(|(_, f)| f.first() == Some(&device) && f.len() >= 4)
                .map(|(_, f)| u16::from_be_bytes([f[2], f[3]]))
                .collect()
        })
    }
}

#[async_trait]
impl SerialLine for ScriptedLine {
    async fn write_frame(&mut self, frame: &[u8]) -> TransportResult<()> {
        self.with(|s| {
            s.written.push((Instant::now(), frame.to_vec()));
            s.pending = frame.first().copied();
        });
        Ok(())
    }

    async fn read_response(&mut self, budget: usize, timeout: Duration) -> TransportResult<Vec<u8>> {
        let reply = self.with(|s| {
            let device = s.pending.take()?;
            s.replies
                .get_mut(&device)
                .and_then(VecDeque::pop_front)
                .or_else(|| s.fallback.get(&device).cloned())
        });

        match reply {
            Some(Reply::Bytes(mut bytes)) => {
                bytes.truncate(budget);
                Ok(bytes)
            }
            Some(Reply::IoError) => Err(TransportError::Io(std::io::Error::new(
                std::io::ErrorKind::BrokenPipe,
                "scripted I/O failure",
            ))),
            Some(Reply::Silence) | None => {
                tokio::time::sleep(timeout).await;
                Ok(Vec::new())
            }
        }
    }

    fn name(&self) -> &str {
        "scripted"
    }
}

/// Builds a well-formed response frame carrying `payload`.
pub fn response_frame(device: u8, payload: &[u8]) -> Vec<u8> {
    let mut frame = vec![device, 0x03, payload.len() as u8];
    frame.extend_from_slice(payload);
    let crc = crc16(&frame);
    frame.extend_from_slice(&crc.to_le_bytes());
    frame
}

/// Encodes `value` with its 16-bit halves swapped.
pub fn swapped_float(value: f32) -> Vec<u8> {
    let be = value.to_be_bytes();
    vec![be[2], be[3], be[0], be[1]]
}

/// Returns `frame` with one bit flipped.
pub fn corrupt(mut frame: Vec<u8>, byte: usize, bit: u8) -> Vec<u8> {
    if let Some(b) = frame.get_mut(byte) {
        *b ^= 1 << bit;
    }
    frame
}
