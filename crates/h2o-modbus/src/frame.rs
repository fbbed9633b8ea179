// SPDX-License-Identifier: PolyForm-Noncommercial-1.0.0
// Copyright (c) 2025 Sylvex. All rights reserved.

//! Modbus RTU request framing, response validation and payload decoding.
//!
//! # Wire Layout
//!
//! ```text
//! request:  [addr][fc][start_hi][start_lo][count_hi][count_lo][crc_lo][crc_hi]
//! response: [addr][fc][byte_count][payload ...][crc_lo][crc_hi]
//! ```
//!
//! The field instruments on this bus transmit 32-bit floats with the two
//! 16-bit halves swapped, so a payload `[a, b, c, d]` is decoded as the
//! big-endian float `[c, d, a, b]`.

use crate::error::{TransportError, TransportResult};
use crate::types::RegisterFormat;

const HEADER_LEN: usize = 3;
const CRC_LEN: usize = 2;

// =============================================================================
// CRC16
// =============================================================================

/// Computes the CRC16/Modbus checksum (reflected 0x8005, init 0xFFFF).
pub fn crc16(data: &[u8]) -> u16 {
    let mut crc: u16 = 0xFFFF;
    for &byte in data {
        crc ^= u16::from(byte);
        for _ in 0..8 {
            if crc & 0x0001 != 0 {
                crc = (crc >> 1) ^ 0xA001;
            } else {
                crc >>= 1;
            }
        }
    }
    crc
}

// =============================================================================
// ReadRequest
// =============================================================================

/// A single register read request.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ReadRequest {
    /// Device address.
    pub device: u8,
    /// Function code.
    pub function: u8,
    /// First register.
    pub start: u16,
    /// Number of registers.
    pub count: u16,
}

impl ReadRequest {
    /// Creates a new request.
    pub const fn new(device: u8, function: u8, start: u16, count: u16) -> Self {
        Self {
            device,
            function,
            start,
            count,
        }
    }

    /// Encodes the request with its CRC trailer.
    pub fn encode(&self) -> [u8; 8] {
        let [start_hi, start_lo] = self.start.to_be_bytes();
        let [count_hi, count_lo] = self.count.to_be_bytes();
        let body = [
            self.device,
            self.function,
            start_hi,
            start_lo,
            count_hi,
            count_lo,
        ];
        let [crc_lo, crc_hi] = crc16(&body).to_le_bytes();
        [
            body[0], body[1], body[2], body[3], body[4], body[5], crc_lo, crc_hi,
        ]
    }
}

// =============================================================================
// Response validation
// =============================================================================

/// Validates a raw response and returns its payload.
///
/// The payload is everything between the 3-byte header and the CRC trailer;
/// it is empty when the response is too short to carry one.
pub fn validate_response(device: u8, response: &[u8]) -> TransportResult<&[u8]> {
    if response.len() < CRC_LEN {
        return Err(TransportError::ShortResponse {
            device,
            len: response.len(),
        });
    }

    let (body, trailer) = response.split_at(response.len() - CRC_LEN);
    let expected = crc16(body);
    let actual = u16::from_le_bytes([trailer[0], trailer[1]]);
    if expected != actual {
        return Err(TransportError::CrcMismatch {
            device,
            expected,
            actual,
        });
    }

    Ok(body.get(HEADER_LEN..).unwrap_or(&[]))
}

/// Swaps the two 16-bit halves of a 4-byte register pair.
///
/// Payloads shorter than four bytes are returned unchanged.
pub fn swap_halves(payload: &[u8]) -> Vec<u8> {
    match payload {
        [a, b, c, d, rest @ ..] => {
            let mut swapped = vec![*c, *d, *a, *b];
            swapped.extend_from_slice(rest);
            swapped
        }
        _ => payload.to_vec(),
    }
}

/// Decodes a validated payload in the given format.
pub fn decode_payload(payload: &[u8], format: RegisterFormat) -> TransportResult<f64> {
    let swapped = swap_halves(payload);
    let decode_error = || TransportError::Decode {
        format: format.name(),
        len: payload.len(),
    };

    match format {
        RegisterFormat::Float32 => {
            let bytes: [u8; 4] = swapped
                .get(..4)
                .and_then(|b| b.try_into().ok())
                .ok_or_else(decode_error)?;
            let value = f32::from_be_bytes(bytes);
            if value.is_finite() {
                Ok(f64::from(value))
            } else {
                Err(decode_error())
            }
        }
        RegisterFormat::U16 => {
            let bytes: [u8; 2] = swapped
                .get(..2)
                .and_then(|b| b.try_into().ok())
                .ok_or_else(decode_error)?;
            Ok(f64::from(u16::from_be_bytes(bytes)))
        }
    }
}
