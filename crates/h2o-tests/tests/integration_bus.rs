// SPDX-License-Identifier: PolyForm-Noncommercial-1.0.0
// Copyright (c) 2025 Sylvex. All rights reserved.

//! # Bus Integration Tests
//!
//! Shared RS-485 bus behavior seen through the public h2o-modbus API:
//!
//! - `test_read_*`: framing, decoding and last-known-value fallback
//! - `test_arbiter_*`: exclusive access and debounce between holders

use std::sync::Arc;
use std::time::Duration;

use tokio::time::Instant;

use h2o_modbus::mock::{corrupt, response_frame, swapped_float, Reply, ScriptedLine};
use h2o_modbus::{Bus, ReadSource, RegisterFormat, TransportError};
use h2o_tests::common::fast_serial;

async fn bus_with(line: &ScriptedLine, devices: &[u8]) -> Arc<Bus> {
    let bus = Arc::new(Bus::open_with(line.clone(), &fast_serial()));
    {
        let mut registry = bus.acquire().await;
        for device in devices {
            registry.add_device(*device);
        }
    }
    bus
}

// =============================================================================
// Reads
// =============================================================================

#[tokio::test(start_paused = true)]
async fn test_read_float_and_u16() {
    let line = ScriptedLine::new();
    line.push_float(1, 7.25).push_u16(1, 1234);
    let bus = bus_with(&line, &[1]).await;

    let ph = bus.read(1, 0x0001, RegisterFormat::Float32).await.unwrap();
    assert_eq!(ph.value, 7.25);
    assert_eq!(ph.source, ReadSource::Fresh);

    let gap = bus.read(1, 0x0002, RegisterFormat::U16).await.unwrap();
    assert_eq!(gap.value, 1234.0);

    // Function 0x03, start register, then register count.
    let written = line.written();
    assert_eq!(&written[0][..6], &[0x01, 0x03, 0x00, 0x01, 0x00, 0x02]);
    assert_eq!(&written[1][..6], &[0x01, 0x03, 0x00, 0x02, 0x00, 0x01]);
}

#[tokio::test(start_paused = true)]
async fn test_read_falls_back_to_last_known_value() {
    let line = ScriptedLine::new();
    line.push_float(3, 21.5);
    line.push(3, Reply::Bytes(corrupt(response_frame(3, &swapped_float(99.0)), 4, 0)));
    line.push(3, Reply::Silence);
    let bus = bus_with(&line, &[3]).await;

    let fresh = bus.read(3, 0x0003, RegisterFormat::Float32).await.unwrap();
    assert!(!fresh.is_degraded());

    let after_crc = bus.read(3, 0x0003, RegisterFormat::Float32).await.unwrap();
    assert_eq!(after_crc.value, 21.5);
    assert!(after_crc.is_degraded());

    let after_timeout = bus.read(3, 0x0003, RegisterFormat::Float32).await.unwrap();
    assert_eq!(after_timeout.value, 21.5);
    assert!(after_timeout.is_degraded());

    let stats = bus.acquire().await.stats();
    assert_eq!(stats.transactions, 3);
    assert_eq!(stats.failures, 2);
    assert_eq!(stats.fallbacks, 2);
}

#[tokio::test(start_paused = true)]
async fn test_read_without_history_reports_no_data() {
    let line = ScriptedLine::new();
    line.push(4, Reply::Silence);
    let bus = bus_with(&line, &[4]).await;

    let err = bus.read(4, 0x0001, RegisterFormat::Float32).await.unwrap_err();
    assert!(matches!(err, TransportError::NoData { device: 4, register: 0x0001 }));
}

#[tokio::test(start_paused = true)]
async fn test_read_cache_is_per_register() {
    let line = ScriptedLine::new();
    line.push_float(1, 6.8);
    line.push(1, Reply::Silence);
    let bus = bus_with(&line, &[1]).await;

    bus.read(1, 0x0001, RegisterFormat::Float32).await.unwrap();
    let err = bus.read(1, 0x0003, RegisterFormat::Float32).await.unwrap_err();
    assert!(matches!(err, TransportError::NoData { register: 0x0003, .. }));
}

#[tokio::test(start_paused = true)]
async fn test_read_unregistered_device() {
    let line = ScriptedLine::new();
    let bus = bus_with(&line, &[1]).await;

    let err = bus.read(9, 0x0001, RegisterFormat::U16).await.unwrap_err();
    assert!(matches!(err, TransportError::UnknownDevice(9)));
    assert!(line.written().is_empty());
}

// =============================================================================
// Arbitration
// =============================================================================

#[tokio::test(start_paused = true)]
async fn test_arbiter_serializes_concurrent_readers() {
    let line = ScriptedLine::new();
    for _ in 0..4 {
        line.push_float(1, 7.0);
        line.push_float(2, 30.0);
    }
    let bus = bus_with(&line, &[1, 2]).await;

    let mut handles = Vec::new();
    for device in [1u8, 2] {
        let bus = bus.clone();
        handles.push(tokio::spawn(async move {
            for _ in 0..4 {
                bus.read(device, 0x0001, RegisterFormat::Float32).await.unwrap();
            }
        }));
    }
    for handle in handles {
        handle.await.unwrap();
    }

    assert_eq!(line.requests_to(1), 4);
    assert_eq!(line.requests_to(2), 4);

    // Every transaction starts at least one debounce after the previous one.
    let debounce = fast_serial().debounce;
    let times = line.write_times();
    for pair in times.windows(2) {
        assert!(pair[1] - pair[0] >= debounce, "frames {:?} too close", pair);
    }
}

#[tokio::test(start_paused = true)]
async fn test_arbiter_debounce_covers_timeout() {
    let line = ScriptedLine::new();
    line.push(1, Reply::Silence);
    line.push_u16(1, 5);
    let bus = bus_with(&line, &[1]).await;
    let config = fast_serial();

    let start = Instant::now();
    let _ = bus.read(1, 0x0001, RegisterFormat::U16).await;
    bus.read(1, 0x0001, RegisterFormat::U16).await.unwrap();

    let times = line.write_times();
    assert_eq!(times.len(), 2);
    assert!(times[1] - start >= config.timeout + config.debounce);
}
