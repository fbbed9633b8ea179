// SPDX-License-Identifier: PolyForm-Noncommercial-1.0.0
// Copyright (c) 2025 Sylvex. All rights reserved.

use h2o_core::{AttributeKey, Method, SensorKind};

/// Prints the build and the remote surface it speaks.
pub fn version() {
    println!("h2o {} ({}-{})", h2o_core::VERSION, std::env::consts::ARCH, std::env::consts::OS);
    println!("  modbus {}  config {}  api {}", h2o_modbus::VERSION, h2o_config::VERSION, h2o_api::VERSION);
    println!();
    println!("sensor types:    {}", join(SensorKind::ALL.iter().map(|k| k.as_str())));
    println!("remote methods:  {}", join(Method::ALL.iter().map(|m| m.as_str())));
    println!("attributes:      {}", join(AttributeKey::ALL.iter().map(|k| k.as_str())));
}

fn join<'a>(names: impl Iterator<Item = &'a str>) -> String {
    names.collect::<Vec<_>>().join(", ")
}
