// SPDX-License-Identifier: PolyForm-Noncommercial-1.0.0
// Copyright (c) 2025 Sylvex. All rights reserved.

//! `h2o validate`: load, check and summarize a configuration file.

use anyhow::Context;
use h2o_config::{H2oConfig, SinkConfig};

use crate::cli::{Cli, OutputFormat, ValidateArgs};
use crate::error::{BinError, BinResult};

/// Loads the file as `run` would and prints a summary with warnings.
pub fn validate(cli: &Cli, args: ValidateArgs) -> BinResult<()> {
    let config_path = &cli.config;

    if !config_path.exists() {
        return Err(BinError::config(format!(
            "Configuration file not found: {}",
            config_path.display()
        )));
    }

    let config = h2o_config::load_config(config_path)
        .map_err(|e| BinError::from(e).with_context("Configuration validation failed"))?;

    let warnings = collect_warnings(&config);

    match args.format {
        OutputFormat::Text => {
            println!("✓ Configuration is valid: {}", config_path.display());
            println!();
            println!("Summary:");
            println!("  Serial line: {}", config.bus);
            println!("  Sensors: {}", config.sensors.len());
            for sensor in &config.sensors {
                println!(
                    "    - {} ({}, device {})",
                    sensor.id, sensor.sensor_type, sensor.device_id
                );
            }
            println!("  State dir: {}", config.state.dir.display());
            println!(
                "  API: {}",
                if config.api.enabled {
                    config.api.bind.to_string()
                } else {
                    "disabled".to_string()
                }
            );

            if !warnings.is_empty() {
                println!();
                println!("Warnings:");
                for warning in &warnings {
                    println!("  ⚠ {}", warning);
                }
            }

            if args.show_config {
                println!();
                println!("Parsed configuration:");
                let rendered = serde_json::to_string_pretty(&config)
                    .context("Failed to render parsed configuration")?;
                println!("{rendered}");
            }
        }
        OutputFormat::Json => {
            let output = serde_json::json!({
                "valid": true,
                "config_path": config_path.display().to_string(),
                "summary": {
                    "serial_port": config.bus.port,
                    "framing": config.bus.framing,
                    "sensor_count": config.sensors.len(),
                    "state_dir": config.state.dir.display().to_string(),
                    "api_enabled": config.api.enabled,
                    "api_bind": config.api.bind.to_string(),
                },
                "warnings": warnings,
                "config": if args.show_config { Some(&config) } else { None },
            });
            let rendered = serde_json::to_string_pretty(&output)
                .context("Failed to render validation report")?;
            println!("{rendered}");
        }
    }

    if args.strict && !warnings.is_empty() {
        return Err(BinError::config(format!(
            "Strict mode: {} warning(s) found",
            warnings.len()
        )));
    }

    Ok(())
}

/// Non-fatal findings worth reporting.
pub(crate) fn collect_warnings(config: &H2oConfig) -> Vec<String> {
    let mut warnings = Vec::new();

    if config.sensors.is_empty() {
        warnings.push("No sensors configured".to_string());
    }

    for sensor in &config.sensors {
        if sensor.kind().is_none() {
            warnings.push(format!(
                "Sensor '{}' has unknown type '{}' and will be skipped",
                sensor.id, sensor.sensor_type
            ));
        }
    }

    if !config.sensors.iter().any(|s| s.kind() == Some(h2o_core::SensorKind::Ph)) {
        warnings.push("No pH sensor configured; the controller will hold all relays off".to_string());
    }

    if let SinkConfig::JsonLines { path } = &config.telemetry.sink {
        if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
            if !parent.exists() {
                warnings.push(format!(
                    "Telemetry directory does not exist: {}",
                    parent.display()
                ));
            }
        }
    }

    warnings
}
