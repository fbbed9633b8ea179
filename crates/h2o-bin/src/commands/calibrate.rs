// SPDX-License-Identifier: PolyForm-Noncommercial-1.0.0
// Copyright (c) 2025 Sylvex. All rights reserved.

//! Implementation of the `calibrate` command.

use h2o_core::{CalibrationStore, JsonStore};

use crate::cli::{CalibrateArgs, Cli};
use crate::error::{BinError, BinResult};

/// Computes a two-point pH calibration and writes it to the state directory.
///
/// A running controller picks the new values up on its next start; use the
/// `calibratePh` remote method to update it live.
pub fn calibrate(cli: &Cli, args: CalibrateArgs) -> BinResult<()> {
    let dir = match args.state_dir {
        Some(dir) => dir,
        None => {
            h2o_config::load_config(&cli.config)
                .map_err(|e| BinError::from(e).with_context("No --state-dir given"))?
                .state
                .dir
        }
    };

    let store = CalibrationStore::load(JsonStore::new(&dir));
    let cal = store.calibrate_ph(
        args.high_ref,
        args.low_ref,
        args.measured_high,
        args.measured_low,
    )?;

    println!("pH calibration stored in {}", dir.display());
    println!("  slope:     {:.6}", cal.slope);
    println!("  intercept: {:.6}", cal.intercept);
    Ok(())
}
