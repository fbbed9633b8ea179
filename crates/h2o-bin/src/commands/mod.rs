// SPDX-License-Identifier: PolyForm-Noncommercial-1.0.0
// Copyright (c) 2025 Sylvex. All rights reserved.

//! Subcommand dispatch. Only `run` touches the RS-485 bus.

mod calibrate;
mod run;
mod validate;
mod version;

use crate::cli::{Cli, Commands};
use crate::error::BinResult;

/// Runs the subcommand named on the command line, `run` when none is.
pub async fn execute(cli: Cli) -> BinResult<()> {
    match cli.effective_command() {
        Commands::Run(args) => run::run(&cli, args).await,
        Commands::Validate(args) => validate::validate(&cli, args),
        Commands::Calibrate(args) => calibrate::calibrate(&cli, args),
        Commands::Version => {
            version::version();
            Ok(())
        }
    }
}
