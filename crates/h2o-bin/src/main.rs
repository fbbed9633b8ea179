// SPDX-License-Identifier: PolyForm-Noncommercial-1.0.0
// Copyright (c) 2025 Sylvex. All rights reserved.

//! H2O controller entry point.

use clap::Parser;

use h2o_bin::cli::Cli;
use h2o_bin::commands;
use h2o_bin::error::report_error_and_exit;
use h2o_bin::logging::init_logging;

#[tokio::main]
async fn main() {
    let cli = Cli::parse();

    // Commands report a bad file themselves; here it only seeds logging.
    let file_logging = h2o_config::load_config(&cli.config).ok().map(|c| c.logging);
    init_logging(
        &cli.effective_log_level(file_logging.as_ref()),
        cli.effective_log_format(file_logging.as_ref()),
    );

    if let Err(e) = commands::execute(cli).await {
        report_error_and_exit(e);
    }
}
