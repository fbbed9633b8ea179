// SPDX-License-Identifier: PolyForm-Noncommercial-1.0.0
// Copyright (c) 2025 Sylvex. All rights reserved.

use tracing::info;

use crate::cli::{Cli, RunArgs};
use crate::error::BinResult;
use crate::runtime::RuntimeBuilder;

/// Loads the configuration, opens the bus and controls the plant until stopped.
pub async fn run(cli: &Cli, args: RunArgs) -> BinResult<()> {
    let runtime = RuntimeBuilder::new()
        .config_path(&cli.config)
        .force_api(args.api)
        .build()?;

    let config = runtime.config();
    info!(
        config = %cli.config.display(),
        port = %config.bus.port,
        sensors = config.sensors.len(),
        state_dir = %config.state.dir.display(),
        "Controller configured"
    );

    runtime.run().await
}
