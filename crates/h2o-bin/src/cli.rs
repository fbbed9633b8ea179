// SPDX-License-Identifier: PolyForm-Noncommercial-1.0.0
// Copyright (c) 2025 Sylvex. All rights reserved.

//! Command line of the `h2o` daemon.

use std::path::PathBuf;

use clap::{Args, Parser, Subcommand};
use h2o_config::LoggingConfig;

/// Water treatment controller: polls RS-485 Modbus instruments, totals the
/// flow and holds pH in band by switching the pump, CO2 and heater relays.
#[derive(Parser, Debug)]
#[command(name = "h2o", version = h2o_core::VERSION, propagate_version = true)]
pub struct Cli {
    /// Configuration file (yaml, toml or json)
    #[arg(short, long, default_value = "h2o.yaml", env = "H2O_CONFIG", global = true)]
    pub config: PathBuf,

    /// trace, debug, info, warn or error; wins over `logging.level`
    #[arg(short, long, env = "H2O_LOG_LEVEL", global = true)]
    pub log_level: Option<String>,

    /// Wins over `logging.format`
    #[arg(long, env = "H2O_LOG_FORMAT", global = true)]
    pub log_format: Option<LogFormat>,

    /// Log warnings and errors only
    #[arg(short, long, global = true)]
    pub quiet: bool,

    /// Log at debug level
    #[arg(short, long, global = true)]
    pub verbose: bool,

    /// Subcommand; `run` when omitted
    #[command(subcommand)]
    pub command: Option<Commands>,
}

/// Subcommands. `run` is implied when none is given.
#[derive(Subcommand, Debug, Clone)]
pub enum Commands {
    /// Poll the sensors and control the plant
    Run(RunArgs),

    /// Check the configuration file without opening the serial port
    Validate(ValidateArgs),

    /// Store a two-point pH calibration from two buffer solutions
    Calibrate(CalibrateArgs),

    /// Print the build and the remote methods it accepts
    Version,
}

/// `h2o run`
#[derive(Args, Debug, Default, Clone)]
pub struct RunArgs {
    /// Serve the remote control API even when `api.enabled` is false
    #[arg(long)]
    pub api: bool,
}

/// `h2o validate`
#[derive(Args, Debug, Default, Clone)]
pub struct ValidateArgs {
    /// Print the resolved configuration
    #[arg(short, long)]
    pub show_config: bool,

    /// Report layout
    #[arg(short, long, default_value = "text")]
    pub format: OutputFormat,

    /// Fail on warnings as well
    #[arg(long)]
    pub strict: bool,
}

/// `h2o calibrate`
#[derive(Args, Debug, Clone)]
pub struct CalibrateArgs {
    /// Reference pH of the high buffer
    #[arg(long)]
    pub high_ref: f64,

    /// Reference pH of the low buffer
    #[arg(long)]
    pub low_ref: f64,

    /// Probe reading in the high buffer
    #[arg(long)]
    pub measured_high: f64,

    /// Probe reading in the low buffer
    #[arg(long)]
    pub measured_low: f64,

    /// Overrides `state.dir`
    #[arg(long)]
    pub state_dir: Option<PathBuf>,
}

/// Log line layout.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, clap::ValueEnum)]
pub enum LogFormat {
    /// Full text lines
    #[default]
    Text,
    /// One JSON object per line
    Json,
    /// Abbreviated text lines
    Compact,
}

impl From<h2o_config::LogFormat> for LogFormat {
    fn from(format: h2o_config::LogFormat) -> Self {
        match format {
            h2o_config::LogFormat::Text => Self::Text,
            h2o_config::LogFormat::Json => Self::Json,
            h2o_config::LogFormat::Compact => Self::Compact,
        }
    }
}

/// How `validate` prints its report.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, clap::ValueEnum)]
pub enum OutputFormat {
    /// Readable summary
    #[default]
    Text,
    /// Machine-readable report
    Json,
}

impl Cli {
    /// The subcommand to run.
    pub fn effective_command(&self) -> Commands {
        self.command
            .clone()
            .unwrap_or_else(|| Commands::Run(RunArgs::default()))
    }

    /// `-q`, then `-v`, then `--log-level`, then the file, then `info`.
    pub fn effective_log_level(&self, file: Option<&LoggingConfig>) -> String {
        let level = if self.quiet {
            "warn"
        } else if self.verbose {
            "debug"
        } else if let Some(level) = &self.log_level {
            level.as_str()
        } else {
            file.map_or("info", |l| l.level.as_str())
        };
        level.to_string()
    }

    /// `--log-format`, then the file, then text.
    pub fn effective_log_format(&self, file: Option<&LoggingConfig>) -> LogFormat {
        self.log_format
            .or_else(|| file.map(|l| l.format.into()))
            .unwrap_or_default()
    }
}
