// SPDX-License-Identifier: PolyForm-Noncommercial-1.0.0
// Copyright (c) 2025 Sylvex. All rights reserved.

//! Process-wide `tracing` subscriber.

use std::io::IsTerminal;

use tracing_subscriber::filter::Directive;
use tracing_subscriber::{fmt, layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

use crate::cli::LogFormat;

/// HTTP and I/O internals stay quiet whatever level the controller logs at.
const QUIET_TARGETS: [&str; 4] = ["hyper=warn", "tower=warn", "tower_http=info", "mio=warn"];

/// Installs the subscriber. `RUST_LOG`, when set, replaces `level` entirely.
///
/// A second call leaves the first subscriber in place.
pub fn init_logging(level: &str, format: LogFormat) {
    let registry = tracing_subscriber::registry().with(build_filter(level));
    let colored = std::io::stdout().is_terminal();

    let installed = match format {
        LogFormat::Text => registry
            .with(fmt::layer().with_target(true).with_ansi(colored))
            .try_init(),
        LogFormat::Compact => registry
            .with(fmt::layer().compact().with_target(false).with_ansi(colored))
            .try_init(),
        // Collectors get source locations and the active span.
        LogFormat::Json => registry
            .with(
                fmt::layer()
                    .json()
                    .with_file(true)
                    .with_line_number(true)
                    .with_current_span(true),
            )
            .try_init(),
    };
    if installed.is_err() {
        tracing::debug!("Logging already initialized");
    }
}

/// `RUST_LOG` if set, otherwise `level`, plus [`QUIET_TARGETS`].
pub fn build_filter(level: &str) -> EnvFilter {
    let base = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(level_name(level)));
    QUIET_TARGETS
        .iter()
        .filter_map(|target| target.parse::<Directive>().ok())
        .fold(base, EnvFilter::add_directive)
}

/// Canonical name for `level`; unknown names mean `info`.
fn level_name(level: &str) -> &'static str {
    h2o_config::LogLevel::parse(level).unwrap_or_default().as_str()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_level_names() {
        assert_eq!(level_name("loud"), "info");
        assert_eq!(level_name("DEBUG"), "debug");
        assert_eq!(level_name("warning"), "warn");
    }

    #[test]
    fn test_second_init_is_harmless() {
        init_logging("info", LogFormat::Compact);
        init_logging("debug", LogFormat::Json);
    }
}
