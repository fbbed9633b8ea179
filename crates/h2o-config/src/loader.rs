// SPDX-License-Identifier: PolyForm-Noncommercial-1.0.0
// Copyright (c) 2025 Sylvex. All rights reserved.

//! Reading a configuration file into a validated [`H2oConfig`].
//!
//! A file goes through these stages in order: `${NAME}` and `${NAME:fallback}`
//! placeholders are expanded, the text is parsed by extension, `H2O_*`
//! variables override single settings, relative paths are rebased onto the
//! file's directory, and the result is validated.
//!
//! | variable          | setting             |
//! |-------------------|---------------------|
//! | `H2O_BUS_PORT`    | `bus.port`          |
//! | `H2O_LOG_LEVEL`   | `logging.level`     |
//! | `H2O_STATE_DIR`   | `state.dir`         |
//! | `H2O_API_BIND`    | `api.bind`          |
//! | `H2O_API_ENABLED` | `api.enabled`       |

use std::path::{Path, PathBuf};

use serde::de::DeserializeOwned;
use tracing::{debug, info, warn};

use crate::error::{ConfigError, ConfigResult};
use crate::schema::{H2oConfig, LogLevel, SinkConfig};

/// Origin reported in parse errors for in-memory content.
const INLINE_ORIGIN: &str = "<string>";

/// Loads [`H2oConfig`] from files or strings.
///
/// ```no_run
/// use h2o_config::ConfigLoader;
///
/// let config = ConfigLoader::new().load("/etc/h2o/h2o.yaml").unwrap();
/// ```
#[derive(Debug, Clone)]
pub struct ConfigLoader {
    env_prefix: String,
    use_env: bool,
}

impl ConfigLoader {
    /// Reads placeholders and overrides from `H2O_*` variables.
    pub fn new() -> Self {
        Self {
            env_prefix: "H2O".to_string(),
            use_env: true,
        }
    }

    /// Reads overrides from `<prefix>_*` instead of `H2O_*`.
    pub fn with_prefix(mut self, prefix: impl Into<String>) -> Self {
        self.env_prefix = prefix.into();
        self
    }

    /// With `false`, the process environment is ignored entirely.
    pub fn with_env_vars(mut self, enabled: bool) -> Self {
        self.use_env = enabled;
        self
    }

    /// Loads `path`, choosing the parser from its extension.
    pub fn load(&self, path: impl AsRef<Path>) -> ConfigResult<H2oConfig> {
        let path = path.as_ref();
        if !path.is_file() {
            return Err(ConfigError::file_not_found(path));
        }
        let format = ConfigFormat::from_path(path)?;
        let text = std::fs::read_to_string(path).map_err(|e| ConfigError::io(path, e))?;

        let mut config = self.parse(&text, format, path)?;
        let dir = match path.parent() {
            Some(parent) if !parent.as_os_str().is_empty() => parent.to_path_buf(),
            _ => PathBuf::from("."),
        };
        rebase_paths(&mut config, &dir);
        config.validate()?;

        info!(
            path = %path.display(),
            sensors = config.sensors.len(),
            port = %config.bus.port,
            "Configuration loaded"
        );
        debug!(state_dir = %config.state.dir.display(), api = config.api.enabled, "Configuration paths");
        Ok(config)
    }

    /// Loads in-memory content. Relative paths stay relative to the working directory.
    pub fn load_from_str(&self, text: &str, format: ConfigFormat) -> ConfigResult<H2oConfig> {
        let config = self.parse(text, format, Path::new(INLINE_ORIGIN))?;
        config.validate()?;
        Ok(config)
    }

    fn parse(&self, text: &str, format: ConfigFormat, origin: &Path) -> ConfigResult<H2oConfig> {
        let parsed = if self.use_env {
            deserialize(&expand_placeholders(text, |name| std::env::var(name).ok()), format)
        } else {
            deserialize(text, format)
        };
        let mut config: H2oConfig = parsed.map_err(|message| ConfigError::parse(origin, message))?;

        if self.use_env {
            self.apply_overrides(&mut config, |name| std::env::var(name).ok())?;
        }
        Ok(config)
    }

    fn apply_overrides(
        &self,
        config: &mut H2oConfig,
        lookup: impl Fn(&str) -> Option<String>,
    ) -> ConfigResult<()> {
        let var = |suffix: &str| {
            let name = format!("{}_{suffix}", self.env_prefix);
            lookup(&name).map(|value| (name, value))
        };

        if let Some((_, port)) = var("BUS_PORT") {
            config.bus.port = port;
        }
        if let Some((name, level)) = var("LOG_LEVEL") {
            config.logging.level = LogLevel::parse(&level).ok_or_else(|| {
                ConfigError::invalid_env_var(name, "expected trace|debug|info|warn|error")
            })?;
        }
        if let Some((_, dir)) = var("STATE_DIR") {
            config.state.dir = PathBuf::from(dir);
        }
        if let Some((name, bind)) = var("API_BIND") {
            config.api.bind = bind
                .parse()
                .map_err(|_| ConfigError::invalid_env_var(name, "expected host:port"))?;
        }
        if let Some((_, enabled)) = var("API_ENABLED") {
            config.api.enabled = is_truthy(&enabled);
        }
        Ok(())
    }
}

impl Default for ConfigLoader {
    fn default() -> Self {
        Self::new()
    }
}

/// Configuration file syntax.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ConfigFormat {
    /// `.yaml` or `.yml`
    Yaml,
    /// `.toml`
    Toml,
    /// `.json`
    Json,
}

impl ConfigFormat {
    /// Picks the syntax from the extension of `path`, ignoring case.
    pub fn from_path(path: &Path) -> ConfigResult<Self> {
        let Some(ext) = path.extension().and_then(|e| e.to_str()) else {
            return Err(ConfigError::unsupported_format("(none)"));
        };
        match ext.to_ascii_lowercase().as_str() {
            "yaml" | "yml" => Ok(Self::Yaml),
            "toml" => Ok(Self::Toml),
            "json" => Ok(Self::Json),
            _ => Err(ConfigError::unsupported_format(ext)),
        }
    }
}

/// Replaces `${NAME}` and `${NAME:fallback}` using `lookup`.
///
/// A name with no value and no fallback is left in place, so the parser or
/// the validator reports it next to the setting it belongs to.
fn expand_placeholders(text: &str, lookup: impl Fn(&str) -> Option<String>) -> String {
    let mut out = String::with_capacity(text.len());
    let mut rest = text;

    while let Some(open) = rest.find("${") {
        out.push_str(&rest[..open]);
        let body = &rest[open + 2..];
        let Some(close) = body.find('}') else {
            out.push_str(&rest[open..]);
            return out;
        };

        let token = &rest[open..open + 2 + close + 1];
        let (name, fallback) = match body[..close].split_once(':') {
            Some((name, fallback)) => (name, Some(fallback)),
            None => (&body[..close], None),
        };
        match lookup(name) {
            Some(value) => out.push_str(&value),
            None => match fallback {
                Some(fallback) => out.push_str(fallback),
                None => {
                    warn!(name, "Placeholder has no value, left unexpanded");
                    out.push_str(token);
                }
            },
        }
        rest = &body[close + 1..];
    }

    out.push_str(rest);
    out
}

/// Makes `state.dir` and a JSON-lines sink path absolute against `dir`.
fn rebase_paths(config: &mut H2oConfig, dir: &Path) {
    if config.state.dir.is_relative() {
        config.state.dir = dir.join(&config.state.dir);
    }
    if let SinkConfig::JsonLines { path } = &mut config.telemetry.sink {
        if path.is_relative() {
            *path = dir.join(&*path);
        }
    }
}

fn deserialize<T: DeserializeOwned>(text: &str, format: ConfigFormat) -> Result<T, String> {
    match format {
        ConfigFormat::Yaml => config::Config::builder()
            .add_source(config::File::from_str(text, config::FileFormat::Yaml))
            .build()
            .and_then(|c| c.try_deserialize())
            .map_err(|e| e.to_string()),
        ConfigFormat::Toml => toml::from_str(text).map_err(|e| e.to_string()),
        ConfigFormat::Json => serde_json::from_str(text).map_err(|e| e.to_string()),
    }
}

fn is_truthy(value: &str) -> bool {
    ["1", "true", "yes", "on", "enabled"]
        .iter()
        .any(|t| value.trim().eq_ignore_ascii_case(t))
}

/// [`ConfigLoader::load`] with `H2O_*` overrides.
pub fn load_config(path: impl AsRef<Path>) -> ConfigResult<H2oConfig> {
    ConfigLoader::new().load(path)
}

/// [`ConfigLoader::load_from_str`] with `H2O_*` overrides.
pub fn load_config_str(text: &str, format: ConfigFormat) -> ConfigResult<H2oConfig> {
    ConfigLoader::new().load_from_str(text, format)
}
