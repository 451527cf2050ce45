// Copyright 2025-Present Datadog, Inc. https://www.datadoghq.com/
// SPDX-License-Identifier: Apache-2.0

use std::fs::File;
use std::path::PathBuf;
use std::sync::{LazyLock, Mutex};
use tracing_subscriber::EnvFilter;

const ENV_LOG_METHOD: &str = "PTYD_LOG_METHOD";
const LOG_METHOD_DISABLED: &str = "disabled";
const LOG_METHOD_STDOUT: &str = "stdout";
const LOG_METHOD_STDERR: &str = "stderr";

const ENV_LOG_LEVEL: &str = "PTYD_LOG_LEVEL";
const DEFAULT_LOG_LEVEL: &str = "warn";

#[derive(Debug, Clone, Eq, PartialEq, Default)]
pub enum LogMethod {
    Stdout,
    Stderr,
    File(PathBuf),
    #[default]
    Disabled,
}

#[derive(Debug, Clone)]
pub struct Config {
    pub log_method: LogMethod,
    pub log_level: String,
}

static ENV_CONFIG: LazyLock<Config> = LazyLock::new(FromEnv::config);

impl Config {
    pub fn get() -> &'static Self {
        &ENV_CONFIG
    }
}

pub struct FromEnv {}

impl FromEnv {
    pub fn log_method() -> LogMethod {
        let method = std::env::var(ENV_LOG_METHOD).unwrap_or_default();
        match method.as_str() {
            LOG_METHOD_STDOUT => LogMethod::Stdout,
            LOG_METHOD_STDERR => LogMethod::Stderr,
            method if method.starts_with("file://") => {
                // Not a real uri, just a plain (unencoded) path prefixed
                // with file://.
                LogMethod::File(PathBuf::from(&method[7..]))
            }
            // LOG_METHOD_DISABLED and anything unrecognized
            _ => LogMethod::default(),
        }
    }

    pub fn log_level() -> String {
        std::env::var(ENV_LOG_LEVEL).unwrap_or_else(|_| DEFAULT_LOG_LEVEL.to_string())
    }

    pub fn config() -> Config {
        Config {
            log_method: Self::log_method(),
            log_level: Self::log_level(),
        }
    }
}

/// Hooks tracing up to wherever `PTYD_LOG_METHOD` points. The child's
/// pre-exec window and the signal handlers never log through this.
pub fn enable_logging() -> anyhow::Result<()> {
    let config = Config::get();
    let filter = EnvFilter::try_new(&config.log_level)
        .map_err(|err| anyhow::anyhow!("log filter {:?}: {err}", config.log_level))?;
    let builder = tracing_subscriber::fmt().with_env_filter(filter);
    match &config.log_method {
        LogMethod::Disabled => return Ok(()),
        LogMethod::Stdout => builder.with_writer(std::io::stdout).try_init(),
        LogMethod::Stderr => builder.with_writer(std::io::stderr).try_init(),
        LogMethod::File(path) => {
            let file = File::options().create(true).append(true).open(path)?;
            builder.with_writer(Mutex::new(file)).try_init()
        }
    }
    .map_err(|err| anyhow::anyhow!("logger init: {err}"))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn file_method_strips_the_prefix() {
        // FromEnv reads the process environment, so drive the parser
        // through the same match arms directly.
        let method = "file:///var/log/ptyd.log";
        assert!(method.starts_with("file://"));
        assert_eq!(&method[7..], "/var/log/ptyd.log");
    }

    #[test]
    fn default_is_disabled() {
        assert_eq!(LogMethod::default(), LogMethod::Disabled);
        assert_eq!(LOG_METHOD_DISABLED, "disabled");
    }
}
