// src/logging.rs

//! Logging setup for `taskwarden` using `tracing` + `tracing-subscriber`.
//!
//! Priority for determining the filter:
//! 1. `--log-level` CLI flag (if provided), applied to every target
//! 2. `TASKWARDEN_LOG` environment variable, which takes full filter
//!    directives (e.g. "info" or "warn,taskwarden::lease=debug")
//! 3. default to `info`
//!
//! Logs go to STDERR; stdout carries command output (validation reports,
//! statistics, fixed task JSON).

use anyhow::Result;
use tracing_subscriber::{EnvFilter, fmt};

use crate::cli::LogLevel;

/// Environment variable consulted when no `--log-level` is given.
pub const LOG_ENV_VAR: &str = "TASKWARDEN_LOG";

const DEFAULT_DIRECTIVE: &str = "info";

/// Install the global log subscriber.
///
/// Fails if a subscriber is already installed.
pub fn init_logging(cli_level: Option<LogLevel>) -> Result<()> {
    let filter = build_filter(cli_level, std::env::var(LOG_ENV_VAR).ok().as_deref());

    fmt()
        .with_env_filter(filter)
        .with_target(true)
        .with_thread_ids(false)
        .with_thread_names(false)
        .with_writer(std::io::stderr)
        .try_init()
        .map_err(|e| anyhow::anyhow!("failed to install log subscriber: {e}"))?;

    Ok(())
}

fn build_filter(cli_level: Option<LogLevel>, env_value: Option<&str>) -> EnvFilter {
    if let Some(lvl) = cli_level {
        return EnvFilter::new(directive_for(lvl));
    }

    let Some(raw) = env_value.map(str::trim).filter(|s| !s.is_empty()) else {
        return EnvFilter::new(DEFAULT_DIRECTIVE);
    };
    match EnvFilter::try_new(raw.to_ascii_lowercase()) {
        Ok(filter) => filter,
        Err(e) => {
            // No subscriber exists yet to report this through.
            eprintln!("ignoring invalid {LOG_ENV_VAR}={raw:?}: {e}");
            EnvFilter::new(DEFAULT_DIRECTIVE)
        }
    }
}

fn directive_for(lvl: LogLevel) -> &'static str {
    match lvl {
        LogLevel::Error => "error",
        LogLevel::Warn => "warn",
        LogLevel::Info => "info",
        LogLevel::Debug => "debug",
        LogLevel::Trace => "trace",
    }
}
