// src/config/loader.rs

use std::fs;
use std::path::{Path, PathBuf};

use tracing::debug;

use crate::config::model::{RawSchedulerConfig, SchedulerConfig};
use crate::errors::Result;

/// Load a configuration file from a given path and return the raw
/// `RawSchedulerConfig`.
///
/// This only performs TOML deserialization; it does **not** perform semantic
/// validation. Use [`load_and_validate`] for that.
pub fn load_from_path(path: impl AsRef<Path>) -> Result<RawSchedulerConfig> {
    let path = path.as_ref();
    let contents = fs::read_to_string(path)?;
    parse_str(&contents)
}

/// Parse TOML text into a raw config.
pub fn parse_str(contents: &str) -> Result<RawSchedulerConfig> {
    let config: RawSchedulerConfig = toml::from_str(contents)?;
    Ok(config)
}

/// Load a configuration file from path and validate it.
///
/// This is the recommended entry point:
///
/// - Reads TOML.
/// - Applies defaults (handled by `serde` + `Default` impls).
/// - Checks lease bounds, decay factor, multipliers, intervals and the
///   persistence namespace.
pub fn load_and_validate(path: impl AsRef<Path>) -> Result<SchedulerConfig> {
    let path = path.as_ref();
    let raw = load_from_path(path)?;
    let config = SchedulerConfig::try_from(raw)?;
    debug!(path = ?path, "loaded scheduler config");
    Ok(config)
}

/// Like [`load_and_validate`], but a missing file yields the defaults.
pub fn load_or_default(path: impl AsRef<Path>) -> Result<SchedulerConfig> {
    let path = path.as_ref();
    if !path.exists() {
        debug!(path = ?path, "config file not found; using defaults");
        return Ok(SchedulerConfig::default());
    }
    load_and_validate(path)
}

/// Default config location: `Taskwarden.toml` in the working directory.
pub fn default_config_path() -> PathBuf {
    PathBuf::from("Taskwarden.toml")
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::StorageMode;

    #[test]
    fn partial_sections_fall_back_to_defaults() {
        let raw = parse_str(
            r#"
[lease]
grace_period_minutes = 5

[lease.priority_multipliers]
urgent = 0.25

[persistence]
mode = "memory"
"#,
        )
        .unwrap();

        assert_eq!(raw.lease.grace_period_minutes, 5);
        assert_eq!(raw.lease.default_lease_hours, 4.0);
        // A provided table replaces the default one.
        assert_eq!(raw.lease.priority_multipliers.len(), 1);
        assert_eq!(raw.persistence.mode, StorageMode::Memory);
        assert_eq!(raw.recovery.agent_timeout_minutes, 30);
    }

    #[test]
    fn invalid_toml_is_a_toml_error() {
        let err = parse_str("[lease\nbroken").unwrap_err();
        assert!(matches!(err, crate::errors::TaskwardenError::Toml(_)));
    }

    #[test]
    fn missing_file_gives_defaults() {
        let cfg = load_or_default("/definitely/not/here/Taskwarden.toml").unwrap();
        assert_eq!(cfg.lease.max_lease_hours, 24.0);
    }
}
