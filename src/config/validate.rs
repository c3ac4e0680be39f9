// src/config/validate.rs

use crate::config::model::{RawSchedulerConfig, SchedulerConfig};
use crate::errors::{Result, TaskwardenError};

impl TryFrom<RawSchedulerConfig> for SchedulerConfig {
    type Error = TaskwardenError;

    fn try_from(raw: RawSchedulerConfig) -> std::result::Result<Self, Self::Error> {
        validate_config(&raw)?;
        Ok(SchedulerConfig::new_unchecked(
            raw.lease,
            raw.recovery,
            raw.persistence,
            raw.board,
        ))
    }
}

/// Check every section of a raw config.
pub fn validate_config(cfg: &RawSchedulerConfig) -> Result<()> {
    validate_lease_section(cfg)?;
    validate_recovery_section(cfg)?;
    validate_persistence_section(cfg)?;
    Ok(())
}

fn config_error(msg: String) -> TaskwardenError {
    TaskwardenError::Config(msg)
}

fn validate_lease_section(cfg: &RawSchedulerConfig) -> Result<()> {
    let lease = &cfg.lease;

    for (name, value) in [
        ("default_lease_hours", lease.default_lease_hours),
        ("min_lease_hours", lease.min_lease_hours),
        ("max_lease_hours", lease.max_lease_hours),
    ] {
        if !(value.is_finite() && value > 0.0) {
            return Err(config_error(format!(
                "[lease].{name} must be a positive number (got {value})"
            )));
        }
    }

    if lease.min_lease_hours > lease.max_lease_hours {
        return Err(config_error(format!(
            "[lease].min_lease_hours ({}) must not exceed max_lease_hours ({})",
            lease.min_lease_hours, lease.max_lease_hours
        )));
    }

    if !(lease.warning_threshold_hours.is_finite() && lease.warning_threshold_hours >= 0.0) {
        return Err(config_error(format!(
            "[lease].warning_threshold_hours must be >= 0 (got {})",
            lease.warning_threshold_hours
        )));
    }

    let decay = lease.renewal_decay_factor;
    if !(decay > 0.0 && decay <= 1.0) {
        return Err(config_error(format!(
            "[lease].renewal_decay_factor must be in (0, 1] (got {decay})"
        )));
    }

    if lease.check_interval_secs == 0 {
        return Err(config_error(
            "[lease].check_interval_secs must be >= 1 (got 0)".to_string(),
        ));
    }

    for (section, map) in [
        ("priority_multipliers", &lease.priority_multipliers),
        ("complexity_multipliers", &lease.complexity_multipliers),
    ] {
        for (key, value) in map {
            if !(value.is_finite() && *value > 0.0) {
                return Err(config_error(format!(
                    "[lease.{section}].{key} must be a positive number (got {value})"
                )));
            }
        }
    }

    for key in lease.priority_multipliers.keys() {
        if key.parse::<crate::types::Priority>().is_err() {
            return Err(config_error(format!(
                "[lease.priority_multipliers] has unknown priority '{key}'"
            )));
        }
    }

    Ok(())
}

fn validate_recovery_section(cfg: &RawSchedulerConfig) -> Result<()> {
    let recovery = &cfg.recovery;

    if recovery.agent_timeout_minutes == 0 {
        return Err(config_error(
            "[recovery].agent_timeout_minutes must be >= 1 (got 0)".to_string(),
        ));
    }

    if !(recovery.task_stuck_hours.is_finite() && recovery.task_stuck_hours > 0.0) {
        return Err(config_error(format!(
            "[recovery].task_stuck_hours must be a positive number (got {})",
            recovery.task_stuck_hours
        )));
    }

    if recovery.max_recovery_attempts == 0 {
        return Err(config_error(
            "[recovery].max_recovery_attempts must be >= 1 (got 0)".to_string(),
        ));
    }

    if recovery.check_interval_secs == 0 {
        return Err(config_error(
            "[recovery].check_interval_secs must be >= 1 (got 0)".to_string(),
        ));
    }

    Ok(())
}

fn validate_persistence_section(cfg: &RawSchedulerConfig) -> Result<()> {
    let ns = cfg.persistence.namespace.trim();
    if ns.is_empty() {
        return Err(config_error(
            "[persistence].namespace must not be empty".to_string(),
        ));
    }
    if ns.contains('/') || ns.contains('\\') || ns.starts_with('.') {
        return Err(config_error(format!(
            "[persistence].namespace must be a plain file stem (got '{ns}')"
        )));
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn default_config_is_valid() {
        assert!(SchedulerConfig::try_from(RawSchedulerConfig::default()).is_ok());
    }

    #[test]
    fn min_above_max_is_rejected() {
        let mut raw = RawSchedulerConfig::default();
        raw.lease.min_lease_hours = 10.0;
        raw.lease.max_lease_hours = 2.0;
        let err = SchedulerConfig::try_from(raw).unwrap_err();
        assert!(err.to_string().contains("min_lease_hours"));
    }

    #[test]
    fn decay_factor_must_be_in_unit_interval() {
        let mut raw = RawSchedulerConfig::default();
        raw.lease.renewal_decay_factor = 1.5;
        assert!(SchedulerConfig::try_from(raw).is_err());

        let mut raw = RawSchedulerConfig::default();
        raw.lease.renewal_decay_factor = 0.0;
        assert!(SchedulerConfig::try_from(raw).is_err());
    }

    #[test]
    fn unknown_priority_key_is_rejected() {
        let mut raw = RawSchedulerConfig::default();
        raw.lease.priority_multipliers.insert("asap".into(), 0.1);
        let err = SchedulerConfig::try_from(raw).unwrap_err();
        assert!(err.to_string().contains("asap"));
    }

    #[test]
    fn namespace_must_be_a_plain_stem() {
        let mut raw = RawSchedulerConfig::default();
        raw.persistence.namespace = "../escape".into();
        assert!(SchedulerConfig::try_from(raw).is_err());
    }

    #[test]
    fn zero_intervals_are_rejected() {
        let mut raw = RawSchedulerConfig::default();
        raw.recovery.check_interval_secs = 0;
        assert!(SchedulerConfig::try_from(raw).is_err());
    }
}
