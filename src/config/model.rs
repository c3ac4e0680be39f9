// src/config/model.rs

use std::collections::BTreeMap;
use std::path::PathBuf;
use std::time::Duration as StdDuration;

use chrono::Duration;
use serde::{Deserialize, Serialize};

use crate::clock::hours;
use crate::task::Task;
use crate::types::{Priority, StorageMode};

/// Scheduler configuration as read from a TOML file.
///
/// ```toml
/// [lease]
/// default_lease_hours = 4.0
/// grace_period_minutes = 30
///
/// [lease.priority_multipliers]
/// urgent = 0.5
///
/// [recovery]
/// agent_timeout_minutes = 30
///
/// [persistence]
/// mode = "file"
/// dir = "data/assignments"
/// ```
///
/// All sections are optional and have reasonable defaults. This is the
/// unchecked form; convert it with `SchedulerConfig::try_from`.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct RawSchedulerConfig {
    #[serde(default)]
    pub lease: LeaseConfig,
    #[serde(default)]
    pub recovery: RecoveryConfig,
    #[serde(default)]
    pub persistence: PersistenceConfig,
    #[serde(default)]
    pub board: BoardConfig,
}

/// Validated scheduler configuration.
///
/// Construct via `TryFrom<RawSchedulerConfig>` (see `config::validate`) or
/// [`SchedulerConfig::default`], which is always valid.
#[derive(Debug, Clone, Default, Serialize)]
pub struct SchedulerConfig {
    pub lease: LeaseConfig,
    pub recovery: RecoveryConfig,
    pub persistence: PersistenceConfig,
    pub board: BoardConfig,
}

impl SchedulerConfig {
    /// Assemble a config without validation. Only `config::validate` and
    /// tests should need this.
    pub fn new_unchecked(
        lease: LeaseConfig,
        recovery: RecoveryConfig,
        persistence: PersistenceConfig,
        board: BoardConfig,
    ) -> Self {
        Self {
            lease,
            recovery,
            persistence,
            board,
        }
    }
}

/// `[lease]` section: durations and multipliers for the lease manager.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct LeaseConfig {
    /// Base lease length when a task has no estimate.
    pub default_lease_hours: f64,
    pub min_lease_hours: f64,
    pub max_lease_hours: f64,
    /// Leases with less than this much time left count as expiring soon.
    pub warning_threshold_hours: f64,
    /// Extra time after expiry before a lease is recovered.
    pub grace_period_minutes: u64,
    /// Each renewal multiplies the granted time by `decay ^ renewal_count`.
    pub renewal_decay_factor: f64,
    /// Renewal count from which a lease is reported as possibly stuck.
    pub stuck_threshold_renewals: u32,
    /// Renewal count above which renewals are logged at warn level.
    pub max_renewals: u32,
    /// Lease monitor sweep period.
    pub check_interval_secs: u64,
    /// Capacity of the in-memory lease event history.
    pub history_capacity: usize,
    /// Keyed by priority (`low`, `medium`, `high`, `urgent`).
    pub priority_multipliers: BTreeMap<String, f64>,
    /// Keyed by task label (`simple`, `complex`, `research`, `epic`, ...).
    pub complexity_multipliers: BTreeMap<String, f64>,
}

impl Default for LeaseConfig {
    fn default() -> Self {
        let priority_multipliers = [
            ("urgent", 0.5),
            ("high", 0.75),
            ("medium", 1.0),
            ("low", 1.5),
        ]
        .into_iter()
        .map(|(k, v)| (k.to_string(), v))
        .collect();

        let complexity_multipliers = [
            ("simple", 0.5),
            ("research", 1.5),
            ("complex", 2.0),
            ("epic", 3.0),
        ]
        .into_iter()
        .map(|(k, v)| (k.to_string(), v))
        .collect();

        Self {
            default_lease_hours: 4.0,
            min_lease_hours: 1.0,
            max_lease_hours: 24.0,
            warning_threshold_hours: 1.0,
            grace_period_minutes: 30,
            renewal_decay_factor: 0.9,
            stuck_threshold_renewals: 5,
            max_renewals: 10,
            check_interval_secs: 60,
            history_capacity: 1000,
            priority_multipliers,
            complexity_multipliers,
        }
    }
}

impl LeaseConfig {
    /// Multiplier for a priority; unknown keys count as 1.0.
    pub fn priority_multiplier(&self, priority: Priority) -> f64 {
        self.priority_multipliers
            .get(priority.as_key())
            .copied()
            .unwrap_or(1.0)
    }

    /// Multiplier for the first task label that has one configured, or 1.0.
    pub fn complexity_multiplier(&self, task: &Task) -> f64 {
        task.labels
            .iter()
            .find_map(|label| self.complexity_multipliers.get(&label.to_lowercase()))
            .copied()
            .unwrap_or(1.0)
    }

    /// Clamp a duration in hours to `[min_lease_hours, max_lease_hours]`.
    pub fn clamp_hours(&self, h: f64) -> f64 {
        h.max(self.min_lease_hours).min(self.max_lease_hours)
    }

    pub fn grace_period(&self) -> Duration {
        Duration::minutes(self.grace_period_minutes as i64)
    }

    pub fn warning_threshold(&self) -> Duration {
        hours(self.warning_threshold_hours)
    }

    pub fn check_interval(&self) -> StdDuration {
        StdDuration::from_secs(self.check_interval_secs)
    }
}

/// `[recovery]` section.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct RecoveryConfig {
    /// An agent without a heartbeat for this long is unhealthy.
    pub agent_timeout_minutes: u64,
    /// An in-progress task without progress for this long is stuck.
    pub task_stuck_hours: f64,
    /// Attempts after which a task's recovery is escalated.
    pub max_recovery_attempts: u32,
    /// Recovery monitor sweep period.
    pub check_interval_secs: u64,
    /// Capacity of the in-memory recovery history.
    pub history_capacity: usize,
}

impl Default for RecoveryConfig {
    fn default() -> Self {
        Self {
            agent_timeout_minutes: 30,
            task_stuck_hours: 4.0,
            max_recovery_attempts: 3,
            check_interval_secs: 300,
            history_capacity: 1000,
        }
    }
}

impl RecoveryConfig {
    pub fn agent_timeout(&self) -> Duration {
        Duration::minutes(self.agent_timeout_minutes as i64)
    }

    pub fn task_stuck_after(&self) -> Duration {
        hours(self.task_stuck_hours)
    }

    pub fn check_interval(&self) -> StdDuration {
        StdDuration::from_secs(self.check_interval_secs)
    }
}

/// `[persistence]` section.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct PersistenceConfig {
    pub mode: StorageMode,
    /// Directory holding the JSON documents.
    pub dir: PathBuf,
    /// Document name; the file is `<dir>/<namespace>.json`.
    pub namespace: String,
}

impl Default for PersistenceConfig {
    fn default() -> Self {
        Self {
            mode: StorageMode::File,
            dir: PathBuf::from("data/assignments"),
            namespace: "assignments".to_string(),
        }
    }
}

impl PersistenceConfig {
    /// File-backed config rooted at `dir`.
    pub fn in_dir(dir: impl Into<PathBuf>) -> Self {
        Self {
            dir: dir.into(),
            ..Self::default()
        }
    }

    pub fn file_path(&self) -> PathBuf {
        self.dir.join(format!("{}.json", self.namespace))
    }
}

/// `[board]` section.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct BoardConfig {
    /// Upper bound on any single board call; 0 disables the bound.
    pub call_timeout_secs: u64,
}

impl Default for BoardConfig {
    fn default() -> Self {
        Self {
            call_timeout_secs: 30,
        }
    }
}

impl BoardConfig {
    pub fn call_timeout(&self) -> Option<StdDuration> {
        if self.call_timeout_secs == 0 {
            None
        } else {
            Some(StdDuration::from_secs(self.call_timeout_secs))
        }
    }
}
