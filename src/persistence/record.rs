// src/persistence/record.rs

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::task::TaskId;
use crate::timestamp::parse_timestamp;

/// Timestamp fields of a persisted record, used when checking for legacy
/// offset-less values.
pub const TIMESTAMP_FIELDS: &[&str] = &[
    "assigned_at",
    "lease_expires",
    "lease_renewed_at",
    "last_progress_update",
];

/// What the store keeps per agent: the one task it holds and the lease
/// bookkeeping needed to rebuild the lease after a restart.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AssignmentRecord {
    pub task_id: TaskId,
    #[serde(with = "crate::timestamp::flexible")]
    pub assigned_at: DateTime<Utc>,
    #[serde(default, with = "crate::timestamp::flexible_option")]
    pub lease_expires: Option<DateTime<Utc>>,
    #[serde(default, with = "crate::timestamp::flexible_option")]
    pub lease_renewed_at: Option<DateTime<Utc>>,
    #[serde(default)]
    pub renewal_count: u32,
    #[serde(default)]
    pub progress_percentage: u8,
    #[serde(default, with = "crate::timestamp::flexible_option")]
    pub last_progress_update: Option<DateTime<Utc>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub estimated_hours: Option<f64>,
}

impl AssignmentRecord {
    /// A fresh record with no lease information yet.
    pub fn new(task_id: impl Into<TaskId>, assigned_at: DateTime<Utc>) -> Self {
        Self {
            task_id: task_id.into(),
            assigned_at,
            lease_expires: None,
            lease_renewed_at: None,
            renewal_count: 0,
            progress_percentage: 0,
            last_progress_update: None,
            estimated_hours: None,
        }
    }

    /// Most recent sign of life for the task: progress, then renewal, then
    /// the assignment itself.
    pub fn last_activity(&self) -> DateTime<Utc> {
        self.last_progress_update
            .or(self.lease_renewed_at)
            .unwrap_or(self.assigned_at)
    }
}

/// Whether a raw JSON record carries any offset-less timestamp.
pub fn has_legacy_timestamps(record: &Value) -> bool {
    TIMESTAMP_FIELDS.iter().any(|field| {
        record
            .get(*field)
            .and_then(Value::as_str)
            .and_then(parse_timestamp)
            .map(|p| p.legacy)
            .unwrap_or(false)
    })
}
