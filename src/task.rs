// src/task.rs

//! The canonical task record shared by every component.

use std::collections::HashMap;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::types::{Priority, TaskStatus};

/// Canonical task id type used throughout the crate.
pub type TaskId = String;

/// Canonical agent id type used throughout the crate.
pub type AgentId = String;

/// Labels that mark a task as terminal (a project-level final check).
pub const TERMINAL_LABELS: &[&str] = &["final", "verification"];

/// Name marker for the synthetic "project succeeded" task.
pub const PROJECT_SUCCESS_MARKER: &str = "PROJECT_SUCCESS";

/// A unit of work on the board.
///
/// `dependencies` lists the ids this task waits on; across a batch they must
/// reference existing tasks and form a DAG (see
/// [`TaskGraphValidator`](crate::graph::TaskGraphValidator)).
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Task {
    pub id: TaskId,
    pub name: String,
    #[serde(default)]
    pub description: String,
    #[serde(default)]
    pub status: TaskStatus,
    #[serde(default)]
    pub priority: Priority,
    /// Ordered set of labels; duplicates are ignored by [`Task::add_label`].
    #[serde(default)]
    pub labels: Vec<String>,
    #[serde(default)]
    pub dependencies: Vec<TaskId>,
    #[serde(default)]
    pub estimated_hours: f64,
    #[serde(default)]
    pub assigned_to: Option<AgentId>,
    #[serde(with = "crate::timestamp::flexible")]
    pub created_at: DateTime<Utc>,
    #[serde(with = "crate::timestamp::flexible")]
    pub updated_at: DateTime<Utc>,
}

impl Task {
    /// A `Todo`, medium-priority task with no labels or dependencies.
    pub fn new(id: impl Into<TaskId>, name: impl Into<String>) -> Self {
        let now = Utc::now();
        Self {
            id: id.into(),
            name: name.into(),
            description: String::new(),
            status: TaskStatus::Todo,
            priority: Priority::Medium,
            labels: Vec::new(),
            dependencies: Vec::new(),
            estimated_hours: 0.0,
            assigned_to: None,
            created_at: now,
            updated_at: now,
        }
    }

    /// Case-insensitive label check.
    pub fn has_label(&self, label: &str) -> bool {
        self.labels.iter().any(|l| l.eq_ignore_ascii_case(label))
    }

    /// Add a label unless an equal one (ignoring case) is already present.
    pub fn add_label(&mut self, label: impl Into<String>) {
        let label = label.into();
        if !self.has_label(&label) {
            self.labels.push(label);
        }
    }

    /// Add a dependency unless it is already listed.
    ///
    /// Returns `true` if the dependency was added.
    pub fn add_dependency(&mut self, dep: &str) -> bool {
        if self.dependencies.iter().any(|d| d == dep) {
            return false;
        }
        self.dependencies.push(dep.to_string());
        true
    }

    /// Remove a dependency. Returns `true` if it was present.
    pub fn remove_dependency(&mut self, dep: &str) -> bool {
        let before = self.dependencies.len();
        self.dependencies.retain(|d| d != dep);
        self.dependencies.len() != before
    }

    /// Whether this is a terminal task: labelled `final`/`verification`, or
    /// named with the `PROJECT_SUCCESS` marker.
    pub fn is_terminal(&self) -> bool {
        TERMINAL_LABELS.iter().any(|l| self.has_label(l))
            || self.name.contains(PROJECT_SUCCESS_MARKER)
    }

    /// Short `name (id)` form used in diagnostics.
    pub fn display_name(&self) -> String {
        format!("'{}' ({})", self.name, self.id)
    }
}

/// DONE tasks whose dependencies are not all DONE.
///
/// Returns `(task_id, dependency_id)` pairs. This is a check only; nothing is
/// corrected. Dependencies missing from `tasks` are not reported here (the
/// orphan check owns those).
pub fn done_dependency_violations(tasks: &[Task]) -> Vec<(TaskId, TaskId)> {
    let by_id: HashMap<&str, &Task> = tasks.iter().map(|t| (t.id.as_str(), t)).collect();

    let mut out = Vec::new();
    for task in tasks.iter().filter(|t| t.status == TaskStatus::Done) {
        for dep in &task.dependencies {
            if let Some(d) = by_id.get(dep.as_str()) {
                if d.status != TaskStatus::Done {
                    out.push((task.id.clone(), dep.clone()));
                }
            }
        }
    }
    out
}
