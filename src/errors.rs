// src/errors.rs

//! Crate-wide error types.
//!
//! [`TaskwardenError`] is the general error used by persistence, board
//! adapters and configuration. Structural graph problems get their own typed
//! [`GraphValidationError`] so pre-commit callers can match on the defect
//! without parsing strings.

use thiserror::Error;

#[derive(Error, Debug)]
pub enum TaskwardenError {
    #[error("Configuration error: {0}")]
    Config(String),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    #[error("TOML parsing error: {0}")]
    Toml(#[from] toml::de::Error),

    #[error("Task graph validation failed: {0}")]
    Graph(#[from] GraphValidationError),

    #[error("Board adapter error: {0}")]
    Board(String),

    #[error("Persistence error: {0}")]
    Persistence(String),

    #[error("Task not found: {0}")]
    TaskNotFound(String),

    #[error("Timed out: {0}")]
    Timeout(String),

    #[error(transparent)]
    Other(#[from] anyhow::Error),
}

/// A structural defect in a candidate task batch.
///
/// Every variant carries the offending task ids plus a multi-line message
/// naming each task, suitable for showing to whoever submitted the batch.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum GraphValidationError {
    /// Dependencies that point at ids absent from the batch.
    ///
    /// `pairs` holds every `(task_id, missing_dependency_id)`; the message
    /// lists at most five of them.
    #[error("{message}")]
    OrphanedDependencies {
        pairs: Vec<(String, String)>,
        message: String,
    },

    /// One or more dependency cycles. Each cycle is a path of task ids that
    /// starts and ends with the same id.
    #[error("{message}")]
    CircularDependency {
        cycles: Vec<Vec<String>>,
        message: String,
    },

    /// Terminal tasks (labelled `final`/`verification` or named
    /// `PROJECT_SUCCESS`) without any dependency.
    #[error("{message}")]
    TerminalWithoutDependencies {
        task_ids: Vec<String>,
        message: String,
    },
}

impl GraphValidationError {
    /// Every task id mentioned by this error, deduplicated, in first-seen order.
    pub fn task_ids(&self) -> Vec<String> {
        let mut out: Vec<String> = Vec::new();
        let mut push = |id: &String| {
            if !out.contains(id) {
                out.push(id.clone());
            }
        };
        match self {
            GraphValidationError::OrphanedDependencies { pairs, .. } => {
                for (task, _) in pairs {
                    push(task);
                }
            }
            GraphValidationError::CircularDependency { cycles, .. } => {
                for id in cycles.iter().flatten() {
                    push(id);
                }
            }
            GraphValidationError::TerminalWithoutDependencies { task_ids, .. } => {
                for id in task_ids {
                    push(id);
                }
            }
        }
        out
    }
}

pub use anyhow::Error;
pub type Result<T> = std::result::Result<T, TaskwardenError>;
