// src/board/file.rs

use std::path::{Path, PathBuf};

use tracing::info;

use super::memory::apply_status;
use super::{BoardAdapter, BoardFuture};
use crate::errors::Result;
use crate::persistence::atomic::{read_if_exists, write_json_atomic};
use crate::sync::Guarded;
use crate::task::Task;
use crate::types::TaskStatus;

/// Board stored as a JSON array of tasks in a single file.
///
/// Every status update re-reads the file, edits it, and writes it back
/// atomically, so edits made by hand between calls are picked up.
#[derive(Debug, Clone)]
pub struct JsonFileBoard {
    path: PathBuf,
    /// Serializes read-edit-write cycles from this process.
    write_lock: Guarded<()>,
}

impl JsonFileBoard {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self {
            path: path.into(),
            write_lock: Guarded::new(()),
        }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    async fn read_tasks(&self) -> Result<Vec<Task>> {
        match read_if_exists(&self.path).await? {
            Some(contents) if !contents.trim().is_empty() => Ok(serde_json::from_str(&contents)?),
            _ => Ok(Vec::new()),
        }
    }

    /// Replace the whole board.
    pub async fn write_tasks(&self, tasks: &[Task]) -> Result<()> {
        let _guard = self.write_lock.lock().await;
        write_json_atomic(&self.path, tasks).await
    }
}

impl BoardAdapter for JsonFileBoard {
    fn get_all_tasks(&self) -> BoardFuture<'_, Vec<Task>> {
        Box::pin(async move { self.read_tasks().await })
    }

    fn update_task_status<'a>(
        &'a self,
        task_id: &'a str,
        status: TaskStatus,
    ) -> BoardFuture<'a, ()> {
        Box::pin(async move {
            let _guard = self.write_lock.lock().await;
            let mut tasks = self.read_tasks().await?;
            apply_status(&mut tasks, task_id, status)?;
            write_json_atomic(&self.path, &tasks).await?;
            info!(task = %task_id, %status, path = ?self.path, "task status written to board file");
            Ok(())
        })
    }
}
