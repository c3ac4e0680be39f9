// src/board/memory.rs

use chrono::Utc;
use tracing::debug;

use super::{BoardAdapter, BoardFuture};
use crate::errors::TaskwardenError;
use crate::sync::Guarded;
use crate::task::Task;
use crate::types::TaskStatus;

/// Board that lives entirely in process memory.
///
/// Clones share the same task list.
#[derive(Debug, Clone, Default)]
pub struct InMemoryBoard {
    tasks: Guarded<Vec<Task>>,
}

impl InMemoryBoard {
    pub fn new(tasks: Vec<Task>) -> Self {
        Self {
            tasks: Guarded::new(tasks),
        }
    }

    /// Add a task, replacing any task with the same id.
    pub async fn upsert(&self, task: Task) {
        let mut tasks = self.tasks.lock().await;
        match tasks.iter_mut().find(|t| t.id == task.id) {
            Some(existing) => *existing = task,
            None => tasks.push(task),
        }
    }

    pub async fn get(&self, task_id: &str) -> Option<Task> {
        let tasks = self.tasks.lock().await;
        tasks.iter().find(|t| t.id == task_id).cloned()
    }

    /// Mark a task as taken by `agent_id`.
    pub async fn assign(&self, task_id: &str, agent_id: &str) -> bool {
        let mut tasks = self.tasks.lock().await;
        match tasks.iter_mut().find(|t| t.id == task_id) {
            Some(t) => {
                t.status = TaskStatus::InProgress;
                t.assigned_to = Some(agent_id.to_string());
                t.updated_at = Utc::now();
                true
            }
            None => false,
        }
    }

    pub async fn snapshot(&self) -> Vec<Task> {
        self.tasks.lock().await.clone()
    }
}

/// Apply a status change to a task list in place.
pub(crate) fn apply_status(
    tasks: &mut [Task],
    task_id: &str,
    status: TaskStatus,
) -> crate::errors::Result<()> {
    let task = tasks
        .iter_mut()
        .find(|t| t.id == task_id)
        .ok_or_else(|| TaskwardenError::TaskNotFound(task_id.to_string()))?;

    task.status = status;
    if status == TaskStatus::Todo {
        task.assigned_to = None;
    }
    task.updated_at = Utc::now();
    debug!(task = %task_id, %status, "board status updated");
    Ok(())
}

impl BoardAdapter for InMemoryBoard {
    fn get_all_tasks(&self) -> BoardFuture<'_, Vec<Task>> {
        Box::pin(async move { Ok(self.tasks.lock().await.clone()) })
    }

    fn update_task_status<'a>(
        &'a self,
        task_id: &'a str,
        status: TaskStatus,
    ) -> BoardFuture<'a, ()> {
        Box::pin(async move {
            let mut tasks = self.tasks.lock().await;
            apply_status(&mut tasks, task_id, status)
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn moving_to_todo_clears_the_assignee() {
        let board = InMemoryBoard::new(vec![Task::new("t1", "Implement api")]);
        assert!(board.assign("t1", "agent-1").await);
        assert_eq!(
            board.get("t1").await.unwrap().assigned_to.as_deref(),
            Some("agent-1")
        );

        board.update_task_status("t1", TaskStatus::Todo).await.unwrap();
        let t = board.get("t1").await.unwrap();
        assert_eq!(t.status, TaskStatus::Todo);
        assert!(t.assigned_to.is_none());
    }

    #[tokio::test]
    async fn unknown_task_is_an_error() {
        let board = InMemoryBoard::default();
        let err = board
            .update_task_status("ghost", TaskStatus::Done)
            .await
            .unwrap_err();
        assert!(matches!(err, TaskwardenError::TaskNotFound(_)));
    }

    #[tokio::test]
    async fn upsert_replaces_by_id() {
        let board = InMemoryBoard::default();
        board.upsert(Task::new("t1", "first")).await;
        board.upsert(Task::new("t1", "second")).await;
        let all = board.get_all_tasks().await.unwrap();
        assert_eq!(all.len(), 1);
        assert_eq!(all[0].name, "second");
    }
}
