use std::collections::HashSet;
use std::sync::{Arc, Mutex};
use std::time::Duration;

use taskwarden::board::{BoardAdapter, BoardFuture};
use taskwarden::errors::TaskwardenError;
use taskwarden::task::Task;
use taskwarden::types::TaskStatus;

/// A fake board that:
/// - keeps tasks in memory
/// - records every status update it is asked to make
/// - can be told to fail updates for chosen task ids, fail listing, or
///   stall every call for a while.
#[derive(Clone, Default)]
pub struct FakeBoard {
    tasks: Arc<Mutex<Vec<Task>>>,
    updates: Arc<Mutex<Vec<(String, TaskStatus)>>>,
    failing: Arc<Mutex<HashSet<String>>>,
    fail_listing: Arc<Mutex<bool>>,
    delay: Arc<Mutex<Option<Duration>>>,
}

impl FakeBoard {
    pub fn new(tasks: Vec<Task>) -> Self {
        Self {
            tasks: Arc::new(Mutex::new(tasks)),
            ..Self::default()
        }
    }

    /// Status updates for `task_id` fail from now on.
    pub fn fail_updates_for(&self, task_id: &str) {
        self.failing.lock().unwrap().insert(task_id.to_string());
    }

    pub fn heal(&self, task_id: &str) {
        self.failing.lock().unwrap().remove(task_id);
    }

    pub fn fail_listing(&self, fail: bool) {
        *self.fail_listing.lock().unwrap() = fail;
    }

    /// Every call sleeps this long before answering.
    pub fn set_delay(&self, delay: Option<Duration>) {
        *self.delay.lock().unwrap() = delay;
    }

    pub fn upsert(&self, task: Task) {
        let mut tasks = self.tasks.lock().unwrap();
        match tasks.iter_mut().find(|t| t.id == task.id) {
            Some(existing) => *existing = task,
            None => tasks.push(task),
        }
    }

    pub fn task(&self, task_id: &str) -> Option<Task> {
        self.tasks
            .lock()
            .unwrap()
            .iter()
            .find(|t| t.id == task_id)
            .cloned()
    }

    pub fn status_of(&self, task_id: &str) -> Option<TaskStatus> {
        self.task(task_id).map(|t| t.status)
    }

    /// Every `(task_id, status)` update seen, in order.
    pub fn updates(&self) -> Vec<(String, TaskStatus)> {
        self.updates.lock().unwrap().clone()
    }

    fn current_delay(&self) -> Option<Duration> {
        *self.delay.lock().unwrap()
    }
}

impl BoardAdapter for FakeBoard {
    fn get_all_tasks(&self) -> BoardFuture<'_, Vec<Task>> {
        Box::pin(async move {
            if let Some(d) = self.current_delay() {
                tokio::time::sleep(d).await;
            }
            if *self.fail_listing.lock().unwrap() {
                return Err(TaskwardenError::Board("listing disabled by test".into()));
            }
            Ok(self.tasks.lock().unwrap().clone())
        })
    }

    fn update_task_status<'a>(
        &'a self,
        task_id: &'a str,
        status: TaskStatus,
    ) -> BoardFuture<'a, ()> {
        Box::pin(async move {
            if let Some(d) = self.current_delay() {
                tokio::time::sleep(d).await;
            }
            self.updates
                .lock()
                .unwrap()
                .push((task_id.to_string(), status));

            if self.failing.lock().unwrap().contains(task_id) {
                return Err(TaskwardenError::Board(format!(
                    "update of '{task_id}' rejected by test"
                )));
            }

            let mut tasks = self.tasks.lock().unwrap();
            let task = tasks
                .iter_mut()
                .find(|t| t.id == task_id)
                .ok_or_else(|| TaskwardenError::TaskNotFound(task_id.to_string()))?;
            task.status = status;
            if status == TaskStatus::Todo {
                task.assigned_to = None;
            }
            Ok(())
        })
    }
}
