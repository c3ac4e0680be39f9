// src/board/mod.rs

//! Board adapter abstraction.
//!
//! The lease and recovery managers never talk to a task board directly; they
//! go through a [`BoardAdapter`]. Vendor integrations implement the trait
//! elsewhere. This crate ships two implementations:
//!
//! - [`InMemoryBoard`] keeps tasks in process memory (embedding, tests).
//! - [`JsonFileBoard`] keeps tasks in a JSON file (the CLI's `monitor`
//!   command and hand-inspectable setups).

use std::future::Future;
use std::pin::Pin;
use std::sync::Arc;
use std::time::Duration;

use tracing::warn;

use crate::errors::{Result, TaskwardenError};
use crate::task::Task;
use crate::types::TaskStatus;

pub mod file;
pub mod memory;

pub use file::JsonFileBoard;
pub use memory::InMemoryBoard;

/// Boxed future returned by board calls.
pub type BoardFuture<'a, T> = Pin<Box<dyn Future<Output = Result<T>> + Send + 'a>>;

/// What the scheduler core needs from a task board.
pub trait BoardAdapter: Send + Sync {
    /// Every task currently on the board.
    fn get_all_tasks(&self) -> BoardFuture<'_, Vec<Task>>;

    /// Move a task to `status`.
    ///
    /// Moving a task back to `Todo` should also clear its assignee.
    fn update_task_status<'a>(&'a self, task_id: &'a str, status: TaskStatus)
    -> BoardFuture<'a, ()>;
}

/// Shared handle to a board.
pub type SharedBoard = Arc<dyn BoardAdapter>;

/// Await a board call, failing with [`TaskwardenError::Timeout`] if it takes
/// longer than `limit`. `None` waits indefinitely.
pub async fn call_with_timeout<T, F>(what: &str, limit: Option<Duration>, fut: F) -> Result<T>
where
    F: Future<Output = Result<T>>,
{
    match limit {
        None => fut.await,
        Some(limit) => match tokio::time::timeout(limit, fut).await {
            Ok(res) => res,
            Err(_) => {
                warn!(call = what, timeout_ms = limit.as_millis() as u64, "board call timed out");
                Err(TaskwardenError::Timeout(format!(
                    "board call '{what}' exceeded {limit:?}"
                )))
            }
        },
    }
}
