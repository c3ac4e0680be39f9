#![allow(dead_code)]

use std::sync::Arc;

use taskwarden::clock::ManualClock;
use taskwarden::config::SchedulerConfig;
use taskwarden::lease::{AssignmentLease, AssignmentLeaseManager};
use taskwarden::persistence::AssignmentPersistence;
use taskwarden::recovery::TaskRecoveryManager;
use taskwarden::task::Task;
use taskwarden::types::TaskStatus;

pub use taskwarden_test_utils::builders::{TaskBuilder, task};
pub use taskwarden_test_utils::fake_board::FakeBoard;
pub use taskwarden_test_utils::{init_tracing, with_timeout};

/// Lease + recovery managers wired to a fake board and a manual clock.
pub struct Harness {
    pub config: SchedulerConfig,
    pub board: Arc<FakeBoard>,
    pub clock: ManualClock,
    pub persistence: AssignmentPersistence,
    pub leases: Arc<AssignmentLeaseManager>,
    pub recovery: Arc<TaskRecoveryManager>,
}

impl Harness {
    pub fn new(tasks: Vec<Task>) -> Self {
        Self::with_parts(
            SchedulerConfig::default(),
            tasks,
            AssignmentPersistence::in_memory(),
            ManualClock::starting_now(),
        )
    }

    pub fn with_parts(
        config: SchedulerConfig,
        tasks: Vec<Task>,
        persistence: AssignmentPersistence,
        clock: ManualClock,
    ) -> Self {
        init_tracing();

        let board = Arc::new(FakeBoard::new(tasks));
        let leases = Arc::new(AssignmentLeaseManager::new(
            config.lease.clone(),
            persistence.clone(),
            board.clone(),
            Arc::new(clock.clone()),
        ));
        let recovery = Arc::new(
            TaskRecoveryManager::new(
                config.recovery.clone(),
                persistence.clone(),
                board.clone(),
                Arc::new(clock.clone()),
            )
            .with_lease_manager(leases.clone()),
        );

        Self {
            config,
            board,
            clock,
            persistence,
            leases,
            recovery,
        }
    }

    /// Mark the task in progress for `agent` on the board and lease it.
    pub async fn hand_out(&self, task_id: &str, agent: &str) -> AssignmentLease {
        let mut task = self.board.task(task_id).expect("task on board");
        task.status = TaskStatus::InProgress;
        task.assigned_to = Some(agent.to_string());
        self.board.upsert(task.clone());

        self.leases
            .create_lease(task_id, agent, Some(&task))
            .await
            .expect("create lease")
    }
}
