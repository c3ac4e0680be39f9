// src/recovery/manager.rs

use std::collections::{BTreeMap, HashMap, HashSet};
use std::fmt;
use std::sync::Arc;
use std::time::Duration as StdDuration;

use chrono::{DateTime, Utc};
use serde::Serialize;
use tracing::{debug, error, info, warn};

use crate::board::{SharedBoard, call_with_timeout};
use crate::clock::SharedClock;
use crate::config::RecoveryConfig;
use crate::errors::{Result, TaskwardenError};
use crate::history::BoundedHistory;
use crate::lease::{AssignmentLeaseManager, ConditionalRelease};
use crate::persistence::{AssignmentPersistence, AssignmentRecord};
use crate::sync::Guarded;
use crate::task::{AgentId, Task, TaskId};
use crate::types::TaskStatus;

/// Why a task was taken back from its agent.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum RecoveryReason {
    /// The owning agent stopped sending heartbeats.
    AgentTimeout,
    /// An unhealthy agent still has a persisted assignment.
    AgentDisconnected,
    /// In progress on the board, but nobody holds it.
    TaskAbandoned,
    /// Requested by an operator.
    ManualRecovery,
    /// The agent is alive but the task has made no progress for too long.
    TaskStuck,
}

impl fmt::Display for RecoveryReason {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            RecoveryReason::AgentTimeout => "agent_timeout",
            RecoveryReason::AgentDisconnected => "agent_disconnected",
            RecoveryReason::TaskAbandoned => "task_abandoned",
            RecoveryReason::ManualRecovery => "manual_recovery",
            RecoveryReason::TaskStuck => "task_stuck",
        };
        f.write_str(s)
    }
}

/// One entry of the recovery history.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct RecoveryRecord {
    pub task_id: TaskId,
    pub task_name: String,
    pub agent_id: Option<AgentId>,
    pub reason: RecoveryReason,
    pub at: DateTime<Utc>,
    /// 1-based attempt number for this task.
    pub attempt: u32,
    pub new_status: TaskStatus,
    pub success: bool,
    pub error: Option<String>,
}

/// A task found needing recovery.
#[derive(Debug, Clone, PartialEq)]
pub struct AbandonedTask {
    pub task: Task,
    pub agent_id: Option<AgentId>,
    pub reason: RecoveryReason,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct RecoveryFailure {
    pub task_id: TaskId,
    pub reason: RecoveryReason,
    pub error: String,
}

/// Aggregate result of [`TaskRecoveryManager::recover_all_abandoned_tasks`].
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct RecoveryReport {
    pub attempted: usize,
    pub recovered: usize,
    pub failed: usize,
    /// Already being recovered by a concurrent call.
    pub skipped: usize,
    /// Successful recoveries per reason.
    pub by_reason: BTreeMap<RecoveryReason, usize>,
    pub failures: Vec<RecoveryFailure>,
}

/// Tracks agent liveness and returns abandoned or stuck work to the board.
pub struct TaskRecoveryManager {
    config: RecoveryConfig,
    persistence: AssignmentPersistence,
    board: SharedBoard,
    board_timeout: Option<StdDuration>,
    clock: SharedClock,
    /// Unknown agents count as healthy until `agent_timeout` after this.
    started_at: DateTime<Utc>,
    leases: Option<Arc<AssignmentLeaseManager>>,
    heartbeats: Guarded<HashMap<AgentId, DateTime<Utc>>>,
    in_recovery: Guarded<HashSet<TaskId>>,
    attempts: Guarded<HashMap<TaskId, u32>>,
    history: Guarded<BoundedHistory<RecoveryRecord>>,
}

impl fmt::Debug for TaskRecoveryManager {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("TaskRecoveryManager")
            .field("config", &self.config)
            .field("started_at", &self.started_at)
            .field("board_timeout", &self.board_timeout)
            .field("has_lease_manager", &self.leases.is_some())
            .finish_non_exhaustive()
    }
}

impl TaskRecoveryManager {
    pub fn new(
        config: RecoveryConfig,
        persistence: AssignmentPersistence,
        board: SharedBoard,
        clock: SharedClock,
    ) -> Self {
        let started_at = clock.now();
        let history = BoundedHistory::new(config.history_capacity);
        Self {
            config,
            persistence,
            board,
            board_timeout: None,
            clock,
            started_at,
            leases: None,
            heartbeats: Guarded::new(HashMap::new()),
            in_recovery: Guarded::new(HashSet::new()),
            attempts: Guarded::new(HashMap::new()),
            history: Guarded::new(history),
        }
    }

    /// Release the task's lease as part of every recovery.
    pub fn with_lease_manager(mut self, leases: Arc<AssignmentLeaseManager>) -> Self {
        self.leases = Some(leases);
        self
    }

    /// Bound every board call made by this manager.
    pub fn with_board_timeout(mut self, limit: Option<StdDuration>) -> Self {
        self.board_timeout = limit;
        self
    }

    pub fn config(&self) -> &RecoveryConfig {
        &self.config
    }

    pub async fn update_agent_heartbeat(&self, agent_id: &str) {
        let now = self.clock.now();
        let previous = self
            .heartbeats
            .lock()
            .await
            .insert(agent_id.to_string(), now);
        if previous.is_none() {
            info!(agent = %agent_id, "first heartbeat from agent");
        } else {
            debug!(agent = %agent_id, "heartbeat");
        }
    }

    /// Whether the agent has sent a heartbeat within `agent_timeout_minutes`.
    ///
    /// An agent never seen is given the benefit of the doubt for the first
    /// `agent_timeout_minutes` after this manager started, so a restart does
    /// not immediately recover every task.
    pub async fn check_agent_health(&self, agent_id: &str) -> bool {
        let last_seen = self.heartbeats.lock().await.get(agent_id).copied();
        self.is_healthy(last_seen, self.clock.now())
    }

    fn is_healthy(&self, last_seen: Option<DateTime<Utc>>, now: DateTime<Utc>) -> bool {
        let timeout = self.config.agent_timeout();
        match last_seen {
            Some(seen) => now - seen < timeout,
            None => now - self.started_at < timeout,
        }
    }

    /// Forget an agent's heartbeat. Returns whether it was known.
    pub async fn remove_agent(&self, agent_id: &str) -> bool {
        let removed = self.heartbeats.lock().await.remove(agent_id).is_some();
        if removed {
            info!(agent = %agent_id, "agent removed from heartbeat tracking");
        }
        removed
    }

    /// Agents that have sent at least one heartbeat, sorted.
    pub async fn known_agents(&self) -> Vec<AgentId> {
        let mut agents: Vec<AgentId> = self.heartbeats.lock().await.keys().cloned().collect();
        agents.sort();
        agents
    }

    pub async fn last_heartbeat(&self, agent_id: &str) -> Option<DateTime<Utc>> {
        self.heartbeats.lock().await.get(agent_id).copied()
    }

    async fn fetch_tasks(&self) -> Result<Vec<Task>> {
        call_with_timeout("get_all_tasks", self.board_timeout, self.board.get_all_tasks()).await
    }

    /// Scan the board and the assignment store for work to take back.
    ///
    /// In-progress tasks are checked first: an owner with no heartbeat and no
    /// renewal within `agent_timeout_minutes` means
    /// [`AgentTimeout`](RecoveryReason::AgentTimeout), no progress for
    /// `task_stuck_hours` means [`TaskStuck`](RecoveryReason::TaskStuck), and
    /// no owner at all means [`TaskAbandoned`](RecoveryReason::TaskAbandoned).
    /// Remaining assignments held by silent agents are reported as
    /// [`AgentDisconnected`](RecoveryReason::AgentDisconnected). Tasks already
    /// being recovered are skipped. Attempt counts of tasks that are done or
    /// no longer on the board are dropped.
    pub async fn find_abandoned_tasks(&self) -> Result<Vec<AbandonedTask>> {
        let tasks = self.fetch_tasks().await?;
        self.prune_attempts(&tasks).await;
        let assignments = self.persistence.load_assignments().await;
        let heartbeats = self.heartbeats.lock().await.clone();
        let in_recovery = self.in_recovery.lock().await.clone();
        let now = self.clock.now();

        let owners: HashMap<&str, (&AgentId, &AssignmentRecord)> = assignments
            .iter()
            .map(|(agent, rec)| (rec.task_id.as_str(), (agent, rec)))
            .collect();
        let applies = |reason: RecoveryReason, agent: &str, rec: &AssignmentRecord| {
            self.still_applies(reason, heartbeats.get(agent).copied(), rec.last_activity(), now)
        };

        let mut found: Vec<AbandonedTask> = Vec::new();
        let mut captured: HashSet<&str> = HashSet::new();

        for task in tasks.iter().filter(|t| t.status == TaskStatus::InProgress) {
            if in_recovery.contains(&task.id) {
                debug!(task = %task.id, "task already being recovered; skipping");
                continue;
            }

            let reason = match owners.get(task.id.as_str()) {
                Some((agent, rec)) => {
                    if applies(RecoveryReason::AgentTimeout, agent.as_str(), *rec) {
                        RecoveryReason::AgentTimeout
                    } else if applies(RecoveryReason::TaskStuck, agent.as_str(), *rec) {
                        RecoveryReason::TaskStuck
                    } else {
                        continue;
                    }
                }
                None => RecoveryReason::TaskAbandoned,
            };
            let agent_id = match owners.get(task.id.as_str()) {
                Some((agent, _)) => Some((*agent).clone()),
                None => task.assigned_to.clone(),
            };
            let abandoned = AbandonedTask {
                task: task.clone(),
                agent_id,
                reason,
            };
            captured.insert(task.id.as_str());
            found.push(abandoned);
        }

        let by_id: HashMap<&str, &Task> = tasks.iter().map(|t| (t.id.as_str(), t)).collect();
        let mut agents: Vec<(&AgentId, &AssignmentRecord)> = assignments.iter().collect();
        agents.sort_by(|a, b| a.0.cmp(b.0));

        for (agent, rec) in agents {
            if captured.contains(rec.task_id.as_str())
                || in_recovery.contains(&rec.task_id)
                || !applies(RecoveryReason::AgentDisconnected, agent.as_str(), rec)
            {
                continue;
            }

            match by_id.get(rec.task_id.as_str()) {
                Some(task) if task.status == TaskStatus::Done => {
                    info!(agent = %agent, task = %rec.task_id, "clearing assignment of completed task");
                    self.persistence
                        .remove_assignment_for_task(agent, &rec.task_id)
                        .await?;
                }
                Some(task) => found.push(AbandonedTask {
                    task: (*task).clone(),
                    agent_id: Some(agent.clone()),
                    reason: RecoveryReason::AgentDisconnected,
                }),
                None => {
                    warn!(
                        agent = %agent,
                        task = %rec.task_id,
                        "assigned task no longer on board; removing stale assignment"
                    );
                    self.persistence
                        .remove_assignment_for_task(agent, &rec.task_id)
                        .await?;
                }
            }
        }

        if !found.is_empty() {
            info!(count = found.len(), "abandoned tasks found");
        }
        Ok(found)
    }

    /// Take `task` back from `agent_id` and move it to `new_status`.
    ///
    /// `reason` is checked again against the task's lease (or its stored
    /// assignment when it has no lease) before anything is released: if the
    /// agent has renewed or reported progress since the task was flagged, the
    /// task is left alone and `Ok(false)` is returned. Otherwise the lease and
    /// the assignment are removed and the board is updated. Also returns
    /// `Ok(false)` if the task is already being recovered by another call.
    /// Every attempt that goes ahead is recorded in the history.
    pub async fn recover_task(
        &self,
        task: &Task,
        agent_id: Option<&str>,
        reason: RecoveryReason,
        new_status: TaskStatus,
    ) -> Result<bool> {
        if !self.in_recovery.lock().await.insert(task.id.clone()) {
            debug!(task = %task.id, "recovery already in progress");
            return Ok(false);
        }

        let result = self.take_back(task, agent_id, reason, new_status).await;
        self.in_recovery.lock().await.remove(&task.id);

        let result = match result {
            Ok(false) => {
                info!(
                    task = %task.id,
                    agent = agent_id.unwrap_or("-"),
                    %reason,
                    "task made progress since it was flagged; recovery skipped"
                );
                return Ok(false);
            }
            Ok(true) => Ok(()),
            Err(e) => Err(e),
        };

        let attempt = {
            let mut attempts = self.attempts.lock().await;
            let n = attempts.entry(task.id.clone()).or_insert(0);
            *n += 1;
            *n
        };
        if attempt >= self.config.max_recovery_attempts {
            error!(
                task = %task.id,
                attempts = attempt,
                max = self.config.max_recovery_attempts,
                "task keeps needing recovery; escalate to an operator"
            );
        }

        let record = RecoveryRecord {
            task_id: task.id.clone(),
            task_name: task.name.clone(),
            agent_id: agent_id.map(str::to_string),
            reason,
            at: self.clock.now(),
            attempt,
            new_status,
            success: result.is_ok(),
            error: result.as_ref().err().map(|e| e.to_string()),
        };
        self.history.lock().await.push(record);

        match result {
            Ok(()) => {
                info!(
                    task = %task.id,
                    agent = agent_id.unwrap_or("-"),
                    %reason,
                    status = %new_status,
                    attempt,
                    "task recovered"
                );
                Ok(true)
            }
            Err(e) => {
                warn!(task = %task.id, %reason, error = %e, "task recovery failed");
                Err(e)
            }
        }
    }

    /// Whether `reason` holds for a task last active at `activity` whose
    /// agent last sent a heartbeat at `last_seen`.
    ///
    /// A renewal counts as activity, so an agent that renews without sending
    /// heartbeats is not timed out. `TaskAbandoned` never holds once someone
    /// owns the task again.
    fn still_applies(
        &self,
        reason: RecoveryReason,
        last_seen: Option<DateTime<Utc>>,
        activity: DateTime<Utc>,
        now: DateTime<Utc>,
    ) -> bool {
        match reason {
            RecoveryReason::AgentTimeout | RecoveryReason::AgentDisconnected => {
                !self.is_healthy(last_seen, now) && now - activity >= self.config.agent_timeout()
            }
            RecoveryReason::TaskStuck => now - activity > self.config.task_stuck_after(),
            RecoveryReason::TaskAbandoned => false,
            RecoveryReason::ManualRecovery => true,
        }
    }

    /// Re-check `reason`, release what the agent holds, update the board.
    ///
    /// Returns `Ok(false)` without touching anything if `reason` no longer
    /// applies.
    async fn take_back(
        &self,
        task: &Task,
        agent_id: Option<&str>,
        reason: RecoveryReason,
        new_status: TaskStatus,
    ) -> Result<bool> {
        let heartbeats = self.heartbeats.lock().await.clone();
        let applies = |agent: &str, activity: DateTime<Utc>, now: DateTime<Utc>| {
            self.still_applies(reason, heartbeats.get(agent).copied(), activity, now)
        };

        let released = match &self.leases {
            Some(leases) => {
                leases
                    .release_if(&task.id, |lease, now| {
                        applies(&lease.agent_id, lease.last_renewed, now)
                    })
                    .await?
            }
            None => ConditionalRelease::NoLease,
        };

        match released {
            ConditionalRelease::Kept(_) => return Ok(false),
            ConditionalRelease::Released(lease) => {
                if let Some(agent) = agent_id.filter(|a| *a != lease.agent_id) {
                    self.persistence
                        .remove_assignment_for_task(agent, &task.id)
                        .await?;
                }
            }
            ConditionalRelease::NoLease => {
                if let Some((holder, rec)) = self.persistence.find_by_task(&task.id).await {
                    if !applies(&holder, rec.last_activity(), self.clock.now()) {
                        return Ok(false);
                    }
                    self.persistence
                        .remove_assignment_for_task(&holder, &task.id)
                        .await?;
                }
            }
        }

        call_with_timeout(
            "update_task_status",
            self.board_timeout,
            self.board.update_task_status(&task.id, new_status),
        )
        .await?;
        Ok(true)
    }

    /// Forget attempt counts of tasks that are done or gone from the board.
    async fn prune_attempts(&self, tasks: &[Task]) {
        let live: HashSet<&str> = tasks
            .iter()
            .filter(|t| t.status != TaskStatus::Done)
            .map(|t| t.id.as_str())
            .collect();
        let mut attempts = self.attempts.lock().await;
        let before = attempts.len();
        attempts.retain(|id, _| live.contains(id.as_str()));
        if attempts.len() < before {
            debug!(forgotten = before - attempts.len(), "recovery attempt counts pruned");
        }
    }

    /// Find and recover everything abandoned, returning tasks to `Todo`.
    ///
    /// A failure on one task is logged and counted; the rest still run.
    /// Only failing to read the board aborts the batch.
    pub async fn recover_all_abandoned_tasks(&self) -> Result<RecoveryReport> {
        let abandoned = self.find_abandoned_tasks().await?;
        let mut report = RecoveryReport::default();

        for item in &abandoned {
            report.attempted += 1;
            match self
                .recover_task(
                    &item.task,
                    item.agent_id.as_deref(),
                    item.reason,
                    TaskStatus::Todo,
                )
                .await
            {
                Ok(true) => {
                    report.recovered += 1;
                    *report.by_reason.entry(item.reason).or_insert(0) += 1;
                }
                Ok(false) => report.skipped += 1,
                Err(e) => {
                    error!(task = %item.task.id, reason = %item.reason, error = %e, "recovery failed");
                    report.failed += 1;
                    report.failures.push(RecoveryFailure {
                        task_id: item.task.id.clone(),
                        reason: item.reason,
                        error: e.to_string(),
                    });
                }
            }
        }

        if report.attempted > 0 {
            info!(
                attempted = report.attempted,
                recovered = report.recovered,
                failed = report.failed,
                skipped = report.skipped,
                "recovery sweep complete"
            );
        }
        Ok(report)
    }

    /// Operator-triggered recovery of an in-progress task.
    ///
    /// Returns `Ok(false)` if the task is not in progress.
    pub async fn manual_recover_task(&self, task_id: &str) -> Result<bool> {
        let tasks = self.fetch_tasks().await?;
        let task = tasks
            .into_iter()
            .find(|t| t.id == task_id)
            .ok_or_else(|| TaskwardenError::TaskNotFound(task_id.to_string()))?;

        if task.status != TaskStatus::InProgress {
            warn!(task = %task_id, status = %task.status, "manual recovery refused; task is not in progress");
            return Ok(false);
        }

        let agent = match self.persistence.get_worker_for_task(task_id).await {
            Some(agent) => Some(agent),
            None => task.assigned_to.clone(),
        };
        self.recover_task(
            &task,
            agent.as_deref(),
            RecoveryReason::ManualRecovery,
            TaskStatus::Todo,
        )
        .await
    }

    /// The newest `limit` recovery records, oldest first.
    pub async fn recovery_history(&self, limit: usize) -> Vec<RecoveryRecord> {
        self.history.lock().await.recent(limit)
    }

    /// How many times recovery has been attempted for `task_id`.
    pub async fn recovery_attempts(&self, task_id: &str) -> u32 {
        self.attempts
            .lock()
            .await
            .get(task_id)
            .copied()
            .unwrap_or(0)
    }
}
