// src/lease/manager.rs

use std::collections::HashMap;
use std::fmt;
use std::time::Duration as StdDuration;

use chrono::{DateTime, Duration, Utc};
use serde::Serialize;
use tracing::{debug, info, warn};

use super::duration::{initial_lease_hours, renewal_hours};
use crate::board::{SharedBoard, call_with_timeout};
use crate::clock::{SharedClock, as_hours, hours};
use crate::config::LeaseConfig;
use crate::errors::{Result, TaskwardenError};
use crate::history::BoundedHistory;
use crate::persistence::{AssignmentPersistence, AssignmentRecord};
use crate::sync::Guarded;
use crate::task::{AgentId, Task, TaskId};
use crate::types::TaskStatus;

/// Where a lease stands relative to the clock.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum LeaseState {
    Active,
    /// Less than the warning threshold remains.
    ExpiringSoon,
    Expired,
}

/// A time-bounded grant of one task to one agent.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct AssignmentLease {
    pub task_id: TaskId,
    pub agent_id: AgentId,
    pub assigned_at: DateTime<Utc>,
    pub lease_expires: DateTime<Utc>,
    pub last_renewed: DateTime<Utc>,
    pub renewal_count: u32,
    pub estimated_hours: f64,
    pub progress_percentage: u8,
    pub last_progress_message: Option<String>,
}

impl AssignmentLease {
    pub fn time_remaining(&self, now: DateTime<Utc>) -> Duration {
        self.lease_expires - now
    }

    pub fn is_expired(&self, now: DateTime<Utc>) -> bool {
        now >= self.lease_expires
    }

    /// Expired, and the grace period after expiry has also elapsed.
    pub fn is_past_grace(&self, now: DateTime<Utc>, grace: Duration) -> bool {
        now > self.lease_expires + grace
    }

    pub fn state(&self, now: DateTime<Utc>, warning_threshold: Duration) -> LeaseState {
        if self.is_expired(now) {
            LeaseState::Expired
        } else if self.time_remaining(now) < warning_threshold {
            LeaseState::ExpiringSoon
        } else {
            LeaseState::Active
        }
    }

    /// The persisted form of this lease.
    pub fn to_record(&self) -> AssignmentRecord {
        AssignmentRecord {
            task_id: self.task_id.clone(),
            assigned_at: self.assigned_at,
            lease_expires: Some(self.lease_expires),
            lease_renewed_at: (self.renewal_count > 0).then_some(self.last_renewed),
            renewal_count: self.renewal_count,
            progress_percentage: self.progress_percentage,
            last_progress_update: (self.renewal_count > 0).then_some(self.last_renewed),
            estimated_hours: (self.estimated_hours > 0.0).then_some(self.estimated_hours),
        }
    }

    /// Rebuild a lease from its persisted record.
    ///
    /// Records written before leases were persisted have no expiry; those get
    /// the default lease length counted from the assignment time.
    pub fn from_record(agent_id: &str, record: &AssignmentRecord, cfg: &LeaseConfig) -> Self {
        let last_renewed = record.lease_renewed_at.unwrap_or(record.assigned_at);
        let lease_expires = record
            .lease_expires
            .unwrap_or_else(|| record.assigned_at + hours(cfg.clamp_hours(cfg.default_lease_hours)));

        Self {
            task_id: record.task_id.clone(),
            agent_id: agent_id.to_string(),
            assigned_at: record.assigned_at,
            lease_expires,
            last_renewed,
            renewal_count: record.renewal_count,
            estimated_hours: record.estimated_hours.unwrap_or(0.0),
            progress_percentage: record.progress_percentage.min(100),
            last_progress_message: None,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum LeaseEventKind {
    Created,
    Renewed,
    Expired,
    Recovered,
    Released,
}

impl fmt::Display for LeaseEventKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            LeaseEventKind::Created => "created",
            LeaseEventKind::Renewed => "renewed",
            LeaseEventKind::Expired => "expired",
            LeaseEventKind::Recovered => "recovered",
            LeaseEventKind::Released => "released",
        };
        f.write_str(s)
    }
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct LeaseEvent {
    pub task_id: TaskId,
    pub agent_id: AgentId,
    pub kind: LeaseEventKind,
    pub at: DateTime<Utc>,
    pub detail: String,
}

/// Outcome of [`AssignmentLeaseManager::release_if`].
#[derive(Debug, Clone, PartialEq)]
pub enum ConditionalRelease {
    Released(AssignmentLease),
    /// The condition no longer held; the lease is untouched.
    Kept(AssignmentLease),
    NoLease,
}

/// Counts over the current lease map.
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct LeaseStatistics {
    pub total: usize,
    pub active: usize,
    pub expiring_soon: usize,
    pub expired: usize,
    /// Renewed at least `stuck_threshold_renewals` times.
    pub possibly_stuck: usize,
    pub average_renewals: f64,
    pub average_progress: f64,
}

/// Grants, renews, expires and recovers per-task leases.
///
/// The lease map is guarded by one lock held for each whole
/// read-modify-write sequence, including the persistence write and the board
/// call during recovery. A renewal and a recovery of the same task therefore
/// never interleave. Lock order is lease map, then persistence.
pub struct AssignmentLeaseManager {
    config: LeaseConfig,
    persistence: AssignmentPersistence,
    board: SharedBoard,
    board_timeout: Option<StdDuration>,
    clock: SharedClock,
    leases: Guarded<HashMap<TaskId, AssignmentLease>>,
    history: Guarded<BoundedHistory<LeaseEvent>>,
}

impl fmt::Debug for AssignmentLeaseManager {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("AssignmentLeaseManager")
            .field("config", &self.config)
            .field("persistence", &self.persistence)
            .field("board_timeout", &self.board_timeout)
            .finish_non_exhaustive()
    }
}

impl AssignmentLeaseManager {
    pub fn new(
        config: LeaseConfig,
        persistence: AssignmentPersistence,
        board: SharedBoard,
        clock: SharedClock,
    ) -> Self {
        let history = BoundedHistory::new(config.history_capacity);
        Self {
            config,
            persistence,
            board,
            board_timeout: None,
            clock,
            leases: Guarded::new(HashMap::new()),
            history: Guarded::new(history),
        }
    }

    /// Bound every board call made by this manager.
    pub fn with_board_timeout(mut self, limit: Option<StdDuration>) -> Self {
        self.board_timeout = limit;
        self
    }

    pub fn config(&self) -> &LeaseConfig {
        &self.config
    }

    pub fn persistence(&self) -> &AssignmentPersistence {
        &self.persistence
    }

    pub fn now(&self) -> DateTime<Utc> {
        self.clock.now()
    }

    async fn record(&self, lease: &AssignmentLease, kind: LeaseEventKind, detail: String) {
        let event = LeaseEvent {
            task_id: lease.task_id.clone(),
            agent_id: lease.agent_id.clone(),
            kind,
            at: self.clock.now(),
            detail,
        };
        self.history.lock().await.push(event);
    }

    /// Grant `task_id` to `agent_id`.
    ///
    /// Any existing lease for the task is replaced. The lease is persisted
    /// before it becomes visible in memory.
    pub async fn create_lease(
        &self,
        task_id: &str,
        agent_id: &str,
        task: Option<&Task>,
    ) -> Result<AssignmentLease> {
        let now = self.clock.now();
        let lease_hours = initial_lease_hours(&self.config, task);

        let lease = AssignmentLease {
            task_id: task_id.to_string(),
            agent_id: agent_id.to_string(),
            assigned_at: now,
            lease_expires: now + hours(lease_hours),
            last_renewed: now,
            renewal_count: 0,
            estimated_hours: task.map(|t| t.estimated_hours).unwrap_or(0.0),
            progress_percentage: 0,
            last_progress_message: None,
        };

        let mut leases = self.leases.lock().await;
        if let Some(previous) = leases.get(task_id) {
            warn!(
                task = %task_id,
                previous_agent = %previous.agent_id,
                agent = %agent_id,
                "task already leased; replacing existing lease"
            );
        }
        if let Some(other) = leases
            .values()
            .find(|l| l.agent_id == agent_id && l.task_id != task_id)
        {
            warn!(
                agent = %agent_id,
                held_task = %other.task_id,
                task = %task_id,
                "agent already holds another lease"
            );
        }

        self.persistence
            .save_assignment(agent_id, lease.to_record())
            .await?;
        leases.insert(task_id.to_string(), lease.clone());
        drop(leases);

        info!(
            task = %task_id,
            agent = %agent_id,
            hours = lease_hours,
            expires = %lease.lease_expires,
            "lease created"
        );
        self.record(&lease, LeaseEventKind::Created, format!("{lease_hours:.2}h"))
            .await;
        Ok(lease)
    }

    /// Extend a lease in response to a progress report.
    ///
    /// Returns `Ok(None)` when there is no lease for the task or it has
    /// already expired; an expired lease can only be recovered, never
    /// renewed. The caller must then treat the task as no longer held.
    pub async fn renew_lease(
        &self,
        task_id: &str,
        progress: u8,
        message: Option<&str>,
    ) -> Result<Option<AssignmentLease>> {
        let mut leases = self.leases.lock().await;
        let now = self.clock.now();

        let Some(current) = leases.get(task_id) else {
            debug!(task = %task_id, "renewal for unknown lease ignored");
            return Ok(None);
        };
        if current.is_expired(now) {
            warn!(
                task = %task_id,
                agent = %current.agent_id,
                expired_at = %current.lease_expires,
                "renewal refused; lease already expired"
            );
            return Ok(None);
        }

        let progress = progress.min(100);
        let grant = renewal_hours(
            &self.config,
            current.renewal_count,
            progress,
            current.estimated_hours,
        );

        let mut renewed = current.clone();
        renewed.lease_expires = now + hours(grant.hours);
        renewed.last_renewed = now;
        renewed.renewal_count += 1;
        renewed.progress_percentage = progress;
        if let Some(msg) = message {
            renewed.last_progress_message = Some(msg.to_string());
        }

        if grant.possibly_stuck {
            warn!(
                task = %task_id,
                agent = %renewed.agent_id,
                renewals = renewed.renewal_count,
                progress,
                "task may be stuck: little progress after repeated renewals"
            );
        }
        if renewed.renewal_count > self.config.max_renewals {
            warn!(
                task = %task_id,
                agent = %renewed.agent_id,
                renewals = renewed.renewal_count,
                max = self.config.max_renewals,
                "lease renewed beyond max_renewals"
            );
        }

        self.persistence
            .save_assignment(&renewed.agent_id, renewed.to_record())
            .await?;
        leases.insert(task_id.to_string(), renewed.clone());
        drop(leases);

        debug!(
            task = %task_id,
            agent = %renewed.agent_id,
            hours = grant.hours,
            renewals = renewed.renewal_count,
            progress,
            "lease renewed"
        );
        self.record(
            &renewed,
            LeaseEventKind::Renewed,
            format!("{:.2}h at {progress}%", grant.hours),
        )
        .await;
        Ok(Some(renewed))
    }

    /// Leases past expiry and past the grace period after it.
    pub async fn check_expired_leases(&self) -> Vec<AssignmentLease> {
        let now = self.clock.now();
        let grace = self.config.grace_period();
        let mut expired: Vec<AssignmentLease> = self
            .leases
            .lock()
            .await
            .values()
            .filter(|l| l.is_past_grace(now, grace))
            .cloned()
            .collect();
        expired.sort_by(|a, b| a.lease_expires.cmp(&b.lease_expires));
        expired
    }

    /// Return an expired lease's task to the board as `Todo`.
    ///
    /// Holds the lease lock for the whole sequence. Returns `Ok(false)` if the
    /// lease is already gone or has been replaced by one that is not past its
    /// grace period. On error the lease stays in place for the next sweep.
    pub async fn recover_expired_lease(&self, lease: &AssignmentLease) -> Result<bool> {
        let mut leases = self.leases.lock().await;
        let now = self.clock.now();

        let Some(current) = leases.get(&lease.task_id) else {
            debug!(task = %lease.task_id, "lease already recovered");
            return Ok(false);
        };
        if !current.is_past_grace(now, self.config.grace_period()) {
            debug!(
                task = %lease.task_id,
                agent = %current.agent_id,
                "lease is no longer past its grace period; skipping recovery"
            );
            return Ok(false);
        }
        let current = current.clone();

        self.record(
            &current,
            LeaseEventKind::Expired,
            format!("expired at {}", current.lease_expires),
        )
        .await;

        let update = call_with_timeout(
            "update_task_status",
            self.board_timeout,
            self.board
                .update_task_status(&current.task_id, TaskStatus::Todo),
        )
        .await;
        match update {
            Ok(()) => {}
            Err(TaskwardenError::TaskNotFound(_)) => {
                warn!(task = %current.task_id, "expired task no longer on board; dropping lease");
            }
            Err(e) => return Err(e),
        }

        self.persistence
            .remove_assignment_for_task(&current.agent_id, &current.task_id)
            .await?;
        leases.remove(&current.task_id);
        drop(leases);

        info!(
            task = %current.task_id,
            agent = %current.agent_id,
            overdue_minutes = (now - current.lease_expires).num_minutes(),
            "expired lease recovered; task returned to todo"
        );
        self.record(&current, LeaseEventKind::Recovered, "status set to todo".into())
            .await;
        Ok(true)
    }

    /// Leases inside the warning window and not yet expired.
    pub async fn get_expiring_leases(&self) -> Vec<AssignmentLease> {
        let now = self.clock.now();
        let threshold = self.config.warning_threshold();
        let mut out: Vec<AssignmentLease> = self
            .leases
            .lock()
            .await
            .values()
            .filter(|l| l.state(now, threshold) == LeaseState::ExpiringSoon)
            .cloned()
            .collect();
        out.sort_by(|a, b| a.lease_expires.cmp(&b.lease_expires));
        out
    }

    /// Rebuild the lease map from persisted assignments.
    ///
    /// Persisted records win over anything already in memory. Returns the
    /// number of leases loaded.
    pub async fn load_active_leases(&self) -> Result<usize> {
        let mut leases = self.leases.lock().await;
        let records = self.persistence.load_assignments().await;

        for (agent_id, record) in &records {
            let lease = AssignmentLease::from_record(agent_id, record, &self.config);
            if let Some(prev) = leases.get(&lease.task_id) {
                if prev.agent_id != lease.agent_id {
                    warn!(
                        task = %lease.task_id,
                        memory_agent = %prev.agent_id,
                        stored_agent = %lease.agent_id,
                        "persisted assignment replaces in-memory lease"
                    );
                }
            }
            leases.insert(lease.task_id.clone(), lease);
        }

        info!(loaded = records.len(), total = leases.len(), "active leases loaded");
        Ok(records.len())
    }

    /// Drop a lease without touching the board (completion or handoff).
    pub async fn release_lease(&self, task_id: &str) -> Result<Option<AssignmentLease>> {
        match self.release_if(task_id, |_, _| true).await? {
            ConditionalRelease::Released(lease) => Ok(Some(lease)),
            ConditionalRelease::Kept(_) | ConditionalRelease::NoLease => Ok(None),
        }
    }

    /// Drop the lease only if `still_applies` holds for it as of now.
    ///
    /// The check, the store removal and the in-memory removal all happen
    /// under the lease lock: a concurrent renewal either lands first and is
    /// seen by the check, or finds the lease gone and is refused.
    pub async fn release_if<F>(&self, task_id: &str, still_applies: F) -> Result<ConditionalRelease>
    where
        F: FnOnce(&AssignmentLease, DateTime<Utc>) -> bool,
    {
        let mut leases = self.leases.lock().await;
        let now = self.clock.now();
        let Some(lease) = leases.get(task_id).cloned() else {
            return Ok(ConditionalRelease::NoLease);
        };
        if !still_applies(&lease, now) {
            debug!(
                task = %task_id,
                agent = %lease.agent_id,
                last_renewed = %lease.last_renewed,
                "lease changed since it was checked; keeping it"
            );
            return Ok(ConditionalRelease::Kept(lease));
        }

        self.persistence
            .remove_assignment_for_task(&lease.agent_id, task_id)
            .await?;
        leases.remove(task_id);
        drop(leases);

        debug!(task = %task_id, agent = %lease.agent_id, "lease released");
        self.record(&lease, LeaseEventKind::Released, String::new())
            .await;
        Ok(ConditionalRelease::Released(lease))
    }

    pub async fn get_lease(&self, task_id: &str) -> Option<AssignmentLease> {
        self.leases.lock().await.get(task_id).cloned()
    }

    /// Every lease, ordered by task id.
    pub async fn active_leases(&self) -> Vec<AssignmentLease> {
        let mut out: Vec<AssignmentLease> = self.leases.lock().await.values().cloned().collect();
        out.sort_by(|a, b| a.task_id.cmp(&b.task_id));
        out
    }

    pub async fn lease_state(&self, task_id: &str) -> Option<LeaseState> {
        let now = self.clock.now();
        self.leases
            .lock()
            .await
            .get(task_id)
            .map(|l| l.state(now, self.config.warning_threshold()))
    }

    pub async fn get_lease_statistics(&self) -> LeaseStatistics {
        let now = self.clock.now();
        let threshold = self.config.warning_threshold();
        let leases = self.leases.lock().await;

        let mut stats = LeaseStatistics {
            total: leases.len(),
            ..LeaseStatistics::default()
        };
        if leases.is_empty() {
            return stats;
        }

        let mut renewals = 0u64;
        let mut progress = 0u64;
        for lease in leases.values() {
            match lease.state(now, threshold) {
                LeaseState::Active => stats.active += 1,
                LeaseState::ExpiringSoon => stats.expiring_soon += 1,
                LeaseState::Expired => stats.expired += 1,
            }
            if lease.renewal_count >= self.config.stuck_threshold_renewals
                || lease.renewal_count > self.config.max_renewals
            {
                stats.possibly_stuck += 1;
            }
            renewals += u64::from(lease.renewal_count);
            progress += u64::from(lease.progress_percentage);
        }

        stats.average_renewals = renewals as f64 / leases.len() as f64;
        stats.average_progress = progress as f64 / leases.len() as f64;
        stats
    }

    /// The newest `limit` lease events, oldest first.
    pub async fn lease_history(&self, limit: usize) -> Vec<LeaseEvent> {
        self.history.lock().await.recent(limit)
    }

    /// Hours left on a lease, negative once expired.
    pub async fn hours_remaining(&self, task_id: &str) -> Option<f64> {
        let now = self.clock.now();
        self.leases
            .lock()
            .await
            .get(task_id)
            .map(|l| as_hours(l.time_remaining(now)))
    }
}
