// src/persistence/store.rs

use std::collections::{BTreeMap, HashMap};
use std::path::{Path, PathBuf};

use serde_json::Value;
use tracing::{debug, info, warn};

use super::atomic::{read_if_exists, write_json_atomic};
use super::record::{AssignmentRecord, has_legacy_timestamps};
use crate::config::PersistenceConfig;
use crate::errors::{Result, TaskwardenError};
use crate::sync::Guarded;
use crate::task::{AgentId, TaskId};
use crate::types::StorageMode;

/// Durable map of agent id → the one assignment that agent holds.
///
/// The full table is cached in memory behind a single lock. Every mutation
/// builds the next table, writes it to disk (file mode), and only then
/// replaces the cached copy, so a failed write leaves memory and disk agreeing
/// on the previous state.
#[derive(Debug, Clone)]
pub struct AssignmentPersistence {
    mode: StorageMode,
    path: Option<PathBuf>,
    assignments: Guarded<HashMap<AgentId, AssignmentRecord>>,
}

impl AssignmentPersistence {
    /// Open the store described by `cfg`, loading any existing document.
    pub async fn open(cfg: &PersistenceConfig) -> Result<Self> {
        match cfg.mode {
            StorageMode::Memory => Ok(Self::in_memory()),
            StorageMode::File => Self::open_file(cfg.file_path()).await,
        }
    }

    /// File-backed store at an explicit path.
    pub async fn open_file(path: impl Into<PathBuf>) -> Result<Self> {
        let path = path.into();
        let (map, needs_rewrite) = load_document(&path).await?;

        if needs_rewrite {
            write_document(&path, &map).await?;
            info!(path = ?path, records = map.len(), "normalized legacy timestamps in assignment store");
        }

        info!(path = ?path, records = map.len(), "assignment store opened");
        Ok(Self {
            mode: StorageMode::File,
            path: Some(path),
            assignments: Guarded::new(map),
        })
    }

    /// Store that never touches disk.
    pub fn in_memory() -> Self {
        Self {
            mode: StorageMode::Memory,
            path: None,
            assignments: Guarded::new(HashMap::new()),
        }
    }

    pub fn mode(&self) -> StorageMode {
        self.mode
    }

    pub fn path(&self) -> Option<&Path> {
        self.path.as_deref()
    }

    async fn flush(&self, map: &HashMap<AgentId, AssignmentRecord>) -> Result<()> {
        match &self.path {
            Some(path) => write_document(path, map).await,
            None => Ok(()),
        }
    }

    /// Record that `agent_id` holds `record.task_id`.
    ///
    /// An agent holds at most one task, so this replaces the agent's previous
    /// record. Any other agent recorded as holding the same task loses it.
    pub async fn save_assignment(&self, agent_id: &str, record: AssignmentRecord) -> Result<()> {
        let mut map = self.assignments.lock().await;
        let mut next = map.clone();

        let displaced: Vec<AgentId> = next
            .iter()
            .filter(|(agent, rec)| agent.as_str() != agent_id && rec.task_id == record.task_id)
            .map(|(agent, _)| agent.clone())
            .collect();
        for agent in &displaced {
            warn!(
                task = %record.task_id,
                previous_agent = %agent,
                new_agent = %agent_id,
                "task reassigned; dropping previous agent's assignment"
            );
            next.remove(agent);
        }

        if let Some(prev) = next.get(agent_id) {
            if prev.task_id != record.task_id {
                debug!(
                    agent = %agent_id,
                    previous_task = %prev.task_id,
                    task = %record.task_id,
                    "agent assignment replaced"
                );
            }
        }

        let task_id = record.task_id.clone();
        next.insert(agent_id.to_string(), record);
        self.flush(&next).await?;
        *map = next;

        debug!(agent = %agent_id, task = %task_id, "assignment saved");
        Ok(())
    }

    /// Apply `f` to the agent's record and persist the result.
    ///
    /// Returns `false` (and writes nothing) if the agent has no record.
    pub async fn update_assignment<F>(&self, agent_id: &str, f: F) -> Result<bool>
    where
        F: FnOnce(&mut AssignmentRecord),
    {
        let mut map = self.assignments.lock().await;
        if !map.contains_key(agent_id) {
            return Ok(false);
        }

        let mut next = map.clone();
        if let Some(rec) = next.get_mut(agent_id) {
            f(rec);
        }
        self.flush(&next).await?;
        *map = next;
        Ok(true)
    }

    pub async fn get_assignment(&self, agent_id: &str) -> Option<AssignmentRecord> {
        self.assignments.lock().await.get(agent_id).cloned()
    }

    /// Remove whatever the agent holds. Returns the removed record.
    pub async fn remove_assignment(&self, agent_id: &str) -> Result<Option<AssignmentRecord>> {
        let mut map = self.assignments.lock().await;
        if !map.contains_key(agent_id) {
            return Ok(None);
        }

        let mut next = map.clone();
        let removed = next.remove(agent_id);
        self.flush(&next).await?;
        *map = next;

        debug!(agent = %agent_id, "assignment removed");
        Ok(removed)
    }

    /// Remove the agent's record only if it still points at `task_id`.
    ///
    /// Recovery uses this so that clearing a stale task never clobbers a
    /// newer assignment the same agent picked up in the meantime.
    pub async fn remove_assignment_for_task(&self, agent_id: &str, task_id: &str) -> Result<bool> {
        let mut map = self.assignments.lock().await;
        match map.get(agent_id) {
            Some(rec) if rec.task_id == task_id => {}
            Some(rec) => {
                debug!(
                    agent = %agent_id,
                    task = %task_id,
                    held_task = %rec.task_id,
                    "agent now holds a different task; leaving assignment in place"
                );
                return Ok(false);
            }
            None => return Ok(false),
        }

        let mut next = map.clone();
        next.remove(agent_id);
        self.flush(&next).await?;
        *map = next;

        debug!(agent = %agent_id, task = %task_id, "assignment removed for task");
        Ok(true)
    }

    /// Snapshot of every assignment.
    pub async fn load_assignments(&self) -> HashMap<AgentId, AssignmentRecord> {
        self.assignments.lock().await.clone()
    }

    /// Re-read the backing file, replacing the cached table.
    ///
    /// Picks up edits made by hand while the process is running. No-op in
    /// memory mode. Returns the number of records loaded.
    pub async fn reload(&self) -> Result<usize> {
        let Some(path) = &self.path else {
            return Ok(self.assignments.lock().await.len());
        };

        let mut map = self.assignments.lock().await;
        let (loaded, needs_rewrite) = load_document(path).await?;
        if needs_rewrite {
            write_document(path, &loaded).await?;
        }
        *map = loaded;
        Ok(map.len())
    }

    pub async fn is_task_assigned(&self, task_id: &str) -> bool {
        self.assignments
            .lock()
            .await
            .values()
            .any(|rec| rec.task_id == task_id)
    }

    /// The agent holding `task_id`, if any.
    pub async fn get_worker_for_task(&self, task_id: &str) -> Option<AgentId> {
        self.assignments
            .lock()
            .await
            .iter()
            .find(|(_, rec)| rec.task_id == task_id)
            .map(|(agent, _)| agent.clone())
    }

    /// Like [`get_worker_for_task`](Self::get_worker_for_task) but also returns
    /// the record.
    pub async fn find_by_task(&self, task_id: &str) -> Option<(AgentId, AssignmentRecord)> {
        self.assignments
            .lock()
            .await
            .iter()
            .find(|(_, rec)| rec.task_id == task_id)
            .map(|(agent, rec)| (agent.clone(), rec.clone()))
    }

    /// Ids of every assigned task.
    pub async fn assigned_task_ids(&self) -> Vec<TaskId> {
        self.assignments
            .lock()
            .await
            .values()
            .map(|rec| rec.task_id.clone())
            .collect()
    }

    pub async fn len(&self) -> usize {
        self.assignments.lock().await.len()
    }

    pub async fn is_empty(&self) -> bool {
        self.assignments.lock().await.is_empty()
    }
}

/// Read and parse the document at `path`.
///
/// Returns the table plus whether it should be rewritten to normalize legacy
/// timestamps. A missing or empty file is an empty table.
async fn load_document(path: &Path) -> Result<(HashMap<AgentId, AssignmentRecord>, bool)> {
    let Some(contents) = read_if_exists(path).await? else {
        debug!(path = ?path, "no assignment document yet");
        return Ok((HashMap::new(), false));
    };
    if contents.trim().is_empty() {
        return Ok((HashMap::new(), false));
    }

    let raw: BTreeMap<String, Value> = serde_json::from_str(&contents).map_err(|e| {
        TaskwardenError::Persistence(format!("assignment document {path:?} is not valid JSON: {e}"))
    })?;

    let mut needs_rewrite = false;
    let mut map = HashMap::with_capacity(raw.len());
    for (agent, value) in raw {
        if has_legacy_timestamps(&value) {
            debug!(agent = %agent, "record has legacy timestamps");
            needs_rewrite = true;
        }
        let record: AssignmentRecord = serde_json::from_value(value).map_err(|e| {
            TaskwardenError::Persistence(format!(
                "assignment for agent '{agent}' in {path:?} is malformed: {e}"
            ))
        })?;
        map.insert(agent, record);
    }

    Ok((map, needs_rewrite))
}

/// Write the table sorted by agent id so diffs of the file stay readable.
async fn write_document(path: &Path, map: &HashMap<AgentId, AssignmentRecord>) -> Result<()> {
    let sorted: BTreeMap<&AgentId, &AssignmentRecord> = map.iter().collect();
    write_json_atomic(path, &sorted).await
}
