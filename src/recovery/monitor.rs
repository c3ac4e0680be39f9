// src/recovery/monitor.rs

use std::sync::Arc;
use std::time::Duration;

use super::manager::{RecoveryReport, TaskRecoveryManager};
use crate::errors::Result;
use crate::monitor::{MonitorHandle, spawn_periodic};

/// Background loop recovering abandoned and stuck tasks.
#[derive(Debug, Clone)]
pub struct RecoveryMonitor {
    manager: Arc<TaskRecoveryManager>,
    interval: Duration,
}

impl RecoveryMonitor {
    /// Monitor sweeping every `check_interval_secs` of the manager's config.
    pub fn new(manager: Arc<TaskRecoveryManager>) -> Self {
        let interval = manager.config().check_interval();
        Self { manager, interval }
    }

    pub fn with_interval(mut self, interval: Duration) -> Self {
        self.interval = interval;
        self
    }

    pub fn interval(&self) -> Duration {
        self.interval
    }

    /// One recovery pass. Fails only if the board cannot be read.
    pub async fn sweep(&self) -> Result<RecoveryReport> {
        self.manager.recover_all_abandoned_tasks().await
    }

    pub fn spawn(self) -> MonitorHandle {
        let interval = self.interval;
        let monitor = Arc::new(self);
        spawn_periodic("recovery", interval, move || {
            let monitor = monitor.clone();
            async move { monitor.sweep().await.map(|_| ()) }
        })
    }
}
