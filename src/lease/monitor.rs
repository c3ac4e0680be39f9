// src/lease/monitor.rs

use std::sync::Arc;
use std::time::Duration;

use tracing::{debug, error, info, warn};

use super::manager::AssignmentLeaseManager;
use crate::clock::as_hours;
use crate::monitor::{MonitorHandle, spawn_periodic};

/// What one lease sweep did.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct LeaseSweep {
    /// Leases past expiry plus grace at the start of the sweep.
    pub expired: usize,
    pub recovered: usize,
    /// Recoveries that failed and will be retried next sweep.
    pub failed: usize,
    pub expiring: usize,
}

/// Background loop recovering expired leases.
#[derive(Debug, Clone)]
pub struct LeaseMonitor {
    manager: Arc<AssignmentLeaseManager>,
    interval: Duration,
}

impl LeaseMonitor {
    /// Monitor sweeping every `check_interval_secs` of the manager's config.
    pub fn new(manager: Arc<AssignmentLeaseManager>) -> Self {
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

    /// Recover every expired lease and warn about those about to expire.
    ///
    /// A failed recovery is logged and counted; the remaining leases are
    /// still processed.
    pub async fn sweep(&self) -> LeaseSweep {
        let mut out = LeaseSweep::default();

        let expired = self.manager.check_expired_leases().await;
        out.expired = expired.len();
        for lease in &expired {
            match self.manager.recover_expired_lease(lease).await {
                Ok(true) => out.recovered += 1,
                Ok(false) => {}
                Err(e) => {
                    out.failed += 1;
                    error!(
                        task = %lease.task_id,
                        agent = %lease.agent_id,
                        error = %e,
                        "failed to recover expired lease"
                    );
                }
            }
        }

        let now = self.manager.now();
        let expiring = self.manager.get_expiring_leases().await;
        out.expiring = expiring.len();
        for lease in &expiring {
            warn!(
                task = %lease.task_id,
                agent = %lease.agent_id,
                hours_left = as_hours(lease.time_remaining(now)),
                progress = lease.progress_percentage,
                "lease expiring soon"
            );
        }

        if out.expired > 0 || out.expiring > 0 {
            info!(
                expired = out.expired,
                recovered = out.recovered,
                failed = out.failed,
                expiring = out.expiring,
                "lease sweep complete"
            );
        } else {
            debug!("lease sweep found nothing to do");
        }
        out
    }

    pub fn spawn(self) -> MonitorHandle {
        let interval = self.interval;
        let monitor = Arc::new(self);
        spawn_periodic("lease", interval, move || {
            let monitor = monitor.clone();
            async move {
                monitor.sweep().await;
                Ok(())
            }
        })
    }
}
