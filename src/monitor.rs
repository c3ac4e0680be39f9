// src/monitor.rs

//! Periodic background sweeps.
//!
//! [`spawn_periodic`] runs a sweep immediately and then once per interval
//! until [`MonitorHandle::shutdown`] is called. A sweep that is already
//! running when shutdown is requested is allowed to finish; the loop exits
//! before starting the next one.

use std::future::Future;
use std::time::Duration;

use anyhow::anyhow;
use tokio::sync::watch;
use tokio::task::JoinHandle;
use tracing::{debug, error, info};

use crate::errors::{Result, TaskwardenError};

/// Handle to a running monitor loop.
#[derive(Debug)]
pub struct MonitorHandle {
    name: &'static str,
    shutdown_tx: watch::Sender<bool>,
    join: JoinHandle<()>,
}

impl MonitorHandle {
    pub fn name(&self) -> &'static str {
        self.name
    }

    pub fn is_running(&self) -> bool {
        !self.join.is_finished()
    }

    /// Ask the loop to stop and wait for it to exit.
    pub async fn shutdown(self) -> Result<()> {
        // The loop may already be gone; that is fine.
        let _ = self.shutdown_tx.send(true);

        match self.join.await {
            Ok(()) => Ok(()),
            Err(e) if e.is_cancelled() => {
                debug!(monitor = self.name, "monitor task was cancelled");
                Ok(())
            }
            Err(e) => Err(TaskwardenError::Other(anyhow!(
                "monitor '{}' panicked: {e}",
                self.name
            ))),
        }
    }
}

/// Spawn a loop calling `sweep` every `interval`.
///
/// Errors returned by `sweep` are logged and the loop carries on.
pub fn spawn_periodic<F, Fut>(name: &'static str, interval: Duration, mut sweep: F) -> MonitorHandle
where
    F: FnMut() -> Fut + Send + 'static,
    Fut: Future<Output = Result<()>> + Send + 'static,
{
    let (shutdown_tx, mut shutdown_rx) = watch::channel(false);

    let join = tokio::spawn(async move {
        info!(monitor = name, interval_secs = interval.as_secs(), "monitor started");

        loop {
            if *shutdown_rx.borrow() {
                break;
            }

            if let Err(e) = sweep().await {
                error!(monitor = name, error = %e, "sweep failed; will retry next interval");
            }

            tokio::select! {
                _ = tokio::time::sleep(interval) => {}
                changed = shutdown_rx.changed() => {
                    // A dropped sender means nobody can stop us any more; exit.
                    if changed.is_err() || *shutdown_rx.borrow() {
                        break;
                    }
                }
            }
        }

        info!(monitor = name, "monitor stopped");
    });

    MonitorHandle {
        name,
        shutdown_tx,
        join,
    }
}
