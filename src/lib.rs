// src/lib.rs

//! Dependency-aware lease scheduler core.
//!
//! - [`graph`] validates task batches before they reach a board and injects
//!   same-feature phase ordering.
//! - [`lease`] grants and renews time-bounded task leases and recovers
//!   expired ones.
//! - [`recovery`] tracks agent heartbeats and takes back abandoned or stuck
//!   work.
//! - [`persistence`] is the durable agent → assignment store both rely on.
//! - [`board`] is the seam to whatever task board holds the tasks.

pub mod board;
pub mod cli;
pub mod clock;
pub mod config;
pub mod errors;
pub mod graph;
pub mod history;
pub mod lease;
pub mod logging;
pub mod monitor;
pub mod persistence;
pub mod recovery;
pub mod sync;
pub mod task;
pub mod timestamp;
pub mod types;

use std::path::Path;
use std::sync::Arc;

use anyhow::{Context, Result, bail};
use tracing::{info, warn};

use crate::board::{InMemoryBoard, JsonFileBoard, SharedBoard};
use crate::cli::{CliArgs, Command};
use crate::clock::{SharedClock, SystemClock};
use crate::config::{SchedulerConfig, load_or_default};
use crate::graph::{PhaseDependencyEnforcer, TaskGraphValidator, ValidatorOptions};
use crate::lease::{AssignmentLeaseManager, LeaseMonitor};
use crate::persistence::AssignmentPersistence;
use crate::recovery::{RecoveryMonitor, TaskRecoveryManager};
use crate::task::Task;

/// High-level entry point used by `main.rs`.
pub async fn run(args: CliArgs) -> Result<()> {
    match args.command {
        Command::Validate {
            tasks,
            fix,
            enforce_phases,
            strict,
        } => run_validate(&tasks, fix, enforce_phases, strict),
        Command::Leases { config } => run_leases(&config).await,
        Command::Monitor { config, tasks } => run_monitor(&config, &tasks).await,
    }
}

fn read_tasks(path: &Path) -> Result<Vec<Task>> {
    let contents = std::fs::read_to_string(path)
        .with_context(|| format!("reading task batch {}", path.display()))?;
    serde_json::from_str(&contents).with_context(|| format!("parsing task batch {}", path.display()))
}

fn run_validate(path: &Path, fix: bool, enforce_phases: bool, strict: bool) -> Result<()> {
    let mut tasks = read_tasks(path)?;
    let validator = TaskGraphValidator::new(ValidatorOptions { strict });

    if enforce_phases {
        let enforcer = PhaseDependencyEnforcer::new();
        tasks = enforcer.enforce_phase_dependencies(tasks);
        let (ok, errors) = enforcer.validate_phase_ordering(&tasks);
        if !ok {
            for e in &errors {
                println!("phase ordering: {e}");
            }
        }
    }

    if fix {
        let outcome = validator.validate_and_fix(tasks)?;
        for w in &outcome.warnings {
            eprintln!("fixed: {w}");
        }
        println!("{}", serde_json::to_string_pretty(&outcome.tasks)?);
        return Ok(());
    }

    let (ok, message) = validator.validate_and_log(&tasks);
    println!("{message}");
    if !ok {
        bail!("task graph in {} is invalid", path.display());
    }
    Ok(())
}

async fn run_leases(config_path: &Path) -> Result<()> {
    let cfg = load_or_default(config_path)?;
    let persistence = AssignmentPersistence::open(&cfg.persistence).await?;

    // Statistics only; no board calls are made.
    let board: SharedBoard = Arc::new(InMemoryBoard::default());
    let clock: SharedClock = Arc::new(SystemClock);
    let leases = AssignmentLeaseManager::new(cfg.lease.clone(), persistence, board, clock);
    leases.load_active_leases().await?;

    let stats = leases.get_lease_statistics().await;
    println!("{}", serde_json::to_string_pretty(&stats)?);

    let now = leases.now();
    for lease in leases.active_leases().await {
        println!(
            "{:<24} {:<16} {:?} expires {} ({} renewals, {}%)",
            lease.task_id,
            lease.agent_id,
            lease.state(now, cfg.lease.warning_threshold()),
            lease.lease_expires,
            lease.renewal_count,
            lease.progress_percentage,
        );
    }
    Ok(())
}

/// Lease and recovery managers sharing one store, board and clock.
fn build_managers(
    cfg: &SchedulerConfig,
    persistence: AssignmentPersistence,
    board: SharedBoard,
    clock: SharedClock,
) -> (Arc<AssignmentLeaseManager>, Arc<TaskRecoveryManager>) {
    let timeout = cfg.board.call_timeout();
    let leases = Arc::new(
        AssignmentLeaseManager::new(
            cfg.lease.clone(),
            persistence.clone(),
            board.clone(),
            clock.clone(),
        )
        .with_board_timeout(timeout),
    );
    let recovery = Arc::new(
        TaskRecoveryManager::new(cfg.recovery.clone(), persistence, board, clock)
            .with_board_timeout(timeout)
            .with_lease_manager(leases.clone()),
    );
    (leases, recovery)
}

async fn run_monitor(config_path: &Path, tasks_path: &Path) -> Result<()> {
    let cfg = load_or_default(config_path)?;
    let persistence = AssignmentPersistence::open(&cfg.persistence).await?;
    let board: SharedBoard = Arc::new(JsonFileBoard::new(tasks_path));
    let clock: SharedClock = Arc::new(SystemClock);

    let (leases, recovery) = build_managers(&cfg, persistence, board, clock);
    let loaded = leases.load_active_leases().await?;
    info!(leases = loaded, board = %tasks_path.display(), "starting monitors");

    let lease_handle = LeaseMonitor::new(leases).spawn();
    let recovery_handle = RecoveryMonitor::new(recovery).spawn();

    if let Err(e) = tokio::signal::ctrl_c().await {
        warn!(error = %e, "failed to listen for Ctrl+C; shutting down");
    }
    info!("shutdown requested");

    lease_handle.shutdown().await?;
    recovery_handle.shutdown().await?;
    Ok(())
}
