// src/recovery/mod.rs

//! Liveness tracking and recovery of abandoned work.

pub mod manager;
pub mod monitor;

pub use manager::{
    AbandonedTask, RecoveryFailure, RecoveryReason, RecoveryRecord, RecoveryReport,
    TaskRecoveryManager,
};
pub use monitor::RecoveryMonitor;
