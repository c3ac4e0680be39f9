// src/lease/mod.rs

//! Task leases: time-bounded grants of one task to one agent.
//!
//! - [`manager`] owns the lease map and its lifecycle.
//! - [`duration`] computes initial and renewal lengths.
//! - [`monitor`] is the background sweep that recovers expired leases.

pub mod duration;
pub mod manager;
pub mod monitor;

pub use duration::{RenewalDuration, initial_lease_hours, renewal_hours};
pub use manager::{
    AssignmentLease, AssignmentLeaseManager, ConditionalRelease, LeaseEvent, LeaseEventKind,
    LeaseState, LeaseStatistics,
};
pub use monitor::{LeaseMonitor, LeaseSweep};
