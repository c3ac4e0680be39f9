// src/lease/duration.rs

//! Lease duration arithmetic.
//!
//! Pure functions over [`LeaseConfig`]; the manager applies the results to
//! the clock.

use crate::config::LeaseConfig;
use crate::task::Task;

/// Estimates above this many hours stretch renewals.
const LONG_TASK_HOURS: f64 = 8.0;

/// Stretch applied to renewals of long tasks.
const LONG_TASK_FACTOR: f64 = 1.5;

/// Renewal cap once a lease has been renewed too often.
const FREQUENT_RENEWAL_CAP_HOURS: f64 = 2.0;

/// Renewal count beyond which [`FREQUENT_RENEWAL_CAP_HOURS`] applies.
const FREQUENT_RENEWAL_COUNT: u32 = 5;

/// Hours for a brand-new lease.
///
/// Starts from `default_lease_hours` (or the task's positive
/// `estimated_hours`), scales by the priority and complexity multipliers and
/// clamps to the configured bounds.
pub fn initial_lease_hours(cfg: &LeaseConfig, task: Option<&Task>) -> f64 {
    let Some(task) = task else {
        return cfg.clamp_hours(cfg.default_lease_hours);
    };

    let base = if task.estimated_hours > 0.0 {
        task.estimated_hours
    } else {
        cfg.default_lease_hours
    };

    let hours = base * cfg.priority_multiplier(task.priority) * cfg.complexity_multiplier(task);
    cfg.clamp_hours(hours)
}

/// Outcome of a renewal duration calculation.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct RenewalDuration {
    pub hours: f64,
    /// Little progress despite repeated renewals.
    pub possibly_stuck: bool,
}

/// Hours granted by a renewal.
///
/// `renewal_count` is the count *before* this renewal. Progress near the end
/// earns a shorter lease, slow progress after several renewals is flagged,
/// long tasks get extra time, and every renewal decays the grant so leases
/// converge toward the minimum instead of renewing indefinitely.
pub fn renewal_hours(
    cfg: &LeaseConfig,
    renewal_count: u32,
    progress: u8,
    estimated_hours: f64,
) -> RenewalDuration {
    let mut possibly_stuck = false;

    let mut hours = if progress > 75 {
        2.0
    } else if progress >= 50 {
        3.0
    } else if progress < 25 && renewal_count > 2 {
        possibly_stuck = true;
        2.0
    } else {
        cfg.default_lease_hours
    };

    if estimated_hours > LONG_TASK_HOURS {
        hours *= LONG_TASK_FACTOR;
    }

    hours *= cfg.renewal_decay_factor.powi(renewal_count as i32);

    if renewal_count > FREQUENT_RENEWAL_COUNT {
        hours = hours.min(FREQUENT_RENEWAL_CAP_HOURS);
    }

    RenewalDuration {
        hours: cfg.clamp_hours(hours),
        possibly_stuck,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::Priority;

    fn approx(a: f64, b: f64) -> bool {
        (a - b).abs() < 1e-9
    }

    #[test]
    fn high_priority_four_hour_task_gets_three_hours() {
        let mut t = Task::new("t1", "Implement api");
        t.estimated_hours = 4.0;
        t.priority = Priority::High;
        assert!(approx(initial_lease_hours(&LeaseConfig::default(), Some(&t)), 3.0));
    }

    #[test]
    fn complexity_uses_first_matching_label() {
        let mut t = Task::new("t1", "Build it");
        t.add_label("backend");
        t.add_label("epic");
        t.add_label("simple");
        // medium (1.0) * epic (3.0) * default 4h = 12h
        assert!(approx(initial_lease_hours(&LeaseConfig::default(), Some(&t)), 12.0));
    }

    #[test]
    fn initial_is_clamped() {
        let cfg = LeaseConfig::default();
        let mut t = Task::new("t1", "Tiny");
        t.estimated_hours = 0.5;
        t.priority = Priority::Urgent;
        assert!(approx(initial_lease_hours(&cfg, Some(&t)), cfg.min_lease_hours));

        t.estimated_hours = 40.0;
        t.priority = Priority::Low;
        assert!(approx(initial_lease_hours(&cfg, Some(&t)), cfg.max_lease_hours));

        assert!(approx(initial_lease_hours(&cfg, None), 4.0));
    }

    #[test]
    fn renewal_follows_progress_bands() {
        let cfg = LeaseConfig::default();
        assert!(approx(renewal_hours(&cfg, 0, 80, 4.0).hours, 2.0));
        assert!(approx(renewal_hours(&cfg, 0, 60, 4.0).hours, 3.0));
        assert!(approx(renewal_hours(&cfg, 0, 30, 4.0).hours, 4.0));
        assert!(approx(renewal_hours(&cfg, 0, 30, 10.0).hours, 6.0));
        assert!(approx(renewal_hours(&cfg, 1, 30, 4.0).hours, 3.6));
    }

    #[test]
    fn slow_progress_after_renewals_is_flagged() {
        let cfg = LeaseConfig::default();
        let r = renewal_hours(&cfg, 3, 10, 4.0);
        assert!(r.possibly_stuck);
        assert!(approx(r.hours, 2.0 * 0.9f64.powi(3)));

        assert!(!renewal_hours(&cfg, 2, 10, 4.0).possibly_stuck);
    }

    #[test]
    fn frequent_renewals_are_capped() {
        let mut cfg = LeaseConfig::default();
        cfg.renewal_decay_factor = 1.0;
        assert!(approx(renewal_hours(&cfg, 6, 40, 4.0).hours, 2.0));
        assert!(approx(renewal_hours(&cfg, 5, 40, 4.0).hours, 4.0));
    }
}
