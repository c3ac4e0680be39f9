mod common;

use std::sync::Arc;

use chrono::Duration;
use common::{Harness, TaskBuilder, with_timeout};
use taskwarden::clock::{Clock, ManualClock, as_hours};
use taskwarden::config::SchedulerConfig;
use taskwarden::lease::{AssignmentLeaseManager, LeaseEventKind, LeaseState};
use taskwarden::persistence::AssignmentPersistence;
use taskwarden::types::{Priority, TaskStatus};

fn tasks() -> Vec<taskwarden::task::Task> {
    vec![
        TaskBuilder::named("t1", "Implement api").build(),
        TaskBuilder::named("t2", "Implement ui").build(),
        TaskBuilder::named("t3", "Write docs").build(),
    ]
}

#[tokio::test]
async fn initial_duration_follows_priority_and_complexity() {
    let h = Harness::new(vec![
        TaskBuilder::new("urgent")
            .priority(Priority::Urgent)
            .estimated_hours(4.0)
            .build(),
        TaskBuilder::new("epic")
            .priority(Priority::Low)
            .estimated_hours(8.0)
            .label("epic")
            .build(),
        TaskBuilder::new("tiny")
            .priority(Priority::Urgent)
            .estimated_hours(1.0)
            .label("simple")
            .build(),
    ]);
    let t0 = h.clock.now();

    let urgent = h.hand_out("urgent", "a1").await;
    assert!((as_hours(urgent.lease_expires - t0) - 2.0).abs() < 1e-6);

    // 8 * 1.5 * 3 = 36, clamped to the 24 hour maximum.
    let epic = h.hand_out("epic", "a2").await;
    assert!((as_hours(epic.lease_expires - t0) - 24.0).abs() < 1e-6);

    // 1 * 0.5 * 0.5 = 0.25, clamped to the 1 hour minimum.
    let tiny = h.hand_out("tiny", "a3").await;
    assert!((as_hours(tiny.lease_expires - t0) - 1.0).abs() < 1e-6);
}

#[tokio::test]
async fn expired_lease_cannot_be_renewed_even_inside_grace() {
    let h = Harness::new(tasks());
    h.hand_out("t1", "a1").await;

    h.clock.advance(Duration::hours(4) + Duration::minutes(10));
    assert_eq!(h.leases.lease_state("t1").await, Some(LeaseState::Expired));

    let renewed = h.leases.renew_lease("t1", 50, None).await.unwrap();
    assert!(renewed.is_none());

    // Inside the grace period the lease is not recovered yet either.
    assert!(h.leases.check_expired_leases().await.is_empty());
    assert!(h.leases.get_lease("t1").await.is_some());
}

#[tokio::test]
async fn grace_period_boundary_is_exclusive() {
    let h = Harness::new(tasks());
    h.hand_out("t1", "a1").await;

    h.clock.advance(Duration::hours(4) + Duration::minutes(30));
    assert!(h.leases.check_expired_leases().await.is_empty());

    h.clock.advance(Duration::milliseconds(1));
    assert_eq!(h.leases.check_expired_leases().await.len(), 1);
}

#[tokio::test]
async fn renewal_for_unknown_task_is_ignored() {
    let h = Harness::new(tasks());
    assert!(h.leases.renew_lease("nope", 10, None).await.unwrap().is_none());
}

#[tokio::test]
async fn repeated_renewals_shrink_and_flag_stuck_work() {
    let h = Harness::new(tasks());
    h.hand_out("t1", "a1").await;

    let mut grants = Vec::new();
    for _ in 0..7 {
        h.clock.advance(Duration::minutes(30));
        let now = h.clock.now();
        let lease = h
            .leases
            .renew_lease("t1", 10, None)
            .await
            .unwrap()
            .expect("lease active");
        grants.push(as_hours(lease.lease_expires - now));
    }

    // Grants never grow while progress stays flat.
    assert!(grants.windows(2).all(|w| w[1] <= w[0] + 1e-9), "{grants:?}");
    // After five renewals the grant is capped at two hours.
    assert!(grants[6] <= 2.0 + 1e-9);
    assert!(grants.iter().all(|g| *g >= 1.0 - 1e-9));

    let stats = h.leases.get_lease_statistics().await;
    assert_eq!(stats.total, 1);
    assert_eq!(stats.possibly_stuck, 1);
    assert!((stats.average_renewals - 7.0).abs() < 1e-9);
}

#[tokio::test]
async fn recovery_clears_memory_store_and_board() {
    let h = Harness::new(tasks());
    h.hand_out("t1", "a1").await;
    h.hand_out("t2", "a2").await;

    h.clock.advance(Duration::hours(3));
    h.leases.renew_lease("t2", 60, None).await.unwrap();

    // t1 is now past expiry plus grace; t2 was renewed in time.
    h.clock.advance(Duration::minutes(91));
    let expired = h.leases.check_expired_leases().await;
    assert_eq!(expired.len(), 1);
    assert_eq!(expired[0].task_id, "t1");
    assert!(h.leases.recover_expired_lease(&expired[0]).await.unwrap());

    // A second attempt finds nothing to do.
    assert!(!h.leases.recover_expired_lease(&expired[0]).await.unwrap());

    assert!(h.leases.get_lease("t1").await.is_none());
    assert!(h.persistence.get_assignment("a1").await.is_none());
    assert_eq!(h.board.status_of("t1"), Some(TaskStatus::Todo));
    assert_eq!(h.board.status_of("t2"), Some(TaskStatus::InProgress));

    let kinds: Vec<LeaseEventKind> = h
        .leases
        .lease_history(10)
        .await
        .into_iter()
        .filter(|e| e.task_id == "t1")
        .map(|e| e.kind)
        .collect();
    assert_eq!(
        kinds,
        [
            LeaseEventKind::Created,
            LeaseEventKind::Expired,
            LeaseEventKind::Recovered
        ]
    );
}

#[tokio::test]
async fn failed_board_update_keeps_the_lease_for_the_next_sweep() {
    let h = Harness::new(tasks());
    h.hand_out("t1", "a1").await;
    h.board.fail_updates_for("t1");

    h.clock.advance(Duration::hours(5));
    let expired = h.leases.check_expired_leases().await;
    assert!(h.leases.recover_expired_lease(&expired[0]).await.is_err());
    assert!(h.leases.get_lease("t1").await.is_some());
    assert!(h.persistence.is_task_assigned("t1").await);

    h.board.heal("t1");
    let expired = h.leases.check_expired_leases().await;
    assert!(h.leases.recover_expired_lease(&expired[0]).await.unwrap());
    assert!(!h.persistence.is_task_assigned("t1").await);
}

#[tokio::test]
async fn task_missing_from_board_still_releases_the_lease() {
    let h = Harness::new(tasks());
    h.leases.create_lease("ghost", "a1", None).await.unwrap();

    h.clock.advance(Duration::hours(5));
    let expired = h.leases.check_expired_leases().await;
    assert!(h.leases.recover_expired_lease(&expired[0]).await.unwrap());
    assert!(h.leases.get_lease("ghost").await.is_none());
    assert!(h.persistence.is_empty().await);
}

#[tokio::test]
async fn one_lease_per_task() {
    let h = Harness::new(tasks());
    h.hand_out("t1", "a1").await;
    h.hand_out("t1", "a2").await;

    let leases = h.leases.active_leases().await;
    assert_eq!(leases.len(), 1);
    assert_eq!(leases[0].agent_id, "a2");
    assert_eq!(h.persistence.get_worker_for_task("t1").await.as_deref(), Some("a2"));
    assert!(h.persistence.get_assignment("a1").await.is_none());
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn renewal_and_recovery_never_both_win() {
    let h = Harness::new(tasks());
    h.hand_out("t1", "a1").await;
    h.clock.advance(Duration::hours(5));
    let expired = h.leases.check_expired_leases().await;

    let renew = {
        let leases = h.leases.clone();
        tokio::spawn(async move { leases.renew_lease("t1", 90, None).await })
    };
    let recover = {
        let leases = h.leases.clone();
        let lease = expired[0].clone();
        tokio::spawn(async move { leases.recover_expired_lease(&lease).await })
    };

    let renewed = with_timeout(renew).await.unwrap().unwrap();
    let recovered = with_timeout(recover).await.unwrap().unwrap();
    assert!(!(renewed.is_some() && recovered));
    assert!(recovered);
    assert!(h.leases.get_lease("t1").await.is_none());
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn concurrent_renewals_are_serialised() {
    let h = Harness::new(tasks());
    h.hand_out("t1", "a1").await;

    let mut joins = Vec::new();
    for i in 0..20u8 {
        let leases = h.leases.clone();
        joins.push(tokio::spawn(async move {
            leases.renew_lease("t1", 30 + i, None).await
        }));
    }
    for j in joins {
        assert!(with_timeout(j).await.unwrap().unwrap().is_some());
    }

    let lease = h.leases.get_lease("t1").await.unwrap();
    assert_eq!(lease.renewal_count, 20);
    let stored = h.persistence.get_assignment("a1").await.unwrap();
    assert_eq!(stored.renewal_count, 20);
}

#[tokio::test]
async fn expiring_leases_are_reported_before_expiry() {
    let h = Harness::new(tasks());
    h.hand_out("t1", "a1").await;
    h.hand_out("t2", "a2").await;
    h.leases.renew_lease("t2", 80, None).await.unwrap();

    // t1 has 4h left, t2 2h. Seventy minutes later only t2 is inside the
    // one hour warning window.
    h.clock.advance(Duration::minutes(70));
    let expiring = h.leases.get_expiring_leases().await;
    assert_eq!(expiring.len(), 1);
    assert_eq!(expiring[0].task_id, "t2");
    assert_eq!(h.leases.lease_state("t1").await, Some(LeaseState::Active));

    let remaining = h.leases.hours_remaining("t2").await.unwrap();
    assert!((remaining - (50.0 / 60.0)).abs() < 1e-6);
}

#[tokio::test]
async fn release_drops_lease_without_touching_board() {
    let h = Harness::new(tasks());
    h.hand_out("t1", "a1").await;

    let released = h.leases.release_lease("t1").await.unwrap();
    assert_eq!(released.map(|l| l.agent_id).as_deref(), Some("a1"));
    assert!(h.leases.get_lease("t1").await.is_none());
    assert!(h.persistence.is_empty().await);
    assert_eq!(h.board.status_of("t1"), Some(TaskStatus::InProgress));
    assert!(h.board.updates().is_empty());
}

#[tokio::test]
async fn leases_survive_a_restart() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("assignments.json");
    let clock = ManualClock::starting_now();

    {
        let store = AssignmentPersistence::open_file(&path).await.unwrap();
        let h = Harness::with_parts(SchedulerConfig::default(), tasks(), store, clock.clone());
        h.hand_out("t1", "a1").await;
        h.leases.renew_lease("t1", 55, Some("halfway")).await.unwrap();
    }

    let store = AssignmentPersistence::open_file(&path).await.unwrap();
    let h = Harness::with_parts(SchedulerConfig::default(), tasks(), store, clock.clone());
    assert!(h.leases.get_lease("t1").await.is_none());

    assert_eq!(h.leases.load_active_leases().await.unwrap(), 1);
    let lease = h.leases.get_lease("t1").await.unwrap();
    assert_eq!(lease.agent_id, "a1");
    assert_eq!(lease.renewal_count, 1);
    assert_eq!(lease.progress_percentage, 55);
    assert!(lease.lease_expires > clock.now());
}

#[tokio::test]
async fn manager_works_without_a_harness() {
    let clock = ManualClock::starting_now();
    let board = Arc::new(common::FakeBoard::new(tasks()));
    let manager = AssignmentLeaseManager::new(
        SchedulerConfig::default().lease,
        AssignmentPersistence::in_memory(),
        board,
        Arc::new(clock.clone()),
    )
    .with_board_timeout(Some(std::time::Duration::from_secs(1)));

    manager.create_lease("t3", "a9", None).await.unwrap();
    let stats = manager.get_lease_statistics().await;
    assert_eq!(stats.total, 1);
    assert_eq!(stats.active, 1);
    assert_eq!(manager.now(), clock.now());
}
