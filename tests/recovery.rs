mod common;

use chrono::Duration;
use common::{Harness, TaskBuilder};
use taskwarden::errors::TaskwardenError;
use taskwarden::persistence::AssignmentRecord;
use taskwarden::recovery::RecoveryReason;
use taskwarden::task::Task;
use taskwarden::types::TaskStatus;

fn tasks() -> Vec<Task> {
    vec![
        TaskBuilder::named("t1", "Implement api").build(),
        TaskBuilder::named("t2", "Implement ui").build(),
        TaskBuilder::named("t3", "Write docs").build(),
    ]
}

fn reasons(found: &[taskwarden::recovery::AbandonedTask]) -> Vec<(&str, RecoveryReason)> {
    found
        .iter()
        .map(|a| (a.task.id.as_str(), a.reason))
        .collect()
}

#[tokio::test]
async fn silent_agent_times_out_and_its_task_returns_to_todo() {
    let h = Harness::new(tasks());
    h.hand_out("t1", "a1").await;
    h.recovery.update_agent_heartbeat("a1").await;
    assert!(h.recovery.check_agent_health("a1").await);

    h.clock.advance(Duration::minutes(31));
    assert!(!h.recovery.check_agent_health("a1").await);

    let found = h.recovery.find_abandoned_tasks().await.unwrap();
    assert_eq!(reasons(&found), [("t1", RecoveryReason::AgentTimeout)]);
    assert_eq!(found[0].agent_id.as_deref(), Some("a1"));

    let report = h.recovery.recover_all_abandoned_tasks().await.unwrap();
    assert_eq!(report.attempted, 1);
    assert_eq!(report.recovered, 1);
    assert_eq!(report.by_reason[&RecoveryReason::AgentTimeout], 1);

    assert_eq!(h.board.status_of("t1"), Some(TaskStatus::Todo));
    assert!(h.leases.get_lease("t1").await.is_none());
    assert!(!h.persistence.is_task_assigned("t1").await);
}

#[tokio::test]
async fn unseen_agents_get_a_startup_grace_period() {
    let h = Harness::new(tasks());
    h.hand_out("t1", "a1").await;

    assert!(h.recovery.check_agent_health("a1").await);
    assert!(h.recovery.find_abandoned_tasks().await.unwrap().is_empty());

    h.clock.advance(Duration::minutes(30));
    assert!(!h.recovery.check_agent_health("a1").await);
    let found = h.recovery.find_abandoned_tasks().await.unwrap();
    assert_eq!(reasons(&found), [("t1", RecoveryReason::AgentTimeout)]);
}

#[tokio::test]
async fn healthy_agent_without_progress_is_stuck() {
    let h = Harness::new(tasks());
    h.hand_out("t1", "a1").await;

    h.clock.advance(Duration::hours(4) + Duration::minutes(1));
    h.recovery.update_agent_heartbeat("a1").await;

    let found = h.recovery.find_abandoned_tasks().await.unwrap();
    assert_eq!(reasons(&found), [("t1", RecoveryReason::TaskStuck)]);
}

#[tokio::test]
async fn recent_progress_keeps_a_task_alive() {
    let h = Harness::new(tasks());
    h.hand_out("t1", "a1").await;

    h.clock.advance(Duration::hours(3));
    h.leases.renew_lease("t1", 40, None).await.unwrap();
    h.clock.advance(Duration::hours(2));
    h.recovery.update_agent_heartbeat("a1").await;

    assert!(h.recovery.find_abandoned_tasks().await.unwrap().is_empty());
}

#[tokio::test]
async fn in_progress_task_without_assignment_is_abandoned() {
    let h = Harness::new(vec![TaskBuilder::new("t1").assigned_to("a7").build()]);

    let found = h.recovery.find_abandoned_tasks().await.unwrap();
    assert_eq!(reasons(&found), [("t1", RecoveryReason::TaskAbandoned)]);
    assert_eq!(found[0].agent_id.as_deref(), Some("a7"));
}

#[tokio::test]
async fn assignment_of_dead_agent_on_idle_task_is_disconnected() {
    let h = Harness::new(tasks());
    h.persistence
        .save_assignment("a1", AssignmentRecord::new("t2", h.leases.now()))
        .await
        .unwrap();
    h.recovery.update_agent_heartbeat("a1").await;
    h.clock.advance(Duration::hours(1));

    let found = h.recovery.find_abandoned_tasks().await.unwrap();
    assert_eq!(reasons(&found), [("t2", RecoveryReason::AgentDisconnected)]);

    let report = h.recovery.recover_all_abandoned_tasks().await.unwrap();
    assert_eq!(report.recovered, 1);
    assert!(h.persistence.is_empty().await);
}

#[tokio::test]
async fn stale_assignments_are_cleared_not_recovered() {
    let h = Harness::new(vec![
        TaskBuilder::new("done").status(TaskStatus::Done).build(),
    ]);
    let now = h.leases.now();
    h.persistence
        .save_assignment("a1", AssignmentRecord::new("done", now))
        .await
        .unwrap();
    h.persistence
        .save_assignment("a2", AssignmentRecord::new("vanished", now))
        .await
        .unwrap();
    h.clock.advance(Duration::hours(1));

    let found = h.recovery.find_abandoned_tasks().await.unwrap();
    assert!(found.is_empty());
    assert!(h.persistence.is_empty().await);
    assert_eq!(h.board.status_of("done"), Some(TaskStatus::Done));
    assert!(h.board.updates().is_empty());
}

#[tokio::test]
async fn one_failure_does_not_stop_the_sweep() {
    let h = Harness::new(tasks());
    h.hand_out("t1", "a1").await;
    h.hand_out("t2", "a2").await;
    h.board.fail_updates_for("t1");
    h.clock.advance(Duration::hours(1));

    let report = h.recovery.recover_all_abandoned_tasks().await.unwrap();
    assert_eq!(report.attempted, 2);
    assert_eq!(report.recovered, 1);
    assert_eq!(report.failed, 1);
    assert_eq!(report.failures[0].task_id, "t1");
    assert_eq!(h.board.status_of("t2"), Some(TaskStatus::Todo));
    assert_eq!(h.board.status_of("t1"), Some(TaskStatus::InProgress));

    // The next sweep picks t1 up again as an ownerless in-progress task.
    h.board.heal("t1");
    let report = h.recovery.recover_all_abandoned_tasks().await.unwrap();
    assert_eq!(report.recovered, 1);
    assert_eq!(report.by_reason[&RecoveryReason::TaskAbandoned], 1);
    assert_eq!(h.board.status_of("t1"), Some(TaskStatus::Todo));
    assert_eq!(h.recovery.recovery_attempts("t1").await, 2);

    let history = h.recovery.recovery_history(10).await;
    assert_eq!(history.len(), 3);
    assert!(history.iter().any(|r| r.task_id == "t1" && !r.success && r.error.is_some()));
}

#[tokio::test]
async fn board_listing_failure_aborts_the_sweep() {
    let h = Harness::new(tasks());
    h.board.fail_listing(true);
    let err = h.recovery.recover_all_abandoned_tasks().await.unwrap_err();
    assert!(matches!(err, TaskwardenError::Board(_)));
}

#[tokio::test]
async fn repeated_recoveries_are_counted() {
    let h = Harness::new(tasks());

    for round in 1..=4 {
        h.hand_out("t1", "a1").await;
        assert!(h.recovery.manual_recover_task("t1").await.unwrap());
        assert_eq!(h.recovery.recovery_attempts("t1").await, round);
    }

    let history = h.recovery.recovery_history(2).await;
    assert_eq!(history.len(), 2);
    assert_eq!(history[1].attempt, 4);
    assert_eq!(history[1].reason, RecoveryReason::ManualRecovery);
    assert_eq!(history[1].agent_id.as_deref(), Some("a1"));
}

#[tokio::test]
async fn manual_recovery_checks_the_task() {
    let h = Harness::new(tasks());

    let err = h.recovery.manual_recover_task("nope").await.unwrap_err();
    assert!(matches!(err, TaskwardenError::TaskNotFound(ref id) if id == "nope"));

    assert!(!h.recovery.manual_recover_task("t3").await.unwrap());
    assert!(h.board.updates().is_empty());
}

#[tokio::test]
async fn concurrent_recovery_of_one_task_runs_once() {
    let h = Harness::new(tasks());
    h.hand_out("t1", "a1").await;
    h.board
        .set_delay(Some(std::time::Duration::from_millis(50)));
    let task = h.board.task("t1").unwrap();

    let (first, second) = tokio::join!(
        h.recovery.recover_task(
            &task,
            Some("a1"),
            RecoveryReason::ManualRecovery,
            TaskStatus::Todo
        ),
        h.recovery.recover_task(
            &task,
            Some("a1"),
            RecoveryReason::ManualRecovery,
            TaskStatus::Todo
        ),
    );

    let outcomes = [first.unwrap(), second.unwrap()];
    assert_eq!(outcomes.iter().filter(|ok| **ok).count(), 1);
    assert_eq!(h.recovery.recovery_attempts("t1").await, 1);
    assert_eq!(h.board.updates().len(), 1);
}

#[tokio::test]
async fn recovery_can_block_instead_of_requeue() {
    let h = Harness::new(tasks());
    h.hand_out("t2", "a2").await;
    h.clock.advance(Duration::hours(4) + Duration::minutes(1));
    let task = h.board.task("t2").unwrap();

    let ok = h
        .recovery
        .recover_task(&task, None, RecoveryReason::TaskStuck, TaskStatus::Blocked)
        .await
        .unwrap();
    assert!(ok);
    assert_eq!(h.board.status_of("t2"), Some(TaskStatus::Blocked));
    // The holder is found through the store when no agent is given.
    assert!(h.persistence.is_empty().await);
    assert!(h.leases.get_lease("t2").await.is_none());
}

fn long_tasks() -> Vec<Task> {
    vec![
        TaskBuilder::named("t1", "Implement api").estimated_hours(8.0).build(),
        TaskBuilder::named("t2", "Implement ui").estimated_hours(8.0).build(),
    ]
}

#[tokio::test]
async fn renewal_after_detection_cancels_the_recovery() {
    let h = Harness::new(long_tasks());
    h.hand_out("t1", "a1").await;
    h.clock.advance(Duration::hours(4) + Duration::minutes(1));
    h.recovery.update_agent_heartbeat("a1").await;

    let found = h.recovery.find_abandoned_tasks().await.unwrap();
    assert_eq!(reasons(&found), [("t1", RecoveryReason::TaskStuck)]);

    let renewed = h.leases.renew_lease("t1", 60, None).await.unwrap();
    assert!(renewed.is_some());

    let recovered = h
        .recovery
        .recover_task(
            &found[0].task,
            found[0].agent_id.as_deref(),
            found[0].reason,
            TaskStatus::Todo,
        )
        .await
        .unwrap();
    assert!(!recovered);
    assert!(h.leases.get_lease("t1").await.is_some());
    assert!(h.persistence.is_task_assigned("t1").await);
    assert_eq!(h.board.status_of("t1"), Some(TaskStatus::InProgress));
    assert!(h.board.updates().is_empty());
    assert_eq!(h.recovery.recovery_attempts("t1").await, 0);
    assert!(h.recovery.recovery_history(10).await.is_empty());
}

#[tokio::test]
async fn renewal_without_heartbeats_keeps_an_agent_alive() {
    let h = Harness::new(long_tasks());
    h.hand_out("t1", "a1").await;
    h.recovery.update_agent_heartbeat("a1").await;

    h.clock.advance(Duration::minutes(50));
    h.leases.renew_lease("t1", 30, None).await.unwrap();
    h.clock.advance(Duration::minutes(10));
    assert!(!h.recovery.check_agent_health("a1").await);
    assert!(h.recovery.find_abandoned_tasks().await.unwrap().is_empty());

    h.clock.advance(Duration::minutes(20));
    let found = h.recovery.find_abandoned_tasks().await.unwrap();
    assert_eq!(reasons(&found), [("t1", RecoveryReason::AgentTimeout)]);
}

#[tokio::test]
async fn abandoned_task_claimed_again_is_left_alone() {
    let h = Harness::new(vec![TaskBuilder::new("t1").assigned_to("a7").build()]);
    let found = h.recovery.find_abandoned_tasks().await.unwrap();
    assert_eq!(reasons(&found), [("t1", RecoveryReason::TaskAbandoned)]);

    h.hand_out("t1", "a8").await;
    let recovered = h
        .recovery
        .recover_task(&found[0].task, None, found[0].reason, TaskStatus::Todo)
        .await
        .unwrap();
    assert!(!recovered);
    assert_eq!(h.leases.get_lease("t1").await.unwrap().agent_id, "a8");
}

#[tokio::test(start_paused = true)]
async fn renewal_during_a_sweep_wins_for_that_task() {
    let h = Harness::new(long_tasks());
    h.hand_out("t1", "a1").await;
    h.hand_out("t2", "a2").await;
    h.clock.advance(Duration::hours(4) + Duration::minutes(1));
    h.recovery.update_agent_heartbeat("a1").await;
    h.recovery.update_agent_heartbeat("a2").await;
    h.board
        .set_delay(Some(std::time::Duration::from_millis(50)));

    // Listing takes 50ms and t1's board update another 50ms; t2 renews while
    // the sweep waits on t1.
    let (report, renewed) = tokio::join!(h.recovery.recover_all_abandoned_tasks(), async {
        tokio::time::sleep(std::time::Duration::from_millis(75)).await;
        h.leases.renew_lease("t2", 50, None).await
    });

    let report = report.unwrap();
    assert!(renewed.unwrap().is_some());
    assert_eq!(report.attempted, 2);
    assert_eq!(report.recovered, 1);
    assert_eq!(report.skipped, 1);
    assert_eq!(h.board.status_of("t1"), Some(TaskStatus::Todo));
    assert_eq!(h.board.status_of("t2"), Some(TaskStatus::InProgress));
    assert!(h.leases.get_lease("t2").await.is_some());
}

#[tokio::test]
async fn attempt_counts_end_with_the_task() {
    let h = Harness::new(tasks());
    h.hand_out("t1", "a1").await;
    assert!(h.recovery.manual_recover_task("t1").await.unwrap());
    assert_eq!(h.recovery.recovery_attempts("t1").await, 1);

    let mut done = h.board.task("t1").unwrap();
    done.status = TaskStatus::Done;
    h.board.upsert(done);
    h.recovery.find_abandoned_tasks().await.unwrap();
    assert_eq!(h.recovery.recovery_attempts("t1").await, 0);
}

#[tokio::test]
async fn heartbeat_bookkeeping() {
    let h = Harness::new(tasks());
    h.recovery.update_agent_heartbeat("b").await;
    h.recovery.update_agent_heartbeat("a").await;
    assert_eq!(h.recovery.known_agents().await, ["a", "b"]);
    assert_eq!(h.recovery.last_heartbeat("a").await, Some(h.leases.now()));

    assert!(h.recovery.remove_agent("a").await);
    assert!(!h.recovery.remove_agent("a").await);
    assert_eq!(h.recovery.known_agents().await, ["b"]);
}
