//! Integration tests for scheduler operations
//!
//! Runs against the in-memory task store; trigger workers are real tokio
//! tasks.

mod common;

use std::time::Duration;

use assert_matches::assert_matches;
use chrono::{Timelike, Utc};
use encore_scheduler::models::{ExecutionStatus, NewTask, TaskStatus};
use encore_scheduler::store::TaskStore;
use encore_scheduler::SchedulerError;

use common::{Harness, COUNTING, EVERY_MINUTE, FAILING, SLOW};

// ============================================================================
// Boot-time load
// ============================================================================

#[tokio::test]
async fn test_load_all_arms_exactly_the_active_tasks() {
    let harness = Harness::new();
    harness
        .seed(NewTask::new(COUNTING, "Counting", EVERY_MINUTE))
        .await;
    harness
        .seed(NewTask::new(SLOW, "Slow", "0 4 * * *").with_timezone("Europe/Berlin"))
        .await;
    harness
        .seed(NewTask::new(FAILING, "Failing", EVERY_MINUTE).with_status(TaskStatus::Paused))
        .await;

    let armed = harness.scheduler.load_all().await.unwrap();
    assert_eq!(armed, 2);
    assert_eq!(harness.scheduler.live_task_ids(), vec![COUNTING, SLOW]);

    for task in harness.store.list_tasks().await.unwrap() {
        assert_eq!(harness.scheduler.is_scheduled(&task.id), task.is_active());
        assert_eq!(task.next_run_at.is_some(), task.is_active());
    }

    // Reloading is idempotent
    assert_eq!(harness.scheduler.load_all().await.unwrap(), 2);
    assert_eq!(harness.scheduler.live_task_ids(), vec![COUNTING, SLOW]);
}

#[tokio::test]
async fn test_load_all_fails_fast_on_unknown_task() {
    let harness = Harness::new();
    harness.create(COUNTING).await;
    harness
        .seed(NewTask::new("mystery", "No handler", EVERY_MINUTE))
        .await;

    let err = harness.scheduler.load_all().await.unwrap_err();
    assert_matches!(err, SchedulerError::UnknownTask(id) if id == "mystery");

    // Registry untouched
    assert!(harness.scheduler.is_scheduled(COUNTING));
    assert!(!harness.scheduler.is_scheduled("mystery"));
}

#[tokio::test]
async fn test_load_all_fails_executions_left_running() {
    let harness = Harness::new();
    harness.create(COUNTING).await;
    let stranded = harness
        .store
        .insert_execution(COUNTING, Utc::now(), "/tmp/encore/stranded.log")
        .await
        .unwrap();

    harness.scheduler.load_all().await.unwrap();

    let record = harness.store.get_execution(stranded).await.unwrap().unwrap();
    assert_eq!(record.status, ExecutionStatus::Failed);
    assert!(record.end_time.is_some());
    assert!(record.result.is_none());
    assert_matches!(record.error, Some(ref failure) if failure.message.starts_with("interrupted"));

    // The task itself is unaffected
    let report = harness.scheduler.run_now(COUNTING).await.unwrap();
    assert!(report.success);
}

#[tokio::test]
async fn test_load_all_leaves_in_flight_run_alone() {
    let harness = Harness::new();
    harness.create(SLOW).await;

    let scheduler = harness.scheduler.clone();
    let run = tokio::spawn(async move { scheduler.run_now(SLOW).await });
    tokio::time::sleep(Duration::from_millis(100)).await;

    harness.scheduler.load_all().await.unwrap();

    let report = run.await.unwrap().unwrap();
    assert!(report.success);
    let record = harness
        .store
        .get_execution(report.execution_id.unwrap())
        .await
        .unwrap()
        .unwrap();
    assert_eq!(record.status, ExecutionStatus::Completed);
}

// ============================================================================
// Create
// ============================================================================

#[tokio::test]
async fn test_malformed_cron_never_mutates_state() {
    let harness = Harness::new();

    for expression in ["61 * * * *", "* * *", "0 9 * * * *", "every day"] {
        let err = harness
            .scheduler
            .create(NewTask::new(COUNTING, "Counting", expression))
            .await
            .unwrap_err();
        assert_matches!(err, SchedulerError::InvalidSchedule { .. });
    }

    assert!(harness.store.list_tasks().await.unwrap().is_empty());
    assert!(harness.scheduler.live_task_ids().is_empty());
}

#[tokio::test]
async fn test_create_rejects_configuration_errors() {
    let harness = Harness::new();

    let err = harness
        .scheduler
        .create(NewTask::new(COUNTING, "Counting", EVERY_MINUTE).with_timezone("Atlantis/Lost"))
        .await
        .unwrap_err();
    assert_matches!(err, SchedulerError::UnknownTimezone(_));

    let err = harness
        .scheduler
        .create(NewTask::new("unregistered", "Nobody", EVERY_MINUTE))
        .await
        .unwrap_err();
    assert_matches!(err, SchedulerError::UnknownTask(_));

    let err = harness
        .scheduler
        .create(NewTask::new("  ", "Blank", EVERY_MINUTE))
        .await
        .unwrap_err();
    assert_matches!(err, SchedulerError::InvalidInput(_));

    harness.create(COUNTING).await;
    let err = harness
        .scheduler
        .create(NewTask::new(COUNTING, "Again", "0 3 * * *"))
        .await
        .unwrap_err();
    assert_matches!(err, SchedulerError::DuplicateTask(_));

    let task = harness.store.get_task(COUNTING).await.unwrap().unwrap();
    assert_eq!(task.expression, EVERY_MINUTE);
}

#[tokio::test]
async fn test_next_run_is_computed_in_task_timezone() {
    let harness = Harness::new();
    let before = Utc::now();

    let task = harness
        .scheduler
        .create(NewTask::new(COUNTING, "Counting", "0 9 * * *").with_timezone("Asia/Shanghai"))
        .await
        .unwrap();

    let next = task.next_run_at.expect("active task has a next run");
    assert!(next > before);
    assert!(next <= before + chrono::Duration::days(1));

    let local = next.with_timezone(&chrono_tz::Asia::Shanghai);
    assert_eq!((local.hour(), local.minute(), local.second()), (9, 0, 0));
    assert!(harness.scheduler.is_scheduled(COUNTING));
}

#[tokio::test]
async fn test_create_paused_does_not_arm() {
    let harness = Harness::new();
    let task = harness
        .scheduler
        .create(NewTask::new(COUNTING, "Counting", EVERY_MINUTE).with_status(TaskStatus::Paused))
        .await
        .unwrap();

    assert!(task.next_run_at.is_none());
    assert!(!harness.scheduler.is_scheduled(COUNTING));
    assert!(task.log_directory.ends_with(COUNTING));
    assert!(std::path::Path::new(&task.log_directory).starts_with(harness.log_dir.path()));
}

// ============================================================================
// Pause / resume / update
// ============================================================================

#[tokio::test]
async fn test_pause_resume_is_idempotent_and_keeps_schedule() {
    let harness = Harness::new();
    harness
        .scheduler
        .create(NewTask::new(COUNTING, "Counting", "30 2 * * 1-5").with_timezone("Europe/Berlin"))
        .await
        .unwrap();

    let paused = harness.scheduler.pause(COUNTING).await.unwrap();
    assert_eq!(paused.status, TaskStatus::Paused);
    assert!(paused.next_run_at.is_none());
    assert!(!harness.scheduler.is_scheduled(COUNTING));

    let again = harness.scheduler.pause(COUNTING).await.unwrap();
    assert_eq!(again.status, TaskStatus::Paused);

    let resumed = harness.scheduler.resume(COUNTING).await.unwrap();
    assert_eq!(resumed.status, TaskStatus::Active);
    assert!(resumed.next_run_at.is_some());
    assert!(harness.scheduler.is_scheduled(COUNTING));

    let again = harness.scheduler.resume(COUNTING).await.unwrap();
    assert_eq!(again.status, TaskStatus::Active);
    assert_eq!(harness.scheduler.live_task_ids(), vec![COUNTING]);

    let task = harness.store.get_task(COUNTING).await.unwrap().unwrap();
    assert_eq!(task.expression, "30 2 * * 1-5");
    assert_eq!(task.timezone, "Europe/Berlin");
}

#[tokio::test]
async fn test_pause_and_resume_missing_task() {
    let harness = Harness::new();
    assert_matches!(
        harness.scheduler.pause("ghost").await,
        Err(SchedulerError::TaskNotFound(_))
    );
    assert_matches!(
        harness.scheduler.resume("ghost").await,
        Err(SchedulerError::TaskNotFound(_))
    );
}

#[tokio::test]
async fn test_update_schedule_validates_first() {
    let harness = Harness::new();
    harness.create(COUNTING).await;

    let err = harness
        .scheduler
        .update_schedule(COUNTING, "99 * * * *", "UTC")
        .await
        .unwrap_err();
    assert_matches!(err, SchedulerError::InvalidSchedule { .. });
    let task = harness.store.get_task(COUNTING).await.unwrap().unwrap();
    assert_eq!(task.expression, EVERY_MINUTE);
    assert!(harness.scheduler.is_scheduled(COUNTING));

    let updated = harness
        .scheduler
        .update_schedule(COUNTING, "15 6 * * *", "America/New_York")
        .await
        .unwrap();
    assert_eq!(updated.expression, "15 6 * * *");
    assert_eq!(updated.timezone, "America/New_York");
    let local = updated
        .next_run_at
        .unwrap()
        .with_timezone(&chrono_tz::America::New_York);
    assert_eq!((local.hour(), local.minute()), (6, 15));
    assert_eq!(
        harness.scheduler.live_schedule(COUNTING),
        Some(("15 6 * * *".to_string(), "America/New_York".to_string()))
    );
}

#[tokio::test]
async fn test_update_schedule_of_paused_task_stays_paused() {
    let harness = Harness::new();
    harness.create(COUNTING).await;
    harness.scheduler.pause(COUNTING).await.unwrap();

    let updated = harness
        .scheduler
        .update_schedule(COUNTING, "0 12 * * *", "UTC")
        .await
        .unwrap();
    assert_eq!(updated.status, TaskStatus::Paused);
    assert!(updated.next_run_at.is_none());
    assert!(!harness.scheduler.is_scheduled(COUNTING));
}

// ============================================================================
// Run now / delete
// ============================================================================

#[tokio::test]
async fn test_run_now_updates_run_stats_regardless_of_outcome() {
    let harness = Harness::new();
    harness.create(COUNTING).await;
    harness.create(FAILING).await;

    let ok = harness.scheduler.run_now(COUNTING).await.unwrap();
    assert!(ok.success);
    assert_eq!(harness.counting.count(), 1);

    let failed = harness.scheduler.run_now(FAILING).await.unwrap();
    assert!(!failed.success);
    assert!(failed.execution_id.is_some());

    for id in [COUNTING, FAILING] {
        let task = harness.store.get_task(id).await.unwrap().unwrap();
        assert_eq!(task.run_count, 1);
        assert!(task.last_run_at.is_some());
        assert!(task.next_run_at.is_some());
    }
}

#[tokio::test]
async fn test_run_now_refuses_paused_task() {
    let harness = Harness::new();
    harness.create(COUNTING).await;
    harness.scheduler.pause(COUNTING).await.unwrap();

    let err = harness.scheduler.run_now(COUNTING).await.unwrap_err();
    assert_matches!(err, SchedulerError::TaskPaused(_));
    assert_eq!(harness.store.count_executions(COUNTING).await.unwrap(), 0);
    assert_eq!(harness.counting.count(), 0);

    assert_matches!(
        harness.scheduler.run_now("ghost").await,
        Err(SchedulerError::TaskNotFound(_))
    );
}

#[tokio::test]
async fn test_pause_does_not_cancel_in_flight_run() {
    let harness = Harness::new();
    harness.create(SLOW).await;

    let scheduler = harness.scheduler.clone();
    let run = tokio::spawn(async move { scheduler.run_now(SLOW).await });

    tokio::time::sleep(Duration::from_millis(100)).await;
    harness.scheduler.pause(SLOW).await.unwrap();

    let report = run.await.unwrap().unwrap();
    assert!(report.success);
    let record = harness
        .store
        .get_execution(report.execution_id.unwrap())
        .await
        .unwrap()
        .unwrap();
    assert_eq!(record.status, ExecutionStatus::Completed);

    let task = harness.store.get_task(SLOW).await.unwrap().unwrap();
    assert_eq!(task.status, TaskStatus::Paused);
    assert!(task.next_run_at.is_none());
}

#[tokio::test]
async fn test_delete_cascades_history() {
    let harness = Harness::new();
    harness.create(COUNTING).await;
    harness.scheduler.run_now(COUNTING).await.unwrap();
    harness.scheduler.run_now(COUNTING).await.unwrap();
    assert_eq!(harness.store.count_executions(COUNTING).await.unwrap(), 2);

    harness.scheduler.delete(COUNTING).await.unwrap();

    assert_eq!(harness.store.count_executions(COUNTING).await.unwrap(), 0);
    assert!(harness.store.get_task(COUNTING).await.unwrap().is_none());
    assert!(!harness.scheduler.is_scheduled(COUNTING));
    assert_matches!(
        harness.scheduler.delete(COUNTING).await,
        Err(SchedulerError::TaskNotFound(_))
    );
}

// ============================================================================
// Listing
// ============================================================================

#[tokio::test]
async fn test_list_status_reports_live_triggers() {
    let harness = Harness::new();
    harness.create(COUNTING).await;
    harness.create(FAILING).await;
    harness.scheduler.pause(FAILING).await.unwrap();

    let views = harness.scheduler.list_status().await.unwrap();
    let flags: Vec<(&str, bool)> = views
        .iter()
        .map(|v| (v.task.id.as_str(), v.scheduled))
        .collect();
    assert_eq!(flags, vec![(COUNTING, true), (FAILING, false)]);
}

#[tokio::test]
async fn test_execution_history_pages_newest_first() {
    let harness = Harness::new();
    harness.create(COUNTING).await;
    let mut ids = Vec::new();
    for _ in 0..3 {
        let report = harness.scheduler.run_now(COUNTING).await.unwrap();
        ids.push(report.execution_id.unwrap());
    }

    let first = harness
        .scheduler
        .executions(COUNTING, Some(1), Some(2))
        .await
        .unwrap();
    assert_eq!(first.total, 3);
    assert_eq!(
        first.items.iter().map(|e| e.id).collect::<Vec<_>>(),
        vec![ids[2], ids[1]]
    );

    let second = harness
        .scheduler
        .executions(COUNTING, Some(2), Some(2))
        .await
        .unwrap();
    assert_eq!(second.items.len(), 1);
    assert_eq!(second.items[0].id, ids[0]);

    let clamped = harness
        .scheduler
        .executions(COUNTING, Some(0), Some(1000))
        .await
        .unwrap();
    assert_eq!((clamped.page, clamped.page_size), (1, 100));
    assert_eq!(clamped.items.len(), 3);

    let defaults = harness
        .scheduler
        .executions(COUNTING, None, None)
        .await
        .unwrap();
    assert_eq!(defaults.page_size, 20);

    assert_matches!(
        harness.scheduler.executions("ghost", None, None).await,
        Err(SchedulerError::TaskNotFound(_))
    );
}

// ============================================================================
// Triggers
// ============================================================================

#[tokio::test(start_paused = true)]
async fn test_cron_trigger_fires_runner() {
    let harness = Harness::new();
    harness.create(COUNTING).await;

    // Clock is paused: sleeping auto-advances past the next minute boundary
    tokio::time::sleep(Duration::from_secs(61)).await;
    for _ in 0..500 {
        if harness.counting.count() > 0 {
            break;
        }
        tokio::time::sleep(Duration::from_millis(10)).await;
    }

    assert!(harness.counting.count() >= 1);
}

#[tokio::test]
async fn test_shutdown_stops_every_trigger() {
    let harness = Harness::new();
    harness.create(COUNTING).await;
    harness.create(SLOW).await;

    assert_eq!(harness.scheduler.shutdown().await, 2);
    assert!(harness.scheduler.live_task_ids().is_empty());

    // Definitions are untouched
    assert_eq!(harness.store.list_tasks().await.unwrap().len(), 2);
}
