//! Service-level flows: spawned runs, control requests, retry and rollback.

mod common;

use common::{version, ScriptedFactory, World};
use std::sync::Arc;
use std::time::Duration;
use switchover::domain::models::{RunOutcome, TaskExecutionResult, TaskStatus};
use switchover::domain::ports::{CheckpointRepository, ConflictRegistry};
use switchover::domain::DomainError;
use switchover::services::{RunSettings, TaskService};
use tokio_test::{assert_err, assert_ok};

#[tokio::test]
async fn test_create_start_and_wait() {
    let world = World::new();
    let service = world.service(Arc::new(ScriptedFactory::default()));

    let task = service
        .create_task("plan-1", "tenant-a", version("v2", &["drain", "switch"]), None)
        .await
        .unwrap();
    assert_eq!(task.status(), TaskStatus::Pending);
    assert_eq!(task.stage_names(), ["drain", "switch"]);

    assert_ok!(service.start_task(task.task_id()).await);
    let result = service.wait_for(task.task_id()).await.unwrap();

    assert_eq!(result.outcome, RunOutcome::Completed);
    let stored = service.get_task(task.task_id()).await.unwrap();
    assert_eq!(stored.status(), TaskStatus::Completed);
    assert!(!service.is_running(task.task_id()).await.unwrap());
    assert!(world.conflicts.holder("tenant-a").is_none());
}

#[tokio::test]
async fn test_create_rejects_blank_tenant() {
    let world = World::new();
    let service = world.service(Arc::new(ScriptedFactory::default()));

    let err = service
        .create_task("plan-1", "  ", version("v2", &["a"]), None)
        .await
        .unwrap_err();
    assert!(matches!(err, DomainError::ValidationFailed(_)));
}

#[tokio::test]
async fn test_pause_and_resume_through_service() {
    let world = World::new();
    let factory = Arc::new(ScriptedFactory::default());
    let service = world.service(factory.clone());
    let task = service
        .create_task("plan-1", "tenant-a", version("v2", &["slow-a", "b", "c"]), None)
        .await
        .unwrap();
    let id = task.task_id().to_string();

    service.start_task(&id).await.unwrap();
    tokio::time::sleep(Duration::from_millis(30)).await;
    assert_ok!(service.pause_task(&id).await);
    let paused = service.wait_for(&id).await.unwrap();
    assert_eq!(paused.outcome, RunOutcome::Paused);
    assert_eq!(paused.executed_stages, vec!["slow-a"]);

    // Nothing in flight: pausing again is an invalid transition.
    assert_err!(service.pause_task(&id).await);

    service.resume_task(&id).await.unwrap();
    let resumed = service.wait_for(&id).await.unwrap();
    assert_eq!(resumed.executed_stages, vec!["b", "c"]);
    assert_eq!(factory.stage("slow-a").unwrap().runs(), 1);
}

#[tokio::test]
async fn test_cancel_running_task_stops_at_boundary() {
    let world = World::new();
    let factory = Arc::new(ScriptedFactory::default());
    let service = world.service(factory.clone());
    let task = service
        .create_task("plan-1", "tenant-a", version("v2", &["slow-a", "b"]), None)
        .await
        .unwrap();
    let id = task.task_id().to_string();

    service.start_task(&id).await.unwrap();
    tokio::time::sleep(Duration::from_millis(30)).await;
    service.cancel_task(&id, Some("ops".into())).await.unwrap();
    let result = service.wait_for(&id).await.unwrap();

    assert_eq!(result.outcome, RunOutcome::Cancelled);
    assert_eq!(factory.stage("b").unwrap().runs(), 0);
    let stored = service.get_task(&id).await.unwrap();
    assert_eq!(stored.cancelled_by(), Some("ops"));
}

/// Spawn a task that awaits the run, detaching its handle from the service.
fn spawn_waiter(
    service: &Arc<TaskService>,
    id: &str,
) -> tokio::task::JoinHandle<Result<TaskExecutionResult, DomainError>> {
    let service = Arc::clone(service);
    let id = id.to_string();
    tokio::spawn(async move { service.wait_for(&id).await })
}

#[tokio::test]
async fn test_cancel_reaches_run_while_another_caller_waits() {
    let world = World::new();
    let factory = Arc::new(ScriptedFactory::default());
    let service = Arc::new(world.service(factory.clone()));
    let task = service
        .create_task("plan-1", "tenant-a", version("v2", &["slow-a", "slow-b", "c"]), None)
        .await
        .unwrap();
    let id = task.task_id().to_string();

    service.start_task(&id).await.unwrap();
    let waiter = spawn_waiter(&service, &id);
    tokio::time::sleep(Duration::from_millis(50)).await;
    assert!(service.is_running(&id).await.unwrap());

    assert_ok!(service.cancel_task(&id, Some("ops".into())).await);
    let result = waiter.await.unwrap().unwrap();

    assert_eq!(result.outcome, RunOutcome::Cancelled);
    assert_eq!(result.executed_stages, vec!["slow-a"]);
    assert_eq!(factory.stage("c").unwrap().runs(), 0);
    let stored = service.get_task(&id).await.unwrap();
    assert_eq!(stored.status(), TaskStatus::Cancelled);
    assert!(!service.is_running(&id).await.unwrap());
}

#[tokio::test]
async fn test_recover_leaves_live_run_alone_while_another_caller_waits() {
    let world = World::new();
    let service = Arc::new(world.service(Arc::new(ScriptedFactory::default())));
    let task = service
        .create_task("plan-1", "tenant-a", version("v2", &["slow-a", "slow-b", "c"]), None)
        .await
        .unwrap();
    let other = service
        .create_task("plan-2", "tenant-a", version("v3", &["d"]), None)
        .await
        .unwrap();
    let id = task.task_id().to_string();

    service.start_task(&id).await.unwrap();
    let waiter = spawn_waiter(&service, &id);
    tokio::time::sleep(Duration::from_millis(50)).await;

    let recovered = service.recover_task(&id).await.unwrap();
    assert_eq!(recovered.status(), TaskStatus::Running);
    assert_eq!(world.conflicts.holder("tenant-a").as_deref(), Some(id.as_str()));
    let err = service.start_task(other.task_id()).await.unwrap_err();
    assert!(matches!(err, DomainError::TenantConflict { .. }));
    assert!(service.recover_all().await.unwrap().is_empty());

    let result = waiter.await.unwrap().unwrap();
    assert_eq!(result.outcome, RunOutcome::Completed);
    let stored = service.get_task(&id).await.unwrap();
    assert_eq!(stored.status(), TaskStatus::Completed);
    assert!(world.conflicts.holder("tenant-a").is_none());
}

#[tokio::test]
async fn test_retry_from_checkpoint_skips_completed_stages() {
    let world = World::new();
    let factory = Arc::new(ScriptedFactory::default());
    let service = world.service(factory.clone());
    let task = service
        .create_task("plan-1", "tenant-a", version("v2", &["a", "flaky-b", "c"]), None)
        .await
        .unwrap();
    let id = task.task_id().to_string();

    service.start_task(&id).await.unwrap();
    assert_eq!(service.wait_for(&id).await.unwrap().outcome, RunOutcome::Failed);
    let checkpoint = world.checkpoints.get(&id).await.unwrap().unwrap();
    assert_eq!(checkpoint.last_completed_stage_index, 0);

    service.retry_task(&id, true).await.unwrap();
    let result = service.wait_for(&id).await.unwrap();

    assert_eq!(result.outcome, RunOutcome::Completed);
    assert_eq!(result.executed_stages, vec!["flaky-b", "c"]);
    assert_eq!(factory.stage("a").unwrap().runs(), 1);
    assert!(world.checkpoints.get(&id).await.unwrap().is_none());
}

#[tokio::test]
async fn test_full_retry_reruns_everything() {
    let world = World::new();
    let factory = Arc::new(ScriptedFactory::default());
    let service = world.service(factory.clone());
    let task = service
        .create_task("plan-1", "tenant-a", version("v2", &["a", "flaky-b"]), None)
        .await
        .unwrap();
    let id = task.task_id().to_string();

    service.start_task(&id).await.unwrap();
    service.wait_for(&id).await.unwrap();
    service.retry_task(&id, false).await.unwrap();
    let result = service.wait_for(&id).await.unwrap();

    assert_eq!(result.executed_stages, vec!["a", "flaky-b"]);
    assert_eq!(factory.stage("a").unwrap().runs(), 2);
}

#[tokio::test]
async fn test_retry_limit_checked_before_spawning() {
    let world = World::new();
    let service = world
        .service(Arc::new(ScriptedFactory::default()))
        .with_settings(RunSettings {
            heartbeat_interval: None,
            global_max_retry: Some(1),
        });
    let task = service
        .create_task("plan-1", "tenant-a", version("v2", &["fail-a"]), None)
        .await
        .unwrap();
    let id = task.task_id().to_string();

    service.start_task(&id).await.unwrap();
    service.wait_for(&id).await.unwrap();
    service.retry_task(&id, false).await.unwrap();
    service.wait_for(&id).await.unwrap();

    let err = service.retry_task(&id, false).await.unwrap_err();
    assert!(matches!(err, DomainError::RetryLimitExceeded { .. }));
    assert!(!service.is_running(&id).await.unwrap());
}

#[tokio::test]
async fn test_rollback_replays_previous_version() {
    let world = World::new();
    let factory = Arc::new(ScriptedFactory::default());
    let service = world.service(factory.clone());
    let task = service
        .create_task(
            "plan-1",
            "tenant-a",
            version("v2", &["new-a", "fail-b", "new-c"]),
            Some(version("v1", &["old-a", "old-b", "old-c"])),
        )
        .await
        .unwrap();
    let id = task.task_id().to_string();

    service.start_task(&id).await.unwrap();
    service.wait_for(&id).await.unwrap();

    service.rollback_task(&id).await.unwrap();
    let result = service.wait_for(&id).await.unwrap();

    assert_eq!(result.outcome, RunOutcome::Completed);
    assert_eq!(result.executed_stages, vec!["old-a", "old-b"]);
    assert_eq!(factory.stage("old-c").unwrap().runs(), 0);
    let stored = service.get_task(&id).await.unwrap();
    assert!(!stored.is_rollback_intent());
    assert_eq!(stored.retry_policy().retry_count(), 0);
    assert!(world.publisher.kinds().contains(&"TaskRolledBack"));
}

#[tokio::test]
async fn test_failed_rollback_is_retried_as_rollback() {
    let world = World::new();
    let factory = Arc::new(ScriptedFactory::default());
    let service = world.service(factory.clone());
    let task = service
        .create_task(
            "plan-1",
            "tenant-a",
            version("v2", &["new-a", "fail-b"]),
            Some(version("v1", &["old-a", "flaky-b"])),
        )
        .await
        .unwrap();
    let id = task.task_id().to_string();

    service.start_task(&id).await.unwrap();
    service.wait_for(&id).await.unwrap();
    service.rollback_task(&id).await.unwrap();
    service.wait_for(&id).await.unwrap();

    let failed = service.get_task(&id).await.unwrap();
    assert_eq!(failed.status(), TaskStatus::Failed);
    assert!(failed.is_rollback_intent());
    assert!(world.publisher.kinds().contains(&"TaskRollbackFailed"));
    assert!(matches!(
        service.rollback_task(&id).await,
        Err(DomainError::RollbackUnavailable(_))
    ));

    service.retry_task(&id, true).await.unwrap();
    let result = service.wait_for(&id).await.unwrap();
    assert_eq!(result.executed_stages, vec!["flaky-b"]);
    assert_eq!(factory.stage("old-a").unwrap().runs(), 1);
    assert!(world.publisher.kinds().contains(&"TaskRolledBack"));
}

#[tokio::test]
async fn test_second_task_for_tenant_is_rejected_while_first_runs() {
    let world = World::new();
    let service = world.service(Arc::new(ScriptedFactory::default()));
    let first = service
        .create_task("plan-1", "tenant-a", version("v2", &["slow-a"]), None)
        .await
        .unwrap();
    let second = service
        .create_task("plan-2", "tenant-a", version("v3", &["b"]), None)
        .await
        .unwrap();

    service.start_task(first.task_id()).await.unwrap();
    tokio::time::sleep(Duration::from_millis(20)).await;
    let err = service.start_task(second.task_id()).await.unwrap_err();
    assert!(matches!(err, DomainError::TenantConflict { .. }));

    service.wait_for(first.task_id()).await.unwrap();
    assert_ok!(service.start_task(second.task_id()).await);
    service.wait_for(second.task_id()).await.unwrap();
}

#[tokio::test]
async fn test_other_tenants_run_concurrently() {
    let world = World::new();
    let service = world.service(Arc::new(ScriptedFactory::default()));
    let a = service
        .create_task("plan-1", "tenant-a", version("v2", &["slow-a"]), None)
        .await
        .unwrap();
    let b = service
        .create_task("plan-1", "tenant-b", version("v2", &["slow-a"]), None)
        .await
        .unwrap();

    service.start_task(a.task_id()).await.unwrap();
    service.start_task(b.task_id()).await.unwrap();

    assert!(service.wait_for(a.task_id()).await.unwrap().is_success());
    assert!(service.wait_for(b.task_id()).await.unwrap().is_success());
    assert_eq!(service.tasks_for_tenant("tenant-b").await.unwrap().len(), 1);
    assert_eq!(service.list_tasks().await.unwrap().len(), 2);
}
