//! Scheduler tests: trigger lifecycle, fired runs, retry budget.

use chrono::{Duration, Utc};
use std::sync::Arc;

use unidir_connector::{RawRecord, StaticConnector};
use unidir_core::{JobStatus, Source};
use unidir_engine::{
    Engine, EngineError, ManualTriggerBackend, RunType, ScheduleRequest, ScheduleStatus,
    Scheduler, TriggerBackend, TriggerCallback, TriggerError, TriggerHandle,
};

async fn engine() -> Arc<Engine> {
    let pool = unidir_store::connect_in_memory().await.unwrap();
    let engine = Arc::new(Engine::new(pool));
    engine.initialize().await.unwrap();
    engine
}

async fn scheduler_with_backend() -> (Arc<Engine>, Scheduler, Arc<ManualTriggerBackend>) {
    let engine = engine().await;
    let backend = Arc::new(ManualTriggerBackend::new());
    let scheduler = Scheduler::new(engine.clone(), backend.clone());
    scheduler.initialize().await.unwrap();
    (engine, scheduler, backend)
}

fn daily_request(source: Source) -> ScheduleRequest {
    ScheduleRequest {
        source,
        enabled: true,
        cron_expression: "0 2 * * *".to_string(),
        timezone: "UTC".to_string(),
        retry_on_error: false,
        retry_attempts: 3,
        retry_delay_minutes: 5,
    }
}

#[tokio::test]
async fn test_create_enabled_schedule_registers_trigger() {
    let (_engine, scheduler, backend) = scheduler_with_backend().await;

    let schedule = scheduler
        .create_schedule(daily_request(Source::Directory))
        .await
        .unwrap();
    assert_eq!(schedule.status, ScheduleStatus::Active);
    assert!(schedule.next_run_at.is_some());
    assert_eq!(backend.registered_count(), 1);
}

#[tokio::test]
async fn test_disabled_schedule_has_no_trigger() {
    let (_engine, scheduler, backend) = scheduler_with_backend().await;

    let request = ScheduleRequest {
        enabled: false,
        ..daily_request(Source::Ldap)
    };
    let schedule = scheduler.create_schedule(request).await.unwrap();
    assert_eq!(schedule.status, ScheduleStatus::Inactive);
    assert_eq!(backend.registered_count(), 0);
}

#[tokio::test]
async fn test_schedule_validation() {
    let (_engine, scheduler, _backend) = scheduler_with_backend().await;

    let err = scheduler
        .create_schedule(daily_request(Source::Upload))
        .await
        .unwrap_err();
    assert!(matches!(err, EngineError::InvalidSchedule { .. }));

    let request = ScheduleRequest {
        cron_expression: "*/5 * * * *".to_string(),
        ..daily_request(Source::Directory)
    };
    let err = scheduler.create_schedule(request).await.unwrap_err();
    assert!(matches!(err, EngineError::InvalidSchedule { .. }));
}

#[tokio::test]
async fn test_update_replaces_trigger_and_disable_stops_it() {
    let (_engine, scheduler, backend) = scheduler_with_backend().await;

    let schedule = scheduler
        .create_schedule(daily_request(Source::Directory))
        .await
        .unwrap();
    assert_eq!(backend.registered_count(), 1);

    // Changing the expression re-registers exactly one trigger.
    let request = ScheduleRequest {
        cron_expression: "30 4 * * *".to_string(),
        ..daily_request(Source::Directory)
    };
    let updated = scheduler
        .update_schedule(schedule.id, request)
        .await
        .unwrap();
    assert_eq!(updated.cron_expression, "30 4 * * *");
    assert_eq!(updated.status, ScheduleStatus::Active);
    assert_eq!(backend.registered_count(), 1);

    // Disabling stops the trigger.
    let request = ScheduleRequest {
        enabled: false,
        ..daily_request(Source::Directory)
    };
    let updated = scheduler
        .update_schedule(schedule.id, request)
        .await
        .unwrap();
    assert_eq!(updated.status, ScheduleStatus::Inactive);
    assert!(updated.next_run_at.is_none());
    assert_eq!(backend.registered_count(), 0);
}

#[tokio::test]
async fn test_delete_schedule_cancels_trigger() {
    let (_engine, scheduler, backend) = scheduler_with_backend().await;

    let schedule = scheduler
        .create_schedule(daily_request(Source::Directory))
        .await
        .unwrap();
    scheduler.delete_schedule(schedule.id).await.unwrap();
    assert_eq!(backend.registered_count(), 0);
    assert!(matches!(
        scheduler.get_schedule(schedule.id).await.unwrap_err(),
        EngineError::ScheduleNotFound { .. }
    ));

    let err = scheduler.delete_schedule(schedule.id).await.unwrap_err();
    assert!(matches!(err, EngineError::ScheduleNotFound { .. }));
}

#[tokio::test]
async fn test_fired_run_records_history_and_run_times() {
    let (engine, scheduler, backend) = scheduler_with_backend().await;
    engine
        .register_connector(Arc::new(StaticConnector::new(
            Source::Directory,
            vec![RawRecord::new().with("id", "u1").with("mail", "a@x.com")],
        )))
        .await;

    let schedule = scheduler
        .create_schedule(daily_request(Source::Directory))
        .await
        .unwrap();

    backend.fire_all().await;

    let history = engine.get_sync_history(10).await.unwrap();
    assert_eq!(history.len(), 1);
    assert_eq!(history[0].run_type, RunType::Scheduled);
    assert_eq!(history[0].status, JobStatus::Completed);
    assert_eq!(history[0].schedule_id, Some(schedule.id));

    let refreshed = scheduler.get_schedule(schedule.id).await.unwrap();
    assert!(refreshed.last_run_at.is_some());
    assert!(refreshed.next_run_at.is_some());
    assert!(refreshed.next_run_at.unwrap() > Utc::now());
}

#[tokio::test]
async fn test_retry_budget_is_exhausted_after_configured_attempts() {
    let (engine, scheduler, backend) = scheduler_with_backend().await;
    engine
        .register_connector(Arc::new(StaticConnector::failing(
            Source::Ldap,
            "server on fire",
        )))
        .await;

    let request = ScheduleRequest {
        retry_on_error: true,
        retry_attempts: 2,
        retry_delay_minutes: 5,
        ..daily_request(Source::Ldap)
    };
    let schedule = scheduler.create_schedule(request).await.unwrap();

    // Original scheduled run fails and queues the first retry.
    backend.fire_all().await;
    assert_eq!(scheduler.pending_retries(), 1);

    // First retry fails, queues the second.
    let ran = scheduler
        .process_due_retries(Utc::now() + Duration::minutes(6))
        .await;
    assert_eq!(ran, 1);
    assert_eq!(scheduler.pending_retries(), 1);

    // Second retry fails; the budget of 2 is exhausted.
    let ran = scheduler
        .process_due_retries(Utc::now() + Duration::minutes(12))
        .await;
    assert_eq!(ran, 1);
    assert_eq!(scheduler.pending_retries(), 0);

    let ran = scheduler
        .process_due_retries(Utc::now() + Duration::minutes(60))
        .await;
    assert_eq!(ran, 0);

    // Exactly two retry-tagged entries before giving up.
    let history = engine.get_sync_history(10).await.unwrap();
    let retries = history
        .iter()
        .filter(|e| e.run_type == RunType::Retry)
        .count();
    assert_eq!(retries, 2);
    let scheduled = history
        .iter()
        .filter(|e| e.run_type == RunType::Scheduled)
        .count();
    assert_eq!(scheduled, 1);

    let stats = scheduler.schedule_stats(schedule.id).await.unwrap();
    assert_eq!(stats.total_runs, 3);
    assert_eq!(stats.failed, 3);
    assert_eq!(stats.retries, 2);
}

#[tokio::test]
async fn test_successful_run_queues_no_retry() {
    let (engine, scheduler, backend) = scheduler_with_backend().await;
    engine
        .register_connector(Arc::new(StaticConnector::new(
            Source::Directory,
            vec![RawRecord::new().with("id", "u1").with("mail", "a@x.com")],
        )))
        .await;

    let request = ScheduleRequest {
        retry_on_error: true,
        retry_attempts: 3,
        ..daily_request(Source::Directory)
    };
    scheduler.create_schedule(request).await.unwrap();

    backend.fire_all().await;
    assert_eq!(scheduler.pending_retries(), 0);
}

struct RejectingBackend;

impl TriggerBackend for RejectingBackend {
    fn register(
        &self,
        cron_expression: &str,
        _timezone: &str,
        _callback: TriggerCallback,
    ) -> Result<TriggerHandle, TriggerError> {
        Err(TriggerError::Unsupported(cron_expression.to_string()))
    }

    fn cancel(&self, _handle: &TriggerHandle) {}
}

#[tokio::test]
async fn test_trigger_registration_failure_marks_schedule_error() {
    let engine = engine().await;
    let scheduler = Scheduler::new(engine.clone(), Arc::new(RejectingBackend));
    scheduler.initialize().await.unwrap();

    let schedule = scheduler
        .create_schedule(daily_request(Source::Directory))
        .await
        .unwrap();
    assert_eq!(schedule.status, ScheduleStatus::Error);
    assert!(schedule.next_run_at.is_none());

    let stored = scheduler.get_schedule(schedule.id).await.unwrap();
    assert_eq!(stored.status, ScheduleStatus::Error);
}

#[tokio::test]
async fn test_initialize_reregisters_enabled_schedules() {
    let (engine, scheduler, backend) = scheduler_with_backend().await;
    scheduler
        .create_schedule(daily_request(Source::Directory))
        .await
        .unwrap();
    let disabled = ScheduleRequest {
        enabled: false,
        ..daily_request(Source::Ldap)
    };
    scheduler.create_schedule(disabled).await.unwrap();
    assert_eq!(backend.registered_count(), 1);

    // A fresh scheduler over the same pool re-registers only the enabled
    // schedule, as after a process restart.
    let backend2 = Arc::new(ManualTriggerBackend::new());
    let scheduler2 = Scheduler::new(engine.clone(), backend2.clone());
    scheduler2.initialize().await.unwrap();
    assert_eq!(backend2.registered_count(), 1);
}
