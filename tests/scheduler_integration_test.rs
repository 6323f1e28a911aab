//! Scheduler integration tests.
//!
//! Cover the admission bound, the forced-timeout path, external
//! cancellation, and the event stream emitted across a plan's lifetime.

use std::sync::Arc;
use std::time::Duration;

use stagecraft::services::{
    EventBus, EventPayload, PlanExecutor, PlanScheduler, SchedulerConfig, WorkItemRegistry,
};
use stagecraft::{FailureKind, ItemPriority, PlanStatus, WorkItem};

fn make_scheduler(config: SchedulerConfig) -> (Arc<PlanScheduler>, Arc<EventBus>) {
    let event_bus = Arc::new(EventBus::default());
    let scheduler = Arc::new(PlanScheduler::new(
        Arc::new(WorkItemRegistry::new()),
        Arc::new(PlanExecutor::with_defaults()),
        event_bus.clone(),
        config,
    ));
    (scheduler, event_bus)
}

fn quick_item(title: &str, priority: ItemPriority, duration_ms: u64) -> WorkItem {
    WorkItem::new(title, "test", 10.0, 60.0)
        .with_priority(priority)
        .with_estimated_duration_ms(duration_ms)
}

#[tokio::test]
async fn test_exactly_top_k_plans_created_per_cycle() {
    let (scheduler, _) = make_scheduler(SchedulerConfig {
        top_k: 3,
        ..Default::default()
    });
    for i in 0..10 {
        scheduler
            .submit_work_item(quick_item(&format!("item-{i}"), ItemPriority::Medium, 60_000))
            .await
            .unwrap();
    }

    scheduler.tick().await;
    assert_eq!(scheduler.state().await.active_plans.len(), 3);

    // Next cycle admits three more, never exceeding K new plans per cycle.
    scheduler.tick().await;
    assert_eq!(scheduler.state().await.active_plans.len(), 6);
}

#[tokio::test]
async fn test_timeout_forces_failure_despite_valid_step() {
    let (scheduler, _) = make_scheduler(SchedulerConfig {
        grace: Duration::from_millis(30),
        ..Default::default()
    });
    // The built-in stage actions always validate, so only the grace
    // window can fail this plan.
    let item = quick_item("will-time-out", ItemPriority::Critical, 10);
    scheduler.submit_work_item(item).await.unwrap();

    scheduler.tick().await;
    tokio::time::sleep(Duration::from_millis(80)).await;
    scheduler.tick().await;

    let state = scheduler.state().await;
    assert_eq!(state.completed_plans.len(), 1);
    let summary = &state.completed_plans[0];
    assert_eq!(summary.status, PlanStatus::Failed);
    assert_eq!(summary.failure_kind, Some(FailureKind::Timeout));

    let plan = scheduler.plan(summary.id).await.unwrap();
    assert_eq!(plan.failure.as_ref().unwrap().message, "timeout");
    assert_eq!(state.metrics.failed_plans, 1);
}

#[tokio::test]
async fn test_cancellation_before_terminal_state() {
    let (scheduler, event_bus) = make_scheduler(SchedulerConfig::default());
    let mut events = event_bus.subscribe();
    scheduler
        .submit_work_item(quick_item("cancel-me", ItemPriority::High, 60_000))
        .await
        .unwrap();
    scheduler.tick().await;

    let plan_id = scheduler.state().await.active_plans[0].id;
    assert!(scheduler.cancel_plan(plan_id).await);

    let plan = scheduler.plan(plan_id).await.unwrap();
    assert_eq!(plan.status, PlanStatus::Failed);
    let failure = plan.failure.as_ref().unwrap();
    assert_eq!(failure.kind, FailureKind::Cancelled);
    assert_eq!(failure.message, "cancelled");

    let mut saw_failed_event = false;
    while let Ok(event) = events.try_recv() {
        if let EventPayload::PlanFailed { kind, .. } = event.payload {
            assert_eq!(kind, FailureKind::Cancelled);
            saw_failed_event = true;
        }
    }
    assert!(saw_failed_event);
}

#[tokio::test]
async fn test_plan_lifecycle_events_in_order() {
    let (scheduler, event_bus) = make_scheduler(SchedulerConfig::default());
    let mut events = event_bus.subscribe();
    scheduler
        .submit_work_item(quick_item("observed", ItemPriority::High, 60_000))
        .await
        .unwrap();

    for _ in 0..6 {
        scheduler.tick().await;
    }

    let mut created = false;
    let mut completed = false;
    let mut last_sequence = None;
    while let Ok(event) = events.try_recv() {
        if let Some(previous) = last_sequence {
            assert!(event.sequence.0 > previous, "sequence must be monotonic");
        }
        last_sequence = Some(event.sequence.0);
        match event.payload {
            EventPayload::PlanCreated { .. } => {
                assert!(!completed, "created must precede completed");
                created = true;
            }
            EventPayload::PlanCompleted { .. } => completed = true,
            _ => {}
        }
    }
    assert!(created && completed);
}

#[tokio::test]
async fn test_failed_item_reaches_fresh_plan_after_rediscovery() {
    let (scheduler, _) = make_scheduler(SchedulerConfig {
        grace: Duration::from_millis(20),
        ..Default::default()
    });
    let item = quick_item("retryable", ItemPriority::Critical, 5);
    let item_id = item.id;
    scheduler.submit_work_item(item.clone()).await.unwrap();

    scheduler.tick().await;
    tokio::time::sleep(Duration::from_millis(60)).await;
    scheduler.tick().await;
    assert_eq!(scheduler.state().await.metrics.failed_plans, 1);

    // No automatic retry: further cycles create no new plan for the item.
    scheduler.tick().await;
    assert!(scheduler.state().await.active_plans.is_empty());

    // External re-discovery: remove, then submit a fresh item with the
    // same identifier. A fresh plan is created from scratch.
    scheduler.remove_work_item(item_id).await;
    scheduler.submit_work_item(item).await.unwrap();
    scheduler.tick().await;
    assert_eq!(scheduler.state().await.active_plans.len(), 1);
}
