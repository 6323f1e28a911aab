//! Plan scheduler.
//!
//! Owns the set of active plans and drives them on a global fixed-interval
//! tick, independent of step durations. Each cycle: sweep timeouts, admit
//! the top-K ranked unplanned work items, advance every active plan by at
//! most one step (distinct plans advance concurrently), and retire
//! terminal plans. Success and failure tallies are fields owned by this
//! instance and exposed only through the read-only state query.

use std::collections::{HashMap, HashSet};
use std::sync::Arc;
use std::time::Duration;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use tokio::sync::{watch, RwLock};
use tracing::{debug, info};
use uuid::Uuid;

use crate::domain::errors::DomainResult;
use crate::domain::models::{FailureKind, Plan, PlanStatus, Stage, WorkItem};
use crate::services::event_bus::{EventBus, EventPayload};
use crate::services::plan_executor::{AdvanceOutcome, PlanExecutor};
use crate::services::registry::WorkItemRegistry;

/// Configuration for the plan scheduler.
#[derive(Debug, Clone)]
pub struct SchedulerConfig {
    /// Global tick interval, independent of step durations.
    pub tick_interval: Duration,
    /// Grace window past a plan's estimated completion before forced
    /// timeout failure.
    pub grace: Duration,
    /// New plans admitted per scheduling cycle.
    pub top_k: usize,
}

impl Default for SchedulerConfig {
    fn default() -> Self {
        Self {
            tick_interval: Duration::from_secs(1),
            grace: Duration::from_secs(60),
            top_k: 3,
        }
    }
}

/// Lifetime counters owned by the scheduler.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct SchedulerMetrics {
    /// Plans that reached a terminal state
    pub total_plans: u64,
    /// Plans that succeeded
    pub succeeded_plans: u64,
    /// Plans that failed (any failure kind)
    pub failed_plans: u64,
    /// Scheduling cycles completed
    pub cycles_completed: u64,
    /// Incremental mean of terminal plan durations
    pub avg_plan_duration_ms: f64,
}

impl SchedulerMetrics {
    /// Success ratio over terminal plans, as a percentage.
    pub fn efficiency(&self) -> f64 {
        if self.total_plans == 0 {
            return 0.0;
        }
        #[allow(clippy::cast_precision_loss)]
        let ratio = self.succeeded_plans as f64 / self.total_plans as f64;
        ratio * 100.0
    }

    fn record_terminal(&mut self, succeeded: bool, duration_ms: u64) {
        self.total_plans += 1;
        if succeeded {
            self.succeeded_plans += 1;
        } else {
            self.failed_plans += 1;
        }
        #[allow(clippy::cast_precision_loss)]
        let n = self.total_plans as f64;
        #[allow(clippy::cast_precision_loss)]
        let d = duration_ms as f64;
        self.avg_plan_duration_ms = (self.avg_plan_duration_ms * (n - 1.0) + d) / n;
    }
}

/// Condensed plan view for the observability query.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PlanSummary {
    pub id: Uuid,
    pub work_item_id: Uuid,
    pub title: String,
    pub status: PlanStatus,
    pub stage: Stage,
    pub progress: f64,
    pub started_at: DateTime<Utc>,
    pub estimated_completion: DateTime<Utc>,
    pub completed_at: Option<DateTime<Utc>>,
    pub failure_kind: Option<FailureKind>,
}

impl From<&Plan> for PlanSummary {
    fn from(plan: &Plan) -> Self {
        Self {
            id: plan.id,
            work_item_id: plan.work_item.id,
            title: plan.work_item.title.clone(),
            status: plan.status,
            stage: plan.stage,
            progress: plan.progress,
            started_at: plan.started_at,
            estimated_completion: plan.estimated_completion,
            completed_at: plan.completed_at,
            failure_kind: plan.failure.as_ref().map(|f| f.kind),
        }
    }
}

/// Read-only scheduler state snapshot.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SchedulerState {
    /// Plans still advancing
    pub active_plans: Vec<PlanSummary>,
    /// Plans in the terminal store
    pub completed_plans: Vec<PlanSummary>,
    /// Lifetime counters
    pub metrics: SchedulerMetrics,
}

/// The plan scheduler service.
pub struct PlanScheduler {
    registry: Arc<WorkItemRegistry>,
    executor: Arc<PlanExecutor>,
    event_bus: Arc<EventBus>,
    config: SchedulerConfig,
    active: RwLock<HashMap<Uuid, Plan>>,
    terminal: RwLock<HashMap<Uuid, Plan>>,
    /// Work item ids with an active plan
    active_items: RwLock<HashSet<Uuid>>,
    /// Work item ids whose plan reached a terminal state
    terminal_items: RwLock<HashSet<Uuid>>,
    metrics: RwLock<SchedulerMetrics>,
}

impl PlanScheduler {
    pub fn new(
        registry: Arc<WorkItemRegistry>,
        executor: Arc<PlanExecutor>,
        event_bus: Arc<EventBus>,
        config: SchedulerConfig,
    ) -> Self {
        Self {
            registry,
            executor,
            event_bus,
            config,
            active: RwLock::new(HashMap::new()),
            terminal: RwLock::new(HashMap::new()),
            active_items: RwLock::new(HashSet::new()),
            terminal_items: RwLock::new(HashSet::new()),
            metrics: RwLock::new(SchedulerMetrics::default()),
        }
    }

    /// Registry ingestion, called by discovery routines outside this core.
    pub async fn submit_work_item(&self, item: WorkItem) -> DomainResult<bool> {
        self.registry.submit(item).await
    }

    /// Manual override bypassing ranking. Returns false when the item is
    /// unknown or a plan (active or terminal) already exists for it.
    pub async fn force_create_plan(&self, work_item_id: Uuid) -> bool {
        if self.is_planned(work_item_id).await {
            return false;
        }
        match self.registry.get(work_item_id).await {
            Some(item) => {
                self.admit(item).await;
                true
            }
            None => false,
        }
    }

    /// Externally cancel a plan before it reaches a terminal state.
    ///
    /// Rolls back the in-flight step and fails the plan with reason
    /// "cancelled". Returns false for unknown or already-terminal plans.
    pub async fn cancel_plan(&self, plan_id: Uuid) -> bool {
        let plan = {
            let mut active = self.active.write().await;
            active.remove(&plan_id)
        };
        let Some(mut plan) = plan else {
            return false;
        };
        self.executor.cancel(&mut plan).await;
        self.retire(plan).await;
        true
    }

    /// Remove a work item from the registry and clear its terminal-plan
    /// association, allowing re-discovery to start a fresh plan.
    pub async fn remove_work_item(&self, work_item_id: Uuid) -> Option<WorkItem> {
        self.terminal_items.write().await.remove(&work_item_id);
        self.registry.remove(work_item_id).await
    }

    /// Run one scheduling cycle: timeout sweep, admission, advancement,
    /// retirement.
    pub async fn tick(&self) {
        self.sweep_timeouts().await;
        self.admit_top_ranked().await;
        self.advance_active().await;

        let active_count = self.active.read().await.len();
        let cycle = {
            let mut metrics = self.metrics.write().await;
            metrics.cycles_completed += 1;
            metrics.cycles_completed
        };
        self.event_bus.emit(EventPayload::CycleCompleted {
            cycle,
            active_plans: active_count,
        });
    }

    /// Tick on the configured interval until the shutdown signal flips.
    pub async fn run(&self, mut shutdown: watch::Receiver<bool>) {
        self.event_bus.emit(EventPayload::SchedulerStarted);
        info!(
            tick_ms = u64::try_from(self.config.tick_interval.as_millis()).unwrap_or(u64::MAX),
            top_k = self.config.top_k,
            "Scheduler started"
        );
        let mut ticker = tokio::time::interval(self.config.tick_interval);
        ticker.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Skip);
        loop {
            tokio::select! {
                _ = ticker.tick() => self.tick().await,
                changed = shutdown.changed() => {
                    if changed.is_err() || *shutdown.borrow() {
                        break;
                    }
                }
            }
        }
        self.event_bus.emit(EventPayload::SchedulerStopped);
        info!("Scheduler stopped");
    }

    /// Read-only snapshot for observability layers.
    pub async fn state(&self) -> SchedulerState {
        let active = self.active.read().await;
        let terminal = self.terminal.read().await;
        let metrics = self.metrics.read().await;
        SchedulerState {
            active_plans: active.values().map(PlanSummary::from).collect(),
            completed_plans: terminal.values().map(PlanSummary::from).collect(),
            metrics: metrics.clone(),
        }
    }

    /// Look up a plan by id in the active set or the terminal store.
    pub async fn plan(&self, plan_id: Uuid) -> Option<Plan> {
        if let Some(plan) = self.active.read().await.get(&plan_id) {
            return Some(plan.clone());
        }
        self.terminal.read().await.get(&plan_id).cloned()
    }

    async fn is_planned(&self, work_item_id: Uuid) -> bool {
        self.active_items.read().await.contains(&work_item_id)
            || self.terminal_items.read().await.contains(&work_item_id)
    }

    /// Force-fail every active plan whose grace window has elapsed. The
    /// in-flight step is rolled back but not run again.
    async fn sweep_timeouts(&self) {
        let grace =
            chrono::Duration::from_std(self.config.grace).unwrap_or_else(|_| chrono::Duration::MAX);
        let now = Utc::now();
        let timed_out: Vec<Uuid> = {
            let active = self.active.read().await;
            active
                .values()
                .filter(|plan| !plan.is_terminal() && now > plan.estimated_completion + grace)
                .map(|plan| plan.id)
                .collect()
        };
        for plan_id in timed_out {
            let plan = self.active.write().await.remove(&plan_id);
            if let Some(mut plan) = plan {
                debug!(plan_id = %plan.id, "Plan exceeded grace window");
                self.executor.force_timeout(&mut plan).await;
                self.retire(plan).await;
            }
        }
    }

    /// Rank the registry and create plans for the top-K items not already
    /// associated with an active or terminal plan.
    async fn admit_top_ranked(&self) {
        let ranked = self.registry.rank().await;
        let mut admitted = 0usize;
        for item in ranked {
            if admitted >= self.config.top_k {
                break;
            }
            if self.is_planned(item.id).await {
                continue;
            }
            self.admit(item).await;
            admitted += 1;
        }
    }

    async fn admit(&self, item: WorkItem) {
        let plan = self.executor.create_plan(item);
        self.event_bus.emit(EventPayload::PlanCreated {
            plan_id: plan.id,
            work_item_id: plan.work_item.id,
            title: plan.work_item.title.clone(),
        });
        self.active_items.write().await.insert(plan.work_item.id);
        self.active.write().await.insert(plan.id, plan);
    }

    /// Advance every active non-terminal plan by at most one step.
    /// Distinct plans advance concurrently; a plan's own steps never
    /// overlap because each plan is advanced exactly once per cycle.
    async fn advance_active(&self) {
        let mut plans: Vec<Plan> = {
            let mut active = self.active.write().await;
            active.drain().map(|(_, plan)| plan).collect()
        };

        let outcomes = futures::future::join_all(
            plans
                .iter_mut()
                .map(|plan| self.executor.advance(plan)),
        )
        .await;

        let mut still_active = Vec::new();
        for (plan, outcome) in plans.into_iter().zip(outcomes) {
            match outcome {
                Ok(AdvanceOutcome::StepCompleted) => {
                    self.event_bus.emit(EventPayload::StepCompleted {
                        plan_id: plan.id,
                        stage: plan.stage,
                        progress: plan.progress,
                    });
                    still_active.push(plan);
                }
                Ok(AdvanceOutcome::NoOp) if !plan.is_terminal() => still_active.push(plan),
                Ok(_) => self.retire(plan).await,
                Err(e) => {
                    debug!(plan_id = %plan.id, error = %e, "Advance error");
                    still_active.push(plan);
                }
            }
        }

        let mut active = self.active.write().await;
        for plan in still_active {
            active.insert(plan.id, plan);
        }
    }

    /// Move a terminal plan to the terminal store, update counters, emit
    /// its completion event, and remove its work item on success.
    async fn retire(&self, plan: Plan) {
        let item_id = plan.work_item.id;
        let duration_ms = plan.duration_ms().unwrap_or(0);

        self.active_items.write().await.remove(&item_id);
        self.terminal_items.write().await.insert(item_id);
        self.metrics
            .write()
            .await
            .record_terminal(plan.success, duration_ms);

        if plan.success {
            // Successful items leave the registry; failed ones remain
            // removable for future re-discovery.
            self.registry.remove(item_id).await;
            self.event_bus.emit(EventPayload::PlanCompleted {
                plan_id: plan.id,
                work_item_id: item_id,
                duration_ms,
            });
        } else if let Some(failure) = plan.failure.as_ref() {
            self.event_bus.emit(EventPayload::PlanFailed {
                plan_id: plan.id,
                work_item_id: item_id,
                kind: failure.kind,
                stage: failure.stage,
                reason: failure.message.clone(),
            });
        }

        self.terminal.write().await.insert(plan.id, plan);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::models::ItemPriority;
    use crate::services::plan_executor::PlanExecutor;

    fn scheduler_with_defaults() -> PlanScheduler {
        PlanScheduler::new(
            Arc::new(WorkItemRegistry::new()),
            Arc::new(PlanExecutor::with_defaults()),
            Arc::new(EventBus::default()),
            SchedulerConfig::default(),
        )
    }

    fn item(title: &str, priority: ItemPriority) -> WorkItem {
        WorkItem::new(title, "test", 10.0, 50.0)
            .with_priority(priority)
            .with_estimated_duration_ms(60_000)
    }

    #[tokio::test]
    async fn test_admission_bounded_by_top_k() {
        let scheduler = scheduler_with_defaults();
        for i in 0..10 {
            scheduler
                .submit_work_item(item(&format!("item-{i}"), ItemPriority::Medium))
                .await
                .unwrap();
        }

        scheduler.tick().await;
        let state = scheduler.state().await;
        assert_eq!(state.active_plans.len(), 3);
    }

    #[tokio::test]
    async fn test_no_duplicate_plan_for_same_item() {
        let scheduler = scheduler_with_defaults();
        let work_item = item("solo", ItemPriority::Critical);
        let item_id = work_item.id;
        scheduler.submit_work_item(work_item).await.unwrap();

        scheduler.tick().await;
        scheduler.tick().await;

        let state = scheduler.state().await;
        let plans_for_item = state
            .active_plans
            .iter()
            .chain(state.completed_plans.iter())
            .filter(|summary| summary.work_item_id == item_id)
            .count();
        assert_eq!(plans_for_item, 1);
    }

    #[tokio::test]
    async fn test_plan_drains_to_success_and_item_removed() {
        let scheduler = scheduler_with_defaults();
        let work_item = item("drain", ItemPriority::High);
        let item_id = work_item.id;
        scheduler.submit_work_item(work_item).await.unwrap();

        // One admission cycle plus five step cycles.
        for _ in 0..6 {
            scheduler.tick().await;
        }

        let state = scheduler.state().await;
        assert!(state.active_plans.is_empty());
        assert_eq!(state.completed_plans.len(), 1);
        assert_eq!(state.completed_plans[0].status, PlanStatus::Succeeded);
        assert_eq!(state.metrics.succeeded_plans, 1);
        assert!(!scheduler.registry.contains(item_id).await);
    }

    #[tokio::test]
    async fn test_force_create_plan() {
        let scheduler = scheduler_with_defaults();
        let work_item = item("forced", ItemPriority::Experimental);
        let item_id = work_item.id;
        scheduler.submit_work_item(work_item).await.unwrap();

        assert!(scheduler.force_create_plan(item_id).await);
        // Second force fails: a plan already exists.
        assert!(!scheduler.force_create_plan(item_id).await);
        // Unknown item fails.
        assert!(!scheduler.force_create_plan(Uuid::new_v4()).await);
    }

    #[tokio::test]
    async fn test_cancel_active_plan() {
        let scheduler = scheduler_with_defaults();
        scheduler
            .submit_work_item(item("to-cancel", ItemPriority::High))
            .await
            .unwrap();
        scheduler.tick().await;

        let plan_id = scheduler.state().await.active_plans[0].id;
        assert!(scheduler.cancel_plan(plan_id).await);
        assert!(!scheduler.cancel_plan(plan_id).await, "already terminal");

        let plan = scheduler.plan(plan_id).await.unwrap();
        assert_eq!(plan.status, PlanStatus::Failed);
        assert_eq!(plan.failure.as_ref().unwrap().kind, FailureKind::Cancelled);
    }

    #[tokio::test]
    async fn test_metrics_efficiency() {
        let mut metrics = SchedulerMetrics::default();
        assert!((metrics.efficiency() - 0.0).abs() < f64::EPSILON);
        metrics.record_terminal(true, 100);
        metrics.record_terminal(false, 300);
        assert!((metrics.efficiency() - 50.0).abs() < 1e-9);
        assert!((metrics.avg_plan_duration_ms - 200.0).abs() < 1e-9);
    }
}
