//! Plan/step state machine.
//!
//! Builds plans from ranked work items and advances exactly one pending
//! step per call: run, validate, then either move the pending index
//! forward or roll the failing step back and mark the plan failed. Only
//! the failing step is rolled back; earlier validated steps are not
//! compensated (their effects are committed only at plan success, through
//! the commit hook).

use std::collections::HashMap;
use std::sync::Arc;

use async_trait::async_trait;
use tracing::{debug, info, warn};

use crate::domain::errors::{DomainError, DomainResult};
use crate::domain::models::{FailureKind, Plan, Stage, Step, WorkItem};
use crate::domain::ports::{CommitHook, StageActions};

/// What a single `advance` call did to the plan.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AdvanceOutcome {
    /// Plan was already terminal; nothing happened
    NoOp,
    /// One step validated successfully; more remain
    StepCompleted,
    /// The final step validated; the plan succeeded
    PlanSucceeded,
    /// The step failed; the plan is terminally failed
    PlanFailed,
}

/// Lookup table from stage tag to that stage's action set.
pub struct StageLibrary {
    actions: HashMap<Stage, Arc<dyn StageActions>>,
}

impl StageLibrary {
    /// Empty library. Every stage must be registered before plans built
    /// against it can advance.
    pub fn new() -> Self {
        Self {
            actions: HashMap::new(),
        }
    }

    /// Library with the built-in action set for every stage.
    pub fn builtin() -> Self {
        let mut library = Self::new();
        for stage in Stage::ORDER {
            library.register(stage, Arc::new(BuiltinStageActions { stage }));
        }
        library
    }

    /// Register (or replace) the action set for a stage.
    pub fn register(&mut self, stage: Stage, actions: Arc<dyn StageActions>) {
        self.actions.insert(stage, actions);
    }

    /// Action set for a stage tag.
    pub fn get(&self, stage: Stage) -> DomainResult<Arc<dyn StageActions>> {
        self.actions
            .get(&stage)
            .cloned()
            .ok_or(DomainError::StageNotRegistered(stage))
    }
}

impl Default for StageLibrary {
    fn default() -> Self {
        Self::builtin()
    }
}

/// Built-in action set: produces a structured summary payload per stage
/// and validates that the payload was produced. Real deployments register
/// their own [`StageActions`] per stage.
struct BuiltinStageActions {
    stage: Stage,
}

#[async_trait]
impl StageActions for BuiltinStageActions {
    async fn run(&self, item: &WorkItem, step: &Step) -> DomainResult<serde_json::Value> {
        let payload = match self.stage {
            Stage::Analysis => serde_json::json!({
                "stage": self.stage.as_str(),
                "requirements": item.requirements,
                "gain": item.potential_gain(),
            }),
            Stage::Design => serde_json::json!({
                "stage": self.stage.as_str(),
                "complexity": step.complexity,
            }),
            Stage::Implementation => serde_json::json!({
                "stage": self.stage.as_str(),
                "category": item.category,
                "target": item.target_value,
            }),
            Stage::Testing => serde_json::json!({
                "stage": self.stage.as_str(),
                "checks_passed": true,
            }),
            Stage::Integration => serde_json::json!({
                "stage": self.stage.as_str(),
                "integrated": true,
            }),
        };
        Ok(payload)
    }

    async fn validate(
        &self,
        _item: &WorkItem,
        _step: &Step,
        result: &serde_json::Value,
    ) -> DomainResult<bool> {
        Ok(result.get("stage").is_some())
    }

    async fn rollback(&self, item: &WorkItem, step: &Step) -> DomainResult<()> {
        debug!(
            work_item = %item.id,
            stage = %step.stage,
            "Rolling back step"
        );
        Ok(())
    }
}

/// No-op commit hook used when no external effect target is wired up.
pub struct NullCommitHook;

#[async_trait]
impl CommitHook for NullCommitHook {
    async fn apply(&self, _plan: &Plan) -> DomainResult<()> {
        Ok(())
    }
}

/// Drives plans through their steps.
pub struct PlanExecutor {
    library: Arc<StageLibrary>,
    commit_hook: Arc<dyn CommitHook>,
}

impl PlanExecutor {
    pub fn new(library: Arc<StageLibrary>, commit_hook: Arc<dyn CommitHook>) -> Self {
        Self {
            library,
            commit_hook,
        }
    }

    /// Executor with the built-in stage library and no commit target.
    pub fn with_defaults() -> Self {
        Self::new(Arc::new(StageLibrary::builtin()), Arc::new(NullCommitHook))
    }

    /// Build a plan for a work item. Steps are generated in the fixed
    /// stage order with durations from the stage weight schedule.
    pub fn create_plan(&self, item: WorkItem) -> Plan {
        let plan = Plan::new(item);
        debug!(
            plan_id = %plan.id,
            work_item = %plan.work_item.id,
            steps = plan.steps.len(),
            "Plan created"
        );
        plan
    }

    /// Advance the plan by at most one step.
    ///
    /// Terminal plans are left untouched. A validation returning false
    /// fails the plan with `Validation`; a run or validate error fails it
    /// with `Execution`. The failing step is rolled back; nothing after
    /// the failure point ever runs.
    pub async fn advance(&self, plan: &mut Plan) -> DomainResult<AdvanceOutcome> {
        if plan.is_terminal() {
            return Ok(AdvanceOutcome::NoOp);
        }
        plan.status = crate::domain::models::PlanStatus::Advancing;

        let Some(step) = plan.current_step().cloned() else {
            return Ok(AdvanceOutcome::NoOp);
        };
        let actions = match self.library.get(step.stage) {
            Ok(actions) => actions,
            Err(e) => {
                self.fail_step(plan, &step, FailureKind::Execution, e.to_string())
                    .await;
                return Ok(AdvanceOutcome::PlanFailed);
            }
        };

        let result = match actions.run(&plan.work_item, &step).await {
            Ok(result) => result,
            Err(e) => {
                self.fail_step(plan, &step, FailureKind::Execution, e.to_string())
                    .await;
                return Ok(AdvanceOutcome::PlanFailed);
            }
        };

        match actions.validate(&plan.work_item, &step, &result).await {
            Ok(true) => {}
            Ok(false) => {
                self.fail_step(
                    plan,
                    &step,
                    FailureKind::Validation,
                    format!("{} validation returned false", step.stage),
                )
                .await;
                return Ok(AdvanceOutcome::PlanFailed);
            }
            Err(e) => {
                self.fail_step(plan, &step, FailureKind::Execution, e.to_string())
                    .await;
                return Ok(AdvanceOutcome::PlanFailed);
            }
        }

        let became_terminal = plan.record_step_success(result);
        if became_terminal {
            plan.result["outcome"] = serde_json::json!({
                "succeeded": true,
                "target_value": plan.work_item.target_value,
            });
            if let Err(e) = self.commit_hook.apply(plan).await {
                warn!(plan_id = %plan.id, error = %e, "Commit hook failed");
                plan.result["commit_error"] = serde_json::json!(e.to_string());
            }
            info!(
                plan_id = %plan.id,
                work_item = %plan.work_item.id,
                "Plan succeeded"
            );
            Ok(AdvanceOutcome::PlanSucceeded)
        } else {
            Ok(AdvanceOutcome::StepCompleted)
        }
    }

    /// Force-fail a non-terminal plan with a timeout, rolling back the
    /// in-flight step without running it again.
    pub async fn force_timeout(&self, plan: &mut Plan) {
        self.abort(plan, FailureKind::Timeout, "timeout").await;
    }

    /// Cancel a non-terminal plan, rolling back the in-flight step.
    pub async fn cancel(&self, plan: &mut Plan) {
        self.abort(plan, FailureKind::Cancelled, "cancelled").await;
    }

    async fn abort(&self, plan: &mut Plan, kind: FailureKind, reason: &str) {
        if plan.is_terminal() {
            return;
        }
        let step = plan.current_step().cloned();
        if let Some(step) = step {
            self.fail_step(plan, &step, kind, reason.to_string()).await;
        } else {
            plan.record_failure(kind, reason);
        }
    }

    /// Roll back the failing step (best-effort) and record the failure.
    async fn fail_step(&self, plan: &mut Plan, step: &Step, kind: FailureKind, message: String) {
        let rollback_error = match self.library.get(step.stage) {
            Ok(actions) => actions
                .rollback(&plan.work_item, step)
                .await
                .err()
                .map(|e| e.to_string()),
            Err(e) => Some(e.to_string()),
        };
        if let Some(ref err) = rollback_error {
            warn!(
                plan_id = %plan.id,
                stage = %step.stage,
                error = %err,
                "Rollback failed"
            );
        }
        plan.record_failure(kind, message);
        if let Some(failure) = plan.failure.as_mut() {
            failure.rollback_error = rollback_error;
        }
        info!(
            plan_id = %plan.id,
            work_item = %plan.work_item.id,
            kind = %kind,
            stage = %step.stage,
            "Plan failed"
        );
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::models::PlanStatus;
    use std::sync::atomic::{AtomicU32, Ordering};

    /// Scripted actions: fails run or validate at a chosen stage and
    /// counts rollback invocations.
    struct ScriptedActions {
        fail_run_at: Option<Stage>,
        fail_validate_at: Option<Stage>,
        runs: AtomicU32,
        rollbacks: AtomicU32,
    }

    impl ScriptedActions {
        fn new(fail_run_at: Option<Stage>, fail_validate_at: Option<Stage>) -> Arc<Self> {
            Arc::new(Self {
                fail_run_at,
                fail_validate_at,
                runs: AtomicU32::new(0),
                rollbacks: AtomicU32::new(0),
            })
        }

        fn library(self: &Arc<Self>) -> Arc<StageLibrary> {
            let mut library = StageLibrary::new();
            for stage in Stage::ORDER {
                library.register(stage, self.clone());
            }
            Arc::new(library)
        }
    }

    #[async_trait]
    impl StageActions for ScriptedActions {
        async fn run(&self, _item: &WorkItem, step: &Step) -> DomainResult<serde_json::Value> {
            self.runs.fetch_add(1, Ordering::SeqCst);
            if self.fail_run_at == Some(step.stage) {
                return Err(DomainError::StageExecution {
                    stage: step.stage,
                    message: "scripted run failure".to_string(),
                });
            }
            Ok(serde_json::json!({ "stage": step.stage.as_str() }))
        }

        async fn validate(
            &self,
            _item: &WorkItem,
            step: &Step,
            _result: &serde_json::Value,
        ) -> DomainResult<bool> {
            Ok(self.fail_validate_at != Some(step.stage))
        }

        async fn rollback(&self, _item: &WorkItem, _step: &Step) -> DomainResult<()> {
            self.rollbacks.fetch_add(1, Ordering::SeqCst);
            Ok(())
        }
    }

    fn test_item() -> WorkItem {
        WorkItem::new("Reduce tail latency", "latency", 30.0, 60.0)
            .with_estimated_duration_ms(5_000)
    }

    #[tokio::test]
    async fn test_happy_path_runs_all_steps() {
        let actions = ScriptedActions::new(None, None);
        let executor = PlanExecutor::new(actions.library(), Arc::new(NullCommitHook));
        let mut plan = executor.create_plan(test_item());

        for _ in 0..4 {
            assert_eq!(
                executor.advance(&mut plan).await.unwrap(),
                AdvanceOutcome::StepCompleted
            );
        }
        assert_eq!(
            executor.advance(&mut plan).await.unwrap(),
            AdvanceOutcome::PlanSucceeded
        );
        assert_eq!(plan.status, PlanStatus::Succeeded);
        assert_eq!(plan.pending_index, plan.steps.len());
        assert_eq!(actions.runs.load(Ordering::SeqCst), 5);
        assert_eq!(actions.rollbacks.load(Ordering::SeqCst), 0);
    }

    #[tokio::test]
    async fn test_validation_failure_rolls_back_once() {
        let actions = ScriptedActions::new(None, Some(Stage::Implementation));
        let executor = PlanExecutor::new(actions.library(), Arc::new(NullCommitHook));
        let mut plan = executor.create_plan(test_item());

        executor.advance(&mut plan).await.unwrap();
        executor.advance(&mut plan).await.unwrap();
        assert_eq!(
            executor.advance(&mut plan).await.unwrap(),
            AdvanceOutcome::PlanFailed
        );

        let failure = plan.failure.as_ref().unwrap();
        assert_eq!(failure.kind, FailureKind::Validation);
        assert_eq!(failure.stage, Stage::Implementation);
        assert_eq!(actions.rollbacks.load(Ordering::SeqCst), 1);
        // No step after the failure point ever runs.
        assert_eq!(actions.runs.load(Ordering::SeqCst), 3);

        // Terminal plans no-op on further advances.
        assert_eq!(
            executor.advance(&mut plan).await.unwrap(),
            AdvanceOutcome::NoOp
        );
        assert_eq!(actions.runs.load(Ordering::SeqCst), 3);
    }

    #[tokio::test]
    async fn test_run_error_is_execution_failure() {
        let actions = ScriptedActions::new(Some(Stage::Design), None);
        let executor = PlanExecutor::new(actions.library(), Arc::new(NullCommitHook));
        let mut plan = executor.create_plan(test_item());

        executor.advance(&mut plan).await.unwrap();
        assert_eq!(
            executor.advance(&mut plan).await.unwrap(),
            AdvanceOutcome::PlanFailed
        );
        assert_eq!(plan.failure.as_ref().unwrap().kind, FailureKind::Execution);
        assert_eq!(actions.rollbacks.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn test_cancel_rolls_back_current_step() {
        let actions = ScriptedActions::new(None, None);
        let executor = PlanExecutor::new(actions.library(), Arc::new(NullCommitHook));
        let mut plan = executor.create_plan(test_item());

        executor.advance(&mut plan).await.unwrap();
        executor.cancel(&mut plan).await;

        assert_eq!(plan.status, PlanStatus::Failed);
        let failure = plan.failure.as_ref().unwrap();
        assert_eq!(failure.kind, FailureKind::Cancelled);
        assert_eq!(failure.message, "cancelled");
        assert_eq!(actions.rollbacks.load(Ordering::SeqCst), 1);

        // Cancelling a terminal plan is a no-op.
        executor.cancel(&mut plan).await;
        assert_eq!(actions.rollbacks.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn test_timeout_does_not_rerun_step() {
        let actions = ScriptedActions::new(None, None);
        let executor = PlanExecutor::new(actions.library(), Arc::new(NullCommitHook));
        let mut plan = executor.create_plan(test_item());

        executor.advance(&mut plan).await.unwrap();
        let runs_before = actions.runs.load(Ordering::SeqCst);
        executor.force_timeout(&mut plan).await;

        assert_eq!(actions.runs.load(Ordering::SeqCst), runs_before);
        let failure = plan.failure.as_ref().unwrap();
        assert_eq!(failure.kind, FailureKind::Timeout);
        assert_eq!(failure.message, "timeout");
        assert_eq!(actions.rollbacks.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn test_rollback_error_is_best_effort() {
        struct BrokenRollback;

        #[async_trait]
        impl StageActions for BrokenRollback {
            async fn run(&self, _item: &WorkItem, step: &Step) -> DomainResult<serde_json::Value> {
                Ok(serde_json::json!({ "stage": step.stage.as_str() }))
            }
            async fn validate(
                &self,
                _item: &WorkItem,
                _step: &Step,
                _result: &serde_json::Value,
            ) -> DomainResult<bool> {
                Ok(false)
            }
            async fn rollback(&self, _item: &WorkItem, step: &Step) -> DomainResult<()> {
                Err(DomainError::StageExecution {
                    stage: step.stage,
                    message: "rollback broke".to_string(),
                })
            }
        }

        let mut library = StageLibrary::new();
        for stage in Stage::ORDER {
            library.register(stage, Arc::new(BrokenRollback));
        }
        let executor = PlanExecutor::new(Arc::new(library), Arc::new(NullCommitHook));
        let mut plan = executor.create_plan(test_item());

        assert_eq!(
            executor.advance(&mut plan).await.unwrap(),
            AdvanceOutcome::PlanFailed
        );
        let failure = plan.failure.as_ref().unwrap();
        assert_eq!(failure.kind, FailureKind::Validation);
        assert!(failure.rollback_error.as_deref().unwrap().contains("rollback broke"));
    }

    #[tokio::test]
    async fn test_builtin_library_succeeds() {
        let executor = PlanExecutor::with_defaults();
        let mut plan = executor.create_plan(test_item());
        loop {
            match executor.advance(&mut plan).await.unwrap() {
                AdvanceOutcome::StepCompleted => {}
                AdvanceOutcome::PlanSucceeded => break,
                other => panic!("unexpected outcome {other:?}"),
            }
        }
        assert!(plan.success);
    }
}
