//! Plan and step domain models.
//!
//! A plan is the live execution record driving one work item through an
//! ordered sequence of steps. At most one step is in flight at a time;
//! `pending_index` only ever moves forward.

use chrono::{DateTime, Duration, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use super::stage::Stage;
use super::work_item::WorkItem;

/// Status of a plan in the scheduler's state machine.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum PlanStatus {
    /// Plan created, no step advanced yet
    Created,
    /// At least one step has been advanced
    Advancing,
    /// All steps validated successfully
    Succeeded,
    /// A step failed, timed out, or the plan was cancelled
    Failed,
}

impl PlanStatus {
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Created => "created",
            Self::Advancing => "advancing",
            Self::Succeeded => "succeeded",
            Self::Failed => "failed",
        }
    }

    /// Terminal states absorb; no transition leaves them.
    pub const fn is_terminal(self) -> bool {
        matches!(self, Self::Succeeded | Self::Failed)
    }
}

impl std::fmt::Display for PlanStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

/// Why a plan failed. All kinds are terminal; none are retried.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum FailureKind {
    /// A step's validate returned false
    Validation,
    /// A step's run or validate returned an error
    Execution,
    /// The grace window past estimated completion was exceeded
    Timeout,
    /// External cancellation request
    Cancelled,
}

impl FailureKind {
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Validation => "validation",
            Self::Execution => "execution",
            Self::Timeout => "timeout",
            Self::Cancelled => "cancelled",
        }
    }
}

impl std::fmt::Display for FailureKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

/// Failure record attached to a failed plan.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PlanFailure {
    /// Failure classification
    pub kind: FailureKind,
    /// Stage of the step that was in flight
    pub stage: Stage,
    /// Descriptive reason
    pub message: String,
    /// Whether the step's rollback itself errored (best-effort rollback)
    pub rollback_error: Option<String>,
    /// When the failure was recorded
    pub failed_at: DateTime<Utc>,
}

/// One stage of a plan's execution.
///
/// The run/validate/rollback operations are supplied by the stage
/// definition looked up from the stage library, not stored here.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Step {
    /// Unique identifier
    pub id: Uuid,
    /// Human name, e.g. "Implementation"
    pub name: String,
    /// Stage tag
    pub stage: Stage,
    /// Expected duration in milliseconds (stage weight x item estimate)
    pub expected_duration_ms: u64,
    /// Complexity score for this step
    pub complexity: u8,
    /// Whether the step has finished (successfully or not)
    pub completed: bool,
    /// Whether the step validated successfully
    pub succeeded: bool,
    /// Result payload from the step's run operation
    pub result: Option<serde_json::Value>,
    /// When the step finished
    pub completed_at: Option<DateTime<Utc>>,
}

impl Step {
    /// Build the step for one stage of a work item's plan.
    pub fn for_stage(stage: Stage, item: &WorkItem) -> Self {
        let weight = stage.duration_weight();
        #[allow(clippy::cast_possible_truncation, clippy::cast_sign_loss)]
        let expected_duration_ms = (item.estimated_duration_ms as f64 * weight) as u64;
        Self {
            id: Uuid::new_v4(),
            name: capitalize(stage.as_str()),
            stage,
            expected_duration_ms,
            complexity: stage.base_complexity().max(item.complexity / 2),
            completed: false,
            succeeded: false,
            result: None,
            completed_at: None,
        }
    }
}

fn capitalize(s: &str) -> String {
    let mut chars = s.chars();
    chars.next().map_or_else(String::new, |first| {
        first.to_uppercase().collect::<String>() + chars.as_str()
    })
}

/// The execution record for one work item.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Plan {
    /// Unique identifier
    pub id: Uuid,
    /// The work item this plan executes (immutable once the plan exists)
    pub work_item: WorkItem,
    /// Scheduler state machine status
    pub status: PlanStatus,
    /// Stage tag of the step currently in flight (observability only)
    pub stage: Stage,
    /// Ordered steps, generated once and never reordered
    pub steps: Vec<Step>,
    /// Index of the next pending step; monotonically non-decreasing
    pub pending_index: usize,
    /// Progress percentage: pending_index / len(steps) * 100
    pub progress: f64,
    /// When the plan was created
    pub started_at: DateTime<Utc>,
    /// Start plus the sum of step durations
    pub estimated_completion: DateTime<Utc>,
    /// When the plan reached a terminal state
    pub completed_at: Option<DateTime<Utc>>,
    /// Whether the plan succeeded
    pub success: bool,
    /// Failure record, present iff status is Failed
    pub failure: Option<PlanFailure>,
    /// Free-form result payload (pre-state capture and final outcome)
    pub result: serde_json::Value,
}

impl Plan {
    /// Build a plan for a work item with steps in the fixed stage order.
    pub fn new(item: WorkItem) -> Self {
        let steps: Vec<Step> = Stage::ORDER
            .iter()
            .map(|stage| Step::for_stage(*stage, &item))
            .collect();
        let total_ms: u64 = steps.iter().map(|s| s.expected_duration_ms).sum();
        let started_at = Utc::now();
        let estimated_completion =
            started_at + Duration::milliseconds(i64::try_from(total_ms).unwrap_or(i64::MAX));
        Self {
            id: Uuid::new_v4(),
            stage: Stage::ORDER[0],
            status: PlanStatus::Created,
            steps,
            pending_index: 0,
            progress: 0.0,
            started_at,
            estimated_completion,
            completed_at: None,
            success: false,
            failure: None,
            result: serde_json::json!({
                "pre_state": { "category": item.category, "value": item.current_value },
            }),
            work_item: item,
        }
    }

    /// The step currently in flight, if the plan is not terminal.
    pub fn current_step(&self) -> Option<&Step> {
        if self.status.is_terminal() {
            return None;
        }
        self.steps.get(self.pending_index)
    }

    /// Whether the plan has reached a terminal state.
    pub const fn is_terminal(&self) -> bool {
        self.status.is_terminal()
    }

    /// Record a successful step and move the pending index forward.
    ///
    /// Marks the plan succeeded when the last step completes. Returns true
    /// if the plan just became terminal.
    pub fn record_step_success(&mut self, result: serde_json::Value) -> bool {
        let index = self.pending_index;
        if let Some(step) = self.steps.get_mut(index) {
            step.completed = true;
            step.succeeded = true;
            step.result = Some(result);
            step.completed_at = Some(Utc::now());
        }
        self.pending_index += 1;
        self.recompute_progress();
        if self.pending_index >= self.steps.len() {
            self.status = PlanStatus::Succeeded;
            self.success = true;
            self.completed_at = Some(Utc::now());
            true
        } else {
            self.stage = self.steps[self.pending_index].stage;
            false
        }
    }

    /// Record a failure of the in-flight step and mark the plan failed.
    pub fn record_failure(&mut self, kind: FailureKind, message: impl Into<String>) {
        let stage = self
            .steps
            .get(self.pending_index)
            .map_or(self.stage, |s| s.stage);
        if let Some(step) = self.steps.get_mut(self.pending_index) {
            step.completed = true;
            step.succeeded = false;
            step.completed_at = Some(Utc::now());
        }
        self.status = PlanStatus::Failed;
        self.success = false;
        self.completed_at = Some(Utc::now());
        self.failure = Some(PlanFailure {
            kind,
            stage,
            message: message.into(),
            rollback_error: None,
            failed_at: Utc::now(),
        });
    }

    /// Duration from start to terminal state, in milliseconds.
    pub fn duration_ms(&self) -> Option<u64> {
        self.completed_at.map(|done| {
            u64::try_from((done - self.started_at).num_milliseconds().max(0)).unwrap_or(0)
        })
    }

    fn recompute_progress(&mut self) {
        #[allow(clippy::cast_precision_loss)]
        let fraction = self.pending_index as f64 / self.steps.len() as f64;
        self.progress = fraction * 100.0;
    }
}
