//! Domain-level errors.

use thiserror::Error;
use uuid::Uuid;

use super::models::{PlanStatus, Stage};

/// Domain-level errors for the engine core.
#[derive(Error, Debug)]
pub enum DomainError {
    #[error("Invalid work item: {0}")]
    InvalidWorkItem(String),

    #[error("Work item not found: {0}")]
    WorkItemNotFound(Uuid),

    #[error("A plan already exists for work item {0}")]
    PlanAlreadyExists(Uuid),

    #[error("Plan not found: {0}")]
    PlanNotFound(Uuid),

    #[error("Plan {id} is in terminal state {status:?}")]
    PlanInTerminalState { id: Uuid, status: PlanStatus },

    #[error("No stage actions registered for stage {0:?}")]
    StageNotRegistered(Stage),

    #[error("Stage {stage:?} execution failed: {message}")]
    StageExecution { stage: Stage, message: String },

    #[error("Producer snapshot failed for {producer_id}: {message}")]
    ProducerSnapshot {
        producer_id: String,
        message: String,
    },
}

/// Result alias for domain operations.
pub type DomainResult<T> = Result<T, DomainError>;
