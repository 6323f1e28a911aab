//! Ports: trait seams between the engine core and its collaborators.
//!
//! Stage actions, status producers, and the plan commit hook are supplied
//! by implementations behind these traits. The core never depends on a
//! concrete collaborator.

use std::time::Duration;

use async_trait::async_trait;

use super::errors::DomainResult;
use super::models::{Plan, ProducerSnapshot, Step, WorkItem};

/// The uniform three-operation capability set of one stage.
///
/// Implementations are looked up by stage tag from the stage library, so a
/// plan's steps carry no closures of their own. Operations may perform I/O;
/// the scheduler guarantees at most one of a plan's steps is in flight.
#[async_trait]
pub trait StageActions: Send + Sync {
    /// Execute the stage's work and return a result payload.
    async fn run(&self, item: &WorkItem, step: &Step) -> DomainResult<serde_json::Value>;

    /// Validate the run result. Returning `false` fails the plan.
    async fn validate(
        &self,
        item: &WorkItem,
        step: &Step,
        result: &serde_json::Value,
    ) -> DomainResult<bool>;

    /// Undo this step's side effects. Best-effort; errors are recorded but
    /// never block the plan from being marked failed.
    async fn rollback(&self, item: &WorkItem, step: &Step) -> DomainResult<()>;
}

/// An autonomous status source with its own tick interval.
///
/// Producers are registered once at startup and never unregistered. They
/// are not synchronized to a common clock and must not block each other.
#[async_trait]
pub trait StatusProducer: Send + Sync {
    /// Stable identity used as the snapshot cache key.
    fn id(&self) -> &str;

    /// Private tick interval for this producer's broadcast loop.
    fn tick_interval(&self) -> Duration;

    /// Recompute internal status and emit a snapshot.
    async fn snapshot(&self) -> DomainResult<ProducerSnapshot>;
}

/// Commits a succeeded plan's intended effect.
///
/// Invoked exactly once, when the final step of a plan validates.
#[async_trait]
pub trait CommitHook: Send + Sync {
    /// Apply the plan's results to whatever external state its work item
    /// represents.
    async fn apply(&self, plan: &Plan) -> DomainResult<()>;
}
