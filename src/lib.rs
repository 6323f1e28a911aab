//! Stagecraft - Staged Work Execution Engine
//!
//! Stagecraft drives ranked work items through an ordered pipeline of
//! stages with validation and rollback, while independently folding
//! periodic status snapshots from autonomous producers into a combined
//! score that ratchets a discrete maturity level upward.
//!
//! # Architecture
//!
//! The crate is layered:
//!
//! - **Domain Layer** (`domain`): Pure models, errors, and port traits
//! - **Service Layer** (`services`): Registry, plan execution, scheduling,
//!   aggregation, and the level machine
//! - **Infrastructure Layer** (`infrastructure`): Configuration and logging
//! - **CLI Layer** (`cli`): Command-line glue
//!
//! # Example
//!
//! ```ignore
//! use stagecraft::services::{PlanExecutor, PlanScheduler};
//!
//! #[tokio::main]
//! async fn main() -> anyhow::Result<()> {
//!     // Wire registry, executor, scheduler, and aggregation bus
//!     Ok(())
//! }
//! ```

pub mod cli;
pub mod domain;
pub mod infrastructure;
pub mod services;

// Re-export commonly used types for convenience
pub use domain::errors::{DomainError, DomainResult};
pub use domain::models::{
    AggregateState, FailureKind, ItemPriority, MaturityLevel, Plan, PlanStatus, ProducerSnapshot,
    PropertyRule, Stage, Step, WorkItem,
};
pub use domain::ports::{CommitHook, StageActions, StatusProducer};
pub use infrastructure::config::{Config, ConfigError, ConfigLoader};
pub use services::{
    AggregationBus, EventBus, EventPayload, LevelMachine, PlanExecutor, PlanScheduler,
    ProducerSet, SchedulerConfig, StageLibrary, ValueBoard, WorkItemRegistry,
};
