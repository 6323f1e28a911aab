//! Domain models: work items, plans, stages, and telemetry state.

pub mod plan;
pub mod stage;
pub mod telemetry;
pub mod work_item;

pub use plan::{FailureKind, Plan, PlanFailure, PlanStatus, Step};
pub use stage::Stage;
pub use telemetry::{
    default_property_rules, AggregateState, HistorySample, MaturityLevel, ProducerEntry,
    ProducerSnapshot, PropertyRule, PropertySource,
};
pub use work_item::{ItemPriority, WorkItem};
