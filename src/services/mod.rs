//! Service layer: the engine's coordinating components.

pub mod aggregation_bus;
pub mod engine_health;
pub mod event_bus;
pub mod level_machine;
pub mod plan_executor;
pub mod producer_set;
pub mod registry;
pub mod scheduler;
pub mod value_board;

pub use aggregation_bus::{AggregationBus, AggregationConfig, BusMessage};
pub use engine_health::EngineHealthProducer;
pub use event_bus::{EngineEvent, EventBus, EventCategory, EventPayload, EventSeverity};
pub use level_machine::LevelMachine;
pub use plan_executor::{AdvanceOutcome, NullCommitHook, PlanExecutor, StageLibrary};
pub use producer_set::ProducerSet;
pub use registry::WorkItemRegistry;
pub use scheduler::{
    PlanScheduler, PlanSummary, SchedulerConfig, SchedulerMetrics, SchedulerState,
};
pub use value_board::ValueBoard;
