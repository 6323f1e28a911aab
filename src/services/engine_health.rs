//! Scheduler-health status producer.
//!
//! A read-only observer of the scheduler: it reports plan throughput and
//! success ratio as a normalized health figure. The scheduler never
//! depends on the aggregation side; this producer only reads its state
//! query.

use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;

use crate::domain::errors::DomainResult;
use crate::domain::models::ProducerSnapshot;
use crate::domain::ports::StatusProducer;
use crate::services::scheduler::PlanScheduler;

/// Reports scheduler efficiency as a producer snapshot.
pub struct EngineHealthProducer {
    scheduler: Arc<PlanScheduler>,
    interval: Duration,
}

impl EngineHealthProducer {
    pub fn new(scheduler: Arc<PlanScheduler>, interval: Duration) -> Self {
        Self {
            scheduler,
            interval,
        }
    }
}

#[async_trait]
impl StatusProducer for EngineHealthProducer {
    fn id(&self) -> &str {
        "engine-health"
    }

    fn tick_interval(&self) -> Duration {
        self.interval
    }

    async fn snapshot(&self) -> DomainResult<ProducerSnapshot> {
        let state = self.scheduler.state().await;
        // Before any plan terminates, report neutral health rather than 0.
        let health = if state.metrics.total_plans == 0 {
            50.0
        } else {
            state.metrics.efficiency()
        };
        Ok(ProducerSnapshot::new(self.id(), health).with_details(serde_json::json!({
            "active_plans": state.active_plans.len(),
            "total_plans": state.metrics.total_plans,
            "cycles": state.metrics.cycles_completed,
        })))
    }
}
