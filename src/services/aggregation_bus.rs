//! Aggregation bus.
//!
//! Collects snapshots from all producers into a last-write-wins cache,
//! recomputes the combined score on every broadcast, tracks per-producer
//! contribution, unlocks emergent properties on first threshold crossing,
//! and drives the maturity-level ratchet. The bus loop is the single
//! writer of the aggregate state; readers take clones.

use std::sync::Arc;

use tokio::sync::{mpsc, RwLock};
use tracing::{debug, warn};

use crate::domain::models::{
    AggregateState, HistorySample, ProducerEntry, ProducerSnapshot, PropertyRule, PropertySource,
};
use crate::services::event_bus::{EventBus, EventPayload};
use crate::services::level_machine::LevelMachine;

/// Messages flowing from producer loops into the bus.
#[derive(Debug, Clone)]
pub enum BusMessage {
    /// A producer broadcast a snapshot
    Snapshot(ProducerSnapshot),
    /// A producer's snapshot function failed; prior cache entry is kept
    SnapshotFailed {
        /// Producer identity
        producer_id: String,
        /// Error description
        error: String,
    },
}

/// Configuration for the aggregation bus.
#[derive(Debug, Clone)]
pub struct AggregationConfig {
    /// Contribution added per received snapshot, saturating at 100.
    pub contribution_increment: f64,
    /// Maximum retained history samples; oldest are dropped beyond this.
    pub history_cap: usize,
    /// Capacity of the producer-to-bus channel.
    pub channel_capacity: usize,
}

impl Default for AggregationConfig {
    fn default() -> Self {
        Self {
            contribution_increment: 1.0,
            history_cap: 1000,
            channel_capacity: 256,
        }
    }
}

/// The aggregation bus service.
pub struct AggregationBus {
    state: RwLock<AggregateState>,
    level_machine: LevelMachine,
    rules: Vec<PropertyRule>,
    event_bus: Arc<EventBus>,
    config: AggregationConfig,
}

impl AggregationBus {
    pub fn new(
        level_machine: LevelMachine,
        rules: Vec<PropertyRule>,
        event_bus: Arc<EventBus>,
        config: AggregationConfig,
    ) -> Self {
        Self {
            state: RwLock::new(AggregateState::default()),
            level_machine,
            rules,
            event_bus,
            config,
        }
    }

    /// Bus with the default level ladder and property catalog.
    pub fn with_defaults(event_bus: Arc<EventBus>) -> Self {
        Self::new(
            LevelMachine::default(),
            crate::domain::models::default_property_rules(),
            event_bus,
            AggregationConfig::default(),
        )
    }

    /// Channel pair sized for this bus. The receiver goes to [`Self::run`];
    /// senders go to producer loops.
    pub fn channel(&self) -> (mpsc::Sender<BusMessage>, mpsc::Receiver<BusMessage>) {
        mpsc::channel(self.config.channel_capacity)
    }

    /// Consume bus messages until all senders are dropped.
    pub async fn run(&self, mut rx: mpsc::Receiver<BusMessage>) {
        while let Some(message) = rx.recv().await {
            match message {
                BusMessage::Snapshot(snapshot) => self.ingest(snapshot).await,
                BusMessage::SnapshotFailed { producer_id, error } => {
                    self.record_error(&producer_id, &error).await;
                }
            }
        }
        debug!("Aggregation bus channel closed");
    }

    /// Fold one snapshot into the aggregate state and recompute.
    ///
    /// Last write wins per producer; producers that have never broadcast
    /// are excluded from the mean until their first snapshot arrives.
    pub async fn ingest(&self, snapshot: ProducerSnapshot) {
        let mut state = self.state.write().await;
        let increment = self.config.contribution_increment;
        let entry = state
            .producers
            .entry(snapshot.producer_id.clone())
            .and_modify(|entry| {
                entry.contribution = (entry.contribution + increment).min(100.0);
                entry.snapshots_received += 1;
            })
            .or_insert_with(|| ProducerEntry {
                snapshot: snapshot.clone(),
                contribution: increment.min(100.0),
                snapshots_received: 1,
                errors: 0,
            });
        entry.snapshot = snapshot;

        self.recompute(&mut state);
    }

    /// Record a producer-side error. The prior cached snapshot (if any)
    /// is retained untouched; only the error counter moves.
    pub async fn record_error(&self, producer_id: &str, error: &str) {
        warn!(producer_id, error, "Producer snapshot failed");
        let mut state = self.state.write().await;
        if let Some(entry) = state.producers.get_mut(producer_id) {
            entry.errors += 1;
        }
        self.event_bus.emit(EventPayload::ProducerError {
            producer_id: producer_id.to_string(),
            error: error.to_string(),
        });
    }

    /// Clone of the current aggregate state.
    pub async fn state(&self) -> AggregateState {
        self.state.read().await.clone()
    }

    fn recompute(&self, state: &mut AggregateState) {
        if state.producers.is_empty() {
            return;
        }
        #[allow(clippy::cast_precision_loss)]
        let mean = state
            .producers
            .values()
            .map(|entry| entry.snapshot.health)
            .sum::<f64>()
            / state.producers.len() as f64;
        state.combined_score = mean;
        state.updated_at = chrono::Utc::now();

        self.unlock_properties(state);
        self.advance_level(state);
        self.push_history(state);
    }

    /// Evaluate property rules; each fires at most once, additions only.
    fn unlock_properties(&self, state: &mut AggregateState) {
        for rule in &self.rules {
            if state.emergent_properties.iter().any(|p| p == &rule.name) {
                continue;
            }
            let observed = match &rule.source {
                PropertySource::Combined => Some(state.combined_score),
                PropertySource::Producer(id) => {
                    state.producers.get(id).map(|entry| entry.snapshot.health)
                }
            };
            if let Some(value) = observed {
                if value >= rule.threshold {
                    state.emergent_properties.push(rule.name.clone());
                    self.event_bus.emit(EventPayload::EmergentPropertyAdded {
                        name: rule.name.clone(),
                        score: value,
                    });
                }
            }
        }
    }

    fn advance_level(&self, state: &mut AggregateState) {
        if let Some(new_level) = self.level_machine.evaluate(state.level, state.combined_score) {
            let previous = state.level;
            state.level = new_level;
            self.event_bus.emit(EventPayload::LevelAdvanced {
                previous,
                new: new_level,
                score: state.combined_score,
            });
        }
    }

    fn push_history(&self, state: &mut AggregateState) {
        state.history.push(HistorySample {
            recorded_at: state.updated_at,
            combined_score: state.combined_score,
            level: state.level,
            property_count: state.emergent_properties.len(),
        });
        let cap = self.config.history_cap;
        if state.history.len() > cap {
            let excess = state.history.len() - cap;
            state.history.drain(..excess);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::models::MaturityLevel;

    fn bus() -> AggregationBus {
        AggregationBus::with_defaults(Arc::new(EventBus::default()))
    }

    #[tokio::test]
    async fn test_combined_score_is_mean_of_known_producers() {
        let bus = bus();
        bus.ingest(ProducerSnapshot::new("a", 80.0)).await;
        bus.ingest(ProducerSnapshot::new("b", 60.0)).await;

        let state = bus.state().await;
        assert!((state.combined_score - 70.0).abs() < 1e-9);

        bus.ingest(ProducerSnapshot::new("c", 100.0)).await;
        let state = bus.state().await;
        assert!((state.combined_score - 80.0).abs() < 1e-9);
    }

    #[tokio::test]
    async fn test_stale_snapshot_reused_verbatim() {
        let bus = bus();
        bus.ingest(ProducerSnapshot::new("a", 90.0)).await;
        // b broadcasts repeatedly; a's last value keeps contributing as-is.
        for _ in 0..3 {
            bus.ingest(ProducerSnapshot::new("b", 50.0)).await;
        }
        let state = bus.state().await;
        assert!((state.combined_score - 70.0).abs() < 1e-9);
        assert!(
            (state.producers.get("a").unwrap().snapshot.health - 90.0).abs() < f64::EPSILON
        );
    }

    #[tokio::test]
    async fn test_contribution_saturates() {
        let event_bus = Arc::new(EventBus::default());
        let bus = AggregationBus::new(
            LevelMachine::default(),
            vec![],
            event_bus,
            AggregationConfig {
                contribution_increment: 60.0,
                ..Default::default()
            },
        );
        bus.ingest(ProducerSnapshot::new("a", 10.0)).await;
        bus.ingest(ProducerSnapshot::new("a", 10.0)).await;
        bus.ingest(ProducerSnapshot::new("a", 10.0)).await;

        let state = bus.state().await;
        let entry = state.producers.get("a").unwrap();
        assert!((entry.contribution - 100.0).abs() < f64::EPSILON);
        assert_eq!(entry.snapshots_received, 3);
    }

    #[tokio::test]
    async fn test_properties_fire_once() {
        let event_bus = Arc::new(EventBus::default());
        let bus = AggregationBus::new(
            LevelMachine::default(),
            vec![PropertyRule::combined("threshold-40", 40.0)],
            event_bus.clone(),
            AggregationConfig::default(),
        );

        bus.ingest(ProducerSnapshot::new("a", 50.0)).await;
        // Score drops below the threshold; the property stays.
        bus.ingest(ProducerSnapshot::new("b", 0.0)).await;
        // And rises again; the rule must not fire a second time.
        bus.ingest(ProducerSnapshot::new("b", 90.0)).await;

        let state = bus.state().await;
        assert_eq!(state.emergent_properties, vec!["threshold-40".to_string()]);
    }

    #[tokio::test]
    async fn test_producer_scoped_property() {
        let event_bus = Arc::new(EventBus::default());
        let bus = AggregationBus::new(
            LevelMachine::default(),
            vec![PropertyRule::producer("a-healthy", "a", 75.0)],
            event_bus,
            AggregationConfig::default(),
        );

        bus.ingest(ProducerSnapshot::new("b", 100.0)).await;
        assert!(bus.state().await.emergent_properties.is_empty());

        bus.ingest(ProducerSnapshot::new("a", 80.0)).await;
        assert_eq!(
            bus.state().await.emergent_properties,
            vec!["a-healthy".to_string()]
        );
    }

    #[tokio::test]
    async fn test_error_keeps_prior_snapshot() {
        let bus = bus();
        bus.ingest(ProducerSnapshot::new("a", 70.0)).await;
        bus.record_error("a", "sensor offline").await;

        let state = bus.state().await;
        let entry = state.producers.get("a").unwrap();
        assert_eq!(entry.errors, 1);
        assert!((entry.snapshot.health - 70.0).abs() < f64::EPSILON);
        assert!((state.combined_score - 70.0).abs() < 1e-9);
    }

    #[tokio::test]
    async fn test_level_ratchets_up() {
        let bus = bus();
        let mut rx = {
            // Subscribe through a fresh bus sharing the same event bus.
            bus.event_bus.subscribe()
        };

        bus.ingest(ProducerSnapshot::new("a", 60.0)).await;
        assert_eq!(bus.state().await.level, MaturityLevel::Established);

        bus.ingest(ProducerSnapshot::new("b", 0.0)).await;
        // Mean fell to 30; the level must not drop.
        assert_eq!(bus.state().await.level, MaturityLevel::Established);

        let mut saw_level_event = false;
        while let Ok(event) = rx.try_recv() {
            if matches!(event.payload, EventPayload::LevelAdvanced { .. }) {
                saw_level_event = true;
            }
        }
        assert!(saw_level_event);
    }

    #[tokio::test]
    async fn test_history_is_bounded() {
        let event_bus = Arc::new(EventBus::default());
        let bus = AggregationBus::new(
            LevelMachine::default(),
            vec![],
            event_bus,
            AggregationConfig {
                history_cap: 5,
                ..Default::default()
            },
        );
        for i in 0..10 {
            bus.ingest(ProducerSnapshot::new("a", f64::from(i))).await;
        }
        assert_eq!(bus.state().await.history.len(), 5);
    }
}
