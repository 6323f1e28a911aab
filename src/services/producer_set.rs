//! Producer set.
//!
//! Owns the fixed collection of status producers and spawns one broadcast
//! loop per producer. Each loop ticks on its own interval (producers are
//! not synchronized to a common clock), never blocks on other producers,
//! and forwards snapshots to the aggregation bus over a channel.

use std::sync::Arc;
use std::time::Duration;

use tokio::sync::{mpsc, watch};
use tokio::task::JoinHandle;
use tracing::{debug, info};

use crate::domain::ports::StatusProducer;
use crate::services::aggregation_bus::BusMessage;

/// The registered set of producers.
#[derive(Default)]
pub struct ProducerSet {
    producers: Vec<Arc<dyn StatusProducer>>,
}

impl ProducerSet {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a producer. Registration happens once at startup; there is
    /// no dynamic unregistration.
    pub fn register(&mut self, producer: Arc<dyn StatusProducer>) {
        info!(
            producer_id = producer.id(),
            interval_ms = u64::try_from(producer.tick_interval().as_millis()).unwrap_or(u64::MAX),
            "Producer registered"
        );
        self.producers.push(producer);
    }

    /// Number of registered producers.
    pub fn len(&self) -> usize {
        self.producers.len()
    }

    /// Whether no producers are registered.
    pub fn is_empty(&self) -> bool {
        self.producers.is_empty()
    }

    /// Spawn one periodic loop per producer.
    ///
    /// Each loop runs until the shutdown signal flips or the bus channel
    /// closes. A failing snapshot is reported to the bus as an error
    /// message and the loop keeps ticking.
    pub fn spawn_all(
        &self,
        tx: mpsc::Sender<BusMessage>,
        shutdown: watch::Receiver<bool>,
    ) -> Vec<JoinHandle<()>> {
        self.producers
            .iter()
            .map(|producer| {
                let producer = producer.clone();
                let tx = tx.clone();
                let mut shutdown = shutdown.clone();
                tokio::spawn(async move {
                    run_producer_loop(producer, tx, &mut shutdown).await;
                })
            })
            .collect()
    }
}

async fn run_producer_loop(
    producer: Arc<dyn StatusProducer>,
    tx: mpsc::Sender<BusMessage>,
    shutdown: &mut watch::Receiver<bool>,
) {
    let interval = if producer.tick_interval().is_zero() {
        Duration::from_millis(1)
    } else {
        producer.tick_interval()
    };
    let mut ticker = tokio::time::interval(interval);
    ticker.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Skip);

    loop {
        tokio::select! {
            _ = ticker.tick() => {
                let message = match producer.snapshot().await {
                    Ok(snapshot) => BusMessage::Snapshot(snapshot),
                    Err(e) => BusMessage::SnapshotFailed {
                        producer_id: producer.id().to_string(),
                        error: e.to_string(),
                    },
                };
                // Producers never block on the bus: a full channel drops
                // the snapshot.
                match tx.try_send(message) {
                    Ok(()) => {}
                    Err(mpsc::error::TrySendError::Full(_)) => {
                        debug!(producer_id = producer.id(), "Bus full, snapshot dropped");
                    }
                    Err(mpsc::error::TrySendError::Closed(_)) => {
                        debug!(producer_id = producer.id(), "Bus closed, stopping producer");
                        return;
                    }
                }
            }
            changed = shutdown.changed() => {
                if changed.is_err() || *shutdown.borrow() {
                    debug!(producer_id = producer.id(), "Producer loop shutting down");
                    return;
                }
            }
        }
    }
}
