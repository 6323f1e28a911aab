//! Event bus for engine event streaming.
//!
//! Broadcast-based, fire-and-forget, with monotonic sequence numbering.
//! Multiple independent subscribers are allowed; publishing never blocks
//! on consumers and tolerates having none.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::sync::atomic::{AtomicU64, Ordering};
use tokio::sync::broadcast;
use uuid::Uuid;

use crate::domain::models::{FailureKind, MaturityLevel, Stage};

/// Unique identifier for an event.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct EventId(pub Uuid);

impl EventId {
    pub fn new() -> Self {
        Self(Uuid::new_v4())
    }
}

impl Default for EventId {
    fn default() -> Self {
        Self::new()
    }
}

impl std::fmt::Display for EventId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Monotonically increasing sequence number assigned by the bus.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct SequenceNumber(pub u64);

/// Event severity level.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum EventSeverity {
    Debug,
    Info,
    Warning,
    Error,
}

/// Event category for filtering and routing.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum EventCategory {
    Scheduler,
    Plan,
    Telemetry,
    Level,
}

/// Event payloads emitted by the engine core.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "type", content = "data")]
pub enum EventPayload {
    // Scheduler lifecycle
    SchedulerStarted,
    SchedulerStopped,
    CycleCompleted {
        cycle: u64,
        active_plans: usize,
    },

    // Plan lifecycle
    PlanCreated {
        plan_id: Uuid,
        work_item_id: Uuid,
        title: String,
    },
    StepCompleted {
        plan_id: Uuid,
        stage: Stage,
        progress: f64,
    },
    PlanCompleted {
        plan_id: Uuid,
        work_item_id: Uuid,
        duration_ms: u64,
    },
    PlanFailed {
        plan_id: Uuid,
        work_item_id: Uuid,
        kind: FailureKind,
        stage: Stage,
        reason: String,
    },

    // Telemetry
    ProducerError {
        producer_id: String,
        error: String,
    },
    EmergentPropertyAdded {
        name: String,
        score: f64,
    },

    // Level machine
    LevelAdvanced {
        previous: MaturityLevel,
        new: MaturityLevel,
        score: f64,
    },
}

impl EventPayload {
    /// Severity assigned to this payload.
    pub const fn severity(&self) -> EventSeverity {
        match self {
            Self::CycleCompleted { .. } | Self::StepCompleted { .. } => EventSeverity::Debug,
            Self::PlanFailed { .. } | Self::ProducerError { .. } => EventSeverity::Warning,
            _ => EventSeverity::Info,
        }
    }

    /// Category assigned to this payload.
    pub const fn category(&self) -> EventCategory {
        match self {
            Self::SchedulerStarted | Self::SchedulerStopped | Self::CycleCompleted { .. } => {
                EventCategory::Scheduler
            }
            Self::PlanCreated { .. }
            | Self::StepCompleted { .. }
            | Self::PlanCompleted { .. }
            | Self::PlanFailed { .. } => EventCategory::Plan,
            Self::ProducerError { .. } | Self::EmergentPropertyAdded { .. } => {
                EventCategory::Telemetry
            }
            Self::LevelAdvanced { .. } => EventCategory::Level,
        }
    }
}

/// Event envelope containing payload and metadata.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct EngineEvent {
    pub id: EventId,
    pub sequence: SequenceNumber,
    pub timestamp: DateTime<Utc>,
    pub severity: EventSeverity,
    pub category: EventCategory,
    pub payload: EventPayload,
}

/// Central event bus broadcasting engine events to subscribers.
pub struct EventBus {
    sender: broadcast::Sender<EngineEvent>,
    sequence: AtomicU64,
}

impl EventBus {
    /// Create a bus with the given broadcast channel capacity.
    pub fn new(capacity: usize) -> Self {
        let (sender, _) = broadcast::channel(capacity);
        Self {
            sender,
            sequence: AtomicU64::new(0),
        }
    }

    /// Publish a payload, wrapping it in an envelope with the next
    /// sequence number. Send errors (no subscribers) are ignored.
    pub fn emit(&self, payload: EventPayload) {
        let seq = self.sequence.fetch_add(1, Ordering::SeqCst);
        let event = EngineEvent {
            id: EventId::new(),
            sequence: SequenceNumber(seq),
            timestamp: Utc::now(),
            severity: payload.severity(),
            category: payload.category(),
            payload,
        };
        let _ = self.sender.send(event);
    }

    /// Subscribe to the event stream.
    pub fn subscribe(&self) -> broadcast::Receiver<EngineEvent> {
        self.sender.subscribe()
    }

    /// Events published so far.
    pub fn current_sequence(&self) -> u64 {
        self.sequence.load(Ordering::SeqCst)
    }

    /// Number of active subscribers.
    pub fn subscriber_count(&self) -> usize {
        self.sender.receiver_count()
    }
}

impl Default for EventBus {
    fn default() -> Self {
        Self::new(1024)
    }
}
