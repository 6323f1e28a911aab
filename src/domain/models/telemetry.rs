//! Telemetry domain models.
//!
//! Snapshots broadcast by producers, the derived aggregate state, the
//! maturity-level ladder, and the emergent-property rule table.

use std::collections::HashMap;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// A status snapshot broadcast by one producer.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ProducerSnapshot {
    /// Stable producer identity
    pub producer_id: String,
    /// Normalized health figure, clamped to [0, 100]
    pub health: f64,
    /// Opaque structured payload
    pub details: serde_json::Value,
    /// When the snapshot was taken
    pub recorded_at: DateTime<Utc>,
}

impl ProducerSnapshot {
    /// Build a snapshot, clamping the health figure into bounds.
    pub fn new(producer_id: impl Into<String>, health: f64) -> Self {
        Self {
            producer_id: producer_id.into(),
            health: health.clamp(0.0, 100.0),
            details: serde_json::Value::Null,
            recorded_at: Utc::now(),
        }
    }

    /// Attach a structured detail payload.
    #[must_use]
    pub fn with_details(mut self, details: serde_json::Value) -> Self {
        self.details = details;
        self
    }
}

/// Per-producer bookkeeping held by the aggregation bus.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ProducerEntry {
    /// Latest cached snapshot (last-write-wins)
    pub snapshot: ProducerSnapshot,
    /// Participation proxy, raised per snapshot, saturating at 100
    pub contribution: f64,
    /// Snapshots received so far
    pub snapshots_received: u64,
    /// Snapshot failures recorded for this producer
    pub errors: u64,
}

/// Discrete maturity levels, lowest first.
///
/// The level machine is a ratchet: it never transitions downward.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum MaturityLevel {
    Dormant,
    Forming,
    Established,
    Optimizing,
    Autonomous,
}

impl Default for MaturityLevel {
    fn default() -> Self {
        Self::Dormant
    }
}

impl MaturityLevel {
    /// All levels in ascending order.
    pub const ALL: [Self; 5] = [
        Self::Dormant,
        Self::Forming,
        Self::Established,
        Self::Optimizing,
        Self::Autonomous,
    ];

    /// Default activation thresholds, index-aligned with [`Self::ALL`].
    pub const DEFAULT_THRESHOLDS: [f64; 5] = [0.0, 30.0, 55.0, 75.0, 90.0];

    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Dormant => "dormant",
            Self::Forming => "forming",
            Self::Established => "established",
            Self::Optimizing => "optimizing",
            Self::Autonomous => "autonomous",
        }
    }

    /// Position in the ladder, `Dormant` being 0.
    pub const fn index(self) -> usize {
        self as usize
    }

    /// Level at a ladder position, saturating at the top.
    pub fn from_index(index: usize) -> Self {
        *Self::ALL.get(index).unwrap_or(&Self::Autonomous)
    }
}

impl std::fmt::Display for MaturityLevel {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

/// Which figure an emergent-property rule watches.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case", tag = "source", content = "producer_id")]
pub enum PropertySource {
    /// The combined (mean) score
    Combined,
    /// One producer's latest health figure
    Producer(String),
}

/// An emergent-property rule: fires once, the first time its watched
/// figure reaches the threshold. Never reconsidered after firing.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PropertyRule {
    /// Property name added to the aggregate state
    pub name: String,
    /// Watched figure
    pub source: PropertySource,
    /// Activation threshold
    pub threshold: f64,
}

impl PropertyRule {
    /// Rule on the combined score.
    pub fn combined(name: impl Into<String>, threshold: f64) -> Self {
        Self {
            name: name.into(),
            source: PropertySource::Combined,
            threshold,
        }
    }

    /// Rule on a single producer's health figure.
    pub fn producer(name: impl Into<String>, producer_id: impl Into<String>, threshold: f64) -> Self {
        Self {
            name: name.into(),
            source: PropertySource::Producer(producer_id.into()),
            threshold,
        }
    }
}

/// Default emergent-property catalog.
pub fn default_property_rules() -> Vec<PropertyRule> {
    vec![
        PropertyRule::combined("self-monitoring", 25.0),
        PropertyRule::combined("cross-subsystem-coordination", 45.0),
        PropertyRule::combined("predictive-scheduling", 65.0),
        PropertyRule::combined("self-optimization", 85.0),
    ]
}

/// One bounded-history observation of the aggregate state.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct HistorySample {
    /// When the sample was recorded
    pub recorded_at: DateTime<Utc>,
    /// Combined score at that time
    pub combined_score: f64,
    /// Level at that time
    pub level: MaturityLevel,
    /// Emergent properties unlocked so far
    pub property_count: usize,
}

/// Derived aggregate state, recomputed on every producer broadcast.
///
/// Created once and mutated in place; the only writer is the aggregation
/// bus loop.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AggregateState {
    /// Mean of the latest known per-producer health figures
    pub combined_score: f64,
    /// Current maturity level (one-way ratchet)
    pub level: MaturityLevel,
    /// Emergent properties in unlock order; additions only
    pub emergent_properties: Vec<String>,
    /// Latest snapshot and bookkeeping per producer identity
    pub producers: HashMap<String, ProducerEntry>,
    /// Bounded history of aggregate observations
    pub history: Vec<HistorySample>,
    /// When the state last changed
    pub updated_at: DateTime<Utc>,
}

impl Default for AggregateState {
    fn default() -> Self {
        Self {
            combined_score: 0.0,
            level: MaturityLevel::default(),
            emergent_properties: Vec::new(),
            producers: HashMap::new(),
            history: Vec::new(),
            updated_at: Utc::now(),
        }
    }
}

impl AggregateState {
    /// Contribution level per producer, keyed by identity.
    pub fn contributions(&self) -> HashMap<String, f64> {
        self.producers
            .iter()
            .map(|(id, entry)| (id.clone(), entry.contribution))
            .collect()
    }
}
