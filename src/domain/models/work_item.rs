//! Work item domain model.
//!
//! Work items are candidate units of work discovered by external routines.
//! They carry value/cost metadata used by the registry's ranking query and
//! become immutable once a plan has been created from them.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// Priority class for work items.
///
/// Lower weight ranks first: `Critical` outranks everything, `Experimental`
/// ranks last.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ItemPriority {
    Critical = 1,
    High = 2,
    Medium = 3,
    Low = 4,
    Experimental = 5,
}

impl Default for ItemPriority {
    fn default() -> Self {
        Self::Medium
    }
}

impl ItemPriority {
    /// Ranking weight. Smaller weights sort earlier.
    pub const fn weight(self) -> u8 {
        self as u8
    }

    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Critical => "critical",
            Self::High => "high",
            Self::Medium => "medium",
            Self::Low => "low",
            Self::Experimental => "experimental",
        }
    }

    #[allow(clippy::should_implement_trait)]
    pub fn from_str(s: &str) -> Option<Self> {
        match s.to_lowercase().as_str() {
            "critical" => Some(Self::Critical),
            "high" => Some(Self::High),
            "medium" => Some(Self::Medium),
            "low" => Some(Self::Low),
            "experimental" => Some(Self::Experimental),
            _ => None,
        }
    }
}

impl std::fmt::Display for ItemPriority {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

/// A candidate unit of work with value/cost metadata.
///
/// Current and target values are bounded to `[0, 100]`; the difference is
/// the item's potential gain, the secondary ranking key.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct WorkItem {
    /// Unique identifier
    pub id: Uuid,
    /// Human-readable title
    pub title: String,
    /// Category tag (free-form, used as the value-board key)
    pub category: String,
    /// Priority class
    pub priority: ItemPriority,
    /// Current value, bounded [0, 100]
    pub current_value: f64,
    /// Target value, bounded [0, 100]
    pub target_value: f64,
    /// Complexity score (1-10)
    pub complexity: u8,
    /// Risk score (1-10)
    pub risk: u8,
    /// Prerequisite requirement tags
    pub requirements: Vec<String>,
    /// Identifiers of items this depends on
    pub depends_on: Vec<Uuid>,
    /// Estimated total duration in milliseconds
    pub estimated_duration_ms: u64,
    /// When this item was discovered
    pub discovered_at: DateTime<Utc>,
}

impl WorkItem {
    /// Create a new work item for a category with current and target values.
    pub fn new(
        title: impl Into<String>,
        category: impl Into<String>,
        current_value: f64,
        target_value: f64,
    ) -> Self {
        Self {
            id: Uuid::new_v4(),
            title: title.into(),
            category: category.into(),
            priority: ItemPriority::default(),
            current_value,
            target_value,
            complexity: 5,
            risk: 3,
            requirements: Vec::new(),
            depends_on: Vec::new(),
            estimated_duration_ms: 300_000,
            discovered_at: Utc::now(),
        }
    }

    /// Set priority class.
    pub const fn with_priority(mut self, priority: ItemPriority) -> Self {
        self.priority = priority;
        self
    }

    /// Set complexity and risk scores.
    pub const fn with_scores(mut self, complexity: u8, risk: u8) -> Self {
        self.complexity = complexity;
        self.risk = risk;
        self
    }

    /// Set estimated duration in milliseconds.
    pub const fn with_estimated_duration_ms(mut self, ms: u64) -> Self {
        self.estimated_duration_ms = ms;
        self
    }

    /// Add a prerequisite requirement tag.
    pub fn with_requirement(mut self, tag: impl Into<String>) -> Self {
        self.requirements.push(tag.into());
        self
    }

    /// Add a dependency on another work item.
    pub fn with_dependency(mut self, item_id: Uuid) -> Self {
        if !self.depends_on.contains(&item_id) && item_id != self.id {
            self.depends_on.push(item_id);
        }
        self
    }

    /// Potential gain: target value minus current value.
    pub fn potential_gain(&self) -> f64 {
        self.target_value - self.current_value
    }

    /// Validate the item's fields.
    pub fn validate(&self) -> Result<(), String> {
        if self.title.trim().is_empty() {
            return Err("Work item title cannot be empty".to_string());
        }
        if self.category.trim().is_empty() {
            return Err("Work item category cannot be empty".to_string());
        }
        if !(0.0..=100.0).contains(&self.current_value) {
            return Err(format!(
                "Current value {} out of bounds [0, 100]",
                self.current_value
            ));
        }
        if !(0.0..=100.0).contains(&self.target_value) {
            return Err(format!(
                "Target value {} out of bounds [0, 100]",
                self.target_value
            ));
        }
        if self.target_value < self.current_value {
            return Err("Target value must not be below current value".to_string());
        }
        if self.depends_on.contains(&self.id) {
            return Err("Work item cannot depend on itself".to_string());
        }
        if self.estimated_duration_ms == 0 {
            return Err("Estimated duration must be positive".to_string());
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_item_creation() {
        let item = WorkItem::new("Raise cache hit rate", "caching", 60.0, 85.0);
        assert_eq!(item.priority, ItemPriority::Medium);
        assert!((item.potential_gain() - 25.0).abs() < f64::EPSILON);
        assert!(item.validate().is_ok());
    }

    #[test]
    fn test_priority_weights_order() {
        assert!(ItemPriority::Critical.weight() < ItemPriority::High.weight());
        assert!(ItemPriority::High.weight() < ItemPriority::Medium.weight());
        assert!(ItemPriority::Medium.weight() < ItemPriority::Low.weight());
        assert!(ItemPriority::Low.weight() < ItemPriority::Experimental.weight());
    }

    #[test]
    fn test_priority_round_trip() {
        for p in [
            ItemPriority::Critical,
            ItemPriority::High,
            ItemPriority::Medium,
            ItemPriority::Low,
            ItemPriority::Experimental,
        ] {
            assert_eq!(ItemPriority::from_str(p.as_str()), Some(p));
        }
        assert_eq!(ItemPriority::from_str("bogus"), None);
    }

    #[test]
    fn test_validation_bounds() {
        let mut item = WorkItem::new("Item", "cat", 10.0, 120.0);
        assert!(item.validate().is_err());

        item.target_value = 5.0;
        assert!(item.validate().is_err(), "target below current");

        item.target_value = 50.0;
        assert!(item.validate().is_ok());
    }

    #[test]
    fn test_self_dependency_rejected() {
        let mut item = WorkItem::new("Item", "cat", 0.0, 10.0);
        let id = item.id;
        item = item.with_dependency(id);
        assert!(item.depends_on.is_empty());
    }

    #[test]
    fn test_empty_title_invalid() {
        let item = WorkItem::new("   ", "cat", 0.0, 10.0);
        assert!(item.validate().is_err());
    }
}
