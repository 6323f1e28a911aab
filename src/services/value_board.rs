//! Value board: the external state plans commit into.
//!
//! Tracks a 0-100 value per category. A succeeding plan commits its work
//! item's target value through the [`CommitHook`] port; nothing writes the
//! board before plan success.

use std::collections::HashMap;

use async_trait::async_trait;
use tokio::sync::RwLock;
use tracing::info;

use crate::domain::errors::DomainResult;
use crate::domain::models::Plan;
use crate::domain::ports::CommitHook;

/// Per-category value store, bounded to [0, 100].
#[derive(Debug, Default)]
pub struct ValueBoard {
    values: RwLock<HashMap<String, f64>>,
}

impl ValueBoard {
    pub fn new() -> Self {
        Self::default()
    }

    /// Seed a category's starting value.
    pub async fn seed(&self, category: impl Into<String>, value: f64) {
        self.values
            .write()
            .await
            .insert(category.into(), value.clamp(0.0, 100.0));
    }

    /// Current value for a category, if tracked.
    pub async fn get(&self, category: &str) -> Option<f64> {
        self.values.read().await.get(category).copied()
    }

    /// Snapshot of all tracked categories.
    pub async fn snapshot(&self) -> HashMap<String, f64> {
        self.values.read().await.clone()
    }
}

#[async_trait]
impl CommitHook for ValueBoard {
    async fn apply(&self, plan: &Plan) -> DomainResult<()> {
        let item = &plan.work_item;
        let target = item.target_value.clamp(0.0, 100.0);
        let mut values = self.values.write().await;
        let previous = values.insert(item.category.clone(), target);
        info!(
            category = %item.category,
            previous = previous.unwrap_or(item.current_value),
            value = target,
            "Committed plan results"
        );
        Ok(())
    }
}
