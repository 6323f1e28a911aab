//! Work-item registry.
//!
//! Holds candidate work items keyed by identifier. Submission is
//! idempotent: re-discovering an item already present is silently
//! rejected. The registry has a single designated writer (the discovery
//! path via the scheduler) and any number of readers.

use std::collections::HashMap;

use tokio::sync::RwLock;
use uuid::Uuid;

use crate::domain::errors::{DomainError, DomainResult};
use crate::domain::models::WorkItem;

/// In-memory registry of candidate work items.
#[derive(Debug, Default)]
pub struct WorkItemRegistry {
    items: RwLock<HashMap<Uuid, WorkItem>>,
}

impl WorkItemRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Insert an item by identifier.
    ///
    /// Returns `Ok(false)` when an item with the same id already exists
    /// (idempotent re-discovery). Invalid items are rejected with an error.
    pub async fn submit(&self, item: WorkItem) -> DomainResult<bool> {
        item.validate().map_err(DomainError::InvalidWorkItem)?;
        let mut items = self.items.write().await;
        if items.contains_key(&item.id) {
            return Ok(false);
        }
        items.insert(item.id, item);
        Ok(true)
    }

    /// All items ordered by ascending priority weight, then descending
    /// potential gain. Ties break on discovery time then id, so the output
    /// is stable under insertion order.
    pub async fn rank(&self) -> Vec<WorkItem> {
        let items = self.items.read().await;
        let mut ranked: Vec<WorkItem> = items.values().cloned().collect();
        ranked.sort_by(|a, b| {
            a.priority
                .weight()
                .cmp(&b.priority.weight())
                .then_with(|| b.potential_gain().total_cmp(&a.potential_gain()))
                .then_with(|| a.discovered_at.cmp(&b.discovered_at))
                .then_with(|| a.id.cmp(&b.id))
        });
        ranked
    }

    /// Remove an item, returning it if present.
    pub async fn remove(&self, id: Uuid) -> Option<WorkItem> {
        self.items.write().await.remove(&id)
    }

    /// Look up an item by id.
    pub async fn get(&self, id: Uuid) -> Option<WorkItem> {
        self.items.read().await.get(&id).cloned()
    }

    /// Whether an item with this id is present.
    pub async fn contains(&self, id: Uuid) -> bool {
        self.items.read().await.contains_key(&id)
    }

    /// Number of items currently registered.
    pub async fn len(&self) -> usize {
        self.items.read().await.len()
    }

    /// Whether the registry is empty.
    pub async fn is_empty(&self) -> bool {
        self.items.read().await.is_empty()
    }
}
