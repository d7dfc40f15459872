//! In-memory item store
//!
//! Used by tests and local development runs without a database. Mirrors the
//! visibility rules of the Postgres store, including the one-active-item-per-
//! identity constraint.

use async_trait::async_trait;
use docprep_common::types::Pagination;
use std::collections::HashMap;
use std::sync::Arc;
use tokio::sync::RwLock;
use uuid::Uuid;

use crate::models::{ItemIdentity, ItemKind, PipelineItem};

use super::{ItemStore, StoreError, StoreResult};

#[derive(Clone, Default)]
pub struct MemoryItemStore {
    items: Arc<RwLock<HashMap<Uuid, PipelineItem>>>,
}

impl MemoryItemStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Number of rows, retired ones included.
    pub async fn len(&self) -> usize {
        self.items.read().await.len()
    }

    pub async fn is_empty(&self) -> bool {
        self.items.read().await.is_empty()
    }
}

#[async_trait]
impl ItemStore for MemoryItemStore {
    async fn create(&self, item: &PipelineItem) -> StoreResult<Uuid> {
        let mut items = self.items.write().await;

        let identity = item.identity();
        let duplicate = items
            .values()
            .any(|existing| !existing.marked_for_deletion && existing.identity() == identity);
        if duplicate {
            return Err(StoreError::duplicate(&identity));
        }

        items.insert(item.id, item.clone());
        Ok(item.id)
    }

    async fn get(&self, id: Uuid) -> StoreResult<Option<PipelineItem>> {
        Ok(self.items.read().await.get(&id).cloned())
    }

    async fn find_by_identity(
        &self,
        identity: &ItemIdentity,
    ) -> StoreResult<Option<PipelineItem>> {
        let items = self.items.read().await;
        Ok(items
            .values()
            .find(|item| !item.marked_for_deletion && item.identity() == *identity)
            .cloned())
    }

    async fn update(&self, item: &PipelineItem) -> StoreResult<()> {
        let mut items = self.items.write().await;
        match items.get_mut(&item.id) {
            Some(existing) => {
                *existing = item.clone();
                Ok(())
            },
            None => Err(StoreError::not_found(item.id)),
        }
    }

    async fn delete(&self, id: Uuid) -> StoreResult<()> {
        self.items.write().await.remove(&id);
        Ok(())
    }

    async fn list(
        &self,
        kind: ItemKind,
        pagination: Pagination,
    ) -> StoreResult<Vec<PipelineItem>> {
        let mut items = self.list_all(kind).await?;
        let offset = pagination.offset.max(0) as usize;
        let limit = pagination.limit.max(0) as usize;
        if offset >= items.len() {
            return Ok(Vec::new());
        }
        items.drain(..offset);
        items.truncate(limit);
        Ok(items)
    }

    async fn list_all(&self, kind: ItemKind) -> StoreResult<Vec<PipelineItem>> {
        let items = self.items.read().await;
        let mut matching: Vec<_> = items
            .values()
            .filter(|item| item.kind == kind && !item.marked_for_deletion)
            .cloned()
            .collect();
        matching.sort_by(|a, b| b.created_at.cmp(&a.created_at).then(a.id.cmp(&b.id)));
        Ok(matching)
    }
}
