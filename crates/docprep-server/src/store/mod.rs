//! Pipeline item store
//!
//! Persistence contract for [`PipelineItem`] rows. All writes are
//! last-writer-wins on the single item row; pipeline steps only ever touch
//! their own item, so no cross-item transactions exist.

use async_trait::async_trait;
use docprep_common::types::Pagination;
use thiserror::Error;
use uuid::Uuid;

use crate::models::{ItemIdentity, ItemKind, PipelineItem};

pub mod memory;
pub mod postgres;

pub use memory::MemoryItemStore;
pub use postgres::{create_pool, PgItemStore};

/// Store operation errors with contextual information
#[derive(Error, Debug)]
pub enum StoreError {
    /// SQL query or connection error
    #[error("Store query failed: {0}")]
    Sqlx(#[from] sqlx::Error),

    /// Requested item does not exist
    #[error("{0}")]
    NotFound(String),

    /// A non-retired item already exists for the identity
    #[error("{0}")]
    Duplicate(String),
}

impl StoreError {
    pub fn not_found(id: Uuid) -> Self {
        Self::NotFound(format!("item '{}' not found", id))
    }

    pub fn duplicate(identity: &ItemIdentity) -> Self {
        Self::Duplicate(format!("active item already exists for '{}'", identity))
    }
}

pub type StoreResult<T> = Result<T, StoreError>;

/// Persistence contract for pipeline items.
///
/// `find_by_identity` and the list operations only see non-retired items
/// (`marked_for_deletion = false`); `get` sees every row so a deletion job
/// can still load the item it is about to remove.
#[async_trait]
pub trait ItemStore: Send + Sync {
    async fn create(&self, item: &PipelineItem) -> StoreResult<Uuid>;

    async fn get(&self, id: Uuid) -> StoreResult<Option<PipelineItem>>;

    async fn find_by_identity(&self, identity: &ItemIdentity)
        -> StoreResult<Option<PipelineItem>>;

    async fn update(&self, item: &PipelineItem) -> StoreResult<()>;

    /// Hard-delete the row. Deleting an already-removed item is not an error.
    async fn delete(&self, id: Uuid) -> StoreResult<()>;

    async fn list(&self, kind: ItemKind, pagination: Pagination)
        -> StoreResult<Vec<PipelineItem>>;

    /// Full non-retired snapshot of one variant, for reconciliation.
    async fn list_all(&self, kind: ItemKind) -> StoreResult<Vec<PipelineItem>>;
}
