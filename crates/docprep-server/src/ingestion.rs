//! Ingestion control service.
//!
//! Orchestrates item lifecycle around the store and the job queue: register
//! uploads and links, retry, cancel, delete, and reconcile against live
//! storage. Registering an identity that already has an active item retires
//! the old item first (marks it for deletion and queues its purge), so at
//! most one active item per identity ever exists.

use std::sync::Arc;

use async_trait::async_trait;
use tracing::{info, instrument, warn};
use uuid::Uuid;

use docprep_common::{links::normalize_link, types::Pagination};

use crate::error::{ApiResult, AppError};
use crate::models::{ItemIdentity, ItemKind, ItemStatus, PipelineItem};
use crate::queue::{Job, JobQueue, TaskId};
use crate::reconcile::{self, BucketListing, ReconcileEntry, ReconcileOps, SyncSummary};
use crate::storage::{normalize_etag, ObjectMeta, ObjectStore};
use crate::store::ItemStore;

/// Item lifecycle operations behind the HTTP surface and the sync scheduler.
pub struct IngestionService {
    store: Arc<dyn ItemStore>,
    objects: Arc<dyn ObjectStore>,
    queue: JobQueue,
}

impl IngestionService {
    pub fn new(store: Arc<dyn ItemStore>, objects: Arc<dyn ObjectStore>, queue: JobQueue) -> Self {
        Self {
            store,
            objects,
            queue,
        }
    }

    /// Register an uploaded object and queue its pipeline run.
    #[instrument(skip(self))]
    pub async fn register_file(
        &self,
        bucket_name: &str,
        object_name: &str,
        etag: Option<String>,
        content_type: Option<String>,
        size: Option<i64>,
    ) -> ApiResult<PipelineItem> {
        if bucket_name.trim().is_empty() {
            return Err(AppError::Validation("bucket name cannot be empty".into()));
        }
        if object_name.trim().is_empty() {
            return Err(AppError::Validation("object name cannot be empty".into()));
        }

        let item = PipelineItem::new_file(
            bucket_name,
            object_name,
            etag.as_deref().map(normalize_etag),
            content_type,
            size,
        );
        self.register(item).await
    }

    /// Register a link and queue its pipeline run.
    #[instrument(skip(self))]
    pub async fn register_link(&self, uri: &str) -> ApiResult<PipelineItem> {
        let normalized = normalize_link(uri)?;
        self.register(PipelineItem::new_link(normalized)).await
    }

    /// Retire any active item with the same identity, create the new one,
    /// and queue its processing job.
    async fn register(&self, mut item: PipelineItem) -> ApiResult<PipelineItem> {
        let identity = item.identity();
        if let Some(previous) = self.store.find_by_identity(&identity).await? {
            info!(
                item_id = %previous.id,
                identity = %identity,
                "retiring prior item for re-registered identity"
            );
            self.retire(previous).await?;
        }

        self.store.create(&item).await?;

        let job = Job::process(item.id);
        let task_id = self.enqueue(&mut item, job).await?;
        info!(item_id = %item.id, %task_id, identity = %identity, "item registered");
        Ok(item)
    }

    /// Reset a previously run item and queue a fresh pipeline run.
    #[instrument(skip(self))]
    pub async fn retry(&self, kind: ItemKind, id: Uuid) -> ApiResult<PipelineItem> {
        let mut item = self.get(kind, id).await?;
        if item.marked_for_deletion || item.status == ItemStatus::Deleting {
            return Err(AppError::Conflict(format!(
                "item '{}' is being deleted",
                id
            )));
        }

        self.revoke_current_task(&item).await;
        item.reset_for_retry();

        let job = Job::process(item.id);
        let task_id = self.enqueue(&mut item, job).await?;
        info!(item_id = %id, %task_id, "item retry queued");
        Ok(item)
    }

    /// Revoke the item's job and mark it canceled.
    ///
    /// Revocation is best-effort: a job past its last await point finishes
    /// anyway, and its next attempt skips out on the canceled status.
    #[instrument(skip(self))]
    pub async fn cancel(&self, kind: ItemKind, id: Uuid) -> ApiResult<PipelineItem> {
        let mut item = self.get(kind, id).await?;
        if !item.status.is_active() {
            return Err(AppError::Conflict(format!(
                "item '{}' has no active job to cancel (status: {})",
                id, item.status
            )));
        }

        self.revoke_current_task(&item).await;
        item.status = ItemStatus::Canceled;
        item.job_name = None;
        item.job_message = None;
        item.task_id = None;
        self.store.update(&item).await?;

        info!(item_id = %id, "item canceled");
        Ok(item)
    }

    /// Mark the item for deletion and queue the job that purges its vector
    /// rows and removes the record. Idempotent.
    #[instrument(skip(self))]
    pub async fn delete(&self, kind: ItemKind, id: Uuid) -> ApiResult<PipelineItem> {
        let item = self.get(kind, id).await?;
        if item.marked_for_deletion {
            return Ok(item);
        }
        self.retire(item).await
    }

    /// Load one item, letting a variant mismatch read as not found.
    pub async fn get(&self, kind: ItemKind, id: Uuid) -> ApiResult<PipelineItem> {
        match self.store.get(id).await? {
            Some(item) if item.kind == kind => Ok(item),
            _ => Err(AppError::NotFound(format!("{} '{}' not found", kind, id))),
        }
    }

    pub async fn list(&self, kind: ItemKind, pagination: Pagination) -> ApiResult<Vec<PipelineItem>> {
        Ok(self.store.list(kind, pagination).await?)
    }

    /// Bucket notification: an object was created or overwritten.
    pub async fn object_created(
        &self,
        bucket_name: &str,
        object_name: &str,
        etag: Option<String>,
        content_type: Option<String>,
        size: Option<i64>,
    ) -> ApiResult<PipelineItem> {
        self.register_file(bucket_name, object_name, etag, content_type, size)
            .await
    }

    /// Bucket notification: an object was removed. Unknown identities are
    /// fine; the event may refer to an object this service never tracked.
    pub async fn object_removed(&self, bucket_name: &str, object_name: &str) -> ApiResult<()> {
        let identity = ItemIdentity::File {
            bucket_name: bucket_name.to_string(),
            object_name: object_name.to_string(),
        };
        match self.store.find_by_identity(&identity).await? {
            Some(item) => {
                self.retire(item).await?;
                Ok(())
            }
            None => {
                info!(identity = %identity, "removal event for untracked object");
                Ok(())
            }
        }
    }

    /// Compute the reconciliation plan without touching anything.
    pub async fn sync_preview(&self) -> ApiResult<(Vec<ReconcileEntry>, SyncSummary)> {
        let (live, stored) = self.sync_inputs().await?;
        let entries = reconcile::diff(&live, &stored);
        let summary = SyncSummary::of(&entries);
        Ok((entries, summary))
    }

    /// Compute and apply the reconciliation plan.
    #[instrument(skip(self))]
    pub async fn sync_apply(&self) -> ApiResult<SyncSummary> {
        let (live, stored) = self.sync_inputs().await?;
        let entries = reconcile::diff(&live, &stored);
        let summary = reconcile::apply(&entries, self).await;
        info!(
            adds = summary.adds,
            updates = summary.updates,
            deletes = summary.deletes,
            skips = summary.skips,
            failed = summary.failed,
            "reconciliation finished"
        );
        Ok(summary)
    }

    async fn sync_inputs(&self) -> ApiResult<(BucketListing, Vec<PipelineItem>)> {
        let live = reconcile::snapshot(self.objects.as_ref())
            .await
            .map_err(|e| AppError::Storage(e.to_string()))?;
        let stored = self.store.list_all(ItemKind::File).await?;
        Ok((live, stored))
    }

    /// Mark an item for deletion and queue its purge job.
    async fn retire(&self, mut item: PipelineItem) -> ApiResult<PipelineItem> {
        self.revoke_current_task(&item).await;

        item.marked_for_deletion = true;
        item.status = ItemStatus::Deleting;
        item.job_message = None;
        self.store.update(&item).await?;

        let job = Job::delete(item.id);
        let task_id = self.enqueue(&mut item, job).await?;
        info!(item_id = %item.id, %task_id, "item deletion queued");
        Ok(item)
    }

    /// Queue a job and persist its bookkeeping on the item.
    async fn enqueue(&self, item: &mut PipelineItem, job: Job) -> ApiResult<TaskId> {
        let task_id = self
            .queue
            .enqueue(job)
            .await
            .map_err(|e| AppError::Internal(e.to_string()))?;

        item.job_name = Some(format!("{}_{}", job.kind, item.kind));
        item.task_id = Some(task_id.to_string());
        self.store.update(item).await?;
        Ok(task_id)
    }

    async fn revoke_current_task(&self, item: &PipelineItem) {
        let Some(task_id) = item.task_id.as_deref().and_then(TaskId::parse) else {
            return;
        };
        if !self.queue.revoke(task_id).await {
            warn!(item_id = %item.id, %task_id, "task already finished, nothing to revoke");
        }
    }
}

#[async_trait]
impl ReconcileOps for IngestionService {
    async fn add(&self, identity: &ItemIdentity, meta: &ObjectMeta) -> anyhow::Result<()> {
        let ItemIdentity::File { bucket_name, .. } = identity else {
            anyhow::bail!("reconciliation only adds file items");
        };
        self.register_file(
            bucket_name,
            &meta.key,
            meta.etag.clone(),
            meta.content_type.clone(),
            meta.size,
        )
        .await?;
        Ok(())
    }

    async fn update(
        &self,
        _item_id: Uuid,
        identity: &ItemIdentity,
        meta: &ObjectMeta,
    ) -> anyhow::Result<()> {
        // Registration retires the stale item by identity before creating
        // the replacement, which is exactly the update semantics.
        self.add(identity, meta).await
    }

    async fn delete(&self, item_id: Uuid, _identity: &ItemIdentity) -> anyhow::Result<()> {
        self.delete(ItemKind::File, item_id).await?;
        Ok(())
    }
}
