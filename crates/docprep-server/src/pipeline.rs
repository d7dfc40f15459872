//! Pipeline task executor.
//!
//! Walks one item through extraction, compression, splitting, the optional
//! guardrail scan, and batched embedding/ingestion, persisting status, stage
//! timestamps and chunk counters after every transition so progress is
//! observable mid-flight. Every stage failure is written to the item before
//! the job error is returned to the queue for retry.
//!
//! Each run starts by purging the vector store of rows owned by this item
//! id. That makes a run idempotent: a retry after a half-ingested failure,
//! or a straggling prior attempt finishing late, can never leave duplicate
//! rows behind. Batches already ingested when a later batch fails are left
//! in place and cleaned up by the next attempt's purge.

use std::sync::Arc;

use async_trait::async_trait;
use serde_json::Value;
use tracing::{error, info, instrument, warn};
use uuid::Uuid;

use crate::clients::{Doc, GuardVerdict, GuardrailParams, PipelineClients};
use crate::config::PipelineConfig;
use crate::models::{ItemKind, ItemStatus, PipelineItem, Stage};
use crate::queue::{Job, JobError, JobHandler, JobKind};
use crate::storage::ObjectStore;
use crate::store::{ItemStore, StoreError};

/// Runs pipeline jobs against one item id at a time.
pub struct PipelineExecutor {
    store: Arc<dyn ItemStore>,
    objects: Arc<dyn ObjectStore>,
    clients: Arc<PipelineClients>,
    config: PipelineConfig,
}

impl PipelineExecutor {
    pub fn new(
        store: Arc<dyn ItemStore>,
        objects: Arc<dyn ObjectStore>,
        clients: Arc<PipelineClients>,
        config: PipelineConfig,
    ) -> Self {
        Self {
            store,
            objects,
            clients,
            config,
        }
    }

    /// Process one item end to end.
    #[instrument(skip(self))]
    async fn process(&self, item_id: Uuid) -> Result<(), JobError> {
        let mut item = match self.store.get(item_id).await {
            Ok(Some(item)) => item,
            Ok(None) => {
                return Err(JobError::fatal(anyhow::anyhow!(
                    "pipeline item {} no longer exists",
                    item_id
                )))
            }
            Err(err) => return Err(JobError::retry(err)),
        };

        if item.marked_for_deletion || item.status == ItemStatus::Canceled {
            info!(status = %item.status, "item retired, skipping pipeline run");
            return Ok(());
        }

        info!(identity = %item.identity(), "pipeline run started");

        // Purge vector rows left by any earlier attempt of this item id.
        item.status = ItemStatus::Processing;
        self.persist(&item).await?;
        if let Err(err) = self
            .clients
            .delete_by_owner(item.kind, &item.owner_key())
            .await
        {
            return Err(self.fail(&mut item, "cleanup", err.into()).await);
        }

        // Extraction. In hierarchical mode the extractor's output is already
        // the final chunk list and compression/splitting are skipped.
        let hierarchical = self.config.hierarchical_extraction;
        item.status = ItemStatus::TextExtracting;
        item.stage_started(Stage::TextExtractor);
        self.persist(&item).await?;
        let extracted = match self.extract(&item, hierarchical).await {
            Ok(docs) => docs,
            Err(err) => return Err(self.fail(&mut item, "text_extractor", err).await),
        };
        if extracted.is_empty() {
            let err = anyhow::anyhow!("extractor returned no documents");
            return Err(self.fail(&mut item, "text_extractor", err).await);
        }
        item.stage_finished(Stage::TextExtractor);
        self.persist(&item).await?;

        let chunks = if hierarchical {
            extracted
        } else {
            item.status = ItemStatus::TextCompression;
            item.stage_started(Stage::TextCompression);
            self.persist(&item).await?;
            let compressed = match self.clients.compress(&extracted).await {
                Ok(docs) => docs,
                Err(err) => return Err(self.fail(&mut item, "text_compression", err.into()).await),
            };
            if compressed.is_empty() {
                let err = anyhow::anyhow!("compressor returned no documents");
                return Err(self.fail(&mut item, "text_compression", err).await);
            }
            item.stage_finished(Stage::TextCompression);
            self.persist(&item).await?;

            item.status = ItemStatus::TextSplitting;
            item.stage_started(Stage::TextSplitter);
            self.persist(&item).await?;
            let split = match self.clients.split(&compressed).await {
                Ok(docs) => docs,
                Err(err) => return Err(self.fail(&mut item, "text_splitter", err.into()).await),
            };
            if split.is_empty() {
                let err = anyhow::anyhow!("splitter returned no chunks");
                return Err(self.fail(&mut item, "text_splitter", err).await);
            }
            item.stage_finished(Stage::TextSplitter);
            split
        };

        item.chunk_size = chunks
            .first()
            .map(|doc| doc.text.chars().count() as i32)
            .unwrap_or(0);
        item.chunks_total = chunks.len() as i32;
        item.chunks_processed = 0;
        self.persist(&item).await?;

        let mut chunks = stamp_chunks(chunks, &item);

        if self.config.guard_enabled {
            item.status = ItemStatus::Dpguard;
            item.stage_started(Stage::Dpguard);
            self.persist(&item).await?;

            let params = match self.clients.fetch_guard_params().await {
                Ok(fetched) => GuardrailParams::baseline().merge(fetched),
                Err(err) => return Err(self.fail(&mut item, "dpguard", err.into()).await),
            };
            match self.clients.guard_scan(chunks, &params).await {
                Ok(GuardVerdict::Clean(docs)) => chunks = docs,
                Ok(GuardVerdict::Blocked(reason)) => {
                    // Policy block is terminal; the job itself succeeded.
                    warn!(reason = %reason, "guard blocked content");
                    item.status = ItemStatus::Blocked;
                    item.job_message = Some(reason);
                    item.task_id = None;
                    item.stage_finished(Stage::Dpguard);
                    self.persist(&item).await?;
                    return Ok(());
                }
                Err(err) => return Err(self.fail(&mut item, "dpguard", err.into()).await),
            }
            item.stage_finished(Stage::Dpguard);
            self.persist(&item).await?;
        }

        // Embed and ingest in fixed-size batches, advancing the running
        // timestamps and chunk counter after every batch.
        item.status = ItemStatus::Embedding;
        item.stage_started(Stage::Embedding);
        self.persist(&item).await?;

        for batch in chunks.chunks(self.config.embedding_batch_size.max(1)) {
            let embeddings = match self.clients.embed(batch).await {
                Ok(embeddings) => embeddings,
                Err(err) => return Err(self.fail(&mut item, "embedding", err.into()).await),
            };
            item.stage_finished(Stage::Embedding);

            item.stage_started(Stage::Ingestion);
            if let Err(err) = self.clients.ingest(&embeddings).await {
                return Err(self.fail(&mut item, "ingestion", err.into()).await);
            }
            item.stage_finished(Stage::Ingestion);

            item.chunks_processed += batch.len() as i32;
            self.persist(&item).await?;
        }

        item.status = ItemStatus::Ingested;
        item.job_name = None;
        item.job_message = None;
        item.task_id = None;
        self.persist(&item).await?;

        info!(chunks = item.chunks_total, "pipeline run finished");
        Ok(())
    }

    /// Purge the item's vector rows, then remove its record.
    #[instrument(skip(self))]
    async fn delete(&self, item_id: Uuid) -> Result<(), JobError> {
        let mut item = match self.store.get(item_id).await {
            Ok(Some(item)) => item,
            // Already removed; deletion is idempotent.
            Ok(None) => return Ok(()),
            Err(err) => return Err(JobError::retry(err)),
        };

        if let Err(err) = self
            .clients
            .delete_by_owner(item.kind, &item.owner_key())
            .await
        {
            // Keep the row in `deleting` so the stall is inspectable, but
            // let the queue retry the purge.
            item.job_message = Some(format!("deletion purge failed: {}", err));
            if let Err(persist_err) = self.store.update(&item).await {
                error!(error = %persist_err, "failed to persist deletion failure");
            }
            return Err(JobError::retry(err));
        }

        self.store
            .delete(item_id)
            .await
            .map_err(JobError::retry)?;

        info!(identity = %item.identity(), "item deleted");
        Ok(())
    }

    async fn extract(&self, item: &PipelineItem, hierarchical: bool) -> anyhow::Result<Vec<Doc>> {
        match item.kind {
            ItemKind::File => {
                let data = self
                    .objects
                    .get_object(&item.bucket_name, &item.object_name)
                    .await?;
                Ok(self
                    .clients
                    .extract_file(&item.object_name, &data, hierarchical)
                    .await?)
            }
            ItemKind::Link => Ok(self
                .clients
                .extract_link(&item.object_name, hierarchical)
                .await?),
        }
    }

    /// Record a stage failure on the item, then hand the error to the queue.
    ///
    /// `status == error` always comes with a message and a cleared task id,
    /// so a poll between retry attempts sees why the last one failed.
    async fn fail(&self, item: &mut PipelineItem, stage: &str, err: anyhow::Error) -> JobError {
        error!(item_id = %item.id, stage, error = %err, "pipeline stage failed");
        item.status = ItemStatus::Error;
        item.job_message = Some(format!("{} failed: {}", stage, err));
        item.task_id = None;
        if let Err(persist_err) = self.store.update(item).await {
            error!(item_id = %item.id, error = %persist_err, "failed to persist error state");
        }
        JobError::retry(err)
    }

    async fn persist(&self, item: &PipelineItem) -> Result<(), JobError> {
        match self.store.update(item).await {
            Ok(()) => Ok(()),
            // The row was removed under us; there is nothing left to retry.
            Err(err @ StoreError::NotFound(_)) => Err(JobError::fatal(err)),
            Err(err) => Err(JobError::retry(err)),
        }
    }
}

#[async_trait]
impl JobHandler for PipelineExecutor {
    async fn handle(&self, job: &Job) -> Result<(), JobError> {
        match job.kind {
            JobKind::Process => self.process(job.item_id).await,
            JobKind::Delete => self.delete(job.item_id).await,
        }
    }
}

/// Tag every chunk with its owning item so downstream rows can be purged by
/// owner later. The owner key is the item id without separators.
fn stamp_chunks(mut chunks: Vec<Doc>, item: &PipelineItem) -> Vec<Doc> {
    let owner = item.owner_key();
    for doc in &mut chunks {
        match item.kind {
            ItemKind::File => {
                doc.metadata
                    .insert("file_id".to_string(), Value::String(owner.clone()));
                doc.metadata.insert(
                    "bucket_name".to_string(),
                    Value::String(item.bucket_name.clone()),
                );
                doc.metadata.insert(
                    "object_name".to_string(),
                    Value::String(item.object_name.clone()),
                );
            }
            ItemKind::Link => {
                doc.metadata
                    .insert("link_id".to_string(), Value::String(owner.clone()));
                doc.metadata
                    .insert("uri".to_string(), Value::String(item.object_name.clone()));
            }
        }
    }
    chunks
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_stamp_chunks_tags_file_identity() {
        let item = PipelineItem::new_file("default", "report.pdf", None, None, None);
        let chunks = stamp_chunks(vec![Doc::new("alpha"), Doc::new("beta")], &item);

        assert_eq!(chunks.len(), 2);
        for doc in &chunks {
            assert_eq!(
                doc.metadata.get("file_id"),
                Some(&Value::String(item.owner_key()))
            );
            assert_eq!(
                doc.metadata.get("bucket_name"),
                Some(&Value::String("default".to_string()))
            );
            assert_eq!(
                doc.metadata.get("object_name"),
                Some(&Value::String("report.pdf".to_string()))
            );
            assert!(doc.metadata.get("link_id").is_none());
        }
    }

    #[test]
    fn test_stamp_chunks_tags_link_identity() {
        let item = PipelineItem::new_link("https://example.com/page");
        let chunks = stamp_chunks(vec![Doc::new("alpha")], &item);

        assert_eq!(
            chunks[0].metadata.get("link_id"),
            Some(&Value::String(item.owner_key()))
        );
        assert_eq!(
            chunks[0].metadata.get("uri"),
            Some(&Value::String("https://example.com/page".to_string()))
        );
    }

    #[test]
    fn test_owner_key_has_no_separators() {
        let item = PipelineItem::new_link("https://example.com");
        assert_eq!(item.owner_key().len(), 32);
        assert!(!item.owner_key().contains('-'));
    }
}
