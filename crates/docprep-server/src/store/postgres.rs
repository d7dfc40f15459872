//! PostgreSQL-backed item store

use async_trait::async_trait;
use docprep_common::types::Pagination;
use sqlx::postgres::{PgPool, PgPoolOptions};
use std::time::Duration;
use uuid::Uuid;

use crate::config::DatabaseConfig;
use crate::models::{ItemIdentity, ItemKind, PipelineItem};

use super::{ItemStore, StoreError, StoreResult};

const COLUMNS: &str = "id, kind, bucket_name, object_name, etag, content_type, size, \
     status, marked_for_deletion, chunk_size, chunks_total, chunks_processed, \
     text_extractor_start, text_extractor_end, text_compression_start, text_compression_end, \
     text_splitter_start, text_splitter_end, dpguard_start, dpguard_end, \
     embedding_start, embedding_end, ingestion_start, ingestion_end, \
     job_name, job_message, task_id, created_at";

/// Create the connection pool from configuration.
pub async fn create_pool(config: &DatabaseConfig) -> StoreResult<PgPool> {
    let pool = PgPoolOptions::new()
        .max_connections(config.max_connections)
        .min_connections(config.min_connections)
        .acquire_timeout(Duration::from_secs(config.connect_timeout_secs))
        .idle_timeout(Duration::from_secs(config.idle_timeout_secs))
        .connect(&config.url)
        .await?;

    Ok(pool)
}

/// Item store backed by the `pipeline_items` table.
#[derive(Clone)]
pub struct PgItemStore {
    pool: PgPool,
}

impl PgItemStore {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }
}

fn is_unique_violation(err: &sqlx::Error) -> bool {
    matches!(err, sqlx::Error::Database(db) if db.code().as_deref() == Some("23505"))
}

#[async_trait]
impl ItemStore for PgItemStore {
    async fn create(&self, item: &PipelineItem) -> StoreResult<Uuid> {
        let sql = format!(
            "INSERT INTO pipeline_items ({}) VALUES \
             ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10, $11, $12, $13, $14, \
              $15, $16, $17, $18, $19, $20, $21, $22, $23, $24, $25, $26, $27, $28)",
            COLUMNS
        );

        sqlx::query(&sql)
            .bind(item.id)
            .bind(item.kind)
            .bind(&item.bucket_name)
            .bind(&item.object_name)
            .bind(&item.etag)
            .bind(&item.content_type)
            .bind(item.size)
            .bind(item.status)
            .bind(item.marked_for_deletion)
            .bind(item.chunk_size)
            .bind(item.chunks_total)
            .bind(item.chunks_processed)
            .bind(item.text_extractor_start)
            .bind(item.text_extractor_end)
            .bind(item.text_compression_start)
            .bind(item.text_compression_end)
            .bind(item.text_splitter_start)
            .bind(item.text_splitter_end)
            .bind(item.dpguard_start)
            .bind(item.dpguard_end)
            .bind(item.embedding_start)
            .bind(item.embedding_end)
            .bind(item.ingestion_start)
            .bind(item.ingestion_end)
            .bind(&item.job_name)
            .bind(&item.job_message)
            .bind(&item.task_id)
            .bind(item.created_at)
            .execute(&self.pool)
            .await
            .map_err(|e| {
                if is_unique_violation(&e) {
                    StoreError::duplicate(&item.identity())
                } else {
                    StoreError::Sqlx(e)
                }
            })?;

        Ok(item.id)
    }

    async fn get(&self, id: Uuid) -> StoreResult<Option<PipelineItem>> {
        let sql = format!("SELECT {} FROM pipeline_items WHERE id = $1", COLUMNS);

        let item = sqlx::query_as::<_, PipelineItem>(&sql)
            .bind(id)
            .fetch_optional(&self.pool)
            .await?;

        Ok(item)
    }

    async fn find_by_identity(
        &self,
        identity: &ItemIdentity,
    ) -> StoreResult<Option<PipelineItem>> {
        let (bucket_name, object_name) = identity.columns();
        let sql = format!(
            "SELECT {} FROM pipeline_items \
             WHERE kind = $1 AND bucket_name = $2 AND object_name = $3 \
               AND NOT marked_for_deletion",
            COLUMNS
        );

        let item = sqlx::query_as::<_, PipelineItem>(&sql)
            .bind(identity.kind())
            .bind(bucket_name)
            .bind(object_name)
            .fetch_optional(&self.pool)
            .await?;

        Ok(item)
    }

    async fn update(&self, item: &PipelineItem) -> StoreResult<()> {
        // Identity and created_at are immutable; everything else is
        // last-writer-wins.
        let result = sqlx::query(
            "UPDATE pipeline_items SET \
                 etag = $2, content_type = $3, size = $4, status = $5, \
                 marked_for_deletion = $6, chunk_size = $7, chunks_total = $8, \
                 chunks_processed = $9, \
                 text_extractor_start = $10, text_extractor_end = $11, \
                 text_compression_start = $12, text_compression_end = $13, \
                 text_splitter_start = $14, text_splitter_end = $15, \
                 dpguard_start = $16, dpguard_end = $17, \
                 embedding_start = $18, embedding_end = $19, \
                 ingestion_start = $20, ingestion_end = $21, \
                 job_name = $22, job_message = $23, task_id = $24 \
             WHERE id = $1",
        )
        .bind(item.id)
        .bind(&item.etag)
        .bind(&item.content_type)
        .bind(item.size)
        .bind(item.status)
        .bind(item.marked_for_deletion)
        .bind(item.chunk_size)
        .bind(item.chunks_total)
        .bind(item.chunks_processed)
        .bind(item.text_extractor_start)
        .bind(item.text_extractor_end)
        .bind(item.text_compression_start)
        .bind(item.text_compression_end)
        .bind(item.text_splitter_start)
        .bind(item.text_splitter_end)
        .bind(item.dpguard_start)
        .bind(item.dpguard_end)
        .bind(item.embedding_start)
        .bind(item.embedding_end)
        .bind(item.ingestion_start)
        .bind(item.ingestion_end)
        .bind(&item.job_name)
        .bind(&item.job_message)
        .bind(&item.task_id)
        .execute(&self.pool)
        .await?;

        if result.rows_affected() == 0 {
            return Err(StoreError::not_found(item.id));
        }

        Ok(())
    }

    async fn delete(&self, id: Uuid) -> StoreResult<()> {
        sqlx::query("DELETE FROM pipeline_items WHERE id = $1")
            .bind(id)
            .execute(&self.pool)
            .await?;

        Ok(())
    }

    async fn list(
        &self,
        kind: ItemKind,
        pagination: Pagination,
    ) -> StoreResult<Vec<PipelineItem>> {
        let sql = format!(
            "SELECT {} FROM pipeline_items \
             WHERE kind = $1 AND NOT marked_for_deletion \
             ORDER BY created_at DESC \
             LIMIT $2 OFFSET $3",
            COLUMNS
        );

        let items = sqlx::query_as::<_, PipelineItem>(&sql)
            .bind(kind)
            .bind(pagination.limit)
            .bind(pagination.offset)
            .fetch_all(&self.pool)
            .await?;

        Ok(items)
    }

    async fn list_all(&self, kind: ItemKind) -> StoreResult<Vec<PipelineItem>> {
        let sql = format!(
            "SELECT {} FROM pipeline_items \
             WHERE kind = $1 AND NOT marked_for_deletion \
             ORDER BY created_at DESC",
            COLUMNS
        );

        let items = sqlx::query_as::<_, PipelineItem>(&sql)
            .bind(kind)
            .fetch_all(&self.pool)
            .await?;

        Ok(items)
    }
}
