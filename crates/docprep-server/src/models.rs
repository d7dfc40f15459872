//! Data models for the ingestion pipeline
//!
//! A [`PipelineItem`] is one tracked file or link, carried through the stage
//! sequence by the executor. Its row is the single source of truth a client
//! can poll for progress.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// Item variant: uploaded file or registered link
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, sqlx::Type)]
#[sqlx(type_name = "text")]
pub enum ItemKind {
    #[serde(rename = "file")]
    #[sqlx(rename = "file")]
    File,
    #[serde(rename = "link")]
    #[sqlx(rename = "link")]
    Link,
}

impl std::fmt::Display for ItemKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            ItemKind::File => write!(f, "file"),
            ItemKind::Link => write!(f, "link"),
        }
    }
}

impl std::str::FromStr for ItemKind {
    type Err = anyhow::Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "file" => Ok(ItemKind::File),
            "link" => Ok(ItemKind::Link),
            _ => Err(anyhow::anyhow!("Invalid item kind: {}", s)),
        }
    }
}

/// Pipeline status of an item
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, sqlx::Type)]
#[sqlx(type_name = "text")]
pub enum ItemStatus {
    #[serde(rename = "uploaded")]
    #[sqlx(rename = "uploaded")]
    Uploaded,
    #[serde(rename = "processing")]
    #[sqlx(rename = "processing")]
    Processing,
    #[serde(rename = "text_extracting")]
    #[sqlx(rename = "text_extracting")]
    TextExtracting,
    #[serde(rename = "text_compression")]
    #[sqlx(rename = "text_compression")]
    TextCompression,
    #[serde(rename = "text_splitting")]
    #[sqlx(rename = "text_splitting")]
    TextSplitting,
    #[serde(rename = "dpguard")]
    #[sqlx(rename = "dpguard")]
    Dpguard,
    #[serde(rename = "embedding")]
    #[sqlx(rename = "embedding")]
    Embedding,
    #[serde(rename = "ingested")]
    #[sqlx(rename = "ingested")]
    Ingested,
    #[serde(rename = "error")]
    #[sqlx(rename = "error")]
    Error,
    #[serde(rename = "deleting")]
    #[sqlx(rename = "deleting")]
    Deleting,
    #[serde(rename = "canceled")]
    #[sqlx(rename = "canceled")]
    Canceled,
    #[serde(rename = "blocked")]
    #[sqlx(rename = "blocked")]
    Blocked,
}

impl ItemStatus {
    /// Statuses a running or pending job may hold; cancellation is only
    /// meaningful for these.
    pub fn is_active(self) -> bool {
        matches!(
            self,
            ItemStatus::Uploaded
                | ItemStatus::Processing
                | ItemStatus::TextExtracting
                | ItemStatus::TextCompression
                | ItemStatus::TextSplitting
                | ItemStatus::Dpguard
                | ItemStatus::Embedding
        )
    }

    /// Terminal statuses: no job will advance the item further without an
    /// explicit retry or delete.
    pub fn is_terminal(self) -> bool {
        matches!(
            self,
            ItemStatus::Ingested | ItemStatus::Error | ItemStatus::Canceled | ItemStatus::Blocked
        )
    }

    fn as_str(self) -> &'static str {
        match self {
            ItemStatus::Uploaded => "uploaded",
            ItemStatus::Processing => "processing",
            ItemStatus::TextExtracting => "text_extracting",
            ItemStatus::TextCompression => "text_compression",
            ItemStatus::TextSplitting => "text_splitting",
            ItemStatus::Dpguard => "dpguard",
            ItemStatus::Embedding => "embedding",
            ItemStatus::Ingested => "ingested",
            ItemStatus::Error => "error",
            ItemStatus::Deleting => "deleting",
            ItemStatus::Canceled => "canceled",
            ItemStatus::Blocked => "blocked",
        }
    }
}

impl std::fmt::Display for ItemStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

impl std::str::FromStr for ItemStatus {
    type Err = anyhow::Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "uploaded" => Ok(ItemStatus::Uploaded),
            "processing" => Ok(ItemStatus::Processing),
            "text_extracting" => Ok(ItemStatus::TextExtracting),
            "text_compression" => Ok(ItemStatus::TextCompression),
            "text_splitting" => Ok(ItemStatus::TextSplitting),
            "dpguard" => Ok(ItemStatus::Dpguard),
            "embedding" => Ok(ItemStatus::Embedding),
            "ingested" => Ok(ItemStatus::Ingested),
            "error" => Ok(ItemStatus::Error),
            "deleting" => Ok(ItemStatus::Deleting),
            "canceled" => Ok(ItemStatus::Canceled),
            "blocked" => Ok(ItemStatus::Blocked),
            _ => Err(anyhow::anyhow!("Invalid item status: {}", s)),
        }
    }
}

/// One step of the pipeline, used to key the stage timestamp pairs.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Stage {
    TextExtractor,
    TextCompression,
    TextSplitter,
    Dpguard,
    Embedding,
    Ingestion,
}

impl std::fmt::Display for Stage {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let name = match self {
            Stage::TextExtractor => "text_extractor",
            Stage::TextCompression => "text_compression",
            Stage::TextSplitter => "text_splitter",
            Stage::Dpguard => "dpguard",
            Stage::Embedding => "embedding",
            Stage::Ingestion => "ingestion",
        };
        f.write_str(name)
    }
}

/// Identity of an item within its variant.
///
/// Files are identified by their storage coordinates, links by their URI. At
/// most one non-retired item exists per identity.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum ItemIdentity {
    File {
        bucket_name: String,
        object_name: String,
    },
    Link {
        uri: String,
    },
}

impl ItemIdentity {
    pub fn kind(&self) -> ItemKind {
        match self {
            ItemIdentity::File { .. } => ItemKind::File,
            ItemIdentity::Link { .. } => ItemKind::Link,
        }
    }

    /// Column values used to address the identity in the store:
    /// `(bucket_name, object_name)`, with an empty bucket for links.
    pub fn columns(&self) -> (&str, &str) {
        match self {
            ItemIdentity::File {
                bucket_name,
                object_name,
            } => (bucket_name.as_str(), object_name.as_str()),
            ItemIdentity::Link { uri } => ("", uri.as_str()),
        }
    }
}

impl std::fmt::Display for ItemIdentity {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            ItemIdentity::File {
                bucket_name,
                object_name,
            } => write!(f, "{}/{}", bucket_name, object_name),
            ItemIdentity::Link { uri } => f.write_str(uri),
        }
    }
}

/// One tracked file or link
#[derive(Debug, Clone, Serialize, Deserialize, sqlx::FromRow)]
pub struct PipelineItem {
    pub id: Uuid,
    pub kind: ItemKind,

    /// Empty for links.
    pub bucket_name: String,
    /// Object key for files, normalized URI for links.
    pub object_name: String,

    pub etag: Option<String>,
    pub content_type: Option<String>,
    pub size: Option<i64>,

    pub status: ItemStatus,
    pub marked_for_deletion: bool,

    pub chunk_size: i32,
    pub chunks_total: i32,
    pub chunks_processed: i32,

    pub text_extractor_start: Option<DateTime<Utc>>,
    pub text_extractor_end: Option<DateTime<Utc>>,
    pub text_compression_start: Option<DateTime<Utc>>,
    pub text_compression_end: Option<DateTime<Utc>>,
    pub text_splitter_start: Option<DateTime<Utc>>,
    pub text_splitter_end: Option<DateTime<Utc>>,
    pub dpguard_start: Option<DateTime<Utc>>,
    pub dpguard_end: Option<DateTime<Utc>>,
    pub embedding_start: Option<DateTime<Utc>>,
    pub embedding_end: Option<DateTime<Utc>>,
    pub ingestion_start: Option<DateTime<Utc>>,
    pub ingestion_end: Option<DateTime<Utc>>,

    pub job_name: Option<String>,
    pub job_message: Option<String>,
    pub task_id: Option<String>,

    pub created_at: DateTime<Utc>,
}

impl PipelineItem {
    /// New file item in status `uploaded`.
    pub fn new_file(
        bucket_name: impl Into<String>,
        object_name: impl Into<String>,
        etag: Option<String>,
        content_type: Option<String>,
        size: Option<i64>,
    ) -> Self {
        Self {
            kind: ItemKind::File,
            bucket_name: bucket_name.into(),
            object_name: object_name.into(),
            etag,
            content_type,
            size,
            ..Self::empty()
        }
    }

    /// New link item in status `uploaded`. The URI is expected to be
    /// normalized already.
    pub fn new_link(uri: impl Into<String>) -> Self {
        Self {
            kind: ItemKind::Link,
            object_name: uri.into(),
            ..Self::empty()
        }
    }

    fn empty() -> Self {
        Self {
            id: Uuid::new_v4(),
            kind: ItemKind::File,
            bucket_name: String::new(),
            object_name: String::new(),
            etag: None,
            content_type: None,
            size: None,
            status: ItemStatus::Uploaded,
            marked_for_deletion: false,
            chunk_size: 0,
            chunks_total: 0,
            chunks_processed: 0,
            text_extractor_start: None,
            text_extractor_end: None,
            text_compression_start: None,
            text_compression_end: None,
            text_splitter_start: None,
            text_splitter_end: None,
            dpguard_start: None,
            dpguard_end: None,
            embedding_start: None,
            embedding_end: None,
            ingestion_start: None,
            ingestion_end: None,
            job_name: None,
            job_message: None,
            task_id: None,
            created_at: Utc::now(),
        }
    }

    pub fn identity(&self) -> ItemIdentity {
        match self.kind {
            ItemKind::File => ItemIdentity::File {
                bucket_name: self.bucket_name.clone(),
                object_name: self.object_name.clone(),
            },
            ItemKind::Link => ItemIdentity::Link {
                uri: self.object_name.clone(),
            },
        }
    }

    /// Id with separators stripped, used to tag downstream vector-store rows
    /// whose key space disallows hyphens.
    pub fn owner_key(&self) -> String {
        self.id.simple().to_string()
    }

    /// Record the start timestamp for a stage.
    pub fn stage_started(&mut self, stage: Stage) {
        *self.stage_slot(stage, true) = Some(Utc::now());
    }

    /// Record the end timestamp for a stage.
    pub fn stage_finished(&mut self, stage: Stage) {
        *self.stage_slot(stage, false) = Some(Utc::now());
    }

    fn stage_slot(&mut self, stage: Stage, start: bool) -> &mut Option<DateTime<Utc>> {
        match (stage, start) {
            (Stage::TextExtractor, true) => &mut self.text_extractor_start,
            (Stage::TextExtractor, false) => &mut self.text_extractor_end,
            (Stage::TextCompression, true) => &mut self.text_compression_start,
            (Stage::TextCompression, false) => &mut self.text_compression_end,
            (Stage::TextSplitter, true) => &mut self.text_splitter_start,
            (Stage::TextSplitter, false) => &mut self.text_splitter_end,
            (Stage::Dpguard, true) => &mut self.dpguard_start,
            (Stage::Dpguard, false) => &mut self.dpguard_end,
            (Stage::Embedding, true) => &mut self.embedding_start,
            (Stage::Embedding, false) => &mut self.embedding_end,
            (Stage::Ingestion, true) => &mut self.ingestion_start,
            (Stage::Ingestion, false) => &mut self.ingestion_end,
        }
    }

    /// Reset progress for a fresh run: chunk counters back to zero, job
    /// message cleared, status back to `uploaded`.
    pub fn reset_for_retry(&mut self) {
        self.status = ItemStatus::Uploaded;
        self.chunk_size = 0;
        self.chunks_total = 0;
        self.chunks_processed = 0;
        self.job_message = None;
        self.task_id = None;
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_status_roundtrip() {
        let all = [
            ItemStatus::Uploaded,
            ItemStatus::Processing,
            ItemStatus::TextExtracting,
            ItemStatus::TextCompression,
            ItemStatus::TextSplitting,
            ItemStatus::Dpguard,
            ItemStatus::Embedding,
            ItemStatus::Ingested,
            ItemStatus::Error,
            ItemStatus::Deleting,
            ItemStatus::Canceled,
            ItemStatus::Blocked,
        ];
        for status in all {
            let parsed: ItemStatus = status.to_string().parse().unwrap();
            assert_eq!(parsed, status);
        }
        assert!("bogus".parse::<ItemStatus>().is_err());
    }

    #[test]
    fn test_status_classes() {
        assert!(ItemStatus::Uploaded.is_active());
        assert!(ItemStatus::Embedding.is_active());
        assert!(!ItemStatus::Ingested.is_active());
        assert!(!ItemStatus::Deleting.is_active());

        assert!(ItemStatus::Error.is_terminal());
        assert!(ItemStatus::Blocked.is_terminal());
        assert!(!ItemStatus::Processing.is_terminal());
        assert!(!ItemStatus::Deleting.is_terminal());
    }

    #[test]
    fn test_file_identity() {
        let item = PipelineItem::new_file("default", "a.txt", Some("E1".into()), None, Some(10));
        assert_eq!(
            item.identity(),
            ItemIdentity::File {
                bucket_name: "default".into(),
                object_name: "a.txt".into()
            }
        );
        assert_eq!(item.identity().columns(), ("default", "a.txt"));
        assert_eq!(item.status, ItemStatus::Uploaded);
    }

    #[test]
    fn test_link_identity_uses_empty_bucket() {
        let item = PipelineItem::new_link("https://example.com/doc");
        let identity = item.identity();
        assert_eq!(identity.kind(), ItemKind::Link);
        assert_eq!(identity.columns(), ("", "https://example.com/doc"));
    }

    #[test]
    fn test_owner_key_has_no_separators() {
        let item = PipelineItem::new_link("https://example.com/doc");
        let key = item.owner_key();
        assert!(!key.contains('-'));
        assert_eq!(key.len(), 32);
    }

    #[test]
    fn test_stage_timestamps() {
        let mut item = PipelineItem::new_link("https://example.com/doc");
        assert!(item.text_extractor_start.is_none());
        item.stage_started(Stage::TextExtractor);
        item.stage_finished(Stage::TextExtractor);
        assert!(item.text_extractor_start.is_some());
        assert!(item.text_extractor_end.is_some());
        assert!(item.embedding_start.is_none());
    }

    #[test]
    fn test_reset_for_retry() {
        let mut item = PipelineItem::new_file("default", "a.txt", None, None, None);
        item.status = ItemStatus::Error;
        item.chunks_total = 12;
        item.chunks_processed = 7;
        item.job_message = Some("splitter failed".into());
        item.task_id = Some("t-1".into());

        item.reset_for_retry();

        assert_eq!(item.status, ItemStatus::Uploaded);
        assert_eq!(item.chunks_total, 0);
        assert_eq!(item.chunks_processed, 0);
        assert!(item.job_message.is_none());
        assert!(item.task_id.is_none());
    }
}
