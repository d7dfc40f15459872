//! Reconciliation between live object storage and the item store.
//!
//! [`diff`] is a pure function of two snapshots and produces the corrective
//! action set; [`apply`] hands each action to a [`ReconcileOps`]
//! implementation. Preview mode is `diff` alone, sync mode is `diff` then
//! `apply`. Re-running `diff` after a full apply yields only skips.

use std::collections::{BTreeMap, HashSet};

use async_trait::async_trait;
use serde::Serialize;
use tracing::warn;
use uuid::Uuid;

use crate::models::{ItemIdentity, ItemKind, PipelineItem};
use crate::storage::{ObjectMeta, ObjectStore};

/// Live storage snapshot: bucket name to complete object listing.
pub type BucketListing = BTreeMap<String, Vec<ObjectMeta>>;

/// Corrective action for one identity.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum ReconcileAction {
    Add,
    Update,
    Delete,
    Skip,
}

/// One line of the reconciliation plan.
#[derive(Debug, Clone, Serialize)]
pub struct ReconcileEntry {
    pub action: ReconcileAction,
    pub identity: ItemIdentity,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub meta: Option<ObjectMeta>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub item_id: Option<Uuid>,
}

impl ReconcileEntry {
    fn add(identity: ItemIdentity, meta: ObjectMeta) -> Self {
        Self {
            action: ReconcileAction::Add,
            identity,
            meta: Some(meta),
            item_id: None,
        }
    }

    fn update(identity: ItemIdentity, meta: ObjectMeta, item_id: Uuid) -> Self {
        Self {
            action: ReconcileAction::Update,
            identity,
            meta: Some(meta),
            item_id: Some(item_id),
        }
    }

    fn delete(identity: ItemIdentity, item_id: Uuid) -> Self {
        Self {
            action: ReconcileAction::Delete,
            identity,
            meta: None,
            item_id: Some(item_id),
        }
    }

    fn skip(identity: ItemIdentity, item_id: Uuid) -> Self {
        Self {
            action: ReconcileAction::Skip,
            identity,
            meta: None,
            item_id: Some(item_id),
        }
    }
}

/// Action counts of a reconciliation pass.
#[derive(Debug, Default, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct SyncSummary {
    pub adds: usize,
    pub updates: usize,
    pub deletes: usize,
    pub skips: usize,
    pub failed: usize,
}

impl SyncSummary {
    /// Counts for a plan that has not been applied.
    pub fn of(entries: &[ReconcileEntry]) -> Self {
        let mut summary = Self::default();
        for entry in entries {
            match entry.action {
                ReconcileAction::Add => summary.adds += 1,
                ReconcileAction::Update => summary.updates += 1,
                ReconcileAction::Delete => summary.deletes += 1,
                ReconcileAction::Skip => summary.skips += 1,
            }
        }
        summary
    }
}

/// Collect the complete listing of every visible bucket.
pub async fn snapshot(objects: &dyn ObjectStore) -> anyhow::Result<BucketListing> {
    let mut listing = BucketListing::new();
    for bucket in objects.list_buckets().await? {
        let contents = objects.list_objects(&bucket).await?;
        listing.insert(bucket, contents);
    }
    Ok(listing)
}

/// Compute the corrective action set between a live listing and the stored
/// file items. Pure; mutates nothing.
///
/// Pass one walks every live object: unknown identity is an add, known
/// identity with changed `etag`/`size` is an update, otherwise a skip. Pass
/// two walks every stored item and marks those without a live object as
/// deletes, which also catches items whose entire bucket has vanished.
pub fn diff(live: &BucketListing, stored: &[PipelineItem]) -> Vec<ReconcileEntry> {
    let mut entries = Vec::new();

    let stored_files: Vec<&PipelineItem> = stored
        .iter()
        .filter(|item| item.kind == ItemKind::File)
        .collect();
    let stored_by_identity: BTreeMap<(&str, &str), &PipelineItem> = stored_files
        .iter()
        .map(|item| {
            (
                (item.bucket_name.as_str(), item.object_name.as_str()),
                *item,
            )
        })
        .collect();

    for (bucket, objects) in live {
        for meta in objects {
            let identity = ItemIdentity::File {
                bucket_name: bucket.clone(),
                object_name: meta.key.clone(),
            };
            match stored_by_identity.get(&(bucket.as_str(), meta.key.as_str())) {
                None => entries.push(ReconcileEntry::add(identity, meta.clone())),
                Some(item) if metadata_differs(item, meta) => {
                    entries.push(ReconcileEntry::update(identity, meta.clone(), item.id));
                }
                Some(item) => entries.push(ReconcileEntry::skip(identity, item.id)),
            }
        }
    }

    let live_keys: HashSet<(&str, &str)> = live
        .iter()
        .flat_map(|(bucket, objects)| {
            objects
                .iter()
                .map(move |meta| (bucket.as_str(), meta.key.as_str()))
        })
        .collect();
    for item in stored_files {
        let key = (item.bucket_name.as_str(), item.object_name.as_str());
        if !live_keys.contains(&key) {
            entries.push(ReconcileEntry::delete(item.identity(), item.id));
        }
    }

    entries
}

/// A stored item needs an update when the live object reports a different
/// etag or size. Fields the listing does not report are not compared.
fn metadata_differs(item: &PipelineItem, meta: &ObjectMeta) -> bool {
    let etag_differs =
        matches!(&meta.etag, Some(etag) if item.etag.as_deref() != Some(etag.as_str()));
    let size_differs = matches!(meta.size, Some(size) if item.size != Some(size));
    etag_differs || size_differs
}

/// Receiver of reconciliation actions.
#[async_trait]
pub trait ReconcileOps: Send + Sync {
    /// A live object with no stored item: register it.
    async fn add(&self, identity: &ItemIdentity, meta: &ObjectMeta) -> anyhow::Result<()>;

    /// A live object whose stored item is stale: retire and re-register.
    async fn update(
        &self,
        item_id: Uuid,
        identity: &ItemIdentity,
        meta: &ObjectMeta,
    ) -> anyhow::Result<()>;

    /// A stored item whose object is gone: remove it.
    async fn delete(&self, item_id: Uuid, identity: &ItemIdentity) -> anyhow::Result<()>;
}

/// Apply a reconciliation plan.
///
/// Failures on individual entries are logged and counted; the remaining
/// entries are still applied. The next pass picks up whatever failed.
pub async fn apply(entries: &[ReconcileEntry], ops: &dyn ReconcileOps) -> SyncSummary {
    let mut summary = SyncSummary::default();

    for entry in entries {
        let result = match entry.action {
            ReconcileAction::Skip => {
                summary.skips += 1;
                continue;
            }
            ReconcileAction::Add => match &entry.meta {
                Some(meta) => ops.add(&entry.identity, meta).await,
                None => Err(anyhow::anyhow!("add entry without object metadata")),
            },
            ReconcileAction::Update => match (&entry.meta, entry.item_id) {
                (Some(meta), Some(item_id)) => ops.update(item_id, &entry.identity, meta).await,
                _ => Err(anyhow::anyhow!("update entry without metadata or item id")),
            },
            ReconcileAction::Delete => match entry.item_id {
                Some(item_id) => ops.delete(item_id, &entry.identity).await,
                None => Err(anyhow::anyhow!("delete entry without item id")),
            },
        };

        match result {
            Ok(()) => match entry.action {
                ReconcileAction::Add => summary.adds += 1,
                ReconcileAction::Update => summary.updates += 1,
                ReconcileAction::Delete => summary.deletes += 1,
                ReconcileAction::Skip => {}
            },
            Err(err) => {
                warn!(
                    action = ?entry.action,
                    identity = %entry.identity,
                    error = %err,
                    "reconcile action failed"
                );
                summary.failed += 1;
            }
        }
    }

    summary
}

#[cfg(test)]
mod tests {
    use super::*;

    fn meta(key: &str, etag: &str, size: i64) -> ObjectMeta {
        ObjectMeta {
            key: key.to_string(),
            etag: Some(etag.to_string()),
            content_type: None,
            size: Some(size),
        }
    }

    fn stored_file(bucket: &str, key: &str, etag: &str, size: i64) -> PipelineItem {
        PipelineItem::new_file(bucket, key, Some(etag.to_string()), None, Some(size))
    }

    #[test]
    fn test_diff_classifies_all_four_actions() {
        let mut live = BucketListing::new();
        live.insert(
            "default".to_string(),
            vec![
                meta("new.txt", "e-new", 1),
                meta("changed.txt", "e-after", 2),
                meta("same.txt", "e-same", 3),
            ],
        );
        let stored = vec![
            stored_file("default", "changed.txt", "e-before", 2),
            stored_file("default", "same.txt", "e-same", 3),
            stored_file("default", "gone.txt", "e-gone", 4),
        ];

        let entries = diff(&live, &stored);
        let summary = SyncSummary::of(&entries);

        assert_eq!(summary.adds, 1);
        assert_eq!(summary.updates, 1);
        assert_eq!(summary.skips, 1);
        assert_eq!(summary.deletes, 1);

        let added: Vec<_> = entries
            .iter()
            .filter(|e| e.action == ReconcileAction::Add)
            .collect();
        assert_eq!(
            added[0].identity,
            ItemIdentity::File {
                bucket_name: "default".to_string(),
                object_name: "new.txt".to_string(),
            }
        );
    }

    #[test]
    fn test_size_change_alone_is_an_update() {
        let mut live = BucketListing::new();
        live.insert("b".to_string(), vec![meta("a.txt", "e1", 20)]);
        let stored = vec![stored_file("b", "a.txt", "e1", 10)];

        let entries = diff(&live, &stored);
        assert_eq!(entries.len(), 1);
        assert_eq!(entries[0].action, ReconcileAction::Update);
    }

    #[test]
    fn test_vanished_bucket_deletes_its_items() {
        let mut live = BucketListing::new();
        live.insert("kept".to_string(), vec![meta("a.txt", "e1", 1)]);
        let stored = vec![
            stored_file("kept", "a.txt", "e1", 1),
            stored_file("dropped", "b.txt", "e2", 2),
            stored_file("dropped", "c.txt", "e3", 3),
        ];

        let summary = SyncSummary::of(&diff(&live, &stored));
        assert_eq!(summary.deletes, 2);
        assert_eq!(summary.skips, 1);
        assert_eq!(summary.adds, 0);
    }

    #[test]
    fn test_unreported_fields_do_not_trigger_updates() {
        let mut live = BucketListing::new();
        live.insert(
            "b".to_string(),
            vec![ObjectMeta {
                key: "a.txt".to_string(),
                etag: None,
                content_type: None,
                size: None,
            }],
        );
        let stored = vec![stored_file("b", "a.txt", "e1", 10)];

        let entries = diff(&live, &stored);
        assert_eq!(entries[0].action, ReconcileAction::Skip);
    }

    #[test]
    fn test_link_items_are_ignored() {
        let live = BucketListing::new();
        let stored = vec![PipelineItem::new_link("https://example.com/doc")];

        assert!(diff(&live, &stored).is_empty());
    }

    #[test]
    fn test_diff_reaches_fixpoint_after_apply() {
        let mut live = BucketListing::new();
        live.insert(
            "b".to_string(),
            vec![meta("a.txt", "e1", 1), meta("b.txt", "e2", 2)],
        );
        let stored = vec![
            stored_file("b", "a.txt", "stale", 1),
            stored_file("b", "gone.txt", "e9", 9),
        ];

        // Model the store state after a full apply: adds and updates mirror
        // the live metadata, deletes drop the row.
        let mut applied: Vec<PipelineItem> = Vec::new();
        for entry in diff(&live, &stored) {
            match (entry.action, &entry.identity, &entry.meta) {
                (
                    ReconcileAction::Add | ReconcileAction::Update,
                    ItemIdentity::File {
                        bucket_name,
                        object_name,
                    },
                    Some(meta),
                ) => applied.push(PipelineItem::new_file(
                    bucket_name.clone(),
                    object_name.clone(),
                    meta.etag.clone(),
                    meta.content_type.clone(),
                    meta.size,
                )),
                (ReconcileAction::Skip, ItemIdentity::File { .. }, _) => {
                    if let Some(item) = stored.iter().find(|i| i.identity() == entry.identity) {
                        applied.push(item.clone());
                    }
                }
                _ => {}
            }
        }

        let second = diff(&live, &applied);
        assert!(second.iter().all(|e| e.action == ReconcileAction::Skip));
        assert_eq!(second.len(), 2);
    }
}
