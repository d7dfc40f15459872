//! In-memory object store for tests and local runs

use anyhow::{anyhow, Result};
use async_trait::async_trait;
use std::collections::BTreeMap;
use std::sync::Arc;
use tokio::sync::RwLock;

use super::{ObjectMeta, ObjectStore};

#[derive(Clone)]
struct StoredObject {
    data: Vec<u8>,
    etag: String,
    content_type: Option<String>,
}

/// Bucket -> key -> object map behind a lock.
#[derive(Clone, Default)]
pub struct MemoryObjectStore {
    buckets: Arc<RwLock<BTreeMap<String, BTreeMap<String, StoredObject>>>>,
}

impl MemoryObjectStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Create an empty bucket if it does not exist.
    pub async fn create_bucket(&self, bucket: &str) {
        self.buckets
            .write()
            .await
            .entry(bucket.to_string())
            .or_default();
    }

    pub async fn put_object(
        &self,
        bucket: &str,
        key: &str,
        data: Vec<u8>,
        etag: &str,
        content_type: Option<&str>,
    ) {
        self.buckets
            .write()
            .await
            .entry(bucket.to_string())
            .or_default()
            .insert(
                key.to_string(),
                StoredObject {
                    data,
                    etag: etag.to_string(),
                    content_type: content_type.map(|s| s.to_string()),
                },
            );
    }

    pub async fn remove_object(&self, bucket: &str, key: &str) {
        if let Some(objects) = self.buckets.write().await.get_mut(bucket) {
            objects.remove(key);
        }
    }

    pub async fn remove_bucket(&self, bucket: &str) {
        self.buckets.write().await.remove(bucket);
    }
}

#[async_trait]
impl ObjectStore for MemoryObjectStore {
    async fn get_object(&self, bucket: &str, key: &str) -> Result<Vec<u8>> {
        let buckets = self.buckets.read().await;
        buckets
            .get(bucket)
            .and_then(|objects| objects.get(key))
            .map(|object| object.data.clone())
            .ok_or_else(|| anyhow!("no such object: {}/{}", bucket, key))
    }

    async fn list_buckets(&self) -> Result<Vec<String>> {
        Ok(self.buckets.read().await.keys().cloned().collect())
    }

    async fn list_objects(&self, bucket: &str) -> Result<Vec<ObjectMeta>> {
        let buckets = self.buckets.read().await;
        let objects = buckets
            .get(bucket)
            .ok_or_else(|| anyhow!("no such bucket: {}", bucket))?;

        Ok(objects
            .iter()
            .map(|(key, object)| ObjectMeta {
                key: key.clone(),
                etag: Some(object.etag.clone()),
                content_type: object.content_type.clone(),
                size: Some(object.data.len() as i64),
            })
            .collect())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_put_list_get() {
        let store = MemoryObjectStore::new();
        store
            .put_object("default", "a.txt", b"hello".to_vec(), "E1", Some("text/plain"))
            .await;

        assert_eq!(store.list_buckets().await.unwrap(), vec!["default"]);

        let listing = store.list_objects("default").await.unwrap();
        assert_eq!(listing.len(), 1);
        assert_eq!(listing[0].key, "a.txt");
        assert_eq!(listing[0].etag.as_deref(), Some("E1"));
        assert_eq!(listing[0].size, Some(5));

        let data = store.get_object("default", "a.txt").await.unwrap();
        assert_eq!(data, b"hello");
    }

    #[tokio::test]
    async fn test_missing_object_errors() {
        let store = MemoryObjectStore::new();
        store.create_bucket("default").await;
        assert!(store.get_object("default", "nope").await.is_err());
        assert!(store.list_objects("other").await.is_err());
    }
}
