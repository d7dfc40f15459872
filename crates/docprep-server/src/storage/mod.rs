//! Object-storage access
//!
//! The pipeline reads raw file bytes for extraction and full bucket listings
//! for reconciliation. Access goes through the [`ObjectStore`] trait so the
//! executor and reconciliation engine take the client by interface; the S3
//! implementation covers both AWS and MinIO-style deployments.

use anyhow::{Context, Result};
use async_trait::async_trait;
use aws_sdk_s3::{
    config::{Credentials, Region},
    Client,
};
use serde::Serialize;
use tracing::{debug, instrument};

pub mod config;
pub mod memory;

pub use config::StorageConfig;
pub use memory::MemoryObjectStore;

/// Listing metadata for one stored object.
///
/// `content_type` is only known from sources that report it (bucket
/// notifications do, ListObjectsV2 does not).
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ObjectMeta {
    pub key: String,
    pub etag: Option<String>,
    pub content_type: Option<String>,
    pub size: Option<i64>,
}

/// Read-side contract against the object store.
#[async_trait]
pub trait ObjectStore: Send + Sync {
    /// Fetch the raw bytes of one object.
    async fn get_object(&self, bucket: &str, key: &str) -> Result<Vec<u8>>;

    /// Names of every bucket visible to the credentials.
    async fn list_buckets(&self) -> Result<Vec<String>>;

    /// Complete listing of one bucket.
    async fn list_objects(&self, bucket: &str) -> Result<Vec<ObjectMeta>>;
}

/// S3-compatible object store.
#[derive(Clone)]
pub struct S3ObjectStore {
    client: Client,
}

impl S3ObjectStore {
    pub fn new(config: &StorageConfig) -> Self {
        let credentials = Credentials::new(
            &config.access_key,
            &config.secret_key,
            None,
            None,
            "docprep-storage",
        );

        let mut s3_config_builder = aws_sdk_s3::Config::builder()
            .credentials_provider(credentials)
            .region(Region::new(config.region.clone()))
            .force_path_style(config.path_style);

        if let Some(endpoint) = &config.endpoint {
            s3_config_builder = s3_config_builder.endpoint_url(endpoint);
        }

        let client = Client::from_conf(s3_config_builder.build());

        Self { client }
    }
}

/// S3 list responses quote etags; bucket notifications do not. Strip the
/// quotes so both sides compare equal.
pub fn normalize_etag(etag: &str) -> String {
    etag.trim_matches('"').to_string()
}

#[async_trait]
impl ObjectStore for S3ObjectStore {
    #[instrument(skip(self))]
    async fn get_object(&self, bucket: &str, key: &str) -> Result<Vec<u8>> {
        debug!("Downloading s3://{}/{}", bucket, key);

        let response = self
            .client
            .get_object()
            .bucket(bucket)
            .key(key)
            .send()
            .await
            .context(format!("Failed to download s3://{}/{}", bucket, key))?;

        let data = response
            .body
            .collect()
            .await
            .context("Failed to read object body")?
            .into_bytes()
            .to_vec();

        debug!("Downloaded {} bytes from s3://{}/{}", data.len(), bucket, key);

        Ok(data)
    }

    #[instrument(skip(self))]
    async fn list_buckets(&self) -> Result<Vec<String>> {
        let response = self
            .client
            .list_buckets()
            .send()
            .await
            .context("Failed to list buckets")?;

        let names = response
            .buckets()
            .iter()
            .filter_map(|b| b.name().map(|n| n.to_string()))
            .collect();

        Ok(names)
    }

    #[instrument(skip(self))]
    async fn list_objects(&self, bucket: &str) -> Result<Vec<ObjectMeta>> {
        let mut objects = Vec::new();
        let mut continuation: Option<String> = None;

        loop {
            let mut request = self.client.list_objects_v2().bucket(bucket);
            if let Some(token) = &continuation {
                request = request.continuation_token(token);
            }

            let response = request
                .send()
                .await
                .context(format!("Failed to list bucket '{}'", bucket))?;

            for object in response.contents() {
                let Some(key) = object.key() else { continue };
                objects.push(ObjectMeta {
                    key: key.to_string(),
                    etag: object.e_tag().map(normalize_etag),
                    content_type: None,
                    size: object.size(),
                });
            }

            match response.next_continuation_token() {
                Some(token) => continuation = Some(token.to_string()),
                None => break,
            }
        }

        debug!("Listed {} objects in bucket '{}'", objects.len(), bucket);

        Ok(objects)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_normalize_etag() {
        assert_eq!(normalize_etag("\"abc123\""), "abc123");
        assert_eq!(normalize_etag("abc123"), "abc123");
    }
}
