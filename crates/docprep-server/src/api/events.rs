//! Bucket notification webhook.
//!
//! The object store posts S3-style notifications here on every object
//! create/overwrite/remove. Creation events register the object for
//! processing; removal events retire the matching item. Records with an
//! event name outside those two families answer 501 so misconfigured
//! notification targets are visible instead of silently acked.

use axum::extract::State;
use axum::Json;
use serde::Deserialize;
use serde_json::{json, Value};
use tracing::{info, warn};

use super::AppState;
use crate::error::{ApiResult, AppError};

#[derive(Debug, Deserialize)]
pub struct BucketNotification {
    #[serde(rename = "Records", default)]
    pub records: Vec<EventRecord>,
}

#[derive(Debug, Deserialize)]
pub struct EventRecord {
    #[serde(rename = "eventName")]
    pub event_name: String,
    pub s3: S3Entity,
}

#[derive(Debug, Deserialize)]
pub struct S3Entity {
    pub bucket: BucketRef,
    pub object: ObjectRef,
}

#[derive(Debug, Deserialize)]
pub struct BucketRef {
    pub name: String,
}

#[derive(Debug, Deserialize)]
pub struct ObjectRef {
    pub key: String,
    #[serde(rename = "eTag", default)]
    pub etag: Option<String>,
    #[serde(rename = "contentType", default)]
    pub content_type: Option<String>,
    #[serde(default)]
    pub size: Option<i64>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum EventKind {
    Created,
    Removed,
}

/// Event names look like `s3:ObjectCreated:Put` or `s3:ObjectRemoved:Delete`;
/// only the family matters.
fn classify(event_name: &str) -> Option<EventKind> {
    if event_name.contains("ObjectCreated") {
        Some(EventKind::Created)
    } else if event_name.contains("ObjectRemoved") {
        Some(EventKind::Removed)
    } else {
        None
    }
}

pub async fn minio_event(
    State(state): State<AppState>,
    Json(notification): Json<BucketNotification>,
) -> ApiResult<Json<Value>> {
    let mut handled = 0usize;

    for record in notification.records {
        let Some(kind) = classify(&record.event_name) else {
            warn!(event = %record.event_name, "unrecognized bucket event");
            continue;
        };

        let bucket = record.s3.bucket.name;
        let object = record.s3.object;
        info!(event = %record.event_name, bucket = %bucket, key = %object.key, "bucket event");

        match kind {
            EventKind::Created => {
                state
                    .service
                    .object_created(
                        &bucket,
                        &object.key,
                        object.etag,
                        object.content_type,
                        object.size,
                    )
                    .await?;
            }
            EventKind::Removed => {
                state.service.object_removed(&bucket, &object.key).await?;
            }
        }
        handled += 1;
    }

    if handled == 0 {
        return Err(AppError::Unsupported(
            "no record matched a supported bucket event".to_string(),
        ));
    }

    Ok(Json(json!({
        "message": format!("processed {} event record(s)", handled)
    })))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_classify_event_families() {
        assert_eq!(classify("s3:ObjectCreated:Put"), Some(EventKind::Created));
        assert_eq!(
            classify("s3:ObjectCreated:CompleteMultipartUpload"),
            Some(EventKind::Created)
        );
        assert_eq!(
            classify("s3:ObjectRemoved:Delete"),
            Some(EventKind::Removed)
        );
        assert_eq!(classify("s3:ObjectAccessed:Get"), None);
    }

    #[test]
    fn test_notification_deserializes() {
        let payload = json!({
            "Records": [{
                "eventName": "s3:ObjectCreated:Put",
                "s3": {
                    "bucket": { "name": "default" },
                    "object": {
                        "key": "docs/report.pdf",
                        "eTag": "9a0364b9e99bb480dd25e1f0284c8555",
                        "contentType": "application/pdf",
                        "size": 4096
                    }
                }
            }]
        });

        let parsed: BucketNotification =
            serde_json::from_value(payload).expect("payload should deserialize");
        assert_eq!(parsed.records.len(), 1);
        let record = &parsed.records[0];
        assert_eq!(record.s3.bucket.name, "default");
        assert_eq!(record.s3.object.key, "docs/report.pdf");
        assert_eq!(record.s3.object.size, Some(4096));
    }

    #[test]
    fn test_minimal_removal_record_deserializes() {
        let payload = json!({
            "Records": [{
                "eventName": "s3:ObjectRemoved:Delete",
                "s3": {
                    "bucket": { "name": "default" },
                    "object": { "key": "gone.txt" }
                }
            }]
        });

        let parsed: BucketNotification =
            serde_json::from_value(payload).expect("payload should deserialize");
        assert_eq!(parsed.records[0].s3.object.etag, None);
    }
}
