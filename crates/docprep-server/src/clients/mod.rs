//! Downstream pipeline service clients
//!
//! One blocking call per stage, all over a shared [`reqwest::Client`] with
//! per-stage timeouts from [`ServicesConfig`]. No retry logic lives here:
//! retries are the job queue's concern.

use base64::{engine::general_purpose::STANDARD as BASE64, Engine as _};
use serde::{de::DeserializeOwned, Deserialize, Serialize};
use thiserror::Error;

use crate::config::{ServiceEndpoint, ServicesConfig};
use crate::models::ItemKind;

pub mod guard;

pub use guard::{GuardVerdict, GuardrailParams, ScannerParams};

/// Distinguished status the guard service answers with when content is
/// blocked by policy.
pub const GUARD_BLOCKED_STATUS: u16 = 466;

/// One unit of pipeline text plus its metadata, as exchanged with every
/// downstream service.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Doc {
    #[serde(default)]
    pub text: String,
    #[serde(default)]
    pub metadata: serde_json::Map<String, serde_json::Value>,
}

impl Doc {
    pub fn new(text: impl Into<String>) -> Self {
        Self {
            text: text.into(),
            metadata: serde_json::Map::new(),
        }
    }
}

/// Downstream call failure.
///
/// `Status` carries the response body (preferring its `detail` field) as the
/// message; `Transport` wraps connection-level failures.
#[derive(Error, Debug)]
pub enum ClientError {
    #[error("{service} returned {status}: {message}")]
    Status {
        service: &'static str,
        status: u16,
        message: String,
    },

    #[error("{service} request failed: {source}")]
    Transport {
        service: &'static str,
        #[source]
        source: reqwest::Error,
    },
}

impl ClientError {
    fn transport(service: &'static str, source: reqwest::Error) -> Self {
        Self::Transport { service, source }
    }
}

pub type ClientResult<T> = Result<T, ClientError>;

#[derive(Serialize)]
struct FilePayload {
    filename: String,
    data: String,
}

#[derive(Serialize)]
struct ExtractFilesRequest {
    files: Vec<FilePayload>,
    hierarchical: bool,
}

#[derive(Serialize)]
struct ExtractLinksRequest<'a> {
    links: Vec<&'a str>,
    hierarchical: bool,
}

/// Plain extraction answers in `loaded_docs`; the hierarchical shortcut
/// answers final chunks in `docs`.
#[derive(Deserialize)]
struct ExtractResponse {
    #[serde(default)]
    loaded_docs: Option<Vec<Doc>>,
    #[serde(default)]
    docs: Option<Vec<Doc>>,
}

#[derive(Serialize)]
struct LoadedDocsRequest<'a> {
    loaded_docs: &'a [Doc],
}

#[derive(Deserialize)]
struct LoadedDocsResponse {
    #[serde(default)]
    loaded_docs: Vec<Doc>,
}

#[derive(Deserialize)]
struct DocsResponse {
    #[serde(default)]
    docs: Vec<Doc>,
}

#[derive(Serialize)]
struct GuardScanRequest<'a> {
    docs: &'a [Doc],
    dataprep_guardrail_params: &'a GuardrailParams,
}

#[derive(Deserialize, Default)]
struct GuardScanResponse {
    #[serde(default)]
    docs: Option<Vec<Doc>>,
}

#[derive(Serialize)]
struct EmbedRequest<'a> {
    docs: &'a [Doc],
}

/// Clients for every downstream stage service.
///
/// Constructed once at startup and handed to the executor by reference; no
/// per-call connector caching.
#[derive(Clone)]
pub struct PipelineClients {
    http: reqwest::Client,
    config: ServicesConfig,
}

impl PipelineClients {
    pub fn new(config: ServicesConfig) -> anyhow::Result<Self> {
        let http = reqwest::Client::builder().build()?;
        Ok(Self { http, config })
    }

    /// Extract text from one uploaded file. `hierarchical` asks the extractor
    /// for its shortcut mode, whose output is already the final chunk list.
    pub async fn extract_file(
        &self,
        filename: &str,
        data: &[u8],
        hierarchical: bool,
    ) -> ClientResult<Vec<Doc>> {
        let request = ExtractFilesRequest {
            files: vec![FilePayload {
                filename: filename.to_string(),
                data: BASE64.encode(data),
            }],
            hierarchical,
        };

        let response: ExtractResponse = self
            .post_json("text_extractor", &self.config.extractor, "/extract", &request)
            .await?;

        Ok(pick_extracted(response, hierarchical))
    }

    /// Extract text from one registered link.
    pub async fn extract_link(&self, uri: &str, hierarchical: bool) -> ClientResult<Vec<Doc>> {
        let request = ExtractLinksRequest {
            links: vec![uri],
            hierarchical,
        };

        let response: ExtractResponse = self
            .post_json("text_extractor", &self.config.extractor, "/extract", &request)
            .await?;

        Ok(pick_extracted(response, hierarchical))
    }

    pub async fn compress(&self, docs: &[Doc]) -> ClientResult<Vec<Doc>> {
        let request = LoadedDocsRequest { loaded_docs: docs };
        let response: LoadedDocsResponse = self
            .post_json(
                "text_compression",
                &self.config.compressor,
                "/compress",
                &request,
            )
            .await?;
        Ok(response.loaded_docs)
    }

    pub async fn split(&self, docs: &[Doc]) -> ClientResult<Vec<Doc>> {
        let request = LoadedDocsRequest { loaded_docs: docs };
        let response: DocsResponse = self
            .post_json("text_splitter", &self.config.splitter, "/split", &request)
            .await?;
        Ok(response.docs)
    }

    /// Current guard configuration from the fingerprint service.
    pub async fn fetch_guard_params(&self) -> ClientResult<GuardrailParams> {
        const SERVICE: &str = "fingerprint";
        let endpoint = &self.config.fingerprint;
        let url = format!("{}/guardrail_params", endpoint.url);

        let response = self
            .http
            .get(&url)
            .timeout(endpoint.timeout())
            .send()
            .await
            .map_err(|e| ClientError::transport(SERVICE, e))?;

        if !response.status().is_success() {
            let status = response.status().as_u16();
            return Err(ClientError::Status {
                service: SERVICE,
                status,
                message: error_message(response).await,
            });
        }

        response
            .json()
            .await
            .map_err(|e| ClientError::transport(SERVICE, e))
    }

    /// Run the guard scan. A `466` answer is a policy verdict, not an error;
    /// every other non-2xx is a failure.
    pub async fn guard_scan(
        &self,
        docs: Vec<Doc>,
        params: &GuardrailParams,
    ) -> ClientResult<GuardVerdict> {
        const SERVICE: &str = "dpguard";
        let endpoint = &self.config.guard;
        let url = format!("{}/scan", endpoint.url);
        let request = GuardScanRequest {
            docs: &docs,
            dataprep_guardrail_params: params,
        };

        let response = self
            .http
            .post(&url)
            .timeout(endpoint.timeout())
            .json(&request)
            .send()
            .await
            .map_err(|e| ClientError::transport(SERVICE, e))?;

        let status = response.status();
        if status.as_u16() == GUARD_BLOCKED_STATUS {
            let mut reason = error_message(response).await;
            if reason.is_empty() {
                reason = "content blocked by guardrail policy".to_string();
            }
            return Ok(GuardVerdict::Blocked(reason));
        }
        if !status.is_success() {
            return Err(ClientError::Status {
                service: SERVICE,
                status: status.as_u16(),
                message: error_message(response).await,
            });
        }

        // The scanner may rewrite docs (redaction); fall back to the input
        // when the body carries none.
        let bytes = response
            .bytes()
            .await
            .map_err(|e| ClientError::transport(SERVICE, e))?;
        let scanned = if bytes.is_empty() {
            docs
        } else {
            serde_json::from_slice::<GuardScanResponse>(&bytes)
                .ok()
                .and_then(|body| body.docs)
                .unwrap_or(docs)
        };

        Ok(GuardVerdict::Clean(scanned))
    }

    /// Embed one chunk batch; the response is opaque to the pipeline and is
    /// forwarded verbatim to `ingest`.
    pub async fn embed(&self, docs: &[Doc]) -> ClientResult<serde_json::Value> {
        let request = EmbedRequest { docs };
        self.post_json("embedding", &self.config.embedder, "/embed", &request)
            .await
    }

    pub async fn ingest(&self, embeddings: &serde_json::Value) -> ClientResult<()> {
        self.post_ok("ingestion", &self.config.ingestor, "/ingest", embeddings)
            .await
    }

    /// Purge every vector-store row owned by an item.
    pub async fn delete_by_owner(&self, kind: ItemKind, owner_key: &str) -> ClientResult<()> {
        let body = match kind {
            ItemKind::File => serde_json::json!({ "file_id": owner_key }),
            ItemKind::Link => serde_json::json!({ "link_id": owner_key }),
        };
        self.post_ok("ingestion", &self.config.ingestor, "/delete", &body)
            .await
    }

    async fn post_json<Req, Resp>(
        &self,
        service: &'static str,
        endpoint: &ServiceEndpoint,
        path: &str,
        body: &Req,
    ) -> ClientResult<Resp>
    where
        Req: Serialize,
        Resp: DeserializeOwned,
    {
        let url = format!("{}{}", endpoint.url, path);
        let response = self
            .http
            .post(&url)
            .timeout(endpoint.timeout())
            .json(body)
            .send()
            .await
            .map_err(|e| ClientError::transport(service, e))?;

        if !response.status().is_success() {
            let status = response.status().as_u16();
            return Err(ClientError::Status {
                service,
                status,
                message: error_message(response).await,
            });
        }

        response
            .json()
            .await
            .map_err(|e| ClientError::transport(service, e))
    }

    async fn post_ok<Req: Serialize>(
        &self,
        service: &'static str,
        endpoint: &ServiceEndpoint,
        path: &str,
        body: &Req,
    ) -> ClientResult<()> {
        let url = format!("{}{}", endpoint.url, path);
        let response = self
            .http
            .post(&url)
            .timeout(endpoint.timeout())
            .json(body)
            .send()
            .await
            .map_err(|e| ClientError::transport(service, e))?;

        if !response.status().is_success() {
            let status = response.status().as_u16();
            return Err(ClientError::Status {
                service,
                status,
                message: error_message(response).await,
            });
        }

        Ok(())
    }
}

fn pick_extracted(response: ExtractResponse, hierarchical: bool) -> Vec<Doc> {
    let ExtractResponse { loaded_docs, docs } = response;
    if hierarchical {
        docs.or(loaded_docs).unwrap_or_default()
    } else {
        loaded_docs.or(docs).unwrap_or_default()
    }
}

/// Non-2xx bodies surface as the error message, preferring a JSON `detail`
/// field when present.
async fn error_message(response: reqwest::Response) -> String {
    let text = response.text().await.unwrap_or_default();
    if let Ok(value) = serde_json::from_str::<serde_json::Value>(&text) {
        if let Some(detail) = value.get("detail").and_then(|d| d.as_str()) {
            return detail.to_string();
        }
    }
    text
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_doc_deserializes_with_missing_metadata() {
        let doc: Doc = serde_json::from_str(r#"{"text":"hello"}"#).unwrap();
        assert_eq!(doc.text, "hello");
        assert!(doc.metadata.is_empty());
    }

    #[test]
    fn test_pick_extracted_prefers_mode_field() {
        let response = ExtractResponse {
            loaded_docs: Some(vec![Doc::new("loaded")]),
            docs: Some(vec![Doc::new("final")]),
        };
        assert_eq!(pick_extracted(response, true)[0].text, "final");

        let response = ExtractResponse {
            loaded_docs: Some(vec![Doc::new("loaded")]),
            docs: Some(vec![Doc::new("final")]),
        };
        assert_eq!(pick_extracted(response, false)[0].text, "loaded");
    }

    #[test]
    fn test_pick_extracted_falls_back_across_fields() {
        let response = ExtractResponse {
            loaded_docs: None,
            docs: Some(vec![Doc::new("only")]),
        };
        assert_eq!(pick_extracted(response, false).len(), 1);

        let response = ExtractResponse {
            loaded_docs: None,
            docs: None,
        };
        assert!(pick_extracted(response, false).is_empty());
    }

    #[test]
    fn test_client_error_display_names_service() {
        let err = ClientError::Status {
            service: "text_splitter",
            status: 500,
            message: "boom".into(),
        };
        assert_eq!(err.to_string(), "text_splitter returned 500: boom");
    }
}
