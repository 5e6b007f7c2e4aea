use async_trait::async_trait;
use qa_core::{
    ChatRequest, ChatResponse, DocumentsResponse, ErrorBody, MessageResponse, ResetResponse,
    UploadFile, UploadResponse,
};
use reqwest::{multipart, Client, Response};
use serde::{Deserialize, Serialize};
use std::time::Duration;
use tracing::{debug, instrument};

pub use qa_error::{QaError, Result};

/// The remote document Q&A service.
///
/// Implementations map every failure of an operation onto that operation's
/// error variant (`Upload`, `Chat`, `Reset`), carrying the server-provided
/// detail when there is one.
#[async_trait]
pub trait Backend: Send + Sync {
    async fn upload(&self, file: &UploadFile) -> Result<UploadResponse>;
    async fn ask(&self, request: &ChatRequest) -> Result<ChatResponse>;
    async fn reset(&self) -> Result<ResetResponse>;
}

// ========== HTTP (JSON + multipart) ==========

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct BackendConfig {
    #[serde(default = "default_base_url")]
    pub base_url: String, // e.g. http://localhost:8000/api
    #[serde(default = "default_timeout_secs")]
    pub timeout_secs: u64,
}

fn default_base_url() -> String {
    "http://localhost:8000/api".to_string()
}

fn default_timeout_secs() -> u64 {
    120
}

impl Default for BackendConfig {
    fn default() -> Self {
        Self {
            base_url: default_base_url(),
            timeout_secs: default_timeout_secs(),
        }
    }
}

impl BackendConfig {
    pub fn validate(&self) -> Result<()> {
        if !(self.base_url.starts_with("http://") || self.base_url.starts_with("https://")) {
            return Err(QaError::Configuration {
                key: "backend.base_url".to_string(),
                reason: format!("'{}' is not an http(s) URL", self.base_url),
            });
        }
        if self.timeout_secs == 0 {
            return Err(QaError::Configuration {
                key: "backend.timeout_secs".to_string(),
                reason: "must be > 0".to_string(),
            });
        }
        Ok(())
    }
}

#[derive(Clone)]
pub struct HttpBackend {
    http: Client,
    cfg: BackendConfig,
}

impl HttpBackend {
    pub fn new(cfg: BackendConfig) -> Result<Self> {
        cfg.validate()?;
        let http = Client::builder()
            .timeout(Duration::from_secs(cfg.timeout_secs))
            .build()
            .map_err(|e| QaError::Configuration {
                key: "backend".to_string(),
                reason: e.to_string(),
            })?;
        Ok(Self { http, cfg })
    }

    pub fn config(&self) -> &BackendConfig {
        &self.cfg
    }

    fn url(&self, path: &str) -> String {
        format!("{}{}", self.cfg.base_url.trim_end_matches('/'), path)
    }

    fn transport_error(&self, operation: &str, err: reqwest::Error) -> QaError {
        if err.is_timeout() {
            QaError::Timeout {
                operation: operation.to_string(),
                timeout_ms: self.cfg.timeout_secs * 1000,
            }
        } else {
            QaError::from(err)
        }
    }

    /// Lists documents the backend has processed.
    #[instrument(skip(self))]
    pub async fn documents(&self) -> Result<DocumentsResponse> {
        let resp = self
            .http
            .get(self.url("/documents"))
            .send()
            .await
            .map_err(|e| self.transport_error("documents", e))?;
        if !resp.status().is_success() {
            let (status, message) = failure_detail(resp, "Failed to list documents.").await;
            return Err(QaError::Network {
                operation: "documents".to_string(),
                message: format!("status={} {}", status, message),
            });
        }
        resp.json()
            .await
            .map_err(|e| self.transport_error("documents", e))
    }

    /// Liveness check against the service root.
    #[instrument(skip(self))]
    pub async fn health(&self) -> Result<MessageResponse> {
        let root = self.cfg.base_url.trim_end_matches('/');
        let root = root.strip_suffix("/api").unwrap_or(root);
        let resp = self
            .http
            .get(format!("{}/", root))
            .send()
            .await
            .map_err(|e| self.transport_error("health", e))?;
        if !resp.status().is_success() {
            return Err(QaError::Network {
                operation: "health".to_string(),
                message: format!("status={}", resp.status()),
            });
        }
        resp.json()
            .await
            .map_err(|e| self.transport_error("health", e))
    }
}

/// Reads the `{error|detail}` body of a non-2xx response.
async fn failure_detail(resp: Response, fallback: &str) -> (u16, String) {
    let status = resp.status().as_u16();
    let text = resp.text().await.unwrap_or_default();
    let message = serde_json::from_str::<ErrorBody>(&text)
        .ok()
        .and_then(ErrorBody::into_message)
        .unwrap_or_else(|| fallback.to_string());
    debug!(status, body = %text, "backend returned failure");
    (status, message)
}

#[async_trait]
impl Backend for HttpBackend {
    #[instrument(skip(self, file), fields(file = %file.name, bytes = file.data.len()))]
    async fn upload(&self, file: &UploadFile) -> Result<UploadResponse> {
        let part = multipart::Part::bytes(file.data.clone())
            .file_name(file.name.clone())
            .mime_str(&file.mime_type)
            .map_err(|e| QaError::Validation {
                message: format!("invalid MIME type '{}': {}", file.mime_type, e),
            })?;
        let form = multipart::Form::new().part("file", part);

        let resp = self
            .http
            .post(self.url("/upload"))
            .multipart(form)
            .send()
            .await
            .map_err(|e| self.transport_error("upload", e).into_upload())?;

        if !resp.status().is_success() {
            let (status, message) =
                failure_detail(resp, "Upload failed with unknown error.").await;
            return Err(QaError::Upload {
                message,
                status: Some(status),
            });
        }

        resp.json::<UploadResponse>()
            .await
            .map_err(|e| self.transport_error("upload", e).into_upload())
    }

    #[instrument(skip(self, request), fields(history = request.chat_history.len(), document_id = ?request.document_id))]
    async fn ask(&self, request: &ChatRequest) -> Result<ChatResponse> {
        let resp = self
            .http
            .post(self.url("/chat"))
            .json(request)
            .send()
            .await
            .map_err(|e| self.transport_error("chat", e).into_chat())?;

        if !resp.status().is_success() {
            let (status, message) = failure_detail(resp, "Failed to generate answer.").await;
            return Err(QaError::Chat {
                message,
                status: Some(status),
            });
        }

        resp.json::<ChatResponse>()
            .await
            .map_err(|e| self.transport_error("chat", e).into_chat())
    }

    #[instrument(skip(self))]
    async fn reset(&self) -> Result<ResetResponse> {
        let resp = self
            .http
            .post(self.url("/reset"))
            .send()
            .await
            .map_err(|e| self.transport_error("reset", e).into_reset())?;

        if !resp.status().is_success() {
            let (status, message) = failure_detail(resp, "Failed to reset on backend.").await;
            return Err(QaError::Reset {
                message,
                status: Some(status),
            });
        }

        resp.json::<ResetResponse>()
            .await
            .map_err(|e| self.transport_error("reset", e).into_reset())
    }
}
