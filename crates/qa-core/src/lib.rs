use chrono::{DateTime, NaiveDateTime, Utc};
use serde::{Deserialize, Deserializer, Serialize};
use serde_json::{Map, Value};
use std::fmt;
use uuid::Uuid;

pub use qa_error::{QaError as Error, Result};

/// The only MIME type the upload flow accepts.
pub const PDF_MIME: &str = "application/pdf";

/// Keys probed, in order, for a source's text when the backend sends an object.
const CONTENT_KEYS: [&str; 4] = ["content", "chunk", "page_content", "text"];

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Role {
    User,
    Assistant,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Message {
    pub id: Uuid,
    pub role: Role,
    pub content: String,
    #[serde(default)]
    pub sources: Vec<SourceChunk>,
    /// Set on the placeholder appended when an ask fails.
    #[serde(default)]
    pub failed: bool,
    pub created_at: DateTime<Utc>,
}

impl Message {
    pub fn user(content: impl Into<String>) -> Self {
        Self::new(Role::User, content.into(), Vec::new(), false)
    }

    pub fn assistant(content: impl Into<String>, sources: Vec<SourceChunk>) -> Self {
        Self::new(Role::Assistant, content.into(), sources, false)
    }

    pub fn failure(content: impl Into<String>) -> Self {
        Self::new(Role::Assistant, content.into(), Vec::new(), true)
    }

    fn new(role: Role, content: String, sources: Vec<SourceChunk>, failed: bool) -> Self {
        Self {
            id: Uuid::new_v4(),
            role,
            content,
            sources,
            failed,
            created_at: Utc::now(),
        }
    }
}

/// A retrieved fragment of the source document, normalised at the boundary.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(try_from = "Value")]
pub struct SourceChunk {
    pub content: String,
    pub page: Option<String>,
    pub metadata: Map<String, Value>,
}

impl SourceChunk {
    pub fn new(content: impl Into<String>) -> Self {
        Self {
            content: content.into(),
            page: None,
            metadata: Map::new(),
        }
    }

    pub fn with_page(mut self, page: impl Into<String>) -> Self {
        self.page = Some(page.into());
        self
    }

    pub fn with_metadata(mut self, key: &str, value: Value) -> Self {
        self.metadata.insert(key.to_string(), value);
        self
    }

    /// Translates one backend source entry into the fixed chunk shape.
    ///
    /// Accepts a bare string or an object carrying its text under `content`,
    /// `chunk`, `page_content` or `text`. Returns `None` when no text is found.
    pub fn from_value(value: Value) -> Option<SourceChunk> {
        match value {
            Value::String(content) if !content.trim().is_empty() => Some(SourceChunk::new(content)),
            Value::Object(mut obj) => {
                let content = CONTENT_KEYS.iter().find_map(|key| {
                    obj.get(*key)
                        .and_then(Value::as_str)
                        .filter(|s| !s.trim().is_empty())
                        .map(str::to_string)
                })?;
                let page = obj.get("page").and_then(page_from_value);
                let metadata = match obj.remove("metadata") {
                    Some(Value::Object(map)) => map,
                    _ => Map::new(),
                };
                Some(SourceChunk {
                    content,
                    page,
                    metadata,
                })
            }
            _ => None,
        }
    }

    /// Page used for grouping: `page`, then `metadata.page`, then
    /// `metadata.page_number`, else [`PageKey::Unknown`].
    pub fn effective_page(&self) -> PageKey {
        self.page
            .clone()
            .or_else(|| self.metadata.get("page").and_then(page_from_value))
            .or_else(|| self.metadata.get("page_number").and_then(page_from_value))
            .map(PageKey::Page)
            .unwrap_or(PageKey::Unknown)
    }
}

impl TryFrom<Value> for SourceChunk {
    type Error = String;

    fn try_from(value: Value) -> std::result::Result<Self, Self::Error> {
        SourceChunk::from_value(value).ok_or_else(|| "source entry carries no text".to_string())
    }
}

/// Normalises a page identifier. Negative numbers are the backend's
/// "no page" marker and count as absent.
fn page_from_value(value: &Value) -> Option<String> {
    match value {
        Value::Number(n) => {
            if let Some(i) = n.as_i64() {
                (i >= 0).then(|| i.to_string())
            } else if let Some(f) = n.as_f64() {
                if f < 0.0 {
                    None
                } else if f.fract() == 0.0 {
                    Some(format!("{}", f as i64))
                } else {
                    Some(n.to_string())
                }
            } else {
                None
            }
        }
        Value::String(s) if !s.trim().is_empty() => Some(s.trim().to_string()),
        _ => None,
    }
}

fn id_from_value(value: &Value) -> Option<String> {
    match value {
        Value::String(s) if !s.trim().is_empty() => Some(s.trim().to_string()),
        Value::Number(n) => Some(n.to_string()),
        _ => None,
    }
}

fn de_opt_id<'de, D>(deserializer: D) -> std::result::Result<Option<String>, D::Error>
where
    D: Deserializer<'de>,
{
    let value = Option::<Value>::deserialize(deserializer)?;
    Ok(value.as_ref().and_then(id_from_value))
}

#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub enum PageKey {
    Page(String),
    Unknown,
}

impl fmt::Display for PageKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            PageKey::Page(p) => write!(f, "Page {}", p),
            PageKey::Unknown => write!(f, "Unknown page"),
        }
    }
}

// ========== Upload state ==========

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum UploadPhase {
    #[default]
    Idle,
    Selected,
    Uploading,
    Succeeded,
    Failed,
}

impl fmt::Display for UploadPhase {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            UploadPhase::Idle => "idle",
            UploadPhase::Selected => "selected",
            UploadPhase::Uploading => "uploading",
            UploadPhase::Succeeded => "succeeded",
            UploadPhase::Failed => "failed",
        };
        f.write_str(s)
    }
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct UploadState {
    pub phase: UploadPhase,
    pub file_name: Option<String>,
    pub document_id: Option<String>,
    pub last_error: Option<String>,
}

/// A file picked by the user, held in memory until it is submitted.
#[derive(Clone)]
pub struct UploadFile {
    pub name: String,
    pub mime_type: String,
    pub data: Vec<u8>,
}

impl UploadFile {
    pub fn new(name: impl Into<String>, mime_type: impl Into<String>, data: Vec<u8>) -> Self {
        Self {
            name: name.into(),
            mime_type: mime_type.into(),
            data,
        }
    }

    pub fn is_pdf(&self) -> bool {
        self.mime_type == PDF_MIME
    }
}

impl fmt::Debug for UploadFile {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("UploadFile")
            .field("name", &self.name)
            .field("mime_type", &self.mime_type)
            .field("len", &self.data.len())
            .finish()
    }
}

// ========== Wire types ==========

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct UploadResponse {
    #[serde(default)]
    pub filename: String,
    #[serde(
        rename = "documentId",
        alias = "document_id",
        default,
        deserialize_with = "de_opt_id",
        skip_serializing_if = "Option::is_none"
    )]
    pub document_id: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub message: Option<String>,
    #[serde(alias = "chunksCount", default, skip_serializing_if = "Option::is_none")]
    pub chunks_count: Option<u64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub processing_time: Option<f64>,
}

/// One prior question/answer exchange sent along with a new question.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ChatTurn {
    pub question: String,
    pub answer: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ChatRequest {
    pub question: String,
    #[serde(rename = "chatHistory", default)]
    pub chat_history: Vec<ChatTurn>,
    #[serde(rename = "documentId", skip_serializing_if = "Option::is_none")]
    pub document_id: Option<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(from = "RawChatResponse")]
pub struct ChatResponse {
    pub answer: String,
    pub sources: Vec<SourceChunk>,
    pub processing_time: Option<f64>,
}

#[derive(Deserialize)]
struct RawChatResponse {
    answer: String,
    #[serde(default)]
    sources: Option<Vec<Value>>,
    #[serde(default)]
    processing_time: Option<f64>,
}

impl From<RawChatResponse> for ChatResponse {
    fn from(raw: RawChatResponse) -> Self {
        let sources = raw
            .sources
            .unwrap_or_default()
            .into_iter()
            .filter_map(SourceChunk::from_value)
            .collect();
        Self {
            answer: raw.answer,
            sources,
            processing_time: raw.processing_time,
        }
    }
}

/// `{message}` body returned by reset and the health check.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct MessageResponse {
    #[serde(default)]
    pub message: String,
}

pub type ResetResponse = MessageResponse;

/// Non-2xx body: `{error}` or FastAPI-style `{detail}`.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct ErrorBody {
    #[serde(default)]
    pub error: Option<String>,
    #[serde(default)]
    pub detail: Option<Value>,
}

impl ErrorBody {
    pub fn into_message(self) -> Option<String> {
        if let Some(e) = self.error.filter(|e| !e.trim().is_empty()) {
            return Some(e);
        }
        match self.detail? {
            Value::String(s) if !s.trim().is_empty() => Some(s),
            Value::Null => None,
            other => Some(other.to_string()),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DocumentInfo {
    pub filename: String,
    #[serde(default)]
    pub upload_date: Option<NaiveDateTime>,
    #[serde(default)]
    pub chunks_count: u64,
    #[serde(default)]
    pub status: String,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct DocumentsResponse {
    #[serde(default)]
    pub documents: Vec<DocumentInfo>,
}
