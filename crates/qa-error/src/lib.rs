use serde::{Deserialize, Serialize};
use thiserror::Error;
use tracing::{error, warn};

/// Unified error type for the document Q&A client.
#[derive(Error, Debug, Clone, Serialize, Deserialize)]
pub enum QaError {
    // === user input ===
    #[error("validation failed: {message}")]
    Validation { message: String },

    #[error("{operation} already in progress")]
    Busy { operation: String },

    // === remote operations ===
    #[error("upload failed: {message}")]
    Upload {
        message: String,
        status: Option<u16>,
    },

    #[error("chat request failed: {message}")]
    Chat {
        message: String,
        status: Option<u16>,
    },

    #[error("reset failed: {message}")]
    Reset {
        message: String,
        status: Option<u16>,
    },

    #[error("network error during {operation}: {message}")]
    Network { operation: String, message: String },

    #[error("{operation} timed out after {timeout_ms}ms")]
    Timeout { operation: String, timeout_ms: u64 },

    // === local / system ===
    #[error("serialization error ({format}): {message}")]
    Serialization { format: String, message: String },

    #[error("configuration error: {key} - {reason}")]
    Configuration { key: String, reason: String },

    #[error("io error on {path}: {message}")]
    Io { path: String, message: String },

    #[error("internal error: {message}")]
    Internal {
        message: String,
        details: Option<String>,
    },
}

/// How loudly an error should be reported.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum ErrorSeverity {
    Low,      // expected, user-correctable
    Medium,   // remote failure, session keeps working
    High,     // local malfunction
    Critical, // cannot continue without operator action
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ErrorMetadata {
    pub error_id: String,
    pub severity: ErrorSeverity,
    pub component: String,
    pub operation: Option<String>,
    pub document_id: Option<String>,
    pub generation: Option<u64>,
    pub timestamp: chrono::DateTime<chrono::Utc>,
    pub context: std::collections::HashMap<String, String>,
}

impl QaError {
    pub fn severity(&self) -> ErrorSeverity {
        match self {
            QaError::Validation { .. } | QaError::Busy { .. } => ErrorSeverity::Low,
            QaError::Upload { .. }
            | QaError::Chat { .. }
            | QaError::Reset { .. }
            | QaError::Network { .. }
            | QaError::Timeout { .. } => ErrorSeverity::Medium,
            QaError::Serialization { .. } | QaError::Io { .. } => ErrorSeverity::High,
            QaError::Configuration { .. } | QaError::Internal { .. } => ErrorSeverity::Critical,
        }
    }

    /// Whether repeating the same action may succeed.
    pub fn is_retryable(&self) -> bool {
        match self {
            QaError::Network { .. } | QaError::Timeout { .. } | QaError::Busy { .. } => true,
            QaError::Upload { status, .. }
            | QaError::Chat { status, .. }
            | QaError::Reset { status, .. } => status.map_or(true, |s| s >= 500),
            _ => false,
        }
    }

    /// HTTP status reported by the backend, if the failure came from one.
    pub fn status(&self) -> Option<u16> {
        match self {
            QaError::Upload { status, .. }
            | QaError::Chat { status, .. }
            | QaError::Reset { status, .. } => *status,
            _ => None,
        }
    }

    pub fn log(&self, metadata: &ErrorMetadata) {
        match metadata.severity {
            ErrorSeverity::Low => {
                warn!(
                    error_id = %metadata.error_id,
                    component = %metadata.component,
                    operation = ?metadata.operation,
                    error = %self,
                    "rejected user action"
                );
            }
            ErrorSeverity::Medium => {
                warn!(
                    error_id = %metadata.error_id,
                    component = %metadata.component,
                    operation = ?metadata.operation,
                    document_id = ?metadata.document_id,
                    generation = ?metadata.generation,
                    error = %self,
                    context = ?metadata.context,
                    "remote operation failed"
                );
            }
            ErrorSeverity::High | ErrorSeverity::Critical => {
                error!(
                    error_id = %metadata.error_id,
                    component = %metadata.component,
                    operation = ?metadata.operation,
                    document_id = ?metadata.document_id,
                    generation = ?metadata.generation,
                    error = %self,
                    context = ?metadata.context,
                    severity = ?metadata.severity,
                    "client error"
                );
            }
        }
    }

    /// Message suitable for showing to the person using the client.
    ///
    /// Remote failures surface the server-provided detail when there is one.
    pub fn user_message(&self) -> String {
        match self {
            QaError::Validation { message } => message.clone(),
            QaError::Busy { operation } => {
                format!("Please wait, a {} is still in progress.", operation)
            }
            QaError::Upload { message, .. } => format!("Upload failed: {}", message),
            QaError::Chat { .. } => "Failed to get response.".to_string(),
            QaError::Reset { message, .. } => format!("Reset failed: {}", message),
            QaError::Network { .. } => "Could not reach the server, please retry.".to_string(),
            QaError::Timeout { .. } => "The server took too long to respond.".to_string(),
            QaError::Io { path, .. } => format!("Could not read {}", path),
            _ => "Internal error, please check the logs.".to_string(),
        }
    }

    /// Re-tags a transport or parsing failure as the upload failure it caused.
    pub fn into_upload(self) -> QaError {
        match self {
            QaError::Upload { .. } => self,
            other => QaError::Upload {
                message: other.to_string(),
                status: None,
            },
        }
    }

    pub fn into_chat(self) -> QaError {
        match self {
            QaError::Chat { .. } => self,
            other => QaError::Chat {
                message: other.to_string(),
                status: None,
            },
        }
    }

    pub fn into_reset(self) -> QaError {
        match self {
            QaError::Reset { .. } => self,
            other => QaError::Reset {
                message: other.to_string(),
                status: None,
            },
        }
    }
}

pub struct ErrorMetadataBuilder {
    metadata: ErrorMetadata,
}

impl ErrorMetadataBuilder {
    pub fn new(component: &str) -> Self {
        Self {
            metadata: ErrorMetadata {
                error_id: uuid::Uuid::new_v4().to_string(),
                severity: ErrorSeverity::Medium,
                component: component.to_string(),
                operation: None,
                document_id: None,
                generation: None,
                timestamp: chrono::Utc::now(),
                context: std::collections::HashMap::new(),
            },
        }
    }

    pub fn operation(mut self, operation: &str) -> Self {
        self.metadata.operation = Some(operation.to_string());
        self
    }

    pub fn document_id(mut self, document_id: Option<&str>) -> Self {
        self.metadata.document_id = document_id.map(str::to_string);
        self
    }

    pub fn generation(mut self, generation: u64) -> Self {
        self.metadata.generation = Some(generation);
        self
    }

    pub fn context(mut self, key: &str, value: &str) -> Self {
        self.metadata
            .context
            .insert(key.to_string(), value.to_string());
        self
    }

    pub fn build(mut self, error: &QaError) -> ErrorMetadata {
        self.metadata.severity = error.severity();
        self.metadata
    }
}

pub type Result<T> = std::result::Result<T, QaError>;

// === conversions ===

impl From<serde_json::Error> for QaError {
    fn from(err: serde_json::Error) -> Self {
        QaError::Serialization {
            format: "json".to_string(),
            message: err.to_string(),
        }
    }
}

/// Timeouts land in `Network` here: the configured limit is only known to
/// the client that set it, which maps them to `Timeout` itself.
impl From<reqwest::Error> for QaError {
    fn from(err: reqwest::Error) -> Self {
        if err.is_connect() {
            QaError::Network {
                operation: "connect".to_string(),
                message: err.to_string(),
            }
        } else if err.is_decode() {
            QaError::Serialization {
                format: "json".to_string(),
                message: err.to_string(),
            }
        } else {
            QaError::Network {
                operation: "http_request".to_string(),
                message: err.to_string(),
            }
        }
    }
}
