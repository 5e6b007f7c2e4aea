//! Scripted backend for session tests.

use async_trait::async_trait;
use qa_client::Backend;
use qa_core::{ChatRequest, ChatResponse, ResetResponse, UploadFile, UploadResponse};
use qa_error::{QaError, Result};
use std::collections::VecDeque;
use std::sync::Mutex;

#[derive(Default)]
pub struct MockBackend {
    uploads: Mutex<VecDeque<Result<UploadResponse>>>,
    answers: Mutex<VecDeque<Result<ChatResponse>>>,
    resets: Mutex<VecDeque<Result<ResetResponse>>>,
    pub asked: Mutex<Vec<ChatRequest>>,
}

impl MockBackend {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn upload_ok(self, filename: &str, document_id: Option<&str>) -> Self {
        self.uploads.lock().unwrap().push_back(Ok(UploadResponse {
            filename: filename.to_string(),
            document_id: document_id.map(str::to_string),
            ..Default::default()
        }));
        self
    }

    pub fn upload_err(self, message: &str, status: u16) -> Self {
        self.uploads.lock().unwrap().push_back(Err(QaError::Upload {
            message: message.to_string(),
            status: Some(status),
        }));
        self
    }

    pub fn answer(self, json: serde_json::Value) -> Self {
        let resp: ChatResponse = serde_json::from_value(json).unwrap();
        self.answers.lock().unwrap().push_back(Ok(resp));
        self
    }

    pub fn chat_err(self, status: u16) -> Self {
        self.answers.lock().unwrap().push_back(Err(QaError::Chat {
            message: "Failed to generate answer.".to_string(),
            status: Some(status),
        }));
        self
    }

    pub fn reset_ok(self) -> Self {
        self.resets.lock().unwrap().push_back(Ok(ResetResponse {
            message: "All uploaded document metadata has been cleared.".to_string(),
        }));
        self
    }

    pub fn reset_err(self) -> Self {
        self.resets.lock().unwrap().push_back(Err(QaError::Reset {
            message: "backend unavailable".to_string(),
            status: None,
        }));
        self
    }
}

#[async_trait]
impl Backend for MockBackend {
    async fn upload(&self, _file: &UploadFile) -> Result<UploadResponse> {
        self.uploads
            .lock()
            .unwrap()
            .pop_front()
            .expect("unexpected upload call")
    }

    async fn ask(&self, request: &ChatRequest) -> Result<ChatResponse> {
        self.asked.lock().unwrap().push(request.clone());
        self.answers
            .lock()
            .unwrap()
            .pop_front()
            .expect("unexpected ask call")
    }

    async fn reset(&self) -> Result<ResetResponse> {
        self.resets
            .lock()
            .unwrap()
            .pop_front()
            .expect("unexpected reset call")
    }
}
