use crate::chat::{ChatSession, MessageView, PendingAsk};
use crate::upload::{PendingReset, PendingUpload, UploadReceipt, UploadSession};
use qa_client::Backend;
use qa_core::{ChatResponse, Message, ResetResponse, UploadFile, UploadResponse};
use qa_error::{QaError, Result};
use qa_render::SourceRenderer;
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use tracing::debug;

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct SessionConfig {
    /// Refuse questions until a document is bound. Off by default: the
    /// backend decides whether document-less questions make sense.
    #[serde(default)]
    pub require_document: bool,
}

/// One user's conversation: the bound document, the chat and how its
/// sources are rendered. All mutation goes through here.
pub struct Workspace {
    backend: Arc<dyn Backend>,
    config: SessionConfig,
    upload: UploadSession,
    chat: ChatSession,
    renderer: SourceRenderer,
}

impl Workspace {
    pub fn new(backend: Arc<dyn Backend>, config: SessionConfig, renderer: SourceRenderer) -> Self {
        Self {
            backend,
            config,
            upload: UploadSession::new(),
            chat: ChatSession::new(),
            renderer,
        }
    }

    pub fn backend(&self) -> Arc<dyn Backend> {
        Arc::clone(&self.backend)
    }

    pub fn config(&self) -> &SessionConfig {
        &self.config
    }

    pub fn upload_session(&self) -> &UploadSession {
        &self.upload
    }

    pub fn chat(&self) -> &ChatSession {
        &self.chat
    }

    pub fn chat_mut(&mut self) -> &mut ChatSession {
        &mut self.chat
    }

    pub fn renderer(&self) -> &SourceRenderer {
        &self.renderer
    }

    pub fn select_file(&mut self, file: UploadFile) -> Result<()> {
        self.upload.select(file)
    }

    pub fn begin_upload(&mut self) -> Option<PendingUpload> {
        self.upload.begin_submit()
    }

    pub fn complete_upload(
        &mut self,
        pending: PendingUpload,
        outcome: Result<UploadResponse>,
    ) -> Option<Result<UploadReceipt>> {
        self.upload.complete_submit(pending, outcome)
    }

    pub async fn upload(&mut self) -> Result<Option<UploadReceipt>> {
        let backend = self.backend();
        self.upload.submit(backend.as_ref()).await
    }

    /// Starts a question against the currently bound document.
    ///
    /// `Ok(None)` when the chat ignores it (blank or already loading).
    pub fn begin_ask(&mut self, question: &str) -> Result<Option<PendingAsk>> {
        if self.config.require_document
            && self.upload.document_id().is_none()
            && !question.trim().is_empty()
        {
            return Err(QaError::Validation {
                message: "Please upload a PDF document first.".to_string(),
            });
        }
        Ok(self.chat.begin_send(question, self.upload.document_id()))
    }

    pub fn complete_ask(&mut self, pending: PendingAsk, outcome: Result<ChatResponse>) -> Option<&Message> {
        self.chat.complete(pending, outcome)
    }

    pub async fn ask(&mut self, question: &str) -> Result<Option<&Message>> {
        let Some(pending) = self.begin_ask(question)? else {
            return Ok(None);
        };
        let outcome = self.backend.ask(pending.request()).await;
        Ok(self.chat.complete(pending, outcome))
    }

    /// Unbinds the document locally at once and supersedes every
    /// outstanding call. The conversation itself is kept. `Busy` while a
    /// previous reset has not come back.
    pub fn begin_reset(&mut self) -> Result<PendingReset> {
        let pending = self.upload.begin_reset()?;
        debug!("workspace reset");
        self.chat.invalidate();
        Ok(pending)
    }

    pub fn complete_reset(
        &mut self,
        pending: PendingReset,
        outcome: Result<ResetResponse>,
    ) -> Result<ResetResponse> {
        self.upload.complete_reset(pending, outcome)
    }

    pub async fn reset(&mut self) -> Result<ResetResponse> {
        let pending = self.begin_reset()?;
        let outcome = self.backend.reset().await;
        self.complete_reset(pending, outcome)
    }

    /// No question, upload or reset is waiting on the backend.
    pub fn is_idle(&self) -> bool {
        !self.chat.is_loading() && !self.upload.is_busy() && !self.upload.is_resetting()
    }

    pub fn view(&self) -> Vec<MessageView<'_>> {
        self.chat.view(&self.renderer)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::mock::MockBackend;
    use qa_core::{UploadPhase, PDF_MIME};
    use serde_json::json;

    fn workspace(backend: MockBackend, require_document: bool) -> (Workspace, Arc<MockBackend>) {
        let backend = Arc::new(backend);
        let ws = Workspace::new(
            backend.clone(),
            SessionConfig { require_document },
            SourceRenderer::default(),
        );
        (ws, backend)
    }

    fn pdf() -> UploadFile {
        UploadFile::new("report.pdf", PDF_MIME, b"%PDF-1.5".to_vec())
    }

    #[tokio::test]
    async fn test_question_carries_bound_document() {
        let (mut ws, backend) = workspace(
            MockBackend::new()
                .upload_ok("report.pdf", Some("doc-1"))
                .answer(json!({"answer": "Net income was 300."})),
            false,
        );
        ws.select_file(pdf()).unwrap();
        ws.upload().await.unwrap();
        let reply = ws.ask("What was net income?").await.unwrap().unwrap();
        assert_eq!(reply.content, "Net income was 300.");

        let asked = backend.asked.lock().unwrap();
        assert_eq!(asked[0].document_id.as_deref(), Some("doc-1"));
    }

    #[tokio::test]
    async fn test_documentless_question_allowed_by_default() {
        let (mut ws, backend) = workspace(MockBackend::new().answer(json!({"answer": "ok"})), false);
        assert!(ws.ask("Hello?").await.unwrap().is_some());
        assert_eq!(backend.asked.lock().unwrap()[0].document_id, None);
    }

    #[tokio::test]
    async fn test_require_document_rejects_before_appending() {
        let (mut ws, backend) = workspace(MockBackend::new(), true);
        let err = ws.ask("What was revenue?").await.unwrap_err();
        assert!(matches!(err, QaError::Validation { .. }));
        assert!(ws.chat().messages().is_empty());
        assert!(backend.asked.lock().unwrap().is_empty());
        // Blank input stays a silent no-op.
        assert!(ws.ask("  ").await.unwrap().is_none());
    }

    #[tokio::test]
    async fn test_reset_supersedes_outstanding_question() {
        let (mut ws, _backend) = workspace(
            MockBackend::new()
                .upload_ok("report.pdf", Some("doc-1"))
                .reset_ok(),
            false,
        );
        ws.select_file(pdf()).unwrap();
        ws.upload().await.unwrap();

        let pending = ws.begin_ask("What was turnover?").unwrap().unwrap();
        assert!(ws.chat().is_loading());

        ws.reset().await.unwrap();
        assert!(!ws.chat().is_loading());
        assert_eq!(ws.upload_session().phase(), UploadPhase::Idle);
        assert_eq!(ws.upload_session().document_id(), None);

        let late: ChatResponse = serde_json::from_value(json!({"answer": "late"})).unwrap();
        assert!(ws.complete_ask(pending, Ok(late)).is_none());
        assert_eq!(ws.chat().messages().len(), 1);
    }

    #[test]
    fn test_reset_is_single_flight() {
        let (mut ws, _backend) = workspace(MockBackend::new(), false);
        let pending_ask = ws.begin_ask("Revenue?").unwrap().unwrap();
        let first = ws.begin_reset().unwrap();
        assert!(!ws.chat().is_loading());

        // The second reset is refused without touching anything.
        let err = ws.begin_reset().unwrap_err();
        assert!(matches!(err, QaError::Busy { .. }));

        let err = ws
            .complete_reset(
                first,
                Err(QaError::Reset {
                    message: "maintenance".to_string(),
                    status: Some(503),
                }),
            )
            .unwrap_err();
        assert!(matches!(err, QaError::Reset { status: Some(503), .. }));
        assert_eq!(
            ws.upload_session().state().last_error.as_deref(),
            Some("Reset failed: maintenance")
        );

        let late: ChatResponse = serde_json::from_value(json!({"answer": "late"})).unwrap();
        assert!(ws.complete_ask(pending_ask, Ok(late)).is_none());
        assert!(ws.begin_reset().is_ok());
    }

    #[test]
    fn test_idle_tracks_every_outstanding_call() {
        let (mut ws, _backend) = workspace(MockBackend::new(), false);
        assert!(ws.is_idle());

        let ask = ws.begin_ask("Profit?").unwrap().unwrap();
        assert!(!ws.is_idle());
        let resp: ChatResponse = serde_json::from_value(json!({"answer": "12"})).unwrap();
        ws.complete_ask(ask, Ok(resp));
        assert!(ws.is_idle());

        ws.select_file(pdf()).unwrap();
        let upload = ws.begin_upload().unwrap();
        assert!(!ws.is_idle());
        ws.complete_upload(
            upload,
            Err(QaError::Upload {
                message: "bad pdf".to_string(),
                status: Some(400),
            }),
        );
        assert!(ws.is_idle());

        let reset = ws.begin_reset().unwrap();
        assert!(!ws.is_idle());
        ws.complete_reset(reset, Ok(ResetResponse::default())).unwrap();
        assert!(ws.is_idle());
    }

    #[tokio::test]
    async fn test_reset_failure_surfaces_error() {
        let (mut ws, _backend) = workspace(MockBackend::new().reset_err(), false);
        let err = ws.reset().await.unwrap_err();
        assert!(matches!(err, QaError::Reset { .. }));
        assert_eq!(ws.upload_session().phase(), UploadPhase::Idle);
        assert!(ws.upload_session().state().last_error.is_some());
    }
}
