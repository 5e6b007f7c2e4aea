//! Conversation history and the single in-flight question.

use qa_client::Backend;
use qa_core::{ChatRequest, ChatResponse, ChatTurn, Message, Role};
use qa_error::{ErrorMetadataBuilder, QaError, Result};
use qa_render::{DisclosureController, RenderedGroup, SourceRenderer};
use std::collections::HashMap;
use tracing::{debug, info};
use uuid::Uuid;

/// Content of the assistant message appended when a question fails.
pub const FAILURE_CONTENT: &str = "Failed to get response.";

/// A question that has been recorded and sent, awaiting its answer.
#[derive(Debug)]
pub struct PendingAsk {
    generation: u64,
    request: ChatRequest,
}

impl PendingAsk {
    pub fn request(&self) -> &ChatRequest {
        &self.request
    }
}

/// One message together with its rendered sources.
#[derive(Debug)]
pub struct MessageView<'a> {
    pub message: &'a Message,
    pub sources: Vec<RenderedGroup>,
    /// "Expand all" is on for this message; per-chunk toggles are hidden by it.
    pub expand_all: bool,
}

#[derive(Debug, Default)]
pub struct ChatSession {
    messages: Vec<Message>,
    /// Generation of the outstanding question, if any.
    in_flight: Option<u64>,
    generation: u64,
    disclosure: HashMap<Uuid, DisclosureController>,
}

impl ChatSession {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn messages(&self) -> &[Message] {
        &self.messages
    }

    pub fn is_loading(&self) -> bool {
        self.in_flight.is_some()
    }

    /// Most recent assistant message, the default target of disclosure commands.
    pub fn last_answer_id(&self) -> Option<Uuid> {
        self.messages
            .iter()
            .rev()
            .find(|m| m.role == Role::Assistant)
            .map(|m| m.id)
    }

    /// Completed, successful exchanges in conversation order.
    pub fn history(&self) -> Vec<ChatTurn> {
        let mut turns = Vec::new();
        let mut question: Option<&str> = None;
        for message in &self.messages {
            match message.role {
                Role::User => question = Some(message.content.as_str()),
                Role::Assistant => {
                    if let Some(q) = question.take() {
                        if !message.failed {
                            turns.push(ChatTurn {
                                question: q.to_string(),
                                answer: message.content.clone(),
                            });
                        }
                    }
                }
            }
        }
        turns
    }

    /// Records the user's question and builds the request for it.
    ///
    /// `None` (and no change) for blank input or while another question is
    /// still outstanding. Non-blank input is sent as typed.
    pub fn begin_send(&mut self, question: &str, document_id: Option<&str>) -> Option<PendingAsk> {
        if question.trim().is_empty() {
            debug!("blank question ignored");
            return None;
        }
        if self.in_flight.is_some() {
            debug!("question ignored while another is in flight");
            return None;
        }

        let request = ChatRequest {
            question: question.to_string(),
            chat_history: self.history(),
            document_id: document_id.map(str::to_string),
        };
        self.messages.push(Message::user(question));
        self.in_flight = Some(self.generation);
        info!(
            history = request.chat_history.len(),
            document_id = ?request.document_id,
            "question sent"
        );
        Some(PendingAsk {
            generation: self.generation,
            request,
        })
    }

    /// Appends the assistant message for `pending`: the answer, or the
    /// failure placeholder. Results issued before the last
    /// [`invalidate`](Self::invalidate) are discarded.
    pub fn complete(&mut self, pending: PendingAsk, outcome: Result<ChatResponse>) -> Option<&Message> {
        if pending.generation != self.generation {
            debug!(
                issued = pending.generation,
                current = self.generation,
                "discarding stale answer"
            );
            return None;
        }
        self.in_flight = None;

        let message = match outcome {
            Ok(resp) => {
                info!(
                    sources = resp.sources.len(),
                    processing_time = ?resp.processing_time,
                    "answer received"
                );
                Message::assistant(resp.answer, resp.sources)
            }
            Err(err) => {
                let err = err.into_chat();
                let meta = ErrorMetadataBuilder::new("chat_session")
                    .operation("ask")
                    .document_id(pending.request.document_id.as_deref())
                    .generation(pending.generation)
                    .build(&err);
                err.log(&meta);
                Message::failure(FAILURE_CONTENT)
            }
        };

        self.disclosure.insert(message.id, DisclosureController::new());
        self.messages.push(message);
        self.messages.last()
    }

    pub async fn send(
        &mut self,
        backend: &dyn Backend,
        question: &str,
        document_id: Option<&str>,
    ) -> Option<&Message> {
        let pending = self.begin_send(question, document_id)?;
        let outcome = backend.ask(pending.request()).await;
        self.complete(pending, outcome)
    }

    /// Supersedes any outstanding question. Its answer, if it ever arrives,
    /// is dropped; the history stays.
    pub fn invalidate(&mut self) {
        self.generation += 1;
        if self.in_flight.take().is_some() {
            info!(generation = self.generation, "outstanding question superseded");
        }
    }

    /// Flips one source chunk of an answer; returns whether it is now expanded.
    pub fn toggle_chunk(&mut self, message_id: Uuid, index: usize) -> Result<bool> {
        let count = self.source_count(message_id)?;
        if index >= count {
            return Err(QaError::Validation {
                message: format!("no source #{} (answer has {})", index + 1, count),
            });
        }
        Ok(self.disclosure.entry(message_id).or_default().toggle_one(index))
    }

    /// Flips "expand all" for an answer; returns the new setting.
    pub fn toggle_all_chunks(&mut self, message_id: Uuid) -> Result<bool> {
        self.source_count(message_id)?;
        Ok(self.disclosure.entry(message_id).or_default().toggle_all())
    }

    fn source_count(&self, message_id: Uuid) -> Result<usize> {
        self.messages
            .iter()
            .find(|m| m.id == message_id)
            .map(|m| m.sources.len())
            .ok_or_else(|| QaError::Validation {
                message: format!("unknown message {}", message_id),
            })
    }

    pub fn view(&self, renderer: &SourceRenderer) -> Vec<MessageView<'_>> {
        let collapsed = DisclosureController::new();
        self.messages
            .iter()
            .map(|message| {
                let disclosure = self.disclosure.get(&message.id).unwrap_or(&collapsed);
                MessageView {
                    message,
                    sources: renderer.render(&message.sources, disclosure),
                    expand_all: disclosure.expand_all(),
                }
            })
            .collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::mock::MockBackend;
    use qa_core::PageKey;
    use serde_json::json;

    #[tokio::test]
    async fn test_blank_question_is_noop() {
        let backend = MockBackend::new();
        let mut chat = ChatSession::new();
        assert!(chat.send(&backend, "   \n", None).await.is_none());
        assert!(chat.messages().is_empty());
        assert!(backend.asked.lock().unwrap().is_empty());
    }

    #[test]
    fn test_second_send_while_in_flight_is_noop() {
        let mut chat = ChatSession::new();
        let first = chat.begin_send("What was revenue?", Some("doc-1")).unwrap();
        assert!(chat.is_loading());

        assert!(chat.begin_send("What was net income?", Some("doc-1")).is_none());
        assert_eq!(chat.messages().len(), 1);

        let resp: ChatResponse = serde_json::from_value(json!({"answer": "100"})).unwrap();
        chat.complete(first, Ok(resp)).unwrap();
        assert!(!chat.is_loading());
        assert_eq!(chat.messages().len(), 2);
        assert_eq!(chat.messages()[0].role, Role::User);
        assert_eq!(chat.messages()[1].role, Role::Assistant);
    }

    #[test]
    fn test_question_is_kept_as_typed() {
        let mut chat = ChatSession::new();
        let typed = "  What was   revenue in Q3?\n";
        let pending = chat.begin_send(typed, None).unwrap();
        assert_eq!(pending.request().question, typed);
        assert_eq!(chat.messages()[0].content, typed);
    }

    #[tokio::test]
    async fn test_server_error_appends_placeholder() {
        let backend = MockBackend::new().chat_err(500);
        let mut chat = ChatSession::new();
        let reply = chat.send(&backend, "What was net income?", None).await.unwrap();
        assert!(reply.failed);
        assert_eq!(reply.content, FAILURE_CONTENT);
        assert!(reply.sources.is_empty());

        assert_eq!(chat.messages().len(), 2);
        assert!(!chat.is_loading());
    }

    #[tokio::test]
    async fn test_history_skips_failed_exchanges() {
        let backend = MockBackend::new()
            .answer(json!({"answer": "Hello"}))
            .chat_err(502)
            .answer(json!({"answer": "300"}));
        let mut chat = ChatSession::new();
        chat.send(&backend, "Hi", Some("doc-1")).await;
        chat.send(&backend, "Profit?", Some("doc-1")).await;
        chat.send(&backend, "Net income?", Some("doc-1")).await;

        let asked = backend.asked.lock().unwrap();
        assert_eq!(asked.len(), 3);
        assert!(asked[0].chat_history.is_empty());
        assert_eq!(asked[0].document_id.as_deref(), Some("doc-1"));
        let expected = vec![ChatTurn {
            question: "Hi".to_string(),
            answer: "Hello".to_string(),
        }];
        assert_eq!(asked[1].chat_history, expected);
        assert_eq!(asked[2].chat_history, expected);
        assert_eq!(chat.messages().len(), 6);
    }

    #[test]
    fn test_answer_after_invalidate_is_discarded() {
        let mut chat = ChatSession::new();
        let pending = chat.begin_send("Revenue?", Some("doc-1")).unwrap();
        chat.invalidate();
        assert!(!chat.is_loading());

        let resp: ChatResponse = serde_json::from_value(json!({"answer": "late"})).unwrap();
        assert!(chat.complete(pending, Ok(resp)).is_none());
        assert_eq!(chat.messages().len(), 1);

        // The unanswered question does not leak into the next request.
        let next = chat.begin_send("Sales?", None).unwrap();
        assert!(next.request().chat_history.is_empty());
    }

    #[tokio::test]
    async fn test_revenue_source_renders_as_highlighted_prose() {
        let backend = MockBackend::new().answer(json!({
            "answer": "X",
            "sources": [{"content": "Revenue 100  200", "page": 1}]
        }));
        let mut chat = ChatSession::new();
        chat.send(&backend, "What was revenue?", Some("doc-1")).await;

        let views = chat.view(&SourceRenderer::default());
        assert_eq!(views.len(), 2);
        assert!(views[0].sources.is_empty());

        let groups = &views[1].sources;
        assert_eq!(groups.len(), 1);
        assert_eq!(groups[0].page, PageKey::Page("1".to_string()));
        assert_eq!(groups[0].chunks.len(), 1);
        let chunk = &groups[0].chunks[0];
        assert!(!chunk.is_table);
        let marked: Vec<&str> = chunk
            .highlight_segments
            .iter()
            .filter(|s| s.is_match)
            .map(|s| s.text.as_str())
            .collect();
        assert_eq!(marked, vec!["Revenue"]);
    }

    #[tokio::test]
    async fn test_disclosure_is_kept_per_answer() {
        let long = "Turnover grew in every region. ".repeat(15);
        let backend = MockBackend::new()
            .answer(json!({"answer": "a", "sources": [long.clone(), "short"]}))
            .answer(json!({"answer": "b", "sources": [long.clone()]}));
        let mut chat = ChatSession::new();
        chat.send(&backend, "first", None).await;
        let first = chat.last_answer_id().unwrap();
        chat.send(&backend, "second", None).await;
        let second = chat.last_answer_id().unwrap();
        assert_ne!(first, second);

        assert!(chat.toggle_chunk(first, 0).unwrap());
        assert!(matches!(
            chat.toggle_chunk(first, 2),
            Err(QaError::Validation { .. })
        ));
        assert!(matches!(
            chat.toggle_chunk(Uuid::new_v4(), 0),
            Err(QaError::Validation { .. })
        ));

        let views = chat.view(&SourceRenderer::default());
        assert_eq!(views[1].sources[0].chunks[0].display_text, long);
        assert!(views[3].sources[0].chunks[0].display_text.len() < long.len());

        assert!(!views[3].expand_all);
        assert!(chat.toggle_all_chunks(second).unwrap());
        let views = chat.view(&SourceRenderer::default());
        assert!(views[3].expand_all);
        assert!(!views[1].expand_all);
        assert!(views[3].sources[0].chunks[0].is_expanded);
    }
}
