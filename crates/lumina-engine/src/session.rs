//! Conversational session manager.
//!
//! A session is a stateful dialogue with the reasoning model. It keeps its own
//! history of contents, which is not the same thing as the user-facing
//! transcript. Turns on one session are strictly sequential: `send_turn` takes
//! the session by `&mut`.

use std::sync::Arc;

use lumina_contracts::chat::{EDIT_IMAGE_FUNCTION, EDIT_PROMPT_ARG};
use lumina_contracts::images::ImagePayload;
use lumina_contracts::wire::{Content, FunctionCall, GenerateContentResponse, Part};
use serde_json::{json, Value};
use uuid::Uuid;

use crate::backend::{ContentRequest, ModelBackend};

pub const SYSTEM_DIRECTIVE: &str = "You are an expert Interior Design Consultant.
Your goal is to help users redesign their rooms.

- If the user wants to change the look of the room visually (e.g. \"change color\", \"add furniture\", \"remove object\"), call the 'editImage' function.
- If the user asks for shopping advice, trends, or general questions, use Google Search to provide answers with links.
- Be concise, helpful, and encouraging.
- When using Search, ALWAYS list the source URLs clearly.";

pub const SERVICE_UNAVAILABLE_TEXT: &str =
    "Sorry, I'm having trouble connecting to the design service right now.";

pub fn edit_image_declaration() -> Value {
    json!({
        "name": EDIT_IMAGE_FUNCTION,
        "description": "Edits the current room image based on visual instructions (e.g., change rug color, move sofa). Call this when the user wants to visually modify the design.",
        "parameters": {
            "type": "OBJECT",
            "properties": {
                EDIT_PROMPT_ARG: {
                    "type": "STRING",
                    "description": "The specific instruction for editing the image (e.g., \"make the walls blue\")."
                }
            },
            "required": [EDIT_PROMPT_ARG]
        }
    })
}

/// Edit capability plus backend-side web search (no declared parameters).
pub fn session_tools() -> Vec<Value> {
    vec![
        json!({ "functionDeclarations": [edit_image_declaration()] }),
        json!({ "googleSearch": {} }),
    ]
}

/// What happened to an edit the model asked for, reported back to it on the
/// next turn.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum EditReport {
    Applied,
    Failed,
    Skipped,
}

impl EditReport {
    fn response(self) -> Value {
        match self {
            Self::Applied => json!({ "status": "applied" }),
            Self::Failed => json!({ "status": "failed" }),
            Self::Skipped => json!({
                "status": "skipped",
                "reason": "another render was already in progress",
            }),
        }
    }
}

#[derive(Debug, Clone)]
struct PendingCall {
    call: FunctionCall,
    response: Value,
}

#[derive(Debug, Clone)]
pub struct ConversationSession {
    id: Uuid,
    history: Vec<Content>,
    pending: Vec<PendingCall>,
    turns: u64,
}

impl ConversationSession {
    fn new() -> Self {
        Self {
            id: Uuid::new_v4(),
            history: Vec::new(),
            pending: Vec::new(),
            turns: 0,
        }
    }

    pub fn id(&self) -> Uuid {
        self.id
    }

    pub fn history(&self) -> &[Content] {
        &self.history
    }

    /// Completed exchanges; failed sends are not counted.
    pub fn turn_count(&self) -> u64 {
        self.turns
    }

    pub fn has_pending_calls(&self) -> bool {
        !self.pending.is_empty()
    }

    /// Records the outcome of the edit requested in the previous reply.
    pub fn report_edit(&mut self, report: EditReport) {
        for pending in self
            .pending
            .iter_mut()
            .filter(|pending| pending.call.name == EDIT_IMAGE_FUNCTION)
        {
            pending.response = report.response();
        }
    }

    fn record_calls(&mut self, response: &GenerateContentResponse) {
        self.pending = response
            .function_calls()
            .map(|call| PendingCall {
                call: call.clone(),
                response: if call.name == EDIT_IMAGE_FUNCTION {
                    json!({ "status": "dispatched" })
                } else {
                    json!({ "error": format!("unsupported function '{}'", call.name) })
                },
            })
            .collect();
    }

    fn pending_responses(&self) -> Option<Content> {
        if self.pending.is_empty() {
            return None;
        }
        Some(Content::user(
            self.pending
                .iter()
                .map(|pending| Part::function_response(&pending.call, pending.response.clone()))
                .collect(),
        ))
    }
}

/// Opens sessions and runs turns against the shared backend.
#[derive(Clone)]
pub struct SessionManager {
    backend: Arc<dyn ModelBackend>,
}

impl SessionManager {
    pub fn new(backend: Arc<dyn ModelBackend>) -> Self {
        Self { backend }
    }

    pub fn create_session(&self) -> ConversationSession {
        let session = ConversationSession::new();
        tracing::debug!(session = %session.id, backend = self.backend.name(), "conversation opened");
        session
    }

    /// Sends one user turn. Never fails: a transport or service error yields a
    /// locally built reply carrying [`SERVICE_UNAVAILABLE_TEXT`], and the
    /// session history is left as it was before the call.
    pub fn send_turn(
        &self,
        session: &mut ConversationSession,
        text: &str,
        image_context: Option<&ImagePayload>,
    ) -> GenerateContentResponse {
        let mut parts = vec![Part::text(text)];
        if let Some(image) = image_context {
            parts.push(Part::image(image));
        }
        let mut outgoing = Vec::with_capacity(2);
        if let Some(responses) = session.pending_responses() {
            outgoing.push(responses);
        }
        outgoing.push(Content::user(parts));

        let mut contents = session.history.clone();
        contents.extend(outgoing.iter().cloned());
        let request = ContentRequest::chat(contents, SYSTEM_DIRECTIVE, session_tools());

        match self.backend.generate_content(&request) {
            Ok(response) => {
                // History only ever holds complete user/model exchanges.
                let Some(content) = response.first_content() else {
                    tracing::warn!(session = %session.id, "reply carried no content");
                    return response;
                };
                let mut content = content.clone();
                content.role = Some("model".to_string());
                session.history.extend(outgoing);
                session.history.push(content);
                session.record_calls(&response);
                session.turns += 1;
                response
            }
            Err(err) => {
                tracing::warn!(session = %session.id, error = %err, "chat turn failed");
                GenerateContentResponse::from_text(SERVICE_UNAVAILABLE_TEXT)
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use std::collections::VecDeque;
    use std::sync::{Arc, Mutex};

    use lumina_contracts::chat::{classify_response, AnswerResult, TurnOutcome};
    use lumina_contracts::errors::{DesignError, DesignResult};
    use lumina_contracts::images::ImagePayload;
    use lumina_contracts::wire::GenerateContentResponse;
    use serde_json::{json, Value};

    use super::{EditReport, SessionManager, SERVICE_UNAVAILABLE_TEXT, SYSTEM_DIRECTIVE};
    use crate::backend::{ContentRequest, ModelBackend, ModelKind};

    #[derive(Default)]
    struct Scripted {
        replies: Mutex<VecDeque<DesignResult<Value>>>,
        seen: Mutex<Vec<Value>>,
    }

    impl Scripted {
        fn with(replies: Vec<DesignResult<Value>>) -> Arc<Self> {
            Arc::new(Self {
                replies: Mutex::new(replies.into()),
                seen: Mutex::new(Vec::new()),
            })
        }

        fn payload(&self, idx: usize) -> Value {
            self.seen.lock().unwrap()[idx].clone()
        }
    }

    impl ModelBackend for Scripted {
        fn name(&self) -> &str {
            "scripted"
        }

        fn generate_content(
            &self,
            request: &ContentRequest,
        ) -> DesignResult<GenerateContentResponse> {
            assert_eq!(request.kind, ModelKind::Chat);
            self.seen.lock().unwrap().push(request.to_payload());
            let next = self
                .replies
                .lock()
                .unwrap()
                .pop_front()
                .unwrap_or_else(|| Ok(json!({})));
            next.map(|raw| serde_json::from_value(raw).unwrap_or_default())
        }
    }

    fn text_reply(text: &str) -> DesignResult<Value> {
        Ok(json!({"candidates": [{"content": {"role": "model", "parts": [{"text": text}]}}]}))
    }

    fn edit_reply(prompt: &str) -> DesignResult<Value> {
        Ok(json!({"candidates": [{"content": {"role": "model", "parts": [
            {"functionCall": {"name": "editImage", "args": {"prompt": prompt}, "id": "call-1"}}
        ]}}]}))
    }

    #[test]
    fn request_declares_tools_and_directive() {
        let backend = Scripted::with(vec![text_reply("hello")]);
        let manager = SessionManager::new(backend.clone());
        let mut session = manager.create_session();
        manager.send_turn(&mut session, "hi", None);

        let payload = backend.payload(0);
        assert_eq!(payload["systemInstruction"]["parts"][0]["text"], json!(SYSTEM_DIRECTIVE));
        let declaration = &payload["tools"][0]["functionDeclarations"][0];
        assert_eq!(declaration["name"], json!("editImage"));
        assert_eq!(declaration["parameters"]["required"], json!(["prompt"]));
        assert_eq!(
            declaration["parameters"]["properties"]["prompt"]["type"],
            json!("STRING")
        );
        assert_eq!(payload["tools"][1], json!({"googleSearch": {}}));
    }

    #[test]
    fn image_context_is_attached_without_prefix() {
        let backend = Scripted::with(vec![text_reply("nice room")]);
        let manager = SessionManager::new(backend.clone());
        let mut session = manager.create_session();
        let image = ImagePayload::from_data_uri("data:image/webp;base64,V0VCUA==").unwrap();
        manager.send_turn(&mut session, "what do you think?", Some(&image));

        let parts = backend.payload(0)["contents"][0]["parts"].clone();
        assert_eq!(
            parts,
            json!([
                {"text": "what do you think?"},
                {"inlineData": {"mimeType": "image/webp", "data": "V0VCUA=="}}
            ])
        );
    }

    #[test]
    fn history_accumulates_across_turns() {
        let backend = Scripted::with(vec![text_reply("first"), text_reply("second")]);
        let manager = SessionManager::new(backend.clone());
        let mut session = manager.create_session();
        manager.send_turn(&mut session, "one", None);
        manager.send_turn(&mut session, "two", None);

        assert_eq!(session.turn_count(), 2);
        assert_eq!(session.history().len(), 4);
        let contents = backend.payload(1)["contents"].clone();
        assert_eq!(contents.as_array().map(Vec::len), Some(3));
        assert_eq!(contents[1]["role"], json!("model"));
        assert_eq!(contents[2]["parts"][0]["text"], json!("two"));
    }

    #[test]
    fn failure_returns_sentinel_and_keeps_history() {
        let backend = Scripted::with(vec![
            text_reply("first"),
            Err(DesignError::Service("connection refused".to_string())),
        ]);
        let manager = SessionManager::new(backend);
        let mut session = manager.create_session();
        manager.send_turn(&mut session, "one", None);
        let reply = manager.send_turn(&mut session, "two", None);

        assert_eq!(
            classify_response(&reply),
            TurnOutcome::Answer(AnswerResult {
                text: SERVICE_UNAVAILABLE_TEXT.to_string(),
                citations: Vec::new(),
            })
        );
        assert_eq!(session.turn_count(), 1);
        assert_eq!(session.history().len(), 2);
    }

    #[test]
    fn edit_outcome_is_reported_on_next_turn() {
        let backend = Scripted::with(vec![edit_reply("make the sofa green"), text_reply("great")]);
        let manager = SessionManager::new(backend.clone());
        let mut session = manager.create_session();

        let reply = manager.send_turn(&mut session, "make the sofa green", None);
        assert_eq!(classify_response(&reply).edit_prompt(), Some("make the sofa green"));
        assert!(session.has_pending_calls());

        session.report_edit(EditReport::Applied);
        manager.send_turn(&mut session, "thanks", None);
        assert!(!session.has_pending_calls());

        let contents = backend.payload(1)["contents"].clone();
        assert_eq!(
            contents[2],
            json!({"role": "user", "parts": [{"functionResponse": {
                "name": "editImage",
                "id": "call-1",
                "response": {"status": "applied"}
            }}]})
        );
        assert_eq!(contents[3]["parts"][0]["text"], json!("thanks"));
    }

    #[test]
    fn blocked_reply_leaves_history_alternating() {
        let backend = Scripted::with(vec![
            Ok(json!({"promptFeedback": {"blockReason": "SAFETY"}})),
            text_reply("here you go"),
        ]);
        let manager = SessionManager::new(backend.clone());
        let mut session = manager.create_session();

        let blocked = manager.send_turn(&mut session, "something odd", None);
        assert!(blocked.first_content().is_none());
        assert!(session.history().is_empty());
        assert_eq!(session.turn_count(), 0);

        manager.send_turn(&mut session, "show me a green sofa", None);
        let contents = backend.payload(1)["contents"].clone();
        assert_eq!(contents.as_array().map(Vec::len), Some(1));
        let roles: Vec<Option<&str>> = session
            .history()
            .iter()
            .map(|content| content.role.as_deref())
            .collect();
        assert_eq!(roles, vec![Some("user"), Some("model")]);
    }

    #[test]
    fn new_sessions_are_independent() {
        let manager = SessionManager::new(Scripted::with(vec![text_reply("a")]));
        let mut first = manager.create_session();
        manager.send_turn(&mut first, "hello", None);
        let second = manager.create_session();
        assert_ne!(first.id(), second.id());
        assert!(second.history().is_empty());
    }
}
