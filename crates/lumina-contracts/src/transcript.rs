//! The user-facing chat log. Append-only; the only in-place change is
//! swapping a placeholder turn for its real outcome.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct TurnId(Uuid);

impl TurnId {
    fn new() -> Self {
        Self(Uuid::new_v4())
    }
}

impl std::fmt::Display for TurnId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        self.0.fmt(f)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ChatRole {
    User,
    Assistant,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Citation {
    pub title: String,
    pub url: String,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ChatTurn {
    pub id: TurnId,
    pub role: ChatRole,
    pub text: String,
    pub created_at: DateTime<Utc>,
    #[serde(default, skip_serializing_if = "std::ops::Not::not")]
    pub is_error: bool,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub citations: Vec<Citation>,
    #[serde(default, skip_serializing_if = "std::ops::Not::not")]
    pub placeholder: bool,
}

impl ChatTurn {
    fn new(role: ChatRole, text: impl Into<String>) -> Self {
        Self {
            id: TurnId::new(),
            role,
            text: text.into(),
            created_at: Utc::now(),
            is_error: false,
            citations: Vec::new(),
            placeholder: false,
        }
    }

    pub fn user(text: impl Into<String>) -> Self {
        Self::new(ChatRole::User, text)
    }

    pub fn assistant(text: impl Into<String>) -> Self {
        Self::new(ChatRole::Assistant, text)
    }

    pub fn assistant_error(text: impl Into<String>) -> Self {
        let mut turn = Self::new(ChatRole::Assistant, text);
        turn.is_error = true;
        turn
    }

    pub fn with_citations(mut self, citations: Vec<Citation>) -> Self {
        self.citations = citations;
        self
    }
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Transcript {
    turns: Vec<ChatTurn>,
}

impl Transcript {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn push(&mut self, turn: ChatTurn) -> &ChatTurn {
        self.turns.push(turn);
        &self.turns[self.turns.len() - 1]
    }

    /// Appends a transient assistant turn and returns its id.
    pub fn push_placeholder(&mut self, text: impl Into<String>) -> TurnId {
        let mut turn = ChatTurn::assistant(text);
        turn.placeholder = true;
        let id = turn.id;
        self.turns.push(turn);
        id
    }

    /// Removes the placeholder `id` and appends `turn` at the end. Returns
    /// false when no placeholder with that id exists; `turn` is appended
    /// either way.
    pub fn resolve_placeholder(&mut self, id: TurnId, turn: ChatTurn) -> bool {
        let before = self.turns.len();
        self.turns
            .retain(|existing| !(existing.placeholder && existing.id == id));
        let removed = self.turns.len() != before;
        self.turns.push(turn);
        removed
    }

    pub fn turns(&self) -> &[ChatTurn] {
        &self.turns
    }

    pub fn last(&self) -> Option<&ChatTurn> {
        self.turns.last()
    }

    pub fn len(&self) -> usize {
        self.turns.len()
    }

    pub fn is_empty(&self) -> bool {
        self.turns.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use serde_json::{json, Value};

    use super::{ChatRole, ChatTurn, Citation, Transcript};

    #[test]
    fn push_keeps_insertion_order() {
        let mut transcript = Transcript::new();
        transcript.push(ChatTurn::user("hello"));
        transcript.push(ChatTurn::assistant("hi"));
        let texts: Vec<&str> = transcript.turns().iter().map(|t| t.text.as_str()).collect();
        assert_eq!(texts, vec!["hello", "hi"]);
        assert_eq!(transcript.turns()[0].role, ChatRole::User);
    }

    #[test]
    fn placeholder_is_replaced_by_reference() {
        let mut transcript = Transcript::new();
        transcript.push(ChatTurn::user("make the sofa green"));
        let placeholder = transcript.push_placeholder("Applying your changes...");
        transcript.push(ChatTurn::assistant("style applied meanwhile"));

        assert!(transcript.resolve_placeholder(placeholder, ChatTurn::assistant("done")));
        let texts: Vec<&str> = transcript.turns().iter().map(|t| t.text.as_str()).collect();
        assert_eq!(texts, vec!["make the sofa green", "style applied meanwhile", "done"]);
        assert!(transcript.turns().iter().all(|turn| !turn.placeholder));
    }

    #[test]
    fn resolve_ignores_non_placeholder_ids() {
        let mut transcript = Transcript::new();
        let id = transcript.push(ChatTurn::assistant("real answer")).id;
        assert!(!transcript.resolve_placeholder(id, ChatTurn::assistant("other")));
        assert_eq!(transcript.len(), 2);
    }

    #[test]
    fn serialized_turn_omits_empty_optionals() -> anyhow::Result<()> {
        let plain = serde_json::to_value(ChatTurn::assistant("hi"))?;
        assert!(plain.get("is_error").is_none());
        assert!(plain.get("citations").is_none());
        assert_eq!(plain["role"], json!("assistant"));

        let cited = ChatTurn::assistant_error("oops").with_citations(vec![Citation {
            title: "Source".to_string(),
            url: "https://example.com".to_string(),
        }]);
        let value = serde_json::to_value(&cited)?;
        assert_eq!(value["is_error"], Value::Bool(true));
        assert_eq!(value["citations"][0]["url"], json!("https://example.com"));

        let back: ChatTurn = serde_json::from_value(value)?;
        assert_eq!(back, cited);
        Ok(())
    }
}
