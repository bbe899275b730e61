//! Typed shapes of the `generateContent` REST payloads.
//!
//! Every field is optional on the way in so that any response deserializes;
//! unknown part fields (thought signatures and the like) are kept so model
//! turns can be replayed verbatim into a conversation's history.

use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

use crate::images::ImagePayload;

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Content {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub role: Option<String>,
    #[serde(default)]
    pub parts: Vec<Part>,
}

impl Content {
    pub fn user(parts: Vec<Part>) -> Self {
        Self {
            role: Some("user".to_string()),
            parts,
        }
    }

    pub fn model(parts: Vec<Part>) -> Self {
        Self {
            role: Some("model".to_string()),
            parts,
        }
    }
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Part {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub text: Option<String>,
    #[serde(
        default,
        alias = "inline_data",
        skip_serializing_if = "Option::is_none"
    )]
    pub inline_data: Option<InlineData>,
    #[serde(
        default,
        alias = "function_call",
        skip_serializing_if = "Option::is_none"
    )]
    pub function_call: Option<FunctionCall>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub function_response: Option<FunctionResponse>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub thought: Option<bool>,
    #[serde(flatten)]
    pub extra: Map<String, Value>,
}

impl Part {
    pub fn text(text: impl Into<String>) -> Self {
        Self {
            text: Some(text.into()),
            ..Self::default()
        }
    }

    pub fn image(payload: &ImagePayload) -> Self {
        Self {
            inline_data: Some(InlineData {
                mime_type: Some(payload.mime.as_mime().to_string()),
                data: payload.stripped().to_string(),
            }),
            ..Self::default()
        }
    }

    pub fn function_call(name: impl Into<String>, args: Value) -> Self {
        Self {
            function_call: Some(FunctionCall {
                name: name.into(),
                args,
                id: None,
            }),
            ..Self::default()
        }
    }

    pub fn function_response(call: &FunctionCall, response: Value) -> Self {
        Self {
            function_response: Some(FunctionResponse {
                name: call.name.clone(),
                id: call.id.clone(),
                response,
            }),
            ..Self::default()
        }
    }

    fn is_thought(&self) -> bool {
        self.thought.unwrap_or(false)
    }
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct InlineData {
    #[serde(default, alias = "mime_type", skip_serializing_if = "Option::is_none")]
    pub mime_type: Option<String>,
    #[serde(default)]
    pub data: String,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct FunctionCall {
    #[serde(default)]
    pub name: String,
    #[serde(default)]
    pub args: Value,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub id: Option<String>,
}

impl FunctionCall {
    pub fn string_arg(&self, key: &str) -> Option<&str> {
        self.args.get(key).and_then(Value::as_str)
    }
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct FunctionResponse {
    pub name: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub id: Option<String>,
    pub response: Value,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct GenerateContentResponse {
    #[serde(default)]
    pub candidates: Vec<Candidate>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub usage_metadata: Option<Value>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub prompt_feedback: Option<Value>,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Candidate {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub content: Option<Content>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub grounding_metadata: Option<GroundingMetadata>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub finish_reason: Option<String>,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct GroundingMetadata {
    #[serde(default)]
    pub grounding_chunks: Vec<GroundingChunk>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub web_search_queries: Vec<String>,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct GroundingChunk {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub web: Option<WebSource>,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct WebSource {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub uri: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub title: Option<String>,
}

impl GenerateContentResponse {
    /// A response holding only `text`, used for locally synthesized replies.
    pub fn from_text(text: impl Into<String>) -> Self {
        Self {
            candidates: vec![Candidate {
                content: Some(Content::model(vec![Part::text(text)])),
                ..Candidate::default()
            }],
            ..Self::default()
        }
    }

    pub fn first_candidate(&self) -> Option<&Candidate> {
        self.candidates.first()
    }

    pub fn first_content(&self) -> Option<&Content> {
        self.first_candidate()
            .and_then(|candidate| candidate.content.as_ref())
    }

    /// Concatenated non-thought text of the first candidate, `None` when empty.
    pub fn text(&self) -> Option<String> {
        let content = self.first_content()?;
        let text: String = content
            .parts
            .iter()
            .filter(|part| !part.is_thought())
            .filter_map(|part| part.text.as_deref())
            .collect();
        if text.trim().is_empty() {
            None
        } else {
            Some(text)
        }
    }

    pub fn function_calls(&self) -> impl Iterator<Item = &FunctionCall> {
        self.first_content()
            .into_iter()
            .flat_map(|content| content.parts.iter())
            .filter_map(|part| part.function_call.as_ref())
    }

    pub fn grounding_chunks(&self) -> &[GroundingChunk] {
        self.first_candidate()
            .and_then(|candidate| candidate.grounding_metadata.as_ref())
            .map(|metadata| metadata.grounding_chunks.as_slice())
            .unwrap_or(&[])
    }

    /// Every non-empty inline image across all candidates, in order.
    pub fn inline_images(&self) -> Vec<&InlineData> {
        self.candidates
            .iter()
            .filter_map(|candidate| candidate.content.as_ref())
            .flat_map(|content| content.parts.iter())
            .filter_map(|part| part.inline_data.as_ref())
            .filter(|inline| !inline.data.is_empty())
            .collect()
    }
}

#[cfg(test)]
mod tests {
    use serde_json::json;

    use crate::images::ImagePayload;

    use super::{Content, GenerateContentResponse, Part};

    #[test]
    fn parses_sparse_and_snake_case_payloads() -> anyhow::Result<()> {
        let empty: GenerateContentResponse = serde_json::from_value(json!({}))?;
        assert!(empty.candidates.is_empty());
        assert!(empty.text().is_none());

        let snake: GenerateContentResponse = serde_json::from_value(json!({
            "candidates": [{
                "content": {"parts": [{"inline_data": {"mime_type": "image/png", "data": "QUJD"}}]}
            }]
        }))?;
        let images = snake.inline_images();
        assert_eq!(images.len(), 1);
        assert_eq!(images[0].mime_type.as_deref(), Some("image/png"));
        Ok(())
    }

    #[test]
    fn text_skips_thought_parts() -> anyhow::Result<()> {
        let response: GenerateContentResponse = serde_json::from_value(json!({
            "candidates": [{
                "content": {"role": "model", "parts": [
                    {"text": "planning...", "thought": true},
                    {"text": "Try a "},
                    {"text": "jute rug."}
                ]}
            }]
        }))?;
        assert_eq!(response.text().as_deref(), Some("Try a jute rug."));
        Ok(())
    }

    #[test]
    fn unknown_part_fields_survive_a_round_trip() -> anyhow::Result<()> {
        let raw = json!({
            "role": "model",
            "parts": [{
                "functionCall": {"name": "editImage", "args": {"prompt": "green sofa"}},
                "thoughtSignature": "c2lnbmF0dXJl"
            }]
        });
        let content: Content = serde_json::from_value(raw.clone())?;
        assert_eq!(
            content.parts[0].extra.get("thoughtSignature"),
            Some(&json!("c2lnbmF0dXJl"))
        );
        assert_eq!(serde_json::to_value(&content)?, raw);
        Ok(())
    }

    #[test]
    fn outbound_parts_use_camel_case() -> anyhow::Result<()> {
        let payload = ImagePayload::from_data_uri("data:image/png;base64,QUJD")?;
        let content = Content::user(vec![Part::text("hi"), Part::image(&payload)]);
        assert_eq!(
            serde_json::to_value(&content)?,
            json!({
                "role": "user",
                "parts": [
                    {"text": "hi"},
                    {"inlineData": {"mimeType": "image/png", "data": "QUJD"}}
                ]
            })
        );
        Ok(())
    }

    #[test]
    fn function_response_echoes_call_identity() -> anyhow::Result<()> {
        let call = Part::function_call("editImage", json!({"prompt": "x"}))
            .function_call
            .unwrap_or_default();
        let part = Part::function_response(&call, json!({"status": "applied"}));
        assert_eq!(
            serde_json::to_value(&part)?,
            json!({"functionResponse": {"name": "editImage", "response": {"status": "applied"}}})
        );
        Ok(())
    }
}
