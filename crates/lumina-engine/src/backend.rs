use lumina_contracts::errors::DesignResult;
use lumina_contracts::images::ImagePayload;
use lumina_contracts::wire::{Content, GenerateContentResponse, Part};
use serde_json::{json, Value};

/// Which of the backend's models a request is meant for.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ModelKind {
    Image,
    Chat,
}

impl ModelKind {
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Image => "image",
            Self::Chat => "chat",
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct ContentRequest {
    pub kind: ModelKind,
    pub contents: Vec<Content>,
    pub system_instruction: Option<String>,
    pub tools: Vec<Value>,
    pub response_modalities: Vec<String>,
}

impl ContentRequest {
    /// One instruction plus one image attachment, answered with an image.
    pub fn image(instruction: &str, source: &ImagePayload) -> Self {
        Self {
            kind: ModelKind::Image,
            contents: vec![Content::user(vec![
                Part::text(instruction),
                Part::image(source),
            ])],
            system_instruction: None,
            tools: Vec::new(),
            response_modalities: vec!["IMAGE".to_string()],
        }
    }

    pub fn chat(contents: Vec<Content>, system_instruction: &str, tools: Vec<Value>) -> Self {
        Self {
            kind: ModelKind::Chat,
            contents,
            system_instruction: Some(system_instruction.to_string()),
            tools,
            response_modalities: Vec::new(),
        }
    }

    /// The JSON body of a `generateContent` call.
    pub fn to_payload(&self) -> Value {
        let mut payload = json!({ "contents": self.contents });
        if let Some(instruction) = self.system_instruction.as_deref() {
            payload["systemInstruction"] = json!({ "parts": [{ "text": instruction }] });
        }
        if !self.tools.is_empty() {
            payload["tools"] = Value::Array(self.tools.clone());
        }
        if !self.response_modalities.is_empty() {
            payload["generationConfig"] = json!({
                "responseModalities": self.response_modalities,
            });
        }
        payload
    }

    /// Text of the newest user content, used by offline backends and logs.
    pub fn last_user_text(&self) -> Option<String> {
        let content = self
            .contents
            .iter()
            .rev()
            .find(|content| {
                content.role.as_deref() == Some("user")
                    && content.parts.iter().any(|part| part.text.is_some())
            })?;
        let text: String = content
            .parts
            .iter()
            .filter_map(|part| part.text.as_deref())
            .collect();
        Some(text)
    }

    pub fn last_user_image(&self) -> Option<ImagePayload> {
        self.contents
            .iter()
            .rev()
            .filter(|content| content.role.as_deref() == Some("user"))
            .flat_map(|content| content.parts.iter())
            .find_map(|part| part.inline_data.as_ref())
            .and_then(|inline| {
                let mime = inline.mime_type.as_deref().unwrap_or("image/jpeg");
                let marker = mime.strip_prefix("image/").unwrap_or("jpeg");
                ImagePayload::from_data_uri(&format!("data:image/{marker};base64,{}", inline.data))
                    .ok()
            })
    }
}

/// The capability provider every adapter and the session manager talk to.
/// Implementations: the live Gemini client, the offline dryrun backend, and
/// test doubles.
pub trait ModelBackend: Send + Sync {
    fn name(&self) -> &str;
    fn generate_content(&self, request: &ContentRequest) -> DesignResult<GenerateContentResponse>;
}

#[cfg(test)]
mod tests {
    use lumina_contracts::images::{ImageMime, ImagePayload};
    use lumina_contracts::wire::{Content, Part};
    use serde_json::json;

    use super::{ContentRequest, ModelKind};

    #[test]
    fn image_request_payload_shape() {
        let source = ImagePayload::new(ImageMime::Png, "QUJD");
        let request = ContentRequest::image("Redesign this room", &source);
        assert_eq!(request.kind, ModelKind::Image);
        assert_eq!(
            request.to_payload(),
            json!({
                "contents": [{
                    "role": "user",
                    "parts": [
                        {"text": "Redesign this room"},
                        {"inlineData": {"mimeType": "image/png", "data": "QUJD"}}
                    ]
                }],
                "generationConfig": {"responseModalities": ["IMAGE"]}
            })
        );
    }

    #[test]
    fn chat_request_payload_carries_directive_and_tools() {
        let request = ContentRequest::chat(
            vec![Content::user(vec![Part::text("hi")])],
            "be helpful",
            vec![json!({"googleSearch": {}})],
        );
        let payload = request.to_payload();
        assert_eq!(payload["systemInstruction"]["parts"][0]["text"], json!("be helpful"));
        assert_eq!(payload["tools"], json!([{"googleSearch": {}}]));
        assert!(payload.get("generationConfig").is_none());
    }

    #[test]
    fn last_user_text_and_image_read_newest_turn() {
        let first = ImagePayload::new(ImageMime::Png, "Zmlyc3Q=");
        let second = ImagePayload::new(ImageMime::Jpeg, "c2Vjb25k");
        let request = ContentRequest::chat(
            vec![
                Content::user(vec![Part::text("old"), Part::image(&first)]),
                Content::model(vec![Part::text("reply")]),
                Content::user(vec![Part::text("new"), Part::image(&second)]),
            ],
            "",
            Vec::new(),
        );
        assert_eq!(request.last_user_text().as_deref(), Some("new"));
        assert_eq!(request.last_user_image(), Some(second));
    }
}
