use std::time::Instant;

use anyhow::{bail, Context, Result};
use lumina_contracts::errors::{truncate_text, DesignError, DesignResult};
use lumina_contracts::wire::GenerateContentResponse;
use reqwest::blocking::{Client as HttpClient, Response as HttpResponse};
use serde_json::Value;

use crate::backend::{ContentRequest, ModelBackend, ModelKind};
use crate::config::GeminiConfig;

/// Live client for the `generateContent` REST endpoint. One instance is
/// created per process and shared by the adapters and the session manager.
pub struct GeminiClient {
    config: GeminiConfig,
    http: HttpClient,
}

impl GeminiClient {
    pub fn new(config: GeminiConfig) -> Result<Self> {
        let http = HttpClient::builder()
            .timeout(config.request_timeout)
            .build()
            .context("failed to build HTTP client")?;
        Ok(Self { config, http })
    }

    fn model_for(&self, kind: ModelKind) -> &str {
        match kind {
            ModelKind::Image => &self.config.image_model,
            ModelKind::Chat => &self.config.chat_model,
        }
    }

    fn endpoint_for_model(&self, model: &str) -> String {
        endpoint_for_model(&self.config.api_base, model)
    }

    /// Single attempt; a stalled call ends at the configured timeout.
    fn post(&self, endpoint: &str, payload: &Value) -> Result<Value> {
        let response = self
            .http
            .post(endpoint)
            .header("x-goog-api-key", &self.config.api_key)
            .timeout(self.config.request_timeout)
            .json(payload)
            .send()
            .with_context(|| format!("Gemini request failed ({endpoint})"))?;
        response_json_or_error("Gemini", response)
    }
}

impl ModelBackend for GeminiClient {
    fn name(&self) -> &str {
        "gemini"
    }

    fn generate_content(&self, request: &ContentRequest) -> DesignResult<GenerateContentResponse> {
        let model = self.model_for(request.kind);
        let endpoint = self.endpoint_for_model(model);
        let payload = request.to_payload();
        let started = Instant::now();
        tracing::debug!(
            model,
            kind = request.kind.as_str(),
            contents = request.contents.len(),
            "dispatching generateContent"
        );

        let raw = self
            .post(&endpoint, &payload)
            .map_err(|err| DesignError::service(&err))?;
        let parsed = parse_response(raw).map_err(|err| DesignError::service(&err))?;

        tracing::debug!(
            model,
            kind = request.kind.as_str(),
            candidates = parsed.candidates.len(),
            elapsed_ms = started.elapsed().as_millis() as u64,
            "generateContent finished"
        );
        Ok(parsed)
    }
}

fn endpoint_for_model(api_base: &str, model: &str) -> String {
    let trimmed = model.trim();
    let model_path = if trimmed.starts_with("models/") {
        trimmed.to_string()
    } else {
        format!("models/{trimmed}")
    };
    format!("{api_base}/{model_path}:generateContent")
}

fn response_json_or_error(provider: &str, response: HttpResponse) -> Result<Value> {
    let status = response.status();
    let code = status.as_u16();
    let body = response
        .text()
        .with_context(|| format!("{provider} response body read failed"))?;
    json_or_error(provider, code, status.is_success(), &body)
}

fn json_or_error(provider: &str, code: u16, success: bool, body: &str) -> Result<Value> {
    if !success {
        bail!(
            "{provider} request failed ({code}): {}",
            truncate_text(body, 512)
        );
    }
    serde_json::from_str(body).with_context(|| format!("{provider} returned invalid JSON payload"))
}

fn parse_response(raw: Value) -> Result<GenerateContentResponse> {
    if !raw.is_object() {
        bail!("Gemini response is not a JSON object");
    }
    serde_json::from_value(raw).context("Gemini response did not match generateContent shape")
}

#[cfg(test)]
mod tests {
    use serde_json::json;

    use super::{endpoint_for_model, json_or_error, parse_response};

    #[test]
    fn endpoint_accepts_bare_and_prefixed_models() {
        let base = "https://generativelanguage.googleapis.com/v1beta";
        assert_eq!(
            endpoint_for_model(base, "gemini-2.5-flash-image"),
            "https://generativelanguage.googleapis.com/v1beta/models/gemini-2.5-flash-image:generateContent"
        );
        assert_eq!(
            endpoint_for_model(base, " models/gemini-3-pro-preview "),
            "https://generativelanguage.googleapis.com/v1beta/models/gemini-3-pro-preview:generateContent"
        );
    }

    #[test]
    fn non_success_status_includes_code_and_body() {
        let err = json_or_error("Gemini", 429, false, "{\"error\":\"quota\"}")
            .err()
            .map(|err| err.to_string())
            .unwrap_or_default();
        assert_eq!(err, "Gemini request failed (429): {\"error\":\"quota\"}");
    }

    #[test]
    fn invalid_json_is_reported() {
        assert!(json_or_error("Gemini", 200, true, "<html>").is_err());
        assert_eq!(
            json_or_error("Gemini", 200, true, "{\"candidates\":[]}").ok(),
            Some(json!({"candidates": []}))
        );
    }

    #[test]
    fn parse_response_rejects_non_objects() -> anyhow::Result<()> {
        assert!(parse_response(json!([1, 2])).is_err());
        let parsed = parse_response(json!({
            "candidates": [{"content": {"parts": [{"text": "ok"}]}}],
            "usageMetadata": {"totalTokenCount": 12}
        }))?;
        assert_eq!(parsed.text().as_deref(), Some("ok"));
        Ok(())
    }
}
