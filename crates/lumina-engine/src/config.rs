use std::env;
use std::time::Duration;

use anyhow::{bail, Result};

pub const DEFAULT_API_BASE: &str = "https://generativelanguage.googleapis.com/v1beta";
pub const DEFAULT_IMAGE_MODEL: &str = "gemini-2.5-flash-image";
pub const DEFAULT_CHAT_MODEL: &str = "gemini-3-pro-preview";
pub const DEFAULT_REQUEST_TIMEOUT_S: f64 = 90.0;
const MIN_REQUEST_TIMEOUT_S: f64 = 15.0;
const MAX_REQUEST_TIMEOUT_S: f64 = 300.0;

/// Connection settings for the generative backend. Built once at startup and
/// handed to the client; nothing reads the environment after that.
#[derive(Clone)]
pub struct GeminiConfig {
    pub api_key: String,
    pub api_base: String,
    pub image_model: String,
    pub chat_model: String,
    pub request_timeout: Duration,
}

impl std::fmt::Debug for GeminiConfig {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("GeminiConfig")
            .field("api_key", &"<redacted>")
            .field("api_base", &self.api_base)
            .field("image_model", &self.image_model)
            .field("chat_model", &self.chat_model)
            .field("request_timeout", &self.request_timeout)
            .finish()
    }
}

impl GeminiConfig {
    pub fn new(api_key: impl Into<String>) -> Self {
        Self {
            api_key: api_key.into(),
            api_base: DEFAULT_API_BASE.to_string(),
            image_model: DEFAULT_IMAGE_MODEL.to_string(),
            chat_model: DEFAULT_CHAT_MODEL.to_string(),
            request_timeout: Duration::from_secs_f64(DEFAULT_REQUEST_TIMEOUT_S),
        }
    }

    /// Reads `GEMINI_API_KEY` (or `GOOGLE_API_KEY`), `GEMINI_API_BASE`,
    /// `LUMINA_IMAGE_MODEL`, `LUMINA_CHAT_MODEL` and `LUMINA_REQUEST_TIMEOUT`.
    pub fn from_env() -> Result<Self> {
        let Some(api_key) =
            non_empty_env("GEMINI_API_KEY").or_else(|| non_empty_env("GOOGLE_API_KEY"))
        else {
            bail!("GEMINI_API_KEY or GOOGLE_API_KEY not set (use --dryrun to work offline)");
        };
        let mut config = Self::new(api_key);
        if let Some(base) = non_empty_env("GEMINI_API_BASE") {
            config.api_base = normalize_api_base(&base);
        }
        if let Some(model) = non_empty_env("LUMINA_IMAGE_MODEL") {
            config.image_model = model;
        }
        if let Some(model) = non_empty_env("LUMINA_CHAT_MODEL") {
            config.chat_model = model;
        }
        config.request_timeout =
            parse_timeout(non_empty_env("LUMINA_REQUEST_TIMEOUT").as_deref());
        Ok(config)
    }

    pub fn with_image_model(mut self, model: Option<String>) -> Self {
        if let Some(model) = model.filter(|value| !value.trim().is_empty()) {
            self.image_model = model.trim().to_string();
        }
        self
    }

    pub fn with_chat_model(mut self, model: Option<String>) -> Self {
        if let Some(model) = model.filter(|value| !value.trim().is_empty()) {
            self.chat_model = model.trim().to_string();
        }
        self
    }

    pub fn with_timeout_secs(mut self, seconds: Option<f64>) -> Self {
        if let Some(seconds) = seconds {
            self.request_timeout = Duration::from_secs_f64(clamp_timeout(seconds));
        }
        self
    }
}

pub(crate) fn non_empty_env(key: &str) -> Option<String> {
    env::var(key)
        .ok()
        .map(|value| value.trim().to_string())
        .filter(|value| !value.is_empty())
}

fn normalize_api_base(raw: &str) -> String {
    raw.trim().trim_end_matches('/').to_string()
}

fn parse_timeout(raw: Option<&str>) -> Duration {
    let seconds = raw
        .and_then(|text| text.trim().parse::<f64>().ok())
        .unwrap_or(DEFAULT_REQUEST_TIMEOUT_S);
    Duration::from_secs_f64(clamp_timeout(seconds))
}

fn clamp_timeout(seconds: f64) -> f64 {
    if !seconds.is_finite() {
        return DEFAULT_REQUEST_TIMEOUT_S;
    }
    seconds.clamp(MIN_REQUEST_TIMEOUT_S, MAX_REQUEST_TIMEOUT_S)
}
