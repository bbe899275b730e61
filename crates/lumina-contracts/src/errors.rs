//! Error taxonomy shared by the adapters, the session manager and the studio.

use thiserror::Error;

pub type DesignResult<T> = Result<T, DesignError>;

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum DesignError {
    /// The backend answered but produced no usable image.
    #[error("generation failed: {0}")]
    Generation(String),

    /// Transport failure, non-success status, or an unreadable payload.
    #[error("service failure: {0}")]
    Service(String),

    #[error("invalid input: {0}")]
    InvalidInput(String),

    #[error("invalid state: {0}")]
    InvalidState(String),
}

impl DesignError {
    pub fn service(err: &anyhow::Error) -> Self {
        Self::Service(error_chain_text(err, 512))
    }

    pub fn is_service(&self) -> bool {
        matches!(self, Self::Service(_))
    }
}

/// Flattens an anyhow cause chain into one line, skipping repeated causes.
pub fn error_chain_text(err: &anyhow::Error, max_chars: usize) -> String {
    let mut parts: Vec<String> = Vec::new();
    for cause in err.chain() {
        let text = cause.to_string();
        let trimmed = text.trim();
        if trimmed.is_empty() {
            continue;
        }
        if parts.last().map(|last| last == trimmed).unwrap_or(false) {
            continue;
        }
        parts.push(trimmed.to_string());
    }
    if parts.is_empty() {
        return truncate_text(&err.to_string(), max_chars);
    }
    truncate_text(&parts.join(" | caused by: "), max_chars)
}

pub fn truncate_text(value: &str, max_chars: usize) -> String {
    if value.chars().count() <= max_chars {
        return value.to_string();
    }
    value.chars().take(max_chars).collect::<String>() + "…"
}

#[cfg(test)]
mod tests {
    use anyhow::anyhow;

    use super::{error_chain_text, truncate_text, DesignError};

    #[test]
    fn chain_text_joins_distinct_causes() {
        let err = anyhow!("connection reset").context("Gemini request failed");
        assert_eq!(
            error_chain_text(&err, 512),
            "Gemini request failed | caused by: connection reset"
        );
    }

    #[test]
    fn chain_text_is_truncated() {
        let err = anyhow!("x".repeat(40));
        let text = error_chain_text(&err, 10);
        assert_eq!(text.chars().count(), 11);
        assert!(text.ends_with('…'));
    }

    #[test]
    fn service_error_wraps_chain() {
        let err = anyhow!("timed out").context("chat request failed");
        let design = DesignError::service(&err);
        assert!(design.is_service());
        assert_eq!(
            design.to_string(),
            "service failure: chat request failed | caused by: timed out"
        );
    }

    #[test]
    fn truncate_keeps_short_values() {
        assert_eq!(truncate_text("sofa", 10), "sofa");
    }
}
