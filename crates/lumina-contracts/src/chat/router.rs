//! Turns one raw model reply into exactly one of two outcomes: an image edit
//! the assistant asked for, or an answer to show (with citations when the
//! reply was search-grounded).

use crate::transcript::Citation;
use crate::wire::GenerateContentResponse;

pub const EDIT_IMAGE_FUNCTION: &str = "editImage";
pub const EDIT_PROMPT_ARG: &str = "prompt";
pub const DEFAULT_CITATION_TITLE: &str = "Source";
pub const FALLBACK_ANSWER_TEXT: &str = "I didn't quite get that.";

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AnswerResult {
    pub text: String,
    pub citations: Vec<Citation>,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum TurnOutcome {
    EditIntent { prompt: String },
    Answer(AnswerResult),
}

impl TurnOutcome {
    pub fn edit_prompt(&self) -> Option<&str> {
        match self {
            Self::EditIntent { prompt } => Some(prompt),
            Self::Answer(_) => None,
        }
    }
}

pub fn classify_response(response: &GenerateContentResponse) -> TurnOutcome {
    if let Some(prompt) = first_edit_prompt(response) {
        return TurnOutcome::EditIntent { prompt };
    }

    let citations = extract_citations(response);
    let text = response
        .text()
        .unwrap_or_else(|| FALLBACK_ANSWER_TEXT.to_string());
    TurnOutcome::Answer(AnswerResult { text, citations })
}

/// At most one edit per turn: later `editImage` calls are ignored.
fn first_edit_prompt(response: &GenerateContentResponse) -> Option<String> {
    response
        .function_calls()
        .filter(|call| call.name == EDIT_IMAGE_FUNCTION)
        .filter_map(|call| call.string_arg(EDIT_PROMPT_ARG))
        .map(str::trim)
        .find(|prompt| !prompt.is_empty())
        .map(str::to_string)
}

fn extract_citations(response: &GenerateContentResponse) -> Vec<Citation> {
    response
        .grounding_chunks()
        .iter()
        .filter_map(|chunk| chunk.web.as_ref())
        .filter_map(|web| {
            let url = web.uri.as_deref().map(str::trim).filter(|uri| !uri.is_empty())?;
            let title = web
                .title
                .as_deref()
                .map(str::trim)
                .filter(|title| !title.is_empty())
                .unwrap_or(DEFAULT_CITATION_TITLE);
            Some(Citation {
                title: title.to_string(),
                url: url.to_string(),
            })
        })
        .collect()
}
