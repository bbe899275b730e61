//! Offline stand-in for the generative backend. Images are tinted with a
//! colour derived from the instruction; chat replies follow keyword rules so
//! every routing path can be exercised without credentials.

use base64::engine::general_purpose::STANDARD as BASE64;
use base64::Engine as _;
use image::codecs::jpeg::JpegEncoder;
use image::{DynamicImage, Rgb};
use lumina_contracts::chat::{EDIT_IMAGE_FUNCTION, EDIT_PROMPT_ARG};
use lumina_contracts::errors::{DesignError, DesignResult};
use lumina_contracts::wire::{
    Candidate, Content, GenerateContentResponse, GroundingChunk, GroundingMetadata, InlineData,
    Part, WebSource,
};
use serde_json::json;
use sha2::{Digest, Sha256};

use crate::backend::{ContentRequest, ModelBackend, ModelKind};

const EDIT_VERBS: &[&str] = &[
    "make ", "change ", "add ", "remove ", "replace ", "paint ", "move ", "swap ", "turn ",
];
const SEARCH_HINTS: &[&str] = &[
    "buy", "shop", "where", "trend", "price", "cost", "store", "latest",
];

#[derive(Debug, Default, Clone, Copy)]
pub struct DryrunBackend;

impl ModelBackend for DryrunBackend {
    fn name(&self) -> &str {
        "dryrun"
    }

    fn generate_content(&self, request: &ContentRequest) -> DesignResult<GenerateContentResponse> {
        match request.kind {
            ModelKind::Image => render_image(request),
            ModelKind::Chat => Ok(reply_to_chat(request)),
        }
    }
}

fn render_image(request: &ContentRequest) -> DesignResult<GenerateContentResponse> {
    let Some(source) = request.last_user_image() else {
        return Ok(GenerateContentResponse::from_text(
            "No image was attached, so nothing was rendered.",
        ));
    };
    let instruction = request.last_user_text().unwrap_or_default();
    let bytes = source.decode()?;
    let decoded = image::load_from_memory(&bytes)
        .map_err(|err| DesignError::Service(format!("dryrun decode failed: {err}")))?;

    let (r, g, b) = color_from_prompt(&instruction);
    let mut rgb = decoded.to_rgb8();
    for pixel in rgb.pixels_mut() {
        let Rgb([pr, pg, pb]) = *pixel;
        *pixel = Rgb([blend(pr, r), blend(pg, g), blend(pb, b)]);
    }

    let mut encoded = Vec::new();
    JpegEncoder::new_with_quality(&mut encoded, 90)
        .encode_image(&DynamicImage::ImageRgb8(rgb))
        .map_err(|err| DesignError::Service(format!("dryrun encode failed: {err}")))?;

    Ok(GenerateContentResponse {
        candidates: vec![Candidate {
            content: Some(Content::model(vec![Part {
                inline_data: Some(InlineData {
                    mime_type: Some("image/jpeg".to_string()),
                    data: BASE64.encode(encoded),
                }),
                ..Part::default()
            }])),
            ..Candidate::default()
        }],
        ..GenerateContentResponse::default()
    })
}

fn reply_to_chat(request: &ContentRequest) -> GenerateContentResponse {
    let text = request.last_user_text().unwrap_or_default();
    let lowered = format!("{} ", text.trim().to_ascii_lowercase());

    if EDIT_VERBS.iter().any(|verb| lowered.starts_with(verb)) {
        return GenerateContentResponse {
            candidates: vec![Candidate {
                content: Some(Content::model(vec![Part::function_call(
                    EDIT_IMAGE_FUNCTION,
                    json!({ EDIT_PROMPT_ARG: text.trim() }),
                )])),
                ..Candidate::default()
            }],
            ..GenerateContentResponse::default()
        };
    }

    if SEARCH_HINTS.iter().any(|hint| lowered.contains(hint)) {
        let query = text.trim().replace(' ', "+");
        let mut response = GenerateContentResponse::from_text(format!(
            "(dryrun) Here is what I found about \"{}\". Sources are listed below.",
            text.trim()
        ));
        if let Some(candidate) = response.candidates.first_mut() {
            candidate.grounding_metadata = Some(GroundingMetadata {
                grounding_chunks: vec![
                    GroundingChunk {
                        web: Some(WebSource {
                            uri: Some(format!("https://example.com/search?q={query}")),
                            title: Some("example.com".to_string()),
                        }),
                    },
                    GroundingChunk {
                        web: Some(WebSource {
                            uri: Some(format!("https://example.org/guides?q={query}")),
                            title: None,
                        }),
                    },
                ],
                web_search_queries: vec![text.trim().to_string()],
            });
        }
        return response;
    }

    GenerateContentResponse::from_text(format!(
        "(dryrun) I'm your design consultant. You said: \"{}\". Ask me to change something in the room or to find products.",
        text.trim()
    ))
}

fn blend(base: u8, tint: u8) -> u8 {
    ((u16::from(base) * 7 + u16::from(tint) * 3) / 10) as u8
}

fn color_from_prompt(prompt: &str) -> (u8, u8, u8) {
    let digest = Sha256::digest(prompt.as_bytes());
    (digest[0], digest[1], digest[2])
}
