//! Image generation and image edit adapters. Each call is a single attempt;
//! retrying is the caller's decision.

use std::sync::Arc;

use lumina_contracts::errors::{DesignError, DesignResult};
use lumina_contracts::images::ImagePayload;
use lumina_contracts::wire::GenerateContentResponse;

use crate::backend::{ContentRequest, ModelBackend};

pub fn redesign_instruction(style_prompt: &str) -> String {
    format!(
        "Redesign this room in the following style: {}. \
         Keep the structural layout of the room (walls, windows, ceiling) exactly the same. \
         Replace furniture and decor to match the style. \
         High quality, photorealistic, architectural photography.",
        style_prompt.trim()
    )
}

pub fn edit_instruction(edit_prompt: &str) -> String {
    format!(
        "Edit this image based on the following instruction: {}. \
         Maintain the photorealism and perspective. \
         Do not change parts of the image unrelated to the instruction.",
        edit_prompt.trim()
    )
}

/// Renders the uploaded (or latest) room in a catalog style.
#[derive(Clone)]
pub struct ImageGenerationAdapter {
    backend: Arc<dyn ModelBackend>,
}

impl ImageGenerationAdapter {
    pub fn new(backend: Arc<dyn ModelBackend>) -> Self {
        Self { backend }
    }

    pub fn generate(&self, source: &ImagePayload, style_prompt: &str) -> DesignResult<ImagePayload> {
        if style_prompt.trim().is_empty() {
            return Err(DesignError::InvalidInput("style prompt is empty".to_string()));
        }
        render(
            self.backend.as_ref(),
            &redesign_instruction(style_prompt),
            source,
            "No image generated",
        )
    }
}

/// Applies one natural-language change to the current room image.
#[derive(Clone)]
pub struct ImageEditAdapter {
    backend: Arc<dyn ModelBackend>,
}

impl ImageEditAdapter {
    pub fn new(backend: Arc<dyn ModelBackend>) -> Self {
        Self { backend }
    }

    pub fn edit(&self, current: &ImagePayload, edit_prompt: &str) -> DesignResult<ImagePayload> {
        if edit_prompt.trim().is_empty() {
            return Err(DesignError::InvalidInput("edit instruction is empty".to_string()));
        }
        render(
            self.backend.as_ref(),
            &edit_instruction(edit_prompt),
            current,
            "No image generated from edit",
        )
    }
}

fn render(
    backend: &dyn ModelBackend,
    instruction: &str,
    source: &ImagePayload,
    missing_image: &str,
) -> DesignResult<ImagePayload> {
    let request = ContentRequest::image(instruction, source);
    let response = backend.generate_content(&request).map_err(|err| {
        tracing::warn!(backend = backend.name(), error = %err, "image request failed");
        err
    })?;
    let Some(image) = first_image(&response) else {
        let reason = response
            .first_candidate()
            .and_then(|candidate| candidate.finish_reason.clone())
            .unwrap_or_else(|| "no image in response".to_string());
        tracing::warn!(backend = backend.name(), reason = %reason, "backend returned no image");
        return Err(DesignError::Generation(format!("{missing_image} ({reason})")));
    };
    tracing::debug!(
        backend = backend.name(),
        source = %source.fingerprint(),
        result = %image.fingerprint(),
        "image rendered"
    );
    Ok(image)
}

fn first_image(response: &GenerateContentResponse) -> Option<ImagePayload> {
    let images = response.inline_images();
    if images.len() > 1 {
        tracing::warn!(count = images.len(), "backend returned several images; keeping the first");
    }
    images
        .first()
        .map(|inline| ImagePayload::from_model_output(inline.data.clone()))
}
