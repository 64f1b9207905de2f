pub mod gemini;

use async_trait::async_trait;

use crate::error::PipelineError;

pub use gemini::GeminiClient;

/// Raw image attached to a vision request.
#[derive(Debug, Clone, Copy)]
pub struct InlineImage<'a> {
    pub mime_type: &'a str,
    pub data: &'a [u8],
}

/// Request envelope shared by the analyzer and the renderer.
#[derive(Debug, Clone, Copy)]
pub struct GenerationRequest<'a> {
    pub prompt: &'a str,
    pub image: Option<InlineImage<'a>>,
}

impl<'a> GenerationRequest<'a> {
    pub fn text(prompt: &'a str) -> Self {
        Self { prompt, image: None }
    }

    pub fn with_image(prompt: &'a str, image: InlineImage<'a>) -> Self {
        Self {
            prompt,
            image: Some(image),
        }
    }
}

/// Generative service returning free text for a prompt (plus optional image).
#[async_trait]
pub trait GenerativeModel: Send + Sync {
    async fn generate(&self, request: GenerationRequest<'_>) -> Result<String, PipelineError>;
}
