use std::time::Instant;

use async_trait::async_trait;
use base64::engine::general_purpose::STANDARD as BASE64;
use base64::Engine;
use reqwest::Client;
use serde::{Deserialize, Serialize};
use tracing::debug;

use super::{GenerationRequest, GenerativeModel};
use crate::error::PipelineError;

const SERVICE: &str = "gemini";
const API_KEY_HEADER: &str = "x-goog-api-key";

/// Gemini `generateContent` client.
pub struct GeminiClient {
    client: Client,
    api_base: String,
    api_key: String,
    model: String,
}

impl GeminiClient {
    pub fn new(client: Client, api_base: &str, api_key: String, model: String) -> Self {
        Self {
            client,
            api_base: api_base.trim_end_matches('/').to_string(),
            api_key,
            model,
        }
    }

    fn endpoint(&self) -> String {
        format!("{}/models/{}:generateContent", self.api_base, self.model)
    }

    // Key goes in a header; reqwest error text carries the URL.
    fn request(&self, body: &GenerateRequest<'_>) -> reqwest::RequestBuilder {
        self.client
            .post(self.endpoint())
            .header(API_KEY_HEADER, &self.api_key)
            .json(body)
    }
}

#[async_trait]
impl GenerativeModel for GeminiClient {
    async fn generate(&self, request: GenerationRequest<'_>) -> Result<String, PipelineError> {
        let body = build_body(&request);
        let start = Instant::now();

        let resp = self
            .request(&body)
            .send()
            .await
            .map_err(|e| upstream(format!("transport error: {}", e.without_url())))?;

        let status = resp.status();
        if !status.is_success() {
            let text = resp
                .text()
                .await
                .unwrap_or_else(|_| "<body unavailable>".to_string());
            return Err(upstream(format!("{}: {}", status, text)));
        }

        let parsed: GenerateResponse = resp
            .json()
            .await
            .map_err(|e| upstream(format!("unreadable response envelope: {}", e.without_url())))?;
        let text = parsed.into_text();
        debug!(
            model = %self.model,
            prompt_chars = request.prompt.len(),
            reply_chars = text.len(),
            "gemini reply in {}ms",
            start.elapsed().as_millis()
        );
        Ok(text)
    }
}

fn upstream(message: String) -> PipelineError {
    PipelineError::Upstream {
        service: SERVICE,
        message,
    }
}

fn build_body<'a>(request: &GenerationRequest<'a>) -> GenerateRequest<'a> {
    let mut parts = Vec::with_capacity(2);
    if let Some(image) = request.image {
        parts.push(Part::Inline {
            inline_data: InlineData {
                mime_type: image.mime_type,
                data: BASE64.encode(image.data),
            },
        });
    }
    parts.push(Part::Text {
        text: request.prompt,
    });

    GenerateRequest {
        contents: vec![Content {
            role: "user",
            parts,
        }],
        generation_config: GenerationConfig {
            response_mime_type: "text/plain",
            thinking_config: ThinkingConfig { thinking_budget: 0 },
        },
    }
}

#[derive(Serialize)]
struct GenerateRequest<'a> {
    contents: Vec<Content<'a>>,
    #[serde(rename = "generationConfig")]
    generation_config: GenerationConfig,
}

#[derive(Serialize)]
struct Content<'a> {
    role: &'a str,
    parts: Vec<Part<'a>>,
}

#[derive(Serialize)]
#[serde(untagged)]
enum Part<'a> {
    Inline { inline_data: InlineData<'a> },
    Text { text: &'a str },
}

#[derive(Serialize)]
struct InlineData<'a> {
    mime_type: &'a str,
    data: String,
}

#[derive(Serialize)]
#[serde(rename_all = "camelCase")]
struct GenerationConfig {
    response_mime_type: &'static str,
    thinking_config: ThinkingConfig,
}

#[derive(Serialize)]
#[serde(rename_all = "camelCase")]
struct ThinkingConfig {
    thinking_budget: u32,
}

#[derive(Debug, Deserialize)]
struct GenerateResponse {
    #[serde(default)]
    candidates: Vec<Candidate>,
}

#[derive(Debug, Deserialize)]
struct Candidate {
    content: Option<CandidateContent>,
}

#[derive(Debug, Deserialize)]
struct CandidateContent {
    #[serde(default)]
    parts: Vec<ReplyPart>,
}

#[derive(Debug, Deserialize)]
struct ReplyPart {
    text: Option<String>,
    #[serde(default)]
    thought: bool,
}

impl GenerateResponse {
    fn into_text(self) -> String {
        self.candidates
            .into_iter()
            .next()
            .and_then(|c| c.content)
            .map(|content| {
                content
                    .parts
                    .into_iter()
                    .filter(|p| !p.thought)
                    .filter_map(|p| p.text)
                    .collect::<String>()
            })
            .unwrap_or_default()
    }
}

// ── Tests ──
