use std::path::Path;
use std::sync::LazyLock;

use regex::Regex;
use tracing::{info, warn};

use crate::error::PipelineError;
use crate::kb::KnowledgeBase;
use crate::llm::{GenerationRequest, GenerativeModel, InlineImage};
use crate::model::PageDescription;

static FENCE_OPEN_RE: LazyLock<Regex> = LazyLock::new(|| Regex::new(r"```(?:json)?\s*").unwrap());

const EXCERPT_CHARS: usize = 200;

/// Vision prompt; the catalog listing is spliced in so only known types are proposed.
pub fn analysis_prompt(kb: &KnowledgeBase) -> String {
    format!(
        r#"You are an expert at reading user interface screenshots and you notice every detail.
Find every visual section of the screenshot, from top to bottom, and pick the block type below that fits it best.

For each section report: type, properties, layout, element_type.
Answer with ONE valid JSON object and nothing else: no commentary, no code fences.

Available block types:
{catalog}

Expected JSON shape:
{{
  "page_title": "Title of the page",
  "components": [
    {{
      "type": "block type from the list above",
      "properties": {{
        "title": "Section title",
        "description": "Section text",
        "imageRef": "What the image shows"
      }},
      "layout": "How the section is arranged",
      "element_type": "page-building or global"
    }}
  ]
}}"#,
        catalog = kb.describe(None)
    )
}

/// Ask the vision service to describe a screenshot.
pub async fn analyze(
    model: &dyn GenerativeModel,
    kb: &KnowledgeBase,
    image: &[u8],
    mime_type: &str,
) -> Result<PageDescription, PipelineError> {
    if image.is_empty() {
        return Err(PipelineError::Validation("image is empty".to_string()));
    }
    let prompt = analysis_prompt(kb);
    let raw = model
        .generate(GenerationRequest::with_image(
            &prompt,
            InlineImage {
                mime_type,
                data: image,
            },
        ))
        .await?;

    let page = parse_page_description(&raw)?;
    info!(
        "analysis found {} components (title: {})",
        page.components.len(),
        page.page_title.as_deref().unwrap_or("-")
    );
    Ok(page)
}

/// Read an image from disk and analyze it.
pub async fn analyze_file(
    model: &dyn GenerativeModel,
    kb: &KnowledgeBase,
    path: &Path,
) -> Result<PageDescription, PipelineError> {
    let bytes = match tokio::fs::read(path).await {
        Ok(b) => b,
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
            return Err(PipelineError::Validation(format!(
                "image not found: {}",
                path.display()
            )))
        }
        Err(e) => return Err(PipelineError::io(path, e)),
    };
    analyze(model, kb, &bytes, mime_for(path)).await
}

pub fn mime_for(path: &Path) -> &'static str {
    let ext = path
        .extension()
        .and_then(|e| e.to_str())
        .map(|e| e.to_ascii_lowercase());
    match ext.as_deref() {
        Some("jpg") | Some("jpeg") => "image/jpeg",
        Some("webp") => "image/webp",
        Some("gif") => "image/gif",
        _ => "image/png",
    }
}

/// Strip code fences, then keep the span from the first `{` to the last `}`.
/// Falls back to the whole stripped text when no such span exists.
pub fn extract_json(raw: &str) -> String {
    let stripped = FENCE_OPEN_RE.replace_all(raw, "").replace("```", "");
    let stripped = stripped.trim();
    match (stripped.find('{'), stripped.rfind('}')) {
        (Some(start), Some(end)) if end > start => stripped[start..=end].to_string(),
        _ => stripped.to_string(),
    }
}

pub fn parse_page_description(raw: &str) -> Result<PageDescription, PipelineError> {
    let payload = extract_json(raw);
    serde_json::from_str(&payload).map_err(|e| {
        let excerpt: String = raw.chars().take(EXCERPT_CHARS).collect();
        warn!("unparsable analysis reply: {:?}", excerpt);
        PipelineError::MalformedResponse(format!("{} (reply starts with {:?})", e, excerpt))
    })
}

// ── Tests ──

#[cfg(test)]
mod tests {
    use super::*;
    use crate::testing::StubModel;

    const BARE: &str = r#"{"page_title": "Weather", "components": [{"type": "hero", "properties": {"title": "Weather"}, "layout": "full width"}]}"#;

    fn fixture(name: &str) -> String {
        std::fs::read_to_string(format!("tests/fixtures/replies/{}", name)).unwrap()
    }

    fn kb() -> KnowledgeBase {
        KnowledgeBase::from_yaml(
            "blocks:\n  - {type: hero, description: Banner, element: page-building, html: '<h1>{{title}}</h1>'}\n",
        )
        .unwrap()
    }

    #[test]
    fn wrapped_replies_parse_like_bare_json() {
        let expected = parse_page_description(BARE).unwrap();
        for name in ["fenced.txt", "fenced_no_lang.txt", "prose.txt", "fenced_with_prose.txt"] {
            let parsed = parse_page_description(&fixture(name))
                .unwrap_or_else(|e| panic!("{}: {}", name, e));
            assert_eq!(parsed, expected, "{}", name);
        }
    }

    #[test]
    fn extract_slices_first_to_last_brace() {
        assert_eq!(extract_json("noise {\"a\": {\"b\": 1}} trailing"), "{\"a\": {\"b\": 1}}");
        assert_eq!(extract_json("```json\n{}\n```"), "{}");
    }

    #[test]
    fn extract_falls_back_to_stripped_text() {
        assert_eq!(extract_json("  no json here  "), "no json here");
        assert_eq!(extract_json("} backwards {"), "} backwards {");
    }

    #[test]
    fn malformed_replies_are_errors() {
        for name in ["truncated.txt", "no_json.txt"] {
            match parse_page_description(&fixture(name)) {
                Err(PipelineError::MalformedResponse(_)) => {}
                other => panic!("{}: expected malformed response, got {:?}", name, other),
            }
        }
    }

    #[test]
    fn missing_component_type_is_malformed() {
        assert!(matches!(
            parse_page_description(r#"{"components": [{"properties": {}}]}"#),
            Err(PipelineError::MalformedResponse(_))
        ));
    }

    #[test]
    fn title_is_optional() {
        let page = parse_page_description(r#"{"components": []}"#).unwrap();
        assert_eq!(page.page_title, None);
        assert!(page.components.is_empty());
    }

    #[test]
    fn prompt_embeds_catalog() {
        let prompt = analysis_prompt(&kb());
        assert!(prompt.contains("### hero - Banner (page-building)"));
        assert!(prompt.contains("\"page_title\""));
    }

    #[test]
    fn mime_from_extension() {
        assert_eq!(mime_for(Path::new("shot.PNG")), "image/png");
        assert_eq!(mime_for(Path::new("shot.jpeg")), "image/jpeg");
        assert_eq!(mime_for(Path::new("shot.JPG")), "image/jpeg");
        assert_eq!(mime_for(Path::new("shot.webp")), "image/webp");
        assert_eq!(mime_for(Path::new("shot")), "image/png");
    }

    #[tokio::test]
    async fn sends_image_with_prompt() {
        let model = StubModel::replying([fixture("fenced.txt")]);
        let page = analyze(&model, &kb(), b"\x89PNG....", "image/png").await.unwrap();
        assert_eq!(page.components.len(), 1);
        assert_eq!(model.calls(), 1);
        assert_eq!(model.image_sizes.lock().unwrap()[0], Some(8));
        assert!(model.prompt(0).contains("### hero"));
    }

    #[tokio::test]
    async fn missing_image_is_validation_error() {
        let model = StubModel::default();
        let err = analyze_file(&model, &kb(), Path::new("tests/fixtures/missing.png"))
            .await
            .unwrap_err();
        assert!(matches!(err, PipelineError::Validation(_)));
        assert_eq!(model.calls(), 0);
    }

    #[tokio::test]
    async fn empty_image_is_validation_error() {
        let model = StubModel::default();
        let err = analyze(&model, &kb(), b"", "image/png").await.unwrap_err();
        assert!(matches!(err, PipelineError::Validation(_)));
    }

    #[tokio::test]
    async fn unparsable_reply_is_not_retried() {
        let model = StubModel::replying(["Sorry, I cannot help with that.", BARE]);
        let err = analyze(&model, &kb(), b"img", "image/png").await.unwrap_err();
        assert!(matches!(err, PipelineError::MalformedResponse(_)));
        assert_eq!(model.calls(), 1);
    }
}
