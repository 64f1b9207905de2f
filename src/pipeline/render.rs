use serde::Serialize;
use tracing::debug;

use crate::error::PipelineError;
use crate::llm::{GenerationRequest, GenerativeModel};
use crate::model::MappedComponent;

#[derive(Serialize)]
struct RenderPayload<'a> {
    components: &'a [MappedComponent],
}

/// Template-substitution prompt for one render group.
pub fn render_prompt(components: &[MappedComponent]) -> Result<String, PipelineError> {
    let payload = serde_json::to_string_pretty(&RenderPayload { components })
        .map_err(|e| PipelineError::Validation(format!("cannot encode render payload: {}", e)))?;

    Ok(format!(
        r#"You are an experienced content author for a block-based website.

TASK
Write the HTML for the components in the payload below, using the HTML templates they carry.

RULES
1. Use ONLY the HTML structure found in each component's `kb_html`. Keep its tags, nesting and table layout.
2. Replace every piece of content in the template (headings, paragraphs, link text, image paths) with the matching values from the component's `properties`.
3. Never keep example or placeholder text from a template.
4. Every image `src` must be `media/image<n>.jpeg`, numbering images 1, 2, 3 ... in document order.
5. Reply with the raw HTML only. No explanations, no code fences.
6. Exception: metadata tables are copied exactly as they appear in the template.

Example: if `kb_html` is
<h2>Example Heading</h2>
<p>Lorem ipsum dolor sit amet</p>
and the component has the title "Weather Forecast", the answer is
<h2>Weather Forecast</h2>
<p>Check the latest weather updates for your area.</p>

Keep the structure, replace the content, leave metadata tables untouched.

payload:
{payload}
"#
    ))
}

/// Render one group of mapped components to an HTML fragment.
pub async fn render(
    model: &dyn GenerativeModel,
    components: &[MappedComponent],
) -> Result<String, PipelineError> {
    let prompt = render_prompt(components)?;
    debug!(
        "rendering {} components ({} prompt chars)",
        components.len(),
        prompt.len()
    );
    model.generate(GenerationRequest::text(&prompt)).await
}

// ── Tests ──
