use std::fmt;
use std::path::PathBuf;
use std::str::FromStr;

use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

/// Where a block lives on the site: once per page, or once across the whole run.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum ElementType {
    #[serde(rename = "page-building")]
    PageBuilding,
    #[serde(rename = "global")]
    Global,
}

impl ElementType {
    pub fn as_str(&self) -> &'static str {
        match self {
            ElementType::PageBuilding => "page-building",
            ElementType::Global => "global",
        }
    }

    /// Lenient reading of a classification proposed by the vision service.
    /// Only the literal `global` is global; anything else builds the page.
    pub fn from_override(label: &str) -> Self {
        if label.trim().eq_ignore_ascii_case("global") {
            ElementType::Global
        } else {
            ElementType::PageBuilding
        }
    }
}

impl fmt::Display for ElementType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for ElementType {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "page-building" => Ok(ElementType::PageBuilding),
            "global" => Ok(ElementType::Global),
            other => Err(format!(
                "unknown element '{}' (expected 'page-building' or 'global')",
                other
            )),
        }
    }
}

/// One entry of the block knowledge base.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BlockDefinition {
    pub block_type: String,
    pub description: String,
    pub element: ElementType,
    pub html_template: String,
}

/// A UI section the vision service found in a screenshot.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DetectedComponent {
    #[serde(rename = "type")]
    pub block_type: String,
    #[serde(default, deserialize_with = "properties_or_empty")]
    pub properties: Map<String, Value>,
    #[serde(default, deserialize_with = "layout_text")]
    pub layout: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub element_type: Option<String>,
}

/// The analyzer's view of one screenshot, components in visual order.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct PageDescription {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub page_title: Option<String>,
    #[serde(default)]
    pub components: Vec<DetectedComponent>,
}

/// A detected component joined with its knowledge-base template.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MappedComponent {
    #[serde(rename = "type")]
    pub block_type: String,
    pub element_type: ElementType,
    pub properties: Map<String, Value>,
    pub layout: String,
    pub kb_html: String,
}

/// Mapper output: matched components in input order plus the types it dropped.
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct MappingReport {
    pub components: Vec<MappedComponent>,
    pub skipped: Vec<String>,
}

/// One render+assemble pass worth of output.
#[derive(Debug, Clone, PartialEq)]
pub struct RenderedDocument {
    pub title: String,
    pub html_content: String,
    pub file_base_name: String,
    pub html_path: PathBuf,
    pub document_path: PathBuf,
    pub link: Option<String>,
}

/// Everything one `generate` invocation produced.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct GenerationOutcome {
    pub globals: Vec<RenderedDocument>,
    pub pages: Vec<RenderedDocument>,
    pub blank_renders: Vec<String>,
    pub link: Option<String>,
}

// Vision output sometimes describes layout as an object or list rather than prose.
fn layout_text<'de, D>(deserializer: D) -> Result<String, D::Error>
where
    D: serde::Deserializer<'de>,
{
    Ok(match Value::deserialize(deserializer)? {
        Value::Null => String::new(),
        Value::String(s) => s,
        other => other.to_string(),
    })
}

fn properties_or_empty<'de, D>(deserializer: D) -> Result<Map<String, Value>, D::Error>
where
    D: serde::Deserializer<'de>,
{
    Ok(Option::<Map<String, Value>>::deserialize(deserializer)?.unwrap_or_default())
}

// ── Tests ──
