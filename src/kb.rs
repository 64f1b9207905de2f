use std::collections::HashMap;
use std::path::Path;

use serde::Deserialize;
use tracing::info;

use crate::error::PipelineError;
use crate::model::{BlockDefinition, ElementType};

/// Read-only catalog of block templates, keyed by block type, in file order.
#[derive(Debug, Clone, Default)]
pub struct KnowledgeBase {
    blocks: Vec<BlockDefinition>,
    index: HashMap<String, usize>,
}

#[derive(Deserialize)]
struct RawCatalog {
    blocks: Option<Vec<RawBlock>>,
}

#[derive(Deserialize)]
struct RawBlock {
    #[serde(rename = "type")]
    block_type: Option<String>,
    description: Option<String>,
    element: Option<String>,
    html: Option<String>,
}

impl KnowledgeBase {
    pub fn load(path: &Path) -> Result<Self, PipelineError> {
        let text = std::fs::read_to_string(path).map_err(|e| {
            PipelineError::Configuration(format!(
                "cannot read knowledge base {}: {}",
                path.display(),
                e
            ))
        })?;
        let kb = Self::from_yaml(&text)?;
        info!("Loaded {} block definitions from {}", kb.len(), path.display());
        Ok(kb)
    }

    pub fn from_yaml(text: &str) -> Result<Self, PipelineError> {
        let raw: RawCatalog = serde_yaml::from_str(text)
            .map_err(|e| PipelineError::Configuration(format!("malformed knowledge base: {}", e)))?;
        let entries = raw.blocks.ok_or_else(|| {
            PipelineError::Configuration("knowledge base has no 'blocks' list".to_string())
        })?;

        let mut kb = KnowledgeBase::default();
        for (i, entry) in entries.into_iter().enumerate() {
            let block = validate_entry(i, entry)?;
            if kb.index.contains_key(&block.block_type) {
                return Err(PipelineError::Configuration(format!(
                    "block #{}: duplicate type '{}'",
                    i, block.block_type
                )));
            }
            kb.index.insert(block.block_type.clone(), kb.blocks.len());
            kb.blocks.push(block);
        }
        Ok(kb)
    }

    pub fn get(&self, block_type: &str) -> Option<&BlockDefinition> {
        self.index.get(block_type).map(|&i| &self.blocks[i])
    }

    pub fn len(&self) -> usize {
        self.blocks.len()
    }

    pub fn is_empty(&self) -> bool {
        self.blocks.is_empty()
    }

    /// Prompt-ready listing of the catalog, optionally limited to one element kind.
    pub fn describe(&self, element: Option<ElementType>) -> String {
        self.blocks
            .iter()
            .filter(|b| element.map_or(true, |e| b.element == e))
            .map(|b| format!("### {} - {} ({})", b.block_type, b.description, b.element))
            .collect::<Vec<_>>()
            .join("\n\n")
    }
}

fn validate_entry(i: usize, raw: RawBlock) -> Result<BlockDefinition, PipelineError> {
    let missing = |field: &str| {
        PipelineError::Configuration(format!("block #{}: missing required field '{}'", i, field))
    };

    let block_type = raw
        .block_type
        .filter(|t| !t.trim().is_empty())
        .ok_or_else(|| missing("type"))?;
    let description = raw.description.ok_or_else(|| missing("description"))?;
    let element = raw
        .element
        .ok_or_else(|| missing("element"))?
        .parse::<ElementType>()
        .map_err(|e| PipelineError::Configuration(format!("block #{} ({}): {}", i, block_type, e)))?;
    let html_template = raw.html.ok_or_else(|| missing("html"))?;

    Ok(BlockDefinition {
        block_type,
        description,
        element,
        html_template,
    })
}

// ── Tests ──

#[cfg(test)]
mod tests {
    use super::*;

    const CATALOG: &str = r#"
blocks:
  - type: header
    description: Site navigation bar
    element: global
    html: "<nav><a href='/'>Home</a></nav>"
  - type: hero
    description: Large banner with title
    element: page-building
    html: "<h1>{{title}}</h1>"
  - type: footer
    description: Site footer
    element: global
    html: "<footer>Copyright</footer>"
"#;

    #[test]
    fn empty_block_list_loads_empty() {
        let kb = KnowledgeBase::from_yaml("blocks: []\n").unwrap();
        assert!(kb.is_empty());
        assert_eq!(kb.describe(None), "");
    }

    #[test]
    fn loads_entries_by_type() {
        let kb = KnowledgeBase::from_yaml(CATALOG).unwrap();
        assert_eq!(kb.len(), 3);
        let hero = kb.get("hero").unwrap();
        assert_eq!(hero.element, ElementType::PageBuilding);
        assert_eq!(hero.html_template, "<h1>{{title}}</h1>");
        assert!(kb.get("carousel").is_none());
    }

    #[test]
    fn describe_keeps_file_order() {
        let kb = KnowledgeBase::from_yaml(CATALOG).unwrap();
        assert_eq!(
            kb.describe(None),
            "### header - Site navigation bar (global)\n\n\
             ### hero - Large banner with title (page-building)\n\n\
             ### footer - Site footer (global)"
        );
    }

    #[test]
    fn describe_filters_by_element() {
        let kb = KnowledgeBase::from_yaml(CATALOG).unwrap();
        let globals = kb.describe(Some(ElementType::Global));
        assert!(globals.starts_with("### header"));
        assert!(globals.ends_with("(global)"));
        assert!(!globals.contains("hero"));
        assert_eq!(
            kb.describe(Some(ElementType::PageBuilding)),
            "### hero - Large banner with title (page-building)"
        );
    }

    #[test]
    fn each_missing_field_is_rejected() {
        for field in ["type", "description", "element", "html"] {
            let mut entry = vec![
                ("type", "\"cards\""),
                ("description", "\"Card grid\""),
                ("element", "\"page-building\""),
                ("html", "\"<div></div>\""),
            ];
            entry.retain(|(k, _)| *k != field);
            let body = entry
                .iter()
                .map(|(k, v)| format!("{}: {}", k, v))
                .collect::<Vec<_>>()
                .join(", ");
            let yaml = format!("blocks:\n  - {{ {} }}\n", body);
            match KnowledgeBase::from_yaml(&yaml) {
                Err(PipelineError::Configuration(msg)) => assert!(msg.contains(field), "{}", msg),
                other => panic!("expected configuration error for {}, got {:?}", field, other),
            }
        }
    }

    #[test]
    fn missing_field_on_later_entry_fails_whole_load() {
        let yaml = format!("{}  - type: cards\n    element: global\n    html: x\n", CATALOG);
        assert!(matches!(
            KnowledgeBase::from_yaml(&yaml),
            Err(PipelineError::Configuration(_))
        ));
    }

    #[test]
    fn duplicate_type_rejected() {
        let yaml = format!(
            "{}  - type: hero\n    description: again\n    element: global\n    html: x\n",
            CATALOG
        );
        match KnowledgeBase::from_yaml(&yaml) {
            Err(PipelineError::Configuration(msg)) => assert!(msg.contains("duplicate")),
            other => panic!("unexpected {:?}", other),
        }
    }

    #[test]
    fn unknown_element_rejected() {
        let yaml = "blocks:\n  - {type: a, description: b, element: sidebar, html: c}\n";
        assert!(matches!(
            KnowledgeBase::from_yaml(yaml),
            Err(PipelineError::Configuration(_))
        ));
    }

    #[test]
    fn malformed_or_missing_resource() {
        assert!(matches!(
            KnowledgeBase::from_yaml("blocks: [unclosed"),
            Err(PipelineError::Configuration(_))
        ));
        assert!(matches!(
            KnowledgeBase::from_yaml("other: 1"),
            Err(PipelineError::Configuration(_))
        ));
        assert!(matches!(
            KnowledgeBase::load(Path::new("tests/fixtures/does_not_exist.yaml")),
            Err(PipelineError::Configuration(_))
        ));
    }

    #[test]
    fn shipped_catalog_loads() {
        let kb = KnowledgeBase::load(Path::new("data/block_kb.yaml")).unwrap();
        assert!(kb.get("hero").is_some());
        assert!(kb.get("header").is_some());
        assert_eq!(kb.get("footer").unwrap().element, ElementType::Global);
    }
}
