use std::path::Path;

use crate::model::{ElementType, MappedComponent};

/// One representative component per global block type, in first-seen order.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct GlobalBlockGroup {
    entries: Vec<MappedComponent>,
}

impl GlobalBlockGroup {
    /// Keeps the first component of each type; later duplicates are ignored.
    pub fn insert(&mut self, component: MappedComponent) -> bool {
        if self.get(&component.block_type).is_some() {
            return false;
        }
        self.entries.push(component);
        true
    }

    pub fn get(&self, block_type: &str) -> Option<&MappedComponent> {
        self.entries.iter().find(|c| c.block_type == block_type)
    }

    pub fn iter(&self) -> impl Iterator<Item = &MappedComponent> {
        self.entries.iter()
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}

/// Page-building components of one page, in visual order.
#[derive(Debug, Clone, PartialEq)]
pub struct PageRenderGroup {
    pub title: String,
    pub components: Vec<MappedComponent>,
}

#[derive(Debug, Clone, PartialEq)]
pub struct RenderPlan {
    pub globals: GlobalBlockGroup,
    pub pages: Vec<PageRenderGroup>,
}

/// Split mapped components into site-wide blocks and the page body.
pub fn partition(
    mapped: &[MappedComponent],
    page_title: Option<&str>,
    image_reference: &Path,
) -> RenderPlan {
    let mut globals = GlobalBlockGroup::default();
    let mut body = Vec::new();

    for component in mapped {
        match component.element_type {
            ElementType::Global => {
                globals.insert(component.clone());
            }
            ElementType::PageBuilding => body.push(component.clone()),
        }
    }

    RenderPlan {
        globals,
        pages: vec![PageRenderGroup {
            title: page_title_or_fallback(page_title, image_reference),
            components: body,
        }],
    }
}

/// Analyzer title, or the image file name without extension.
pub fn page_title_or_fallback(page_title: Option<&str>, image_reference: &Path) -> String {
    page_title
        .map(str::trim)
        .filter(|t| !t.is_empty())
        .map(str::to_string)
        .or_else(|| {
            image_reference
                .file_stem()
                .and_then(|s| s.to_str())
                .map(str::to_string)
        })
        .unwrap_or_default()
}

// ── Tests ──
