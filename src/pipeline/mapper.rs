use tracing::{debug, info};

use crate::kb::KnowledgeBase;
use crate::model::{ElementType, MappedComponent, MappingReport, PageDescription};

/// Join detected components against the catalog by type, keeping input order.
/// Unknown types are dropped and listed in `skipped`.
pub fn map_components(page: &PageDescription, kb: &KnowledgeBase) -> MappingReport {
    let mut report = MappingReport::default();

    for component in &page.components {
        let Some(block) = kb.get(&component.block_type) else {
            debug!("no block definition for '{}', skipping", component.block_type);
            report.skipped.push(component.block_type.clone());
            continue;
        };

        let element_type = component
            .element_type
            .as_deref()
            .map(ElementType::from_override)
            .unwrap_or(block.element);

        report.components.push(MappedComponent {
            block_type: component.block_type.clone(),
            element_type,
            properties: component.properties.clone(),
            layout: component.layout.clone(),
            kb_html: block.html_template.clone(),
        });
    }

    info!(
        "mapped {} components, skipped {}",
        report.components.len(),
        report.skipped.len()
    );
    report
}

// ── Tests ──
