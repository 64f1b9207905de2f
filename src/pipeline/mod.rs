pub mod analyze;
pub mod mapper;
pub mod partition;
pub mod render;

use std::path::Path;
use std::sync::Arc;

use tracing::{info, warn};

use crate::document::Assembler;
use crate::error::PipelineError;
use crate::kb::KnowledgeBase;
use crate::llm::GenerativeModel;
use crate::model::{
    GenerationOutcome, MappedComponent, MappingReport, PageDescription, RenderedDocument,
};
use crate::publish::DocumentPublisher;
use crate::slug::slug;

/// Shared collaborators for screenshot → document runs.
///
/// Stages run strictly one after another: analyze, map, then for `generate`
/// partition → render globals → assemble globals → render page → assemble → publish.
/// Every render finishes writing its files before the next one starts.
pub struct Pipeline {
    kb: Arc<KnowledgeBase>,
    model: Arc<dyn GenerativeModel>,
    assembler: Assembler,
    publisher: Option<Arc<dyn DocumentPublisher>>,
    publish_folder: Option<String>,
}

impl Pipeline {
    pub fn new(
        kb: Arc<KnowledgeBase>,
        model: Arc<dyn GenerativeModel>,
        assembler: Assembler,
    ) -> Self {
        Self {
            kb,
            model,
            assembler,
            publisher: None,
            publish_folder: None,
        }
    }

    pub fn with_publisher(
        mut self,
        publisher: Arc<dyn DocumentPublisher>,
        folder: Option<String>,
    ) -> Self {
        self.publisher = Some(publisher);
        self.publish_folder = folder;
        self
    }

    pub async fn analyze(&self, image: &Path) -> Result<PageDescription, PipelineError> {
        analyze::analyze_file(self.model.as_ref(), &self.kb, image).await
    }

    pub fn map(&self, page: &PageDescription) -> MappingReport {
        mapper::map_components(page, &self.kb)
    }

    /// Render, assemble and publish documents for one analyzed screenshot.
    ///
    /// Global blocks are rendered once per type and saved locally; the page
    /// body is rendered once, saved and published. `out_dir` receives every
    /// file written by this run.
    pub async fn generate(
        &self,
        page: &PageDescription,
        mapped: &[MappedComponent],
        image_reference: &Path,
        out_dir: &Path,
    ) -> Result<GenerationOutcome, PipelineError> {
        let plan = partition::partition(mapped, page.page_title.as_deref(), image_reference);
        let mut outcome = GenerationOutcome::default();
        if plan.globals.is_empty() && plan.pages.iter().all(|p| p.components.is_empty()) {
            info!("no mapped components, nothing to generate");
            return Ok(outcome);
        }
        info!(
            "generating {} global blocks and {} page(s) into {}",
            plan.globals.len(),
            plan.pages.len(),
            out_dir.display()
        );

        for component in plan.globals.iter() {
            let html = render::render(self.model.as_ref(), std::slice::from_ref(component)).await?;
            let html = html.trim();
            if html.is_empty() {
                warn!("global block '{}' rendered empty, nothing to save", component.block_type);
                outcome.blank_renders.push(component.block_type.clone());
                continue;
            }
            let file_base_name = slug(&component.block_type);
            let doc = self.assembler.assemble(html, &out_dir.join(&file_base_name)).await?;
            outcome.globals.push(RenderedDocument {
                title: component.block_type.clone(),
                html_content: html.to_string(),
                file_base_name,
                html_path: doc.html_path,
                document_path: doc.document_path,
                link: None,
            });
        }

        for page_group in &plan.pages {
            if page_group.components.is_empty() {
                info!("page '{}' has no page-building components, skipping", page_group.title);
                continue;
            }
            let html = render::render(self.model.as_ref(), &page_group.components).await?;
            let html = html.trim();
            if html.is_empty() {
                warn!("page '{}' rendered empty, nothing to save", page_group.title);
                outcome.blank_renders.push(page_group.title.clone());
                continue;
            }
            let file_base_name = slug(&page_group.title);
            let doc = self.assembler.assemble(html, &out_dir.join(&file_base_name)).await?;

            let link = match &self.publisher {
                Some(publisher) => Some(
                    publisher
                        .publish(&doc.document_path, &page_group.title, self.publish_folder.as_deref())
                        .await?,
                ),
                None => {
                    warn!("publishing disabled, '{}' kept locally", page_group.title);
                    None
                }
            };
            if outcome.link.is_none() {
                outcome.link = link.clone();
            }
            outcome.pages.push(RenderedDocument {
                title: page_group.title.clone(),
                html_content: html.to_string(),
                file_base_name,
                html_path: doc.html_path,
                document_path: doc.document_path,
                link,
            });
        }

        Ok(outcome)
    }
}

// ── Tests ──
