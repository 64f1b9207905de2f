pub mod convert;
pub mod tables;

use std::path::{Path, PathBuf};
use std::sync::Arc;

use tracing::info;

use crate::error::PipelineError;

pub use convert::{DocumentConverter, PandocConverter};

/// Paths of the files one assembly produced.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AssembledDocument {
    pub html_path: PathBuf,
    pub document_path: PathBuf,
}

/// HTML → DOCX → table normalization, all under one base path.
pub struct Assembler {
    converter: Arc<dyn DocumentConverter>,
}

impl Assembler {
    pub fn new(converter: Arc<dyn DocumentConverter>) -> Self {
        Self { converter }
    }

    /// `base` is the target path without extension, e.g. `output/run-1/home_page`.
    pub async fn assemble(&self, html: &str, base: &Path) -> Result<AssembledDocument, PipelineError> {
        let html_path = base.with_extension("html");
        let document_path = base.with_extension("docx");

        if let Some(parent) = html_path.parent().filter(|p| !p.as_os_str().is_empty()) {
            tokio::fs::create_dir_all(parent)
                .await
                .map_err(|e| PipelineError::io(parent, e))?;
        }

        tokio::fs::write(&html_path, html)
            .await
            .map_err(|e| PipelineError::io(&html_path, e))?;
        info!("saved {}", html_path.display());

        self.converter.convert(&html_path, &document_path).await?;
        info!("converted to {}", document_path.display());

        // zip rewrite is blocking file I/O
        let target = document_path.clone();
        let stats = tokio::task::spawn_blocking(move || tables::normalize_docx(&target))
            .await
            .map_err(|e| PipelineError::Conversion(format!("table normalization aborted: {}", e)))??;
        info!(
            normalized = stats.normalized,
            metadata = stats.metadata,
            "normalized tables in {}",
            document_path.display()
        );

        Ok(AssembledDocument {
            html_path,
            document_path,
        })
    }
}

// ── Tests ──
