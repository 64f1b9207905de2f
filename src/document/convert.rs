use std::io::ErrorKind;
use std::path::{Path, PathBuf};

use async_trait::async_trait;
use tokio::process::Command;
use tracing::debug;

use crate::error::PipelineError;

/// Turns an HTML file into a DOCX file.
#[async_trait]
pub trait DocumentConverter: Send + Sync {
    async fn convert(&self, html_path: &Path, output_path: &Path) -> Result<(), PipelineError>;
}

/// Shells out to pandoc.
pub struct PandocConverter {
    program: PathBuf,
}

impl PandocConverter {
    pub fn new(program: impl Into<PathBuf>) -> Self {
        Self {
            program: program.into(),
        }
    }
}

#[async_trait]
impl DocumentConverter for PandocConverter {
    async fn convert(&self, html_path: &Path, output_path: &Path) -> Result<(), PipelineError> {
        debug!(
            "{} {} -> {}",
            self.program.display(),
            html_path.display(),
            output_path.display()
        );
        let output = Command::new(&self.program)
            .arg(html_path)
            .args(["-f", "html", "-t", "docx", "-o"])
            .arg(output_path)
            .output()
            .await
            .map_err(|e| match e.kind() {
                ErrorKind::NotFound => PipelineError::Conversion(format!(
                    "converter '{}' not found",
                    self.program.display()
                )),
                _ => PipelineError::Conversion(format!(
                    "failed to start '{}': {}",
                    self.program.display(),
                    e
                )),
            })?;

        if !output.status.success() {
            let stderr = String::from_utf8_lossy(&output.stderr);
            return Err(PipelineError::Conversion(format!(
                "'{}' exited with {}: {}",
                self.program.display(),
                output.status,
                stderr.trim()
            )));
        }
        Ok(())
    }
}

// ── Tests ──
