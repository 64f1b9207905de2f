pub mod drive;

use std::path::Path;

use async_trait::async_trait;

use crate::error::PipelineError;

pub use drive::DrivePublisher;

/// Uploads an assembled document and returns a web-viewable link.
#[async_trait]
pub trait DocumentPublisher: Send + Sync {
    async fn publish(
        &self,
        document: &Path,
        title: &str,
        folder: Option<&str>,
    ) -> Result<String, PipelineError>;
}
