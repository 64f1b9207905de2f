use std::path::PathBuf;

use thiserror::Error;

/// Failure taxonomy shared by every pipeline stage.
///
/// Unmatched block types and blank renders are not errors; they are reported
/// through `MappingReport::skipped` and `GenerationOutcome::blank_renders`.
#[derive(Debug, Error)]
pub enum PipelineError {
    #[error("configuration error: {0}")]
    Configuration(String),

    #[error("malformed response: {0}")]
    MalformedResponse(String),

    #[error("{service} request failed: {message}")]
    Upstream { service: &'static str, message: String },

    #[error("document conversion failed: {0}")]
    Conversion(String),

    #[error("publish failed: {0}")]
    Publish(String),

    #[error("invalid input: {0}")]
    Validation(String),

    #[error("i/o error on {}: {source}", path.display())]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
}

impl PipelineError {
    pub fn io(path: impl Into<PathBuf>, source: std::io::Error) -> Self {
        PipelineError::Io {
            path: path.into(),
            source,
        }
    }

    /// Stable label used in logs and the run ledger.
    pub fn kind(&self) -> &'static str {
        match self {
            PipelineError::Configuration(_) => "configuration",
            PipelineError::MalformedResponse(_) => "malformed_response",
            PipelineError::Upstream { .. } => "upstream",
            PipelineError::Conversion(_) => "conversion",
            PipelineError::Publish(_) => "publish",
            PipelineError::Validation(_) => "validation",
            PipelineError::Io { .. } => "io",
        }
    }

    /// Status an HTTP boundary should answer with for this failure.
    pub fn status_code(&self) -> u16 {
        match self {
            PipelineError::Validation(_) => 400,
            PipelineError::MalformedResponse(_)
            | PipelineError::Upstream { .. }
            | PipelineError::Publish(_) => 502,
            PipelineError::Configuration(_)
            | PipelineError::Conversion(_)
            | PipelineError::Io { .. } => 500,
        }
    }
}

// ── Tests ──
