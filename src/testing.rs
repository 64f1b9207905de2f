//! Stub collaborators for pipeline tests.

use std::collections::VecDeque;
use std::io::Write;
use std::path::{Path, PathBuf};
use std::sync::Mutex;

use async_trait::async_trait;

use crate::document::DocumentConverter;
use crate::error::PipelineError;
use crate::llm::{GenerationRequest, GenerativeModel};
use crate::publish::DocumentPublisher;

/// Replays canned replies in order and remembers every prompt it saw.
#[derive(Default)]
pub struct StubModel {
    replies: Mutex<VecDeque<Result<String, PipelineError>>>,
    pub prompts: Mutex<Vec<String>>,
    pub image_sizes: Mutex<Vec<Option<usize>>>,
}

impl StubModel {
    pub fn replying<I, S>(replies: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Self {
            replies: Mutex::new(replies.into_iter().map(|r| Ok(r.into())).collect()),
            ..Default::default()
        }
    }

    pub fn failing(err: PipelineError) -> Self {
        Self {
            replies: Mutex::new(VecDeque::from([Err(err)])),
            ..Default::default()
        }
    }

    pub fn calls(&self) -> usize {
        self.prompts.lock().unwrap().len()
    }

    pub fn prompt(&self, i: usize) -> String {
        self.prompts.lock().unwrap()[i].clone()
    }
}

#[async_trait]
impl GenerativeModel for StubModel {
    async fn generate(&self, request: GenerationRequest<'_>) -> Result<String, PipelineError> {
        self.prompts.lock().unwrap().push(request.prompt.to_string());
        self.image_sizes
            .lock()
            .unwrap()
            .push(request.image.map(|i| i.data.len()));
        self.replies
            .lock()
            .unwrap()
            .pop_front()
            .unwrap_or_else(|| Ok(String::new()))
    }
}

/// Wraps the HTML it is given into a minimal DOCX package.
#[derive(Default)]
pub struct StubConverter {
    pub conversions: Mutex<Vec<PathBuf>>,
}

#[async_trait]
impl DocumentConverter for StubConverter {
    async fn convert(&self, html_path: &Path, output_path: &Path) -> Result<(), PipelineError> {
        self.conversions.lock().unwrap().push(html_path.to_path_buf());
        let html = std::fs::read_to_string(html_path).unwrap();
        write_docx(output_path, &document_xml(&html));
        Ok(())
    }
}

pub struct FailingConverter;

#[async_trait]
impl DocumentConverter for FailingConverter {
    async fn convert(&self, _html: &Path, _out: &Path) -> Result<(), PipelineError> {
        Err(PipelineError::Conversion("pandoc: command not found".into()))
    }
}

/// Publisher returning a fixed link, or a fixed failure.
pub struct StubPublisher {
    outcome: Result<String, String>,
    pub uploads: Mutex<Vec<(PathBuf, String, Option<String>)>>,
}

impl StubPublisher {
    pub fn ok(link: &str) -> Self {
        Self {
            outcome: Ok(link.to_string()),
            uploads: Mutex::new(Vec::new()),
        }
    }

    pub fn failing(message: &str) -> Self {
        Self {
            outcome: Err(message.to_string()),
            uploads: Mutex::new(Vec::new()),
        }
    }
}

#[async_trait]
impl DocumentPublisher for StubPublisher {
    async fn publish(
        &self,
        document: &Path,
        title: &str,
        folder: Option<&str>,
    ) -> Result<String, PipelineError> {
        self.uploads.lock().unwrap().push((
            document.to_path_buf(),
            title.to_string(),
            folder.map(str::to_string),
        ));
        self.outcome.clone().map_err(PipelineError::Publish)
    }
}

pub fn document_xml(text: &str) -> String {
    let escaped = text
        .replace('&', "&amp;")
        .replace('<', "&lt;")
        .replace('>', "&gt;");
    format!(
        r#"<?xml version="1.0" encoding="UTF-8" standalone="yes"?><w:document xmlns:w="http://schemas.openxmlformats.org/wordprocessingml/2006/main"><w:body><w:p><w:r><w:t>{}</w:t></w:r></w:p></w:body></w:document>"#,
        escaped
    )
}

pub fn write_docx(path: &Path, document_xml: &str) {
    let file = std::fs::File::create(path).unwrap();
    let mut zip = zip::ZipWriter::new(file);
    let options = zip::write::FileOptions::default();
    zip.start_file("[Content_Types].xml", options).unwrap();
    zip.write_all(b"<Types/>").unwrap();
    zip.start_file("word/document.xml", options).unwrap();
    zip.write_all(document_xml.as_bytes()).unwrap();
    zip.start_file("word/styles.xml", options).unwrap();
    zip.write_all(b"<w:styles/>").unwrap();
    zip.finish().unwrap();
}

pub fn read_docx_entry(path: &Path, name: &str) -> String {
    use std::io::Read;
    let file = std::fs::File::open(path).unwrap();
    let mut archive = zip::ZipArchive::new(file).unwrap();
    let mut entry = archive.by_name(name).unwrap();
    let mut out = String::new();
    entry.read_to_string(&mut out).unwrap();
    out
}
