use std::fs::File;
use std::io::{Read, Write};
use std::ops::Range;
use std::path::Path;

use quick_xml::events::Event;
use quick_xml::Reader;
use zip::write::FileOptions;
use zip::{CompressionMethod, ZipArchive, ZipWriter};

use crate::error::PipelineError;

const DOCUMENT_XML: &str = "word/document.xml";
const METADATA_LABEL: &str = "metadata";

/// Grid style, full page width, single borders on every edge.
const NORMALIZED_TBL_PR: &str = concat!(
    "<w:tblPr>",
    "<w:tblStyle w:val=\"TableGrid\"/>",
    "<w:tblW w:w=\"5000\" w:type=\"pct\"/>",
    "<w:tblBorders>",
    "<w:top w:val=\"single\" w:sz=\"4\" w:space=\"0\" w:color=\"auto\"/>",
    "<w:left w:val=\"single\" w:sz=\"4\" w:space=\"0\" w:color=\"auto\"/>",
    "<w:bottom w:val=\"single\" w:sz=\"4\" w:space=\"0\" w:color=\"auto\"/>",
    "<w:right w:val=\"single\" w:sz=\"4\" w:space=\"0\" w:color=\"auto\"/>",
    "<w:insideH w:val=\"single\" w:sz=\"4\" w:space=\"0\" w:color=\"auto\"/>",
    "<w:insideV w:val=\"single\" w:sz=\"4\" w:space=\"0\" w:color=\"auto\"/>",
    "</w:tblBorders>",
    "<w:tblLayout w:type=\"fixed\"/>",
    "<w:tblLook w:val=\"04A0\" w:firstRow=\"1\" w:lastRow=\"0\" w:firstColumn=\"1\" w:lastColumn=\"0\" w:noHBand=\"0\" w:noVBand=\"1\"/>",
    "</w:tblPr>",
);

#[derive(Debug, Default, Clone, Copy, PartialEq, Eq)]
pub struct TableStats {
    pub normalized: usize,
    pub metadata: usize,
}

/// Rewrite the table properties of every top-level table except metadata tables.
/// Bytes outside rewritten `w:tblPr` elements are copied unchanged.
pub fn normalize_tables(xml: &str) -> Result<(String, TableStats), PipelineError> {
    let spans = table_spans(xml)?;
    let mut out = String::with_capacity(xml.len() + spans.len() * NORMALIZED_TBL_PR.len());
    let mut stats = TableStats::default();
    let mut cursor = 0;

    for span in spans {
        out.push_str(&xml[cursor..span.start]);
        let table = &xml[span.clone()];
        if first_cell_text(table)?.trim().eq_ignore_ascii_case(METADATA_LABEL) {
            out.push_str(table);
            stats.metadata += 1;
        } else {
            out.push_str(&with_normalized_props(table)?);
            stats.normalized += 1;
        }
        cursor = span.end;
    }
    out.push_str(&xml[cursor..]);
    Ok((out, stats))
}

/// Normalize tables inside a DOCX package in place.
pub fn normalize_docx(path: &Path) -> Result<TableStats, PipelineError> {
    let file = File::open(path).map_err(|e| PipelineError::io(path, e))?;
    let mut archive = ZipArchive::new(file).map_err(|e| zip_error(path, e))?;

    let mut document = String::new();
    archive
        .by_name(DOCUMENT_XML)
        .map_err(|e| zip_error(path, e))?
        .read_to_string(&mut document)
        .map_err(|e| PipelineError::io(path, e))?;

    let (rewritten, stats) = normalize_tables(&document)?;
    if stats.normalized == 0 {
        return Ok(stats);
    }

    replace_via_temp(path, |tmp_path| {
        let tmp = File::create(tmp_path).map_err(|e| PipelineError::io(tmp_path, e))?;
        let mut writer = ZipWriter::new(tmp);
        for i in 0..archive.len() {
            let entry = archive.by_index(i).map_err(|e| zip_error(path, e))?;
            if entry.name() == DOCUMENT_XML {
                drop(entry);
                let options =
                    FileOptions::default().compression_method(CompressionMethod::Deflated);
                writer
                    .start_file(DOCUMENT_XML, options)
                    .map_err(|e| zip_error(tmp_path, e))?;
                writer
                    .write_all(rewritten.as_bytes())
                    .map_err(|e| PipelineError::io(tmp_path, e))?;
            } else {
                writer.raw_copy_file(entry).map_err(|e| zip_error(tmp_path, e))?;
            }
        }
        writer.finish().map_err(|e| zip_error(tmp_path, e))?;
        Ok(())
    })?;
    Ok(stats)
}

/// Write `<path>.tmp` with `write`, then move it over `path`.
/// The temp file is removed when writing or renaming fails.
fn replace_via_temp<F>(path: &Path, write: F) -> Result<(), PipelineError>
where
    F: FnOnce(&Path) -> Result<(), PipelineError>,
{
    let tmp_path = path.with_extension("docx.tmp");
    let result = write(&tmp_path).and_then(|()| {
        std::fs::rename(&tmp_path, path).map_err(|e| PipelineError::io(path, e))
    });
    if result.is_err() {
        let _ = std::fs::remove_file(&tmp_path);
    }
    result
}

fn zip_error(path: &Path, e: zip::result::ZipError) -> PipelineError {
    PipelineError::Conversion(format!("unreadable document {}: {}", path.display(), e))
}

fn xml_error(e: quick_xml::Error) -> PipelineError {
    PipelineError::Conversion(format!("malformed document xml: {}", e))
}

/// Byte ranges of top-level `<w:tbl>...</w:tbl>` elements.
fn table_spans(xml: &str) -> Result<Vec<Range<usize>>, PipelineError> {
    let mut reader = Reader::from_str(xml);
    let mut spans = Vec::new();
    let mut depth = 0usize;
    let mut start = 0usize;

    loop {
        match reader.read_event().map_err(xml_error)? {
            Event::Start(e) if e.name().as_ref() == b"w:tbl" => {
                if depth == 0 {
                    let end = reader.buffer_position() as usize;
                    start = xml[..end].rfind("<w:tbl").unwrap_or(end);
                }
                depth += 1;
            }
            Event::End(e) if e.name().as_ref() == b"w:tbl" => {
                depth = depth.saturating_sub(1);
                if depth == 0 {
                    spans.push(start..reader.buffer_position() as usize);
                }
            }
            Event::Eof => break,
            _ => {}
        }
    }
    Ok(spans)
}

/// Text of the first cell of a table, nested tables included.
fn first_cell_text(table: &str) -> Result<String, PipelineError> {
    let mut reader = Reader::from_str(table);
    let mut text = String::new();
    let mut in_text = false;

    loop {
        match reader.read_event().map_err(xml_error)? {
            Event::Start(e) if e.name().as_ref() == b"w:t" => in_text = true,
            Event::End(e) if e.name().as_ref() == b"w:t" => in_text = false,
            Event::Text(e) if in_text => text.push_str(&e.unescape().map_err(xml_error)?),
            Event::End(e) if e.name().as_ref() == b"w:tc" => break,
            Event::Eof => break,
            _ => {}
        }
    }
    Ok(text)
}

/// Swap the outer table's `w:tblPr` for the normalized one, or insert it after `<w:tbl>`.
fn with_normalized_props(table: &str) -> Result<String, PipelineError> {
    let mut reader = Reader::from_str(table);
    let mut depth = 0usize;
    let mut props: Option<Range<usize>> = None;
    let mut props_start = None;

    loop {
        match reader.read_event().map_err(xml_error)? {
            Event::Start(e) if e.name().as_ref() == b"w:tbl" => depth += 1,
            Event::End(e) if e.name().as_ref() == b"w:tbl" => depth -= 1,
            Event::Start(e) if depth == 1 && e.name().as_ref() == b"w:tblPr" => {
                let end = reader.buffer_position() as usize;
                props_start = table[..end].rfind("<w:tblPr");
            }
            Event::End(e) if depth == 1 && e.name().as_ref() == b"w:tblPr" => {
                if let Some(start) = props_start {
                    props = Some(start..reader.buffer_position() as usize);
                    break;
                }
            }
            Event::Empty(e) if depth == 1 && e.name().as_ref() == b"w:tblPr" => {
                let end = reader.buffer_position() as usize;
                if let Some(start) = table[..end].rfind("<w:tblPr") {
                    props = Some(start..end);
                }
                break;
            }
            // Rows start after the properties; nothing to replace past this point.
            Event::Start(e) if depth == 1 && e.name().as_ref() == b"w:tr" => break,
            Event::Eof => break,
            _ => {}
        }
    }

    let rewritten = match props {
        Some(range) => format!(
            "{}{}{}",
            &table[..range.start],
            NORMALIZED_TBL_PR,
            &table[range.end..]
        ),
        None => {
            let open_end = table.find('>').map_or(0, |i| i + 1);
            format!(
                "{}{}{}",
                &table[..open_end],
                NORMALIZED_TBL_PR,
                &table[open_end..]
            )
        }
    };
    Ok(rewritten)
}

// ── Tests ──
