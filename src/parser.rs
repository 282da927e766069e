//! Document parsing for file ingestion.
//!
//! Turns a file on disk into plain UTF-8 text. The parser is picked from
//! `[ingest].parser`, or from the file extension when it is `auto`:
//!
//! | Parser | Extensions | Backend |
//! |--------|------------|---------|
//! | `text` | anything else | UTF-8 read |
//! | `pdf` | `.pdf` | `pdf-extract` |
//! | `docx` | `.docx` | `zip` + `quick-xml` over `word/document.xml` |
//!
//! DOCX paragraphs (`w:p`) are separated by blank lines so the segmenter
//! can split on them.

use std::io::Read;
use std::path::Path;

use quick_xml::events::Event;
use vectors_connector_core::ConnectorError;

use crate::config::ParserKind;

/// Maximum decompressed bytes read from `word/document.xml` (zip-bomb guard).
const MAX_XML_ENTRY_BYTES: u64 = 50 * 1024 * 1024;

/// Text extracted from one file plus the parser that produced it.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ParsedDocument {
    pub text: String,
    /// Written to the `file_type` segment attribute.
    pub file_type: &'static str,
}

/// Resolve `Auto` against the file extension.
pub fn resolve_parser(kind: ParserKind, path: &Path) -> ParserKind {
    if kind != ParserKind::Auto {
        return kind;
    }
    let ext = path
        .extension()
        .map(|e| e.to_string_lossy().to_ascii_lowercase())
        .unwrap_or_default();
    match ext.as_str() {
        "pdf" => ParserKind::Pdf,
        "docx" => ParserKind::Docx,
        _ => ParserKind::Text,
    }
}

fn file_type(kind: ParserKind) -> &'static str {
    match kind {
        ParserKind::Pdf => "pdf",
        ParserKind::Docx => "docx",
        ParserKind::Text | ParserKind::Auto => "text",
    }
}

pub fn parse_file(path: &Path, kind: ParserKind) -> Result<ParsedDocument, ConnectorError> {
    let bytes = std::fs::read(path).map_err(|e| {
        ConnectorError::Document(format!("failed to read {}: {}", path.display(), e))
    })?;
    let kind = resolve_parser(kind, path);
    let text = parse_bytes(&bytes, kind)
        .map_err(|e| ConnectorError::Document(format!("{}: {}", path.display(), e)))?;
    Ok(ParsedDocument {
        text,
        file_type: file_type(kind),
    })
}

/// Extract text from in-memory content with an explicit parser.
pub fn parse_bytes(bytes: &[u8], kind: ParserKind) -> Result<String, String> {
    match kind {
        ParserKind::Pdf => pdf_extract::extract_text_from_mem(bytes)
            .map_err(|e| format!("PDF extraction failed: {}", e)),
        ParserKind::Docx => extract_docx(bytes).map_err(|e| format!("DOCX extraction failed: {}", e)),
        ParserKind::Text | ParserKind::Auto => String::from_utf8(bytes.to_vec())
            .map_err(|_| "file is not valid UTF-8 text".to_string()),
    }
}

fn extract_docx(bytes: &[u8]) -> Result<String, String> {
    let mut archive =
        zip::ZipArchive::new(std::io::Cursor::new(bytes)).map_err(|e| e.to_string())?;
    let entry = archive
        .by_name("word/document.xml")
        .map_err(|_| "word/document.xml not found".to_string())?;
    let mut xml = Vec::new();
    entry
        .take(MAX_XML_ENTRY_BYTES)
        .read_to_end(&mut xml)
        .map_err(|e| e.to_string())?;
    if xml.len() as u64 >= MAX_XML_ENTRY_BYTES {
        return Err("word/document.xml exceeds size limit".to_string());
    }
    paragraphs_from_document_xml(&xml)
}

/// Collect `w:t` runs, one paragraph per `w:p`.
fn paragraphs_from_document_xml(xml: &[u8]) -> Result<String, String> {
    let mut reader = quick_xml::Reader::from_reader(xml);
    let mut buf = Vec::new();
    let mut paragraphs: Vec<String> = Vec::new();
    let mut current = String::new();
    let mut in_text = false;
    loop {
        match reader.read_event_into(&mut buf) {
            Ok(Event::Start(e)) if e.local_name().as_ref() == b"t" => in_text = true,
            Ok(Event::Text(t)) if in_text => {
                let text = t.unescape().map_err(|e| e.to_string())?;
                current.push_str(&text);
            }
            Ok(Event::End(e)) => match e.local_name().as_ref() {
                b"t" => in_text = false,
                b"p" => {
                    let para = current.trim();
                    if !para.is_empty() {
                        paragraphs.push(para.to_string());
                    }
                    current.clear();
                }
                _ => {}
            },
            Ok(Event::Eof) => break,
            Err(e) => return Err(e.to_string()),
            _ => {}
        }
        buf.clear();
    }
    let tail = current.trim();
    if !tail.is_empty() {
        paragraphs.push(tail.to_string());
    }
    Ok(paragraphs.join("\n\n"))
}
