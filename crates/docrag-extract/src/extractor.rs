//! Format-specific extraction of document text.

use std::io::Read;
use std::panic::{catch_unwind, AssertUnwindSafe};

use quick_xml::events::Event;
use thiserror::Error;
use tracing::{debug, error};

use docrag_core::{FileType, RagError};

use crate::text::ExtractedText;

/// Maximum decompressed bytes read from `word/document.xml`.
const MAX_XML_ENTRY_BYTES: u64 = 50 * 1024 * 1024;

/// Why a file produced no text.
#[derive(Error, Debug)]
pub enum ExtractError {
    #[error("PDF extraction failed: {0}")]
    Pdf(String),

    #[error("Word extraction failed: {0}")]
    Word(String),

    #[error("text file is not valid UTF-8: {0}")]
    Utf8(#[from] std::string::FromUtf8Error),
}

impl From<ExtractError> for RagError {
    fn from(err: ExtractError) -> Self {
        RagError::extraction(err.to_string())
    }
}

/// Converts stored files into normalized text.
#[derive(Debug, Clone, Copy, Default)]
pub struct TextExtractor;

impl TextExtractor {
    pub fn new() -> Self {
        Self
    }

    /// Extract the text of a file.
    pub fn extract(&self, file_type: FileType, bytes: &[u8]) -> Result<ExtractedText, ExtractError> {
        match file_type {
            FileType::Pdf => extract_pdf(bytes),
            FileType::Doc | FileType::Docx => extract_word(bytes),
            FileType::Txt => Ok(ExtractedText::plain(&String::from_utf8(bytes.to_vec())?)),
        }
    }

    /// Extract the text of a file, treating any failure as "no text".
    pub fn extract_or_empty(&self, file_type: FileType, bytes: &[u8]) -> ExtractedText {
        match self.extract(file_type, bytes) {
            Ok(text) => {
                debug!(
                    "Extracted {} bytes of text from {} file ({} pages)",
                    text.text.len(),
                    file_type,
                    text.page_count()
                );
                text
            }
            Err(e) => {
                error!("Text extraction error ({}): {}", file_type, e);
                ExtractedText::default()
            }
        }
    }
}

fn extract_pdf(bytes: &[u8]) -> Result<ExtractedText, ExtractError> {
    // pdf-extract panics on some malformed inputs
    let pages = catch_unwind(AssertUnwindSafe(|| {
        pdf_extract::extract_text_from_mem_by_pages(bytes)
    }))
    .map_err(|_| ExtractError::Pdf("parser panicked".to_string()))?
    .map_err(|e| ExtractError::Pdf(e.to_string()))?;

    Ok(ExtractedText::paged(&pages))
}

/// Word body text. Legacy binary `.doc` files are only readable when they are
/// OOXML containers under the old extension.
fn extract_word(bytes: &[u8]) -> Result<ExtractedText, ExtractError> {
    let mut archive = zip::ZipArchive::new(std::io::Cursor::new(bytes))
        .map_err(|e| ExtractError::Word(format!("not an OOXML container: {}", e)))?;

    let entry = archive
        .by_name("word/document.xml")
        .map_err(|_| ExtractError::Word("word/document.xml not found".to_string()))?;

    let mut xml = Vec::new();
    entry
        .take(MAX_XML_ENTRY_BYTES)
        .read_to_end(&mut xml)
        .map_err(|e| ExtractError::Word(e.to_string()))?;
    if xml.len() as u64 >= MAX_XML_ENTRY_BYTES {
        return Err(ExtractError::Word(
            "word/document.xml exceeds size limit".to_string(),
        ));
    }

    Ok(ExtractedText::plain(&word_body_text(&xml)?))
}

/// Collect `w:t` runs, one line per paragraph.
fn word_body_text(xml: &[u8]) -> Result<String, ExtractError> {
    let mut out = String::new();
    let mut reader = quick_xml::Reader::from_reader(xml);
    let mut buf = Vec::new();
    let mut in_text = false;

    loop {
        match reader.read_event_into(&mut buf) {
            Ok(Event::Start(e)) => {
                if e.local_name().as_ref() == b"t" {
                    in_text = true;
                }
            }
            Ok(Event::Text(te)) if in_text => {
                let text = te
                    .unescape()
                    .map_err(|e| ExtractError::Word(e.to_string()))?;
                out.push_str(&text);
            }
            Ok(Event::End(e)) => match e.local_name().as_ref() {
                b"t" => in_text = false,
                b"p" => out.push('\n'),
                _ => {}
            },
            Ok(Event::Empty(e)) => match e.local_name().as_ref() {
                b"tab" => out.push('\t'),
                b"br" | b"cr" | b"p" => out.push('\n'),
                _ => {}
            },
            Ok(Event::Eof) => break,
            Err(e) => return Err(ExtractError::Word(e.to_string())),
            _ => {}
        }
        buf.clear();
    }

    Ok(out.trim_end().to_string())
}
