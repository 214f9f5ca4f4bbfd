//! docrag-extract - Text extraction
//!
//! Converts stored files into a single normalized text blob:
//!
//! - `pdf`: page texts joined by newline, page boundaries kept for attribution
//! - `doc`/`docx`: the document body, one line per paragraph
//! - `txt`: the file as UTF-8
//!
//! Extraction failures are never fatal to callers; see
//! [`TextExtractor::extract_or_empty`].

mod extractor;
mod text;

pub use extractor::{ExtractError, TextExtractor};
pub use text::ExtractedText;
