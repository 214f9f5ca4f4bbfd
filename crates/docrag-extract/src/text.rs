//! Extracted text with optional page boundaries.

/// The normalized text of a document.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct ExtractedText {
    /// Full text, pages joined by a newline.
    pub text: String,

    /// Byte offset at which each page starts (empty for unpaged sources).
    page_starts: Vec<usize>,
}

impl ExtractedText {
    /// Text from a source without pages.
    pub fn plain(text: &str) -> Self {
        Self {
            text: normalize(text),
            page_starts: Vec::new(),
        }
    }

    /// Text from a paged source, pages in order.
    pub fn paged<S: AsRef<str>>(pages: &[S]) -> Self {
        let mut text = String::new();
        let mut page_starts = Vec::with_capacity(pages.len());

        for (i, page) in pages.iter().enumerate() {
            if i > 0 {
                text.push('\n');
            }
            page_starts.push(text.len());
            text.push_str(&normalize(page.as_ref()));
        }

        Self { text, page_starts }
    }

    /// True when there is no usable text.
    pub fn is_empty(&self) -> bool {
        self.text.trim().is_empty()
    }

    /// Number of pages, zero for unpaged sources.
    pub fn page_count(&self) -> usize {
        self.page_starts.len()
    }

    /// 1-based page containing the given byte offset.
    pub fn page_at(&self, offset: usize) -> Option<u32> {
        if self.page_starts.is_empty() {
            return None;
        }
        let idx = self.page_starts.partition_point(|&start| start <= offset);
        Some(idx.max(1) as u32)
    }
}

/// Strip a byte-order mark and unify line endings.
fn normalize(text: &str) -> String {
    text.trim_start_matches('\u{feff}')
        .replace("\r\n", "\n")
        .replace('\r', "\n")
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_plain_normalizes_line_endings() {
        let text = ExtractedText::plain("\u{feff}one\r\ntwo\rthree");
        assert_eq!(text.text, "one\ntwo\nthree");
        assert_eq!(text.page_count(), 0);
        assert_eq!(text.page_at(0), None);
    }

    #[test]
    fn test_paged_offsets() {
        let text = ExtractedText::paged(&["first page", "second", "third"]);
        assert_eq!(text.text, "first page\nsecond\nthird");
        assert_eq!(text.page_count(), 3);
        assert_eq!(text.page_at(0), Some(1));
        assert_eq!(text.page_at(9), Some(1));
        assert_eq!(text.page_at(11), Some(2));
        assert_eq!(text.page_at(18), Some(3));
        assert_eq!(text.page_at(1000), Some(3));
    }

    #[test]
    fn test_whitespace_only_is_empty() {
        assert!(ExtractedText::plain(" \n\t ").is_empty());
        assert!(ExtractedText::paged::<&str>(&[]).is_empty());
        assert!(!ExtractedText::plain("x").is_empty());
    }
}
