//! Recursive character chunker.
//!
//! Splits text by trying progressively smaller separators until every piece
//! fits, then merges neighbouring pieces back into chunks of the target size,
//! carrying an overlap from the tail of each chunk into the next.

use std::collections::VecDeque;

use tracing::warn;

use docrag_core::{ChunkConfig, ChunkData, Chunker, RagError, Result};

/// Default separators, coarsest first. The empty separator splits into
/// characters and always succeeds.
const DEFAULT_SEPARATORS: [&str; 4] = ["\n\n", "\n", " ", ""];

/// A slice of the source text together with its byte offset.
type Piece<'a> = (usize, &'a str);

/// Recursive chunker that splits text by multiple separators.
///
/// Tries each separator in order until pieces are small enough:
/// 1. Double newline (paragraph breaks)
/// 2. Single newline
/// 3. Word boundaries (space)
/// 4. Character (last resort)
///
/// Separators stay attached to the start of the piece that follows them, so
/// every chunk is a contiguous substring of the input.
pub struct RecursiveChunker {
    /// Measures text length. Counts characters if None.
    length_fn: Option<Box<dyn Fn(&str) -> usize + Send + Sync>>,

    separators: Vec<String>,
}

impl RecursiveChunker {
    /// Create a chunker that measures length in characters.
    pub fn new() -> Self {
        Self {
            length_fn: None,
            separators: DEFAULT_SEPARATORS.iter().map(|s| s.to_string()).collect(),
        }
    }

    /// Create a chunker with a custom length function (e.g. a token counter).
    pub fn with_length_fn<F>(length_fn: F) -> Self
    where
        F: Fn(&str) -> usize + Send + Sync + 'static,
    {
        Self {
            length_fn: Some(Box::new(length_fn)),
            ..Self::new()
        }
    }

    fn length(&self, text: &str) -> usize {
        match &self.length_fn {
            Some(length_fn) => length_fn(text),
            None => text.chars().count(),
        }
    }

    /// Split at every occurrence of `separator`, keeping it at the start of
    /// the following piece. Empty pieces are dropped.
    fn split_keep_separator<'a>(&self, piece: Piece<'a>, separator: &str) -> Vec<Piece<'a>> {
        let (base, text) = piece;

        let mut bounds: Vec<usize> = if separator.is_empty() {
            text.char_indices().map(|(i, _)| i).collect()
        } else {
            text.match_indices(separator).map(|(i, _)| i).collect()
        };
        if bounds.first() != Some(&0) {
            bounds.insert(0, 0);
        }
        bounds.push(text.len());

        bounds
            .windows(2)
            .filter(|w| w[1] > w[0])
            .map(|w| (base + w[0], &text[w[0]..w[1]]))
            .collect()
    }

    /// Recursively split a piece into chunks.
    fn split_recursive(
        &self,
        piece: Piece<'_>,
        separators: &[String],
        config: &ChunkConfig,
    ) -> Vec<ChunkData> {
        let text = piece.1;

        // Pick the first separator present in the text
        let mut separator = separators.last().map(String::as_str).unwrap_or("");
        let mut remaining: &[String] = &[];
        for (idx, sep) in separators.iter().enumerate() {
            if sep.is_empty() {
                separator = sep;
                break;
            }
            if text.contains(sep.as_str()) {
                separator = sep;
                remaining = &separators[idx + 1..];
                break;
            }
        }

        let mut chunks = Vec::new();
        let mut fitting: Vec<Piece<'_>> = Vec::new();

        for part in self.split_keep_separator(piece, separator) {
            if self.length(part.1) < config.chunk_size {
                fitting.push(part);
                continue;
            }

            if !fitting.is_empty() {
                chunks.extend(self.merge_pieces(&fitting, config));
                fitting.clear();
            }

            if remaining.is_empty() {
                // Nothing finer to split by; keep it whole
                chunks.extend(self.make_chunk(&[part]));
            } else {
                chunks.extend(self.split_recursive(part, remaining, config));
            }
        }

        if !fitting.is_empty() {
            chunks.extend(self.merge_pieces(&fitting, config));
        }

        chunks
    }

    /// Merge contiguous pieces into chunks, keeping up to `chunk_overlap`
    /// of each chunk's tail as the head of the next.
    fn merge_pieces(&self, pieces: &[Piece<'_>], config: &ChunkConfig) -> Vec<ChunkData> {
        let mut chunks = Vec::new();
        let mut current: VecDeque<Piece<'_>> = VecDeque::new();
        let mut total = 0usize;

        for &piece in pieces {
            let len = self.length(piece.1);

            if total + len > config.chunk_size && !current.is_empty() {
                if total > config.chunk_size {
                    warn!(
                        "Created a chunk of size {}, which is longer than the specified {}",
                        total, config.chunk_size
                    );
                }

                chunks.extend(self.make_chunk(current.make_contiguous()));

                // Drop from the front until only the overlap remains and the
                // next piece fits
                while total > config.chunk_overlap
                    || (total + len > config.chunk_size && total > 0)
                {
                    match current.pop_front() {
                        Some((_, dropped)) => total = total.saturating_sub(self.length(dropped)),
                        None => break,
                    }
                }
            }

            current.push_back(piece);
            total += len;
        }

        if !current.is_empty() {
            chunks.extend(self.make_chunk(current.make_contiguous()));
        }

        chunks
    }

    /// Build a trimmed chunk from contiguous pieces; None if only whitespace.
    fn make_chunk(&self, pieces: &[Piece<'_>]) -> Option<ChunkData> {
        let start = pieces.first()?.0;
        let joined: String = pieces.iter().map(|(_, s)| *s).collect();

        let trimmed_start = joined.trim_start();
        let leading = joined.len() - trimmed_start.len();
        let content = trimmed_start.trim_end();
        if content.is_empty() {
            return None;
        }

        Some(ChunkData {
            content: content.to_string(),
            length: self.length(content),
            offset: Some(start + leading),
        })
    }
}

impl Default for RecursiveChunker {
    fn default() -> Self {
        Self::new()
    }
}

impl Chunker for RecursiveChunker {
    fn chunk(&self, content: &str, config: &ChunkConfig) -> Result<Vec<ChunkData>> {
        if config.chunk_size == 0 {
            return Err(RagError::chunking("chunk_size must be greater than zero"));
        }
        if config.chunk_overlap > config.chunk_size {
            return Err(RagError::chunking(format!(
                "chunk_overlap ({}) is larger than chunk_size ({})",
                config.chunk_overlap, config.chunk_size
            )));
        }

        if content.trim().is_empty() {
            return Ok(Vec::new());
        }

        Ok(self.split_recursive((0, content), &self.separators, config))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn words(n: usize) -> String {
        (0..n)
            .map(|i| format!("word{}", i))
            .collect::<Vec<_>>()
            .join(" ")
    }

    #[test]
    fn test_simple_chunk() {
        let chunker = RecursiveChunker::new();
        let text = "Hello world. This is a test.";
        let chunks = chunker.chunk(text, &ChunkConfig::default()).unwrap();

        assert_eq!(chunks.len(), 1);
        assert_eq!(chunks[0].content, text);
        assert_eq!(chunks[0].offset, Some(0));
    }

    #[test]
    fn test_empty_content() {
        let chunker = RecursiveChunker::new();
        let config = ChunkConfig::default();

        assert!(chunker.chunk("", &config).unwrap().is_empty());
        assert!(chunker.chunk("  \n\n \t", &config).unwrap().is_empty());
    }

    #[test]
    fn test_paragraph_split() {
        let chunker = RecursiveChunker::new();
        let config = ChunkConfig {
            chunk_size: 30,
            chunk_overlap: 5,
        };

        let text = "Alpha beta gamma delta\n\nEpsilon zeta eta theta";
        let chunks = chunker.chunk(text, &config).unwrap();

        let contents: Vec<_> = chunks.iter().map(|c| c.content.as_str()).collect();
        assert_eq!(contents, vec!["Alpha beta gamma delta", "Epsilon zeta eta theta"]);
        assert_eq!(chunks[1].offset, Some(24));
    }

    #[test]
    fn test_size_and_overlap() {
        let chunker = RecursiveChunker::new();
        let config = ChunkConfig::default();
        let text = words(600);

        let chunks = chunker.chunk(&text, &config).unwrap();
        assert!(chunks.len() > 1);

        for chunk in &chunks {
            assert!(chunk.length <= config.chunk_size);
            let offset = chunk.offset.unwrap();
            assert_eq!(&text[offset..offset + chunk.content.len()], chunk.content);
        }

        for pair in chunks.windows(2) {
            let prev_end = pair[0].offset.unwrap() + pair[0].content.len();
            let next_start = pair[1].offset.unwrap();
            assert!(next_start < prev_end, "consecutive chunks must overlap");
            assert!(prev_end - next_start <= config.chunk_overlap);
        }
    }

    #[test]
    fn test_rechunking_is_deterministic() {
        let chunker = RecursiveChunker::new();
        let config = ChunkConfig::default();
        let text = format!("{}\n\n{}\n{}", words(150), words(300), words(90));

        let first = chunker.chunk(&text, &config).unwrap();
        let second = chunker.chunk(&text, &config).unwrap();
        assert_eq!(first, second);
    }

    #[test]
    fn test_unbroken_text_splits_by_character() {
        let chunker = RecursiveChunker::new();
        let config = ChunkConfig {
            chunk_size: 10,
            chunk_overlap: 2,
        };

        let text = "abcdefghijklmnopqrstuvwxyz";
        let chunks = chunker.chunk(text, &config).unwrap();

        assert_eq!(chunks[0].content, "abcdefghij");
        assert_eq!(chunks[1].content, "ijklmnopqr");
        assert!(chunks.iter().all(|c| c.length <= 10));
    }

    #[test]
    fn test_custom_length_fn() {
        // 1 unit per word
        let chunker = RecursiveChunker::with_length_fn(|s| s.split_whitespace().count());
        let config = ChunkConfig {
            chunk_size: 5,
            chunk_overlap: 0,
        };

        let text = "one two three four five six seven eight nine ten";
        let chunks = chunker.chunk(text, &config).unwrap();

        assert_eq!(chunks.len(), 2);
        assert_eq!(chunks[0].content, "one two three four five");
        assert_eq!(chunks[1].content, "six seven eight nine ten");
    }

    #[test]
    fn test_invalid_config() {
        let chunker = RecursiveChunker::new();
        let config = ChunkConfig {
            chunk_size: 100,
            chunk_overlap: 200,
        };
        assert!(chunker.chunk("text", &config).is_err());
    }

    #[test]
    fn test_multibyte_offsets() {
        let chunker = RecursiveChunker::new();
        let config = ChunkConfig {
            chunk_size: 8,
            chunk_overlap: 0,
        };

        let text = "héllo wörld ünïcode tëxt";
        for chunk in chunker.chunk(text, &config).unwrap() {
            let offset = chunk.offset.unwrap();
            assert_eq!(&text[offset..offset + chunk.content.len()], chunk.content);
        }
    }
}
