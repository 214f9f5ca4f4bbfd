//! docrag-chunk - Overlapping text chunking
//!
//! Splits extracted document text into overlapping chunks sized for
//! embedding. Chunk sizes are measured in characters by default; a custom
//! length function can be supplied for token-based sizing.
//!
//! # Example
//!
//! ```rust
//! use docrag_chunk::{ChunkConfig, Chunker, RecursiveChunker};
//!
//! let chunker = RecursiveChunker::new();
//! let config = ChunkConfig::default();
//! let chunks = chunker.chunk("Hello world", &config).unwrap();
//! assert_eq!(chunks.len(), 1);
//! ```

mod recursive;

pub use recursive::RecursiveChunker;

// Re-export types for convenience
pub use docrag_core::{ChunkConfig, ChunkData, Chunker};
