//! Ingestion results.

use serde::Serialize;

/// Why a document was left unprocessed.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum IngestFailure {
    /// No text could be extracted (unreadable, unsupported or empty file).
    ExtractionFailure,

    /// The extracted text produced no chunks.
    EmptyChunkSet,
}

impl std::fmt::Display for IngestFailure {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::ExtractionFailure => f.write_str("no text could be extracted"),
            Self::EmptyChunkSet => f.write_str("extracted text produced no chunks"),
        }
    }
}

/// Counters for a processed document.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct IngestReport {
    /// Chunks persisted (and recorded on the document).
    pub chunk_count: u32,

    /// Index records written with an embedding.
    pub vectors_indexed: u32,

    /// Index records written without an embedding.
    pub text_only_records: u32,

    /// Chunks whose embedding call failed.
    pub embedding_failures: u32,

    /// Chunks that could not be written to the index.
    pub index_failures: u32,
}

/// Result of ingesting one document.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "status", rename_all = "snake_case")]
pub enum IngestOutcome {
    Processed(IngestReport),
    Failed { reason: IngestFailure },
}

impl IngestOutcome {
    pub fn failed(reason: IngestFailure) -> Self {
        Self::Failed { reason }
    }

    pub fn is_processed(&self) -> bool {
        matches!(self, Self::Processed(_))
    }

    /// The report, if the document was processed.
    pub fn report(&self) -> Option<&IngestReport> {
        match self {
            Self::Processed(report) => Some(report),
            Self::Failed { .. } => None,
        }
    }
}
