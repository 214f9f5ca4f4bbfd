//! docrag-ingest - Ingestion pipeline
//!
//! Turns a stored document into chunks and index records:
//! extract → chunk → resolve namespace → per-chunk persist, embed, index →
//! mark processed.
//!
//! Empty extraction and empty chunk sets are soft failures reported through
//! [`IngestOutcome`]; embedding and index write failures are per chunk and
//! never abort the loop.

mod outcome;
mod pipeline;

pub use outcome::{IngestFailure, IngestOutcome, IngestReport};
pub use pipeline::IngestionPipeline;
