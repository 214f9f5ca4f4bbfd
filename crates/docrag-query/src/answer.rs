//! Composed answers.

use serde::Serialize;

use docrag_core::Source;

/// How an answer came about.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum AnswerStatus {
    /// The LLM answered from retrieved context.
    Answered,

    /// The collection has no processed documents; no LLM call was made.
    NoProcessedDocuments,

    /// The index returned nothing; no LLM call was made.
    NoRelevantChunks,

    /// Retrieval or generation failed; the text describes the error.
    Failed,
}

/// Answer text plus the sources it was composed from.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct RagAnswer {
    pub text: String,
    pub sources: Vec<Source>,
    pub status: AnswerStatus,
}

impl RagAnswer {
    pub fn answered(text: impl Into<String>, sources: Vec<Source>) -> Self {
        Self {
            text: text.into(),
            sources,
            status: AnswerStatus::Answered,
        }
    }

    /// A fixed answer with no sources.
    pub fn short_circuit(text: impl Into<String>, status: AnswerStatus) -> Self {
        Self {
            text: text.into(),
            sources: Vec::new(),
            status,
        }
    }

    pub fn failed(error: impl std::fmt::Display) -> Self {
        Self::short_circuit(format!("Error querying documents: {}", error), AnswerStatus::Failed)
    }

    pub fn is_answered(&self) -> bool {
        self.status == AnswerStatus::Answered
    }
}
