//! Context assembly and source attribution.

use std::collections::HashSet;

use docrag_core::{Source, VectorHit};

/// Single-turn prompt over the given context chunks, in rank order.
pub fn build_prompt(context: &[VectorHit], question: &str) -> String {
    let context = context
        .iter()
        .map(|hit| hit.content.as_str())
        .collect::<Vec<_>>()
        .join("\n\n");

    format!(
        "Based on the following context, answer the question.\n\nContext: {}\n\nQuestion: {}\n\nAnswer:",
        context, question
    )
}

/// One source per distinct filename, first occurrence wins.
pub fn dedup_sources(hits: &[VectorHit]) -> Vec<Source> {
    let mut seen = HashSet::new();

    hits.iter()
        .filter(|hit| seen.insert(hit.metadata.filename.as_str()))
        .map(|hit| Source {
            filename: hit.metadata.filename.clone(),
            chunk_index: hit.metadata.chunk_index,
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use docrag_core::ChunkMetadata;
    use ulid::Ulid;

    fn hit(filename: &str, chunk_index: u32, content: &str) -> VectorHit {
        let document_id = Ulid::new();
        VectorHit {
            id: format!("{}_{}", document_id, chunk_index),
            score: 1.0,
            content: content.to_string(),
            metadata: ChunkMetadata {
                document_id,
                chunk_index,
                filename: filename.to_string(),
                page_number: None,
            },
        }
    }

    #[test]
    fn test_dedup_keeps_first_seen_order() {
        let hits = vec![hit("a.pdf", 4, "x"), hit("a.pdf", 1, "y"), hit("b.pdf", 0, "z")];

        let sources = dedup_sources(&hits);
        assert_eq!(
            sources,
            vec![
                Source {
                    filename: "a.pdf".to_string(),
                    chunk_index: 4
                },
                Source {
                    filename: "b.pdf".to_string(),
                    chunk_index: 0
                },
            ]
        );
    }

    #[test]
    fn test_prompt_layout() {
        let hits = vec![hit("a.pdf", 0, "Refunds take 30 days."), hit("b.pdf", 0, "Shipping is free.")];

        let prompt = build_prompt(&hits, "How long do refunds take?");
        assert_eq!(
            prompt,
            "Based on the following context, answer the question.\n\n\
             Context: Refunds take 30 days.\n\nShipping is free.\n\n\
             Question: How long do refunds take?\n\nAnswer:"
        );
    }
}
