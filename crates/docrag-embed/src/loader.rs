//! Embedder selection from configuration.

use std::sync::Arc;

use tracing::{error, info, warn};

use docrag_core::{Embedder, EmbeddingConfig};

use crate::{HashingEmbedder, OnnxEmbedder};

/// Build the configured embedder.
///
/// Returns `None` when embeddings are disabled or the model cannot be
/// loaded; callers then fall back to text-only indexing and search.
pub fn load_embedder(config: &EmbeddingConfig) -> Option<Arc<dyn Embedder>> {
    match config.provider.as_str() {
        "onnx" => match OnnxEmbedder::from_config(config) {
            Ok(embedder) => Some(Arc::new(embedder)),
            Err(e) => {
                error!(
                    "Failed to load embedding model {:?}, continuing without embeddings: {}",
                    config.model_path, e
                );
                None
            }
        },
        "hashing" => {
            info!("Using hashing embedder (dim={})", config.dimension);
            Some(Arc::new(HashingEmbedder::new(config.dimension)))
        }
        "disabled" | "none" => {
            info!("Embeddings disabled");
            None
        }
        other => {
            warn!("Unknown embedding provider '{}', embeddings disabled", other);
            None
        }
    }
}
