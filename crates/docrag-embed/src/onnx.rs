//! ONNX sentence-transformer embedder.

use std::path::Path;
use std::sync::Mutex;

use async_trait::async_trait;
use ndarray::ArrayViewD;
use ort::session::builder::GraphOptimizationLevel;
use ort::session::Session;
use ort::value::Tensor;
use tokenizers::{Encoding, Tokenizer, TruncationParams};
use tracing::{debug, info};

use docrag_core::{Embedder, EmbeddingConfig, RagError, Result};

use crate::l2_normalize;

/// ONNX embedder for all-MiniLM-L6-v2 or a compatible BERT-style export.
///
/// The model must take `input_ids`, `attention_mask` and `token_type_ids`
/// and return either token embeddings `[batch, seq, hidden]` (mean pooled
/// here) or pooled sentence embeddings `[batch, hidden]`.
pub struct OnnxEmbedder {
    /// Inference session (run requires exclusive access).
    session: Mutex<Session>,

    tokenizer: Tokenizer,

    dimension: usize,

    max_tokens: usize,
}

impl OnnxEmbedder {
    /// Load a model and its tokenizer.
    pub fn new(
        model_path: impl AsRef<Path>,
        tokenizer_path: impl AsRef<Path>,
        dimension: usize,
        max_tokens: usize,
        num_threads: usize,
    ) -> Result<Self> {
        let model_path = model_path.as_ref();
        let tokenizer_path = tokenizer_path.as_ref();

        info!("Loading ONNX model from {:?}", model_path);

        let session = Session::builder()
            .map_err(|e| RagError::embedding(format!("Failed to create session builder: {}", e)))?
            .with_optimization_level(GraphOptimizationLevel::Level3)
            .map_err(|e| RagError::embedding(format!("Failed to set optimization level: {}", e)))?
            .with_intra_threads(num_threads.max(1))
            .map_err(|e| RagError::embedding(format!("Failed to set thread count: {}", e)))?
            .commit_from_file(model_path)
            .map_err(|e| RagError::embedding(format!("Failed to load model: {}", e)))?;

        info!("Loading tokenizer from {:?}", tokenizer_path);

        let mut tokenizer = Tokenizer::from_file(tokenizer_path)
            .map_err(|e| RagError::embedding(format!("Failed to load tokenizer: {}", e)))?;
        tokenizer
            .with_truncation(Some(TruncationParams {
                max_length: max_tokens,
                ..Default::default()
            }))
            .map_err(|e| RagError::embedding(format!("Failed to configure truncation: {}", e)))?;

        info!(
            "Embedder initialized: dim={}, max_tokens={}",
            dimension, max_tokens
        );

        Ok(Self {
            session: Mutex::new(session),
            tokenizer,
            dimension,
            max_tokens,
        })
    }

    /// Load the model described by the embedding configuration.
    pub fn from_config(config: &EmbeddingConfig) -> Result<Self> {
        Self::new(
            &config.model_path,
            config.resolved_tokenizer_path(),
            config.dimension,
            config.max_tokens,
            config.num_threads,
        )
    }

    fn embed_batch(&self, texts: &[&str]) -> Result<Vec<Vec<f32>>> {
        if texts.is_empty() {
            return Ok(Vec::new());
        }

        let encodings = self
            .tokenizer
            .encode_batch(texts.to_vec(), true)
            .map_err(|e| RagError::embedding(format!("Tokenization failed: {}", e)))?;

        let max_len = encodings
            .iter()
            .map(|e| e.get_ids().len())
            .max()
            .unwrap_or(0)
            .min(self.max_tokens);
        let batch_size = encodings.len();

        debug!("Embedding batch: size={}, max_len={}", batch_size, max_len);

        // Right-padded inputs; token types are all segment zero
        let mut input_ids = vec![0i64; batch_size * max_len];
        let mut attention_mask = vec![0i64; batch_size * max_len];
        let token_type_ids = vec![0i64; batch_size * max_len];

        for (i, encoding) in encodings.iter().enumerate() {
            let ids = encoding.get_ids();
            let mask = encoding.get_attention_mask();
            for j in 0..ids.len().min(max_len) {
                input_ids[i * max_len + j] = ids[j] as i64;
                attention_mask[i * max_len + j] = mask[j] as i64;
            }
        }

        let shape = vec![batch_size, max_len];
        let input_ids_tensor = Tensor::from_array((shape.clone(), input_ids))
            .map_err(|e| RagError::embedding(format!("Failed to create input tensor: {}", e)))?;
        let attention_mask_tensor = Tensor::from_array((shape.clone(), attention_mask))
            .map_err(|e| RagError::embedding(format!("Failed to create mask tensor: {}", e)))?;
        let token_type_tensor = Tensor::from_array((shape, token_type_ids))
            .map_err(|e| RagError::embedding(format!("Failed to create token type tensor: {}", e)))?;

        let mut session = self
            .session
            .lock()
            .map_err(|e| RagError::embedding(format!("Failed to lock session: {}", e)))?;

        let outputs = session
            .run(ort::inputs![
                "input_ids" => input_ids_tensor,
                "attention_mask" => attention_mask_tensor,
                "token_type_ids" => token_type_tensor
            ])
            .map_err(|e| RagError::embedding(format!("Inference failed: {}", e)))?;

        let (_, output) = outputs
            .iter()
            .next()
            .ok_or_else(|| RagError::embedding("No output tensor found"))?;

        let view = output
            .try_extract_array::<f32>()
            .map_err(|e| RagError::embedding(format!("Failed to extract tensor: {}", e)))?;

        let embeddings = match view.shape().len() {
            3 => mean_pool(&view, &encodings, max_len),
            2 => {
                let hidden = view.shape()[1];
                (0..batch_size)
                    .map(|i| l2_normalize((0..hidden).map(|j| view[[i, j]]).collect()))
                    .collect()
            }
            _ => {
                return Err(RagError::embedding(format!(
                    "Unexpected output shape: {:?}",
                    view.shape()
                )))
            }
        };

        if let Some(bad) = embeddings.iter().find(|e| e.len() != self.dimension) {
            return Err(RagError::embedding(format!(
                "Model produced {} dimensions, expected {}",
                bad.len(),
                self.dimension
            )));
        }

        Ok(embeddings)
    }
}

/// Attention-masked mean over the sequence axis of `[batch, seq, hidden]`.
fn mean_pool(tensor: &ArrayViewD<'_, f32>, encodings: &[Encoding], max_len: usize) -> Vec<Vec<f32>> {
    let seq_len = tensor.shape()[1];
    let hidden = tensor.shape()[2];

    encodings
        .iter()
        .enumerate()
        .map(|(i, encoding)| {
            let mask = encoding.get_attention_mask();
            let mut sum = vec![0.0f32; hidden];
            let mut count = 0usize;

            for j in 0..mask.len().min(max_len).min(seq_len) {
                if mask[j] == 1 {
                    count += 1;
                    for (k, s) in sum.iter_mut().enumerate() {
                        *s += tensor[[i, j, k]];
                    }
                }
            }

            if count == 0 {
                return sum;
            }
            l2_normalize(sum.into_iter().map(|s| s / count as f32).collect())
        })
        .collect()
}

#[async_trait]
impl Embedder for OnnxEmbedder {
    async fn embed_documents(&self, texts: &[&str]) -> Result<Vec<Vec<f32>>> {
        self.embed_batch(texts)
    }

    async fn embed_query(&self, text: &str) -> Result<Vec<f32>> {
        self.embed_batch(&[text])?
            .into_iter()
            .next()
            .ok_or_else(|| RagError::embedding("No embedding returned"))
    }

    fn dimension(&self) -> usize {
        self.dimension
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_missing_model_fails() {
        let dir = tempfile::tempdir().unwrap();
        let result = OnnxEmbedder::new(
            dir.path().join("missing.onnx"),
            dir.path().join("tokenizer.json"),
            384,
            256,
            1,
        );
        assert!(matches!(result, Err(RagError::Embedding { .. })));
    }
}
