//! docrag-embed - Sentence embeddings
//!
//! Provides the embedders used for chunk and query vectors:
//!
//! - [`OnnxEmbedder`]: all-MiniLM-L6-v2 (or compatible) through ONNX Runtime,
//!   mean pooled and L2 normalized, 384 dimensions
//! - [`HashingEmbedder`]: model-free feature hashing for offline use
//!
//! [`load_embedder`] picks one from configuration and returns `None` when
//! embeddings are unavailable.

mod hashing;
mod loader;
mod onnx;

pub use hashing::HashingEmbedder;
pub use loader::load_embedder;
pub use onnx::OnnxEmbedder;

// Re-export the Embedder trait for convenience
pub use docrag_core::Embedder;

/// L2 normalize a vector in place; zero vectors are returned unchanged.
pub(crate) fn l2_normalize(mut v: Vec<f32>) -> Vec<f32> {
    let norm: f32 = v.iter().map(|x| x * x).sum::<f32>().sqrt();
    if norm > 0.0 {
        for x in &mut v {
            *x /= norm;
        }
    }
    v
}
