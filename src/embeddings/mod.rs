// Embeddings module
// Turns documents into chunks and chunks into vectors through the Ollama embedding API


pub mod ollama;
pub mod splitter;

use anyhow::Result;

pub use ollama::{ModelInfo, OllamaEmbedder};
pub use splitter::{Chunk, DEFAULT_SEPARATORS, RecursiveSplitter};

/// Maps text to L2-normalized vectors of a fixed dimension
pub trait Embedder: Send + Sync {
    /// Embed a batch of document texts, one vector per input, in input order
    fn embed_documents(&self, texts: &[String]) -> Result<Vec<Vec<f32>>>;

    fn embed_query(&self, text: &str) -> Result<Vec<f32>>;

    fn model_name(&self) -> &str;
}

/// Scale `vector` to unit length. Zero vectors are left unchanged.
#[inline]
pub fn normalize(mut vector: Vec<f32>) -> Vec<f32> {
    let norm = vector.iter().map(|v| v * v).sum::<f32>().sqrt();
    if norm > 0.0 {
        for value in &mut vector {
            *value /= norm;
        }
    }
    vector
}
