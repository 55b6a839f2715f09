// Embeddings module
// Text chunking plus the embedding provider seam used by the indexer and query engine

pub mod chunking;
pub mod gemini;

pub use chunking::{Chunk, ChunkingConfig, chunk_pages, chunk_text};
pub use gemini::GeminiEmbedder;

use crate::Result;

/// Maps texts to fixed-length vectors.
///
/// Implementations must return exactly one vector per input, in input order,
/// and every vector from one embedder must have the same dimension.
pub trait Embedder: Send + Sync {
    fn embed(&self, texts: &[String]) -> Result<Vec<Vec<f32>>>;

    /// Embed a single query string
    #[inline]
    fn embed_query(&self, text: &str) -> Result<Vec<f32>> {
        self.embed(&[text.to_string()])?
            .into_iter()
            .next()
            .ok_or_else(|| crate::RagError::Embedding("no vector returned for query".to_string()))
    }
}
