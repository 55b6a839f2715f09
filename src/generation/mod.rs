// Answer generation
// Language model seam used by the query engine

pub mod gemini;

pub use gemini::GeminiGenerator;

use crate::Result;

/// Produces a completion for a fully rendered prompt
pub trait Generator: Send + Sync {
    fn generate(&self, prompt: &str) -> Result<String>;
}
