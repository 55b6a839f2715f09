use std::path::PathBuf;

use thiserror::Error;

pub type Result<T> = std::result::Result<T, RagError>;

#[derive(Error, Debug)]
pub enum RagError {
    #[error("Configuration error: {0}")]
    Config(#[from] config::ConfigError),

    #[error("Document not found: {}", .0.display())]
    NotFound(PathBuf),

    #[error("Text extraction error: {0}")]
    Extraction(String),

    #[error("Embedding service error: {0}")]
    Embedding(String),

    #[error("Generation service error: {0}")]
    Generation(String),

    #[error("Vector store error: {0}")]
    Store(String),

    #[error("System unavailable: {0}")]
    Unavailable(String),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Other error: {0}")]
    Other(#[from] anyhow::Error),
}

impl RagError {
    /// Whether this error means the system never became ready, as opposed to
    /// a single operation failing on a working system
    #[inline]
    pub fn is_startup_failure(&self) -> bool {
        matches!(self, Self::Config(_) | Self::Unavailable(_))
    }
}

pub mod commands;
pub mod config;
pub mod database;
pub mod embeddings;
pub mod gemini;
pub mod generation;
pub mod indexer;
pub mod loader;
pub mod query;
pub mod session;

#[cfg(test)]
pub(crate) mod test_support;
