// LanceDB vector database module
// Handles vector storage and similarity search for chunk embeddings


pub mod vector_store;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::embeddings::Chunk;

/// One embedded chunk as stored in the vector table
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct IndexEntry {
    /// Unique identifier for this entry
    pub id: String,
    /// The chunk's embedding
    pub vector: Vec<f32>,
    pub metadata: ChunkMetadata,
}

/// Chunk text and provenance stored alongside its embedding
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct ChunkMetadata {
    /// Identifier of the source document
    pub source: String,
    /// 1-based page the chunk was cut from
    pub page_number: u32,
    /// Character offset of the chunk within its page
    pub chunk_offset: usize,
    /// Position of the chunk within its document
    pub chunk_index: usize,
    /// The chunk text
    pub content: String,
    /// RFC 3339 timestamp of when the entry was written
    pub indexed_at: String,
}

impl IndexEntry {
    #[inline]
    pub fn from_chunk(chunk: Chunk, vector: Vec<f32>, indexed_at: DateTime<Utc>) -> Self {
        Self {
            id: Uuid::new_v4().to_string(),
            vector,
            metadata: ChunkMetadata {
                source: chunk.source,
                page_number: chunk.page_number,
                chunk_offset: chunk.chunk_offset,
                chunk_index: chunk.chunk_index,
                content: chunk.content,
                indexed_at: indexed_at.to_rfc3339(),
            },
        }
    }
}
