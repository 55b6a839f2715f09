
use serde::{Deserialize, Serialize};
use tracing::debug;

use crate::loader::Page;

/// A contiguous window of page text ready for embedding
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Chunk {
    /// The chunk text
    pub content: String,
    /// Identifier of the source document (its path)
    pub source: String,
    /// 1-based page number the chunk was cut from
    pub page_number: u32,
    /// Character offset of the chunk within its page
    pub chunk_offset: usize,
    /// Position of this chunk within the whole document
    pub chunk_index: usize,
}

impl Chunk {
    /// Character range covered within the page
    #[inline]
    pub fn char_range(&self) -> std::ops::Range<usize> {
        self.chunk_offset..self.chunk_offset + self.content.chars().count()
    }
}

/// Configuration for fixed-window chunking, measured in characters
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct ChunkingConfig {
    /// Maximum chunk length
    pub chunk_size: usize,
    /// Characters shared by consecutive chunks of the same page
    pub chunk_overlap: usize,
}

impl Default for ChunkingConfig {
    #[inline]
    fn default() -> Self {
        Self {
            chunk_size: 1000,
            chunk_overlap: 100,
        }
    }
}

impl ChunkingConfig {
    /// Distance between the starts of consecutive chunks
    #[inline]
    pub fn stride(&self) -> usize {
        self.chunk_size.saturating_sub(self.chunk_overlap).max(1)
    }
}

/// Chunk every page of a document, keeping page order
#[inline]
pub fn chunk_pages(pages: &[Page], config: &ChunkingConfig) -> Vec<Chunk> {
    let mut chunks = Vec::new();

    for page in pages {
        if page.text.trim().is_empty() {
            debug!("Skipping blank page {} of {}", page.page_number, page.source);
            continue;
        }

        for (chunk_offset, content) in chunk_text(&page.text, config) {
            chunks.push(Chunk {
                content,
                source: page.source.clone(),
                page_number: page.page_number,
                chunk_offset,
                chunk_index: chunks.len(),
            });
        }
    }

    debug!(
        "Chunked {} pages into {} chunks (avg {} chars)",
        pages.len(),
        chunks.len(),
        chunks
            .iter()
            .map(|c| c.content.chars().count())
            .sum::<usize>()
            / chunks.len().max(1)
    );

    chunks
}

/// Walk `text` in windows of `chunk_size` characters, each starting
/// `chunk_size - chunk_overlap` characters after the previous one.
/// Returns `(character offset, chunk text)` pairs; the last window may be short.
#[inline]
pub fn chunk_text(text: &str, config: &ChunkingConfig) -> Vec<(usize, String)> {
    let chars: Vec<char> = text.chars().collect();
    let len = chars.len();
    let size = config.chunk_size.max(1);
    let stride = config.stride();

    let mut windows = Vec::with_capacity(len / stride + 1);
    let mut start = 0;

    while start < len {
        let end = (start + size).min(len);
        windows.push((start, chars[start..end].iter().collect()));

        if end == len {
            break;
        }
        start += stride;
    }

    windows
}
