// Indexer module
// Turns PDFs into embedded chunks in the vector store and keeps the manifest in step

pub mod lock;

#[cfg(test)]
mod tests;

use std::collections::HashSet;
use std::fmt;
use std::path::{Path, PathBuf};
use std::sync::Arc;

use chrono::Utc;
use sha2::{Digest, Sha256};
use tracing::{debug, info, warn};

use crate::database::{Database, IndexEntry, IndexedDocument, VectorStore};
use crate::embeddings::{ChunkingConfig, Embedder, chunk_pages};
use crate::loader::{self, Page};
use crate::{RagError, Result};

pub use lock::IndexLock;

/// Builds and refreshes the vector index from a directory of PDFs
pub struct Indexer {
    embedder: Arc<dyn Embedder>,
    manifest: Database,
    chunking: ChunkingConfig,
    persist_dir: PathBuf,
}

/// A document that could not be indexed during a pass
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DocumentFailure {
    pub source: String,
    pub error: String,
}

/// Outcome of an indexing pass
#[derive(Debug, Clone, Default)]
pub struct IndexingReport {
    /// Documents (re)indexed during this pass
    pub indexed: Vec<IndexedDocument>,
    /// Documents whose indexed copy was already up to date
    pub skipped: Vec<String>,
    /// Documents no longer present in the input directory
    pub removed: Vec<String>,
    pub failed: Vec<DocumentFailure>,
}

impl IndexingReport {
    #[inline]
    pub fn chunks_added(&self) -> usize {
        self.indexed
            .iter()
            .map(|doc| usize::try_from(doc.chunk_count).unwrap_or_default())
            .sum()
    }

    #[inline]
    pub fn has_failures(&self) -> bool {
        !self.failed.is_empty()
    }

    #[inline]
    pub fn summary(&self) -> String {
        let mut summary = format!(
            "{} indexed ({} chunks), {} up to date, {} removed",
            self.indexed.len(),
            self.chunks_added(),
            self.skipped.len(),
            self.removed.len()
        );
        if self.has_failures() {
            summary.push_str(&format!(", {} failed", self.failed.len()));
        }
        summary
    }
}

impl fmt::Display for IndexingReport {
    #[inline]
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.summary())
    }
}

/// Lowercase hex SHA-256 of a document's bytes
#[inline]
pub fn content_hash(bytes: &[u8]) -> String {
    hex::encode(Sha256::digest(bytes))
}

fn manifest_error(e: anyhow::Error) -> RagError {
    RagError::Store(format!("Index manifest: {:#}", e))
}

impl Indexer {
    #[inline]
    pub fn new(
        embedder: Arc<dyn Embedder>,
        manifest: Database,
        chunking: ChunkingConfig,
        persist_dir: &Path,
    ) -> Self {
        Self {
            embedder,
            manifest,
            chunking,
            persist_dir: persist_dir.to_path_buf(),
        }
    }

    #[inline]
    pub fn manifest(&self) -> &Database {
        &self.manifest
    }

    /// Index one PDF, replacing any entries it already has in the store.
    ///
    /// A missing file fails with `NotFound` before anything is read or written.
    #[inline]
    pub async fn index_document(
        &self,
        pdf_path: &Path,
        store: &mut VectorStore,
    ) -> Result<IndexedDocument> {
        let (source, bytes) = Self::read_document(pdf_path).await?;
        let hash = content_hash(&bytes);
        self.index_bytes(&source, bytes, &hash, store).await
    }

    async fn read_document(pdf_path: &Path) -> Result<(String, Vec<u8>)> {
        if !pdf_path.exists() {
            return Err(RagError::NotFound(pdf_path.to_path_buf()));
        }
        let bytes = tokio::fs::read(pdf_path).await?;
        Ok((loader::document_id(pdf_path), bytes))
    }

    async fn index_bytes(
        &self,
        source: &str,
        bytes: Vec<u8>,
        hash: &str,
        store: &mut VectorStore,
    ) -> Result<IndexedDocument> {
        let owned_source = source.to_string();
        let pages = tokio::task::spawn_blocking(move || {
            loader::load_pages_from_bytes(&owned_source, &bytes)
        })
        .await
        .map_err(|e| RagError::Extraction(format!("{}: {}", source, e)))??;

        self.index_pages(source, &pages, hash, store).await
    }

    /// Index already-extracted pages under `source`.
    ///
    /// Embedding happens before anything is written, and the new entries are
    /// committed before the old ones are removed. A failure leaves the
    /// document's previous entries and manifest row as they were; the row is
    /// rewritten only after the store holds the new entries.
    #[inline]
    pub async fn index_pages(
        &self,
        source: &str,
        pages: &[Page],
        content_hash: &str,
        store: &mut VectorStore,
    ) -> Result<IndexedDocument> {
        let chunks = chunk_pages(pages, &self.chunking);
        debug!(
            "{}: {} pages produced {} chunks",
            source,
            pages.len(),
            chunks.len()
        );

        let texts: Vec<String> = chunks.iter().map(|chunk| chunk.content.clone()).collect();
        let vectors = self.embed(texts).await?;
        if vectors.len() != chunks.len() {
            return Err(RagError::Embedding(format!(
                "Expected {} vectors for {}, got {}",
                chunks.len(),
                source,
                vectors.len()
            )));
        }

        let indexed_at = Utc::now();
        let entries: Vec<IndexEntry> = chunks
            .into_iter()
            .zip(vectors)
            .map(|(chunk, vector)| IndexEntry::from_chunk(chunk, vector, indexed_at))
            .collect();

        store.replace_source(source, &entries).await?;

        let document = IndexedDocument {
            path: source.to_string(),
            content_hash: content_hash.to_string(),
            page_count: pages.len() as i64,
            chunk_count: entries.len() as i64,
            indexed_at,
        };
        self.manifest
            .record_document(&document)
            .await
            .map_err(manifest_error)?;

        info!("Indexed {} ({} chunks)", source, entries.len());
        Ok(document)
    }

    async fn embed(&self, texts: Vec<String>) -> Result<Vec<Vec<f32>>> {
        if texts.is_empty() {
            return Ok(Vec::new());
        }
        let embedder = Arc::clone(&self.embedder);
        tokio::task::spawn_blocking(move || embedder.embed(&texts))
            .await
            .map_err(|e| RagError::Embedding(format!("Embedding task failed: {}", e)))?
    }

    /// Bring the store in line with the PDFs in `input_dir`.
    ///
    /// Unchanged documents are skipped, new and changed ones are indexed, and
    /// documents that disappeared are removed. A failing document is recorded
    /// in the report without stopping the pass.
    #[inline]
    pub async fn index_directory(
        &self,
        input_dir: &Path,
        store: &mut VectorStore,
    ) -> Result<IndexingReport> {
        let lock = IndexLock::acquire(&self.persist_dir)?;
        self.run_pass(input_dir, store, &lock).await
    }

    /// Forget everything, then index `input_dir` from scratch
    #[inline]
    pub async fn rebuild(
        &self,
        input_dir: &Path,
        store: &mut VectorStore,
    ) -> Result<IndexingReport> {
        let lock = IndexLock::acquire(&self.persist_dir)?;

        info!("Rebuilding index from {}", input_dir.display());
        self.manifest.clear().await.map_err(manifest_error)?;
        store.clear().await?;

        self.run_pass(input_dir, store, &lock).await
    }

    async fn run_pass(
        &self,
        input_dir: &Path,
        store: &mut VectorStore,
        lock: &IndexLock,
    ) -> Result<IndexingReport> {
        let pdfs = loader::discover_pdfs(input_dir)?;
        let mut report = IndexingReport::default();

        let present: HashSet<String> = pdfs.iter().map(|p| loader::document_id(p)).collect();
        let known = self.manifest.list_documents().await.map_err(manifest_error)?;
        for document in known.into_iter().filter(|d| !present.contains(&d.path)) {
            info!("Removing vanished document {}", document.path);
            self.manifest
                .remove_document(&document.path)
                .await
                .map_err(manifest_error)?;
            store.delete_source(&document.path).await?;
            report.removed.push(document.path);
        }

        // Entries written by a pass that died before recording its manifest row
        for source in store.sources().await? {
            if present.contains(&source) {
                continue;
            }
            info!("Removing orphaned entries of {}", source);
            store.delete_source(&source).await?;
            report.removed.push(source);
        }

        for pdf_path in &pdfs {
            lock.refresh()?;
            let source = loader::document_id(pdf_path);
            match self.refresh_document(pdf_path, store).await {
                Ok(Some(document)) => report.indexed.push(document),
                Ok(None) => {
                    debug!("{} is up to date", source);
                    report.skipped.push(source);
                }
                Err(e) => {
                    warn!("Failed to index {}: {}", source, e);
                    report.failed.push(DocumentFailure {
                        source,
                        error: e.to_string(),
                    });
                }
            }
        }

        info!("Indexing pass finished: {}", report);
        Ok(report)
    }

    /// Index the document unless its manifest row already matches its bytes
    async fn refresh_document(
        &self,
        pdf_path: &Path,
        store: &mut VectorStore,
    ) -> Result<Option<IndexedDocument>> {
        let (source, bytes) = Self::read_document(pdf_path).await?;
        let hash = content_hash(&bytes);

        let existing = self
            .manifest
            .get_document(&source)
            .await
            .map_err(manifest_error)?;
        if existing.is_some_and(|doc| doc.is_fresh(&hash)) {
            return Ok(None);
        }

        self.index_bytes(&source, bytes, &hash, store)
            .await
            .map(Some)
    }
}
