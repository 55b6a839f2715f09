// Document loader
// Reads PDFs from disk and extracts their text one page at a time


use std::fs;
use std::path::{Path, PathBuf};

use tracing::{debug, info};

use crate::{RagError, Result};

/// Plain text of a single PDF page
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Page {
    /// Extracted text, as laid out by the extractor
    pub text: String,
    /// 1-based page number
    pub page_number: u32,
    /// Identifier of the document the page belongs to
    pub source: String,
}

/// Identifier used for a document everywhere in the index
#[inline]
pub fn document_id(path: &Path) -> String {
    path.to_string_lossy().into_owned()
}

/// Load every page of the PDF at `path`, in page order
#[inline]
pub fn load_pages(path: &Path) -> Result<Vec<Page>> {
    if !path.exists() {
        return Err(RagError::NotFound(path.to_path_buf()));
    }

    let bytes = fs::read(path)?;
    load_pages_from_bytes(&document_id(path), &bytes)
}

/// Extract the pages of an in-memory PDF
#[inline]
pub fn load_pages_from_bytes(source: &str, bytes: &[u8]) -> Result<Vec<Page>> {
    // The extractor can panic on malformed fonts; keep that from taking the process down
    let data = bytes.to_vec();
    let texts = std::thread::spawn(move || {
        pdf_extract::extract_text_from_mem_by_pages(&data).map_err(|e| e.to_string())
    })
    .join()
    .map_err(|_| RagError::Extraction(format!("{}: PDF extractor crashed", source)))?
    .map_err(|e| RagError::Extraction(format!("{}: {}", source, e)))?;

    let pages = texts
        .into_iter()
        .zip(1u32..)
        .map(|(text, page_number)| Page {
            text,
            page_number,
            source: source.to_string(),
        })
        .collect::<Vec<_>>();

    debug!("Extracted {} pages from {}", pages.len(), source);
    Ok(pages)
}

/// List the `*.pdf` files directly inside `dir`, sorted by path
#[inline]
pub fn discover_pdfs(dir: &Path) -> Result<Vec<PathBuf>> {
    if !dir.is_dir() {
        return Err(RagError::NotFound(dir.to_path_buf()));
    }

    let mut pdfs = Vec::new();
    for entry in fs::read_dir(dir)? {
        let path = entry?.path();
        if path.is_file() && is_pdf(&path) {
            pdfs.push(path);
        }
    }
    pdfs.sort();

    info!("Found {} PDF files in {}", pdfs.len(), dir.display());
    Ok(pdfs)
}

fn is_pdf(path: &Path) -> bool {
    path.extension()
        .and_then(|ext| ext.to_str())
        .is_some_and(|ext| ext.eq_ignore_ascii_case("pdf"))
}
