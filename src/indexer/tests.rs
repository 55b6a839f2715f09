use super::*;
use crate::test_support::KeywordEmbedder;
use std::sync::atomic::Ordering;
use tempfile::TempDir;

struct Fixture {
    temp_dir: TempDir,
    embedder: Arc<KeywordEmbedder>,
    indexer: Indexer,
    store: VectorStore,
}

impl Fixture {
    async fn new() -> Self {
        Self::with_embedder(KeywordEmbedder::default()).await
    }

    async fn with_embedder(embedder: KeywordEmbedder) -> Self {
        let temp_dir = TempDir::new().expect("should create temp dir");
        let persist_dir = temp_dir.path().join("index");
        std::fs::create_dir_all(temp_dir.path().join("pdfs")).expect("should create input dir");

        let manifest = Database::initialize_from_persist_dir(&persist_dir)
            .await
            .expect("should open manifest");
        let store = VectorStore::open_or_create(&persist_dir)
            .await
            .expect("should open store");

        let embedder = Arc::new(embedder);
        let indexer = Indexer::new(
            Arc::clone(&embedder) as Arc<dyn Embedder>,
            manifest,
            ChunkingConfig {
                chunk_size: 40,
                chunk_overlap: 10,
            },
            &persist_dir,
        );

        Self {
            temp_dir,
            embedder,
            indexer,
            store,
        }
    }

    fn input_dir(&self) -> PathBuf {
        self.temp_dir.path().join("pdfs")
    }

    fn write_input(&self, name: &str, bytes: &[u8]) -> PathBuf {
        let path = self.input_dir().join(name);
        std::fs::write(&path, bytes).expect("should write input file");
        path
    }
}

/// Embeds everything into three dimensions, unlike the keyword embedder
struct NarrowEmbedder;

impl Embedder for NarrowEmbedder {
    fn embed(&self, texts: &[String]) -> Result<Vec<Vec<f32>>> {
        Ok(texts.iter().map(|_| vec![1.0, 0.0, 0.0]).collect())
    }
}

fn pages(source: &str, texts: &[&str]) -> Vec<Page> {
    texts
        .iter()
        .zip(1u32..)
        .map(|(text, page_number)| Page {
            text: (*text).to_string(),
            page_number,
            source: source.to_string(),
        })
        .collect()
}

#[test]
fn content_hash_is_hex_sha256() {
    assert_eq!(
        content_hash(b"abc"),
        "ba7816bf8f01cfea414140de5dae2223b00361a396177a9cb410ff61f20015ad"
    );
}

#[test]
fn report_summary_mentions_failures() {
    let mut report = IndexingReport::default();
    assert_eq!(report.summary(), "0 indexed (0 chunks), 0 up to date, 0 removed");

    report.failed.push(DocumentFailure {
        source: "bad.pdf".to_string(),
        error: "boom".to_string(),
    });
    assert!(report.has_failures());
    assert!(report.to_string().ends_with("1 failed"));
}

#[tokio::test]
async fn index_pages_commits_entries_and_manifest_row() {
    let mut fx = Fixture::new().await;
    let doc_pages = pages(
        "bio.pdf",
        &["Grace Hopper wrote the first compiler.", "", "She was born in 1906."],
    );

    let document = fx
        .indexer
        .index_pages("bio.pdf", &doc_pages, "hash-1", &mut fx.store)
        .await
        .expect("indexing should succeed");

    assert_eq!(document.page_count, 3);
    assert_eq!(document.chunk_count, 2);
    assert_eq!(fx.store.count().await.expect("count should succeed"), 2);

    let row = fx
        .indexer
        .manifest()
        .get_document("bio.pdf")
        .await
        .expect("manifest read should succeed")
        .expect("row should exist");
    assert!(row.is_fresh("hash-1"));
}

#[tokio::test]
async fn reindexing_replaces_previous_entries() {
    let mut fx = Fixture::new().await;

    fx.indexer
        .index_pages(
            "doc.pdf",
            &pages("doc.pdf", &["The old text mentions zebras a lot, zebras everywhere."]),
            "v1",
            &mut fx.store,
        )
        .await
        .expect("first indexing should succeed");

    fx.indexer
        .index_pages("doc.pdf", &pages("doc.pdf", &["Short new text."]), "v2", &mut fx.store)
        .await
        .expect("second indexing should succeed");

    assert_eq!(fx.store.count().await.expect("count should succeed"), 1);
    let results = fx
        .store
        .search(&KeywordEmbedder::vector_for("zebras"), 10)
        .await
        .expect("search should succeed");
    assert!(results.iter().all(|r| !r.metadata.content.contains("zebras")));
}

#[tokio::test]
async fn missing_document_leaves_store_unchanged() {
    let mut fx = Fixture::new().await;
    fx.indexer
        .index_pages("kept.pdf", &pages("kept.pdf", &["Some text."]), "h", &mut fx.store)
        .await
        .expect("indexing should succeed");

    let missing = fx.input_dir().join("missing.pdf");
    let error = fx
        .indexer
        .index_document(&missing, &mut fx.store)
        .await
        .expect_err("missing file should fail");

    assert!(matches!(error, RagError::NotFound(ref p) if *p == missing));
    assert_eq!(fx.store.count().await.expect("count should succeed"), 1);
}

#[tokio::test]
async fn embedding_failure_commits_nothing() {
    let mut fx = Fixture::with_embedder(KeywordEmbedder::failing()).await;

    let error = fx
        .indexer
        .index_pages("doc.pdf", &pages("doc.pdf", &["Some text."]), "h", &mut fx.store)
        .await
        .expect_err("embedding should fail");

    assert!(matches!(error, RagError::Embedding(_)));
    assert_eq!(fx.store.count().await.expect("count should succeed"), 0);
    assert!(
        fx.indexer
            .manifest()
            .get_document("doc.pdf")
            .await
            .expect("manifest read should succeed")
            .is_none()
    );
}

#[tokio::test]
async fn fresh_documents_are_skipped_without_extraction() {
    let mut fx = Fixture::new().await;
    // not a real PDF: extraction would fail if it were attempted
    let bytes = b"%PDF-unchanged".as_slice();
    let path = fx.write_input("same.pdf", bytes);
    let source = loader::document_id(&path);

    fx.indexer
        .index_pages(&source, &pages(&source, &["Cached text."]), &content_hash(bytes), &mut fx.store)
        .await
        .expect("seeding should succeed");
    let calls_before = fx.embedder.calls.load(Ordering::SeqCst);

    let report = fx
        .indexer
        .index_directory(&fx.input_dir(), &mut fx.store)
        .await
        .expect("pass should succeed");

    assert_eq!(report.skipped, vec![source]);
    assert!(report.indexed.is_empty());
    assert!(!report.has_failures());
    assert_eq!(fx.embedder.calls.load(Ordering::SeqCst), calls_before);
    assert_eq!(fx.store.count().await.expect("count should succeed"), 1);
}

#[tokio::test]
async fn changed_documents_are_retried_and_failures_isolated() {
    let mut fx = Fixture::new().await;
    let changed = fx.write_input("changed.pdf", b"not a pdf any more");
    let source = loader::document_id(&changed);
    fx.indexer
        .index_pages(&source, &pages(&source, &["Previous text."]), "stale-hash", &mut fx.store)
        .await
        .expect("seeding should succeed");

    let fresh_bytes = b"%PDF-fresh".as_slice();
    let fresh = fx.write_input("fresh.pdf", fresh_bytes);
    let fresh_source = loader::document_id(&fresh);
    fx.indexer
        .index_pages(
            &fresh_source,
            &pages(&fresh_source, &["Fresh text."]),
            &content_hash(fresh_bytes),
            &mut fx.store,
        )
        .await
        .expect("seeding should succeed");

    let report = fx
        .indexer
        .index_directory(&fx.input_dir(), &mut fx.store)
        .await
        .expect("pass should succeed despite one failure");

    assert_eq!(report.failed.len(), 1);
    assert_eq!(report.failed[0].source, source);
    assert_eq!(report.skipped, vec![fresh_source]);

    // the failed document keeps its old entries and is not marked fresh
    let row = fx
        .indexer
        .manifest()
        .get_document(&source)
        .await
        .expect("manifest read should succeed")
        .expect("old row should remain");
    assert!(!row.is_fresh(&content_hash(b"not a pdf any more")));
    assert_eq!(fx.store.count().await.expect("count should succeed"), 2);
}

#[tokio::test]
async fn vanished_documents_are_pruned() {
    let mut fx = Fixture::new().await;
    let gone = fx.input_dir().join("gone.pdf");
    let source = loader::document_id(&gone);
    fx.indexer
        .index_pages(&source, &pages(&source, &["Ephemeral text."]), "h", &mut fx.store)
        .await
        .expect("seeding should succeed");

    let report = fx
        .indexer
        .index_directory(&fx.input_dir(), &mut fx.store)
        .await
        .expect("pass should succeed");

    assert_eq!(report.removed, vec![source]);
    assert_eq!(fx.store.count().await.expect("count should succeed"), 0);
    assert!(
        fx.indexer
            .manifest()
            .list_documents()
            .await
            .expect("manifest read should succeed")
            .is_empty()
    );
}

#[tokio::test]
async fn rebuild_clears_before_indexing() {
    let mut fx = Fixture::new().await;
    let kept = fx.input_dir().join("kept.pdf");
    let source = loader::document_id(&kept);
    fx.indexer
        .index_pages(&source, &pages(&source, &["Indexed once."]), "h", &mut fx.store)
        .await
        .expect("seeding should succeed");

    let report = fx
        .indexer
        .rebuild(&fx.input_dir(), &mut fx.store)
        .await
        .expect("rebuild should succeed");

    assert!(report.removed.is_empty());
    assert_eq!(fx.store.count().await.expect("count should succeed"), 0);
    assert!(!fx.temp_dir.path().join("index").join(lock::LOCK_FILE_NAME).exists());
}

#[tokio::test]
async fn concurrent_pass_is_refused() {
    let mut fx = Fixture::new().await;
    let _held = IndexLock::acquire(&fx.temp_dir.path().join("index")).expect("should acquire lock");

    let error = fx
        .indexer
        .index_directory(&fx.input_dir(), &mut fx.store)
        .await
        .expect_err("pass should be refused");
    assert!(matches!(error, RagError::Store(_)));
}

#[tokio::test]
async fn missing_input_directory_is_not_found() {
    let mut fx = Fixture::new().await;
    let missing = fx.temp_dir.path().join("nowhere");

    let error = fx
        .indexer
        .index_directory(&missing, &mut fx.store)
        .await
        .expect_err("missing directory should fail");
    assert!(matches!(error, RagError::NotFound(_)));
}

#[tokio::test]
async fn rejected_reindex_keeps_previous_entries() {
    let mut fx = Fixture::new().await;
    for source in ["a.pdf", "b.pdf"] {
        fx.indexer
            .index_pages(source, &pages(source, &["Indexed with keywords."]), "v1", &mut fx.store)
            .await
            .expect("seeding should succeed");
    }
    let count_before = fx.store.count().await.expect("count should succeed");

    let narrow = Indexer::new(
        Arc::new(NarrowEmbedder),
        fx.indexer.manifest().clone(),
        ChunkingConfig::default(),
        &fx.temp_dir.path().join("index"),
    );
    let error = narrow
        .index_pages("a.pdf", &pages("a.pdf", &["Different model."]), "v2", &mut fx.store)
        .await
        .expect_err("dimension change should be rejected");

    assert!(matches!(error, RagError::Store(_)));
    assert_eq!(fx.store.count().await.expect("count should succeed"), count_before);
    let row = fx
        .indexer
        .manifest()
        .get_document("a.pdf")
        .await
        .expect("manifest read should succeed")
        .expect("row should remain");
    assert!(row.is_fresh("v1"));
    let sources = fx.store.sources().await.expect("sources should succeed");
    assert!(sources.contains("a.pdf"));
}

#[tokio::test]
async fn orphaned_store_entries_are_pruned() {
    let mut fx = Fixture::new().await;
    let orphan = loader::document_id(&fx.input_dir().join("orphan.pdf"));
    fx.indexer
        .index_pages(&orphan, &pages(&orphan, &["Left behind by a crash."]), "h", &mut fx.store)
        .await
        .expect("seeding should succeed");
    fx.indexer
        .manifest()
        .remove_document(&orphan)
        .await
        .expect("manifest write should succeed");

    let report = fx
        .indexer
        .index_directory(&fx.input_dir(), &mut fx.store)
        .await
        .expect("pass should succeed");

    assert_eq!(report.removed, vec![orphan]);
    assert_eq!(fx.store.count().await.expect("count should succeed"), 0);
}

#[tokio::test]
async fn pass_stops_when_lock_is_taken_over() {
    let mut fx = Fixture::new().await;
    fx.write_input("doc.pdf", b"%PDF-whatever");
    let persist_dir = fx.temp_dir.path().join("index");

    let lock = IndexLock::acquire(&persist_dir).expect("should acquire lock");
    let _successor = IndexLock::acquire_with_stale_age(&persist_dir, std::time::Duration::ZERO)
        .expect("zero stale age should take over");

    let error = fx
        .indexer
        .run_pass(&fx.input_dir(), &mut fx.store, &lock)
        .await
        .expect_err("pass should stop without the lock");
    assert!(matches!(error, RagError::Store(_)));
    assert_eq!(fx.embedder.calls.load(Ordering::SeqCst), 0);
}
