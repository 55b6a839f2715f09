#![expect(
    clippy::tests_outside_test_module,
    reason = "integration tests are only compiled in test mode"
)]

// End-to-end pipeline tests: real PDFs on disk, Gemini endpoints served by wiremock

use std::sync::Arc;
use std::sync::atomic::{AtomicUsize, Ordering};

use docchat::RagError;
use docchat::config::{ApiKey, Config};
use docchat::session::{QaSystem, Role};
use serde_json::{Value, json};
use tempfile::TempDir;
use wiremock::matchers::{method, path};
use wiremock::{Mock, MockServer, Request, ResponseTemplate};

const EMBEDDING_MODEL: &str = "text-embedding-004";
const GENERATION_MODEL: &str = "gemini-2.0-flash";
const DIMENSION: usize = 16;

/// Build a minimal PDF with one Helvetica text line per page
fn pdf_with_pages(pages: &[&str]) -> Vec<u8> {
    let mut objects: Vec<String> = vec![
        "<< /Type /Catalog /Pages 2 0 R >>".to_string(),
        String::new(),
        "<< /Type /Font /Subtype /Type1 /BaseFont /Helvetica /Encoding /WinAnsiEncoding >>"
            .to_string(),
    ];

    let mut kids = Vec::new();
    for text in pages {
        let page_id = objects.len() + 1;
        let content = format!("BT /F1 12 Tf 72 712 Td ({}) Tj ET", text);
        objects.push(format!(
            "<< /Type /Page /Parent 2 0 R /MediaBox [0 0 612 792] /Contents {} 0 R /Resources << /Font << /F1 3 0 R >> >> >>",
            page_id + 1
        ));
        objects.push(format!(
            "<< /Length {} >>\nstream\n{}\nendstream",
            content.len(),
            content
        ));
        kids.push(format!("{} 0 R", page_id));
    }
    objects[1] = format!(
        "<< /Type /Pages /Kids [{}] /Count {} >>",
        kids.join(" "),
        pages.len()
    );

    let mut pdf = String::from("%PDF-1.4\n");
    let mut offsets = Vec::new();
    for (index, body) in objects.iter().enumerate() {
        offsets.push(pdf.len());
        pdf.push_str(&format!("{} 0 obj\n{}\nendobj\n", index + 1, body));
    }

    let xref_offset = pdf.len();
    pdf.push_str(&format!("xref\n0 {}\n", objects.len() + 1));
    pdf.push_str("0000000000 65535 f \n");
    for offset in offsets {
        pdf.push_str(&format!("{:010} 00000 n \n", offset));
    }
    pdf.push_str(&format!(
        "trailer\n<< /Size {} /Root 1 0 R >>\nstartxref\n{}\n%%EOF\n",
        objects.len() + 1,
        xref_offset
    ));

    pdf.into_bytes()
}

fn keyword_vector(text: &str) -> Vec<f32> {
    let mut vector = vec![0.0; DIMENSION];
    vector[DIMENSION - 1] = 0.01;
    for word in text
        .split(|c: char| !c.is_alphanumeric())
        .filter(|w| !w.is_empty())
    {
        let bucket = word
            .to_lowercase()
            .bytes()
            .fold(7u64, |h, b| h.wrapping_mul(31).wrapping_add(u64::from(b)))
            % (DIMENSION as u64 - 1);
        vector[bucket as usize] += 1.0;
    }
    vector
}

struct FakeGemini {
    server: MockServer,
    embed_requests: Arc<AtomicUsize>,
    generate_requests: Arc<AtomicUsize>,
}

impl FakeGemini {
    async fn start() -> Self {
        let server = MockServer::start().await;
        let embed_requests = Arc::new(AtomicUsize::new(0));
        let generate_requests = Arc::new(AtomicUsize::new(0));

        let embed_counter = Arc::clone(&embed_requests);
        Mock::given(method("POST"))
            .and(path(format!(
                "/v1beta/models/{}:batchEmbedContents",
                EMBEDDING_MODEL
            )))
            .respond_with(move |request: &Request| {
                embed_counter.fetch_add(1, Ordering::SeqCst);
                let body: Value = serde_json::from_slice(&request.body).expect("json body");
                let embeddings: Vec<Value> = body["requests"]
                    .as_array()
                    .expect("requests array")
                    .iter()
                    .map(|r| {
                        let text = r["content"]["parts"][0]["text"].as_str().expect("text");
                        json!({ "values": keyword_vector(text) })
                    })
                    .collect();
                ResponseTemplate::new(200).set_body_json(json!({ "embeddings": embeddings }))
            })
            .mount(&server)
            .await;

        let generate_counter = Arc::clone(&generate_requests);
        Mock::given(method("POST"))
            .and(path(format!(
                "/v1beta/models/{}:generateContent",
                GENERATION_MODEL
            )))
            .respond_with(move |request: &Request| {
                generate_counter.fetch_add(1, Ordering::SeqCst);
                let body: Value = serde_json::from_slice(&request.body).expect("json body");
                let prompt = body["contents"][0]["parts"][0]["text"]
                    .as_str()
                    .expect("prompt");
                let answer = if prompt.contains("1977") {
                    "She was born in 1977."
                } else {
                    "I don't know."
                };
                ResponseTemplate::new(200).set_body_json(json!({
                    "candidates": [{ "content": { "parts": [{ "text": answer }] } }]
                }))
            })
            .mount(&server)
            .await;

        Self {
            server,
            embed_requests,
            generate_requests,
        }
    }

    fn config(&self, base_dir: &std::path::Path) -> Config {
        let mut config = Config::with_base_dir(base_dir);
        config.gemini.base_url = self.server.uri();
        config.gemini.api_key = Some(ApiKey::new("test-key"));
        config.gemini.embedding_model = EMBEDDING_MODEL.to_string();
        config.gemini.generation_model = GENERATION_MODEL.to_string();
        config
    }
}

fn write_library(temp_dir: &TempDir) {
    let input_dir = temp_dir.path().join("pdfs");
    std::fs::create_dir_all(&input_dir).expect("should create input dir");
    std::fs::write(
        input_dir.join("biography.pdf"),
        pdf_with_pages(&[
            "Chapter one describes a quiet village by the sea.",
            "Marie Laurent was born in 1977 in Lyon.",
        ]),
    )
    .expect("should write pdf");
    std::fs::write(
        input_dir.join("atlas.pdf"),
        pdf_with_pages(&["Rivers flow toward distant oceans."]),
    )
    .expect("should write pdf");
}

#[tokio::test(flavor = "multi_thread")]
async fn question_is_answered_from_indexed_pdfs() {
    let gemini = FakeGemini::start().await;
    let temp_dir = TempDir::new().expect("should create temp dir");
    write_library(&temp_dir);

    let system = QaSystem::initialize(gemini.config(temp_dir.path()))
        .await
        .expect("system should initialize");

    let report = system.indexing_report();
    assert_eq!(report.indexed.len(), 2, "report: {}", report);
    assert!(report.failed.is_empty(), "failures: {:?}", report.failed);
    assert!(system.index_ready());
    assert_eq!(
        system.engine().store().count().await.expect("count should succeed"),
        3
    );

    let mut session = system.session();
    let outcome = session
        .ask("When was Marie Laurent born?")
        .await
        .expect("question should be answered");

    assert_eq!(outcome.answer, "She was born in 1977.");
    let top = &outcome.sources[0].metadata;
    assert!(top.source.ends_with("biography.pdf"));
    assert_eq!(top.page_number, 2);
    assert_eq!(session.history().len(), 2);
    assert_eq!(session.history()[1].role, Role::Assistant);
    assert_eq!(gemini.generate_requests.load(Ordering::SeqCst), 1);
}

#[tokio::test(flavor = "multi_thread")]
async fn restart_reuses_index_for_unchanged_pdfs() {
    let gemini = FakeGemini::start().await;
    let temp_dir = TempDir::new().expect("should create temp dir");
    write_library(&temp_dir);

    let first = QaSystem::initialize(gemini.config(temp_dir.path()))
        .await
        .expect("first start should succeed");
    assert_eq!(first.indexing_report().indexed.len(), 2);
    drop(first);
    let embeds_after_first = gemini.embed_requests.load(Ordering::SeqCst);

    let second = QaSystem::initialize(gemini.config(temp_dir.path()))
        .await
        .expect("second start should succeed");
    assert_eq!(second.indexing_report().skipped.len(), 2);
    assert!(second.indexing_report().indexed.is_empty());
    assert_eq!(gemini.embed_requests.load(Ordering::SeqCst), embeds_after_first);
    assert_eq!(
        second.engine().store().count().await.expect("count should succeed"),
        3
    );
}

#[tokio::test(flavor = "multi_thread")]
async fn changed_pdf_replaces_its_entries() {
    let gemini = FakeGemini::start().await;
    let temp_dir = TempDir::new().expect("should create temp dir");
    write_library(&temp_dir);

    drop(
        QaSystem::initialize(gemini.config(temp_dir.path()))
            .await
            .expect("first start should succeed"),
    );

    std::fs::write(
        temp_dir.path().join("pdfs").join("biography.pdf"),
        pdf_with_pages(&["A single revised page."]),
    )
    .expect("should rewrite pdf");
    std::fs::remove_file(temp_dir.path().join("pdfs").join("atlas.pdf"))
        .expect("should remove pdf");

    let system = QaSystem::initialize(gemini.config(temp_dir.path()))
        .await
        .expect("restart should succeed");
    let report = system.indexing_report();
    assert_eq!(report.indexed.len(), 1);
    assert_eq!(report.removed.len(), 1);
    assert_eq!(
        system.engine().store().count().await.expect("count should succeed"),
        1
    );
}

#[tokio::test(flavor = "multi_thread")]
async fn provider_outage_fails_one_question_only() {
    let gemini = FakeGemini::start().await;
    let temp_dir = TempDir::new().expect("should create temp dir");
    write_library(&temp_dir);

    let system = QaSystem::initialize(gemini.config(temp_dir.path()))
        .await
        .expect("system should initialize");
    let mut session = system.session();

    // Provider goes down after startup
    gemini.server.reset().await;
    Mock::given(method("POST"))
        .respond_with(ResponseTemplate::new(503))
        .mount(&gemini.server)
        .await;

    let error = session
        .ask("When was Marie Laurent born?")
        .await
        .expect_err("outage should fail the question");
    assert!(matches!(error, RagError::Embedding(_)));
    assert!(!error.is_startup_failure());
    assert_eq!(session.history().len(), 1);
}
