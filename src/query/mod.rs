// Query engine
// Retrieve the nearest chunks for a question, stuff them into a prompt, generate an answer


use std::sync::Arc;

use itertools::Itertools;
use tracing::{debug, info};

use crate::database::{SearchResult, VectorStore};
use crate::embeddings::Embedder;
use crate::generation::Generator;
use crate::{RagError, Result};

pub const DEFAULT_TOP_K: usize = 4;

const INSTRUCTION: &str = "Use the following pieces of context to answer the question at the end. \
If you don't know the answer, just say that you don't know, don't try to make up an answer.";

/// An answer together with the chunks it was generated from, best match first
#[derive(Debug, Clone)]
pub struct QueryOutcome {
    pub answer: String,
    pub sources: Vec<SearchResult>,
}

impl QueryOutcome {
    /// Distinct (source, page) pairs cited by the retrieved chunks, in rank order
    #[inline]
    pub fn source_pages(&self) -> Vec<(&str, u32)> {
        self.sources
            .iter()
            .map(|r| (r.metadata.source.as_str(), r.metadata.page_number))
            .unique()
            .collect()
    }
}

/// Render the prompt sent to the generator: instruction, every retrieved chunk, then the question
#[inline]
pub fn build_prompt(question: &str, sources: &[SearchResult]) -> String {
    let context = sources
        .iter()
        .map(|result| result.metadata.content.as_str())
        .join("\n\n");

    format!(
        "{}\n\n{}\n\nQuestion: {}\nHelpful Answer:",
        INSTRUCTION, context, question
    )
}

pub struct QueryEngine {
    embedder: Arc<dyn Embedder>,
    generator: Arc<dyn Generator>,
    store: VectorStore,
    top_k: usize,
}

impl QueryEngine {
    #[inline]
    pub fn new(
        embedder: Arc<dyn Embedder>,
        generator: Arc<dyn Generator>,
        store: VectorStore,
        top_k: usize,
    ) -> Self {
        Self {
            embedder,
            generator,
            store,
            top_k,
        }
    }

    #[inline]
    pub fn store(&self) -> &VectorStore {
        &self.store
    }

    #[inline]
    pub fn top_k(&self) -> usize {
        self.top_k
    }

    /// The `top_k` chunks nearest to the question
    #[inline]
    pub async fn retrieve(&self, question: &str) -> Result<Vec<SearchResult>> {
        let embedder = Arc::clone(&self.embedder);
        let text = question.to_string();
        let query_vector = tokio::task::spawn_blocking(move || embedder.embed_query(&text))
            .await
            .map_err(|e| RagError::Embedding(format!("Embedding task failed: {}", e)))??;

        let results = self.store.search(&query_vector, self.top_k).await?;
        debug!("Retrieved {} chunks for question", results.len());
        Ok(results)
    }

    #[inline]
    pub async fn ask(&self, question: &str) -> Result<QueryOutcome> {
        let sources = self.retrieve(question).await?;
        let prompt = build_prompt(question, &sources);

        let generator = Arc::clone(&self.generator);
        let answer = tokio::task::spawn_blocking(move || generator.generate(&prompt))
            .await
            .map_err(|e| RagError::Generation(format!("Generation task failed: {}", e)))??;

        info!(
            "Answered question using {} retrieved chunks",
            sources.len()
        );
        Ok(QueryOutcome { answer, sources })
    }

    #[inline]
    pub async fn answer(&self, question: &str) -> Result<String> {
        self.ask(question).await.map(|outcome| outcome.answer)
    }
}
