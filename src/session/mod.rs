// System bootstrap and chat sessions


use std::fmt;
use std::sync::Arc;

use serde::{Deserialize, Serialize};
use tracing::{info, warn};

use crate::config::Config;
use crate::database::{Database, VectorStore};
use crate::embeddings::{Embedder, GeminiEmbedder};
use crate::generation::{GeminiGenerator, Generator};
use crate::indexer::{Indexer, IndexingReport};
use crate::query::{QueryEngine, QueryOutcome};
use crate::{RagError, Result};

fn unavailable(context: &str, e: impl fmt::Display) -> RagError {
    RagError::Unavailable(format!("{}: {}", context, e))
}

/// A ready question-answering system: index refreshed, providers connected
pub struct QaSystem {
    config: Config,
    engine: QueryEngine,
    report: IndexingReport,
    index_ready: bool,
}

impl QaSystem {
    /// Build the Gemini-backed system described by `config`.
    ///
    /// Credentials and model names are checked before any client exists, so a
    /// misconfiguration fails with `RagError::Config` without network traffic.
    #[inline]
    pub async fn initialize(config: Config) -> Result<Self> {
        config.require_provider()?;

        let embedder = GeminiEmbedder::new(&config.gemini)
            .map_err(|e| unavailable("Failed to create embedding client", e))?;
        let generator = GeminiGenerator::new(&config.gemini)
            .map_err(|e| unavailable("Failed to create generation client", e))?;

        Self::initialize_with(config, Arc::new(embedder), Arc::new(generator)).await
    }

    /// Same as [`QaSystem::initialize`] with caller-supplied providers
    #[inline]
    pub async fn initialize_with(
        config: Config,
        embedder: Arc<dyn Embedder>,
        generator: Arc<dyn Generator>,
    ) -> Result<Self> {
        config.validate()?;

        let persist_dir = config.persist_dir();
        let input_dir = config.input_dir();

        let manifest = Database::initialize_from_persist_dir(&persist_dir)
            .await
            .map_err(|e| unavailable("Failed to open index manifest", format!("{:#}", e)))?;
        let mut store = VectorStore::open_or_create(&persist_dir)
            .await
            .map_err(|e| unavailable("Failed to open vector store", e))?;

        let indexer = Indexer::new(
            Arc::clone(&embedder),
            manifest,
            config.chunking.clone(),
            &persist_dir,
        );

        let report = match indexer.index_directory(&input_dir, &mut store).await {
            Ok(report) => report,
            Err(RagError::NotFound(_)) => {
                warn!("Input directory {} does not exist", input_dir.display());
                IndexingReport::default()
            }
            Err(e) => return Err(unavailable("Indexing failed", e)),
        };

        for failure in &report.failed {
            warn!("Skipped {}: {}", failure.source, failure.error);
        }

        let entries = store
            .count()
            .await
            .map_err(|e| unavailable("Failed to read vector store", e))?;
        let discovered = report.indexed.len() + report.skipped.len() + report.failed.len();
        if entries == 0 && discovered == 0 {
            return Err(RagError::Unavailable(format!(
                "No PDFs found in {}",
                input_dir.display()
            )));
        }

        info!("System ready: {} ({} entries)", report, entries);

        let engine = QueryEngine::new(embedder, generator, store, config.retrieval.top_k);
        Ok(Self {
            config,
            engine,
            report,
            index_ready: entries > 0,
        })
    }

    #[inline]
    pub fn engine(&self) -> &QueryEngine {
        &self.engine
    }

    #[inline]
    pub fn config(&self) -> &Config {
        &self.config
    }

    /// What the startup indexing pass did
    #[inline]
    pub fn indexing_report(&self) -> &IndexingReport {
        &self.report
    }

    #[inline]
    pub fn index_ready(&self) -> bool {
        self.index_ready
    }

    #[inline]
    pub fn session(&self) -> ChatSession<'_> {
        ChatSession::new(&self.engine, self.index_ready)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Role {
    User,
    Assistant,
}

impl fmt::Display for Role {
    #[inline]
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match *self {
            Role::User => write!(f, "user"),
            Role::Assistant => write!(f, "assistant"),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ChatMessage {
    pub role: Role,
    pub content: String,
}

/// One conversation: the visible history plus the engine answering it
pub struct ChatSession<'a> {
    engine: &'a QueryEngine,
    history: Vec<ChatMessage>,
    index_ready: bool,
}

impl<'a> ChatSession<'a> {
    #[inline]
    pub fn new(engine: &'a QueryEngine, index_ready: bool) -> Self {
        Self {
            engine,
            history: Vec::new(),
            index_ready,
        }
    }

    /// Ask a question. The question is always recorded; the answer only when
    /// it succeeds, and an error leaves the session usable.
    #[inline]
    pub async fn ask(&mut self, question: &str) -> Result<QueryOutcome> {
        self.history.push(ChatMessage {
            role: Role::User,
            content: question.to_string(),
        });

        let outcome = self.engine.ask(question).await?;
        self.history.push(ChatMessage {
            role: Role::Assistant,
            content: outcome.answer.clone(),
        });
        Ok(outcome)
    }

    #[inline]
    pub fn history(&self) -> &[ChatMessage] {
        &self.history
    }

    #[inline]
    pub fn clear_history(&mut self) {
        self.history.clear();
    }

    #[inline]
    pub fn index_ready(&self) -> bool {
        self.index_ready
    }
}
