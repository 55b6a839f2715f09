use anyhow::{Context, Result};
use console::style;
use dialoguer::Input;
use indicatif::{ProgressBar, ProgressStyle};
use std::sync::Arc;
use std::time::Duration;
use tracing::info;

use crate::config::Config;
use crate::database::{Database, VectorStore};
use crate::embeddings::GeminiEmbedder;
use crate::gemini::GeminiClient;
use crate::indexer::{Indexer, IndexingReport};
use crate::query::QueryOutcome;
use crate::session::QaSystem;

fn spinner(message: String) -> ProgressBar {
    let spinner = ProgressBar::new_spinner();
    if let Ok(template) = ProgressStyle::with_template("{spinner:.cyan} {msg}") {
        spinner.set_style(template);
    }
    spinner.set_message(message);
    spinner.enable_steady_tick(Duration::from_millis(100));
    spinner
}

async fn initialize_system(config: Config) -> Result<QaSystem> {
    let progress = spinner(format!(
        "Preparing index from {}...",
        config.input_dir().display()
    ));
    let result = QaSystem::initialize(config).await;
    progress.finish_and_clear();

    let system = result.context("Failed to initialize QA system. Please check configuration.")?;
    print_report(system.indexing_report());
    Ok(system)
}

fn print_report(report: &IndexingReport) {
    for document in &report.indexed {
        println!(
            "{} Indexed {} ({} pages, {} chunks)",
            style("✓").green(),
            document.path,
            document.page_count,
            document.chunk_count
        );
    }
    for source in &report.removed {
        println!("{} Removed {}", style("-").yellow(), source);
    }
    for failure in &report.failed {
        println!(
            "{} Failed {}: {}",
            style("✗").red(),
            failure.source,
            failure.error
        );
    }
    println!("{}", style(report.summary()).dim());
}

fn print_outcome(outcome: &QueryOutcome) {
    println!("{}", outcome.answer.trim());

    let pages = outcome.source_pages();
    if !pages.is_empty() {
        println!();
        println!("{}", style("Sources:").bold());
        for (source, page) in pages {
            println!("  {} (page {})", style(source).cyan(), page);
        }
    }
}

/// Run an indexing pass over the configured input directory
#[inline]
pub async fn run_index(config: &Config, rebuild: bool) -> Result<IndexingReport> {
    config.require_provider()?;

    let persist_dir = config.persist_dir();
    let input_dir = config.input_dir();

    let embedder = GeminiEmbedder::new(&config.gemini).context("Failed to create embedding client")?;
    let manifest = Database::initialize_from_persist_dir(&persist_dir).await?;
    let mut store = VectorStore::open_or_create(&persist_dir).await?;
    let indexer = Indexer::new(
        Arc::new(embedder),
        manifest,
        config.chunking.clone(),
        &persist_dir,
    );

    let progress = spinner(format!("Indexing PDFs in {}...", input_dir.display()));
    let result = if rebuild {
        indexer.rebuild(&input_dir, &mut store).await
    } else {
        indexer.index_directory(&input_dir, &mut store).await
    };
    progress.finish_and_clear();

    let report = result.context("Indexing failed")?;
    print_report(&report);
    Ok(report)
}

/// Answer a single question and print the cited pages
#[inline]
pub async fn ask_question(config: Config, question: &str) -> Result<()> {
    let system = initialize_system(config).await?;

    let progress = spinner("Thinking...".to_string());
    let result = system.engine().ask(question).await;
    progress.finish_and_clear();

    let outcome = result.context("Error processing query")?;
    print_outcome(&outcome);
    Ok(())
}

/// One line typed into the chat loop
#[derive(Debug, PartialEq, Eq)]
enum ChatInput<'a> {
    Empty,
    Exit,
    Clear,
    Question(&'a str),
}

impl<'a> ChatInput<'a> {
    fn parse(line: &'a str) -> Self {
        let line = line.trim();
        if line.is_empty() {
            Self::Empty
        } else if line.eq_ignore_ascii_case("exit") || line.eq_ignore_ascii_case("quit") {
            Self::Exit
        } else if line.eq_ignore_ascii_case("/clear") {
            Self::Clear
        } else {
            Self::Question(line)
        }
    }
}

/// Interactive question loop; `/clear` empties the history and `exit` quits
#[inline]
pub async fn run_chat(config: Config) -> Result<()> {
    let system = initialize_system(config).await?;
    let mut session = system.session();

    eprintln!("{}", style("📚 docchat").bold().cyan());
    eprintln!(
        "Answering from {} using the {} best matching passages per question.",
        style(system.config().input_dir().display()).cyan(),
        system.engine().top_k()
    );
    if !session.index_ready() {
        eprintln!(
            "{}",
            style("The index is empty; answers will not cite any documents.").yellow()
        );
    }
    eprintln!("Type a question, /clear to clear the history, or exit to quit.");

    loop {
        let line: String = Input::new()
            .with_prompt("You")
            .allow_empty(true)
            .interact_text()?;
        match ChatInput::parse(&line) {
            ChatInput::Empty => {}
            ChatInput::Exit => break,
            ChatInput::Clear => {
                session.clear_history();
                eprintln!("{}", style("Chat history cleared.").dim());
            }
            ChatInput::Question(question) => {
                let progress = spinner("Thinking...".to_string());
                let result = session.ask(question).await;
                progress.finish_and_clear();

                match result {
                    Ok(outcome) => print_outcome(&outcome),
                    Err(e) => eprintln!("{} {}", style("Error processing query:").red(), e),
                }
                println!();
            }
        }
    }

    info!("Chat ended after {} messages", session.history().len());
    Ok(())
}

/// Show which documents are indexed and how many entries the store holds
#[inline]
pub async fn show_status(config: &Config) -> Result<()> {
    let persist_dir = config.persist_dir();
    let manifest = Database::initialize_from_persist_dir(&persist_dir).await?;
    let store = VectorStore::open_or_create(&persist_dir).await?;

    let documents = manifest.list_documents().await?;
    let entries = store.count().await?;

    println!("{}", style("📊 Index Status").bold().cyan());
    println!("  Input directory: {}", config.input_dir().display());
    println!("  Index directory: {}", persist_dir.display());
    println!("  Entries: {}", entries);
    match store.vector_dimension() {
        Some(dimension) => println!("  Vector dimension: {}", dimension),
        None => println!("  Vector dimension: {}", style("none yet").dim()),
    }
    println!();

    if documents.is_empty() {
        println!("No documents have been indexed yet.");
        println!("Use 'docchat index' to index the PDFs in the input directory.");
        return Ok(());
    }

    println!("Indexed documents ({} total):", documents.len());
    for document in &documents {
        println!(
            "  📄 {} - {} pages, {} chunks, indexed {}",
            document.path,
            document.page_count,
            document.chunk_count,
            document.indexed_at.format("%Y-%m-%d %H:%M:%S UTC")
        );
    }

    Ok(())
}

/// Print every model the API key can see, with the methods it supports
#[inline]
pub fn list_models(config: &Config) -> Result<()> {
    config.gemini.validate()?;
    let client = GeminiClient::new(&config.gemini)?;
    let models = client.list_models()?;

    if models.is_empty() {
        println!("No models available for this API key.");
        return Ok(());
    }

    println!("Available models ({} total):", models.len());
    for model in &models {
        println!();
        println!("{}", style(&model.name).bold());
        if let Some(display_name) = &model.display_name {
            println!("  Name: {}", display_name);
        }
        println!(
            "  Methods: {}",
            model.supported_generation_methods.join(", ")
        );
    }

    Ok(())
}
