
use anyhow::{Context, Result};
use console::style;
use dialoguer::{Confirm, Input};
use std::path::Path;

use super::{Config, ConfigError, GeminiConfig};
use crate::gemini::GeminiClient;

#[inline]
pub fn run_interactive_config(config_dir: &Path) -> Result<()> {
    eprintln!("{}", style("🔧 docchat Configuration Setup").bold().cyan());
    eprintln!();

    let mut config = load_existing_config(config_dir);

    eprintln!("{}", style("Gemini Configuration").bold().yellow());
    eprintln!("The API key is read from GOOGLE_API_KEY and is never written to config.toml.");
    eprintln!();

    configure_gemini(&mut config.gemini)?;

    eprintln!();
    eprintln!("{}", style("Retrieval Configuration").bold().yellow());
    configure_retrieval(&mut config)?;

    eprintln!();
    eprintln!("{}", style("Testing configuration...").yellow());

    match test_gemini_connection(&config) {
        Some(true) => eprintln!("{}", style("✓ Gemini connection successful!").green()),
        Some(false) => {
            eprintln!(
                "{}",
                style("⚠ Warning: Could not list Gemini models").yellow()
            );
            eprintln!("Check your API key and network before indexing.");
        }
        None => eprintln!(
            "{}",
            style("Skipped: GOOGLE_API_KEY is not set").dim()
        ),
    }

    eprintln!();
    if Confirm::new()
        .with_prompt("Save configuration?")
        .default(true)
        .interact()?
    {
        config.save().context("Failed to save configuration")?;
        eprintln!("{}", style("✓ Configuration saved successfully!").green());
        eprintln!(
            "Configuration saved to: {}",
            style(config.config_file_path().display()).cyan()
        );
    } else {
        eprintln!("Configuration not saved.");
    }

    Ok(())
}

#[inline]
pub fn show_config(config_dir: &Path) -> Result<()> {
    let config = Config::load(config_dir).context("Failed to load configuration")?;

    eprintln!("{}", style("📋 Current Configuration").bold().cyan());
    eprintln!();

    eprintln!("{}", style("Gemini Settings:").bold().yellow());
    match config.gemini_url() {
        Ok(url) => eprintln!("  Base URL: {}", style(url).cyan()),
        Err(e) => eprintln!("  Base URL: {} ({})", style("Invalid").red(), e),
    }
    eprintln!(
        "  API Key: {}",
        if config.gemini.api_key.is_some() {
            style("set").green()
        } else {
            style("missing").red()
        }
    );
    eprintln!(
        "  Embedding Model: {}",
        style(display_model(&config.gemini.embedding_model)).cyan()
    );
    eprintln!(
        "  Generation Model: {}",
        style(display_model(&config.gemini.generation_model)).cyan()
    );
    eprintln!("  Temperature: {}", style(config.gemini.temperature).cyan());
    eprintln!("  Timeout: {}s", style(config.gemini.timeout_secs).cyan());

    eprintln!();
    eprintln!("{}", style("Indexing Settings:").bold().yellow());
    eprintln!("  Chunk Size: {}", style(config.chunking.chunk_size).cyan());
    eprintln!(
        "  Chunk Overlap: {}",
        style(config.chunking.chunk_overlap).cyan()
    );
    eprintln!("  Top K: {}", style(config.retrieval.top_k).cyan());
    eprintln!(
        "  Input Directory: {}",
        style(config.input_dir().display()).cyan()
    );
    eprintln!(
        "  Index Directory: {}",
        style(config.persist_dir().display()).cyan()
    );

    if let Err(e) = config.require_provider() {
        eprintln!();
        eprintln!("{} {}", style("⚠").yellow(), e);
    }

    eprintln!();
    eprintln!(
        "Config file: {}",
        style(config.config_file_path().display()).dim()
    );

    Ok(())
}

fn display_model(model: &str) -> &str {
    if model.is_empty() { "<not set>" } else { model }
}

fn load_existing_config(config_dir: &Path) -> Config {
    match Config::load(config_dir) {
        Ok(config) => {
            eprintln!("{}", style("Found existing configuration.").green());
            config
        }
        Err(_) => {
            eprintln!(
                "{}",
                style("No existing configuration found. Using defaults.").yellow()
            );
            let mut config = Config::with_base_dir(config_dir);
            config.apply_env_overrides();
            config
        }
    }
}

fn configure_gemini(gemini: &mut GeminiConfig) -> Result<()> {
    let base_url: String = Input::new()
        .with_prompt("Gemini API base URL")
        .default(gemini.base_url.clone())
        .validate_with(|input: &String| -> Result<(), ConfigError> {
            let temp_config = GeminiConfig {
                base_url: input.clone(),
                ..GeminiConfig::default()
            };
            temp_config.gemini_url()?;
            Ok(())
        })
        .interact_text()?;

    let embedding_model: String = Input::new()
        .with_prompt("Embedding model")
        .with_initial_text(gemini.embedding_model.clone())
        .validate_with(not_blank("Model name cannot be empty"))
        .interact_text()?;

    let generation_model: String = Input::new()
        .with_prompt("Generation model")
        .with_initial_text(gemini.generation_model.clone())
        .validate_with(not_blank("Model name cannot be empty"))
        .interact_text()?;

    gemini.set_base_url(base_url)?;
    gemini.set_embedding_model(embedding_model)?;
    gemini.set_generation_model(generation_model)?;

    Ok(())
}

fn configure_retrieval(config: &mut Config) -> Result<()> {
    let chunk_size: usize = Input::new()
        .with_prompt("Chunk size (characters)")
        .default(config.chunking.chunk_size)
        .validate_with(|input: &usize| -> Result<(), &str> {
            if (1..=10_000).contains(input) {
                Ok(())
            } else {
                Err("Chunk size must be between 1 and 10000")
            }
        })
        .interact_text()?;

    let chunk_overlap: usize = Input::new()
        .with_prompt("Chunk overlap (characters)")
        .default(config.chunking.chunk_overlap.min(chunk_size.saturating_sub(1)))
        .validate_with(|input: &usize| -> Result<(), &str> {
            if *input < chunk_size {
                Ok(())
            } else {
                Err("Overlap must be smaller than the chunk size")
            }
        })
        .interact_text()?;

    let top_k: usize = Input::new()
        .with_prompt("Passages retrieved per question")
        .default(config.retrieval.top_k)
        .validate_with(|input: &usize| -> Result<(), &str> {
            if (1..=100).contains(input) {
                Ok(())
            } else {
                Err("Must be between 1 and 100")
            }
        })
        .interact_text()?;

    config.chunking.chunk_size = chunk_size;
    config.chunking.chunk_overlap = chunk_overlap;
    config.retrieval.top_k = top_k;

    Ok(())
}

fn not_blank(message: &'static str) -> impl Fn(&String) -> Result<(), &'static str> {
    move |input: &String| {
        if input.trim().is_empty() {
            Err(message)
        } else {
            Ok(())
        }
    }
}

/// `None` when there is no credential to test with
fn test_gemini_connection(config: &Config) -> Option<bool> {
    config.gemini.api_key.as_ref()?;

    let reachable = GeminiClient::new(&config.gemini)
        .and_then(|client| client.list_models())
        .is_ok();
    Some(reachable)
}
