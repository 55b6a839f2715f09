use std::path::PathBuf;

use anyhow::Result;
use clap::{Parser, Subcommand};
use docchat::commands::{ask_question, list_models, run_chat, run_index, show_status};
use docchat::config::{Config, run_interactive_config, show_config};

#[derive(Parser)]
#[command(name = "docchat")]
#[command(about = "Ask questions about a folder of PDF documents")]
#[command(version)]
struct Cli {
    /// Directory holding config.toml; relative input and index paths resolve against it
    #[arg(long, global = true, default_value = ".")]
    dir: PathBuf,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Configure the Gemini models and retrieval settings
    Config {
        /// Show current configuration
        #[arg(long)]
        show: bool,
    },
    /// Index new and changed PDFs from the input directory
    Index {
        /// Discard the existing index and rebuild it from scratch
        #[arg(long)]
        rebuild: bool,
    },
    /// Answer a single question
    Ask {
        /// The question to ask
        #[arg(required = true, num_args = 1..)]
        question: Vec<String>,
    },
    /// Start an interactive chat session
    Chat,
    /// Show indexed documents and index statistics
    Status,
    /// List the models available to the configured API key
    Models,
}

#[tokio::main]
async fn main() -> Result<()> {
    // a missing .env file is fine
    let _ = dotenv::dotenv();

    tracing_subscriber::fmt()
        .with_env_filter(tracing_subscriber::EnvFilter::from_default_env())
        .with_writer(std::io::stderr)
        .init();

    let cli = Cli::parse();

    match cli.command {
        Commands::Config { show } => {
            if show {
                show_config(&cli.dir)?;
            } else {
                run_interactive_config(&cli.dir)?;
            }
        }
        Commands::Index { rebuild } => {
            run_index(&Config::load(&cli.dir)?, rebuild).await?;
        }
        Commands::Ask { question } => {
            ask_question(Config::load(&cli.dir)?, &question.join(" ")).await?;
        }
        Commands::Chat => {
            run_chat(Config::load(&cli.dir)?).await?;
        }
        Commands::Status => {
            show_status(&Config::load(&cli.dir)?).await?;
        }
        Commands::Models => {
            list_models(&Config::load(&cli.dir)?)?;
        }
    }

    Ok(())
}
