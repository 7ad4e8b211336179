//! # docqa CLI
//!
//! ## Usage
//!
//! ```bash
//! docqa [--config ./config/docqa.toml] <command>
//! ```
//!
//! ## Commands
//!
//! | Command | Description |
//! |---------|-------------|
//! | `docqa serve` | Start the HTTP server (upload page on `/`) |
//! | `docqa ingest <files...>` | Index PDFs from disk, same rules as `/upload` |
//! | `docqa ask "<question>"` | Answer a question from the persisted index |
//! | `docqa stats` | Summarize the persisted index |
//!
//! API keys are read from the environment; a `.env` file in the working
//! directory is loaded first when present. Log verbosity follows `RUST_LOG`
//! (default `docqa=info,tower_http=info`).

use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use std::path::{Path, PathBuf};

use docqa::config::{self, Config};
use docqa::embedding::create_embedder;
use docqa::llm::create_chat_model;
use docqa::service::{QaService, UploadedFile};

const DEFAULT_CONFIG_PATH: &str = "./config/docqa.toml";

/// Ask questions about your PDFs.
#[derive(Parser)]
#[command(
    name = "docqa",
    about = "Upload PDFs, index them for semantic retrieval, and ask grounded questions",
    version
)]
struct Cli {
    /// Path to a TOML configuration file.
    ///
    /// Defaults to `./config/docqa.toml` when that file exists; otherwise
    /// built-in defaults are used.
    #[arg(long, global = true)]
    config: Option<PathBuf>,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Start the HTTP server.
    Serve,

    /// Index PDF files from disk and save the index.
    Ingest {
        /// PDF files to index.
        #[arg(required = true)]
        paths: Vec<PathBuf>,
    },

    /// Answer a question from the indexed documents.
    Ask {
        question: String,

        /// Print the answer and sources as JSON.
        #[arg(long)]
        json: bool,
    },

    /// Show what the persisted index contains.
    Stats,
}

fn init_tracing() {
    use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "docqa=info,tower_http=info".into()),
        )
        .with(tracing_subscriber::fmt::layer().with_writer(std::io::stderr))
        .init();
}

/// Load `--config`, else the default path if present, else defaults.
fn resolve_config(path: Option<&Path>) -> Result<Config> {
    match path {
        Some(p) => config::load_config(p),
        None if Path::new(DEFAULT_CONFIG_PATH).exists() => {
            config::load_config(Path::new(DEFAULT_CONFIG_PATH))
        }
        None => {
            let cfg = Config::default();
            config::validate(&cfg)?;
            Ok(cfg)
        }
    }
}

async fn open_service(cfg: &Config) -> Result<QaService> {
    let embedder = create_embedder(&cfg.embedding)?;
    let llm = create_chat_model(&cfg.llm)?;
    QaService::open(cfg.clone(), embedder, llm).await
}

async fn run_ingest(cfg: &Config, paths: &[PathBuf]) -> Result<()> {
    let mut files = Vec::with_capacity(paths.len());
    for path in paths {
        let bytes = tokio::fs::read(path)
            .await
            .with_context(|| format!("Failed to read {}", path.display()))?;
        let filename = path
            .file_name()
            .map(|n| n.to_string_lossy().to_string())
            .unwrap_or_default();
        files.push(UploadedFile { filename, bytes });
    }

    let service = open_service(cfg).await?;
    let report = service.ingest(files).await?;

    println!(
        "Indexed {} chunk(s) from {} file(s) into {}",
        report.chunks,
        report.filenames.len(),
        cfg.index.path.display()
    );
    for name in &report.filenames {
        println!("  + {}", name);
    }
    for name in &report.skipped {
        println!("  - {} (skipped)", name);
    }
    Ok(())
}

async fn run_ask(cfg: &Config, question: &str, json: bool) -> Result<()> {
    let service = open_service(cfg).await?;
    let answer = service.ask(question).await?;

    if json {
        println!("{}", serde_json::to_string_pretty(&answer)?);
        return Ok(());
    }

    println!("{}", answer.answer.trim_end());
    if !answer.sources.is_empty() {
        println!();
        println!("Sources: {}", answer.sources.join(", "));
    }
    Ok(())
}

#[tokio::main]
async fn main() -> Result<()> {
    dotenvy::dotenv().ok();
    init_tracing();

    let cli = Cli::parse();
    let cfg = resolve_config(cli.config.as_deref())?;

    match cli.command {
        Commands::Serve => docqa::server::run_server(&cfg).await?,
        Commands::Ingest { paths } => run_ingest(&cfg, &paths).await?,
        Commands::Ask { question, json } => run_ask(&cfg, &question, json).await?,
        Commands::Stats => docqa::stats::run_stats(&cfg).await?,
    }

    Ok(())
}
