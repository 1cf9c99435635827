//! # docchat CLI
//!
//! Runs the three stages of the client-manual chatbot: index definition,
//! ingestion, and the chat UI.
//!
//! ## Usage
//!
//! ```bash
//! docchat [--config ./config/docchat.toml] <command>
//! ```
//!
//! ## Commands
//!
//! | Command | Description |
//! |---------|-------------|
//! | `docchat create-index` | Create or update the search index |
//! | `docchat ingest` | Chunk, embed and upload documents |
//! | `docchat serve` | Start the web chat UI |
//! | `docchat ask "<question>"` | Answer one question on stdout |
//! | `docchat run-all` | create-index, ingest, then serve |
//!
//! Azure endpoints and keys come from the environment; a `.env` file in the
//! working directory is loaded first.

use std::path::PathBuf;
use std::sync::Arc;

use anyhow::Context;
use clap::{Parser, Subcommand};

use docchat::chunk::SentenceChunker;
use docchat::config::{self, Config, OpenAiSettings, SearchSettings};
use docchat::embedding::AzureOpenAiEmbedder;
use docchat::generation::AzureOpenAiGenerator;
use docchat::index_cmd::ensure_chunk_index;
use docchat::ingest::{self, IngestReport, Ingestor};
use docchat::logging::{self, Stage};
use docchat::query::QueryEngine;
use docchat::search_index::AzureSearchIndex;
use docchat::server::{run_server, AppState};
use docchat::traits::IndexOutcome;

const DEFAULT_CONFIG: &str = "./config/docchat.toml";

#[derive(Parser)]
#[command(
    name = "docchat",
    about = "Chat with your client manuals using Azure AI Search and Azure OpenAI",
    version
)]
struct Cli {
    /// Path to the tuning file (TOML).
    ///
    /// Defaults to `./config/docchat.toml`; built-in defaults apply when that
    /// file does not exist.
    #[arg(long, global = true)]
    config: Option<PathBuf>,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Create the search index, or update it if it already exists.
    CreateIndex {
        /// Delete the existing index (and all its records) first.
        #[arg(long)]
        recreate: bool,
    },

    /// Ingest documents from a directory into the index.
    Ingest {
        /// Input directory. Defaults to `ingest.data_dir`.
        #[arg(long)]
        dir: Option<PathBuf>,

        /// Scan and chunk only; no remote calls.
        #[arg(long)]
        dry_run: bool,
    },

    /// Start the web chat UI.
    Serve {
        /// Bind address. Defaults to `server.bind`.
        #[arg(long)]
        bind: Option<String>,
    },

    /// Answer a single question and print it.
    Ask {
        question: String,
    },

    /// Run create-index, ingest and serve in sequence.
    RunAll {
        #[arg(long)]
        dir: Option<PathBuf>,
    },
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let _ = dotenvy::dotenv();
    let cli = Cli::parse();

    let (config_path, explicit) = match &cli.config {
        Some(path) => (path.clone(), true),
        None => (PathBuf::from(DEFAULT_CONFIG), false),
    };
    let cfg = config::load_config(&config_path, explicit)
        .with_context(|| format!("failed to load {}", config_path.display()))?;

    match cli.command {
        Commands::CreateIndex { recreate } => {
            start_logging(Stage::Index, &cfg)?;
            create_index(&cfg, recreate).await
        }
        Commands::Ingest { dir, dry_run } => {
            start_logging(Stage::Ingest, &cfg)?;
            let dir = dir.unwrap_or_else(|| cfg.ingest.data_dir.clone());
            run_ingest(&cfg, dir, dry_run).await
        }
        Commands::Serve { bind } => {
            start_logging(Stage::Chat, &cfg)?;
            let bind = bind.unwrap_or_else(|| cfg.server.bind.clone());
            let engine = build_engine(&cfg)?;
            run_server(&bind, AppState::from_config(Arc::new(engine), &cfg.server)).await
        }
        Commands::Ask { question } => {
            start_logging(Stage::Chat, &cfg)?;
            let engine = build_engine(&cfg)?;
            let answer = engine.answer(&question, &[]).await.map_err(fail)?;
            println!("{}", answer.text);
            if !answer.sources.is_empty() {
                println!();
                println!("Sources:");
                for source in &answer.sources {
                    println!("  {} ({:.3})", source.label, source.score);
                }
            }
            Ok(())
        }
        Commands::RunAll { dir } => run_all(cli.config.as_deref(), dir).await,
    }
}

fn start_logging(stage: Stage, cfg: &Config) -> anyhow::Result<()> {
    logging::init(stage, &cfg.logging).context("failed to initialise logging")?;
    logging::install_panic_hook();
    Ok(())
}

/// Record a stage failure in the stage log before it propagates.
fn fail(e: docchat::error::Error) -> anyhow::Error {
    tracing::error!(error = %e, "stage failed");
    e.into()
}

async fn create_index(cfg: &Config, recreate: bool) -> anyhow::Result<()> {
    let search = SearchSettings::from_env().map_err(fail)?;
    let index = AzureSearchIndex::new(&search, &cfg.http).map_err(fail)?;

    let outcome = ensure_chunk_index(&index, cfg.embedding.dims, recreate)
        .await
        .map_err(fail)?;
    match outcome {
        IndexOutcome::Created => println!("Index '{}' created.", search.index_name),
        IndexOutcome::Updated => println!("Index '{}' updated.", search.index_name),
    }
    Ok(())
}

async fn run_ingest(cfg: &Config, dir: PathBuf, dry_run: bool) -> anyhow::Result<()> {
    let chunker = Arc::new(SentenceChunker::from_config(&cfg.chunking));

    if dry_run {
        // no credentials needed
        let report = ingest::dry_run(chunker.as_ref(), &dir, cfg).map_err(fail)?;
        print_report(&dir, &report, true);
        return Ok(());
    }

    let search = SearchSettings::from_env().map_err(fail)?;
    let openai = OpenAiSettings::from_env().map_err(fail)?;
    let index = Arc::new(AzureSearchIndex::new(&search, &cfg.http).map_err(fail)?);
    let embedder =
        Arc::new(AzureOpenAiEmbedder::new(&openai, &cfg.embedding, &cfg.http).map_err(fail)?);

    let ingestor = Ingestor::new(chunker, embedder, index, cfg);
    let report = ingestor.ingest(&dir).await.map_err(fail)?;
    print_report(&dir, &report, false);
    Ok(())
}

fn print_report(dir: &std::path::Path, report: &IngestReport, dry_run: bool) {
    if dry_run {
        println!("ingest {} (dry-run)", dir.display());
    } else {
        println!("ingest {}", dir.display());
    }
    println!("  documents found: {}", report.documents_seen);
    println!("  ingested: {}", report.documents_ingested);
    println!("  skipped (unreadable): {}", report.documents_skipped);
    println!("  empty: {}", report.documents_empty);
    println!("  chunks: {}", report.chunks);
    if !dry_run {
        println!("  records upserted: {}", report.records_upserted);
    }
    println!("ok");
}

fn build_engine(cfg: &Config) -> anyhow::Result<QueryEngine> {
    let search = SearchSettings::from_env().map_err(fail)?;
    let openai = OpenAiSettings::from_env().map_err(fail)?;
    let index = Arc::new(AzureSearchIndex::new(&search, &cfg.http).map_err(fail)?);
    let embedder =
        Arc::new(AzureOpenAiEmbedder::new(&openai, &cfg.embedding, &cfg.http).map_err(fail)?);
    let generator =
        Arc::new(AzureOpenAiGenerator::new(&openai, &cfg.generation, &cfg.http).map_err(fail)?);
    Ok(QueryEngine::new(
        embedder,
        index,
        generator,
        &cfg.retrieval,
        &cfg.generation,
    ))
}

/// Each stage runs as its own process so each writes its own log file.
async fn run_all(config: Option<&std::path::Path>, dir: Option<PathBuf>) -> anyhow::Result<()> {
    let exe = std::env::current_exe().context("cannot locate docchat executable")?;

    let mut ingest_args = vec!["ingest".to_string()];
    if let Some(dir) = &dir {
        ingest_args.push("--dir".to_string());
        ingest_args.push(dir.display().to_string());
    }
    let stages = vec![
        vec!["create-index".to_string()],
        ingest_args,
        vec!["serve".to_string()],
    ];

    for args in stages {
        println!("==> docchat {}", args.join(" "));
        let mut cmd = tokio::process::Command::new(&exe);
        if let Some(config) = config {
            cmd.arg("--config").arg(config);
        }
        let status = cmd
            .args(&args)
            .status()
            .await
            .with_context(|| format!("failed to start docchat {}", args[0]))?;
        if !status.success() {
            anyhow::bail!("docchat {} failed ({})", args[0], status);
        }
    }
    Ok(())
}
