//! # Talk to Docs CLI (`ttd`)
//!
//! ## Usage
//!
//! ```bash
//! ttd --config ./config/ttd.toml <command>
//! ```
//!
//! ## Commands
//!
//! | Command | Description |
//! |---------|-------------|
//! | `ttd ingest <paths…>` | Index files or directories (txt, md, pdf, docx) |
//! | `ttd search "<query>"` | Show the passages most similar to a query |
//! | `ttd ask "<question>"` | Answer a question from the indexed documents |
//! | `ttd stats` | Summarize the index |
//! | `ttd reset` | Remove every indexed document |
//!
//! Results are printed to stdout; logs go to stderr (`RUST_LOG` controls
//! verbosity).

use anyhow::{bail, Context};
use clap::{Parser, Subcommand};
use std::path::PathBuf;

use talk_to_docs::config;
use talk_to_docs::index_store::IndexStore;
use talk_to_docs::loader;
use talk_to_docs::logging;
use talk_to_docs::stats;
use talk_to_docs::Engine;
use talk_to_docs_core::models::{Answer, RetrievalResult};

/// Talk to Docs CLI: ask questions about your own documents.
///
/// All commands accept a `--config` flag pointing to a TOML configuration
/// file. See `config/ttd.example.toml` for a full example.
#[derive(Parser)]
#[command(
    name = "ttd",
    about = "Talk to Docs — ask questions about your own documents",
    version,
    long_about = "Talk to Docs chunks and embeds your documents into a local vector index \
    and answers questions with a language model grounded in the most relevant passages. \
    When no model is reachable it falls back to quoting those passages."
)]
struct Cli {
    /// Path to configuration file (TOML).
    ///
    /// Defaults to `./config/ttd.toml`. A missing file at the default
    /// location means "use built-in defaults".
    #[arg(long, global = true, default_value = DEFAULT_CONFIG)]
    config: PathBuf,

    #[command(subcommand)]
    command: Commands,
}

const DEFAULT_CONFIG: &str = "./config/ttd.toml";

/// Top-level CLI commands.
#[derive(Subcommand)]
enum Commands {
    /// Index one or more files or directories.
    ///
    /// Directories are walked recursively for supported files. Each file
    /// is validated (type and size), extracted, chunked, embedded and
    /// added to the index as one unit.
    Ingest {
        /// Files or directories to ingest.
        #[arg(required = true)]
        paths: Vec<PathBuf>,
    },

    /// Show the passages most similar to a query.
    Search {
        /// The search query.
        query: String,

        /// Maximum number of passages (overrides `retrieval.top_k`).
        #[arg(long)]
        top_k: Option<usize>,

        /// Minimum similarity (overrides `retrieval.score_threshold`).
        #[arg(long)]
        threshold: Option<f32>,

        /// Print results as JSON.
        #[arg(long)]
        json: bool,
    },

    /// Answer a question from the indexed documents.
    ///
    /// Falls back to a clearly labeled list of the most relevant passages
    /// when the generation provider is disabled or unavailable.
    Ask {
        /// The question to answer.
        question: String,

        /// Maximum number of passages used as context.
        #[arg(long)]
        top_k: Option<usize>,

        /// Minimum similarity for a passage to be used.
        #[arg(long)]
        threshold: Option<f32>,

        /// Print the answer as JSON.
        #[arg(long)]
        json: bool,
    },

    /// Show index statistics.
    Stats,

    /// Remove every indexed document and delete the index artifact.
    Reset,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    logging::init();
    let cli = Cli::parse();

    let cfg = if !cli.config.exists() && cli.config == PathBuf::from(DEFAULT_CONFIG) {
        tracing::debug!("no config file at {}, using defaults", DEFAULT_CONFIG);
        config::Config::default()
    } else {
        config::load_config(&cli.config)?
    };

    match cli.command {
        // Reset must work even when the artifact no longer matches the
        // configured embedder, so it never loads the index.
        Commands::Reset => run_reset(&cfg).await?,
        command => {
            let engine = Engine::open(cfg).await?;
            run_command(&engine, command).await?;
        }
    }

    Ok(())
}

async fn run_command(engine: &Engine, command: Commands) -> anyhow::Result<()> {
    match command {
        Commands::Ingest { paths } => run_ingest(engine, &paths).await?,
        Commands::Search {
            query,
            top_k,
            threshold,
            json,
        } => {
            let result = engine.search(&query, top_k, threshold).await?;
            if json {
                println!("{}", serde_json::to_string_pretty(&result)?);
            } else {
                print_search(&query, &result);
            }
        }
        Commands::Ask {
            question,
            top_k,
            threshold,
            json,
        } => {
            let answer = engine.ask(&question, top_k, threshold).await?;
            if json {
                println!("{}", serde_json::to_string_pretty(&answer)?);
            } else {
                print_answer(&answer);
            }
        }
        Commands::Stats => stats::run_stats(engine).await?,
        Commands::Reset => {
            engine.index().reset();
            run_reset(engine.config()).await?;
        }
    }
    Ok(())
}

async fn run_reset(cfg: &config::Config) -> anyhow::Result<()> {
    let store = IndexStore::new(cfg.index.path.clone());
    let removed = match store.read_header().await {
        Ok(header) => header.map_or(0, |h| h.entries).to_string(),
        Err(e) => {
            tracing::warn!(index = %store.path().display(), error = %e, "removing unreadable index artifact");
            "unknown".to_string()
        }
    };
    store
        .remove()
        .await
        .with_context(|| format!("Failed to remove {}", store.path().display()))?;
    tracing::info!(index = %store.path().display(), "index reset");

    println!("reset");
    println!("  chunks removed: {}", removed);
    println!("ok");
    Ok(())
}

async fn run_ingest(engine: &Engine, paths: &[PathBuf]) -> anyhow::Result<()> {
    let files = loader::collect_paths(paths);
    let mut documents = 0usize;
    let mut chunks = 0usize;
    let mut failed = 0usize;

    for path in &files {
        match engine.ingest_path(path).await {
            Ok(report) => {
                documents += 1;
                chunks += report.chunks_indexed;
                println!(
                    "  + {} ({} chunks, id {})",
                    report.source_name, report.chunks_indexed, report.document_id
                );
            }
            Err(e) => {
                failed += 1;
                eprintln!("Warning: {}: {:#}", path.display(), e);
            }
        }
    }

    if !engine.config().index.auto_persist && documents > 0 {
        engine.persist().await?;
    }

    println!("ingest");
    println!("  files: {}", files.len());
    println!("  documents indexed: {}", documents);
    println!("  chunks indexed: {}", chunks);
    println!("  failed: {}", failed);
    println!("  index size: {}", engine.index().size());

    if files.is_empty() {
        bail!("No supported files found");
    }
    if failed > 0 {
        bail!("{} of {} files failed to ingest", failed, files.len());
    }
    println!("ok");
    Ok(())
}

fn print_search(query: &str, result: &RetrievalResult) {
    if result.is_empty() {
        println!("No results found for \"{}\".", query);
        return;
    }
    println!("Results for \"{}\":", query);
    for (i, chunk) in result.chunks.iter().enumerate() {
        println!();
        println!(
            "{}. [{:.3}] {} (chunk {})",
            i + 1,
            chunk.score,
            chunk.source_name,
            chunk.sequence_index
        );
        println!("   {}", snippet(&chunk.text, 240));
    }
}

fn print_answer(answer: &Answer) {
    println!("{}", answer.text);
    if !answer.citations.is_empty() {
        println!();
        println!("Sources:");
        for c in &answer.citations {
            println!(
                "  [{}] {} (chunk {}) similarity {:.3}",
                c.rank, c.source_name, c.sequence_index, c.score
            );
        }
    }
    println!();
    println!("mode: {}", answer.mode);
}

fn snippet(text: &str, max_chars: usize) -> String {
    if text.chars().count() <= max_chars {
        return text.to_string();
    }
    let cut: String = text.chars().take(max_chars).collect();
    format!("{}…", cut.trim_end())
}
