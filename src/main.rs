//! # Info Fusion CLI (`fusion`)
//!
//! The `fusion` binary runs the aggregation pipeline and reads the resulting
//! knowledge base.
//!
//! ## Usage
//!
//! ```bash
//! fusion --config ./config/fusion.toml <command>
//! ```
//!
//! ## Commands
//!
//! | Command | Description |
//! |---------|-------------|
//! | `fusion run` | Fetch, filter, reconcile, enrich and store |
//! | `fusion sources` | List configured connectors and their health |
//! | `fusion list` | List stored records |
//! | `fusion get <key>` | Show one record |
//! | `fusion search "<query>"` | Substring search over stored records |
//! | `fusion stats` | Knowledge base overview |
//! | `fusion fingerprint <file> [<other>]` | Inspect tokens and fingerprints |
//!
//! ## Examples
//!
//! ```bash
//! # See what a run would do without writing anything
//! fusion run --dry-run
//!
//! # Daily run, retrying articles whose enrichment failed last time
//! fusion run --retry-failed --progress json
//!
//! # Are these two drafts near-duplicates?
//! fusion fingerprint a.md b.md
//! ```

use std::path::{Path, PathBuf};

use anyhow::{bail, Context, Result};
use clap::{Parser, Subcommand};
use tracing_subscriber::EnvFilter;

use info_fusion::config::{self, Config};
use info_fusion::fingerprint::Fingerprinter;
use info_fusion::ingest::{run_pipeline, RunOptions};
use info_fusion::progress::ProgressMode;
use info_fusion::{get, search, sources, stats};

/// Info Fusion: multi-source article aggregation with near-duplicate
/// filtering and LLM enrichment.
///
/// All commands accept a `--config` flag pointing to a TOML configuration
/// file. See `config/fusion.example.toml` for a full example.
#[derive(Parser)]
#[command(
    name = "fusion",
    about = "Aggregate articles into a deduplicated, enriched knowledge base",
    version,
    long_about = "Info Fusion pulls articles from feeds, a doc platform and local directories, \
    drops near-duplicates with 128-bit SimHash fingerprints, reuses unchanged records across runs, \
    and enriches new or changed articles through an LLM with bounded concurrency."
)]
struct Cli {
    /// Path to configuration file (TOML).
    #[arg(long, global = true, default_value = "./config/fusion.toml")]
    config: PathBuf,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Run the pipeline once.
    ///
    /// Sources are fetched concurrently; a failing source is reported and
    /// skipped. Unchanged articles reuse their stored enrichment.
    Run {
        /// Stop after reconciliation and write nothing.
        #[arg(long)]
        dry_run: bool,

        /// Forget stored account names and resolve them again from the feeds.
        #[arg(long)]
        refresh_accounts: bool,

        /// Re-enrich unchanged records whose last enrichment failed or never ran.
        #[arg(long)]
        retry_failed: bool,

        /// Progress output on stderr: off, human, json. Defaults to human
        /// on a terminal.
        #[arg(long)]
        progress: Option<String>,
    },

    /// List configured connectors and their health.
    Sources,

    /// List stored records.
    List {
        /// Only records whose source label contains this, or whose platform is this.
        #[arg(long)]
        source: Option<String>,

        #[arg(long)]
        limit: Option<usize>,
    },

    /// Show one record by key.
    Get { key: String },

    /// Case-insensitive substring search over titles, content and enrichment.
    Search {
        query: String,

        #[arg(long)]
        limit: Option<usize>,
    },

    /// Knowledge base statistics.
    Stats,

    /// Print the tokens and fingerprint of a file, and the Hamming distance
    /// to a second file when given.
    Fingerprint {
        file: PathBuf,
        other: Option<PathBuf>,
    },
}

#[tokio::main]
async fn main() -> Result<()> {
    let _ = dotenvy::dotenv();

    tracing_subscriber::fmt()
        .with_writer(std::io::stderr)
        .with_env_filter(
            EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| EnvFilter::new("info_fusion=info")),
        )
        .init();

    let cli = Cli::parse();

    // `fingerprint` works without a config file
    if let Commands::Fingerprint { file, other } = &cli.command {
        let cfg = if cli.config.exists() {
            config::load_config(&cli.config)?
        } else {
            Config::default()
        };
        return run_fingerprint(&cfg, file, other.as_deref());
    }

    let cfg = config::load_config(&cli.config)?;

    match cli.command {
        Commands::Run {
            dry_run,
            refresh_accounts,
            retry_failed,
            progress,
        } => {
            let mode = match progress.as_deref() {
                None => ProgressMode::default_for_tty(),
                Some(value) => match ProgressMode::parse(value) {
                    Some(mode) => mode,
                    None => bail!("Unknown progress mode: '{}'. Use off, human, or json.", value),
                },
            };
            let options = RunOptions {
                dry_run,
                refresh_accounts,
                retry_failed,
            };
            let reporter = mode.reporter();
            let report = run_pipeline(&cfg, options, reporter.as_ref()).await?;
            report.print();
        }
        Commands::Sources => {
            sources::list_sources(&cfg)?;
        }
        Commands::List { source, limit } => {
            search::run_list(&cfg, source.as_deref(), limit)?;
        }
        Commands::Get { key } => {
            get::run_get(&cfg, &key)?;
        }
        Commands::Search { query, limit } => {
            search::run_search(&cfg, &query, limit)?;
        }
        Commands::Stats => {
            stats::run_stats(&cfg)?;
        }
        Commands::Fingerprint { .. } => unreachable!("handled before config loading"),
    }

    Ok(())
}

fn run_fingerprint(cfg: &Config, file: &Path, other: Option<&Path>) -> Result<()> {
    let fingerprinter = Fingerprinter::new(&cfg.dedup);

    let inspect = |path: &Path| -> Result<_> {
        let bytes =
            std::fs::read(path).with_context(|| format!("Failed to read {}", path.display()))?;
        let text = String::from_utf8_lossy(&bytes);
        let tokens = fingerprinter.tokenize(&text);
        let fingerprint = fingerprinter
            .fingerprint(&text)
            .with_context(|| format!("Cannot fingerprint {}", path.display()))?;

        println!("{}", path.display());
        println!("  tokens ({}): {}", tokens.len(), tokens.join(" "));
        println!("  fingerprint: {}", fingerprint);
        Ok(fingerprint)
    };

    let first = inspect(file)?;
    if let Some(other) = other {
        let second = inspect(other)?;
        let distance = first.distance(&second);
        let verdict = if distance <= cfg.dedup.threshold {
            "near-duplicate"
        } else {
            "distinct"
        };
        println!(
            "distance: {} (threshold {}, {})",
            distance, cfg.dedup.threshold, verdict
        );
    }
    Ok(())
}
