//! # GuideBot retrieval CLI (`guidebot`)
//!
//! The `guidebot` binary loads a radiology report corpus, embeds it, and
//! answers similarity queries from the command line or over HTTP.
//!
//! ## Usage
//!
//! ```bash
//! guidebot --config ./config/guidebot.toml <command>
//! ```
//!
//! ## Commands
//!
//! | Command | Description |
//! |---------|-------------|
//! | `guidebot inspect` | Parse the corpus without embedding; report skipped lines |
//! | `guidebot search "<query>"` | Load the corpus and print the most similar reports |
//! | `guidebot stats` | Load the corpus and print diagnostics |
//! | `guidebot serve` | Start the HTTP retrieval server |
//!
//! ## Examples
//!
//! ```bash
//! # Check a corpus file before embedding it
//! guidebot inspect --config ./config/guidebot.toml
//!
//! # Top 5 reports for a query, as JSON
//! guidebot search "right lower lobe pneumonia" --k 5 --json
//!
//! # Serve with JSON logs and debug output for the loader
//! GUIDEBOT_LOG=guidebot=debug guidebot --log-json serve
//! ```

use clap::{Parser, Subcommand};
use std::path::PathBuf;
use std::sync::Arc;

use guidebot::config;
use guidebot::index::ReportIndex;
use guidebot::progress::ProgressMode;
use guidebot::{inspect, logging, search, server, stats};

/// GuideBot retrieval: similar radiology reports for a free-text query.
///
/// All commands accept a `--config` flag pointing to a TOML configuration
/// file. See `config/guidebot.example.toml` for a full example.
#[derive(Parser)]
#[command(
    name = "guidebot",
    about = "GuideBot retrieval — similar radiology reports for a free-text query",
    version
)]
struct Cli {
    /// Path to configuration file (TOML).
    #[arg(long, global = true, default_value = "./config/guidebot.toml")]
    config: PathBuf,

    /// Emit logs as JSON lines on stderr.
    #[arg(long, global = true)]
    log_json: bool,

    /// Corpus load progress on stderr.
    #[arg(long, global = true, value_enum, default_value = "auto")]
    progress: ProgressMode,

    #[command(subcommand)]
    command: Commands,
}

/// Top-level CLI commands.
#[derive(Subcommand)]
enum Commands {
    /// Parse the corpus file without embedding it.
    ///
    /// Prints line, record, and skip counts with the reason each skipped
    /// line was rejected. Never calls the embedding provider.
    Inspect {
        /// Print the summary as JSON.
        #[arg(long)]
        json: bool,
    },

    /// Retrieve the reports most similar to a query.
    Search {
        /// Free-text query.
        query: String,

        /// Number of reports to return (defaults to `retrieval.default_k`).
        #[arg(long)]
        k: Option<i64>,

        /// Print results as JSON.
        #[arg(long)]
        json: bool,
    },

    /// Load the corpus and print diagnostics.
    Stats {
        /// Print stats as JSON.
        #[arg(long)]
        json: bool,
    },

    /// Start the HTTP retrieval server.
    Serve,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();
    logging::init_tracing(cli.log_json);

    let cfg = config::load_config(&cli.config)?;

    match cli.command {
        Commands::Inspect { json } => {
            inspect::run_inspect(&cfg, json).await?;
        }
        Commands::Search { query, k, json } => {
            let index = ReportIndex::from_config(&cfg, Arc::from(cli.progress.reporter()))?;
            search::run_search(&cfg, &index, &query, k, json).await?;
        }
        Commands::Stats { json } => {
            let index = ReportIndex::from_config(&cfg, Arc::from(cli.progress.reporter()))?;
            stats::run_stats(&cfg, &index, json).await?;
        }
        Commands::Serve => {
            let index = ReportIndex::from_config(&cfg, Arc::from(cli.progress.reporter()))?;
            server::run_server(&cfg, Arc::new(index)).await?;
        }
    }

    Ok(())
}
