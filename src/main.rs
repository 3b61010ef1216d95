//! # tabvault CLI
//!
//! The `tabvault` binary drives the vault: initialization, inbox ingestion
//! (once or continuously), search, the semantic index, and maintenance.
//!
//! ## Usage
//!
//! ```bash
//! tabvault --config ./config/tabvault.toml <command>
//! ```
//!
//! ## Commands
//!
//! | Command | Description |
//! |---------|-------------|
//! | `tabvault init` | Create the vault directories and the SQLite schema |
//! | `tabvault ingest` | Sweep the inbox once and observe new sessions |
//! | `tabvault watch` | Sweep the inbox every interval until Ctrl-C |
//! | `tabvault search "<query>"` | Keyword search over stored sessions |
//! | `tabvault similar "<query>"` | Rank sessions by semantic similarity |
//! | `tabvault observe` | Re-score stored sessions against missions |
//! | `tabvault export-graph` | Export the co-occurrence graph as JSON |
//! | `tabvault feedback <id>` | Record relevance feedback for a session |
//! | `tabvault add-mission <name> <desc>` | Add or replace a mission |
//! | `tabvault missions` | List missions |
//! | `tabvault reconcile` | Repair store and index from the vault |
//! | `tabvault stats` | Show vault statistics |

use clap::{Parser, Subcommand};
use std::path::PathBuf;

use tabvault::{
    config, export, index_cmd, ingest, logging, migrate, reconcile, search, stats, watch,
};

/// tabvault: a local-first vault for browser session snapshots.
///
/// All commands accept a `--config` flag pointing to a TOML configuration
/// file. Every section of the file is optional.
#[derive(Parser)]
#[command(
    name = "tabvault",
    about = "A local-first vault for browser session snapshots with an adaptive semantic index",
    version
)]
struct Cli {
    /// Path to configuration file (TOML).
    #[arg(long, global = true, default_value = "./config/tabvault.toml")]
    config: PathBuf,

    /// Log progress at info level (overridden by `RUST_LOG`).
    #[arg(long, short, global = true)]
    verbose: bool,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Create the inbox, vault and quarantine directories and the database.
    ///
    /// Idempotent: running it multiple times is safe.
    Init,

    /// Sweep the inbox once.
    ///
    /// Valid sessions are archived and observed, duplicates are dropped,
    /// and invalid payloads are moved to quarantine.
    Ingest,

    /// Sweep the inbox repeatedly until interrupted.
    Watch {
        /// Seconds between sweeps (defaults to `watch.interval_secs`).
        #[arg(long)]
        interval: Option<u64>,
    },

    /// Keyword search over stored sessions.
    Search {
        query: String,

        #[arg(long, default_value_t = 10)]
        limit: i64,
    },

    /// Rank stored sessions by cosine similarity to the query.
    Similar {
        query: String,

        #[arg(long, default_value_t = 10)]
        limit: usize,
    },

    /// Re-score stored sessions against the index and missions.
    Observe {
        /// Only consider sessions ingested in the last N days.
        #[arg(long)]
        since_days: Option<u32>,
    },

    /// Export the URL co-occurrence graph as JSON.
    ExportGraph {
        /// Output file path. Writes to stdout if omitted.
        #[arg(long, short)]
        output: Option<PathBuf>,

        /// Only include sessions ingested in the last N days
        /// (defaults to `graph.window_days`).
        #[arg(long)]
        since_days: Option<u32>,
    },

    /// Record relevance feedback for a stored session.
    Feedback {
        /// Session id as shown by `search`.
        session_id: i64,

        /// Relevance in [0, 1]: 1.0 reinforces the terms, 0.0 dampens them.
        #[arg(long, default_value_t = 1.0)]
        score: f64,

        /// Comma-separated terms to adjust. Defaults to the session's own
        /// title and URL tokens.
        #[arg(long, value_delimiter = ',')]
        terms: Option<Vec<String>>,
    },

    /// Add a mission, or replace one with the same name.
    AddMission { name: String, description: String },

    /// List missions.
    Missions,

    /// Record archived payloads the store is missing and observe sessions
    /// the index has not seen.
    Reconcile {
        /// Also delete orphaned temp files under vault/ and quarantine/.
        #[arg(long)]
        prune_temp: bool,
    },

    /// Show vault statistics.
    Stats,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();
    logging::init(cli.verbose);

    let cfg = config::load_config(&cli.config)?;

    match cli.command {
        Commands::Init => {
            migrate::run_init(&cfg).await?;
        }
        Commands::Ingest => {
            ingest::run_ingest(&cfg).await?;
        }
        Commands::Watch { interval } => {
            watch::run(&cfg, interval).await?;
        }
        Commands::Search { query, limit } => {
            search::run_search(&cfg, &query, limit).await?;
        }
        Commands::Similar { query, limit } => {
            search::run_similar(&cfg, &query, limit).await?;
        }
        Commands::Observe { since_days } => {
            index_cmd::run_observe(&cfg, since_days).await?;
        }
        Commands::ExportGraph { output, since_days } => {
            export::run_export_graph(&cfg, output.as_deref(), since_days).await?;
        }
        Commands::Feedback {
            session_id,
            score,
            terms,
        } => {
            index_cmd::run_feedback(&cfg, session_id, score, terms).await?;
        }
        Commands::AddMission { name, description } => {
            index_cmd::run_add_mission(&cfg, &name, &description)?;
        }
        Commands::Missions => {
            index_cmd::run_missions(&cfg)?;
        }
        Commands::Reconcile { prune_temp } => {
            reconcile::run_reconcile(&cfg, prune_temp).await?;
        }
        Commands::Stats => {
            stats::run_stats(&cfg).await?;
        }
    }

    Ok(())
}
