//! # Contact Harness CLI (`chx`)
//!
//! ## Usage
//!
//! ```bash
//! chx --config ./config/chx.toml <command>
//! ```
//!
//! ## Commands
//!
//! | Command | Description |
//! |---------|-------------|
//! | `chx init` | Create the SQLite database and run schema migrations |
//! | `chx sources` | Check connectivity to the messaging source |
//! | `chx ingest` | Pull all contacts and messages into the store |
//! | `chx search "<query>"` | List contacts matching a name, email or phone prefix |
//! | `chx get <address>` | Print the transcript of the contact owning an address |
//! | `chx export <address>` | Write that transcript to a text file |
//! | `chx stats` | Show database counts |
//! | `chx reset --yes` | Delete every contact and blob |

use std::path::PathBuf;

use anyhow::bail;
use clap::{Parser, Subcommand};

use contact_harness::progress::ProgressMode;
use contact_harness::store::{SqliteStore, Store};
use contact_harness::{config, ingest, logging, retrieve, sources, stats};

/// Contact Harness CLI: ingest iMessage history from a BlueBubbles server
/// and retrieve it by contact.
#[derive(Parser)]
#[command(
    name = "chx",
    about = "Contact Harness — contact and message history ingestion from BlueBubbles",
    version
)]
struct Cli {
    /// Path to configuration file (TOML).
    #[arg(long, global = true, default_value = "./config/chx.toml")]
    config: PathBuf,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Initialize the database schema.
    ///
    /// Idempotent; running it multiple times is safe.
    Init,

    /// Check that the messaging source is reachable.
    Sources,

    /// Ingest every contact and its message history.
    ///
    /// Re-running is safe: contacts and blobs are overwritten in place and
    /// resolved handles are reused.
    Ingest {
        /// Process at most this many contacts.
        #[arg(long)]
        limit: Option<usize>,

        /// Progress output on stderr. Defaults to `human` on a TTY, else `off`.
        #[arg(long, value_enum)]
        progress: Option<ProgressMode>,
    },

    /// Suggest contacts whose name, email or phone starts with the query.
    Search {
        query: String,
    },

    /// Print the transcript of the contact with this exact email or phone.
    Get {
        query: String,
    },

    /// Export the transcript of the contact with this exact email or phone.
    Export {
        query: String,

        /// Output file. Defaults to `<display name>_messages.txt`.
        #[arg(long, short)]
        output: Option<PathBuf>,
    },

    /// Show database statistics.
    Stats,

    /// Delete all ingested data.
    Reset {
        /// Confirm the deletion.
        #[arg(long)]
        yes: bool,
    },
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    logging::init_tracing();

    let cli = Cli::parse();
    let cfg = config::load_config(&cli.config)?;

    match cli.command {
        Commands::Init => {
            let store = SqliteStore::open(&cfg.db).await?;
            store.close().await;
            println!("Database initialized successfully.");
        }
        Commands::Sources => {
            sources::check_sources(&cfg).await?;
        }
        Commands::Ingest { limit, progress } => {
            let mode = progress.unwrap_or_else(ProgressMode::default_for_tty);
            ingest::run_ingest_command(&cfg, limit, mode).await?;
        }
        Commands::Search { query } => {
            retrieve::run_search(&cfg, &query).await?;
        }
        Commands::Get { query } => {
            retrieve::run_get(&cfg, &query).await?;
        }
        Commands::Export { query, output } => {
            retrieve::run_export(&cfg, &query, output).await?;
        }
        Commands::Stats => {
            stats::run_stats(&cfg).await?;
        }
        Commands::Reset { yes } => {
            if !yes {
                bail!("refusing to delete data without --yes");
            }
            let store = SqliteStore::open(&cfg.db).await?;
            store.reset().await?;
            store.close().await;
            println!("All contacts and blobs deleted.");
        }
    }

    Ok(())
}
