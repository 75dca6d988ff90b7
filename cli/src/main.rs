//! tokenindex CLI: inspect a persisted token index.
//!
//! # Commands
//! ```text
//! tokenindex info
//! tokenindex status
//! tokenindex lookup  --hash <hex>
//! tokenindex history --address <prefix>:<hex> [--limit N] [--cursor <hex>] [--oldest-first]
//! tokenindex records --from <height> --to <height>
//! ```

use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use serde::Serialize;
use std::path::PathBuf;
use std::sync::Arc;

use tokenindex_core::{Address, Hash256};
use tokenindex_storage::SqliteStore;

mod config;
mod inspect;
mod logging;

use config::CliConfig;
use inspect::Inspector;

#[derive(Parser)]
#[command(
    name = "tokenindex",
    about = "Reorg-safe token transaction index: inspection CLI",
    long_about = "
Inspect a token transaction index persisted in SQLite. All commands are
read-only and print JSON to stdout; logs go to stderr.

ENVIRONMENT VARIABLES:
  TOKENINDEX_DB        Path to the SQLite index (default: ./tokenindex.db)
  TOKENINDEX_CONFIG    Path to a JSON config file
  RUST_LOG             Log filter; overrides the configured levels
",
    version
)]
struct Cli {
    /// SQLite database path or URL
    #[arg(long, global = true, env = "TOKENINDEX_DB")]
    db: Option<String>,

    /// JSON config file (indexer, log and db sections)
    #[arg(long, global = true, env = "TOKENINDEX_CONFIG")]
    config: Option<PathBuf>,

    /// Override the configured log level (trace, debug, info, warn, error)
    #[arg(long, global = true)]
    log_level: Option<String>,

    /// Emit JSON logs
    #[arg(long, global = true)]
    json_logs: bool,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Show version and effective configuration
    Info,

    /// Show the indexed tip and any pending rollback
    Status,

    /// Find the sequential index and position of a transaction
    Lookup {
        /// Transaction hash (hex, optionally 0x-prefixed)
        #[arg(long)]
        hash: String,
    },

    /// List the indexed transactions touching an address
    History {
        /// Address as <prefix>:<hex>
        #[arg(long)]
        address: String,
        /// Page size (at most the configured max_page_size)
        #[arg(long, default_value_t = 25)]
        limit: usize,
        /// Continue after this transaction hash
        #[arg(long)]
        cursor: Option<String>,
        /// Oldest first instead of newest first
        #[arg(long)]
        oldest_first: bool,
    },

    /// Dump block records for a height range
    Records {
        #[arg(long)]
        from: u32,
        #[arg(long)]
        to: u32,
    },
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    let mut config = CliConfig::load(cli.config.as_deref())?;
    config.log.apply_flags(cli.log_level.as_deref(), cli.json_logs);
    logging::init(&config.log)?;

    let db = config.db_path(cli.db.as_deref());

    match cli.command {
        Commands::Info => {
            #[derive(Serialize)]
            struct Info<'a> {
                version: &'a str,
                db: &'a str,
                config: &'a CliConfig,
            }
            print_json(&Info {
                version: env!("CARGO_PKG_VERSION"),
                db: &db,
                config: &config,
            })
        }
        Commands::Status => {
            let inspector = open(&db, &config).await?;
            print_json(&inspector.status().await?)
        }
        Commands::Lookup { hash } => {
            let hash: Hash256 = hash.parse()?;
            let inspector = open(&db, &config).await?;
            match inspector.lookup(&hash).await? {
                Some(found) => print_json(&found),
                None => anyhow::bail!("transaction {hash} is not indexed"),
            }
        }
        Commands::History {
            address,
            limit,
            cursor,
            oldest_first,
        } => {
            let address: Address = address.parse()?;
            let cursor = cursor.map(|c| c.parse::<Hash256>()).transpose()?;
            let inspector = open(&db, &config).await?;
            print_json(&inspector.history(&address, limit, cursor, oldest_first).await?)
        }
        Commands::Records { from, to } => {
            let inspector = open(&db, &config).await?;
            print_json(&inspector.records(from, to).await?)
        }
    }
}

async fn open(db: &str, config: &CliConfig) -> Result<Inspector> {
    let store = SqliteStore::open(db)
        .await
        .with_context(|| format!("opening index at {db}"))?;
    tracing::debug!(db, "index opened");
    Ok(Inspector::new(Arc::new(store), &config.indexer))
}

fn print_json<T: Serialize>(value: &T) -> Result<()> {
    println!("{}", serde_json::to_string_pretty(value)?);
    Ok(())
}
