//! itemcode - identity code registry
//!
//! Command-line access to an identity code database: issue and reconcile
//! codes for order items, verify codes, and manage the store.

use std::path::PathBuf;

use anyhow::Result;
use clap::{Parser, Subcommand};
use tracing_subscriber::EnvFilter;
use tracing_subscriber::layer::SubscriberExt;
use tracing_subscriber::util::SubscriberInitExt;

mod commands;

/// itemcode - identity code registry
#[derive(Parser, Debug)]
#[command(name = "itemcode")]
#[command(version, about, long_about = None)]
struct Cli {
    /// Path to the registry configuration file (used only if it exists)
    #[arg(short, long, default_value = "itemcode.toml", global = true)]
    config: PathBuf,

    /// Database file, overriding `store.path` from the configuration
    #[arg(long, global = true)]
    database: Option<PathBuf>,

    /// Log level (trace, debug, info, warn, error)
    #[arg(long, default_value = "warn", global = true)]
    log_level: String,

    /// Print machine-readable JSON instead of text
    #[arg(long, global = true)]
    json: bool,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand, Debug)]
enum Commands {
    // === Store management ===
    /// Create the database and a default configuration file if missing
    Init,

    /// Show record, item and verification totals
    Stats,

    /// Drop the code table and every code in it
    Purge {
        /// Confirm the purge
        #[arg(long)]
        yes: bool,
    },

    // === Codes ===
    /// Issue fresh codes to an order item
    Issue {
        /// Order item id
        item: u64,

        /// Number of codes to issue
        #[arg(short, long, default_value = "1")]
        quantity: usize,
    },

    /// Make an item own exactly the given codes
    Reconcile {
        /// Order item id
        item: u64,

        /// Desired codes
        codes: Vec<String>,

        /// Desired codes as item meta entries (`key=value`); only identity
        /// keys are considered
        #[arg(long = "meta", value_name = "KEY=VALUE")]
        meta: Vec<String>,
    },

    /// Show the record holding a code
    Lookup {
        /// Code to look up
        code: String,
    },

    /// List the codes owned by an item
    Codes {
        /// Order item id
        item: u64,
    },

    /// Delete codes regardless of owner
    Delete {
        /// Codes to delete
        #[arg(required = true)]
        codes: Vec<String>,
    },

    // === Verification ===
    /// Verify a code and count the verification
    Verify {
        /// A code, or a query string carrying one
        input: String,
    },

    /// Print the verification link for a code
    Link {
        /// Issued code
        code: String,
    },
}

fn main() -> Result<()> {
    let cli = Cli::parse();

    // Initialize logging
    let filter = EnvFilter::try_new(&cli.log_level).unwrap_or_else(|_| EnvFilter::new("warn"));

    tracing_subscriber::registry()
        .with(filter)
        .with(tracing_subscriber::fmt::layer().with_target(false))
        .init();

    let invocation =
        commands::Invocation::load(&cli.config, cli.database.as_deref(), cli.json)?;

    let exit_code = match cli.command {
        Commands::Init => commands::store::init(&invocation)?,
        Commands::Stats => commands::store::stats(&invocation)?,
        Commands::Purge { yes } => commands::store::purge(&invocation, yes)?,
        Commands::Issue { item, quantity } => {
            commands::codes::issue(&invocation, item.into(), quantity)?
        },
        Commands::Reconcile { item, codes, meta } => {
            commands::codes::reconcile(&invocation, item.into(), &codes, &meta)?
        },
        Commands::Lookup { code } => commands::codes::lookup(&invocation, &code)?,
        Commands::Codes { item } => commands::codes::list(&invocation, item.into())?,
        Commands::Delete { codes } => commands::codes::delete(&invocation, &codes)?,
        Commands::Verify { input } => commands::verify::verify(&invocation, &input)?,
        Commands::Link { code } => commands::verify::link(&invocation, &code)?,
    };

    if exit_code != commands::exit_codes::SUCCESS {
        std::process::exit(i32::from(exit_code));
    }
    Ok(())
}
