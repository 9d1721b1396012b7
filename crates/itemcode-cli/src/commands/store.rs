//! Store management commands: `init`, `stats` and `purge`.

use std::path::PathBuf;

use anyhow::{Context, Result, bail};
use itemcode_core::StoreStats;
use serde::Serialize;
use tracing::warn;

use super::{Invocation, exit_codes, print_json};

/// Output of `itemcode init`.
#[derive(Debug, Serialize)]
struct InitResponse {
    database: PathBuf,
    config: PathBuf,
    config_written: bool,
    wal_mode: bool,
}

/// Creates the database (and its table), reports whether WAL mode took
/// effect, and writes a default configuration file if none exists yet.
pub fn init(invocation: &Invocation) -> Result<u8> {
    let wal_mode = invocation
        .open_store()?
        .verify_wal_mode()
        .context("failed to query journal mode")?;
    if !wal_mode {
        warn!(
            path = %invocation.config.store.path.display(),
            "database is not in WAL mode"
        );
    }

    let config_written = if invocation.config_path.exists() {
        false
    } else {
        let text = invocation
            .config
            .to_toml()
            .context("failed to render configuration")?;
        std::fs::write(&invocation.config_path, text).with_context(|| {
            format!(
                "failed to write configuration to {}",
                invocation.config_path.display()
            )
        })?;
        true
    };

    let response = InitResponse {
        database: invocation.config.store.path.clone(),
        config: invocation.config_path.clone(),
        config_written,
        wal_mode,
    };

    if invocation.json {
        print_json(&response)?;
    } else {
        println!("Database ready at {}", response.database.display());
        if !wal_mode {
            println!("Warning: WAL mode could not be enabled");
        }
        if config_written {
            println!("Wrote configuration to {}", response.config.display());
        }
    }
    Ok(exit_codes::SUCCESS)
}

/// Prints store totals.
pub fn stats(invocation: &Invocation) -> Result<u8> {
    let stats: StoreStats = invocation
        .open_registry()?
        .stats()
        .context("failed to read store statistics")?;

    if invocation.json {
        print_json(&stats)?;
    } else {
        println!("Codes:          {}", stats.record_count);
        println!("Items:          {}", stats.item_count);
        println!("Verifications:  {}", stats.total_verifications);
        println!("Highest id:     {}", stats.max_id);
    }
    Ok(exit_codes::SUCCESS)
}

/// Output of `itemcode purge`.
#[derive(Debug, Serialize)]
struct PurgeResponse {
    discarded: u64,
}

/// Drops the code table. Refuses to run without `--yes`.
pub fn purge(invocation: &Invocation, confirmed: bool) -> Result<u8> {
    if !confirmed {
        bail!("purge deletes every code; pass --yes to confirm");
    }

    let discarded = invocation
        .open_store()?
        .purge()
        .context("failed to purge code table")?;

    if invocation.json {
        print_json(&PurgeResponse { discarded })?;
    } else {
        println!("Purged {discarded} code(s)");
    }
    Ok(exit_codes::SUCCESS)
}
