//! CLI command implementations.
//!
//! Every command returns an exit code from [`exit_codes`]; hard failures are
//! returned as errors and exit with 1.

use std::path::Path;

use anyhow::{Context, Result};
use itemcode_core::{CodeRegistry, IdentityCode, RegistryConfig, SqliteCodeStore};
use serde::Serialize;
use tracing::debug;

pub mod codes;
pub mod store;
pub mod verify;

/// Exit codes for itemcode commands.
pub mod exit_codes {
    /// Success exit code.
    pub const SUCCESS: u8 = 0;
    /// The requested code does not exist.
    pub const NOT_FOUND: u8 = 2;
    /// Some codes could not be issued.
    pub const INCOMPLETE: u8 = 3;
}

/// Resolved settings shared by every command.
#[derive(Debug)]
pub struct Invocation {
    /// Effective configuration.
    pub config: RegistryConfig,

    /// Where the configuration was read from, if it exists.
    pub config_path: std::path::PathBuf,

    /// Print JSON instead of text.
    pub json: bool,
}

impl Invocation {
    /// Loads the configuration file if present and applies command-line
    /// overrides.
    pub fn load(config_path: &Path, database: Option<&Path>, json: bool) -> Result<Self> {
        let mut config = if config_path.exists() {
            RegistryConfig::from_file(config_path).with_context(|| {
                format!("failed to load configuration from {}", config_path.display())
            })?
        } else {
            debug!(path = %config_path.display(), "no configuration file, using defaults");
            RegistryConfig::default()
        };

        if let Some(database) = database {
            config.store.path = database.to_path_buf();
        }
        config.validate().context("invalid configuration")?;

        Ok(Self {
            config,
            config_path: config_path.to_path_buf(),
            json,
        })
    }

    /// Opens the configured store.
    pub fn open_store(&self) -> Result<SqliteCodeStore> {
        self.config.store.open().with_context(|| {
            format!(
                "failed to open code database at {}",
                self.config.store.path.display()
            )
        })
    }

    /// Opens a registry over the configured store.
    pub fn open_registry(&self) -> Result<CodeRegistry<SqliteCodeStore>> {
        Ok(CodeRegistry::new(self.open_store()?))
    }
}

/// Prints `value` as pretty JSON.
pub fn print_json<T: Serialize>(value: &T) -> Result<()> {
    println!(
        "{}",
        serde_json::to_string_pretty(value).context("failed to serialize output")?
    );
    Ok(())
}

/// Parses codes given on the command line.
pub fn parse_codes<'a, I>(raw: I) -> Result<Vec<IdentityCode>>
where
    I: IntoIterator<Item = &'a String>,
{
    raw.into_iter()
        .map(|value| {
            IdentityCode::parse(value.as_str()).with_context(|| format!("invalid code '{value}'"))
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_load_without_config_file() {
        let dir = tempfile::tempdir().unwrap();
        let invocation =
            Invocation::load(&dir.path().join("missing.toml"), None, false).unwrap();
        assert_eq!(invocation.config, RegistryConfig::default());
    }

    #[test]
    fn test_database_flag_overrides_config() {
        let dir = tempfile::tempdir().unwrap();
        let config_path = dir.path().join("itemcode.toml");
        std::fs::write(
            &config_path,
            "[store]\npath = \"from-config.db\"\n\n[verification]\ndisplay_verify_count = true\n",
        )
        .unwrap();

        let override_path = dir.path().join("override.db");
        let invocation = Invocation::load(&config_path, Some(&override_path), true).unwrap();

        assert_eq!(invocation.config.store.path, override_path);
        assert!(invocation.config.verification.display_verify_count);
        assert!(invocation.json);
    }

    #[test]
    fn test_invalid_config_file_is_an_error() {
        let dir = tempfile::tempdir().unwrap();
        let config_path = dir.path().join("itemcode.toml");
        std::fs::write(&config_path, "[verification]\nbase_url = \"::\"\n").unwrap();

        let err = Invocation::load(&config_path, None, false).unwrap_err();
        assert!(format!("{err:#}").contains("base_url"), "{err:#}");
    }

    #[test]
    fn test_parse_codes_reports_bad_value() {
        let raw = vec!["good".to_string(), "bad code".to_string()];
        let err = parse_codes(&raw).unwrap_err();
        assert!(err.to_string().contains("bad code"));
    }
}
