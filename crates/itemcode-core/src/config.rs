//! Configuration parsing and management.
//!
//! A registry deployment is described by a small TOML file:
//!
//! ```toml
//! [store]
//! path = "/var/lib/itemcode/codes.db"
//! busy_timeout_ms = 5000
//!
//! [verification]
//! base_url = "https://shop.example.com/verify"
//! display_verify_count = true
//! qr_service_url = "https://api.qrserver.com/v1/create-qr-code/"
//! ```
//!
//! Every key is optional.

use std::path::{Path, PathBuf};
use std::time::Duration;

use serde::{Deserialize, Serialize};
use thiserror::Error;
use url::Url;

use crate::store::{SqliteCodeStore, StoreError};

/// Top-level registry configuration.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct RegistryConfig {
    /// Store configuration.
    #[serde(default)]
    pub store: StoreConfig,

    /// Verification configuration.
    #[serde(default)]
    pub verification: VerificationConfig,
}

impl RegistryConfig {
    /// Load configuration from a TOML file.
    ///
    /// # Errors
    ///
    /// Returns an error if the file cannot be read, parsed, or validated.
    pub fn from_file(path: &Path) -> Result<Self, ConfigError> {
        let content = std::fs::read_to_string(path)?;
        Self::from_toml(&content)
    }

    /// Parse configuration from a TOML string.
    ///
    /// # Errors
    ///
    /// Returns an error if the TOML is invalid or a value fails validation.
    pub fn from_toml(content: &str) -> Result<Self, ConfigError> {
        let config: Self = toml::from_str(content)?;
        config.validate()?;
        Ok(config)
    }

    /// Serialize configuration to TOML.
    ///
    /// # Errors
    ///
    /// Returns an error if serialization fails.
    pub fn to_toml(&self) -> Result<String, ConfigError> {
        toml::to_string_pretty(self).map_err(ConfigError::Serialize)
    }

    /// Checks values serde cannot check on its own.
    ///
    /// # Errors
    ///
    /// Returns [`ConfigError::Validation`] describing the first bad value.
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.store.path.as_os_str().is_empty() {
            return Err(ConfigError::Validation(
                "store.path must not be empty".to_string(),
            ));
        }
        if self.store.busy_timeout_ms == 0 {
            return Err(ConfigError::Validation(
                "store.busy_timeout_ms must be greater than zero".to_string(),
            ));
        }
        self.verification.base_url()?;
        self.verification.qr_service_url()?;
        Ok(())
    }
}

/// Store configuration.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct StoreConfig {
    /// Path to the `SQLite` database file.
    #[serde(default = "default_store_path")]
    pub path: PathBuf,

    /// How long a writer waits on a locked database, in milliseconds.
    #[serde(default = "default_busy_timeout_ms")]
    pub busy_timeout_ms: u64,
}

impl Default for StoreConfig {
    fn default() -> Self {
        Self {
            path: default_store_path(),
            busy_timeout_ms: default_busy_timeout_ms(),
        }
    }
}

impl StoreConfig {
    /// Busy timeout as a [`Duration`].
    #[must_use]
    pub const fn busy_timeout(&self) -> Duration {
        Duration::from_millis(self.busy_timeout_ms)
    }

    /// Opens the configured store, creating the database and table if
    /// missing.
    ///
    /// # Errors
    ///
    /// Returns an error if the database cannot be opened or initialized.
    pub fn open(&self) -> Result<SqliteCodeStore, StoreError> {
        SqliteCodeStore::open_with_timeout(&self.path, self.busy_timeout())
    }
}

/// Verification configuration.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct VerificationConfig {
    /// Page verification links point to. Links cannot be built without it.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub base_url: Option<String>,

    /// Whether a verification result reports the code's counter.
    #[serde(default)]
    pub display_verify_count: bool,

    /// External service rendering a verification link as a QR image.
    #[serde(default = "default_qr_service_url")]
    pub qr_service_url: String,
}

impl Default for VerificationConfig {
    fn default() -> Self {
        Self {
            base_url: None,
            display_verify_count: false,
            qr_service_url: default_qr_service_url(),
        }
    }
}

impl VerificationConfig {
    /// Parsed base URL, if one is configured.
    ///
    /// # Errors
    ///
    /// Returns [`ConfigError::Validation`] if the value is not an absolute
    /// http(s) URL.
    pub fn base_url(&self) -> Result<Option<Url>, ConfigError> {
        self.base_url
            .as_deref()
            .map(|raw| parse_http_url("verification.base_url", raw))
            .transpose()
    }

    /// Parsed QR image service URL.
    ///
    /// # Errors
    ///
    /// Returns [`ConfigError::Validation`] if the value is not an absolute
    /// http(s) URL.
    pub fn qr_service_url(&self) -> Result<Url, ConfigError> {
        parse_http_url("verification.qr_service_url", &self.qr_service_url)
    }
}

fn parse_http_url(key: &str, raw: &str) -> Result<Url, ConfigError> {
    let url = Url::parse(raw)
        .map_err(|e| ConfigError::Validation(format!("{key} '{raw}' is invalid: {e}")))?;
    if !matches!(url.scheme(), "http" | "https") {
        return Err(ConfigError::Validation(format!(
            "{key} '{raw}' must use http or https"
        )));
    }
    Ok(url)
}

fn default_store_path() -> PathBuf {
    PathBuf::from("itemcode.db")
}

const fn default_busy_timeout_ms() -> u64 {
    5000
}

fn default_qr_service_url() -> String {
    "https://api.qrserver.com/v1/create-qr-code/".to_string()
}

/// Configuration errors.
#[derive(Debug, Error)]
#[non_exhaustive]
pub enum ConfigError {
    /// I/O error reading configuration file.
    #[error("failed to read configuration file: {0}")]
    Io(#[from] std::io::Error),

    /// TOML parsing error.
    #[error("failed to parse configuration: {0}")]
    Parse(#[from] toml::de::Error),

    /// TOML serialization error.
    #[error("failed to serialize configuration: {0}")]
    Serialize(#[from] toml::ser::Error),

    /// Validation error.
    #[error("configuration validation failed: {0}")]
    Validation(String),
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_empty_config_uses_defaults() {
        let config = RegistryConfig::from_toml("").unwrap();
        assert_eq!(config.store.path, PathBuf::from("itemcode.db"));
        assert_eq!(config.store.busy_timeout(), Duration::from_secs(5));
        assert_eq!(config.verification.base_url, None);
        assert!(!config.verification.display_verify_count);
        assert_eq!(
            config.verification.qr_service_url().unwrap().host_str(),
            Some("api.qrserver.com")
        );
    }

    #[test]
    fn test_parse_full_config() {
        let toml = r#"
            [store]
            path = "/var/lib/itemcode/codes.db"
            busy_timeout_ms = 250

            [verification]
            base_url = "https://shop.example.com/verify"
            display_verify_count = true
        "#;

        let config = RegistryConfig::from_toml(toml).unwrap();
        assert_eq!(
            config.store.path,
            PathBuf::from("/var/lib/itemcode/codes.db")
        );
        assert_eq!(config.store.busy_timeout(), Duration::from_millis(250));
        assert!(config.verification.display_verify_count);
        assert_eq!(
            config.verification.base_url().unwrap().unwrap().host_str(),
            Some("shop.example.com")
        );
    }

    #[test]
    fn test_rejects_bad_base_url() {
        let err = RegistryConfig::from_toml("[verification]\nbase_url = \"not a url\"\n")
            .unwrap_err();
        assert!(matches!(err, ConfigError::Validation(_)), "{err}");

        let err = RegistryConfig::from_toml("[verification]\nbase_url = \"ftp://example.com\"\n")
            .unwrap_err();
        assert!(err.to_string().contains("http or https"), "{err}");

        let err = RegistryConfig::from_toml("[verification]\nqr_service_url = \"qr\"\n")
            .unwrap_err();
        assert!(err.to_string().contains("qr_service_url"), "{err}");
    }

    #[test]
    fn test_rejects_zero_timeout() {
        let err = RegistryConfig::from_toml("[store]\nbusy_timeout_ms = 0\n").unwrap_err();
        assert!(matches!(err, ConfigError::Validation(_)));
    }

    #[test]
    fn test_rejects_unknown_keys() {
        let err = RegistryConfig::from_toml("[store]\npaht = \"x.db\"\n").unwrap_err();
        assert!(matches!(err, ConfigError::Parse(_)));
    }

    #[test]
    fn test_toml_round_trip() {
        let config = RegistryConfig {
            store: StoreConfig {
                path: PathBuf::from("codes.db"),
                busy_timeout_ms: 1000,
            },
            verification: VerificationConfig {
                base_url: Some("https://example.com/".to_string()),
                display_verify_count: true,
                qr_service_url: "https://qr.example.com/render".to_string(),
            },
        };

        let text = config.to_toml().unwrap();
        assert_eq!(RegistryConfig::from_toml(&text).unwrap(), config);
    }

    #[test]
    fn test_from_file_and_open_store() {
        let dir = tempfile::tempdir().unwrap();
        let db = dir.path().join("nested").join("codes.db");
        let config_path = dir.path().join("itemcode.toml");
        std::fs::write(
            &config_path,
            format!("[store]\npath = {:?}\n", db.to_string_lossy()),
        )
        .unwrap();

        let config = RegistryConfig::from_file(&config_path).unwrap();
        let store = config.store.open().unwrap();
        assert!(store.table_exists().unwrap());
        assert!(db.exists());
    }

    #[test]
    fn test_from_file_missing() {
        let dir = tempfile::tempdir().unwrap();
        let err = RegistryConfig::from_file(&dir.path().join("absent.toml")).unwrap_err();
        assert!(matches!(err, ConfigError::Io(_)));
    }
}
