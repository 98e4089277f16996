//! Database configuration via `tidkv.toml`
//!
//! Every field has a default, so an empty file (or no file at all) gives a
//! database that interoperates with the classic key layout: a global
//! counter at `__txMarker` and version markers at `<key>:tid`.

use std::path::Path;
use std::time::Duration;

use serde::{Deserialize, Serialize};
use tidkv_core::{
    Error, KeySpace, Result, TombstoneEncoding, DEFAULT_MARKER_KEY, DEFAULT_TID_SUFFIX,
};
use tidkv_storage::CommitScript;

use super::transactions::RetryConfig;

/// Conventional config file name
pub const CONFIG_FILE_NAME: &str = "tidkv.toml";

/// Database configuration
///
/// # Example
///
/// ```toml
/// marker_key = "__txMarker"
/// tid_suffix = ":tid"
/// tombstones = "tagged"
/// tx_timeout_ms = 30000
///
/// [retry]
/// max_retries = 10
/// base_delay_ms = 1
/// max_delay_ms = 100
/// ```
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DatabaseConfig {
    /// Key holding the global transaction counter
    #[serde(default = "default_marker_key")]
    pub marker_key: String,
    /// Suffix appended to a key to name its version marker
    #[serde(default = "default_tid_suffix")]
    pub tid_suffix: String,
    /// How deletes are passed to the commit script
    #[serde(default)]
    pub tombstones: TombstoneEncoding,
    /// Roll transactions back this many milliseconds after begin
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub tx_timeout_ms: Option<u64>,
    /// Backoff for `update_with_retry`
    #[serde(default)]
    pub retry: RetryConfig,
}

fn default_marker_key() -> String {
    DEFAULT_MARKER_KEY.to_string()
}

fn default_tid_suffix() -> String {
    DEFAULT_TID_SUFFIX.to_string()
}

impl Default for DatabaseConfig {
    fn default() -> Self {
        Self {
            marker_key: default_marker_key(),
            tid_suffix: default_tid_suffix(),
            tombstones: TombstoneEncoding::default(),
            tx_timeout_ms: None,
            retry: RetryConfig::default(),
        }
    }
}

impl DatabaseConfig {
    /// Set the counter key and version marker suffix
    pub fn with_key_names(mut self, marker_key: impl Into<String>, tid_suffix: impl Into<String>) -> Self {
        self.marker_key = marker_key.into();
        self.tid_suffix = tid_suffix.into();
        self
    }

    /// Set the tombstone encoding
    pub fn with_tombstones(mut self, tombstones: TombstoneEncoding) -> Self {
        self.tombstones = tombstones;
        self
    }

    /// Set the transaction timeout
    ///
    /// Durations beyond `u64::MAX` milliseconds saturate.
    pub fn with_tx_timeout(mut self, timeout: Duration) -> Self {
        self.tx_timeout_ms = Some(u64::try_from(timeout.as_millis()).unwrap_or(u64::MAX));
        self
    }

    /// Set the retry policy
    pub fn with_retry(mut self, retry: RetryConfig) -> Self {
        self.retry = retry;
        self
    }

    /// Transaction timeout, if any
    pub fn tx_timeout(&self) -> Option<Duration> {
        self.tx_timeout_ms.map(Duration::from_millis)
    }

    /// Key names derived from this config
    ///
    /// # Errors
    ///
    /// Returns `Error::Config` for empty names or a marker key that ends with
    /// the suffix.
    pub fn key_space(&self) -> Result<KeySpace> {
        KeySpace::new(self.marker_key.as_str(), self.tid_suffix.as_str())
            .map_err(|e| Error::Config(e.to_string()))
    }

    /// Commit script rendered for this config
    pub fn commit_script(&self) -> Result<CommitScript> {
        Ok(CommitScript::new(self.key_space()?, self.tombstones))
    }

    /// Check every field
    ///
    /// # Errors
    ///
    /// Returns `Error::Config` describing the first invalid field.
    pub fn validate(&self) -> Result<()> {
        self.key_space()?;
        if self.tx_timeout_ms == Some(0) {
            return Err(Error::Config(
                "tx_timeout_ms must be positive; omit it to disable the timeout".to_string(),
            ));
        }
        if self.retry.base_delay_ms > self.retry.max_delay_ms {
            return Err(Error::Config(format!(
                "retry.base_delay_ms ({}) exceeds retry.max_delay_ms ({})",
                self.retry.base_delay_ms, self.retry.max_delay_ms
            )));
        }
        Ok(())
    }

    /// Returns the default config file content with comments.
    pub fn default_toml() -> &'static str {
        r#"# tidkv configuration
#
# Key holding the global transaction counter
marker_key = "__txMarker"

# Suffix naming each key's version marker (<key>:tid)
tid_suffix = ":tid"

# Tombstone encoding: "tagged" (default) or "empty_value"
#   "tagged"      = explicit set/del ops, empty values are values
#   "empty_value" = legacy layout, an empty value deletes the key
tombstones = "tagged"

# Roll transactions back after this many milliseconds (default: no timeout)
# tx_timeout_ms = 30000

# Backoff for update_with_retry
[retry]
max_retries = 10
base_delay_ms = 1
max_delay_ms = 100
"#
    }

    /// Parse and validate config from TOML text.
    ///
    /// # Errors
    ///
    /// Returns `Error::Config` if the text cannot be parsed or is invalid.
    pub fn from_toml_str(content: &str) -> Result<Self> {
        let config: DatabaseConfig = toml::from_str(content)
            .map_err(|e| Error::Config(format!("Failed to parse config: {}", e)))?;
        config.validate()?;
        Ok(config)
    }

    /// Read and parse config from a file path.
    ///
    /// # Errors
    ///
    /// Returns an error if the file cannot be read, parsed or validated.
    pub fn from_file(path: &Path) -> Result<Self> {
        let content = std::fs::read_to_string(path).map_err(|e| {
            Error::Config(format!(
                "Failed to read config file '{}': {}",
                path.display(),
                e
            ))
        })?;
        Self::from_toml_str(&content).map_err(|e| match e {
            Error::Config(msg) => Error::Config(format!("{} ({})", msg, path.display())),
            other => other,
        })
    }

    /// Write the default config file if it does not already exist.
    ///
    /// Returns `Ok(())` whether the file was created or already existed.
    pub fn write_default_if_missing(path: &Path) -> Result<()> {
        if !path.exists() {
            std::fs::write(path, Self::default_toml()).map_err(|e| {
                Error::Config(format!(
                    "Failed to write default config file '{}': {}",
                    path.display(),
                    e
                ))
            })?;
        }
        Ok(())
    }

    /// Serialize this config to TOML and write it to the given path.
    pub fn write_to_file(&self, path: &Path) -> Result<()> {
        let content = toml::to_string_pretty(self)
            .map_err(|e| Error::Config(format!("Failed to serialize config: {}", e)))?;
        std::fs::write(path, content).map_err(|e| {
            Error::Config(format!(
                "Failed to write config file '{}': {}",
                path.display(),
                e
            ))
        })
    }
}
