//! Primitive configuration via `quorum.toml`
//!
//! Tunables for client primitives live in one small TOML file. Every field
//! has a default, so an empty file (or no file at all) is a valid config.

use quorum_concurrency::Isolation;
use quorum_core::{Error, Result};
use serde::{Deserialize, Serialize};
use std::path::Path;

/// Config file name.
pub const CONFIG_FILE_NAME: &str = "quorum.toml";

/// Default number of IDs reserved per remote call.
pub const DEFAULT_BATCH_SIZE: i64 = 1000;

/// `[id_generator]` section.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct IdGeneratorConfig {
    /// IDs reserved per remote `get_and_add`; must be at least 1
    #[serde(default = "default_batch_size")]
    pub batch_size: i64,
}

fn default_batch_size() -> i64 {
    DEFAULT_BATCH_SIZE
}

impl Default for IdGeneratorConfig {
    fn default() -> Self {
        Self {
            batch_size: default_batch_size(),
        }
    }
}

/// `[register]` section.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct RegisterConfig {
    /// Map key holding the register value. Defaults to the register name.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub key: Option<String>,
}

/// `[transactions]` section.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct TransactionsConfig {
    /// `"read_committed"` (default) or `"repeatable_read"`
    #[serde(default)]
    pub isolation: Isolation,
}

/// Configuration loaded from `quorum.toml`.
///
/// # Example
///
/// ```toml
/// [id_generator]
/// batch_size = 1000
///
/// [register]
/// key = "leader-lease"
///
/// [transactions]
/// isolation = "repeatable_read"
/// ```
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct PrimitivesConfig {
    /// ID generator tunables
    #[serde(default)]
    pub id_generator: IdGeneratorConfig,
    /// Atomic register tunables
    #[serde(default)]
    pub register: RegisterConfig,
    /// Transactional map tunables
    #[serde(default)]
    pub transactions: TransactionsConfig,
}

impl PrimitivesConfig {
    /// Check values that serde cannot.
    ///
    /// # Errors
    ///
    /// Returns `InvalidArgument` if the batch size is below 1 or the
    /// register key is empty.
    pub fn validate(&self) -> Result<()> {
        if self.id_generator.batch_size < 1 {
            return Err(Error::invalid_argument(format!(
                "id_generator.batch_size must be at least 1, got {}",
                self.id_generator.batch_size
            )));
        }
        if matches!(self.register.key.as_deref(), Some("")) {
            return Err(Error::invalid_argument("register.key must not be empty"));
        }
        Ok(())
    }

    /// Map key for a register, honouring the `[register] key` override.
    pub fn register_key<'a>(&'a self, name: &'a str) -> &'a str {
        self.register.key.as_deref().unwrap_or(name)
    }

    /// Returns the default config file content with comments.
    pub fn default_toml() -> &'static str {
        r#"# Quorum primitives configuration

[id_generator]
# IDs reserved per remote call (default: 1000, minimum: 1).
# Larger batches mean fewer round trips and larger gaps after restarts.
batch_size = 1000

[register]
# Map key holding the register value (default: the register name).
# key = "my-register"

[transactions]
# "read_committed" (default) or "repeatable_read"
isolation = "read_committed"
"#
    }

    /// Parse and validate config from a TOML string.
    pub fn from_toml(content: &str) -> Result<Self> {
        let config: PrimitivesConfig = toml::from_str(content)
            .map_err(|e| Error::Config(format!("Failed to parse config: {}", e)))?;
        config.validate()?;
        Ok(config)
    }

    /// Read and parse config from a file path.
    ///
    /// # Errors
    ///
    /// Returns `Config` if the file cannot be read or parsed, and
    /// `InvalidArgument` if a value is out of range.
    pub fn from_file(path: &Path) -> Result<Self> {
        let content = std::fs::read_to_string(path).map_err(|e| {
            Error::Config(format!(
                "Failed to read config file '{}': {}",
                path.display(),
                e
            ))
        })?;
        let config: PrimitivesConfig = toml::from_str(&content).map_err(|e| {
            Error::Config(format!(
                "Failed to parse config file '{}': {}",
                path.display(),
                e
            ))
        })?;
        config.validate()?;
        Ok(config)
    }

    /// Write the default config file if it does not already exist.
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
