//! Harness configuration via `isocheck.toml`
//!
//! Every field has a default, so an empty file (or no file at all) is a
//! valid configuration. Step and teardown deadlines are harness-wide; a
//! step may still declare its own deadline in the scenario.

use isocheck_core::{HarnessError, HarnessResult};
use isocheck_store::SqliteConfig;
use serde::{Deserialize, Serialize};
use std::path::Path;
use std::time::Duration;

/// Config file name looked up in the working directory.
pub const CONFIG_FILE_NAME: &str = "isocheck.toml";

fn default_step_timeout_ms() -> u64 {
    5000
}

fn default_teardown_timeout_ms() -> u64 {
    5000
}

/// Harness configuration loaded from `isocheck.toml`.
///
/// # Example
///
/// ```toml
/// # Deadline for one step when the scenario does not set its own
/// step_timeout_ms = 5000
///
/// [sqlite]
/// mode = "file"
/// path = "isocheck.db"
/// journal_mode = "wal"
/// ```
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct HarnessConfig {
    /// Default step deadline in milliseconds
    #[serde(default = "default_step_timeout_ms")]
    pub step_timeout_ms: u64,
    /// How long teardown waits for a handle to roll back and close
    #[serde(default = "default_teardown_timeout_ms")]
    pub teardown_timeout_ms: u64,
    /// SQLite store settings
    #[serde(default)]
    pub sqlite: SqliteConfig,
}

impl Default for HarnessConfig {
    fn default() -> Self {
        Self {
            step_timeout_ms: default_step_timeout_ms(),
            teardown_timeout_ms: default_teardown_timeout_ms(),
            sqlite: SqliteConfig::default(),
        }
    }
}

impl HarnessConfig {
    /// Default step deadline.
    pub fn step_timeout(&self) -> Duration {
        Duration::from_millis(self.step_timeout_ms)
    }

    /// Teardown grace period per handle.
    pub fn teardown_timeout(&self) -> Duration {
        Duration::from_millis(self.teardown_timeout_ms)
    }

    /// Override the default step deadline.
    pub fn with_step_timeout(mut self, timeout: Duration) -> Self {
        self.step_timeout_ms = timeout.as_millis() as u64;
        self
    }

    /// Reject settings no run could use.
    ///
    /// # Errors
    ///
    /// Returns [`HarnessError::Config`] for a zero deadline or invalid store
    /// settings.
    pub fn validate(&self) -> HarnessResult<()> {
        if self.step_timeout_ms == 0 {
            return Err(HarnessError::Config(
                "step_timeout_ms must be greater than 0".to_string(),
            ));
        }
        if self.teardown_timeout_ms == 0 {
            return Err(HarnessError::Config(
                "teardown_timeout_ms must be greater than 0".to_string(),
            ));
        }
        self.sqlite.validate().map_err(HarnessError::Config)
    }

    /// Returns the default config file content with comments.
    pub fn default_toml() -> &'static str {
        r#"# isocheck harness configuration
#
# Deadline for a single step, in milliseconds (default: 5000).
# Scenarios can override it per step with "timeout_ms".
step_timeout_ms = 5000

# How long teardown waits for each transaction handle to roll back and
# close, in milliseconds (default: 5000).
teardown_timeout_ms = 5000

[sqlite]
# "memory" (default): private shared-cache in-memory database
# "file": database file at `path`
mode = "memory"
# path = "isocheck.db"

# Journal mode for file databases: "wal" (default) or "delete"
journal_mode = "wal"

# How long a statement waits on a lock before failing (default: 0).
# Keep at 0 so lock conflicts surface as step failures.
busy_timeout_ms = 0
"#
    }

    /// Parse config from TOML text and validate it.
    ///
    /// # Errors
    ///
    /// Returns [`HarnessError::Config`] if the text cannot be parsed or
    /// fails validation.
    pub fn from_toml_str(content: &str) -> HarnessResult<Self> {
        let config: HarnessConfig = toml::from_str(content)
            .map_err(|e| HarnessError::Config(format!("Failed to parse config: {}", e)))?;
        config.validate()?;
        Ok(config)
    }

    /// Read and parse config from a file path.
    ///
    /// # Errors
    ///
    /// Returns an error if the file cannot be read, parsed, or validated.
    pub fn from_file(path: &Path) -> HarnessResult<Self> {
        let content = std::fs::read_to_string(path).map_err(|e| {
            HarnessError::Config(format!(
                "Failed to read config file '{}': {}",
                path.display(),
                e
            ))
        })?;
        Self::from_toml_str(&content).map_err(|e| match e {
            HarnessError::Config(msg) => {
                HarnessError::Config(format!("{} ({})", msg, path.display()))
            }
            other => other,
        })
    }

    /// Write the default config file if it does not already exist.
    ///
    /// Returns `Ok(())` whether the file was created or already existed.
    pub fn write_default_if_missing(path: &Path) -> HarnessResult<()> {
        if !path.exists() {
            std::fs::write(path, Self::default_toml()).map_err(|e| {
                HarnessError::Config(format!(
                    "Failed to write default config file '{}': {}",
                    path.display(),
                    e
                ))
            })?;
        }
        Ok(())
    }

    /// Serialize this config to TOML and write it to the given path.
    pub fn write_to_file(&self, path: &Path) -> HarnessResult<()> {
        let content = toml::to_string_pretty(self)
            .map_err(|e| HarnessError::Config(format!("Failed to serialize config: {}", e)))?;
        std::fs::write(path, content).map_err(|e| {
            HarnessError::Config(format!(
                "Failed to write config file '{}': {}",
                path.display(),
                e
            ))
        })
    }
}
