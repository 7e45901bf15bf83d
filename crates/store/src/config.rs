//! Store settings
//!
//! Settings are plain serde structs so they can be embedded in the harness
//! configuration file whether or not a backend is compiled in.

use serde::{Deserialize, Serialize};
use std::path::PathBuf;
use std::time::Duration;

// ============================================================================
// Configuration
// ============================================================================

/// Where the database lives.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SqliteMode {
    /// Shared-cache in-memory database, private to one store
    #[default]
    Memory,
    /// Database file at `SqliteConfig::path`
    File,
}

/// Journal mode applied to file databases.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum JournalMode {
    /// Write-ahead log
    #[default]
    Wal,
    /// Rollback journal, deleted after each transaction
    Delete,
}

impl JournalMode {
    /// Value for `PRAGMA journal_mode`.
    pub fn as_pragma(&self) -> &'static str {
        match self {
            JournalMode::Wal => "WAL",
            JournalMode::Delete => "DELETE",
        }
    }
}

/// SQLite store settings (the `[sqlite]` section of `isocheck.toml`).
#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct SqliteConfig {
    /// Memory or file database
    #[serde(default)]
    pub mode: SqliteMode,

    /// Database file; required in file mode
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub path: Option<PathBuf>,

    /// Journal mode for file databases (ignored in memory mode)
    #[serde(default)]
    pub journal_mode: JournalMode,

    /// Milliseconds a statement waits on a busy lock before failing.
    /// 0 (the default) fails immediately, so lock conflicts surface as
    /// errors instead of waits.
    #[serde(default)]
    pub busy_timeout_ms: u64,
}

impl SqliteConfig {
    /// Shared-cache in-memory database.
    pub fn memory() -> Self {
        Self::default()
    }

    /// Database file at `path` in WAL mode.
    pub fn file(path: impl Into<PathBuf>) -> Self {
        SqliteConfig {
            mode: SqliteMode::File,
            path: Some(path.into()),
            ..Self::default()
        }
    }

    /// Override the journal mode.
    pub fn with_journal_mode(mut self, journal_mode: JournalMode) -> Self {
        self.journal_mode = journal_mode;
        self
    }

    /// Override the busy timeout.
    pub fn with_busy_timeout(mut self, timeout: Duration) -> Self {
        self.busy_timeout_ms = timeout.as_millis() as u64;
        self
    }

    /// Check that the settings describe an openable database.
    pub fn validate(&self) -> Result<(), String> {
        match (self.mode, &self.path) {
            (SqliteMode::File, None) => Err("sqlite.path is required in file mode".to_string()),
            (SqliteMode::File, Some(p)) if p.as_os_str().is_empty() => {
                Err("sqlite.path must not be empty".to_string())
            }
            _ => Ok(()),
        }
    }
}
