//! Shared test utilities for the integration test suites.
//!
//! Import via `mod common;` from any test file.

#![allow(dead_code)]

use isocheck::{HarnessConfig, IsolationHarness, JournalMode, SqliteConfig, SqliteStore};
use std::sync::Once;
use std::time::Duration;
use tempfile::TempDir;

static INIT_TRACING: Once = Once::new();

/// Route harness logs through the test writer. Set `RUST_LOG` to see them.
pub fn init_tracing() {
    INIT_TRACING.call_once(|| {
        let _ = tracing_subscriber::fmt()
            .with_test_writer()
            .with_env_filter(tracing_subscriber::EnvFilter::from_default_env())
            .try_init();
    });
}

/// Harness over a SQLite file database kept alive by `dir`.
pub struct FileHarness {
    pub harness: IsolationHarness<SqliteStore>,
    pub dir: TempDir,
}

impl std::ops::Deref for FileHarness {
    type Target = IsolationHarness<SqliteStore>;

    fn deref(&self) -> &Self::Target {
        &self.harness
    }
}

/// Shared-cache memory database with default settings.
pub fn shared_cache() -> IsolationHarness<SqliteStore> {
    init_tracing();
    IsolationHarness::<SqliteStore>::sqlite(HarnessConfig::default())
        .expect("Failed to open memory database")
}

/// WAL file database; writers fail immediately on a held lock.
pub fn wal() -> FileHarness {
    file_harness(JournalMode::Wal, Duration::ZERO, HarnessConfig::default())
}

/// Rollback-journal file database; writers fail immediately on a held lock.
pub fn delete_journal() -> FileHarness {
    file_harness(JournalMode::Delete, Duration::ZERO, HarnessConfig::default())
}

/// File database with explicit journal mode, busy timeout and harness settings.
pub fn file_harness(
    journal_mode: JournalMode,
    busy_timeout: Duration,
    config: HarnessConfig,
) -> FileHarness {
    init_tracing();
    let dir = tempfile::tempdir().expect("Failed to create temp dir");
    let config = HarnessConfig {
        sqlite: SqliteConfig::file(dir.path().join("isocheck.db"))
            .with_journal_mode(journal_mode)
            .with_busy_timeout(busy_timeout),
        ..config
    };
    let harness =
        IsolationHarness::<SqliteStore>::sqlite(config).expect("Failed to open database file");
    FileHarness { harness, dir }
}
