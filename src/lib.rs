//! isocheck - transaction-isolation conformance harness
//!
//! isocheck runs scripted interleavings of two concurrent transactions
//! against a SQL store and checks, step by step, what each read observed.
//! It is used to confirm that an engine shows (or prevents) the ANSI
//! anomalies at each isolation level the way its profile says it does.
//!
//! # Quick Start
//!
//! ```ignore
//! use isocheck::{catalog, EngineProfile, HarnessConfig, IsolationHarness, IsolationLevel};
//!
//! // Shared-cache SQLite memory database
//! let harness = IsolationHarness::sqlite(HarnessConfig::default())?;
//!
//! // Every catalog scenario at every level
//! let sweep = harness.check_profile(&EngineProfile::sqlite_shared_cache());
//! assert!(sweep.passed(), "{:?}", sweep.failures);
//! ```
//!
//! # Architecture
//!
//! - `isocheck-core`: scenarios, fixtures, snapshots, traces and errors
//! - `isocheck-store`: the store seam and the SQLite backend
//! - `isocheck-harness`: the harness itself, catalog, profiles, reports

pub use isocheck_core::*;
pub use isocheck_harness::*;
pub use isocheck_store::{
    Connection, ConnectionGuard, ConnectionTracker, Interrupt, JournalMode, SqliteConfig,
    SqliteMode, Store,
};

#[cfg(feature = "sqlite")]
pub use isocheck_store::{SqliteConnection, SqliteStore};
