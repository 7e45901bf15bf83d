//! Store seam for isocheck
//!
//! The harness only ever talks to a store through the [`Store`] and
//! [`Connection`] traits defined here. Backends:
//!
//! - `sqlite` (feature `sqlite`, on by default): SQLite through `rusqlite`,
//!   as a shared-cache memory database or a WAL / rollback-journal file.

#![warn(missing_docs)]
#![warn(clippy::all)]

pub mod config;
pub mod tracker;
pub mod traits;

#[cfg(feature = "sqlite")]
pub mod sqlite;

pub use config::{JournalMode, SqliteConfig, SqliteMode};
pub use tracker::{ConnectionGuard, ConnectionTracker};
pub use traits::{Connection, Interrupt, Store};

#[cfg(feature = "sqlite")]
pub use sqlite::{SqliteConnection, SqliteStore};
