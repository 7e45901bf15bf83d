//! Two-transaction isolation harness
//!
//! Runs scripted interleavings of two concurrent transactions against a
//! [`Store`](isocheck_store::Store) and checks what each read observed:
//! - IsolationHarness: fixture reset, scenario execution, checking
//! - TransactionHandle: one connection driven on its own worker thread
//! - catalog: ready-made dirty read, non-repeatable read, phantom read and
//!   dirty write scenarios
//! - EngineProfile: per-engine expectations for every anomaly and level
//! - HarnessConfig: timeouts and store settings from `isocheck.toml`
//! - ScenarioReport / ProfileReport: what one run or one profile sweep observed

#![warn(missing_docs)]
#![warn(clippy::all)]

pub mod catalog;
pub mod config;
pub mod handle;
pub mod harness;
pub mod profile;
pub mod report;

#[cfg(test)]
mod scripted;

pub use config::{HarnessConfig, CONFIG_FILE_NAME};
pub use handle::{HandleState, TransactionHandle};
pub use harness::IsolationHarness;
pub use profile::{Behavior, EngineProfile};
pub use report::{ProfileReport, ScenarioFailure, ScenarioReport};
