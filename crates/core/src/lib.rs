//! Core types for isocheck
//!
//! This crate defines the vocabulary shared by stores and the harness:
//! - IsolationLevel / Anomaly: what is requested and what is being probed
//! - SqlValue / RowSet / Row / Snapshot: values and ordered row snapshots
//! - Fixture: the table a scenario runs against, and how it is reset
//! - Scenario / Step / TxRef: scripted two-transaction interleavings
//! - ObservedTrace / Mismatch: what a run observed and how it differs
//! - Error: store and harness error taxonomy

#![warn(missing_docs)]
#![warn(clippy::all)]

pub mod error;
pub mod fixture;
pub mod isolation;
pub mod scenario;
pub mod trace;
pub mod value;

pub use error::{
    HarnessError, HarnessResult, StepError, StepErrorKind, StoreError, StoreErrorKind, StoreResult,
};
pub use fixture::{Fixture, USERS_TABLE};
pub use isolation::{Anomaly, IsolationLevel};
pub use scenario::{Action, FailureClass, Scenario, Step, TxRef};
pub use trace::{Mismatch, Observation, ObservedTrace, StepOutcome};
pub use value::{Row, RowDiff, RowSet, Snapshot, SqlValue};
