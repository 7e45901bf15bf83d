//! Error types for the isolation harness
//!
//! Errors come in two layers:
//!
//! - [`StoreError`]: a store refused an operation. It carries a coarse
//!   [`StoreErrorKind`] so scenarios can declare expected failures without
//!   depending on engine error codes.
//! - [`HarnessError`]: why a harness operation did not produce a passing
//!   result. Step failures carry the index of the failing step so a report
//!   can point at the exact interleaving position.
//!
//! We use `thiserror` for `Display` and `Error` implementations.

use crate::scenario::TxRef;
use crate::trace::Mismatch;
use std::fmt;
use std::time::Duration;
use thiserror::Error;

/// Result type alias for store operations
pub type StoreResult<T> = std::result::Result<T, StoreError>;

/// Result type alias for harness operations
pub type HarnessResult<T> = std::result::Result<T, HarnessError>;

// ============================================================================
// Store errors
// ============================================================================

/// Coarse classification of a store failure.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum StoreErrorKind {
    /// Could not open or use a connection
    Connection,
    /// Serialization or write-write conflict; retrying the transaction may succeed
    Conflict,
    /// Lock held by another transaction
    Locked,
    /// Constraint violation
    Constraint,
    /// Operation was interrupted from another thread
    Interrupted,
    /// Anything else (syntax errors, missing tables, ...)
    Other,
}

impl fmt::Display for StoreErrorKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            StoreErrorKind::Connection => "connection",
            StoreErrorKind::Conflict => "conflict",
            StoreErrorKind::Locked => "locked",
            StoreErrorKind::Constraint => "constraint",
            StoreErrorKind::Interrupted => "interrupted",
            StoreErrorKind::Other => "other",
        };
        f.write_str(name)
    }
}

/// A store refused an operation.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error("{kind} error: {message}")]
pub struct StoreError {
    /// Classification
    pub kind: StoreErrorKind,
    /// Engine message
    pub message: String,
    /// Engine-specific error code, if the engine reports one
    pub code: Option<i32>,
}

impl StoreError {
    /// Create an error without an engine code.
    pub fn new(kind: StoreErrorKind, message: impl Into<String>) -> Self {
        StoreError {
            kind,
            message: message.into(),
            code: None,
        }
    }

    /// Attach an engine error code.
    pub fn with_code(mut self, code: i32) -> Self {
        self.code = Some(code);
        self
    }

    /// Shorthand for a [`StoreErrorKind::Connection`] error.
    pub fn connection(message: impl Into<String>) -> Self {
        Self::new(StoreErrorKind::Connection, message)
    }
}

// ============================================================================
// Step errors
// ============================================================================

/// Why a step failed.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum StepErrorKind {
    /// The step did not finish before its deadline
    #[error("timed out after {after:?}")]
    Timeout {
        /// Deadline that elapsed
        after: Duration,
    },

    /// The store refused the statement
    #[error("store rejected the statement: {0}")]
    StoreRejected(StoreError),

    /// The step finished but its result could not be used
    #[error("unexpected result: {0}")]
    Unexpected(String),
}

/// A step failed without the scenario declaring that failure.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error("step {step_index} ({tx}) failed: {kind}")]
pub struct StepError {
    /// Index of the failing step
    pub step_index: usize,
    /// Handle the step ran on
    pub tx: TxRef,
    /// Statement text, for query and exec steps
    pub statement: Option<String>,
    /// Failure
    #[source]
    pub kind: StepErrorKind,
}

impl StepError {
    /// Whether the step hit its deadline.
    pub fn is_timeout(&self) -> bool {
        matches!(self.kind, StepErrorKind::Timeout { .. })
    }
}

// ============================================================================
// Harness errors
// ============================================================================

/// Error returned by harness operations.
#[derive(Debug, Error)]
pub enum HarnessError {
    /// A connection could not be opened
    #[error("Connection error: {message}")]
    Connection {
        /// What failed
        message: String,
        /// Underlying store error
        #[source]
        source: Option<StoreError>,
    },

    /// The fixture could not be reset
    #[error("Fixture error on table '{table}': {message}")]
    Fixture {
        /// Fixture table
        table: String,
        /// What failed
        message: String,
        /// Underlying store error
        #[source]
        source: Option<StoreError>,
    },

    /// A step failed and the scenario did not declare that failure
    #[error("Step error: {0}")]
    Step(#[from] StepError),

    /// The run completed but the observed trace differs from the expected one
    #[error("Assertion mismatch in scenario '{scenario}': {}", summarize(.mismatches))]
    AssertionMismatch {
        /// Scenario name
        scenario: String,
        /// Every difference found
        mismatches: Vec<Mismatch>,
    },

    /// The scenario is malformed
    #[error("Invalid scenario '{scenario}': {reason}")]
    InvalidScenario {
        /// Scenario name
        scenario: String,
        /// What is wrong with it
        reason: String,
    },

    /// Configuration could not be loaded or is invalid
    #[error("Configuration error: {0}")]
    Config(String),
}

impl HarnessError {
    /// Mismatches carried by an [`HarnessError::AssertionMismatch`]; empty otherwise.
    pub fn mismatches(&self) -> &[Mismatch] {
        match self {
            HarnessError::AssertionMismatch { mismatches, .. } => mismatches,
            _ => &[],
        }
    }

    /// The step failure carried by an [`HarnessError::Step`].
    pub fn step_error(&self) -> Option<&StepError> {
        match self {
            HarnessError::Step(e) => Some(e),
            _ => None,
        }
    }
}

fn summarize(mismatches: &[Mismatch]) -> String {
    let parts: Vec<String> = mismatches.iter().map(|m| m.to_string()).collect();
    format!("{} mismatch(es): {}", mismatches.len(), parts.join(" | "))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::trace::StepOutcome;
    use crate::value::{Row, Snapshot};
    use std::error::Error as _;

    #[test]
    fn test_store_error_display() {
        let err = StoreError::new(StoreErrorKind::Locked, "database is locked").with_code(5);
        let msg = err.to_string();
        assert!(msg.contains("locked"));
        assert!(msg.contains("database is locked"));
        assert_eq!(err.code, Some(5));
    }

    #[test]
    fn test_step_error_display_carries_index() {
        let err = StepError {
            step_index: 3,
            tx: TxRef::Tx2,
            statement: Some("UPDATE users SET score = 0".into()),
            kind: StepErrorKind::Timeout {
                after: Duration::from_millis(200),
            },
        };
        let msg = err.to_string();
        assert!(msg.contains("step 3 (tx2)"));
        assert!(msg.contains("timed out"));
        assert!(err.is_timeout());
    }

    #[test]
    fn test_step_error_converts_to_harness_error() {
        let err: HarnessError = StepError {
            step_index: 1,
            tx: TxRef::Tx1,
            statement: None,
            kind: StepErrorKind::StoreRejected(StoreError::new(
                StoreErrorKind::Other,
                "no such table: users",
            )),
        }
        .into();
        assert!(err.to_string().contains("Step error"));
        assert_eq!(err.step_error().map(|e| e.step_index), Some(1));
        assert!(err.mismatches().is_empty());
    }

    #[test]
    fn test_connection_error_exposes_source() {
        let err = HarnessError::Connection {
            message: "unable to open database file".into(),
            source: Some(StoreError::connection("unable to open database file")),
        };
        assert!(err.to_string().contains("Connection error"));
        assert!(err.source().is_some());
    }

    #[test]
    fn test_fixture_error_names_table() {
        let err = HarnessError::Fixture {
            table: "select".into(),
            message: "syntax error".into(),
            source: None,
        };
        let msg = err.to_string();
        assert!(msg.contains("Fixture error"));
        assert!(msg.contains("'select'"));
    }

    #[test]
    fn test_assertion_mismatch_lists_every_mismatch() {
        let seed = Snapshot::new(vec![Row::new(1, "Alice", 100)]);
        let mismatch = |step_index| Mismatch {
            step_index,
            tx: TxRef::Tx1,
            expected: Some(StepOutcome::Rows(seed.clone())),
            actual: Some(StepOutcome::Rows(Snapshot::default())),
            rows: seed.diff(&Snapshot::default()),
        };
        let err = HarnessError::AssertionMismatch {
            scenario: "phantom_read".into(),
            mismatches: vec![mismatch(2), mismatch(4)],
        };
        let msg = err.to_string();
        assert!(msg.contains("phantom_read"));
        assert!(msg.contains("2 mismatch(es)"));
        assert!(msg.contains("step 2"));
        assert!(msg.contains("step 4"));
        assert_eq!(err.mismatches().len(), 2);
    }

    #[test]
    fn test_error_pattern_matching() {
        let err = HarnessError::InvalidScenario {
            scenario: "s".into(),
            reason: "scenario has no steps".into(),
        };

        match err {
            HarnessError::InvalidScenario { scenario, reason } => {
                assert_eq!(scenario, "s");
                assert!(reason.contains("no steps"));
            }
            _ => panic!("Wrong error variant"),
        }
    }
}
