//! Observed traces and trace comparison
//!
//! Every query step of a run contributes one [`Observation`]. Two traces are
//! equal when they hold the same observations in the same order; snapshot
//! equality inside an observation is positional.

use crate::scenario::{FailureClass, TxRef};
use crate::value::{RowDiff, Snapshot};
use serde::{Deserialize, Serialize};
use std::fmt;

/// What a query step produced.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "outcome", content = "value", rename_all = "snake_case")]
pub enum StepOutcome {
    /// Rows returned by the query, in order
    Rows(Snapshot),
    /// Step finished without rows to compare
    Completed,
    /// Step ended with a declared, matched failure
    Failed(FailureClass),
}

impl fmt::Display for StepOutcome {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            StepOutcome::Rows(snapshot) => write!(f, "rows {}", snapshot),
            StepOutcome::Completed => write!(f, "completed"),
            StepOutcome::Failed(class) => write!(f, "failed ({})", class),
        }
    }
}

/// One entry of an observed trace.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Observation {
    /// Index of the step in its scenario
    pub step_index: usize,
    /// Handle the step ran on
    pub tx: TxRef,
    /// What the step produced
    pub outcome: StepOutcome,
}

impl Observation {
    /// Create an observation.
    pub fn new(step_index: usize, tx: TxRef, outcome: StepOutcome) -> Self {
        Observation {
            step_index,
            tx,
            outcome,
        }
    }
}

/// Ordered observations of one run.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct ObservedTrace {
    observations: Vec<Observation>,
}

impl ObservedTrace {
    /// Empty trace.
    pub fn new() -> Self {
        Self::default()
    }

    /// Append an observation.
    pub fn push(&mut self, observation: Observation) {
        self.observations.push(observation);
    }

    /// Number of observations.
    pub fn len(&self) -> usize {
        self.observations.len()
    }

    /// True if nothing was observed.
    pub fn is_empty(&self) -> bool {
        self.observations.is_empty()
    }

    /// Observations in order.
    pub fn iter(&self) -> impl Iterator<Item = &Observation> {
        self.observations.iter()
    }

    /// Snapshots observed on `tx`, in order.
    pub fn snapshots(&self, tx: TxRef) -> Vec<&Snapshot> {
        self.observations
            .iter()
            .filter(|o| o.tx == tx)
            .filter_map(|o| match &o.outcome {
                StepOutcome::Rows(snapshot) => Some(snapshot),
                _ => None,
            })
            .collect()
    }

    /// Every difference between `self` (actual) and `expected`.
    ///
    /// Observations are paired by step index. A step present in only one
    /// trace yields a mismatch with the other side `None`. The result is
    /// empty if and only if the traces are equal.
    pub fn diff(&self, expected: &ObservedTrace) -> Vec<Mismatch> {
        let mut mismatches = Vec::new();
        let mut actual = self.observations.iter().peekable();
        let mut wanted = expected.observations.iter().peekable();

        loop {
            let (e, a) = match (wanted.peek(), actual.peek()) {
                (None, None) => break,
                (Some(e), Some(a)) if e.step_index == a.step_index => {
                    (wanted.next(), actual.next())
                }
                (Some(e), Some(a)) if e.step_index < a.step_index => (wanted.next(), None),
                (Some(_), Some(_)) => (None, actual.next()),
                (Some(_), None) => (wanted.next(), None),
                (None, Some(_)) => (None, actual.next()),
            };
            if let Some(mismatch) = Mismatch::between(e, a) {
                mismatches.push(mismatch);
            }
        }
        mismatches
    }
}

impl<'a> IntoIterator for &'a ObservedTrace {
    type Item = &'a Observation;
    type IntoIter = std::slice::Iter<'a, Observation>;

    fn into_iter(self) -> Self::IntoIter {
        self.observations.iter()
    }
}

/// Difference between the expected and the actual outcome of one step.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Mismatch {
    /// Step index the difference is attributed to
    pub step_index: usize,
    /// Handle the step ran on
    pub tx: TxRef,
    /// Expected outcome; `None` if the step was not expected to be observed
    pub expected: Option<StepOutcome>,
    /// Actual outcome; `None` if the step was not observed
    pub actual: Option<StepOutcome>,
    /// Row-level differences when both sides returned rows
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub rows: Vec<RowDiff>,
}

impl Mismatch {
    fn between(expected: Option<&Observation>, actual: Option<&Observation>) -> Option<Self> {
        let anchor = expected.or(actual)?;
        let expected_outcome = expected.map(|o| o.outcome.clone());
        let actual_outcome = actual.map(|o| o.outcome.clone());
        if expected_outcome == actual_outcome {
            return None;
        }
        let rows = match (&expected_outcome, &actual_outcome) {
            (Some(StepOutcome::Rows(e)), Some(StepOutcome::Rows(a))) => e.diff(a),
            _ => Vec::new(),
        };
        Some(Mismatch {
            step_index: anchor.step_index,
            tx: anchor.tx,
            expected: expected_outcome,
            actual: actual_outcome,
            rows,
        })
    }
}

impl fmt::Display for Mismatch {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "step {} ({}): ", self.step_index, self.tx)?;
        match (&self.expected, &self.actual) {
            (Some(e), Some(a)) => write!(f, "expected {}, got {}", e, a)?,
            (Some(e), None) => write!(f, "expected {}, not observed", e)?,
            (None, Some(a)) => write!(f, "unexpected {}", a)?,
            (None, None) => write!(f, "no outcome")?,
        }
        for diff in &self.rows {
            write!(f, "; {}", diff)?;
        }
        Ok(())
    }
}
