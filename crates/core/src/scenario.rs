//! Scenarios: scripted interleavings of two transactions
//!
//! A [`Scenario`] is an ordered list of [`Step`]s, each addressed to one of
//! exactly two transaction handles ([`TxRef::Tx1`], [`TxRef::Tx2`]). The step
//! order is the interleaving under test; the harness executes it verbatim.
//!
//! ## Scenario file format (JSON)
//!
//! ```json
//! {
//!   "name": "dirty_read",
//!   "fixture": { "table": "users", "seed": [{ "id": 1, "name": "Alice", "score": 100 }] },
//!   "steps": [
//!     { "tx": "tx1", "kind": "query", "sql": "SELECT id, name, score FROM users ORDER BY id",
//!       "expect": [{ "id": 1, "name": "Alice", "score": 100 }] },
//!     { "tx": "tx2", "kind": "exec", "sql": "UPDATE users SET name = ? WHERE id = ?",
//!       "params": ["Alien", 1], "expect_failure": "locked", "timeout_ms": 500 },
//!     { "tx": "tx1", "kind": "commit" }
//!   ]
//! }
//! ```

use crate::error::{HarnessError, HarnessResult, StepErrorKind, StoreErrorKind};
use crate::fixture::Fixture;
use crate::trace::{Observation, ObservedTrace, StepOutcome};
use crate::value::{Snapshot, SqlValue};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::time::Duration;

// ============================================================================
// TxRef
// ============================================================================

/// Reference to one of the two transaction handles of a scenario.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum TxRef {
    /// First transaction (begun first)
    Tx1,
    /// Second transaction
    Tx2,
}

impl TxRef {
    /// Both handles, in begin order.
    pub const ALL: [TxRef; 2] = [TxRef::Tx1, TxRef::Tx2];

    /// Zero-based handle index.
    pub fn index(&self) -> usize {
        match self {
            TxRef::Tx1 => 0,
            TxRef::Tx2 => 1,
        }
    }
}

impl fmt::Display for TxRef {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            TxRef::Tx1 => f.write_str("tx1"),
            TxRef::Tx2 => f.write_str("tx2"),
        }
    }
}

// ============================================================================
// FailureClass
// ============================================================================

/// A failure a scenario declares as the expected outcome of a step.
///
/// Declared failures are how engine-specific behavior such as a
/// serialization conflict under `Serializable` is expressed as a passing
/// outcome rather than a harness error.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum FailureClass {
    /// Store refused the step with a serialization conflict
    Conflict,
    /// Store refused the step because of a lock held elsewhere
    Locked,
    /// Store refused the step for any reason
    Rejected,
    /// Step did not finish before its deadline
    Timeout,
}

impl FailureClass {
    /// Whether a concrete step failure satisfies this declaration.
    pub fn matches(&self, kind: &StepErrorKind) -> bool {
        match (self, kind) {
            (FailureClass::Timeout, StepErrorKind::Timeout { .. }) => true,
            (FailureClass::Rejected, StepErrorKind::StoreRejected(_)) => true,
            (FailureClass::Conflict, StepErrorKind::StoreRejected(e)) => {
                e.kind == StoreErrorKind::Conflict
            }
            (FailureClass::Locked, StepErrorKind::StoreRejected(e)) => {
                e.kind == StoreErrorKind::Locked
            }
            _ => false,
        }
    }
}

impl fmt::Display for FailureClass {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            FailureClass::Conflict => "conflict",
            FailureClass::Locked => "locked",
            FailureClass::Rejected => "rejected",
            FailureClass::Timeout => "timeout",
        };
        f.write_str(name)
    }
}

// ============================================================================
// Step
// ============================================================================

/// What a step does on its handle.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum Action {
    /// Run a query and compare its rows against `expect`
    Query {
        /// SQL text; must order its rows explicitly
        sql: String,
        /// Bound parameters
        #[serde(default, skip_serializing_if = "Vec::is_empty")]
        params: Vec<SqlValue>,
        /// Rows the query is expected to return, in order
        #[serde(default)]
        expect: Snapshot,
    },
    /// Run a statement for its side effects
    Exec {
        /// SQL text
        sql: String,
        /// Bound parameters
        #[serde(default, skip_serializing_if = "Vec::is_empty")]
        params: Vec<SqlValue>,
    },
    /// Commit the handle's transaction
    Commit,
    /// Roll back the handle's transaction
    Rollback,
}

/// One entry of a scenario.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Step {
    /// Handle the step runs on
    pub tx: TxRef,
    /// Operation
    #[serde(flatten)]
    pub action: Action,
    /// Failure the step is expected to end with, if any
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub expect_failure: Option<FailureClass>,
    /// Deadline in milliseconds; the harness default applies when absent
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub timeout_ms: Option<u64>,
}

impl Step {
    /// Create a step with no expected failure and the default deadline.
    pub fn new(tx: TxRef, action: Action) -> Self {
        Step {
            tx,
            action,
            expect_failure: None,
            timeout_ms: None,
        }
    }

    /// Step deadline, if one was declared.
    pub fn timeout(&self) -> Option<Duration> {
        self.timeout_ms.map(Duration::from_millis)
    }

    /// SQL text for query and exec steps.
    pub fn sql(&self) -> Option<&str> {
        match &self.action {
            Action::Query { sql, .. } | Action::Exec { sql, .. } => Some(sql),
            Action::Commit | Action::Rollback => None,
        }
    }

    /// Short kind label used in logs.
    pub fn kind(&self) -> &'static str {
        match self.action {
            Action::Query { .. } => "query",
            Action::Exec { .. } => "exec",
            Action::Commit => "commit",
            Action::Rollback => "rollback",
        }
    }

    /// Whether the handle may not be used after this step.
    fn closes_handle(&self) -> Option<&'static str> {
        if self.expect_failure == Some(FailureClass::Timeout) {
            return Some("abandoned after a timeout");
        }
        match self.action {
            Action::Commit => Some("committed"),
            Action::Rollback => Some("rolled back"),
            _ => None,
        }
    }
}

// ============================================================================
// Scenario
// ============================================================================

/// A named fixture plus the scripted interleaving run against it.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Scenario {
    /// Scenario name, used in logs and reports
    pub name: String,
    /// Fixture reset before the scenario is checked
    #[serde(default)]
    pub fixture: Fixture,
    /// Steps in execution order
    pub steps: Vec<Step>,
}

impl Scenario {
    /// Create an empty scenario over `fixture`.
    pub fn new(name: impl Into<String>, fixture: Fixture) -> Self {
        Scenario {
            name: name.into(),
            fixture,
            steps: Vec::new(),
        }
    }

    /// Append a step.
    pub fn step(mut self, step: Step) -> Self {
        self.steps.push(step);
        self
    }

    /// Append a query step expecting `expect`.
    pub fn query(self, tx: TxRef, sql: impl Into<String>, expect: impl Into<Snapshot>) -> Self {
        self.query_with(tx, sql, Vec::new(), expect)
    }

    /// Append a parameterised query step expecting `expect`.
    pub fn query_with(
        self,
        tx: TxRef,
        sql: impl Into<String>,
        params: Vec<SqlValue>,
        expect: impl Into<Snapshot>,
    ) -> Self {
        self.step(Step::new(
            tx,
            Action::Query {
                sql: sql.into(),
                params,
                expect: expect.into(),
            },
        ))
    }

    /// Append an exec step.
    pub fn exec(self, tx: TxRef, sql: impl Into<String>) -> Self {
        self.exec_with(tx, sql, Vec::new())
    }

    /// Append a parameterised exec step.
    pub fn exec_with(self, tx: TxRef, sql: impl Into<String>, params: Vec<SqlValue>) -> Self {
        self.step(Step::new(
            tx,
            Action::Exec {
                sql: sql.into(),
                params,
            },
        ))
    }

    /// Append a commit step.
    pub fn commit(self, tx: TxRef) -> Self {
        self.step(Step::new(tx, Action::Commit))
    }

    /// Append a rollback step.
    pub fn rollback(self, tx: TxRef) -> Self {
        self.step(Step::new(tx, Action::Rollback))
    }

    /// Declare that the most recently added step fails with `class`.
    ///
    /// No effect on a scenario without steps.
    pub fn expect_failure(mut self, class: FailureClass) -> Self {
        if let Some(last) = self.steps.last_mut() {
            last.expect_failure = Some(class);
        }
        self
    }

    /// Give the most recently added step its own deadline.
    ///
    /// No effect on a scenario without steps.
    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        if let Some(last) = self.steps.last_mut() {
            last.timeout_ms = Some(timeout.as_millis() as u64);
        }
        self
    }

    /// Number of query steps (and therefore observations in a full trace).
    pub fn query_count(&self) -> usize {
        self.steps
            .iter()
            .filter(|s| matches!(s.action, Action::Query { .. }))
            .count()
    }

    /// Check the scenario's structural invariants.
    ///
    /// # Errors
    ///
    /// Returns [`HarnessError::InvalidScenario`] if the scenario has no
    /// steps, if a query does not order its rows explicitly, or if a step
    /// uses a handle after that handle was committed, rolled back, or
    /// abandoned after an expected timeout.
    pub fn validate(&self) -> HarnessResult<()> {
        let invalid = |reason: String| HarnessError::InvalidScenario {
            scenario: self.name.clone(),
            reason,
        };

        self.fixture
            .validate()
            .map_err(|e| invalid(format!("fixture: {}", e)))?;

        if self.steps.is_empty() {
            return Err(invalid("scenario has no steps".to_string()));
        }

        let mut closed: [Option<(usize, &'static str)>; 2] = [None, None];
        for (index, step) in self.steps.iter().enumerate() {
            if let Some((at, how)) = closed[step.tx.index()] {
                return Err(invalid(format!(
                    "step {} uses {} after it was {} at step {}",
                    index, step.tx, how, at
                )));
            }
            if let Action::Query { sql, .. } = &step.action {
                if !has_order_by(sql) {
                    return Err(invalid(format!(
                        "query at step {} has no ORDER BY clause",
                        index
                    )));
                }
            }
            if let Some(how) = step.closes_handle() {
                closed[step.tx.index()] = Some((index, how));
            }
        }
        Ok(())
    }

    /// The trace a run is expected to produce.
    ///
    /// Query steps and steps with a declared failure are observed; other
    /// steps only have to succeed.
    pub fn expected_trace(&self) -> ObservedTrace {
        let mut trace = ObservedTrace::new();
        for (index, step) in self.steps.iter().enumerate() {
            let outcome = match (&step.action, step.expect_failure) {
                (_, Some(class)) => StepOutcome::Failed(class),
                (Action::Query { expect, .. }, None) => StepOutcome::Rows(expect.clone()),
                _ => continue,
            };
            trace.push(Observation::new(index, step.tx, outcome));
        }
        trace
    }

    /// Whether a step contributes an observation to the trace.
    pub fn is_observed(step: &Step) -> bool {
        step.expect_failure.is_some() || matches!(step.action, Action::Query { .. })
    }

    /// Parse a scenario from its JSON definition.
    ///
    /// # Errors
    ///
    /// Returns [`HarnessError::InvalidScenario`] if the JSON is malformed.
    pub fn from_json(json: &str) -> HarnessResult<Self> {
        serde_json::from_str(json).map_err(|e| HarnessError::InvalidScenario {
            scenario: "<json>".to_string(),
            reason: e.to_string(),
        })
    }

    /// Serialize the scenario to pretty-printed JSON.
    pub fn to_json(&self) -> HarnessResult<String> {
        serde_json::to_string_pretty(self).map_err(|e| HarnessError::InvalidScenario {
            scenario: self.name.clone(),
            reason: e.to_string(),
        })
    }
}

/// True if `sql` has a top-level `ORDER BY` clause.
///
/// Words are runs of identifier characters, so `users)ORDER BY` counts.
/// An `ORDER BY` inside parentheses or a quoted string does not.
fn has_order_by(sql: &str) -> bool {
    let mut depth = 0usize;
    let mut quote: Option<char> = None;
    let mut word = String::new();
    let mut after_order = false;

    for c in sql.chars().chain(std::iter::once(' ')) {
        if let Some(q) = quote {
            if c == q {
                quote = None;
            }
            continue;
        }
        if c.is_ascii_alphanumeric() || c == '_' {
            word.push(c.to_ascii_uppercase());
            continue;
        }
        if !word.is_empty() {
            if depth == 0 {
                if after_order && word == "BY" {
                    return true;
                }
                after_order = word == "ORDER";
            }
            word.clear();
        }
        match c {
            '(' => depth += 1,
            ')' => depth = depth.saturating_sub(1),
            '\'' | '"' | '`' => quote = Some(c),
            _ => {}
        }
    }
    false
}
