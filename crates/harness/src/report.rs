//! Scenario run reports

use chrono::{DateTime, Utc};
use isocheck_core::{HarnessError, HarnessResult, IsolationLevel, Mismatch, ObservedTrace};
use serde::{Deserialize, Serialize};

/// Everything one scenario run observed.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ScenarioReport {
    /// Scenario name
    pub scenario: String,
    /// Store engine the scenario ran against
    pub engine: String,
    /// Isolation level both transactions were opened at
    pub level: IsolationLevel,
    /// When the run started
    pub started_at: DateTime<Utc>,
    /// Wall-clock duration of the run, teardown included
    pub elapsed_ms: u64,
    /// Observations, one per observed step, in execution order
    pub trace: ObservedTrace,
    /// Differences between `trace` and the scenario's expected trace
    pub outcome_mismatches: Vec<Mismatch>,
    /// Steps that failed exactly as declared
    pub expected_failures: usize,
    /// Handles whose connection was still open when teardown gave up
    pub unreleased_handles: usize,
}

impl ScenarioReport {
    /// True if every observation matched and teardown released everything.
    pub fn passed(&self) -> bool {
        self.outcome_mismatches.is_empty() && self.unreleased_handles == 0
    }

    /// Serialize the report to pretty-printed JSON.
    ///
    /// # Errors
    ///
    /// Returns [`HarnessError::Config`] if serialization fails.
    pub fn to_json(&self) -> HarnessResult<String> {
        serde_json::to_string_pretty(self)
            .map_err(|e| HarnessError::Config(format!("Failed to serialize report: {}", e)))
    }
}

/// A scenario of a profile sweep that did not produce a report.
#[derive(Debug)]
pub struct ScenarioFailure {
    /// Scenario name
    pub scenario: String,
    /// Level it was checked at
    pub level: IsolationLevel,
    /// Why it failed
    pub error: HarnessError,
}

/// Every outcome of checking a profile's catalog at every level.
#[derive(Debug)]
pub struct ProfileReport {
    /// Profile name
    pub profile: String,
    /// Scenarios that matched the profile
    pub reports: Vec<ScenarioReport>,
    /// Scenarios that did not, in run order
    pub failures: Vec<ScenarioFailure>,
}

impl ProfileReport {
    /// True if every scenario matched and released its handles.
    pub fn passed(&self) -> bool {
        self.failures.is_empty() && self.reports.iter().all(ScenarioReport::passed)
    }

    /// Number of scenarios checked.
    pub fn len(&self) -> usize {
        self.reports.len() + self.failures.len()
    }

    /// True if nothing was checked.
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}
