//! The isolation harness
//!
//! [`IsolationHarness`] drives a [`Scenario`] against a [`Store`]:
//!
//! 1. `setup` resets the scenario's fixture through a dedicated connection.
//! 2. `run` opens tx1 then tx2, begins them in the same order at the
//!    requested level, executes every step in declared order from the
//!    calling thread, and records what each observed step produced.
//! 3. Both handles are torn down (rolled back if still open, then closed)
//!    before `run` returns, whether it succeeded or not.
//!
//! Exactly one request is in flight at any time, so a run is fully
//! determined by the scenario and the store.

use crate::catalog;
use crate::config::HarnessConfig;
use crate::handle::TransactionHandle;
use crate::profile::EngineProfile;
use crate::report::{ProfileReport, ScenarioFailure, ScenarioReport};
use chrono::Utc;
use isocheck_core::{
    Action, Anomaly, Fixture, HarnessError, HarnessResult, IsolationLevel, Observation,
    ObservedTrace, Scenario, Step, StepError, StepErrorKind, StepOutcome, TxRef,
};
use isocheck_store::{Connection, Store};
use std::time::{Duration, Instant};
use tracing::{debug, info, warn};

/// Runs scenarios against one store.
pub struct IsolationHarness<S: Store> {
    store: S,
    config: HarnessConfig,
}

impl<S: Store> IsolationHarness<S> {
    /// Harness over `store` with default settings.
    pub fn new(store: S) -> Self {
        Self::with_config(store, HarnessConfig::default())
    }

    /// Harness over `store` with explicit settings.
    pub fn with_config(store: S, config: HarnessConfig) -> Self {
        IsolationHarness { store, config }
    }

    /// The store under test.
    pub fn store(&self) -> &S {
        &self.store
    }

    /// Harness settings.
    pub fn config(&self) -> &HarnessConfig {
        &self.config
    }

    /// Drop, recreate and seed the fixture table.
    ///
    /// Statements run in autocommit mode on a connection that is closed
    /// before returning. Repeated calls leave the same state behind.
    ///
    /// # Errors
    ///
    /// Returns [`HarnessError::Connection`] if no connection can be opened,
    /// and [`HarnessError::Fixture`] if the table name is not a plain
    /// identifier or any reset statement fails.
    pub fn setup(&self, fixture: &Fixture) -> HarnessResult<()> {
        let fixture_error = |message: String, source| HarnessError::Fixture {
            table: fixture.table.clone(),
            message,
            source,
        };
        fixture.validate().map_err(|m| fixture_error(m, None))?;

        let mut conn = self.store.connect().map_err(|e| HarnessError::Connection {
            message: format!("fixture connection: {}", e.message),
            source: Some(e),
        })?;
        for (sql, params) in fixture.reset_statements() {
            conn.execute(&sql, &params)
                .map_err(|e| fixture_error(format!("'{}' failed: {}", sql, e.message), Some(e)))?;
        }
        info!(
            target: "isocheck::fixture",
            table = %fixture.table,
            rows = fixture.seed.len(),
            "Fixture reset"
        );
        Ok(())
    }

    /// Execute `scenario` at `level` and report what was observed.
    ///
    /// Observations are recorded but not judged: a report with
    /// `outcome_mismatches` is still `Ok`. Use [`check`](Self::check) to turn
    /// mismatches into an error.
    ///
    /// # Errors
    ///
    /// - [`HarnessError::InvalidScenario`] if the scenario fails validation
    /// - [`HarnessError::Connection`] if either handle cannot be opened or begun
    /// - [`HarnessError::Step`] if a step fails in a way the scenario did not
    ///   declare
    pub fn run(&self, scenario: &Scenario, level: IsolationLevel) -> HarnessResult<ScenarioReport> {
        scenario.validate()?;

        let started_at = Utc::now();
        let start = Instant::now();
        info!(
            target: "isocheck::harness",
            scenario = %scenario.name,
            level = %level,
            engine = self.store.engine(),
            "Scenario started"
        );

        let mut handles = Vec::with_capacity(TxRef::ALL.len());
        let driven = self
            .open_handles(level, &mut handles)
            .and_then(|()| self.drive(scenario, &mut handles));
        let unreleased_handles = self.teardown(&mut handles);

        let (trace, expected_failures) = match driven {
            Ok(result) => result,
            Err(e) => {
                warn!(target: "isocheck::harness", scenario = %scenario.name, error = %e, "Scenario aborted");
                return Err(e);
            }
        };

        let outcome_mismatches = trace.diff(&scenario.expected_trace());
        let elapsed_ms = start.elapsed().as_millis() as u64;
        info!(
            target: "isocheck::harness",
            scenario = %scenario.name,
            level = %level,
            observations = trace.len(),
            mismatches = outcome_mismatches.len(),
            elapsed_ms,
            "Scenario finished"
        );

        Ok(ScenarioReport {
            scenario: scenario.name.clone(),
            engine: self.store.engine().to_string(),
            level,
            started_at,
            elapsed_ms,
            trace,
            outcome_mismatches,
            expected_failures,
            unreleased_handles,
        })
    }

    /// Reset the fixture, run the scenario, and require every observation
    /// to match.
    ///
    /// # Errors
    ///
    /// Everything [`setup`](Self::setup) and [`run`](Self::run) return, plus
    /// [`HarnessError::AssertionMismatch`] carrying every mismatch of the run.
    pub fn check(&self, scenario: &Scenario, level: IsolationLevel) -> HarnessResult<ScenarioReport> {
        self.setup(&scenario.fixture)?;
        let report = self.run(scenario, level)?;
        if !report.outcome_mismatches.is_empty() {
            for mismatch in &report.outcome_mismatches {
                warn!(target: "isocheck::harness", scenario = %scenario.name, "{}", mismatch);
            }
            return Err(HarnessError::AssertionMismatch {
                scenario: scenario.name.clone(),
                mismatches: report.outcome_mismatches,
            });
        }
        Ok(report)
    }

    /// Check the catalog scenario for `anomaly` at `level` under `profile`.
    pub fn check_anomaly(
        &self,
        anomaly: Anomaly,
        profile: &EngineProfile,
        level: IsolationLevel,
    ) -> HarnessResult<ScenarioReport> {
        self.check(&catalog::scenario_for(anomaly, profile, level), level)
    }

    /// Check every catalog scenario at every level under `profile`.
    ///
    /// Every scenario runs even after one fails; failures are collected in
    /// the returned [`ProfileReport`] alongside the passing reports.
    pub fn check_profile(&self, profile: &EngineProfile) -> ProfileReport {
        let mut sweep = ProfileReport {
            profile: profile.name().to_string(),
            reports: Vec::with_capacity(IsolationLevel::ALL.len() * Anomaly::ALL.len()),
            failures: Vec::new(),
        };
        for level in IsolationLevel::ALL {
            for scenario in catalog::all(profile, level) {
                match self.check(&scenario, level) {
                    Ok(report) => sweep.reports.push(report),
                    Err(error) => {
                        warn!(
                            target: "isocheck::harness",
                            scenario = %scenario.name,
                            level = %level,
                            error = %error,
                            "Scenario failed"
                        );
                        sweep.failures.push(ScenarioFailure {
                            scenario: scenario.name,
                            level,
                            error,
                        });
                    }
                }
            }
        }
        info!(
            target: "isocheck::harness",
            profile = %sweep.profile,
            passed = sweep.reports.len(),
            failed = sweep.failures.len(),
            "Profile checked"
        );
        sweep
    }

    // ========================================================================
    // Internals
    // ========================================================================

    fn open_handles(
        &self,
        level: IsolationLevel,
        handles: &mut Vec<TransactionHandle>,
    ) -> HarnessResult<()> {
        for tx in TxRef::ALL {
            handles.push(TransactionHandle::connect(&self.store, tx)?);
        }
        let timeout = self.config.step_timeout();
        for handle in handles.iter_mut() {
            let tx = handle.tx();
            handle.begin(level, timeout).map_err(|kind| {
                let source = match &kind {
                    StepErrorKind::StoreRejected(e) => Some(e.clone()),
                    _ => None,
                };
                HarnessError::Connection {
                    message: format!("{}: begin at {} failed: {}", tx, level, kind),
                    source,
                }
            })?;
        }
        Ok(())
    }

    fn drive(
        &self,
        scenario: &Scenario,
        handles: &mut [TransactionHandle],
    ) -> HarnessResult<(ObservedTrace, usize)> {
        let mut trace = ObservedTrace::new();
        let mut expected_failures = 0;

        for (index, step) in scenario.steps.iter().enumerate() {
            let timeout = step.timeout().unwrap_or_else(|| self.config.step_timeout());
            let handle = &mut handles[step.tx.index()];
            debug!(
                target: "isocheck::harness",
                step = index,
                tx = %step.tx,
                kind = step.kind(),
                "Executing step"
            );

            let outcome = match (execute_step(handle, step, timeout), step.expect_failure) {
                (Ok(outcome), None) => outcome,
                (Ok(outcome), Some(class)) => {
                    warn!(
                        target: "isocheck::harness",
                        step = index,
                        tx = %step.tx,
                        expected = %class,
                        "Declared failure did not occur"
                    );
                    outcome
                }
                (Err(kind), Some(class)) if class.matches(&kind) => {
                    debug!(target: "isocheck::harness", step = index, tx = %step.tx, error = %kind, "Expected failure");
                    expected_failures += 1;
                    StepOutcome::Failed(class)
                }
                (Err(kind), _) => {
                    return Err(StepError {
                        step_index: index,
                        tx: step.tx,
                        statement: step.sql().map(String::from),
                        kind,
                    }
                    .into());
                }
            };

            if Scenario::is_observed(step) {
                trace.push(Observation::new(index, step.tx, outcome));
            }
        }
        Ok((trace, expected_failures))
    }

    /// Release every handle; returns how many could not be released in time.
    fn teardown(&self, handles: &mut Vec<TransactionHandle>) -> usize {
        let grace = self.config.teardown_timeout();
        let unreleased = handles
            .drain(..)
            .map(|mut handle| handle.release(grace))
            .filter(|released| !released)
            .count();
        let still_open = self.store.open_connections();
        if unreleased > 0 || still_open > 0 {
            warn!(
                target: "isocheck::harness",
                unreleased,
                still_open,
                "Teardown left connections open"
            );
        }
        unreleased
    }
}

fn execute_step(
    handle: &mut TransactionHandle,
    step: &Step,
    timeout: Duration,
) -> Result<StepOutcome, StepErrorKind> {
    match &step.action {
        Action::Query { sql, params, .. } => {
            let rows = handle.execute(sql, params, timeout)?;
            rows.to_snapshot()
                .map(StepOutcome::Rows)
                .map_err(StepErrorKind::Unexpected)
        }
        Action::Exec { sql, params } => {
            handle.execute(sql, params, timeout)?;
            Ok(StepOutcome::Completed)
        }
        Action::Commit => handle.commit(timeout).map(|()| StepOutcome::Completed),
        Action::Rollback => handle.rollback(timeout).map(|()| StepOutcome::Completed),
    }
}

#[cfg(feature = "sqlite")]
impl IsolationHarness<isocheck_store::SqliteStore> {
    /// Open the SQLite store described by `config.sqlite` and wrap it.
    ///
    /// # Errors
    ///
    /// Returns [`HarnessError::Config`] for invalid settings and
    /// [`HarnessError::Connection`] if the database cannot be opened.
    pub fn sqlite(config: HarnessConfig) -> HarnessResult<Self> {
        config.validate()?;
        let store =
            isocheck_store::SqliteStore::open(&config.sqlite).map_err(|e| HarnessError::Connection {
                message: e.message.clone(),
                source: Some(e),
            })?;
        Ok(Self::with_config(store, config))
    }
}

impl<S: Store + std::fmt::Debug> std::fmt::Debug for IsolationHarness<S> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("IsolationHarness")
            .field("store", &self.store)
            .field("config", &self.config)
            .finish()
    }
}
