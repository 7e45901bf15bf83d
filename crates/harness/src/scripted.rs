//! Scripted store for unit tests
//!
//! Answers every `SELECT` with the next canned snapshot and every other
//! statement with one affected row. There is no storage and no isolation:
//! what a query returns is exactly what the test queued, so harness
//! behavior can be checked through the bare `Store`/`Connection` seam.

use isocheck_core::{
    IsolationLevel, RowSet, Snapshot, SqlValue, StoreError, StoreErrorKind, StoreResult,
};
use isocheck_store::{Connection, ConnectionGuard, ConnectionTracker, Store};
use parking_lot::Mutex;
use std::collections::VecDeque;
use std::sync::Arc;

/// One call a connection received.
#[derive(Debug, Clone, PartialEq)]
pub enum Call {
    Begin(IsolationLevel),
    Execute(String),
    Commit,
    Rollback,
}

#[derive(Default)]
struct Script {
    responses: VecDeque<RowSet>,
    calls: Vec<(usize, Call)>,
    refuse_rollback: bool,
    next_connection: usize,
}

/// Store whose query results are queued up front.
#[derive(Clone, Default)]
pub struct ScriptedStore {
    script: Arc<Mutex<Script>>,
    tracker: ConnectionTracker,
}

impl ScriptedStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Queue the rows the next `SELECT` returns.
    pub fn respond(self, rows: Snapshot) -> Self {
        let rows = RowSet {
            columns: vec!["id".into(), "name".into(), "score".into()],
            rows: rows.rows().iter().map(|r| r.to_params()).collect(),
            affected: 0,
        };
        self.script.lock().responses.push_back(rows);
        self
    }

    /// Make every `ROLLBACK` fail.
    pub fn refuse_rollback(self) -> Self {
        self.script.lock().refuse_rollback = true;
        self
    }

    /// Every call so far as `(connection number, call)`; connections are
    /// numbered from 0 in `connect` order.
    pub fn calls(&self) -> Vec<(usize, Call)> {
        self.script.lock().calls.clone()
    }

    /// Queued responses not yet consumed.
    pub fn pending_responses(&self) -> usize {
        self.script.lock().responses.len()
    }
}

impl Store for ScriptedStore {
    type Connection = ScriptedConnection;

    fn engine(&self) -> &str {
        "scripted"
    }

    fn connect(&self) -> StoreResult<ScriptedConnection> {
        let mut script = self.script.lock();
        let id = script.next_connection;
        script.next_connection += 1;
        Ok(ScriptedConnection {
            id,
            script: Arc::clone(&self.script),
            _guard: self.tracker.acquire(),
        })
    }

    fn open_connections(&self) -> usize {
        self.tracker.open()
    }
}

pub struct ScriptedConnection {
    id: usize,
    script: Arc<Mutex<Script>>,
    _guard: ConnectionGuard,
}

impl ScriptedConnection {
    fn record(&self, call: Call) {
        self.script.lock().calls.push((self.id, call));
    }
}

impl Connection for ScriptedConnection {
    fn begin_transaction(&mut self, level: IsolationLevel) -> StoreResult<()> {
        self.record(Call::Begin(level));
        Ok(())
    }

    fn execute(&mut self, sql: &str, _params: &[SqlValue]) -> StoreResult<RowSet> {
        self.record(Call::Execute(sql.to_string()));
        if !sql.trim_start().to_ascii_uppercase().starts_with("SELECT") {
            return Ok(RowSet::affected(1));
        }
        self.script
            .lock()
            .responses
            .pop_front()
            .ok_or_else(|| StoreError::new(StoreErrorKind::Other, "no scripted response left"))
    }

    fn commit(&mut self) -> StoreResult<()> {
        self.record(Call::Commit);
        Ok(())
    }

    fn rollback(&mut self) -> StoreResult<()> {
        self.record(Call::Rollback);
        if self.script.lock().refuse_rollback {
            return Err(StoreError::new(StoreErrorKind::Other, "rollback refused"));
        }
        Ok(())
    }
}
