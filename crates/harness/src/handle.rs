//! Transaction handles
//!
//! A [`TransactionHandle`] owns one store connection for the duration of a
//! scenario. The connection lives on a dedicated worker thread
//! (`isocheck-tx1`, `isocheck-tx2`); the harness thread sends it one request
//! at a time and waits for the reply with a deadline. A statement blocked on
//! a lock therefore shows up as a timeout instead of stalling the harness.
//!
//! ## State machine
//!
//! ```text
//! Unopened --begin--> Open --commit--> Committed
//!                       |
//!                       +--rollback / failed commit / timeout--> Aborted
//! ```
//!
//! `Committed` and `Aborted` are terminal.

use isocheck_core::{
    HarnessError, HarnessResult, IsolationLevel, RowSet, SqlValue, StepErrorKind, StoreError,
    StoreResult, TxRef,
};
use isocheck_store::{Connection, Interrupt, Store};
use std::sync::mpsc::{self, Receiver, RecvTimeoutError, Sender};
use std::thread::JoinHandle;
use std::time::{Duration, Instant};
use tracing::{debug, warn};

/// Lifecycle state of a transaction handle.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum HandleState {
    /// Connected, no transaction begun
    Unopened,
    /// Transaction open
    Open,
    /// Transaction committed (terminal)
    Committed,
    /// Transaction rolled back, failed, or abandoned (terminal)
    Aborted {
        /// Why the transaction ended
        reason: String,
    },
}

impl HandleState {
    /// Whether the handle can no longer change state.
    pub fn is_terminal(&self) -> bool {
        matches!(self, HandleState::Committed | HandleState::Aborted { .. })
    }
}

// ============================================================================
// Worker session
// ============================================================================

enum Request {
    Begin(IsolationLevel),
    Execute { sql: String, params: Vec<SqlValue> },
    Commit,
    Rollback,
}

struct Envelope {
    request: Request,
    reply: Sender<StoreResult<RowSet>>,
}

enum CallError {
    Timeout,
    Store(StoreError),
    Disconnected,
}

/// Worker thread that owns a connection.
struct Session {
    requests: Sender<Envelope>,
    done: Receiver<()>,
    interrupt: Option<Box<dyn Interrupt>>,
    thread: JoinHandle<()>,
}

impl Session {
    fn spawn<C: Connection>(conn: C, tx: TxRef) -> std::io::Result<Self> {
        let interrupt = conn.interrupt_handle();
        let (requests, inbox) = mpsc::channel::<Envelope>();
        let (done_tx, done) = mpsc::channel();
        let thread = std::thread::Builder::new()
            .name(format!("isocheck-{}", tx))
            .spawn(move || worker_loop(conn, inbox, done_tx))?;
        Ok(Session {
            requests,
            done,
            interrupt,
            thread,
        })
    }

    fn call(&self, request: Request, timeout: Duration) -> Result<RowSet, CallError> {
        let (reply, response) = mpsc::channel();
        self.requests
            .send(Envelope { request, reply })
            .map_err(|_| CallError::Disconnected)?;
        match response.recv_timeout(timeout) {
            Ok(Ok(rows)) => Ok(rows),
            Ok(Err(e)) => Err(CallError::Store(e)),
            Err(RecvTimeoutError::Timeout) => {
                if let Some(interrupt) = &self.interrupt {
                    interrupt.interrupt();
                }
                Err(CallError::Timeout)
            }
            Err(RecvTimeoutError::Disconnected) => Err(CallError::Disconnected),
        }
    }

    /// Close the request channel and wait up to `wait` for the worker to
    /// drop its connection. Returns false if the worker was left running.
    fn close(self, wait: Duration) -> bool {
        drop(self.requests);
        match self.done.recv_timeout(wait) {
            Ok(()) | Err(RecvTimeoutError::Disconnected) => {
                let _ = self.thread.join();
                true
            }
            Err(RecvTimeoutError::Timeout) => false,
        }
    }
}

fn worker_loop<C: Connection>(mut conn: C, inbox: Receiver<Envelope>, done: Sender<()>) {
    for Envelope { request, reply } in inbox {
        let result = match request {
            Request::Begin(level) => conn.begin_transaction(level).map(|()| RowSet::default()),
            Request::Execute { sql, params } => conn.execute(&sql, &params),
            Request::Commit => conn.commit().map(|()| RowSet::default()),
            Request::Rollback => conn.rollback().map(|()| RowSet::default()),
        };
        // Caller may have given up waiting
        let _ = reply.send(result);
    }
    drop(conn);
    let _ = done.send(());
}

// ============================================================================
// TransactionHandle
// ============================================================================

/// One of the two transactions of a scenario run.
pub struct TransactionHandle {
    tx: TxRef,
    state: HandleState,
    /// A transaction may still be open on the connection
    in_transaction: bool,
    session: Option<Session>,
}

impl TransactionHandle {
    /// Open a connection for `tx` and start its worker thread.
    ///
    /// # Errors
    ///
    /// Returns [`HarnessError::Connection`] if the store refuses the
    /// connection or the worker thread cannot be started.
    pub fn connect<S: Store>(store: &S, tx: TxRef) -> HarnessResult<Self> {
        let conn = store.connect().map_err(|e| HarnessError::Connection {
            message: format!("{}: {}", tx, e.message),
            source: Some(e),
        })?;
        let session = Session::spawn(conn, tx).map_err(|e| HarnessError::Connection {
            message: format!("{}: failed to start worker thread: {}", tx, e),
            source: None,
        })?;
        debug!(target: "isocheck::txn", tx = %tx, engine = store.engine(), "Connection opened");
        Ok(TransactionHandle {
            tx,
            state: HandleState::Unopened,
            in_transaction: false,
            session: Some(session),
        })
    }

    /// Which transaction this handle is.
    pub fn tx(&self) -> TxRef {
        self.tx
    }

    /// Current state.
    pub fn state(&self) -> &HandleState {
        &self.state
    }

    /// Begin the transaction at `level`.
    ///
    /// # Errors
    ///
    /// Fails if the handle is not `Unopened`, if the store refuses, or if
    /// `timeout` elapses.
    pub fn begin(&mut self, level: IsolationLevel, timeout: Duration) -> Result<(), StepErrorKind> {
        if self.state != HandleState::Unopened {
            return Err(self.not_allowed("begin"));
        }
        self.in_transaction = true;
        self.call(Request::Begin(level), timeout)?;
        self.state = HandleState::Open;
        debug!(target: "isocheck::txn", tx = %self.tx, level = %level, "Transaction started");
        Ok(())
    }

    /// Execute one statement in the open transaction.
    ///
    /// # Errors
    ///
    /// Fails if the handle is not `Open`, if the store refuses the
    /// statement, or if `timeout` elapses.
    pub fn execute(
        &mut self,
        sql: &str,
        params: &[SqlValue],
        timeout: Duration,
    ) -> Result<RowSet, StepErrorKind> {
        if self.state != HandleState::Open {
            return Err(self.not_allowed("execute"));
        }
        self.call(
            Request::Execute {
                sql: sql.to_string(),
                params: params.to_vec(),
            },
            timeout,
        )
    }

    /// Commit the transaction.
    ///
    /// A refused commit leaves the handle `Aborted` and is followed by an
    /// immediate rollback of whatever the store kept open.
    ///
    /// # Errors
    ///
    /// Fails if the handle is not `Open`, if the store refuses the commit,
    /// or if `timeout` elapses.
    pub fn commit(&mut self, timeout: Duration) -> Result<(), StepErrorKind> {
        if self.state != HandleState::Open {
            return Err(self.not_allowed("commit"));
        }
        match self.call(Request::Commit, timeout) {
            Ok(_) => {
                self.in_transaction = false;
                self.state = HandleState::Committed;
                debug!(target: "isocheck::txn", tx = %self.tx, "Transaction committed");
                Ok(())
            }
            Err(e) => {
                if !self.state.is_terminal() {
                    self.state = HandleState::Aborted {
                        reason: format!("commit failed: {}", e),
                    };
                    // Best effort; teardown retries if this fails too
                    if let Some(session) = &self.session {
                        if session.call(Request::Rollback, timeout).is_ok() {
                            self.in_transaction = false;
                        }
                    }
                }
                Err(e)
            }
        }
    }

    /// Roll the transaction back.
    ///
    /// The handle is `Aborted` afterwards whether or not the store accepted
    /// the rollback.
    ///
    /// # Errors
    ///
    /// Fails if the handle is not `Open`, if the store refuses, or if
    /// `timeout` elapses.
    pub fn rollback(&mut self, timeout: Duration) -> Result<(), StepErrorKind> {
        if self.state != HandleState::Open {
            return Err(self.not_allowed("rollback"));
        }
        match self.call(Request::Rollback, timeout) {
            Ok(_) => {
                self.in_transaction = false;
                self.state = HandleState::Aborted {
                    reason: "rolled back".to_string(),
                };
                debug!(target: "isocheck::txn", tx = %self.tx, "Transaction rolled back");
                Ok(())
            }
            Err(e) => {
                // in_transaction stays set so release retries the rollback
                if !self.state.is_terminal() {
                    self.state = HandleState::Aborted {
                        reason: format!("rollback failed: {}", e),
                    };
                }
                Err(e)
            }
        }
    }

    /// Roll back anything still open and close the connection.
    ///
    /// Waits at most `grace` in total. Returns `false` if the worker did not
    /// finish in time; its thread is then detached and closes the connection
    /// whenever the stuck statement returns.
    pub fn release(&mut self, grace: Duration) -> bool {
        let Some(session) = self.session.take() else {
            return true;
        };
        let deadline = Instant::now() + grace;

        if self.in_transaction {
            match session.call(Request::Rollback, grace) {
                Ok(_) => {}
                Err(CallError::Store(e)) => {
                    debug!(target: "isocheck::txn", tx = %self.tx, error = %e, "Teardown rollback refused")
                }
                Err(CallError::Timeout) => {
                    warn!(target: "isocheck::txn", tx = %self.tx, "Teardown rollback timed out")
                }
                Err(CallError::Disconnected) => {}
            }
            self.in_transaction = false;
        }
        if !self.state.is_terminal() {
            self.state = HandleState::Aborted {
                reason: "released".to_string(),
            };
        }

        let released = session.close(deadline.saturating_duration_since(Instant::now()));
        if released {
            debug!(target: "isocheck::txn", tx = %self.tx, "Connection closed");
        } else {
            warn!(target: "isocheck::txn", tx = %self.tx, grace_ms = grace.as_millis() as u64, "Connection not released within grace period");
        }
        released
    }

    fn call(&mut self, request: Request, timeout: Duration) -> Result<RowSet, StepErrorKind> {
        let Some(session) = &self.session else {
            return Err(StepErrorKind::Unexpected(format!("{} is released", self.tx)));
        };
        match session.call(request, timeout) {
            Ok(rows) => Ok(rows),
            Err(CallError::Store(e)) => Err(StepErrorKind::StoreRejected(e)),
            Err(CallError::Timeout) => {
                warn!(target: "isocheck::txn", tx = %self.tx, timeout_ms = timeout.as_millis() as u64, "Step timed out; interrupting");
                self.state = HandleState::Aborted {
                    reason: format!("timed out after {:?}", timeout),
                };
                Err(StepErrorKind::Timeout { after: timeout })
            }
            Err(CallError::Disconnected) => {
                self.state = HandleState::Aborted {
                    reason: "worker thread exited".to_string(),
                };
                Err(StepErrorKind::Unexpected(format!(
                    "{} worker thread exited",
                    self.tx
                )))
            }
        }
    }

    fn not_allowed(&self, operation: &str) -> StepErrorKind {
        StepErrorKind::Unexpected(format!(
            "cannot {} {} in state {:?}",
            operation, self.tx, self.state
        ))
    }
}

impl Drop for TransactionHandle {
    fn drop(&mut self) {
        // Closing the channel lets the worker drop its connection, which
        // rolls back anything still open. Never blocks.
        drop(self.session.take());
    }
}

impl std::fmt::Debug for TransactionHandle {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("TransactionHandle")
            .field("tx", &self.tx)
            .field("state", &self.state)
            .field("in_transaction", &self.in_transaction)
            .finish()
    }
}


#[cfg(test)]
mod scripted_tests {
    use super::*;
    use crate::scripted::{Call, ScriptedStore};

    const T: Duration = Duration::from_secs(5);

    #[test]
    fn test_refused_rollback_is_terminal() {
        let store = ScriptedStore::new().refuse_rollback();
        let mut handle = TransactionHandle::connect(&store, TxRef::Tx1).unwrap();
        handle.begin(IsolationLevel::ReadCommitted, T).unwrap();

        let err = handle.rollback(T).unwrap_err();
        assert!(err.to_string().contains("rollback refused"));
        match handle.state() {
            HandleState::Aborted { reason } => assert!(reason.starts_with("rollback failed")),
            other => panic!("expected Aborted, got {:?}", other),
        }

        let err = handle
            .execute("UPDATE users SET score = 0 WHERE id = 1", &[], T)
            .unwrap_err();
        assert!(matches!(err, StepErrorKind::Unexpected(_)));
        assert!(handle.rollback(T).is_err());

        // Teardown retries the rollback and still closes the connection
        assert!(handle.release(T));
        assert_eq!(store.open_connections(), 0);
        let rollbacks = store
            .calls()
            .into_iter()
            .filter(|(_, call)| *call == Call::Rollback)
            .count();
        assert_eq!(rollbacks, 2);
    }

    #[test]
    fn test_release_after_rollback_sends_nothing_more() {
        let store = ScriptedStore::new();
        let mut handle = TransactionHandle::connect(&store, TxRef::Tx2).unwrap();
        handle.begin(IsolationLevel::Serializable, T).unwrap();
        handle.rollback(T).unwrap();
        assert!(handle.release(T));
        assert_eq!(
            store.calls(),
            vec![
                (0, Call::Begin(IsolationLevel::Serializable)),
                (0, Call::Rollback)
            ]
        );
    }
}
