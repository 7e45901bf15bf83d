//! Store collaborator traits
//!
//! A [`Store`] hands out independent [`Connection`]s. The harness drives
//! each connection from its own worker thread, so connections must be
//! `Send`; the store itself is shared and must be `Send + Sync`.
//!
//! Implementations map engine failures onto [`StoreErrorKind`] so that
//! scenarios can declare expected failures without naming engine codes.
//!
//! [`StoreErrorKind`]: isocheck_core::StoreErrorKind

use isocheck_core::{IsolationLevel, RowSet, SqlValue, StoreResult};

/// A SQL store the harness can open connections against.
///
/// Thread safety: `connect` may be called from any thread.
pub trait Store: Send + Sync {
    /// Connection type handed out by this store
    type Connection: Connection;

    /// Engine name used in logs and reports (e.g. "sqlite")
    fn engine(&self) -> &str;

    /// Open a fresh connection.
    ///
    /// # Errors
    ///
    /// Returns a [`StoreErrorKind::Connection`] error if the store cannot be
    /// reached.
    ///
    /// [`StoreErrorKind::Connection`]: isocheck_core::StoreErrorKind::Connection
    fn connect(&self) -> StoreResult<Self::Connection>;

    /// Connections handed out by `connect` that are still alive.
    ///
    /// Connections the store keeps for itself are not counted.
    fn open_connections(&self) -> usize;
}

/// One connection, used by one transaction at a time.
pub trait Connection: Send + 'static {
    /// Open a transaction at `level`.
    ///
    /// # Errors
    ///
    /// Returns an error if the engine refuses the level or the begin.
    fn begin_transaction(&mut self, level: IsolationLevel) -> StoreResult<()>;

    /// Execute one statement inside the open transaction.
    ///
    /// Statements with result columns return their rows; other statements
    /// return the affected row count. Parameters bind to `?` placeholders
    /// in order.
    ///
    /// # Errors
    ///
    /// Returns the classified engine error.
    fn execute(&mut self, sql: &str, params: &[SqlValue]) -> StoreResult<RowSet>;

    /// Commit the open transaction.
    ///
    /// # Errors
    ///
    /// Returns the classified engine error; the transaction may still be open.
    fn commit(&mut self) -> StoreResult<()>;

    /// Roll back the open transaction.
    ///
    /// # Errors
    ///
    /// Returns the classified engine error.
    fn rollback(&mut self) -> StoreResult<()>;

    /// Handle that can cancel a running statement from another thread.
    ///
    /// Stores without cancellation return `None`; a stuck statement then
    /// runs until the engine gives up on its own.
    fn interrupt_handle(&self) -> Option<Box<dyn Interrupt>> {
        None
    }
}

/// Cancels whatever statement a connection is currently running.
pub trait Interrupt: Send + Sync {
    /// Request cancellation. Has no effect if nothing is running.
    fn interrupt(&self);
}
