//! Isolation levels and the anomalies they bound
//!
//! The four levels are the ANSI SQL levels. The four anomalies are the ANSI
//! phenomena P0 (dirty write), P1 (dirty read), P2 (non-repeatable read) and
//! P3 (phantom read). Which anomaly a store actually exhibits at a given level
//! is engine-specific and is described elsewhere by engine profiles; this
//! module only names things.

use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

/// Transaction isolation level requested when a transaction is opened.
///
/// Ordered from weakest to strongest, so `ReadUncommitted < Serializable`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum IsolationLevel {
    /// May observe uncommitted writes of other transactions
    ReadUncommitted,
    /// Observes only committed data, re-evaluated per statement
    ReadCommitted,
    /// Rows once read keep their values for the rest of the transaction
    RepeatableRead,
    /// Equivalent to some serial execution
    Serializable,
}

impl IsolationLevel {
    /// Every level, weakest first.
    pub const ALL: [IsolationLevel; 4] = [
        IsolationLevel::ReadUncommitted,
        IsolationLevel::ReadCommitted,
        IsolationLevel::RepeatableRead,
        IsolationLevel::Serializable,
    ];

    /// SQL keyword form, as used in `SET TRANSACTION ISOLATION LEVEL ...`.
    pub fn as_sql(&self) -> &'static str {
        match self {
            IsolationLevel::ReadUncommitted => "READ UNCOMMITTED",
            IsolationLevel::ReadCommitted => "READ COMMITTED",
            IsolationLevel::RepeatableRead => "REPEATABLE READ",
            IsolationLevel::Serializable => "SERIALIZABLE",
        }
    }

    /// Stable snake_case name (matches the serde representation).
    pub fn name(&self) -> &'static str {
        match self {
            IsolationLevel::ReadUncommitted => "read_uncommitted",
            IsolationLevel::ReadCommitted => "read_committed",
            IsolationLevel::RepeatableRead => "repeatable_read",
            IsolationLevel::Serializable => "serializable",
        }
    }

    /// Dense index, weakest = 0. Used for profile tables.
    pub fn index(&self) -> usize {
        match self {
            IsolationLevel::ReadUncommitted => 0,
            IsolationLevel::ReadCommitted => 1,
            IsolationLevel::RepeatableRead => 2,
            IsolationLevel::Serializable => 3,
        }
    }
}

impl fmt::Display for IsolationLevel {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

impl FromStr for IsolationLevel {
    type Err = String;

    /// Accepts the snake_case names and the SQL spellings, case-insensitively.
    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let normalized = s.trim().to_ascii_lowercase().replace([' ', '-'], "_");
        match normalized.as_str() {
            "read_uncommitted" => Ok(IsolationLevel::ReadUncommitted),
            "read_committed" => Ok(IsolationLevel::ReadCommitted),
            "repeatable_read" => Ok(IsolationLevel::RepeatableRead),
            "serializable" => Ok(IsolationLevel::Serializable),
            _ => Err(format!("unknown isolation level '{}'", s)),
        }
    }
}

/// A read or write phenomenon that isolation levels forbid or permit.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Anomaly {
    /// P1: observing another transaction's uncommitted write
    DirtyRead,
    /// P2: the same row read twice returns different values
    NonRepeatableRead,
    /// P3: the same range query returns a different row set
    PhantomRead,
    /// P0: overwriting another transaction's uncommitted write
    DirtyWrite,
}

impl Anomaly {
    /// Every anomaly, in catalog order.
    pub const ALL: [Anomaly; 4] = [
        Anomaly::DirtyRead,
        Anomaly::NonRepeatableRead,
        Anomaly::PhantomRead,
        Anomaly::DirtyWrite,
    ];

    /// Stable snake_case name.
    pub fn name(&self) -> &'static str {
        match self {
            Anomaly::DirtyRead => "dirty_read",
            Anomaly::NonRepeatableRead => "non_repeatable_read",
            Anomaly::PhantomRead => "phantom_read",
            Anomaly::DirtyWrite => "dirty_write",
        }
    }

    /// Dense index for profile tables.
    pub fn index(&self) -> usize {
        match self {
            Anomaly::DirtyRead => 0,
            Anomaly::NonRepeatableRead => 1,
            Anomaly::PhantomRead => 2,
            Anomaly::DirtyWrite => 3,
        }
    }
}

impl fmt::Display for Anomaly {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}
