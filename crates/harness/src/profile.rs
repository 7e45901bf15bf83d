//! Engine profiles
//!
//! Isolation semantics legitimately differ between engines: PostgreSQL
//! never shows dirty reads even at `READ UNCOMMITTED`, InnoDB takes locking
//! reads at `SERIALIZABLE`, and SQLite in WAL mode reads from a snapshot at
//! every level. An [`EngineProfile`] records, for every
//! `(Anomaly, IsolationLevel)` pair, what a given engine does, so that the
//! scenario catalog can build expectations that pass on that engine.
//!
//! An engine that isolates more strongly than the level it was asked for is
//! described by its profile; it is not a failure.

use isocheck_core::{Anomaly, FailureClass, IsolationLevel};
use serde::{Deserialize, Serialize};
use Behavior::{Observed, Prevented, WriterBlocked, WriterRejected};

/// What an engine does when a scenario tries to provoke an anomaly.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Behavior {
    /// The interfering write succeeds and the reader sees its effect
    Observed,
    /// The interfering write succeeds but the reader does not see it
    Prevented,
    /// The interfering write waits on a lock held by the reader
    WriterBlocked,
    /// The interfering write is refused
    WriterRejected(FailureClass),
}

/// Per-engine capability table.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct EngineProfile {
    name: String,
    /// Indexed by `[anomaly.index()][level.index()]`
    table: [[Behavior; 4]; 4],
}

impl EngineProfile {
    /// Profile in which every pair has behavior `fill`.
    pub fn uniform(name: impl Into<String>, fill: Behavior) -> Self {
        EngineProfile {
            name: name.into(),
            table: [[fill; 4]; 4],
        }
    }

    /// The ANSI SQL-92 permissiveness table: each level permits exactly the
    /// phenomena the standard allows at that level.
    pub fn ansi() -> Self {
        EngineProfile {
            name: "ansi".to_string(),
            table: [
                // RU, RC, RR, SER
                [Observed, Prevented, Prevented, Prevented], // dirty read
                [Observed, Observed, Prevented, Prevented],  // non-repeatable read
                [Observed, Observed, Observed, Prevented],   // phantom read
                [WriterBlocked; 4],                          // dirty write
            ],
        }
    }

    /// PostgreSQL: `READ UNCOMMITTED` behaves as `READ COMMITTED`, and
    /// `REPEATABLE READ` is snapshot isolation, which excludes phantoms.
    pub fn postgres() -> Self {
        EngineProfile {
            name: "postgres".to_string(),
            table: [
                [Prevented; 4],
                [Observed, Observed, Prevented, Prevented],
                [Observed, Observed, Prevented, Prevented],
                [WriterBlocked; 4],
            ],
        }
    }

    /// MySQL InnoDB: consistent snapshot reads at `REPEATABLE READ`; plain
    /// reads become shared-locking reads at `SERIALIZABLE`, so writers wait.
    pub fn mysql_innodb() -> Self {
        EngineProfile {
            name: "mysql_innodb".to_string(),
            table: [
                [Observed, Prevented, Prevented, WriterBlocked],
                [Observed, Observed, Prevented, WriterBlocked],
                [Observed, Observed, Prevented, WriterBlocked],
                [WriterBlocked; 4],
            ],
        }
    }

    /// SQLite file database in WAL mode: a reader keeps its first snapshot
    /// at every level, and a second writer is refused while the first holds
    /// the write lock.
    pub fn sqlite_wal() -> Self {
        EngineProfile {
            name: "sqlite_wal".to_string(),
            table: [
                [Prevented; 4],
                [Prevented; 4],
                [Prevented; 4],
                [WriterRejected(FailureClass::Locked); 4],
            ],
        }
    }

    /// SQLite shared-cache database: `read_uncommitted` readers take no
    /// table locks and see uncommitted rows; at other levels the reader's
    /// table lock makes the writer fail with `SQLITE_LOCKED`.
    pub fn sqlite_shared_cache() -> Self {
        let locked = WriterRejected(FailureClass::Locked);
        EngineProfile {
            name: "sqlite_shared_cache".to_string(),
            table: [
                [Observed, locked, locked, locked],
                [Observed, locked, locked, locked],
                [Observed, locked, locked, locked],
                [locked; 4],
            ],
        }
    }

    /// Built-in profile by name.
    pub fn by_name(name: &str) -> Option<Self> {
        match name {
            "ansi" => Some(Self::ansi()),
            "postgres" | "postgresql" => Some(Self::postgres()),
            "mysql" | "mysql_innodb" => Some(Self::mysql_innodb()),
            "sqlite_wal" => Some(Self::sqlite_wal()),
            "sqlite_shared_cache" => Some(Self::sqlite_shared_cache()),
            _ => None,
        }
    }

    /// Profile name.
    pub fn name(&self) -> &str {
        &self.name
    }

    /// What the engine does for `anomaly` at `level`.
    pub fn behavior(&self, anomaly: Anomaly, level: IsolationLevel) -> Behavior {
        self.table[anomaly.index()][level.index()]
    }

    /// Whether the anomaly is observable at `level`.
    pub fn permits(&self, anomaly: Anomaly, level: IsolationLevel) -> bool {
        self.behavior(anomaly, level) == Observed
    }

    /// Copy of this profile with one pair overridden.
    pub fn with_behavior(
        mut self,
        anomaly: Anomaly,
        level: IsolationLevel,
        behavior: Behavior,
    ) -> Self {
        self.table[anomaly.index()][level.index()] = behavior;
        self
    }
}
