//! SQLite store backed by `rusqlite` (bundled C library)
//!
//! Two layouts are supported:
//!
//! - **Memory**: a named in-memory database opened in shared-cache mode
//!   (`file:isocheck-<uuid>?mode=memory&cache=shared`). Connections share
//!   one page cache and isolate each other with table-level locks, which is
//!   the only SQLite layout where `PRAGMA read_uncommitted` has an effect.
//!   A keeper connection owned by the store keeps the database alive while
//!   no transaction connection is open.
//! - **File**: a database file in WAL or rollback-journal mode. In WAL mode
//!   a reader keeps the snapshot taken at its first read for the rest of
//!   its transaction.
//!
//! Every level maps to `BEGIN DEFERRED`; only `ReadUncommitted` differs, by
//! turning `read_uncommitted` on for the connection.
//!
//! ## Error classification
//!
//! | SQLite result            | Kind          |
//! |--------------------------|---------------|
//! | `SQLITE_BUSY_SNAPSHOT`   | `Conflict`    |
//! | `SQLITE_BUSY`, `LOCKED`  | `Locked`      |
//! | `SQLITE_CONSTRAINT`      | `Constraint`  |
//! | `SQLITE_INTERRUPT`       | `Interrupted` |
//! | `SQLITE_CANTOPEN`        | `Connection`  |
//! | anything else            | `Other`       |

use crate::config::{SqliteConfig, SqliteMode};
use crate::tracker::{ConnectionGuard, ConnectionTracker};
use crate::traits::{Connection, Interrupt, Store};
use isocheck_core::{IsolationLevel, RowSet, SqlValue, StoreError, StoreErrorKind, StoreResult};
use parking_lot::Mutex;
use rusqlite::types::Value;
use rusqlite::{params_from_iter, ErrorCode, OpenFlags};
use std::time::Duration;
use tracing::{debug, info, warn};

// ============================================================================
// Store
// ============================================================================

/// SQLite [`Store`].
pub struct SqliteStore {
    config: SqliteConfig,
    /// Target passed to `sqlite3_open_v2` (URI in memory mode, path otherwise)
    target: String,
    flags: OpenFlags,
    /// Keeps a memory database alive; unused in file mode
    keeper: Mutex<Option<rusqlite::Connection>>,
    tracker: ConnectionTracker,
}

impl SqliteStore {
    /// Open (or create) the database described by `config`.
    ///
    /// In file mode the journal mode is applied here, once; it persists in
    /// the database file.
    ///
    /// # Errors
    ///
    /// Returns a [`StoreErrorKind::Connection`] error if the settings are
    /// invalid or the database cannot be opened.
    pub fn open(config: &SqliteConfig) -> StoreResult<Self> {
        config.validate().map_err(StoreError::connection)?;

        let (target, flags) = match (config.mode, &config.path) {
            (SqliteMode::File, Some(path)) => (path.to_string_lossy().into_owned(), OpenFlags::default()),
            _ => (
                format!("file:isocheck-{}?mode=memory&cache=shared", uuid::Uuid::new_v4()),
                OpenFlags::default() | OpenFlags::SQLITE_OPEN_URI | OpenFlags::SQLITE_OPEN_SHARED_CACHE,
            ),
        };

        let store = SqliteStore {
            config: config.clone(),
            target,
            flags,
            keeper: Mutex::new(None),
            tracker: ConnectionTracker::new(),
        };

        let first = store.open_raw()?;
        match config.mode {
            SqliteMode::Memory => {
                info!(target: "isocheck::store", database = %store.target, "Opened shared-cache memory database");
                *store.keeper.lock() = Some(first);
            }
            SqliteMode::File => {
                let applied: String = first
                    .query_row(
                        &format!("PRAGMA journal_mode = {}", config.journal_mode.as_pragma()),
                        [],
                        |row| row.get(0),
                    )
                    .map_err(|e| connection_error(&store.target, e))?;
                if !applied.eq_ignore_ascii_case(config.journal_mode.as_pragma()) {
                    warn!(
                        target: "isocheck::store",
                        requested = config.journal_mode.as_pragma(),
                        applied = %applied,
                        "Journal mode not applied"
                    );
                }
                info!(target: "isocheck::store", database = %store.target, journal_mode = %applied, "Opened database file");
            }
        }
        Ok(store)
    }

    /// Shorthand for `open(&SqliteConfig::memory())`.
    pub fn open_memory() -> StoreResult<Self> {
        Self::open(&SqliteConfig::memory())
    }

    /// Settings this store was opened with.
    pub fn config(&self) -> &SqliteConfig {
        &self.config
    }

    fn open_raw(&self) -> StoreResult<rusqlite::Connection> {
        let conn = rusqlite::Connection::open_with_flags(&self.target, self.flags)
            .map_err(|e| connection_error(&self.target, e))?;
        conn.busy_timeout(Duration::from_millis(self.config.busy_timeout_ms))
            .map_err(classify)?;
        Ok(conn)
    }
}

impl Store for SqliteStore {
    type Connection = SqliteConnection;

    fn engine(&self) -> &str {
        "sqlite"
    }

    fn connect(&self) -> StoreResult<SqliteConnection> {
        let conn = self.open_raw()?;
        let guard = self.tracker.acquire();
        debug!(target: "isocheck::store", open = self.tracker.open(), "Connection opened");
        Ok(SqliteConnection {
            conn,
            _guard: guard,
        })
    }

    fn open_connections(&self) -> usize {
        self.tracker.open()
    }
}

impl std::fmt::Debug for SqliteStore {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SqliteStore")
            .field("config", &self.config)
            .field("target", &self.target)
            .field("open_connections", &self.tracker.open())
            .finish()
    }
}

// ============================================================================
// Connection
// ============================================================================

/// One SQLite connection handed out by [`SqliteStore::connect`].
pub struct SqliteConnection {
    conn: rusqlite::Connection,
    _guard: ConnectionGuard,
}

impl Connection for SqliteConnection {
    fn begin_transaction(&mut self, level: IsolationLevel) -> StoreResult<()> {
        let read_uncommitted = u8::from(level == IsolationLevel::ReadUncommitted);
        self.conn
            .execute_batch(&format!("PRAGMA read_uncommitted = {}", read_uncommitted))
            .map_err(classify)?;
        self.conn.execute_batch("BEGIN DEFERRED").map_err(classify)?;
        debug!(target: "isocheck::store", level = %level, "Transaction begun");
        Ok(())
    }

    fn execute(&mut self, sql: &str, params: &[SqlValue]) -> StoreResult<RowSet> {
        let mut stmt = self.conn.prepare(sql).map_err(classify)?;
        let values: Vec<Value> = params.iter().map(to_sqlite_value).collect();
        let column_count = stmt.column_count();

        if column_count == 0 {
            let affected = stmt
                .execute(params_from_iter(values.iter()))
                .map_err(classify)?;
            return Ok(RowSet::affected(affected));
        }

        let columns: Vec<String> = stmt.column_names().into_iter().map(String::from).collect();
        let rows = stmt
            .query_map(params_from_iter(values.iter()), |row| {
                (0..column_count)
                    .map(|i| row.get::<_, Value>(i).map(from_sqlite_value))
                    .collect::<rusqlite::Result<Vec<_>>>()
            })
            .map_err(classify)?
            .collect::<rusqlite::Result<Vec<_>>>()
            .map_err(classify)?;

        Ok(RowSet {
            columns,
            rows,
            affected: 0,
        })
    }

    fn commit(&mut self) -> StoreResult<()> {
        self.conn.execute_batch("COMMIT").map_err(classify)
    }

    fn rollback(&mut self) -> StoreResult<()> {
        self.conn.execute_batch("ROLLBACK").map_err(classify)
    }

    fn interrupt_handle(&self) -> Option<Box<dyn Interrupt>> {
        Some(Box::new(self.conn.get_interrupt_handle()))
    }
}

impl Interrupt for rusqlite::InterruptHandle {
    fn interrupt(&self) {
        rusqlite::InterruptHandle::interrupt(self);
    }
}

// ============================================================================
// Conversions
// ============================================================================

fn to_sqlite_value(v: &SqlValue) -> Value {
    match v {
        SqlValue::Null => Value::Null,
        SqlValue::Integer(i) => Value::Integer(*i),
        SqlValue::Real(r) => Value::Real(*r),
        SqlValue::Text(s) => Value::Text(s.clone()),
    }
}

fn from_sqlite_value(v: Value) -> SqlValue {
    match v {
        Value::Null => SqlValue::Null,
        Value::Integer(i) => SqlValue::Integer(i),
        Value::Real(r) => SqlValue::Real(r),
        Value::Text(s) => SqlValue::Text(s),
        Value::Blob(b) => SqlValue::Text(String::from_utf8_lossy(&b).into_owned()),
    }
}

/// Map a rusqlite error onto the store error taxonomy.
pub fn classify(err: rusqlite::Error) -> StoreError {
    match &err {
        rusqlite::Error::SqliteFailure(ffi_err, message) => {
            let kind = if ffi_err.extended_code == rusqlite::ffi::SQLITE_BUSY_SNAPSHOT {
                StoreErrorKind::Conflict
            } else {
                match ffi_err.code {
                    ErrorCode::DatabaseBusy | ErrorCode::DatabaseLocked => StoreErrorKind::Locked,
                    ErrorCode::ConstraintViolation => StoreErrorKind::Constraint,
                    ErrorCode::OperationInterrupted => StoreErrorKind::Interrupted,
                    ErrorCode::CannotOpen => StoreErrorKind::Connection,
                    _ => StoreErrorKind::Other,
                }
            };
            let message = message.clone().unwrap_or_else(|| ffi_err.to_string());
            StoreError::new(kind, message).with_code(ffi_err.extended_code)
        }
        other => StoreError::new(StoreErrorKind::Other, other.to_string()),
    }
}

fn connection_error(target: &str, err: rusqlite::Error) -> StoreError {
    let classified = classify(err);
    let mut error = StoreError::connection(format!("{}: {}", target, classified.message));
    error.code = classified.code;
    error
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::JournalMode;
    use tempfile::TempDir;

    fn text(s: &str) -> SqlValue {
        SqlValue::Text(s.to_string())
    }

    fn seed(conn: &mut SqliteConnection) {
        conn.execute("CREATE TABLE users (id INT, name VARCHAR(255), score INT)", &[])
            .unwrap();
        conn.execute(
            "INSERT INTO users (id, name, score) VALUES (?, ?, ?)",
            &[SqlValue::Integer(1), text("Alice"), SqlValue::Integer(100)],
        )
        .unwrap();
    }

    fn names(conn: &mut SqliteConnection) -> Vec<SqlValue> {
        conn.execute("SELECT name FROM users ORDER BY id", &[])
            .unwrap()
            .rows
            .into_iter()
            .map(|mut r| r.remove(0))
            .collect()
    }

    #[test]
    fn test_invalid_config_is_connection_error() {
        let missing = SqliteConfig {
            mode: SqliteMode::File,
            ..SqliteConfig::default()
        };
        let err = SqliteStore::open(&missing).unwrap_err();
        assert_eq!(err.kind, StoreErrorKind::Connection);
        assert!(err.message.contains("path"));
    }

    #[test]
    fn test_memory_roundtrip_and_connection_count() {
        let store = SqliteStore::open_memory().unwrap();
        assert_eq!(store.engine(), "sqlite");
        assert_eq!(store.open_connections(), 0);

        let mut conn = store.connect().unwrap();
        assert_eq!(store.open_connections(), 1);
        seed(&mut conn);

        conn.begin_transaction(IsolationLevel::Serializable).unwrap();
        let set = conn
            .execute("SELECT id, name, score FROM users WHERE id = ? ORDER BY id", &[SqlValue::Integer(1)])
            .unwrap();
        assert_eq!(set.columns, vec!["id", "name", "score"]);
        assert_eq!(set.rows, vec![vec![SqlValue::Integer(1), text("Alice"), SqlValue::Integer(100)]]);

        let updated = conn
            .execute("UPDATE users SET score = score + 1", &[])
            .unwrap();
        assert_eq!(updated.affected, 1);
        conn.commit().unwrap();

        drop(conn);
        assert_eq!(store.open_connections(), 0);
    }

    #[test]
    fn test_memory_database_survives_connection_close() {
        let store = SqliteStore::open_memory().unwrap();
        {
            let mut conn = store.connect().unwrap();
            seed(&mut conn);
        }
        let mut conn = store.connect().unwrap();
        assert_eq!(names(&mut conn), vec![text("Alice")]);
    }

    #[test]
    fn test_memory_stores_are_private() {
        let a = SqliteStore::open_memory().unwrap();
        let b = SqliteStore::open_memory().unwrap();
        seed(&mut a.connect().unwrap());
        let err = b
            .connect()
            .unwrap()
            .execute("SELECT name FROM users ORDER BY id", &[])
            .unwrap_err();
        assert_eq!(err.kind, StoreErrorKind::Other);
        assert!(err.message.contains("no such table"));
    }

    #[test]
    fn test_read_uncommitted_sees_uncommitted_write() {
        let store = SqliteStore::open_memory().unwrap();
        let mut reader = store.connect().unwrap();
        let mut writer = store.connect().unwrap();
        seed(&mut reader);

        reader.begin_transaction(IsolationLevel::ReadUncommitted).unwrap();
        writer.begin_transaction(IsolationLevel::ReadUncommitted).unwrap();
        writer
            .execute("UPDATE users SET name = ? WHERE id = ?", &[text("Alien"), SqlValue::Integer(1)])
            .unwrap();
        assert_eq!(names(&mut reader), vec![text("Alien")]);
        writer.rollback().unwrap();
        reader.commit().unwrap();
    }

    #[test]
    fn test_shared_cache_table_lock_is_locked() {
        let store = SqliteStore::open_memory().unwrap();
        let mut reader = store.connect().unwrap();
        let mut writer = store.connect().unwrap();
        seed(&mut reader);

        reader.begin_transaction(IsolationLevel::ReadCommitted).unwrap();
        writer.begin_transaction(IsolationLevel::ReadCommitted).unwrap();
        names(&mut reader);
        let err = writer
            .execute("UPDATE users SET name = 'Alien' WHERE id = 1", &[])
            .unwrap_err();
        assert_eq!(err.kind, StoreErrorKind::Locked);
        writer.rollback().unwrap();
        reader.commit().unwrap();
    }

    #[test]
    fn test_file_store_applies_wal() {
        let dir = TempDir::new().unwrap();
        let store = SqliteStore::open(&SqliteConfig::file(dir.path().join("wal.db"))).unwrap();
        let mut conn = store.connect().unwrap();
        let set = conn.execute("PRAGMA journal_mode", &[]).unwrap();
        assert_eq!(set.rows, vec![vec![text("wal")]]);
    }

    #[test]
    fn test_file_store_applies_delete_journal() {
        let dir = TempDir::new().unwrap();
        let config = SqliteConfig::file(dir.path().join("rollback.db"))
            .with_journal_mode(JournalMode::Delete);
        let store = SqliteStore::open(&config).unwrap();
        let set = store.connect().unwrap().execute("PRAGMA journal_mode", &[]).unwrap();
        assert_eq!(set.rows, vec![vec![text("delete")]]);
    }

    #[test]
    fn test_wal_concurrent_writer_is_locked() {
        let dir = TempDir::new().unwrap();
        let store = SqliteStore::open(&SqliteConfig::file(dir.path().join("busy.db"))).unwrap();
        let mut a = store.connect().unwrap();
        let mut b = store.connect().unwrap();
        seed(&mut a);

        a.begin_transaction(IsolationLevel::Serializable).unwrap();
        b.begin_transaction(IsolationLevel::Serializable).unwrap();
        a.execute("UPDATE users SET score = 1 WHERE id = 1", &[]).unwrap();
        let err = b
            .execute("UPDATE users SET score = 2 WHERE id = 1", &[])
            .unwrap_err();
        assert_eq!(err.kind, StoreErrorKind::Locked);
        assert_eq!(err.code, Some(rusqlite::ffi::SQLITE_BUSY));
        a.commit().unwrap();
        b.rollback().unwrap();
    }

    #[test]
    fn test_wal_stale_snapshot_write_is_conflict() {
        let dir = TempDir::new().unwrap();
        let store = SqliteStore::open(&SqliteConfig::file(dir.path().join("stale.db"))).unwrap();
        let mut a = store.connect().unwrap();
        let mut b = store.connect().unwrap();
        seed(&mut a);

        a.begin_transaction(IsolationLevel::RepeatableRead).unwrap();
        assert_eq!(names(&mut a), vec![text("Alice")]);

        b.begin_transaction(IsolationLevel::RepeatableRead).unwrap();
        b.execute("UPDATE users SET name = 'Alien' WHERE id = 1", &[]).unwrap();
        b.commit().unwrap();

        assert_eq!(names(&mut a), vec![text("Alice")]);
        let err = a
            .execute("UPDATE users SET score = 0 WHERE id = 1", &[])
            .unwrap_err();
        assert_eq!(err.kind, StoreErrorKind::Conflict);
        assert_eq!(err.code, Some(rusqlite::ffi::SQLITE_BUSY_SNAPSHOT));
        a.rollback().unwrap();
    }

    #[test]
    fn test_open_in_missing_directory_is_connection_error() {
        let dir = TempDir::new().unwrap();
        let config = SqliteConfig::file(dir.path().join("missing").join("x.db"));
        let err = SqliteStore::open(&config).unwrap_err();
        assert_eq!(err.kind, StoreErrorKind::Connection);
        assert!(err.message.contains("x.db"));
    }

    #[test]
    fn test_interrupt_handle_available() {
        let store = SqliteStore::open_memory().unwrap();
        let conn = store.connect().unwrap();
        let handle = conn.interrupt_handle().unwrap();
        // Nothing running: no effect.
        handle.interrupt();
    }

    #[test]
    fn test_classify_non_sqlite_error() {
        let err = classify(rusqlite::Error::QueryReturnedNoRows);
        assert_eq!(err.kind, StoreErrorKind::Other);
        assert_eq!(err.code, None);
    }
}
