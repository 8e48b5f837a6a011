//! Bundled `SQLite` implementation of the connection contract.
//!
//! Wraps a `rusqlite::Connection` behind a mutex with poison recovery and
//! configures WAL mode and a busy timeout so concurrent callers degrade
//! gracefully instead of failing immediately.

use crate::connection::{Connection, Row, SqlValue};
use crate::{Error, Result};
use std::path::PathBuf;
use std::sync::{Mutex, MutexGuard};

/// `SQLite`-backed connection.
///
/// # Concurrency Model
///
/// Uses a `Mutex<rusqlite::Connection>` because the underlying handle is
/// not `Sync`. While this serializes statements on one handle, WAL mode
/// and the `busy_timeout` pragma mitigate contention:
///
/// - **WAL mode**: Allows concurrent readers with a single writer
/// - **`busy_timeout`**: Waits up to 5 seconds for locks instead of
///   failing immediately
/// - **NORMAL synchronous**: Balances durability with performance
#[derive(Debug)]
pub struct SqliteConnection {
    /// Connection to the `SQLite` database.
    conn: Mutex<rusqlite::Connection>,
    /// Path to the database file (None for in-memory).
    db_path: Option<PathBuf>,
}

impl SqliteConnection {
    /// Opens a database file.
    ///
    /// # Errors
    ///
    /// Returns an error if the database cannot be opened or configured.
    pub fn open(db_path: impl Into<PathBuf>) -> Result<Self> {
        let db_path = db_path.into();
        let conn = rusqlite::Connection::open(&db_path).map_err(|e| Error::Engine {
            operation: "open_sqlite".to_string(),
            cause: e.to_string(),
        })?;
        configure(&conn);

        Ok(Self {
            conn: Mutex::new(conn),
            db_path: Some(db_path),
        })
    }

    /// Opens an in-memory database (useful for testing).
    ///
    /// # Errors
    ///
    /// Returns an error if the database cannot be opened.
    pub fn in_memory() -> Result<Self> {
        let conn = rusqlite::Connection::open_in_memory().map_err(|e| Error::Engine {
            operation: "open_sqlite_in_memory".to_string(),
            cause: e.to_string(),
        })?;
        configure(&conn);

        Ok(Self {
            conn: Mutex::new(conn),
            db_path: None,
        })
    }

    /// Returns the database path (None for in-memory).
    #[must_use]
    pub const fn db_path(&self) -> Option<&PathBuf> {
        self.db_path.as_ref()
    }

    /// Acquires the handle, recovering from mutex poison.
    ///
    /// A panic in a previous critical section leaves the connection state
    /// itself valid, so we recover the inner value rather than cascade
    /// the failure.
    fn lock(&self) -> MutexGuard<'_, rusqlite::Connection> {
        match self.conn.lock() {
            Ok(guard) => guard,
            Err(poisoned) => {
                tracing::warn!("SQLite mutex was poisoned, recovering");
                metrics::counter!("relkv_mutex_poison_recovery_total").increment(1);
                poisoned.into_inner()
            }
        }
    }
}

/// Applies WAL mode, NORMAL synchronous, and a 5-second busy timeout.
///
/// `pragma_update` results are ignored: `journal_mode` answers with a
/// string that would otherwise read as an error, and in-memory databases
/// reject WAL entirely.
fn configure(conn: &rusqlite::Connection) {
    let _ = conn.pragma_update(None, "journal_mode", "WAL");
    let _ = conn.pragma_update(None, "synchronous", "NORMAL");
    let _ = conn.pragma_update(None, "busy_timeout", "5000");
}

impl From<rusqlite::types::Value> for SqlValue {
    fn from(value: rusqlite::types::Value) -> Self {
        match value {
            rusqlite::types::Value::Null => Self::Null,
            rusqlite::types::Value::Integer(i) => Self::Integer(i),
            rusqlite::types::Value::Real(f) => Self::Real(f),
            rusqlite::types::Value::Text(s) => Self::Text(s),
            rusqlite::types::Value::Blob(b) => Self::Blob(b),
        }
    }
}

impl Connection for SqliteConnection {
    fn select(&self, sql: &str) -> Result<Vec<Row>> {
        let conn = self.lock();
        let mut stmt = conn.prepare(sql).map_err(|e| Error::Engine {
            operation: "prepare".to_string(),
            cause: e.to_string(),
        })?;
        let column_count = stmt.column_count();

        let mut rows = stmt.query([]).map_err(|e| Error::Engine {
            operation: "select".to_string(),
            cause: e.to_string(),
        })?;

        let mut out = Vec::new();
        loop {
            let row = rows.next().map_err(|e| Error::Engine {
                operation: "select".to_string(),
                cause: e.to_string(),
            })?;
            let Some(row) = row else { break };

            let mut columns = Vec::with_capacity(column_count);
            for index in 0..column_count {
                let value: rusqlite::types::Value =
                    row.get(index).map_err(|e| Error::Engine {
                        operation: "select".to_string(),
                        cause: e.to_string(),
                    })?;
                columns.push(SqlValue::from(value));
            }
            out.push(columns);
        }

        Ok(out)
    }

    fn execute(&self, sql: &str) -> Result<u64> {
        let conn = self.lock();
        let affected = conn.execute(sql, []).map_err(|e| Error::Engine {
            operation: "execute".to_string(),
            cause: e.to_string(),
        })?;
        Ok(affected as u64)
    }

    fn last_insert_id(&self) -> Result<i64> {
        Ok(self.lock().last_insert_rowid())
    }

    fn begin(&self) -> Result<()> {
        self.execute("BEGIN IMMEDIATE").map(|_| ())
    }

    fn commit(&self) -> Result<()> {
        self.execute("COMMIT").map(|_| ())
    }

    fn rollback(&self) -> Result<()> {
        self.execute("ROLLBACK").map(|_| ())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn scratch() -> SqliteConnection {
        let conn = SqliteConnection::in_memory().unwrap();
        conn.execute("CREATE TABLE t (id INTEGER PRIMARY KEY, name TEXT, data BLOB)")
            .unwrap();
        conn
    }

    #[test]
    fn test_open_on_disk() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("kv.db");
        let conn = SqliteConnection::open(&path).unwrap();
        assert_eq!(conn.db_path(), Some(&path));
        conn.execute("CREATE TABLE t (id INTEGER PRIMARY KEY)").unwrap();
    }

    #[test]
    fn test_execute_reports_affected_rows() {
        let conn = scratch();
        assert_eq!(
            conn.execute("INSERT INTO t (name) VALUES ('a'), ('b')").unwrap(),
            2
        );
        assert_eq!(conn.execute("DELETE FROM t").unwrap(), 2);
    }

    #[test]
    fn test_last_insert_id() {
        let conn = scratch();
        conn.execute("INSERT INTO t (name) VALUES ('a')").unwrap();
        let first = conn.last_insert_id().unwrap();
        conn.execute("INSERT INTO t (name) VALUES ('b')").unwrap();
        assert_eq!(conn.last_insert_id().unwrap(), first + 1);
    }

    #[test]
    fn test_select_materializes_storage_classes() {
        let conn = scratch();
        conn.execute("INSERT INTO t (name, data) VALUES ('a', x'00ff')")
            .unwrap();

        let rows = conn.select("SELECT id, name, data FROM t").unwrap();
        assert_eq!(rows.len(), 1);
        assert_eq!(rows[0][0], SqlValue::Integer(1));
        assert_eq!(rows[0][1], SqlValue::Text("a".to_string()));
        assert_eq!(rows[0][2], SqlValue::Blob(vec![0x00, 0xff]));
    }

    #[test]
    fn test_select_error_surfaces_as_engine() {
        let conn = scratch();
        let err = conn.select("SELECT nope FROM missing").unwrap_err();
        assert!(matches!(err, Error::Engine { .. }));
    }

    #[test]
    fn test_transaction_rolls_back_on_error() {
        let conn = scratch();
        let result: Result<()> = crate::connection::with_transaction(&conn, || {
            conn.execute("INSERT INTO t (name) VALUES ('a')")?;
            Err(Error::InvalidInput("boom".to_string()))
        });
        assert!(result.is_err());
        assert!(conn.select("SELECT * FROM t").unwrap().is_empty());
    }

    #[test]
    fn test_transaction_commits_on_success() {
        let conn = scratch();
        crate::connection::with_transaction(&conn, || {
            conn.execute("INSERT INTO t (name) VALUES ('a')")
        })
        .unwrap();
        assert_eq!(conn.select("SELECT * FROM t").unwrap().len(), 1);
    }
}
