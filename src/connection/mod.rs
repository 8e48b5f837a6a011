//! Connection and provider contracts.
//!
//! The store borrows a connection per logical operation and never owns
//! one: lifetime, pooling, transactions opened around calls, timeouts,
//! and cancellation all belong to the caller. A [`Connection`] is the
//! minimal execution surface the query builder needs; a
//! [`ConnectionProvider`] hands one out per operation.

mod sqlite;

pub use sqlite::SqliteConnection;

use crate::{Error, Result};
use std::sync::Arc;

/// A materialized column value read back from the engine.
#[derive(Debug, Clone, PartialEq)]
pub enum SqlValue {
    /// SQL NULL.
    Null,
    /// An integer column value.
    Integer(i64),
    /// A floating-point column value.
    Real(f64),
    /// A text column value.
    Text(String),
    /// A blob column value.
    Blob(Vec<u8>),
}

impl SqlValue {
    /// The value as text, when it is text.
    #[must_use]
    pub fn as_text(&self) -> Option<&str> {
        match self {
            Self::Text(s) => Some(s),
            _ => None,
        }
    }

    /// The value as an integer, when it is one.
    #[must_use]
    pub const fn as_integer(&self) -> Option<i64> {
        match self {
            Self::Integer(i) => Some(*i),
            _ => None,
        }
    }

    /// The value's byte content, for columns that may come back as
    /// text, blob, or numeric depending on how they were written.
    ///
    /// Returns `None` for NULL.
    #[must_use]
    pub fn to_bytes(&self) -> Option<Vec<u8>> {
        match self {
            Self::Null => None,
            Self::Integer(i) => Some(i.to_string().into_bytes()),
            Self::Real(f) => Some(f.to_string().into_bytes()),
            Self::Text(s) => Some(s.clone().into_bytes()),
            Self::Blob(b) => Some(b.clone()),
        }
    }

    /// Whether the value is SQL NULL.
    #[must_use]
    pub const fn is_null(&self) -> bool {
        matches!(self, Self::Null)
    }
}

/// One materialized result row.
pub type Row = Vec<SqlValue>;

/// Execution surface supplied per logical operation.
///
/// Implementations must be safe to share across threads; the provided
/// [`SqliteConnection`] serializes access internally.
pub trait Connection: Send + Sync + std::fmt::Debug {
    /// Executes SQL text and materializes every result row.
    fn select(&self, sql: &str) -> Result<Vec<Row>>;

    /// Executes SQL text, returning the affected-row count.
    fn execute(&self, sql: &str) -> Result<u64>;

    /// The generated id of the most recent insert-class statement.
    fn last_insert_id(&self) -> Result<i64>;

    /// Opens a native transaction on this handle.
    fn begin(&self) -> Result<()>;

    /// Commits the open transaction.
    fn commit(&self) -> Result<()>;

    /// Rolls the open transaction back.
    fn rollback(&self) -> Result<()>;
}

/// Yields a live connection per logical operation.
///
/// Returning `None` is a configuration error
/// ([`Error::MissingConnection`]), distinct from runtime I/O failure.
pub trait ConnectionProvider: Send + Sync {
    /// The handle to run the current operation against.
    fn connection(&self) -> Option<Arc<dyn Connection>>;
}

impl<F> ConnectionProvider for F
where
    F: Fn() -> Option<Arc<dyn Connection>> + Send + Sync,
{
    fn connection(&self) -> Option<Arc<dyn Connection>> {
        self()
    }
}

/// Provider that always yields the same shared connection.
pub struct SharedConnection {
    conn: Arc<dyn Connection>,
}

impl SharedConnection {
    /// Wraps a connection as a provider.
    #[must_use]
    pub fn new(conn: Arc<dyn Connection>) -> Self {
        Self { conn }
    }
}

impl ConnectionProvider for SharedConnection {
    fn connection(&self) -> Option<Arc<dyn Connection>> {
        Some(Arc::clone(&self.conn))
    }
}

/// Runs a closure inside a native transaction, rolling back on error.
///
/// The rollback result is deliberately ignored on the error path: the
/// original failure is the one the caller needs to see.
///
/// # Errors
///
/// Returns the closure's error, or any error from opening or committing
/// the transaction.
pub fn with_transaction<T>(
    conn: &dyn Connection,
    f: impl FnOnce() -> Result<T>,
) -> Result<T> {
    conn.begin()?;
    match f() {
        Ok(value) => {
            conn.commit()?;
            Ok(value)
        }
        Err(e) => {
            if let Err(rollback_err) = conn.rollback() {
                tracing::warn!(error = %rollback_err, "rollback failed after transaction error");
            }
            Err(e)
        }
    }
}

/// Resolves a provider's handle, surfacing absence as a configuration
/// error.
pub(crate) fn require_connection(
    provider: &dyn ConnectionProvider,
) -> Result<Arc<dyn Connection>> {
    provider.connection().ok_or(Error::MissingConnection)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_sql_value_accessors() {
        assert_eq!(SqlValue::Text("a".to_string()).as_text(), Some("a"));
        assert_eq!(SqlValue::Integer(3).as_text(), None);
        assert_eq!(SqlValue::Integer(3).as_integer(), Some(3));
        assert!(SqlValue::Null.is_null());
    }

    #[test]
    fn test_to_bytes_normalizes_storage_classes() {
        assert_eq!(SqlValue::Null.to_bytes(), None);
        assert_eq!(SqlValue::Integer(42).to_bytes(), Some(b"42".to_vec()));
        assert_eq!(
            SqlValue::Text("bar".to_string()).to_bytes(),
            Some(b"bar".to_vec())
        );
        assert_eq!(
            SqlValue::Blob(vec![0x00, 0xff]).to_bytes(),
            Some(vec![0x00, 0xff])
        );
    }

    #[test]
    fn test_closure_provider() {
        let provider = || -> Option<Arc<dyn Connection>> { None };
        assert!(provider.connection().is_none());
        assert!(matches!(
            require_connection(&provider).unwrap_err(),
            Error::MissingConnection
        ));
    }
}
