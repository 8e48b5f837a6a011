//! # relkv
//!
//! A key-value store layered over a relational engine.
//!
//! relkv gives callers atomic `get`/`set`/`exists`/`del`/`increment`/expire
//! operations over a single logical table, with a typed, injection-safe SQL
//! builder underneath. The backing store (`SQLite` via `rusqlite`) should be
//! regarded as an implementation detail.
//!
//! ## Features
//!
//! - TTL-based expiration encoded purely through relational primitives
//! - Race-free `setnx` and `increment` built on upserts and conditional
//!   updates
//! - A fragment-appending query builder with named `:placeholder` binds and
//!   a closed, type-dispatching value sanitizer
//! - Caller-supplied connections; no pooling, retries, or scheduling of its
//!   own
//!
//! ## Example
//!
//! ```rust,ignore
//! use relkv::{KvStore, SqliteConnection, StoreConfig};
//! use std::sync::Arc;
//!
//! let conn = Arc::new(SqliteConnection::in_memory()?);
//! relkv::create_table(&*conn, &StoreConfig::default())?;
//!
//! let kv = KvStore::with_connection(StoreConfig::default(), conn);
//! kv.set("foo", b"bar", None)?;
//! assert_eq!(kv.get("foo")?, Some(b"bar".to_vec()));
//! ```

#![deny(clippy::all)]
#![warn(clippy::pedantic)]
#![warn(clippy::nursery)]
#![warn(missing_docs)]
#![forbid(unsafe_code)]

use serde::Deserialize;
use thiserror::Error as ThisError;

// Module declarations
pub mod config;
pub mod connection;
pub mod schema;
pub mod sql;
pub mod store;

// Re-exports for convenience
pub use config::{CaseSensitivity, StoreConfig, TimeSource};
pub use connection::{
    Connection, ConnectionProvider, Row, SharedConnection, SqlValue, SqliteConnection,
    with_transaction,
};
pub use schema::create_table;
pub use sql::{BindValue, Literal, RenderTimezone, Rows, Statement};
pub use store::{IncrementOptions, KvStore, MAX_KEY_LENGTH, MAX_VALUE_LENGTH};

/// Error type for relkv operations.
///
/// Uses `thiserror` for automatic `Display` and `Error` trait implementations.
///
/// # Error Variant Triggers
///
/// | Variant | Raised When |
/// |---------|-------------|
/// | `InvalidInput` | Key/value/batch length violations, zero increment amounts, flag misuse |
/// | `UnresolvedBind` | A `:name` token has no bind value in scope |
/// | `UnsanitizableValue` | A bind value's shape cannot render as a SQL literal |
/// | `StatementFrozen` | `add`/`bind` on a statement that already executed |
/// | `MissingConnection` | The connection provider yielded no handle |
/// | `Engine` | The connection reported an execution failure |
/// | `Unavailable` | A configured transient failure, translated uniformly |
/// | `InvalidValue` | `increment` against a non-numeric stored value |
#[derive(Debug, ThisError)]
pub enum Error {
    /// Invalid input was provided.
    ///
    /// Raised when:
    /// - A key exceeds [`MAX_KEY_LENGTH`] bytes
    /// - A value exceeds [`MAX_VALUE_LENGTH`] bytes
    /// - An increment amount is zero
    /// - `touch_on_insert` is requested without an expiration
    ///
    /// Always synchronous; never wrapped into [`Error::Unavailable`].
    #[error("invalid input: {0}")]
    InvalidInput(String),

    /// A `:name` placeholder had no bind value in either the fragment's
    /// extras or the statement's persistent bind map.
    #[error("there's no bind value for :{name}")]
    UnresolvedBind {
        /// The placeholder name, without the leading colon.
        name: String,
    },

    /// A bind value's type or shape is not renderable as a SQL literal.
    ///
    /// Raised when:
    /// - A list is empty or contains a nested list
    /// - A row list is empty or a row contains a non-scalar
    /// - A float is not finite
    #[error("can't sanitize {description}")]
    UnsanitizableValue {
        /// What was being sanitized.
        description: String,
    },

    /// The statement was mutated after its first execution.
    ///
    /// Execution is terminal: results are memoized and further
    /// `add`/`bind` calls are rejected.
    #[error("statement has already been executed and is frozen")]
    StatementFrozen,

    /// The connection provider yielded no handle.
    ///
    /// This is a configuration error, not a runtime I/O error: the store
    /// must be constructed with a provider that returns a connection.
    #[error("store must be initialized with a provider that returns a connection")]
    MissingConnection,

    /// The underlying engine reported a failure during execution.
    #[error("engine operation '{operation}' failed: {cause}")]
    Engine {
        /// The operation that failed.
        operation: String,
        /// The underlying cause.
        cause: String,
    },

    /// A configured transient infrastructure failure, translated uniformly.
    ///
    /// Which error kinds are translated is controlled by
    /// [`StoreConfig::encapsulated_errors`]; by default only
    /// [`ErrorKind::Engine`] failures observed during store execution are.
    #[error("store unavailable: {cause}")]
    Unavailable {
        /// The translated failure, rendered as text.
        cause: String,
    },

    /// `increment` was attempted against a non-numeric stored value.
    ///
    /// The stored value is left untouched.
    #[error("existing value for key '{key}' is not an integer")]
    InvalidValue {
        /// The key whose value blocked the increment.
        key: String,
    },
}

/// Fieldless classification of [`Error`] variants.
///
/// Used by [`StoreConfig::encapsulated_errors`] to pick which failures the
/// store translates to [`Error::Unavailable`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ErrorKind {
    /// [`Error::InvalidInput`]
    InvalidInput,
    /// [`Error::UnresolvedBind`]
    UnresolvedBind,
    /// [`Error::UnsanitizableValue`]
    UnsanitizableValue,
    /// [`Error::StatementFrozen`]
    StatementFrozen,
    /// [`Error::MissingConnection`]
    MissingConnection,
    /// [`Error::Engine`]
    Engine,
    /// [`Error::Unavailable`]
    Unavailable,
    /// [`Error::InvalidValue`]
    InvalidValue,
}

impl Error {
    /// Returns the fieldless kind of this error.
    #[must_use]
    pub const fn kind(&self) -> ErrorKind {
        match self {
            Self::InvalidInput(_) => ErrorKind::InvalidInput,
            Self::UnresolvedBind { .. } => ErrorKind::UnresolvedBind,
            Self::UnsanitizableValue { .. } => ErrorKind::UnsanitizableValue,
            Self::StatementFrozen => ErrorKind::StatementFrozen,
            Self::MissingConnection => ErrorKind::MissingConnection,
            Self::Engine { .. } => ErrorKind::Engine,
            Self::Unavailable { .. } => ErrorKind::Unavailable,
            Self::InvalidValue { .. } => ErrorKind::InvalidValue,
        }
    }
}

/// Result type alias for relkv operations.
pub type Result<T> = std::result::Result<T, Error>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_error_display() {
        let err = Error::InvalidInput("key too long".to_string());
        assert_eq!(err.to_string(), "invalid input: key too long");

        let err = Error::UnresolvedBind {
            name: "keys".to_string(),
        };
        assert_eq!(err.to_string(), "there's no bind value for :keys");

        let err = Error::Engine {
            operation: "select".to_string(),
            cause: "disk I/O error".to_string(),
        };
        assert_eq!(
            err.to_string(),
            "engine operation 'select' failed: disk I/O error"
        );
    }

    #[test]
    fn test_error_kind() {
        assert_eq!(
            Error::StatementFrozen.kind(),
            ErrorKind::StatementFrozen
        );
        assert_eq!(
            Error::Unavailable {
                cause: "down".to_string()
            }
            .kind(),
            ErrorKind::Unavailable
        );
        assert_eq!(Error::MissingConnection.kind(), ErrorKind::MissingConnection);
    }
}
