//! The key-value store.
//!
//! [`KvStore`] is a key/value data store backed by a relational table
//! (the backing store should be regarded as an implementation detail).
//!
//! Usage tips:
//!
//! - Components in key names should be ordered by cardinality, from
//!   lowest to highest: static components at the front, highly variable
//!   components at the end. `user.{preference}.{user_id}` scans far
//!   better than `{user_id}.user.{preference}` if the keyspace ever
//!   needs to be searched or migrated.
//! - Reader operations return their outcome as a `Result` value rather
//!   than panicking, so callers can degrade gracefully when the backing
//!   store is down: fall back to a default, or let the rest of the page
//!   load. Code using [`KvStore`] should not assume reads always
//!   succeed.

mod increment;
mod metrics;

pub use increment::IncrementOptions;

use crate::config::StoreConfig;
use crate::connection::{Connection, ConnectionProvider, SharedConnection, require_connection};
use crate::sql::{BindValue, Statement};
use crate::{Error, Result};
use chrono::{DateTime, NaiveDateTime, Utc};
use std::collections::{HashMap, HashSet};
use std::sync::Arc;
use std::time::Instant;
use tracing::instrument;

/// Maximum key length in bytes.
pub const MAX_KEY_LENGTH: usize = 255;

/// Maximum value length in bytes.
pub const MAX_VALUE_LENGTH: usize = 65535;

/// Timestamp shape written by the sanitizer and the engine's
/// now-expression alike.
const TIMESTAMP_FORMAT: &str = "%Y-%m-%d %H:%M:%S";

/// A key-value store over a single relational table.
///
/// Construction takes an immutable [`StoreConfig`] and a connection
/// provider; the store holds no other state and retains nothing between
/// calls.
///
/// # Examples
///
/// ```rust,ignore
/// use relkv::{KvStore, SqliteConnection, StoreConfig};
/// use std::sync::Arc;
///
/// let conn = Arc::new(SqliteConnection::in_memory()?);
/// relkv::create_table(&*conn, &StoreConfig::default())?;
/// let kv = KvStore::with_connection(StoreConfig::default(), conn);
///
/// kv.set("foo", b"bar", None)?;
/// assert_eq!(kv.get("foo")?, Some(b"bar".to_vec()));
/// assert!(kv.exists("foo")?);
/// ```
pub struct KvStore {
    config: StoreConfig,
    provider: Arc<dyn ConnectionProvider>,
}

impl KvStore {
    /// Creates a store over a connection provider.
    #[must_use]
    pub fn new(config: StoreConfig, provider: Arc<dyn ConnectionProvider>) -> Self {
        Self { config, provider }
    }

    /// Creates a store that reuses one shared connection for every
    /// operation.
    #[must_use]
    pub fn with_connection(config: StoreConfig, conn: Arc<dyn Connection>) -> Self {
        Self::new(config, Arc::new(SharedConnection::new(conn)))
    }

    /// The store's configuration.
    #[must_use]
    pub const fn config(&self) -> &StoreConfig {
        &self.config
    }

    /// Gets the value of the specified key.
    ///
    /// Returns `None` for a missing or expired key.
    ///
    /// # Errors
    ///
    /// [`Error::InvalidInput`] on validation failure; engine failures as
    /// reported by the connection.
    pub fn get(&self, key: &str) -> Result<Option<Vec<u8>>> {
        self.validate_key(key)?;
        Ok(self.mget(&[key])?.pop().flatten())
    }

    /// Gets the values of all specified keys, in request order.
    ///
    /// `None` is returned in place of a value for keys which do not
    /// exist or have expired. Duplicate keys are answered independently
    /// and identically.
    ///
    /// # Errors
    ///
    /// As [`KvStore::get`].
    #[instrument(skip(self, keys), fields(operation = "mget", count = keys.len()))]
    pub fn mget(&self, keys: &[&str]) -> Result<Vec<Option<Vec<u8>>>> {
        self.validate_keys(keys)?;

        self.observed("mget", || {
            let conn = self.connection()?;
            let rows = Statement::results_once(
                &*conn,
                &format!(
                    "SELECT key, value FROM {} \
                     WHERE key IN :keys AND (expires_at IS NULL OR expires_at > :now)",
                    self.config.table_name
                ),
                vec![
                    ("keys", Self::key_list(keys)),
                    ("now", self.config.time_source.reference_time()),
                ],
            )?;

            let mut found: HashMap<String, Vec<u8>> = HashMap::with_capacity(rows.len());
            for row in rows {
                if let (Some(key), Some(value)) = (
                    row.first().and_then(|v| v.as_text().map(str::to_string)),
                    row.get(1).and_then(crate::connection::SqlValue::to_bytes),
                ) {
                    found.insert(self.config.case_sensitivity.normalize(&key), value);
                }
            }

            Ok(keys
                .iter()
                .map(|key| {
                    found
                        .get(&self.config.case_sensitivity.normalize(key))
                        .cloned()
                })
                .collect())
        })
    }

    /// Checks for existence of the specified key.
    ///
    /// # Errors
    ///
    /// As [`KvStore::get`].
    pub fn exists(&self, key: &str) -> Result<bool> {
        self.validate_key(key)?;
        Ok(self.mexists(&[key])?.pop().unwrap_or(false))
    }

    /// Checks for existence of all specified keys, in request order.
    ///
    /// # Errors
    ///
    /// As [`KvStore::get`].
    #[instrument(skip(self, keys), fields(operation = "mexists", count = keys.len()))]
    pub fn mexists(&self, keys: &[&str]) -> Result<Vec<bool>> {
        self.validate_keys(keys)?;

        self.observed("mexists", || {
            let conn = self.connection()?;
            let values = Statement::values_once(
                &*conn,
                &format!(
                    "SELECT key FROM {} \
                     WHERE key IN :keys AND (expires_at IS NULL OR expires_at > :now)",
                    self.config.table_name
                ),
                vec![
                    ("keys", Self::key_list(keys)),
                    ("now", self.config.time_source.reference_time()),
                ],
            )?;

            let found: HashSet<String> = values
                .iter()
                .filter_map(|v| v.as_text())
                .map(|k| self.config.case_sensitivity.normalize(k))
                .collect();

            Ok(keys
                .iter()
                .map(|key| found.contains(&self.config.case_sensitivity.normalize(key)))
                .collect())
        })
    }

    /// Sets the specified key to the specified value.
    ///
    /// With no `expires`, any previously set expiration is cleared:
    /// overwrite semantics are total, never a merge.
    ///
    /// # Errors
    ///
    /// [`Error::InvalidInput`] on validation failure;
    /// [`Error::Unavailable`] for configured transient failures; any
    /// other failure propagates.
    pub fn set(&self, key: &str, value: &[u8], expires: Option<DateTime<Utc>>) -> Result<()> {
        self.mset(&[(key, value)], expires)
    }

    /// Sets every key in the batch to its associated value in one upsert,
    /// all expiring at the specified time.
    ///
    /// # Errors
    ///
    /// As [`KvStore::set`].
    #[instrument(skip(self, entries), fields(operation = "mset", count = entries.len()))]
    pub fn mset(&self, entries: &[(&str, &[u8])], expires: Option<DateTime<Utc>>) -> Result<()> {
        self.validate_entries(entries)?;

        self.observed("mset", || {
            self.encapsulate(|| {
                let conn = self.connection()?;
                let now = self.config.time_source.reference_time();
                let expires_bind = Self::expires_bind(expires);

                let rows: Vec<Vec<BindValue>> = entries
                    .iter()
                    .map(|(key, value)| {
                        vec![
                            BindValue::from(*key),
                            BindValue::from(*value),
                            now.clone(),
                            now.clone(),
                            expires_bind.clone(),
                        ]
                    })
                    .collect();

                Statement::run_once(
                    &*conn,
                    &format!(
                        "INSERT INTO {} (key, value, created_at, updated_at, expires_at) \
                         VALUES :rows \
                         ON CONFLICT(key) DO UPDATE SET \
                           value = excluded.value, \
                           updated_at = excluded.updated_at, \
                           expires_at = excluded.expires_at",
                        self.config.table_name
                    ),
                    vec![("rows", BindValue::Rows(crate::sql::Rows::new(rows)))],
                )?;
                Ok(())
            })
        })
    }

    /// Sets the specified key to the specified value only if no live row
    /// exists for it. Returns true iff the key was set.
    ///
    /// # Errors
    ///
    /// As [`KvStore::set`].
    #[instrument(skip(self, value), fields(operation = "setnx", key = %key))]
    pub fn setnx(&self, key: &str, value: &[u8], expires: Option<DateTime<Utc>>) -> Result<bool> {
        self.validate_key(key)?;
        self.validate_value(value)?;

        self.observed("setnx", || {
            self.encapsulate(|| {
                let conn = self.connection()?;
                let now = self.config.time_source.reference_time();

                // If the key exists but has expired, prune it first. The
                // same result is expressible as one upsert, but then the
                // affected-row count could no longer distinguish a fresh
                // insert from a blocked one.
                Statement::run_once(
                    &*conn,
                    &format!(
                        "DELETE FROM {} WHERE key = :key AND expires_at <= :now",
                        self.config.table_name
                    ),
                    vec![("key", BindValue::from(key)), ("now", now.clone())],
                )?;

                let mut stmt = Statement::run_once(
                    &*conn,
                    &format!(
                        "INSERT OR IGNORE INTO {} \
                         (key, value, created_at, updated_at, expires_at) \
                         VALUES (:key, :value, :now, :now, :expires)",
                        self.config.table_name
                    ),
                    vec![
                        ("key", BindValue::from(key)),
                        ("value", BindValue::from(value)),
                        ("now", now),
                        ("expires", Self::expires_bind(expires)),
                    ],
                )?;

                Ok(stmt.affected_rows()? > 0)
            })
        })
    }

    /// Deletes the specified key. Deleting an absent key is not an
    /// error.
    ///
    /// # Errors
    ///
    /// As [`KvStore::set`].
    pub fn del(&self, key: &str) -> Result<()> {
        self.validate_key(key)?;
        self.mdel(&[key])
    }

    /// Deletes the specified keys, live or not.
    ///
    /// # Errors
    ///
    /// As [`KvStore::set`].
    #[instrument(skip(self, keys), fields(operation = "mdel", count = keys.len()))]
    pub fn mdel(&self, keys: &[&str]) -> Result<()> {
        self.validate_keys(keys)?;

        self.observed("mdel", || {
            self.encapsulate(|| {
                let conn = self.connection()?;
                Statement::run_once(
                    &*conn,
                    &format!("DELETE FROM {} WHERE key IN :keys", self.config.table_name),
                    vec![("keys", Self::key_list(keys))],
                )?;
                Ok(())
            })
        })
    }

    /// Returns the expiration of the specified key, if it is live and
    /// has one.
    ///
    /// `None` covers missing, expired, and never-expiring keys alike.
    ///
    /// # Errors
    ///
    /// As [`KvStore::get`].
    pub fn ttl(&self, key: &str) -> Result<Option<DateTime<Utc>>> {
        self.validate_key(key)?;
        Ok(self.mttl(&[key])?.pop().flatten())
    }

    /// Returns the expirations of all specified keys, in request order.
    ///
    /// # Errors
    ///
    /// As [`KvStore::get`].
    #[instrument(skip(self, keys), fields(operation = "mttl", count = keys.len()))]
    pub fn mttl(&self, keys: &[&str]) -> Result<Vec<Option<DateTime<Utc>>>> {
        self.validate_keys(keys)?;

        self.observed("mttl", || {
            let conn = self.connection()?;
            let rows = Statement::results_once(
                &*conn,
                &format!(
                    "SELECT key, expires_at FROM {} \
                     WHERE key IN :keys AND (expires_at IS NULL OR expires_at > :now)",
                    self.config.table_name
                ),
                vec![
                    ("keys", Self::key_list(keys)),
                    ("now", self.config.time_source.reference_time()),
                ],
            )?;

            let mut found: HashMap<String, Option<DateTime<Utc>>> =
                HashMap::with_capacity(rows.len());
            for row in rows {
                if let Some(key) = row.first().and_then(|v| v.as_text()) {
                    found.insert(
                        self.config.case_sensitivity.normalize(key),
                        row.get(1).and_then(parse_timestamp),
                    );
                }
            }

            Ok(keys
                .iter()
                .map(|key| {
                    found
                        .get(&self.config.case_sensitivity.normalize(key))
                        .copied()
                        .flatten()
                })
                .collect())
        })
    }

    // Shared plumbing

    pub(crate) fn connection(&self) -> Result<Arc<dyn Connection>> {
        require_connection(&*self.provider)
    }

    fn key_list(keys: &[&str]) -> BindValue {
        BindValue::list(keys.iter().copied())
    }

    fn expires_bind(expires: Option<DateTime<Utc>>) -> BindValue {
        expires.map_or_else(BindValue::null, BindValue::from)
    }

    /// Translates configured failure kinds into a single unavailable
    /// error; everything else propagates untouched.
    pub(crate) fn encapsulate<T>(&self, f: impl FnOnce() -> Result<T>) -> Result<T> {
        f().map_err(|e| {
            if self.config.encapsulated_errors.contains(&e.kind()) {
                Error::Unavailable {
                    cause: e.to_string(),
                }
            } else {
                e
            }
        })
    }

    /// Records operation count and latency around a store call.
    pub(crate) fn observed<T>(
        &self,
        operation: &'static str,
        f: impl FnOnce() -> Result<T>,
    ) -> Result<T> {
        let start = Instant::now();
        let result = f();
        let status = if result.is_ok() { "success" } else { "error" };
        metrics::record_operation(operation, start, status);
        result
    }

    // Validation, applied before any I/O

    pub(crate) fn validate_key(&self, key: &str) -> Result<()> {
        if key.len() > MAX_KEY_LENGTH {
            return Err(Error::InvalidInput(format!(
                "key of length {} exceeds maximum key length of {MAX_KEY_LENGTH}",
                key.len()
            )));
        }
        Ok(())
    }

    fn validate_value(&self, value: &[u8]) -> Result<()> {
        if value.len() > MAX_VALUE_LENGTH {
            return Err(Error::InvalidInput(format!(
                "value of length {} exceeds maximum value length of {MAX_VALUE_LENGTH}",
                value.len()
            )));
        }
        Ok(())
    }

    fn validate_keys(&self, keys: &[&str]) -> Result<()> {
        for key in keys {
            self.validate_key(key)?;
        }
        Ok(())
    }

    fn validate_entries(&self, entries: &[(&str, &[u8])]) -> Result<()> {
        for (key, value) in entries {
            self.validate_key(key)?;
            self.validate_value(value)?;
        }
        Ok(())
    }
}

/// Parses an engine-formatted timestamp column.
fn parse_timestamp(value: &crate::connection::SqlValue) -> Option<DateTime<Utc>> {
    value
        .as_text()
        .and_then(|s| NaiveDateTime::parse_from_str(s, TIMESTAMP_FORMAT).ok())
        .map(|naive| naive.and_utc())
}
