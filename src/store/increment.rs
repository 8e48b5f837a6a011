//! Atomic increment.
//!
//! A single conditional upsert either seeds a fresh row at the requested
//! amount, adds to a live numeric value, or replaces a dead row's value
//! outright; a live non-numeric value is left untouched and surfaces as
//! [`InvalidValue`](crate::Error::InvalidValue). The applied value is
//! read back inside the same transaction on the same handle, so the
//! whole operation is one logical step to any concurrent observer.

use crate::connection::with_transaction;
use crate::sql::{BindValue, Statement};
use crate::store::KvStore;
use crate::{Error, Result};
use chrono::{DateTime, Utc};
use tracing::instrument;

/// Tests whether the stored value round-trips as canonical integer
/// text. Non-canonical forms (leading zeros, signs with whitespace,
/// floats) fail the round trip and count as non-numeric.
const NUMERIC_CHECK: &str = "CAST(value AS TEXT) = CAST(CAST(value AS INTEGER) AS TEXT)";

/// True for a row whose expiration is unset or still in the future.
const LIVE_CHECK: &str = "(expires_at IS NULL OR expires_at > :now)";

/// Options for [`KvStore::increment`].
///
/// # Examples
///
/// ```
/// use relkv::IncrementOptions;
///
/// let opts = IncrementOptions {
///     amount: 5,
///     ..IncrementOptions::default()
/// };
/// assert_eq!(opts.amount, 5);
/// assert!(!opts.touch_on_insert);
/// ```
#[derive(Debug, Clone, Copy)]
pub struct IncrementOptions {
    /// Amount to add; must be a non-zero integer.
    pub amount: i64,
    /// Expiration applied per the touch policy.
    pub expires: Option<DateTime<Utc>>,
    /// When set, an update refreshes `expires_at` only if the prior
    /// expiration had already lapsed; otherwise an update with an
    /// expiration refreshes it unconditionally. Requires `expires`.
    pub touch_on_insert: bool,
}

impl Default for IncrementOptions {
    fn default() -> Self {
        Self {
            amount: 1,
            expires: None,
            touch_on_insert: false,
        }
    }
}

impl KvStore {
    /// Atomically increments the value of the specified key, returning
    /// the post-increment value.
    ///
    /// Outcomes, indistinguishable from one atomic step to concurrent
    /// observers:
    /// - no row: a fresh row is seeded at `amount`
    /// - live numeric row: `amount` is added
    /// - dead row: the value is replaced with `amount` (never added to)
    /// - live non-numeric row: untouched, [`Error::InvalidValue`]
    ///
    /// With no `expires`, an update never changes the existing
    /// expiration.
    ///
    /// # Errors
    ///
    /// [`Error::InvalidInput`] for a zero amount or `touch_on_insert`
    /// without `expires`; [`Error::InvalidValue`] as above;
    /// [`Error::Unavailable`] for configured transient failures.
    ///
    /// # Examples
    ///
    /// ```rust,ignore
    /// let hits = kv.increment("hits", IncrementOptions::default())?;
    /// assert_eq!(hits, 1);
    /// let hits = kv.increment("hits", IncrementOptions { amount: 2, ..Default::default() })?;
    /// assert_eq!(hits, 3);
    /// ```
    #[instrument(skip(self), fields(operation = "increment", key = %key))]
    pub fn increment(&self, key: &str, options: IncrementOptions) -> Result<i64> {
        self.validate_key(key)?;
        if options.amount == 0 {
            return Err(Error::InvalidInput(
                "amount must be a non-zero integer".to_string(),
            ));
        }
        if options.touch_on_insert && options.expires.is_none() {
            return Err(Error::InvalidInput(
                "touch_on_insert requires an expiration".to_string(),
            ));
        }

        let applied = self.observed("increment", || {
            self.encapsulate(|| {
                let conn = self.connection()?;
                with_transaction(&*conn, || {
                    Statement::run_once(&*conn, &self.increment_sql(), self.increment_binds(key, options))?;
                    Statement::value_once(
                        &*conn,
                        &format!(
                            "SELECT CAST(value AS TEXT) FROM {} WHERE key = :key",
                            self.config().table_name
                        ),
                        vec![("key", BindValue::from(key))],
                    )
                })
            })
        })?;

        let text = applied.ok_or_else(|| Error::Engine {
            operation: "increment".to_string(),
            cause: "row missing after upsert".to_string(),
        })?;

        // Mirror the engine-side numeric test exactly: the value must
        // round-trip as canonical integer text. A bare parse would accept
        // forms like "007" that the upsert's conditional left untouched.
        text.as_text()
            .and_then(|t| t.parse::<i64>().ok().filter(|n| n.to_string() == t))
            .ok_or_else(|| Error::InvalidValue {
                key: key.to_string(),
            })
    }

    /// The conditional upsert. Every SET expression evaluates against
    /// the pre-update row, so the three branch tests stay consistent
    /// across columns.
    fn increment_sql(&self) -> String {
        format!(
            "INSERT INTO {table} (key, value, created_at, updated_at, expires_at) \
             VALUES (:key, CAST(:amount AS TEXT), :now, :now, :expires) \
             ON CONFLICT(key) DO UPDATE SET \
               value = CASE \
                 WHEN {LIVE_CHECK} THEN \
                   CASE WHEN {NUMERIC_CHECK} \
                        THEN CAST(CAST(value AS INTEGER) + :amount AS TEXT) \
                        ELSE value END \
                 ELSE CAST(:amount AS TEXT) \
               END, \
               updated_at = CASE \
                 WHEN {LIVE_CHECK} AND NOT ({NUMERIC_CHECK}) THEN updated_at \
                 ELSE :now \
               END, \
               expires_at = CASE \
                 WHEN {LIVE_CHECK} THEN \
                   CASE WHEN {NUMERIC_CHECK} \
                        THEN (CASE WHEN :touch_update THEN :expires ELSE expires_at END) \
                        ELSE expires_at END \
                 ELSE :expires \
               END",
            table = self.config().table_name
        )
    }

    fn increment_binds(&self, key: &str, options: IncrementOptions) -> Vec<(&'static str, BindValue)> {
        // A live update refreshes the expiration only when one was given
        // and touch_on_insert does not restrict the refresh to inserts
        // and lapsed rows.
        let touch_update = options.expires.is_some() && !options.touch_on_insert;
        vec![
            ("key", BindValue::from(key)),
            ("amount", BindValue::Int(options.amount)),
            ("now", self.config().time_source.reference_time()),
            ("expires", Self::expires_bind(options.expires)),
            ("touch_update", BindValue::Bool(touch_update)),
        ]
    }
}
