//! Parameterized SQL construction.
//!
//! This module provides [`Statement`], a query builder that assembles SQL
//! text incrementally from string fragments and named `:placeholder`
//! tokens, substituting each placeholder with a sanitized literal drawn
//! from a typed [`BindValue`]. Construction fails fast: the first
//! unresolved bind or unsanitizable value aborts before any text reaches
//! the engine.
//!
//! Placeholder resolution is immediate, not deferred. Each appended
//! fragment is resolved against the bind values in scope at that moment;
//! later `bind` calls never retroactively affect earlier fragments.
//!
//! Execution is terminal: the first execution memoizes its outcome and
//! freezes the statement against further mutation.

mod sanitize;
mod value;

pub use sanitize::{RenderTimezone, blob_literal, quote_text, sanitize};
pub use value::{BindValue, Literal, Rows};

use crate::connection::{Connection, Row, SqlValue};
use crate::{Error, Result};
use once_cell::sync::Lazy;
use regex::Regex;
use std::collections::HashMap;

/// Matches a `:name` bind token.
static BIND_TOKEN: Lazy<Regex> =
    Lazy::new(|| Regex::new(":[a-z][a-z0-9_]*").expect("hard-coded regex"));

/// Matches the row-counting marker on a SELECT.
static COUNT_MARKER: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"(?i)\ASELECT\s+/\*\+\s*COUNT_OVER_LIMIT\s*\*/").expect("hard-coded regex")
});

/// Matches a trailing LIMIT/OFFSET clause, for the supplementary count.
static TRAILING_LIMIT: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"(?is)\s+LIMIT\s+\d+(\s*,\s*\d+|\s+OFFSET\s+\d+)?\s*\z").expect("hard-coded regex")
});

/// Memoized outcome of a statement's single execution.
#[derive(Debug, Default)]
struct Execution {
    rows: Vec<Row>,
    affected_rows: u64,
    last_insert_id: Option<i64>,
    found_rows: Option<u64>,
}

/// An incrementally built, single-use SQL statement.
///
/// # Examples
///
/// ```rust,ignore
/// use relkv::{BindValue, Statement};
///
/// let mut stmt = Statement::with_sql(
///     &*conn,
///     "SELECT value FROM key_values WHERE key IN :keys",
///     vec![("keys", BindValue::list(["foo", "bar"]))],
/// )?;
/// stmt.add_unless_empty("LIMIT 1")?;
/// let rows = stmt.results()?;
/// ```
pub struct Statement<'conn> {
    conn: &'conn dyn Connection,
    query: String,
    binds: HashMap<String, BindValue>,
    timezone: RenderTimezone,
    executed: Option<Execution>,
}

impl std::fmt::Debug for Statement<'_> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Statement")
            .field("query", &self.query)
            .field("binds", &self.binds)
            .field("timezone", &self.timezone)
            .field("executed", &self.executed)
            .finish_non_exhaustive()
    }
}

impl<'conn> Statement<'conn> {
    /// Creates an empty statement against a borrowed connection.
    #[must_use]
    pub fn new(conn: &'conn dyn Connection) -> Self {
        Self {
            conn,
            query: String::new(),
            binds: HashMap::new(),
            timezone: RenderTimezone::default(),
            executed: None,
        }
    }

    /// Creates a statement with initial text and persistent binds.
    ///
    /// # Errors
    ///
    /// Fails as [`Statement::add`] does.
    pub fn with_sql(
        conn: &'conn dyn Connection,
        sql: &str,
        binds: Vec<(&str, BindValue)>,
    ) -> Result<Self> {
        let mut stmt = Self::new(conn);
        stmt.binds = binds
            .into_iter()
            .map(|(name, value)| (name.to_string(), value))
            .collect();
        stmt.add(sql)?;
        Ok(stmt)
    }

    /// Sets the timezone used to render timestamp binds in fragments
    /// added from here on.
    #[must_use]
    pub const fn with_timezone(mut self, timezone: RenderTimezone) -> Self {
        self.timezone = timezone;
        self
    }

    /// The SQL text accumulated so far.
    #[must_use]
    pub fn query(&self) -> &str {
        &self.query
    }

    /// Appends a fragment, resolving every `:name` token immediately
    /// against the persistent bind map.
    ///
    /// No-op on an empty fragment. Outer whitespace is stripped and a
    /// single space separates fragments.
    ///
    /// # Errors
    ///
    /// [`Error::UnresolvedBind`] for a token with no value in scope,
    /// [`Error::UnsanitizableValue`] for a value with no literal form,
    /// [`Error::StatementFrozen`] after execution.
    pub fn add(&mut self, sql: &str) -> Result<&mut Self> {
        self.add_with(sql, vec![])
    }

    /// [`Statement::add`], with extra binds that apply to this fragment
    /// only and shadow the persistent map.
    ///
    /// # Errors
    ///
    /// As [`Statement::add`].
    pub fn add_with(&mut self, sql: &str, extras: Vec<(&str, BindValue)>) -> Result<&mut Self> {
        if self.executed.is_some() {
            return Err(Error::StatementFrozen);
        }
        let fragment = sql.trim();
        if fragment.is_empty() {
            return Ok(self);
        }

        let extras: HashMap<&str, BindValue> = extras.into_iter().collect();
        let resolved = self.interpolate(fragment, &extras)?;

        if !self.query.is_empty() {
            self.query.push(' ');
        }
        self.query.push_str(&resolved);

        Ok(self)
    }

    /// Appends a fragment unless the query built so far is empty.
    ///
    /// Use this for clauses that only make sense after a mandatory base
    /// clause exists, like UNION between conditionally generated SELECTs.
    ///
    /// # Errors
    ///
    /// As [`Statement::add`].
    pub fn add_unless_empty(&mut self, sql: &str) -> Result<&mut Self> {
        self.add_unless_empty_with(sql, vec![])
    }

    /// [`Statement::add_unless_empty`] with fragment-local binds.
    ///
    /// # Errors
    ///
    /// As [`Statement::add`].
    pub fn add_unless_empty_with(
        &mut self,
        sql: &str,
        extras: Vec<(&str, BindValue)>,
    ) -> Result<&mut Self> {
        if self.query.is_empty() {
            return Ok(self);
        }
        self.add_with(sql, extras)
    }

    /// Merges additional bind values for use by subsequent `add` calls.
    ///
    /// Never retroactive: fragments already appended keep their resolved
    /// text.
    ///
    /// # Errors
    ///
    /// [`Error::StatementFrozen`] after execution.
    pub fn bind(&mut self, binds: Vec<(&str, BindValue)>) -> Result<&mut Self> {
        if self.executed.is_some() {
            return Err(Error::StatementFrozen);
        }
        for (name, value) in binds {
            self.binds.insert(name.to_string(), value);
        }
        Ok(self)
    }

    /// Replaces `:name` tokens with sanitized literals, extras first.
    fn interpolate(&self, fragment: &str, extras: &HashMap<&str, BindValue>) -> Result<String> {
        let mut out = String::with_capacity(fragment.len());
        let mut last_end = 0;

        for token in BIND_TOKEN.find_iter(fragment) {
            let name = &fragment[token.start() + 1..token.end()];
            let value = extras
                .get(name)
                .or_else(|| self.binds.get(name))
                .ok_or_else(|| Error::UnresolvedBind {
                    name: name.to_string(),
                })?;

            out.push_str(&fragment[last_end..token.start()]);
            out.push_str(&sanitize(value, self.timezone)?);
            last_end = token.end();
        }
        out.push_str(&fragment[last_end..]);

        Ok(out)
    }

    /// Executes once and memoizes; later calls are no-ops.
    ///
    /// Dispatches on the statement's leading keyword: DELETE/UPDATE
    /// capture the affected-row count, INSERT additionally captures the
    /// generated id, SELECT materializes rows, anything else is generic
    /// execution.
    fn execute(&mut self) -> Result<()> {
        if self.executed.is_some() {
            return Ok(());
        }

        let keyword = self
            .query
            .split_whitespace()
            .next()
            .map(str::to_ascii_lowercase)
            .unwrap_or_default();

        let mut execution = Execution::default();
        match keyword.as_str() {
            "delete" | "update" => {
                execution.affected_rows = self.conn.execute(&self.query)?;
            }
            "insert" => {
                execution.affected_rows = self.conn.execute(&self.query)?;
                execution.last_insert_id = Some(self.conn.last_insert_id()?);
            }
            "select" => {
                execution.rows = self.conn.select(&self.query)?;
                if COUNT_MARKER.is_match(&self.query) {
                    execution.found_rows = Some(self.retrieve_found_rows()?);
                }
            }
            _ => {
                execution.affected_rows = self.conn.execute(&self.query)?;
            }
        }

        self.executed = Some(execution);
        Ok(())
    }

    /// Supplementary count for the row-counting marker: the statement
    /// re-runs under COUNT(*) with any trailing LIMIT/OFFSET stripped.
    fn retrieve_found_rows(&self) -> Result<u64> {
        let unlimited = TRAILING_LIMIT.replace(&self.query, "");
        let count_sql = format!("SELECT COUNT(*) FROM ({unlimited})");
        let rows = self.conn.select(&count_sql)?;
        let count = rows
            .first()
            .and_then(|row| row.first())
            .and_then(SqlValue::as_integer)
            .unwrap_or(0);
        Ok(count.max(0) as u64)
    }

    /// Executes (if not yet executed) and returns the memoized rows.
    ///
    /// Only SELECT statements materialize rows; for write statements the
    /// slice is empty and the metadata accessors carry the outcome.
    ///
    /// # Errors
    ///
    /// Any engine failure from the single underlying execution.
    pub fn results(&mut self) -> Result<&[Row]> {
        self.execute()?;
        Ok(self
            .executed
            .as_ref()
            .map_or(&[], |execution| execution.rows.as_slice()))
    }

    /// Executes, ignoring results. Useful for INSERTs, UPDATEs, and
    /// DELETEs where only the metadata matters.
    ///
    /// # Errors
    ///
    /// As [`Statement::results`].
    pub fn run(&mut self) -> Result<&mut Self> {
        self.execute()?;
        Ok(self)
    }

    /// First row of results.
    ///
    /// # Errors
    ///
    /// As [`Statement::results`].
    pub fn row(&mut self) -> Result<Option<&Row>> {
        self.execute()?;
        Ok(self.executed.as_ref().and_then(|e| e.rows.first()))
    }

    /// First column of the first row of results.
    ///
    /// # Errors
    ///
    /// As [`Statement::results`].
    pub fn value(&mut self) -> Result<Option<&SqlValue>> {
        Ok(self.row()?.and_then(|row| row.first()))
    }

    /// Is there a non-NULL value?
    ///
    /// # Errors
    ///
    /// As [`Statement::results`].
    pub fn value_present(&mut self) -> Result<bool> {
        Ok(self.value()?.is_some_and(|v| !v.is_null()))
    }

    /// First column of every row of results.
    ///
    /// # Errors
    ///
    /// As [`Statement::results`].
    pub fn values(&mut self) -> Result<Vec<SqlValue>> {
        self.execute()?;
        Ok(self
            .executed
            .as_ref()
            .map(|e| {
                e.rows
                    .iter()
                    .map(|row| row.first().cloned().unwrap_or(SqlValue::Null))
                    .collect()
            })
            .unwrap_or_default())
    }

    /// Affected-row count of the execution.
    ///
    /// # Errors
    ///
    /// As [`Statement::results`].
    pub fn affected_rows(&mut self) -> Result<u64> {
        self.execute()?;
        Ok(self.executed.as_ref().map_or(0, |e| e.affected_rows))
    }

    /// Generated id of the most recent insert-class statement, falling
    /// back to the connection when this statement was not an INSERT.
    ///
    /// # Errors
    ///
    /// As [`Statement::results`].
    pub fn last_insert_id(&mut self) -> Result<i64> {
        self.execute()?;
        match self.executed.as_ref().and_then(|e| e.last_insert_id) {
            Some(id) => Ok(id),
            None => self.conn.last_insert_id(),
        }
    }

    /// The un-limited match count for a marked SELECT.
    ///
    /// # Errors
    ///
    /// [`Error::InvalidInput`] when the statement does not begin with the
    /// `COUNT_OVER_LIMIT` marker.
    pub fn found_rows(&mut self) -> Result<u64> {
        self.execute()?;
        self.executed
            .as_ref()
            .and_then(|e| e.found_rows)
            .ok_or_else(|| {
                Error::InvalidInput("no COUNT_OVER_LIMIT marker clause present".to_string())
            })
    }

    /// Builds and executes a statement, ignoring results.
    ///
    /// Returns the executed statement so metadata accessors remain
    /// available.
    ///
    /// # Errors
    ///
    /// As [`Statement::results`].
    pub fn run_once(
        conn: &'conn dyn Connection,
        sql: &str,
        binds: Vec<(&str, BindValue)>,
    ) -> Result<Self> {
        let mut stmt = Self::with_sql(conn, sql, binds)?;
        stmt.execute()?;
        Ok(stmt)
    }

    /// Builds and executes a statement, returning its rows.
    ///
    /// # Errors
    ///
    /// As [`Statement::results`].
    pub fn results_once(
        conn: &dyn Connection,
        sql: &str,
        binds: Vec<(&str, BindValue)>,
    ) -> Result<Vec<Row>> {
        let mut stmt = Statement::with_sql(conn, sql, binds)?;
        stmt.execute()?;
        Ok(stmt.executed.map(|e| e.rows).unwrap_or_default())
    }

    /// Builds and executes a statement, returning the first column of
    /// the first row.
    ///
    /// # Errors
    ///
    /// As [`Statement::results`].
    pub fn value_once(
        conn: &dyn Connection,
        sql: &str,
        binds: Vec<(&str, BindValue)>,
    ) -> Result<Option<SqlValue>> {
        let mut stmt = Statement::with_sql(conn, sql, binds)?;
        Ok(stmt.value()?.cloned())
    }

    /// Builds and executes a statement, returning the first column of
    /// every row.
    ///
    /// # Errors
    ///
    /// As [`Statement::results`].
    pub fn values_once(
        conn: &dyn Connection,
        sql: &str,
        binds: Vec<(&str, BindValue)>,
    ) -> Result<Vec<SqlValue>> {
        let mut stmt = Statement::with_sql(conn, sql, binds)?;
        stmt.values()
    }
}
