//! Typed bind values for the query builder.
//!
//! A [`BindValue`] is substituted into a query template at a named
//! `:placeholder`. The union is closed: every supported type has an exact
//! rendering rule in [`sanitize`](crate::sql::sanitize), and anything
//! outside the union is unrepresentable rather than coerced.
//!
//! A SQL `NULL` is a *value* here ([`Literal::null`]), never an absent
//! bind: absence always fails with
//! [`UnresolvedBind`](crate::Error::UnresolvedBind).

use chrono::{DateTime, Utc};

/// A typed value bound into a query at a named placeholder.
#[derive(Debug, Clone, PartialEq)]
pub enum BindValue {
    /// Rendered as a plain decimal digit sequence.
    Int(i64),
    /// Rendered as decimal text; must be finite.
    Float(f64),
    /// Rendered quoted, with embedded quotes escaped.
    Text(String),
    /// Rendered as a hex blob literal, byte-exact for arbitrary content.
    Bytes(Vec<u8>),
    /// Rendered as the engine's true/false tokens.
    Bool(bool),
    /// Rendered as a quoted engine-formatted timestamp.
    Time(DateTime<Utc>),
    /// Rendered verbatim, unescaped. Caller-trusted.
    Literal(Literal),
    /// Rendered as a parenthesized, comma-joined list of scalars.
    ///
    /// Empty lists and nested lists fail sanitization.
    List(Vec<BindValue>),
    /// Rendered as comma-joined parenthesized tuples, for multi-row
    /// insert.
    Rows(Rows),
}

impl BindValue {
    /// The SQL `NULL` literal as a usable bind value.
    #[must_use]
    pub fn null() -> Self {
        Self::Literal(Literal::null())
    }

    /// The engine's now-expression as a usable bind value.
    #[must_use]
    pub fn now() -> Self {
        Self::Literal(Literal::now())
    }

    /// Builds a list bind from anything yielding convertible items.
    ///
    /// # Examples
    ///
    /// ```
    /// use relkv::BindValue;
    ///
    /// let keys = BindValue::list(["foo", "bar"]);
    /// assert!(matches!(keys, BindValue::List(ref items) if items.len() == 2));
    /// ```
    pub fn list<I, T>(items: I) -> Self
    where
        I: IntoIterator<Item = T>,
        T: Into<Self>,
    {
        Self::List(items.into_iter().map(Into::into).collect())
    }
}

impl From<i64> for BindValue {
    fn from(value: i64) -> Self {
        Self::Int(value)
    }
}

impl From<i32> for BindValue {
    fn from(value: i32) -> Self {
        Self::Int(i64::from(value))
    }
}

impl From<f64> for BindValue {
    fn from(value: f64) -> Self {
        Self::Float(value)
    }
}

impl From<&str> for BindValue {
    fn from(value: &str) -> Self {
        Self::Text(value.to_string())
    }
}

impl From<String> for BindValue {
    fn from(value: String) -> Self {
        Self::Text(value)
    }
}

impl From<&[u8]> for BindValue {
    fn from(value: &[u8]) -> Self {
        Self::Bytes(value.to_vec())
    }
}

impl From<Vec<u8>> for BindValue {
    fn from(value: Vec<u8>) -> Self {
        Self::Bytes(value)
    }
}

impl From<bool> for BindValue {
    fn from(value: bool) -> Self {
        Self::Bool(value)
    }
}

impl From<DateTime<Utc>> for BindValue {
    fn from(value: DateTime<Utc>) -> Self {
        Self::Time(value)
    }
}

impl From<Literal> for BindValue {
    fn from(value: Literal) -> Self {
        Self::Literal(value)
    }
}

impl From<Rows> for BindValue {
    fn from(value: Rows) -> Self {
        Self::Rows(value)
    }
}

/// A raw SQL literal.
///
/// The value is inserted into SQL text without being escaped, so use this
/// with extreme caution. It exists so SQL expressions (`NULL`, the engine
/// now-expression) can travel through the bind map like any other value.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Literal {
    value: String,
}

impl Literal {
    /// Wraps a string as a raw literal.
    pub fn new(value: impl Into<String>) -> Self {
        Self {
            value: value.into(),
        }
    }

    /// The `NULL` literal.
    #[must_use]
    pub fn null() -> Self {
        Self::new("NULL")
    }

    /// The engine's now-expression, in the same `YYYY-MM-DD HH:MM:SS`
    /// shape the sanitizer renders timestamps in.
    #[must_use]
    pub fn now() -> Self {
        Self::new("datetime('now')")
    }

    /// The literal's verbatim SQL text.
    #[must_use]
    pub fn value(&self) -> &str {
        &self.value
    }
}

/// A list of rows for multi-row insertion.
///
/// Construction is type-shaped: only lists of lists are representable,
/// so a non-list row is a compile error rather than a runtime one. Row
/// contents are still validated at sanitize time (rows must be non-empty
/// and scalar-only).
#[derive(Debug, Clone, PartialEq)]
pub struct Rows {
    rows: Vec<Vec<BindValue>>,
}

impl Rows {
    /// Wraps row data for insertion.
    #[must_use]
    pub fn new(rows: Vec<Vec<BindValue>>) -> Self {
        Self { rows }
    }

    /// The wrapped rows.
    #[must_use]
    pub fn rows(&self) -> &[Vec<BindValue>] {
        &self.rows
    }
}
