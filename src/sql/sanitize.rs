//! Literal rendering for bind values.
//!
//! This module is the single place where typed values become SQL text:
//! - quote doubling for text, safe for arbitrary content including
//!   embedded quotes and multi-byte sequences
//! - hex blob literals for arbitrary bytes, including NUL and non-UTF-8
//! - recursive parenthesized rendering for lists and row lists
//!
//! Everything here is a pure function; the timezone used for timestamp
//! rendering is an argument scoped to one call, never ambient state.

use crate::sql::{BindValue, Rows};
use crate::{Error, Result};
use chrono::{DateTime, Local, Utc};

/// Timezone applied when rendering a timestamp literal.
///
/// Applies only to the fragment being rendered; each call receives the
/// policy explicitly.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum RenderTimezone {
    /// Render timestamps in UTC.
    #[default]
    Utc,
    /// Render timestamps in the caller's local offset.
    Local,
}

/// Engine timestamp format, comparable lexicographically.
const TIMESTAMP_FORMAT: &str = "%Y-%m-%d %H:%M:%S";

/// Renders a bind value as the exact SQL literal substring for it.
///
/// # Errors
///
/// Returns [`Error::UnsanitizableValue`] for shapes with no literal form:
/// empty lists, nested lists, empty row lists, rows containing
/// non-scalars, and non-finite floats.
///
/// # Examples
///
/// ```
/// use relkv::sql::{BindValue, RenderTimezone, sanitize};
///
/// assert_eq!(sanitize(&BindValue::Int(42), RenderTimezone::Utc).unwrap(), "42");
/// assert_eq!(
///     sanitize(&BindValue::from("it's"), RenderTimezone::Utc).unwrap(),
///     "'it''s'"
/// );
/// ```
pub fn sanitize(value: &BindValue, timezone: RenderTimezone) -> Result<String> {
    match value {
        BindValue::Int(i) => Ok(i.to_string()),
        BindValue::Float(f) => {
            if f.is_finite() {
                Ok(f.to_string())
            } else {
                Err(Error::UnsanitizableValue {
                    description: format!("a non-finite float ({f})"),
                })
            }
        }
        BindValue::Text(s) => Ok(quote_text(s)),
        BindValue::Bytes(b) => Ok(blob_literal(b)),
        BindValue::Bool(b) => Ok(if *b { "1" } else { "0" }.to_string()),
        BindValue::Time(t) => Ok(quote_timestamp(*t, timezone)),
        BindValue::Literal(lit) => Ok(lit.value().to_string()),
        BindValue::List(items) => sanitize_list(items, timezone),
        BindValue::Rows(rows) => sanitize_rows(rows, timezone),
    }
}

/// Quotes text with embedded single quotes doubled.
///
/// # Examples
///
/// ```
/// use relkv::sql::quote_text;
///
/// assert_eq!(quote_text("bar"), "'bar'");
/// assert_eq!(quote_text("it's"), "'it''s'");
/// ```
#[must_use]
pub fn quote_text(s: &str) -> String {
    let mut quoted = String::with_capacity(s.len() + 2);
    quoted.push('\'');
    for c in s.chars() {
        if c == '\'' {
            quoted.push('\'');
        }
        quoted.push(c);
    }
    quoted.push('\'');
    quoted
}

/// Renders bytes as a hex blob literal.
///
/// Arbitrary byte content, including NUL and non-UTF-8 sequences, rounds
/// trips exactly through the engine in this form.
///
/// # Examples
///
/// ```
/// use relkv::sql::blob_literal;
///
/// assert_eq!(blob_literal(b"bar"), "x'626172'");
/// assert_eq!(blob_literal(&[0x00, 0xff]), "x'00ff'");
/// ```
#[must_use]
pub fn blob_literal(bytes: &[u8]) -> String {
    let mut hex = String::with_capacity(bytes.len() * 2 + 3);
    hex.push_str("x'");
    for byte in bytes {
        hex.push_str(&format!("{byte:02x}"));
    }
    hex.push('\'');
    hex
}

fn quote_timestamp(t: DateTime<Utc>, timezone: RenderTimezone) -> String {
    let formatted = match timezone {
        RenderTimezone::Utc => t.format(TIMESTAMP_FORMAT).to_string(),
        RenderTimezone::Local => t
            .with_timezone(&Local)
            .format(TIMESTAMP_FORMAT)
            .to_string(),
    };
    quote_text(&formatted)
}

fn sanitize_list(items: &[BindValue], timezone: RenderTimezone) -> Result<String> {
    if items.is_empty() {
        return Err(Error::UnsanitizableValue {
            description: "an empty list".to_string(),
        });
    }
    if items
        .iter()
        .any(|i| matches!(i, BindValue::List(_) | BindValue::Rows(_)))
    {
        return Err(Error::UnsanitizableValue {
            description: "a nested list".to_string(),
        });
    }

    let rendered: Result<Vec<String>> = items.iter().map(|i| sanitize(i, timezone)).collect();
    Ok(format!("({})", rendered?.join(", ")))
}

fn sanitize_rows(rows: &Rows, timezone: RenderTimezone) -> Result<String> {
    if rows.rows().is_empty() {
        return Err(Error::UnsanitizableValue {
            description: "an empty row list".to_string(),
        });
    }

    let rendered: Result<Vec<String>> = rows
        .rows()
        .iter()
        .map(|row| sanitize_list(row, timezone))
        .collect();
    Ok(rendered?.join(", "))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::sql::Literal;
    use chrono::TimeZone;

    fn render(value: &BindValue) -> Result<String> {
        sanitize(value, RenderTimezone::Utc)
    }

    #[test]
    fn test_integers_render_bare() {
        assert_eq!(render(&BindValue::Int(42)).unwrap(), "42");
        assert_eq!(render(&BindValue::Int(-7)).unwrap(), "-7");
    }

    #[test]
    fn test_floats_render_bare_and_reject_non_finite() {
        assert_eq!(render(&BindValue::Float(1.5)).unwrap(), "1.5");

        let err = render(&BindValue::Float(f64::NAN)).unwrap_err();
        assert!(matches!(err, Error::UnsanitizableValue { .. }));
        let err = render(&BindValue::Float(f64::INFINITY)).unwrap_err();
        assert!(matches!(err, Error::UnsanitizableValue { .. }));
    }

    #[test]
    fn test_text_escaping() {
        assert_eq!(render(&BindValue::from("bar")).unwrap(), "'bar'");
        assert_eq!(render(&BindValue::from("it's")).unwrap(), "'it''s'");
        assert_eq!(render(&BindValue::from("a''b")).unwrap(), "'a''''b'");
        // Multi-byte content passes through unharmed
        assert_eq!(render(&BindValue::from("héllo")).unwrap(), "'héllo'");
    }

    #[test]
    fn test_injection_attempt_is_inert() {
        let rendered = render(&BindValue::from("'; DROP TABLE key_values; --")).unwrap();
        assert_eq!(rendered, "'''; DROP TABLE key_values; --'");
    }

    #[test]
    fn test_booleans_render_as_engine_tokens() {
        assert_eq!(render(&BindValue::Bool(true)).unwrap(), "1");
        assert_eq!(render(&BindValue::Bool(false)).unwrap(), "0");
    }

    #[test]
    fn test_bytes_render_as_hex_blob() {
        assert_eq!(render(&BindValue::from(b"bar".as_slice())).unwrap(), "x'626172'");
        assert_eq!(
            render(&BindValue::Bytes(vec![0x00, 0x01, 0xff])).unwrap(),
            "x'0001ff'"
        );
    }

    #[test]
    fn test_raw_literal_renders_verbatim() {
        assert_eq!(render(&BindValue::null()).unwrap(), "NULL");
        assert_eq!(
            render(&BindValue::Literal(Literal::new("datetime('now')"))).unwrap(),
            "datetime('now')"
        );
    }

    #[test]
    fn test_timestamp_renders_quoted_utc() {
        let t = Utc.with_ymd_and_hms(2023, 4, 5, 6, 7, 8).unwrap();
        assert_eq!(render(&BindValue::Time(t)).unwrap(), "'2023-04-05 06:07:08'");
    }

    #[test]
    fn test_timestamp_local_override_is_scoped_to_the_call() {
        let t = Utc.with_ymd_and_hms(2023, 4, 5, 6, 7, 8).unwrap();
        let expected = t.with_timezone(&Local).format(TIMESTAMP_FORMAT).to_string();
        assert_eq!(
            sanitize(&BindValue::Time(t), RenderTimezone::Local).unwrap(),
            format!("'{expected}'")
        );
        // The next call with no override is back to UTC
        assert_eq!(render(&BindValue::Time(t)).unwrap(), "'2023-04-05 06:07:08'");
    }

    #[test]
    fn test_list_renders_parenthesized() {
        let list = BindValue::list(["foo", "bar"]);
        assert_eq!(render(&list).unwrap(), "('foo', 'bar')");

        let mixed = BindValue::List(vec![BindValue::Int(1), BindValue::from("x")]);
        assert_eq!(render(&mixed).unwrap(), "(1, 'x')");
    }

    #[test]
    fn test_empty_list_is_an_error() {
        let err = render(&BindValue::List(vec![])).unwrap_err();
        assert!(matches!(err, Error::UnsanitizableValue { .. }));
        assert_eq!(err.to_string(), "can't sanitize an empty list");
    }

    #[test]
    fn test_nested_list_is_an_error() {
        let nested = BindValue::List(vec![BindValue::list([1_i64])]);
        let err = render(&nested).unwrap_err();
        assert_eq!(err.to_string(), "can't sanitize a nested list");
    }

    #[test]
    fn test_rows_render_as_tuples() {
        let rows = Rows::new(vec![
            vec![BindValue::Int(1), BindValue::Int(2)],
            vec![BindValue::Int(3), BindValue::Int(4)],
        ]);
        assert_eq!(render(&BindValue::Rows(rows)).unwrap(), "(1, 2), (3, 4)");
    }

    #[test]
    fn test_empty_rows_and_empty_row_are_errors() {
        let err = render(&BindValue::Rows(Rows::new(vec![]))).unwrap_err();
        assert!(matches!(err, Error::UnsanitizableValue { .. }));

        let rows = Rows::new(vec![vec![BindValue::Int(1)], vec![]]);
        let err = render(&BindValue::Rows(rows)).unwrap_err();
        assert!(matches!(err, Error::UnsanitizableValue { .. }));
    }

    #[test]
    fn test_row_with_nested_list_is_an_error() {
        let rows = Rows::new(vec![vec![BindValue::Int(1), BindValue::list([2_i64])]]);
        let err = render(&BindValue::Rows(rows)).unwrap_err();
        assert_eq!(err.to_string(), "can't sanitize a nested list");
    }
}
