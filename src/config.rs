//! Store configuration.
//!
//! Table name, error translation, and time policy form one immutable
//! value passed at construction time; there is no process-wide mutable
//! state to configure.

use crate::ErrorKind;
use crate::sql::BindValue;
use chrono::{DateTime, Utc};
use serde::Deserialize;

/// Configuration for a [`KvStore`](crate::KvStore).
///
/// # Examples
///
/// ```
/// use relkv::{CaseSensitivity, StoreConfig, TimeSource};
///
/// let config = StoreConfig {
///     table_name: "feature_flags".to_string(),
///     case_sensitivity: CaseSensitivity::Insensitive,
///     ..StoreConfig::default()
/// };
/// assert_eq!(config.time_source, TimeSource::Engine);
/// ```
#[derive(Debug, Clone, PartialEq, Deserialize)]
#[serde(default)]
pub struct StoreConfig {
    /// Name of the backing table.
    pub table_name: String,
    /// Where the reference time for expiration checks comes from.
    pub time_source: TimeSource,
    /// How stored keys are matched against requested keys.
    ///
    /// Must agree with the collation of the backing table's key column;
    /// [`create_table`](crate::create_table) derives the collation from
    /// this same value.
    pub case_sensitivity: CaseSensitivity,
    /// Error kinds observed during store execution that are translated
    /// into [`Error::Unavailable`](crate::Error::Unavailable).
    pub encapsulated_errors: Vec<ErrorKind>,
}

impl Default for StoreConfig {
    fn default() -> Self {
        Self {
            table_name: "key_values".to_string(),
            time_source: TimeSource::Engine,
            case_sensitivity: CaseSensitivity::Sensitive,
            encapsulated_errors: vec![ErrorKind::Engine],
        }
    }
}

/// Source of the reference time used to evaluate expiration.
///
/// Every query that tests liveness (`expires_at IS NULL OR expires_at >
/// :now`) binds `:now` from this policy, so all rows in a single statement
/// observe one consistent instant.
#[derive(Debug, Clone, Copy, PartialEq, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TimeSource {
    /// The engine's own clock, rendered as its now-expression.
    Engine,
    /// The caller's clock at the moment the statement is built.
    Local,
    /// A pinned instant, for deterministic testing under time mocking.
    Fixed(DateTime<Utc>),
}

impl TimeSource {
    /// Returns the bind value carrying this policy's reference time.
    #[must_use]
    pub fn reference_time(&self) -> BindValue {
        match self {
            Self::Engine => BindValue::now(),
            Self::Local => BindValue::Time(Utc::now()),
            Self::Fixed(instant) => BindValue::Time(*instant),
        }
    }
}

/// Key matching policy.
///
/// Affects lookup only: requested and stored keys are compared after
/// normalization, but stored key text is preserved on write.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum CaseSensitivity {
    /// Keys match byte-for-byte.
    #[default]
    Sensitive,
    /// Keys match after ASCII case folding, mirroring the engine's NOCASE
    /// collation.
    Insensitive,
}

impl CaseSensitivity {
    /// Normalizes a key for compare-time matching.
    #[must_use]
    pub fn normalize(self, key: &str) -> String {
        match self {
            Self::Sensitive => key.to_string(),
            Self::Insensitive => key.to_ascii_lowercase(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_config() {
        let config = StoreConfig::default();
        assert_eq!(config.table_name, "key_values");
        assert_eq!(config.time_source, TimeSource::Engine);
        assert_eq!(config.case_sensitivity, CaseSensitivity::Sensitive);
        assert_eq!(config.encapsulated_errors, vec![ErrorKind::Engine]);
    }

    #[test]
    fn test_reference_time_engine_is_raw_literal() {
        let bind = TimeSource::Engine.reference_time();
        assert!(matches!(bind, BindValue::Literal(_)));
    }

    #[test]
    fn test_reference_time_fixed_pins_instant() {
        let instant = Utc::now();
        let bind = TimeSource::Fixed(instant).reference_time();
        assert_eq!(bind, BindValue::Time(instant));
    }

    #[test]
    fn test_normalize_sensitive_preserves_case() {
        assert_eq!(CaseSensitivity::Sensitive.normalize("Foo"), "Foo");
    }

    #[test]
    fn test_normalize_insensitive_folds_ascii() {
        assert_eq!(CaseSensitivity::Insensitive.normalize("FoO"), "foo");
        // Non-ASCII is preserved, matching the engine's NOCASE collation
        assert_eq!(CaseSensitivity::Insensitive.normalize("Ü"), "Ü");
    }
}
