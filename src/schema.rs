//! Schema bootstrap for the key-value table.
//!
//! Migration tooling proper is the caller's concern; this is the minimal
//! glue that emits the persisted layout the store expects, honoring the
//! configured table name and case policy.

use crate::config::{CaseSensitivity, StoreConfig};
use crate::connection::Connection;
use crate::Result;

/// Creates the key-value table and its indexes if they do not exist.
///
/// The key column's collation is derived from
/// [`StoreConfig::case_sensitivity`], so lookups and the unique
/// constraint agree with the store's compare-time normalization.
///
/// # Errors
///
/// Returns an error if table or index creation fails.
///
/// # Examples
///
/// ```
/// use relkv::{SqliteConnection, StoreConfig};
///
/// let conn = SqliteConnection::in_memory().unwrap();
/// relkv::create_table(&conn, &StoreConfig::default()).unwrap();
/// // Idempotent
/// relkv::create_table(&conn, &StoreConfig::default()).unwrap();
/// ```
pub fn create_table(conn: &dyn Connection, config: &StoreConfig) -> Result<()> {
    let collate = match config.case_sensitivity {
        CaseSensitivity::Sensitive => "",
        CaseSensitivity::Insensitive => " COLLATE NOCASE",
    };

    conn.execute(&format!(
        "CREATE TABLE IF NOT EXISTS {table} (
            id INTEGER PRIMARY KEY,
            key TEXT NOT NULL{collate},
            value BLOB NOT NULL,
            created_at TEXT NOT NULL,
            updated_at TEXT NOT NULL,
            expires_at TEXT
        )",
        table = config.table_name
    ))?;

    create_indexes(conn, &config.table_name)?;
    Ok(())
}

/// Unique key index plus an expiration index for liveness filters and
/// pruning.
fn create_indexes(conn: &dyn Connection, table: &str) -> Result<()> {
    conn.execute(&format!(
        "CREATE UNIQUE INDEX IF NOT EXISTS index_{table}_on_key ON {table} (key)"
    ))?;
    conn.execute(&format!(
        "CREATE INDEX IF NOT EXISTS index_{table}_on_expires_at ON {table} (expires_at)"
    ))?;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::connection::SqliteConnection;

    #[test]
    fn test_create_table_is_idempotent() {
        let conn = SqliteConnection::in_memory().unwrap();
        create_table(&conn, &StoreConfig::default()).unwrap();
        create_table(&conn, &StoreConfig::default()).unwrap();

        conn.execute("INSERT INTO key_values (key, value, created_at, updated_at) VALUES ('k', x'00', '2023-01-01 00:00:00', '2023-01-01 00:00:00')")
            .unwrap();
    }

    #[test]
    fn test_unique_key_constraint() {
        let conn = SqliteConnection::in_memory().unwrap();
        create_table(&conn, &StoreConfig::default()).unwrap();

        conn.execute("INSERT INTO key_values (key, value, created_at, updated_at) VALUES ('k', x'00', '2023-01-01 00:00:00', '2023-01-01 00:00:00')")
            .unwrap();
        let err = conn
            .execute("INSERT INTO key_values (key, value, created_at, updated_at) VALUES ('k', x'01', '2023-01-01 00:00:00', '2023-01-01 00:00:00')")
            .unwrap_err();
        assert!(err.to_string().contains("UNIQUE"));
    }

    #[test]
    fn test_nocase_collation_under_insensitive_policy() {
        let conn = SqliteConnection::in_memory().unwrap();
        let config = StoreConfig {
            case_sensitivity: CaseSensitivity::Insensitive,
            ..StoreConfig::default()
        };
        create_table(&conn, &config).unwrap();

        conn.execute("INSERT INTO key_values (key, value, created_at, updated_at) VALUES ('Key', x'00', '2023-01-01 00:00:00', '2023-01-01 00:00:00')")
            .unwrap();
        // The unique index folds case, so 'KEY' collides with 'Key'
        let err = conn
            .execute("INSERT INTO key_values (key, value, created_at, updated_at) VALUES ('KEY', x'01', '2023-01-01 00:00:00', '2023-01-01 00:00:00')")
            .unwrap_err();
        assert!(err.to_string().contains("UNIQUE"));
    }

    #[test]
    fn test_custom_table_name() {
        let conn = SqliteConnection::in_memory().unwrap();
        let config = StoreConfig {
            table_name: "feature_flags".to_string(),
            ..StoreConfig::default()
        };
        create_table(&conn, &config).unwrap();

        conn.execute("INSERT INTO feature_flags (key, value, created_at, updated_at) VALUES ('k', x'00', '2023-01-01 00:00:00', '2023-01-01 00:00:00')")
            .unwrap();
    }
}
