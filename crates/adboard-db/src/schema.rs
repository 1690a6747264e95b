//! Embedded table definitions, created idempotently on startup.
//!
//! Each table is declared with `CREATE TABLE IF NOT EXISTS`. Tables that
//! already exist are left untouched, including their data and any column
//! changes made outside this crate.

use rusqlite::Connection;
use thiserror::Error;

/// A single embedded table definition.
pub struct TableDef {
    /// Table name as it appears in `sqlite_master`.
    pub name: &'static str,
    sql: &'static str,
}

/// All tables owned by the service, in creation order.
pub const TABLES: &[TableDef] = &[
    TableDef {
        name: "advertisements",
        sql: include_str!("schema/advertisements.sql"),
    },
    TableDef {
        name: "users",
        sql: include_str!("schema/users.sql"),
    },
];

/// Errors that can occur while creating the schema.
#[derive(Debug, Error)]
pub enum SchemaError {
    /// A table definition failed to execute.
    #[error("creating table '{name}' failed: {source}")]
    CreateFailed {
        /// The table that could not be created.
        name: String,
        /// The underlying SQLite error.
        source: rusqlite::Error,
    },

    /// Failed to inspect existing tables or commit the schema transaction.
    #[error("failed to inspect schema state: {0}")]
    StateQuery(rusqlite::Error),
}

/// Creates every missing table in a single transaction.
///
/// Returns the number of tables that did not exist before the call.
///
/// # Errors
///
/// Returns `SchemaError` if a definition fails to execute; in that case no
/// table from this call is kept.
pub fn init_schema(conn: &Connection) -> Result<usize, SchemaError> {
    init_schema_from_list(conn, TABLES)
}

fn init_schema_from_list(conn: &Connection, tables: &[TableDef]) -> Result<usize, SchemaError> {
    let tx = conn
        .unchecked_transaction()
        .map_err(SchemaError::StateQuery)?;

    let mut created = 0;

    for table in tables {
        let exists: bool = tx
            .query_row(
                "SELECT EXISTS(SELECT 1 FROM sqlite_master WHERE type = 'table' AND name = ?1)",
                [table.name],
                |row| row.get(0),
            )
            .map_err(SchemaError::StateQuery)?;

        if exists {
            tracing::debug!(table = table.name, "table already exists, skipping");
            continue;
        }

        tracing::info!(table = table.name, "creating table");

        tx.execute_batch(table.sql)
            .map_err(|e| SchemaError::CreateFailed {
                name: table.name.to_string(),
                source: e,
            })?;

        created += 1;
    }

    tx.commit().map_err(SchemaError::StateQuery)?;

    Ok(created)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn table_exists(conn: &Connection, name: &str) -> bool {
        conn.query_row(
            "SELECT EXISTS(SELECT 1 FROM sqlite_master WHERE type = 'table' AND name = ?1)",
            [name],
            |row| row.get(0),
        )
        .expect("should query sqlite_master")
    }

    #[test]
    fn init_schema_on_fresh_db() {
        let conn = Connection::open_in_memory().expect("should open in-memory db");
        let created = init_schema(&conn).expect("schema init should succeed");
        assert_eq!(created, 2);

        assert!(table_exists(&conn, "advertisements"));
        assert!(table_exists(&conn, "users"));
    }

    #[test]
    fn init_schema_idempotent() {
        let conn = Connection::open_in_memory().expect("should open in-memory db");

        let first = init_schema(&conn).expect("first run should succeed");
        assert_eq!(first, 2);

        conn.execute("INSERT INTO advertisements (title) VALUES ('kept')", [])
            .expect("insert should succeed");

        let second = init_schema(&conn).expect("second run should succeed");
        assert_eq!(second, 0, "no tables left to create");

        let count: i64 = conn
            .query_row("SELECT COUNT(*) FROM advertisements", [], |row| row.get(0))
            .expect("should count rows");
        assert_eq!(count, 1, "existing rows survive re-initialization");
    }

    #[test]
    fn advertisement_title_is_unique() {
        let conn = Connection::open_in_memory().expect("should open in-memory db");
        init_schema(&conn).expect("schema init should succeed");

        conn.execute("INSERT INTO advertisements (title) VALUES ('bike')", [])
            .expect("first insert should succeed");
        let err = conn
            .execute("INSERT INTO advertisements (title) VALUES ('bike')", [])
            .expect_err("duplicate title should be rejected");

        match err {
            rusqlite::Error::SqliteFailure(e, _) => {
                assert_eq!(e.extended_code, rusqlite::ffi::SQLITE_CONSTRAINT_UNIQUE)
            }
            other => panic!("unexpected error: {other:?}"),
        }
    }

    #[test]
    fn advertisement_lengths_are_checked() {
        let conn = Connection::open_in_memory().expect("should open in-memory db");
        init_schema(&conn).expect("schema init should succeed");

        let long_owner = "o".repeat(51);
        let err = conn
            .execute(
                "INSERT INTO advertisements (title, owner) VALUES ('ok', ?1)",
                [&long_owner],
            )
            .expect_err("owner over 50 chars should be rejected");

        match err {
            rusqlite::Error::SqliteFailure(e, Some(msg)) => {
                assert_eq!(e.extended_code, rusqlite::ffi::SQLITE_CONSTRAINT_CHECK);
                assert!(msg.contains("owner_len"), "unexpected message: {msg}");
            }
            other => panic!("unexpected error: {other:?}"),
        }
    }

    #[test]
    fn create_time_defaults_to_iso_timestamp() {
        let conn = Connection::open_in_memory().expect("should open in-memory db");
        init_schema(&conn).expect("schema init should succeed");

        conn.execute("INSERT INTO advertisements (title) VALUES ('clock')", [])
            .expect("insert should succeed");
        let create_time: String = conn
            .query_row(
                "SELECT create_time FROM advertisements WHERE title = 'clock'",
                [],
                |row| row.get(0),
            )
            .expect("should read create_time");

        assert_eq!(create_time.len(), "2024-01-15T10:30:00.000".len());
        assert_eq!(&create_time[10..11], "T");
    }

    #[test]
    fn failed_table_rolls_back_whole_schema() {
        let conn = Connection::open_in_memory().expect("should open in-memory db");
        let tables = [
            TableDef {
                name: "scratch",
                sql: "CREATE TABLE IF NOT EXISTS scratch (id INTEGER PRIMARY KEY);",
            },
            TableDef {
                name: "broken",
                sql: "CREATE TABLE broken (",
            },
        ];

        let err = init_schema_from_list(&conn, &tables).expect_err("broken sql should fail");
        match err {
            SchemaError::CreateFailed { name, .. } => assert_eq!(name, "broken"),
            other => panic!("unexpected error type: {other:?}"),
        }

        assert!(!table_exists(&conn, "scratch"), "scratch table should be rolled back");
    }
}
