//! Schema introspection: reads a database's catalog into [`TableSchema`]s.
//!
//! Only user tables are returned. Views, indexes and triggers are catalog
//! objects of other types; SQLite's internal `sqlite_*` tables are skipped.
//! All queries are read-only and bind table names as parameters.

use rusqlite::{Connection, OptionalExtension};
use tracing::debug;

use crate::core::{ColumnInfo, SqlValue, TableSchema};
use crate::error::{Result, Side, SyncError};

const TABLES_QUERY: &str = "SELECT name, sql FROM sqlite_master \
     WHERE type = 'table' AND name NOT LIKE 'sqlite\\_%' ESCAPE '\\'";

const COLUMNS_QUERY: &str = "SELECT cid, name, type, \"notnull\", dflt_value, pk \
     FROM pragma_table_info(?1) ORDER BY cid";

const TABLE_EXISTS_QUERY: &str =
    "SELECT 1 FROM sqlite_master WHERE type = 'table' AND name = ?1";

/// Read every user table of a database, in catalog order.
///
/// Any failure is fatal for the run and is reported as
/// [`SyncError::Introspection`] for `side`.
pub fn introspect(conn: &Connection, side: Side) -> Result<Vec<TableSchema>> {
    let catalog = read_catalog(conn)
        .map_err(|e| SyncError::introspection(side, format!("failed to read catalog: {}", e)))?;

    let mut tables = Vec::with_capacity(catalog.len());
    for (name, create_statement) in catalog {
        let columns = read_columns(conn, &name).map_err(|e| {
            SyncError::introspection(side, format!("failed to read columns of {}: {}", name, e))
        })?;

        // A table dropped between the catalog scan and here reports no columns
        if columns.is_empty() {
            return Err(SyncError::introspection(
                side,
                format!("table {} has no columns (changed during scan?)", name),
            ));
        }

        debug!("{} {}: {} columns", side, name, columns.len());
        tables.push(TableSchema {
            name,
            create_statement,
            columns,
        });
    }

    Ok(tables)
}

/// Check whether a user table with this exact name exists.
pub fn table_exists(conn: &Connection, table: &str) -> rusqlite::Result<bool> {
    conn.query_row(TABLE_EXISTS_QUERY, [table], |_| Ok(()))
        .optional()
        .map(|found| found.is_some())
}

fn read_catalog(conn: &Connection) -> rusqlite::Result<Vec<(String, String)>> {
    let mut stmt = conn.prepare(TABLES_QUERY)?;
    let rows = stmt.query_map([], |row| {
        // `sql` is NULL only for internal tables, which are filtered out above
        let sql: Option<String> = row.get(1)?;
        Ok((row.get(0)?, sql.unwrap_or_default()))
    })?;
    rows.collect()
}

fn read_columns(conn: &Connection, table: &str) -> rusqlite::Result<Vec<ColumnInfo>> {
    let mut stmt = conn.prepare(COLUMNS_QUERY)?;
    let rows = stmt.query_map([table], |row| {
        let declared_type: Option<String> = row.get(2)?;
        let default_value: SqlValue = row.get(4)?;
        Ok(ColumnInfo {
            ordinal: row.get(0)?,
            name: row.get(1)?,
            declared_type: declared_type.unwrap_or_default(),
            not_null: row.get::<_, i64>(3)? != 0,
            default_value: (!default_value.is_null()).then_some(default_value),
            pk_position: row.get(5)?,
        })
    })?;
    rows.collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    fn db(ddl: &str) -> Connection {
        let conn = Connection::open_in_memory().unwrap();
        conn.execute_batch(ddl).unwrap();
        conn
    }

    #[test]
    fn test_reads_tables_in_catalog_order() {
        let conn = db("
            CREATE TABLE users (id INTEGER PRIMARY KEY, name TEXT NOT NULL, updated_at TEXT);
            CREATE TABLE posts (id INTEGER PRIMARY KEY, user_id INTEGER, body TEXT DEFAULT 'x');
        ");
        let tables = introspect(&conn, Side::Source).unwrap();
        let names: Vec<_> = tables.iter().map(|t| t.name.as_str()).collect();
        assert_eq!(names, vec!["users", "posts"]);

        let users = &tables[0];
        assert!(users.create_statement.starts_with("CREATE TABLE users"));
        assert_eq!(users.column_names(), vec!["id", "name", "updated_at"]);
        assert_eq!(users.columns[0].ordinal, 0);
        assert_eq!(users.columns[1].declared_type, "TEXT");
        assert!(users.columns[1].not_null);
        assert_eq!(users.primary_key_column().map(|c| c.name.as_str()), Some("id"));

        let body = tables[1].column("body").unwrap();
        assert_eq!(body.default_value, Some(SqlValue::Text("'x'".into())));
        assert!(tables[1].column("user_id").unwrap().default_value.is_none());
    }

    #[test]
    fn test_excludes_views_indexes_triggers_and_internal_tables() {
        let conn = db("
            CREATE TABLE items (id INTEGER PRIMARY KEY AUTOINCREMENT, v TEXT);
            CREATE INDEX items_v ON items (v);
            CREATE VIEW items_view AS SELECT * FROM items;
            CREATE TRIGGER items_trg AFTER INSERT ON items BEGIN SELECT 1; END;
            INSERT INTO items (v) VALUES ('a');
        ");
        let tables = introspect(&conn, Side::Destination).unwrap();
        let names: Vec<_> = tables.iter().map(|t| t.name.as_str()).collect();
        // AUTOINCREMENT creates sqlite_sequence, which must not show up
        assert_eq!(names, vec!["items"]);
    }

    #[test]
    fn test_composite_key_positions() {
        let conn = db("CREATE TABLE tags (post_id INTEGER, tag_id INTEGER, PRIMARY KEY (tag_id, post_id));");
        let tables = introspect(&conn, Side::Source).unwrap();
        let tags = &tables[0];
        assert!(tags.primary_key_column().is_none());
        assert_eq!(tags.primary_key_columns(), vec!["tag_id", "post_id"]);
        assert!(tags.columns.iter().all(|c| c.is_primary_key()));
    }

    #[test]
    fn test_adversarial_table_name() {
        let conn = db("CREATE TABLE \"a\"\"); DROP TABLE b; --\" (id INTEGER PRIMARY KEY); CREATE TABLE b (id INTEGER PRIMARY KEY);");
        let tables = introspect(&conn, Side::Source).unwrap();
        assert_eq!(tables.len(), 2);
        assert_eq!(tables[0].name, "a\"); DROP TABLE b; --");
        assert_eq!(tables[0].column_names(), vec!["id"]);
        assert!(table_exists(&conn, "b").unwrap());
    }

    #[test]
    fn test_table_exists() {
        let conn = db("CREATE TABLE users (id INTEGER PRIMARY KEY); CREATE VIEW v AS SELECT 1;");
        assert!(table_exists(&conn, "users").unwrap());
        assert!(!table_exists(&conn, "Users_missing").unwrap());
        assert!(!table_exists(&conn, "v").unwrap());
    }

    #[test]
    fn test_empty_database() {
        let conn = Connection::open_in_memory().unwrap();
        assert!(introspect(&conn, Side::Source).unwrap().is_empty());
    }

    #[test]
    fn test_unreadable_catalog_is_introspection_error() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("not-a-db");
        std::fs::write(&path, vec![0xA5u8; 4096]).unwrap();
        let bad = Connection::open(&path).unwrap();
        let err = introspect(&bad, Side::Destination).unwrap_err();
        assert!(matches!(
            err,
            SyncError::Introspection {
                side: Side::Destination,
                ..
            }
        ));
    }
}
