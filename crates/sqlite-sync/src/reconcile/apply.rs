//! Writing decisions to one side inside a single transaction.

use rusqlite::{params_from_iter, Connection};
use tracing::{debug, warn};

use crate::core::identifier::{quote_ident, quote_list};
use crate::core::{SqlValue, TableSchema};
use crate::error::{Result, Side, SyncError};

use super::plan::RowSet;
use super::types::{RowPlan, SyncDecision};

/// INSERT/UPDATE statements for one table.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RowStatements {
    /// Inserts every column, in schema order.
    pub insert: String,
    /// Updates every non-key column by key; `None` when the key is the only column.
    pub update: Option<String>,
    pk_index: usize,
}

impl RowStatements {
    pub fn new(table: &TableSchema, pk_index: usize) -> Result<Self> {
        let quoted_table = quote_ident(&table.name)?;
        let columns = table.column_names();

        let placeholders: Vec<String> = (1..=columns.len()).map(|i| format!("?{}", i)).collect();
        let insert = format!(
            "INSERT INTO {} ({}) VALUES ({})",
            quoted_table,
            quote_list(columns.iter().copied())?,
            placeholders.join(", ")
        );

        let mut assignments = Vec::new();
        for (_, name) in columns.iter().enumerate().filter(|(i, _)| *i != pk_index) {
            assignments.push(format!("{} = ?{}", quote_ident(name)?, assignments.len() + 1));
        }
        let update = if assignments.is_empty() {
            None
        } else {
            Some(format!(
                "UPDATE {} SET {} WHERE {} = ?{}",
                quoted_table,
                assignments.join(", "),
                quote_ident(columns[pk_index])?,
                assignments.len() + 1
            ))
        };

        Ok(Self {
            insert,
            update,
            pk_index,
        })
    }

    /// Parameters for the UPDATE: non-key values, then the key.
    fn update_params<'a>(&self, row: &'a [SqlValue]) -> Vec<&'a SqlValue> {
        row.iter()
            .enumerate()
            .filter(|(i, _)| *i != self.pk_index)
            .map(|(_, v)| v)
            .chain(std::iter::once(&row[self.pk_index]))
            .collect()
    }
}

/// Outcome of applying a batch of decisions to one side.
#[derive(Debug, Default)]
pub struct ApplyResult {
    /// Decisions that were written and committed.
    pub applied: Vec<SyncDecision>,
    /// Row-scoped failures; the rest of the batch went ahead.
    pub row_errors: Vec<SyncError>,
}

/// Apply every plan that targets `side`, taking row values from `winners`.
///
/// Runs in one transaction so a crash leaves the table as it was before the
/// batch or after it. A failed row is recorded and skipped; a failed commit
/// (or a conflict clause that rolls the whole transaction back) is returned
/// as an error and nothing from the batch is kept.
pub fn apply_side(
    conn: &mut Connection,
    side: Side,
    table: &TableSchema,
    statements: &RowStatements,
    plans: &[&RowPlan],
    winners: &RowSet,
) -> Result<ApplyResult> {
    let mut result = ApplyResult::default();
    if plans.is_empty() {
        return Ok(result);
    }

    let commit_error = |source: rusqlite::Error| SyncError::Commit {
        table: table.name.clone(),
        side,
        source,
    };

    let tx = conn.transaction().map_err(commit_error)?;
    {
        let mut insert = tx.prepare_cached(&statements.insert).map_err(commit_error)?;
        let mut update = match &statements.update {
            Some(sql) => Some(tx.prepare_cached(sql).map_err(commit_error)?),
            None => None,
        };

        for plan in plans {
            let key = plan.key.to_string();
            let Some(row) = winners.get(&plan.key) else {
                result.row_errors.push(SyncError::row_apply(
                    &table.name,
                    &key,
                    "row vanished from the winning side",
                ));
                continue;
            };

            let outcome = if plan.decision.is_insert() {
                insert.execute(params_from_iter(row.iter()))
            } else if let Some(update) = update.as_mut() {
                update.execute(params_from_iter(statements.update_params(row)))
            } else {
                Ok(1)
            };

            match outcome {
                Ok(0) => result.row_errors.push(SyncError::row_apply(
                    &table.name,
                    &key,
                    format!("{}: no row matched on the {} database", plan.decision, side),
                )),
                Ok(_) => {
                    debug!("{}.{}: {}", table.name, key, plan.decision);
                    result.applied.push(plan.decision);
                }
                Err(e) => {
                    warn!("{}.{}: {} failed: {}", table.name, key, plan.decision, e);
                    result.row_errors.push(SyncError::row_apply(
                        &table.name,
                        &key,
                        format!("{}: {}", plan.decision, e),
                    ));
                    // ON CONFLICT ROLLBACK ends the transaction for the whole batch
                    if tx.is_autocommit() {
                        return Err(commit_error(e));
                    }
                }
            }
        }
    }
    tx.commit().map_err(commit_error)?;

    Ok(result)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::PkValue;
    use crate::introspect::introspect;

    fn setup(ddl: &str) -> (Connection, TableSchema) {
        let conn = Connection::open_in_memory().unwrap();
        conn.execute_batch(ddl).unwrap();
        let table = introspect(&conn, Side::Destination).unwrap().remove(0);
        (conn, table)
    }

    fn winners(rows: Vec<Vec<SqlValue>>) -> RowSet {
        let mut set = RowSet::default();
        for r in rows {
            set.rows.insert(PkValue::from_value(&r[0]).unwrap(), r);
        }
        set
    }

    fn plan(key: i64, decision: SyncDecision) -> RowPlan {
        RowPlan {
            key: PkValue::Int(key),
            decision,
        }
    }

    #[test]
    fn test_statements() {
        let (_conn, table) =
            setup("CREATE TABLE users (name TEXT, id INTEGER PRIMARY KEY, updated_at INTEGER);");
        let stmts = RowStatements::new(&table, 1).unwrap();
        assert_eq!(
            stmts.insert,
            "INSERT INTO \"users\" (\"name\", \"id\", \"updated_at\") VALUES (?1, ?2, ?3)"
        );
        assert_eq!(
            stmts.update.as_deref(),
            Some("UPDATE \"users\" SET \"name\" = ?1, \"updated_at\" = ?2 WHERE \"id\" = ?3")
        );

        let row = vec![SqlValue::from("n"), SqlValue::Integer(7), SqlValue::Integer(9)];
        assert_eq!(
            stmts.update_params(&row),
            vec![&SqlValue::from("n"), &SqlValue::Integer(9), &SqlValue::Integer(7)]
        );
    }

    #[test]
    fn test_key_only_table_has_no_update() {
        let (_conn, table) = setup("CREATE TABLE k (id INTEGER PRIMARY KEY);");
        assert!(RowStatements::new(&table, 0).unwrap().update.is_none());
    }

    #[test]
    fn test_applies_inserts_and_updates() {
        let (mut conn, table) = setup(
            "CREATE TABLE users (id INTEGER PRIMARY KEY, name TEXT, updated_at INTEGER);
             INSERT INTO users VALUES (1, 'old', 1);",
        );
        let stmts = RowStatements::new(&table, 0).unwrap();
        let rows = winners(vec![
            vec![SqlValue::Integer(1), SqlValue::from("new"), SqlValue::Integer(2)],
            vec![SqlValue::Integer(2), SqlValue::from("added"), SqlValue::Integer(2)],
        ]);
        let update = plan(1, SyncDecision::UpdateDestination);
        let insert = plan(2, SyncDecision::InsertIntoDestination);

        let result = apply_side(
            &mut conn,
            Side::Destination,
            &table,
            &stmts,
            &[&update, &insert],
            &rows,
        )
        .unwrap();
        assert_eq!(result.applied.len(), 2);
        assert!(result.row_errors.is_empty());

        let names: Vec<String> = conn
            .prepare("SELECT name FROM users ORDER BY id")
            .unwrap()
            .query_map([], |r| r.get(0))
            .unwrap()
            .collect::<rusqlite::Result<_>>()
            .unwrap();
        assert_eq!(names, vec!["new", "added"]);
    }

    #[test]
    fn test_bad_row_does_not_block_the_rest() {
        let (mut conn, table) = setup(
            "CREATE TABLE users (id INTEGER PRIMARY KEY, name TEXT NOT NULL, updated_at INTEGER);",
        );
        let stmts = RowStatements::new(&table, 0).unwrap();
        let rows = winners(vec![
            vec![SqlValue::Integer(1), SqlValue::Null, SqlValue::Integer(1)],
            vec![SqlValue::Integer(2), SqlValue::from("ok"), SqlValue::Integer(1)],
        ]);
        let bad = plan(1, SyncDecision::InsertIntoDestination);
        let good = plan(2, SyncDecision::InsertIntoDestination);

        let result =
            apply_side(&mut conn, Side::Destination, &table, &stmts, &[&bad, &good], &rows)
                .unwrap();
        assert_eq!(result.applied, vec![SyncDecision::InsertIntoDestination]);
        assert_eq!(result.row_errors.len(), 1);
        assert!(matches!(
            &result.row_errors[0],
            SyncError::RowApply { key, .. } if key == "1"
        ));

        let count: i64 = conn
            .query_row("SELECT count(*) FROM users", [], |r| r.get(0))
            .unwrap();
        assert_eq!(count, 1);
    }

    #[test]
    fn test_update_of_missing_row_is_row_error() {
        let (mut conn, table) =
            setup("CREATE TABLE users (id INTEGER PRIMARY KEY, updated_at INTEGER);");
        let stmts = RowStatements::new(&table, 0).unwrap();
        let rows = winners(vec![vec![SqlValue::Integer(5), SqlValue::Integer(1)]]);
        let update = plan(5, SyncDecision::UpdateSource);

        let result =
            apply_side(&mut conn, Side::Source, &table, &stmts, &[&update], &rows).unwrap();
        assert!(result.applied.is_empty());
        assert!(result.row_errors[0].to_string().contains("no row matched"));
    }

    #[test]
    fn test_rollback_conflict_discards_batch() {
        let (mut conn, table) = setup(
            "CREATE TABLE users (id INTEGER PRIMARY KEY, email TEXT UNIQUE ON CONFLICT ROLLBACK);
             INSERT INTO users VALUES (1, 'taken');",
        );
        let stmts = RowStatements::new(&table, 0).unwrap();
        let rows = winners(vec![
            vec![SqlValue::Integer(2), SqlValue::from("fresh")],
            vec![SqlValue::Integer(3), SqlValue::from("taken")],
        ]);
        let first = plan(2, SyncDecision::InsertIntoDestination);
        let clash = plan(3, SyncDecision::InsertIntoDestination);

        let err = apply_side(&mut conn, Side::Destination, &table, &stmts, &[&first, &clash], &rows)
            .unwrap_err();
        assert!(matches!(err, SyncError::Commit { .. }));

        let count: i64 = conn
            .query_row("SELECT count(*) FROM users", [], |r| r.get(0))
            .unwrap();
        assert_eq!(count, 1);
    }
}
