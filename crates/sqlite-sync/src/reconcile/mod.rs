//! Row reconciliation for one table.
//!
//! Reconciling a table:
//!
//! 1. Check the last-write-wins precondition (a timestamp column).
//! 2. Create the table on the destination from the source DDL if it is missing.
//! 3. Read both row sets and decide, per primary key, which side to write.
//! 4. Apply destination writes in one transaction, then source writes in another.
//! 5. Return a [`TableReport`] with counts and every error encountered.
//!
//! Failures never escape as `Err`: a table-level failure becomes
//! [`TableOutcome::Failed`] and row-level failures are counted, so the
//! orchestrator can carry on with the next table.

mod apply;
mod plan;
mod types;

pub use apply::{apply_side, ApplyResult, RowStatements};
pub use plan::{decide, plan_rows, read_rows, RowSet};
pub use types::{RowCounts, RowPlan, SyncDecision, TableOutcome, TableReport};

use rusqlite::Connection;
use tracing::{info, warn};

use crate::config::DEFAULT_UPDATED_FIELD;
use crate::core::TableSchema;
use crate::error::{PolicyViolation, Result, Side, SyncError};
use crate::introspect::table_exists;

/// Options for reconciling tables.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ReconcileOptions {
    /// Name of the last-modified column.
    pub updated_field: String,
    /// Plan and count without writing.
    pub dry_run: bool,
}

impl Default for ReconcileOptions {
    fn default() -> Self {
        Self {
            updated_field: DEFAULT_UPDATED_FIELD.to_string(),
            dry_run: false,
        }
    }
}

/// Check that a table can be reconciled by last-write-wins at all.
pub fn check_policy(table: &TableSchema, updated_field: &str) -> std::result::Result<(), PolicyViolation> {
    if table.primary_key_column().is_none() {
        return Err(PolicyViolation::NoSinglePrimaryKey {
            pk_columns: table.primary_key_columns(),
        });
    }
    // A key never changes, so it cannot order writes
    let usable = table
        .column(updated_field)
        .is_some_and(|column| !column.is_primary_key());
    if !usable {
        return Err(PolicyViolation::MissingTimestampColumn {
            column: updated_field.to_string(),
        });
    }
    Ok(())
}

/// Reconcile one table between two open databases.
///
/// `table` is the source's schema; the destination is assumed to agree on
/// the column set.
pub fn reconcile_table(
    source: &mut Connection,
    destination: &mut Connection,
    table: &TableSchema,
    options: &ReconcileOptions,
) -> TableReport {
    if let Err(violation) = check_policy(table, &options.updated_field) {
        warn!("{}: skipped - {}", table.name, violation);
        return TableReport::skipped(&table.name, violation);
    }

    let mut report = TableReport::synced(&table.name);
    if let Err(e) = reconcile_rows(source, destination, table, options, &mut report) {
        warn!("{}: failed - {}", table.name, e);
        report.outcome = TableOutcome::Failed {
            error: e.to_string(),
        };
    }
    report
}

fn reconcile_rows(
    source: &mut Connection,
    destination: &mut Connection,
    table: &TableSchema,
    options: &ReconcileOptions,
    report: &mut TableReport,
) -> Result<()> {
    // check_policy guarantees both columns exist
    let pk_index = table
        .primary_key_column()
        .and_then(|pk| table.column_index(&pk.name))
        .unwrap_or_default();
    let ts_index = table.column_index(&options.updated_field).unwrap_or_default();

    let exists = table_exists(destination, &table.name).map_err(|source| SyncError::TableRead {
        table: table.name.clone(),
        side: Side::Destination,
        source,
    })?;
    if !exists {
        info!("{}: missing on destination, creating it", table.name);
        if !options.dry_run {
            create_on_destination(destination, table)?;
        }
        report.created_on_destination = true;
    }

    let source_rows = read_rows(source, Side::Source, table, pk_index)?;
    let destination_rows = if exists || !options.dry_run {
        read_rows(destination, Side::Destination, table, pk_index)?
    } else {
        RowSet::default()
    };

    for (side, rows) in [(Side::Source, &source_rows), (Side::Destination, &destination_rows)] {
        for _ in 0..rows.null_keys {
            report.counts.failed += 1;
            report.errors.push(
                SyncError::row_apply(&table.name, "NULL", format!("NULL primary key on the {} database", side))
                    .to_string(),
            );
        }
    }

    let plans = plan_rows(&source_rows, &destination_rows, ts_index);
    let mut to_destination = Vec::new();
    let mut to_source = Vec::new();
    for plan in &plans {
        match plan.decision.target() {
            Some(Side::Destination) => to_destination.push(plan),
            Some(Side::Source) => to_source.push(plan),
            None => {
                if plan.decision == SyncDecision::Collision {
                    warn!("{}.{}: timestamps tie but rows differ, leaving both as-is", table.name, plan.key);
                }
                report.counts.record(plan.decision);
            }
        }
    }

    if options.dry_run {
        for plan in to_destination.iter().chain(&to_source) {
            report.counts.record(plan.decision);
        }
        return Ok(());
    }

    let statements = RowStatements::new(table, pk_index)?;
    let batches = [
        (destination, Side::Destination, &to_destination, &source_rows),
        (source, Side::Source, &to_source, &destination_rows),
    ];
    let mut first_error = None;
    for (conn, side, batch, winners) in batches {
        match apply_side(conn, side, table, &statements, batch, winners) {
            Ok(result) => {
                for decision in result.applied {
                    report.counts.record(decision);
                }
                report.counts.failed += result.row_errors.len() as u64;
                report
                    .errors
                    .extend(result.row_errors.iter().map(ToString::to_string));
            }
            Err(e) => {
                // The whole batch was rolled back
                report.counts.failed += batch.len() as u64;
                report.errors.push(e.to_string());
                if first_error.is_none() {
                    first_error = Some(e);
                }
            }
        }
    }

    match first_error {
        Some(e) => Err(e),
        None => Ok(()),
    }
}

fn create_on_destination(destination: &mut Connection, table: &TableSchema) -> Result<()> {
    let create = |conn: &mut Connection| -> rusqlite::Result<()> {
        let tx = conn.transaction()?;
        tx.execute_batch(&table.create_statement)?;
        tx.commit()
    };
    create(destination).map_err(|source| SyncError::DestinationCreate {
        table: table.name.clone(),
        source,
    })
}
