//! Reading row sets and computing last-write-wins decisions.

use std::cmp::Ordering;
use std::collections::BTreeMap;

use rusqlite::Connection;

use crate::core::identifier::{quote_ident, quote_list};
use crate::core::timestamp;
use crate::core::{PkValue, SqlValue, TableSchema};
use crate::error::{Result, Side, SyncError};

use super::types::{RowPlan, SyncDecision};

/// Rows of one table keyed by primary key, values in schema column order.
#[derive(Debug, Default, Clone, PartialEq)]
pub struct RowSet {
    pub rows: BTreeMap<PkValue, Vec<SqlValue>>,
    /// Rows whose primary key is NULL and therefore cannot be matched.
    pub null_keys: usize,
}

impl RowSet {
    pub fn len(&self) -> usize {
        self.rows.len()
    }

    pub fn is_empty(&self) -> bool {
        self.rows.is_empty()
    }

    pub fn get(&self, key: &PkValue) -> Option<&Vec<SqlValue>> {
        self.rows.get(key)
    }
}

/// Read every row of `table` from one side, selecting the schema's columns.
pub fn read_rows(
    conn: &Connection,
    side: Side,
    table: &TableSchema,
    pk_index: usize,
) -> Result<RowSet> {
    let sql = format!(
        "SELECT {} FROM {}",
        quote_list(table.column_names())?,
        quote_ident(&table.name)?
    );
    let width = table.columns.len();

    let read = || -> rusqlite::Result<RowSet> {
        let mut stmt = conn.prepare(&sql)?;
        let mut rows = stmt.query([])?;
        let mut set = RowSet::default();
        while let Some(row) = rows.next()? {
            let values = (0..width)
                .map(|i| row.get::<_, SqlValue>(i))
                .collect::<rusqlite::Result<Vec<_>>>()?;
            match PkValue::from_value(&values[pk_index]) {
                Some(key) => {
                    set.rows.insert(key, values);
                }
                None => set.null_keys += 1,
            }
        }
        Ok(set)
    };

    read().map_err(|source| SyncError::TableRead {
        table: table.name.clone(),
        side,
        source,
    })
}

/// Decide, for every key in either row set, which side (if any) to write.
///
/// Plans come out in primary-key order.
pub fn plan_rows(source: &RowSet, destination: &RowSet, timestamp_index: usize) -> Vec<RowPlan> {
    let mut plans = Vec::with_capacity(source.len().max(destination.len()));

    for (key, src) in &source.rows {
        let decision = match destination.get(key) {
            None => SyncDecision::InsertIntoDestination,
            Some(dst) => decide(src, dst, timestamp_index),
        };
        plans.push(RowPlan {
            key: key.clone(),
            decision,
        });
    }

    for key in destination.rows.keys() {
        if !source.rows.contains_key(key) {
            plans.push(RowPlan {
                key: key.clone(),
                decision: SyncDecision::InsertIntoSource,
            });
        }
    }

    plans.sort_by(|a, b| a.key.cmp(&b.key));
    plans
}

/// Last-write-wins for a key present on both sides.
pub fn decide(source: &[SqlValue], destination: &[SqlValue], timestamp_index: usize) -> SyncDecision {
    match timestamp::compare(&source[timestamp_index], &destination[timestamp_index]) {
        Some(Ordering::Greater) => SyncDecision::UpdateDestination,
        Some(Ordering::Less) => SyncDecision::UpdateSource,
        // Equal instants may be spelled differently; only the other fields decide
        Some(Ordering::Equal) if same_fields(source, destination, timestamp_index) => {
            SyncDecision::Noop
        }
        None if source == destination => SyncDecision::Noop,
        _ => SyncDecision::Collision,
    }
}

fn same_fields(source: &[SqlValue], destination: &[SqlValue], skip: usize) -> bool {
    source.len() == destination.len()
        && source
            .iter()
            .zip(destination)
            .enumerate()
            .all(|(i, (a, b))| i == skip || a == b)
}
