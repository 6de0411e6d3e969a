//! Decision and report types for row reconciliation.

use std::fmt;

use serde::{Deserialize, Serialize};

use crate::core::PkValue;
use crate::error::{PolicyViolation, Side};

/// What to do with one primary-key value present on either side.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SyncDecision {
    /// Row exists only in the source.
    InsertIntoDestination,
    /// Row exists only in the destination.
    InsertIntoSource,
    /// Source timestamp is strictly newer.
    UpdateDestination,
    /// Destination timestamp is strictly newer.
    UpdateSource,
    /// Rows are identical.
    Noop,
    /// Timestamps are equal (or cannot be ordered) but fields differ.
    /// Nothing is written; the row is reported as an unresolved collision.
    Collision,
}

impl SyncDecision {
    /// The database this decision writes to, if any.
    pub fn target(&self) -> Option<Side> {
        match self {
            SyncDecision::InsertIntoDestination | SyncDecision::UpdateDestination => {
                Some(Side::Destination)
            }
            SyncDecision::InsertIntoSource | SyncDecision::UpdateSource => Some(Side::Source),
            SyncDecision::Noop | SyncDecision::Collision => None,
        }
    }

    /// Whether this decision inserts a new row.
    pub fn is_insert(&self) -> bool {
        matches!(
            self,
            SyncDecision::InsertIntoDestination | SyncDecision::InsertIntoSource
        )
    }
}

impl fmt::Display for SyncDecision {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            SyncDecision::InsertIntoDestination => "insert into destination",
            SyncDecision::InsertIntoSource => "insert into source",
            SyncDecision::UpdateDestination => "update destination",
            SyncDecision::UpdateSource => "update source",
            SyncDecision::Noop => "no-op",
            SyncDecision::Collision => "collision",
        };
        write!(f, "{}", s)
    }
}

/// The decision for one row.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RowPlan {
    pub key: PkValue,
    pub decision: SyncDecision,
}

/// Per-table row counts.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct RowCounts {
    pub inserted_into_destination: u64,
    pub inserted_into_source: u64,
    pub updated_destination: u64,
    pub updated_source: u64,
    pub unchanged: u64,
    pub collisions: u64,
    pub failed: u64,
}

impl RowCounts {
    /// Count one decision that was carried out (or, for a dry run, planned).
    pub fn record(&mut self, decision: SyncDecision) {
        match decision {
            SyncDecision::InsertIntoDestination => self.inserted_into_destination += 1,
            SyncDecision::InsertIntoSource => self.inserted_into_source += 1,
            SyncDecision::UpdateDestination => self.updated_destination += 1,
            SyncDecision::UpdateSource => self.updated_source += 1,
            SyncDecision::Noop => self.unchanged += 1,
            SyncDecision::Collision => self.collisions += 1,
        }
    }

    /// Rows written to the destination.
    pub fn to_destination(&self) -> u64 {
        self.inserted_into_destination + self.updated_destination
    }

    /// Rows written to the source.
    pub fn to_source(&self) -> u64 {
        self.inserted_into_source + self.updated_source
    }

    /// Total rows inserted on either side.
    pub fn inserted(&self) -> u64 {
        self.inserted_into_destination + self.inserted_into_source
    }

    /// Total rows updated on either side.
    pub fn updated(&self) -> u64 {
        self.updated_destination + self.updated_source
    }

    /// Add another table's counts into this one.
    pub fn merge(&mut self, other: &RowCounts) {
        self.inserted_into_destination += other.inserted_into_destination;
        self.inserted_into_source += other.inserted_into_source;
        self.updated_destination += other.updated_destination;
        self.updated_source += other.updated_source;
        self.unchanged += other.unchanged;
        self.collisions += other.collisions;
        self.failed += other.failed;
    }
}

/// How a table's reconciliation ended.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "status", rename_all = "snake_case")]
pub enum TableOutcome {
    /// Reconciled. Individual rows may still have failed; see the counts.
    Synced,
    /// Left out by policy before any data was touched.
    Skipped { violation: PolicyViolation },
    /// A table-level error stopped reconciliation of this table.
    Failed { error: String },
}

/// Report for one table.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TableReport {
    pub table: String,
    pub outcome: TableOutcome,
    /// The destination lacked the table and it was created from the source DDL.
    #[serde(default)]
    pub created_on_destination: bool,
    pub counts: RowCounts,
    /// Row-level (and commit) errors, in the order they happened.
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub errors: Vec<String>,
}

impl TableReport {
    /// An empty report for a table about to be reconciled.
    pub fn synced(table: impl Into<String>) -> Self {
        Self {
            table: table.into(),
            outcome: TableOutcome::Synced,
            created_on_destination: false,
            counts: RowCounts::default(),
            errors: Vec::new(),
        }
    }

    /// A report for a table left out by policy.
    pub fn skipped(table: impl Into<String>, violation: PolicyViolation) -> Self {
        Self {
            outcome: TableOutcome::Skipped { violation },
            ..Self::synced(table)
        }
    }

    pub fn is_synced(&self) -> bool {
        matches!(self.outcome, TableOutcome::Synced)
    }

    pub fn is_skipped(&self) -> bool {
        matches!(self.outcome, TableOutcome::Skipped { .. })
    }

    pub fn is_failed(&self) -> bool {
        matches!(self.outcome, TableOutcome::Failed { .. })
    }

    /// Failed outright, or synced with some rows failing.
    pub fn has_failures(&self) -> bool {
        self.is_failed() || self.counts.failed > 0
    }
}
