//! # sqlite-sync
//!
//! Bidirectional last-write-wins row sync between two SQLite databases.
//!
//! A run introspects both databases, matches their tables by name and
//! reconciles every table that has a single-column primary key and a
//! last-modified timestamp column:
//!
//! - **Rows present on one side** are inserted into the other
//! - **Rows present on both sides** take the version with the newer timestamp
//! - **Write collisions** (equal timestamps, different fields) are left alone
//!   and reported
//! - **Missing tables** are created on the destination from the source DDL
//!
//! Table- and row-level failures are collected into per-table reports; only
//! failure to read a schema aborts a run.
//!
//! ## Example
//!
//! ```rust,no_run
//! use sqlite_sync::{Orchestrator, SyncConfig};
//!
//! fn main() -> sqlite_sync::Result<()> {
//!     let mut orchestrator = Orchestrator::open(SyncConfig::default(), "laptop.db", "desktop.db")?;
//!     let result = orchestrator.run()?;
//!     println!(
//!         "{} rows to destination, {} to source",
//!         result.rows_to_destination, result.rows_to_source
//!     );
//!     Ok(())
//! }
//! ```

pub mod classify;
pub mod config;
pub mod core;
pub mod error;
pub mod introspect;
pub mod orchestrator;
pub mod reconcile;

// Re-exports for convenient access
pub use classify::{classify, SchemaClassification};
pub use config::{SyncConfig, TableFilter};
pub use crate::core::{ColumnInfo, PkValue, SqlValue, TableSchema};
pub use error::{PolicyViolation, Result, Side, SyncError};
pub use introspect::introspect;
pub use orchestrator::{
    open_database, open_database_read_only, Orchestrator, RunStatus, SyncResult,
};
pub use reconcile::{
    reconcile_table, ReconcileOptions, RowCounts, SyncDecision, TableOutcome, TableReport,
};
