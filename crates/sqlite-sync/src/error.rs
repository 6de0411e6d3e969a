//! Error types for the sync library.

use std::fmt;

use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::orchestrator::SyncResult;

/// Which of the two databases an operation ran against.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Side {
    Source,
    Destination,
}

impl fmt::Display for Side {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Side::Source => write!(f, "source"),
            Side::Destination => write!(f, "destination"),
        }
    }
}

/// Main error type for sync operations.
///
/// Only [`SyncError::Introspection`] (and the connection/config errors raised
/// before a run starts) abort a whole run. Table- and row-scoped variants are
/// collected into the per-table reports by the orchestrator.
#[derive(Error, Debug)]
pub enum SyncError {
    /// Configuration error (invalid YAML, bad glob, bad field name, etc.)
    #[error("Configuration error: {0}")]
    Config(String),

    /// Identifier failed validation before being interpolated into SQL
    #[error("Invalid identifier: {0}")]
    InvalidIdentifier(String),

    /// Database file could not be opened
    #[error("Failed to open database {path}: {source}")]
    Connection {
        path: String,
        #[source]
        source: rusqlite::Error,
    },

    /// Catalog or column metadata could not be read
    #[error("Schema introspection failed on {side} database: {message}")]
    Introspection { side: Side, message: String },

    /// Missing table could not be created on the destination
    #[error("Failed to create table {table} on destination: {source}")]
    DestinationCreate {
        table: String,
        #[source]
        source: rusqlite::Error,
    },

    /// Rows of a table could not be read
    #[error("Failed to read rows of {table} from {side} database: {source}")]
    TableRead {
        table: String,
        side: Side,
        #[source]
        source: rusqlite::Error,
    },

    /// A single row's insert or update failed
    #[error("Failed to apply row {key} of table {table}: {message}")]
    RowApply {
        table: String,
        key: String,
        message: String,
    },

    /// A table's batch of row writes could not be committed
    #[error("Failed to commit changes to {table} on {side} database: {source}")]
    Commit {
        table: String,
        side: Side,
        #[source]
        source: rusqlite::Error,
    },

    /// Strict mode: the run finished but not every table and row synced.
    /// Carries the full result so callers can still report what was written.
    #[error("Sync incomplete - failures in: {}", .result.failed_tables.join(", "))]
    Incomplete { result: Box<SyncResult> },

    /// Underlying SQLite error without more specific context
    #[error("SQLite error: {0}")]
    Sqlite(#[from] rusqlite::Error),

    /// IO error (file operations)
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    /// YAML serialization/deserialization error
    #[error("YAML error: {0}")]
    Yaml(#[from] serde_yaml::Error),

    /// JSON serialization/deserialization error
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),
}

pub const EXIT_CONFIG_ERROR: u8 = 1;
pub const EXIT_CONNECTION_ERROR: u8 = 2;
pub const EXIT_INCOMPLETE: u8 = 3;
pub const EXIT_INTROSPECTION_ERROR: u8 = 4;
pub const EXIT_DATABASE_ERROR: u8 = 5;
pub const EXIT_IO_ERROR: u8 = 7;

impl SyncError {
    /// Create an Introspection error for one side.
    pub fn introspection(side: Side, message: impl Into<String>) -> Self {
        SyncError::Introspection {
            side,
            message: message.into(),
        }
    }

    /// Create a RowApply error.
    pub fn row_apply(
        table: impl Into<String>,
        key: impl Into<String>,
        message: impl Into<String>,
    ) -> Self {
        SyncError::RowApply {
            table: table.into(),
            key: key.into(),
            message: message.into(),
        }
    }

    /// Process exit code for this error.
    pub fn exit_code(&self) -> u8 {
        match self {
            SyncError::Config(_)
            | SyncError::InvalidIdentifier(_)
            | SyncError::Yaml(_)
            | SyncError::Json(_) => EXIT_CONFIG_ERROR,
            SyncError::Connection { .. } => EXIT_CONNECTION_ERROR,
            SyncError::Incomplete { .. } => EXIT_INCOMPLETE,
            SyncError::Introspection { .. } => EXIT_INTROSPECTION_ERROR,
            SyncError::DestinationCreate { .. }
            | SyncError::TableRead { .. }
            | SyncError::RowApply { .. }
            | SyncError::Commit { .. }
            | SyncError::Sqlite(_) => EXIT_DATABASE_ERROR,
            SyncError::Io(_) => EXIT_IO_ERROR,
        }
    }

    /// Format error with full details including error chain
    pub fn format_detailed(&self) -> String {
        let mut output = format!("Error: {}\n", self);

        let mut source = std::error::Error::source(self);
        let mut depth = 1;
        while let Some(err) = source {
            output.push_str(&format!("\nCaused by:\n  {}: {}", depth, err));
            source = err.source();
            depth += 1;
        }

        output
    }
}

/// Reasons a table is left out of reconciliation.
///
/// These are informational: the orchestrator records them in the table's
/// report and moves on to the next table.
#[derive(Error, Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "reason", rename_all = "snake_case")]
pub enum PolicyViolation {
    /// Present in only one of the two databases.
    #[error("table exists only in the {present_in} database")]
    NotCommon { present_in: Side },

    /// Zero or several primary-key columns.
    #[error("table needs exactly one primary key column, found {}", describe_pk(.pk_columns))]
    NoSinglePrimaryKey { pk_columns: Vec<String> },

    /// No column to order writes by.
    #[error("table has no '{column}' column to resolve last-write-wins")]
    MissingTimestampColumn { column: String },

    /// Filtered out by include/exclude patterns.
    #[error("table excluded by table filters")]
    Excluded,
}

fn describe_pk(columns: &[String]) -> String {
    if columns.is_empty() {
        "none".to_string()
    } else {
        format!("composite key ({})", columns.join(", "))
    }
}

/// Result type alias for sync operations.
pub type Result<T> = std::result::Result<T, SyncError>;
