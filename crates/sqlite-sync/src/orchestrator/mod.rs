//! Sync orchestrator - main workflow coordinator.

use std::path::Path;

use chrono::{DateTime, Utc};
use rusqlite::{Connection, OpenFlags};
use serde::{Deserialize, Serialize};
use tracing::{debug, info, warn};

use crate::classify::{classify, SchemaClassification};
use crate::config::{SyncConfig, TableFilter};
use crate::core::TableSchema;
use crate::error::{PolicyViolation, Result, Side, SyncError};
use crate::introspect::introspect;
use crate::reconcile::{reconcile_table, ReconcileOptions, RowCounts, TableReport};

/// Open an existing database file for reading and writing.
///
/// The file is never created: a missing path is a connection error.
pub fn open_database<P: AsRef<Path>>(path: P) -> Result<Connection> {
    open_with_flags(path.as_ref(), OpenFlags::SQLITE_OPEN_READ_WRITE)
}

/// Open an existing database file read-only.
pub fn open_database_read_only<P: AsRef<Path>>(path: P) -> Result<Connection> {
    open_with_flags(path.as_ref(), OpenFlags::SQLITE_OPEN_READ_ONLY)
}

fn open_with_flags(path: &Path, flags: OpenFlags) -> Result<Connection> {
    let flags = flags | OpenFlags::SQLITE_OPEN_URI | OpenFlags::SQLITE_OPEN_NO_MUTEX;
    Connection::open_with_flags(path, flags).map_err(|source| SyncError::Connection {
        path: path.display().to_string(),
        source,
    })
}

/// Final status of a run.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RunStatus {
    /// Every reconciled table and row succeeded.
    #[default]
    Completed,
    /// Some tables or rows failed; see the reports.
    CompletedWithErrors,
    /// Nothing was written.
    DryRun,
}

impl std::fmt::Display for RunStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            RunStatus::Completed => write!(f, "completed"),
            RunStatus::CompletedWithErrors => write!(f, "completed_with_errors"),
            RunStatus::DryRun => write!(f, "dry_run"),
        }
    }
}

/// Result of a sync run.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct SyncResult {
    /// Unique run identifier.
    pub run_id: String,

    /// Final status.
    pub status: RunStatus,

    /// Total duration in seconds.
    pub duration_seconds: f64,

    /// When the sync started.
    pub started_at: DateTime<Utc>,

    /// When the sync completed.
    pub completed_at: DateTime<Utc>,

    /// How the two schemas matched up.
    pub classification: SchemaClassification,

    /// One report per table of either database.
    pub tables: Vec<TableReport>,

    /// Tables reconciled (possibly with some failed rows).
    pub tables_synced: usize,

    /// Tables left out by policy.
    pub tables_skipped: usize,

    /// Tables whose reconciliation stopped on an error.
    pub tables_failed: usize,

    /// Rows inserted or updated on the destination.
    pub rows_to_destination: u64,

    /// Rows inserted or updated on the source.
    pub rows_to_source: u64,

    /// Rows whose timestamps tie (or cannot be ordered) but whose fields differ.
    pub collisions: u64,

    /// Rows that could not be applied.
    pub failed_rows: u64,

    /// Tables that failed outright or had failed rows.
    pub failed_tables: Vec<String>,
}

impl SyncResult {
    /// Row counts summed over every table.
    pub fn total_counts(&self) -> RowCounts {
        let mut total = RowCounts::default();
        for report in &self.tables {
            total.merge(&report.counts);
        }
        total
    }

    /// Convert result to JSON.
    pub fn to_json(&self) -> Result<String> {
        Ok(serde_json::to_string_pretty(self)?)
    }
}

/// Sync orchestrator.
///
/// Owns both connections for the duration of a run. Tables are reconciled
/// one at a time, in source catalog order.
pub struct Orchestrator {
    config: SyncConfig,
    filter: TableFilter,
    source: Connection,
    destination: Connection,
}

impl Orchestrator {
    /// Create an orchestrator over two already-open connections.
    pub fn new(config: SyncConfig, source: Connection, destination: Connection) -> Result<Self> {
        config.validate()?;
        let filter = config.table_filter()?;
        Ok(Self {
            config,
            filter,
            source,
            destination,
        })
    }

    /// Open both database files and create an orchestrator over them.
    pub fn open<P: AsRef<Path>, Q: AsRef<Path>>(
        config: SyncConfig,
        source_path: P,
        destination_path: Q,
    ) -> Result<Self> {
        let source = open_database(source_path)?;
        let destination = open_database(destination_path)?;
        Self::new(config, source, destination)
    }

    pub fn config(&self) -> &SyncConfig {
        &self.config
    }

    /// Source connection.
    pub fn source(&self) -> &Connection {
        &self.source
    }

    /// Destination connection.
    pub fn destination(&self) -> &Connection {
        &self.destination
    }

    /// Run one full sync.
    ///
    /// Only introspection failures (and strict-mode incompleteness) are
    /// returned as `Err`; everything table- or row-scoped ends up in the
    /// per-table reports. [`SyncError::Incomplete`] still carries the result.
    pub fn run(&mut self) -> Result<SyncResult> {
        let started_at = Utc::now();
        let run_id = uuid::Uuid::new_v4().to_string();

        info!("Starting sync run: {}", run_id);
        if self.config.dry_run {
            info!("Dry run: no tables will be created and no rows written");
        }

        // Phase 1: Introspect both sides
        info!("Phase 1: Introspecting schemas");
        let source_tables = introspect(&self.source, Side::Source)?;
        let destination_tables = introspect(&self.destination, Side::Destination)?;
        debug!(
            "Found {} source tables, {} destination tables",
            source_tables.len(),
            destination_tables.len()
        );

        // Phase 2: Classify
        let classification = classify(&source_tables, &destination_tables);
        if classification.has_uncommon() {
            warn!(
                "Tables present in only one database: {}",
                classification.uncommon_tables.join(", ")
            );
        }
        info!(
            "Phase 2: {} common tables ({} eligible)",
            classification.common_tables.len(),
            classification.eligible_tables.len()
        );

        // Phase 3: Reconcile
        info!("Phase 3: Reconciling rows");
        let options = ReconcileOptions {
            updated_field: self.config.updated_field.clone(),
            dry_run: self.config.dry_run,
        };
        let mut reports = Vec::with_capacity(source_tables.len() + destination_tables.len());

        for table in &source_tables {
            let report = match self.precheck(table, &classification) {
                Some(violation) => {
                    info!("{}: skipped - {}", table.name, violation);
                    TableReport::skipped(&table.name, violation)
                }
                None => {
                    let report =
                        reconcile_table(&mut self.source, &mut self.destination, table, &options);
                    log_report(&report);
                    report
                }
            };
            reports.push(report);
        }

        for table in &destination_tables {
            if !source_tables.iter().any(|t| t.name == table.name) {
                reports.push(TableReport::skipped(
                    &table.name,
                    PolicyViolation::NotCommon {
                        present_in: Side::Destination,
                    },
                ));
            }
        }

        // Build result
        let completed_at = Utc::now();
        let duration = (completed_at - started_at).num_milliseconds() as f64 / 1000.0;
        let result = summarize(
            run_id,
            started_at,
            completed_at,
            duration,
            classification,
            reports,
            self.config.dry_run,
        );

        info!(
            "Sync {}: {} synced, {} skipped, {} failed; {} rows to destination, {} to source, {} collisions in {:.1}s",
            result.status,
            result.tables_synced,
            result.tables_skipped,
            result.tables_failed,
            result.rows_to_destination,
            result.rows_to_source,
            result.collisions,
            result.duration_seconds
        );

        if self.config.require_full_success && !result.failed_tables.is_empty() {
            return Err(SyncError::Incomplete {
                result: Box::new(result),
            });
        }

        Ok(result)
    }

    /// Decide whether a source table is left out before any data is read.
    fn precheck(
        &self,
        table: &TableSchema,
        classification: &SchemaClassification,
    ) -> Option<PolicyViolation> {
        if !self.filter.allows(&table.name) {
            return Some(PolicyViolation::Excluded);
        }

        let common = classification.common_tables.contains(&table.name);
        if !common && !self.config.create_missing_tables {
            return Some(PolicyViolation::NotCommon {
                present_in: Side::Source,
            });
        }
        if common && !classification.is_eligible(&table.name) {
            return Some(PolicyViolation::NoSinglePrimaryKey {
                pk_columns: table.primary_key_columns(),
            });
        }
        None
    }
}

fn log_report(report: &TableReport) {
    if report.is_synced() {
        info!(
            "{}: synced ({} to destination, {} to source, {} unchanged, {} collisions, {} failed)",
            report.table,
            report.counts.to_destination(),
            report.counts.to_source(),
            report.counts.unchanged,
            report.counts.collisions,
            report.counts.failed
        );
    }
}

fn summarize(
    run_id: String,
    started_at: DateTime<Utc>,
    completed_at: DateTime<Utc>,
    duration_seconds: f64,
    classification: SchemaClassification,
    tables: Vec<TableReport>,
    dry_run: bool,
) -> SyncResult {
    let mut counts = RowCounts::default();
    let mut failed_tables = Vec::new();
    for report in &tables {
        counts.merge(&report.counts);
        if report.has_failures() {
            failed_tables.push(report.table.clone());
        }
    }

    let status = if dry_run {
        RunStatus::DryRun
    } else if failed_tables.is_empty() {
        RunStatus::Completed
    } else {
        RunStatus::CompletedWithErrors
    };

    SyncResult {
        run_id,
        status,
        duration_seconds,
        started_at,
        completed_at,
        classification,
        tables_synced: tables.iter().filter(|r| r.is_synced()).count(),
        tables_skipped: tables.iter().filter(|r| r.is_skipped()).count(),
        tables_failed: tables.iter().filter(|r| r.is_failed()).count(),
        rows_to_destination: counts.to_destination(),
        rows_to_source: counts.to_source(),
        collisions: counts.collisions,
        failed_rows: counts.failed,
        failed_tables,
        tables,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::reconcile::TableOutcome;

    fn db(sql: &str) -> Connection {
        let conn = Connection::open_in_memory().unwrap();
        conn.execute_batch(sql).unwrap();
        conn
    }

    fn report<'a>(result: &'a SyncResult, table: &str) -> &'a TableReport {
        result.tables.iter().find(|r| r.table == table).unwrap()
    }

    fn run(config: SyncConfig, source: Connection, destination: Connection) -> (Orchestrator, SyncResult) {
        let mut orchestrator = Orchestrator::new(config, source, destination).unwrap();
        let result = orchestrator.run().unwrap();
        (orchestrator, result)
    }

    const USERS: &str = "CREATE TABLE users (id INTEGER PRIMARY KEY, name TEXT, updated_at TEXT);";
    const POSTS: &str = "CREATE TABLE posts (id INTEGER PRIMARY KEY, user_id INTEGER, body TEXT);";

    #[test]
    fn test_users_and_posts_scenario() {
        let source = db(&format!(
            "{} {} INSERT INTO users VALUES (1, 'ann', '2024-01-01 00:00:00'), (2, 'bob', '2024-01-02 00:00:00');
             INSERT INTO posts VALUES (1, 1, 'hello');",
            USERS, POSTS
        ));
        let destination = db(&format!(
            "{} INSERT INTO users VALUES (1, 'ann', '2024-01-01 00:00:00');",
            USERS
        ));

        let (orchestrator, result) = run(SyncConfig::default(), source, destination);

        assert_eq!(result.classification.uncommon_tables, vec!["posts"]);
        assert!(report(&result, "users").is_synced());
        assert_eq!(
            report(&result, "posts").outcome,
            TableOutcome::Skipped {
                violation: PolicyViolation::MissingTimestampColumn {
                    column: "updated_at".into()
                }
            }
        );
        assert_eq!(result.rows_to_destination, 1);
        assert_eq!(result.tables_synced, 1);
        assert_eq!(result.tables_skipped, 1);
        assert_eq!(result.status, RunStatus::Completed);

        let bob: String = orchestrator
            .destination()
            .query_row("SELECT name FROM users WHERE id = 2", [], |r| r.get(0))
            .unwrap();
        assert_eq!(bob, "bob");
    }

    #[test]
    fn test_uncommon_and_ineligible_tables_are_skipped() {
        let source = db(&format!(
            "{} CREATE TABLE tags (post_id INTEGER, tag TEXT, updated_at INTEGER, PRIMARY KEY (post_id, tag));",
            USERS
        ));
        let destination = db(&format!(
            "{} CREATE TABLE tags (post_id INTEGER, tag TEXT, updated_at INTEGER, PRIMARY KEY (post_id, tag));
             CREATE TABLE audit (id INTEGER PRIMARY KEY, updated_at INTEGER);",
            USERS
        ));

        let (_, result) = run(SyncConfig::default(), source, destination);

        assert_eq!(
            report(&result, "tags").outcome,
            TableOutcome::Skipped {
                violation: PolicyViolation::NoSinglePrimaryKey {
                    pk_columns: vec!["post_id".into(), "tag".into()]
                }
            }
        );
        assert_eq!(
            report(&result, "audit").outcome,
            TableOutcome::Skipped {
                violation: PolicyViolation::NotCommon {
                    present_in: Side::Destination
                }
            }
        );
        assert_eq!(result.tables.len(), 3);
    }

    #[test]
    fn test_source_only_table_not_created_when_disabled() {
        let source = db(&format!("{} INSERT INTO users VALUES (1, 'ann', '2024-01-01');", USERS));
        let destination = db("");
        let config = SyncConfig {
            create_missing_tables: false,
            ..SyncConfig::default()
        };

        let (orchestrator, result) = run(config, source, destination);

        assert_eq!(
            report(&result, "users").outcome,
            TableOutcome::Skipped {
                violation: PolicyViolation::NotCommon {
                    present_in: Side::Source
                }
            }
        );
        assert!(!crate::introspect::table_exists(orchestrator.destination(), "users").unwrap());
    }

    #[test]
    fn test_excluded_tables() {
        let source = db(&format!(
            "{} CREATE TABLE cache_items (id INTEGER PRIMARY KEY, updated_at INTEGER);",
            USERS
        ));
        let destination = db(&format!(
            "{} CREATE TABLE cache_items (id INTEGER PRIMARY KEY, updated_at INTEGER);",
            USERS
        ));
        let config = SyncConfig {
            exclude_tables: vec!["cache_*".into()],
            ..SyncConfig::default()
        };

        let (_, result) = run(config, source, destination);
        assert_eq!(
            report(&result, "cache_items").outcome,
            TableOutcome::Skipped {
                violation: PolicyViolation::Excluded
            }
        );
        assert!(report(&result, "users").is_synced());
    }

    #[test]
    fn test_table_failure_does_not_stop_others() {
        let source = db(&format!(
            "{} CREATE TABLE notes (id INTEGER PRIMARY KEY, updated_at INTEGER);
             INSERT INTO users VALUES (1, 'ann', '2024-01-01');
             INSERT INTO notes VALUES (1, 1);",
            USERS
        ));
        // A view named `notes` makes creating the table fail
        let destination = db(&format!("{} CREATE VIEW notes AS SELECT 1 AS id, 1 AS updated_at;", USERS));

        let (_, result) = run(SyncConfig::default(), source, destination);

        assert!(report(&result, "notes").is_failed());
        assert!(report(&result, "users").is_synced());
        assert_eq!(result.rows_to_destination, 1);
        assert_eq!(result.tables_failed, 1);
        assert_eq!(result.failed_tables, vec!["notes"]);
        assert_eq!(result.status, RunStatus::CompletedWithErrors);
    }

    #[test]
    fn test_strict_mode_turns_failures_into_error() {
        let source = db(&format!(
            "{} CREATE TABLE notes (id INTEGER PRIMARY KEY, updated_at INTEGER);
             INSERT INTO users VALUES (1, 'ann', '2024-01-01');",
            USERS
        ));
        let destination = db(&format!("{} CREATE VIEW notes AS SELECT 1 AS id;", USERS));
        let config = SyncConfig {
            require_full_success: true,
            ..SyncConfig::default()
        };

        let mut orchestrator = Orchestrator::new(config, source, destination).unwrap();
        match orchestrator.run() {
            Err(SyncError::Incomplete { result }) => {
                assert_eq!(result.failed_tables, vec!["notes"]);
                // Tables that did sync are still reported
                assert!(report(&result, "users").is_synced());
                assert_eq!(result.rows_to_destination, 1);
            }
            other => panic!("expected Incomplete, got {:?}", other.map(|r| r.status)),
        }
    }

    #[test]
    fn test_dry_run_writes_nothing() {
        let source = db(&format!("{} INSERT INTO users VALUES (1, 'ann', '2024-01-01');", USERS));
        let destination = db(USERS);
        let config = SyncConfig {
            dry_run: true,
            ..SyncConfig::default()
        };

        let (orchestrator, result) = run(config, source, destination);

        assert_eq!(result.status, RunStatus::DryRun);
        assert_eq!(result.rows_to_destination, 1);
        let count: i64 = orchestrator
            .destination()
            .query_row("SELECT count(*) FROM users", [], |r| r.get(0))
            .unwrap();
        assert_eq!(count, 0);
    }

    #[test]
    fn test_introspection_failure_aborts_run() {
        let dir = tempfile::tempdir().unwrap();
        let garbage = dir.path().join("garbage.db");
        std::fs::write(&garbage, vec![0xA5u8; 4096]).unwrap();

        let source = db(USERS);
        let destination = open_database(&garbage).unwrap();
        let mut orchestrator = Orchestrator::new(SyncConfig::default(), source, destination).unwrap();

        let err = orchestrator.run().unwrap_err();
        assert!(matches!(
            err,
            SyncError::Introspection {
                side: Side::Destination,
                ..
            }
        ));
    }

    #[test]
    fn test_open_missing_file_is_connection_error() {
        let dir = tempfile::tempdir().unwrap();
        let err = open_database(dir.path().join("missing.db")).unwrap_err();
        assert!(matches!(err, SyncError::Connection { .. }));
        assert_eq!(err.exit_code(), crate::error::EXIT_CONNECTION_ERROR);
    }

    #[test]
    fn test_invalid_config_rejected() {
        let config = SyncConfig {
            updated_field: String::new(),
            ..SyncConfig::default()
        };
        let err = Orchestrator::new(config, db(""), db("")).err().unwrap();
        assert!(matches!(err, SyncError::Config(_)));
    }

    #[test]
    fn test_result_json() {
        let (_, result) = run(SyncConfig::default(), db(USERS), db(USERS));
        let json: serde_json::Value = serde_json::from_str(&result.to_json().unwrap()).unwrap();
        assert_eq!(json["status"], "completed");
        assert_eq!(json["tables"][0]["table"], "users");
        assert_eq!(json["classification"]["eligible_tables"][0], "users");
        assert_eq!(result.total_counts(), RowCounts::default());
    }
}
