//! Configuration type definitions.

use globset::{Glob, GlobSet, GlobSetBuilder};
use serde::{Deserialize, Serialize};

use crate::error::{Result, SyncError};

/// Default name of the last-modified column.
pub const DEFAULT_UPDATED_FIELD: &str = "updated_at";

/// Sync behavior configuration.
///
/// Every field has a default, so an empty YAML document is a valid config.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SyncConfig {
    /// Column holding each row's last-modified instant (default: "updated_at").
    #[serde(default = "default_updated_field")]
    pub updated_field: String,

    /// Tables to include (glob patterns). Empty includes every table.
    #[serde(default)]
    pub include_tables: Vec<String>,

    /// Tables to exclude (glob patterns). Applied after `include_tables`.
    #[serde(default)]
    pub exclude_tables: Vec<String>,

    /// Reconcile source-only tables, creating them on the destination (default: true).
    #[serde(default = "default_true")]
    pub create_missing_tables: bool,

    /// Fail the run when any table or row could not be synced (default: false).
    #[serde(default)]
    pub require_full_success: bool,

    /// Plan and report without writing to either database (default: false).
    #[serde(default)]
    pub dry_run: bool,
}

impl Default for SyncConfig {
    fn default() -> Self {
        Self {
            updated_field: default_updated_field(),
            include_tables: Vec::new(),
            exclude_tables: Vec::new(),
            create_missing_tables: true,
            require_full_success: false,
            dry_run: false,
        }
    }
}

impl SyncConfig {
    /// Compile the include/exclude patterns into a [`TableFilter`].
    pub fn table_filter(&self) -> Result<TableFilter> {
        Ok(TableFilter {
            include: build_glob_set(&self.include_tables, "include_tables")?,
            exclude: build_glob_set(&self.exclude_tables, "exclude_tables")?,
        })
    }
}

/// Compiled include/exclude table patterns.
#[derive(Debug, Clone)]
pub struct TableFilter {
    include: Option<GlobSet>,
    exclude: Option<GlobSet>,
}

impl TableFilter {
    /// A filter that admits every table.
    pub fn allow_all() -> Self {
        Self {
            include: None,
            exclude: None,
        }
    }

    /// Whether `table` passes both pattern lists.
    pub fn allows(&self, table: &str) -> bool {
        let included = self.include.as_ref().map_or(true, |set| set.is_match(table));
        let excluded = self.exclude.as_ref().map_or(false, |set| set.is_match(table));
        included && !excluded
    }
}

fn build_glob_set(patterns: &[String], field: &str) -> Result<Option<GlobSet>> {
    if patterns.is_empty() {
        return Ok(None);
    }

    let mut builder = GlobSetBuilder::new();
    for pattern in patterns {
        let glob = Glob::new(pattern).map_err(|e| {
            SyncError::Config(format!("{}: invalid pattern '{}': {}", field, pattern, e))
        })?;
        builder.add(glob);
    }

    builder
        .build()
        .map(Some)
        .map_err(|e| SyncError::Config(format!("{}: {}", field, e)))
}

// Default value functions for serde
fn default_updated_field() -> String {
    DEFAULT_UPDATED_FIELD.to_string()
}

fn default_true() -> bool {
    true
}
