//! Compatibility classification of two introspected schemas.
//!
//! Pure and total: matches tables by exact (case-sensitive) name and decides
//! which common tables have a usable row identity.

use serde::{Deserialize, Serialize};

use crate::core::TableSchema;

/// Partition of the tables of two databases.
///
/// `eligible_tables` and `ineligible_tables` split `common_tables`; all lists
/// follow source iteration order, with destination-only tables appended to
/// `uncommon_tables` in destination order.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct SchemaClassification {
    /// Tables present in both databases.
    pub common_tables: Vec<String>,
    /// Tables present in exactly one database.
    pub uncommon_tables: Vec<String>,
    /// Common tables with exactly one primary-key column.
    pub eligible_tables: Vec<String>,
    /// Common tables with no primary key or a composite one.
    pub ineligible_tables: Vec<String>,
}

impl SchemaClassification {
    /// Whether some tables exist on only one side.
    pub fn has_uncommon(&self) -> bool {
        !self.uncommon_tables.is_empty()
    }

    /// Whether `table` is in the eligible set.
    pub fn is_eligible(&self, table: &str) -> bool {
        self.eligible_tables.iter().any(|t| t == table)
    }
}

/// Classify source tables against destination tables.
pub fn classify(source: &[TableSchema], destination: &[TableSchema]) -> SchemaClassification {
    let mut result = SchemaClassification::default();

    for table in source {
        if !contains(destination, &table.name) {
            result.uncommon_tables.push(table.name.clone());
            continue;
        }

        result.common_tables.push(table.name.clone());
        if table.primary_key_column().is_some() {
            result.eligible_tables.push(table.name.clone());
        } else {
            result.ineligible_tables.push(table.name.clone());
        }
    }

    for table in destination {
        if !contains(source, &table.name) {
            result.uncommon_tables.push(table.name.clone());
        }
    }

    result
}

fn contains(tables: &[TableSchema], name: &str) -> bool {
    tables.iter().any(|t| t.name == name)
}
