//! Schema metadata for tables and columns, and primary-key identity.
//!
//! A [`TableSchema`] is built once per run by introspecting a live database
//! and is never mutated afterwards.

use std::fmt;

use serde::{Deserialize, Serialize};

use super::value::SqlValue;

/// Column metadata, as reported by `pragma_table_info`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ColumnInfo {
    /// Zero-based position in the table.
    pub ordinal: i64,

    /// Column name (unique within the table).
    pub name: String,

    /// Type as declared in the DDL; advisory only in SQLite.
    pub declared_type: String,

    /// Whether the column has a NOT NULL constraint.
    pub not_null: bool,

    /// Default value expression, if any.
    pub default_value: Option<SqlValue>,

    /// 1-based position inside the primary key, 0 when not part of it.
    pub pk_position: i64,
}

impl ColumnInfo {
    /// Whether this column is part of the table's primary key.
    pub fn is_primary_key(&self) -> bool {
        self.pk_position > 0
    }
}

/// Table metadata.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TableSchema {
    /// Table name.
    pub name: String,

    /// The DDL that created the table, replayed on a destination that lacks it.
    pub create_statement: String,

    /// Columns in ordinal order.
    pub columns: Vec<ColumnInfo>,
}

impl TableSchema {
    /// Names of all primary-key columns, in key order.
    pub fn primary_key_columns(&self) -> Vec<String> {
        let mut pk: Vec<&ColumnInfo> = self.columns.iter().filter(|c| c.is_primary_key()).collect();
        pk.sort_by_key(|c| c.pk_position);
        pk.into_iter().map(|c| c.name.clone()).collect()
    }

    /// The sole primary-key column, or `None` for keyless and composite-key tables.
    pub fn primary_key_column(&self) -> Option<&ColumnInfo> {
        let mut pk = self.columns.iter().filter(|c| c.is_primary_key());
        match (pk.next(), pk.next()) {
            (Some(col), None) => Some(col),
            _ => None,
        }
    }

    /// Find a column by exact name.
    pub fn column(&self, name: &str) -> Option<&ColumnInfo> {
        self.columns.iter().find(|c| c.name == name)
    }

    /// Position of a column within `columns`.
    pub fn column_index(&self, name: &str) -> Option<usize> {
        self.columns.iter().position(|c| c.name == name)
    }

    /// Column names in ordinal order.
    pub fn column_names(&self) -> Vec<&str> {
        self.columns.iter().map(|c| c.name.as_str()).collect()
    }
}

/// Identity of a row across both databases: its primary-key value.
///
/// Built from a non-NULL [`SqlValue`]. Reals are keyed by bit pattern so the
/// type can be hashed and ordered; the order is deterministic but not numeric
/// for reals.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub enum PkValue {
    /// Integer primary key (including rowid aliases).
    Int(i64),
    /// Real primary key, by bit pattern.
    Real(u64),
    /// Text primary key.
    Text(String),
    /// Text primary key that is not valid UTF-8.
    RawText(Vec<u8>),
    /// Blob primary key.
    Blob(Vec<u8>),
}

impl PkValue {
    /// Build a key from a column value. NULL has no identity.
    pub fn from_value(value: &SqlValue) -> Option<Self> {
        match value {
            SqlValue::Null => None,
            SqlValue::Integer(v) => Some(PkValue::Int(*v)),
            // -0.0 and 0.0 are the same key to SQLite
            SqlValue::Real(v) if *v == 0.0 => Some(PkValue::Real(0.0f64.to_bits())),
            SqlValue::Real(v) => Some(PkValue::Real(v.to_bits())),
            SqlValue::Text(v) => Some(PkValue::Text(v.clone())),
            SqlValue::RawText(v) => Some(PkValue::RawText(v.clone())),
            SqlValue::Blob(v) => Some(PkValue::Blob(v.clone())),
        }
    }

    /// Convert back to a bindable value.
    pub fn to_value(&self) -> SqlValue {
        match self {
            PkValue::Int(v) => SqlValue::Integer(*v),
            PkValue::Real(bits) => SqlValue::Real(f64::from_bits(*bits)),
            PkValue::Text(v) => SqlValue::Text(v.clone()),
            PkValue::RawText(v) => SqlValue::RawText(v.clone()),
            PkValue::Blob(v) => SqlValue::Blob(v.clone()),
        }
    }
}

impl fmt::Display for PkValue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.to_value())
    }
}

impl From<i64> for PkValue {
    fn from(v: i64) -> Self {
        PkValue::Int(v)
    }
}

impl From<&str> for PkValue {
    fn from(v: &str) -> Self {
        PkValue::Text(v.to_string())
    }
}
