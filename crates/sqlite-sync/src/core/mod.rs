//! Core types shared by every stage of a sync run.
//!
//! - [`schema`]: table and column metadata, primary-key identity
//! - [`value`]: tagged SQLite values
//! - [`identifier`]: identifier validation and quoting
//! - [`timestamp`]: ordering of last-modified timestamps

pub mod identifier;
pub mod schema;
pub mod timestamp;
pub mod value;

pub use schema::{ColumnInfo, PkValue, TableSchema};
pub use value::SqlValue;
