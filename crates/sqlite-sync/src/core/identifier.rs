//! Identifier validation and quoting for SQL injection prevention.
//!
//! Table and column names cannot be bound as statement parameters, only data
//! values can. Names read from a database catalog are therefore validated and
//! quoted before they are interpolated into DML. Catalog lookups themselves
//! bind the table name as a parameter (`pragma_table_info(?1)`) and never go
//! through this module.

use crate::error::{Result, SyncError};

/// Maximum identifier length accepted for interpolation.
///
/// SQLite itself has no limit; this bounds what we are willing to splice
/// into a statement.
const MAX_IDENTIFIER_LENGTH: usize = 1024;

/// Validate an identifier for security issues.
///
/// Rejects:
/// - Empty identifiers
/// - Identifiers containing null bytes (injection vector)
/// - Identifiers exceeding maximum length
pub fn validate_identifier(name: &str) -> Result<()> {
    if name.is_empty() {
        return Err(SyncError::InvalidIdentifier(
            "Identifier cannot be empty".to_string(),
        ));
    }

    if name.contains('\0') {
        return Err(SyncError::InvalidIdentifier(format!(
            "SECURITY: Identifier contains null byte (possible injection attempt): {:?}",
            name
        )));
    }

    if name.len() > MAX_IDENTIFIER_LENGTH {
        return Err(SyncError::InvalidIdentifier(format!(
            "SECURITY: Identifier exceeds maximum length of {} bytes (got {} bytes)",
            MAX_IDENTIFIER_LENGTH,
            name.len(),
        )));
    }

    Ok(())
}

/// Quote a SQLite identifier.
///
/// Escapes double quotes by doubling them and wraps in double quotes.
/// Validates the identifier before quoting.
///
/// ```
/// use sqlite_sync::core::identifier::quote_ident;
///
/// assert_eq!(quote_ident("users").unwrap(), "\"users\"");
/// assert_eq!(quote_ident("odd\"name").unwrap(), "\"odd\"\"name\"");
/// ```
pub fn quote_ident(name: &str) -> Result<String> {
    validate_identifier(name)?;
    Ok(format!("\"{}\"", name.replace('"', "\"\"")))
}

/// Quote a list of identifiers and join them with `", "`.
pub fn quote_list<'a, I>(names: I) -> Result<String>
where
    I: IntoIterator<Item = &'a str>,
{
    let quoted = names
        .into_iter()
        .map(quote_ident)
        .collect::<Result<Vec<_>>>()?;
    Ok(quoted.join(", "))
}
