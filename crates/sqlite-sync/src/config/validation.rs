//! Configuration validation.

use super::SyncConfig;
use crate::core::identifier::validate_identifier;
use crate::error::{Result, SyncError};

/// Validate the configuration.
pub fn validate(config: &SyncConfig) -> Result<()> {
    validate_identifier(&config.updated_field)
        .map_err(|e| SyncError::Config(format!("updated_field: {}", e)))?;

    // Compiling the filter surfaces bad glob patterns up front
    config.table_filter()?;

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_valid_config() {
        assert!(validate(&SyncConfig::default()).is_ok());
    }

    #[test]
    fn test_empty_updated_field() {
        let config = SyncConfig {
            updated_field: String::new(),
            ..SyncConfig::default()
        };
        let err = validate(&config).unwrap_err();
        assert!(matches!(err, SyncError::Config(_)));
        assert!(err.to_string().contains("updated_field"));
    }

    #[test]
    fn test_updated_field_with_null_byte() {
        let config = SyncConfig {
            updated_field: "updated\0at".into(),
            ..SyncConfig::default()
        };
        assert!(validate(&config).is_err());
    }

    #[test]
    fn test_bad_include_pattern() {
        let config = SyncConfig {
            include_tables: vec!["{a,b".into()],
            ..SyncConfig::default()
        };
        assert!(validate(&config).is_err());
    }
}
