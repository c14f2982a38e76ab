//! Configuration validation.
//!
//! # Responsibilities
//! - Semantic validation (serde handles syntactic)
//! - Validate value ranges (buffer size and poll interval > 0)
//! - Detect empty or colliding field names
//!
//! # Design Decisions
//! - Returns all validation errors, not just first
//! - Validation is pure function: Config → Result<(), Vec<ValidationError>>
//! - Level names are never rejected; unknown names already fell back to debug

use std::collections::HashSet;

use thiserror::Error;

use crate::config::schema::Config;

/// A single semantic problem in a [`Config`].
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ValidationError {
    #[error("diode.buffer_size must be greater than zero")]
    ZeroBufferSize,

    #[error("diode.poll_interval_ms must be greater than zero")]
    ZeroPollInterval,

    #[error("logger.field_names.{0} must not be empty")]
    EmptyFieldName(&'static str),

    #[error("field name `{0}` is used more than once")]
    DuplicateFieldName(String),
}

/// Check `config` and collect every problem found.
pub fn validate_config(config: &Config) -> Result<(), Vec<ValidationError>> {
    let mut errors = Vec::new();

    if config.diode.buffer_size == 0 {
        errors.push(ValidationError::ZeroBufferSize);
    }
    if config.diode.poll_interval_ms == 0 {
        errors.push(ValidationError::ZeroPollInterval);
    }

    let mut seen = HashSet::new();
    for (setting, name) in config.logger.field_names.entries() {
        if name.is_empty() {
            errors.push(ValidationError::EmptyFieldName(setting));
        } else if !seen.insert(name) {
            errors.push(ValidationError::DuplicateFieldName(name.to_string()));
        }
    }

    if errors.is_empty() {
        Ok(())
    } else {
        Err(errors)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_config_is_valid() {
        assert!(validate_config(&Config::default()).is_ok());
    }

    #[test]
    fn test_all_errors_are_reported() {
        let mut config = Config::default();
        config.diode.buffer_size = 0;
        config.diode.poll_interval_ms = 0;
        config.logger.field_names.caller = String::new();
        config.logger.field_names.error = "message".to_string();

        let errors = validate_config(&config).unwrap_err();
        assert_eq!(
            errors,
            vec![
                ValidationError::ZeroBufferSize,
                ValidationError::ZeroPollInterval,
                ValidationError::EmptyFieldName("caller"),
                ValidationError::DuplicateFieldName("message".to_string()),
            ]
        );
    }
}
