//! Validator lifecycle
//!
//! Shared vocabulary for components that are built once and then used to
//! validate: how far building got, and how strictly a pass treats
//! undeclared content.

use crate::error::{Error, ParseError, Result};
use std::fmt;

/// Validation mode for XSD validation
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum ValidationMode {
    /// Undeclared content is an error
    #[default]
    Strict,
    /// Undeclared content is accepted, declared content is validated
    Lax,
    /// No validation is performed
    Skip,
}

impl ValidationMode {
    /// Parse validation mode from string
    pub fn from_str(s: &str) -> Result<Self> {
        match s {
            "strict" => Ok(ValidationMode::Strict),
            "lax" => Ok(ValidationMode::Lax),
            "skip" => Ok(ValidationMode::Skip),
            _ => Err(Error::Parse(ParseError::new(format!(
                "invalid validation mode: '{}'. Must be 'strict', 'lax', or 'skip'",
                s
            )))),
        }
    }

    /// Get the mode as a string
    pub fn as_str(&self) -> &'static str {
        match self {
            ValidationMode::Strict => "strict",
            ValidationMode::Lax => "lax",
            ValidationMode::Skip => "skip",
        }
    }
}

impl fmt::Display for ValidationMode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

/// How far building a component got
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ValidationStatus {
    /// Built without errors
    Full,
    /// Built, with non-fatal errors
    Partial,
    /// Not built
    None,
}

/// Validity status of a component
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ValidityStatus {
    /// Valid according to the schema
    Valid,
    /// Invalid according to the schema
    Invalid,
    /// Validity is unknown
    NotKnown,
}

/// Lifecycle of a buildable validator
pub trait Validator: fmt::Debug {
    /// Check if the validator has been fully built
    fn is_built(&self) -> bool;

    /// Build the validator and its components
    fn build(&mut self) -> Result<()>;

    /// Get the validation status
    fn validation_attempted(&self) -> ValidationStatus;

    /// Get the validity status
    fn validity(&self, mode: ValidationMode) -> ValidityStatus {
        match mode {
            ValidationMode::Skip => ValidityStatus::NotKnown,
            _ => {
                if self.has_errors() {
                    ValidityStatus::Invalid
                } else if self.validation_attempted() == ValidationStatus::Full {
                    ValidityStatus::Valid
                } else {
                    ValidityStatus::NotKnown
                }
            }
        }
    }

    /// Check if the validator has errors
    fn has_errors(&self) -> bool;

    /// Get all building errors
    fn errors(&self) -> Vec<ParseError>;

    /// Check the validator status against a validation mode
    fn check_validator(&self, mode: ValidationMode) -> Result<()> {
        if self.validation_attempted() == ValidationStatus::None && mode != ValidationMode::Skip {
            return Err(Error::Parse(ParseError::new("validator is not built")));
        }

        if mode == ValidationMode::Strict {
            if self.validation_attempted() != ValidationStatus::Full {
                return Err(Error::Parse(ParseError::new(
                    "validation mode is 'strict' but validator is not fully built",
                )));
            }
            if self.validity(mode) != ValidityStatus::Valid {
                return Err(Error::Parse(ParseError::new(
                    "validation mode is 'strict' but validator is not valid",
                )));
            }
        }

        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_validation_mode() {
        assert_eq!(ValidationMode::from_str("strict").unwrap(), ValidationMode::Strict);
        assert_eq!(ValidationMode::from_str("lax").unwrap(), ValidationMode::Lax);
        assert_eq!(ValidationMode::from_str("skip").unwrap(), ValidationMode::Skip);
        assert!(ValidationMode::from_str("invalid").is_err());
        assert_eq!(ValidationMode::default(), ValidationMode::Strict);
    }

    #[test]
    fn test_validation_mode_display() {
        assert_eq!(ValidationMode::Strict.to_string(), "strict");
        assert_eq!(ValidationMode::Lax.to_string(), "lax");
        assert_eq!(ValidationMode::Skip.to_string(), "skip");
    }
}
