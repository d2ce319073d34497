//! Validation options and results
//!
//! Configuration handed to a [`StreamingValidator`](super::StreamingValidator)
//! and the report it produces at the end of a pass.

use serde::Serialize;
use std::fmt;

use super::base::ValidationMode;
use super::exceptions::{IssueKind, ValidationIssue};
use crate::limits::Limits;

/// Options for one validation pass
#[derive(Debug, Clone, Default)]
pub struct ValidatorOptions {
    /// How undeclared root elements are treated
    pub mode: ValidationMode,
    /// Depth limit for element nesting
    pub limits: Limits,
}

impl ValidatorOptions {
    /// Create default options (strict mode, default limits)
    pub fn new() -> Self {
        Self::default()
    }

    /// Set the validation mode
    pub fn with_mode(mut self, mode: ValidationMode) -> Self {
        self.mode = mode;
        self
    }

    /// Set the limits
    pub fn with_limits(mut self, limits: Limits) -> Self {
        self.limits = limits;
        self
    }
}

/// Where a streaming validator is in its document
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum ValidatorState {
    /// No root element seen yet
    BeforeDocument,
    /// Inside the root element
    InElement,
    /// The root element has been closed
    AfterDocument,
    /// The input ended with the document incomplete
    Invalid,
}

impl fmt::Display for ValidatorState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::BeforeDocument => write!(f, "before document"),
            Self::InElement => write!(f, "in element"),
            Self::AfterDocument => write!(f, "after document"),
            Self::Invalid => write!(f, "invalid"),
        }
    }
}

/// Result of a validation pass
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ValidationReport {
    /// Whether no error-level issue was found
    pub valid: bool,
    /// State the validator ended in
    pub state: ValidatorState,
    /// Issues in document order
    pub issues: Vec<ValidationIssue>,
}

impl ValidationReport {
    /// Build a report from the issues of a pass
    pub fn new(state: ValidatorState, issues: Vec<ValidationIssue>) -> Self {
        let valid = state != ValidatorState::Invalid && !issues.iter().any(|i| i.is_error());
        Self {
            valid,
            state,
            issues,
        }
    }

    /// Whether the document is valid
    pub fn is_valid(&self) -> bool {
        self.valid
    }

    /// Error-level issues
    pub fn errors(&self) -> impl Iterator<Item = &ValidationIssue> {
        self.issues.iter().filter(|i| i.is_error())
    }

    /// Number of issues of a kind
    pub fn count_of(&self, kind: IssueKind) -> usize {
        self.issues.iter().filter(|i| i.kind == kind).count()
    }

    /// JSON rendering of the report
    pub fn to_json(&self) -> serde_json::Result<String> {
        serde_json::to_string_pretty(self)
    }
}

impl fmt::Display for ValidationReport {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if self.valid {
            write!(f, "valid")?;
        } else {
            write!(f, "invalid")?;
        }
        for issue in &self.issues {
            write!(f, "\n{}", issue)?;
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::validators::exceptions::Severity;

    #[test]
    fn test_report_validity() {
        let warning = ValidationIssue::new(IssueKind::UndeclaredElement, "lax root")
            .with_severity(Severity::Warning);
        let report = ValidationReport::new(ValidatorState::AfterDocument, vec![warning]);
        assert!(report.is_valid());
        assert_eq!(report.errors().count(), 0);

        let missing = ValidationIssue::new(IssueKind::MissingElement, "missing 'c'");
        let report = ValidationReport::new(ValidatorState::AfterDocument, vec![missing]);
        assert!(!report.is_valid());
        assert_eq!(report.count_of(IssueKind::MissingElement), 1);
        assert!(report.to_string().starts_with("invalid"));

        let report = ValidationReport::new(ValidatorState::Invalid, Vec::new());
        assert!(!report.is_valid());
    }

    #[test]
    fn test_report_json() {
        let report = ValidationReport::new(ValidatorState::AfterDocument, Vec::new());
        let json = report.to_json().unwrap();
        assert!(json.contains("\"valid\": true"));
        assert!(json.contains("\"state\": \"after_document\""));
    }

    #[test]
    fn test_options() {
        let options = ValidatorOptions::new().with_mode(ValidationMode::Lax);
        assert_eq!(options.mode, ValidationMode::Lax);
        assert_eq!(options.limits, Limits::default());
    }
}
