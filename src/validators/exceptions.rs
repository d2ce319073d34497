//! Validation issues
//!
//! Content problems found while validating an instance document. They are
//! values collected in document order, never errors: a pass always runs to
//! the end of its input unless the token store itself fails.

use serde::Serialize;
use std::fmt;

use crate::locations::SourceLocation;

/// How serious an issue is
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum Severity {
    /// Makes the document invalid
    Error,
    /// Worth reporting, the document stays valid
    Warning,
    /// Informational
    Info,
}

impl fmt::Display for Severity {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Error => write!(f, "error"),
            Self::Warning => write!(f, "warning"),
            Self::Info => write!(f, "info"),
        }
    }
}

/// What went wrong
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum IssueKind {
    /// A required child element is absent
    MissingElement,
    /// A child element is not allowed at its position
    UnexpectedElement,
    /// A required attribute is absent
    MissingAttribute,
    /// An attribute is neither declared nor matched by a wildcard
    AttributeNotAllowed,
    /// An abstract element or type was used directly
    AbstractElementUsed,
    /// A substitution group member is blocked by its head
    SubstitutionFinalViolation,
    /// No global declaration for an element that needs one
    UndeclaredElement,
    /// `xsi:type` names an unknown, unrelated or blocked type
    InvalidXsiType,
    /// `xsi:nil` on a non-nillable element, or a nilled element with content
    NotNillable,
    /// Character data where the content type allows none
    TextNotAllowed,
    /// A value differs from its fixed value constraint
    FixedValueMismatch,
    /// The input ended before the document was complete
    IncompleteDocument,
}

impl IssueKind {
    /// Snake case name
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::MissingElement => "missing_element",
            Self::UnexpectedElement => "unexpected_element",
            Self::MissingAttribute => "missing_attribute",
            Self::AttributeNotAllowed => "attribute_not_allowed",
            Self::AbstractElementUsed => "abstract_element_used",
            Self::SubstitutionFinalViolation => "substitution_final_violation",
            Self::UndeclaredElement => "undeclared_element",
            Self::InvalidXsiType => "invalid_xsi_type",
            Self::NotNillable => "not_nillable",
            Self::TextNotAllowed => "text_not_allowed",
            Self::FixedValueMismatch => "fixed_value_mismatch",
            Self::IncompleteDocument => "incomplete_document",
        }
    }
}

impl fmt::Display for IssueKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// A single finding of a validation pass
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ValidationIssue {
    /// Severity
    pub severity: Severity,
    /// Kind of problem
    pub kind: IssueKind,
    /// Human readable message
    pub message: String,
    /// Element path, e.g. `/order/item`
    #[serde(skip_serializing_if = "Option::is_none")]
    pub path: Option<String>,
    /// Where the offending token was read
    #[serde(skip_serializing_if = "Option::is_none")]
    pub location: Option<SourceLocation>,
    /// Names that would have been valid
    #[serde(skip_serializing_if = "Vec::is_empty")]
    pub expected: Vec<String>,
    /// Name of the element concerned
    #[serde(skip_serializing_if = "Option::is_none")]
    pub element: Option<String>,
}

impl ValidationIssue {
    /// Create an error-level issue
    pub fn new(kind: IssueKind, message: impl Into<String>) -> Self {
        Self {
            severity: Severity::Error,
            kind,
            message: message.into(),
            path: None,
            location: None,
            expected: Vec::new(),
            element: None,
        }
    }

    /// Set the severity
    pub fn with_severity(mut self, severity: Severity) -> Self {
        self.severity = severity;
        self
    }

    /// Set the element path
    pub fn with_path(mut self, path: impl Into<String>) -> Self {
        self.path = Some(path.into());
        self
    }

    /// Set the source location
    pub fn with_location(mut self, location: Option<SourceLocation>) -> Self {
        self.location = location;
        self
    }

    /// Set the names that would have been valid
    pub fn with_expected(mut self, expected: Vec<String>) -> Self {
        self.expected = expected;
        self
    }

    /// Set the element concerned
    pub fn with_element(mut self, element: impl Into<String>) -> Self {
        self.element = Some(element.into());
        self
    }

    /// Whether the issue makes the document invalid
    pub fn is_error(&self) -> bool {
        self.severity == Severity::Error
    }
}

impl fmt::Display for ValidationIssue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if let Some(ref location) = self.location {
            write!(f, "{}: ", location)?;
        }
        write!(f, "{} [{}]: {}", self.severity, self.kind, self.message)?;
        if !self.expected.is_empty() {
            write!(f, " (expected: {})", self.expected.join(", "))?;
        }
        if let Some(ref path) = self.path {
            write!(f, "\nPath: {}", path)?;
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_issue_display() {
        let issue = ValidationIssue::new(IssueKind::MissingElement, "element 'c' is missing")
            .with_path("/root")
            .with_location(Some(SourceLocation::new(3, 5)))
            .with_expected(vec!["c".to_string()]);
        let text = issue.to_string();
        assert!(text.starts_with("3:5: error [missing_element]"));
        assert!(text.contains("(expected: c)"));
        assert!(text.contains("Path: /root"));
        assert!(issue.is_error());
    }

    #[test]
    fn test_issue_serialization() {
        let issue = ValidationIssue::new(IssueKind::UndeclaredElement, "no declaration")
            .with_severity(Severity::Warning)
            .with_element("x");
        let json = serde_json::to_value(&issue).unwrap();
        assert_eq!(json["severity"], "warning");
        assert_eq!(json["kind"], "undeclared_element");
        assert_eq!(json["element"], "x");
        assert!(json.get("path").is_none());
        assert!(json.get("expected").is_none());
        assert!(!issue.is_error());
    }
}
