//! Error types for xmlcursor
//!
//! This module defines the fatal error types used throughout the library.
//! Recoverable content problems found while validating are not errors in this
//! sense: they are collected as [`ValidationIssue`](crate::validators::ValidationIssue)
//! values and never abort a pass.

use std::fmt;
use thiserror::Error;

/// Result type alias using xmlcursor Error
pub type Result<T> = std::result::Result<T, Error>;

/// Main error type for xmlcursor operations
#[derive(Error, Debug)]
pub enum Error {
    /// Token store invariant violation; the offending edit was not applied
    #[error("malformed structure: {0}")]
    Structural(String),

    /// A position handle no longer names a live token of the store
    #[error("stale position: {0}")]
    StalePosition(String),

    /// Two positions or cursors from different token stores were combined
    #[error("cross-document operation: positions belong to different token stores")]
    CrossDocument,

    /// A redefine chain loops back on itself; the type system is unusable
    #[error("{0}")]
    CircularRedefinition(#[from] CircularityError),

    /// A bookmark whose token has been deleted was resolved
    #[error("bookmark '{0}' no longer refers to a token of its document")]
    BookmarkInvalidated(String),

    /// The type system was queried for content models before `resolve()`
    #[error("schema type system is not resolved")]
    NotResolved,

    /// XML Schema document reading error
    #[error("parse error: {0}")]
    Parse(#[from] ParseError),

    /// Name error (invalid XML name)
    #[error("name error: {0}")]
    Name(String),

    /// Resource loading error
    #[error("resource error: {0}")]
    Resource(String),

    /// Limit exceeded error
    #[error("limit exceeded: {0}")]
    LimitExceeded(String),

    /// I/O error
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// XML parsing error
    #[error("XML error: {0}")]
    Xml(String),

    /// URL parsing error
    #[error("URL error: {0}")]
    Url(#[from] url::ParseError),
}

impl Error {
    /// Shorthand for a [`Error::Structural`] error
    pub fn malformed(message: impl Into<String>) -> Self {
        Error::Structural(message.into())
    }

    /// Whether this error aborts a validation pass
    pub fn is_fatal(&self) -> bool {
        matches!(
            self,
            Error::Structural(_) | Error::StalePosition(_) | Error::CrossDocument
        )
    }
}

/// Circular redefinition detected while compiling a set of schema documents
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CircularityError {
    /// The component kind (`schema`, `complexType`, `group`)
    pub component_type: String,
    /// The component that closed the cycle
    pub component_name: String,
    /// The chain of components forming the cycle
    pub cycle_path: Vec<String>,
}

impl CircularityError {
    /// Create a new circularity error
    pub fn new(component_type: impl Into<String>, component_name: impl Into<String>) -> Self {
        Self {
            component_type: component_type.into(),
            component_name: component_name.into(),
            cycle_path: Vec::new(),
        }
    }

    /// Set the cycle path
    pub fn with_cycle_path(mut self, path: Vec<String>) -> Self {
        self.cycle_path = path;
        self
    }
}

impl fmt::Display for CircularityError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "circular redefinition detected for xs:{} '{}'",
            self.component_type, self.component_name
        )?;
        if !self.cycle_path.is_empty() {
            write!(f, " (cycle: {})", self.cycle_path.join(" -> "))?;
        }
        Ok(())
    }
}

impl std::error::Error for CircularityError {}

/// XML Schema reading or compilation error
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ParseError {
    /// Error message
    pub message: String,
    /// Location in the schema document
    pub location: Option<String>,
    /// Schema component that caused the error
    pub component: Option<String>,
}

impl ParseError {
    /// Create a new parse error
    pub fn new(message: impl Into<String>) -> Self {
        Self {
            message: message.into(),
            location: None,
            component: None,
        }
    }

    /// Set the location
    pub fn with_location(mut self, location: impl Into<String>) -> Self {
        self.location = Some(location.into());
        self
    }

    /// Set the component
    pub fn with_component(mut self, component: impl Into<String>) -> Self {
        self.component = Some(component.into());
        self
    }
}

impl fmt::Display for ParseError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.message)?;

        if let Some(ref component) = self.component {
            write!(f, " [{}]", component)?;
        }

        if let Some(ref loc) = self.location {
            write!(f, " at {}", loc)?;
        }

        Ok(())
    }
}

impl std::error::Error for ParseError {}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_error_display() {
        let err = ParseError::new("unknown type 'foo'")
            .with_location("a.xsd:42:10")
            .with_component("complexType 'T'");

        let msg = format!("{}", err);
        assert!(msg.contains("unknown type 'foo'"));
        assert!(msg.contains("a.xsd:42:10"));
        assert!(msg.contains("complexType 'T'"));
    }

    #[test]
    fn test_circularity_error_mentions_circular() {
        let err = CircularityError::new("schema", "A.xsd").with_cycle_path(vec![
            "A.xsd".to_string(),
            "D.xsd".to_string(),
            "A.xsd".to_string(),
        ]);
        let err: Error = err.into();
        let msg = err.to_string();
        assert!(msg.contains("circular"));
        assert!(msg.contains("A.xsd -> D.xsd -> A.xsd"));
    }

    #[test]
    fn test_error_conversion() {
        let err: Error = ParseError::new("test").into();
        assert!(matches!(err, Error::Parse(_)));
        assert!(!err.is_fatal());
        assert!(Error::CrossDocument.is_fatal());
        assert!(Error::malformed("unbalanced").is_fatal());
    }
}
