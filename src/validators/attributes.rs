//! Attribute declarations and uses

use crate::error::{ParseError, Result};
use crate::namespaces::QName;

/// Attribute use mode
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub enum AttributeUseKind {
    /// Attribute is optional (default)
    #[default]
    Optional,
    /// Attribute is required
    Required,
    /// Attribute is prohibited
    Prohibited,
}

impl AttributeUseKind {
    /// Parse from string value
    pub fn from_str(s: &str) -> Result<Self> {
        match s {
            "optional" => Ok(Self::Optional),
            "required" => Ok(Self::Required),
            "prohibited" => Ok(Self::Prohibited),
            _ => Err(ParseError::new(format!(
                "invalid attribute use value: '{}'. Must be 'optional', 'required', or 'prohibited'",
                s
            ))
            .into()),
        }
    }

    /// Get the use as a string
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Optional => "optional",
            Self::Required => "required",
            Self::Prohibited => "prohibited",
        }
    }
}

impl std::fmt::Display for AttributeUseKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

/// Global attribute declaration
#[derive(Debug, Clone, PartialEq)]
pub struct AttributeDeclaration {
    /// Attribute name
    pub name: QName,
    /// Declared simple type name
    pub type_name: Option<QName>,
    /// Fixed value constraint
    pub fixed: Option<String>,
    /// Default value
    pub default: Option<String>,
}

impl AttributeDeclaration {
    /// Create a declaration
    pub fn new(name: QName) -> Self {
        Self {
            name,
            type_name: None,
            fixed: None,
            default: None,
        }
    }
}

/// Attribute use of a complex type
#[derive(Debug, Clone, PartialEq)]
pub struct AttributeUse {
    /// Attribute name
    pub name: QName,
    /// Whether the attribute must be present
    pub required: bool,
    /// Declared simple type name
    pub type_name: Option<QName>,
    /// Fixed value constraint
    pub fixed: Option<String>,
    /// Default value
    pub default: Option<String>,
}

impl AttributeUse {
    /// Create an optional use
    pub fn new(name: QName) -> Self {
        Self {
            name,
            required: false,
            type_name: None,
            fixed: None,
            default: None,
        }
    }

    /// Mark the use as required
    pub fn with_required(mut self, required: bool) -> Self {
        self.required = required;
        self
    }

    /// Whether `value` satisfies the fixed constraint, if any
    pub fn accepts(&self, value: &str) -> bool {
        match &self.fixed {
            Some(fixed) => fixed.trim() == value.trim(),
            None => true,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_use_kind() {
        assert_eq!(
            AttributeUseKind::from_str("required").unwrap(),
            AttributeUseKind::Required
        );
        assert!(AttributeUseKind::from_str("mandatory").is_err());
        assert_eq!(AttributeUseKind::Prohibited.to_string(), "prohibited");
    }

    #[test]
    fn test_fixed_value() {
        let mut attr = AttributeUse::new(QName::local("v")).with_required(true);
        assert!(attr.accepts("anything"));
        attr.fixed = Some("1.0".to_string());
        assert!(attr.accepts(" 1.0 "));
        assert!(!attr.accepts("2.0"));
    }
}
