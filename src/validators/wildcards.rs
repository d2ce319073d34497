//! Wildcards
//!
//! `xs:any` and `xs:anyAttribute` admit names by namespace alone. The
//! namespace attribute keywords are resolved against the target namespace
//! of the declaring schema document when the wildcard is read, so matching
//! never needs that context again.

use crate::error::ParseError;
use crate::namespaces::QName;
use std::collections::BTreeSet;
use std::fmt;

/// Process contents mode for wildcards
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum ProcessContents {
    /// Validate strictly - element/attribute must be declared
    #[default]
    Strict,
    /// Validate if declaration found, otherwise accept
    Lax,
    /// Skip validation entirely
    Skip,
}

impl ProcessContents {
    /// Parse from string value
    pub fn from_str(s: &str) -> Option<Self> {
        match s {
            "strict" => Some(Self::Strict),
            "lax" => Some(Self::Lax),
            "skip" => Some(Self::Skip),
            _ => None,
        }
    }

    /// Check if this is a valid restriction of another process contents
    pub fn is_restriction_of(&self, other: &Self) -> bool {
        matches!(
            (self, other),
            (Self::Strict, _) | (Self::Lax, Self::Lax | Self::Skip) | (Self::Skip, Self::Skip)
        )
    }
}

impl fmt::Display for ProcessContents {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Strict => write!(f, "strict"),
            Self::Lax => write!(f, "lax"),
            Self::Skip => write!(f, "skip"),
        }
    }
}

/// Namespace constraint for wildcards
///
/// The empty string stands for "no namespace" inside enumerations.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub enum NamespaceConstraint {
    /// Any namespace is allowed (##any)
    #[default]
    Any,
    /// Any namespace except the target namespace and no namespace (##other)
    Other {
        /// The target namespace to exclude
        target_namespace: Option<String>,
    },
    /// Specific set of allowed namespaces
    Enumeration(BTreeSet<String>),
}

impl NamespaceConstraint {
    /// Create from namespace attribute value
    pub fn from_namespace_attr(
        value: &str,
        target_namespace: Option<&str>,
    ) -> Result<Self, ParseError> {
        match value.trim() {
            "##any" => Ok(Self::Any),
            "##other" => Ok(Self::Other {
                target_namespace: target_namespace.map(String::from),
            }),
            value => {
                let mut namespaces = BTreeSet::new();
                for ns in value.split_whitespace() {
                    match ns {
                        "##local" => {
                            namespaces.insert(String::new());
                        }
                        "##targetNamespace" => {
                            namespaces.insert(target_namespace.unwrap_or_default().to_string());
                        }
                        s if s.starts_with("##") => {
                            return Err(ParseError::new(format!(
                                "wrong value '{}' in 'namespace' attribute",
                                s
                            )));
                        }
                        uri => {
                            namespaces.insert(uri.to_string());
                        }
                    }
                }
                Ok(Self::Enumeration(namespaces))
            }
        }
    }

    /// Check if a namespace ("" for none) is allowed by this constraint
    pub fn is_allowed(&self, namespace: &str) -> bool {
        match self {
            Self::Any => true,
            Self::Other { target_namespace } => {
                !namespace.is_empty() && target_namespace.as_deref() != Some(namespace)
            }
            Self::Enumeration(set) => set.contains(namespace),
        }
    }

    /// Check if this constraint admits no more than `other` does
    pub fn is_restriction_of(&self, other: &Self) -> bool {
        match (self, other) {
            (a, b) if a == b => true,
            (_, Self::Any) => true,
            (Self::Any, _) => false,
            (Self::Enumeration(set), other) => set.iter().all(|ns| other.is_allowed(ns)),
            (Self::Other { .. }, Self::Enumeration(_)) => false,
            (Self::Other { .. }, Self::Other { .. }) => false,
        }
    }

    /// Compute union with another constraint
    pub fn union(&self, other: &Self) -> Self {
        match (self, other) {
            (Self::Any, _) | (_, Self::Any) => Self::Any,
            (Self::Enumeration(a), Self::Enumeration(b)) => {
                Self::Enumeration(a.union(b).cloned().collect())
            }
            (Self::Other { .. }, Self::Enumeration(set))
            | (Self::Enumeration(set), Self::Other { .. }) => {
                let other = if matches!(self, Self::Other { .. }) { self } else { other };
                if set.iter().all(|ns| other.is_allowed(ns)) {
                    other.clone()
                } else {
                    Self::Any
                }
            }
            (a, b) if a == b => a.clone(),
            _ => Self::Any,
        }
    }
}

impl fmt::Display for NamespaceConstraint {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Any => write!(f, "##any"),
            Self::Other { .. } => write!(f, "##other"),
            Self::Enumeration(set) => {
                let names: Vec<&str> = set
                    .iter()
                    .map(|ns| if ns.is_empty() { "##local" } else { ns.as_str() })
                    .collect();
                write!(f, "{}", names.join(" "))
            }
        }
    }
}

/// An element or attribute wildcard
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct Wildcard {
    /// Namespace constraint
    pub namespace: NamespaceConstraint,
    /// Process contents mode
    pub process_contents: ProcessContents,
}

impl Wildcard {
    /// Create a wildcard
    pub fn new(namespace: NamespaceConstraint, process_contents: ProcessContents) -> Self {
        Self {
            namespace,
            process_contents,
        }
    }

    /// `##any` wildcard with lax processing, as carried by `xs:anyType`
    pub fn any_lax() -> Self {
        Self::new(NamespaceConstraint::Any, ProcessContents::Lax)
    }

    /// Whether the wildcard admits `name`
    pub fn matches(&self, name: &QName) -> bool {
        self.namespace.is_allowed(name.namespace_str())
    }

    /// Union used when an extension adds its own attribute wildcard
    pub fn union(&self, other: &Self) -> Self {
        Self {
            namespace: self.namespace.union(&other.namespace),
            process_contents: self.process_contents,
        }
    }

    /// Whether this wildcard is a valid restriction of `other`
    pub fn is_restriction_of(&self, other: &Self) -> bool {
        self.namespace.is_restriction_of(&other.namespace)
            && self.process_contents.is_restriction_of(&other.process_contents)
    }
}

impl fmt::Display for Wildcard {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{{{}}}", self.namespace)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn tns_constraint(value: &str) -> NamespaceConstraint {
        NamespaceConstraint::from_namespace_attr(value, Some("urn:tns")).unwrap()
    }

    #[test]
    fn test_process_contents() {
        assert_eq!(ProcessContents::from_str("lax"), Some(ProcessContents::Lax));
        assert_eq!(ProcessContents::from_str("loose"), None);
        assert!(ProcessContents::Strict.is_restriction_of(&ProcessContents::Skip));
        assert!(!ProcessContents::Skip.is_restriction_of(&ProcessContents::Lax));
        assert_eq!(ProcessContents::Skip.to_string(), "skip");
    }

    #[test]
    fn test_any_and_other() {
        let any = tns_constraint("##any");
        assert!(any.is_allowed(""));
        assert!(any.is_allowed("urn:x"));

        let other = tns_constraint("##other");
        assert!(other.is_allowed("urn:x"));
        assert!(!other.is_allowed("urn:tns"));
        assert!(!other.is_allowed(""));
    }

    #[test]
    fn test_enumeration_keywords() {
        let list = tns_constraint("##local ##targetNamespace urn:a");
        assert!(list.is_allowed(""));
        assert!(list.is_allowed("urn:tns"));
        assert!(list.is_allowed("urn:a"));
        assert!(!list.is_allowed("urn:b"));
        assert_eq!(list.to_string(), "##local urn:a urn:tns");

        assert!(NamespaceConstraint::from_namespace_attr("##bogus", None).is_err());
    }

    #[test]
    fn test_restriction_and_union() {
        let any = tns_constraint("##any");
        let other = tns_constraint("##other");
        let list = tns_constraint("urn:a");
        let local = tns_constraint("##local");

        assert!(list.is_restriction_of(&other));
        assert!(!local.is_restriction_of(&other));
        assert!(!any.is_restriction_of(&other));
        assert_eq!(list.union(&other), other);
        assert_eq!(local.union(&other), NamespaceConstraint::Any);
        assert_eq!(
            list.union(&local),
            tns_constraint("##local urn:a")
        );
    }

    #[test]
    fn test_wildcard_matches() {
        let w = Wildcard::new(tns_constraint("##other"), ProcessContents::Skip);
        assert!(w.matches(&QName::namespaced("urn:x", "e")));
        assert!(!w.matches(&QName::local("e")));
        assert_eq!(w.to_string(), "{##other}");
        assert!(Wildcard::any_lax().matches(&QName::local("e")));
    }
}
