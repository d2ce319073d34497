//! Element declarations

use crate::namespaces::QName;

use super::complex_types::{DerivationFlags, TypeKey};

/// Index of an element declaration in its
/// [`SchemaTypeSystem`](super::SchemaTypeSystem)
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct ElementKey(pub u32);

impl ElementKey {
    /// Position in the element arena
    pub fn index(self) -> usize {
        self.0 as usize
    }
}

/// The scope of an element declaration
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum ElementScope {
    /// Global element declaration
    #[default]
    Global,
    /// Local element declaration (within a complex type or group)
    Local,
}

impl std::fmt::Display for ElementScope {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Global => write!(f, "global"),
            Self::Local => write!(f, "local"),
        }
    }
}

/// Compiled element declaration
#[derive(Debug, Clone, PartialEq)]
pub struct ElementDeclaration {
    /// Element name
    pub name: QName,
    /// Declared type
    pub type_key: TypeKey,
    /// Global or local
    pub scope: ElementScope,
    /// Substitution group head, for global declarations
    pub substitution_group: Option<ElementKey>,
    /// Whether the element may not appear in instances itself
    pub is_abstract: bool,
    /// Whether `xsi:nil` is allowed
    pub nillable: bool,
    /// Fixed value constraint
    pub fixed: Option<String>,
    /// Default value
    pub default: Option<String>,
    /// Block flags (extension, restriction, substitution)
    pub block: DerivationFlags,
    /// Final flags limiting substitution group members
    pub final_deriv: DerivationFlags,
}

impl ElementDeclaration {
    /// Create a declaration of the given type
    pub fn new(name: QName, type_key: TypeKey, scope: ElementScope) -> Self {
        Self {
            name,
            type_key,
            scope,
            substitution_group: None,
            is_abstract: false,
            nillable: false,
            fixed: None,
            default: None,
            block: DerivationFlags::default(),
            final_deriv: DerivationFlags::default(),
        }
    }

    /// Whether this is a global declaration
    pub fn is_global(&self) -> bool {
        self.scope == ElementScope::Global
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_element_declaration() {
        let decl = ElementDeclaration::new(QName::local("a"), TypeKey(0), ElementScope::Local);
        assert!(!decl.is_global());
        assert!(!decl.nillable);
        assert_eq!(decl.type_key, TypeKey(0));
        assert_eq!(ElementScope::Global.to_string(), "global");
    }
}
