//! Global component tables
//!
//! Name lookup for the top-level components of a resolved type system, and
//! the substitution group sets computed from element affiliations. Maps keep
//! declaration order so that lookups, error lists and substitution sets are
//! deterministic.

use indexmap::IndexMap;

use crate::namespaces::QName;

use super::attributes::AttributeDeclaration;
use super::complex_types::TypeKey;
use super::elements::ElementKey;

/// Type map - maps QNames to global types
pub type TypeMap = IndexMap<QName, TypeKey>;
/// Element map - maps QNames to global element declarations
pub type ElementMap = IndexMap<QName, ElementKey>;
/// Attribute map - maps QNames to global attribute declarations
pub type AttributeMap = IndexMap<QName, AttributeDeclaration>;

/// Legal members of a substitution group
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SubstitutionGroup {
    /// The head element
    pub head: ElementKey,
    /// Head first, then every admitted member in declaration order
    pub members: Vec<ElementKey>,
    /// Declared members ruled out by `block`/`final`
    pub excluded: Vec<ElementKey>,
}

impl SubstitutionGroup {
    /// Group with no members besides its head
    pub fn new(head: ElementKey) -> Self {
        Self {
            head,
            members: vec![head],
            excluded: Vec::new(),
        }
    }

    /// Whether `element` may stand in for the head
    pub fn admits(&self, element: ElementKey) -> bool {
        self.members.contains(&element)
    }

    /// Whether `element` declares the head but was ruled out
    pub fn excludes(&self, element: ElementKey) -> bool {
        self.excluded.contains(&element)
    }
}

/// Global declarations of a type system
#[derive(Debug, Clone, Default)]
pub struct XsdGlobals {
    /// Global and built-in types
    pub types: TypeMap,
    /// Global elements
    pub elements: ElementMap,
    /// Global attributes
    pub attributes: AttributeMap,
    /// Substitution groups keyed by head
    pub substitution_groups: IndexMap<ElementKey, SubstitutionGroup>,
}

impl XsdGlobals {
    /// Create empty tables
    pub fn new() -> Self {
        Self::default()
    }

    /// Look up a global type
    pub fn lookup_type(&self, name: &QName) -> Option<TypeKey> {
        self.types.get(name).copied()
    }

    /// Look up a global element
    pub fn lookup_element(&self, name: &QName) -> Option<ElementKey> {
        self.elements.get(name).copied()
    }

    /// Look up a global attribute
    pub fn lookup_attribute(&self, name: &QName) -> Option<&AttributeDeclaration> {
        self.attributes.get(name)
    }

    /// Substitution group headed by `head`
    pub fn substitution_group(&self, head: ElementKey) -> Option<&SubstitutionGroup> {
        self.substitution_groups.get(&head)
    }

    /// Number of global components
    pub fn len(&self) -> usize {
        self.types.len() + self.elements.len() + self.attributes.len()
    }

    /// Whether no global component is registered
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_lookup() {
        let mut globals = XsdGlobals::new();
        assert!(globals.is_empty());
        globals.types.insert(QName::local("T"), TypeKey(3));
        globals.elements.insert(QName::local("e"), ElementKey(1));
        assert_eq!(globals.lookup_type(&QName::local("T")), Some(TypeKey(3)));
        assert_eq!(globals.lookup_element(&QName::local("e")), Some(ElementKey(1)));
        assert!(globals.lookup_attribute(&QName::local("a")).is_none());
        assert_eq!(globals.len(), 2);
    }

    #[test]
    fn test_substitution_group() {
        let mut group = SubstitutionGroup::new(ElementKey(0));
        group.members.push(ElementKey(2));
        group.excluded.push(ElementKey(3));
        assert!(group.admits(ElementKey(0)));
        assert!(group.admits(ElementKey(2)));
        assert!(!group.admits(ElementKey(3)));
        assert!(group.excludes(ElementKey(3)));
    }
}
