//! Schema types
//!
//! Compiled type definitions. A [`SchemaType`] is either simple (opaque
//! character data here, no facets) or complex, in which case it carries its
//! content model, attribute uses and attribute wildcard with everything
//! inherited from its base already merged in.

use indexmap::IndexMap;

use crate::namespaces::QName;

use super::attributes::AttributeUse;
use super::groups::Particle;
use super::wildcards::Wildcard;

/// Index of a type in its [`SchemaTypeSystem`](super::SchemaTypeSystem)
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Default)]
pub struct TypeKey(pub u32);

impl TypeKey {
    /// Position in the type arena
    pub fn index(self) -> usize {
        self.0 as usize
    }
}

/// Derivation method for types
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub enum DerivationMethod {
    /// Type derived by restriction
    #[default]
    Restriction,
    /// Type derived by extension
    Extension,
}

impl DerivationMethod {
    /// Parse from a schema element local name
    pub fn from_str(s: &str) -> Option<Self> {
        match s {
            "restriction" => Some(Self::Restriction),
            "extension" => Some(Self::Extension),
            _ => None,
        }
    }
}

impl std::fmt::Display for DerivationMethod {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Restriction => write!(f, "restriction"),
            Self::Extension => write!(f, "extension"),
        }
    }
}

/// Content type label of a complex type
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ContentTypeLabel {
    /// No content (empty element)
    Empty,
    /// Simple content (text only)
    Simple,
    /// Mixed content (text and elements)
    Mixed,
    /// Element-only content
    ElementOnly,
}

impl ContentTypeLabel {
    /// Whether character data other than whitespace is allowed
    pub fn allows_text(&self) -> bool {
        matches!(self, Self::Simple | Self::Mixed)
    }
}

impl std::fmt::Display for ContentTypeLabel {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Empty => write!(f, "empty"),
            Self::Simple => write!(f, "simple"),
            Self::Mixed => write!(f, "mixed"),
            Self::ElementOnly => write!(f, "element-only"),
        }
    }
}

/// Simple or complex
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum TypeVariety {
    /// Character data only, no attributes
    Simple,
    /// Attributes and a content model
    Complex,
}

/// Block/final derivation flags
///
/// `substitution` is only meaningful in an element's `block` set.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub struct DerivationFlags {
    /// Block/finalize restriction
    pub restriction: bool,
    /// Block/finalize extension
    pub extension: bool,
    /// Block substitution (elements only)
    pub substitution: bool,
}

impl DerivationFlags {
    /// All derivations blocked/finalized
    pub fn all() -> Self {
        Self {
            restriction: true,
            extension: true,
            substitution: true,
        }
    }

    /// Parse from attribute value
    pub fn from_attr(value: &str) -> Self {
        let mut flags = DerivationFlags::default();
        for token in value.split_whitespace() {
            match token {
                "#all" => return Self::all(),
                "restriction" => flags.restriction = true,
                "extension" => flags.extension = true,
                "substitution" => flags.substitution = true,
                _ => {}
            }
        }
        flags
    }

    /// Flags set for a single derivation step
    pub fn of(method: DerivationMethod) -> Self {
        let mut flags = Self::default();
        flags.insert(method);
        flags
    }

    /// Add a derivation method
    pub fn insert(&mut self, method: DerivationMethod) {
        match method {
            DerivationMethod::Restriction => self.restriction = true,
            DerivationMethod::Extension => self.extension = true,
        }
    }

    /// Check if a derivation method is blocked
    pub fn is_blocked(&self, method: DerivationMethod) -> bool {
        match method {
            DerivationMethod::Restriction => self.restriction,
            DerivationMethod::Extension => self.extension,
        }
    }

    /// Flags set in either operand
    pub fn union(&self, other: &Self) -> Self {
        Self {
            restriction: self.restriction || other.restriction,
            extension: self.extension || other.extension,
            substitution: self.substitution || other.substitution,
        }
    }

    /// Whether a derivation using `methods` is ruled out by these flags
    pub fn forbids(&self, methods: &Self) -> bool {
        (self.restriction && methods.restriction) || (self.extension && methods.extension)
    }

    /// Whether no flag is set
    pub fn is_empty(&self) -> bool {
        !(self.restriction || self.extension || self.substitution)
    }
}

/// Compiled type definition
#[derive(Debug, Clone, PartialEq)]
pub struct SchemaType {
    /// Type name (None for anonymous types)
    pub name: Option<QName>,
    /// Simple or complex
    pub variety: TypeVariety,
    /// Base type (None only for xs:anyType)
    pub base: Option<TypeKey>,
    /// How the type was derived from its base
    pub derivation: Option<DerivationMethod>,
    /// Content type label
    pub content_type: ContentTypeLabel,
    /// Root of the content model, absent for empty and simple content
    pub particle: Option<Particle>,
    /// Attribute uses, inherited ones included
    pub attributes: IndexMap<QName, AttributeUse>,
    /// Attribute wildcard
    pub attribute_wildcard: Option<Wildcard>,
    /// Whether this type is abstract
    pub is_abstract: bool,
    /// Block derivation flags
    pub block: DerivationFlags,
    /// Final derivation flags
    pub final_deriv: DerivationFlags,
}

impl SchemaType {
    /// Create a complex type with empty content
    pub fn complex(name: Option<QName>) -> Self {
        Self {
            name,
            variety: TypeVariety::Complex,
            base: None,
            derivation: None,
            content_type: ContentTypeLabel::Empty,
            particle: None,
            attributes: IndexMap::new(),
            attribute_wildcard: None,
            is_abstract: false,
            block: DerivationFlags::default(),
            final_deriv: DerivationFlags::default(),
        }
    }

    /// Create a simple type
    pub fn simple(name: Option<QName>) -> Self {
        Self {
            variety: TypeVariety::Simple,
            content_type: ContentTypeLabel::Simple,
            ..Self::complex(name)
        }
    }

    /// Whether this is a simple type
    pub fn is_simple(&self) -> bool {
        self.variety == TypeVariety::Simple
    }

    /// Whether this is a complex type
    pub fn is_complex(&self) -> bool {
        self.variety == TypeVariety::Complex
    }

    /// Whether the content type is empty
    pub fn is_empty(&self) -> bool {
        self.content_type == ContentTypeLabel::Empty
    }

    /// Whether the content type is mixed
    pub fn is_mixed(&self) -> bool {
        self.content_type == ContentTypeLabel::Mixed
    }

    /// Required attribute uses
    pub fn required_attributes(&self) -> impl Iterator<Item = &AttributeUse> {
        self.attributes.values().filter(|a| a.required)
    }

    /// Name for messages
    pub fn display_name(&self) -> String {
        match &self.name {
            Some(name) => name.to_string(),
            None => "(anonymous)".to_string(),
        }
    }
}

/// Derivation methods used on the way from `derived` up to `base`
///
/// Returns None when `base` is not an ancestor. Every type derives from
/// `any_type`. The walk is bounded by the arena size, so a base chain that
/// loops can never hang it.
pub fn derivation_methods(
    types: &[SchemaType],
    derived: TypeKey,
    base: TypeKey,
    any_type: TypeKey,
) -> Option<DerivationFlags> {
    let mut methods = DerivationFlags::default();
    let mut current = derived;
    for _ in 0..=types.len() {
        if current == base {
            return Some(methods);
        }
        let ty = types.get(current.index())?;
        match ty.base {
            Some(next) => {
                if let Some(method) = ty.derivation {
                    methods.insert(method);
                }
                current = next;
            }
            None => break,
        }
    }
    if base == any_type {
        Some(methods)
    } else {
        None
    }
}
