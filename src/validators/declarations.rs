//! Schema declaration records
//!
//! Plain data describing the components of one schema document, exactly as
//! written: names are already namespace-resolved, references are still
//! names. [`parse_schema`](super::parse_schema) produces these records from
//! XSD text, but any caller can build them directly and hand them to
//! [`SchemaTypeSystem::add_document`](super::SchemaTypeSystem::add_document).

use crate::namespaces::QName;

use super::attributes::AttributeUseKind;
use super::complex_types::{DerivationFlags, DerivationMethod, TypeVariety};
use super::groups::ModelType;
use super::particles::Occurs;
use super::wildcards::Wildcard;

/// One schema document
#[derive(Debug, Clone, PartialEq, Default)]
pub struct SchemaDocument {
    /// Identifier used to match `schemaLocation` references and in messages
    pub uri: String,
    /// Target namespace
    pub target_namespace: Option<String>,
    /// Global type definitions
    pub types: Vec<TypeDef>,
    /// Global element declarations
    pub elements: Vec<ElementDef>,
    /// Global attribute declarations
    pub attributes: Vec<AttributeDef>,
    /// Named model groups
    pub groups: Vec<GroupDef>,
    /// Named attribute groups
    pub attribute_groups: Vec<AttributeGroupDef>,
    /// `xs:include` locations
    pub includes: Vec<String>,
    /// `xs:import` locations
    pub imports: Vec<String>,
    /// `xs:redefine` blocks in document order
    pub redefines: Vec<RedefineDef>,
}

impl SchemaDocument {
    /// Create an empty document record
    pub fn new(uri: impl Into<String>) -> Self {
        Self {
            uri: uri.into(),
            ..Default::default()
        }
    }

    /// Set the target namespace
    pub fn with_target_namespace(mut self, namespace: impl Into<String>) -> Self {
        self.target_namespace = Some(namespace.into());
        self
    }

    /// Add a global type
    pub fn with_type(mut self, def: TypeDef) -> Self {
        self.types.push(def);
        self
    }

    /// Add a global element
    pub fn with_element(mut self, def: ElementDef) -> Self {
        self.elements.push(def);
        self
    }

    /// Add a global attribute
    pub fn with_attribute(mut self, def: AttributeDef) -> Self {
        self.attributes.push(def);
        self
    }

    /// Add a named model group
    pub fn with_group(mut self, def: GroupDef) -> Self {
        self.groups.push(def);
        self
    }

    /// Add a named attribute group
    pub fn with_attribute_group(mut self, def: AttributeGroupDef) -> Self {
        self.attribute_groups.push(def);
        self
    }

    /// Add a redefine block
    pub fn with_redefine(mut self, def: RedefineDef) -> Self {
        self.redefines.push(def);
        self
    }

    /// Number of components the document declares, redefinitions included
    pub fn component_count(&self) -> usize {
        self.types.len()
            + self.elements.len()
            + self.attributes.len()
            + self.groups.len()
            + self.attribute_groups.len()
            + self
                .redefines
                .iter()
                .map(|r| r.types.len() + r.groups.len() + r.attribute_groups.len())
                .sum::<usize>()
    }
}

/// Type definition as written
#[derive(Debug, Clone, PartialEq)]
pub struct TypeDef {
    /// Type name (None for anonymous types)
    pub name: Option<QName>,
    /// Simple or complex
    pub variety: TypeVariety,
    /// Base type reference
    pub base: Option<QName>,
    /// Derivation method, when a base is given
    pub derivation: Option<DerivationMethod>,
    /// `xs:simpleContent`
    pub simple_content: bool,
    /// `mixed="true"`
    pub mixed: bool,
    /// Own content particle
    pub particle: Option<ParticleDef>,
    /// Own attribute uses
    pub attributes: Vec<AttributeUseDef>,
    /// Referenced attribute groups
    pub attribute_groups: Vec<QName>,
    /// Own attribute wildcard
    pub any_attribute: Option<Wildcard>,
    /// `abstract="true"`
    pub is_abstract: bool,
    /// Block flags
    pub block: DerivationFlags,
    /// Final flags
    pub final_deriv: DerivationFlags,
}

impl TypeDef {
    /// Complex type with empty content
    pub fn complex(name: Option<QName>) -> Self {
        Self {
            name,
            variety: TypeVariety::Complex,
            base: None,
            derivation: None,
            simple_content: false,
            mixed: false,
            particle: None,
            attributes: Vec::new(),
            attribute_groups: Vec::new(),
            any_attribute: None,
            is_abstract: false,
            block: DerivationFlags::default(),
            final_deriv: DerivationFlags::default(),
        }
    }

    /// Simple type, opaque apart from its base
    pub fn simple(name: Option<QName>) -> Self {
        Self {
            variety: TypeVariety::Simple,
            ..Self::complex(name)
        }
    }

    /// Derive by extension of `base`
    pub fn with_extension(mut self, base: QName) -> Self {
        self.base = Some(base);
        self.derivation = Some(DerivationMethod::Extension);
        self
    }

    /// Derive by restriction of `base`
    pub fn with_restriction(mut self, base: QName) -> Self {
        self.base = Some(base);
        self.derivation = Some(DerivationMethod::Restriction);
        self
    }

    /// Set the content particle
    pub fn with_particle(mut self, particle: ParticleDef) -> Self {
        self.particle = Some(particle);
        self
    }

    /// Add an attribute use
    pub fn with_attribute(mut self, attribute: AttributeUseDef) -> Self {
        self.attributes.push(attribute);
        self
    }

    /// Add an attribute group reference
    pub fn with_attribute_group(mut self, name: QName) -> Self {
        self.attribute_groups.push(name);
        self
    }

    /// Set the attribute wildcard
    pub fn with_any_attribute(mut self, wildcard: Wildcard) -> Self {
        self.any_attribute = Some(wildcard);
        self
    }

    /// Set mixed content
    pub fn with_mixed(mut self, mixed: bool) -> Self {
        self.mixed = mixed;
        self
    }

    /// Mark as simple content
    pub fn with_simple_content(mut self) -> Self {
        self.simple_content = true;
        self
    }

    /// Mark as abstract
    pub fn with_abstract(mut self) -> Self {
        self.is_abstract = true;
        self
    }

    /// Set block flags
    pub fn with_block(mut self, block: DerivationFlags) -> Self {
        self.block = block;
        self
    }

    /// Set final flags
    pub fn with_final(mut self, final_deriv: DerivationFlags) -> Self {
        self.final_deriv = final_deriv;
        self
    }
}

/// Element declaration as written
#[derive(Debug, Clone, PartialEq)]
pub struct ElementDef {
    /// Element name
    pub name: QName,
    /// Named type reference
    pub type_name: Option<QName>,
    /// Anonymous type definition
    pub anonymous_type: Option<Box<TypeDef>>,
    /// Substitution group head reference
    pub substitution_group: Option<QName>,
    /// `abstract="true"`
    pub is_abstract: bool,
    /// `nillable="true"`
    pub nillable: bool,
    /// Fixed value
    pub fixed: Option<String>,
    /// Default value
    pub default: Option<String>,
    /// Block flags
    pub block: DerivationFlags,
    /// Final flags
    pub final_deriv: DerivationFlags,
}

impl ElementDef {
    /// Element without a type (`xs:anyType`, or the head's type)
    pub fn new(name: QName) -> Self {
        Self {
            name,
            type_name: None,
            anonymous_type: None,
            substitution_group: None,
            is_abstract: false,
            nillable: false,
            fixed: None,
            default: None,
            block: DerivationFlags::default(),
            final_deriv: DerivationFlags::default(),
        }
    }

    /// Set a named type
    pub fn with_type(mut self, name: QName) -> Self {
        self.type_name = Some(name);
        self
    }

    /// Set an anonymous type
    pub fn with_anonymous_type(mut self, def: TypeDef) -> Self {
        self.anonymous_type = Some(Box::new(def));
        self
    }

    /// Join a substitution group
    pub fn with_substitution_group(mut self, head: QName) -> Self {
        self.substitution_group = Some(head);
        self
    }

    /// Mark as abstract
    pub fn with_abstract(mut self) -> Self {
        self.is_abstract = true;
        self
    }

    /// Mark as nillable
    pub fn with_nillable(mut self) -> Self {
        self.nillable = true;
        self
    }

    /// Set a fixed value
    pub fn with_fixed(mut self, value: impl Into<String>) -> Self {
        self.fixed = Some(value.into());
        self
    }

    /// Set block flags
    pub fn with_block(mut self, block: DerivationFlags) -> Self {
        self.block = block;
        self
    }

    /// Set final flags
    pub fn with_final(mut self, final_deriv: DerivationFlags) -> Self {
        self.final_deriv = final_deriv;
        self
    }
}

/// Global attribute declaration as written
#[derive(Debug, Clone, PartialEq)]
pub struct AttributeDef {
    /// Attribute name
    pub name: QName,
    /// Simple type reference
    pub type_name: Option<QName>,
    /// Fixed value
    pub fixed: Option<String>,
    /// Default value
    pub default: Option<String>,
}

impl AttributeDef {
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

/// Attribute use as written inside a type or attribute group
#[derive(Debug, Clone, PartialEq)]
pub struct AttributeUseDef {
    /// Attribute name, or the referenced global attribute
    pub name: QName,
    /// Whether `name` refers to a global attribute
    pub reference: bool,
    /// optional / required / prohibited
    pub use_kind: AttributeUseKind,
    /// Simple type reference of a local declaration
    pub type_name: Option<QName>,
    /// Fixed value
    pub fixed: Option<String>,
    /// Default value
    pub default: Option<String>,
}

impl AttributeUseDef {
    /// Local attribute declaration
    pub fn new(name: QName) -> Self {
        Self {
            name,
            reference: false,
            use_kind: AttributeUseKind::Optional,
            type_name: None,
            fixed: None,
            default: None,
        }
    }

    /// Reference to a global attribute
    pub fn reference(name: QName) -> Self {
        Self {
            reference: true,
            ..Self::new(name)
        }
    }

    /// Set the use
    pub fn with_use(mut self, use_kind: AttributeUseKind) -> Self {
        self.use_kind = use_kind;
        self
    }

    /// Set a fixed value
    pub fn with_fixed(mut self, value: impl Into<String>) -> Self {
        self.fixed = Some(value.into());
        self
    }
}

/// Term of a particle as written
#[derive(Debug, Clone, PartialEq)]
pub enum TermDef {
    /// Local element declaration
    Element(ElementDef),
    /// Reference to a global element
    ElementRef(QName),
    /// Inline model group
    Group(ModelType, Vec<ParticleDef>),
    /// Reference to a named model group
    GroupRef(QName),
    /// Element wildcard
    Any(Wildcard),
}

/// Particle as written
#[derive(Debug, Clone, PartialEq)]
pub struct ParticleDef {
    /// What the particle matches
    pub term: TermDef,
    /// Occurrence bounds
    pub occurs: Occurs,
}

impl ParticleDef {
    fn once(term: TermDef) -> Self {
        Self {
            term,
            occurs: Occurs::once(),
        }
    }

    /// Local element particle
    pub fn element(def: ElementDef) -> Self {
        Self::once(TermDef::Element(def))
    }

    /// Global element reference
    pub fn element_ref(name: QName) -> Self {
        Self::once(TermDef::ElementRef(name))
    }

    /// `xs:sequence`
    pub fn sequence(particles: Vec<ParticleDef>) -> Self {
        Self::once(TermDef::Group(ModelType::Sequence, particles))
    }

    /// `xs:choice`
    pub fn choice(particles: Vec<ParticleDef>) -> Self {
        Self::once(TermDef::Group(ModelType::Choice, particles))
    }

    /// `xs:all`
    pub fn all(particles: Vec<ParticleDef>) -> Self {
        Self::once(TermDef::Group(ModelType::All, particles))
    }

    /// Named group reference
    pub fn group_ref(name: QName) -> Self {
        Self::once(TermDef::GroupRef(name))
    }

    /// `xs:any`
    pub fn any(wildcard: Wildcard) -> Self {
        Self::once(TermDef::Any(wildcard))
    }

    /// Set occurrence bounds
    pub fn with_occurs(mut self, occurs: Occurs) -> Self {
        self.occurs = occurs;
        self
    }
}

/// Named model group as written
#[derive(Debug, Clone, PartialEq)]
pub struct GroupDef {
    /// Group name
    pub name: QName,
    /// The sequence, choice or all the group stands for
    pub particle: ParticleDef,
}

impl GroupDef {
    /// Create a group definition
    pub fn new(name: QName, particle: ParticleDef) -> Self {
        Self { name, particle }
    }
}

/// Named attribute group as written
#[derive(Debug, Clone, PartialEq)]
pub struct AttributeGroupDef {
    /// Group name
    pub name: QName,
    /// Attribute uses
    pub attributes: Vec<AttributeUseDef>,
    /// Nested attribute group references
    pub attribute_groups: Vec<QName>,
    /// Attribute wildcard
    pub any_attribute: Option<Wildcard>,
}

impl AttributeGroupDef {
    /// Create an empty attribute group
    pub fn new(name: QName) -> Self {
        Self {
            name,
            attributes: Vec::new(),
            attribute_groups: Vec::new(),
            any_attribute: None,
        }
    }

    /// Add an attribute use
    pub fn with_attribute(mut self, attribute: AttributeUseDef) -> Self {
        self.attributes.push(attribute);
        self
    }
}

/// `xs:redefine` block
#[derive(Debug, Clone, PartialEq, Default)]
pub struct RedefineDef {
    /// Location of the redefined document
    pub schema_location: String,
    /// Redefined types
    pub types: Vec<TypeDef>,
    /// Redefined model groups
    pub groups: Vec<GroupDef>,
    /// Redefined attribute groups
    pub attribute_groups: Vec<AttributeGroupDef>,
}

impl RedefineDef {
    /// Create an empty redefine block
    pub fn new(schema_location: impl Into<String>) -> Self {
        Self {
            schema_location: schema_location.into(),
            ..Default::default()
        }
    }

    /// Redefine a type
    pub fn with_type(mut self, def: TypeDef) -> Self {
        self.types.push(def);
        self
    }

    /// Redefine a model group
    pub fn with_group(mut self, def: GroupDef) -> Self {
        self.groups.push(def);
        self
    }

    /// Redefine an attribute group
    pub fn with_attribute_group(mut self, def: AttributeGroupDef) -> Self {
        self.attribute_groups.push(def);
        self
    }
}
