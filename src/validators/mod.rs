//! XML Schema validators
//!
//! Schema documents are described by plain declaration records
//! ([`SchemaDocument`] and friends), compiled into a [`SchemaTypeSystem`]
//! and checked against instance documents by a [`StreamingValidator`].
//!
//! Layers, bottom-up:
//!
//! - components: [`particles`], [`wildcards`], [`groups`], [`attributes`],
//!   [`elements`], [`complex_types`], [`globals`]
//! - compilation: [`declarations`], [`parsing`], the internal builder and [`schemas`]
//! - validation: [`models`], [`document_validation`], [`validation`], [`exceptions`]

pub mod attributes;
pub mod base;
mod builders;
pub mod complex_types;
pub mod declarations;
pub mod document_validation;
pub mod elements;
pub mod exceptions;
pub mod globals;
pub mod groups;
pub mod models;
pub mod parsing;
pub mod particles;
pub mod schemas;
pub mod validation;
pub mod wildcards;

// Re-exports
pub use attributes::{AttributeDeclaration, AttributeUse, AttributeUseKind};
pub use base::{ValidationMode, ValidationStatus, ValidityStatus, Validator};
pub use complex_types::{
    ContentTypeLabel, DerivationFlags, DerivationMethod, SchemaType, TypeKey, TypeVariety,
};
pub use declarations::{
    AttributeDef, AttributeGroupDef, AttributeUseDef, ElementDef, GroupDef, ParticleDef,
    RedefineDef, SchemaDocument, TermDef, TypeDef,
};
pub use document_validation::StreamingValidator;
pub use elements::{ElementDeclaration, ElementKey, ElementScope};
pub use exceptions::{IssueKind, Severity, ValidationIssue};
pub use globals::{SubstitutionGroup, XsdGlobals};
pub use groups::{ElementParticle, ModelGroup, ModelType, Particle, WildcardParticle};
pub use models::{ContentAutomaton, ContentError, Expected, Matched, Step};
pub use parsing::{load_schema_set, parse_schema, FormDefault};
pub use particles::{parse_occurs, Occurs};
pub use schemas::SchemaTypeSystem;
pub use validation::{ValidationReport, ValidatorOptions, ValidatorState};
pub use wildcards::{NamespaceConstraint, ProcessContents, Wildcard};
