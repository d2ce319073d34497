//! Schema type system
//!
//! [`SchemaTypeSystem`] owns a set of schema documents and the type graph
//! compiled from them. Documents are staged with
//! [`add_document`](SchemaTypeSystem::add_document); [`resolve`](SchemaTypeSystem::resolve)
//! orders redefinitions, builds every type, element and content model and
//! computes substitution groups. After resolution the system is read-only
//! plain data and can be shared between threads.

use std::fmt;
use std::path::Path;

use super::base::{ValidationStatus, Validator};
use super::builders::{redefinition_order, SchemaBuilder};
use super::complex_types::{self, DerivationFlags, SchemaType, TypeKey};
use super::declarations::SchemaDocument;
use super::document_validation::StreamingValidator;
use super::elements::{ElementDeclaration, ElementKey};
use super::globals::{SubstitutionGroup, XsdGlobals};
use super::groups::Particle;
use super::parsing::{load_schema_set, parse_schema};
use super::validation::{ValidationReport, ValidatorOptions};

use crate::documents::Document;
use crate::error::{Error, ParseError, Result};
use crate::limits::Limits;
use crate::loaders::Loader;
use crate::namespaces::QName;
use crate::store::Cursor;

/// Build progress of a type system
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
enum BuildStatus {
    /// Documents staged, nothing compiled
    #[default]
    Staged,
    /// Redefinition order computed
    Ordered,
    /// All components built
    Resolved,
}

/// Compiled graph of schema types and element declarations
#[derive(Debug, Default)]
pub struct SchemaTypeSystem {
    documents: Vec<SchemaDocument>,
    limits: Limits,
    status: BuildStatus,
    order: Vec<usize>,
    types: Vec<SchemaType>,
    elements: Vec<ElementDeclaration>,
    globals: XsdGlobals,
    errors: Vec<ParseError>,
    any_type: TypeKey,
}

impl SchemaTypeSystem {
    /// Create an empty type system
    pub fn new() -> Self {
        Self::default()
    }

    /// Set the limits checked while compiling
    pub fn with_limits(mut self, limits: Limits) -> Self {
        self.limits = limits;
        self
    }

    /// Stage and resolve a set of documents in one go
    pub fn compile(documents: Vec<SchemaDocument>) -> Result<Self> {
        let mut system = Self::new();
        for document in documents {
            system.add_document(document)?;
        }
        system.resolve()?;
        Ok(system)
    }

    /// Read XSD texts, given as `(uri, text)` pairs, and resolve them
    pub fn from_xsd(sources: &[(&str, &str)]) -> Result<Self> {
        let documents = sources
            .iter()
            .map(|(uri, text)| parse_schema(text, uri))
            .collect::<Result<Vec<_>>>()?;
        Self::compile(documents)
    }

    /// Read XSD files, following include, import and redefine locations
    pub fn from_files<P: AsRef<Path>>(paths: &[P]) -> Result<Self> {
        let loader = Loader::new();
        let documents = load_schema_set(paths, &loader)?;
        Self::compile(documents)
    }

    /// Stage a schema document
    pub fn add_document(&mut self, document: SchemaDocument) -> Result<()> {
        if self.status == BuildStatus::Resolved {
            return Err(ParseError::new("cannot add a document to a resolved type system")
                .with_location(document.uri)
                .into());
        }
        self.limits.check_schema_documents(self.documents.len() + 1)?;
        log::debug!("staging schema document {}", document.uri);
        self.documents.push(document);
        self.status = BuildStatus::Staged;
        Ok(())
    }

    /// Staged documents
    pub fn documents(&self) -> &[SchemaDocument] {
        &self.documents
    }

    fn order_documents(&mut self) -> Result<()> {
        if self.status != BuildStatus::Staged {
            return Ok(());
        }
        let components = self.documents.iter().map(|d| d.component_count()).sum();
        self.limits.check_schema_components(components)?;
        self.order = redefinition_order(&self.documents)?;
        self.status = BuildStatus::Ordered;
        Ok(())
    }

    /// Build every component; calling it again is a no-op
    ///
    /// Fails only on a redefine cycle or an exceeded limit. Problems in
    /// single components are recorded and available from
    /// [`errors`](Validator::errors) afterwards.
    pub fn resolve(&mut self) -> Result<()> {
        if self.status == BuildStatus::Resolved {
            return Ok(());
        }
        self.order_documents()?;

        let compiled = SchemaBuilder::new(&self.documents).build(&self.order)?;
        self.types = compiled.types;
        self.elements = compiled.elements;
        self.globals = compiled.globals;
        self.any_type = compiled.any_type;
        self.errors = compiled.errors;
        self.status = BuildStatus::Resolved;

        log::debug!(
            "resolved type system: {} documents, {} global types, {} global elements",
            self.documents.len(),
            self.globals.types.len(),
            self.globals.elements.len()
        );
        Ok(())
    }

    /// Whether [`resolve`](Self::resolve) has completed
    pub fn is_resolved(&self) -> bool {
        self.status == BuildStatus::Resolved
    }

    /// Global type by name
    pub fn find_type(&self, name: &QName) -> Option<&SchemaType> {
        self.type_key(name).map(|key| self.schema_type(key))
    }

    /// Key of a global type
    pub fn type_key(&self, name: &QName) -> Option<TypeKey> {
        self.globals.lookup_type(name)
    }

    /// Global element declaration by name
    pub fn find_element(&self, name: &QName) -> Option<&ElementDeclaration> {
        self.element_key(name).map(|key| self.element(key))
    }

    /// Key of a global element declaration
    pub fn element_key(&self, name: &QName) -> Option<ElementKey> {
        self.globals.lookup_element(name)
    }

    /// Type behind a key
    ///
    /// # Panics
    ///
    /// Panics if the key was not handed out by this type system.
    pub fn schema_type(&self, key: TypeKey) -> &SchemaType {
        &self.types[key.index()]
    }

    /// Element declaration behind a key
    ///
    /// # Panics
    ///
    /// Panics if the key was not handed out by this type system.
    pub fn element(&self, key: ElementKey) -> &ElementDeclaration {
        &self.elements[key.index()]
    }

    /// Content model of a complex type
    pub fn content_model(&self, key: TypeKey) -> Result<Option<&Particle>> {
        if !self.is_resolved() {
            return Err(Error::NotResolved);
        }
        Ok(self.schema_type(key).particle.as_ref())
    }

    /// Key of `xs:anyType`
    pub fn any_type(&self) -> TypeKey {
        self.any_type
    }

    /// Global tables
    pub fn globals(&self) -> &XsdGlobals {
        &self.globals
    }

    /// Global element declarations in declaration order
    pub fn global_elements(&self) -> impl Iterator<Item = (&QName, &ElementDeclaration)> + '_ {
        self.globals
            .elements
            .iter()
            .map(|(name, &key)| (name, self.element(key)))
    }

    /// Number of types, built-in and anonymous ones included
    pub fn type_count(&self) -> usize {
        self.types.len()
    }

    /// Substitution group headed by an element
    pub fn substitution_group(&self, head: ElementKey) -> Option<&SubstitutionGroup> {
        self.globals.substitution_group(head)
    }

    /// Derivation methods on the way from `derived` to `base`
    pub fn derivation_methods(&self, derived: TypeKey, base: TypeKey) -> Option<DerivationFlags> {
        complex_types::derivation_methods(&self.types, derived, base, self.any_type)
    }

    /// Whether `derived` is `base` or derives from it
    pub fn is_derived_from(&self, derived: TypeKey, base: TypeKey) -> bool {
        self.derivation_methods(derived, base).is_some()
    }

    /// Validate from a cursor position with default options
    pub fn validate(&self, cursor: &Cursor) -> Result<ValidationReport> {
        StreamingValidator::new(self)?.validate(cursor)
    }

    /// Validate from a cursor position
    pub fn validate_with_options(
        &self,
        cursor: &Cursor,
        options: ValidatorOptions,
    ) -> Result<ValidationReport> {
        StreamingValidator::with_options(self, options)?.validate(cursor)
    }

    /// Validate a whole document
    pub fn validate_document(&self, document: &Document) -> Result<ValidationReport> {
        self.validate(&document.new_cursor()?)
    }

    /// Validate XML text
    pub fn validate_str(&self, xml: &str) -> Result<ValidationReport> {
        self.validate_document(&Document::from_string(xml)?)
    }

    /// Whether XML text is valid
    pub fn is_valid_str(&self, xml: &str) -> bool {
        self.validate_str(xml).map(|r| r.is_valid()).unwrap_or(false)
    }
}

impl Validator for SchemaTypeSystem {
    fn is_built(&self) -> bool {
        self.is_resolved()
    }

    fn build(&mut self) -> Result<()> {
        self.resolve()
    }

    fn validation_attempted(&self) -> ValidationStatus {
        match self.status {
            BuildStatus::Resolved if self.errors.is_empty() => ValidationStatus::Full,
            BuildStatus::Resolved => ValidationStatus::Partial,
            _ => ValidationStatus::None,
        }
    }

    fn has_errors(&self) -> bool {
        !self.errors.is_empty()
    }

    fn errors(&self) -> Vec<ParseError> {
        self.errors.clone()
    }
}

impl fmt::Display for SchemaTypeSystem {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "SchemaTypeSystem({} documents, {} types, {} elements",
            self.documents.len(),
            self.types.len(),
            self.elements.len()
        )?;
        if !self.errors.is_empty() {
            write!(f, ", {} errors", self.errors.len())?;
        }
        write!(f, ")")
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::validators::base::ValidationMode;
    use crate::validators::complex_types::ContentTypeLabel;
    use crate::validators::declarations::{ElementDef, ParticleDef, RedefineDef, TypeDef};

    fn q(name: &str) -> QName {
        QName::local(name)
    }

    fn base_document() -> SchemaDocument {
        SchemaDocument::new("base.xsd")
            .with_type(TypeDef::complex(Some(q("Base"))).with_particle(ParticleDef::sequence(
                vec![
                    ParticleDef::element(ElementDef::new(q("a"))),
                    ParticleDef::element(ElementDef::new(q("b"))),
                ],
            )))
            .with_element(ElementDef::new(q("root")).with_type(q("Base")))
    }

    #[test]
    fn test_system_is_shareable() {
        fn assert_send_sync<T: Send + Sync>() {}
        assert_send_sync::<SchemaTypeSystem>();
    }

    #[test]
    fn test_compile_and_lookup() {
        let system = SchemaTypeSystem::compile(vec![base_document()]).unwrap();
        assert!(system.is_resolved());
        assert!(system.is_built());
        assert_eq!(system.validation_attempted(), ValidationStatus::Full);

        let base = system.find_type(&q("Base")).unwrap();
        assert_eq!(base.content_type, ContentTypeLabel::ElementOnly);
        let root = system.find_element(&q("root")).unwrap();
        assert_eq!(root.type_key, system.type_key(&q("Base")).unwrap());
        assert!(system.is_derived_from(root.type_key, system.any_type()));
        assert!(system.find_type(&q("Missing")).is_none());
        assert!(system.check_validator(ValidationMode::Strict).is_ok());
    }

    #[test]
    fn test_resolve_is_idempotent() {
        let mut system = SchemaTypeSystem::new();
        system.add_document(base_document()).unwrap();
        assert!(!system.is_resolved());
        assert!(system.find_type(&q("Base")).is_none());
        system.resolve().unwrap();
        let count = system.type_count();
        system.resolve().unwrap();
        assert_eq!(system.type_count(), count);
        assert!(system.add_document(SchemaDocument::new("late.xsd")).is_err());
    }

    #[test]
    fn test_content_model_requires_resolution() {
        let mut system = SchemaTypeSystem::new();
        system.add_document(base_document()).unwrap();
        assert!(matches!(
            system.content_model(TypeKey(0)),
            Err(Error::NotResolved)
        ));
        assert!(matches!(
            StreamingValidator::new(&system),
            Err(Error::NotResolved)
        ));
        system.resolve().unwrap();
        assert!(system.content_model(system.any_type()).unwrap().is_some());
    }

    #[test]
    fn test_circular_redefinition_is_fatal() {
        let documents = vec![
            SchemaDocument::new("A.xsd").with_redefine(RedefineDef::new("B.xsd")),
            SchemaDocument::new("B.xsd").with_redefine(RedefineDef::new("A.xsd")),
        ];
        let err = SchemaTypeSystem::compile(documents).unwrap_err();
        assert!(matches!(err, Error::CircularRedefinition(_)));
        assert!(err.to_string().contains("circular"));
    }

    #[test]
    fn test_partial_system() {
        let document = SchemaDocument::new("s.xsd")
            .with_element(ElementDef::new(q("e")).with_type(q("Nowhere")));
        let system = SchemaTypeSystem::compile(vec![document]).unwrap();
        assert_eq!(system.validation_attempted(), ValidationStatus::Partial);
        assert!(system.has_errors());
        assert_eq!(system.errors().len(), 1);
        assert_eq!(
            system.find_element(&q("e")).unwrap().type_key,
            system.any_type()
        );
        assert!(system.to_string().contains("1 errors"));
    }

    #[test]
    fn test_document_limit() {
        let limits = Limits {
            max_schema_documents: 1,
            ..Limits::default()
        };
        let mut system = SchemaTypeSystem::new().with_limits(limits);
        system.add_document(SchemaDocument::new("a.xsd")).unwrap();
        assert!(matches!(
            system.add_document(SchemaDocument::new("b.xsd")),
            Err(Error::LimitExceeded(_))
        ));
    }
}
