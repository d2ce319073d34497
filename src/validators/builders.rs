//! Schema component builders
//!
//! Compilation of declaration records into the type and element arenas of
//! a [`SchemaTypeSystem`](super::SchemaTypeSystem).
//!
//! Documents are processed so that a redefined document always comes before
//! the documents redefining it; a redefinition then takes over the global
//! name and keeps a link to the definition it replaces. Type derivation
//! chains are walked with an explicit stack and [`StagedItem`] marks, so
//! neither long chains nor cycles can exhaust the call stack. Problems in
//! individual components are collected as non-fatal [`ParseError`]s and
//! the offending reference falls back to `xs:anyType` or is dropped.

use std::collections::{HashMap, HashSet, VecDeque};

use indexmap::IndexMap;
use url::Url;

use crate::error::{CircularityError, ParseError, Result};
use crate::namespaces::{QName, XML_NAMESPACE, XSD_NAMESPACE};

use super::attributes::{AttributeDeclaration, AttributeUse, AttributeUseKind};
use super::complex_types::{
    derivation_methods, ContentTypeLabel, DerivationMethod, SchemaType, TypeKey, TypeVariety,
};
use super::declarations::{
    AttributeGroupDef, AttributeUseDef, ElementDef, GroupDef, ParticleDef, SchemaDocument,
    TermDef, TypeDef,
};
use super::elements::{ElementDeclaration, ElementKey, ElementScope};
use super::globals::{SubstitutionGroup, XsdGlobals};
use super::groups::{ElementParticle, ModelGroup, ModelType, Particle, WildcardParticle};
use super::particles::Occurs;
use super::wildcards::Wildcard;

/// A staged item waiting to be built
#[derive(Debug, Clone)]
pub(crate) enum StagedItem<T> {
    /// Not yet built
    Pending(T),
    /// Currently being built (for circular reference detection)
    Building,
    /// Successfully built
    Built,
}

impl<T> StagedItem<T> {
    /// Check if the item is pending
    pub fn is_pending(&self) -> bool {
        matches!(self, StagedItem::Pending(_))
    }

    /// Check if the item is being built
    pub fn is_building(&self) -> bool {
        matches!(self, StagedItem::Building)
    }

    /// Check if the item is built
    pub fn is_built(&self) -> bool {
        matches!(self, StagedItem::Built)
    }

    /// Mark as building, handing out the staged data of a pending item
    pub fn mark_building(&mut self) -> Option<T> {
        match std::mem::replace(self, StagedItem::Building) {
            StagedItem::Pending(data) => Some(data),
            other => {
                *self = other;
                None
            }
        }
    }

    /// Mark as built
    pub fn mark_built(&mut self) {
        *self = StagedItem::Built;
    }
}

/// Resolve a `schemaLocation` against the URI of the document naming it
pub(crate) fn resolve_location(base: &str, location: &str) -> String {
    match Url::parse(base) {
        Ok(base) => base
            .join(location)
            .map(|url| url.to_string())
            .unwrap_or_else(|_| location.to_string()),
        Err(_) => location.to_string(),
    }
}

fn file_name(uri: &str) -> &str {
    uri.rsplit(|c| c == '/' || c == '\\').next().unwrap_or(uri)
}

/// Find the document a `schemaLocation` of `from` refers to
///
/// Tries the resolved URI, then the location as written, then the bare
/// file name.
pub(crate) fn find_document(
    documents: &[SchemaDocument],
    from: &SchemaDocument,
    location: &str,
) -> Option<usize> {
    let resolved = resolve_location(&from.uri, location);
    documents
        .iter()
        .position(|d| d.uri == resolved)
        .or_else(|| documents.iter().position(|d| d.uri == location))
        .or_else(|| {
            let name = file_name(location);
            documents.iter().position(|d| file_name(&d.uri) == name)
        })
}

/// Order documents so that every redefined document precedes its redefiners
///
/// A document reachable from itself through redefine references makes the
/// whole set unusable and fails with a [`CircularityError`].
pub(crate) fn redefinition_order(documents: &[SchemaDocument]) -> Result<Vec<usize>> {
    let edges: Vec<Vec<usize>> = documents
        .iter()
        .map(|doc| {
            doc.redefines
                .iter()
                .filter_map(|r| find_document(documents, doc, &r.schema_location))
                .collect()
        })
        .collect();

    let mut marks: Vec<StagedItem<()>> = vec![StagedItem::Pending(()); documents.len()];
    let mut order = Vec::with_capacity(documents.len());

    for root in 0..documents.len() {
        if !marks[root].is_pending() {
            continue;
        }
        marks[root].mark_building();
        let mut stack: Vec<(usize, usize)> = vec![(root, 0)];

        while let Some(top) = stack.last_mut() {
            let (node, edge) = *top;
            if edge == edges[node].len() {
                marks[node].mark_built();
                order.push(node);
                stack.pop();
                continue;
            }
            top.1 += 1;
            let next = edges[node][edge];
            if marks[next].is_pending() {
                marks[next].mark_building();
                stack.push((next, 0));
            } else if marks[next].is_building() {
                let start = stack.iter().position(|&(n, _)| n == next).unwrap_or(0);
                let mut path: Vec<String> = stack[start..]
                    .iter()
                    .map(|&(n, _)| documents[n].uri.clone())
                    .collect();
                path.push(documents[next].uri.clone());
                return Err(CircularityError::new("redefine", documents[next].uri.clone())
                    .with_cycle_path(path)
                    .into());
            }
        }
    }

    Ok(order)
}

/// Result of compiling a document set
#[derive(Debug)]
pub(crate) struct CompiledSchema {
    pub types: Vec<SchemaType>,
    pub elements: Vec<ElementDeclaration>,
    pub globals: XsdGlobals,
    pub any_type: TypeKey,
    pub errors: Vec<ParseError>,
}

#[derive(Debug, Clone, Copy)]
struct TypeSource<'d> {
    def: &'d TypeDef,
    doc: usize,
    /// Definition replaced by a redefinition
    previous: Option<TypeKey>,
    /// Declared inside `xs:redefine`
    redefinition: bool,
}

#[derive(Debug, Clone, Copy)]
struct GroupSlot<'d> {
    def: &'d GroupDef,
    doc: usize,
    previous: Option<usize>,
}

#[derive(Debug, Clone, Copy)]
struct AttributeGroupSlot<'d> {
    def: &'d AttributeGroupDef,
    doc: usize,
    previous: Option<usize>,
}

/// Own name and replaced definition of a redefined group, for binding
/// self-references
type Redefining<'d> = Option<(&'d QName, Option<usize>)>;

type AttributeChanges = Vec<(QName, Option<AttributeUse>)>;

/// Compiler for one set of schema documents
pub(crate) struct SchemaBuilder<'d> {
    documents: &'d [SchemaDocument],
    types: Vec<SchemaType>,
    type_stages: Vec<StagedItem<TypeSource<'d>>>,
    /// Types waiting for their base, with the base already resolved
    waiting: HashMap<TypeKey, (TypeSource<'d>, Option<TypeKey>)>,
    elements: Vec<ElementDeclaration>,
    global_elements: Vec<(ElementKey, &'d ElementDef, usize)>,
    globals: XsdGlobals,
    groups: Vec<GroupSlot<'d>>,
    group_names: IndexMap<QName, usize>,
    group_cache: HashMap<usize, Option<Particle>>,
    attribute_groups: Vec<AttributeGroupSlot<'d>>,
    attribute_group_names: IndexMap<QName, usize>,
    errors: Vec<ParseError>,
    any_type: TypeKey,
    any_simple_type: TypeKey,
}

impl<'d> SchemaBuilder<'d> {
    /// Create a builder with the built-in types registered
    pub fn new(documents: &'d [SchemaDocument]) -> Self {
        let mut builder = Self {
            documents,
            types: Vec::new(),
            type_stages: Vec::new(),
            waiting: HashMap::new(),
            elements: Vec::new(),
            global_elements: Vec::new(),
            globals: XsdGlobals::new(),
            groups: Vec::new(),
            group_names: IndexMap::new(),
            group_cache: HashMap::new(),
            attribute_groups: Vec::new(),
            attribute_group_names: IndexMap::new(),
            errors: Vec::new(),
            any_type: TypeKey(0),
            any_simple_type: TypeKey(1),
        };

        let any_name = QName::namespaced(XSD_NAMESPACE, "anyType");
        let mut any_type = SchemaType::complex(Some(any_name.clone()));
        any_type.content_type = ContentTypeLabel::Mixed;
        any_type.particle = Some(Particle::Group(ModelGroup::new(
            ModelType::Sequence,
            vec![Particle::Wildcard(WildcardParticle::new(
                Wildcard::any_lax(),
                Occurs::zero_or_more(),
            ))],
        )));
        any_type.attribute_wildcard = Some(Wildcard::any_lax());
        builder.any_type = builder.push_built(any_name, any_type);

        let simple_name = QName::namespaced(XSD_NAMESPACE, "anySimpleType");
        let mut any_simple = SchemaType::simple(Some(simple_name.clone()));
        any_simple.base = Some(builder.any_type);
        any_simple.derivation = Some(DerivationMethod::Restriction);
        builder.any_simple_type = builder.push_built(simple_name, any_simple);

        builder
    }

    fn push_built(&mut self, name: QName, ty: SchemaType) -> TypeKey {
        let key = TypeKey(self.types.len() as u32);
        self.types.push(ty);
        self.type_stages.push(StagedItem::Built);
        self.globals.types.insert(name, key);
        key
    }

    /// Compile the documents in the given processing order
    ///
    /// Fails when the base chain of a redefined type returns to itself
    /// without reaching an original definition.
    pub fn build(mut self, order: &[usize]) -> Result<CompiledSchema> {
        for &doc in order {
            self.register(doc);
        }
        self.build_global_elements();
        self.build_types()?;
        self.build_substitution_groups();

        log::debug!(
            "compiled {} types, {} elements with {} errors",
            self.types.len(),
            self.elements.len(),
            self.errors.len()
        );
        Ok(CompiledSchema {
            types: self.types,
            elements: self.elements,
            globals: self.globals,
            any_type: self.any_type,
            errors: self.errors,
        })
    }

    fn error(&mut self, doc: usize, component: impl Into<String>, message: impl Into<String>) {
        let mut error = ParseError::new(message).with_component(component);
        if let Some(document) = self.documents.get(doc) {
            error = error.with_location(document.uri.clone());
        }
        log::warn!("{}", error);
        self.errors.push(error);
    }

    // Registration

    fn register(&mut self, doc: usize) {
        let documents = self.documents;
        let document = &documents[doc];

        for def in &document.types {
            let Some(name) = &def.name else {
                self.error(doc, type_label(def), "global type definition without a name");
                continue;
            };
            if self.globals.types.contains_key(name) {
                self.error(doc, type_label(def), "duplicate global type");
                continue;
            }
            let key = self.alloc_type(def, doc);
            self.globals.types.insert(name.clone(), key);
        }

        for def in &document.elements {
            if self.globals.elements.contains_key(&def.name) {
                self.error(doc, element_label(&def.name), "duplicate global element");
                continue;
            }
            let key = ElementKey(self.elements.len() as u32);
            self.elements.push(ElementDeclaration::new(
                def.name.clone(),
                self.any_type,
                ElementScope::Global,
            ));
            self.globals.elements.insert(def.name.clone(), key);
            self.global_elements.push((key, def, doc));
        }

        for def in &document.attributes {
            if self.globals.attributes.contains_key(&def.name) {
                self.error(doc, format!("attribute '{}'", def.name), "duplicate global attribute");
                continue;
            }
            let mut decl = AttributeDeclaration::new(def.name.clone());
            decl.type_name = def.type_name.clone();
            decl.fixed = def.fixed.clone();
            decl.default = def.default.clone();
            self.globals.attributes.insert(def.name.clone(), decl);
        }

        for def in &document.groups {
            if self.group_names.contains_key(&def.name) {
                self.error(doc, group_label(&def.name), "duplicate model group");
                continue;
            }
            self.add_group(def, doc, None);
        }

        for def in &document.attribute_groups {
            if self.attribute_group_names.contains_key(&def.name) {
                self.error(doc, attribute_group_label(&def.name), "duplicate attribute group");
                continue;
            }
            self.add_attribute_group(def, doc, None);
        }

        for redefine in &document.redefines {
            if find_document(documents, document, &redefine.schema_location).is_none() {
                self.error(
                    doc,
                    format!("redefine '{}'", redefine.schema_location),
                    "redefined schema document is not part of the schema set",
                );
            }
            for def in &redefine.types {
                let Some(name) = &def.name else {
                    self.error(doc, type_label(def), "redefinition without a name");
                    continue;
                };
                let previous = self.globals.lookup_type(name);
                if previous.is_none() {
                    self.error(doc, type_label(def), "redefinition of an unknown type");
                }
                log::debug!("redefining type {} in {}", name, document.uri);
                let key = self.alloc_redefinition(def, doc, previous);
                self.globals.types.insert(name.clone(), key);
            }
            for def in &redefine.groups {
                let previous = self.group_names.get(&def.name).copied();
                if previous.is_none() {
                    self.error(doc, group_label(&def.name), "redefinition of an unknown group");
                }
                self.add_group(def, doc, previous);
            }
            for def in &redefine.attribute_groups {
                let previous = self.attribute_group_names.get(&def.name).copied();
                if previous.is_none() {
                    self.error(
                        doc,
                        attribute_group_label(&def.name),
                        "redefinition of an unknown attribute group",
                    );
                }
                self.add_attribute_group(def, doc, previous);
            }
        }
    }

    fn alloc_type(&mut self, def: &'d TypeDef, doc: usize) -> TypeKey {
        self.stage_type(TypeSource {
            def,
            doc,
            previous: None,
            redefinition: false,
        })
    }

    fn alloc_redefinition(
        &mut self,
        def: &'d TypeDef,
        doc: usize,
        previous: Option<TypeKey>,
    ) -> TypeKey {
        self.stage_type(TypeSource {
            def,
            doc,
            previous,
            redefinition: true,
        })
    }

    fn stage_type(&mut self, source: TypeSource<'d>) -> TypeKey {
        let key = TypeKey(self.types.len() as u32);
        self.types.push(match source.def.variety {
            TypeVariety::Simple => SchemaType::simple(source.def.name.clone()),
            TypeVariety::Complex => SchemaType::complex(source.def.name.clone()),
        });
        self.type_stages.push(StagedItem::Pending(source));
        key
    }

    fn add_group(&mut self, def: &'d GroupDef, doc: usize, previous: Option<usize>) {
        let slot = self.groups.len();
        self.groups.push(GroupSlot { def, doc, previous });
        self.group_names.insert(def.name.clone(), slot);
    }

    fn add_attribute_group(
        &mut self,
        def: &'d AttributeGroupDef,
        doc: usize,
        previous: Option<usize>,
    ) {
        let slot = self.attribute_groups.len();
        self.attribute_groups
            .push(AttributeGroupSlot { def, doc, previous });
        self.attribute_group_names.insert(def.name.clone(), slot);
    }

    /// Look up a type, creating opaque built-in simple types on demand
    fn lookup_type(&mut self, name: &QName) -> Option<TypeKey> {
        if let Some(key) = self.globals.lookup_type(name) {
            return Some(key);
        }
        if name.namespace.as_deref() == Some(XSD_NAMESPACE) {
            let mut ty = SchemaType::simple(Some(name.clone()));
            ty.base = Some(self.any_simple_type);
            ty.derivation = Some(DerivationMethod::Restriction);
            return Some(self.push_built(name.clone(), ty));
        }
        None
    }

    // Elements

    fn element_type(&mut self, def: &'d ElementDef, doc: usize) -> Option<TypeKey> {
        if let Some(anonymous) = &def.anonymous_type {
            return Some(self.alloc_type(anonymous, doc));
        }
        let name = def.type_name.as_ref()?;
        match self.lookup_type(name) {
            Some(key) => Some(key),
            None => {
                self.error(
                    doc,
                    element_label(&def.name),
                    format!("unknown type '{}'", name),
                );
                Some(self.any_type)
            }
        }
    }

    fn build_global_elements(&mut self) {
        let pending = std::mem::take(&mut self.global_elements);
        let mut untyped = Vec::new();

        for &(key, def, doc) in &pending {
            let type_key = match self.element_type(def, doc) {
                Some(type_key) => type_key,
                None => {
                    if def.substitution_group.is_some() {
                        untyped.push(key);
                    }
                    self.any_type
                }
            };
            let head = match &def.substitution_group {
                Some(head_name) => {
                    let head = self.globals.lookup_element(head_name);
                    if head.is_none() {
                        self.error(
                            doc,
                            element_label(&def.name),
                            format!("unknown substitution group head '{}'", head_name),
                        );
                    }
                    head
                }
                None => None,
            };

            let decl = &mut self.elements[key.index()];
            decl.type_key = type_key;
            decl.substitution_group = head;
            decl.is_abstract = def.is_abstract;
            decl.nillable = def.nillable;
            decl.fixed = def.fixed.clone();
            decl.default = def.default.clone();
            decl.block = def.block;
            decl.final_deriv = def.final_deriv;
        }

        // members without a type of their own take the type of their head
        for &key in &untyped {
            let mut seen = HashSet::from([key]);
            let mut current = key;
            while let Some(head) = self.elements[current.index()].substitution_group {
                if !seen.insert(head) {
                    break;
                }
                if !untyped.contains(&head) {
                    self.elements[key.index()].type_key = self.elements[head.index()].type_key;
                    break;
                }
                current = head;
            }
        }
    }

    fn add_local_element(&mut self, def: &'d ElementDef, doc: usize) -> ElementKey {
        let type_key = self.element_type(def, doc).unwrap_or(self.any_type);
        let mut decl = ElementDeclaration::new(def.name.clone(), type_key, ElementScope::Local);
        decl.nillable = def.nillable;
        decl.fixed = def.fixed.clone();
        decl.default = def.default.clone();
        decl.block = def.block;
        let key = ElementKey(self.elements.len() as u32);
        self.elements.push(decl);
        key
    }

    // Types

    fn build_types(&mut self) -> Result<()> {
        // building content may allocate anonymous types, picked up here
        let mut index = 0;
        while index < self.types.len() {
            self.build_type(TypeKey(index as u32))?;
            index += 1;
        }
        Ok(())
    }

    /// Build a type after its base chain, without recursion
    ///
    /// A derivation cycle among original definitions is recorded and broken
    /// at the built-in root; a cycle passing through a redefinition is fatal.
    fn build_type(&mut self, key: TypeKey) -> Result<()> {
        let mut stack = vec![key];

        while let Some(&current) = stack.last() {
            if self.type_stages[current.index()].is_built() {
                stack.pop();
                continue;
            }

            match self.type_stages[current.index()].mark_building() {
                Some(source) => {
                    let base = self.resolve_base(&source);
                    match base {
                        Some(b) if self.type_stages[b.index()].is_pending() => {
                            self.waiting.insert(current, (source, base));
                            stack.push(b);
                        }
                        Some(b) if self.type_stages[b.index()].is_building() => {
                            let start = stack.iter().position(|&k| k == b).unwrap_or(0);
                            let redefined = source.redefinition
                                || stack[start..].iter().any(|k| {
                                    self.waiting
                                        .get(k)
                                        .is_some_and(|(waiting, _)| waiting.redefinition)
                                });
                            if redefined {
                                let mut path: Vec<String> = stack[start..]
                                    .iter()
                                    .map(|k| self.types[k.index()].display_name())
                                    .collect();
                                path.push(self.types[b.index()].display_name());
                                let kind = match source.def.variety {
                                    TypeVariety::Simple => "simpleType",
                                    TypeVariety::Complex => "complexType",
                                };
                                return Err(CircularityError::new(
                                    kind,
                                    self.types[current.index()].display_name(),
                                )
                                .with_cycle_path(path)
                                .into());
                            }
                            let base_name = self.types[b.index()].display_name();
                            self.error(
                                source.doc,
                                type_label(source.def),
                                format!("circular derivation through base type '{}'", base_name),
                            );
                            let fallback = match source.def.variety {
                                TypeVariety::Simple => self.any_simple_type,
                                TypeVariety::Complex => self.any_type,
                            };
                            self.complete_type(current, source, Some(fallback));
                            stack.pop();
                        }
                        _ => {
                            self.complete_type(current, source, base);
                            stack.pop();
                        }
                    }
                }
                None => {
                    // revisited once its base is built
                    match self.waiting.remove(&current) {
                        Some((source, base)) => self.complete_type(current, source, base),
                        None => unreachable!("type under construction without a staged base"),
                    }
                    stack.pop();
                }
            }
        }
        Ok(())
    }

    fn resolve_base(&mut self, source: &TypeSource<'d>) -> Option<TypeKey> {
        let def = source.def;
        let Some(name) = &def.base else {
            return Some(match def.variety {
                TypeVariety::Simple => self.any_simple_type,
                TypeVariety::Complex => self.any_type,
            });
        };

        // a redefinition derives from the definition it replaces
        if def.name.as_ref() == Some(name) {
            if let Some(previous) = source.previous {
                return Some(previous);
            }
        }

        match self.lookup_type(name) {
            Some(key) => Some(key),
            None => {
                self.error(
                    source.doc,
                    type_label(def),
                    format!("unknown base type '{}'", name),
                );
                Some(self.any_type)
            }
        }
    }

    fn complete_type(&mut self, key: TypeKey, source: TypeSource<'d>, base: Option<TypeKey>) {
        let def = source.def;
        let mut ty = match def.variety {
            TypeVariety::Simple => SchemaType::simple(def.name.clone()),
            TypeVariety::Complex => SchemaType::complex(def.name.clone()),
        };
        ty.base = base;
        ty.derivation = base.map(|_| def.derivation.unwrap_or(DerivationMethod::Restriction));
        ty.is_abstract = def.is_abstract;
        ty.block = def.block;
        ty.final_deriv = def.final_deriv;

        let base_type = base.map(|b| self.types[b.index()].clone());
        if let (Some(base_type), Some(method)) = (&base_type, ty.derivation) {
            if base_type.final_deriv.is_blocked(method) {
                self.error(
                    source.doc,
                    type_label(def),
                    format!(
                        "base type '{}' is final for {}",
                        base_type.display_name(),
                        method
                    ),
                );
            }
        }

        if def.variety == TypeVariety::Complex {
            self.build_content(&mut ty, source, base_type.as_ref());
            self.build_attributes(&mut ty, source, base_type.as_ref());
        }

        self.types[key.index()] = ty;
        self.type_stages[key.index()].mark_built();
    }

    fn build_content(&mut self, ty: &mut SchemaType, source: TypeSource<'d>, base: Option<&SchemaType>) {
        let def = source.def;
        if def.simple_content || base.is_some_and(|b| b.is_simple() || b.content_type == ContentTypeLabel::Simple)
        {
            ty.content_type = ContentTypeLabel::Simple;
            return;
        }

        let own = def
            .particle
            .as_ref()
            .and_then(|p| self.build_particle(p, source.doc, None, &mut Vec::new()))
            .filter(|p| !matches!(p, Particle::Group(g) if g.is_empty()));

        let mut mixed = def.mixed;
        let particle = match (ty.derivation, base) {
            (Some(DerivationMethod::Extension), Some(base)) => {
                mixed |= base.is_mixed();
                match (base.particle.clone(), own) {
                    (Some(inherited), Some(own)) => Some(Particle::Group(ModelGroup::new(
                        ModelType::Sequence,
                        vec![inherited, own],
                    ))),
                    (inherited, None) => inherited,
                    (None, own) => own,
                }
            }
            (Some(DerivationMethod::Restriction), Some(base)) if ty.base != Some(self.any_type) => {
                match (&own, &base.particle) {
                    (Some(own), Some(inherited)) => {
                        if let Err(message) = check_restriction(own, inherited) {
                            self.error(source.doc, type_label(def), message);
                        }
                    }
                    (Some(_), None) => {
                        self.error(
                            source.doc,
                            type_label(def),
                            "restriction adds content to a base type with empty content",
                        );
                    }
                    _ => {}
                }
                own
            }
            _ => own,
        };

        ty.content_type = match (&particle, mixed) {
            (_, true) => ContentTypeLabel::Mixed,
            (Some(_), false) => ContentTypeLabel::ElementOnly,
            (None, false) => ContentTypeLabel::Empty,
        };
        ty.particle = particle;
    }

    fn build_particle(
        &mut self,
        def: &'d ParticleDef,
        doc: usize,
        redefining: Redefining<'d>,
        visiting: &mut Vec<usize>,
    ) -> Option<Particle> {
        if def.occurs.is_empty() {
            return None;
        }
        match &def.term {
            TermDef::Element(element) => {
                let key = self.add_local_element(element, doc);
                Some(Particle::Element(ElementParticle::new(
                    element.name.clone(),
                    key,
                    def.occurs,
                )))
            }
            TermDef::ElementRef(name) => match self.globals.lookup_element(name) {
                Some(key) => Some(Particle::Element(ElementParticle::new(
                    name.clone(),
                    key,
                    def.occurs,
                ))),
                None => {
                    self.error(doc, element_label(name), "unknown element reference");
                    None
                }
            },
            TermDef::Group(model, members) => {
                let particles = members
                    .iter()
                    .filter_map(|m| self.build_particle(m, doc, redefining, visiting))
                    .collect();
                Some(Particle::Group(ModelGroup {
                    model: *model,
                    particles,
                    occurs: def.occurs,
                }))
            }
            TermDef::GroupRef(name) => {
                let slot = match redefining {
                    Some((own, Some(previous))) if own == name => Some(previous),
                    _ => self.group_names.get(name).copied(),
                };
                let Some(slot) = slot else {
                    self.error(doc, group_label(name), "unknown model group reference");
                    return None;
                };
                self.build_group(slot, visiting).map(|p| match p {
                    Particle::Group(g) => Particle::Group(g.with_occurs(def.occurs)),
                    other => other,
                })
            }
            TermDef::Any(wildcard) => Some(Particle::Wildcard(WildcardParticle::new(
                wildcard.clone(),
                def.occurs,
            ))),
        }
    }

    fn build_group(&mut self, slot: usize, visiting: &mut Vec<usize>) -> Option<Particle> {
        if let Some(cached) = self.group_cache.get(&slot) {
            return cached.clone();
        }
        let GroupSlot { def, doc, previous } = self.groups[slot];
        if visiting.contains(&slot) {
            self.error(doc, group_label(&def.name), "circular model group reference");
            return None;
        }

        visiting.push(slot);
        let particle = self.build_particle(&def.particle, doc, Some((&def.name, previous)), visiting);
        visiting.pop();

        self.group_cache.insert(slot, particle.clone());
        particle
    }

    fn build_attributes(&mut self, ty: &mut SchemaType, source: TypeSource<'d>, base: Option<&SchemaType>) {
        let def = source.def;
        let extension = ty.derivation == Some(DerivationMethod::Extension);
        let mut inherited_wildcard = None;
        if let Some(base) = base.filter(|b| b.is_complex()) {
            ty.attributes = base.attributes.clone();
            if extension {
                inherited_wildcard = base.attribute_wildcard.clone();
            }
        }

        let mut changes = AttributeChanges::new();
        let mut wildcard = def.any_attribute.clone();
        self.collect_attribute_uses(&def.attributes, source.doc, &mut changes);
        for name in &def.attribute_groups {
            self.expand_attribute_group(
                name,
                None,
                source.doc,
                &mut changes,
                &mut wildcard,
                &mut Vec::new(),
            );
        }

        for (name, attribute) in changes {
            match attribute {
                Some(attribute) => {
                    ty.attributes.insert(name, attribute);
                }
                None => {
                    ty.attributes.shift_remove(&name);
                }
            }
        }

        ty.attribute_wildcard = match (inherited_wildcard, wildcard) {
            (Some(inherited), Some(own)) => Some(inherited.union(&own)),
            (inherited, None) => inherited,
            (None, own) => own,
        };
    }

    fn collect_attribute_uses(
        &mut self,
        uses: &'d [AttributeUseDef],
        doc: usize,
        changes: &mut AttributeChanges,
    ) {
        for def in uses {
            if def.use_kind == AttributeUseKind::Prohibited {
                changes.push((def.name.clone(), None));
                continue;
            }
            let mut attribute = AttributeUse::new(def.name.clone())
                .with_required(def.use_kind == AttributeUseKind::Required);
            attribute.type_name = def.type_name.clone();
            attribute.fixed = def.fixed.clone();
            attribute.default = def.default.clone();

            if def.reference {
                match self.globals.lookup_attribute(&def.name) {
                    Some(decl) => {
                        attribute.type_name = decl.type_name.clone();
                        if attribute.fixed.is_none() {
                            attribute.fixed = decl.fixed.clone();
                        }
                        if attribute.default.is_none() {
                            attribute.default = decl.default.clone();
                        }
                    }
                    None if def.name.namespace.as_deref() == Some(XML_NAMESPACE) => {}
                    None => {
                        self.error(
                            doc,
                            format!("attribute '{}'", def.name),
                            "unknown attribute reference",
                        );
                        continue;
                    }
                }
            }
            changes.push((def.name.clone(), Some(attribute)));
        }
    }

    fn expand_attribute_group(
        &mut self,
        name: &QName,
        redefining: Redefining<'d>,
        doc: usize,
        changes: &mut AttributeChanges,
        wildcard: &mut Option<Wildcard>,
        visiting: &mut Vec<usize>,
    ) {
        let slot = match redefining {
            Some((own, Some(previous))) if own == name => Some(previous),
            _ => self.attribute_group_names.get(name).copied(),
        };
        let Some(slot) = slot else {
            self.error(doc, attribute_group_label(name), "unknown attribute group reference");
            return;
        };
        let AttributeGroupSlot {
            def,
            doc: group_doc,
            previous,
        } = self.attribute_groups[slot];
        if visiting.contains(&slot) {
            self.error(group_doc, attribute_group_label(name), "circular attribute group reference");
            return;
        }

        visiting.push(slot);
        self.collect_attribute_uses(&def.attributes, group_doc, changes);
        if wildcard.is_none() {
            *wildcard = def.any_attribute.clone();
        }
        for nested in &def.attribute_groups {
            self.expand_attribute_group(
                nested,
                Some((&def.name, previous)),
                group_doc,
                changes,
                wildcard,
                visiting,
            );
        }
        visiting.pop();
    }

    // Substitution groups

    fn build_substitution_groups(&mut self) {
        for index in 0..self.elements.len() {
            let key = ElementKey(index as u32);
            let mut seen = HashSet::from([key]);
            let mut current = self.elements[index].substitution_group;
            while let Some(head) = current {
                if head == key {
                    let name = self.elements[index].name.clone();
                    self.error(
                        usize::MAX,
                        element_label(&name),
                        "circular substitution group affiliation",
                    );
                    self.elements[index].substitution_group = None;
                    break;
                }
                if !seen.insert(head) {
                    break;
                }
                current = self.elements[head.index()].substitution_group;
            }
        }

        let mut direct: IndexMap<ElementKey, Vec<ElementKey>> = IndexMap::new();
        for (index, decl) in self.elements.iter().enumerate() {
            if let Some(head) = decl.substitution_group {
                direct.entry(head).or_default().push(ElementKey(index as u32));
            }
        }

        for (&head, members) in &direct {
            let mut group = SubstitutionGroup::new(head);
            let mut queue: VecDeque<ElementKey> = members.iter().copied().collect();
            let mut seen = HashSet::from([head]);
            while let Some(member) = queue.pop_front() {
                if !seen.insert(member) {
                    continue;
                }
                if self.may_substitute(head, member) {
                    group.members.push(member);
                } else {
                    group.excluded.push(member);
                }
                if let Some(next) = direct.get(&member) {
                    queue.extend(next.iter().copied());
                }
            }
            log::debug!(
                "substitution group {}: {} members, {} excluded",
                self.elements[head.index()].name,
                group.members.len(),
                group.excluded.len()
            );
            self.globals.substitution_groups.insert(head, group);
        }
    }

    /// Whether `member` may replace `head` given the head's block and final
    fn may_substitute(&mut self, head: ElementKey, member: ElementKey) -> bool {
        let head_decl = &self.elements[head.index()];
        let member_decl = &self.elements[member.index()];
        if head_decl.block.substitution {
            return false;
        }
        let methods = derivation_methods(
            &self.types,
            member_decl.type_key,
            head_decl.type_key,
            self.any_type,
        );
        let Some(methods) = methods else {
            let message = format!(
                "type of element '{}' is not derived from the type of its substitution group head '{}'",
                member_decl.name, head_decl.name
            );
            let component = element_label(&member_decl.name);
            self.error(usize::MAX, component, message);
            return false;
        };
        let head_type = &self.types[head_decl.type_key.index()];
        !(head_decl.block.forbids(&methods)
            || head_decl.final_deriv.forbids(&methods)
            || head_type.block.forbids(&methods))
    }
}

/// Check a restricted content particle against the base particle
fn check_restriction(derived: &Particle, base: &Particle) -> std::result::Result<(), String> {
    let derived_range = derived.effective_occurs();
    let base_range = base.effective_occurs();
    if !derived_range.has_occurs_restriction(&base_range) {
        return Err(format!(
            "content range {} is not a restriction of base content range {}",
            derived_range, base_range
        ));
    }

    let (base_elements, base_wildcards) = particle_terms(base);
    let (derived_elements, _) = particle_terms(derived);
    for element in derived_elements {
        let allowed = base_elements.iter().any(|e| e.name == element.name)
            || base_wildcards.iter().any(|w| w.matches(&element.name));
        if !allowed {
            return Err(format!(
                "element '{}' is not allowed by the base content",
                element.name
            ));
        }
    }
    Ok(())
}

fn particle_terms(particle: &Particle) -> (Vec<&ElementParticle>, Vec<&Wildcard>) {
    let mut elements = Vec::new();
    let mut wildcards = Vec::new();
    let mut stack = vec![particle];
    while let Some(particle) = stack.pop() {
        match particle {
            Particle::Element(e) => elements.push(e),
            Particle::Wildcard(w) => wildcards.push(&w.wildcard),
            Particle::Group(g) => stack.extend(g.particles.iter()),
        }
    }
    (elements, wildcards)
}

fn type_label(def: &TypeDef) -> String {
    let kind = match def.variety {
        TypeVariety::Simple => "simpleType",
        TypeVariety::Complex => "complexType",
    };
    match &def.name {
        Some(name) => format!("{} '{}'", kind, name),
        None => format!("{} (anonymous)", kind),
    }
}

fn element_label(name: &QName) -> String {
    format!("element '{}'", name)
}

fn group_label(name: &QName) -> String {
    format!("group '{}'", name)
}

fn attribute_group_label(name: &QName) -> String {
    format!("attributeGroup '{}'", name)
}
