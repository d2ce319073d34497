//! XSD document reading
//!
//! Turns XSD text into [`SchemaDocument`] records. The text is loaded into a
//! token store and walked with cursors; references stay qualified names for
//! the builder to resolve. Only the structure of simple types is read, their
//! facets are not.

use std::collections::{HashSet, VecDeque};
use std::path::{Path, PathBuf};
use std::sync::Arc;

use url::Url;

use super::attributes::AttributeUseKind;
use super::complex_types::{DerivationFlags, DerivationMethod};
use super::declarations::{
    AttributeDef, AttributeGroupDef, AttributeUseDef, ElementDef, GroupDef, ParticleDef,
    RedefineDef, SchemaDocument, TypeDef,
};
use super::particles::parse_occurs;
use super::wildcards::{NamespaceConstraint, ProcessContents, Wildcard};

use crate::documents::Document;
use crate::error::{Error, ParseError, Result};
use crate::loaders::Loader;
use crate::locations::Location;
use crate::namespaces::{QName, XSD_NAMESPACE};
use crate::store::Cursor;

/// XSD element local names
mod xsd_elements {
    pub const SCHEMA: &str = "schema";
    pub const ELEMENT: &str = "element";
    pub const COMPLEX_TYPE: &str = "complexType";
    pub const SIMPLE_TYPE: &str = "simpleType";
    pub const ATTRIBUTE: &str = "attribute";
    pub const ATTRIBUTE_GROUP: &str = "attributeGroup";
    pub const GROUP: &str = "group";
    pub const SEQUENCE: &str = "sequence";
    pub const CHOICE: &str = "choice";
    pub const ALL: &str = "all";
    pub const ANNOTATION: &str = "annotation";
    pub const IMPORT: &str = "import";
    pub const INCLUDE: &str = "include";
    pub const REDEFINE: &str = "redefine";
    pub const RESTRICTION: &str = "restriction";
    pub const EXTENSION: &str = "extension";
    pub const LIST: &str = "list";
    pub const UNION: &str = "union";
    pub const COMPLEX_CONTENT: &str = "complexContent";
    pub const SIMPLE_CONTENT: &str = "simpleContent";
    pub const ANY: &str = "any";
    pub const ANY_ATTRIBUTE: &str = "anyAttribute";
    pub const NOTATION: &str = "notation";
}

/// XSD attribute names
mod xsd_attrs {
    pub const NAME: &str = "name";
    pub const TYPE: &str = "type";
    pub const REF: &str = "ref";
    pub const BASE: &str = "base";
    pub const TARGET_NAMESPACE: &str = "targetNamespace";
    pub const ELEMENT_FORM_DEFAULT: &str = "elementFormDefault";
    pub const ATTRIBUTE_FORM_DEFAULT: &str = "attributeFormDefault";
    pub const BLOCK_DEFAULT: &str = "blockDefault";
    pub const FINAL_DEFAULT: &str = "finalDefault";
    pub const FORM: &str = "form";
    pub const NILLABLE: &str = "nillable";
    pub const ABSTRACT: &str = "abstract";
    pub const MIXED: &str = "mixed";
    pub const BLOCK: &str = "block";
    pub const FINAL: &str = "final";
    pub const FIXED: &str = "fixed";
    pub const DEFAULT: &str = "default";
    pub const USE: &str = "use";
    pub const SUBSTITUTION_GROUP: &str = "substitutionGroup";
    pub const MIN_OCCURS: &str = "minOccurs";
    pub const MAX_OCCURS: &str = "maxOccurs";
    pub const NAMESPACE: &str = "namespace";
    pub const PROCESS_CONTENTS: &str = "processContents";
    pub const SCHEMA_LOCATION: &str = "schemaLocation";
}

/// Whether local declarations are namespace qualified
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum FormDefault {
    /// Local names are in no namespace
    #[default]
    Unqualified,
    /// Local names are in the target namespace
    Qualified,
}

impl FormDefault {
    /// Parse a `form` / `*FormDefault` attribute value
    pub fn from_attr(value: &str) -> Option<Self> {
        match value.trim() {
            "qualified" => Some(Self::Qualified),
            "unqualified" => Some(Self::Unqualified),
            _ => None,
        }
    }

    /// Check if qualified
    pub fn is_qualified(&self) -> bool {
        matches!(self, Self::Qualified)
    }
}

/// Read one schema document from XSD text
///
/// `uri` identifies the document in the type system; `schemaLocation`
/// references of other documents are matched against it.
pub fn parse_schema(text: &str, uri: &str) -> Result<SchemaDocument> {
    parse_schema_with(&Loader::new(), text, uri)
}

fn parse_schema_with(loader: &Loader, text: &str, uri: &str) -> Result<SchemaDocument> {
    let store = loader.parse_store(text, Some(Arc::from(uri)))?;
    let document = Document::from_store(store);
    let root = document.root_cursor()?.ok_or_else(|| {
        ParseError::new("schema document has no root element").with_location(uri)
    })?;

    match xsd_local_name(&root)? {
        Some(name) if name == xsd_elements::SCHEMA => {}
        _ => {
            return Err(ParseError::new("root element is not xs:schema")
                .with_location(uri)
                .into())
        }
    }

    let reader = SchemaReader::new(&root, uri)?;
    let schema = reader.read(&root)?;
    log::debug!(
        "read schema document '{}' with {} components",
        uri,
        schema.component_count()
    );
    Ok(schema)
}

/// Read a set of schema files and every file they include, import or redefine
///
/// Referenced locations are resolved against the referring file; each file
/// is read once. Documents are returned in discovery order.
pub fn load_schema_set<P: AsRef<Path>>(paths: &[P], loader: &Loader) -> Result<Vec<SchemaDocument>> {
    let mut pending: VecDeque<PathBuf> = paths.iter().map(|p| p.as_ref().to_path_buf()).collect();
    let mut seen = HashSet::new();
    let mut documents = Vec::new();

    while let Some(path) = pending.pop_front() {
        let path = path.canonicalize().unwrap_or(path);
        if !seen.insert(path.clone()) {
            continue;
        }
        loader.limits().check_schema_documents(documents.len() + 1)?;

        let text = loader.load_text(&Location::Path(path.clone()))?;
        let uri = Url::from_file_path(&path)
            .map(|url| url.to_string())
            .unwrap_or_else(|_| path.display().to_string());
        let document = parse_schema_with(loader, &text, &uri)?;

        let base = path.parent().map(Path::to_path_buf).unwrap_or_default();
        let references = document
            .includes
            .iter()
            .chain(&document.imports)
            .chain(document.redefines.iter().map(|r| &r.schema_location));
        for location in references {
            match Location::from_str(location)? {
                Location::Url(url) => {
                    log::warn!("not following remote schema location {}", url);
                }
                Location::Path(p) if p.is_absolute() => pending.push_back(p),
                _ => pending.push_back(base.join(location)),
            }
        }
        documents.push(document);
    }
    Ok(documents)
}

/// Local name of an element in the XSD namespace
fn xsd_local_name(node: &Cursor) -> Result<Option<String>> {
    Ok(node
        .name()?
        .filter(|name| name.namespace.as_deref() == Some(XSD_NAMESPACE))
        .map(|name| name.local_name))
}

/// XSD child elements with their local names; foreign elements are skipped
fn xsd_children(node: &Cursor) -> Result<Vec<(String, Cursor)>> {
    let mut children = Vec::new();
    let mut child = node.new_cursor()?;
    if !child.to_first_child() {
        return Ok(children);
    }
    loop {
        if let Some(name) = xsd_local_name(&child)? {
            children.push((name, child.new_cursor()?));
        }
        if !child.to_next_sibling() {
            break;
        }
    }
    Ok(children)
}

fn attribute(node: &Cursor, name: &str) -> Result<Option<String>> {
    node.attribute_value(&QName::local(name))
}

fn bool_attribute(node: &Cursor, name: &str) -> Result<bool> {
    match attribute(node, name)?.as_deref().map(str::trim) {
        None | Some("false") | Some("0") => Ok(false),
        Some("true") | Some("1") => Ok(true),
        Some(other) => Err(node_error(
            node,
            format!("attribute '{}' has a non-boolean value '{}'", name, other),
        )),
    }
}

fn node_error(node: &Cursor, message: impl Into<String>) -> Error {
    let mut error = ParseError::new(message);
    if let Ok(Some(location)) = node.location() {
        error = error.with_location(location.to_string());
    }
    if let Ok(Some(name)) = node.name() {
        error = error.with_component(format!("xs:{}", name.local_name));
    }
    error.into()
}

/// Per-document reading context
struct SchemaReader {
    uri: String,
    target_namespace: Option<String>,
    element_form: FormDefault,
    attribute_form: FormDefault,
    block_default: DerivationFlags,
    final_default: DerivationFlags,
}

impl SchemaReader {
    fn new(root: &Cursor, uri: &str) -> Result<Self> {
        let form = |name: &str| -> Result<FormDefault> {
            match attribute(root, name)? {
                None => Ok(FormDefault::default()),
                Some(value) => FormDefault::from_attr(&value).ok_or_else(|| {
                    node_error(root, format!("invalid {} value '{}'", name, value))
                }),
            }
        };
        let flags = |name: &str| -> Result<DerivationFlags> {
            Ok(attribute(root, name)?
                .map(|v| DerivationFlags::from_attr(&v))
                .unwrap_or_default())
        };

        Ok(Self {
            uri: uri.to_string(),
            target_namespace: attribute(root, xsd_attrs::TARGET_NAMESPACE)?.filter(|ns| !ns.is_empty()),
            element_form: form(xsd_attrs::ELEMENT_FORM_DEFAULT)?,
            attribute_form: form(xsd_attrs::ATTRIBUTE_FORM_DEFAULT)?,
            block_default: flags(xsd_attrs::BLOCK_DEFAULT)?,
            final_default: flags(xsd_attrs::FINAL_DEFAULT)?,
        })
    }

    fn read(&self, root: &Cursor) -> Result<SchemaDocument> {
        let mut schema = SchemaDocument::new(self.uri.clone());
        schema.target_namespace = self.target_namespace.clone();

        for (tag, child) in xsd_children(root)? {
            match tag.as_str() {
                xsd_elements::ELEMENT => schema.elements.push(self.element(&child, true)?),
                xsd_elements::COMPLEX_TYPE => schema.types.push(self.complex_type(&child, true)?),
                xsd_elements::SIMPLE_TYPE => schema.types.push(self.simple_type(&child, true)?),
                xsd_elements::ATTRIBUTE => schema.attributes.push(self.global_attribute(&child)?),
                xsd_elements::GROUP => schema.groups.push(self.named_group(&child)?),
                xsd_elements::ATTRIBUTE_GROUP => {
                    schema.attribute_groups.push(self.attribute_group(&child)?)
                }
                xsd_elements::INCLUDE => schema
                    .includes
                    .push(self.required(&child, xsd_attrs::SCHEMA_LOCATION)?),
                xsd_elements::IMPORT => {
                    if let Some(location) = attribute(&child, xsd_attrs::SCHEMA_LOCATION)? {
                        schema.imports.push(location);
                    }
                }
                xsd_elements::REDEFINE => schema.redefines.push(self.redefine(&child)?),
                xsd_elements::ANNOTATION | xsd_elements::NOTATION => {}
                other => log::warn!("ignoring xs:{} in schema '{}'", other, self.uri),
            }
        }
        Ok(schema)
    }

    // Names

    fn required(&self, node: &Cursor, name: &str) -> Result<String> {
        attribute(node, name)?
            .ok_or_else(|| node_error(node, format!("missing required attribute '{}'", name)))
    }

    fn global_name(&self, node: &Cursor) -> Result<QName> {
        let name = self.required(node, xsd_attrs::NAME)?;
        Ok(QName::new(self.target_namespace.clone(), name.trim()))
    }

    fn local_name(&self, node: &Cursor, default: FormDefault) -> Result<QName> {
        let name = self.required(node, xsd_attrs::NAME)?;
        let form = match attribute(node, xsd_attrs::FORM)? {
            Some(value) => FormDefault::from_attr(&value)
                .ok_or_else(|| node_error(node, format!("invalid form value '{}'", value)))?,
            None => default,
        };
        if form.is_qualified() {
            Ok(QName::new(self.target_namespace.clone(), name.trim()))
        } else {
            Ok(QName::local(name.trim()))
        }
    }

    /// Resolve a QName-valued attribute against the namespaces in scope
    fn qname(&self, node: &Cursor, name: &str) -> Result<Option<QName>> {
        let Some(value) = attribute(node, name)? else {
            return Ok(None);
        };
        node.in_scope_namespaces()?
            .resolve(value.trim())
            .map(Some)
            .map_err(|err| node_error(node, err.to_string()))
    }

    fn required_qname(&self, node: &Cursor, name: &str) -> Result<QName> {
        self.qname(node, name)?
            .ok_or_else(|| node_error(node, format!("missing required attribute '{}'", name)))
    }

    fn flags(&self, node: &Cursor, name: &str, default: DerivationFlags) -> Result<DerivationFlags> {
        Ok(attribute(node, name)?
            .map(|v| DerivationFlags::from_attr(&v))
            .unwrap_or(default))
    }

    // Declarations

    fn element(&self, node: &Cursor, global: bool) -> Result<ElementDef> {
        let name = if global {
            self.global_name(node)?
        } else {
            self.local_name(node, self.element_form)?
        };
        let mut def = ElementDef::new(name);
        def.type_name = self.qname(node, xsd_attrs::TYPE)?;
        def.is_abstract = bool_attribute(node, xsd_attrs::ABSTRACT)?;
        def.nillable = bool_attribute(node, xsd_attrs::NILLABLE)?;
        def.fixed = attribute(node, xsd_attrs::FIXED)?;
        def.default = attribute(node, xsd_attrs::DEFAULT)?;
        def.block = self.flags(node, xsd_attrs::BLOCK, self.block_default)?;
        if global {
            def.substitution_group = self.qname(node, xsd_attrs::SUBSTITUTION_GROUP)?;
            def.final_deriv = self.flags(node, xsd_attrs::FINAL, self.final_default)?;
        }

        for (tag, child) in xsd_children(node)? {
            let anonymous = match tag.as_str() {
                xsd_elements::COMPLEX_TYPE => self.complex_type(&child, false)?,
                xsd_elements::SIMPLE_TYPE => self.simple_type(&child, false)?,
                _ => continue,
            };
            if def.type_name.is_some() {
                return Err(node_error(
                    node,
                    "element has both a 'type' attribute and an anonymous type",
                ));
            }
            def.anonymous_type = Some(Box::new(anonymous));
        }
        Ok(def)
    }

    fn global_attribute(&self, node: &Cursor) -> Result<AttributeDef> {
        let mut def = AttributeDef::new(self.global_name(node)?);
        def.type_name = self.qname(node, xsd_attrs::TYPE)?;
        def.fixed = attribute(node, xsd_attrs::FIXED)?;
        def.default = attribute(node, xsd_attrs::DEFAULT)?;
        Ok(def)
    }

    fn attribute_use(&self, node: &Cursor) -> Result<AttributeUseDef> {
        let mut def = match self.qname(node, xsd_attrs::REF)? {
            Some(reference) => AttributeUseDef::reference(reference),
            None => {
                let mut def = AttributeUseDef::new(self.local_name(node, self.attribute_form)?);
                def.type_name = self.qname(node, xsd_attrs::TYPE)?;
                def
            }
        };
        if let Some(value) = attribute(node, xsd_attrs::USE)? {
            def.use_kind = AttributeUseKind::from_str(value.trim())
                .map_err(|err| node_error(node, err.to_string()))?;
        }
        def.fixed = attribute(node, xsd_attrs::FIXED)?;
        def.default = attribute(node, xsd_attrs::DEFAULT)?;
        Ok(def)
    }

    fn attribute_group(&self, node: &Cursor) -> Result<AttributeGroupDef> {
        let mut def = AttributeGroupDef::new(self.global_name(node)?);
        for (tag, child) in xsd_children(node)? {
            match tag.as_str() {
                xsd_elements::ATTRIBUTE => def.attributes.push(self.attribute_use(&child)?),
                xsd_elements::ATTRIBUTE_GROUP => def
                    .attribute_groups
                    .push(self.required_qname(&child, xsd_attrs::REF)?),
                xsd_elements::ANY_ATTRIBUTE => def.any_attribute = Some(self.wildcard(&child)?),
                _ => {}
            }
        }
        Ok(def)
    }

    fn named_group(&self, node: &Cursor) -> Result<GroupDef> {
        let name = self.global_name(node)?;
        for (tag, child) in xsd_children(node)? {
            if matches!(tag.as_str(), xsd_elements::SEQUENCE | xsd_elements::CHOICE | xsd_elements::ALL) {
                return Ok(GroupDef::new(name, self.particle(&tag, &child)?));
            }
        }
        Err(node_error(node, format!("group '{}' has no model group", name)))
    }

    fn redefine(&self, node: &Cursor) -> Result<RedefineDef> {
        let mut def = RedefineDef::new(self.required(node, xsd_attrs::SCHEMA_LOCATION)?);
        for (tag, child) in xsd_children(node)? {
            match tag.as_str() {
                xsd_elements::COMPLEX_TYPE => def.types.push(self.complex_type(&child, true)?),
                xsd_elements::SIMPLE_TYPE => def.types.push(self.simple_type(&child, true)?),
                xsd_elements::GROUP => def.groups.push(self.named_group(&child)?),
                xsd_elements::ATTRIBUTE_GROUP => def.attribute_groups.push(self.attribute_group(&child)?),
                _ => {}
            }
        }
        Ok(def)
    }

    // Types

    fn complex_type(&self, node: &Cursor, global: bool) -> Result<TypeDef> {
        let name = if global {
            Some(self.global_name(node)?)
        } else {
            None
        };
        let mut def = TypeDef::complex(name);
        def.mixed = bool_attribute(node, xsd_attrs::MIXED)?;
        def.is_abstract = bool_attribute(node, xsd_attrs::ABSTRACT)?;
        def.block = self.flags(node, xsd_attrs::BLOCK, self.block_default)?;
        def.final_deriv = self.flags(node, xsd_attrs::FINAL, self.final_default)?;

        for (tag, child) in xsd_children(node)? {
            match tag.as_str() {
                xsd_elements::COMPLEX_CONTENT => {
                    if attribute(&child, xsd_attrs::MIXED)?.is_some() {
                        def.mixed = bool_attribute(&child, xsd_attrs::MIXED)?;
                    }
                    self.derivation(&child, &mut def)?;
                }
                xsd_elements::SIMPLE_CONTENT => {
                    def.simple_content = true;
                    self.derivation(&child, &mut def)?;
                }
                _ => self.type_content(&tag, &child, &mut def)?,
            }
        }
        Ok(def)
    }

    /// `xs:extension` or `xs:restriction` inside complex or simple content
    fn derivation(&self, node: &Cursor, def: &mut TypeDef) -> Result<()> {
        for (tag, child) in xsd_children(node)? {
            let method = match tag.as_str() {
                xsd_elements::EXTENSION => DerivationMethod::Extension,
                xsd_elements::RESTRICTION => DerivationMethod::Restriction,
                _ => continue,
            };
            def.base = Some(self.required_qname(&child, xsd_attrs::BASE)?);
            def.derivation = Some(method);
            for (inner, grandchild) in xsd_children(&child)? {
                self.type_content(&inner, &grandchild, def)?;
            }
            return Ok(());
        }
        Err(node_error(node, "missing xs:extension or xs:restriction"))
    }

    /// Particle and attribute children shared by every complex type form
    fn type_content(&self, tag: &str, node: &Cursor, def: &mut TypeDef) -> Result<()> {
        match tag {
            xsd_elements::SEQUENCE | xsd_elements::CHOICE | xsd_elements::ALL | xsd_elements::GROUP => {
                def.particle = Some(self.particle(tag, node)?);
            }
            xsd_elements::ATTRIBUTE => def.attributes.push(self.attribute_use(node)?),
            xsd_elements::ATTRIBUTE_GROUP => def
                .attribute_groups
                .push(self.required_qname(node, xsd_attrs::REF)?),
            xsd_elements::ANY_ATTRIBUTE => def.any_attribute = Some(self.wildcard(node)?),
            _ => {}
        }
        Ok(())
    }

    fn simple_type(&self, node: &Cursor, global: bool) -> Result<TypeDef> {
        let name = if global {
            Some(self.global_name(node)?)
        } else {
            None
        };
        let mut def = TypeDef::simple(name);
        def.final_deriv = self.flags(node, xsd_attrs::FINAL, self.final_default)?;

        let any_simple = || QName::namespaced(XSD_NAMESPACE, "anySimpleType");
        for (tag, child) in xsd_children(node)? {
            match tag.as_str() {
                xsd_elements::RESTRICTION => {
                    let base = self.qname(&child, xsd_attrs::BASE)?.unwrap_or_else(any_simple);
                    def = def.with_restriction(base);
                }
                xsd_elements::LIST | xsd_elements::UNION => def = def.with_restriction(any_simple()),
                _ => {}
            }
        }
        Ok(def)
    }

    // Particles

    fn particle(&self, tag: &str, node: &Cursor) -> Result<ParticleDef> {
        let particle = match tag {
            xsd_elements::ELEMENT => match self.qname(node, xsd_attrs::REF)? {
                Some(reference) => ParticleDef::element_ref(reference),
                None => ParticleDef::element(self.element(node, false)?),
            },
            xsd_elements::SEQUENCE | xsd_elements::CHOICE | xsd_elements::ALL => {
                let mut particles = Vec::new();
                for (inner, child) in xsd_children(node)? {
                    if matches!(
                        inner.as_str(),
                        xsd_elements::ELEMENT
                            | xsd_elements::SEQUENCE
                            | xsd_elements::CHOICE
                            | xsd_elements::ALL
                            | xsd_elements::GROUP
                            | xsd_elements::ANY
                    ) {
                        particles.push(self.particle(&inner, &child)?);
                    }
                }
                match tag {
                    xsd_elements::SEQUENCE => ParticleDef::sequence(particles),
                    xsd_elements::CHOICE => ParticleDef::choice(particles),
                    _ => ParticleDef::all(particles),
                }
            }
            xsd_elements::GROUP => ParticleDef::group_ref(self.required_qname(node, xsd_attrs::REF)?),
            xsd_elements::ANY => ParticleDef::any(self.wildcard(node)?),
            other => return Err(node_error(node, format!("xs:{} is not a particle", other))),
        };

        let min = attribute(node, xsd_attrs::MIN_OCCURS)?;
        let max = attribute(node, xsd_attrs::MAX_OCCURS)?;
        let occurs = parse_occurs(min.as_deref(), max.as_deref())
            .map_err(|err| node_error(node, err.to_string()))?;
        Ok(particle.with_occurs(occurs))
    }

    fn wildcard(&self, node: &Cursor) -> Result<Wildcard> {
        let namespace = match attribute(node, xsd_attrs::NAMESPACE)? {
            Some(value) => {
                NamespaceConstraint::from_namespace_attr(&value, self.target_namespace.as_deref())
                    .map_err(|err| node_error(node, err.message))?
            }
            None => NamespaceConstraint::Any,
        };
        let process_contents = match attribute(node, xsd_attrs::PROCESS_CONTENTS)? {
            Some(value) => ProcessContents::from_str(value.trim()).ok_or_else(|| {
                node_error(node, format!("invalid processContents value '{}'", value))
            })?,
            None => ProcessContents::Strict,
        };
        Ok(Wildcard::new(namespace, process_contents))
    }
}
