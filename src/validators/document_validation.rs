//! Streaming document validation
//!
//! [`StreamingValidator`] consumes the tokens of an instance document in
//! order and checks them against a resolved [`SchemaTypeSystem`]. Start tags
//! are held back until their attribute and namespace tokens have been seen;
//! every open element then gets a frame with the content automaton of its
//! type. Content problems become [`ValidationIssue`]s and never stop the
//! pass; only a broken token sequence or an exceeded limit does.

use std::fmt;

use super::base::ValidationMode;
use super::complex_types::{DerivationFlags, TypeKey};
use super::elements::ElementKey;
use super::exceptions::{IssueKind, Severity, ValidationIssue};
use super::models::{ContentAutomaton, ContentError, Matched, Step};
use super::schemas::SchemaTypeSystem;
use super::validation::{ValidationReport, ValidatorOptions, ValidatorState};
use super::wildcards::ProcessContents;

use crate::error::{Error, Result};
use crate::locations::SourceLocation;
use crate::namespaces::{NamespaceContext, QName, XSI_NAMESPACE};
use crate::store::{Cursor, Token, TokenKind};

/// Start tag waiting for its attributes
#[derive(Debug)]
struct PendingStart {
    name: QName,
    location: Option<SourceLocation>,
    attributes: Vec<(QName, String)>,
    namespaces: Vec<(Option<String>, String)>,
}

/// Validation state of one open element
#[derive(Debug)]
enum ElementFrame<'s> {
    /// Element with a known type
    Typed {
        type_key: TypeKey,
        automaton: ContentAutomaton<'s>,
        nilled: bool,
        has_children: bool,
        has_text: bool,
        text: String,
        fixed: Option<&'s str>,
    },
    /// Undeclared element whose children are validated when declared
    Lax,
    /// Subtree excluded from validation
    Skip,
}

/// Token-driven validator for one document
pub struct StreamingValidator<'s> {
    system: &'s SchemaTypeSystem,
    options: ValidatorOptions,
    state: ValidatorState,
    frames: Vec<ElementFrame<'s>>,
    namespaces: Vec<NamespaceContext>,
    base_namespaces: NamespaceContext,
    path: Vec<String>,
    pending: Option<PendingStart>,
    location: Option<SourceLocation>,
    issues: Vec<ValidationIssue>,
    /// Root element had no declaration under strict mode
    root_unmatched: bool,
}

impl fmt::Debug for StreamingValidator<'_> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("StreamingValidator")
            .field("mode", &self.options.mode)
            .field("state", &self.state)
            .field("depth", &self.frames.len())
            .field("issues", &self.issues.len())
            .finish()
    }
}

impl<'s> StreamingValidator<'s> {
    /// Validator with default options
    pub fn new(system: &'s SchemaTypeSystem) -> Result<Self> {
        Self::with_options(system, ValidatorOptions::default())
    }

    /// Validator with explicit options
    pub fn with_options(system: &'s SchemaTypeSystem, options: ValidatorOptions) -> Result<Self> {
        if !system.is_resolved() {
            return Err(Error::NotResolved);
        }
        Ok(Self {
            system,
            options,
            state: ValidatorState::BeforeDocument,
            frames: Vec::new(),
            namespaces: Vec::new(),
            base_namespaces: NamespaceContext::new(),
            path: Vec::new(),
            pending: None,
            location: None,
            issues: Vec::new(),
            root_unmatched: false,
        })
    }

    /// Current state
    pub fn state(&self) -> ValidatorState {
        self.state
    }

    /// Issues found so far
    pub fn issues(&self) -> &[ValidationIssue] {
        &self.issues
    }

    /// Feed the next token of the document
    pub fn process_token(&mut self, token: &Token, location: Option<&SourceLocation>) -> Result<()> {
        match token {
            Token::Attribute { name, value } => {
                let pending = self.pending_start(token)?;
                pending.attributes.push((name.clone(), value.clone()));
                return Ok(());
            }
            Token::Namespace { prefix, uri } => {
                let pending = self.pending_start(token)?;
                pending.namespaces.push((prefix.clone(), uri.clone()));
                return Ok(());
            }
            _ => {}
        }

        self.flush_pending()?;
        self.location = location.cloned();

        match token {
            Token::StartElement { name } => {
                self.pending = Some(PendingStart {
                    name: name.clone(),
                    location: location.cloned(),
                    attributes: Vec::new(),
                    namespaces: Vec::new(),
                });
            }
            Token::EndElement => self.end_element()?,
            Token::Text(text) => self.text(text),
            Token::StartDoc
            | Token::EndDoc
            | Token::Comment(_)
            | Token::ProcessingInstruction { .. } => {}
            Token::Attribute { .. } | Token::Namespace { .. } => {
                unreachable!("attribute-like tokens are handled above")
            }
        }
        Ok(())
    }

    /// Close the pass and produce the report
    pub fn finish(mut self) -> Result<ValidationReport> {
        self.flush_pending()?;

        if let Some(open) = self.path.last() {
            let message = format!("input ended inside element '{}'", open);
            self.push(IssueKind::IncompleteDocument, message);
            self.state = ValidatorState::Invalid;
        } else if self.state == ValidatorState::BeforeDocument {
            self.push(IssueKind::IncompleteDocument, "document has no root element");
            self.state = ValidatorState::Invalid;
        } else if self.root_unmatched {
            self.state = ValidatorState::Invalid;
        }

        log::debug!(
            "validation pass finished in state {} with {} issues",
            self.state,
            self.issues.len()
        );
        Ok(ValidationReport::new(self.state, self.issues))
    }

    /// Validate from a cursor position
    ///
    /// A cursor on a start tag validates that element's subtree, any other
    /// position validates the whole document.
    pub fn validate(mut self, cursor: &Cursor) -> Result<ValidationReport> {
        let at = cursor.position()?;
        let on_element = cursor.kind()? == TokenKind::StartElement;
        if on_element {
            self.base_namespaces = cursor.in_scope_namespaces()?;
        }

        let store = cursor
            .store()
            .try_borrow()
            .map_err(|_| Error::malformed("token store is borrowed for modification"))?;
        let (start, end) = if on_element {
            (at, Some(store.matching_end(at)?))
        } else {
            (store.first(), None)
        };

        log::debug!(
            "validation pass started in {} mode{}",
            self.options.mode,
            if on_element { " on a subtree" } else { "" }
        );
        for (id, token) in store.iterate_from(start)? {
            self.process_token(token, store.location(id)?)?;
            if Some(id) == end {
                break;
            }
        }
        drop(store);
        self.finish()
    }

    // Token handling

    fn pending_start(&mut self, token: &Token) -> Result<&mut PendingStart> {
        self.pending
            .as_mut()
            .ok_or_else(|| Error::malformed(format!("{} outside a start tag", token)))
    }

    fn flush_pending(&mut self) -> Result<()> {
        match self.pending.take() {
            Some(pending) => self.start_element(pending),
            None => Ok(()),
        }
    }

    fn start_element(&mut self, start: PendingStart) -> Result<()> {
        self.options.limits.check_xml_depth(self.frames.len() + 1)?;
        self.location = start.location.clone();

        let mut context = self
            .namespaces
            .last()
            .unwrap_or(&self.base_namespaces)
            .clone();
        for (prefix, uri) in &start.namespaces {
            context.declare(prefix.as_deref(), uri);
        }
        self.namespaces.push(context);
        self.path.push(start.name.prefixed());

        if self.frames.is_empty() {
            self.state = ValidatorState::InElement;
            return self.start_root(&start);
        }

        let step = match self.frames.last_mut() {
            Some(ElementFrame::Typed {
                automaton,
                has_children,
                ..
            }) => {
                *has_children = true;
                Some(automaton.step(&start.name))
            }
            Some(ElementFrame::Lax) => None,
            Some(ElementFrame::Skip) | None => {
                self.frames.push(ElementFrame::Skip);
                return Ok(());
            }
        };

        match step {
            None => self.start_lax(&start),
            Some(Step::Accepted(matched)) => self.start_matched(matched, &start),
            Some(Step::Recovered(matched, missing)) => {
                let parent = self.path.len() - 1;
                for error in missing {
                    self.content_issue(error, parent);
                }
                self.start_matched(matched, &start)
            }
            Some(Step::Rejected(error)) => {
                self.content_issue(error, self.path.len());
                match self.system.element_key(&start.name) {
                    Some(key) => self.start_declared(key, &start),
                    None => {
                        self.frames.push(ElementFrame::Skip);
                        Ok(())
                    }
                }
            }
        }
    }

    fn start_root(&mut self, start: &PendingStart) -> Result<()> {
        if let Some(key) = self.system.element_key(&start.name) {
            return self.start_declared(key, start);
        }
        let message = format!("no global declaration for root element '{}'", start.name);
        match self.options.mode {
            ValidationMode::Strict => {
                self.push(IssueKind::UndeclaredElement, message);
                self.root_unmatched = true;
                self.frames.push(ElementFrame::Skip);
            }
            ValidationMode::Lax => {
                let issue = self
                    .issue(IssueKind::UndeclaredElement, message)
                    .with_severity(Severity::Warning);
                self.issues.push(issue);
                self.frames.push(ElementFrame::Lax);
            }
            ValidationMode::Skip => self.frames.push(ElementFrame::Skip),
        }
        Ok(())
    }

    fn start_lax(&mut self, start: &PendingStart) -> Result<()> {
        match self.system.element_key(&start.name) {
            Some(key) => self.start_declared(key, start),
            None => {
                self.frames.push(ElementFrame::Lax);
                Ok(())
            }
        }
    }

    fn start_matched(&mut self, matched: Matched<'s>, start: &PendingStart) -> Result<()> {
        match matched {
            Matched::Element(key) => self.start_declared(key, start),
            Matched::Wildcard(wildcard) => match wildcard.process_contents {
                ProcessContents::Skip => {
                    self.frames.push(ElementFrame::Skip);
                    Ok(())
                }
                ProcessContents::Lax => self.start_lax(start),
                ProcessContents::Strict => match self.system.element_key(&start.name) {
                    Some(key) => self.start_declared(key, start),
                    None => {
                        let message = format!(
                            "element '{}' matches a strict wildcard but has no global declaration",
                            start.name
                        );
                        self.push(IssueKind::UndeclaredElement, message);
                        self.frames.push(ElementFrame::Skip);
                        Ok(())
                    }
                },
            },
        }
    }

    fn start_declared(&mut self, key: ElementKey, start: &PendingStart) -> Result<()> {
        let system = self.system;
        let decl = system.element(key);
        if decl.is_abstract {
            self.push(
                IssueKind::AbstractElementUsed,
                format!("element '{}' is abstract", decl.name),
            );
        }

        let type_key = self.instance_type(decl.type_key, &decl.block, start);
        let schema_type = system.schema_type(type_key);
        if schema_type.is_abstract {
            self.push(
                IssueKind::AbstractElementUsed,
                format!(
                    "type '{}' of element '{}' is abstract",
                    schema_type.display_name(),
                    decl.name
                ),
            );
        }

        let nilled = match attribute(start, XSI_NAMESPACE, "nil").map(str::trim) {
            Some("true") | Some("1") if decl.nillable => true,
            Some("true") | Some("1") => {
                self.push(
                    IssueKind::NotNillable,
                    format!("element '{}' is not nillable", decl.name),
                );
                false
            }
            _ => false,
        };

        self.check_attributes(type_key, start);

        self.frames.push(ElementFrame::Typed {
            type_key,
            automaton: ContentAutomaton::new(system, type_key)?,
            nilled,
            has_children: false,
            has_text: false,
            text: String::new(),
            fixed: decl.fixed.as_deref(),
        });
        Ok(())
    }

    /// Apply `xsi:type`, falling back to the declared type when it is unusable
    fn instance_type(
        &mut self,
        declared: TypeKey,
        block: &DerivationFlags,
        start: &PendingStart,
    ) -> TypeKey {
        let Some(value) = attribute(start, XSI_NAMESPACE, "type") else {
            return declared;
        };
        let resolved = self
            .namespaces
            .last()
            .unwrap_or(&self.base_namespaces)
            .resolve(value);
        let name = match resolved {
            Ok(name) => name,
            Err(err) => {
                self.push(
                    IssueKind::InvalidXsiType,
                    format!("cannot resolve xsi:type '{}': {}", value, err),
                );
                return declared;
            }
        };

        let system = self.system;
        let Some(key) = system.type_key(&name) else {
            self.push(
                IssueKind::InvalidXsiType,
                format!("xsi:type '{}' is not a known type", name),
            );
            return declared;
        };
        let Some(methods) = system.derivation_methods(key, declared) else {
            self.push(
                IssueKind::InvalidXsiType,
                format!(
                    "xsi:type '{}' is not derived from '{}'",
                    name,
                    system.schema_type(declared).display_name()
                ),
            );
            return declared;
        };
        if block.forbids(&methods) || system.schema_type(declared).block.forbids(&methods) {
            self.push(
                IssueKind::InvalidXsiType,
                format!("xsi:type '{}' uses a blocked derivation", name),
            );
            return declared;
        }
        key
    }

    fn check_attributes(&mut self, type_key: TypeKey, start: &PendingStart) {
        let system = self.system;
        let schema_type = system.schema_type(type_key);

        for (name, value) in &start.attributes {
            if name.namespace.as_deref() == Some(XSI_NAMESPACE) {
                continue;
            }
            if let Some(attribute_use) = schema_type.attributes.get(name) {
                if !attribute_use.accepts(value) {
                    self.push(
                        IssueKind::FixedValueMismatch,
                        format!(
                            "attribute '{}' must have the fixed value '{}'",
                            name,
                            attribute_use.fixed.as_deref().unwrap_or_default()
                        ),
                    );
                }
                continue;
            }

            let wildcard = schema_type
                .attribute_wildcard
                .as_ref()
                .filter(|w| w.matches(name));
            let Some(wildcard) = wildcard else {
                self.push(
                    IssueKind::AttributeNotAllowed,
                    format!("attribute '{}' is not allowed on this element", name),
                );
                continue;
            };

            let global = system.globals().lookup_attribute(name);
            match (wildcard.process_contents, global) {
                (ProcessContents::Skip, _) => {}
                (ProcessContents::Strict, None) => self.push(
                    IssueKind::AttributeNotAllowed,
                    format!(
                        "attribute '{}' matches a strict wildcard but has no global declaration",
                        name
                    ),
                ),
                (_, Some(decl)) => {
                    if let Some(fixed) = &decl.fixed {
                        if fixed.trim() != value.trim() {
                            self.push(
                                IssueKind::FixedValueMismatch,
                                format!("attribute '{}' must have the fixed value '{}'", name, fixed),
                            );
                        }
                    }
                }
                (ProcessContents::Lax, None) => {}
            }
        }

        for required in schema_type.required_attributes() {
            if !start.attributes.iter().any(|(name, _)| name == &required.name) {
                self.push(
                    IssueKind::MissingAttribute,
                    format!("required attribute '{}' is missing", required.name),
                );
            }
        }
    }

    fn text(&mut self, value: &str) {
        let system = self.system;
        let Some(ElementFrame::Typed {
            type_key,
            has_text,
            text,
            fixed,
            ..
        }) = self.frames.last_mut()
        else {
            return;
        };
        if value.trim().is_empty() {
            if fixed.is_some() {
                text.push_str(value);
            }
            return;
        }

        *has_text = true;
        if fixed.is_some() {
            text.push_str(value);
        }
        let content_type = system.schema_type(*type_key).content_type;
        if !content_type.allows_text() {
            let message = format!("character data is not allowed in {} content", content_type);
            self.push(IssueKind::TextNotAllowed, message);
        }
    }

    fn end_element(&mut self) -> Result<()> {
        let frame = self
            .frames
            .pop()
            .ok_or_else(|| Error::malformed("end tag without a matching start tag"))?;

        if let ElementFrame::Typed {
            automaton,
            nilled,
            has_children,
            has_text,
            text,
            fixed,
            ..
        } = frame
        {
            if nilled {
                if has_children || has_text {
                    self.push(IssueKind::NotNillable, "nilled element must be empty");
                }
            } else {
                for error in automaton.finish() {
                    self.content_issue(error, self.path.len());
                }
                if let Some(fixed) = fixed {
                    if (has_text || has_children) && fixed.trim() != text.trim() {
                        self.push(
                            IssueKind::FixedValueMismatch,
                            format!("element value must be the fixed value '{}'", fixed),
                        );
                    }
                }
            }
        }

        self.path.pop();
        self.namespaces.pop();
        if self.frames.is_empty() {
            self.state = ValidatorState::AfterDocument;
        }
        Ok(())
    }

    // Reporting

    fn current_path(&self) -> String {
        format!("/{}", self.path.join("/"))
    }

    fn issue(&self, kind: IssueKind, message: impl Into<String>) -> ValidationIssue {
        let mut issue = ValidationIssue::new(kind, message)
            .with_path(self.current_path())
            .with_location(self.location.clone());
        if let Some(element) = self.path.last() {
            issue = issue.with_element(element.clone());
        }
        issue
    }

    fn push(&mut self, kind: IssueKind, message: impl Into<String>) {
        let issue = self.issue(kind, message);
        log::debug!("{}", issue);
        self.issues.push(issue);
    }

    /// Report a content model error against the element at `depth` in the path
    fn content_issue(&mut self, error: ContentError, depth: usize) {
        let kind = match &error {
            ContentError::Missing { .. } => IssueKind::MissingElement,
            ContentError::Unexpected { .. } => IssueKind::UnexpectedElement,
            ContentError::SubstitutionFinal { .. } => IssueKind::SubstitutionFinalViolation,
        };
        let expected = match &error {
            ContentError::Missing { expected } | ContentError::Unexpected { expected, .. } => {
                expected.iter().map(|e| e.to_string()).collect()
            }
            ContentError::SubstitutionFinal { .. } => Vec::new(),
        };

        let mut issue = self.issue(kind, error.to_string()).with_expected(expected);
        if depth < self.path.len() {
            issue.path = Some(format!("/{}", self.path[..depth].join("/")));
            issue.element = depth.checked_sub(1).map(|i| self.path[i].clone());
        }
        log::debug!("{}", issue);
        self.issues.push(issue);
    }
}

fn attribute<'p>(start: &'p PendingStart, namespace: &str, local_name: &str) -> Option<&'p str> {
    start
        .attributes
        .iter()
        .find(|(name, _)| name.matches(Some(namespace), local_name))
        .map(|(_, value)| value.as_str())
}
