//! Resource loading utilities
//!
//! This module reads XML text with quick-xml and feeds the resulting events
//! into a [`StoreBuilder`], resolving namespace prefixes on the way and
//! recording the line and column every token was read at.

use crate::documents::Document;
use crate::error::{Error, Result};
use crate::limits::Limits;
use crate::locations::{Location, SourceLocation};
use crate::namespaces::NamespaceContext;
use crate::store::{StoreBuilder, Token, TokenStore};
use quick_xml::events::{BytesStart, Event};
use quick_xml::Reader;
use std::fs;
use std::sync::Arc;

/// Resource loader for schemas and documents
#[derive(Debug)]
pub struct Loader {
    /// Resource limits
    limits: Limits,
    /// Whether to allow remote resources
    allow_remote: bool,
}

impl Loader {
    /// Create a new loader with default settings
    pub fn new() -> Self {
        Self {
            limits: Limits::default(),
            allow_remote: false,
        }
    }

    /// Set the limits
    pub fn with_limits(mut self, limits: Limits) -> Self {
        self.limits = limits;
        self
    }

    /// Set whether to allow remote resources
    pub fn with_allow_remote(mut self, allow: bool) -> Self {
        self.allow_remote = allow;
        self
    }

    /// Limits applied while loading
    pub fn limits(&self) -> &Limits {
        &self.limits
    }

    /// Load a resource as a string
    pub fn load_text(&self, location: &Location) -> Result<String> {
        match location {
            Location::Path(path) => {
                let content = fs::read_to_string(path).map_err(|e| {
                    Error::Resource(format!("Failed to read file '{}': {}", path.display(), e))
                })?;
                self.limits.check_xml_size(content.len())?;
                Ok(content)
            }
            Location::Url(url) => {
                if !self.allow_remote {
                    return Err(Error::Resource(
                        "Remote resources are not allowed".to_string(),
                    ));
                }
                Err(Error::Resource(format!(
                    "no transport available for remote resource {}",
                    url
                )))
            }
            Location::String(s) => Ok(s.clone()),
        }
    }

    /// Load a document from a location
    pub fn load(&self, location: &Location) -> Result<Document> {
        let text = self.load_text(location)?;
        let uri = location.uri().map(Arc::<str>::from);
        log::debug!("loading {}", location.as_str());
        Ok(Document::from_store(self.parse_store(&text, uri)?))
    }

    /// Load a document from XML text
    pub fn load_str(&self, xml: &str) -> Result<Document> {
        Ok(Document::from_store(self.parse_store(xml, None)?))
    }

    /// Parse XML text into a token store
    pub fn parse_store(&self, xml: &str, uri: Option<Arc<str>>) -> Result<TokenStore> {
        self.limits.check_xml_size(xml.len())?;

        let mut builder = StoreBuilder::new().with_limits(self.limits.clone());
        if let Some(ref uri) = uri {
            builder = builder.with_uri(uri.clone());
        }
        let lines = LineIndex::new(xml, uri);
        let mut reader = Reader::from_str(xml);
        reader.trim_text(false);

        let mut scopes: Vec<NamespaceContext> = vec![NamespaceContext::new()];
        builder.push_located(Token::StartDoc, Some(lines.locate(0)))?;

        loop {
            let offset = reader.buffer_position();
            let at = Some(lines.locate(offset));
            match reader.read_event() {
                Ok(Event::Start(e)) => {
                    let scope = push_start(&mut builder, &e, current(&scopes), at)?;
                    scopes.push(scope);
                }
                Ok(Event::Empty(e)) => {
                    push_start(&mut builder, &e, current(&scopes), at.clone())?;
                    builder.push_located(Token::EndElement, at)?;
                }
                Ok(Event::End(_)) => {
                    scopes.pop();
                    builder.push_located(Token::EndElement, at)?;
                }
                Ok(Event::Text(e)) => {
                    let text = e
                        .unescape()
                        .map_err(|e| Error::Xml(format!("Failed to unescape text: {}", e)))?;
                    if !text.is_empty() && builder.depth() > 0 {
                        builder.push_located(Token::Text(text.into_owned()), at)?;
                    }
                }
                Ok(Event::CData(e)) => {
                    let text = utf8(&e)?;
                    builder.push_located(Token::Text(text), at)?;
                }
                Ok(Event::Comment(e)) => {
                    builder.push_located(Token::Comment(utf8(&e)?), at)?;
                }
                Ok(Event::PI(e)) => {
                    let content = utf8(&e)?;
                    let (target, data) = match content.split_once(char::is_whitespace) {
                        Some((t, d)) => (t.to_string(), d.trim_start().to_string()),
                        None => (content, String::new()),
                    };
                    builder.push_located(Token::ProcessingInstruction { target, data }, at)?;
                }
                Ok(Event::Eof) => break,
                Ok(_) => {} // XML declaration, DOCTYPE
                Err(e) => {
                    return Err(Error::Xml(format!(
                        "Error parsing XML at position {}: {}",
                        reader.buffer_position(),
                        e
                    )))
                }
            }
        }

        builder.push_located(Token::EndDoc, Some(lines.locate(xml.len())))?;
        builder.finish()
    }
}

impl Default for Loader {
    fn default() -> Self {
        Self::new()
    }
}

/// Load a document from XML text with default settings
pub fn load_str(xml: &str) -> Result<Document> {
    Loader::new().load_str(xml)
}

fn current(scopes: &[NamespaceContext]) -> &NamespaceContext {
    static EMPTY: once_cell::sync::Lazy<NamespaceContext> =
        once_cell::sync::Lazy::new(NamespaceContext::new);
    scopes.last().unwrap_or(&EMPTY)
}

/// Push a start tag with its namespace declarations and attributes,
/// returning the namespace scope of the element
fn push_start(
    builder: &mut StoreBuilder,
    start: &BytesStart<'_>,
    parent: &NamespaceContext,
    at: Option<SourceLocation>,
) -> Result<NamespaceContext> {
    let mut scope = parent.clone();
    let mut declarations = Vec::new();
    let mut attributes = Vec::new();

    for attr in start.attributes() {
        let attr = attr.map_err(|e| Error::Xml(format!("Failed to parse attribute: {}", e)))?;
        let key = std::str::from_utf8(attr.key.as_ref())
            .map_err(|e| Error::Xml(format!("Invalid attribute name: {}", e)))?
            .to_string();
        let value = attr
            .unescape_value()
            .map_err(|e| Error::Xml(format!("Failed to unescape attribute value: {}", e)))?
            .into_owned();

        if key == "xmlns" {
            scope.declare(None, &value);
            declarations.push(Token::namespace(None, value));
        } else if let Some(prefix) = key.strip_prefix("xmlns:") {
            scope.declare(Some(prefix), &value);
            declarations.push(Token::namespace(Some(prefix), value));
        } else {
            attributes.push((key, value));
        }
    }

    let name = std::str::from_utf8(start.name().as_ref())
        .map_err(|e| Error::Xml(format!("Invalid element name: {}", e)))?
        .to_string();
    let name = scope.resolve(&name)?;
    builder.push_located(Token::start(name), at.clone())?;
    for token in declarations {
        builder.push_located(token, at.clone())?;
    }
    for (key, value) in attributes {
        let name = scope.resolve_attribute(&key)?;
        builder.push_located(Token::attribute(name, value), at.clone())?;
    }
    Ok(scope)
}

fn utf8(bytes: &[u8]) -> Result<String> {
    std::str::from_utf8(bytes)
        .map(str::to_string)
        .map_err(|e| Error::Xml(format!("Invalid UTF-8: {}", e)))
}

/// Byte offset to line/column mapping
struct LineIndex {
    starts: Vec<usize>,
    uri: Option<Arc<str>>,
}

impl LineIndex {
    fn new(text: &str, uri: Option<Arc<str>>) -> Self {
        let mut starts = vec![0];
        starts.extend(text.match_indices('\n').map(|(i, _)| i + 1));
        Self { starts, uri }
    }

    fn locate(&self, offset: usize) -> SourceLocation {
        let line = match self.starts.binary_search(&offset) {
            Ok(i) => i,
            Err(i) => i - 1,
        };
        let column = offset - self.starts[line] + 1;
        let location = SourceLocation::new(line as u32 + 1, column as u32);
        match self.uri {
            Some(ref uri) => location.with_uri(uri.clone()),
            None => location,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::namespaces::QName;
    use crate::store::TokenKind;
    use pretty_assertions::assert_eq;
    use std::io::Write;
    use tempfile::NamedTempFile;

    #[test]
    fn test_load_tokens() {
        let doc = load_str(r#"<?xml version="1.0"?><a x="1">t<!--c--><?pi data?><b/></a>"#)
            .unwrap();
        assert_eq!(
            doc.tokens(),
            vec![
                Token::StartDoc,
                Token::start(QName::local("a")),
                Token::attribute(QName::local("x"), "1"),
                Token::text("t"),
                Token::Comment("c".to_string()),
                Token::ProcessingInstruction {
                    target: "pi".to_string(),
                    data: "data".to_string()
                },
                Token::start(QName::local("b")),
                Token::EndElement,
                Token::EndElement,
                Token::EndDoc,
            ]
        );
    }

    #[test]
    fn test_namespaces_resolved() {
        let doc = load_str(r#"<p:a xmlns:p="urn:p" p:k="v"><b xmlns="urn:d"/></p:a>"#).unwrap();
        let tokens = doc.tokens();
        assert_eq!(tokens[1], Token::start(QName::namespaced("urn:p", "a")));
        assert_eq!(tokens[2], Token::namespace(Some("p"), "urn:p"));
        assert_eq!(tokens[3], Token::attribute(QName::namespaced("urn:p", "k"), "v"));
        assert_eq!(tokens[4], Token::start(QName::namespaced("urn:d", "b")));
        assert_eq!(tokens[5].kind(), TokenKind::Namespace);
    }

    #[test]
    fn test_unknown_prefix() {
        assert!(matches!(load_str("<p:a/>"), Err(Error::Name(_))));
    }

    #[test]
    fn test_malformed_xml() {
        assert!(load_str("<a><b></a>").is_err());
    }

    #[test]
    fn test_line_and_column() {
        let doc = load_str("<a>\n  <b/>\n</a>").unwrap();
        let mut c = doc.new_cursor().unwrap();
        c.to_first_child();
        c.to_first_child();
        let loc = c.location().unwrap().unwrap();
        assert_eq!((loc.line, loc.column), (2, 3));
    }

    #[test]
    fn test_load_from_file() {
        let mut file = NamedTempFile::new().unwrap();
        writeln!(file, "<root>test</root>").unwrap();

        let location = Location::Path(file.path().to_path_buf());
        let loader = Loader::new();
        let doc = loader.load(&location).unwrap();
        let mut c = doc.new_cursor().unwrap();
        c.to_first_child();
        assert_eq!(c.text().unwrap(), "test");
        let loc = c.location().unwrap().unwrap();
        assert!(loc.uri.as_deref().unwrap().starts_with("file://"));
    }

    #[test]
    fn test_size_limit() {
        let mut file = NamedTempFile::new().unwrap();
        let large_content = "x".repeat(11 * 1024 * 1024); // 11 MB
        write!(file, "{}", large_content).unwrap();

        let location = Location::Path(file.path().to_path_buf());
        let loader = Loader::new().with_limits(Limits::strict());
        let result = loader.load_text(&location);

        // Strict limits (10 MB max) should reject 11MB file
        assert!(result.is_err());
    }
}
