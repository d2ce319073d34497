//! Incremental construction of a token store
//!
//! Loaders push tokens one at a time; every push is checked against the
//! structural rules so `finish` only has to verify the document is closed.

use super::arena::TokenStore;
use super::tokens::{Token, TokenKind};
use crate::error::{Error, Result};
use crate::limits::Limits;
use crate::locations::SourceLocation;
use std::collections::HashSet;
use std::sync::Arc;

/// Builder for [`TokenStore`]
#[derive(Debug)]
pub struct StoreBuilder {
    tokens: Vec<(Token, Option<SourceLocation>)>,
    depth: usize,
    ended: bool,
    /// Attribute names and namespace prefixes of the start tag being built
    attributes: HashSet<String>,
    attribute_count: usize,
    namespace_count: usize,
    limits: Limits,
    uri: Option<Arc<str>>,
}

impl StoreBuilder {
    /// Create a builder with default limits
    pub fn new() -> Self {
        Self {
            tokens: Vec::new(),
            depth: 0,
            ended: false,
            attributes: HashSet::new(),
            attribute_count: 0,
            namespace_count: 0,
            limits: Limits::default(),
            uri: None,
        }
    }

    /// Set the limits
    pub fn with_limits(mut self, limits: Limits) -> Self {
        self.limits = limits;
        self
    }

    /// Set the URI of the resource being loaded
    pub fn with_uri(mut self, uri: impl Into<Arc<str>>) -> Self {
        self.uri = Some(uri.into());
        self
    }

    /// URI of the resource being loaded
    pub fn uri(&self) -> Option<&Arc<str>> {
        self.uri.as_ref()
    }

    /// Current element nesting depth
    pub fn depth(&self) -> usize {
        self.depth
    }

    /// Append a token
    pub fn push_token(&mut self, token: Token) -> Result<()> {
        self.push_located(token, None)
    }

    /// Append a token with the position the loader read it at
    pub fn push_located(&mut self, token: Token, location: Option<SourceLocation>) -> Result<()> {
        if self.ended {
            return Err(Error::malformed("tokens after the end of the document"));
        }
        let previous = self.tokens.last().map(|(t, _)| t.kind());
        match (&token, previous) {
            (Token::StartDoc, None) => {}
            (Token::StartDoc, Some(_)) => {
                return Err(Error::malformed("start of document may only appear first"))
            }
            (_, None) => return Err(Error::malformed("a document must open with StartDoc")),
            _ => {}
        }

        match &token {
            Token::StartElement { name } => {
                crate::names::validate_name(name)?;
                self.depth += 1;
                self.limits.check_xml_depth(self.depth)?;
                self.reset_start_tag();
            }
            Token::EndElement => {
                if self.depth == 0 {
                    return Err(Error::malformed("end tag without a matching start tag"));
                }
                self.depth -= 1;
            }
            Token::EndDoc => {
                if self.depth != 0 {
                    return Err(Error::malformed(format!(
                        "{} element(s) left open at the end of the document",
                        self.depth
                    )));
                }
                self.ended = true;
            }
            Token::Attribute { name, .. } => {
                self.check_attribute_position(previous)?;
                crate::names::validate_name(name)?;
                if !self.attributes.insert(format!("a{}", name.to_clark())) {
                    return Err(Error::malformed(format!("duplicate attribute {}", name)));
                }
                self.attribute_count += 1;
                self.limits.check_attributes(self.attribute_count)?;
            }
            Token::Namespace { prefix, .. } => {
                self.check_attribute_position(previous)?;
                let key = format!("n{}", prefix.as_deref().unwrap_or(""));
                if !self.attributes.insert(key) {
                    return Err(Error::malformed(format!(
                        "duplicate namespace declaration for prefix '{}'",
                        prefix.as_deref().unwrap_or("")
                    )));
                }
                self.namespace_count += 1;
                self.limits.check_namespaces(self.namespace_count)?;
            }
            Token::StartDoc | Token::Text(_) | Token::Comment(_) => {}
            Token::ProcessingInstruction { .. } => {}
        }

        self.tokens.push((token, location));
        self.limits.check_tokens(self.tokens.len())
    }

    /// Close the builder and produce the store
    pub fn finish(self) -> Result<TokenStore> {
        if !self.ended {
            return Err(Error::malformed("document is not closed with EndDoc"));
        }
        log::debug!("built token store with {} tokens", self.tokens.len());
        Ok(TokenStore::from_validated(self.tokens, self.uri))
    }

    fn check_attribute_position(&self, previous: Option<TokenKind>) -> Result<()> {
        match previous {
            Some(kind) if kind == TokenKind::StartElement || kind.is_attribute_like() => Ok(()),
            _ => Err(Error::malformed(
                "attributes may only follow a start tag or another attribute",
            )),
        }
    }

    fn reset_start_tag(&mut self) {
        self.attributes.clear();
        self.attribute_count = 0;
        self.namespace_count = 0;
    }
}

impl Default for StoreBuilder {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::namespaces::QName;

    fn build(tokens: Vec<Token>) -> Result<TokenStore> {
        TokenStore::bulk_load(tokens)
    }

    #[test]
    fn test_bulk_load_valid() {
        let store = build(vec![
            Token::StartDoc,
            Token::start(QName::local("a")),
            Token::namespace(Some("p"), "urn:p"),
            Token::attribute(QName::local("x"), "1"),
            Token::text("hi"),
            Token::EndElement,
            Token::EndDoc,
        ])
        .unwrap();
        assert_eq!(store.len(), 7);
    }

    #[test]
    fn test_bulk_load_rejects_unbalanced() {
        let err = build(vec![
            Token::StartDoc,
            Token::start(QName::local("a")),
            Token::EndDoc,
        ]);
        assert!(matches!(err, Err(Error::Structural(_))));

        let err = build(vec![Token::StartDoc, Token::EndElement, Token::EndDoc]);
        assert!(matches!(err, Err(Error::Structural(_))));
    }

    #[test]
    fn test_bulk_load_rejects_misplaced_attribute() {
        let err = build(vec![
            Token::StartDoc,
            Token::start(QName::local("a")),
            Token::text("x"),
            Token::attribute(QName::local("x"), "1"),
            Token::EndElement,
            Token::EndDoc,
        ]);
        assert!(matches!(err, Err(Error::Structural(_))));
    }

    #[test]
    fn test_bulk_load_rejects_duplicate_attribute() {
        let err = build(vec![
            Token::StartDoc,
            Token::start(QName::local("a")),
            Token::attribute(QName::local("x"), "1"),
            Token::attribute(QName::local("x"), "2"),
            Token::EndElement,
            Token::EndDoc,
        ]);
        assert!(matches!(err, Err(Error::Structural(_))));
    }

    #[test]
    fn test_unclosed_document() {
        let mut builder = StoreBuilder::new();
        builder.push_token(Token::StartDoc).unwrap();
        assert!(builder.finish().is_err());
    }

    #[test]
    fn test_depth_limit() {
        let mut builder = StoreBuilder::new().with_limits(Limits::new().with_max_xml_depth(1));
        builder.push_token(Token::StartDoc).unwrap();
        builder.push_token(Token::start(QName::local("a"))).unwrap();
        let err = builder.push_token(Token::start(QName::local("b")));
        assert!(matches!(err, Err(Error::LimitExceeded(_))));
    }
}
