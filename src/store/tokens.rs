//! Structural tokens
//!
//! A document is a flat run of tokens. Nesting is implied by pairing
//! [`Token::StartElement`] with [`Token::EndElement`]; attributes and
//! namespace declarations directly follow the start token they belong to.

use crate::namespaces::QName;
use serde::Serialize;
use std::fmt;

/// Kind of a structural token
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
pub enum TokenKind {
    /// Start of the document
    StartDoc,
    /// End of the document
    EndDoc,
    /// Element start tag
    StartElement,
    /// Element end tag
    EndElement,
    /// Attribute of the preceding start tag
    Attribute,
    /// Namespace declaration of the preceding start tag
    Namespace,
    /// Character data
    Text,
    /// Comment
    Comment,
    /// Processing instruction
    ProcessingInstruction,
}

impl TokenKind {
    /// Whether the kind belongs to the attribute run of a start tag
    pub fn is_attribute_like(self) -> bool {
        matches!(self, TokenKind::Attribute | TokenKind::Namespace)
    }

    /// Whether the kind is element content (text, comment, PI or an element)
    pub fn is_content(self) -> bool {
        matches!(
            self,
            TokenKind::StartElement
                | TokenKind::Text
                | TokenKind::Comment
                | TokenKind::ProcessingInstruction
        )
    }
}

impl fmt::Display for TokenKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            TokenKind::StartDoc => "STARTDOC",
            TokenKind::EndDoc => "ENDDOC",
            TokenKind::StartElement => "START",
            TokenKind::EndElement => "END",
            TokenKind::Attribute => "ATTR",
            TokenKind::Namespace => "NAMESPACE",
            TokenKind::Text => "TEXT",
            TokenKind::Comment => "COMMENT",
            TokenKind::ProcessingInstruction => "PROCINST",
        };
        f.write_str(s)
    }
}

/// One structural unit of an XML infoset
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub enum Token {
    /// Start of the document
    StartDoc,
    /// End of the document
    EndDoc,
    /// Element start tag
    StartElement {
        /// Element name
        name: QName,
    },
    /// Element end tag; its name is the one of the matching start tag
    EndElement,
    /// Attribute
    Attribute {
        /// Attribute name
        name: QName,
        /// Attribute value
        value: String,
    },
    /// Namespace declaration (`None` prefix declares the default namespace)
    Namespace {
        /// Declared prefix
        prefix: Option<String>,
        /// Namespace URI
        uri: String,
    },
    /// Character data
    Text(String),
    /// Comment
    Comment(String),
    /// Processing instruction
    ProcessingInstruction {
        /// Target
        target: String,
        /// Data
        data: String,
    },
}

impl Token {
    /// Element start tag
    pub fn start(name: QName) -> Self {
        Token::StartElement { name }
    }

    /// Attribute
    pub fn attribute(name: QName, value: impl Into<String>) -> Self {
        Token::Attribute {
            name,
            value: value.into(),
        }
    }

    /// Namespace declaration
    pub fn namespace(prefix: Option<&str>, uri: impl Into<String>) -> Self {
        Token::Namespace {
            prefix: prefix.map(str::to_string),
            uri: uri.into(),
        }
    }

    /// Character data
    pub fn text(value: impl Into<String>) -> Self {
        Token::Text(value.into())
    }

    /// Kind of this token
    pub fn kind(&self) -> TokenKind {
        match self {
            Token::StartDoc => TokenKind::StartDoc,
            Token::EndDoc => TokenKind::EndDoc,
            Token::StartElement { .. } => TokenKind::StartElement,
            Token::EndElement => TokenKind::EndElement,
            Token::Attribute { .. } => TokenKind::Attribute,
            Token::Namespace { .. } => TokenKind::Namespace,
            Token::Text(_) => TokenKind::Text,
            Token::Comment(_) => TokenKind::Comment,
            Token::ProcessingInstruction { .. } => TokenKind::ProcessingInstruction,
        }
    }

    /// Qualified name of an element or attribute token
    pub fn name(&self) -> Option<&QName> {
        match self {
            Token::StartElement { name } | Token::Attribute { name, .. } => Some(name),
            _ => None,
        }
    }

    /// Text payload (attribute value, character data, comment, PI data)
    pub fn payload(&self) -> Option<&str> {
        match self {
            Token::Attribute { value, .. } => Some(value),
            Token::Namespace { uri, .. } => Some(uri),
            Token::Text(s) | Token::Comment(s) => Some(s),
            Token::ProcessingInstruction { data, .. } => Some(data),
            _ => None,
        }
    }

    /// Nesting delta: +1 for start tags, -1 for end tags
    pub(crate) fn depth_delta(&self) -> i32 {
        match self {
            Token::StartElement { .. } | Token::StartDoc => 1,
            Token::EndElement | Token::EndDoc => -1,
            _ => 0,
        }
    }

    /// Whether the token is an attribute or a namespace declaration
    pub fn is_attribute_like(&self) -> bool {
        self.kind().is_attribute_like()
    }
}

impl fmt::Display for Token {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Token::StartElement { name } => write!(f, "START {}", name),
            Token::Attribute { name, value } => write!(f, "ATTR {}=\"{}\"", name, value),
            Token::Namespace { prefix, uri } => {
                write!(f, "NAMESPACE {}={}", prefix.as_deref().unwrap_or(""), uri)
            }
            Token::Text(s) => write!(f, "TEXT {:?}", s),
            Token::Comment(s) => write!(f, "COMMENT {:?}", s),
            Token::ProcessingInstruction { target, data } => {
                write!(f, "PROCINST {} {:?}", target, data)
            }
            other => write!(f, "{}", other.kind()),
        }
    }
}
