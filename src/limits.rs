//! Resource limits for loading and validation
//!
//! Loaders check sizes and counts while building a token store; the schema
//! compiler bounds the number of documents and components; the streaming
//! validator bounds element nesting.

use crate::error::{Error, Result};

/// Global limits configuration
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Limits {
    /// Maximum element nesting depth
    pub max_xml_depth: usize,

    /// Maximum XML input size in bytes
    pub max_xml_size: usize,

    /// Maximum number of tokens in one store
    pub max_tokens: usize,

    /// Maximum number of attributes per element
    pub max_attributes: usize,

    /// Maximum number of namespace declarations per element
    pub max_namespaces: usize,

    /// Maximum number of schema documents in one compilation unit
    pub max_schema_documents: usize,

    /// Maximum number of schema components
    pub max_schema_components: usize,
}

impl Default for Limits {
    fn default() -> Self {
        Self {
            max_xml_depth: 1000,
            max_xml_size: 100 * 1024 * 1024, // 100 MB
            max_tokens: 10_000_000,
            max_attributes: 1000,
            max_namespaces: 1000,
            max_schema_documents: 100,
            max_schema_components: 100_000,
        }
    }
}

impl Limits {
    /// Create a new Limits with default values
    pub fn new() -> Self {
        Self::default()
    }

    /// Create strict limits (more restrictive)
    pub fn strict() -> Self {
        Self {
            max_xml_depth: 100,
            max_xml_size: 10 * 1024 * 1024, // 10 MB
            max_tokens: 1_000_000,
            max_attributes: 100,
            max_namespaces: 100,
            max_schema_documents: 20,
            max_schema_components: 10_000,
        }
    }

    /// Create permissive limits (less restrictive, use with caution)
    pub fn permissive() -> Self {
        Self {
            max_xml_depth: 10_000,
            max_xml_size: 1024 * 1024 * 1024, // 1 GB
            max_tokens: 100_000_000,
            max_attributes: 10_000,
            max_namespaces: 10_000,
            max_schema_documents: 1000,
            max_schema_components: 1_000_000,
        }
    }

    /// Set the maximum nesting depth
    pub fn with_max_xml_depth(mut self, depth: usize) -> Self {
        self.max_xml_depth = depth;
        self
    }

    /// Check if XML depth is within limits
    pub fn check_xml_depth(&self, depth: usize) -> Result<()> {
        check("XML depth", depth, self.max_xml_depth)
    }

    /// Check if XML size is within limits
    pub fn check_xml_size(&self, size: usize) -> Result<()> {
        if size > self.max_xml_size {
            Err(Error::LimitExceeded(format!(
                "XML size {} bytes exceeds maximum {} bytes",
                size, self.max_xml_size
            )))
        } else {
            Ok(())
        }
    }

    /// Check if the token count is within limits
    pub fn check_tokens(&self, count: usize) -> Result<()> {
        check("Token count", count, self.max_tokens)
    }

    /// Check if number of attributes is within limits
    pub fn check_attributes(&self, count: usize) -> Result<()> {
        check("Attribute count", count, self.max_attributes)
    }

    /// Check if number of namespaces is within limits
    pub fn check_namespaces(&self, count: usize) -> Result<()> {
        check("Namespace count", count, self.max_namespaces)
    }

    /// Check if number of schema documents is within limits
    pub fn check_schema_documents(&self, count: usize) -> Result<()> {
        check("Schema document count", count, self.max_schema_documents)
    }

    /// Check if number of schema components is within limits
    pub fn check_schema_components(&self, count: usize) -> Result<()> {
        check("Schema component count", count, self.max_schema_components)
    }
}

fn check(what: &str, value: usize, max: usize) -> Result<()> {
    if value > max {
        Err(Error::LimitExceeded(format!(
            "{} {} exceeds maximum {}",
            what, value, max
        )))
    } else {
        Ok(())
    }
}
