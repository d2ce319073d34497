//! Resource and source locations
//!
//! [`Location`] names where a document or schema is read from;
//! [`SourceLocation`] is the line/column a loader recorded for one token.

use crate::error::Result;
use serde::Serialize;
use std::fmt;
use std::path::PathBuf;
use std::sync::Arc;
use url::Url;

/// Resource location - can be a URL, file path, or string identifier
#[derive(Debug, Clone)]
pub enum Location {
    /// File system path
    Path(PathBuf),
    /// URL (http, https, ftp, etc.)
    Url(Url),
    /// String identifier (for in-memory resources)
    String(String),
}

impl Location {
    /// Create a location from a string (auto-detect type)
    pub fn from_str(s: &str) -> Result<Self> {
        if let Ok(url) = Url::parse(s) {
            if url.scheme() != "file" {
                return Ok(Location::Url(url));
            }
            if let Ok(path) = url.to_file_path() {
                return Ok(Location::Path(path));
            }
        }

        let path = PathBuf::from(s);
        if path.exists() || s.starts_with('/') || s.starts_with('.') {
            return Ok(Location::Path(path));
        }

        Ok(Location::String(s.to_string()))
    }

    /// Get the location as a string
    pub fn as_str(&self) -> String {
        match self {
            Location::Path(p) => p.to_string_lossy().to_string(),
            Location::Url(u) => u.to_string(),
            Location::String(s) => s.clone(),
        }
    }

    /// Document URI used in source locations of loaded tokens
    pub fn uri(&self) -> Option<String> {
        match self {
            Location::Path(p) => {
                let absolute = if p.is_absolute() {
                    p.clone()
                } else {
                    std::env::current_dir().ok()?.join(p)
                };
                Url::from_file_path(absolute).ok().map(|u| u.to_string())
            }
            Location::Url(u) => Some(u.to_string()),
            Location::String(_) => None,
        }
    }

    /// Check if this is a remote location (URL)
    pub fn is_remote(&self) -> bool {
        matches!(self, Location::Url(_))
    }

    /// Check if this is a local file
    pub fn is_file(&self) -> bool {
        matches!(self, Location::Path(_))
    }
}

/// Position of a token in its source text
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct SourceLocation {
    /// Document URI, when the document was loaded from a named resource
    #[serde(skip_serializing_if = "Option::is_none")]
    pub uri: Option<Arc<str>>,
    /// 1-based line
    pub line: u32,
    /// 1-based column
    pub column: u32,
}

impl SourceLocation {
    /// Create a location without a URI
    pub fn new(line: u32, column: u32) -> Self {
        Self {
            uri: None,
            line,
            column,
        }
    }

    /// Attach the document URI
    pub fn with_uri(mut self, uri: Arc<str>) -> Self {
        self.uri = Some(uri);
        self
    }
}

impl fmt::Display for SourceLocation {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if let Some(ref uri) = self.uri {
            write!(f, "{}:", uri)?;
        }
        write!(f, "{}:{}", self.line, self.column)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_location_from_url() {
        let loc = Location::from_str("http://example.com/schema.xsd").unwrap();
        assert!(matches!(loc, Location::Url(_)));
        assert!(loc.is_remote());
        assert_eq!(loc.uri().as_deref(), Some("http://example.com/schema.xsd"));
    }

    #[test]
    fn test_location_from_path() {
        let loc = Location::from_str("/tmp/schema.xsd").unwrap();
        assert!(matches!(loc, Location::Path(_)));
        assert!(loc.is_file());
        assert_eq!(loc.uri().as_deref(), Some("file:///tmp/schema.xsd"));
    }

    #[test]
    fn test_location_as_str() {
        let loc = Location::String("test".to_string());
        assert_eq!(loc.as_str(), "test");
        assert!(loc.uri().is_none());
    }

    #[test]
    fn test_source_location_display() {
        let loc = SourceLocation::new(3, 7);
        assert_eq!(loc.to_string(), "3:7");
        let loc = loc.with_uri(Arc::from("file:///a.xml"));
        assert_eq!(loc.to_string(), "file:///a.xml:3:7");
    }

    #[test]
    fn test_source_location_json() {
        let loc = SourceLocation::new(2, 5).with_uri(Arc::from("file:///a.xml"));
        let json = serde_json::to_value(&loc).unwrap();
        assert_eq!(json["uri"], "file:///a.xml");
        assert_eq!(json["line"], 2);

        let json = serde_json::to_value(SourceLocation::new(1, 1)).unwrap();
        assert!(json.get("uri").is_none());
    }
}
