//! # xmlcursor
//!
//! A cursor-navigable XML token store with streaming XML Schema
//! content-model validation.
//!
//! ## Features
//!
//! - Documents held as a flat, ordered sequence of tokens with O(1) edits
//! - Cursors and bookmarks that stay valid across insertions and removals
//! - Schema type system with derivation, redefinition and substitution groups
//! - Non-backtracking content model automaton
//! - Streaming validation with issues collected in document order
//! - Protection against oversized or deeply nested input
//!
//! ## Example
//!
//! ```rust
//! use xmlcursor::validators::SchemaTypeSystem;
//!
//! let xsd = r#"<xs:schema xmlns:xs="http://www.w3.org/2001/XMLSchema">
//!     <xs:element name="note">
//!         <xs:complexType>
//!             <xs:sequence>
//!                 <xs:element name="to"/>
//!                 <xs:element name="body"/>
//!             </xs:sequence>
//!         </xs:complexType>
//!     </xs:element>
//! </xs:schema>"#;
//!
//! let system = SchemaTypeSystem::from_xsd(&[("note.xsd", xsd)])?;
//! assert!(system.is_valid_str("<note><to/><body/></note>"));
//!
//! let report = system.validate_str("<note><body/></note>")?;
//! assert!(!report.is_valid());
//! # Ok::<(), xmlcursor::Error>(())
//! ```

#![warn(missing_docs)]
#![warn(clippy::all)]

// Foundation
pub mod error;
pub mod limits;

// Names and locations
pub mod namespaces;
pub mod names;
pub mod locations;

// Token store and loading
pub mod store;
pub mod loaders;
pub mod documents;

// Schema type system and validation
pub mod validators;

// Re-exports for convenience
pub use documents::Document;
pub use error::{Error, Result};
pub use loaders::Loader;
pub use store::{Bookmark, Cursor, Token, TokenKind, TokenStore};
pub use validators::{SchemaTypeSystem, StreamingValidator, ValidationReport};

/// Version of the xmlcursor library
pub const VERSION: &str = env!("CARGO_PKG_VERSION");
