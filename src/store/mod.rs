//! Token store, cursors and bookmarks
//!
//! One XML document is held as a linear, doubly linked token sequence.
//! Element nesting is never stored: it follows from start/end pairing, and
//! parent lookups scan backwards to the nearest unmatched start tag.

mod arena;
mod bookmarks;
mod builder;
mod cursor;
mod tokens;

pub use arena::{Iter, StoreId, TokenId, TokenStore};
pub use bookmarks::Bookmark;
pub use builder::StoreBuilder;
pub use cursor::Cursor;
pub use tokens::{Token, TokenKind};
