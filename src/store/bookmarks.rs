//! Named bookmarks
//!
//! A bookmark tracks one token, wherever edits move it. Once that token is
//! removed the bookmark stops resolving; it is never moved to a neighbour.

use super::arena::{AnchorId, AnchorKind, StoreId, TokenId, TokenStore};
use super::cursor::Cursor;
use crate::error::{Error, Result};
use std::cell::RefCell;
use std::fmt;
use std::rc::Rc;

/// Named reference to a token that survives edits around it
///
/// Like a [`Cursor`], a bookmark dropped while its store is borrowed has its
/// anchor released on the next anchor registration.
pub struct Bookmark {
    name: String,
    store: Rc<RefCell<TokenStore>>,
    anchor: AnchorId,
}

impl Bookmark {
    pub(crate) fn new(name: String, store: Rc<RefCell<TokenStore>>, at: TokenId) -> Result<Self> {
        let anchor = store.borrow_mut().add_anchor(AnchorKind::Bookmark, at)?;
        Ok(Self {
            name,
            store,
            anchor,
        })
    }

    /// Bookmark name
    pub fn name(&self) -> &str {
        &self.name
    }

    /// Identity of the store the bookmark points into
    pub fn store_id(&self) -> StoreId {
        self.store.borrow().id()
    }

    /// Whether the bookmarked token still exists
    pub fn is_valid(&self) -> bool {
        self.store.borrow().anchor_target(self.anchor).is_some()
    }

    /// Current position of the bookmarked token
    pub fn resolve(&self) -> Result<TokenId> {
        self.store
            .borrow()
            .anchor_target(self.anchor)
            .ok_or_else(|| Error::BookmarkInvalidated(self.name.clone()))
    }

    /// Open a cursor on the bookmarked token
    pub fn new_cursor(&self) -> Result<Cursor> {
        Cursor::new(self.store.clone(), self.resolve()?)
    }

    pub(crate) fn shares_store(&self, store: &Rc<RefCell<TokenStore>>) -> bool {
        Rc::ptr_eq(&self.store, store)
    }
}

impl Drop for Bookmark {
    fn drop(&mut self) {
        if let Ok(mut store) = self.store.try_borrow_mut() {
            store.release_anchor(self.anchor);
        } else if let Ok(store) = self.store.try_borrow() {
            store.defer_release(self.anchor);
        }
    }
}

impl fmt::Debug for Bookmark {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let target = self
            .store
            .try_borrow()
            .ok()
            .and_then(|s| s.anchor_target(self.anchor));
        f.debug_struct("Bookmark")
            .field("name", &self.name)
            .field("target", &target)
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use crate::documents::Document;
    use crate::error::Error;
    use crate::namespaces::QName;

    #[test]
    fn test_bookmark_survives_edits() {
        let doc = Document::from_string("<root><a/><b/></root>").unwrap();
        let mut c = doc.new_cursor().unwrap();
        c.to_first_child();
        c.to_last_child();
        let mark = c.create_bookmark("b").unwrap();
        let b = mark.resolve().unwrap();

        // insert in front of a; the bookmark still names b
        c.to_prev_sibling();
        c.insert_element(QName::local("new")).unwrap();
        assert_eq!(mark.resolve().unwrap(), b);

        let mut other = doc.new_cursor().unwrap();
        other.to_bookmark(&mark).unwrap();
        assert_eq!(other.name().unwrap(), Some(QName::local("b")));
    }

    #[test]
    fn test_bookmark_invalidated_by_removal() {
        let doc = Document::from_string("<root><a/><b/></root>").unwrap();
        let mut c = doc.new_cursor().unwrap();
        c.to_first_child();
        c.to_first_child();
        let mark = c.create_bookmark("a").unwrap();
        c.remove_xml().unwrap();

        assert!(!mark.is_valid());
        assert!(matches!(mark.resolve(), Err(Error::BookmarkInvalidated(n)) if n == "a"));
        assert!(c.to_bookmark(&mark).is_err());
        assert_eq!(c.name().unwrap(), Some(QName::local("b")));
    }

    #[test]
    fn test_bookmark_outlives_cursor() {
        let doc = Document::from_string("<root/>").unwrap();
        let mut c = doc.new_cursor().unwrap();
        c.to_first_child();
        let mark = c.create_bookmark("root").unwrap();
        c.dispose();
        let c = mark.new_cursor().unwrap();
        assert_eq!(c.name().unwrap(), Some(QName::local("root")));
    }

    #[test]
    fn test_bookmark_from_other_document() {
        let doc = Document::from_string("<root/>").unwrap();
        let other = Document::from_string("<root/>").unwrap();
        let mark = doc.new_cursor().unwrap().create_bookmark("x").unwrap();
        let mut c = other.new_cursor().unwrap();
        assert!(matches!(c.to_bookmark(&mark), Err(Error::CrossDocument)));
    }
}
