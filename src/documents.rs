//! XML document handles
//!
//! A [`Document`] is a cheap, clonable handle on a shared token store.
//! Cursors and bookmarks opened from it keep the store alive on their own.

use crate::error::Result;
use crate::store::{Cursor, StoreId, Token, TokenId, TokenKind, TokenStore};
use std::cell::RefCell;
use std::rc::Rc;

/// XML Document representation
#[derive(Debug, Clone)]
pub struct Document {
    store: Rc<RefCell<TokenStore>>,
}

impl Document {
    /// Create a new empty document
    pub fn new() -> Self {
        Self::from_store(TokenStore::new())
    }

    /// Wrap an existing store
    pub fn from_store(store: TokenStore) -> Self {
        Self {
            store: Rc::new(RefCell::new(store)),
        }
    }

    /// Parse an XML document from a string
    pub fn from_string(xml: &str) -> Result<Self> {
        crate::loaders::load_str(xml)
    }

    /// Shared token store
    pub fn store(&self) -> &Rc<RefCell<TokenStore>> {
        &self.store
    }

    /// Identity of the underlying store
    pub fn id(&self) -> StoreId {
        self.store.borrow().id()
    }

    /// Open a cursor on the start of the document
    pub fn new_cursor(&self) -> Result<Cursor> {
        let first = self.store.borrow().first();
        Cursor::new(self.store.clone(), first)
    }

    /// Start tag of the document element, if there is one
    pub fn root_element(&self) -> Option<TokenId> {
        let store = self.store.borrow();
        let root = store
            .iter()
            .find(|(_, t)| t.kind() == TokenKind::StartElement)
            .map(|(id, _)| id);
        root
    }

    /// Open a cursor on the document element
    pub fn root_cursor(&self) -> Result<Option<Cursor>> {
        match self.root_element() {
            Some(root) => Ok(Some(Cursor::new(self.store.clone(), root)?)),
            None => Ok(None),
        }
    }

    /// Snapshot of the token sequence
    pub fn tokens(&self) -> Vec<Token> {
        self.store.borrow().tokens()
    }
}

impl Default for Document {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::namespaces::QName;

    #[test]
    fn test_document_creation() {
        let doc = Document::new();
        assert!(doc.root_element().is_none());
        assert_eq!(doc.tokens(), vec![Token::StartDoc, Token::EndDoc]);
    }

    #[test]
    fn test_build_through_cursor() {
        let doc = Document::new();
        let mut c = doc.new_cursor().unwrap();
        c.to_end_doc();
        c.insert_element_with_text(QName::local("root"), "hi").unwrap();

        let root = doc.root_cursor().unwrap().unwrap();
        assert_eq!(root.text().unwrap(), "hi");
    }

    #[test]
    fn test_handles_share_store() {
        let doc = Document::from_string("<root/>").unwrap();
        let copy = doc.clone();
        assert_eq!(doc.id(), copy.id());

        let cursor = doc.new_cursor().unwrap();
        drop(doc);
        drop(copy);
        assert_eq!(cursor.kind().unwrap(), TokenKind::StartDoc);
    }
}
