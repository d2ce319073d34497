//! Cursors over a token store
//!
//! A cursor is a position handle: it reads and edits the shared store but
//! owns none of its tokens. Its position is an anchor registered with the
//! store, so edits made through any cursor keep every other cursor on a live
//! token. A cursor whose token is removed lands on the first token after the
//! removed run.
//!
//! Insertions go in front of the cursor's token, which leaves the cursor
//! directly after the inserted content.

use super::arena::{AnchorId, AnchorKind, StoreId, TokenId, TokenStore};
use super::bookmarks::Bookmark;
use super::tokens::{Token, TokenKind};
use crate::error::{Error, Result};
use crate::locations::SourceLocation;
use crate::namespaces::{NamespaceContext, QName};
use std::cell::RefCell;
use std::cmp::Ordering;
use std::fmt;
use std::rc::Rc;

/// Position handle into a shared [`TokenStore`]
///
/// Dropping a cursor releases its anchor. When the store is borrowed at that
/// moment the release is queued and applied on the next anchor registration;
/// a cursor dropped while the store is mutably borrowed keeps its anchor.
pub struct Cursor {
    store: Rc<RefCell<TokenStore>>,
    anchor: AnchorId,
}

impl Cursor {
    /// Create a cursor on `at`
    pub fn new(store: Rc<RefCell<TokenStore>>, at: TokenId) -> Result<Self> {
        let anchor = store.borrow_mut().add_anchor(AnchorKind::Cursor, at)?;
        Ok(Self { store, anchor })
    }

    /// Another cursor on the same position
    pub fn new_cursor(&self) -> Result<Cursor> {
        Cursor::new(self.store.clone(), self.position()?)
    }

    /// Shared store this cursor walks
    pub fn store(&self) -> &Rc<RefCell<TokenStore>> {
        &self.store
    }

    /// Identity of the underlying store
    pub fn store_id(&self) -> StoreId {
        self.store.borrow().id()
    }

    /// Current position
    pub fn position(&self) -> Result<TokenId> {
        let store = self.store.borrow();
        self.position_in(&store)
    }

    /// Release the cursor's hold on the store
    pub fn dispose(self) {}

    // ---- accessors ----

    /// Token under the cursor
    pub fn token(&self) -> Result<Token> {
        self.read(|store, at| Ok(store.get(at)?.clone()))
    }

    /// Kind of the token under the cursor
    pub fn kind(&self) -> Result<TokenKind> {
        self.read(|store, at| store.kind(at))
    }

    /// Name of the element or attribute under the cursor
    pub fn name(&self) -> Result<Option<QName>> {
        self.read(|store, at| Ok(store.get(at)?.name().cloned()))
    }

    /// Source location recorded by the loader
    pub fn location(&self) -> Result<Option<SourceLocation>> {
        self.read(|store, at| Ok(store.location(at)?.cloned()))
    }

    /// Number of elements enclosing the cursor's token
    pub fn depth(&self) -> Result<usize> {
        self.read(|store, at| store.depth(at))
    }

    /// String value: concatenated text of an element or the document,
    /// the payload of any other token
    pub fn text(&self) -> Result<String> {
        self.read(|store, at| {
            let token = store.get(at)?;
            match token {
                Token::StartElement { .. } | Token::StartDoc => {
                    let end = store.matching_end(at)?;
                    let mut text = String::new();
                    for (id, token) in store.iterate_from(at)? {
                        if id == end {
                            break;
                        }
                        if let Token::Text(s) = token {
                            text.push_str(s);
                        }
                    }
                    Ok(text)
                }
                other => Ok(other.payload().unwrap_or_default().to_string()),
            }
        })
    }

    /// Value of an attribute of the element under the cursor
    pub fn attribute_value(&self, name: &QName) -> Result<Option<String>> {
        self.read(|store, at| {
            for id in store.attributes_of(at)? {
                if let Token::Attribute { name: n, value } = store.get(id)? {
                    if n == name {
                        return Ok(Some(value.clone()));
                    }
                }
            }
            Ok(None)
        })
    }

    /// Namespace bindings in scope at the cursor
    pub fn in_scope_namespaces(&self) -> Result<NamespaceContext> {
        self.read(|store, at| {
            let mut chain = Vec::new();
            let mut element = match store.kind(at)? {
                TokenKind::StartElement => Some(at),
                _ => store.containing_element(at)?,
            };
            while let Some(e) = element {
                chain.push(e);
                element = store.containing_element(e)?;
            }

            let mut context = NamespaceContext::new();
            for element in chain.into_iter().rev() {
                for id in store.attributes_of(element)? {
                    if let Token::Namespace { prefix, uri } = store.get(id)? {
                        context.declare(prefix.as_deref(), uri);
                    }
                }
            }
            Ok(context)
        })
    }

    // ---- navigation ----

    /// Move to the following token; false at the end of the document
    pub fn to_next_token(&mut self) -> bool {
        self.navigate(|store, at| store.next(at))
    }

    /// Move to the preceding token; false at the start of the document
    pub fn to_prev_token(&mut self) -> bool {
        self.navigate(|store, at| store.prev(at))
    }

    /// Move to the enclosing element, or to `StartDoc` from a top-level token
    pub fn to_parent(&mut self) -> bool {
        self.navigate(|store, at| {
            let from = match store.kind(at)? {
                TokenKind::StartDoc | TokenKind::EndDoc => return Ok(None),
                TokenKind::EndElement => store.matching_start(at)?,
                _ => at,
            };
            Ok(Some(store.containing_element(from)?.unwrap_or(store.first())))
        })
    }

    /// Move to the first child element
    pub fn to_first_child(&mut self) -> bool {
        self.navigate(|store, at| {
            if !matches!(store.kind(at)?, TokenKind::StartElement | TokenKind::StartDoc) {
                return Ok(None);
            }
            for (id, token) in store.iterate_from(at)?.skip(1) {
                match token.kind() {
                    TokenKind::StartElement => return Ok(Some(id)),
                    TokenKind::EndElement | TokenKind::EndDoc => return Ok(None),
                    _ => {}
                }
            }
            Ok(None)
        })
    }

    /// Move to the last child element
    pub fn to_last_child(&mut self) -> bool {
        self.navigate(|store, at| {
            if !matches!(store.kind(at)?, TokenKind::StartElement | TokenKind::StartDoc) {
                return Ok(None);
            }
            let mut cursor = store.prev(store.matching_end(at)?)?;
            while let Some(id) = cursor {
                match store.kind(id)? {
                    TokenKind::EndElement => return Ok(Some(store.matching_start(id)?)),
                    TokenKind::StartElement | TokenKind::StartDoc => return Ok(None),
                    _ => cursor = store.prev(id)?,
                }
            }
            Ok(None)
        })
    }

    /// Move to the next sibling element
    pub fn to_next_sibling(&mut self) -> bool {
        self.navigate(|store, at| {
            let from = match store.kind(at)? {
                TokenKind::StartElement => store.matching_end(at)?,
                TokenKind::Text | TokenKind::Comment | TokenKind::ProcessingInstruction => at,
                _ => return Ok(None),
            };
            for (id, token) in store.iterate_from(from)?.skip(1) {
                match token.kind() {
                    TokenKind::StartElement => return Ok(Some(id)),
                    TokenKind::EndElement | TokenKind::EndDoc => return Ok(None),
                    _ => {}
                }
            }
            Ok(None)
        })
    }

    /// Move to the previous sibling element
    pub fn to_prev_sibling(&mut self) -> bool {
        self.navigate(|store, at| {
            if !store.kind(at)?.is_content() {
                return Ok(None);
            }
            let mut cursor = store.prev(at)?;
            while let Some(id) = cursor {
                match store.kind(id)? {
                    TokenKind::EndElement => return Ok(Some(store.matching_start(id)?)),
                    TokenKind::StartElement | TokenKind::StartDoc => return Ok(None),
                    _ => cursor = store.prev(id)?,
                }
            }
            Ok(None)
        })
    }

    /// Move to the start of the document
    pub fn to_start_doc(&mut self) -> bool {
        self.navigate(|store, _| Ok(Some(store.first())))
    }

    /// Move to the end of the document
    pub fn to_end_doc(&mut self) -> bool {
        self.navigate(|store, _| Ok(Some(store.last())))
    }

    /// Move from a start token to its matching end token
    pub fn to_end_token(&mut self) -> bool {
        self.navigate(|store, at| match store.kind(at)? {
            TokenKind::StartElement | TokenKind::StartDoc => Ok(Some(store.matching_end(at)?)),
            _ => Ok(None),
        })
    }

    /// Move from a start tag to its first attribute
    pub fn to_first_attribute(&mut self) -> bool {
        self.navigate(|store, at| {
            for id in store.attributes_of(at)? {
                if store.kind(id)? == TokenKind::Attribute {
                    return Ok(Some(id));
                }
            }
            Ok(None)
        })
    }

    /// Move from an attribute to the next attribute of the same start tag
    pub fn to_next_attribute(&mut self) -> bool {
        self.navigate(|store, at| {
            if store.kind(at)? != TokenKind::Attribute {
                return Ok(None);
            }
            for (id, token) in store.iterate_from(at)?.skip(1) {
                match token.kind() {
                    TokenKind::Attribute => return Ok(Some(id)),
                    TokenKind::Namespace => {}
                    _ => return Ok(None),
                }
            }
            Ok(None)
        })
    }

    /// Move to the token a bookmark refers to
    pub fn to_bookmark(&mut self, bookmark: &Bookmark) -> Result<()> {
        if !bookmark.shares_store(&self.store) {
            return Err(Error::CrossDocument);
        }
        let target = bookmark.resolve()?;
        self.store.borrow_mut().set_anchor(self.anchor, target)
    }

    /// Move to another cursor's position
    pub fn to_cursor(&mut self, other: &Cursor) -> Result<()> {
        if !Rc::ptr_eq(&self.store, &other.store) {
            return Err(Error::CrossDocument);
        }
        let target = other.position()?;
        self.store.borrow_mut().set_anchor(self.anchor, target)
    }

    // ---- edits ----

    /// Insert `<name>text</name>` in front of the cursor
    pub fn insert_element_with_text(&mut self, name: QName, text: &str) -> Result<()> {
        let mut tokens = vec![Token::start(name)];
        if !text.is_empty() {
            tokens.push(Token::text(text));
        }
        tokens.push(Token::EndElement);
        self.edit(|store, at| store.insert_fragment(at, tokens).map(|_| ()))
    }

    /// Insert an empty element in front of the cursor
    pub fn insert_element(&mut self, name: QName) -> Result<()> {
        self.insert_element_with_text(name, "")
    }

    /// Insert an attribute in front of the cursor
    ///
    /// The cursor must sit in the attribute run of a start tag or directly
    /// after it (for example on the first child content of the element).
    pub fn insert_attribute(&mut self, name: QName, value: &str) -> Result<()> {
        self.edit(|store, at| store.insert(at, Token::attribute(name, value)).map(|_| ()))
    }

    /// Insert a namespace declaration in front of the cursor
    pub fn insert_namespace(&mut self, prefix: Option<&str>, uri: &str) -> Result<()> {
        if let Some(p) = prefix {
            crate::names::validate_ncname(p)?;
        }
        self.edit(|store, at| store.insert(at, Token::namespace(prefix, uri)).map(|_| ()))
    }

    /// Insert character data in front of the cursor
    pub fn insert_chars(&mut self, text: &str) -> Result<()> {
        self.edit(|store, at| store.insert(at, Token::text(text)).map(|_| ()))
    }

    /// Replace the text value under the cursor
    ///
    /// On an element all child content is replaced by a single text token;
    /// attributes stay. On an attribute, text, comment or PI the payload is
    /// replaced.
    pub fn set_text(&mut self, value: &str) -> Result<()> {
        self.edit(|store, at| {
            let replacement = match store.get(at)? {
                Token::StartElement { .. } => {
                    let end = store.matching_end(at)?;
                    let mut first = store.next(at)?;
                    while let Some(id) = first {
                        if !store.kind(id)?.is_attribute_like() {
                            break;
                        }
                        first = store.next(id)?;
                    }
                    if let Some(first) = first.filter(|&f| f != end) {
                        if let Some(last) = store.prev(end)? {
                            store.remove_range(first..=last)?;
                        }
                    }
                    if !value.is_empty() {
                        store.insert(end, Token::text(value))?;
                    }
                    return Ok(());
                }
                Token::Attribute { name, .. } => Token::attribute(name.clone(), value),
                Token::Text(_) => Token::text(value),
                Token::Comment(_) => Token::Comment(value.to_string()),
                Token::ProcessingInstruction { target, .. } => Token::ProcessingInstruction {
                    target: target.clone(),
                    data: value.to_string(),
                },
                other => {
                    return Err(Error::malformed(format!(
                        "cannot set the text of a {} token",
                        other.kind()
                    )))
                }
            };
            store.replace(at, replacement).map(|_| ())
        })
    }

    /// Rename the element or attribute under the cursor
    pub fn set_name(&mut self, name: QName) -> Result<()> {
        crate::names::validate_name(&name)?;
        self.edit(|store, at| {
            let replacement = match store.get(at)? {
                Token::StartElement { .. } => Token::start(name),
                Token::Attribute { value, .. } => Token::attribute(name, value.clone()),
                other => {
                    return Err(Error::malformed(format!(
                        "a {} token has no name",
                        other.kind()
                    )))
                }
            };
            store.replace(at, replacement).map(|_| ())
        })
    }

    /// Remove the token (or whole element) under the cursor
    ///
    /// The cursor moves to the token that followed the removed content.
    pub fn remove_xml(&mut self) -> Result<()> {
        self.edit(|store, at| {
            check_movable(store.kind(at)?)?;
            store.remove_subtree(at).map(|_| ())
        })
    }

    /// Move the token (or whole element) under the cursor in front of `destination`
    ///
    /// This cursor stays where the content was, on the token that followed it.
    pub fn move_xml(&mut self, destination: &Cursor) -> Result<()> {
        if !Rc::ptr_eq(&self.store, &destination.store) {
            return Err(Error::CrossDocument);
        }
        let dest = destination.position()?;
        let anchor = self.anchor;
        self.edit(|store, at| {
            check_movable(store.kind(at)?)?;
            let end = store.subtree_end(at)?;
            let successor = store
                .next(end)?
                .ok_or_else(|| Error::malformed("content after the end of the document"))?;
            store.move_subtree(at..=end, dest)?;
            store.set_anchor(anchor, successor)
        })
    }

    /// Bookmark the cursor's current token
    pub fn create_bookmark(&self, name: impl Into<String>) -> Result<Bookmark> {
        Bookmark::new(name.into(), self.store.clone(), self.position()?)
    }

    // ---- comparison ----

    /// Document order of two cursors on the same store
    pub fn compare_position(&self, other: &Cursor) -> Result<Ordering> {
        if !Rc::ptr_eq(&self.store, &other.store) {
            return Err(Error::CrossDocument);
        }
        let store = self.store.borrow();
        let a = self.position_in(&store)?;
        let b = other.position_in(&store)?;
        store.compare(a, b)
    }

    /// Whether this cursor precedes `other`
    pub fn is_left_of(&self, other: &Cursor) -> Result<bool> {
        Ok(self.compare_position(other)? == Ordering::Less)
    }

    /// Whether this cursor follows `other`
    pub fn is_right_of(&self, other: &Cursor) -> Result<bool> {
        Ok(self.compare_position(other)? == Ordering::Greater)
    }

    /// Whether both cursors are on the same token
    pub fn is_at_same_position_as(&self, other: &Cursor) -> Result<bool> {
        Ok(self.compare_position(other)? == Ordering::Equal)
    }

    fn position_in(&self, store: &TokenStore) -> Result<TokenId> {
        store
            .anchor_target(self.anchor)
            .ok_or_else(|| Error::StalePosition("cursor has no position".to_string()))
    }

    fn read<T, F>(&self, f: F) -> Result<T>
    where
        F: FnOnce(&TokenStore, TokenId) -> Result<T>,
    {
        let store = self.store.borrow();
        let at = self.position_in(&store)?;
        f(&store, at)
    }

    fn edit<T, F>(&mut self, f: F) -> Result<T>
    where
        F: FnOnce(&mut TokenStore, TokenId) -> Result<T>,
    {
        let mut store = self.store.borrow_mut();
        let at = self.position_in(&store)?;
        f(&mut store, at)
    }

    fn navigate<F>(&mut self, f: F) -> bool
    where
        F: FnOnce(&TokenStore, TokenId) -> Result<Option<TokenId>>,
    {
        let target = match self.read(f) {
            Ok(Some(target)) => target,
            _ => return false,
        };
        self.store
            .borrow_mut()
            .set_anchor(self.anchor, target)
            .is_ok()
    }
}

fn check_movable(kind: TokenKind) -> Result<()> {
    match kind {
        TokenKind::StartDoc | TokenKind::EndDoc | TokenKind::EndElement => Err(Error::malformed(
            format!("a {} token cannot be removed or moved on its own", kind),
        )),
        _ => Ok(()),
    }
}

impl Drop for Cursor {
    fn drop(&mut self) {
        if let Ok(mut store) = self.store.try_borrow_mut() {
            store.release_anchor(self.anchor);
        } else if let Ok(store) = self.store.try_borrow() {
            store.defer_release(self.anchor);
        }
    }
}

impl fmt::Debug for Cursor {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let mut s = f.debug_struct("Cursor");
        match self.store.try_borrow() {
            Ok(store) => {
                s.field("store", &store.id());
                match self.position_in(&store) {
                    Ok(at) => s.field("token", &store.get(at).ok()),
                    Err(_) => s.field("token", &None::<&Token>),
                };
            }
            Err(_) => {
                s.field("store", &"<borrowed>");
            }
        }
        s.finish()
    }
}
