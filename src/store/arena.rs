//! Token arena
//!
//! Tokens live in slots of a `Vec` and are chained into one doubly linked
//! list running from `StartDoc` to `EndDoc`. Slots carry a generation so a
//! [`TokenId`] of a removed token is recognised as stale after its slot is
//! reused. Every linked token also carries an order label; labels grow
//! strictly along the list, which makes position comparison a single
//! integer comparison.
//!
//! Cursors and bookmarks do not hold raw ids: they register an anchor with
//! the store, and removals rebase or invalidate anchors in the same pass that
//! unlinks the tokens.

use super::tokens::{Token, TokenKind};
use crate::error::{Error, Result};
use crate::locations::SourceLocation;
use crate::namespaces::QName;
use std::cell::RefCell;
use std::cmp::Ordering;
use std::collections::HashSet;
use std::fmt;
use std::ops::RangeInclusive;
use std::sync::atomic::{AtomicU64, Ordering as AtomicOrdering};
use std::sync::Arc;

static NEXT_STORE_ID: AtomicU64 = AtomicU64::new(1);

/// Largest run of existing tokens respaced before falling back to a global relabel
const MAX_LOCAL_WINDOW: usize = 64;

/// Identity of one token store
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct StoreId(u64);

impl StoreId {
    fn next() -> Self {
        StoreId(NEXT_STORE_ID.fetch_add(1, AtomicOrdering::Relaxed))
    }
}

impl fmt::Display for StoreId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "store#{}", self.0)
    }
}

/// Stable handle to one token of a store
///
/// Ids survive edits elsewhere in the store and moves of the token itself;
/// they go stale once the token is removed.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct TokenId {
    store: StoreId,
    index: u32,
    generation: u32,
}

impl TokenId {
    /// Store this id belongs to
    pub fn store(&self) -> StoreId {
        self.store
    }
}

impl fmt::Display for TokenId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}:{}.{}", self.store, self.index, self.generation)
    }
}

/// Handle of a cursor or bookmark anchor registered with a store
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub(crate) struct AnchorId(u32);

/// How an anchor reacts when its token is removed
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum AnchorKind {
    /// Moves to the first token following the removed run
    Cursor,
    /// Becomes unresolvable
    Bookmark,
}

#[derive(Debug)]
struct Anchor {
    kind: AnchorKind,
    target: Option<u32>,
}

#[derive(Debug)]
struct Entry {
    token: Token,
    location: Option<SourceLocation>,
    prev: Option<u32>,
    next: Option<u32>,
    label: u64,
}

#[derive(Debug)]
struct Slot {
    generation: u32,
    entry: Option<Entry>,
}

/// Mutable in-memory token sequence of one XML document
#[derive(Debug)]
pub struct TokenStore {
    id: StoreId,
    slots: Vec<Slot>,
    free: Vec<u32>,
    head: u32,
    tail: u32,
    len: usize,
    anchors: Vec<Option<Anchor>>,
    free_anchors: Vec<u32>,
    /// Anchors dropped while the store was borrowed, released on the next
    /// anchor registration
    deferred_releases: RefCell<Vec<AnchorId>>,
    uri: Option<Arc<str>>,
}

impl TokenStore {
    /// Create an empty document: `StartDoc` followed by `EndDoc`
    pub fn new() -> Self {
        Self::from_validated(vec![(Token::StartDoc, None), (Token::EndDoc, None)], None)
    }

    /// Validate a whole token sequence and adopt it
    pub fn bulk_load<I>(tokens: I) -> Result<Self>
    where
        I: IntoIterator<Item = Token>,
    {
        let mut builder = super::StoreBuilder::new();
        for token in tokens {
            builder.push_token(token)?;
        }
        builder.finish()
    }

    /// Adopt a sequence already checked by the builder
    pub(crate) fn from_validated(
        tokens: Vec<(Token, Option<SourceLocation>)>,
        uri: Option<Arc<str>>,
    ) -> Self {
        let len = tokens.len();
        let step = label_step(len);
        let slots = tokens
            .into_iter()
            .enumerate()
            .map(|(i, (token, location))| Slot {
                generation: 0,
                entry: Some(Entry {
                    token,
                    location,
                    prev: i.checked_sub(1).map(|p| p as u32),
                    next: if i + 1 < len { Some(i as u32 + 1) } else { None },
                    label: step * (i as u64 + 1),
                }),
            })
            .collect();

        Self {
            id: StoreId::next(),
            slots,
            free: Vec::new(),
            head: 0,
            tail: len.saturating_sub(1) as u32,
            len,
            anchors: Vec::new(),
            free_anchors: Vec::new(),
            deferred_releases: RefCell::new(Vec::new()),
            uri,
        }
    }

    /// Identity of this store
    pub fn id(&self) -> StoreId {
        self.id
    }

    /// URI of the resource the store was loaded from
    pub fn uri(&self) -> Option<&str> {
        self.uri.as_deref()
    }

    /// Number of tokens, including `StartDoc` and `EndDoc`
    pub fn len(&self) -> usize {
        self.len
    }

    /// A store always holds at least `StartDoc` and `EndDoc`
    pub fn is_empty(&self) -> bool {
        false
    }

    /// The `StartDoc` token
    pub fn first(&self) -> TokenId {
        self.id_of(self.head)
    }

    /// The `EndDoc` token
    pub fn last(&self) -> TokenId {
        self.id_of(self.tail)
    }

    /// Whether `id` names a live token of this store
    pub fn contains(&self, id: TokenId) -> bool {
        self.resolve(id).is_ok()
    }

    /// Token at a position
    pub fn get(&self, id: TokenId) -> Result<&Token> {
        let index = self.resolve(id)?;
        Ok(&self.node(index).token)
    }

    /// Kind of the token at a position
    pub fn kind(&self, id: TokenId) -> Result<TokenKind> {
        Ok(self.get(id)?.kind())
    }

    /// Source location recorded by the loader
    pub fn location(&self, id: TokenId) -> Result<Option<&SourceLocation>> {
        let index = self.resolve(id)?;
        Ok(self.node(index).location.as_ref())
    }

    /// Following token, `None` after `EndDoc`
    pub fn next(&self, id: TokenId) -> Result<Option<TokenId>> {
        let index = self.resolve(id)?;
        Ok(self.node(index).next.map(|n| self.id_of(n)))
    }

    /// Preceding token, `None` before `StartDoc`
    pub fn prev(&self, id: TokenId) -> Result<Option<TokenId>> {
        let index = self.resolve(id)?;
        Ok(self.node(index).prev.map(|p| self.id_of(p)))
    }

    /// Document order of two positions
    pub fn compare(&self, a: TokenId, b: TokenId) -> Result<Ordering> {
        let a = self.resolve(a)?;
        let b = self.resolve(b)?;
        Ok(self.node(a).label.cmp(&self.node(b).label))
    }

    /// Lazy iteration from a position to `EndDoc` inclusive
    pub fn iterate_from(&self, id: TokenId) -> Result<Iter<'_>> {
        let index = self.resolve(id)?;
        Ok(Iter {
            store: self,
            next: Some(index),
        })
    }

    /// Iterate over the whole document
    pub fn iter(&self) -> Iter<'_> {
        Iter {
            store: self,
            next: Some(self.head),
        }
    }

    /// Snapshot of the token sequence
    pub fn tokens(&self) -> Vec<Token> {
        self.iter().map(|(_, t)| t.clone()).collect()
    }

    /// End token matching a `StartElement` or `StartDoc`
    pub fn matching_end(&self, start: TokenId) -> Result<TokenId> {
        let index = self.resolve(start)?;
        let end = self.matching_end_index(index)?;
        Ok(self.id_of(end))
    }

    /// Start token matching an `EndElement` or `EndDoc`
    pub fn matching_start(&self, end: TokenId) -> Result<TokenId> {
        let index = self.resolve(end)?;
        match self.node(index).token {
            Token::EndDoc => return Ok(self.first()),
            Token::EndElement => {}
            ref other => {
                return Err(Error::malformed(format!(
                    "{} token has no matching start",
                    other.kind()
                )))
            }
        }
        let mut depth = 0usize;
        let mut cursor = self.node(index).prev;
        while let Some(i) = cursor {
            match self.node(i).token {
                Token::EndElement => depth += 1,
                Token::StartElement { .. } if depth == 0 => return Ok(self.id_of(i)),
                Token::StartElement { .. } => depth -= 1,
                _ => {}
            }
            cursor = self.node(i).prev;
        }
        Err(Error::malformed("unmatched end tag"))
    }

    /// Last token of the subtree rooted at `id` (the token itself unless it starts an element)
    pub fn subtree_end(&self, id: TokenId) -> Result<TokenId> {
        let index = self.resolve(id)?;
        match self.node(index).token {
            Token::StartElement { .. } => Ok(self.id_of(self.matching_end_index(index)?)),
            _ => Ok(id),
        }
    }

    /// Nearest unmatched `StartElement` strictly before `id`; `None` at document level
    pub fn containing_element(&self, id: TokenId) -> Result<Option<TokenId>> {
        let index = self.resolve(id)?;
        Ok(self.containing_index(index).map(|i| self.id_of(i)))
    }

    /// Number of elements enclosing `id`
    pub fn depth(&self, id: TokenId) -> Result<usize> {
        let mut index = self.resolve(id)?;
        let mut depth = 0;
        while let Some(parent) = self.containing_index(index) {
            depth += 1;
            index = parent;
        }
        Ok(depth)
    }

    /// Attribute and namespace tokens owned by a start tag, in order
    pub fn attributes_of(&self, start: TokenId) -> Result<Vec<TokenId>> {
        let index = self.resolve(start)?;
        Ok(self
            .attribute_run(index)
            .into_iter()
            .map(|i| self.id_of(i))
            .collect())
    }

    /// Insert a single non-structural token before `position`
    ///
    /// Element and document boundaries are rejected; elements go in through
    /// [`insert_fragment`](Self::insert_fragment) so they always arrive balanced.
    pub fn insert(&mut self, position: TokenId, token: Token) -> Result<TokenId> {
        if token.depth_delta() != 0 {
            return Err(Error::malformed(format!(
                "a lone {} token would unbalance the document",
                token.kind()
            )));
        }
        self.insert_fragment(position, vec![token])
    }

    /// Insert a balanced run of tokens before `position`, returning the first inserted id
    pub fn insert_fragment(&mut self, position: TokenId, tokens: Vec<Token>) -> Result<TokenId> {
        self.insert_located(position, tokens.into_iter().map(|t| (t, None)).collect())
    }

    pub(crate) fn insert_located(
        &mut self,
        position: TokenId,
        tokens: Vec<(Token, Option<SourceLocation>)>,
    ) -> Result<TokenId> {
        let before = self.resolve(position)?;
        if tokens.is_empty() {
            return Err(Error::malformed("empty fragment"));
        }
        {
            let refs: Vec<&Token> = tokens.iter().map(|(t, _)| t).collect();
            check_fragment(&refs)?;
            self.check_splice(before, &refs, &HashSet::new())?;
        }

        let run: Vec<u32> = tokens
            .into_iter()
            .map(|(token, location)| self.alloc(token, location))
            .collect();
        self.link_run_before(&run, before);
        log::trace!("inserted {} token(s) into {}", run.len(), self.id);
        Ok(self.id_of(run[0]))
    }

    /// Remove a single non-structural token
    pub fn remove(&mut self, position: TokenId) -> Result<Token> {
        let index = self.resolve(position)?;
        if self.node(index).token.depth_delta() != 0 {
            return Err(Error::malformed(format!(
                "removing a lone {} token would unbalance the document",
                self.node(index).token.kind()
            )));
        }
        let mut removed = self.remove_range(position..=position)?;
        removed
            .pop()
            .ok_or_else(|| Error::malformed("nothing removed"))
    }

    /// Remove a token together with its content when it starts an element
    pub fn remove_subtree(&mut self, position: TokenId) -> Result<Vec<Token>> {
        let end = self.subtree_end(position)?;
        self.remove_range(position..=end)
    }

    /// Remove a balanced run of tokens, returning them in document order
    pub fn remove_range(&mut self, range: RangeInclusive<TokenId>) -> Result<Vec<Token>> {
        let run = self.balanced_run(*range.start(), *range.end())?;
        let (first, last) = (run[0], run[run.len() - 1]);
        let successor = self.node(last).next;

        self.unlink_run(first, last);
        let removed: HashSet<u32> = run.iter().copied().collect();
        self.rebase_anchors(&removed, successor);

        let tokens = run.into_iter().map(|i| self.free_slot(i).token).collect();
        log::trace!("removed {} token(s) from {}", removed.len(), self.id);
        Ok(tokens)
    }

    /// Move a balanced run so it ends up directly before `destination`
    ///
    /// Moved tokens keep their ids; anchors on them travel with them.
    pub fn move_subtree(
        &mut self,
        range: RangeInclusive<TokenId>,
        destination: TokenId,
    ) -> Result<()> {
        let dest = self.resolve(destination)?;
        let run = self.balanced_run(*range.start(), *range.end())?;
        let (first, last) = (run[0], run[run.len() - 1]);
        let members: HashSet<u32> = run.iter().copied().collect();

        if members.contains(&dest) {
            return Err(Error::malformed("cannot move a range inside itself"));
        }
        if self.node(last).next == Some(dest) {
            return Ok(());
        }
        {
            let refs: Vec<&Token> = run.iter().map(|&i| &self.node(i).token).collect();
            self.check_splice(dest, &refs, &members)?;
        }

        self.unlink_run(first, last);
        self.link_run_before(&run, dest);
        log::trace!("moved {} token(s) within {}", run.len(), self.id);
        Ok(())
    }

    /// Replace a token with another of the same kind (rename, new value)
    pub fn replace(&mut self, position: TokenId, token: Token) -> Result<Token> {
        let index = self.resolve(position)?;
        let current = &self.node(index).token;
        if current.kind() != token.kind() {
            return Err(Error::malformed(format!(
                "cannot replace a {} token with a {} token",
                current.kind(),
                token.kind()
            )));
        }
        if let Token::Attribute { ref name, .. } = token {
            if let Some(owner) = self.containing_index(index) {
                let clash = self
                    .attribute_run(owner)
                    .into_iter()
                    .filter(|&i| i != index)
                    .any(|i| self.node(i).token.name() == Some(name));
                if clash {
                    return Err(Error::malformed(format!("duplicate attribute {}", name)));
                }
            }
        }
        let entry = self.node_mut(index);
        Ok(std::mem::replace(&mut entry.token, token))
    }

    pub(crate) fn add_anchor(&mut self, kind: AnchorKind, target: TokenId) -> Result<AnchorId> {
        self.flush_deferred_releases();
        let index = self.resolve(target)?;
        let anchor = Anchor {
            kind,
            target: Some(index),
        };
        let id = match self.free_anchors.pop() {
            Some(slot) => {
                self.anchors[slot as usize] = Some(anchor);
                slot
            }
            None => {
                self.anchors.push(Some(anchor));
                (self.anchors.len() - 1) as u32
            }
        };
        Ok(AnchorId(id))
    }

    pub(crate) fn anchor_target(&self, anchor: AnchorId) -> Option<TokenId> {
        self.anchors
            .get(anchor.0 as usize)
            .and_then(|a| a.as_ref())
            .and_then(|a| a.target)
            .map(|i| self.id_of(i))
    }

    pub(crate) fn set_anchor(&mut self, anchor: AnchorId, target: TokenId) -> Result<()> {
        let index = self.resolve(target)?;
        match self.anchors.get_mut(anchor.0 as usize) {
            Some(Some(a)) => {
                a.target = Some(index);
                Ok(())
            }
            _ => Err(Error::StalePosition("released anchor".to_string())),
        }
    }

    pub(crate) fn release_anchor(&mut self, anchor: AnchorId) {
        if let Some(slot) = self.anchors.get_mut(anchor.0 as usize) {
            if slot.take().is_some() {
                self.free_anchors.push(anchor.0);
            }
        }
    }

    /// Queue a release for an anchor whose owner was dropped while the
    /// store was only readable
    pub(crate) fn defer_release(&self, anchor: AnchorId) {
        self.deferred_releases.borrow_mut().push(anchor);
    }

    fn flush_deferred_releases(&mut self) {
        let deferred = std::mem::take(self.deferred_releases.get_mut());
        for anchor in deferred {
            self.release_anchor(anchor);
        }
    }

    /// Number of live cursors and bookmarks registered with this store
    pub fn anchor_count(&self) -> usize {
        let registered = self.anchors.iter().filter(|a| a.is_some()).count();
        registered - self.deferred_releases.borrow().len()
    }

    fn resolve(&self, id: TokenId) -> Result<u32> {
        if id.store != self.id {
            return Err(Error::CrossDocument);
        }
        match self.slots.get(id.index as usize) {
            Some(slot) if slot.generation == id.generation && slot.entry.is_some() => Ok(id.index),
            _ => Err(Error::StalePosition(format!("token {} was removed", id))),
        }
    }

    fn id_of(&self, index: u32) -> TokenId {
        TokenId {
            store: self.id,
            index,
            generation: self.slots[index as usize].generation,
        }
    }

    fn node(&self, index: u32) -> &Entry {
        match self.slots[index as usize].entry {
            Some(ref entry) => entry,
            None => unreachable!("free slot {} reached through the token list", index),
        }
    }

    fn node_mut(&mut self, index: u32) -> &mut Entry {
        match self.slots[index as usize].entry {
            Some(ref mut entry) => entry,
            None => unreachable!("free slot {} reached through the token list", index),
        }
    }

    fn alloc(&mut self, token: Token, location: Option<SourceLocation>) -> u32 {
        let entry = Entry {
            token,
            location,
            prev: None,
            next: None,
            label: 0,
        };
        self.len += 1;
        match self.free.pop() {
            Some(index) => {
                self.slots[index as usize].entry = Some(entry);
                index
            }
            None => {
                self.slots.push(Slot {
                    generation: 0,
                    entry: Some(entry),
                });
                (self.slots.len() - 1) as u32
            }
        }
    }

    fn free_slot(&mut self, index: u32) -> Entry {
        let slot = &mut self.slots[index as usize];
        slot.generation = slot.generation.wrapping_add(1);
        self.len -= 1;
        self.free.push(index);
        match slot.entry.take() {
            Some(entry) => entry,
            None => unreachable!("slot {} freed twice", index),
        }
    }

    fn matching_end_index(&self, index: u32) -> Result<u32> {
        match self.node(index).token {
            Token::StartDoc => return Ok(self.tail),
            Token::StartElement { .. } => {}
            ref other => {
                return Err(Error::malformed(format!(
                    "{} token has no matching end",
                    other.kind()
                )))
            }
        }
        let mut depth = 0usize;
        let mut cursor = self.node(index).next;
        while let Some(i) = cursor {
            match self.node(i).token {
                Token::StartElement { .. } => depth += 1,
                Token::EndElement if depth == 0 => return Ok(i),
                Token::EndElement => depth -= 1,
                _ => {}
            }
            cursor = self.node(i).next;
        }
        Err(Error::malformed("unmatched start tag"))
    }

    fn containing_index(&self, index: u32) -> Option<u32> {
        let mut depth = 0usize;
        let mut cursor = self.node(index).prev;
        while let Some(i) = cursor {
            match self.node(i).token {
                Token::EndElement => depth += 1,
                Token::StartElement { .. } if depth == 0 => return Some(i),
                Token::StartElement { .. } => depth -= 1,
                Token::StartDoc => return None,
                _ => {}
            }
            cursor = self.node(i).prev;
        }
        None
    }

    fn attribute_run(&self, start: u32) -> Vec<u32> {
        let mut run = Vec::new();
        if self.node(start).token.kind() != TokenKind::StartElement {
            return run;
        }
        let mut cursor = self.node(start).next;
        while let Some(i) = cursor {
            if !self.node(i).token.is_attribute_like() {
                break;
            }
            run.push(i);
            cursor = self.node(i).next;
        }
        run
    }

    /// Indices from `first` to `last`, checked to form a balanced, movable run
    fn balanced_run(&self, first: TokenId, last: TokenId) -> Result<Vec<u32>> {
        let first = self.resolve(first)?;
        let last = self.resolve(last)?;
        let mut run = Vec::new();
        let mut depth = 0i32;
        let mut cursor = Some(first);
        while let Some(i) = cursor {
            let token = &self.node(i).token;
            if matches!(token, Token::StartDoc | Token::EndDoc) {
                return Err(Error::malformed("document boundaries cannot be edited"));
            }
            depth += token.depth_delta();
            if depth < 0 {
                return Err(Error::malformed("range closes an element it does not open"));
            }
            run.push(i);
            if i == last {
                break;
            }
            cursor = self.node(i).next;
        }
        if run.last() != Some(&last) {
            return Err(Error::malformed("range end precedes its start"));
        }
        if depth != 0 {
            return Err(Error::malformed("range leaves an element unclosed"));
        }
        Ok(run)
    }

    /// Placement rules for a fragment landing directly before `before`
    fn check_splice(&self, before: u32, fragment: &[&Token], excluded: &HashSet<u32>) -> Result<()> {
        if before == self.head {
            return Err(Error::malformed("nothing may precede the start of the document"));
        }
        let prev = match self.node(before).prev {
            Some(p) => p,
            None => return Err(Error::malformed("nothing may precede the start of the document")),
        };
        let prev_token = &self.node(prev).token;
        let (first, last) = match (fragment.first(), fragment.last()) {
            (Some(f), Some(l)) => (*f, *l),
            _ => return Err(Error::malformed("empty fragment")),
        };

        if first.is_attribute_like() && !may_precede_attribute(prev_token) {
            return Err(Error::malformed(
                "attributes may only follow a start tag or another attribute",
            ));
        }
        if self.node(before).token.is_attribute_like() && !may_precede_attribute(last) {
            return Err(Error::malformed(
                "content may not be placed in front of an attribute",
            ));
        }

        let leading: Vec<&Token> = fragment
            .iter()
            .copied()
            .take_while(|t| t.is_attribute_like())
            .collect();
        if leading.is_empty() {
            return Ok(());
        }
        let owner = if prev_token.kind() == TokenKind::StartElement {
            Some(prev)
        } else {
            self.containing_index(before)
        };
        if let Some(owner) = owner {
            let existing: Vec<&Token> = self
                .attribute_run(owner)
                .into_iter()
                .filter(|i| !excluded.contains(i))
                .map(|i| &self.node(i).token)
                .collect();
            for token in &leading {
                if existing.iter().any(|e| same_attribute_slot(e, token)) {
                    return Err(Error::malformed(format!("duplicate attribute: {}", token)));
                }
            }
        }
        Ok(())
    }

    fn link_run_before(&mut self, run: &[u32], before: u32) {
        let prev = self.node(before).prev;
        for (pos, &index) in run.iter().enumerate() {
            let entry = self.node_mut(index);
            entry.prev = if pos == 0 { prev } else { Some(run[pos - 1]) };
            entry.next = run.get(pos + 1).copied().or(Some(before));
        }
        if let (Some(&first), Some(&last)) = (run.first(), run.last()) {
            if let Some(p) = prev {
                self.node_mut(p).next = Some(first);
            }
            self.node_mut(before).prev = Some(last);
            self.assign_labels(first, run.len());
        }
    }

    fn unlink_run(&mut self, first: u32, last: u32) {
        let prev = self.node(first).prev;
        let next = self.node(last).next;
        if let Some(p) = prev {
            self.node_mut(p).next = next;
        }
        if let Some(n) = next {
            self.node_mut(n).prev = prev;
        }
        self.node_mut(first).prev = None;
        self.node_mut(last).next = None;
    }

    fn rebase_anchors(&mut self, removed: &HashSet<u32>, successor: Option<u32>) {
        for anchor in self.anchors.iter_mut().flatten() {
            if let Some(target) = anchor.target {
                if removed.contains(&target) {
                    anchor.target = match anchor.kind {
                        AnchorKind::Cursor => successor,
                        AnchorKind::Bookmark => None,
                    };
                }
            }
        }
    }

    /// Give `count` freshly linked tokens starting at `first` labels between their neighbours
    fn assign_labels(&mut self, first: u32, count: usize) {
        let lo = match self.node(first).prev {
            Some(p) => self.node(p).label,
            None => 0,
        };
        let mut end = first;
        for _ in 1..count {
            match self.node(end).next {
                Some(n) => end = n,
                None => break,
            }
        }

        let mut window = count;
        loop {
            let bound = match self.node(end).next {
                Some(n) => self.node(n).label,
                None => u64::MAX,
            };
            if bound.saturating_sub(lo) > 2 * window as u64 {
                self.spread_labels(first, window, lo, bound);
                return;
            }
            match self.node(end).next {
                Some(n) if window < count + MAX_LOCAL_WINDOW => {
                    end = n;
                    window += 1;
                }
                _ => break,
            }
        }
        self.relabel_all();
    }

    fn spread_labels(&mut self, first: u32, window: usize, lo: u64, bound: u64) {
        let step = (bound - lo) / (window as u64 + 1);
        let mut cursor = Some(first);
        for i in 0..window {
            let Some(index) = cursor else { break };
            let entry = self.node_mut(index);
            entry.label = lo + step * (i as u64 + 1);
            cursor = entry.next;
        }
    }

    fn relabel_all(&mut self) {
        log::debug!("relabelling all {} tokens of {}", self.len, self.id);
        let step = label_step(self.len);
        let mut cursor = Some(self.head);
        let mut i = 0u64;
        while let Some(index) = cursor {
            i += 1;
            let entry = self.node_mut(index);
            entry.label = step * i;
            cursor = entry.next;
        }
    }
}

impl Default for TokenStore {
    fn default() -> Self {
        Self::new()
    }
}

fn label_step(len: usize) -> u64 {
    u64::MAX / (len as u64 + 2)
}

fn may_precede_attribute(token: &Token) -> bool {
    token.kind() == TokenKind::StartElement || token.is_attribute_like()
}

fn same_attribute_slot(a: &Token, b: &Token) -> bool {
    match (a, b) {
        (Token::Attribute { name: x, .. }, Token::Attribute { name: y, .. }) => x == y,
        (Token::Namespace { prefix: x, .. }, Token::Namespace { prefix: y, .. }) => x == y,
        _ => false,
    }
}

/// Shape rules a fragment has to satisfy on its own
fn check_fragment(tokens: &[&Token]) -> Result<()> {
    let mut depth = 0i32;
    let mut run: Vec<&Token> = Vec::new();
    let mut prev: Option<&Token> = None;

    for &token in tokens {
        match token {
            Token::StartDoc | Token::EndDoc => {
                return Err(Error::malformed("fragments cannot carry document boundaries"))
            }
            Token::StartElement { name } => validate_token_name(name)?,
            Token::Attribute { name, .. } => validate_token_name(name)?,
            _ => {}
        }
        depth += token.depth_delta();
        if depth < 0 {
            return Err(Error::malformed("fragment closes an element it does not open"));
        }

        if token.is_attribute_like() {
            if let Some(p) = prev {
                if !may_precede_attribute(p) {
                    return Err(Error::malformed(
                        "attributes may only follow a start tag or another attribute",
                    ));
                }
            }
            if run.iter().any(|e| same_attribute_slot(e, token)) {
                return Err(Error::malformed(format!("duplicate attribute: {}", token)));
            }
            run.push(token);
        } else {
            run.clear();
        }
        prev = Some(token);
    }

    if depth != 0 {
        return Err(Error::malformed("fragment leaves an element unclosed"));
    }
    Ok(())
}

fn validate_token_name(name: &QName) -> Result<()> {
    crate::names::validate_name(name)
}

/// Lazy, restartable walk over a store
#[derive(Clone)]
pub struct Iter<'a> {
    store: &'a TokenStore,
    next: Option<u32>,
}

impl<'a> Iterator for Iter<'a> {
    type Item = (TokenId, &'a Token);

    fn next(&mut self) -> Option<Self::Item> {
        let index = self.next?;
        let entry = self.store.node(index);
        self.next = entry.next;
        Some((self.store.id_of(index), &entry.token))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    fn elem(name: &str) -> Token {
        Token::start(QName::local(name))
    }

    fn doc(tokens: Vec<Token>) -> TokenStore {
        let mut all = vec![Token::StartDoc];
        all.extend(tokens);
        all.push(Token::EndDoc);
        TokenStore::bulk_load(all).unwrap()
    }

    fn id_at(store: &TokenStore, n: usize) -> TokenId {
        store.iter().nth(n).unwrap().0
    }

    #[test]
    fn test_new_store_is_bracketed() {
        let store = TokenStore::new();
        assert_eq!(store.tokens(), vec![Token::StartDoc, Token::EndDoc]);
        assert_eq!(store.compare(store.first(), store.last()).unwrap(), Ordering::Less);
    }

    #[test]
    fn test_insert_and_remove_text() {
        let mut store = doc(vec![elem("a"), Token::EndElement]);
        let before = store.tokens();
        let end = id_at(&store, 2);

        let text = store.insert(end, Token::text("hi")).unwrap();
        assert_eq!(store.get(text).unwrap(), &Token::text("hi"));
        assert_eq!(store.len(), 5);

        store.remove(text).unwrap();
        assert_eq!(store.tokens(), before);
        assert!(matches!(store.get(text), Err(Error::StalePosition(_))));
    }

    #[test]
    fn test_lone_start_rejected() {
        let mut store = doc(vec![elem("a"), Token::EndElement]);
        let before = store.tokens();
        let end = id_at(&store, 2);
        assert!(matches!(store.insert(end, elem("b")), Err(Error::Structural(_))));
        let start = id_at(&store, 1);
        assert!(matches!(store.remove(start), Err(Error::Structural(_))));
        assert_eq!(store.tokens(), before);
    }

    #[test]
    fn test_attribute_placement() {
        let mut store = doc(vec![elem("a"), Token::text("t"), Token::EndElement]);
        let text = id_at(&store, 2);
        let attr = store
            .insert(text, Token::attribute(QName::local("x"), "1"))
            .unwrap();
        assert_eq!(store.containing_element(attr).unwrap(), Some(id_at(&store, 1)));

        // a second attribute with the same name is rejected
        let err = store.insert(text, Token::attribute(QName::local("x"), "2"));
        assert!(matches!(err, Err(Error::Structural(_))));

        // content in front of the attribute run is rejected
        let err = store.insert(attr, Token::text("oops"));
        assert!(matches!(err, Err(Error::Structural(_))));

        // attributes after content are rejected
        let end = store.next(text).unwrap().unwrap();
        let err = store.insert(end, Token::attribute(QName::local("y"), "1"));
        assert!(matches!(err, Err(Error::Structural(_))));
    }

    #[test]
    fn test_nothing_before_start_doc() {
        let mut store = TokenStore::new();
        let first = store.first();
        assert!(store.insert(first, Token::text("x")).is_err());
    }

    #[test]
    fn test_matching_and_containing() {
        let store = doc(vec![
            elem("a"),
            elem("b"),
            Token::EndElement,
            elem("c"),
            Token::text("x"),
            Token::EndElement,
            Token::EndElement,
        ]);
        let a = id_at(&store, 1);
        let c = id_at(&store, 4);
        let text = id_at(&store, 5);
        assert_eq!(store.matching_end(a).unwrap(), id_at(&store, 7));
        assert_eq!(store.matching_start(id_at(&store, 3)).unwrap(), id_at(&store, 2));
        assert_eq!(store.containing_element(text).unwrap(), Some(c));
        assert_eq!(store.containing_element(c).unwrap(), Some(a));
        assert_eq!(store.containing_element(a).unwrap(), None);
        assert_eq!(store.depth(text).unwrap(), 2);
    }

    #[test]
    fn test_remove_subtree_and_move() {
        let mut store = doc(vec![
            elem("a"),
            elem("b"),
            Token::EndElement,
            elem("c"),
            Token::EndElement,
            Token::EndElement,
        ]);
        let b = id_at(&store, 2);
        let c = id_at(&store, 4);
        let end_a = id_at(&store, 6);

        store.move_subtree(b..=store.subtree_end(b).unwrap(), end_a).unwrap();
        assert_eq!(store.compare(c, b).unwrap(), Ordering::Less);
        assert_eq!(
            store.tokens(),
            vec![
                Token::StartDoc,
                elem("a"),
                elem("c"),
                Token::EndElement,
                elem("b"),
                Token::EndElement,
                Token::EndElement,
                Token::EndDoc,
            ]
        );

        let removed = store.remove_subtree(c).unwrap();
        assert_eq!(removed, vec![elem("c"), Token::EndElement]);
        assert!(store.get(b).is_ok());
    }

    #[test]
    fn test_move_into_itself_rejected() {
        let mut store = doc(vec![elem("a"), elem("b"), Token::EndElement, Token::EndElement]);
        let a = id_at(&store, 1);
        let b = id_at(&store, 2);
        let end = store.subtree_end(a).unwrap();
        assert!(matches!(store.move_subtree(a..=end, b), Err(Error::Structural(_))));
    }

    #[test]
    fn test_unbalanced_range_rejected() {
        let mut store = doc(vec![elem("a"), elem("b"), Token::EndElement, Token::EndElement]);
        let before = store.tokens();
        let a = id_at(&store, 1);
        let b_end = id_at(&store, 3);
        assert!(store.remove_range(a..=b_end).is_err());
        assert_eq!(store.tokens(), before);
    }

    #[test]
    fn test_cross_document_compare() {
        let a = TokenStore::new();
        let b = TokenStore::new();
        assert!(matches!(a.compare(a.first(), b.first()), Err(Error::CrossDocument)));
    }

    #[test]
    fn test_anchors_rebase_and_invalidate() {
        let mut store = doc(vec![elem("a"), Token::text("x"), Token::EndElement]);
        let text = id_at(&store, 2);
        let end = id_at(&store, 3);
        let cursor = store.add_anchor(AnchorKind::Cursor, text).unwrap();
        let bookmark = store.add_anchor(AnchorKind::Bookmark, text).unwrap();

        store.remove(text).unwrap();
        assert_eq!(store.anchor_target(cursor), Some(end));
        assert_eq!(store.anchor_target(bookmark), None);

        store.release_anchor(cursor);
        store.release_anchor(bookmark);
        assert_eq!(store.anchor_count(), 0);
    }

    #[test]
    fn test_deferred_anchor_release() {
        let mut store = TokenStore::new();
        let first = store.first();
        let kept = store.add_anchor(AnchorKind::Cursor, first).unwrap();
        let dropped = store.add_anchor(AnchorKind::Bookmark, first).unwrap();

        store.defer_release(dropped);
        assert_eq!(store.anchor_count(), 1);

        let reused = store.add_anchor(AnchorKind::Cursor, first).unwrap();
        assert_eq!(reused, dropped);
        assert_eq!(store.anchors.len(), 2);
        assert_eq!(store.anchor_count(), 2);
        assert_eq!(store.anchor_target(kept), Some(first));
    }

    #[test]
    fn test_dense_inserts_keep_order() {
        let mut store = doc(vec![elem("a"), Token::EndElement]);
        let end = id_at(&store, 2);
        let mut ids = Vec::new();
        // always insert at the same point so labels have to be respaced
        let mut at = end;
        for i in 0..200 {
            at = store.insert(at, Token::text(format!("{}", i))).unwrap();
            ids.push(at);
        }
        for pair in ids.windows(2) {
            assert_eq!(store.compare(pair[1], pair[0]).unwrap(), Ordering::Less);
        }
        let labels_ok = store
            .iter()
            .collect::<Vec<_>>()
            .windows(2)
            .all(|w| store.compare(w[0].0, w[1].0).unwrap() == Ordering::Less);
        assert!(labels_ok);
    }
}
