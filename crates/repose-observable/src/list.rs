//! Observable ordered sequence.
//!
//! Every structural edit funnels through one splice primitive, which trims
//! the items common to the removed and inserted runs before describing the
//! edit. Pure permutations (reverse, sort, swap, move) go through a second
//! primitive and are reported on [`ObservableList::reordered`] only.

use std::cell::{Cell, RefCell};
use std::cmp::Ordering;
use std::ops::{Bound, RangeBounds};
use std::rc::Rc;

use crate::error::{CollectionError, Result};
use crate::signal::{ChangeSignal, SignalId};
use crate::token::ChangeToken;

#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub enum ListOperation {
    Add,
    Remove,
    Replace,
    Clear,
}

/// Net effect of one structural edit: `removed` used to start at `start`,
/// `added` starts there now.
#[derive(Clone, Debug, PartialEq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub struct ListChange<T> {
    pub operation: ListOperation,
    pub start: usize,
    pub added: Vec<T>,
    pub removed: Vec<T>,
}

#[derive(Clone, Debug, PartialEq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub struct MovedItem<T> {
    pub item: T,
    pub from: usize,
    pub to: usize,
}

/// A permutation. Only items whose position changed are listed.
#[derive(Clone, Debug, PartialEq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub struct ListReorder<T> {
    pub moved: Vec<MovedItem<T>>,
}

struct ListInner<T: 'static> {
    items: RefCell<Vec<T>>,
    token: Cell<ChangeToken>,
    changed: ChangeSignal<ObservableList<T>, ListChange<T>>,
    reordered: ChangeSignal<ObservableList<T>, ListReorder<T>>,
}

/// Shared handle to a mutable list that reports its edits.
///
/// Clones share the same list. Equality is identity: two handles are equal
/// when they point at the same list, whatever the contents.
pub struct ObservableList<T: 'static> {
    inner: Rc<ListInner<T>>,
}

impl<T> Clone for ObservableList<T> {
    fn clone(&self) -> Self {
        Self {
            inner: self.inner.clone(),
        }
    }
}

impl<T> PartialEq for ObservableList<T> {
    fn eq(&self, other: &Self) -> bool {
        Rc::ptr_eq(&self.inner, &other.inner)
    }
}

impl<T> Eq for ObservableList<T> {}

impl<T: std::fmt::Debug> std::fmt::Debug for ObservableList<T> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ObservableList")
            .field("items", &*self.inner.items.borrow())
            .field("token", &self.inner.token.get())
            .finish()
    }
}

impl<T: Clone + PartialEq + 'static> Default for ObservableList<T> {
    fn default() -> Self {
        Self::new()
    }
}

impl<T: Clone + PartialEq + 'static> From<Vec<T>> for ObservableList<T> {
    fn from(items: Vec<T>) -> Self {
        Self {
            inner: Rc::new(ListInner {
                items: RefCell::new(items),
                token: Cell::new(ChangeToken::default()),
                changed: ChangeSignal::new(),
                reordered: ChangeSignal::new(),
            }),
        }
    }
}

impl<T: Clone + PartialEq + 'static> FromIterator<T> for ObservableList<T> {
    fn from_iter<I: IntoIterator<Item = T>>(iter: I) -> Self {
        Self::from(iter.into_iter().collect::<Vec<_>>())
    }
}

impl<T: Clone + PartialEq + 'static> ObservableList<T> {
    pub fn new() -> Self {
        Self::from(Vec::new())
    }

    /// Identity of this list; stable for its lifetime.
    pub fn id(&self) -> SignalId {
        self.inner.changed.id()
    }

    pub fn token(&self) -> ChangeToken {
        self.inner.token.get()
    }

    pub fn changed(&self) -> &ChangeSignal<ObservableList<T>, ListChange<T>> {
        &self.inner.changed
    }

    pub fn reordered(&self) -> &ChangeSignal<ObservableList<T>, ListReorder<T>> {
        &self.inner.reordered
    }

    pub fn len(&self) -> usize {
        self.inner.items.borrow().len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    pub fn get(&self, index: usize) -> Option<T> {
        self.inner.items.borrow().get(index).cloned()
    }

    pub fn first(&self) -> Option<T> {
        self.get(0)
    }

    pub fn last(&self) -> Option<T> {
        self.inner.items.borrow().last().cloned()
    }

    pub fn contains(&self, item: &T) -> bool {
        self.inner.items.borrow().contains(item)
    }

    pub fn position(&self, item: &T) -> Option<usize> {
        self.inner.items.borrow().iter().position(|x| x == item)
    }

    pub fn to_vec(&self) -> Vec<T> {
        self.inner.items.borrow().clone()
    }

    /// Reads the items in place. Mutating this list from `f` panics.
    pub fn with<R>(&self, f: impl FnOnce(&[T]) -> R) -> R {
        f(&self.inner.items.borrow())
    }

    pub fn iter(&self) -> Iter<T> {
        Iter {
            list: self.clone(),
            token: self.token(),
            index: 0,
        }
    }

    // structural edits

    pub fn push(&self, item: T) {
        let len = self.len();
        self.apply_splice(len, len, vec![item], false);
    }

    pub fn extend(&self, items: impl IntoIterator<Item = T>) {
        let len = self.len();
        self.apply_splice(len, len, items.into_iter().collect(), false);
    }

    pub fn insert(&self, index: usize, item: T) -> Result<()> {
        self.insert_all(index, [item])
    }

    pub fn insert_all(&self, index: usize, items: impl IntoIterator<Item = T>) -> Result<()> {
        let len = self.len();
        if index > len {
            return Err(CollectionError::IndexOutOfBounds { index, len });
        }
        self.apply_splice(index, index, items.into_iter().collect(), false);
        Ok(())
    }

    pub fn pop(&self) -> Option<T> {
        let len = self.len();
        if len == 0 {
            return None;
        }
        self.apply_splice(len - 1, len, Vec::new(), false).pop()
    }

    pub fn remove(&self, index: usize) -> Result<T> {
        let len = self.len();
        if index >= len {
            return Err(CollectionError::IndexOutOfBounds { index, len });
        }
        self.apply_splice(index, index + 1, Vec::new(), false)
            .pop()
            .ok_or(CollectionError::IndexOutOfBounds { index, len })
    }

    pub fn remove_range(&self, range: impl RangeBounds<usize>) -> Result<Vec<T>> {
        self.replace_range(range, None)
    }

    /// Removes `delete_count` items at `start` and inserts `items` there.
    /// Returns the removed items.
    pub fn splice(
        &self,
        start: usize,
        delete_count: usize,
        items: impl IntoIterator<Item = T>,
    ) -> Result<Vec<T>> {
        let len = self.len();
        if start > len {
            return Err(CollectionError::IndexOutOfBounds { index: start, len });
        }
        let end = start.saturating_add(delete_count);
        if end > len {
            return Err(CollectionError::RangeOutOfBounds { start, end, len });
        }
        Ok(self.apply_splice(start, end, items.into_iter().collect(), false))
    }

    pub fn replace_range(
        &self,
        range: impl RangeBounds<usize>,
        items: impl IntoIterator<Item = T>,
    ) -> Result<Vec<T>> {
        let (start, end) = resolve_range(range, self.len())?;
        Ok(self.apply_splice(start, end, items.into_iter().collect(), false))
    }

    /// Overwrites one slot and returns the previous item. Writing an equal
    /// item is a no-op.
    pub fn set(&self, index: usize, item: T) -> Result<T> {
        let len = self.len();
        if index >= len {
            return Err(CollectionError::IndexOutOfBounds { index, len });
        }
        self.apply_splice(index, index + 1, vec![item], false)
            .pop()
            .ok_or(CollectionError::IndexOutOfBounds { index, len })
    }

    pub fn truncate(&self, len: usize) {
        let current = self.len();
        if len < current {
            self.apply_splice(len, current, Vec::new(), false);
        }
    }

    /// Keeps the items matching `keep`, reported as a single change starting
    /// at the first dropped item.
    pub fn retain(&self, mut keep: impl FnMut(&T) -> bool) {
        let snapshot = self.to_vec();
        let Some(first) = snapshot.iter().position(|x| !keep(x)) else {
            return;
        };
        let kept: Vec<T> = snapshot[first + 1..]
            .iter()
            .filter(|x| keep(x))
            .cloned()
            .collect();
        self.apply_splice(first, snapshot.len(), kept, false);
    }

    pub fn clear(&self) {
        let len = self.len();
        if len > 0 {
            self.apply_splice(0, len, Vec::new(), true);
        }
    }

    // permutations

    pub fn reverse(&self) {
        let len = self.len();
        self.apply_permutation((0..len).rev().collect());
    }

    pub fn sort(&self)
    where
        T: Ord,
    {
        self.sort_by(T::cmp);
    }

    pub fn sort_by_key<K: Ord>(&self, mut key: impl FnMut(&T) -> K) {
        self.sort_by(|a, b| key(a).cmp(&key(b)));
    }

    /// Stable sort. `compare` runs on a snapshot, so it may read this list.
    pub fn sort_by(&self, mut compare: impl FnMut(&T, &T) -> Ordering) {
        let snapshot = self.to_vec();
        let mut order: Vec<usize> = (0..snapshot.len()).collect();
        order.sort_by(|a, b| compare(&snapshot[*a], &snapshot[*b]));
        self.apply_permutation(order);
    }

    pub fn swap(&self, a: usize, b: usize) -> Result<()> {
        let len = self.len();
        for index in [a, b] {
            if index >= len {
                return Err(CollectionError::IndexOutOfBounds { index, len });
            }
        }
        let mut order: Vec<usize> = (0..len).collect();
        order.swap(a, b);
        self.apply_permutation(order);
        Ok(())
    }

    /// Moves the item at `from` so that it ends up at index `to`.
    pub fn move_item(&self, from: usize, to: usize) -> Result<()> {
        let len = self.len();
        for index in [from, to] {
            if index >= len {
                return Err(CollectionError::IndexOutOfBounds { index, len });
            }
        }
        let mut order: Vec<usize> = (0..len).collect();
        let moved = order.remove(from);
        order.insert(to, moved);
        self.apply_permutation(order);
        Ok(())
    }

    /// Bounds are checked by the callers. Returns every item taken out of
    /// `start..end`, including the ones trimmed from the reported change.
    fn apply_splice(&self, start: usize, end: usize, inserted: Vec<T>, clear: bool) -> Vec<T> {
        if start == end && inserted.is_empty() {
            return Vec::new();
        }
        let removed: Vec<T> = self
            .inner
            .items
            .borrow_mut()
            .splice(start..end, inserted.iter().cloned())
            .collect();

        let prefix = removed
            .iter()
            .zip(&inserted)
            .take_while(|(a, b)| a == b)
            .count();
        let suffix = removed[prefix..]
            .iter()
            .rev()
            .zip(inserted[prefix..].iter().rev())
            .take_while(|(a, b)| a == b)
            .count();
        let net_removed = removed[prefix..removed.len() - suffix].to_vec();
        let net_added = inserted[prefix..inserted.len() - suffix].to_vec();
        if net_removed.is_empty() && net_added.is_empty() {
            return removed;
        }

        let operation = match (clear, net_added.is_empty(), net_removed.is_empty()) {
            (true, _, _) => ListOperation::Clear,
            (false, false, true) => ListOperation::Add,
            (false, true, false) => ListOperation::Remove,
            _ => ListOperation::Replace,
        };
        self.bump();
        self.inner.changed.dispatch(
            self,
            &ListChange {
                operation,
                start: start + prefix,
                added: net_added,
                removed: net_removed,
            },
        );
        removed
    }

    /// `order[to] == from`.
    fn apply_permutation(&self, order: Vec<usize>) {
        let moved = {
            let mut items = self.inner.items.borrow_mut();
            let permuted: Vec<T> = order.iter().map(|from| items[*from].clone()).collect();
            let moved: Vec<MovedItem<T>> = order
                .iter()
                .enumerate()
                .filter(|(to, from)| *to != **from && permuted[*to] != items[*to])
                .map(|(to, from)| MovedItem {
                    item: permuted[to].clone(),
                    from: *from,
                    to,
                })
                .collect();
            if !moved.is_empty() {
                *items = permuted;
            }
            moved
        };
        if moved.is_empty() {
            return;
        }
        self.bump();
        self.inner.reordered.dispatch(self, &ListReorder { moved });
    }

    fn bump(&self) {
        self.inner.token.set(self.inner.token.get().next());
    }
}

fn resolve_range(range: impl RangeBounds<usize>, len: usize) -> Result<(usize, usize)> {
    let start = match range.start_bound() {
        Bound::Included(s) => *s,
        Bound::Excluded(s) => s.saturating_add(1),
        Bound::Unbounded => 0,
    };
    let end = match range.end_bound() {
        Bound::Included(e) => e.saturating_add(1),
        Bound::Excluded(e) => *e,
        Bound::Unbounded => len,
    };
    if start > end || end > len {
        return Err(CollectionError::RangeOutOfBounds { start, end, len });
    }
    Ok((start, end))
}

/// Token-checked iterator over an [`ObservableList`].
///
/// Yields `Err(MutatedDuringIteration)` on every step once the list was
/// edited after the iterator was created.
pub struct Iter<T: 'static> {
    list: ObservableList<T>,
    token: ChangeToken,
    index: usize,
}

impl<T: Clone + PartialEq + 'static> Iterator for Iter<T> {
    type Item = Result<T>;

    fn next(&mut self) -> Option<Self::Item> {
        if self.list.token() != self.token {
            return Some(Err(CollectionError::MutatedDuringIteration));
        }
        let item = self.list.get(self.index)?;
        self.index += 1;
        Some(Ok(item))
    }
}

impl<T: Clone + PartialEq + 'static> IntoIterator for &ObservableList<T> {
    type Item = Result<T>;
    type IntoIter = Iter<T>;

    fn into_iter(self) -> Self::IntoIter {
        self.iter()
    }
}
