//! Observable set with insertion-ordered iteration and read-only set algebra.

use std::cell::{Cell, RefCell};
use std::collections::{BTreeSet, HashSet};
use std::hash::{BuildHasher, Hash};
use std::rc::Rc;

use crate::error::{CollectionError, Result};
use crate::signal::{ChangeSignal, SignalId};
use crate::token::ChangeToken;

#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub enum SetOperation {
    Add,
    Delete,
    Clear,
}

#[derive(Clone, Debug, PartialEq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub struct SetChange<T> {
    pub operation: SetOperation,
    pub added: Vec<T>,
    pub removed: Vec<T>,
}

/// The capabilities set algebra needs from its argument.
pub trait SetLike<T> {
    /// Number of distinct members.
    fn size(&self) -> usize;
    fn has(&self, item: &T) -> bool;
    /// Distinct members, in the argument's own order.
    fn keys(&self) -> Vec<T>;
}

impl<T: Clone + Eq + Hash, S: BuildHasher> SetLike<T> for HashSet<T, S> {
    fn size(&self) -> usize {
        self.len()
    }
    fn has(&self, item: &T) -> bool {
        self.contains(item)
    }
    fn keys(&self) -> Vec<T> {
        self.iter().cloned().collect()
    }
}

impl<T: Clone + Ord> SetLike<T> for BTreeSet<T> {
    fn size(&self) -> usize {
        self.len()
    }
    fn has(&self, item: &T) -> bool {
        self.contains(item)
    }
    fn keys(&self) -> Vec<T> {
        self.iter().cloned().collect()
    }
}

/// Plain sequences count as sets of their distinct items.
impl<T: Clone + Eq + Hash> SetLike<T> for [T] {
    fn size(&self) -> usize {
        self.iter().collect::<HashSet<_>>().len()
    }
    fn has(&self, item: &T) -> bool {
        self.contains(item)
    }
    fn keys(&self) -> Vec<T> {
        let mut seen = HashSet::new();
        self.iter().filter(|x| seen.insert(*x)).cloned().collect()
    }
}

impl<T: Clone + Eq + Hash> SetLike<T> for Vec<T> {
    fn size(&self) -> usize {
        self.as_slice().size()
    }
    fn has(&self, item: &T) -> bool {
        self.contains(item)
    }
    fn keys(&self) -> Vec<T> {
        self.as_slice().keys()
    }
}

struct SetState<T> {
    order: Vec<T>,
    members: HashSet<T>,
}

struct SetInner<T: 'static> {
    state: RefCell<SetState<T>>,
    token: Cell<ChangeToken>,
    changed: ChangeSignal<ObservableSet<T>, SetChange<T>>,
}

/// Shared handle to a set that reports adds, deletes and clears.
///
/// Equality is identity, like [`ObservableList`](crate::ObservableList).
pub struct ObservableSet<T: 'static> {
    inner: Rc<SetInner<T>>,
}

impl<T> Clone for ObservableSet<T> {
    fn clone(&self) -> Self {
        Self {
            inner: self.inner.clone(),
        }
    }
}

impl<T> PartialEq for ObservableSet<T> {
    fn eq(&self, other: &Self) -> bool {
        Rc::ptr_eq(&self.inner, &other.inner)
    }
}

impl<T> Eq for ObservableSet<T> {}

impl<T: std::fmt::Debug> std::fmt::Debug for ObservableSet<T> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_set()
            .entries(self.inner.state.borrow().order.iter())
            .finish()
    }
}

impl<T: Clone + Eq + Hash + 'static> Default for ObservableSet<T> {
    fn default() -> Self {
        Self::new()
    }
}

impl<T: Clone + Eq + Hash + 'static> FromIterator<T> for ObservableSet<T> {
    fn from_iter<I: IntoIterator<Item = T>>(iter: I) -> Self {
        let mut state = SetState {
            order: Vec::new(),
            members: HashSet::new(),
        };
        for item in iter {
            if state.members.insert(item.clone()) {
                state.order.push(item);
            }
        }
        Self {
            inner: Rc::new(SetInner {
                state: RefCell::new(state),
                token: Cell::new(ChangeToken::default()),
                changed: ChangeSignal::new(),
            }),
        }
    }
}

impl<T: Clone + Eq + Hash + 'static> SetLike<T> for ObservableSet<T> {
    fn size(&self) -> usize {
        self.len()
    }
    fn has(&self, item: &T) -> bool {
        ObservableSet::has(self, item)
    }
    fn keys(&self) -> Vec<T> {
        self.to_vec()
    }
}

impl<T: Clone + Eq + Hash + 'static> ObservableSet<T> {
    pub fn new() -> Self {
        std::iter::empty().collect()
    }

    pub fn id(&self) -> SignalId {
        self.inner.changed.id()
    }

    pub fn token(&self) -> ChangeToken {
        self.inner.token.get()
    }

    pub fn changed(&self) -> &ChangeSignal<ObservableSet<T>, SetChange<T>> {
        &self.inner.changed
    }

    pub fn len(&self) -> usize {
        self.inner.state.borrow().order.len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    pub fn has(&self, item: &T) -> bool {
        self.inner.state.borrow().members.contains(item)
    }

    /// Members in insertion order.
    pub fn to_vec(&self) -> Vec<T> {
        self.inner.state.borrow().order.clone()
    }

    pub fn iter(&self) -> Iter<T> {
        Iter {
            set: self.clone(),
            token: self.token(),
            index: 0,
        }
    }

    /// Returns `false`, and does nothing, if `item` is already a member.
    pub fn add(&self, item: T) -> bool {
        {
            let mut state = self.inner.state.borrow_mut();
            if !state.members.insert(item.clone()) {
                return false;
            }
            state.order.push(item.clone());
        }
        self.bump();
        self.inner.changed.dispatch(
            self,
            &SetChange {
                operation: SetOperation::Add,
                added: vec![item],
                removed: Vec::new(),
            },
        );
        true
    }

    /// Adds each item in turn; one event per new member. Returns how many
    /// were new.
    pub fn add_all(&self, items: impl IntoIterator<Item = T>) -> usize {
        items.into_iter().filter(|item| self.add(item.clone())).count()
    }

    /// Returns `false`, and does nothing, if `item` is not a member.
    pub fn delete(&self, item: &T) -> bool {
        let removed = {
            let mut state = self.inner.state.borrow_mut();
            let Some(removed) = state.members.take(item) else {
                return false;
            };
            state.order.retain(|x| x != item);
            removed
        };
        self.bump();
        self.inner.changed.dispatch(
            self,
            &SetChange {
                operation: SetOperation::Delete,
                added: Vec::new(),
                removed: vec![removed],
            },
        );
        true
    }

    /// Deletes the members not matching `keep`, one event each.
    pub fn retain(&self, mut keep: impl FnMut(&T) -> bool) {
        for item in self.to_vec() {
            if !keep(&item) {
                self.delete(&item);
            }
        }
    }

    /// Returns how many members were removed.
    pub fn clear(&self) -> usize {
        let removed = {
            let mut state = self.inner.state.borrow_mut();
            if state.order.is_empty() {
                return 0;
            }
            state.members.clear();
            std::mem::take(&mut state.order)
        };
        let count = removed.len();
        self.bump();
        self.inner.changed.dispatch(
            self,
            &SetChange {
                operation: SetOperation::Clear,
                added: Vec::new(),
                removed,
            },
        );
        count
    }

    // Set algebra. Each query works on a snapshot taken before `other` is
    // consulted, so `other` may be this very set.

    pub fn union<S: SetLike<T> + ?Sized>(&self, other: &S) -> ObservableSet<T> {
        self.to_vec().into_iter().chain(other.keys()).collect()
    }

    pub fn intersection<S: SetLike<T> + ?Sized>(&self, other: &S) -> ObservableSet<T> {
        self.to_vec().into_iter().filter(|x| other.has(x)).collect()
    }

    pub fn difference<S: SetLike<T> + ?Sized>(&self, other: &S) -> ObservableSet<T> {
        self.to_vec().into_iter().filter(|x| !other.has(x)).collect()
    }

    pub fn symmetric_difference<S: SetLike<T> + ?Sized>(&self, other: &S) -> ObservableSet<T> {
        let mine = self.to_vec();
        let members: HashSet<&T> = mine.iter().collect();
        let theirs: Vec<T> = other
            .keys()
            .into_iter()
            .filter(|x| !members.contains(x))
            .collect();
        mine.iter()
            .filter(|x| !other.has(x))
            .cloned()
            .chain(theirs)
            .collect()
    }

    pub fn is_subset_of<S: SetLike<T> + ?Sized>(&self, other: &S) -> bool {
        let mine = self.to_vec();
        mine.len() <= other.size() && mine.iter().all(|x| other.has(x))
    }

    pub fn is_superset_of<S: SetLike<T> + ?Sized>(&self, other: &S) -> bool {
        let members: HashSet<T> = self.inner.state.borrow().members.clone();
        other.keys().iter().all(|x| members.contains(x))
    }

    pub fn is_disjoint_from<S: SetLike<T> + ?Sized>(&self, other: &S) -> bool {
        self.to_vec().iter().all(|x| !other.has(x))
    }

    fn bump(&self) {
        self.inner.token.set(self.inner.token.get().next());
    }
}

/// Token-checked iterator over an [`ObservableSet`], in insertion order.
pub struct Iter<T: 'static> {
    set: ObservableSet<T>,
    token: ChangeToken,
    index: usize,
}

impl<T: Clone + Eq + Hash + 'static> Iterator for Iter<T> {
    type Item = Result<T>;

    fn next(&mut self) -> Option<Self::Item> {
        if self.set.token() != self.token {
            return Some(Err(CollectionError::MutatedDuringIteration));
        }
        let item = self.set.inner.state.borrow().order.get(self.index).cloned()?;
        self.index += 1;
        Some(Ok(item))
    }
}

impl<T: Clone + Eq + Hash + 'static> IntoIterator for &ObservableSet<T> {
    type Item = Result<T>;
    type IntoIter = Iter<T>;

    fn into_iter(self) -> Self::IntoIter {
        self.iter()
    }
}
