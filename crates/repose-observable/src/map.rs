//! Observable key-value map, iterated in insertion order.

use std::cell::{Cell, RefCell};
use std::collections::HashMap;
use std::hash::Hash;
use std::rc::Rc;

use crate::error::{CollectionError, Result};
use crate::signal::{ChangeSignal, SignalId};
use crate::token::ChangeToken;

#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub enum MapOperation {
    Set,
    Delete,
    Clear,
}

#[derive(Clone, Debug, PartialEq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub enum MapChange<K, V> {
    /// `removed` is the overwritten value, if the key was present.
    Set { key: K, added: V, removed: Option<V> },
    Delete { key: K, removed: V },
    Clear { removed: Vec<(K, V)> },
}

impl<K, V> MapChange<K, V> {
    pub fn operation(&self) -> MapOperation {
        match self {
            MapChange::Set { .. } => MapOperation::Set,
            MapChange::Delete { .. } => MapOperation::Delete,
            MapChange::Clear { .. } => MapOperation::Clear,
        }
    }

    /// The key touched by a set or delete. `None` for a clear.
    pub fn key(&self) -> Option<&K> {
        match self {
            MapChange::Set { key, .. } | MapChange::Delete { key, .. } => Some(key),
            MapChange::Clear { .. } => None,
        }
    }
}

struct MapState<K, V> {
    order: Vec<K>,
    entries: HashMap<K, V>,
}

struct MapInner<K: 'static, V: 'static> {
    state: RefCell<MapState<K, V>>,
    token: Cell<ChangeToken>,
    changed: ChangeSignal<ObservableMap<K, V>, MapChange<K, V>>,
}

/// Shared handle to a map that reports sets, deletes and clears per key.
pub struct ObservableMap<K: 'static, V: 'static> {
    inner: Rc<MapInner<K, V>>,
}

impl<K, V> Clone for ObservableMap<K, V> {
    fn clone(&self) -> Self {
        Self {
            inner: self.inner.clone(),
        }
    }
}

impl<K, V> PartialEq for ObservableMap<K, V> {
    fn eq(&self, other: &Self) -> bool {
        Rc::ptr_eq(&self.inner, &other.inner)
    }
}

impl<K, V> Eq for ObservableMap<K, V> {}

impl<K: std::fmt::Debug + Eq + Hash, V: std::fmt::Debug> std::fmt::Debug for ObservableMap<K, V> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let state = self.inner.state.borrow();
        f.debug_map()
            .entries(state.order.iter().filter_map(|k| state.entries.get(k).map(|v| (k, v))))
            .finish()
    }
}

impl<K: Clone + Eq + Hash + 'static, V: Clone + PartialEq + 'static> Default for ObservableMap<K, V> {
    fn default() -> Self {
        Self::new()
    }
}

impl<K: Clone + Eq + Hash + 'static, V: Clone + PartialEq + 'static> FromIterator<(K, V)>
    for ObservableMap<K, V>
{
    fn from_iter<I: IntoIterator<Item = (K, V)>>(iter: I) -> Self {
        let mut state = MapState {
            order: Vec::new(),
            entries: HashMap::new(),
        };
        for (key, value) in iter {
            if state.entries.insert(key.clone(), value).is_none() {
                state.order.push(key);
            }
        }
        Self {
            inner: Rc::new(MapInner {
                state: RefCell::new(state),
                token: Cell::new(ChangeToken::default()),
                changed: ChangeSignal::new(),
            }),
        }
    }
}

impl<K: Clone + Eq + Hash + 'static, V: Clone + PartialEq + 'static> ObservableMap<K, V> {
    pub fn new() -> Self {
        std::iter::empty().collect()
    }

    pub fn id(&self) -> SignalId {
        self.inner.changed.id()
    }

    pub fn token(&self) -> ChangeToken {
        self.inner.token.get()
    }

    pub fn changed(&self) -> &ChangeSignal<ObservableMap<K, V>, MapChange<K, V>> {
        &self.inner.changed
    }

    pub fn len(&self) -> usize {
        self.inner.state.borrow().order.len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    pub fn get(&self, key: &K) -> Option<V> {
        self.inner.state.borrow().entries.get(key).cloned()
    }

    pub fn contains_key(&self, key: &K) -> bool {
        self.inner.state.borrow().entries.contains_key(key)
    }

    pub fn to_vec(&self) -> Vec<(K, V)> {
        let state = self.inner.state.borrow();
        state
            .order
            .iter()
            .filter_map(|k| state.entries.get(k).map(|v| (k.clone(), v.clone())))
            .collect()
    }

    pub fn iter(&self) -> Iter<K, V> {
        Iter {
            map: self.clone(),
            token: self.token(),
            index: 0,
        }
    }

    pub fn keys(&self) -> Keys<K, V> {
        Keys(self.iter())
    }

    pub fn values(&self) -> Values<K, V> {
        Values(self.iter())
    }

    /// Writes `value` under `key` and returns the previous value. Writing a
    /// value equal to the current one is a no-op.
    pub fn insert(&self, key: K, value: V) -> Option<V> {
        let removed = {
            let mut state = self.inner.state.borrow_mut();
            if state.entries.get(&key) == Some(&value) {
                return Some(value);
            }
            let removed = state.entries.insert(key.clone(), value.clone());
            if removed.is_none() {
                state.order.push(key.clone());
            }
            removed
        };
        self.bump();
        self.inner.changed.dispatch(
            self,
            &MapChange::Set {
                key,
                added: value,
                removed: removed.clone(),
            },
        );
        removed
    }

    pub fn remove(&self, key: &K) -> Option<V> {
        let removed = {
            let mut state = self.inner.state.borrow_mut();
            let removed = state.entries.remove(key)?;
            state.order.retain(|k| k != key);
            removed
        };
        self.bump();
        self.inner.changed.dispatch(
            self,
            &MapChange::Delete {
                key: key.clone(),
                removed: removed.clone(),
            },
        );
        Some(removed)
    }

    pub fn clear(&self) -> usize {
        let removed: Vec<(K, V)> = {
            let mut state = self.inner.state.borrow_mut();
            if state.order.is_empty() {
                return 0;
            }
            let order = std::mem::take(&mut state.order);
            let mut entries = std::mem::take(&mut state.entries);
            order
                .into_iter()
                .filter_map(|k| entries.remove(&k).map(|v| (k, v)))
                .collect()
        };
        let count = removed.len();
        self.bump();
        self.inner
            .changed
            .dispatch(self, &MapChange::Clear { removed });
        count
    }

    fn bump(&self) {
        self.inner.token.set(self.inner.token.get().next());
    }

    fn entry_at(&self, index: usize) -> Option<(K, V)> {
        let state = self.inner.state.borrow();
        let key = state.order.get(index)?;
        state.entries.get(key).map(|v| (key.clone(), v.clone()))
    }
}

/// Token-checked iterator over the entries of an [`ObservableMap`].
pub struct Iter<K: 'static, V: 'static> {
    map: ObservableMap<K, V>,
    token: ChangeToken,
    index: usize,
}

impl<K: Clone + Eq + Hash + 'static, V: Clone + PartialEq + 'static> Iterator for Iter<K, V> {
    type Item = Result<(K, V)>;

    fn next(&mut self) -> Option<Self::Item> {
        if self.map.token() != self.token {
            return Some(Err(CollectionError::MutatedDuringIteration));
        }
        let entry = self.map.entry_at(self.index)?;
        self.index += 1;
        Some(Ok(entry))
    }
}

pub struct Keys<K: 'static, V: 'static>(Iter<K, V>);

impl<K: Clone + Eq + Hash + 'static, V: Clone + PartialEq + 'static> Iterator for Keys<K, V> {
    type Item = Result<K>;

    fn next(&mut self) -> Option<Self::Item> {
        self.0.next().map(|entry| entry.map(|(k, _)| k))
    }
}

pub struct Values<K: 'static, V: 'static>(Iter<K, V>);

impl<K: Clone + Eq + Hash + 'static, V: Clone + PartialEq + 'static> Iterator for Values<K, V> {
    type Item = Result<V>;

    fn next(&mut self) -> Option<Self::Item> {
        self.0.next().map(|entry| entry.map(|(_, v)| v))
    }
}

impl<K: Clone + Eq + Hash + 'static, V: Clone + PartialEq + 'static> IntoIterator
    for &ObservableMap<K, V>
{
    type Item = Result<(K, V)>;
    type IntoIter = Iter<K, V>;

    fn into_iter(self) -> Self::IntoIter {
        self.iter()
    }
}
