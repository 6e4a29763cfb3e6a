//! Read-only concatenation of several observable lists.
//!
//! The view keeps one slot per registered source, in registration order,
//! recording how many of that source's items the view currently holds. Offsets
//! are recomputed from those slots on every event rather than cached.

use std::cell::RefCell;
use std::collections::HashMap;
use std::rc::{Rc, Weak};

use smallvec::SmallVec;

use crate::list::{Iter, ListChange, ObservableList};
use crate::signal::{ChangeSignal, SignalId};
use crate::subscription::Subscription;
use crate::token::ChangeToken;

struct Slot<T: 'static> {
    source: ObservableList<T>,
    // items of `source` currently reflected in the view
    len: usize,
}

struct Watch {
    occurrences: usize,
    _subscriptions: [Subscription; 2],
}

/// One pending splice of the view: remove `removed` items at `at`, insert
/// `items` there.
struct Patch<T> {
    at: usize,
    removed: usize,
    items: Vec<T>,
}

struct AggregateInner<T: 'static> {
    items: ObservableList<T>,
    sources: ObservableList<ObservableList<T>>,
    slots: RefCell<Vec<Slot<T>>>,
    watched: RefCell<HashMap<SignalId, Watch>>,
    changed: ChangeSignal<AggregateView<T>, ListChange<T>>,
    subscriptions: RefCell<SmallVec<[Subscription; 3]>>,
}

/// A list made of other lists.
///
/// Edit the set of sources through [`sources`](Self::sources); edit the
/// contents through the sources themselves. A source may be registered more
/// than once and then appears once per registration.
///
/// Source reorders are applied as a replacement of that source's slice, so
/// the view reports them on [`changed`](Self::changed) and never emits a
/// reorder of its own.
pub struct AggregateView<T: 'static> {
    inner: Rc<AggregateInner<T>>,
}

impl<T> Clone for AggregateView<T> {
    fn clone(&self) -> Self {
        Self {
            inner: self.inner.clone(),
        }
    }
}

impl<T: Clone + PartialEq + 'static> Default for AggregateView<T> {
    fn default() -> Self {
        Self::new()
    }
}

impl<T: std::fmt::Debug + Clone + PartialEq + 'static> std::fmt::Debug for AggregateView<T> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("AggregateView")
            .field("items", &self.to_vec())
            .field("sources", &self.inner.sources.len())
            .finish()
    }
}

impl<T: Clone + PartialEq + 'static> AggregateView<T> {
    pub fn new() -> Self {
        Self::with_sources(std::iter::empty())
    }

    pub fn with_sources(sources: impl IntoIterator<Item = ObservableList<T>>) -> Self {
        let inner = Rc::new(AggregateInner {
            items: ObservableList::new(),
            sources: ObservableList::new(),
            slots: RefCell::new(Vec::new()),
            watched: RefCell::new(HashMap::new()),
            changed: ChangeSignal::new(),
            subscriptions: RefCell::new(SmallVec::new()),
        });

        let weak = Rc::downgrade(&inner);
        let on_sources_changed = inner.sources.changed().subscribe_scoped(move |_, change| {
            if let Some(inner) = weak.upgrade() {
                inner.sources_changed(&weak, change);
            }
        });
        let weak = Rc::downgrade(&inner);
        let on_sources_reordered = inner.sources.reordered().subscribe_scoped(move |_, _| {
            if let Some(inner) = weak.upgrade() {
                inner.rebuild();
            }
        });
        let weak = Rc::downgrade(&inner);
        let forward = inner.items.changed().subscribe_scoped(move |_, change| {
            if let Some(inner) = weak.upgrade() {
                let view = AggregateView { inner };
                view.inner.changed.dispatch(&view, change);
            }
        });
        inner
            .subscriptions
            .borrow_mut()
            .extend([on_sources_changed, on_sources_reordered, forward]);

        inner.sources.extend(sources);
        Self { inner }
    }

    /// The registered sources, in concatenation order.
    pub fn sources(&self) -> &ObservableList<ObservableList<T>> {
        &self.inner.sources
    }

    pub fn changed(&self) -> &ChangeSignal<AggregateView<T>, ListChange<T>> {
        &self.inner.changed
    }

    pub fn token(&self) -> ChangeToken {
        self.inner.items.token()
    }

    pub fn len(&self) -> usize {
        self.inner.items.len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    pub fn get(&self, index: usize) -> Option<T> {
        self.inner.items.get(index)
    }

    pub fn to_vec(&self) -> Vec<T> {
        self.inner.items.to_vec()
    }

    pub fn with<R>(&self, f: impl FnOnce(&[T]) -> R) -> R {
        self.inner.items.with(f)
    }

    /// Fails on its next step once any source (or the source list) changes.
    pub fn iter(&self) -> Iter<T> {
        self.inner.items.iter()
    }

    /// Resolves a view index to `(source index, index within that source)`.
    pub fn locate(&self, mut index: usize) -> Option<(usize, usize)> {
        let slots = self.inner.slots.borrow();
        for (source_index, slot) in slots.iter().enumerate() {
            if index < slot.len {
                return Some((source_index, index));
            }
            index -= slot.len;
        }
        None
    }

    /// Index in the view of the first item of the source at `source_index`.
    pub fn offset_of(&self, source_index: usize) -> Option<usize> {
        let slots = self.inner.slots.borrow();
        (source_index < slots.len()).then(|| slots[..source_index].iter().map(|s| s.len).sum())
    }
}

impl<T: Clone + PartialEq + 'static> AggregateInner<T> {
    fn sources_changed(&self, weak: &Weak<Self>, change: &ListChange<ObservableList<T>>) {
        let start = change.start;
        let patch = {
            let mut slots = self.slots.borrow_mut();
            let at: usize = slots[..start.min(slots.len())].iter().map(|s| s.len).sum();
            let mut items = Vec::new();
            let added: Vec<Slot<T>> = change
                .added
                .iter()
                .map(|source| {
                    let contents = source.to_vec();
                    let len = contents.len();
                    items.extend(contents);
                    Slot {
                        source: source.clone(),
                        len,
                    }
                })
                .collect();
            let end = (start + change.removed.len()).min(slots.len());
            let removed: usize = slots
                .splice(start.min(end)..end, added)
                .map(|slot| slot.len)
                .sum();
            Patch { at, removed, items }
        };

        for source in &change.added {
            self.watch(weak, source);
        }
        for source in &change.removed {
            self.release(source);
        }
        self.apply(patch);
    }

    fn source_changed(&self, source: &ObservableList<T>, change: &ListChange<T>) {
        let current = source.len();
        // length of the source just before this change
        let before = (current + change.removed.len()).checked_sub(change.added.len());
        let patches: SmallVec<[Patch<T>; 1]> = {
            let mut slots = self.slots.borrow_mut();
            // `offset` is where the slot lands once earlier patches apply,
            // `current_offset` where it sits in the view right now
            let mut offset = 0;
            let mut current_offset = 0;
            let mut patches = SmallVec::new();
            for slot in slots.iter_mut() {
                let at = current_offset + change.start;
                current_offset += slot.len;
                if slot.source == *source {
                    let in_step = before == Some(slot.len)
                        && change.start + change.removed.len() <= slot.len
                        && source.with(|now| {
                            now.get(change.start..change.start + change.added.len())
                                == Some(&change.added[..])
                        })
                        && self.items.with(|view| {
                            view.get(at..at + change.removed.len()) == Some(&change.removed[..])
                        });
                    let patch = if in_step {
                        Patch {
                            at: offset + change.start,
                            removed: change.removed.len(),
                            items: change.added.clone(),
                        }
                    } else {
                        log::debug!(
                            "aggregate slot out of step (holds {}, source had {:?}); resyncing",
                            slot.len,
                            before
                        );
                        Patch {
                            at: offset,
                            removed: slot.len,
                            items: source.to_vec(),
                        }
                    };
                    slot.len = current;
                    patches.push(patch);
                }
                offset += slot.len;
            }
            patches
        };
        for patch in patches {
            self.apply(patch);
        }
    }

    fn source_reordered(&self, source: &ObservableList<T>) {
        let patches: SmallVec<[Patch<T>; 1]> = {
            let mut slots = self.slots.borrow_mut();
            let mut offset = 0;
            let mut patches = SmallVec::new();
            for slot in slots.iter_mut() {
                if slot.source == *source {
                    patches.push(Patch {
                        at: offset,
                        removed: slot.len,
                        items: source.to_vec(),
                    });
                    slot.len = source.len();
                }
                offset += slot.len;
            }
            patches
        };
        for patch in patches {
            self.apply(patch);
        }
    }

    /// Replaces the whole view with the concatenation of the current sources.
    fn rebuild(&self) {
        let items: Vec<T> = {
            let mut slots = self.slots.borrow_mut();
            *slots = self
                .sources
                .to_vec()
                .into_iter()
                .map(|source| Slot {
                    len: source.len(),
                    source,
                })
                .collect();
            slots.iter().flat_map(|slot| slot.source.to_vec()).collect()
        };
        let len = self.items.len();
        if let Err(err) = self.items.splice(0, len, items) {
            log::error!("aggregate rebuild failed: {err}");
        }
    }

    fn apply(&self, patch: Patch<T>) {
        if let Err(err) = self.items.splice(patch.at, patch.removed, patch.items) {
            log::debug!("aggregate patch rejected ({err}); rebuilding");
            self.rebuild();
        }
    }

    fn watch(&self, weak: &Weak<Self>, source: &ObservableList<T>) {
        let mut watched = self.watched.borrow_mut();
        if let Some(watch) = watched.get_mut(&source.id()) {
            watch.occurrences += 1;
            return;
        }
        let on_change = {
            let weak = weak.clone();
            source.changed().subscribe_scoped(move |source, change| {
                if let Some(inner) = weak.upgrade() {
                    inner.source_changed(source, change);
                }
            })
        };
        let on_reorder = {
            let weak = weak.clone();
            source.reordered().subscribe_scoped(move |source, _| {
                if let Some(inner) = weak.upgrade() {
                    inner.source_reordered(source);
                }
            })
        };
        watched.insert(
            source.id(),
            Watch {
                occurrences: 1,
                _subscriptions: [on_change, on_reorder],
            },
        );
    }

    fn release(&self, source: &ObservableList<T>) {
        let dropped = {
            let mut watched = self.watched.borrow_mut();
            let Some(watch) = watched.get_mut(&source.id()) else {
                return;
            };
            watch.occurrences -= 1;
            if watch.occurrences > 0 {
                return;
            }
            watched.remove(&source.id())
        };
        drop(dropped);
    }
}
