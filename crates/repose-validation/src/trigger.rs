//! Validation triggers.
//!
//! A trigger watches one change source and re-emits selected events as a
//! payload-free "validation requested" signal. Triggers are keyed by what
//! they watch, so a set of [`TriggerRef`]s holds at most one trigger per
//! source and adapter kind.
//!
//! Dropping a trigger unsubscribes it from its source.

use std::cell::RefCell;
use std::collections::HashMap;
use std::hash::{Hash, Hasher};
use std::marker::PhantomData;
use std::rc::Rc;

use repose_observable::{
    ChangeSignal, ListChange, ListReorder, MapChange, ObservableList, ObservableMap,
    ObservableSet, SetChange, SignalId, Subscription,
};

use crate::target::{PropertyChange, ValidationTarget};

#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum TriggerKind {
    Target,
    ListChange,
    ListReorder,
    SetChange,
    MapChange,
    ListItems,
    SetItems,
    MapItems,
}

/// What a trigger watches: the source's signal and the adapter kind.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub struct TriggerKey {
    pub kind: TriggerKind,
    pub source: SignalId,
}

pub trait Trigger {
    fn key(&self) -> TriggerKey;

    /// Fires with the trigger's key whenever its source asks for validation.
    fn validation_triggered(&self) -> &ChangeSignal<TriggerKey, ()>;
}

/// Shared, type-erased trigger. Equality and hashing use [`TriggerKey`].
#[derive(Clone)]
pub struct TriggerRef(Rc<dyn Trigger>);

impl TriggerRef {
    pub fn new(trigger: impl Trigger + 'static) -> Self {
        Self(Rc::new(trigger))
    }

    pub fn key(&self) -> TriggerKey {
        self.0.key()
    }

    pub fn validation_triggered(&self) -> &ChangeSignal<TriggerKey, ()> {
        self.0.validation_triggered()
    }

    pub fn target<T: ValidationTarget>(target: &T) -> Self {
        Self::new(TargetTrigger::new(target))
    }

    pub fn list<T: Clone + PartialEq + 'static>(list: &ObservableList<T>) -> Self {
        Self::new(ListChangeTrigger::new(list))
    }

    pub fn list_reorder<T: Clone + PartialEq + 'static>(list: &ObservableList<T>) -> Self {
        Self::new(ListReorderTrigger::new(list))
    }

    pub fn set<T: Clone + Eq + Hash + 'static>(set: &ObservableSet<T>) -> Self {
        Self::new(SetChangeTrigger::new(set))
    }

    pub fn map<K: Clone + Eq + Hash + 'static, V: Clone + PartialEq + 'static>(
        map: &ObservableMap<K, V>,
    ) -> Self {
        Self::new(MapChangeTrigger::new(map))
    }

    /// Watches the triggers `selector` picks from the list's items.
    ///
    /// The trigger is keyed by the container alone, so a second item trigger
    /// on the same container equals this one whatever its selector, and only
    /// one of them survives in a trigger set.
    pub fn list_items<T: Clone + PartialEq + 'static>(
        list: &ObservableList<T>,
        selector: impl Fn(&T) -> Option<TriggerRef> + 'static,
    ) -> Self {
        Self::new(ListItemTrigger::new(list, selector))
    }

    /// Watches the triggers `selector` picks from the set's items.
    ///
    /// The trigger is keyed by the container alone, so a second item trigger
    /// on the same container equals this one whatever its selector, and only
    /// one of them survives in a trigger set.
    pub fn set_items<T: Clone + Eq + Hash + 'static>(
        set: &ObservableSet<T>,
        selector: impl Fn(&T) -> Option<TriggerRef> + 'static,
    ) -> Self {
        Self::new(SetItemTrigger::new(set, selector))
    }

    /// Watches the triggers `selector` picks from the map's entry values.
    ///
    /// The trigger is keyed by the container alone, so a second item trigger
    /// on the same container equals this one whatever its selector, and only
    /// one of them survives in a trigger set.
    pub fn map_items<K: Clone + Eq + Hash + 'static, V: Clone + PartialEq + 'static>(
        map: &ObservableMap<K, V>,
        selector: impl Fn(&V) -> Option<TriggerRef> + 'static,
    ) -> Self {
        Self::new(MapItemTrigger::new(map, selector))
    }
}

impl PartialEq for TriggerRef {
    fn eq(&self, other: &Self) -> bool {
        self.key() == other.key()
    }
}

impl Eq for TriggerRef {}

impl Hash for TriggerRef {
    fn hash<H: Hasher>(&self, state: &mut H) {
        self.key().hash(state);
    }
}

impl std::fmt::Debug for TriggerRef {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_tuple("TriggerRef").field(&self.key()).finish()
    }
}

/// Signal plus key shared by every adapter.
struct Relay {
    key: TriggerKey,
    triggered: ChangeSignal<TriggerKey, ()>,
}

impl Relay {
    fn new(kind: TriggerKind, source: SignalId) -> Self {
        Self {
            key: TriggerKey { kind, source },
            triggered: ChangeSignal::new(),
        }
    }

    /// Forwards events of `signal` that pass `predicate`.
    fn forward<S: 'static, E: 'static>(
        &self,
        signal: &ChangeSignal<S, E>,
        predicate: impl Fn(&S, &E) -> bool + 'static,
    ) -> Subscription {
        let key = self.key;
        let triggered = self.triggered.clone();
        signal.subscribe_scoped(move |source, event| {
            if predicate(source, event) {
                triggered.dispatch(&key, &());
            }
        })
    }
}

macro_rules! impl_trigger {
    ($($ty:ident<$($p:ident),+>),+ $(,)?) => {
        $(
            impl<$($p: 'static),+> Trigger for $ty<$($p),+> {
                fn key(&self) -> TriggerKey {
                    self.relay.key
                }

                fn validation_triggered(&self) -> &ChangeSignal<TriggerKey, ()> {
                    &self.relay.triggered
                }
            }
        )+
    };
}

/// Watches a target's property changes.
///
/// By default any change outside the [`ValidationProps`](crate::ValidationProps)
/// requests validation; the validator writing the error never does.
pub struct TargetTrigger<T: ValidationTarget> {
    relay: Relay,
    _subscription: Subscription,
    _target: PhantomData<fn(&T)>,
}

impl<T: ValidationTarget> TargetTrigger<T> {
    pub fn new(target: &T) -> Self {
        Self::with_predicate(target, |_, change| change.touches_fields())
    }

    pub fn with_predicate(
        target: &T,
        predicate: impl Fn(&T, &PropertyChange<T::Fields>) -> bool + 'static,
    ) -> Self {
        let relay = Relay::new(TriggerKind::Target, target.property_changed().id());
        let subscription = relay.forward(target.property_changed(), predicate);
        Self {
            relay,
            _subscription: subscription,
            _target: PhantomData,
        }
    }
}

/// Watches content changes of a list.
pub struct ListChangeTrigger<T: 'static> {
    relay: Relay,
    _subscription: Subscription,
    _items: PhantomData<fn(&T)>,
}

impl<T: Clone + PartialEq + 'static> ListChangeTrigger<T> {
    pub fn new(list: &ObservableList<T>) -> Self {
        Self::with_predicate(list, |_, _| true)
    }

    pub fn with_predicate(
        list: &ObservableList<T>,
        predicate: impl Fn(&ObservableList<T>, &ListChange<T>) -> bool + 'static,
    ) -> Self {
        let relay = Relay::new(TriggerKind::ListChange, list.id());
        let subscription = relay.forward(list.changed(), predicate);
        Self {
            relay,
            _subscription: subscription,
            _items: PhantomData,
        }
    }
}

/// Watches reorders of a list.
pub struct ListReorderTrigger<T: 'static> {
    relay: Relay,
    _subscription: Subscription,
    _items: PhantomData<fn(&T)>,
}

impl<T: Clone + PartialEq + 'static> ListReorderTrigger<T> {
    pub fn new(list: &ObservableList<T>) -> Self {
        Self::with_predicate(list, |_, _| true)
    }

    pub fn with_predicate(
        list: &ObservableList<T>,
        predicate: impl Fn(&ObservableList<T>, &ListReorder<T>) -> bool + 'static,
    ) -> Self {
        let relay = Relay::new(TriggerKind::ListReorder, list.id());
        let subscription = relay.forward(list.reordered(), predicate);
        Self {
            relay,
            _subscription: subscription,
            _items: PhantomData,
        }
    }
}

pub struct SetChangeTrigger<T: 'static> {
    relay: Relay,
    _subscription: Subscription,
    _items: PhantomData<fn(&T)>,
}

impl<T: Clone + Eq + Hash + 'static> SetChangeTrigger<T> {
    pub fn new(set: &ObservableSet<T>) -> Self {
        Self::with_predicate(set, |_, _| true)
    }

    pub fn with_predicate(
        set: &ObservableSet<T>,
        predicate: impl Fn(&ObservableSet<T>, &SetChange<T>) -> bool + 'static,
    ) -> Self {
        let relay = Relay::new(TriggerKind::SetChange, set.id());
        let subscription = relay.forward(set.changed(), predicate);
        Self {
            relay,
            _subscription: subscription,
            _items: PhantomData,
        }
    }
}

pub struct MapChangeTrigger<K: 'static, V: 'static> {
    relay: Relay,
    _subscription: Subscription,
    _entries: PhantomData<fn(&K, &V)>,
}

impl<K: Clone + Eq + Hash + 'static, V: Clone + PartialEq + 'static> MapChangeTrigger<K, V> {
    pub fn new(map: &ObservableMap<K, V>) -> Self {
        Self::with_predicate(map, |_, _| true)
    }

    pub fn with_predicate(
        map: &ObservableMap<K, V>,
        predicate: impl Fn(&ObservableMap<K, V>, &MapChange<K, V>) -> bool + 'static,
    ) -> Self {
        let relay = Relay::new(TriggerKind::MapChange, map.id());
        let subscription = relay.forward(map.changed(), predicate);
        Self {
            relay,
            _subscription: subscription,
            _entries: PhantomData,
        }
    }
}

struct ItemWatch {
    occurrences: usize,
    _trigger: TriggerRef,
    _subscription: Subscription,
}

/// Reference-counted subscriptions to the triggers of a container's items.
///
/// Each distinct item trigger is subscribed once, however many entries
/// select it, and stays subscribed until its last occurrence leaves.
struct ItemTriggers {
    triggered: ChangeSignal<TriggerKey, ()>,
    key: TriggerKey,
    watched: RefCell<HashMap<TriggerKey, ItemWatch>>,
}

impl ItemTriggers {
    fn new(relay: &Relay) -> Rc<Self> {
        Rc::new(Self {
            triggered: relay.triggered.clone(),
            key: relay.key,
            watched: RefCell::new(HashMap::new()),
        })
    }

    fn acquire(&self, trigger: Option<TriggerRef>) {
        let Some(trigger) = trigger else {
            return;
        };
        let mut watched = self.watched.borrow_mut();
        if let Some(watch) = watched.get_mut(&trigger.key()) {
            watch.occurrences += 1;
            return;
        }
        let key = self.key;
        let triggered = self.triggered.clone();
        let subscription = trigger
            .validation_triggered()
            .subscribe_scoped(move |_, _| triggered.dispatch(&key, &()));
        watched.insert(
            trigger.key(),
            ItemWatch {
                occurrences: 1,
                _trigger: trigger,
                _subscription: subscription,
            },
        );
    }

    fn release(&self, trigger: Option<TriggerRef>) {
        let Some(trigger) = trigger else {
            return;
        };
        let dropped = {
            let mut watched = self.watched.borrow_mut();
            let Some(watch) = watched.get_mut(&trigger.key()) else {
                return;
            };
            watch.occurrences -= 1;
            if watch.occurrences > 0 {
                return;
            }
            watched.remove(&trigger.key())
        };
        drop(dropped);
    }

    fn fire(&self) {
        self.triggered.dispatch(&self.key, &());
    }

    fn watched_count(&self) -> usize {
        self.watched.borrow().len()
    }
}

type Selector<T> = Rc<dyn Fn(&T) -> Option<TriggerRef>>;

/// Watches the triggers selected from a list's items, plus the list's own
/// content changes.
///
/// Item-trigger events are forwarded once per event regardless of how many
/// entries select the same trigger. Content changes request validation when
/// the predicate (default: always) agrees.
pub struct ListItemTrigger<T: 'static> {
    relay: Relay,
    items: Rc<ItemTriggers>,
    _subscription: Subscription,
    _items: PhantomData<fn(&T)>,
}

impl<T: Clone + PartialEq + 'static> ListItemTrigger<T> {
    pub fn new(
        list: &ObservableList<T>,
        selector: impl Fn(&T) -> Option<TriggerRef> + 'static,
    ) -> Self {
        Self::with_predicate(list, selector, |_, _| true)
    }

    pub fn with_predicate(
        list: &ObservableList<T>,
        selector: impl Fn(&T) -> Option<TriggerRef> + 'static,
        predicate: impl Fn(&ObservableList<T>, &ListChange<T>) -> bool + 'static,
    ) -> Self {
        let relay = Relay::new(TriggerKind::ListItems, list.id());
        let items = ItemTriggers::new(&relay);
        let selector: Selector<T> = Rc::new(selector);
        list.with(|current| current.iter().for_each(|item| items.acquire(selector(item))));

        let subscription = {
            let items = items.clone();
            list.changed().subscribe_scoped(move |list, change| {
                for item in &change.removed {
                    items.release(selector(item));
                }
                for item in &change.added {
                    items.acquire(selector(item));
                }
                if predicate(list, change) {
                    items.fire();
                }
            })
        };
        Self {
            relay,
            items,
            _subscription: subscription,
            _items: PhantomData,
        }
    }

    /// Number of distinct item triggers currently subscribed.
    pub fn watched_count(&self) -> usize {
        self.items.watched_count()
    }
}

/// Set counterpart of [`ListItemTrigger`].
pub struct SetItemTrigger<T: 'static> {
    relay: Relay,
    items: Rc<ItemTriggers>,
    _subscription: Subscription,
    _items: PhantomData<fn(&T)>,
}

impl<T: Clone + Eq + Hash + 'static> SetItemTrigger<T> {
    pub fn new(set: &ObservableSet<T>, selector: impl Fn(&T) -> Option<TriggerRef> + 'static) -> Self {
        Self::with_predicate(set, selector, |_, _| true)
    }

    pub fn with_predicate(
        set: &ObservableSet<T>,
        selector: impl Fn(&T) -> Option<TriggerRef> + 'static,
        predicate: impl Fn(&ObservableSet<T>, &SetChange<T>) -> bool + 'static,
    ) -> Self {
        let relay = Relay::new(TriggerKind::SetItems, set.id());
        let items = ItemTriggers::new(&relay);
        let selector: Selector<T> = Rc::new(selector);
        for item in set.to_vec() {
            items.acquire(selector(&item));
        }

        let subscription = {
            let items = items.clone();
            set.changed().subscribe_scoped(move |set, change| {
                for item in &change.removed {
                    items.release(selector(item));
                }
                for item in &change.added {
                    items.acquire(selector(item));
                }
                if predicate(set, change) {
                    items.fire();
                }
            })
        };
        Self {
            relay,
            items,
            _subscription: subscription,
            _items: PhantomData,
        }
    }

    pub fn watched_count(&self) -> usize {
        self.items.watched_count()
    }
}

/// Map counterpart of [`ListItemTrigger`]; the selector sees entry values.
pub struct MapItemTrigger<K: 'static, V: 'static> {
    relay: Relay,
    items: Rc<ItemTriggers>,
    _subscription: Subscription,
    _entries: PhantomData<fn(&K, &V)>,
}

impl<K: Clone + Eq + Hash + 'static, V: Clone + PartialEq + 'static> MapItemTrigger<K, V> {
    pub fn new(
        map: &ObservableMap<K, V>,
        selector: impl Fn(&V) -> Option<TriggerRef> + 'static,
    ) -> Self {
        Self::with_predicate(map, selector, |_, _| true)
    }

    pub fn with_predicate(
        map: &ObservableMap<K, V>,
        selector: impl Fn(&V) -> Option<TriggerRef> + 'static,
        predicate: impl Fn(&ObservableMap<K, V>, &MapChange<K, V>) -> bool + 'static,
    ) -> Self {
        let relay = Relay::new(TriggerKind::MapItems, map.id());
        let items = ItemTriggers::new(&relay);
        let selector: Selector<V> = Rc::new(selector);
        for (_, value) in map.to_vec() {
            items.acquire(selector(&value));
        }

        let subscription = {
            let items = items.clone();
            map.changed().subscribe_scoped(move |map, change| {
                match change {
                    MapChange::Set { added, removed, .. } => {
                        if let Some(removed) = removed {
                            items.release(selector(removed));
                        }
                        items.acquire(selector(added));
                    }
                    MapChange::Delete { removed, .. } => items.release(selector(removed)),
                    MapChange::Clear { removed } => {
                        for (_, value) in removed {
                            items.release(selector(value));
                        }
                    }
                }
                if predicate(map, change) {
                    items.fire();
                }
            })
        };
        Self {
            relay,
            items,
            _subscription: subscription,
            _entries: PhantomData,
        }
    }

    pub fn watched_count(&self) -> usize {
        self.items.watched_count()
    }
}

impl<T: ValidationTarget> Trigger for TargetTrigger<T> {
    fn key(&self) -> TriggerKey {
        self.relay.key
    }

    fn validation_triggered(&self) -> &ChangeSignal<TriggerKey, ()> {
        &self.relay.triggered
    }
}

impl_trigger! {
    ListChangeTrigger<T>,
    ListReorderTrigger<T>,
    SetChangeTrigger<T>,
    MapChangeTrigger<K, V>,
    ListItemTrigger<T>,
    SetItemTrigger<T>,
    MapItemTrigger<K, V>,
}
