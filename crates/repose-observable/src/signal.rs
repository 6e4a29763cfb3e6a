//! Synchronous publish/subscribe.
//!
//! A [`ChangeSignal`] holds an ordered list of handlers. `dispatch` copies the
//! current handlers out before calling any of them, so handlers may subscribe,
//! unsubscribe or dispatch again while running; those edits only affect the
//! next dispatch.

use std::cell::{Cell, RefCell};
use std::rc::{Rc, Weak};

use slotmap::{SlotMap, new_key_type};
use smallvec::SmallVec;

use crate::subscription::Subscription;

new_key_type! {
    /// Key of a handler registered on a [`ChangeSignal`].
    pub struct HandlerId;
}

thread_local! {
    static NEXT_SIGNAL: Cell<u64> = const { Cell::new(0) };
}

/// Process-unique identity of a signal, and of the container owning it.
#[derive(Clone, Copy, Debug, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct SignalId(u64);

type Handler<S, P> = Rc<dyn Fn(&S, &P)>;

struct Inner<S, P> {
    id: SignalId,
    handlers: SlotMap<HandlerId, Handler<S, P>>,
    // subscription order; slotmap iteration order is not stable across reuse
    order: Vec<HandlerId>,
}

/// Cloneable handle to a list of `Fn(&subject, &payload)` handlers.
pub struct ChangeSignal<S, P>(Rc<RefCell<Inner<S, P>>>);

impl<S, P> Clone for ChangeSignal<S, P> {
    fn clone(&self) -> Self {
        Self(self.0.clone())
    }
}

impl<S: 'static, P: 'static> Default for ChangeSignal<S, P> {
    fn default() -> Self {
        Self::new()
    }
}

impl<S, P> std::fmt::Debug for ChangeSignal<S, P> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let inner = self.0.borrow();
        f.debug_struct("ChangeSignal")
            .field("id", &inner.id)
            .field("subscribers", &inner.order.len())
            .finish()
    }
}

impl<S: 'static, P: 'static> ChangeSignal<S, P> {
    pub fn new() -> Self {
        let id = NEXT_SIGNAL.with(|next| {
            let id = next.get();
            next.set(id + 1);
            SignalId(id)
        });
        Self(Rc::new(RefCell::new(Inner {
            id,
            handlers: SlotMap::with_key(),
            order: Vec::new(),
        })))
    }

    pub fn id(&self) -> SignalId {
        self.0.borrow().id
    }

    pub fn subscribe(&self, handler: impl Fn(&S, &P) + 'static) -> HandlerId {
        let mut inner = self.0.borrow_mut();
        let id = inner.handlers.insert(Rc::new(handler));
        inner.order.push(id);
        id
    }

    /// Returns `false` if `id` was not (or no longer) registered.
    pub fn unsubscribe(&self, id: HandlerId) -> bool {
        let mut inner = self.0.borrow_mut();
        if inner.handlers.remove(id).is_none() {
            return false;
        }
        inner.order.retain(|h| *h != id);
        true
    }

    /// Like [`subscribe`](Self::subscribe), but the handler lives as long as
    /// the returned guard. The guard does not keep the signal alive.
    pub fn subscribe_scoped(&self, handler: impl Fn(&S, &P) + 'static) -> Subscription {
        let id = self.subscribe(handler);
        let weak: Weak<RefCell<Inner<S, P>>> = Rc::downgrade(&self.0);
        Subscription::new(move || {
            if let Some(inner) = weak.upgrade() {
                ChangeSignal(inner).unsubscribe(id);
            }
        })
    }

    pub fn subscriber_count(&self) -> usize {
        self.0.borrow().order.len()
    }

    pub fn is_empty(&self) -> bool {
        self.subscriber_count() == 0
    }

    /// Calls every handler registered at the moment of the call, in
    /// subscription order.
    pub fn dispatch(&self, subject: &S, payload: &P) {
        let handlers: SmallVec<[Handler<S, P>; 4]> = {
            let inner = self.0.borrow();
            inner
                .order
                .iter()
                .filter_map(|id| inner.handlers.get(*id).cloned())
                .collect()
        };
        if handlers.is_empty() {
            return;
        }
        log::trace!("dispatch on {:?} to {} handler(s)", self.id(), handlers.len());
        for handler in handlers {
            handler(subject, payload);
        }
    }
}
