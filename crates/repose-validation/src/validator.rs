//! Validator chains bound to a target.

use std::cell::{Cell, RefCell};
use std::collections::HashMap;
use std::rc::{Rc, Weak};

use repose_observable::{ObservableList, ObservableSet, Subscription};
use smallvec::SmallVec;

use crate::target::{PropertyChange, ValidationTarget};
use crate::trigger::{TargetTrigger, Trigger, TriggerKey, TriggerRef};

pub trait Validator<T: ValidationTarget> {
    /// Called when the validator joins a chain.
    fn on_add(&self, _target: &T) {}

    /// Called when the validator leaves a chain.
    fn on_remove(&self, _target: &T) {}

    fn validate(&self, target: &T) -> Option<T::Error>;
}

/// A [`Validator`] made from a closure.
pub struct FnValidator<F>(pub F);

impl<T, F> Validator<T> for FnValidator<F>
where
    T: ValidationTarget,
    F: Fn(&T) -> Option<T::Error>,
{
    fn validate(&self, target: &T) -> Option<T::Error> {
        (self.0)(target)
    }
}

/// Shared validator handle. Two handles are equal when they point at the same
/// validator.
pub struct ValidatorRef<T: ValidationTarget>(Rc<dyn Validator<T>>);

impl<T: ValidationTarget> ValidatorRef<T> {
    pub fn new(validator: impl Validator<T> + 'static) -> Self {
        Self(Rc::new(validator))
    }

    pub fn from_fn(f: impl Fn(&T) -> Option<T::Error> + 'static) -> Self {
        Self::new(FnValidator(f))
    }
}

impl<T: ValidationTarget> Clone for ValidatorRef<T> {
    fn clone(&self) -> Self {
        Self(self.0.clone())
    }
}

impl<T: ValidationTarget> PartialEq for ValidatorRef<T> {
    fn eq(&self, other: &Self) -> bool {
        std::ptr::addr_eq(Rc::as_ptr(&self.0), Rc::as_ptr(&other.0))
    }
}

impl<T: ValidationTarget> Eq for ValidatorRef<T> {}

impl<T: ValidationTarget> std::fmt::Debug for ValidatorRef<T> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_tuple("ValidatorRef")
            .field(&Rc::as_ptr(&self.0).cast::<()>())
            .finish()
    }
}

impl<T: ValidationTarget> std::ops::Deref for ValidatorRef<T> {
    type Target = dyn Validator<T>;

    fn deref(&self) -> &Self::Target {
        &*self.0
    }
}

pub type TargetPredicate<T> =
    Rc<dyn Fn(&T, &PropertyChange<<T as ValidationTarget>::Fields>) -> bool>;

pub struct ValidatorConfig<T: ValidationTarget> {
    /// Decides which target changes re-run validation. `None` re-runs on any
    /// change of the target's own fields.
    pub should_target_trigger_validation: Option<TargetPredicate<T>>,
    /// Upper bound on passes when validation is requested again mid-pass.
    pub max_passes: usize,
}

impl<T: ValidationTarget> Default for ValidatorConfig<T> {
    fn default() -> Self {
        Self {
            should_target_trigger_validation: None,
            max_passes: 8,
        }
    }
}

impl<T: ValidationTarget> Clone for ValidatorConfig<T> {
    fn clone(&self) -> Self {
        Self {
            should_target_trigger_validation: self.should_target_trigger_validation.clone(),
            max_passes: self.max_passes,
        }
    }
}

struct ValidatorInner<T: ValidationTarget> {
    target: T,
    validators: ObservableList<ValidatorRef<T>>,
    triggers: ObservableSet<TriggerRef>,
    trigger_subscriptions: RefCell<HashMap<TriggerKey, Subscription>>,
    running: Cell<bool>,
    dirty: Cell<bool>,
    max_passes: usize,
    target_trigger: TargetTrigger<T>,
    subscriptions: RefCell<SmallVec<[Subscription; 4]>>,
}

/// Keeps a target's error in line with a chain of validators.
///
/// The error is the first non-`None` result of the chain, in order. It is
/// recomputed whenever the chain, the trigger set, the target's own fields or
/// any trigger in the set changes.
///
/// Dropping the last handle releases every trigger.
pub struct ObjectValidator<T: ValidationTarget> {
    inner: Rc<ValidatorInner<T>>,
}

impl<T: ValidationTarget> Clone for ObjectValidator<T> {
    fn clone(&self) -> Self {
        Self {
            inner: self.inner.clone(),
        }
    }
}

impl<T: ValidationTarget> std::fmt::Debug for ObjectValidator<T> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ObjectValidator")
            .field("validators", &self.inner.validators.len())
            .field("triggers", &self.inner.triggers.len())
            .field("error", &self.inner.target.error())
            .finish()
    }
}

impl<T: ValidationTarget> ObjectValidator<T> {
    pub fn new(target: T) -> Self {
        Self::with_config(target, ValidatorConfig::default())
    }

    pub fn with_config(target: T, config: ValidatorConfig<T>) -> Self {
        let target_trigger = match config.should_target_trigger_validation {
            Some(predicate) => {
                TargetTrigger::with_predicate(&target, move |target, change| {
                    predicate(target, change)
                })
            }
            None => TargetTrigger::new(&target),
        };
        let inner = Rc::new(ValidatorInner {
            target,
            validators: ObservableList::new(),
            triggers: ObservableSet::new(),
            trigger_subscriptions: RefCell::new(HashMap::new()),
            running: Cell::new(false),
            dirty: Cell::new(false),
            max_passes: config.max_passes.max(1),
            target_trigger,
            subscriptions: RefCell::new(SmallVec::new()),
        });

        let weak = Rc::downgrade(&inner);
        let on_chain_changed = inner.validators.changed().subscribe_scoped(move |_, change| {
            if let Some(inner) = weak.upgrade() {
                for validator in &change.removed {
                    validator.on_remove(&inner.target);
                }
                for validator in &change.added {
                    validator.on_add(&inner.target);
                }
                inner.validate();
            }
        });
        let weak = Rc::downgrade(&inner);
        let on_chain_reordered = inner.validators.reordered().subscribe_scoped(move |_, _| {
            if let Some(inner) = weak.upgrade() {
                inner.validate();
            }
        });
        let weak = Rc::downgrade(&inner);
        let on_triggers_changed = inner.triggers.changed().subscribe_scoped(move |_, change| {
            if let Some(inner) = weak.upgrade() {
                for trigger in &change.removed {
                    inner.trigger_subscriptions.borrow_mut().remove(&trigger.key());
                }
                for trigger in &change.added {
                    inner.watch(&weak, trigger);
                }
                inner.validate();
            }
        });
        let weak = Rc::downgrade(&inner);
        let on_target_changed = inner
            .target_trigger
            .validation_triggered()
            .subscribe_scoped(move |_, _| {
                if let Some(inner) = weak.upgrade() {
                    inner.validate();
                }
            });
        inner.subscriptions.borrow_mut().extend([
            on_chain_changed,
            on_chain_reordered,
            on_triggers_changed,
            on_target_changed,
        ]);

        Self { inner }
    }

    pub fn target(&self) -> &T {
        &self.inner.target
    }

    /// The chain, in evaluation order. Editing it re-runs validation.
    pub fn validators(&self) -> &ObservableList<ValidatorRef<T>> {
        &self.inner.validators
    }

    /// Triggers that re-run validation. Editing the set re-runs validation.
    pub fn triggers(&self) -> &ObservableSet<TriggerRef> {
        &self.inner.triggers
    }

    /// Appends `validator` and adds `triggers` to the trigger set, then
    /// validates once.
    pub fn add(&self, validator: ValidatorRef<T>, triggers: impl IntoIterator<Item = TriggerRef>) {
        let outermost = !self.inner.running.get();
        {
            // requests made by the edits below are folded into one pass
            let _guard = PassGuard::enter(&self.inner.running);
            self.inner.validators.push(validator);
            self.inner.triggers.add_all(triggers);
        }
        if outermost {
            self.inner.validate();
        }
    }

    pub fn add_fn(
        &self,
        f: impl Fn(&T) -> Option<T::Error> + 'static,
        triggers: impl IntoIterator<Item = TriggerRef>,
    ) -> ValidatorRef<T> {
        let validator = ValidatorRef::from_fn(f);
        self.add(validator.clone(), triggers);
        validator
    }

    /// Removes every occurrence of `validator` from the chain. Triggers stay.
    pub fn remove(&self, validator: &ValidatorRef<T>) -> bool {
        let before = self.inner.validators.len();
        self.inner.validators.retain(|v| v != validator);
        self.inner.validators.len() != before
    }

    /// Runs the chain and stores the result on the target.
    pub fn validate(&self) -> Option<T::Error> {
        self.inner.validate()
    }

    /// Drops every trigger and validator, leaving the target valid. The
    /// target's own watch stays in place.
    pub fn reset(&self) {
        self.inner.triggers.clear();
        if self.inner.validators.is_empty() {
            self.inner.validate();
        } else {
            self.inner.validators.clear();
        }
    }
}

/// Marks a pass as running until dropped, including on unwind, then restores
/// the previous state.
struct PassGuard<'a> {
    running: &'a Cell<bool>,
    was_running: bool,
}

impl<'a> PassGuard<'a> {
    fn enter(running: &'a Cell<bool>) -> Self {
        Self {
            was_running: running.replace(true),
            running,
        }
    }
}

impl Drop for PassGuard<'_> {
    fn drop(&mut self) {
        self.running.set(self.was_running);
    }
}

impl<T: ValidationTarget> ValidatorInner<T> {
    fn watch(&self, weak: &Weak<Self>, trigger: &TriggerRef) {
        let weak = weak.clone();
        let subscription = trigger.validation_triggered().subscribe_scoped(move |key, _| {
            if let Some(inner) = weak.upgrade() {
                log::trace!("validation requested by {key:?}");
                inner.validate();
            }
        });
        self.trigger_subscriptions
            .borrow_mut()
            .insert(trigger.key(), subscription);
    }

    fn validate(&self) -> Option<T::Error> {
        if self.running.get() {
            // picked up by the running pass
            self.dirty.set(true);
            return self.target.error();
        }
        let _guard = PassGuard::enter(&self.running);
        let mut passes = 0;
        loop {
            self.dirty.set(false);
            passes += 1;
            let chain: SmallVec<[ValidatorRef<T>; 4]> =
                self.validators.with(|chain| chain.iter().cloned().collect());
            let error = chain.iter().find_map(|validator| validator.validate(&self.target));
            log::debug!(
                "validation pass {passes}: {} validator(s), error {:?}",
                chain.len(),
                error
            );
            self.target.set_error(error.clone());
            if !self.dirty.get() {
                return error;
            }
            if passes >= self.max_passes {
                log::warn!("validation still requested after {passes} passes; stopping");
                return error;
            }
        }
    }
}
