//! # Validation
//!
//! Keeps a target's error in line with a chain of validators, re-running the
//! chain whenever something the validators depend on changes.
//!
//! - A [`ValidationTarget`] stores an error and reports its property changes.
//! - [`Trigger`]s turn list, set, map and target events into "validate again"
//!   requests.
//! - [`ObjectValidator`] binds a target, an observable validator chain and an
//!   observable set of triggers.
//!
//! A validator writing the error changes the target, but only its
//! [`ValidationProps`]; the target's own watch ignores those, so a pass never
//! triggers itself.

pub mod target;
pub mod tests;
pub mod trigger;
pub mod validator;

pub use target::{ErrorState, PropertyChange, ValidationProps, ValidationTarget};
pub use trigger::{
    ListChangeTrigger, ListItemTrigger, ListReorderTrigger, MapChangeTrigger, MapItemTrigger,
    SetChangeTrigger, SetItemTrigger, TargetTrigger, Trigger, TriggerKey, TriggerKind, TriggerRef,
};
pub use validator::{
    FnValidator, ObjectValidator, TargetPredicate, Validator, ValidatorConfig, ValidatorRef,
};
