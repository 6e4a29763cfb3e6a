//! What a validator needs from the object it validates.

use std::cell::RefCell;
use std::fmt::Debug;

use bitflags::{Flags, bitflags};
use repose_observable::ChangeSignal;

bitflags! {
    /// The fields a validator derives on its target.
    #[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Hash)]
    pub struct ValidationProps: u8 {
        const ERROR = 1;
        const IS_VALID = 1 << 1;
        const IS_INVALID = 1 << 2;
    }
}

/// Which properties of a target changed. `F` is the target's own field set.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct PropertyChange<F> {
    pub fields: F,
    pub validation: ValidationProps,
}

impl<F: Flags + Copy> PropertyChange<F> {
    pub fn fields(fields: F) -> Self {
        Self {
            fields,
            validation: ValidationProps::empty(),
        }
    }

    pub fn validation(validation: ValidationProps) -> Self {
        Self {
            fields: F::empty(),
            validation,
        }
    }

    /// `true` if anything other than the validation fields changed.
    pub fn touches_fields(&self) -> bool {
        !self.fields.is_empty()
    }
}

/// An object that can be validated: it holds an error and reports property
/// changes, including changes of the error itself.
pub trait ValidationTarget: Clone + 'static {
    type Fields: Flags + Copy + Debug + 'static;
    type Error: Clone + PartialEq + Debug + 'static;

    fn error(&self) -> Option<Self::Error>;

    /// Must dispatch a [`PropertyChange`] carrying only validation flags when
    /// the error actually changes. [`ErrorState`] computes those flags.
    fn set_error(&self, error: Option<Self::Error>);

    fn property_changed(&self) -> &ChangeSignal<Self, PropertyChange<Self::Fields>>;

    fn is_valid(&self) -> bool {
        self.error().is_none()
    }

    fn is_invalid(&self) -> bool {
        !self.is_valid()
    }
}

/// Error storage for [`ValidationTarget`] implementors.
#[derive(Debug)]
pub struct ErrorState<E> {
    error: RefCell<Option<E>>,
}

impl<E> Default for ErrorState<E> {
    fn default() -> Self {
        Self {
            error: RefCell::new(None),
        }
    }
}

impl<E: Clone + PartialEq> ErrorState<E> {
    pub fn get(&self) -> Option<E> {
        self.error.borrow().clone()
    }

    /// Stores `error` and returns the validation fields that changed; empty
    /// when `error` equals the stored one.
    pub fn replace(&self, error: Option<E>) -> ValidationProps {
        let mut current = self.error.borrow_mut();
        if *current == error {
            return ValidationProps::empty();
        }
        let mut changed = ValidationProps::ERROR;
        if current.is_some() != error.is_some() {
            changed |= ValidationProps::IS_VALID | ValidationProps::IS_INVALID;
        }
        *current = error;
        changed
    }
}
