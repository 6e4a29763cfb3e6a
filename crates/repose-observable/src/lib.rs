//! # Observable collections
//!
//! Change-tracking containers for view models. Every container is a cheap,
//! cloneable handle (`Rc` inside) that reports its edits synchronously
//! through a [`ChangeSignal`] before the mutating call returns.
//!
//! - [`ObservableList<T>`] reports content changes and, separately, pure
//!   reorders.
//! - [`ObservableSet<T>`] reports adds, deletes and clears, and answers set
//!   algebra against any [`SetLike`] argument.
//! - [`ObservableMap<K, V>`] reports per-key sets and deletes, and clears.
//! - [`AggregateView<T>`] concatenates several lists into one read-only list.
//!
//! ## Edits
//!
//! Only edits with an observable effect are reported. Adding an existing set
//! member, writing an equal value, or sorting a sorted list emits nothing.
//!
//! ```rust
//! use repose_observable::*;
//! use std::{cell::RefCell, rc::Rc};
//!
//! let list = ObservableList::from(vec![1, 2, 3]);
//! let seen = Rc::new(RefCell::new(Vec::new()));
//! let _sub = list.changed().subscribe_scoped({
//!     let seen = seen.clone();
//!     move |_, change: &ListChange<i32>| seen.borrow_mut().push(change.clone())
//! });
//!
//! list.push(4);
//! list.set(0, 1).unwrap(); // same value: no event
//!
//! assert_eq!(seen.borrow().len(), 1);
//! assert_eq!(seen.borrow()[0].operation, ListOperation::Add);
//! assert_eq!(seen.borrow()[0].start, 3);
//! ```
//!
//! ## Iteration
//!
//! Iterators capture the container's [`ChangeToken`]. Once the container is
//! edited, every further step yields
//! [`CollectionError::MutatedDuringIteration`]:
//!
//! ```rust
//! use repose_observable::*;
//!
//! let list = ObservableList::from(vec![1, 2, 3]);
//! let mut iter = list.iter();
//! assert_eq!(iter.next(), Some(Ok(1)));
//! list.push(4);
//! assert_eq!(iter.next(), Some(Err(CollectionError::MutatedDuringIteration)));
//! ```
//!
//! Handlers run on the mutating call stack and may edit containers again;
//! no container borrow is held while a signal dispatches.

pub mod aggregate;
pub mod error;
pub mod list;
pub mod map;
pub mod set;
pub mod signal;
pub mod subscription;
pub mod token;

pub use aggregate::AggregateView;
pub use error::{CollectionError, Result};
pub use list::{ListChange, ListOperation, ListReorder, MovedItem, ObservableList};
pub use map::{MapChange, MapOperation, ObservableMap};
pub use set::{ObservableSet, SetChange, SetLike, SetOperation};
pub use signal::{ChangeSignal, HandlerId, SignalId};
pub use subscription::Subscription;
pub use token::ChangeToken;
