#![forbid(unsafe_code)]

//! Replay-latest observable values.
//!
//! # Design
//!
//! [`Behavior<T>`] pairs a current value with a [`Subject`]. Writes go through
//! [`set`](Behavior::set), which compares against the stored value and stays
//! silent when nothing changed. Subscribing delivers the current value
//! synchronously before any future notification, so a late subscriber sees the
//! present state instead of waiting for the next transition.
//!
//! Replay is deliberately synchronous and immediate rather than routed through
//! a scheduler: cold-start consistency is the point of the type.
//!
//! # Invariants
//!
//! 1. Setting a value equal to the current value emits nothing.
//! 2. A new subscriber's callback runs exactly once with the current value
//!    before it hears any subsequent `set`.
//! 3. All subscribers of one `Behavior` observe the same value sequence.

use std::cell::RefCell;
use std::rc::Rc;

use crate::subject::{Subject, Subscription};

struct BehaviorInner<T> {
    value: RefCell<T>,
    changed: Subject<T>,
}

/// A shared observable value that replays its latest state to new subscribers.
///
/// Cloning a `Behavior` creates a new handle to the **same** value and
/// subscriber list.
pub struct Behavior<T> {
    inner: Rc<BehaviorInner<T>>,
}

impl<T> Clone for Behavior<T> {
    fn clone(&self) -> Self {
        Self {
            inner: Rc::clone(&self.inner),
        }
    }
}

impl<T: std::fmt::Debug> std::fmt::Debug for Behavior<T> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Behavior")
            .field("value", &*self.inner.value.borrow())
            .field("subscribers", &self.inner.changed.subscriber_count())
            .finish()
    }
}

impl<T: Clone + PartialEq + 'static> Behavior<T> {
    /// Create a behavior holding `initial`.
    #[must_use]
    pub fn new(initial: T) -> Self {
        Self {
            inner: Rc::new(BehaviorInner {
                value: RefCell::new(initial),
                changed: Subject::new(),
            }),
        }
    }

    /// Clone out the current value.
    #[must_use]
    pub fn get(&self) -> T {
        self.inner.value.borrow().clone()
    }

    /// Access the current value by reference without cloning.
    ///
    /// # Panics
    ///
    /// Panics if the closure calls [`set`](Behavior::set) on the same
    /// behavior (re-entrant borrow).
    pub fn with<R>(&self, f: impl FnOnce(&T) -> R) -> R {
        f(&self.inner.value.borrow())
    }

    /// Store `value` and notify subscribers, unless it equals the current
    /// value, in which case nothing happens.
    pub fn set(&self, value: T) {
        {
            let current = self.inner.value.borrow();
            if *current == value {
                return;
            }
        }
        *self.inner.value.borrow_mut() = value.clone();
        self.inner.changed.emit(&value);
    }

    /// Attach a callback. It runs synchronously with the current value, then
    /// for every subsequent change until the guard is dropped.
    #[must_use = "dropping the subscription immediately detaches the callback"]
    pub fn subscribe(&self, callback: impl Fn(&T) + 'static) -> Subscription {
        callback(&self.inner.value.borrow());
        self.inner.changed.subscribe(callback)
    }

    /// Attach a callback without the initial replay. It only hears future
    /// changes.
    #[must_use = "dropping the subscription immediately detaches the callback"]
    pub fn subscribe_next(&self, callback: impl Fn(&T) + 'static) -> Subscription {
        self.inner.changed.subscribe(callback)
    }

    /// Number of live subscribers.
    #[must_use]
    pub fn subscriber_count(&self) -> usize {
        self.inner.changed.subscriber_count()
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
