#![forbid(unsafe_code)]

//! Multicast subjects with RAII subscription guards.
//!
//! # Design
//!
//! [`Subject<T>`] keeps its subscriber list as `Weak` callback pointers. The
//! matching [`Subscription`] holds the only strong reference, so dropping the
//! guard kills the callback and the subject cleans the dead slot lazily during
//! the next emission. Cloning a `Subject` produces another handle to the
//! **same** subscriber list.
//!
//! # Invariants
//!
//! 1. Subscribers are notified in registration order.
//! 2. Dropping a [`Subscription`] removes the callback before the next
//!    notification cycle.
//! 3. A callback may subscribe or unsubscribe during an emission without
//!    corrupting the cycle in progress; the new subscriber first hears the
//!    *next* emission.
//!
//! # Failure Modes
//!
//! - **Callback panics**: the panic propagates to the emitter and remaining
//!   subscribers in the cycle are skipped. Components that must isolate
//!   failures (commands) route errors as data instead of panicking.

use std::any::Any;
use std::cell::RefCell;
use std::rc::{Rc, Weak};

struct SubjectInner<T> {
    /// Subscriber callbacks, weakly held; the [`Subscription`] guard owns the
    /// strong reference.
    slots: RefCell<Vec<Weak<dyn Fn(&T)>>>,
}

/// A single-threaded multicast push channel.
///
/// Cloning shares the subscriber list. Values are pushed with
/// [`emit`](Subject::emit) and fan out to every live subscriber.
pub struct Subject<T> {
    inner: Rc<SubjectInner<T>>,
}

impl<T> Clone for Subject<T> {
    fn clone(&self) -> Self {
        Self {
            inner: Rc::clone(&self.inner),
        }
    }
}

impl<T> Default for Subject<T> {
    fn default() -> Self {
        Self::new()
    }
}

impl<T> std::fmt::Debug for Subject<T> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Subject")
            .field("subscribers", &self.subscriber_count())
            .finish()
    }
}

impl<T> Subject<T> {
    /// Create a subject with no subscribers.
    #[must_use]
    pub fn new() -> Self {
        Self {
            inner: Rc::new(SubjectInner {
                slots: RefCell::new(Vec::new()),
            }),
        }
    }

    /// Number of live subscribers.
    #[must_use]
    pub fn subscriber_count(&self) -> usize {
        self.inner
            .slots
            .borrow()
            .iter()
            .filter(|slot| slot.strong_count() > 0)
            .count()
    }

    /// Whether anyone is listening.
    #[must_use]
    pub fn has_subscribers(&self) -> bool {
        self.subscriber_count() > 0
    }

    /// Push one value to every live subscriber, in registration order.
    ///
    /// Dead slots (dropped subscriptions) are compacted first. The live
    /// callbacks are snapshotted before any of them runs, so a callback that
    /// subscribes or unsubscribes mid-cycle does not disturb the cycle.
    pub fn emit(&self, value: &T) {
        let snapshot: Vec<Rc<dyn Fn(&T)>> = {
            let mut slots = self.inner.slots.borrow_mut();
            slots.retain(|slot| slot.strong_count() > 0);
            slots.iter().filter_map(Weak::upgrade).collect()
        };
        for callback in snapshot {
            callback(value);
        }
    }
}

impl<T: 'static> Subject<T> {
    /// Attach a callback; it fires for every subsequent emission until the
    /// returned [`Subscription`] is dropped.
    #[must_use = "dropping the subscription immediately detaches the callback"]
    pub fn subscribe(&self, callback: impl Fn(&T) + 'static) -> Subscription {
        let strong: Rc<dyn Fn(&T)> = Rc::new(callback);
        self.inner.slots.borrow_mut().push(Rc::downgrade(&strong));
        Subscription::holding(strong)
    }
}

/// RAII guard for a [`Subject`] subscription.
///
/// Holds the only strong reference to the callback; dropping the guard
/// detaches the subscriber before the next notification cycle.
pub struct Subscription {
    keep: Option<Box<dyn Any>>,
}

impl Subscription {
    fn holding<T: 'static>(callback: Rc<dyn Fn(&T)>) -> Self {
        Self {
            keep: Some(Box::new(callback)),
        }
    }

    /// A subscription that guards nothing. Useful as a placeholder.
    #[must_use]
    pub fn empty() -> Self {
        Self { keep: None }
    }

    /// Keep the callback alive for the subject's whole lifetime.
    pub fn forget(mut self) {
        if let Some(keep) = self.keep.take() {
            std::mem::forget(keep);
        }
    }

    /// Detach now. Equivalent to dropping the guard.
    pub fn unsubscribe(self) {
        drop(self);
    }
}

impl std::fmt::Debug for Subscription {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Subscription")
            .field("active", &self.keep.is_some())
            .finish()
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
