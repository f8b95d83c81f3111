#![forbid(unsafe_code)]

//! Observable ordered collections.
//!
//! # Design
//!
//! [`TrackedVec<T>`] wraps a `Vec<T>` in shared, reference-counted storage and
//! announces every mutation through notification streams:
//!
//! - `before_add` / `after_add` and `before_remove` / `after_remove` carry a
//!   [`CollectionChange`] per affected item;
//! - `count_changing` carries the count before the mutation, `count_changed`
//!   the count after it.
//!
//! Mutating methods take `&self` (the interior is shared), and every internal
//! borrow is released before a stream fires, so subscribers may read the
//! collection from inside a callback. Mutating it from inside a callback is
//! not supported: the interleaved notification pairs it would produce are
//! exactly what the ordering contract rules out.
//!
//! # Invariants
//!
//! 1. `before_*` fires strictly before the mutation, `after_*` strictly
//!    after; the pairs of two operations never interleave.
//! 2. `count_changing`/`count_changed` fire only when the count actually
//!    changes, and always carry the pre-/post-mutation count respectively.
//! 3. Bulk insertion announces each item individually, in sequence order.
//! 4. A failed index operation leaves the collection untouched.
//!
//! # Failure Modes
//!
//! - **Out-of-range index**: [`CollectionError::IndexOutOfRange`], returned
//!   synchronously; no stream fires, no partial mutation.
//! - **Item mutated while untracked**: with change tracking disabled, item
//!   writes are invisible to the collection. Enabling tracking only wires
//!   *current and future* items; it does not replay missed records.

use std::cell::RefCell;
use std::rc::Rc;

use crate::change::{ChangeRecord, Notifying};
use crate::subject::{Subject, Subscription};

/// One item-level mutation of a [`TrackedVec`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CollectionChange<T> {
    /// Position the mutation applies to.
    pub index: usize,
    /// The affected item.
    pub item: T,
}

/// Errors from direct index operations.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum CollectionError {
    /// The index is outside the collection bounds.
    IndexOutOfRange {
        /// Requested index.
        index: usize,
        /// Collection length at the time of the call.
        len: usize,
    },
}

impl std::fmt::Display for CollectionError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::IndexOutOfRange { index, len } => {
                write!(f, "index {} out of range (length {})", index, len)
            }
        }
    }
}

impl std::error::Error for CollectionError {}

/// Subscriptions keeping one tracked item's change streams wired into the
/// collection's re-broadcast streams.
struct ItemTracking {
    _changing: Subscription,
    _changed: Subscription,
}

type TrackHook<T> = Box<dyn Fn(&T) -> ItemTracking>;

struct TrackedVecInner<T> {
    items: RefCell<Vec<T>>,
    item_tracking: RefCell<Vec<ItemTracking>>,
    track_hook: RefCell<Option<TrackHook<T>>>,
    before_add: Subject<CollectionChange<T>>,
    after_add: Subject<CollectionChange<T>>,
    before_remove: Subject<CollectionChange<T>>,
    after_remove: Subject<CollectionChange<T>>,
    count_changing: Subject<usize>,
    count_changed: Subject<usize>,
    item_changing: Subject<ChangeRecord>,
    item_changed: Subject<ChangeRecord>,
}

/// An ordered, index-addressable sequence with mutation notification streams.
///
/// Cloning a `TrackedVec` creates a new handle to the **same** storage and
/// streams. Instances belong to a single logical owner thread.
pub struct TrackedVec<T> {
    inner: Rc<TrackedVecInner<T>>,
}

impl<T> Clone for TrackedVec<T> {
    fn clone(&self) -> Self {
        Self {
            inner: Rc::clone(&self.inner),
        }
    }
}

impl<T> Default for TrackedVec<T> {
    fn default() -> Self {
        Self::new()
    }
}

impl<T: std::fmt::Debug> std::fmt::Debug for TrackedVec<T> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("TrackedVec")
            .field("items", &*self.inner.items.borrow())
            .field("tracking", &self.change_tracking_enabled())
            .finish()
    }
}

impl<T> TrackedVec<T> {
    /// Create an empty collection.
    #[must_use]
    pub fn new() -> Self {
        Self {
            inner: Rc::new(TrackedVecInner {
                items: RefCell::new(Vec::new()),
                item_tracking: RefCell::new(Vec::new()),
                track_hook: RefCell::new(None),
                before_add: Subject::new(),
                after_add: Subject::new(),
                before_remove: Subject::new(),
                after_remove: Subject::new(),
                count_changing: Subject::new(),
                count_changed: Subject::new(),
                item_changing: Subject::new(),
                item_changed: Subject::new(),
            }),
        }
    }

    /// Current number of items.
    #[must_use]
    pub fn len(&self) -> usize {
        self.inner.items.borrow().len()
    }

    /// Whether the collection is empty.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.inner.items.borrow().is_empty()
    }

    /// Read access to the items without cloning.
    ///
    /// # Panics
    ///
    /// Panics if the closure mutates the same collection (re-entrant borrow).
    pub fn with<R>(&self, f: impl FnOnce(&[T]) -> R) -> R {
        f(&self.inner.items.borrow())
    }

    /// Fires with the affected item before it is inserted.
    #[must_use]
    pub fn before_add(&self) -> &Subject<CollectionChange<T>> {
        &self.inner.before_add
    }

    /// Fires with the affected item after it was inserted.
    #[must_use]
    pub fn after_add(&self) -> &Subject<CollectionChange<T>> {
        &self.inner.after_add
    }

    /// Fires with the affected item before it is removed.
    #[must_use]
    pub fn before_remove(&self) -> &Subject<CollectionChange<T>> {
        &self.inner.before_remove
    }

    /// Fires with the affected item after it was removed.
    #[must_use]
    pub fn after_remove(&self) -> &Subject<CollectionChange<T>> {
        &self.inner.after_remove
    }

    /// Fires with the pre-mutation count, before the mutation.
    #[must_use]
    pub fn count_changing(&self) -> &Subject<usize> {
        &self.inner.count_changing
    }

    /// Fires with the post-mutation count, after the mutation.
    #[must_use]
    pub fn count_changed(&self) -> &Subject<usize> {
        &self.inner.count_changed
    }

    /// Re-broadcast of contained items' `changing` streams (requires change
    /// tracking).
    #[must_use]
    pub fn item_changing(&self) -> &Subject<ChangeRecord> {
        &self.inner.item_changing
    }

    /// Re-broadcast of contained items' `changed` streams (requires change
    /// tracking).
    #[must_use]
    pub fn item_changed(&self) -> &Subject<ChangeRecord> {
        &self.inner.item_changed
    }

    /// Whether per-item change re-broadcast is active.
    #[must_use]
    pub fn change_tracking_enabled(&self) -> bool {
        self.inner.track_hook.borrow().is_some()
    }
}

impl<T: Clone + 'static> TrackedVec<T> {
    /// Create a collection from an initial sequence. No streams fire for the
    /// initial contents.
    #[must_use]
    pub fn from_iter(items: impl IntoIterator<Item = T>) -> Self {
        let vec = Self::new();
        *vec.inner.items.borrow_mut() = items.into_iter().collect();
        vec
    }

    /// Clone out the item at `index`.
    #[must_use]
    pub fn get(&self, index: usize) -> Option<T> {
        self.inner.items.borrow().get(index).cloned()
    }

    /// Clone out the last item.
    #[must_use]
    pub fn last(&self) -> Option<T> {
        self.inner.items.borrow().last().cloned()
    }

    /// Clone out the whole sequence.
    #[must_use]
    pub fn to_vec(&self) -> Vec<T> {
        self.inner.items.borrow().clone()
    }

    /// Append `item` at the end.
    pub fn push(&self, item: T) {
        let len = self.len();
        self.insert_at(len, item);
    }

    /// Insert `item` at `index`, shifting later items right.
    ///
    /// # Errors
    ///
    /// [`CollectionError::IndexOutOfRange`] if `index > len`; nothing fires
    /// and nothing changes.
    pub fn insert(&self, index: usize, item: T) -> Result<(), CollectionError> {
        let len = self.len();
        if index > len {
            return Err(CollectionError::IndexOutOfRange { index, len });
        }
        self.insert_at(index, item);
        Ok(())
    }

    /// Remove and return the item at `index`.
    ///
    /// # Errors
    ///
    /// [`CollectionError::IndexOutOfRange`] if `index >= len`; nothing fires
    /// and nothing changes.
    pub fn remove(&self, index: usize) -> Result<T, CollectionError> {
        let len = self.len();
        if index >= len {
            return Err(CollectionError::IndexOutOfRange { index, len });
        }
        let item = self
            .inner
            .items
            .borrow()
            .get(index)
            .cloned()
            .ok_or(CollectionError::IndexOutOfRange { index, len })?;

        self.inner.before_remove.emit(&CollectionChange {
            index,
            item: item.clone(),
        });
        self.inner.count_changing.emit(&len);
        {
            self.inner.items.borrow_mut().remove(index);
            let mut tracking = self.inner.item_tracking.borrow_mut();
            if index < tracking.len() {
                tracking.remove(index);
            }
        }
        self.inner.after_remove.emit(&CollectionChange {
            index,
            item: item.clone(),
        });
        self.inner.count_changed.emit(&(len - 1));
        Ok(item)
    }

    /// Remove and return the last item, or `None` on an empty collection.
    pub fn pop(&self) -> Option<T> {
        let len = self.len();
        if len == 0 {
            return None;
        }
        self.remove(len - 1).ok()
    }

    /// Replace the item at `index`, returning the previous occupant.
    ///
    /// Emits remove and add pairs for the slot. The count is unchanged, so no
    /// count stream fires.
    ///
    /// # Errors
    ///
    /// [`CollectionError::IndexOutOfRange`] if `index >= len`; nothing fires
    /// and nothing changes.
    pub fn replace(&self, index: usize, item: T) -> Result<T, CollectionError> {
        let len = self.len();
        if index >= len {
            return Err(CollectionError::IndexOutOfRange { index, len });
        }
        let old = self
            .inner
            .items
            .borrow()
            .get(index)
            .cloned()
            .ok_or(CollectionError::IndexOutOfRange { index, len })?;

        self.inner.before_remove.emit(&CollectionChange {
            index,
            item: old.clone(),
        });
        self.inner.before_add.emit(&CollectionChange {
            index,
            item: item.clone(),
        });
        {
            self.inner.items.borrow_mut()[index] = item.clone();
            let hook = self.inner.track_hook.borrow();
            if let Some(hook) = hook.as_ref() {
                self.inner.item_tracking.borrow_mut()[index] = hook(&item);
            }
        }
        self.inner.after_remove.emit(&CollectionChange {
            index,
            item: old.clone(),
        });
        self.inner.after_add.emit(&CollectionChange { index, item });
        Ok(old)
    }

    /// Remove every item.
    ///
    /// Announces one remove pair per element (in index order) around a single
    /// pre/post count pair. Empty collections emit nothing.
    pub fn clear(&self) {
        let snapshot: Vec<T> = self.inner.items.borrow().clone();
        if snapshot.is_empty() {
            return;
        }
        let len = snapshot.len();
        for (index, item) in snapshot.iter().enumerate() {
            self.inner.before_remove.emit(&CollectionChange {
                index,
                item: item.clone(),
            });
        }
        self.inner.count_changing.emit(&len);
        {
            self.inner.items.borrow_mut().clear();
            self.inner.item_tracking.borrow_mut().clear();
        }
        for (index, item) in snapshot.into_iter().enumerate() {
            self.inner.after_remove.emit(&CollectionChange { index, item });
        }
        self.inner.count_changed.emit(&0);
    }

    /// Append every item from `items`, announcing each one individually, in
    /// sequence order.
    pub fn extend(&self, items: impl IntoIterator<Item = T>) {
        for item in items {
            self.push(item);
        }
    }

    /// Insertion shared by `push`/`insert`; bounds already checked.
    fn insert_at(&self, index: usize, item: T) {
        let len = self.len();
        self.inner.before_add.emit(&CollectionChange {
            index,
            item: item.clone(),
        });
        self.inner.count_changing.emit(&len);
        {
            self.inner.items.borrow_mut().insert(index, item.clone());
            let hook = self.inner.track_hook.borrow();
            if let Some(hook) = hook.as_ref() {
                self.inner.item_tracking.borrow_mut().insert(index, hook(&item));
            }
        }
        self.inner.after_add.emit(&CollectionChange { index, item });
        self.inner.count_changed.emit(&(len + 1));
    }
}

impl<T: Clone + Notifying + 'static> TrackedVec<T> {
    /// Toggle per-item change re-broadcast.
    ///
    /// Enabling subscribes to every current item's `changing`/`changed`
    /// streams — and to every item inserted later — republishing their records
    /// through [`item_changing`](TrackedVec::item_changing) and
    /// [`item_changed`](TrackedVec::item_changed). The record's sender
    /// identifies the originating item. Disabling drops every item
    /// subscription.
    pub fn set_change_tracking(&self, enabled: bool) {
        if enabled == self.change_tracking_enabled() {
            return;
        }
        if enabled {
            let changing_out = self.inner.item_changing.clone();
            let changed_out = self.inner.item_changed.clone();
            let hook: TrackHook<T> = Box::new(move |item| {
                let hub = item.change_hub();
                let changing_out = changing_out.clone();
                let changed_out = changed_out.clone();
                ItemTracking {
                    _changing: hub
                        .changing()
                        .subscribe(move |record: &ChangeRecord| changing_out.emit(record)),
                    _changed: hub
                        .changed()
                        .subscribe(move |record: &ChangeRecord| changed_out.emit(record)),
                }
            });
            let tracking: Vec<ItemTracking> =
                self.inner.items.borrow().iter().map(|item| hook(item)).collect();
            *self.inner.item_tracking.borrow_mut() = tracking;
            *self.inner.track_hook.borrow_mut() = Some(hook);
        } else {
            self.inner.track_hook.borrow_mut().take();
            self.inner.item_tracking.borrow_mut().clear();
        }
        tracing::debug!(enabled, "collection change tracking toggled");
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
