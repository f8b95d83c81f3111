#![forbid(unsafe_code)]

//! Per-object property-change notification.
//!
//! # Design
//!
//! A mutable, observable object embeds a [`ChangeHub`] and wraps each tracked
//! field in a [`Tracked`]. Writes go through [`ChangeHub::write`], which
//! compares against the stored value, emits a [`ChangeRecord`] on the
//! `changing` stream strictly before the store, overwrites the backing value,
//! then emits on the `changed` stream. A write that does not change the value
//! emits nothing on either stream.
//!
//! [`ChangeHub::suppress`] opens a reference-counted scope: while any scope on
//! a hub is live, both streams stay silent. Writes still land in the backing
//! store; closing the last scope resumes notification for subsequent writes
//! without replaying what was suppressed.
//!
//! `ChangeRecord` is the single record type for homogeneous and heterogeneous
//! consumers alike: the payload is an `Rc<dyn Any>` with a typed narrowing
//! accessor, so aggregating streams from differently-typed objects needs no
//! parallel untyped surface.
//!
//! # Invariants
//!
//! 1. For a given sender and property, two consecutive records never carry
//!    the same value (equality-checked before emission).
//! 2. `changing` records carry the outgoing value, `changed` records the
//!    incoming one.
//! 3. Suppression silences notification only; the mutation itself always
//!    happens.

use std::any::Any;
use std::cell::Cell;
use std::rc::Rc;
use std::sync::atomic::{AtomicU64, Ordering};

use crate::subject::Subject;

static NEXT_OBJECT_ID: AtomicU64 = AtomicU64::new(1);

/// Process-unique identity of a change-emitting object.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct ObjectId(u64);

impl ObjectId {
    fn next() -> Self {
        Self(NEXT_OBJECT_ID.fetch_add(1, Ordering::Relaxed))
    }

    /// Raw id value.
    #[must_use]
    pub const fn raw(self) -> u64 {
        self.0
    }
}

/// One property mutation: who, which field, and (optionally) what value.
///
/// Constructed transiently at the moment of mutation, published, and not
/// retained by the emitting object.
#[derive(Clone)]
pub struct ChangeRecord {
    sender: ObjectId,
    property: &'static str,
    value: Option<Rc<dyn Any>>,
}

impl ChangeRecord {
    /// A record with no value payload.
    #[must_use]
    pub fn new(sender: ObjectId, property: &'static str) -> Self {
        Self {
            sender,
            property,
            value: None,
        }
    }

    /// A record carrying `value`.
    #[must_use]
    pub fn with_value<T: 'static>(sender: ObjectId, property: &'static str, value: T) -> Self {
        Self {
            sender,
            property,
            value: Some(Rc::new(value)),
        }
    }

    /// Identity of the object that emitted this record.
    #[must_use]
    pub fn sender(&self) -> ObjectId {
        self.sender
    }

    /// Name of the mutated property.
    #[must_use]
    pub fn property(&self) -> &'static str {
        self.property
    }

    /// Whether a value payload is attached.
    #[must_use]
    pub fn has_value(&self) -> bool {
        self.value.is_some()
    }

    /// Narrow the payload to `T`. `None` if absent or of another type.
    #[must_use]
    pub fn value_as<T: 'static>(&self) -> Option<&T> {
        self.value.as_deref().and_then(|v| v.downcast_ref::<T>())
    }
}

impl std::fmt::Debug for ChangeRecord {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ChangeRecord")
            .field("sender", &self.sender)
            .field("property", &self.property)
            .field("has_value", &self.value.is_some())
            .finish()
    }
}

/// A named field whose writes are observable through the owning
/// [`ChangeHub`].
///
/// The wrapper stores the backing value; all mutation goes through
/// [`ChangeHub::write`] so the notification contract cannot be bypassed by
/// accident.
#[derive(Debug, Clone)]
pub struct Tracked<T> {
    name: &'static str,
    value: T,
}

impl<T> Tracked<T> {
    /// Wrap `value` under the property name `name`.
    #[must_use]
    pub fn new(name: &'static str, value: T) -> Self {
        Self { name, value }
    }

    /// The property name.
    #[must_use]
    pub const fn name(&self) -> &'static str {
        self.name
    }

    /// Read the backing value.
    #[must_use]
    pub fn get(&self) -> &T {
        &self.value
    }
}

impl<T> std::ops::Deref for Tracked<T> {
    type Target = T;

    fn deref(&self) -> &T {
        &self.value
    }
}

/// Per-object change-notification hub: `changing`/`changed` streams plus a
/// suppression scope.
///
/// Cloning a hub shares its streams, identity, and suppression state, so an
/// object cloned into an observable collection keeps notifying through the
/// same channels.
#[derive(Clone)]
pub struct ChangeHub {
    id: ObjectId,
    changing: Subject<ChangeRecord>,
    changed: Subject<ChangeRecord>,
    suppress_depth: Rc<Cell<usize>>,
}

impl Default for ChangeHub {
    fn default() -> Self {
        Self::new()
    }
}

impl std::fmt::Debug for ChangeHub {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ChangeHub")
            .field("id", &self.id)
            .field("suppressed", &self.is_suppressed())
            .finish()
    }
}

impl ChangeHub {
    /// Create a hub with a fresh object identity.
    #[must_use]
    pub fn new() -> Self {
        Self {
            id: ObjectId::next(),
            changing: Subject::new(),
            changed: Subject::new(),
            suppress_depth: Rc::new(Cell::new(0)),
        }
    }

    /// Identity stamped on every record this hub emits.
    #[must_use]
    pub fn id(&self) -> ObjectId {
        self.id
    }

    /// Stream firing immediately before a tracked value is overwritten.
    #[must_use]
    pub fn changing(&self) -> &Subject<ChangeRecord> {
        &self.changing
    }

    /// Stream firing immediately after a tracked value was overwritten.
    #[must_use]
    pub fn changed(&self) -> &Subject<ChangeRecord> {
        &self.changed
    }

    /// Whether any suppression scope is currently open.
    #[must_use]
    pub fn is_suppressed(&self) -> bool {
        self.suppress_depth.get() > 0
    }

    /// Open a suppression scope. Both streams stay silent until every guard
    /// from this hub has been dropped. Suppressed writes are not replayed.
    #[must_use = "dropping the guard immediately closes the scope"]
    pub fn suppress(&self) -> SuppressionGuard {
        self.suppress_depth.set(self.suppress_depth.get() + 1);
        SuppressionGuard {
            depth: Rc::clone(&self.suppress_depth),
        }
    }

    /// Write `value` into `field`, notifying around the store.
    ///
    /// Equal writes (by `PartialEq`) emit nothing. The store itself always
    /// happens, suppressed or not.
    pub fn write<T>(&self, field: &mut Tracked<T>, value: T)
    where
        T: Clone + PartialEq + 'static,
    {
        if field.value == value {
            return;
        }
        let notify = !self.is_suppressed();
        if notify {
            self.changing.emit(&ChangeRecord::with_value(
                self.id,
                field.name,
                field.value.clone(),
            ));
        }
        field.value = value;
        if notify {
            tracing::trace!(object = self.id.raw(), property = field.name, "changed");
            self.changed.emit(&ChangeRecord::with_value(
                self.id,
                field.name,
                field.value.clone(),
            ));
        }
    }
}

/// Scope token returned by [`ChangeHub::suppress`]. Dropping it closes the
/// scope; the hub resumes notifying once the last concurrently-held guard is
/// gone.
pub struct SuppressionGuard {
    depth: Rc<Cell<usize>>,
}

impl Drop for SuppressionGuard {
    fn drop(&mut self) {
        self.depth.set(self.depth.get().saturating_sub(1));
    }
}

impl std::fmt::Debug for SuppressionGuard {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SuppressionGuard")
            .field("depth", &self.depth.get())
            .finish()
    }
}

/// Capability exposed by objects that broadcast their mutations.
///
/// [`TrackedVec`](crate::collection::TrackedVec) uses it to re-broadcast
/// change records from contained items.
pub trait Notifying {
    /// The object's change hub.
    fn change_hub(&self) -> &ChangeHub;
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
