#![forbid(unsafe_code)]

//! Change-notification primitives for junction.
//!
//! This crate provides the protocol everything else in the workspace is built
//! on:
//!
//! - [`Subject`]: a multicast push channel with RAII [`Subscription`] guards.
//! - [`Behavior`]: a replay-latest observable value that de-duplicates writes
//!   and delivers its current value to every new subscriber.
//! - [`ChangeHub`]: per-object before/after property-change streams with
//!   suppression scopes and [`Tracked`] field wrappers.
//! - [`TrackedVec`]: an ordered sequence that announces every mutation through
//!   before/after item streams and pre/post count streams, and can re-broadcast
//!   change records from contained items.
//!
//! # Architecture
//!
//! All types here use `Rc<...>`-shared interiors: cloning a handle shares
//! state, and mutating methods take `&self` so subscribers may read the source
//! from inside a notification callback. Instances belong to a single logical
//! owner thread; callers that need cross-thread delivery go through
//! `junction-bus` instead.
//!
//! # Invariants
//!
//! 1. Subscribers are notified in registration order.
//! 2. Writing a value equal to the stored value emits nothing.
//! 3. Dropping a [`Subscription`] removes the callback before the next
//!    notification cycle.
//! 4. `before` streams fire strictly before the mutation they describe,
//!    `after` streams strictly after.

pub mod behavior;
pub mod change;
pub mod collection;
pub mod subject;

pub use behavior::Behavior;
pub use change::{ChangeHub, ChangeRecord, Notifying, ObjectId, SuppressionGuard, Tracked};
pub use collection::{CollectionChange, CollectionError, TrackedVec};
pub use subject::{Subject, Subscription};
