#![forbid(unsafe_code)]

//! Typed message bus for junction.
//!
//! Messages are keyed by `(type, contract)`: the payload type plus an opaque
//! string the bus never interprets, so unrelated features can share a payload
//! type without colliding. Senders and listeners for a key never reference
//! each other; the bus fans every message out to every subscriber, on the
//! scheduler registered for the key.
//!
//! This is the one cross-thread component of the workspace. The registry is
//! internally locked, bus handles are cheap clones, and [`Scheduler`]
//! implementations marshal delivery onto whichever execution context the
//! application wants (inline, a drained queue, or a dedicated thread).
//!
//! # Invariants
//!
//! 1. At most one live delivery channel per key; sources are additive,
//!    scheduler registration overwrites.
//! 2. Each individual source's emission order is preserved end-to-end;
//!    cross-source ordering on a shared key is unspecified.
//! 3. Sending with no listeners is a silent no-op, never an error.

pub mod bus;
pub mod scheduler;

pub use bus::{Broadcast, Listener, MessageBus, Subscription};
pub use scheduler::{ImmediateScheduler, QueueScheduler, Scheduler, Task, ThreadScheduler};
