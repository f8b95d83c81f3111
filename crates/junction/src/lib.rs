#![forbid(unsafe_code)]

//! Junction public facade crate.
//!
//! This crate provides the stable, ergonomic surface area for users: the
//! member crates re-exported under short names plus a prelude of the common
//! types.

pub use junction_bus as bus;
pub use junction_core as core;
pub use junction_router as router;

pub mod prelude {
    pub use junction_bus::{
        Broadcast, ImmediateScheduler, Listener, MessageBus, QueueScheduler, Scheduler,
        Subscription as BusSubscription, ThreadScheduler,
    };
    pub use junction_core::{
        Behavior, ChangeHub, ChangeRecord, CollectionChange, CollectionError, Notifying, ObjectId,
        Subject, Subscription, SuppressionGuard, Tracked, TrackedVec,
    };
    pub use junction_router::{
        Command, CommandError, NavigationStack, ResolutionError, Routable, RouteHandle,
        RouterSnapshot, ViewLocator,
    };
}
