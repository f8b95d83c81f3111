#![forbid(unsafe_code)]

//! Command-driven navigation for junction.
//!
//! The routing state machine is a LIFO stack of routable entries whose only
//! sanctioned mutators are three observable commands: push, pop, and
//! push-with-reset. The stack's top is exposed as a replay observable so view
//! layers attach at any time and immediately learn what to render; the
//! [`ViewLocator`] maps the top entry to a concrete view.
//!
//! # Invariants
//!
//! 1. Stack transitions happen only through the commands; guard violations
//!    and bad arguments surface on command error streams, never as panics.
//! 2. The current-route observable replays the latest top synchronously to
//!    every new subscriber.

pub mod command;
pub mod locate;
pub mod stack;

pub use command::{Command, CommandError};
pub use locate::{ResolutionError, ViewLocator};
pub use stack::{NavigationStack, Routable, RouteHandle, RouterSnapshot};
