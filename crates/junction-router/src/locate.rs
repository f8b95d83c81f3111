#![forbid(unsafe_code)]

//! View resolution: mapping stack entries to renderable views.
//!
//! # Design
//!
//! [`ViewLocator`] is an explicit registry built once at startup: each entry
//! type is registered under an optional contract string together with a
//! factory producing the view handle. Resolution looks up
//! `(entry type, entry contract)` and falls back to the type's contract-free
//! registration — that fallback is the locator's one piece of default
//! behavior, and the whole configuration lives in the instance rather than in
//! process-wide state.
//!
//! A miss is a [`ResolutionError`] returned to the caller, never swallowed.

use std::any::{Any, TypeId};
use std::collections::HashMap;

use ahash::RandomState;

use crate::stack::Routable;

/// No view is registered for an entry.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ResolutionError {
    /// URL segment of the entry that failed to resolve.
    pub segment: String,
    /// Contract the lookup was attempted under.
    pub contract: Option<String>,
}

impl std::fmt::Display for ResolutionError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match &self.contract {
            Some(contract) => write!(
                f,
                "no view registered for route '{}' under contract '{}'",
                self.segment, contract
            ),
            None => write!(f, "no view registered for route '{}'", self.segment),
        }
    }
}

impl std::error::Error for ResolutionError {}

type Factory<V> = Box<dyn Fn(&dyn Any) -> Option<V>>;

/// Registry resolving stack entries to view handles of type `V`.
pub struct ViewLocator<V> {
    registry: HashMap<(TypeId, Option<String>), Factory<V>, RandomState>,
}

impl<V> Default for ViewLocator<V> {
    fn default() -> Self {
        Self::new()
    }
}

impl<V> std::fmt::Debug for ViewLocator<V> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ViewLocator")
            .field("registrations", &self.registry.len())
            .finish()
    }
}

impl<V> ViewLocator<V> {
    /// An empty locator.
    #[must_use]
    pub fn new() -> Self {
        Self {
            registry: HashMap::default(),
        }
    }

    /// Number of registrations.
    #[must_use]
    pub fn len(&self) -> usize {
        self.registry.len()
    }

    /// Whether nothing is registered.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.registry.is_empty()
    }

    /// Register a view factory for entry type `K` under `contract`.
    ///
    /// Registering the same `(type, contract)` pair again replaces the
    /// factory.
    pub fn register<K: Routable>(
        &mut self,
        contract: Option<&str>,
        factory: impl Fn(&K) -> V + 'static,
    ) {
        tracing::debug!(
            entry_type = std::any::type_name::<K>(),
            contract,
            "view registered"
        );
        self.registry.insert(
            (TypeId::of::<K>(), contract.map(str::to_owned)),
            Box::new(move |any| any.downcast_ref::<K>().map(&factory)),
        );
    }

    /// Resolve `entry` to a view handle.
    ///
    /// Tries `(entry type, entry contract)` first, then the contract-free
    /// registration for the type.
    ///
    /// # Errors
    ///
    /// [`ResolutionError`] when neither lookup finds a registration.
    pub fn resolve(&self, entry: &dyn Routable) -> Result<V, ResolutionError> {
        let type_id = entry.as_any().type_id();
        let contract = entry.contract().map(str::to_owned);

        let factory = self
            .registry
            .get(&(type_id, contract.clone()))
            .or_else(|| {
                contract
                    .is_some()
                    .then(|| self.registry.get(&(type_id, None)))
                    .flatten()
            });

        factory
            .and_then(|factory| factory(entry.as_any()))
            .ok_or_else(|| ResolutionError {
                segment: entry.url_segment().to_owned(),
                contract,
            })
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
