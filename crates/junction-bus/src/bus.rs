#![forbid(unsafe_code)]

//! The message bus: a keyed registry of typed broadcast channels.
//!
//! # Design
//!
//! Every key `(TypeId, contract)` owns at most one [`Broadcast`] channel plus
//! the [`Scheduler`] its deliveries are marshaled onto. Entries appear lazily
//! on first use and live for the process. The registry sits behind an internal
//! `Mutex`; entry parts are cloned out and the lock released *before* any
//! delivery is scheduled, so a subscriber running inline may call back into
//! the bus freely.
//!
//! # Invariants
//!
//! 1. One live channel per key. Registering another source for a key fans it
//!    into the same channel; registering another scheduler overwrites the
//!    association for subsequent deliveries only.
//! 2. Listeners never compete: every subscriber observes every message sent
//!    after it subscribed. There is no replay of earlier messages.
//! 3. Per-source emission order survives end-to-end (the scheduler is FIFO);
//!    ordering across sources sharing a key is unspecified.
//!
//! # Failure Modes
//!
//! - **Nobody listens**: the send is a no-op, not an error.
//! - **Registry lock poisoned**: a panicking subscriber on another thread
//!   cannot brick the bus; the poisoned lock is re-entered.

use std::any::{Any, TypeId};
use std::collections::HashMap;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex, MutexGuard, Weak};

use ahash::RandomState;

use crate::scheduler::{ImmediateScheduler, Scheduler};

/// Composite routing key: payload type plus an opaque contract string.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
struct BusKey {
    type_id: TypeId,
    contract: Option<String>,
}

impl BusKey {
    fn of<T: 'static>(contract: Option<&str>) -> Self {
        Self {
            type_id: TypeId::of::<T>(),
            contract: contract.map(str::to_owned),
        }
    }
}

/// One registered subscriber slot on a channel.
struct FanoutSlot<T> {
    id: u64,
    callback: Arc<dyn Fn(&T) + Send + Sync>,
}

struct FanoutInner<T> {
    subscribers: Mutex<Vec<FanoutSlot<T>>>,
    next_id: AtomicU64,
}

impl<T> FanoutInner<T> {
    fn new() -> Self {
        Self {
            subscribers: Mutex::new(Vec::new()),
            next_id: AtomicU64::new(1),
        }
    }

    fn lock_subscribers(&self) -> MutexGuard<'_, Vec<FanoutSlot<T>>> {
        match self.subscribers.lock() {
            Ok(guard) => guard,
            Err(poisoned) => poisoned.into_inner(),
        }
    }

    fn dispatch(&self, value: &T) {
        let snapshot: Vec<Arc<dyn Fn(&T) + Send + Sync>> = self
            .lock_subscribers()
            .iter()
            .map(|slot| Arc::clone(&slot.callback))
            .collect();
        for callback in snapshot {
            callback(value);
        }
    }
}

impl<T: 'static> FanoutInner<T> {
    fn attach(self: &Arc<Self>, callback: impl Fn(&T) + Send + Sync + 'static) -> Subscription {
        let id = self.next_id.fetch_add(1, Ordering::Relaxed);
        self.lock_subscribers().push(FanoutSlot {
            id,
            callback: Arc::new(callback),
        });
        let weak: Weak<FanoutInner<T>> = Arc::downgrade(self);
        Subscription {
            detach: Some(Box::new(move || {
                if let Some(fanout) = weak.upgrade() {
                    fanout.lock_subscribers().retain(|slot| slot.id != id);
                }
            })),
        }
    }
}

/// A thread-safe multicast stream: the channel type behind every bus key, and
/// the stream type the bus accepts as an external message source.
pub struct Broadcast<T> {
    inner: Arc<FanoutInner<T>>,
}

impl<T> Clone for Broadcast<T> {
    fn clone(&self) -> Self {
        Self {
            inner: Arc::clone(&self.inner),
        }
    }
}

impl<T> Default for Broadcast<T> {
    fn default() -> Self {
        Self::new()
    }
}

impl<T> std::fmt::Debug for Broadcast<T> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Broadcast")
            .field("subscribers", &self.subscriber_count())
            .finish()
    }
}

impl<T> Broadcast<T> {
    /// Create a stream with no subscribers.
    #[must_use]
    pub fn new() -> Self {
        Self {
            inner: Arc::new(FanoutInner::new()),
        }
    }

    /// Number of attached subscribers.
    #[must_use]
    pub fn subscriber_count(&self) -> usize {
        self.inner.lock_subscribers().len()
    }

    /// Push one value to every subscriber, inline on the calling thread.
    pub fn publish(&self, value: &T) {
        self.inner.dispatch(value);
    }
}

impl<T: 'static> Broadcast<T> {
    /// Attach a callback until the returned guard is dropped.
    #[must_use = "dropping the subscription immediately detaches the callback"]
    pub fn subscribe(&self, callback: impl Fn(&T) + Send + Sync + 'static) -> Subscription {
        self.inner.attach(callback)
    }
}

/// Handle to one bus key's broadcast channel, returned by
/// [`MessageBus::listen`].
pub struct Listener<T> {
    fanout: Arc<FanoutInner<T>>,
}

impl<T> Clone for Listener<T> {
    fn clone(&self) -> Self {
        Self {
            fanout: Arc::clone(&self.fanout),
        }
    }
}

impl<T> std::fmt::Debug for Listener<T> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Listener")
            .field("subscribers", &self.fanout.lock_subscribers().len())
            .finish()
    }
}

impl<T: 'static> Listener<T> {
    /// Attach a callback; it fires for every message delivered on the key
    /// from now on, until the guard is dropped.
    #[must_use = "dropping the subscription immediately detaches the callback"]
    pub fn subscribe(&self, callback: impl Fn(&T) + Send + Sync + 'static) -> Subscription {
        self.fanout.attach(callback)
    }
}

/// RAII guard detaching a bus or broadcast subscriber on drop.
///
/// For source registrations, dropping stops forwarding from that source only;
/// other sources and direct sends keep flowing.
pub struct Subscription {
    detach: Option<Box<dyn FnOnce() + Send>>,
}

impl Subscription {
    /// Keep the subscriber attached for the channel's whole lifetime.
    pub fn forget(mut self) {
        self.detach.take();
    }

    /// Detach now. Equivalent to dropping the guard.
    pub fn unsubscribe(self) {
        drop(self);
    }
}

impl Drop for Subscription {
    fn drop(&mut self) {
        if let Some(detach) = self.detach.take() {
            detach();
        }
    }
}

impl std::fmt::Debug for Subscription {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Subscription")
            .field("active", &self.detach.is_some())
            .finish()
    }
}

struct BusEntry {
    scheduler: Arc<dyn Scheduler>,
    /// Type-erased `Arc<FanoutInner<T>>`; the key's `TypeId` guarantees the
    /// downcast.
    fanout: Box<dyn Any + Send>,
    /// Whether a send or source registration has ever touched this key.
    seen: bool,
}

struct BusInner {
    entries: Mutex<HashMap<BusKey, BusEntry, RandomState>>,
    default_scheduler: Arc<dyn Scheduler>,
}

/// The process-lifetime message bus. Cloning shares the registry.
pub struct MessageBus {
    inner: Arc<BusInner>,
}

impl Clone for MessageBus {
    fn clone(&self) -> Self {
        Self {
            inner: Arc::clone(&self.inner),
        }
    }
}

impl Default for MessageBus {
    fn default() -> Self {
        Self::new()
    }
}

impl std::fmt::Debug for MessageBus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("MessageBus")
            .field("keys", &self.lock_entries().len())
            .finish()
    }
}

impl MessageBus {
    /// Create a bus whose unregistered keys deliver inline.
    #[must_use]
    pub fn new() -> Self {
        Self::with_default_scheduler(Arc::new(ImmediateScheduler::new()))
    }

    /// Create a bus with an explicit fallback scheduler for keys that never
    /// had [`register_scheduler`](MessageBus::register_scheduler) called.
    #[must_use]
    pub fn with_default_scheduler(scheduler: Arc<dyn Scheduler>) -> Self {
        Self {
            inner: Arc::new(BusInner {
                entries: Mutex::new(HashMap::default()),
                default_scheduler: scheduler,
            }),
        }
    }

    fn lock_entries(&self) -> MutexGuard<'_, HashMap<BusKey, BusEntry, RandomState>> {
        match self.inner.entries.lock() {
            Ok(guard) => guard,
            Err(poisoned) => poisoned.into_inner(),
        }
    }

    /// Fetch (creating if needed) the entry for `(T, contract)` and clone out
    /// its delivery parts. The registry lock is released before returning.
    fn entry_parts<T: 'static>(
        &self,
        contract: Option<&str>,
        mark_seen: bool,
    ) -> (Arc<dyn Scheduler>, Arc<FanoutInner<T>>) {
        let key = BusKey::of::<T>(contract);
        let mut entries = self.lock_entries();
        let entry = entries.entry(key).or_insert_with(|| BusEntry {
            scheduler: Arc::clone(&self.inner.default_scheduler),
            fanout: Box::new(Arc::new(FanoutInner::<T>::new())),
            seen: false,
        });
        if mark_seen {
            entry.seen = true;
        }
        let fanout = entry
            .fanout
            .downcast_ref::<Arc<FanoutInner<T>>>()
            .cloned()
            .expect("fanout type always matches its bus key");
        (Arc::clone(&entry.scheduler), fanout)
    }

    /// Associate delivery for `(T, contract)` with `scheduler`.
    ///
    /// Overwrites any prior association for that exact key. Messages already
    /// handed to the previous scheduler are unaffected.
    pub fn register_scheduler<T: 'static>(
        &self,
        scheduler: Arc<dyn Scheduler>,
        contract: Option<&str>,
    ) {
        let key = BusKey::of::<T>(contract);
        let mut entries = self.lock_entries();
        match entries.get_mut(&key) {
            Some(entry) => entry.scheduler = scheduler,
            None => {
                entries.insert(
                    key,
                    BusEntry {
                        scheduler,
                        fanout: Box::new(Arc::new(FanoutInner::<T>::new())),
                        seen: false,
                    },
                );
            }
        }
        tracing::debug!(
            message_type = std::any::type_name::<T>(),
            contract,
            "bus scheduler registered"
        );
    }

    /// Handle to the broadcast channel for `(T, contract)`.
    ///
    /// Every subscriber attached through the handle observes every message
    /// sent or sourced under the key from then on. Subscribing does not
    /// replay earlier messages.
    #[must_use]
    pub fn listen<T: Send + 'static>(&self, contract: Option<&str>) -> Listener<T> {
        let (_, fanout) = self.entry_parts::<T>(contract, false);
        Listener { fanout }
    }

    /// Whether any send or source registration has ever occurred for
    /// `(T, contract)`. Diagnostic only; listening does not count.
    #[must_use]
    pub fn is_registered<T: 'static>(&self, contract: Option<&str>) -> bool {
        let key = BusKey::of::<T>(contract);
        self.lock_entries().get(&key).is_some_and(|entry| entry.seen)
    }

    /// Push one message into the `(T, contract)` channel, delivered on the
    /// key's scheduler. A no-op if nobody listens.
    pub fn send_message<T: Send + 'static>(&self, message: T, contract: Option<&str>) {
        let (scheduler, fanout) = self.entry_parts::<T>(contract, true);
        tracing::trace!(
            message_type = std::any::type_name::<T>(),
            contract,
            "bus send"
        );
        scheduler.schedule(Box::new(move || fanout.dispatch(&message)));
    }

    /// Forward every value `source` publishes into the `(T, contract)`
    /// channel until the returned guard is dropped.
    ///
    /// Sources are additive: several may feed one key, alongside direct
    /// [`send_message`](MessageBus::send_message) calls. Dropping the guard
    /// stops this source only.
    #[must_use = "dropping the registration immediately stops forwarding"]
    pub fn register_message_source<T: Clone + Send + 'static>(
        &self,
        source: &Broadcast<T>,
        contract: Option<&str>,
    ) -> Subscription {
        // Mark the key live even before the source produces anything.
        let _ = self.entry_parts::<T>(contract, true);
        let bus = self.clone();
        let contract: Option<String> = contract.map(str::to_owned);
        tracing::debug!(
            message_type = std::any::type_name::<T>(),
            "bus source registered"
        );
        source.subscribe(move |value: &T| {
            bus.send_message(value.clone(), contract.as_deref());
        })
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------

#[cfg(test)]
mod tests {
    use super::*;
    use crate::scheduler::QueueScheduler;
    use std::sync::Mutex;

    fn collect_into(sink: &Arc<Mutex<Vec<String>>>) -> impl Fn(&String) + Send + Sync + 'static {
        let sink = Arc::clone(sink);
        move |value: &String| sink.lock().unwrap().push(value.clone())
    }

    #[test]
    fn contracts_partition_the_same_type() {
        let bus = MessageBus::new();
        let seen_a = Arc::new(Mutex::new(Vec::new()));
        let seen_b = Arc::new(Mutex::new(Vec::new()));

        let _sub_a = bus.listen::<String>(Some("A")).subscribe(collect_into(&seen_a));
        let _sub_b = bus.listen::<String>(Some("B")).subscribe(collect_into(&seen_b));

        bus.send_message("x".to_string(), Some("A"));

        assert_eq!(*seen_a.lock().unwrap(), vec!["x"]);
        assert!(seen_b.lock().unwrap().is_empty());
    }

    #[test]
    fn no_replay_for_late_subscribers() {
        let bus = MessageBus::new();
        let seen = Arc::new(Mutex::new(Vec::new()));

        bus.send_message("early".to_string(), None);
        let _sub = bus.listen::<String>(None).subscribe(collect_into(&seen));
        bus.send_message("late".to_string(), None);

        assert_eq!(*seen.lock().unwrap(), vec!["late"]);
    }

    #[test]
    fn every_listener_observes_every_message() {
        let bus = MessageBus::new();
        let seen_1 = Arc::new(Mutex::new(Vec::new()));
        let seen_2 = Arc::new(Mutex::new(Vec::new()));

        let _sub_1 = bus.listen::<String>(None).subscribe(collect_into(&seen_1));
        let _sub_2 = bus.listen::<String>(None).subscribe(collect_into(&seen_2));

        bus.send_message("m".to_string(), None);

        assert_eq!(*seen_1.lock().unwrap(), vec!["m"]);
        assert_eq!(*seen_2.lock().unwrap(), vec!["m"]);
    }

    #[test]
    fn types_partition_the_same_contract() {
        let bus = MessageBus::new();
        let seen = Arc::new(Mutex::new(Vec::new()));

        let _sub = bus.listen::<String>(None).subscribe(collect_into(&seen));
        bus.send_message(42u32, None);

        assert!(seen.lock().unwrap().is_empty());
    }

    #[test]
    fn send_without_listeners_is_silent() {
        let bus = MessageBus::new();
        bus.send_message("nobody home".to_string(), None);
        assert!(bus.is_registered::<String>(None));
    }

    #[test]
    fn scheduler_overwrite_applies_to_subsequent_sends() {
        let bus = MessageBus::new();
        let first = Arc::new(QueueScheduler::new());
        let second = Arc::new(QueueScheduler::new());
        let seen = Arc::new(Mutex::new(Vec::new()));

        let _sub = bus.listen::<String>(None).subscribe(collect_into(&seen));

        bus.register_scheduler::<String>(Arc::clone(&first) as Arc<dyn Scheduler>, None);
        bus.send_message("on-first".to_string(), None);

        bus.register_scheduler::<String>(Arc::clone(&second) as Arc<dyn Scheduler>, None);
        bus.send_message("on-second".to_string(), None);

        // The first message was already queued on the first scheduler.
        assert_eq!(first.pending(), 1);
        assert_eq!(second.pending(), 1);

        first.run_pending();
        assert_eq!(*seen.lock().unwrap(), vec!["on-first"]);
        second.run_pending();
        assert_eq!(*seen.lock().unwrap(), vec!["on-first", "on-second"]);
    }

    #[test]
    fn source_forwards_until_dropped() {
        let bus = MessageBus::new();
        let source = Broadcast::new();
        let seen = Arc::new(Mutex::new(Vec::new()));

        let _sub = bus.listen::<String>(None).subscribe(collect_into(&seen));
        let registration = bus.register_message_source(&source, None);

        source.publish(&"from-source".to_string());
        assert_eq!(*seen.lock().unwrap(), vec!["from-source"]);

        drop(registration);
        source.publish(&"after-drop".to_string());
        assert_eq!(*seen.lock().unwrap(), vec!["from-source"]);

        // Direct sends are unaffected by the source going away.
        bus.send_message("direct".to_string(), None);
        assert_eq!(*seen.lock().unwrap(), vec!["from-source", "direct"]);
    }

    #[test]
    fn multiple_sources_fan_into_one_key() {
        let bus = MessageBus::new();
        let source_1 = Broadcast::new();
        let source_2 = Broadcast::new();
        let seen = Arc::new(Mutex::new(Vec::new()));

        let _sub = bus.listen::<String>(None).subscribe(collect_into(&seen));
        let _reg_1 = bus.register_message_source(&source_1, None);
        let reg_2 = bus.register_message_source(&source_2, None);

        source_1.publish(&"one".to_string());
        source_2.publish(&"two".to_string());
        drop(reg_2);
        source_1.publish(&"three".to_string());
        source_2.publish(&"ignored".to_string());

        assert_eq!(*seen.lock().unwrap(), vec!["one", "two", "three"]);
    }

    #[test]
    fn is_registered_tracks_sends_and_sources_not_listens() {
        let bus = MessageBus::new();
        assert!(!bus.is_registered::<String>(None));

        let _listener = bus.listen::<String>(None);
        assert!(!bus.is_registered::<String>(None));

        bus.send_message("x".to_string(), None);
        assert!(bus.is_registered::<String>(None));

        // Contract variants are independent keys.
        assert!(!bus.is_registered::<String>(Some("other")));

        let source = Broadcast::<String>::new();
        let _reg = bus.register_message_source(&source, Some("other"));
        assert!(bus.is_registered::<String>(Some("other")));
    }

    #[test]
    fn dropped_subscription_stops_delivery() {
        let bus = MessageBus::new();
        let seen = Arc::new(Mutex::new(Vec::new()));

        let sub = bus.listen::<String>(None).subscribe(collect_into(&seen));
        bus.send_message("one".to_string(), None);
        drop(sub);
        bus.send_message("two".to_string(), None);

        assert_eq!(*seen.lock().unwrap(), vec!["one"]);
    }

    #[test]
    fn forget_outlives_the_guard_scope() {
        let bus = MessageBus::new();
        let seen = Arc::new(Mutex::new(Vec::new()));

        bus.listen::<String>(None)
            .subscribe(collect_into(&seen))
            .forget();
        bus.send_message("kept".to_string(), None);

        assert_eq!(*seen.lock().unwrap(), vec!["kept"]);
    }

    #[test]
    fn clones_share_the_registry() {
        let bus = MessageBus::new();
        let twin = bus.clone();
        let seen = Arc::new(Mutex::new(Vec::new()));

        let _sub = bus.listen::<String>(None).subscribe(collect_into(&seen));
        twin.send_message("via-twin".to_string(), None);

        assert_eq!(*seen.lock().unwrap(), vec!["via-twin"]);
    }
}
