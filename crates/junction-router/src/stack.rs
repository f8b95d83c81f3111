#![forbid(unsafe_code)]

//! The observable navigation stack.
//!
//! # Design
//!
//! A [`NavigationStack`] owns a `TrackedVec` of [`RouteHandle`] entries,
//! LIFO-disciplined: the last element is the screen being shown. The stack is
//! mutated **only** through its three commands — [`navigate`], [`navigate_back`]
//! and [`navigate_and_reset`] — never by direct index manipulation. Every
//! transition flows collection → `count_changed` → [`current`] recompute, and
//! `current` replays the latest top to each new subscriber synchronously, so a
//! view layer attaching late still renders the right screen.
//!
//! [`navigate`]: NavigationStack::navigate
//! [`navigate_back`]: NavigationStack::navigate_back
//! [`navigate_and_reset`]: NavigationStack::navigate_and_reset
//! [`current`]: NavigationStack::current
//!
//! # Invariants
//!
//! 1. `navigate_back` is enabled iff the stack is non-empty; executing it
//!    disabled emits an error and never mutates the stack.
//! 2. `navigate_and_reset` produces exactly the clear-then-add notification
//!    sequence on the count streams.
//! 3. `current` equals the last element (or `None`) after every transition,
//!    and all subscribers share one recomputation.

use std::any::Any;
use std::rc::Rc;

use junction_core::{Behavior, Subject, Subscription, TrackedVec};

use crate::command::{Command, CommandError};

/// Scheme prefix for breadcrumb URLs built from the stack.
const URL_SCHEME: &str = "app://";

/// Capability of a stack entry: a stable URL segment plus an optional view
/// contract.
///
/// `contract()` disambiguates multiple views over the same entry type; it is
/// opaque to the router and only consulted by the view locator.
pub trait Routable: 'static {
    /// Stable, serializable path segment identifying this entry.
    fn url_segment(&self) -> &str;

    /// Optional view-resolution contract.
    fn contract(&self) -> Option<&str> {
        None
    }

    /// The entry as `Any`, for type-directed stack queries.
    fn as_any(&self) -> &dyn Any;
}

/// Shared handle to a stack entry. Equality is pointer identity: two handles
/// are equal iff they refer to the same entry instance.
pub struct RouteHandle {
    entry: Rc<dyn Routable>,
}

impl RouteHandle {
    /// Wrap `entry` in a fresh handle.
    #[must_use]
    pub fn new(entry: impl Routable) -> Self {
        Self {
            entry: Rc::new(entry),
        }
    }

    /// Adopt an existing shared entry.
    #[must_use]
    pub fn from_rc(entry: Rc<dyn Routable>) -> Self {
        Self { entry }
    }

    /// The entry's URL segment.
    #[must_use]
    pub fn url_segment(&self) -> &str {
        self.entry.url_segment()
    }

    /// The entry's view contract, if any.
    #[must_use]
    pub fn contract(&self) -> Option<&str> {
        self.entry.contract()
    }

    /// Whether the underlying entry is a `K`.
    #[must_use]
    pub fn is<K: Routable>(&self) -> bool {
        self.entry.as_any().is::<K>()
    }

    /// Borrow the underlying entry as a `K`.
    #[must_use]
    pub fn downcast_ref<K: Routable>(&self) -> Option<&K> {
        self.entry.as_any().downcast_ref::<K>()
    }
}

impl Clone for RouteHandle {
    fn clone(&self) -> Self {
        Self {
            entry: Rc::clone(&self.entry),
        }
    }
}

impl PartialEq for RouteHandle {
    fn eq(&self, other: &Self) -> bool {
        Rc::ptr_eq(&self.entry, &other.entry)
    }
}

impl Eq for RouteHandle {}

impl std::ops::Deref for RouteHandle {
    type Target = dyn Routable;

    fn deref(&self) -> &Self::Target {
        &*self.entry
    }
}

impl std::fmt::Debug for RouteHandle {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("RouteHandle")
            .field("url_segment", &self.url_segment())
            .finish()
    }
}

/// Persistable capture of a stack's contents: URL segments, bottom to top.
///
/// Commands and derived observables are rebuilt on restore; only the segments
/// travel. The wire format is the caller's business.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub struct RouterSnapshot {
    /// Entry segments, bottom of the stack first.
    pub segments: Vec<String>,
}

fn validate_entry(command: &'static str, entry: &RouteHandle) -> Result<(), CommandError> {
    if entry.url_segment().is_empty() {
        return Err(CommandError::InvalidArgument {
            command,
            message: "routable entry has an empty url segment".into(),
        });
    }
    Ok(())
}

/// The routing state machine: a stack of routable entries plus the three
/// commands that are its only sanctioned mutators.
///
/// Instances belong to a single logical owner thread.
pub struct NavigationStack {
    entries: TrackedVec<RouteHandle>,
    current: Behavior<Option<RouteHandle>>,
    can_go_back: Behavior<bool>,
    navigate: Command<RouteHandle>,
    navigate_back: Command<()>,
    navigate_and_reset: Command<RouteHandle>,
    _recompute: Subscription,
}

impl Default for NavigationStack {
    fn default() -> Self {
        Self::new()
    }
}

impl std::fmt::Debug for NavigationStack {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("NavigationStack")
            .field("depth", &self.depth())
            .field("url", &self.url_for_current_route())
            .finish()
    }
}

impl NavigationStack {
    /// Create an empty stack.
    #[must_use]
    pub fn new() -> Self {
        let entries: TrackedVec<RouteHandle> = TrackedVec::new();
        let current: Behavior<Option<RouteHandle>> = Behavior::new(None);
        let can_go_back = Behavior::new(false);

        // One shared recomputation, driven by the collection's count stream.
        let recompute = {
            let entries = entries.clone();
            let current = current.clone();
            let can_go_back = can_go_back.clone();
            entries.clone().count_changed().subscribe(move |_count: &usize| {
                let top = entries.last();
                can_go_back.set(top.is_some());
                current.set(top);
            })
        };

        let navigate = {
            let entries = entries.clone();
            Command::new("navigate", move |entry: &RouteHandle| {
                validate_entry("navigate", entry)?;
                tracing::debug!(segment = entry.url_segment(), "navigate");
                entries.push(entry.clone());
                Ok(())
            })
        };

        let navigate_back = {
            let entries = entries.clone();
            Command::with_guard("navigate-back", can_go_back.clone(), move |_: &()| {
                match entries.pop() {
                    Some(popped) => {
                        tracing::debug!(segment = popped.url_segment(), "navigate back");
                        Ok(())
                    }
                    None => Err(CommandError::Disabled {
                        command: "navigate-back",
                    }),
                }
            })
        };

        let navigate_and_reset = {
            let entries = entries.clone();
            Command::new("navigate-and-reset", move |entry: &RouteHandle| {
                validate_entry("navigate-and-reset", entry)?;
                tracing::debug!(segment = entry.url_segment(), "navigate and reset");
                entries.clear();
                entries.push(entry.clone());
                Ok(())
            })
        };

        Self {
            entries,
            current,
            can_go_back,
            navigate,
            navigate_back,
            navigate_and_reset,
            _recompute: recompute,
        }
    }

    /// Append an entry to the stack. Always enabled.
    #[must_use]
    pub fn navigate(&self) -> &Command<RouteHandle> {
        &self.navigate
    }

    /// Pop the top entry. Enabled iff the stack is non-empty.
    #[must_use]
    pub fn navigate_back(&self) -> &Command<()> {
        &self.navigate_back
    }

    /// Replace the whole stack with a single entry. Always enabled.
    #[must_use]
    pub fn navigate_and_reset(&self) -> &Command<RouteHandle> {
        &self.navigate_and_reset
    }

    /// The top of the stack, replayed to every new subscriber immediately.
    #[must_use]
    pub fn current(&self) -> &Behavior<Option<RouteHandle>> {
        &self.current
    }

    /// Clone out the top of the stack.
    #[must_use]
    pub fn current_entry(&self) -> Option<RouteHandle> {
        self.entries.last()
    }

    /// Number of entries on the stack.
    #[must_use]
    pub fn depth(&self) -> usize {
        self.entries.len()
    }

    /// Whether the stack is empty.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Clone out the whole stack, bottom first.
    #[must_use]
    pub fn entries(&self) -> Vec<RouteHandle> {
        self.entries.to_vec()
    }

    /// Post-mutation stack depth stream, for observers that want transitions
    /// rather than screens.
    #[must_use]
    pub fn depth_changed(&self) -> &Subject<usize> {
        self.entries.count_changed()
    }

    /// Pre-mutation stack depth stream.
    #[must_use]
    pub fn depth_changing(&self) -> &Subject<usize> {
        self.entries.count_changing()
    }

    /// Whether `entry` is the screen currently on top.
    #[must_use]
    pub fn is_current(&self, entry: &RouteHandle) -> bool {
        self.entries.last().is_some_and(|top| top == *entry)
    }

    /// Breadcrumb URL for the stack: `app://` plus `/`-joined segments,
    /// bottom to top.
    #[must_use]
    pub fn url_for_current_route(&self) -> String {
        self.entries.with(|items| {
            let mut url = String::from(URL_SCHEME);
            for (position, handle) in items.iter().enumerate() {
                if position > 0 {
                    url.push('/');
                }
                url.push_str(handle.url_segment());
            }
            url
        })
    }

    /// Nearest-to-top entry whose concrete type is `K`.
    #[must_use]
    pub fn find_in_stack<K: Routable>(&self) -> Option<RouteHandle> {
        self.entries
            .with(|items| items.iter().rev().find(|handle| handle.is::<K>()).cloned())
    }

    /// Capture the stack contents for persistence.
    #[must_use]
    pub fn snapshot(&self) -> RouterSnapshot {
        RouterSnapshot {
            segments: self
                .entries
                .with(|items| items.iter().map(|h| h.url_segment().to_owned()).collect()),
        }
    }

    /// Rebuild the stack from a snapshot, reviving each segment through
    /// `factory`. Segments the factory cannot revive are skipped with a
    /// warning. Observers see the full clear-then-add notification sequence.
    pub fn restore_with(
        &self,
        snapshot: &RouterSnapshot,
        factory: impl Fn(&str) -> Option<RouteHandle>,
    ) {
        self.entries.clear();
        for segment in &snapshot.segments {
            match factory(segment) {
                Some(entry) => self.entries.push(entry),
                None => {
                    tracing::warn!(segment = %segment, "snapshot segment could not be revived; skipping");
                }
            }
        }
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------

#[cfg(test)]
mod tests {
    use super::*;
    use std::cell::RefCell;
    use std::rc::Rc;

    struct Screen {
        segment: String,
    }

    impl Routable for Screen {
        fn url_segment(&self) -> &str {
            &self.segment
        }

        fn as_any(&self) -> &dyn Any {
            self
        }
    }

    struct SettingsScreen {
        pane: &'static str,
    }

    impl Routable for SettingsScreen {
        fn url_segment(&self) -> &str {
            "settings"
        }

        fn as_any(&self) -> &dyn Any {
            self
        }
    }

    fn screen(segment: &str) -> RouteHandle {
        RouteHandle::new(Screen {
            segment: segment.to_owned(),
        })
    }

    fn segments(stack: &NavigationStack) -> Vec<String> {
        stack
            .entries()
            .iter()
            .map(|h| h.url_segment().to_owned())
            .collect()
    }

    #[test]
    fn navigate_then_back_leaves_first_entry() {
        let stack = NavigationStack::new();
        let a = screen("a");
        let b = screen("b");

        stack.navigate().execute(a.clone());
        stack.navigate().execute(b);
        stack.navigate_back().execute(());

        assert_eq!(stack.entries(), vec![a]);
    }

    #[test]
    fn reset_replaces_entire_stack() {
        let stack = NavigationStack::new();
        stack.navigate().execute(screen("a"));
        stack.navigate().execute(screen("b"));

        let c = screen("c");
        stack.navigate_and_reset().execute(c.clone());

        assert_eq!(stack.entries(), vec![c]);
        assert_eq!(stack.depth(), 1);
    }

    #[test]
    fn back_on_empty_stack_reports_disabled_and_mutates_nothing() {
        let stack = NavigationStack::new();
        assert!(!stack.navigate_back().can_execute());

        let errors = Rc::new(RefCell::new(Vec::new()));
        let errors_clone = Rc::clone(&errors);
        let _sub = stack
            .navigate_back()
            .errors()
            .subscribe(move |e: &CommandError| errors_clone.borrow_mut().push(e.clone()));

        stack.navigate_back().execute(());

        assert_eq!(
            *errors.borrow(),
            vec![CommandError::Disabled {
                command: "navigate-back"
            }]
        );
        assert!(stack.is_empty());
    }

    #[test]
    fn back_guard_follows_stack_depth() {
        let stack = NavigationStack::new();
        let enabled = Rc::new(RefCell::new(Vec::new()));
        let enabled_clone = Rc::clone(&enabled);
        let _sub = stack
            .navigate_back()
            .can_execute_changes()
            .subscribe(move |e: &bool| enabled_clone.borrow_mut().push(*e));

        stack.navigate().execute(screen("a"));
        stack.navigate_back().execute(());

        assert_eq!(*enabled.borrow(), vec![false, true, false]);
    }

    #[test]
    fn current_replays_top_to_late_subscriber() {
        let stack = NavigationStack::new();
        let a = screen("a");
        let b = screen("b");
        stack.navigate().execute(a);
        stack.navigate().execute(b.clone());

        let seen = Rc::new(RefCell::new(Vec::new()));
        let seen_clone = Rc::clone(&seen);
        let _sub = stack
            .current()
            .subscribe(move |top: &Option<RouteHandle>| seen_clone.borrow_mut().push(top.clone()));

        // Synchronous replay of the existing top, before any new transition.
        assert_eq!(*seen.borrow(), vec![Some(b)]);
    }

    #[test]
    fn current_tracks_every_transition() {
        let stack = NavigationStack::new();
        let seen = Rc::new(RefCell::new(Vec::new()));
        let seen_clone = Rc::clone(&seen);
        let _sub = stack.current().subscribe(move |top: &Option<RouteHandle>| {
            seen_clone
                .borrow_mut()
                .push(top.as_ref().map(|h| h.url_segment().to_owned()));
        });

        let a = screen("a");
        stack.navigate().execute(a);
        stack.navigate().execute(screen("b"));
        stack.navigate_back().execute(());

        assert_eq!(
            *seen.borrow(),
            vec![
                None,
                Some("a".to_owned()),
                Some("b".to_owned()),
                Some("a".to_owned())
            ]
        );
    }

    #[test]
    fn reset_emits_clear_then_add_counts() {
        let stack = NavigationStack::new();
        stack.navigate().execute(screen("a"));
        stack.navigate().execute(screen("b"));

        let counts = Rc::new(RefCell::new(Vec::new()));
        let counts_clone = Rc::clone(&counts);
        let _sub = stack
            .depth_changed()
            .subscribe(move |n: &usize| counts_clone.borrow_mut().push(*n));

        stack.navigate_and_reset().execute(screen("c"));

        // Exactly the clear-then-add sequence, no intermediate states.
        assert_eq!(*counts.borrow(), vec![0, 1]);
    }

    #[test]
    fn url_joins_segments_bottom_to_top() {
        let stack = NavigationStack::new();
        assert_eq!(stack.url_for_current_route(), "app://");

        stack.navigate().execute(screen("home"));
        stack
            .navigate()
            .execute(RouteHandle::new(SettingsScreen { pane: "audio" }));

        assert_eq!(stack.url_for_current_route(), "app://home/settings");
    }

    #[test]
    fn find_in_stack_prefers_nearest_to_top() {
        let stack = NavigationStack::new();
        stack.navigate().execute(screen("first"));
        stack
            .navigate()
            .execute(RouteHandle::new(SettingsScreen { pane: "audio" }));
        stack.navigate().execute(screen("second"));

        let found = stack.find_in_stack::<Screen>().expect("a Screen is present");
        assert_eq!(found.url_segment(), "second");

        let settings = stack
            .find_in_stack::<SettingsScreen>()
            .expect("settings is present");
        assert_eq!(
            settings.downcast_ref::<SettingsScreen>().map(|s| s.pane),
            Some("audio")
        );

        struct Absent;
        impl Routable for Absent {
            fn url_segment(&self) -> &str {
                "absent"
            }
            fn as_any(&self) -> &dyn Any {
                self
            }
        }
        assert!(stack.find_in_stack::<Absent>().is_none());
    }

    #[test]
    fn is_current_matches_top_only() {
        let stack = NavigationStack::new();
        let a = screen("a");
        let b = screen("b");
        stack.navigate().execute(a.clone());
        stack.navigate().execute(b.clone());

        assert!(stack.is_current(&b));
        assert!(!stack.is_current(&a));
    }

    #[test]
    fn empty_segment_is_invalid_argument() {
        let stack = NavigationStack::new();
        let errors = Rc::new(RefCell::new(Vec::new()));
        let errors_clone = Rc::clone(&errors);
        let _sub = stack
            .navigate()
            .errors()
            .subscribe(move |e: &CommandError| errors_clone.borrow_mut().push(e.clone()));

        stack.navigate().execute(screen(""));

        assert!(stack.is_empty());
        assert!(matches!(
            errors.borrow()[0],
            CommandError::InvalidArgument { command: "navigate", .. }
        ));
    }

    #[test]
    fn handle_equality_is_pointer_identity() {
        let a = screen("same");
        let b = screen("same");
        assert_ne!(a, b);
        assert_eq!(a, a.clone());
    }

    #[test]
    fn snapshot_captures_segments_bottom_to_top() {
        let stack = NavigationStack::new();
        stack.navigate().execute(screen("home"));
        stack.navigate().execute(screen("inbox"));
        stack.navigate().execute(screen("message"));

        assert_eq!(
            stack.snapshot(),
            RouterSnapshot {
                segments: vec!["home".into(), "inbox".into(), "message".into()]
            }
        );
    }

    #[test]
    fn restore_revives_entries_and_recomputes_current() {
        let stack = NavigationStack::new();
        stack.navigate().execute(screen("stale"));

        let snapshot = RouterSnapshot {
            segments: vec!["home".into(), "unknown".into(), "inbox".into()],
        };
        stack.restore_with(&snapshot, |segment| match segment {
            "unknown" => None,
            other => Some(screen(other)),
        });

        assert_eq!(segments(&stack), vec!["home", "inbox"]);
        assert_eq!(
            stack.current().get().map(|h| h.url_segment().to_owned()),
            Some("inbox".to_owned())
        );
        assert!(stack.navigate_back().can_execute());
    }

    #[cfg(feature = "serde")]
    #[test]
    fn snapshot_round_trips_through_json() {
        let snapshot = RouterSnapshot {
            segments: vec!["home".into(), "settings".into()],
        };
        let json = serde_json::to_string(&snapshot).expect("serialize");
        let back: RouterSnapshot = serde_json::from_str(&json).expect("deserialize");
        assert_eq!(back, snapshot);
    }
}
