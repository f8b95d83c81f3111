#![forbid(unsafe_code)]

//! Guarded observable commands.
//!
//! # Design
//!
//! A [`Command`] wraps an action behind a boolean guard. The guard is a
//! [`Behavior<bool>`], so interested parties observe enablement changes and a
//! late subscriber immediately learns the current state. Execution failures —
//! a disabled command that was invoked anyway, or a rejected parameter — are
//! published as [`CommandError`] values on the command's own error stream.
//! They are data, not panics: a misbehaving caller cannot crash the host, and
//! one failed execution never tears down unrelated subscribers.
//!
//! An error nobody observes still lands somewhere: with zero error
//! subscribers the command logs the failure through `tracing::error!`.
//!
//! # Invariants
//!
//! 1. Executing while the guard is false mutates nothing and emits exactly
//!    one [`CommandError::Disabled`].
//! 2. Successful executions emit the parameter on the execution stream after
//!    the action ran.

use std::rc::Rc;

use junction_core::{Behavior, Subject};

/// Failures surfaced on a command's error stream.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum CommandError {
    /// The command's guard was false at execution time.
    Disabled {
        /// Command name, for diagnostics.
        command: &'static str,
    },
    /// The parameter failed the command's validation.
    InvalidArgument {
        /// Command name, for diagnostics.
        command: &'static str,
        /// What was wrong with the parameter.
        message: String,
    },
}

impl std::fmt::Display for CommandError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Disabled { command } => {
                write!(f, "command '{}' is disabled", command)
            }
            Self::InvalidArgument { command, message } => {
                write!(f, "invalid argument to command '{}': {}", command, message)
            }
        }
    }
}

impl std::error::Error for CommandError {}

type Action<P> = Rc<dyn Fn(&P) -> Result<(), CommandError>>;

/// An observable command: a guard stream, an execution entry point, and a
/// result stream of completed executions.
///
/// Cloning shares all streams and the action.
pub struct Command<P> {
    name: &'static str,
    guard: Behavior<bool>,
    executions: Subject<P>,
    errors: Subject<CommandError>,
    action: Action<P>,
}

impl<P> Clone for Command<P> {
    fn clone(&self) -> Self {
        Self {
            name: self.name,
            guard: self.guard.clone(),
            executions: self.executions.clone(),
            errors: self.errors.clone(),
            action: Rc::clone(&self.action),
        }
    }
}

impl<P> std::fmt::Debug for Command<P> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Command")
            .field("name", &self.name)
            .field("enabled", &self.guard.get())
            .finish()
    }
}

impl<P: Clone + 'static> Command<P> {
    /// An always-enabled command running `action`.
    #[must_use]
    pub fn new(
        name: &'static str,
        action: impl Fn(&P) -> Result<(), CommandError> + 'static,
    ) -> Self {
        Self::with_guard(name, Behavior::new(true), action)
    }

    /// A command gated by `guard`. The caller keeps a handle to the behavior
    /// and flips it as conditions change.
    #[must_use]
    pub fn with_guard(
        name: &'static str,
        guard: Behavior<bool>,
        action: impl Fn(&P) -> Result<(), CommandError> + 'static,
    ) -> Self {
        Self {
            name,
            guard,
            executions: Subject::new(),
            errors: Subject::new(),
            action: Rc::new(action),
        }
    }

    /// Command name.
    #[must_use]
    pub const fn name(&self) -> &'static str {
        self.name
    }

    /// Whether the command may execute right now.
    #[must_use]
    pub fn can_execute(&self) -> bool {
        self.guard.get()
    }

    /// Replay stream of guard changes.
    #[must_use]
    pub fn can_execute_changes(&self) -> &Behavior<bool> {
        &self.guard
    }

    /// Stream of parameters from successful executions.
    #[must_use]
    pub fn executions(&self) -> &Subject<P> {
        &self.executions
    }

    /// Stream of execution failures.
    #[must_use]
    pub fn errors(&self) -> &Subject<CommandError> {
        &self.errors
    }

    /// Run the command with `parameter`.
    ///
    /// A false guard or a rejected parameter publishes a [`CommandError`] on
    /// the error stream and leaves all other state untouched.
    pub fn execute(&self, parameter: P) {
        if !self.guard.get() {
            self.report(CommandError::Disabled { command: self.name });
            return;
        }
        match (self.action)(&parameter) {
            Ok(()) => self.executions.emit(&parameter),
            Err(error) => self.report(error),
        }
    }

    fn report(&self, error: CommandError) {
        if self.errors.has_subscribers() {
            self.errors.emit(&error);
        } else {
            // Default sink: an unobserved failure must never be invisible.
            tracing::error!(command = self.name, %error, "unobserved command error");
        }
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------

#[cfg(test)]
mod tests {
    use super::*;
    use std::cell::{Cell, RefCell};
    use std::rc::Rc;

    #[test]
    fn executes_action_and_emits_result() {
        let ran = Rc::new(Cell::new(0u32));
        let ran_clone = Rc::clone(&ran);
        let command = Command::new("bump", move |delta: &u32| {
            ran_clone.set(ran_clone.get() + delta);
            Ok(())
        });

        let seen = Rc::new(RefCell::new(Vec::new()));
        let seen_clone = Rc::clone(&seen);
        let _sub = command
            .executions()
            .subscribe(move |p: &u32| seen_clone.borrow_mut().push(*p));

        command.execute(3);
        assert_eq!(ran.get(), 3);
        assert_eq!(*seen.borrow(), vec![3]);
    }

    #[test]
    fn disabled_guard_routes_to_error_stream() {
        let guard = Behavior::new(false);
        let ran = Rc::new(Cell::new(false));
        let ran_clone = Rc::clone(&ran);
        let command = Command::with_guard("noop", guard.clone(), move |_: &()| {
            ran_clone.set(true);
            Ok(())
        });

        let errors = Rc::new(RefCell::new(Vec::new()));
        let errors_clone = Rc::clone(&errors);
        let _sub = command
            .errors()
            .subscribe(move |e: &CommandError| errors_clone.borrow_mut().push(e.clone()));

        command.execute(());
        assert!(!ran.get());
        assert_eq!(
            *errors.borrow(),
            vec![CommandError::Disabled { command: "noop" }]
        );

        // Flipping the guard re-enables execution.
        guard.set(true);
        command.execute(());
        assert!(ran.get());
        assert_eq!(errors.borrow().len(), 1);
    }

    #[test]
    fn guard_changes_are_observable_with_replay() {
        let guard = Behavior::new(true);
        let command = Command::with_guard("guarded", guard.clone(), |_: &()| Ok(()));

        let seen = Rc::new(RefCell::new(Vec::new()));
        let seen_clone = Rc::clone(&seen);
        let _sub = command
            .can_execute_changes()
            .subscribe(move |enabled: &bool| seen_clone.borrow_mut().push(*enabled));

        assert_eq!(*seen.borrow(), vec![true]);
        guard.set(false);
        assert_eq!(*seen.borrow(), vec![true, false]);
        assert!(!command.can_execute());
    }

    #[test]
    fn rejected_parameter_surfaces_as_invalid_argument() {
        let command = Command::new("strict", |value: &i32| {
            if *value < 0 {
                Err(CommandError::InvalidArgument {
                    command: "strict",
                    message: "negative".into(),
                })
            } else {
                Ok(())
            }
        });

        let errors = Rc::new(RefCell::new(Vec::new()));
        let executions = Rc::new(RefCell::new(Vec::new()));

        let e = Rc::clone(&errors);
        let _s1 = command
            .errors()
            .subscribe(move |err: &CommandError| e.borrow_mut().push(err.clone()));
        let x = Rc::clone(&executions);
        let _s2 = command
            .executions()
            .subscribe(move |p: &i32| x.borrow_mut().push(*p));

        command.execute(-1);
        command.execute(2);

        assert_eq!(errors.borrow().len(), 1);
        assert_eq!(*executions.borrow(), vec![2]);
    }

    #[test]
    fn unobserved_errors_do_not_panic() {
        // No error subscriber: the failure goes to the tracing sink.
        let command = Command::with_guard("silent", Behavior::new(false), |_: &()| Ok(()));
        command.execute(());
    }

    #[test]
    fn error_display_names_the_command() {
        let disabled = CommandError::Disabled { command: "back" };
        assert_eq!(disabled.to_string(), "command 'back' is disabled");

        let invalid = CommandError::InvalidArgument {
            command: "go",
            message: "empty url segment".into(),
        };
        assert!(invalid.to_string().contains("go"));
        assert!(invalid.to_string().contains("empty url segment"));
    }
}
