#![forbid(unsafe_code)]

//! Delivery scheduling contexts for the message bus.
//!
//! A [`Scheduler`] decides *where and when* a queued delivery runs: inline on
//! the sender's thread, on an owner-drained queue, or on a dedicated worker
//! thread. Registering a scheduler for a bus key is what decouples the
//! sender's thread from the listeners' thread.
//!
//! # Invariants
//!
//! 1. Tasks handed to one scheduler run in submission order.
//! 2. A scheduler never drops a task silently while it is alive;
//!    [`ThreadScheduler`] drains its queue before its worker exits.

use std::collections::VecDeque;
use std::sync::mpsc;
use std::sync::Mutex;
use std::thread::JoinHandle;

/// A unit of deferred work: one delivery cycle.
pub type Task = Box<dyn FnOnce() + Send>;

/// An execution context the bus marshals deliveries onto.
pub trait Scheduler: Send + Sync {
    /// Queue `task` for execution. Ordering across calls on the same
    /// scheduler is preserved.
    fn schedule(&self, task: Task);
}

/// Runs every task inline on the calling thread. The default when no
/// scheduler is registered for a key.
#[derive(Debug, Default, Clone, Copy)]
pub struct ImmediateScheduler;

impl ImmediateScheduler {
    /// Create an immediate scheduler.
    #[must_use]
    pub const fn new() -> Self {
        Self
    }
}

impl Scheduler for ImmediateScheduler {
    fn schedule(&self, task: Task) {
        task();
    }
}

/// Queues tasks until the owning thread drains them.
///
/// This is the integration point for UI-style loops: register the queue for a
/// key, then call [`run_pending`](QueueScheduler::run_pending) once per loop
/// iteration. It also makes delivery order fully deterministic in tests.
#[derive(Default)]
pub struct QueueScheduler {
    queue: Mutex<VecDeque<Task>>,
}

impl QueueScheduler {
    /// Create an empty queue scheduler.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Number of tasks waiting to run.
    #[must_use]
    pub fn pending(&self) -> usize {
        match self.queue.lock() {
            Ok(queue) => queue.len(),
            Err(poisoned) => poisoned.into_inner().len(),
        }
    }

    /// Run queued tasks until the queue is empty, including tasks queued by
    /// the tasks themselves. Returns how many ran.
    pub fn run_pending(&self) -> usize {
        let mut ran = 0;
        loop {
            let task = {
                let mut queue = match self.queue.lock() {
                    Ok(queue) => queue,
                    Err(poisoned) => poisoned.into_inner(),
                };
                queue.pop_front()
            };
            match task {
                Some(task) => {
                    task();
                    ran += 1;
                }
                None => break,
            }
        }
        ran
    }
}

impl Scheduler for QueueScheduler {
    fn schedule(&self, task: Task) {
        match self.queue.lock() {
            Ok(mut queue) => queue.push_back(task),
            Err(poisoned) => poisoned.into_inner().push_back(task),
        }
    }
}

impl std::fmt::Debug for QueueScheduler {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("QueueScheduler")
            .field("pending", &self.pending())
            .finish()
    }
}

/// Runs tasks on a dedicated worker thread, FIFO.
///
/// Dropping the scheduler closes the channel and joins the worker, so every
/// task accepted before the drop still runs.
pub struct ThreadScheduler {
    sender: Option<mpsc::Sender<Task>>,
    worker: Option<JoinHandle<()>>,
}

impl ThreadScheduler {
    /// Spawn the worker thread.
    ///
    /// # Errors
    ///
    /// Returns the OS error if the thread cannot be spawned.
    pub fn spawn() -> std::io::Result<Self> {
        let (sender, receiver) = mpsc::channel::<Task>();
        let worker = std::thread::Builder::new()
            .name("junction-bus-worker".into())
            .spawn(move || {
                while let Ok(task) = receiver.recv() {
                    task();
                }
            })?;
        Ok(Self {
            sender: Some(sender),
            worker: Some(worker),
        })
    }
}

impl Scheduler for ThreadScheduler {
    fn schedule(&self, task: Task) {
        if let Some(sender) = &self.sender {
            if sender.send(task).is_err() {
                tracing::warn!("bus worker thread is gone; dropping delivery");
            }
        }
    }
}

impl Drop for ThreadScheduler {
    fn drop(&mut self) {
        // Closing the channel lets the worker finish its queue and exit.
        drop(self.sender.take());
        if let Some(worker) = self.worker.take() {
            if worker.join().is_err() {
                tracing::warn!("bus worker thread panicked during shutdown");
            }
        }
    }
}

impl std::fmt::Debug for ThreadScheduler {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ThreadScheduler")
            .field("alive", &self.sender.is_some())
            .finish()
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
