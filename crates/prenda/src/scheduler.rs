//! FIFO task queue with deferred, deduplicated drain requests.
//!
//! The scheduler is an explicit service instance: every promise holds a
//! handle to the scheduler it dispatches on, and a test harness can step the
//! queue manually for deterministic ordering. Continuations never run
//! synchronously with the call that registered or settled them; they run
//! when the embedder drains the queue.

use std::any::Any;
use std::cell::{Cell, RefCell};
use std::panic::{self, AssertUnwindSafe};

/// A queued unit of work.
pub type Task = Box<dyn FnOnce()>;

/// Construction parameters for a [`Scheduler`].
#[derive(Debug, Clone)]
pub struct SchedulerConfig {
    /// Number of consumed slots after which the rolling task buffer is
    /// compacted. Memory detail only; never observable through scheduling
    /// order.
    pub compact_after: usize,
}

impl Default for SchedulerConfig {
    fn default() -> Self {
        Self { compact_after: 1024 }
    }
}

/// Process-wide FIFO task queue.
///
/// `enqueue` appends; the wake hook fires exactly once per empty→non-empty
/// edge to ask the embedding host for a drain. `drain` pops and runs the
/// oldest task until the queue is empty, processing tasks enqueued
/// mid-drain in the same pass. A panicking task is reported to the
/// unhandled-error sink and does not stop the pass.
pub struct Scheduler {
    queue: RefCell<Vec<Option<Task>>>,
    start: Cell<usize>,
    compact_after: usize,
    drain_pending: Cell<bool>,
    draining: Cell<bool>,
    wake_hook: RefCell<Option<Box<dyn Fn()>>>,
    error_sink: RefCell<Option<Box<dyn Fn(&str)>>>,
}

impl Scheduler {
    /// Create a scheduler with default configuration.
    pub fn new() -> Self {
        Self::with_config(SchedulerConfig::default())
    }

    /// Create a scheduler with the given configuration.
    pub fn with_config(config: SchedulerConfig) -> Self {
        Self {
            queue: RefCell::new(Vec::new()),
            start: Cell::new(0),
            compact_after: config.compact_after.max(1),
            drain_pending: Cell::new(false),
            draining: Cell::new(false),
            wake_hook: RefCell::new(None),
            error_sink: RefCell::new(None),
        }
    }

    /// Register the hook invoked when a drain should be requested from the
    /// host. Called once per empty→non-empty edge, never while a drain is
    /// running or already requested.
    pub fn set_wake_hook(&self, hook: impl Fn() + 'static) {
        *self.wake_hook.borrow_mut() = Some(Box::new(hook));
    }

    /// Replace the sink that receives panics escaping queued tasks.
    /// Defaults to `log::error!`.
    pub fn set_error_sink(&self, sink: impl Fn(&str) + 'static) {
        *self.error_sink.borrow_mut() = Some(Box::new(sink));
    }

    /// Append a task to the queue, requesting a drain if the queue was empty.
    pub fn enqueue(&self, task: Task) {
        let became_nonempty = {
            let mut queue = self.queue.borrow_mut();
            queue.push(Some(task));
            queue.len() - self.start.get() == 1
        };

        if became_nonempty && !self.draining.get() && !self.drain_pending.get() {
            self.drain_pending.set(true);
            if let Some(hook) = &*self.wake_hook.borrow() {
                hook();
            }
        }
    }

    /// Run queued tasks in FIFO order until the queue is empty.
    ///
    /// Tasks enqueued by a running task execute in the same pass, so a task
    /// can observe its own follow-ups running before control returns to the
    /// host.
    pub fn drain(&self) {
        self.drain_pending.set(false);
        self.draining.set(true);
        while let Some(task) = self.next_task() {
            if let Err(payload) = panic::catch_unwind(AssertUnwindSafe(task)) {
                self.report_panic(payload.as_ref());
            }
        }
        self.draining.set(false);
    }

    /// Drain repeatedly until no task remains.
    pub fn run_until_idle(&self) {
        while !self.is_idle() {
            self.drain();
        }
    }

    /// Number of tasks waiting to run.
    pub fn pending(&self) -> usize {
        self.queue.borrow().len() - self.start.get()
    }

    /// True iff no task is waiting.
    pub fn is_idle(&self) -> bool {
        self.pending() == 0
    }

    fn next_task(&self) -> Option<Task> {
        let mut queue = self.queue.borrow_mut();
        let start = self.start.get();
        if start >= queue.len() {
            queue.clear();
            self.start.set(0);
            return None;
        }

        let task = queue[start].take();
        self.start.set(start + 1);
        if start + 1 >= self.compact_after {
            queue.drain(..start + 1);
            self.start.set(0);
        }
        task
    }

    fn report_panic(&self, payload: &(dyn Any + Send)) {
        let message = if let Some(text) = payload.downcast_ref::<&str>() {
            (*text).to_string()
        } else if let Some(text) = payload.downcast_ref::<String>() {
            text.clone()
        } else {
            "task panicked".to_string()
        };

        let sink = self.error_sink.borrow();
        match &*sink {
            Some(sink) => sink(&message),
            None => log::error!("scheduler task panicked: {}", message),
        }
    }
}

impl Default for Scheduler {
    fn default() -> Self {
        Self::new()
    }
}
