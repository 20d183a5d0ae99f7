//! The deferred-value state machine and its continuation dispatcher.
//!
//! A [`Promise`] starts `Pending` and settles exactly once, to `Fulfilled`
//! or `Rejected`. Continuations registered before settlement are queued in
//! FIFO order and dispatched through the scheduler when the promise
//! settles; continuations registered after settlement are dispatched
//! through the scheduler immediately. Either way a continuation never runs
//! synchronously with the call that registered it.
//!
//! Composition comes in three modes:
//! - `chain` flattens: a handler returning a future-like value makes the
//!   downstream promise adopt that value's eventual outcome, recursively.
//! - `map` is verbatim: the handler's return value becomes the fulfillment
//!   value even if it is itself future-like.
//! - `bind` bridges: the handler must return a future-like value, whose
//!   outcome is forwarded one level without re-wrapping.

use std::cell::{Cell, RefCell};
use std::fmt;
use std::rc::Rc;

use crate::error::{Fault, SettleResult};
use crate::scheduler::Scheduler;
use crate::subscribe::subscribe_value;
use crate::value::Value;

/// Handler applied to a fulfillment value. Returning `Err` rejects the
/// downstream promise with that cause.
pub type FulfillHandler = Box<dyn FnOnce(Value) -> SettleResult<Value>>;

/// Handler applied to a rejection cause. Returning `Ok` recovers: the
/// downstream promise continues with the returned value.
pub type RejectHandler = Box<dyn FnOnce(Fault) -> SettleResult<Value>>;

/// Settles the downstream promise of a continuation with a final outcome.
pub(crate) type CompletionSink = Box<dyn FnOnce(SettleResult<Value>)>;

/// How a continuation treats the value its handler produced.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Mode {
    /// Flatten future-like results into the downstream promise.
    Chain,
    /// Pass the result through verbatim, future-like or not.
    Map,
    /// Require a future-like result and bridge its outcome.
    Bind,
}

/// One registered continuation: a pair of handlers, the composition mode,
/// and the sink that settles the downstream promise.
struct Continuation {
    mode: Mode,
    on_fulfill: Option<FulfillHandler>,
    on_reject: Option<RejectHandler>,
    sink: CompletionSink,
}

enum State {
    Pending,
    Fulfilled(Value),
    Rejected(Fault),
}

struct Inner {
    state: RefCell<State>,
    continuations: RefCell<Vec<Continuation>>,
    // Set when `resolve` starts adopting a future-like value: the promise
    // stays pending, but its resolution now belongs to the adopted outcome
    // and external resolve/reject calls are ignored.
    resolution_claimed: Cell<bool>,
    scheduler: Rc<Scheduler>,
}

/// A value or failure that is not known yet.
///
/// Cloning is cheap and shares the underlying state; equality between
/// promises is identity, tested with [`Promise::ptr_eq`].
#[derive(Clone)]
pub struct Promise {
    inner: Rc<Inner>,
}

impl Promise {
    /// Create a pending promise dispatching on the given scheduler.
    pub fn new(scheduler: &Rc<Scheduler>) -> Promise {
        Promise {
            inner: Rc::new(Inner {
                state: RefCell::new(State::Pending),
                continuations: RefCell::new(Vec::new()),
                resolution_claimed: Cell::new(false),
                scheduler: scheduler.clone(),
            }),
        }
    }

    /// Create a promise pre-settled with `value`.
    ///
    /// Goes through [`Promise::resolve`], so a future-like value is adopted
    /// rather than wrapped: the returned promise stays pending until the
    /// inner outcome is known.
    pub fn with_value(scheduler: &Rc<Scheduler>, value: Value) -> Promise {
        let promise = Promise::new(scheduler);
        promise.resolve(value);
        promise
    }

    /// Create an immediately rejected promise.
    pub fn rejected(scheduler: &Rc<Scheduler>, fault: Fault) -> Promise {
        let promise = Promise::new(scheduler);
        promise.reject(fault);
        promise
    }

    /// Create a promise from an explicit outcome: `Ok` resolves (with
    /// adoption of future-like values), `Err` rejects.
    ///
    /// This is the opt-in spelling of "failure-shaped inputs reject": a
    /// plain [`coerce`](crate::subscribe::coerce) never inspects its input
    /// for failures.
    pub fn from_outcome(scheduler: &Rc<Scheduler>, outcome: SettleResult<Value>) -> Promise {
        match outcome {
            Ok(value) => Promise::with_value(scheduler, value),
            Err(fault) => Promise::rejected(scheduler, fault),
        }
    }

    /// The scheduler this promise dispatches continuations on.
    pub fn scheduler(&self) -> &Rc<Scheduler> {
        &self.inner.scheduler
    }

    /// True iff `self` and `other` are the same promise.
    pub fn ptr_eq(&self, other: &Promise) -> bool {
        Rc::ptr_eq(&self.inner, &other.inner)
    }

    /// Fulfill the promise with `value`, or adopt `value`'s outcome when it
    /// is future-like.
    ///
    /// No-op once the promise has settled or its resolution is already
    /// claimed by an earlier adoption. Resolving a promise with itself
    /// rejects it with [`Fault::Cycle`]. When adopting a foreign future
    /// whose success and failure callbacks are both invoked, only the first
    /// invocation takes effect.
    pub fn resolve(&self, value: Value) {
        if self.inner.resolution_claimed.get() || !self.is_pending() {
            return;
        }

        if let Value::Future(other) = &value {
            if other.ptr_eq(self) {
                settle(&self.inner, Err(Fault::Cycle));
                return;
            }
        }

        if value.is_future_like() {
            self.inner.resolution_claimed.set(true);
            let target = self.inner.clone();
            subscribe_value(&value, Box::new(move |outcome| settle(&target, outcome)));
        } else {
            settle(&self.inner, Ok(value));
        }
    }

    /// Reject the promise with `fault`. No-op once settled or claimed.
    pub fn reject(&self, fault: Fault) {
        if self.inner.resolution_claimed.get() {
            return;
        }
        settle(&self.inner, Err(fault));
    }

    /// Reject with [`Fault::Cancelled`]. Cooperative: a settled promise is
    /// unaffected, and work already in flight is not stopped; downstream
    /// observers simply see the rejection.
    pub fn cancel(&self) {
        self.reject(Fault::Cancelled);
    }

    /// Compose with flattening: a handler returning a future-like value
    /// makes the returned promise adopt that value's eventual outcome, so
    /// sequential asynchronous steps never nest.
    ///
    /// Either handler may be `None`: fulfillment then passes through
    /// unchanged and rejection is rethrown.
    pub fn chain(
        &self,
        on_fulfill: Option<FulfillHandler>,
        on_reject: Option<RejectHandler>,
    ) -> Promise {
        self.compose(Mode::Chain, on_fulfill, on_reject)
    }

    /// Compose without flattening: whatever the handler returns becomes the
    /// fulfillment value verbatim, even if it is itself future-like.
    pub fn map(
        &self,
        on_fulfill: Option<FulfillHandler>,
        on_reject: Option<RejectHandler>,
    ) -> Promise {
        self.compose(Mode::Map, on_fulfill, on_reject)
    }

    /// Compose requiring a future-like result: the handler's returned
    /// future is bridged one level into the returned promise; a handler
    /// returning anything else rejects it with [`Fault::ExpectedFuture`].
    pub fn bind(
        &self,
        on_fulfill: Option<FulfillHandler>,
        on_reject: Option<RejectHandler>,
    ) -> Promise {
        self.compose(Mode::Bind, on_fulfill, on_reject)
    }

    /// Shorthand for `chain(None, Some(on_reject))`.
    pub fn rescue(&self, on_reject: RejectHandler) -> Promise {
        self.chain(None, Some(on_reject))
    }

    /// Register a raw observer invoked with the settled outcome.
    ///
    /// Observation is asynchronous like every continuation: the sink runs
    /// in a later scheduler drain even when the promise is already settled.
    pub fn observe(&self, sink: impl FnOnce(SettleResult<Value>) + 'static) {
        self.register(Continuation {
            mode: Mode::Map,
            on_fulfill: None,
            on_reject: None,
            sink: Box::new(sink),
        });
    }

    /// True iff not yet settled.
    pub fn is_pending(&self) -> bool {
        matches!(*self.inner.state.borrow(), State::Pending)
    }

    /// True iff settled with a value.
    pub fn is_fulfilled(&self) -> bool {
        matches!(*self.inner.state.borrow(), State::Fulfilled(_))
    }

    /// True iff settled with a cause.
    pub fn is_rejected(&self) -> bool {
        matches!(*self.inner.state.borrow(), State::Rejected(_))
    }

    /// True iff rejected specifically with [`Fault::Cancelled`].
    pub fn is_cancelled(&self) -> bool {
        matches!(
            *self.inner.state.borrow(),
            State::Rejected(Fault::Cancelled)
        )
    }

    /// The fulfillment value, if fulfilled.
    pub fn value(&self) -> Option<Value> {
        match &*self.inner.state.borrow() {
            State::Fulfilled(value) => Some(value.clone()),
            _ => None,
        }
    }

    /// The rejection cause, if rejected.
    pub fn fault(&self) -> Option<Fault> {
        match &*self.inner.state.borrow() {
            State::Rejected(fault) => Some(fault.clone()),
            _ => None,
        }
    }

    fn compose(
        &self,
        mode: Mode,
        on_fulfill: Option<FulfillHandler>,
        on_reject: Option<RejectHandler>,
    ) -> Promise {
        let downstream = Promise::new(&self.inner.scheduler);
        let target = downstream.inner.clone();
        self.register(Continuation {
            mode,
            on_fulfill,
            on_reject,
            sink: Box::new(move |outcome| settle(&target, outcome)),
        });
        downstream
    }

    fn register(&self, record: Continuation) {
        let settled = match &*self.inner.state.borrow() {
            State::Pending => None,
            State::Fulfilled(value) => Some(Ok(value.clone())),
            State::Rejected(fault) => Some(Err(fault.clone())),
        };

        match settled {
            None => self.inner.continuations.borrow_mut().push(record),
            Some(outcome) => enqueue_dispatch(&self.inner.scheduler, record, outcome),
        }
    }
}

impl fmt::Debug for Promise {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let state = match &*self.inner.state.borrow() {
            State::Pending => "pending",
            State::Fulfilled(_) => "fulfilled",
            State::Rejected(_) => "rejected",
        };
        write!(f, "Promise({})", state)
    }
}

/// Transition to a settled state and hand every queued continuation to the
/// scheduler. No-op when already settled; the drained queue is never
/// refilled.
fn settle(inner: &Rc<Inner>, outcome: SettleResult<Value>) {
    {
        let mut state = inner.state.borrow_mut();
        if !matches!(*state, State::Pending) {
            return;
        }
        *state = match &outcome {
            Ok(value) => State::Fulfilled(value.clone()),
            Err(fault) => State::Rejected(fault.clone()),
        };
    }

    let records: Vec<Continuation> = inner.continuations.borrow_mut().drain(..).collect();
    for record in records {
        enqueue_dispatch(&inner.scheduler, record, outcome.clone());
    }
}

fn enqueue_dispatch(scheduler: &Rc<Scheduler>, record: Continuation, outcome: SettleResult<Value>) {
    scheduler.enqueue(Box::new(move || dispatch(record, outcome)));
}

/// Resolve one continuation against a settled outcome. Runs inside a
/// scheduler task, never inline with whoever caused the settlement.
fn dispatch(record: Continuation, outcome: SettleResult<Value>) {
    let Continuation {
        mode,
        on_fulfill,
        on_reject,
        sink,
    } = record;

    let (produced, defaulted) = match outcome {
        Ok(value) => match on_fulfill {
            Some(handler) => (handler(value), false),
            None => (Ok(value), true),
        },
        Err(cause) => match on_reject {
            Some(handler) => (handler(cause), false),
            None => (Err(cause), true),
        },
    };

    // A missing bind handler has nothing to bridge; its passthrough value
    // completes verbatim instead of tripping the future-likeness check.
    let mode = if defaulted && mode == Mode::Bind {
        Mode::Map
    } else {
        mode
    };

    complete(mode, sink, produced);
}

/// Feed a handler's result into the completion sink according to the
/// composition mode. Re-entered recursively while `Chain` results keep
/// producing future-like values.
fn complete(mode: Mode, sink: CompletionSink, produced: SettleResult<Value>) {
    let value = match produced {
        Ok(value) => value,
        Err(cause) => {
            sink(Err(cause));
            return;
        }
    };

    match mode {
        Mode::Map => sink(Ok(value)),
        Mode::Chain if value.is_future_like() => {
            subscribe_value(
                &value,
                Box::new(move |outcome| complete(Mode::Chain, sink, outcome)),
            );
        }
        Mode::Chain => sink(Ok(value)),
        Mode::Bind if value.is_future_like() => subscribe_value(&value, sink),
        Mode::Bind => sink(Err(Fault::ExpectedFuture)),
    }
}
