//! The future-likeness capability and assimilation of foreign futures.
//!
//! There is no structural detection of "thenables": a value is future-like
//! iff it carries the [`Subscribe`] capability, either as a native
//! [`Promise`] or as a foreign object adapted behind
//! [`Value::Foreign`]. The trait is also the interop surface in the other
//! direction: external code that expects a dual-continuation registration
//! can consume a native promise through it.

use std::cell::RefCell;
use std::rc::Rc;

use crate::error::Fault;
use crate::promise::{CompletionSink, Promise};
use crate::scheduler::Scheduler;
use crate::value::Value;

/// Capability to register a pair of settlement continuations.
///
/// The single bridging operation of the interop contract: exactly one of
/// the two callbacks is eventually invoked with the outcome. Implementors
/// that misbehave and invoke both are tolerated by the core; adoption
/// honors only the first invocation.
pub trait Subscribe {
    /// Register continuations for the eventual outcome.
    fn subscribe(&self, on_fulfill: Box<dyn FnOnce(Value)>, on_reject: Box<dyn FnOnce(Fault)>);
}

impl Subscribe for Promise {
    fn subscribe(&self, on_fulfill: Box<dyn FnOnce(Value)>, on_reject: Box<dyn FnOnce(Fault)>) {
        self.observe(move |outcome| match outcome {
            Ok(value) => on_fulfill(value),
            Err(cause) => on_reject(cause),
        });
    }
}

/// True iff `value` carries the [`Subscribe`] capability.
pub fn is_future_like(value: &Value) -> bool {
    matches!(value, Value::Future(_) | Value::Foreign(_))
}

/// Adapt any value into a native promise.
///
/// A native future is returned unchanged; a foreign future is bridged into
/// a new promise adopting its outcome; anything else becomes an immediately
/// fulfilled promise holding the value. Failure-shaped inputs are *not*
/// special-cased; use [`Promise::from_outcome`] to reject explicitly.
pub fn coerce(scheduler: &Rc<Scheduler>, value: Value) -> Promise {
    match value {
        Value::Future(promise) => promise,
        Value::Foreign(_) => {
            let bridged = Promise::new(scheduler);
            let target = bridged.clone();
            subscribe_value(
                &value,
                Box::new(move |outcome| match outcome {
                    Ok(value) => target.resolve(value),
                    Err(cause) => target.reject(cause),
                }),
            );
            bridged
        }
        other => Promise::with_value(scheduler, other),
    }
}

/// Route the eventual outcome of a future-like value into `sink`.
///
/// For a foreign future the sink is armed behind a first-call-wins latch:
/// whichever of the foreign callbacks fires first consumes it, and the
/// other becomes a no-op. A non-future-like value completes immediately.
pub(crate) fn subscribe_value(value: &Value, sink: CompletionSink) {
    match value {
        Value::Future(promise) => promise.observe(sink),
        Value::Foreign(foreign) => {
            let armed: Rc<RefCell<Option<CompletionSink>>> = Rc::new(RefCell::new(Some(sink)));
            let fulfill_armed = armed.clone();
            foreign.subscribe(
                Box::new(move |value| {
                    let sink = fulfill_armed.borrow_mut().take();
                    if let Some(sink) = sink {
                        sink(Ok(value));
                    }
                }),
                Box::new(move |cause| {
                    let sink = armed.borrow_mut().take();
                    if let Some(sink) = sink {
                        sink(Err(cause));
                    }
                }),
            );
        }
        other => sink(Ok(other.clone())),
    }
}
