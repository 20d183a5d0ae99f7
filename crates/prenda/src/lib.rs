//! Prenda: deferred values for cooperative runtimes.
//!
//! This crate provides a promise abstraction for single-threaded
//! cooperative scheduling:
//! - **Promise**: a value or failure not yet known, settled exactly once
//!   (`promise` module)
//! - **Scheduler**: a FIFO task queue draining continuations asynchronously
//!   (`scheduler` module)
//! - **Combinators**: `all`, `race`, `any` over sequences of futures
//!   (`combinators` module)
//! - **Assimilation**: adapting foreign future-like objects through the
//!   [`Subscribe`] capability (`subscribe` module)
//! - **Limiter**: bounded concurrent execution of future-producing jobs
//!   (`limiter` module)
//!
//! # Example
//!
//! ```rust,ignore
//! use std::rc::Rc;
//! use prenda::{Promise, Scheduler, Value};
//!
//! let scheduler = Rc::new(Scheduler::new());
//! let started = Promise::with_value(&scheduler, Value::Int(20));
//!
//! let doubled = started.chain(
//!     Some(Box::new(|value| match value {
//!         Value::Int(n) => Ok(Value::Int(n * 2)),
//!         other => Ok(other),
//!     })),
//!     None,
//! );
//!
//! scheduler.run_until_idle();
//! assert_eq!(doubled.value(), Some(Value::Int(40)));
//! ```
//!
//! Continuations never run synchronously with the call that registered or
//! settled them: they run when the embedding host drains the scheduler.
//! Cancellation is cooperative (rejection-based); there is no preemption
//! and no thread-level parallelism in this core.

#![warn(missing_docs)]
#![warn(rust_2018_idioms)]

/// Aggregate combinators: `all`, `race`, `any`.
pub mod combinators;

/// Rejection causes and the settlement result type.
pub mod error;

/// Bounded concurrent execution of future-producing jobs.
pub mod limiter;

/// The deferred-value state machine and continuation dispatch.
pub mod promise;

/// The FIFO task queue and drain protocol.
pub mod scheduler;

/// The future-likeness capability and coercion.
pub mod subscribe;

/// The dynamic payload type.
pub mod value;

pub use combinators::{all, any, race};
pub use error::{Fault, SettleResult};
pub use limiter::{JobFactory, Limiter};
pub use promise::{FulfillHandler, Promise, RejectHandler};
pub use scheduler::{Scheduler, SchedulerConfig, Task};
pub use subscribe::{coerce, is_future_like, Subscribe};
pub use value::Value;
