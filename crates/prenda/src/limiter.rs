//! Cooperative concurrency limiter.
//!
//! Caps how many future-producing jobs run at once. Jobs beyond the cap
//! wait in a bounded FIFO queue; jobs beyond the queue bound are rejected
//! outright with [`Fault::CapacityReached`]. Every slot release re-pumps
//! the queue through the scheduler, so completion of one job launches the
//! next on a later drain.

use std::cell::{Cell, RefCell};
use std::collections::VecDeque;
use std::rc::Rc;

use crate::error::{Fault, SettleResult};
use crate::promise::Promise;
use crate::scheduler::Scheduler;
use crate::subscribe::subscribe_value;
use crate::value::Value;

/// Produces the future-like work of one job when its slot is granted.
pub type JobFactory = Box<dyn FnOnce() -> SettleResult<Value>>;

struct Job {
    factory: JobFactory,
    response: Promise,
}

struct LimiterInner {
    scheduler: Rc<Scheduler>,
    waiting: RefCell<VecDeque<Job>>,
    active: Cell<usize>,
    max_concurrency: usize,
    max_queue_size: usize,
}

/// Bounds concurrent execution of future-producing jobs.
pub struct Limiter {
    inner: Rc<LimiterInner>,
}

impl Limiter {
    /// Create a limiter running at most `max_concurrency` jobs at once and
    /// holding at most `max_queue_size` jobs waiting.
    ///
    /// # Panics
    ///
    /// Panics when either bound is zero.
    pub fn new(scheduler: &Rc<Scheduler>, max_concurrency: usize, max_queue_size: usize) -> Limiter {
        assert!(max_concurrency > 0, "max_concurrency must be at least 1");
        assert!(max_queue_size > 0, "max_queue_size must be at least 1");

        Limiter {
            inner: Rc::new(LimiterInner {
                scheduler: scheduler.clone(),
                waiting: RefCell::new(VecDeque::new()),
                active: Cell::new(0),
                max_concurrency,
                max_queue_size,
            }),
        }
    }

    /// Submit a job. The returned promise settles with the outcome of the
    /// future the factory produces.
    ///
    /// Rejects immediately with [`Fault::CapacityReached`] when the wait
    /// queue is full, and with [`Fault::ExpectedFuture`] when the factory
    /// returns a non-future-like value. Cancelling the returned promise
    /// while the job still waits removes it from consideration without
    /// consuming a slot.
    pub fn add(&self, factory: JobFactory) -> Promise {
        let inner = &self.inner;
        if inner.waiting.borrow().len() >= inner.max_queue_size {
            return Promise::rejected(
                &inner.scheduler,
                Fault::CapacityReached {
                    capacity: inner.max_queue_size,
                },
            );
        }

        let response = Promise::new(&inner.scheduler);
        inner.waiting.borrow_mut().push_back(Job {
            factory,
            response: response.clone(),
        });
        schedule_pump(inner);
        response
    }

    /// Number of jobs waiting for a slot.
    pub fn queued(&self) -> usize {
        self.inner.waiting.borrow().len()
    }

    /// Number of jobs currently holding a slot.
    pub fn active(&self) -> usize {
        self.inner.active.get()
    }

    /// Remaining room in the wait queue.
    pub fn remaining_queue_capacity(&self) -> usize {
        self.inner.max_queue_size - self.queued()
    }

    /// Remaining free slots.
    pub fn remaining_active_capacity(&self) -> usize {
        self.inner.max_concurrency - self.active()
    }
}

fn schedule_pump(inner: &Rc<LimiterInner>) {
    let target = inner.clone();
    inner.scheduler.enqueue(Box::new(move || pump(&target)));
}

/// Launch waiting jobs while free slots remain.
fn pump(inner: &Rc<LimiterInner>) {
    loop {
        if inner.active.get() >= inner.max_concurrency {
            return;
        }
        let job = match inner.waiting.borrow_mut().pop_front() {
            Some(job) => job,
            None => return,
        };
        if job.response.is_cancelled() {
            continue;
        }
        inner.active.set(inner.active.get() + 1);
        launch(inner, job);
    }
}

fn launch(inner: &Rc<LimiterInner>, job: Job) {
    let produced = (job.factory)();
    let work = match produced {
        Ok(value) if value.is_future_like() => value,
        Ok(_) => {
            release(inner);
            job.response.reject(Fault::ExpectedFuture);
            return;
        }
        Err(cause) => {
            release(inner);
            job.response.reject(cause);
            return;
        }
    };

    let slot_owner = inner.clone();
    let response = job.response;
    subscribe_value(
        &work,
        Box::new(move |outcome| {
            release(&slot_owner);
            schedule_pump(&slot_owner);
            match outcome {
                Ok(value) => response.resolve(value),
                Err(cause) => response.reject(cause),
            }
        }),
    );
}

fn release(inner: &Rc<LimiterInner>) {
    inner.active.set(inner.active.get() - 1);
}

#[cfg(test)]
mod tests {
    use super::*;

    fn scheduler() -> Rc<Scheduler> {
        Rc::new(Scheduler::new())
    }

    fn job_returning(promise: &Promise) -> JobFactory {
        let value = Value::Future(promise.clone());
        Box::new(move || Ok(value))
    }

    #[test]
    #[should_panic(expected = "max_concurrency must be at least 1")]
    fn test_zero_concurrency_is_refused() {
        let scheduler = scheduler();
        let _ = Limiter::new(&scheduler, 0, 4);
    }

    #[test]
    fn test_concurrency_is_capped() {
        let scheduler = scheduler();
        let limiter = Limiter::new(&scheduler, 2, 16);

        let work: Vec<Promise> = (0..5).map(|_| Promise::new(&scheduler)).collect();
        let responses: Vec<Promise> = work.iter().map(|w| limiter.add(job_returning(w))).collect();

        scheduler.run_until_idle();
        assert_eq!(limiter.active(), 2);
        assert_eq!(limiter.queued(), 3);

        work[0].resolve(Value::Int(0));
        scheduler.run_until_idle();
        assert_eq!(limiter.active(), 2);
        assert_eq!(limiter.queued(), 2);
        assert_eq!(responses[0].value(), Some(Value::Int(0)));

        for (index, inner) in work.iter().enumerate().skip(1) {
            inner.resolve(Value::Int(index as i64));
        }
        scheduler.run_until_idle();
        assert_eq!(limiter.active(), 0);
        assert_eq!(limiter.queued(), 0);
        assert!(responses.iter().all(|r| r.is_fulfilled()));
    }

    #[test]
    fn test_full_queue_rejects_submission() {
        let scheduler = scheduler();
        let limiter = Limiter::new(&scheduler, 1, 1);

        let first = Promise::new(&scheduler);
        let _accepted = limiter.add(job_returning(&first));
        let overflow = limiter.add(job_returning(&Promise::new(&scheduler)));

        assert_eq!(
            overflow.fault(),
            Some(Fault::CapacityReached { capacity: 1 })
        );
    }

    #[test]
    fn test_factory_failure_releases_the_slot() {
        let scheduler = scheduler();
        let limiter = Limiter::new(&scheduler, 1, 8);

        let failed = limiter.add(Box::new(|| Err(Fault::host(Value::str("no work")))));
        let work = Promise::new(&scheduler);
        let next = limiter.add(job_returning(&work));

        scheduler.run_until_idle();
        assert_eq!(failed.fault(), Some(Fault::host(Value::str("no work"))));
        assert_eq!(limiter.active(), 1);

        work.resolve(Value::Int(1));
        scheduler.run_until_idle();
        assert_eq!(next.value(), Some(Value::Int(1)));
        assert_eq!(limiter.active(), 0);
    }

    #[test]
    fn test_non_future_result_rejects_the_job() {
        let scheduler = scheduler();
        let limiter = Limiter::new(&scheduler, 1, 8);

        let response = limiter.add(Box::new(|| Ok(Value::Int(5))));
        scheduler.run_until_idle();

        assert_eq!(response.fault(), Some(Fault::ExpectedFuture));
        assert_eq!(limiter.active(), 0);
    }

    #[test]
    fn test_cancelled_while_queued_is_skipped() {
        let scheduler = scheduler();
        let limiter = Limiter::new(&scheduler, 1, 8);

        let first_work = Promise::new(&scheduler);
        let first = limiter.add(job_returning(&first_work));
        let second = limiter.add(job_returning(&Promise::new(&scheduler)));
        let third_work = Promise::new(&scheduler);
        let third = limiter.add(job_returning(&third_work));

        scheduler.run_until_idle();
        second.cancel();

        first_work.resolve(Value::Int(1));
        scheduler.run_until_idle();

        assert_eq!(first.value(), Some(Value::Int(1)));
        assert!(second.is_cancelled());
        assert_eq!(limiter.active(), 1);
        assert_eq!(limiter.queued(), 0);

        third_work.resolve(Value::Int(3));
        scheduler.run_until_idle();
        assert_eq!(third.value(), Some(Value::Int(3)));
        assert_eq!(limiter.active(), 0);
    }

    #[test]
    fn test_capacity_introspection() {
        let scheduler = scheduler();
        let limiter = Limiter::new(&scheduler, 3, 10);

        assert_eq!(limiter.remaining_active_capacity(), 3);
        assert_eq!(limiter.remaining_queue_capacity(), 10);

        let work = Promise::new(&scheduler);
        let _response = limiter.add(job_returning(&work));
        assert_eq!(limiter.remaining_queue_capacity(), 9);

        scheduler.run_until_idle();
        assert_eq!(limiter.remaining_active_capacity(), 2);
        assert_eq!(limiter.remaining_queue_capacity(), 10);
    }
}
