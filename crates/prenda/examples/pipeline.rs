//! Small end-to-end tour: a chained pipeline, a recovery step, and a
//! limiter bounding concurrent work.

use std::rc::Rc;

use prenda::{all, Fault, Limiter, Promise, Scheduler, Value};

fn main() {
    let scheduler = Rc::new(Scheduler::new());

    // A pipeline of asynchronous steps. Each stage returns a future and
    // `chain` flattens it into the next stage's input.
    let stage_scheduler = scheduler.clone();
    let pipeline = Promise::with_value(&scheduler, Value::Int(2))
        .chain(
            Some(Box::new(move |value| {
                let squared = match value {
                    Value::Int(n) => Value::Int(n * n),
                    other => other,
                };
                Ok(Value::Future(Promise::with_value(&stage_scheduler, squared)))
            })),
            None,
        )
        .chain(
            Some(Box::new(|value| {
                Ok(Value::str(format!("pipeline produced {}", value)))
            })),
            None,
        );

    // A failing step recovered with `rescue`.
    let recovered = Promise::rejected(&scheduler, Fault::host(Value::str("flaky backend")))
        .rescue(Box::new(|fault| {
            Ok(Value::str(format!("recovered from: {}", fault)))
        }));

    // A limiter running at most two jobs at a time.
    let limiter = Limiter::new(&scheduler, 2, 16);
    let jobs: Vec<Promise> = (0..4i64)
        .map(|i| {
            let job_scheduler = scheduler.clone();
            limiter.add(Box::new(move || {
                let work = Promise::with_value(&job_scheduler, Value::Int(i * 10));
                Ok(Value::Future(work))
            }))
        })
        .collect();
    let batch = all(
        &scheduler,
        jobs.into_iter().map(Value::Future).collect(),
    );

    scheduler.run_until_idle();

    for result in [pipeline, recovered, batch] {
        match (result.value(), result.fault()) {
            (Some(value), _) => println!("fulfilled: {}", value),
            (_, Some(fault)) => println!("rejected: {}", fault),
            _ => println!("still pending"),
        }
    }
}
