//! Rejection causes and the settlement result type.

use crate::value::Value;

/// Result of applying a handler or settling a deferred value.
///
/// `Err` is the "thrown" channel: a handler that fails returns `Err` and the
/// dispatcher turns it into a rejection of the downstream promise.
pub type SettleResult<T> = Result<T, Fault>;

/// Why a promise rejected.
#[derive(Debug, Clone, PartialEq, thiserror::Error)]
pub enum Fault {
    /// A promise was resolved with itself.
    #[error("promise resolved with itself")]
    Cycle,

    /// A handler that must produce a future-like value produced something else.
    #[error("expected a future-like value")]
    ExpectedFuture,

    /// The promise was cancelled before it settled.
    #[error("promise cancelled")]
    Cancelled,

    /// A cause supplied by calling code, passed through unchanged.
    #[error("{0}")]
    Host(Value),

    /// Every input rejected; carries each cause in input order.
    #[error("no input fulfilled ({n} rejections)", n = .causes.len())]
    AllRejected {
        /// Rejection cause of each input, in input order.
        causes: Vec<Fault>,
    },

    /// A bounded wait queue was already full.
    #[error("wait queue has reached capacity: {capacity}")]
    CapacityReached {
        /// The queue bound that was hit.
        capacity: usize,
    },
}

impl Fault {
    /// Wrap a host-supplied value as a rejection cause.
    pub fn host(value: Value) -> Fault {
        Fault::Host(value)
    }
}

impl From<Value> for Fault {
    fn from(value: Value) -> Fault {
        Fault::Host(value)
    }
}
