//! Dynamic payload type carried by promises.
//!
//! Fulfillment values are dynamically typed: a settled promise can hold a
//! scalar, a list, another promise, or a foreign future-like object. The
//! future-carrying variants are what the dispatcher inspects when deciding
//! whether to flatten or bridge a handler's result.

use std::fmt;
use std::rc::Rc;

use crate::promise::Promise;
use crate::subscribe::Subscribe;

/// A dynamically typed value.
///
/// Clones are cheap: compound payloads are reference-counted and share
/// storage with the original.
#[derive(Clone)]
pub enum Value {
    /// Absence of a value.
    Null,
    /// A boolean.
    Bool(bool),
    /// A 64-bit signed integer.
    Int(i64),
    /// A 64-bit float.
    Float(f64),
    /// An immutable string.
    Str(Rc<str>),
    /// An ordered sequence of values.
    List(Rc<Vec<Value>>),
    /// A native promise.
    Future(Promise),
    /// A foreign future-like object exposing the subscription capability.
    Foreign(Rc<dyn Subscribe>),
}

impl Value {
    /// Build a string value.
    pub fn str(text: impl Into<Rc<str>>) -> Value {
        Value::Str(text.into())
    }

    /// Build a list value.
    pub fn list(items: Vec<Value>) -> Value {
        Value::List(Rc::new(items))
    }

    /// True iff this value carries the subscription capability, i.e. it is a
    /// native promise or an adapted foreign future.
    pub fn is_future_like(&self) -> bool {
        crate::subscribe::is_future_like(self)
    }
}

impl PartialEq for Value {
    fn eq(&self, other: &Value) -> bool {
        match (self, other) {
            (Value::Null, Value::Null) => true,
            (Value::Bool(a), Value::Bool(b)) => a == b,
            (Value::Int(a), Value::Int(b)) => a == b,
            (Value::Float(a), Value::Float(b)) => a == b,
            (Value::Str(a), Value::Str(b)) => a == b,
            (Value::List(a), Value::List(b)) => a == b,
            (Value::Future(a), Value::Future(b)) => a.ptr_eq(b),
            (Value::Foreign(a), Value::Foreign(b)) => {
                // Identity, not structure. Compare data pointers so trait
                // objects with distinct vtables for the same allocation
                // still match.
                std::ptr::eq(Rc::as_ptr(a) as *const (), Rc::as_ptr(b) as *const ())
            }
            _ => false,
        }
    }
}

impl fmt::Debug for Value {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Value::Null => f.write_str("Null"),
            Value::Bool(b) => f.debug_tuple("Bool").field(b).finish(),
            Value::Int(n) => f.debug_tuple("Int").field(n).finish(),
            Value::Float(x) => f.debug_tuple("Float").field(x).finish(),
            Value::Str(s) => f.debug_tuple("Str").field(s).finish(),
            Value::List(items) => f.debug_tuple("List").field(items).finish(),
            Value::Future(promise) => f.debug_tuple("Future").field(promise).finish(),
            Value::Foreign(_) => f.write_str("Foreign(..)"),
        }
    }
}

impl fmt::Display for Value {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Value::Null => f.write_str("null"),
            Value::Bool(b) => write!(f, "{}", b),
            Value::Int(n) => write!(f, "{}", n),
            Value::Float(x) => write!(f, "{}", x),
            Value::Str(s) => f.write_str(s),
            Value::List(items) => {
                f.write_str("[")?;
                for (i, item) in items.iter().enumerate() {
                    if i > 0 {
                        f.write_str(", ")?;
                    }
                    write!(f, "{}", item)?;
                }
                f.write_str("]")
            }
            Value::Future(_) => f.write_str("<future>"),
            Value::Foreign(_) => f.write_str("<foreign future>"),
        }
    }
}

impl From<bool> for Value {
    fn from(b: bool) -> Value {
        Value::Bool(b)
    }
}

impl From<i64> for Value {
    fn from(n: i64) -> Value {
        Value::Int(n)
    }
}

impl From<f64> for Value {
    fn from(x: f64) -> Value {
        Value::Float(x)
    }
}

impl From<&str> for Value {
    fn from(s: &str) -> Value {
        Value::str(s)
    }
}

impl From<Promise> for Value {
    fn from(promise: Promise) -> Value {
        Value::Future(promise)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::scheduler::Scheduler;

    fn scheduler() -> Rc<Scheduler> {
        Rc::new(Scheduler::new())
    }

    #[test]
    fn test_scalar_equality() {
        assert_eq!(Value::Int(3), Value::Int(3));
        assert_ne!(Value::Int(3), Value::Int(4));
        assert_ne!(Value::Int(3), Value::Float(3.0));
        assert_eq!(Value::str("a"), Value::str("a"));
        assert_eq!(Value::Null, Value::Null);
    }

    #[test]
    fn test_future_equality_is_identity() {
        let scheduler = scheduler();
        let a = Promise::new(&scheduler);
        let b = Promise::new(&scheduler);

        assert_eq!(Value::Future(a.clone()), Value::Future(a.clone()));
        assert_ne!(Value::Future(a), Value::Future(b));
    }

    #[test]
    fn test_list_display() {
        let list = Value::list(vec![Value::Int(1), Value::str("x"), Value::Null]);
        assert_eq!(list.to_string(), "[1, x, null]");
    }

    #[test]
    fn test_future_likeness() {
        let scheduler = scheduler();
        assert!(Value::Future(Promise::new(&scheduler)).is_future_like());
        assert!(!Value::Int(1).is_future_like());
        assert!(!Value::list(vec![]).is_future_like());
    }
}
