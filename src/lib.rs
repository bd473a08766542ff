//! Single-threaded deferred values with thenable adoption.
//!
//! A [`Future`] is settled at most once, by the [`Resolve`]/[`Reject`]
//! capabilities its initializer receives or by adopting another deferred
//! value. Continuations attached with [`Future::then`] run as tasks on a
//! [`Schedule`] implementation such as [`MicrotaskQueue`], in registration
//! order, and never inside the call that attached or settled them.
//!
//! # Examples
//!
//! ```
//! use promise_then::{EventLoop, Future, Resolution};
//! let event_loop = EventLoop::new();
//! let timer = event_loop.timer().clone();
//! let inner: Future<i32> = Future::new(event_loop.queue(), move |resolve, _| {
//!     timer.after(100, move || resolve.value(5));
//!     Ok(())
//! });
//! let outer: Future<i32> = Future::new(event_loop.queue(), |resolve, _| {
//!     resolve.call(inner);
//!     Ok(())
//! });
//! let seen = outer.and_then(|value| Ok(Resolution::Value(value)));
//! event_loop.run().unwrap();
//! assert_eq!(seen.value(), Some(5));
//! ```
use std::any::Any;

pub mod consumer;
pub mod event_loop;
pub mod future;
pub mod queue;
pub mod resolution;
pub mod timer;

pub use consumer::Consumer;
pub use event_loop::{Config, EventLoop};
pub use future::{Deferred, Future, Reject, Resolve, State};
pub use queue::{MicrotaskQueue, Schedule, Task};
pub use resolution::{OnReason, OnValue, Outcome, Resolution, Thenable};
pub use timer::Timer;

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum Error {
    #[error("chaining cycle detected for future")]
    ChainingCycle,
    #[error("callback panicked: {0}")]
    Panicked(String),
    #[error("{0}")]
    Rejected(String),
    #[error("event loop exhausted its budget of {0} tasks")]
    BudgetExhausted(usize),
}

impl Error {
    pub(crate) fn panicked(payload: Box<dyn Any + Send>) -> Self {
        let message = match payload.downcast::<String>() {
            Ok(message) => *message,
            Err(payload) => match payload.downcast::<&'static str>() {
                Ok(message) => message.to_string(),
                Err(_) => "unknown panic payload".to_string(),
            },
        };
        Error::Panicked(message)
    }
}

impl From<&str> for Error {
    fn from(reason: &str) -> Self {
        Error::Rejected(reason.to_string())
    }
}

impl From<String> for Error {
    fn from(reason: String) -> Self {
        Error::Rejected(reason)
    }
}
