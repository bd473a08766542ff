//! How a value handed to a resolving function becomes a future's outcome.
//!
//! A plain value fulfills the target directly. Anything exposing a
//! [`Thenable`] subscription is adopted instead: the target settles however
//! the thenable eventually settles, unwrapping as many layers as it takes.
use crate::{future::Future, Error};
use std::{
    cell::Cell,
    panic::{self, AssertUnwindSafe},
    rc::Rc,
};
use tracing::debug;

/// Receives the value a thenable settled with. It may itself be another
/// thenable, which will be adopted in turn.
pub type OnValue<T, E> = Box<dyn Fn(Resolution<T, E>)>;

/// Receives the reason a thenable rejected with.
pub type OnReason<E> = Box<dyn Fn(E)>;

/// What a continuation hands back. `Err` means the continuation failed and the
/// downstream future rejects with that reason.
pub type Outcome<T, E = Error> = Result<Resolution<T, E>, E>;

/// Anything that can report a deferred outcome to a pair of callbacks.
///
/// Implementations may call the callbacks late, more than once, or both; only
/// the first call has any effect. Returning `Err` before calling either one
/// rejects the adopting future with that error.
pub trait Thenable<T, E> {
    fn subscribe(&self, on_value: OnValue<T, E>, on_reason: OnReason<E>) -> Result<(), E>;
}

/// A value that is either known now or still has to be adopted.
pub enum Resolution<T, E = Error> {
    Value(T),
    Future(Future<T, E>),
    Thenable(Rc<dyn Thenable<T, E>>),
}

impl<T, E> From<Future<T, E>> for Resolution<T, E> {
    fn from(future: Future<T, E>) -> Self {
        Resolution::Future(future)
    }
}

impl<T, E> Resolution<T, E> {
    pub fn thenable(thenable: impl Thenable<T, E> + 'static) -> Self {
        Resolution::Thenable(Rc::new(thenable))
    }
}

/// Makes `x` the outcome of `target`.
pub(crate) fn resolve_into<T, E>(target: &Future<T, E>, x: Resolution<T, E>)
where
    T: Clone + 'static,
    E: Clone + From<Error> + 'static,
{
    match x {
        Resolution::Value(value) => target.settle_fulfilled(value),
        Resolution::Future(future) if future.ptr_eq(target) => {
            debug!("future resolved with itself");
            target.settle_rejected(Error::ChainingCycle.into());
        }
        Resolution::Future(future) => adopt(target, &future),
        Resolution::Thenable(thenable) => adopt(target, &*thenable),
    }
}

fn adopt<T, E>(target: &Future<T, E>, thenable: &dyn Thenable<T, E>)
where
    T: Clone + 'static,
    E: Clone + From<Error> + 'static,
{
    // Shared by both callbacks and the error path: first settlement wins.
    let called = Rc::new(Cell::new(false));

    let on_value: OnValue<T, E> = {
        let (target, called) = (target.clone(), called.clone());
        Box::new(move |y| {
            if !called.replace(true) {
                resolve_into(&target, y);
            }
        })
    };
    let on_reason: OnReason<E> = {
        let (target, called) = (target.clone(), called.clone());
        Box::new(move |reason| {
            if !called.replace(true) {
                target.settle_rejected(reason);
            }
        })
    };

    let subscribed = panic::catch_unwind(AssertUnwindSafe(|| {
        thenable.subscribe(on_value, on_reason)
    }))
    .unwrap_or_else(|payload| Err(Error::panicked(payload).into()));

    if let Err(reason) = subscribed {
        if !called.replace(true) {
            debug!("thenable failed to subscribe");
            target.settle_rejected(reason);
        }
    }
}
