//! The deferred value itself.
//!
//! A [`Future`] starts out pending and settles at most once. Continuations
//! attached with [`Future::then`] always run from the scheduler, never inside
//! the call that attached them or the call that settled the future.
use crate::{
    queue::Schedule,
    resolution::{resolve_into, OnReason, OnValue, Outcome, Resolution, Thenable},
    Error,
};
use std::{
    cell::RefCell,
    fmt,
    mem,
    panic::{self, AssertUnwindSafe},
    rc::Rc,
};
use tracing::{debug, trace};

type Continuation<A> = Box<dyn FnOnce(A)>;

/// Where a future is in its lifecycle.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum State {
    Pending,
    Fulfilled,
    Rejected,
}

enum Slot<T, E> {
    Pending {
        on_fulfilled: Vec<Continuation<T>>,
        on_rejected: Vec<Continuation<E>>,
    },
    Fulfilled(T),
    Rejected(E),
}

struct Inner<T, E> {
    slot: Slot<T, E>,
    // Latched by the first call to the initializer's resolve/reject.
    resolved: bool,
    scheduler: Rc<dyn Schedule>,
}

/// A handle to a value that is not known yet.
///
/// Cloning the handle does not clone the value: every clone observes the
/// same settlement.
///
/// # Examples
///
/// ```
/// use promise_then::{Future, MicrotaskQueue, Resolution};
/// let queue = MicrotaskQueue::new();
/// let future: Future<i32> = Future::new(&queue, |resolve, _reject| {
///     resolve.value(1);
///     Ok(())
/// });
/// let next = future.and_then(|value| Ok(Resolution::Value(value + 1)));
/// // Nothing runs until the queue is driven.
/// assert!(next.is_pending());
/// queue.run_until_stalled();
/// assert_eq!(next.value(), Some(2));
/// ```
pub struct Future<T, E = Error> {
    inner: Rc<RefCell<Inner<T, E>>>,
}

impl<T, E> Clone for Future<T, E> {
    fn clone(&self) -> Self {
        Self {
            inner: self.inner.clone(),
        }
    }
}

/// The fulfilling capability handed to an initializer.
pub struct Resolve<T, E = Error> {
    future: Future<T, E>,
}

/// The rejecting capability handed to an initializer.
pub struct Reject<T, E = Error> {
    future: Future<T, E>,
}

impl<T, E> Clone for Resolve<T, E> {
    fn clone(&self) -> Self {
        Self {
            future: self.future.clone(),
        }
    }
}

impl<T, E> Clone for Reject<T, E> {
    fn clone(&self) -> Self {
        Self {
            future: self.future.clone(),
        }
    }
}

/// A pending future together with the capabilities that settle it.
pub struct Deferred<T, E = Error> {
    pub future: Future<T, E>,
    pub resolve: Resolve<T, E>,
    pub reject: Reject<T, E>,
}

impl<T, E> Future<T, E> {
    /// Whether both handles point at the same future.
    pub fn ptr_eq(&self, other: &Self) -> bool {
        Rc::ptr_eq(&self.inner, &other.inner)
    }

    pub fn state(&self) -> State {
        match self.inner.borrow().slot {
            Slot::Pending { .. } => State::Pending,
            Slot::Fulfilled(_) => State::Fulfilled,
            Slot::Rejected(_) => State::Rejected,
        }
    }

    pub fn is_pending(&self) -> bool {
        self.state() == State::Pending
    }

    fn scheduler(&self) -> Rc<dyn Schedule> {
        self.inner.borrow().scheduler.clone()
    }

    /// Latches the initializer capabilities. True only for the first caller.
    fn latch(&self) -> bool {
        !mem::replace(&mut self.inner.borrow_mut().resolved, true)
    }
}

impl<T, E> Future<T, E>
where
    T: Clone + 'static,
    E: Clone + From<Error> + 'static,
{
    /// Creates a future and runs `init` synchronously with the capabilities
    /// that settle it.
    ///
    /// An `Err` returned from `init`, or a panic inside it, rejects the
    /// future unless `init` already resolved or rejected it.
    pub fn new<S, F>(scheduler: &S, init: F) -> Self
    where
        S: Schedule + Clone + 'static,
        F: FnOnce(Resolve<T, E>, Reject<T, E>) -> Result<(), E>,
    {
        let future = Self::pending(Rc::new(scheduler.clone()));
        let resolve = Resolve {
            future: future.clone(),
        };
        let reject = Reject {
            future: future.clone(),
        };
        let failed = {
            let reject = reject.clone();
            match panic::catch_unwind(AssertUnwindSafe(move || init(resolve, reject))) {
                Ok(result) => result.err(),
                Err(payload) => {
                    debug!("future initializer panicked");
                    Some(Error::panicked(payload).into())
                }
            }
        };
        if let Some(reason) = failed {
            reject.call(reason);
        }
        future
    }

    /// A pending future whose capabilities are handed to the caller.
    ///
    /// # Examples
    ///
    /// ```
    /// use promise_then::{Future, MicrotaskQueue};
    /// let queue = MicrotaskQueue::new();
    /// let deferred = Future::<String>::deferred(&queue);
    /// deferred.resolve.value("🍓".into());
    /// assert_eq!(deferred.future.value().as_deref(), Some("🍓"));
    /// ```
    pub fn deferred<S>(scheduler: &S) -> Deferred<T, E>
    where
        S: Schedule + Clone + 'static,
    {
        let future = Self::pending(Rc::new(scheduler.clone()));
        Deferred {
            resolve: Resolve {
                future: future.clone(),
            },
            reject: Reject {
                future: future.clone(),
            },
            future,
        }
    }

    pub fn resolved<S>(scheduler: &S, value: T) -> Self
    where
        S: Schedule + Clone + 'static,
    {
        let deferred = Self::deferred(scheduler);
        deferred.resolve.value(value);
        deferred.future
    }

    pub fn rejected<S>(scheduler: &S, reason: E) -> Self
    where
        S: Schedule + Clone + 'static,
    {
        let deferred = Self::deferred(scheduler);
        deferred.reject.call(reason);
        deferred.future
    }

    fn pending(scheduler: Rc<dyn Schedule>) -> Self {
        Self {
            inner: Rc::new(RefCell::new(Inner {
                slot: Slot::Pending {
                    on_fulfilled: Vec::new(),
                    on_rejected: Vec::new(),
                },
                resolved: false,
                scheduler,
            })),
        }
    }

    /// The fulfilled value, if settled that way.
    pub fn value(&self) -> Option<T> {
        match &self.inner.borrow().slot {
            Slot::Fulfilled(value) => Some(value.clone()),
            _ => None,
        }
    }

    /// The rejection reason, if settled that way.
    pub fn reason(&self) -> Option<E> {
        match &self.inner.borrow().slot {
            Slot::Rejected(reason) => Some(reason.clone()),
            _ => None,
        }
    }

    /// Attaches a pair of continuations and returns the future their outcome
    /// settles.
    ///
    /// Exactly one of the two runs, in its own scheduled task, once this
    /// future settles (or on the next turn if it already has). What it
    /// returns is adopted by the returned future; an `Err` or a panic rejects
    /// it.
    pub fn then<U, F, R>(&self, on_fulfilled: F, on_rejected: R) -> Future<U, E>
    where
        U: Clone + 'static,
        F: FnOnce(T) -> Outcome<U, E> + 'static,
        R: FnOnce(E) -> Outcome<U, E> + 'static,
    {
        let next = Future::<U, E>::pending(self.scheduler());
        let fulfilled = {
            let next = next.clone();
            move |value: T| next.settle_with(invoke(on_fulfilled, value))
        };
        let rejected = {
            let next = next.clone();
            move |reason: E| next.settle_with(invoke(on_rejected, reason))
        };
        self.subscribe_deferred(fulfilled, rejected);
        next
    }

    /// [`then`](Self::then) with rejections passed through unchanged.
    pub fn and_then<U, F>(&self, on_fulfilled: F) -> Future<U, E>
    where
        U: Clone + 'static,
        F: FnOnce(T) -> Outcome<U, E> + 'static,
    {
        self.then(on_fulfilled, Err)
    }

    /// [`then`](Self::then) with values passed through unchanged.
    pub fn catch<R>(&self, on_rejected: R) -> Future<T, E>
    where
        R: FnOnce(E) -> Outcome<T, E> + 'static,
    {
        self.then(|value| Ok(Resolution::Value(value)), on_rejected)
    }

    /// Registers raw continuations, each wrapped so that it runs as a
    /// scheduled task.
    pub(crate) fn subscribe_deferred<F, R>(&self, on_fulfilled: F, on_rejected: R)
    where
        F: FnOnce(T) + 'static,
        R: FnOnce(E) + 'static,
    {
        let scheduler = self.scheduler();
        let fulfilled = {
            let scheduler = scheduler.clone();
            move |value: T| scheduler.schedule(Box::new(move || on_fulfilled(value)))
        };
        let rejected = move |reason: E| scheduler.schedule(Box::new(move || on_rejected(reason)));
        self.register(fulfilled, rejected);
    }

    fn register<F, R>(&self, on_fulfilled: F, on_rejected: R)
    where
        F: FnOnce(T) + 'static,
        R: FnOnce(E) + 'static,
    {
        let settled = {
            let mut inner = self.inner.borrow_mut();
            match &mut inner.slot {
                Slot::Pending {
                    on_fulfilled: fulfilled,
                    on_rejected: rejected,
                } => {
                    fulfilled.push(Box::new(on_fulfilled));
                    rejected.push(Box::new(on_rejected));
                    return;
                }
                Slot::Fulfilled(value) => Ok(value.clone()),
                Slot::Rejected(reason) => Err(reason.clone()),
            }
        };
        match settled {
            Ok(value) => on_fulfilled(value),
            Err(reason) => on_rejected(reason),
        }
    }

    fn settle_with(&self, outcome: Outcome<T, E>) {
        match outcome {
            Ok(x) => resolve_into(self, x),
            Err(reason) => self.settle_rejected(reason),
        }
    }

    /// Moves a pending future to fulfilled and hands the value to every
    /// waiting continuation in registration order. No-op once settled.
    pub(crate) fn settle_fulfilled(&self, value: T) {
        let Some(Slot::Pending { on_fulfilled, .. }) = self.transition(Slot::Fulfilled(value.clone())) else {
            trace!("ignoring fulfillment of a settled future");
            return;
        };
        trace!(subscribers = on_fulfilled.len(), "future fulfilled");
        for continuation in on_fulfilled {
            continuation(value.clone());
        }
    }

    /// Moves a pending future to rejected. No-op once settled.
    pub(crate) fn settle_rejected(&self, reason: E) {
        let Some(Slot::Pending { on_rejected, .. }) = self.transition(Slot::Rejected(reason.clone())) else {
            trace!("ignoring rejection of a settled future");
            return;
        };
        trace!(subscribers = on_rejected.len(), "future rejected");
        for continuation in on_rejected {
            continuation(reason.clone());
        }
    }

    /// Swaps in `settled` if still pending, returning the detached pending
    /// slot. The borrow is released before any continuation runs.
    fn transition(&self, settled: Slot<T, E>) -> Option<Slot<T, E>> {
        let mut inner = self.inner.borrow_mut();
        if matches!(inner.slot, Slot::Pending { .. }) {
            Some(mem::replace(&mut inner.slot, settled))
        } else {
            None
        }
    }
}

/// Runs a user continuation, turning a panic into a rejection.
fn invoke<A, U, E>(handler: impl FnOnce(A) -> Outcome<U, E>, arg: A) -> Outcome<U, E>
where
    E: From<Error>,
{
    panic::catch_unwind(AssertUnwindSafe(move || handler(arg))).unwrap_or_else(|payload| {
        debug!("continuation panicked");
        Err(Error::panicked(payload).into())
    })
}

impl<T, E> Resolve<T, E>
where
    T: Clone + 'static,
    E: Clone + From<Error> + 'static,
{
    /// Settles the future with `x`, adopting it if it is itself deferred.
    /// Ignored if this future's resolve or reject was already called.
    pub fn call(&self, x: impl Into<Resolution<T, E>>) {
        if self.future.latch() {
            resolve_into(&self.future, x.into());
        } else {
            trace!("ignoring repeated resolve");
        }
    }

    pub fn value(&self, value: T) {
        self.call(Resolution::Value(value))
    }
}

impl<T, E> Reject<T, E>
where
    T: Clone + 'static,
    E: Clone + From<Error> + 'static,
{
    /// Rejects the future with `reason`, which is never unwrapped.
    /// Ignored if this future's resolve or reject was already called.
    pub fn call(&self, reason: impl Into<E>) {
        if self.future.latch() {
            self.future.settle_rejected(reason.into());
        } else {
            trace!("ignoring repeated reject");
        }
    }
}

impl<T, E> Thenable<T, E> for Future<T, E>
where
    T: Clone + 'static,
    E: Clone + From<Error> + 'static,
{
    fn subscribe(&self, on_value: OnValue<T, E>, on_reason: OnReason<E>) -> Result<(), E> {
        self.subscribe_deferred(
            move |value| on_value(Resolution::Value(value)),
            move |reason| on_reason(reason),
        );
        Ok(())
    }
}

impl<T: fmt::Debug, E: fmt::Debug> fmt::Debug for Future<T, E> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let inner = self.inner.borrow();
        let mut out = f.debug_struct("Future");
        match &inner.slot {
            Slot::Pending {
                on_fulfilled,
                ..
            } => out
                .field("state", &State::Pending)
                .field("subscribers", &on_fulfilled.len()),
            Slot::Fulfilled(value) => out.field("state", &State::Fulfilled).field("value", value),
            Slot::Rejected(reason) => out.field("state", &State::Rejected).field("reason", reason),
        };
        out.finish()
    }
}
