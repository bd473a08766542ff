use crate::{Error, Future};
use std::future::{Future as StdFuture, IntoFuture};
use std::{
    cell::RefCell,
    pin::Pin,
    rc::Rc,
    task::{Context, Poll, Waker},
};

/// An `std::future::Future` view of a deferred value. There may be many
/// consumers per value; each one completes with a copy of the outcome.
///
/// The consumer is woken by a scheduled task, so whatever drives the
/// scheduler has to run before the consumer can complete.
///
/// # Examples
///
/// ```
/// use promise_then::{Future, MicrotaskQueue};
/// use futures::executor::block_on;
/// let queue = MicrotaskQueue::new();
/// let future = Future::<String>::deferred(&queue);
/// let consumer = future.future.consumer();
/// let consumer2 = consumer.clone();
/// future.resolve.value("Hi".into());
/// queue.run_until_stalled();
/// assert_eq!(block_on(consumer), Ok("Hi".to_string()));
/// assert_eq!(block_on(consumer2), Ok("Hi".to_string()));
/// ```
#[derive(Clone)]
pub struct Consumer<T, E = Error> {
    promise: Rc<RefCell<Inner<T, E>>>,
}

struct Inner<T, E> {
    value: Option<Result<T, E>>,
    wakers: Vec<Waker>,
}

impl<T, E> Inner<T, E> {
    fn settle(&mut self, value: Result<T, E>) {
        self.value = Some(value);
        for waker in self.wakers.drain(..) {
            waker.wake()
        }
    }
}

impl<T, E> Future<T, E>
where
    T: Clone + 'static,
    E: Clone + From<Error> + 'static,
{
    pub fn consumer(&self) -> Consumer<T, E> {
        let promise = Rc::new(RefCell::new(Inner {
            value: None,
            wakers: vec![],
        }));
        let fulfilled = promise.clone();
        let rejected = promise.clone();
        self.subscribe_deferred(
            move |value| fulfilled.borrow_mut().settle(Ok(value)),
            move |reason| rejected.borrow_mut().settle(Err(reason)),
        );
        Consumer { promise }
    }
}

impl<T, E> IntoFuture for Future<T, E>
where
    T: Clone + 'static,
    E: Clone + From<Error> + 'static,
{
    type Output = Result<T, E>;
    type IntoFuture = Consumer<T, E>;

    fn into_future(self) -> Self::IntoFuture {
        self.consumer()
    }
}

impl<T: Clone, E: Clone> StdFuture for Consumer<T, E> {
    type Output = Result<T, E>;

    fn poll(self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<Self::Output> {
        let mut promise = self.promise.borrow_mut();
        match promise.value {
            Some(ref value) => Poll::Ready(value.clone()),
            None => {
                if !promise.wakers.iter().any(|w| w.will_wake(cx.waker())) {
                    promise.wakers.push(cx.waker().clone());
                }
                Poll::Pending
            }
        }
    }
}
