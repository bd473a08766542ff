use promise_then::{
    Error, EventLoop, Future, OnReason, OnValue, Resolution, State, Thenable,
};
use std::{cell::RefCell, rc::Rc};
use tracing_subscriber::filter::{EnvFilter, LevelFilter};
use tracing_subscriber::prelude::*;
use tracing_subscriber::{fmt, registry};

fn init_tracing() {
    let mut filter = EnvFilter::from_default_env();
    filter = filter.add_directive(LevelFilter::WARN.into());
    let print = fmt::layer().compact().with_test_writer();
    let _ = registry().with(filter).with(print).try_init();
}

type Log = Rc<RefCell<Vec<String>>>;

fn push(log: &Log, entry: impl Into<String>) {
    log.borrow_mut().push(entry.into());
}

#[test]
fn test_resolve_value_after_timer() {
    init_tracing();
    let event_loop = EventLoop::new();
    let timer = event_loop.timer().clone();
    let seen = Rc::new(RefCell::new(None));

    let s = seen.clone();
    Future::<i32>::new(event_loop.queue(), move |resolve, _| {
        timer.after(3000, move || resolve.value(1));
        Ok(())
    })
    .and_then(move |value| {
        *s.borrow_mut() = Some(value);
        Ok(Resolution::Value(()))
    });

    event_loop.run().unwrap();
    assert_eq!(*seen.borrow(), Some(1));
    assert_eq!(event_loop.timer().now(), 3000);
}

#[test]
fn test_reject_reason_after_timer() {
    init_tracing();
    let event_loop = EventLoop::new();
    let timer = event_loop.timer().clone();

    let handled = Future::<i32>::new(event_loop.queue(), move |_, reject| {
        timer.after(3000, move || reject.call("err"));
        Ok(())
    })
    .then(
        |_| Ok(Resolution::Value("fulfilled".to_string())),
        |reason| Ok(Resolution::Value(reason.to_string())),
    );

    event_loop.run().unwrap();
    assert_eq!(handled.value().as_deref(), Some("err"));
}

#[test]
fn test_settlement_is_at_most_once() {
    init_tracing();
    let event_loop = EventLoop::new();
    let future: Future<i32> = Future::new(event_loop.queue(), |resolve, reject| {
        resolve.value(1);
        resolve.value(2);
        reject.call("x");
        Ok(())
    });
    let observed = future.then(
        |value| Ok(Resolution::Value(format!("fulfilled {value}"))),
        |reason| Ok(Resolution::Value(format!("rejected {reason}"))),
    );
    event_loop.run().unwrap();
    assert_eq!(future.state(), State::Fulfilled);
    assert_eq!(observed.value().as_deref(), Some("fulfilled 1"));
}

#[test]
fn test_continuations_fire_in_registration_order() {
    init_tracing();
    let event_loop = EventLoop::new();
    let timer = event_loop.timer().clone();
    let log: Log = Rc::default();

    let future: Future<i32> = Future::new(event_loop.queue(), move |resolve, _| {
        let inner = timer.clone();
        timer.after(0, move || inner.after(0, move || resolve.value(1)));
        Ok(())
    });
    for id in [1, 2, 3, 1] {
        let log = log.clone();
        future.and_then(move |_| {
            push(&log, id.to_string());
            Ok(Resolution::Value(()))
        });
    }

    event_loop.run().unwrap();
    assert_eq!(*log.borrow(), ["1", "2", "3", "1"]);
}

#[test]
fn test_callback_never_runs_before_next_statement() {
    init_tracing();
    let event_loop = EventLoop::new();
    let log: Log = Rc::default();
    let future = Future::<i32>::resolved(event_loop.queue(), 1);

    let l = log.clone();
    future.and_then(move |_| {
        push(&l, "callback");
        Ok(Resolution::Value(()))
    });
    push(&log, "marker");

    event_loop.run().unwrap();
    assert_eq!(*log.borrow(), ["marker", "callback"]);
}

#[test]
fn test_resolving_with_future_flattens() {
    init_tracing();
    let event_loop = EventLoop::new();
    let timer = event_loop.timer().clone();

    let g: Future<i32> = Future::new(event_loop.queue(), move |resolve, _| {
        timer.after(3000, move || resolve.value(5));
        Ok(())
    });
    let outer: Future<i32> = Future::new(event_loop.queue(), |resolve, _| {
        resolve.call(g);
        Ok(())
    });
    let observed = outer.and_then(|value| Ok(Resolution::Value(value)));

    event_loop.run().unwrap();
    assert_eq!(observed.value(), Some(5));
}

#[test]
fn test_then_can_return_future() {
    init_tracing();
    let event_loop = EventLoop::new();
    let queue = event_loop.queue().clone();
    let log: Log = Rc::default();

    let l = log.clone();
    Future::<i32>::resolved(event_loop.queue(), 1)
        .and_then(move |value| {
            Ok(Resolution::Future(Future::new(&queue, move |resolve, _| {
                resolve.value(value + 1);
                Ok(())
            })))
        })
        .and_then(|value| -> Result<Resolution<i32>, Error> {
            assert_eq!(value, 2);
            Err("err".into())
        })
        .catch(move |reason| {
            push(&l, reason.to_string());
            Ok(Resolution::Value(0))
        });

    event_loop.run().unwrap();
    assert_eq!(*log.borrow(), ["err"]);
}

#[test]
fn test_chain_takes_one_turn_per_link() {
    init_tracing();
    let event_loop = EventLoop::new();
    let queue = event_loop.queue();

    let first = Future::<i32>::resolved(queue, 1);
    let second = first.and_then(|value| Ok(Resolution::Value(value + 1)));
    let third = second.and_then(|value| Ok(Resolution::Value(value + 1)));
    let fourth = third.and_then(|value| Ok(Resolution::Value(value + 1)));

    assert!(queue.run_next());
    assert_eq!(second.value(), Some(2));
    assert!(third.is_pending());
    assert!(queue.run_next());
    assert_eq!(third.value(), Some(3));
    assert!(fourth.is_pending());
    assert!(queue.run_next());
    assert_eq!(fourth.value(), Some(4));
    assert!(!queue.run_next());
}

#[test]
fn test_returning_own_future_is_a_cycle() {
    init_tracing();
    let event_loop = EventLoop::new();
    let slot: Rc<RefCell<Option<Future<i32>>>> = Rc::default();

    let s = slot.clone();
    let f2 = Future::<i32>::resolved(event_loop.queue(), 1).and_then(move |_| {
        let own = s.borrow().clone().expect("chained future stored");
        Ok(Resolution::Future(own))
    });
    *slot.borrow_mut() = Some(f2.clone());

    event_loop.run().unwrap();
    assert_eq!(f2.reason(), Some(Error::ChainingCycle));
    // Release the future's reference to itself.
    slot.borrow_mut().take();
}

#[test]
fn test_default_rejection_handler_propagates() {
    init_tracing();
    let event_loop = EventLoop::new();
    let future: Future<i32> = Future::new(event_loop.queue(), |_, reject| {
        reject.call("boom");
        Ok(())
    });
    let next = future.and_then(|value| Ok(Resolution::Value(value)));

    event_loop.run().unwrap();
    assert_eq!(next.reason(), Some(Error::Rejected("boom".into())));
}

#[test]
fn test_subscribers_before_and_after_settlement() {
    init_tracing();
    let event_loop = EventLoop::new();
    let deferred = Future::<i32>::deferred(event_loop.queue());
    let calls = Rc::new(RefCell::new([0; 3]));

    let subscribe = |index: usize| {
        let calls = calls.clone();
        deferred.future.and_then(move |_| {
            calls.borrow_mut()[index] += 1;
            Ok(Resolution::Value(()))
        });
    };
    subscribe(0);
    deferred.resolve.value(7);
    subscribe(1);
    event_loop.run().unwrap();
    subscribe(2);
    event_loop.run().unwrap();

    assert_eq!(*calls.borrow(), [1, 1, 1]);
}

/// A thenable that misbehaves: it reports twice, with conflicting outcomes,
/// from a timer.
struct Unruly {
    timer: promise_then::Timer,
}

impl Thenable<i32, Error> for Unruly {
    fn subscribe(&self, on_value: OnValue<i32, Error>, on_reason: OnReason<Error>) -> Result<(), Error> {
        self.timer.after(10, move || {
            on_value(Resolution::Value(1));
            on_reason("ignored".into());
            on_value(Resolution::Value(2));
        });
        Ok(())
    }
}

#[test]
fn test_foreign_thenable_first_call_wins() {
    init_tracing();
    let event_loop = EventLoop::new();
    let unruly = Unruly {
        timer: event_loop.timer().clone(),
    };

    let adopted = Future::<i32>::resolved(event_loop.queue(), 0)
        .and_then(move |_| Ok(Resolution::thenable(unruly)));

    event_loop.run().unwrap();
    assert_eq!(adopted.value(), Some(1));
}

#[test]
fn test_thenable_resolving_to_future_unwraps_deeply() {
    init_tracing();
    let event_loop = EventLoop::new();
    let deep = Future::<i32>::deferred(event_loop.queue());

    struct Forward(Future<i32>);
    impl Thenable<i32, Error> for Forward {
        fn subscribe(&self, on_value: OnValue<i32, Error>, _: OnReason<Error>) -> Result<(), Error> {
            on_value(Resolution::Future(self.0.clone()));
            Ok(())
        }
    }

    let outer = Future::<i32>::deferred(event_loop.queue());
    outer.resolve.call(Resolution::thenable(Forward(deep.future.clone())));
    event_loop.run().unwrap();
    assert!(outer.future.is_pending());

    deep.reject.call("deep failure");
    event_loop.run().unwrap();
    assert_eq!(
        outer.future.reason(),
        Some(Error::Rejected("deep failure".into()))
    );
}
