//! Drives a [`MicrotaskQueue`] and a [`Timer`] together: microtasks always
//! drain completely before the next timer fires.
use crate::{queue::MicrotaskQueue, timer::Timer, Error};
use tracing::{debug, warn};

/// Limits applied to a single [`EventLoop::run`].
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct Config {
    /// Maximum number of tasks (microtasks plus timers) one run may execute.
    /// `None` is unbounded.
    pub max_tasks: Option<usize>,
}

/// # Examples
///
/// ```
/// use promise_then::{EventLoop, Future, Resolution};
/// let event_loop = EventLoop::new();
/// let timer = event_loop.timer().clone();
/// let future: Future<i32> = Future::new(event_loop.queue(), move |resolve, _reject| {
///     timer.after(3000, move || resolve.value(1));
///     Ok(())
/// });
/// let doubled = future.and_then(|value| Ok(Resolution::Value(value * 2)));
/// event_loop.run().unwrap();
/// assert_eq!(doubled.value(), Some(2));
/// ```
#[derive(Debug, Default)]
pub struct EventLoop {
    queue: MicrotaskQueue,
    timer: Timer,
    config: Config,
}

impl EventLoop {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_config(config: Config) -> Self {
        Self {
            config,
            ..Self::default()
        }
    }

    pub fn queue(&self) -> &MicrotaskQueue {
        &self.queue
    }

    pub fn timer(&self) -> &Timer {
        &self.timer
    }

    /// Drains microtasks only, leaving timers alone.
    pub fn run_microtasks(&self) -> Result<usize, Error> {
        let mut ran = 0;
        self.drain(&mut ran)?;
        Ok(ran)
    }

    /// Runs until there are neither microtasks nor timers left. Returns the
    /// number of tasks executed.
    pub fn run(&self) -> Result<usize, Error> {
        let mut ran = 0;
        self.drain(&mut ran)?;
        while !self.timer.is_empty() {
            self.charge(&mut ran)?;
            self.timer.fire_next();
            self.drain(&mut ran)?;
        }
        debug!(ran, now = self.timer.now(), "event loop idle");
        Ok(ran)
    }

    fn drain(&self, ran: &mut usize) -> Result<(), Error> {
        while !self.queue.is_empty() {
            self.charge(ran)?;
            self.queue.run_next();
        }
        Ok(())
    }

    fn charge(&self, ran: &mut usize) -> Result<(), Error> {
        if let Some(max) = self.config.max_tasks {
            if *ran >= max {
                warn!(max, "event loop budget exhausted");
                return Err(Error::BudgetExhausted(max));
            }
        }
        *ran += 1;
        Ok(())
    }
}
