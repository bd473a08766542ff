//! A virtual-clock timer for tests and demos. Time only moves when a timer
//! fires, so delays never cost wall-clock time.
use crate::queue::Task;
use std::{cell::RefCell, collections::BTreeMap, fmt, rc::Rc};
use tracing::trace;

#[derive(Default)]
struct Inner {
    now: u64,
    seq: u64,
    // Keyed by (deadline, registration order) so equal deadlines fire in the
    // order they were registered.
    pending: BTreeMap<(u64, u64), Task>,
}

/// Cloning yields another handle to the same clock.
#[derive(Clone, Default)]
pub struct Timer {
    inner: Rc<RefCell<Inner>>,
}

impl Timer {
    pub fn new() -> Self {
        Self::default()
    }

    /// Fires `callback` once, no earlier than `delay_ms` after the current
    /// virtual time.
    pub fn after(&self, delay_ms: u64, callback: impl FnOnce() + 'static) {
        let mut inner = self.inner.borrow_mut();
        let deadline = inner.now.saturating_add(delay_ms);
        let seq = inner.seq;
        inner.seq += 1;
        inner.pending.insert((deadline, seq), Box::new(callback));
    }

    /// Current virtual time in milliseconds.
    pub fn now(&self) -> u64 {
        self.inner.borrow().now
    }

    /// Advances the clock to the earliest deadline and runs that timer.
    pub fn fire_next(&self) -> bool {
        let next = {
            let mut inner = self.inner.borrow_mut();
            let next = inner.pending.pop_first();
            if let Some(((deadline, _), _)) = &next {
                inner.now = inner.now.max(*deadline);
            }
            next
        };
        match next {
            Some(((deadline, seq), callback)) => {
                trace!(deadline, seq, "timer fired");
                callback();
                true
            }
            None => false,
        }
    }

    pub fn len(&self) -> usize {
        self.inner.borrow().pending.len()
    }

    pub fn is_empty(&self) -> bool {
        self.inner.borrow().pending.is_empty()
    }
}

impl fmt::Debug for Timer {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let inner = self.inner.borrow();
        f.debug_struct("Timer")
            .field("now", &inner.now)
            .field("pending", &inner.pending.len())
            .finish()
    }
}
