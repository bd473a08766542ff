//! The microtask queue. Every continuation a [`Future`](crate::Future) runs
//! goes through a [`Schedule`] implementation, never inline.
use std::{cell::RefCell, collections::VecDeque, fmt, rc::Rc};
use tracing::trace;

/// A unit of deferred work.
pub type Task = Box<dyn FnOnce()>;

/// Defers a task until the current synchronous execution has finished.
///
/// Implementations must run tasks in the order they were scheduled.
pub trait Schedule {
    fn schedule(&self, task: Task);
}

/// FIFO task queue driven explicitly by its owner.
///
/// Cloning yields another handle to the same queue.
///
/// # Examples
///
/// ```
/// use promise_then::{MicrotaskQueue, Schedule};
/// use std::{cell::RefCell, rc::Rc};
/// let queue = MicrotaskQueue::new();
/// let log = Rc::new(RefCell::new(vec![]));
/// let l = log.clone();
/// queue.schedule(Box::new(move || l.borrow_mut().push("task")));
/// log.borrow_mut().push("sync");
/// assert_eq!(queue.run_until_stalled(), 1);
/// assert_eq!(*log.borrow(), ["sync", "task"]);
/// ```
#[derive(Clone, Default)]
pub struct MicrotaskQueue {
    tasks: Rc<RefCell<VecDeque<Task>>>,
}

impl MicrotaskQueue {
    pub fn new() -> Self {
        Self::default()
    }

    /// Runs the oldest task, if any. The queue is not borrowed while the task
    /// runs, so it may schedule more work.
    pub fn run_next(&self) -> bool {
        let task = self.tasks.borrow_mut().pop_front();
        match task {
            Some(task) => {
                task();
                true
            }
            None => false,
        }
    }

    /// Runs tasks until the queue is empty, including ones scheduled along
    /// the way. Returns how many ran.
    pub fn run_until_stalled(&self) -> usize {
        let mut ran = 0;
        while self.run_next() {
            ran += 1;
        }
        if ran > 0 {
            trace!(ran, "microtask queue stalled");
        }
        ran
    }

    pub fn len(&self) -> usize {
        self.tasks.borrow().len()
    }

    pub fn is_empty(&self) -> bool {
        self.tasks.borrow().is_empty()
    }
}

impl Schedule for MicrotaskQueue {
    fn schedule(&self, task: Task) {
        self.tasks.borrow_mut().push_back(task);
    }
}

impl fmt::Debug for MicrotaskQueue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("MicrotaskQueue")
            .field("pending", &self.len())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::{MicrotaskQueue, Schedule};
    use std::{cell::RefCell, rc::Rc};

    #[test]
    fn test_runs_in_fifo_order() {
        let queue = MicrotaskQueue::new();
        let log = Rc::new(RefCell::new(vec![]));
        for id in 1..=3 {
            let log = log.clone();
            queue.schedule(Box::new(move || log.borrow_mut().push(id)));
        }
        assert_eq!(queue.len(), 3);
        assert_eq!(queue.run_until_stalled(), 3);
        assert_eq!(*log.borrow(), [1, 2, 3]);
        assert!(queue.is_empty());
    }

    #[test]
    fn test_task_scheduled_while_draining_runs_after_existing_ones() {
        let queue = MicrotaskQueue::new();
        let log = Rc::new(RefCell::new(vec![]));

        let (q, l) = (queue.clone(), log.clone());
        queue.schedule(Box::new(move || {
            l.borrow_mut().push("first");
            let l = l.clone();
            q.schedule(Box::new(move || l.borrow_mut().push("nested")));
        }));
        let l = log.clone();
        queue.schedule(Box::new(move || l.borrow_mut().push("second")));

        assert_eq!(queue.run_until_stalled(), 3);
        assert_eq!(*log.borrow(), ["first", "second", "nested"]);
    }

    #[test]
    fn test_run_next_on_empty_queue() {
        let queue = MicrotaskQueue::new();
        assert!(!queue.run_next());
        assert_eq!(queue.run_until_stalled(), 0);
    }
}
