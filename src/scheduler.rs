//! The deferred-execution facility promises hand their continuations to.
//!
//! A [`Schedule`] implementation only has to run every task it is given,
//! eventually, in the order it was given them. [`TaskQueue`] does this
//! cooperatively on the caller's thread; with the `thread-pool` feature a
//! `futures::executor::ThreadPool` can be used as well.
use parking_lot::Mutex;
use std::{collections::VecDeque, fmt, sync::Arc};

/// A unit of deferred work.
pub type Task = Box<dyn FnOnce() + Send + 'static>;

/// Something that runs tasks later, outside the current call stack.
pub trait Schedule: Send + Sync + 'static {
    /// Enqueues `task`. Implementations must not run it before returning.
    fn schedule(&self, task: Task);
}

/// Shared handle to a [`Schedule`] implementation.
///
/// Every promise keeps one, and promises derived from it through `then`
/// inherit it.
#[derive(Clone)]
pub struct Scheduler {
    backend: Arc<dyn Schedule>,
}

impl Scheduler {
    pub fn new<S: Schedule>(backend: S) -> Self {
        Self {
            backend: Arc::new(backend),
        }
    }

    pub fn from_arc(backend: Arc<dyn Schedule>) -> Self {
        Self { backend }
    }

    pub fn schedule<F>(&self, task: F)
    where
        F: FnOnce() + Send + 'static,
    {
        self.backend.schedule(Box::new(task))
    }
}

impl fmt::Debug for Scheduler {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Scheduler").finish_non_exhaustive()
    }
}

/// A cooperative FIFO task queue.
///
/// Nothing runs until the owner drains the queue with [`TaskQueue::run_once`]
/// or [`TaskQueue::run_until_idle`].
///
/// # Examples
///
/// ```
/// use promise_chain::TaskQueue;
/// use std::sync::{Arc, Mutex};
///
/// let queue = TaskQueue::new();
/// let seen = Arc::new(Mutex::new(vec![]));
/// let log = seen.clone();
/// let inner = queue.scheduler();
/// queue.scheduler().schedule(move || {
///     log.lock().unwrap().push(1);
///     inner.schedule(move || log.lock().unwrap().push(2));
/// });
/// assert!(seen.lock().unwrap().is_empty());
/// assert_eq!(queue.run_until_idle(), 2);
/// assert_eq!(*seen.lock().unwrap(), vec![1, 2]);
/// ```
#[derive(Clone, Default)]
pub struct TaskQueue {
    tasks: Arc<Mutex<VecDeque<Task>>>,
}

impl TaskQueue {
    pub fn new() -> Self {
        Self::default()
    }

    /// A scheduler feeding this queue.
    pub fn scheduler(&self) -> Scheduler {
        Scheduler::new(self.clone())
    }

    /// Runs the oldest queued task. Returns `false` if the queue was empty.
    pub fn run_once(&self) -> bool {
        // Pop first so the task may enqueue more work.
        let task = self.tasks.lock().pop_front();
        match task {
            Some(task) => {
                task();
                true
            }
            None => false,
        }
    }

    /// Runs tasks until none are left, including the ones queued while
    /// draining. Returns how many ran.
    pub fn run_until_idle(&self) -> usize {
        let mut ran = 0;
        while self.run_once() {
            ran += 1;
        }
        ran
    }

    pub fn len(&self) -> usize {
        self.tasks.lock().len()
    }

    pub fn is_empty(&self) -> bool {
        self.tasks.lock().is_empty()
    }
}

impl Schedule for TaskQueue {
    fn schedule(&self, task: Task) {
        self.tasks.lock().push_back(task);
    }
}

impl fmt::Debug for TaskQueue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("TaskQueue")
            .field("len", &self.len())
            .finish()
    }
}

/// Runs each task on the pool. Ordering between tasks only holds for a pool
/// with a single worker thread.
#[cfg(feature = "thread-pool")]
impl Schedule for futures::executor::ThreadPool {
    fn schedule(&self, task: Task) {
        self.spawn_ok(async move { task() });
    }
}
