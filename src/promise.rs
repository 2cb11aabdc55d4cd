use crate::{resolution, Error, Resolution, Scheduler};
use parking_lot::Mutex;
use std::{
    fmt, mem,
    panic::{self, AssertUnwindSafe},
    sync::{
        atomic::{AtomicU64, Ordering},
        Arc,
    },
    task::Waker,
};
use tracing::{trace, warn};

/// Bounds shared by fulfillment values and rejection reasons.
///
/// Every waiter receives its own clone. Wrap large or identity-bearing
/// payloads in an `Arc`.
pub trait Payload: Clone + Send + 'static {}

impl<P: Clone + Send + 'static> Payload for P {}

/// Process-unique identity of a promise.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct PromiseId(u64);

impl PromiseId {
    fn next() -> Self {
        static NEXT: AtomicU64 = AtomicU64::new(1);
        PromiseId(NEXT.fetch_add(1, Ordering::Relaxed))
    }
}

impl fmt::Display for PromiseId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "#{}", self.0)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Status {
    Pending,
    Fulfilled,
    Rejected,
}

pub(crate) type Waiter<V> = Box<dyn FnOnce(V) + Send + 'static>;

pub(crate) struct Waiters<T, E> {
    fulfilled: Vec<Waiter<T>>,
    rejected: Vec<Waiter<E>>,
    pub(crate) wakers: Vec<Waker>,
}

impl<T, E> Default for Waiters<T, E> {
    fn default() -> Self {
        Self {
            fulfilled: vec![],
            rejected: vec![],
            wakers: vec![],
        }
    }
}

/// Waiter lists only exist while pending, so a settled promise can't hold
/// stale continuations.
pub(crate) enum State<T, E> {
    Pending(Waiters<T, E>),
    Fulfilled(T),
    Rejected(E),
}

pub(crate) struct Inner<T, E> {
    id: PromiseId,
    scheduler: Scheduler,
    pub(crate) state: Mutex<State<T, E>>,
}

impl<T, E> Inner<T, E> {
    /// Moves a pending promise to `settled`, handing back the waiters it
    /// had. The check and the write share one lock, so among racing
    /// settlements exactly one gets `Some`.
    fn transition(&self, settled: State<T, E>) -> Option<Waiters<T, E>> {
        let mut state = self.state.lock();
        match &mut *state {
            State::Pending(waiters) => {
                let waiters = mem::take(waiters);
                *state = settled;
                Some(waiters)
            }
            State::Fulfilled(_) | State::Rejected(_) => None,
        }
    }
}

/// The eventual result of an asynchronous operation.
///
/// Cloning a `Promise` clones the handle; all clones observe the same
/// settlement.
///
/// # Examples
///
/// ```
/// use promise_chain::{Error, Promise, Resolution, Status, TaskQueue};
///
/// let queue = TaskQueue::new();
/// let promise = Promise::<u8, Error>::new(&queue.scheduler(), |resolver| {
///     resolver.fulfill(1);
///     Ok(())
/// });
/// assert_eq!(promise.status(), Status::Fulfilled);
///
/// let next = promise.map(|x| x * 2);
/// assert_eq!(next.status(), Status::Pending);
/// queue.run_until_idle();
/// assert_eq!(next.peek(), Some(Ok(2)));
/// ```
pub struct Promise<T, E> {
    pub(crate) inner: Arc<Inner<T, E>>,
}

/// Settlement handle of one [`Promise`].
///
/// Only the first successful call among all clones has an effect.
pub struct Resolver<T, E> {
    inner: Arc<Inner<T, E>>,
}

impl<T, E> Clone for Promise<T, E> {
    fn clone(&self) -> Self {
        Self {
            inner: self.inner.clone(),
        }
    }
}

impl<T, E> Clone for Resolver<T, E> {
    fn clone(&self) -> Self {
        Self {
            inner: self.inner.clone(),
        }
    }
}

impl<T: Payload, E: Payload> Promise<T, E> {
    /// A pending promise together with its only settlement handle.
    pub(crate) fn pending(scheduler: &Scheduler) -> (Self, Resolver<T, E>) {
        let inner = Arc::new(Inner {
            id: PromiseId::next(),
            scheduler: scheduler.clone(),
            state: Mutex::new(State::Pending(Waiters::default())),
        });
        (
            Promise {
                inner: inner.clone(),
            },
            Resolver { inner },
        )
    }

    pub fn id(&self) -> PromiseId {
        self.inner.id
    }

    pub fn scheduler(&self) -> &Scheduler {
        &self.inner.scheduler
    }

    pub fn status(&self) -> Status {
        match &*self.inner.state.lock() {
            State::Pending(_) => Status::Pending,
            State::Fulfilled(_) => Status::Fulfilled,
            State::Rejected(_) => Status::Rejected,
        }
    }

    /// The settlement, if there is one yet.
    pub fn peek(&self) -> Option<Result<T, E>> {
        match &*self.inner.state.lock() {
            State::Pending(_) => None,
            State::Fulfilled(value) => Some(Ok(value.clone())),
            State::Rejected(error) => Some(Err(error.clone())),
        }
    }

    /// Runs `on_fulfilled` or `on_rejected` as a scheduled task once this
    /// promise settles. Never calls either before returning.
    pub(crate) fn subscribe<F, R>(&self, on_fulfilled: F, on_rejected: R)
    where
        F: FnOnce(T) + Send + 'static,
        R: FnOnce(E) + Send + 'static,
    {
        let scheduler = self.inner.scheduler.clone();
        let settled = {
            let mut state = self.inner.state.lock();
            match &mut *state {
                State::Pending(waiters) => {
                    let fulfilled_on = scheduler.clone();
                    waiters.fulfilled.push(Box::new(move |value| {
                        fulfilled_on.schedule(move || on_fulfilled(value))
                    }));
                    waiters.rejected.push(Box::new(move |error| {
                        scheduler.schedule(move || on_rejected(error))
                    }));
                    return;
                }
                State::Fulfilled(value) => Ok(value.clone()),
                State::Rejected(error) => Err(error.clone()),
            }
        };
        match settled {
            Ok(value) => scheduler.schedule(move || on_fulfilled(value)),
            Err(error) => scheduler.schedule(move || on_rejected(error)),
        }
    }
}

impl<T: Payload, E: Payload + From<Error>> Promise<T, E> {
    /// Creates a promise and runs `initializer` right away with its resolver.
    ///
    /// An `Err` returned by the initializer rejects the promise, and so does
    /// a panic, as [`Error::Panicked`].
    pub fn new<F>(scheduler: &Scheduler, initializer: F) -> Self
    where
        F: FnOnce(Resolver<T, E>) -> Result<(), E>,
    {
        let (promise, resolver) = Self::pending(scheduler);
        let handle = resolver.clone();
        match panic::catch_unwind(AssertUnwindSafe(move || initializer(handle))) {
            Ok(Ok(())) => {}
            Ok(Err(error)) => {
                resolver.reject(error);
            }
            Err(payload) => {
                let error = Error::panicked(payload);
                warn!(promise = %promise.id(), %error, "initializer panicked");
                resolver.reject(E::from(error));
            }
        }
        promise
    }

    /// A promise fulfilled with `value`.
    pub fn resolved(scheduler: &Scheduler, value: T) -> Self {
        Self::new(scheduler, move |resolver| {
            resolver.fulfill(value);
            Ok(())
        })
    }

    /// A promise rejected with `error`.
    pub fn rejected(scheduler: &Scheduler, error: E) -> Self {
        Self::new(scheduler, move |resolver| {
            resolver.reject(error);
            Ok(())
        })
    }
}

impl<T: Payload, E: Payload> Resolver<T, E> {
    pub fn id(&self) -> PromiseId {
        self.inner.id
    }

    /// The promise this resolver settles.
    pub fn promise(&self) -> Promise<T, E> {
        Promise {
            inner: self.inner.clone(),
        }
    }

    /// Fulfills the promise with `value`. Returns `false`, doing nothing, if
    /// it was already settled.
    ///
    /// Waiters are scheduled in registration order after the state lock is
    /// released. On a multi-threaded backend a `then` made on another thread
    /// right after the transition can therefore have its task scheduled
    /// ahead of some of those waiters.
    pub fn fulfill(&self, value: T) -> bool {
        let Some(waiters) = self.inner.transition(State::Fulfilled(value.clone())) else {
            trace!(promise = %self.inner.id, "already settled, fulfill ignored");
            return false;
        };
        trace!(
            promise = %self.inner.id,
            waiters = waiters.fulfilled.len(),
            "fulfilled"
        );
        for waiter in waiters.fulfilled {
            waiter(value.clone());
        }
        wake_all(waiters.wakers);
        true
    }

    /// Rejects the promise with `error`. Returns `false`, doing nothing, if
    /// it was already settled. Waiters are scheduled as in
    /// [`Resolver::fulfill`].
    pub fn reject(&self, error: E) -> bool {
        let Some(waiters) = self.inner.transition(State::Rejected(error.clone())) else {
            trace!(promise = %self.inner.id, "already settled, reject ignored");
            return false;
        };
        trace!(
            promise = %self.inner.id,
            waiters = waiters.rejected.len(),
            "rejected"
        );
        for waiter in waiters.rejected {
            waiter(error.clone());
        }
        wake_all(waiters.wakers);
        true
    }
}

impl<T: Payload, E: Payload + From<Error>> Resolver<T, E> {
    /// Settles the promise from `resolution`, adopting the state of a
    /// thenable if it is one.
    pub fn resolve(&self, resolution: Resolution<T, E>) {
        resolution::resolve(self, resolution)
    }
}

fn wake_all(wakers: Vec<Waker>) {
    for waker in wakers {
        waker.wake();
    }
}

impl<T: Payload, E: Payload> fmt::Debug for Promise<T, E> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Promise")
            .field("id", &self.id())
            .field("status", &self.status())
            .finish()
    }
}

impl<T: Payload, E: Payload> fmt::Debug for Resolver<T, E> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Resolver").field("id", &self.id()).finish()
    }
}

#[cfg(test)]
mod tests {
    use super::{Promise, Status};
    use crate::{Error, TaskQueue};
    use std::sync::{Arc, Mutex};

    type P = Promise<i32, Error>;

    #[test]
    fn test_initializer_runs_synchronously() {
        let queue = TaskQueue::new();
        let ran = Arc::new(Mutex::new(false));
        let flag = ran.clone();
        let promise = P::new(&queue.scheduler(), move |_| {
            *flag.lock().unwrap() = true;
            Ok(())
        });
        assert!(*ran.lock().unwrap());
        assert_eq!(promise.status(), Status::Pending);
        assert_eq!(promise.peek(), None);
        assert!(queue.is_empty());
    }

    #[test]
    fn test_initializer_error_rejects() {
        let queue = TaskQueue::new();
        let promise = P::new(&queue.scheduler(), |_| {
            Err(Error::Panicked("not really".into()))
        });
        assert_eq!(promise.peek(), Some(Err(Error::Panicked("not really".into()))));
    }

    #[test]
    fn test_initializer_panic_rejects() {
        let queue = TaskQueue::new();
        let promise = P::new(&queue.scheduler(), |_| panic!("kaboom"));
        assert_eq!(promise.peek(), Some(Err(Error::Panicked("kaboom".into()))));
    }

    #[test]
    fn test_initializer_error_after_fulfill_is_ignored() {
        let queue = TaskQueue::new();
        let promise = P::new(&queue.scheduler(), |resolver| {
            resolver.fulfill(1);
            Err(Error::Panicked("late".into()))
        });
        assert_eq!(promise.peek(), Some(Ok(1)));
    }

    #[test]
    fn test_promise_resolve_twice() {
        let queue = TaskQueue::new();
        let (promise, resolver) = P::pending(&queue.scheduler());
        assert!(resolver.fulfill(1));
        assert!(!resolver.fulfill(2));
        assert!(!resolver.reject(Error::Panicked("no".into())));
        assert_eq!(promise.status(), Status::Fulfilled);
        assert_eq!(promise.peek(), Some(Ok(1)));
    }

    #[test]
    fn test_reject_then_fulfill() {
        let queue = TaskQueue::new();
        let (promise, resolver) = P::pending(&queue.scheduler());
        let other = resolver.clone();
        assert!(resolver.reject(Error::Panicked("first".into())));
        assert!(!other.fulfill(3));
        assert_eq!(promise.status(), Status::Rejected);
    }

    #[test]
    fn test_settle_schedules_waiters_in_order() {
        let queue = TaskQueue::new();
        let (promise, resolver) = P::pending(&queue.scheduler());
        let seen = Arc::new(Mutex::new(vec![]));
        for tag in ["a", "b", "c"] {
            let seen = seen.clone();
            promise.subscribe(move |v| seen.lock().unwrap().push((tag, v)), |_| {});
        }
        resolver.fulfill(42);
        assert!(seen.lock().unwrap().is_empty());
        assert_eq!(queue.run_until_idle(), 3);
        assert_eq!(*seen.lock().unwrap(), vec![("a", 42), ("b", 42), ("c", 42)]);
    }

    #[test]
    fn test_reject_drops_fulfill_waiters() {
        let queue = TaskQueue::new();
        let (promise, resolver) = P::pending(&queue.scheduler());
        let seen = Arc::new(Mutex::new(vec![]));
        let on_ok = seen.clone();
        let on_err = seen.clone();
        promise.subscribe(
            move |_| on_ok.lock().unwrap().push("fulfilled"),
            move |_| on_err.lock().unwrap().push("rejected"),
        );
        resolver.reject(Error::Panicked("x".into()));
        resolver.fulfill(1);
        queue.run_until_idle();
        assert_eq!(*seen.lock().unwrap(), vec!["rejected"]);
    }

    #[test]
    fn test_ids_are_unique() {
        let queue = TaskQueue::new();
        let a = P::resolved(&queue.scheduler(), 1);
        let b = P::resolved(&queue.scheduler(), 1);
        assert_ne!(a.id(), b.id());
        assert_eq!(a.id(), a.clone().id());
    }
}
