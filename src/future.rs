use crate::promise::{Payload, State};
use crate::Promise;
use std::{
    future::{Future, IntoFuture},
    pin::Pin,
    task::{Context, Poll},
};

/// Future returned by [`Promise::settled`], resolving to the settlement.
///
/// Any number of these may wait on one promise. Waking them does not run any
/// continuation, so handlers still only run through the scheduler.
///
/// Each polling task leaves its waker with the promise until it settles,
/// even if the future is dropped first. A promise that never settles and is
/// polled from many distinct tasks keeps all of those wakers.
///
/// # Examples
///
/// ```
/// use futures::executor::block_on;
/// use promise_chain::{Error, Promise, TaskQueue};
/// use std::thread;
///
/// let queue = TaskQueue::new();
/// let deferred = Promise::<String, Error>::deferred(&queue.scheduler());
/// let waiter = deferred.promise.clone();
/// let task1 = thread::spawn(move || block_on(waiter.settled()));
/// deferred.fulfill("Hi".into());
/// assert_eq!(task1.join().expect("The task1 thread has panicked."), Ok("Hi".into()));
/// ```
#[derive(Debug)]
pub struct Settled<T: Payload, E: Payload> {
    promise: Promise<T, E>,
}

impl<T: Payload, E: Payload> Promise<T, E> {
    pub fn settled(&self) -> Settled<T, E> {
        Settled {
            promise: self.clone(),
        }
    }
}

impl<T: Payload, E: Payload> Future for Settled<T, E> {
    type Output = Result<T, E>;

    fn poll(self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<Self::Output> {
        let mut state = self.promise.inner.state.lock();
        match &mut *state {
            State::Fulfilled(value) => Poll::Ready(Ok(value.clone())),
            State::Rejected(error) => Poll::Ready(Err(error.clone())),
            State::Pending(waiters) => {
                if !waiters.wakers.iter().any(|w| w.will_wake(cx.waker())) {
                    waiters.wakers.push(cx.waker().clone());
                }
                Poll::Pending
            }
        }
    }
}

impl<T: Payload, E: Payload> IntoFuture for Promise<T, E> {
    type Output = Result<T, E>;
    type IntoFuture = Settled<T, E>;

    fn into_future(self) -> Self::IntoFuture {
        Settled { promise: self }
    }
}
