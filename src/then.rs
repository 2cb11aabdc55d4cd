//! Continuation registration.
//!
//! Every registration returns a fresh promise. Its handler runs as a
//! scheduled task once the source settles, and whatever the handler returns
//! goes through the resolution procedure to settle the fresh promise.
use crate::{promise::Payload, Error, Promise, Resolution, Resolver};
use std::panic::{self, AssertUnwindSafe};
use tracing::warn;

impl<T: Payload, E: Payload + From<Error>> Promise<T, E> {
    /// Registers both continuations and returns the promise they settle.
    ///
    /// Returning `Err` from a handler, or panicking in it, rejects the
    /// returned promise. Neither handler is called before `then` returns,
    /// even when this promise has already settled.
    ///
    /// # Examples
    ///
    /// ```
    /// use promise_chain::{Error, Promise, Resolution, TaskQueue};
    ///
    /// let queue = TaskQueue::new();
    /// let recovered = Promise::<String, Error>::rejected(
    ///     &queue.scheduler(),
    ///     Error::Panicked("boom".into()),
    /// )
    /// .then(
    ///     |value| Ok(Resolution::Value(value)),
    ///     |error| Ok(Resolution::Value(format!("caught: {}", error))),
    /// );
    /// queue.run_until_idle();
    /// assert_eq!(recovered.peek(), Some(Ok("caught: callback panicked: boom".into())));
    /// ```
    pub fn then<U, F, R>(&self, on_fulfilled: F, on_rejected: R) -> Promise<U, E>
    where
        U: Payload,
        F: FnOnce(T) -> Result<Resolution<U, E>, E> + Send + 'static,
        R: FnOnce(E) -> Result<Resolution<U, E>, E> + Send + 'static,
    {
        let (downstream, resolver) = Promise::pending(self.scheduler());
        let target = resolver.clone();
        self.subscribe(
            move |value| react(&target, on_fulfilled, value),
            move |error| react(&resolver, on_rejected, error),
        );
        downstream
    }

    /// Continues on fulfillment; a rejection is handed down unchanged.
    pub fn and_then<U, F>(&self, on_fulfilled: F) -> Promise<U, E>
    where
        U: Payload,
        F: FnOnce(T) -> Result<Resolution<U, E>, E> + Send + 'static,
    {
        self.then(on_fulfilled, Err)
    }

    /// Handles a rejection; a fulfillment is handed down unchanged.
    pub fn catch<R>(&self, on_rejected: R) -> Promise<T, E>
    where
        R: FnOnce(E) -> Result<Resolution<T, E>, E> + Send + 'static,
    {
        self.then(|value| Ok(Resolution::Value(value)), on_rejected)
    }

    /// A new link that settles the same way as this one, a tick later.
    pub fn passthrough(&self) -> Promise<T, E> {
        self.then(|value| Ok(Resolution::Value(value)), Err)
    }

    /// Transforms the fulfilled value with an infallible function.
    pub fn map<U, F>(&self, f: F) -> Promise<U, E>
    where
        U: Payload,
        F: FnOnce(T) -> U + Send + 'static,
    {
        self.and_then(move |value| Ok(Resolution::Value(f(value))))
    }
}

fn react<V, U, E, H>(target: &Resolver<U, E>, handler: H, input: V)
where
    U: Payload,
    E: Payload + From<Error>,
    H: FnOnce(V) -> Result<Resolution<U, E>, E>,
{
    match panic::catch_unwind(AssertUnwindSafe(move || handler(input))) {
        Ok(Ok(outcome)) => target.resolve(outcome),
        Ok(Err(error)) => {
            target.reject(error);
        }
        Err(payload) => {
            let error = Error::panicked(payload);
            warn!(promise = %target.id(), %error, "handler panicked");
            target.reject(E::from(error));
        }
    }
}
