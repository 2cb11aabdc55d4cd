//! A promise paired with its settlement handle, for producers that don't fit
//! the initializer callback shape.
use crate::{promise::Payload, Error, Promise, Resolution, Resolver, Scheduler};

/// A pending [`Promise`] plus the [`Resolver`] that settles it.
///
/// # Examples
///
/// ```
/// use promise_chain::{Error, Promise, TaskQueue};
/// use std::thread;
///
/// let queue = TaskQueue::new();
/// let deferred = Promise::<String, Error>::deferred(&queue.scheduler());
/// let greeting = deferred.promise.map(|s| format!("{}!", s));
///
/// let producer = deferred.resolver.clone();
/// thread::spawn(move || producer.fulfill("Hi".into()))
///     .join()
///     .expect("The producer thread has panicked.");
///
/// queue.run_until_idle();
/// assert_eq!(greeting.peek(), Some(Ok("Hi!".into())));
/// ```
#[derive(Debug)]
pub struct Deferred<T: Payload, E: Payload> {
    pub promise: Promise<T, E>,
    pub resolver: Resolver<T, E>,
}

impl<T: Payload, E: Payload> Clone for Deferred<T, E> {
    fn clone(&self) -> Self {
        Self {
            promise: self.promise.clone(),
            resolver: self.resolver.clone(),
        }
    }
}

impl<T: Payload, E: Payload + From<Error>> Promise<T, E> {
    /// A pending promise whose settlement is driven from outside.
    pub fn deferred(scheduler: &Scheduler) -> Deferred<T, E> {
        let (promise, resolver) = Promise::pending(scheduler);
        Deferred { promise, resolver }
    }
}

impl<T: Payload, E: Payload> Deferred<T, E> {
    pub fn fulfill(&self, value: T) -> bool {
        self.resolver.fulfill(value)
    }

    pub fn reject(&self, error: E) -> bool {
        self.resolver.reject(error)
    }

    pub fn into_parts(self) -> (Promise<T, E>, Resolver<T, E>) {
        (self.promise, self.resolver)
    }
}

impl<T: Payload, E: Payload + From<Error>> Deferred<T, E> {
    pub fn resolve(&self, resolution: Resolution<T, E>) {
        self.resolver.resolve(resolution)
    }
}
