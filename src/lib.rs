//! Chainable promises with thenable interop.
//!
//! A [`Promise`] is Pending until one of its [`Resolver`]s settles it as
//! Fulfilled or Rejected. Continuations attached with [`Promise::then`] and
//! friends always run later, through the [`Scheduler`] the promise was built
//! with, and every registration yields a new promise settled from the
//! handler's outcome.
//!
//! # Examples
//!
//! ```
//! use promise_chain::{Error, Promise, Resolution, TaskQueue};
//!
//! #[derive(Debug, Clone, PartialEq)]
//! enum Reason {
//!     Engine(Error),
//! }
//!
//! impl From<Error> for Reason {
//!     fn from(error: Error) -> Self {
//!         Reason::Engine(error)
//!     }
//! }
//!
//! let queue = TaskQueue::new();
//! let sum = Promise::<i32, Reason>::resolved(&queue.scheduler(), 5)
//!     .then(|x| Ok(Resolution::Value(x + 1)), Err);
//! queue.run_until_idle();
//! assert_eq!(sum.peek(), Some(Ok(6)));
//! ```
mod future;
pub mod pair;
mod promise;
mod resolution;
pub mod scheduler;
mod then;

use std::any::Any;

pub use future::Settled;
pub use pair::Deferred;
pub use promise::{Payload, Promise, PromiseId, Resolver, Status};
pub use resolution::{MaybeThenable, OnFulfilled, OnRejected, Resolution, Thenable};
pub use scheduler::{Schedule, Scheduler, Task, TaskQueue};

/// Errors synthesized by the engine itself.
///
/// User rejections travel as the promise's own error type; these variants
/// reach it through `From<Error>`.
#[derive(thiserror::Error, Debug, Clone, PartialEq, Eq)]
pub enum Error {
    #[error("Chaining cycle detected for promise {0}")]
    ChainingCycle(PromiseId),
    #[error("callback panicked: {0}")]
    Panicked(String),
}

impl Error {
    pub(crate) fn panicked(payload: Box<dyn Any + Send>) -> Self {
        let message = match payload.downcast::<String>() {
            Ok(message) => *message,
            Err(payload) => match payload.downcast::<&'static str>() {
                Ok(message) => (*message).to_owned(),
                Err(_) => "opaque panic payload".to_owned(),
            },
        };
        Error::Panicked(message)
    }
}
