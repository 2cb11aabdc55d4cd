//! Settling a promise from an arbitrary outcome.
//!
//! An outcome is either a plain value, something known to be thenable, or an
//! object that might turn out to be one. Thenables are followed recursively
//! until a plain value or a rejection comes out.
use crate::{promise::Payload, Error, Promise, PromiseId, Resolver};
use std::{
    any::Any,
    fmt,
    panic::{self, AssertUnwindSafe},
    sync::{
        atomic::{AtomicBool, Ordering},
        Arc,
    },
};
use tracing::{debug, trace, warn};

/// What a handler hands back to settle the next promise in a chain.
pub enum Resolution<T, E> {
    /// Fulfill with exactly this value.
    Value(T),
    /// Adopt the state of a thenable.
    Thenable(Box<dyn Thenable<T, E>>),
    /// Inspect the object for a `then` capability first, and fall back to
    /// fulfilling with it.
    Object(Box<dyn MaybeThenable<T, E>>),
}

impl<T, E> Resolution<T, E> {
    pub fn thenable<H>(thenable: H) -> Self
    where
        H: Thenable<T, E> + 'static,
    {
        Resolution::Thenable(Box::new(thenable))
    }

    pub fn object<O>(object: O) -> Self
    where
        O: MaybeThenable<T, E> + 'static,
    {
        Resolution::Object(Box::new(object))
    }
}

impl<T: Payload, E: Payload + From<Error>> From<Promise<T, E>> for Resolution<T, E> {
    fn from(promise: Promise<T, E>) -> Self {
        Resolution::Thenable(Box::new(promise))
    }
}

impl<T: fmt::Debug, E> fmt::Debug for Resolution<T, E> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Resolution::Value(value) => f.debug_tuple("Value").field(value).finish(),
            Resolution::Thenable(_) => f.write_str("Thenable(..)"),
            Resolution::Object(_) => f.write_str("Object(..)"),
        }
    }
}

/// Anything that can report a settlement through two callbacks.
///
/// Implementations should call at most one of the callbacks, once. Calls
/// beyond the first are ignored, so a sloppy implementation can't settle a
/// promise twice.
pub trait Thenable<T, E>: Send {
    /// Subscribes the callbacks. Returning `Err` before either callback was
    /// called rejects the adopting promise with that error.
    fn then(&self, on_fulfilled: OnFulfilled<T, E>, on_rejected: OnRejected<T, E>)
        -> Result<(), E>;

    /// Identity of the underlying promise, if this is one of ours.
    fn promise_id(&self) -> Option<PromiseId> {
        None
    }
}

/// An object that may or may not expose a `then` capability.
pub trait MaybeThenable<T, E>: Send {
    /// Looks up the object's `then`. Read once per resolution; an `Err`
    /// rejects the adopting promise.
    fn then_member(&self) -> Result<Option<Box<dyn Thenable<T, E>>>, E>;

    /// The plain value used when the object has no `then`.
    fn into_value(self: Box<Self>) -> T;
}

/// First-call-wins flag shared by the two callbacks of one `then` call.
#[derive(Clone, Default)]
struct Latch(Arc<AtomicBool>);

impl Latch {
    /// `true` for the first caller only.
    fn trip(&self) -> bool {
        !self.0.swap(true, Ordering::AcqRel)
    }
}

/// Fulfillment callback passed to [`Thenable::then`].
pub struct OnFulfilled<T, E> {
    target: Resolver<T, E>,
    latch: Latch,
}

/// Rejection callback passed to [`Thenable::then`].
pub struct OnRejected<T, E> {
    target: Resolver<T, E>,
    latch: Latch,
}

impl<T, E> Clone for OnFulfilled<T, E> {
    fn clone(&self) -> Self {
        Self {
            target: self.target.clone(),
            latch: self.latch.clone(),
        }
    }
}

impl<T, E> Clone for OnRejected<T, E> {
    fn clone(&self) -> Self {
        Self {
            target: self.target.clone(),
            latch: self.latch.clone(),
        }
    }
}

impl<T: Payload, E: Payload + From<Error>> OnFulfilled<T, E> {
    /// Continues resolution with `value`, which may itself be thenable.
    pub fn call(&self, value: Resolution<T, E>) {
        if self.latch.trip() {
            resolve(&self.target, value);
        } else {
            trace!(promise = %self.target.id(), "thenable already reported, fulfillment ignored");
        }
    }

    pub fn fulfill(&self, value: T) {
        self.call(Resolution::Value(value))
    }
}

impl<T: Payload, E: Payload + From<Error>> OnRejected<T, E> {
    pub fn call(&self, error: E) {
        if self.latch.trip() {
            self.target.reject(error);
        } else {
            trace!(promise = %self.target.id(), "thenable already reported, rejection ignored");
        }
    }
}

/// Our own promises are thenables too, which is how a handler returning a
/// promise makes the chain wait for it.
impl<T: Payload, E: Payload + From<Error>> Thenable<T, E> for Promise<T, E> {
    fn then(
        &self,
        on_fulfilled: OnFulfilled<T, E>,
        on_rejected: OnRejected<T, E>,
    ) -> Result<(), E> {
        self.subscribe(
            move |value| on_fulfilled.fulfill(value),
            move |error| on_rejected.call(error),
        );
        Ok(())
    }

    fn promise_id(&self) -> Option<PromiseId> {
        Some(self.id())
    }
}

/// Drives `target` to the settlement `outcome` stands for.
pub(crate) fn resolve<T, E>(target: &Resolver<T, E>, outcome: Resolution<T, E>)
where
    T: Payload,
    E: Payload + From<Error>,
{
    match outcome {
        Resolution::Value(value) => {
            target.fulfill(value);
        }
        Resolution::Thenable(thenable) => adopt(target, thenable),
        Resolution::Object(object) => {
            let member = panic::catch_unwind(AssertUnwindSafe(|| object.then_member()));
            match member {
                Ok(Ok(Some(thenable))) => adopt(target, thenable),
                Ok(Ok(None)) => {
                    match panic::catch_unwind(AssertUnwindSafe(move || object.into_value())) {
                        Ok(value) => {
                            target.fulfill(value);
                        }
                        Err(payload) => {
                            target.reject(panicked(target, payload));
                        }
                    }
                }
                Ok(Err(error)) => {
                    target.reject(error);
                }
                Err(payload) => {
                    target.reject(panicked(target, payload));
                }
            }
        }
    }
}

fn adopt<T, E>(target: &Resolver<T, E>, thenable: Box<dyn Thenable<T, E>>)
where
    T: Payload,
    E: Payload + From<Error>,
{
    if thenable.promise_id() == Some(target.id()) {
        debug!(promise = %target.id(), "chaining cycle detected");
        target.reject(E::from(Error::ChainingCycle(target.id())));
        return;
    }

    let latch = Latch::default();
    let on_fulfilled = OnFulfilled {
        target: target.clone(),
        latch: latch.clone(),
    };
    let on_rejected = OnRejected {
        target: target.clone(),
        latch: latch.clone(),
    };
    let error = match panic::catch_unwind(AssertUnwindSafe(|| {
        thenable.then(on_fulfilled, on_rejected)
    })) {
        Ok(Ok(())) => return,
        Ok(Err(error)) => error,
        Err(payload) => panicked(target, payload),
    };
    if latch.trip() {
        target.reject(error);
    } else {
        trace!(promise = %target.id(), "thenable failed after reporting, error swallowed");
    }
}

fn panicked<T, E>(target: &Resolver<T, E>, payload: Box<dyn Any + Send>) -> E
where
    T: Payload,
    E: Payload + From<Error>,
{
    let error = Error::panicked(payload);
    warn!(promise = %target.id(), %error, "thenable panicked");
    E::from(error)
}
