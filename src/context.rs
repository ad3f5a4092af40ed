pub(crate) use futures::future::AbortHandle;

use futures::future::{abortable, pending, Aborted, BoxFuture, FutureExt, Shared};
use thiserror::Error;

/// Represents an error reported by the `Context` value.
#[derive(Clone, Debug, Error, PartialEq)]
pub(crate) enum Error {
    /// Gets returned after the `abort` method from an `AbortHandle` returned
    /// by a `with_cancel` call has been invoked.
    #[error("context was canceled")]
    Cancelled,
}

/// Offers a contract to terminate futures in a way that is explicit, reliable
/// and safe. A `Context` value is what interrupts the monitor sleep and what
/// resolves a blocking `Supervisor::start` call once `stop` is invoked.
#[derive(Clone)]
pub(crate) struct Context {
    // The `Future` that signals shutdown must be inside a `Box` so that we
    // can allow different kinds of futures (Pending, Abortable) to be
    // available inside a `Context`; in parallel, we want to allow multiple
    // routines to listen to the `Context` future, for that we use the
    // `Shared` wrapper.
    done: Shared<BoxFuture<'static, Result<(), Error>>>,
}

impl Context {
    /// Creates a `Context` that will never expire on its own.
    pub(crate) fn new() -> Self {
        Self {
            // we use pending, a future that will never end, we then wrap it
            // on a box to allow multiple kinds of futures; finally we wrap
            // it on a `Shared` value to allow multiple reads and cheap
            // clones.
            done: pending().boxed().shared(),
        }
    }

    /// Clones a given `Context` and transforms it into one that can be
    /// cancelled when calling the returned `AbortHandle#abort` function.
    pub(crate) fn with_cancel(&self) -> (Self, AbortHandle) {
        let to_context_err = |r: Result<Result<(), Error>, Aborted>| match r {
            Ok(Ok(())) => Ok(()),
            Ok(Err(err)) => Err(err),
            Err(_) => Err(Error::Cancelled),
        };

        let (done, aborter) = abortable(self.done.clone());
        let done = done.map(to_context_err).boxed().shared();
        (Self { done }, aborter)
    }

    /// Returns a future that is used on `select!` statements to assess if we
    /// should terminate a routine.
    pub(crate) fn done(&self) -> Shared<BoxFuture<'static, Result<(), Error>>> {
        self.done.clone()
    }
}
