use std::panic::AssertUnwindSafe;
use std::sync::{Arc, Mutex};

use futures::FutureExt;
use tokio::task::{self, JoinHandle};

use crate::runnable::RunnableRef;

/// Outcome of the most recent execution of a worker's `start` routine, as
/// recorded by the execution wrapper.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum ExitReason {
    /// The worker has not terminated under this supervisor yet.
    None,
    /// The routine resolved with `Ok`, a voluntary termination.
    Normal,
    /// The routine resolved with `Err` or panicked.
    Abnormal,
}

/// Cell shared between a worker entry and the wrapper of its current
/// execution; holds the entry's last exit reason.
pub(crate) type ExitSlot = Arc<Mutex<ExitReason>>;

/// Handle to one asynchronous execution of a worker's `start` routine.
///
/// The routine runs on its own tokio task. The wrapper around it records the
/// exit reason into the entry's shared slot the moment the routine resolves,
/// so the monitor can classify a termination it observes later.
pub(crate) struct Execution {
    join_handle: JoinHandle<()>,
}

impl Execution {
    /// Spawns a fresh execution of `worker.start()`.
    ///
    /// Panics inside the routine are captured by the wrapper and recorded as
    /// an abnormal exit; they never propagate past the execution task.
    pub(crate) fn spawn(worker: &RunnableRef, exit_slot: ExitSlot) -> Self {
        let routine = worker.start();
        let join_handle = task::spawn(async move {
            let result = AssertUnwindSafe(routine).catch_unwind().await;
            let reason = match result {
                Ok(Ok(())) => ExitReason::Normal,
                Ok(Err(_)) | Err(_) => ExitReason::Abnormal,
            };
            *exit_slot.lock().unwrap() = reason;
        });
        Self { join_handle }
    }

    /// Reports whether the routine is still executing.
    pub(crate) fn alive(&self) -> bool {
        !self.join_handle.is_finished()
    }

    /// Hard-cancels the execution task.
    ///
    /// Used as the last step of a supervisor stop, after the worker has been
    /// asked to terminate cooperatively. A cancelled execution records no
    /// exit reason.
    pub(crate) fn cancel(&self) {
        self.join_handle.abort();
    }

    /// Waits for the routine to wind down. Cancellation and panics have
    /// already been dealt with by the wrapper, so the join outcome itself
    /// carries no information.
    pub(crate) async fn wait(self) {
        let _ = self.join_handle.await;
    }
}
