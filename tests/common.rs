use std::sync::atomic::{AtomicBool, AtomicU32, Ordering};
use std::sync::Arc;

use anyhow::anyhow;
use futures::future::BoxFuture;
use futures::FutureExt;
use tokio::sync::Notify;

use foreman::Runnable;

/// Worker that runs until its stop capability is invoked; counts how many
/// times the supervisor started and stopped it. The value is a cheap
/// cloneable handle, so tests can keep one clone for assertions while the
/// supervisor holds another.
#[derive(Clone)]
pub struct CountingWorker {
    state: Arc<WorkerState>,
}

struct WorkerState {
    // number of runs that terminate right away before the worker settles
    // into blocking until stopped.
    early_exits: u32,
    fail_early_exits: bool,
    starts: AtomicU32,
    stops: AtomicU32,
    running: AtomicBool,
    stop_requested: AtomicBool,
    stop_notify: Notify,
}

impl CountingWorker {
    fn new(early_exits: u32, fail_early_exits: bool) -> Self {
        Self {
            state: Arc::new(WorkerState {
                early_exits,
                fail_early_exits,
                starts: AtomicU32::new(0),
                stops: AtomicU32::new(0),
                running: AtomicBool::new(false),
                stop_requested: AtomicBool::new(false),
                stop_notify: Notify::new(),
            }),
        }
    }

    pub fn starts(&self) -> u32 {
        self.state.starts.load(Ordering::SeqCst)
    }

    pub fn stops(&self) -> u32 {
        self.state.stops.load(Ordering::SeqCst)
    }
}

impl WorkerState {
    async fn block_until_stop(&self) {
        loop {
            if self.stop_requested.swap(false, Ordering::SeqCst) {
                return;
            }
            self.stop_notify.notified().await;
        }
    }
}

impl Runnable for CountingWorker {
    fn start(&self) -> BoxFuture<'static, Result<(), anyhow::Error>> {
        let state = self.state.clone();
        async move {
            let run = state.starts.fetch_add(1, Ordering::SeqCst);
            state.stop_requested.store(false, Ordering::SeqCst);
            state.running.store(true, Ordering::SeqCst);
            let result = if run < state.early_exits {
                if state.fail_early_exits {
                    Err(anyhow!("scripted failure"))
                } else {
                    Ok(())
                }
            } else {
                state.block_until_stop().await;
                Ok(())
            };
            state.running.store(false, Ordering::SeqCst);
            result
        }
        .boxed()
    }

    fn stop(&self) -> BoxFuture<'static, Result<(), anyhow::Error>> {
        let state = self.state.clone();
        async move {
            state.stops.fetch_add(1, Ordering::SeqCst);
            state.stop_requested.store(true, Ordering::SeqCst);
            state.stop_notify.notify_one();
            Ok(())
        }
        .boxed()
    }

    fn alive(&self) -> bool {
        self.state.running.load(Ordering::SeqCst)
    }
}

/// Creates a worker that blocks until it is asked to stop.
pub fn wait_done_worker() -> CountingWorker {
    CountingWorker::new(0, false)
}

/// Creates a worker that fails on its first run and blocks afterwards.
pub fn fail_once_worker() -> CountingWorker {
    CountingWorker::new(1, true)
}

/// Creates a worker that fails on every run.
pub fn always_fail_worker() -> CountingWorker {
    CountingWorker::new(u32::MAX, true)
}
