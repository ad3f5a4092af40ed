use std::sync::atomic::{AtomicBool, AtomicU32, Ordering};
use std::sync::Arc;

use anyhow::anyhow;
use futures::future::BoxFuture;
use futures::FutureExt;
use tokio::sync::Notify;

use crate::runnable::Runnable;

/// Scripted behavior of a probe worker.
#[derive(Clone, Copy)]
pub(crate) enum Script {
    /// Every run blocks until a stop request arrives.
    BlockUntilStop,
    /// The first run terminates voluntarily right away; later runs block.
    ExitOnce,
    /// The first run fails right away; later runs block.
    FailOnce,
    /// Every run fails right away.
    FailAlways,
}

/// Countable worker used to observe supervisor decisions from tests. Keeps
/// track of how many times the supervisor invoked its start and stop
/// capabilities.
#[derive(Clone)]
pub(crate) struct Probe {
    state: Arc<ProbeState>,
}

struct ProbeState {
    script: Script,
    starts: AtomicU32,
    stops: AtomicU32,
    running: AtomicBool,
    stop_requested: AtomicBool,
    stop_notify: Notify,
}

impl Probe {
    pub(crate) fn new(script: Script) -> Self {
        Self {
            state: Arc::new(ProbeState {
                script,
                starts: AtomicU32::new(0),
                stops: AtomicU32::new(0),
                running: AtomicBool::new(false),
                stop_requested: AtomicBool::new(false),
                stop_notify: Notify::new(),
            }),
        }
    }

    pub(crate) fn starts(&self) -> u32 {
        self.state.starts.load(Ordering::SeqCst)
    }

    pub(crate) fn stops(&self) -> u32 {
        self.state.stops.load(Ordering::SeqCst)
    }
}

impl ProbeState {
    async fn block_until_stop(&self) {
        loop {
            if self.stop_requested.swap(false, Ordering::SeqCst) {
                return;
            }
            self.stop_notify.notified().await;
        }
    }
}

impl Runnable for Probe {
    fn start(&self) -> BoxFuture<'static, Result<(), anyhow::Error>> {
        let state = self.state.clone();
        async move {
            let run = state.starts.fetch_add(1, Ordering::SeqCst);
            // A stop request always targets the current activity; a fresh
            // run begins with a clean slate.
            state.stop_requested.store(false, Ordering::SeqCst);
            state.running.store(true, Ordering::SeqCst);
            let result = match (state.script, run) {
                (Script::FailAlways, _) | (Script::FailOnce, 0) => Err(anyhow!("probe failure")),
                (Script::ExitOnce, 0) => Ok(()),
                _ => {
                    state.block_until_stop().await;
                    Ok(())
                }
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
