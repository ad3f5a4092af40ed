use std::sync::{Arc, Mutex, MutexGuard};

use futures::future::BoxFuture;
use futures::FutureExt;
use thiserror::Error;
use tokio::task::{self, JoinHandle};
use tokio::time::Duration;

use crate::context::{AbortHandle, Context};
use crate::events::EventNotifier;
use crate::execution::{Execution, ExitReason};
use crate::runnable::{ChildKind, Runnable, RunnableRef};
use crate::worker::{self, WorkerEntry, WorkerId, WorkerSpec};

/// Contains the periodic liveness scanner that detects terminated workers.
mod monitor;
/// Contains the configuration options of a `Supervisor`.
mod opts;
/// Contains the restart strategies applied when a worker terminates.
mod policy;
/// Contains the sliding-window accounting of recent restarts.
mod restart_ledger;

pub use opts::{
    with_event_notifier, with_initial_worker, with_max_restarts, with_monitor_interval,
    with_restart_window, with_strategy, ConfigError, Opt, Strategy,
};

use opts::Settings;
use restart_ledger::RestartLedger;

/// Error that can be reported when starting a `Supervisor`.
#[derive(Debug, Error)]
pub enum StartError {
    /// `start` was invoked while the supervisor was already running.
    #[error("supervisor is already running")]
    AlreadyRunning,
}

/// Lifecycle phase of a supervisor.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
enum Phase {
    Stopped,
    Running,
}

/// Everything guarded by the supervisor lock. The lock is never held across
/// a suspension point; worker lifecycle calls always happen outside of it.
struct State {
    phase: Phase,
    workers: Vec<WorkerEntry>,
    ledger: RestartLedger,
    next_id: u64,
    // Aborting this handle resolves the shutdown context: the monitor sleep
    // is interrupted and blocked `start` callers resume. Present iff running.
    shutdown: Option<AbortHandle>,
    // Join handle of the monitor loop. Present iff running; the monitor
    // terminates itself once it observes the stopped phase.
    monitor: Option<JoinHandle<()>>,
}

impl State {
    fn entry(&self, id: WorkerId) -> Option<&WorkerEntry> {
        self.workers.iter().find(|entry| entry.id == id)
    }

    fn entry_mut(&mut self, id: WorkerId) -> Option<&mut WorkerEntry> {
        self.workers.iter_mut().find(|entry| entry.id == id)
    }
}

struct Inner {
    strategy: Strategy,
    monitor_interval: Duration,
    max_restarts: u32,
    restart_window: Duration,
    ev_notifier: EventNotifier,
    state: Mutex<State>,
}

/// A `Supervisor` owns a set of [`Runnable`] children and restarts them
/// according to declared policies when they terminate abnormally.
///
/// Workers are registered while the supervisor is stopped, in an order that
/// is part of the semantics of [`Strategy::RestForOne`]. Once started, a
/// monitor task periodically scans the children, and terminated ones are
/// dispatched to the configured restart strategy; a sliding-window restart
/// budget protects against restart storms by stopping the whole supervisor
/// when it is exhausted.
///
/// The value is a cheap-to-clone handle: clones share the same supervisor,
/// which is how one task can block in [`Supervisor::start`] while another
/// invokes [`Supervisor::stop`].
///
/// A `Supervisor` is itself a [`Runnable`], so it can be registered as the
/// child of another supervisor; it is then auto-classified as
/// [`ChildKind::Supervisor`] and its own children are transitively started
/// and stopped on the parent's lifecycle.
///
/// A running supervisor should be stopped explicitly; dropping every handle
/// while running leaves the worker executions to the runtime's own shutdown.
#[derive(Clone)]
pub struct Supervisor {
    inner: Arc<Inner>,
}

impl Supervisor {
    /// Creates a supervisor in the stopped state.
    ///
    /// Fails with a [`ConfigError`] when one of the given options carries an
    /// out-of-range value.
    pub fn new(mut opts: Vec<Opt>) -> Result<Self, ConfigError> {
        let mut settings = Settings::new();
        for opt in opts.iter_mut() {
            opt.call(&mut settings);
        }
        settings.validate()?;

        let ledger = RestartLedger::new(settings.max_restarts, settings.restart_window);
        let sup = Supervisor {
            inner: Arc::new(Inner {
                strategy: settings.strategy,
                monitor_interval: settings.monitor_interval,
                max_restarts: settings.max_restarts,
                restart_window: settings.restart_window,
                ev_notifier: settings.ev_notifier,
                state: Mutex::new(State {
                    phase: Phase::Stopped,
                    workers: Vec::new(),
                    ledger,
                    next_id: 0,
                    shutdown: None,
                    monitor: None,
                }),
            }),
        };

        if let Some(preloaded) = settings.initial_worker.take() {
            let _ = sup.add_worker(preloaded, Vec::new());
        }

        Ok(sup)
    }

    /// Registers a worker on this supervisor and returns its identifier.
    ///
    /// Workers may be registered only while the supervisor is stopped;
    /// registering on a running supervisor is a no-op that answers `None`.
    /// The registration order is preserved and is observable under
    /// [`Strategy::RestForOne`] and [`Strategy::OneForAll`].
    pub fn add_worker(&self, worker: RunnableRef, mut opts: Vec<worker::Opt>) -> Option<WorkerId> {
        let mut spec = WorkerSpec::new();
        for opt in opts.iter_mut() {
            opt.call(&mut spec);
        }
        // Resolve the kind before taking the lock; the detection calls into
        // the worker object.
        let kind = spec.kind.unwrap_or_else(|| worker.kind());

        let mut state = self.lock_state();
        if state.phase == Phase::Running {
            return None;
        }
        let id = WorkerId(state.next_id);
        state.next_id += 1;
        state.workers.push(WorkerEntry::new(id, worker, kind, spec.restart));
        Some(id)
    }

    /// Starts every registered worker and the monitor loop, then blocks the
    /// caller until [`Supervisor::stop`] is invoked from elsewhere.
    ///
    /// Each worker's routine runs on its own independent task, spawned in
    /// registration order. Fails with [`StartError::AlreadyRunning`] when the
    /// supervisor is already running.
    pub async fn start(&self) -> Result<(), StartError> {
        let ctx = self.begin().await?;
        let _ = ctx.done().await;
        Ok(())
    }

    /// Non-blocking variant of [`Supervisor::start`]; returns as soon as the
    /// workers and the monitor have been spawned.
    pub async fn start_async(&self) -> Result<(), StartError> {
        let _ = self.begin().await?;
        Ok(())
    }

    /// Stops the supervisor.
    ///
    /// Terminates the monitor, asks every worker whose execution is still
    /// running to stop (worker stop faults are suppressed), cancels the
    /// execution handles and resets the restart ledger. Stopping an already
    /// stopped supervisor is a no-op; the call is idempotent and re-entrant.
    pub async fn stop(&self) {
        let (shutdown, monitor, victims) = {
            let mut state = self.lock_state();
            if state.phase == Phase::Stopped {
                return;
            }
            state.phase = Phase::Stopped;
            let shutdown = state.shutdown.take();
            let monitor = state.monitor.take();
            let victims: Vec<(RunnableRef, Execution)> = state
                .workers
                .iter_mut()
                .filter_map(|entry| match entry.execution.take() {
                    Some(execution) if execution.alive() => {
                        Some((entry.worker.clone(), execution))
                    }
                    _ => None,
                })
                .collect();
            state.ledger.reset();
            (shutdown, monitor, victims)
        };

        // Interrupt the monitor sleep and resolve blocked `start` callers.
        if let Some(handle) = shutdown {
            handle.abort();
        }
        // The monitor terminates on its own once it observes the stopped
        // phase; dropping the handle merely detaches it.
        drop(monitor);

        for (worker, execution) in victims {
            let _ = worker.stop().await;
            execution.cancel();
        }

        self.inner.ev_notifier.supervisor_stopped().await;
    }

    /// Returns the count of registered workers.
    pub fn len(&self) -> usize {
        self.lock_state().workers.len()
    }

    /// Returns true when no worker has been registered.
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Returns true while the supervisor is running.
    pub fn is_running(&self) -> bool {
        self.lock_state().phase == Phase::Running
    }

    /// Returns the number of restarts inside the current budget window since
    /// the supervisor last started; forced back to zero by a stop.
    pub fn current_restart_count(&self) -> usize {
        self.lock_state().ledger.current_count()
    }

    /// Returns the configured restart strategy.
    pub fn strategy(&self) -> Strategy {
        self.inner.strategy
    }

    /// Returns the configured pause between two monitor passes.
    pub fn monitor_interval(&self) -> Duration {
        self.inner.monitor_interval
    }

    /// Returns the configured restart budget.
    pub fn max_restarts(&self) -> u32 {
        self.inner.max_restarts
    }

    /// Returns the configured width of the restart budget window.
    pub fn restart_window(&self) -> Duration {
        self.inner.restart_window
    }

    /// Returns how many times this supervisor has started the given worker.
    pub fn start_count(&self, id: WorkerId) -> Option<u64> {
        self.lock_state().entry(id).map(|entry| entry.start_count)
    }

    /// Returns the kind under which the given worker was registered.
    pub fn worker_kind(&self, id: WorkerId) -> Option<ChildKind> {
        self.lock_state().entry(id).map(|entry| entry.kind)
    }

    /// Transitions to the running phase, spawns one execution per entry in
    /// registration order plus the monitor loop, and returns the shutdown
    /// context a blocking `start` waits on.
    async fn begin(&self) -> Result<Context, StartError> {
        let (ctx, snapshot) = {
            let mut state = self.lock_state();
            if state.phase == Phase::Running {
                return Err(StartError::AlreadyRunning);
            }
            state.phase = Phase::Running;
            let (ctx, abort_handle) = Context::new().with_cancel();
            state.shutdown = Some(abort_handle);
            let snapshot: Vec<_> = state
                .workers
                .iter()
                .map(|entry| (entry.id, entry.worker.clone(), entry.exit_slot.clone()))
                .collect();
            (ctx, snapshot)
        };

        // Spawn one execution per entry; the state lock is not held while
        // worker code builds its routine.
        let batch = snapshot
            .into_iter()
            .map(|(id, worker, exit_slot)| (id, Execution::spawn(&worker, exit_slot)))
            .collect();
        self.install_executions(batch).await;

        {
            let mut state = self.lock_state();
            if state.phase == Phase::Running {
                let monitor = task::spawn(monitor::run(self.clone(), ctx.clone()));
                state.monitor = Some(monitor);
            }
        }

        self.inner.ev_notifier.supervisor_started().await;
        Ok(ctx)
    }

    /// Hands freshly spawned executions over to their entries, bumping each
    /// entry's start counter.
    ///
    /// A `stop` that raced the spawn wins: executions that arrive on a
    /// stopped supervisor are torn down the same way stop tears down the
    /// rest, so nothing leaks.
    async fn install_executions(&self, batch: Vec<(WorkerId, Execution)>) {
        let mut started = Vec::new();
        let mut orphaned: Vec<(Option<RunnableRef>, Execution)> = Vec::new();
        {
            let mut state = self.lock_state();
            let stopped = state.phase != Phase::Running;
            for (id, execution) in batch {
                if stopped {
                    let worker = state.entry(id).map(|entry| entry.worker.clone());
                    orphaned.push((worker, execution));
                    continue;
                }
                match state.entry_mut(id) {
                    Some(entry) => {
                        entry.start_count += 1;
                        entry.execution = Some(execution);
                        started.push((id, entry.start_count));
                    }
                    None => orphaned.push((None, execution)),
                }
            }
        }

        for (worker, execution) in orphaned {
            if let Some(worker) = worker {
                let _ = worker.stop().await;
            }
            execution.cancel();
        }
        for (id, start_count) in started {
            self.inner.ev_notifier.worker_started(id, start_count).await;
        }
    }

    /// Snapshots, in registration order, the entries whose execution has
    /// terminated since the last scan.
    fn collect_dead(&self) -> Vec<(WorkerId, u64, ExitReason)> {
        let state = self.lock_state();
        state
            .workers
            .iter()
            .filter(|entry| matches!(&entry.execution, Some(execution) if !execution.alive()))
            .map(|entry| (entry.id, entry.start_count, entry.last_exit_reason()))
            .collect()
    }

    fn notifier(&self) -> &EventNotifier {
        &self.inner.ev_notifier
    }

    fn lock_state(&self) -> MutexGuard<'_, State> {
        self.inner.state.lock().unwrap()
    }
}

/// A `Supervisor` satisfies the worker contract itself, which is what makes
/// hierarchical composition possible: registered on a parent supervisor, it
/// is started and stopped on the parent's lifecycle like any other child.
impl Runnable for Supervisor {
    fn start(&self) -> BoxFuture<'static, Result<(), anyhow::Error>> {
        let sup = self.clone();
        async move {
            sup.start().await?;
            Ok(())
        }
        .boxed()
    }

    fn stop(&self) -> BoxFuture<'static, Result<(), anyhow::Error>> {
        let sup = self.clone();
        async move {
            sup.stop().await;
            Ok(())
        }
        .boxed()
    }

    fn alive(&self) -> bool {
        self.is_running()
    }

    fn kind(&self) -> ChildKind {
        ChildKind::Supervisor
    }
}
