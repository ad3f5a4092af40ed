use std::fmt;
use std::str::FromStr;
use std::sync::{Arc, Mutex};

use crate::execution::{Execution, ExitReason, ExitSlot};
use crate::runnable::{ChildKind, RunnableRef};
use crate::supervisor::ConfigError;

/// Opaque identifier of a supervised worker, unique within its supervisor.
///
/// Returned by [`crate::Supervisor::add_worker`] and used by the read-only
/// views (`start_count`, `worker_kind`) to address an entry.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub struct WorkerId(pub(crate) u64);

impl fmt::Display for WorkerId {
    fn fmt(&self, fmt: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(fmt, "worker-{}", self.0)
    }
}

/// Per-child policy governing whether a given termination qualifies the child
/// for a restart.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Restart {
    /// The child is restarted on every termination, normal or abnormal.
    Permanent,
    /// The child is never restarted.
    Temporary,
    /// The child is restarted only when it terminates abnormally.
    Transient,
}

impl Default for Restart {
    fn default() -> Self {
        Restart::Permanent
    }
}

impl Restart {
    /// Decides whether a termination with the given exit reason qualifies for
    /// a restart.
    pub(crate) fn qualifies(&self, reason: ExitReason) -> bool {
        match self {
            Restart::Permanent => true,
            Restart::Temporary => false,
            Restart::Transient => reason == ExitReason::Abnormal,
        }
    }
}

impl FromStr for Restart {
    type Err = ConfigError;

    fn from_str(input: &str) -> Result<Self, Self::Err> {
        match input {
            "permanent" => Ok(Restart::Permanent),
            "temporary" => Ok(Restart::Temporary),
            "transient" => Ok(Restart::Transient),
            other => Err(ConfigError::UnknownRestart(other.to_owned())),
        }
    }
}

/// Settings of a single worker entry; `Opt` values mutate this record before
/// the entry is appended to the supervisor.
pub(crate) struct WorkerSpec {
    pub(crate) restart: Restart,
    pub(crate) kind: Option<ChildKind>,
}

impl WorkerSpec {
    pub(crate) fn new() -> Self {
        Self {
            restart: Restart::default(),
            kind: None,
        }
    }
}

/// Represents a configuration option that can be set on a worker entry at
/// registration time.
pub struct Opt(Box<dyn FnMut(&mut WorkerSpec) + Send + Sync + 'static>);

impl Opt {
    pub(crate) fn new<F>(opt_fn: F) -> Self
    where
        F: FnMut(&mut WorkerSpec) + Send + Sync + 'static,
    {
        Self(Box::new(opt_fn))
    }

    pub(crate) fn call(&mut self, spec: &mut WorkerSpec) {
        self.0(spec)
    }
}

/// Changes the restart type of the worker entry.
///
/// If this configuration option is not specified, the entry defaults to
/// [`Restart::Permanent`].
pub fn with_restart(restart: Restart) -> Opt {
    Opt::new(move |spec| spec.restart = restart)
}

/// Overrides the auto-detected kind of the worker entry.
///
/// Without this option the kind is taken from
/// [`Runnable::kind`](crate::Runnable::kind), which reports
/// [`ChildKind::Supervisor`] for nested supervisors and
/// [`ChildKind::Worker`] for everything else.
pub fn with_kind(kind: ChildKind) -> Opt {
    Opt::new(move |spec| spec.kind = Some(kind))
}

/// Per-child record owned by a supervisor for the lifetime of the entry.
pub(crate) struct WorkerEntry {
    pub(crate) id: WorkerId,
    pub(crate) worker: RunnableRef,
    pub(crate) restart: Restart,
    pub(crate) kind: ChildKind,
    // Handle to the current execution of `worker.start()`; None while the
    // worker is at rest.
    pub(crate) execution: Option<Execution>,
    // Shared with the execution wrapper, which records the exit reason the
    // moment the routine resolves.
    pub(crate) exit_slot: ExitSlot,
    pub(crate) start_count: u64,
}

impl WorkerEntry {
    pub(crate) fn new(id: WorkerId, worker: RunnableRef, kind: ChildKind, restart: Restart) -> Self {
        Self {
            id,
            worker,
            restart,
            kind,
            execution: None,
            exit_slot: Arc::new(Mutex::new(ExitReason::None)),
            start_count: 0,
        }
    }

    /// Whether the most recent termination was voluntary or a fault.
    pub(crate) fn last_exit_reason(&self) -> ExitReason {
        *self.exit_slot.lock().unwrap()
    }
}
