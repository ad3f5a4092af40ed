use std::sync::Arc;

use futures::future::BoxFuture;

/// Classification of a supervised child.
///
/// The classification is informational: it records whether a child is a plain
/// worker or a nested supervisor, which matters when inspecting a supervision
/// hierarchy. It is auto-detected at registration time via
/// [`Runnable::kind`]; an explicit [`crate::worker::with_kind`] option wins
/// over the detection.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum ChildKind {
    /// The child is a leaf worker.
    Worker,
    /// The child is itself a supervisor, managing its own children.
    Supervisor,
}

/// Shared handle to a supervised worker object.
///
/// The supervisor never takes exclusive ownership of the worker object; API
/// clients may retain a second reference to interact with it directly.
pub type RunnableRef = Arc<dyn Runnable>;

/// Capability contract required of every supervised worker.
///
/// Any value exposing the three capabilities below can be registered on a
/// [`crate::Supervisor`]. The contract is deliberately small: the supervisor
/// only ever starts a worker's long-running activity, requests its
/// cooperative termination, and asks whether an activity is in flight.
///
/// ### Fresh futures
///
/// `start` takes `&self` and must return an independent future on every call:
/// a restarted worker gets a brand new routine, not a resumed one. State that
/// must survive restarts belongs inside the implementing type (usually behind
/// an `Arc`), not inside the returned future.
///
/// ### Serialization
///
/// Concurrent `start`/`stop` calls are serialized by the worker itself; the
/// supervisor never holds its own lock while calling into a worker.
pub trait Runnable: Send + Sync + 'static {
    /// Begins the worker's long-running activity.
    ///
    /// The returned future must not resolve until the activity is complete or
    /// has been signaled to stop via [`Runnable::stop`]. Resolving with `Ok`
    /// counts as a voluntary (normal) termination; resolving with `Err` or
    /// panicking counts as a fault (abnormal) and may trigger a restart
    /// depending on the entry's [`crate::Restart`] type.
    fn start(&self) -> BoxFuture<'static, Result<(), anyhow::Error>>;

    /// Requests cooperative termination of the ongoing activity.
    ///
    /// Must eventually cause an in-flight [`Runnable::start`] future to
    /// resolve. Errors reported here are suppressed by the supervisor; they
    /// never abort a restart or a supervisor stop.
    fn stop(&self) -> BoxFuture<'static, Result<(), anyhow::Error>>;

    /// Reports whether an activity is currently executing.
    fn alive(&self) -> bool;

    /// Classifies this worker for registration purposes.
    ///
    /// Plain workers keep the default; [`crate::Supervisor`] overrides this
    /// to report [`ChildKind::Supervisor`], which is how nested supervisors
    /// are detected without a shared base type.
    fn kind(&self) -> ChildKind {
        ChildKind::Worker
    }
}
