use std::sync::Arc;

use futures::future::{BoxFuture, Future, FutureExt};
use tokio::sync::{mpsc, Mutex};
use tokio::task::{self, JoinHandle};
use tokio::time::{self, error::Elapsed, Duration};

use crate::execution::ExitReason;
use crate::worker::WorkerId;

/// Event represents all the different things that may happen on a running
/// supervisor.
#[derive(Debug, Clone, PartialEq)]
pub enum Event {
    /// The supervisor transitioned to the running state.
    SupervisorStarted,
    /// The supervisor transitioned to the stopped state.
    SupervisorStopped,
    /// A fresh execution of a worker's start routine was spawned.
    WorkerStarted(WorkerData),
    /// The monitor observed that a worker's execution terminated.
    WorkerExited(WorkerData, ExitReason),
    /// The restart budget was exhausted; the supervisor is about to stop.
    RestartBudgetExhausted,
}

/// WorkerData holds details about the worker entry that produced an event.
#[derive(Debug, Clone, PartialEq)]
pub struct WorkerData {
    /// Identifier of the worker entry within its supervisor.
    pub id: WorkerId,
    /// Number of times the supervisor has started this worker so far.
    pub start_count: u64,
}

/// NotifyFn is used by the supervision API to send events to an interested
/// listener.
type NotifyFn = Box<dyn Fn(Event) -> BoxFuture<'static, ()> + Send + Sync>;

/// EventNotifier is used by the internal supervision API to send events about
/// a running supervisor. It is handed in at construction time via
/// [`crate::supervisor::with_event_notifier`]; without one, events are
/// discarded.
#[derive(Clone)]
pub struct EventNotifier(Arc<NotifyFn>);

impl EventNotifier {
    /// Creates a notifier from an asynchronous callback.
    pub fn new<F, O>(notify0: F) -> Self
    where
        F: Fn(Event) -> O + Send + Sync + 'static,
        O: Future<Output = ()> + Send + 'static,
    {
        let notify = move |ev| {
            let fut = notify0(ev);
            fut.boxed()
        };
        EventNotifier(Arc::new(Box::new(notify)))
    }

    /// Creates a notifier that forwards every event to an mpsc channel.
    pub fn from_mpsc(sender: mpsc::Sender<Event>) -> Self {
        Self::new(move |ev: Event| {
            let sender = sender.clone();
            async move {
                let _ = sender.send(ev).await;
            }
        })
    }

    /// Creates a notifier that discards every event.
    pub(crate) fn noop() -> Self {
        Self::new(|_| async {})
    }

    async fn notify(&self, ev: Event) {
        (self.0)(ev).await
    }

    pub(crate) async fn supervisor_started(&self) {
        self.notify(Event::SupervisorStarted).await
    }

    pub(crate) async fn supervisor_stopped(&self) {
        self.notify(Event::SupervisorStopped).await
    }

    pub(crate) async fn worker_started(&self, id: WorkerId, start_count: u64) {
        self.notify(Event::WorkerStarted(WorkerData { id, start_count }))
            .await
    }

    pub(crate) async fn worker_exited(&self, id: WorkerId, start_count: u64, reason: ExitReason) {
        self.notify(Event::WorkerExited(
            WorkerData { id, start_count },
            reason,
        ))
        .await
    }

    pub(crate) async fn restart_budget_exhausted(&self) {
        self.notify(Event::RestartBudgetExhausted).await
    }
}

////////////////////////////////////////////////////////////////////////////////

/// EventBufferCollector is an event listener that collects all the events
/// that have been published by a supervisor. It later can be used to assert
/// events that have happened.
pub struct EventBufferCollector {
    events: Arc<Mutex<Vec<Event>>>,
    #[allow(dead_code)]
    join_handle: JoinHandle<()>,
}

impl EventBufferCollector {
    /// Creates a collector that accumulates events from an mpsc channel.
    pub async fn from_mpsc(receiver: mpsc::Receiver<Event>) -> EventBufferCollector {
        let events = Arc::new(Mutex::new(Vec::new()));
        let join_handle = task::spawn(run_event_collector(events.clone(), receiver));
        EventBufferCollector {
            events,
            join_handle,
        }
    }

    /// get_events returns the events that have happened so far.
    pub async fn get_events(&self) -> Vec<Event> {
        let events = self.events.lock().await;
        (*events).clone()
    }

    /// assert_exact checks that the accumulated events that have happened so
    /// far match the given assertions in order.
    pub async fn assert_exact(&self, asserts: Vec<EventAssert>) {
        let events = self.get_events().await;
        assert_eq!(events.len(), asserts.len(), "{:?}", events);
        for (ev, assert) in events.into_iter().zip(asserts.into_iter()) {
            assert.check(&ev)
        }
    }

    /// Blocks until an event matching the given assertion has been collected,
    /// or the given duration has elapsed.
    pub async fn wait_till(&self, assert: EventAssert, wait: Duration) -> Result<(), Elapsed> {
        time::timeout(wait, async {
            loop {
                let events = self.get_events().await;
                if events.iter().any(|ev| assert.call(ev).is_none()) {
                    return;
                }
                time::sleep(Duration::from_millis(10)).await;
            }
        })
        .await
    }
}

////////////////////////////////////////////////////////////////////////////////

/// EventAssert is a well-defined function that asserts properties from an
/// Event emitted by a running supervisor.
pub struct EventAssert(Box<dyn Fn(&Event) -> Option<String>>);

impl EventAssert {
    fn call(&self, ev: &Event) -> Option<String> {
        (*self.0)(ev)
    }

    /// Panics when the given event does not satisfy this assertion.
    pub fn check(&self, ev: &Event) {
        let result = self.call(ev);
        if let Some(err_msg) = result {
            panic!("EventAssert failed: {}", err_msg);
        };
    }
}

/// supervisor_started asserts an event that tells the supervisor transitioned
/// to the running state.
pub fn supervisor_started() -> EventAssert {
    EventAssert(Box::new(move |ev| match ev {
        Event::SupervisorStarted => None,
        _ => Some(format!("Expecting SupervisorStarted; got {:?} instead", ev)),
    }))
}

/// supervisor_stopped asserts an event that tells the supervisor transitioned
/// to the stopped state.
pub fn supervisor_stopped() -> EventAssert {
    EventAssert(Box::new(move |ev| match ev {
        Event::SupervisorStopped => None,
        _ => Some(format!("Expecting SupervisorStopped; got {:?} instead", ev)),
    }))
}

/// worker_started asserts an event that tells a fresh execution of the given
/// worker was spawned.
pub fn worker_started(id: WorkerId) -> EventAssert {
    EventAssert(Box::new(move |ev| match ev {
        Event::WorkerStarted(WorkerData { id: ev_id, .. }) => {
            if *ev_id != id {
                Some(format!(
                    "Expecting WorkerStarted for {}; got {:?} instead",
                    id, ev
                ))
            } else {
                None
            }
        }
        _ => Some(format!("Expecting WorkerStarted; got {:?} instead", ev)),
    }))
}

/// worker_exited asserts an event that tells the monitor observed the
/// termination of the given worker.
pub fn worker_exited(id: WorkerId) -> EventAssert {
    EventAssert(Box::new(move |ev| match ev {
        Event::WorkerExited(WorkerData { id: ev_id, .. }, _) => {
            if *ev_id != id {
                Some(format!(
                    "Expecting WorkerExited for {}; got {:?} instead",
                    id, ev
                ))
            } else {
                None
            }
        }
        _ => Some(format!("Expecting WorkerExited; got {:?} instead", ev)),
    }))
}

/// restart_budget_exhausted asserts an event that tells the supervisor gave
/// up restarting and is about to stop.
pub fn restart_budget_exhausted() -> EventAssert {
    EventAssert(Box::new(move |ev| match ev {
        Event::RestartBudgetExhausted => None,
        _ => Some(format!(
            "Expecting RestartBudgetExhausted; got {:?} instead",
            ev
        )),
    }))
}

/// run_event_collector is an internal function that receives supervision
/// events from a channel and stores them on a thread-safe buffer.
async fn run_event_collector(events: Arc<Mutex<Vec<Event>>>, mut receiver: mpsc::Receiver<Event>) {
    while let Some(ev) = receiver.recv().await {
        let mut ev_vec = events.lock().await;
        ev_vec.push(ev);
    }
}

/// testing_event_notifier returns an `EventNotifier` that sends its events
/// to an `EventBufferCollector`.
pub async fn testing_event_notifier() -> (EventNotifier, EventBufferCollector) {
    let (send_ev, rx_ev) = mpsc::channel(100);
    let notifier = EventNotifier::from_mpsc(send_ev);
    let buffer = EventBufferCollector::from_mpsc(rx_ev).await;
    (notifier, buffer)
}
