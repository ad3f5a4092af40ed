use crate::execution::{Execution, ExitReason, ExitSlot};
use crate::runnable::RunnableRef;
use crate::supervisor::{Phase, Strategy, Supervisor};
use crate::worker::WorkerId;

/// Verdict of one policy invocation.
pub(super) enum Outcome {
    /// The termination was dealt with; the monitor keeps scanning.
    Continue,
    /// The restart budget is exhausted; the monitor must stop the supervisor.
    BudgetExhausted,
}

/// Applies the configured restart strategy to one terminated entry.
///
/// The eligibility of the entry is decided from its restart type and the
/// observed exit reason; ineligible terminations return without consulting
/// the ledger. Eligible ones register exactly one restart attempt on the
/// ledger, even when the verdict turns out to be budget exhaustion.
pub(super) async fn apply(sup: &Supervisor, id: WorkerId, reason: ExitReason) -> Outcome {
    {
        let mut state = sup.lock_state();
        if state.phase != Phase::Running {
            return Outcome::Continue;
        }
        let entry = match state.entry_mut(id) {
            Some(entry) => entry,
            None => return Outcome::Continue,
        };
        match &entry.execution {
            // A sibling restart earlier in this same scan already revived
            // the worker.
            Some(execution) if execution.alive() => return Outcome::Continue,
            Some(_) => {}
            // Already handled; the entry is at rest.
            None => return Outcome::Continue,
        }
        if !entry.restart.qualifies(reason) {
            // The entry stays registered but at rest.
            entry.execution = None;
            return Outcome::Continue;
        }
        if state.ledger.exceeded() {
            return Outcome::BudgetExhausted;
        }
    }

    match sup.strategy() {
        Strategy::OneForOne => one_for_one(sup, id).await,
        Strategy::OneForAll => restart_group(sup, id, GroupScope::All).await,
        Strategy::RestForOne => restart_group(sup, id, GroupScope::FromTerminated).await,
    }
    Outcome::Continue
}

/// Snapshot of one entry taken under the lock; the blocking worker calls
/// operate on this value with the lock released.
struct Target {
    id: WorkerId,
    worker: RunnableRef,
    exit_slot: ExitSlot,
    execution: Option<Execution>,
}

enum GroupScope {
    /// Every entry of the supervisor.
    All,
    /// The terminated entry and every entry registered after it.
    FromTerminated,
}

/// Restarts only the terminated entry.
async fn one_for_one(sup: &Supervisor, id: WorkerId) {
    let target = {
        let mut state = sup.lock_state();
        match state.entry_mut(id) {
            Some(entry) => Target {
                id: entry.id,
                worker: entry.worker.clone(),
                exit_slot: entry.exit_slot.clone(),
                execution: entry.execution.take(),
            },
            None => return,
        }
    };

    // The worker is technically finished, but may still hold resources.
    let _ = target.worker.stop().await;
    if let Some(execution) = target.execution {
        execution.wait().await;
    }

    let execution = Execution::spawn(&target.worker, target.exit_slot.clone());
    sup.install_executions(vec![(target.id, execution)]).await;
}

/// Restarts a group of entries around the terminated one: every sibling for
/// [`Strategy::OneForAll`], the terminated entry and its trailing siblings
/// for [`Strategy::RestForOne`].
async fn restart_group(sup: &Supervisor, terminated: WorkerId, scope: GroupScope) {
    let mut targets: Vec<Target> = {
        let mut state = sup.lock_state();
        let skip = match scope {
            GroupScope::All => 0,
            GroupScope::FromTerminated => state
                .workers
                .iter()
                .position(|entry| entry.id == terminated)
                .unwrap_or(0),
        };
        state
            .workers
            .iter_mut()
            .skip(skip)
            .map(|entry| Target {
                id: entry.id,
                worker: entry.worker.clone(),
                exit_slot: entry.exit_slot.clone(),
                execution: entry.execution.take(),
            })
            .collect()
    };

    // Ask the affected siblings that are still running to stop, newest
    // first; the terminated entry needs no request.
    for target in targets.iter().rev() {
        if target.id == terminated {
            continue;
        }
        let running = target
            .execution
            .as_ref()
            .map(Execution::alive)
            .unwrap_or(false);
        if running {
            let _ = target.worker.stop().await;
        }
    }

    // Wait for every affected execution to wind down before anything is
    // started again: within one policy pass, stops strictly precede starts.
    for target in targets.iter_mut() {
        if let Some(execution) = target.execution.take() {
            execution.wait().await;
        }
    }

    // Fresh executions in registration order, the terminated entry included.
    let batch = targets
        .iter()
        .map(|target| {
            (
                target.id,
                Execution::spawn(&target.worker, target.exit_slot.clone()),
            )
        })
        .collect();
    sup.install_executions(batch).await;
}
