use tokio::time;

use crate::context::Context;
use crate::supervisor::{policy, Supervisor};

/// Executes the periodic liveness scan until the supervisor stops.
///
/// The loop sleeps for the configured monitor interval (interruptible by
/// stop), snapshots the entries whose execution has terminated, and hands
/// each of them, in registration order, to the restart policy. The monitor
/// performs no user-visible work itself; it only observes and dispatches. A
/// crash inside this loop is a fatal programming error.
pub(super) async fn run(sup: Supervisor, ctx: Context) {
    let interval = sup.monitor_interval();
    loop {
        tokio::select! {
            _ = ctx.done() => return,
            _ = time::sleep(interval) => {}
        }
        if !sup.is_running() {
            return;
        }

        for (id, start_count, reason) in sup.collect_dead() {
            // A concurrent stop wins between two dead entries; the pass that
            // is already inside the policy finishes its current worker first.
            if !sup.is_running() {
                return;
            }
            sup.notifier().worker_exited(id, start_count, reason).await;
            match policy::apply(&sup, id, reason).await {
                policy::Outcome::Continue => {}
                policy::Outcome::BudgetExhausted => {
                    // The restart storm circuit breaker: give up and cascade
                    // the stop to every worker.
                    sup.notifier().restart_budget_exhausted().await;
                    sup.stop().await;
                    return;
                }
            }
        }
    }
}
