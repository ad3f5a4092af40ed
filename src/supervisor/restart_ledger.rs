use std::collections::VecDeque;

use tokio::time::{Duration, Instant};

/// Handles the restart tolerance logic of a Supervisor.
///
/// The ledger keeps a sliding window of restart timestamps; once the window
/// holds `max_restarts` entries the budget is exhausted and the supervisor
/// gives up. Note that `max_restarts = 0` tolerates no restarts at all.
#[derive(Debug)]
pub(crate) struct RestartLedger {
    max_restarts: u32,
    restart_window: Duration,
    restarts: VecDeque<Instant>,
}

impl RestartLedger {
    /// Creates a new RestartLedger instance.
    pub(crate) fn new(max_restarts: u32, restart_window: Duration) -> Self {
        Self {
            max_restarts,
            restart_window,
            restarts: VecDeque::new(),
        }
    }

    /// Registers a restart attempt and reports whether the restart budget is
    /// exhausted.
    ///
    /// The attempt is registered unconditionally, including on the call that
    /// reports exhaustion.
    pub(crate) fn exceeded(&mut self) -> bool {
        let now = Instant::now();
        self.restarts.push_back(now);
        self.purge(now);
        self.restarts.len() >= self.max_restarts as usize
    }

    /// Returns the number of restarts still inside the window.
    pub(crate) fn current_count(&mut self) -> usize {
        self.purge(Instant::now());
        self.restarts.len()
    }

    /// Forgets every registered restart.
    pub(crate) fn reset(&mut self) {
        self.restarts.clear();
    }

    // Drops timestamps older than `now - restart_window`. When the clock has
    // not been running for a full window yet, nothing can be old enough.
    fn purge(&mut self, now: Instant) {
        if let Some(cutoff) = now.checked_sub(self.restart_window) {
            while matches!(self.restarts.front(), Some(then) if *then < cutoff) {
                self.restarts.pop_front();
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::RestartLedger;
    use tokio::time::{self, Duration};

    #[tokio::test]
    async fn test_budget_trips_on_rapid_restarts() {
        time::pause();
        let mut ledger = RestartLedger::new(2, Duration::from_secs(5));
        assert!(!ledger.exceeded());
        time::advance(Duration::from_millis(500)).await;
        assert!(ledger.exceeded());
    }

    #[tokio::test]
    async fn test_budget_never_trips_on_spaced_restarts() {
        time::pause();
        let mut ledger = RestartLedger::new(3, Duration::from_secs(8));
        for _ in 0..10 {
            assert!(!ledger.exceeded());
            time::advance(Duration::from_secs(5)).await;
        }
    }

    #[tokio::test]
    async fn test_budget_window_purges_stale_entries() {
        time::pause();
        let mut ledger = RestartLedger::new(2, Duration::from_secs(5));
        assert!(!ledger.exceeded());
        // the first entry falls out of the window, so the budget is intact.
        time::advance(Duration::from_secs(6)).await;
        assert!(!ledger.exceeded());
        assert_eq!(1, ledger.current_count());
    }

    #[tokio::test]
    async fn test_budget_with_zero_tolerance() {
        time::pause();
        let mut ledger = RestartLedger::new(0, Duration::from_secs(5));
        // no restarts are tolerated, the very first attempt trips the budget.
        assert!(ledger.exceeded());
    }

    #[tokio::test]
    async fn test_reset_forgets_the_window() {
        time::pause();
        let mut ledger = RestartLedger::new(2, Duration::from_secs(60));
        assert!(!ledger.exceeded());
        assert_eq!(1, ledger.current_count());
        ledger.reset();
        assert_eq!(0, ledger.current_count());
        assert!(!ledger.exceeded());
    }
}
