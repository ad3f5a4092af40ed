use std::str::FromStr;

use lazy_static::lazy_static;
use thiserror::Error;
use tokio::time::Duration;

use crate::events::EventNotifier;
use crate::runnable::RunnableRef;

lazy_static! {
    /// Default pause between two monitor passes.
    static ref DEFAULT_MONITOR_INTERVAL: Duration = Duration::from_secs(1);
    /// Default width of the sliding restart-budget window.
    static ref DEFAULT_RESTART_WINDOW: Duration = Duration::from_secs(60);
}

/// Default number of restarts tolerated within the restart window.
const DEFAULT_MAX_RESTARTS: u32 = 5;

/// Supervisor-wide policy governing which siblings are affected when one
/// child terminates.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Strategy {
    /// Restart only the terminated child.
    OneForOne,
    /// Restart every child of the supervisor.
    OneForAll,
    /// Restart the terminated child and every child added after it.
    RestForOne,
}

impl Default for Strategy {
    fn default() -> Self {
        Strategy::OneForOne
    }
}

impl FromStr for Strategy {
    type Err = ConfigError;

    fn from_str(input: &str) -> Result<Self, Self::Err> {
        match input {
            "one_for_one" => Ok(Strategy::OneForOne),
            "one_for_all" => Ok(Strategy::OneForAll),
            "rest_for_one" => Ok(Strategy::RestForOne),
            other => Err(ConfigError::UnknownStrategy(other.to_owned())),
        }
    }
}

/// Error reported when validating the configuration of a `Supervisor`.
#[derive(Debug, Error)]
pub enum ConfigError {
    /// The monitor interval must be a positive duration.
    #[error("monitor interval must be greater than zero")]
    InvalidMonitorInterval,
    /// The given identifier does not name a restart strategy.
    #[error("unknown restart strategy: {0}")]
    UnknownStrategy(String),
    /// The given identifier does not name a restart type.
    #[error("unknown restart type: {0}")]
    UnknownRestart(String),
}

/// Gathers the settings of a `Supervisor` while its `Opt` values are folded
/// in; validated once, right before the supervisor is allocated.
pub(crate) struct Settings {
    pub(crate) strategy: Strategy,
    pub(crate) monitor_interval: Duration,
    pub(crate) max_restarts: u32,
    pub(crate) restart_window: Duration,
    pub(crate) initial_worker: Option<RunnableRef>,
    pub(crate) ev_notifier: EventNotifier,
}

impl Settings {
    pub(crate) fn new() -> Self {
        Self {
            strategy: Strategy::default(),
            monitor_interval: *DEFAULT_MONITOR_INTERVAL,
            max_restarts: DEFAULT_MAX_RESTARTS,
            restart_window: *DEFAULT_RESTART_WINDOW,
            initial_worker: None,
            ev_notifier: EventNotifier::noop(),
        }
    }

    pub(crate) fn validate(&self) -> Result<(), ConfigError> {
        if self.monitor_interval.is_zero() {
            return Err(ConfigError::InvalidMonitorInterval);
        }
        Ok(())
    }
}

/// Represents a configuration option that can be set on a `Supervisor`.
pub struct Opt(Box<dyn FnMut(&mut Settings) + Send + Sync + 'static>);

impl Opt {
    pub(crate) fn new<F>(opt_fn: F) -> Self
    where
        F: FnMut(&mut Settings) + Send + Sync + 'static,
    {
        Self(Box::new(opt_fn))
    }

    pub(crate) fn call(&mut self, settings: &mut Settings) {
        self.0(settings)
    }
}

/// Changes the restart strategy applied when a child terminates.
///
/// If this configuration option is not specified, the supervisor uses
/// [`Strategy::OneForOne`].
pub fn with_strategy(strategy: Strategy) -> Opt {
    Opt::new(move |settings| settings.strategy = strategy)
}

/// Changes the pause between two monitor passes. Must be greater than zero.
pub fn with_monitor_interval(interval: Duration) -> Opt {
    Opt::new(move |settings| settings.monitor_interval = interval)
}

/// Changes how many restarts are tolerated within the restart window before
/// the supervisor gives up and stops.
pub fn with_max_restarts(max_restarts: u32) -> Opt {
    Opt::new(move |settings| settings.max_restarts = max_restarts)
}

/// Changes the width of the sliding restart-budget window.
pub fn with_restart_window(window: Duration) -> Opt {
    Opt::new(move |settings| settings.restart_window = window)
}

/// Preloads a single worker entry with default worker options.
pub fn with_initial_worker(worker: RunnableRef) -> Opt {
    Opt::new(move |settings| settings.initial_worker = Some(worker.clone()))
}

/// Routes supervision events to the given notifier.
pub fn with_event_notifier(notifier: EventNotifier) -> Opt {
    Opt::new(move |settings| settings.ev_notifier = notifier.clone())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_settings_defaults() {
        let settings = Settings::new();
        assert_eq!(Strategy::OneForOne, settings.strategy);
        assert_eq!(Duration::from_secs(1), settings.monitor_interval);
        assert_eq!(5, settings.max_restarts);
        assert_eq!(Duration::from_secs(60), settings.restart_window);
        assert!(settings.initial_worker.is_none());
    }

    #[test]
    fn test_settings_reject_zero_monitor_interval() {
        let mut settings = Settings::new();
        let mut opt = with_monitor_interval(Duration::from_secs(0));
        opt.call(&mut settings);
        assert!(matches!(
            settings.validate(),
            Err(ConfigError::InvalidMonitorInterval)
        ));
    }

    #[test]
    fn test_strategy_from_str() {
        assert!(matches!("one_for_one".parse(), Ok(Strategy::OneForOne)));
        assert!(matches!("one_for_all".parse(), Ok(Strategy::OneForAll)));
        assert!(matches!("rest_for_one".parse(), Ok(Strategy::RestForOne)));

        let result: Result<Strategy, ConfigError> = "two_for_one".parse();
        match result {
            Err(ConfigError::UnknownStrategy(name)) => assert_eq!("two_for_one", name),
            other => panic!("expected unknown strategy error; got {:?}", other),
        }
    }
}
