#![deny(missing_docs)]

//! The foreman crate offers a lightweight, composable supervisor API
//! inspired by Erlang's OTP which sits on top of the tokio future library.
//! The crate provides:
//!
//! * A `Runnable` contract that any long-running worker can satisfy with
//!   three capabilities: start, stop and an alive check
//!
//! * A `Supervisor` type that owns a set of workers, scans them periodically
//!   and restarts the terminated ones according to a per-worker restart type
//!   (permanent, temporary, transient) and a supervisor-wide strategy
//!   (one-for-one, one-for-all, rest-for-one)
//!
//! * A restart budget that stops the supervisor once too many restarts
//!   happen inside a sliding window of time
//!
//! * Hierarchical composition: a `Supervisor` is itself a `Runnable`, so
//!   supervisors can supervise supervisors

/// Provides the `Context` type which offers a contract to terminate
/// supervised futures in a way that is explicit, reliable and safe.
mod context;

/// Provides an API to notify and collect events of a running supervisor.
pub mod events;

/// Provides the internal `Execution` handle that tracks one run of a
/// worker's start routine.
mod execution;

/// Provides the capability contract a worker must expose to be supervised.
mod runnable;

/// Contains the types and logic to create, start, monitor and stop a
/// supervisor and its children.
pub mod supervisor;

/// Contains the per-child registration types: worker identifiers, restart
/// types and worker options.
pub mod worker;

pub use events::{Event, EventNotifier, WorkerData};
pub use execution::ExitReason;
pub use runnable::{ChildKind, Runnable, RunnableRef};
pub use supervisor::{ConfigError, Opt as SupervisorOpt, StartError, Strategy, Supervisor};
pub use worker::{Opt as WorkerOpt, Restart, WorkerId};

#[cfg(test)]
mod tests;
