//! Worker process spawning and output plumbing.
//!
//! A [`WorkerProcess`] wraps one OS process: its stdout and stderr are
//! pumped line by line into a [`LineSink`], and its exit is published to any
//! number of waiters. It carries no restart logic; that belongs to
//! [`crate::orchestrator::worker`].

pub mod output;
pub mod priority;
pub mod spawner;

pub use output::{LineSink, LogStream, OutputStream};
pub use spawner::{KillOutcome, ProcessCommand, ProcessExit, WorkerProcess};
