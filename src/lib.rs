#![forbid(unsafe_code)]

//! `proc-warden`: Supervises long-running worker processes.
//!
//! Each work item gets a [`Worker`](orchestrator::worker::Worker) that spawns
//! its process, restarts it after a crash, and stops it on request. The
//! [`Supervisor`](orchestrator::supervisor::Supervisor) owns every worker and
//! stops them all inside one shared deadline.

pub mod config;
pub mod discovery;
pub mod errors;
pub mod events;
pub mod ipc;
pub mod models;
pub mod orchestrator;
pub mod process;

pub use config::HostConfig;
pub use errors::{AppError, Result};
