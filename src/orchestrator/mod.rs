//! Worker supervision.
//!
//! Covers the per-worker lifecycle state machine, its restart timer, and the
//! supervisor that starts every worker and stops them inside one deadline.

pub mod restart_timer;
pub mod supervisor;
pub mod worker;
