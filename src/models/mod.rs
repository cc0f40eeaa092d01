//! Domain model module declarations.

pub mod priority;
pub mod work_item;
pub mod worker_config;
pub mod worker_state;
