//! Background Tasks Module
//!
//! Contains background tasks that run periodically during agent operation.
//!
//! # Tasks
//! - Sweep: drops entries past their partition max-age (agent) or TTL (cache service)

mod sweep;

pub use sweep::{spawn_sweep_task, Sweep};
