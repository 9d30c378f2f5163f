//! Periodic Sweep Task
//!
//! Background task that periodically removes stale entries from anything that
//! implements [`Sweep`].

use std::sync::Arc;
use std::time::Duration;

use tokio::task::JoinHandle;
use tracing::{debug, info};

/// A cache that can drop its stale entries in one synchronous pass.
pub trait Sweep: Send + Sync {
    /// Label used in log lines.
    fn name(&self) -> &'static str;

    /// Removes stale entries and returns how many were dropped.
    fn sweep(&self) -> usize;
}

/// Spawns a background task that sweeps `target` every `interval_secs`.
///
/// The first sweep runs one full interval after spawning. The returned
/// handle is aborted during graceful shutdown.
///
/// # Example
/// ```ignore
/// let handle = spawn_sweep_task(agent.clone(), 600);
/// // Later, during shutdown:
/// handle.abort();
/// ```
pub fn spawn_sweep_task(target: Arc<dyn Sweep>, interval_secs: u64) -> JoinHandle<()> {
    let interval = Duration::from_secs(interval_secs.max(1));

    tokio::spawn(async move {
        info!(
            "Starting {} sweep task with interval of {} seconds",
            target.name(),
            interval.as_secs()
        );

        loop {
            tokio::time::sleep(interval).await;

            let removed = target.sweep();
            if removed > 0 {
                info!("{} sweep: removed {} stale entries", target.name(), removed);
            } else {
                debug!("{} sweep: nothing to remove", target.name());
            }
        }
    })
}
