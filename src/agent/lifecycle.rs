//! Lifecycle Manager
//!
//! `Installing -> Installed -> Activating -> Active`. Install creates the
//! current generation's partitions and precaches the manifest; activate drops
//! every partition from other generations and takes control at once.

use std::fmt;
use std::sync::atomic::Ordering;

use serde::Serialize;
use tracing::{debug, info, warn};

use super::CacheAgent;
use crate::cache::CacheEntry;
use crate::error::{AgentError, Result};
use crate::policy::ResourceClass;

// == Lifecycle State ==
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum LifecycleState {
    Installing,
    Installed,
    Activating,
    Active,
}

impl fmt::Display for LifecycleState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            LifecycleState::Installing => "installing",
            LifecycleState::Installed => "installed",
            LifecycleState::Activating => "activating",
            LifecycleState::Active => "active",
        };
        f.write_str(name)
    }
}

/// Outcome of [`CacheAgent::install`].
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct InstallReport {
    /// Manifest paths now in the static partition
    pub precached: Vec<String>,
    /// Manifest paths that could not be fetched
    pub failed: Vec<String>,
}

/// Outcome of [`CacheAgent::activate`].
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ActivationReport {
    /// Partitions deleted because their generation tag was not current
    pub removed_partitions: Vec<String>,
}

/// Generation tag of a partition name (`api-v1.2.0` -> `v1.2.0`).
pub(crate) fn generation_of(partition: &str) -> Option<&str> {
    partition.split_once('-').map(|(_, tag)| tag)
}

impl CacheAgent {
    pub fn state(&self) -> LifecycleState {
        *self.state.borrow()
    }

    pub fn is_active(&self) -> bool {
        self.state() == LifecycleState::Active
    }

    /// Resolves once the agent is active.
    pub async fn wait_until_active(&self) {
        let mut rx = self.state.subscribe();
        // The sender lives in `self`, so the channel cannot close here
        let _ = rx.wait_for(|state| *state == LifecycleState::Active).await;
    }

    fn set_state(&self, state: LifecycleState) {
        let previous = self.state.send_replace(state);
        debug!(from = %previous, to = %state, version = %self.version, "Lifecycle transition");
    }

    // == Install ==
    /// Creates this generation's partitions and precaches the manifest.
    ///
    /// A manifest entry that fails to fetch is logged and skipped. When
    /// skip-waiting is set (by config or control message) activation follows
    /// immediately.
    pub async fn install(&self) -> Result<InstallReport> {
        if self.state() != LifecycleState::Installing {
            return Err(AgentError::InvalidRequest(format!(
                "cannot install in state {}",
                self.state()
            )));
        }
        info!(version = %self.version, "Installing cache agent");

        for class in ResourceClass::ALL {
            let limits = self.limits_for(class);
            self.store.create_partition(
                &self.partition_name(class),
                limits.max_entries,
                limits.max_age,
            );
        }

        let report = self.precache().await;
        info!(
            precached = report.precached.len(),
            failed = report.failed.len(),
            "Precache finished"
        );

        self.set_state(LifecycleState::Installed);
        if self.skip_waiting.load(Ordering::SeqCst) {
            self.activate()?;
        }
        Ok(report)
    }

    async fn precache(&self) -> InstallReport {
        let partition = self.partition_name(ResourceClass::Static);
        let mut report = InstallReport::default();

        for path in &self.precache_urls {
            let request = match self.request_for(path) {
                Ok(request) => request,
                Err(e) => {
                    warn!(path = %path, error = %e, "Skipping precache entry");
                    report.failed.push(path.clone());
                    continue;
                }
            };

            match self
                .fetcher
                .fetch(&request, self.fetcher.default_timeout())
                .await
            {
                Ok(response) => {
                    let key = request.cache_key();
                    let ttl = self.ttl_policy.resolve(&key);
                    let entry =
                        CacheEntry::new(key, response, self.clock.now_ms(), ttl, &partition);
                    self.store.put(&partition, entry);
                    report.precached.push(path.clone());
                }
                Err(e) => {
                    warn!(path = %path, error = %e, "Failed to precache, continuing install");
                    report.failed.push(path.clone());
                }
            }
        }
        report
    }

    // == Activate ==
    /// Deletes partitions of other generations and takes control.
    pub fn activate(&self) -> Result<ActivationReport> {
        match self.state() {
            LifecycleState::Installed => {}
            LifecycleState::Active => return Ok(ActivationReport::default()),
            other => {
                return Err(AgentError::InvalidRequest(format!(
                    "cannot activate in state {}",
                    other
                )))
            }
        }
        self.set_state(LifecycleState::Activating);

        let mut report = ActivationReport::default();
        for name in self.store.partition_names() {
            if generation_of(&name) != Some(self.version.as_str()) {
                self.store.delete_partition(&name);
                info!(partition = %name, "Deleted partition from old cache generation");
                report.removed_partitions.push(name);
            }
        }

        self.set_state(LifecycleState::Active);
        info!(version = %self.version, "Cache agent active and controlling requests");
        Ok(report)
    }

    // == Skip Waiting ==
    /// Forces activation: immediately if installed, otherwise right after
    /// install completes.
    pub fn skip_waiting(&self) {
        self.skip_waiting.store(true, Ordering::SeqCst);
        if self.state() == LifecycleState::Installed {
            if let Err(e) = self.activate() {
                warn!(error = %e, "Skip-waiting activation failed");
            }
        }
    }
}
