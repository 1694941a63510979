//! Extraction orchestrator split into focused submodules.
//!
//! The `ExtractionManager` struct and its methods are organized by stage:
//! - [`notifications`] - Host notifications and remote-callable entry points
//! - [`drain`] - Single-flight queue draining and the per-package pass
//! - [`target`] - Verify / repair / extract sequence for one target

mod drain;
mod notifications;
mod target;

// unwrap/expect are acceptable in tests for concise failure-on-error assertions
#[allow(clippy::unwrap_used, clippy::expect_used)]
#[cfg(test)]
pub(crate) mod test_helpers;
#[allow(clippy::unwrap_used, clippy::expect_used)]
#[cfg(test)]
mod tests;

use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use tokio::sync::{RwLock, broadcast, watch};
use tracing::{debug, info, warn};

use crate::config::Config;
use crate::db::KeyValueStore;
use crate::extractor::{Extractor, default_extractors};
use crate::host::{PackageRegistry, TaskTracker};
use crate::passwords::PasswordStore;
use crate::queue::{ArchiveQueue, FAILED_KEY, QUEUE_KEY};
use crate::types::Event;

/// Runtime state shared by every clone of the manager
pub(crate) struct ManagerState {
    /// Backends found available at activation, in priority order
    pub(crate) extractors: RwLock<Vec<Arc<dyn Extractor>>>,
    /// Whether damaged archives are repaired (config and backend support)
    pub(crate) repair: AtomicBool,
    /// Set while a drain task is running
    pub(crate) draining: AtomicBool,
    /// Set by the all-downloads-processed notification, consumed by the next drain batch
    pub(crate) last_package: AtomicBool,
    /// Number of spawned drain tasks that have not returned yet
    pub(crate) drain_tasks: watch::Sender<usize>,
}

impl Default for ManagerState {
    fn default() -> Self {
        let (drain_tasks, _rx) = watch::channel(0);
        Self {
            extractors: RwLock::new(Vec::new()),
            repair: AtomicBool::new(false),
            draining: AtomicBool::new(false),
            last_package: AtomicBool::new(false),
            drain_tasks,
        }
    }
}

/// Extraction pipeline instance (cloneable - all fields are Arc-wrapped)
#[derive(Clone)]
pub struct ExtractionManager {
    /// Configuration (wrapped in Arc for sharing across tasks)
    pub(crate) config: Arc<Config>,
    /// Host package registry
    pub(crate) registry: Arc<dyn PackageRegistry>,
    /// Host progress tracker
    pub(crate) tracker: Arc<dyn TaskTracker>,
    /// Packages waiting for extraction
    pub(crate) queue: ArchiveQueue,
    /// Packages whose last extraction attempt failed
    pub(crate) failed: ArchiveQueue,
    /// Known archive passwords
    pub(crate) passwords: Arc<PasswordStore>,
    /// Event broadcast channel sender (multiple subscribers supported)
    pub(crate) event_tx: broadcast::Sender<Event>,
    /// Every registered backend, available or not
    pub(crate) known_extractors: Arc<Vec<Arc<dyn Extractor>>>,
    pub(crate) state: Arc<ManagerState>,
}

impl ExtractionManager {
    /// Create a manager with the built-in backends (RAR, 7-Zip, ZIP, TAR)
    ///
    /// Nothing runs until [`activate`](Self::activate) is called.
    pub fn new(
        config: Config,
        store: Arc<dyn KeyValueStore>,
        registry: Arc<dyn PackageRegistry>,
        tracker: Arc<dyn TaskTracker>,
    ) -> Self {
        let extractors = default_extractors(&config);
        Self::with_extractors(config, store, registry, tracker, extractors)
    }

    /// Create a manager with an explicit backend list, highest priority first
    pub fn with_extractors(
        config: Config,
        store: Arc<dyn KeyValueStore>,
        registry: Arc<dyn PackageRegistry>,
        tracker: Arc<dyn TaskTracker>,
        extractors: Vec<Arc<dyn Extractor>>,
    ) -> Self {
        let (event_tx, _rx) = broadcast::channel(1000);
        let passwords = Arc::new(PasswordStore::new(config.passwordfile.clone()));

        Self {
            queue: ArchiveQueue::new(Arc::clone(&store), QUEUE_KEY),
            failed: ArchiveQueue::new(store, FAILED_KEY),
            config: Arc::new(config),
            registry,
            tracker,
            passwords,
            event_tx,
            known_extractors: Arc::new(extractors),
            state: Arc::new(ManagerState::default()),
        }
    }

    /// Probe the backends and resume packages left in the queue
    ///
    /// Does nothing while `activated` is off. Backends whose tool is missing are
    /// skipped; with no backend at all the manager stays inert. Returns the
    /// handle of the resumption drain when one was started.
    pub async fn activate(&self) -> Option<tokio::task::JoinHandle<()>> {
        if !self.config.activated {
            debug!("extraction disabled, not activating");
            return None;
        }

        let mut available = Vec::new();
        for extractor in self.known_extractors.iter() {
            if extractor.is_available() {
                available.push(Arc::clone(extractor));
            } else {
                debug!(extractor = extractor.name(), "extraction backend not available");
            }
        }

        if available.is_empty() {
            info!("No extraction backend available, extraction stays inactive");
            return None;
        }

        let repair = self.config.repair && available.iter().any(|e| e.can_repair());
        self.state.repair.store(repair, Ordering::Release);

        let names: Vec<&str> = available.iter().map(|e| e.name()).collect();
        info!(extractors = ?names, repair, "Activated extraction backends: {}", names.join(", "));

        *self.state.extractors.write().await = available;

        if let Err(e) = self.passwords.load().await {
            warn!(error = %e, "continuing with an empty password list");
        }

        self.extract_queued().await
    }

    /// Whether activation found at least one backend
    pub async fn is_active(&self) -> bool {
        !self.state.extractors.read().await.is_empty()
    }

    /// Whether a drain task is currently running
    pub fn is_draining(&self) -> bool {
        self.state.draining.load(Ordering::Acquire)
    }

    /// Wait until every spawned drain task has returned
    ///
    /// Returns immediately when no drain is running. Packages queued while
    /// waiting are picked up by the running drain and delay the return.
    pub async fn wait_for_drain(&self) {
        let mut rx = self.state.drain_tasks.subscribe();
        // The sender lives in the shared state, so the channel cannot close here
        let _ = rx.wait_for(|running| *running == 0).await;
    }

    /// Subscribe to extraction events
    ///
    /// Returns a receiver that will receive all events emitted after subscription.
    /// Multiple subscribers are supported, and each receives all events independently.
    pub fn subscribe(&self) -> broadcast::Receiver<Event> {
        self.event_tx.subscribe()
    }

    /// Get the current configuration
    pub fn get_config(&self) -> Arc<Config> {
        Arc::clone(&self.config)
    }

    /// Queue of packages waiting for extraction
    pub fn queue(&self) -> &ArchiveQueue {
        &self.queue
    }

    /// Set of packages whose last extraction attempt failed
    pub fn failed(&self) -> &ArchiveQueue {
        &self.failed
    }

    /// Emit an event to all subscribers
    ///
    /// If there are no active subscribers, the event is silently dropped.
    pub(crate) fn emit_event(&self, event: Event) {
        // send() returns Err if there are no receivers, which is fine
        self.event_tx.send(event).ok();
    }

    pub(crate) async fn extractors(&self) -> Vec<Arc<dyn Extractor>> {
        self.state.extractors.read().await.clone()
    }

    pub(crate) fn repair_enabled(&self) -> bool {
        self.state.repair.load(Ordering::Acquire)
    }
}
