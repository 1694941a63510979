//! # extract-archive
//!
//! Queue-driven archive extraction pipeline for download managers.
//!
//! ## Design Philosophy
//!
//! extract-archive is designed to be:
//! - **Embedded** - The host download engine owns packages and files; the pipeline
//!   only reads them and reports back through small traits
//! - **Sensible defaults** - Every option has the stock behavior of the classic
//!   extraction addon
//! - **Library-first** - No CLI or UI, purely a Rust crate for embedding
//! - **Event-driven** - Consumers subscribe to events, no polling required
//!
//! ## Quick Start
//!
//! ```no_run
//! use std::sync::Arc;
//! use extract_archive::{Config, Database, ExtractionManager, MemoryRegistry, Notification, PackageId};
//!
//! #[tokio::main]
//! async fn main() -> Result<(), Box<dyn std::error::Error>> {
//!     let config = Config {
//!         activated: true,
//!         download_dir: "/srv/downloads".into(),
//!         ..Default::default()
//!     };
//!
//!     let store = Arc::new(Database::new(std::path::Path::new("extract.db")).await?);
//!     let registry = Arc::new(MemoryRegistry::new());
//!     let manager = ExtractionManager::new(config, store, registry.clone(), registry);
//!
//!     // Subscribe to events
//!     let mut events = manager.subscribe();
//!     tokio::spawn(async move {
//!         while let Ok(event) = events.recv().await {
//!             println!("Event: {:?}", event);
//!         }
//!     });
//!
//!     // Probe backends and resume packages left over from the last run
//!     manager.activate().await;
//!
//!     manager
//!         .handle(Notification::PackageFinished { package_id: PackageId(1) })
//!         .await;
//!
//!     Ok(())
//! }
//! ```

#![warn(missing_docs)]
#![warn(clippy::all)]
#![warn(clippy::unwrap_used)]
#![warn(clippy::expect_used)]

/// Configuration types
pub mod config;
/// Key-value persistence layer
pub mod db;
/// Error types
pub mod error;
/// Archive format backends
pub mod extractor;
/// Host collaborator contracts
pub mod host;
/// Extraction orchestrator (decomposed into focused submodules)
pub mod manager;
/// Known archive passwords
pub mod passwords;
/// Persistent package queues
pub mod queue;
/// Core types and events
pub mod types;
/// Utility functions
pub mod utils;

// Re-export commonly used types
pub use config::{Config, PermissionsConfig, ToolsConfig};
pub use db::{Database, KeyValueStore, MemoryStore};
pub use error::{DatabaseError, Error, ExtractError, Result};
pub use extractor::{
    Archive, ArchiveOptions, Extractor, Progress, RarExtractor, SevenZipExtractor, StageResult,
    TarExtractor, ZipExtractor,
};
pub use host::{MemoryRegistry, PackageRegistry, TaskTracker};
pub use manager::ExtractionManager;
pub use passwords::PasswordStore;
pub use queue::ArchiveQueue;
pub use types::{Event, FileId, FileStatus, Notification, Package, PackageFile, PackageId, Target};

/// Run the pipeline on a host notification channel until a termination signal arrives.
///
/// Activates the manager, forwards every notification from `notifications`, and on
/// SIGTERM/SIGINT (Ctrl+C elsewhere) waits for a running drain to return before
/// returning itself.
///
/// # Example
///
/// ```no_run
/// use std::sync::Arc;
/// use extract_archive::{Config, ExtractionManager, MemoryRegistry, MemoryStore, run_with_shutdown};
///
/// #[tokio::main]
/// async fn main() -> Result<(), Box<dyn std::error::Error>> {
///     let registry = Arc::new(MemoryRegistry::new());
///     let manager = ExtractionManager::new(
///         Config::default(),
///         Arc::new(MemoryStore::new()),
///         registry.clone(),
///         registry,
///     );
///     let (_tx, rx) = tokio::sync::mpsc::channel(64);
///
///     run_with_shutdown(manager, rx).await?;
///
///     Ok(())
/// }
/// ```
pub async fn run_with_shutdown(
    manager: ExtractionManager,
    notifications: tokio::sync::mpsc::Receiver<Notification>,
) -> Result<()> {
    run_until(manager, notifications, wait_for_signal()).await
}

/// Run the pipeline on a host notification channel until `shutdown` completes.
///
/// Same as [`run_with_shutdown`] with a caller-provided shutdown future instead of
/// process signals. Notifications received after `shutdown` resolves are not
/// handled; a drain already running finishes before this returns.
pub async fn run_until<F>(
    manager: ExtractionManager,
    notifications: tokio::sync::mpsc::Receiver<Notification>,
    shutdown: F,
) -> Result<()>
where
    F: std::future::Future<Output = ()>,
{
    manager.activate().await;
    let listener = manager.listen(notifications);

    shutdown.await;
    listener.abort();

    manager.wait_for_drain().await;
    tracing::info!("extraction pipeline stopped");
    Ok(())
}

#[cfg(unix)]
async fn wait_for_signal() {
    use tokio::signal::unix::{SignalKind, signal};

    // Signal registration may fail in restricted environments (containers, tests)
    let sigterm_result = signal(SignalKind::terminate());
    let sigint_result = signal(SignalKind::interrupt());

    match (sigterm_result, sigint_result) {
        (Ok(mut sigterm), Ok(mut sigint)) => {
            tokio::select! {
                _ = sigterm.recv() => {
                    tracing::info!("Received SIGTERM signal");
                }
                _ = sigint.recv() => {
                    tracing::info!("Received SIGINT signal (Ctrl+C)");
                }
            }
        }
        (Err(e), _) | (_, Err(e)) => {
            tracing::warn!(error = %e, "Could not register signal handlers, using ctrl_c fallback");
            tokio::signal::ctrl_c().await.ok();
        }
    }
}

#[cfg(not(unix))]
async fn wait_for_signal() {
    if let Err(e) = tokio::signal::ctrl_c().await {
        tracing::error!(error = %e, "Failed to listen for Ctrl+C signal");
    }
}
