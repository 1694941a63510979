//! Contracts of the host download engine the extraction pipeline depends on
//!
//! The pipeline never owns packages or files. It reads them from a
//! [`PackageRegistry`], writes file status while it works on them, and reports
//! per-file progress to a [`TaskTracker`]. [`MemoryRegistry`] implements both
//! contracts in memory for tests and simple embeddings.

use async_trait::async_trait;
use std::collections::HashMap;
use tokio::sync::RwLock;

use crate::types::{FileId, FileStatus, Package, PackageId};

/// Read access to packages, plus write access to file status during extraction
#[async_trait]
pub trait PackageRegistry: Send + Sync {
    /// Look up a package; `None` when it no longer exists
    async fn package(&self, id: PackageId) -> Option<Package>;

    /// Set the processing status of a file
    async fn set_file_status(&self, file_id: FileId, status: FileStatus);

    /// Set a free-form status line shown next to the file ("archive testing", ...)
    async fn set_file_custom_status(&self, file_id: FileId, status: &str);
}

/// Live progress reporting for files being processed
#[async_trait]
pub trait TaskTracker: Send + Sync {
    /// Mark a file as actively processed
    async fn add_active(&self, file_id: FileId);

    /// Report progress of the current stage in percent (0-100)
    async fn set_progress(&self, file_id: FileId, percent: u8);

    /// Mark a file as no longer processed
    async fn finish_file(&self, file_id: FileId);
}

#[derive(Debug, Default)]
struct FileState {
    status: FileStatus,
    custom_status: Option<String>,
    progress: u8,
    active: bool,
}

/// In-memory [`PackageRegistry`] and [`TaskTracker`]
#[derive(Debug, Default)]
pub struct MemoryRegistry {
    packages: RwLock<HashMap<PackageId, Package>>,
    files: RwLock<HashMap<FileId, FileState>>,
}

impl MemoryRegistry {
    /// Create an empty registry
    pub fn new() -> Self {
        Self::default()
    }

    /// Add or replace a package
    pub async fn insert_package(&self, package: Package) {
        let mut files = self.files.write().await;
        for file in &package.files {
            files.entry(file.id).or_default().status = file.status;
        }
        self.packages.write().await.insert(package.id, package);
    }

    /// Remove a package; returns it if it existed
    pub async fn remove_package(&self, id: PackageId) -> Option<Package> {
        self.packages.write().await.remove(&id)
    }

    /// Current status of a file
    pub async fn file_status(&self, file_id: FileId) -> Option<FileStatus> {
        self.files.read().await.get(&file_id).map(|f| f.status)
    }

    /// Last custom status written for a file
    pub async fn file_custom_status(&self, file_id: FileId) -> Option<String> {
        self.files
            .read()
            .await
            .get(&file_id)
            .and_then(|f| f.custom_status.clone())
    }

    /// Last progress reported for a file
    pub async fn file_progress(&self, file_id: FileId) -> Option<u8> {
        self.files.read().await.get(&file_id).map(|f| f.progress)
    }

    /// Whether a file is currently marked active
    pub async fn is_active(&self, file_id: FileId) -> bool {
        self.files
            .read()
            .await
            .get(&file_id)
            .is_some_and(|f| f.active)
    }
}

#[async_trait]
impl PackageRegistry for MemoryRegistry {
    async fn package(&self, id: PackageId) -> Option<Package> {
        let mut package = self.packages.read().await.get(&id).cloned()?;
        let files = self.files.read().await;
        for file in &mut package.files {
            if let Some(state) = files.get(&file.id) {
                file.status = state.status;
            }
        }
        Some(package)
    }

    async fn set_file_status(&self, file_id: FileId, status: FileStatus) {
        self.files.write().await.entry(file_id).or_default().status = status;
    }

    async fn set_file_custom_status(&self, file_id: FileId, status: &str) {
        self.files.write().await.entry(file_id).or_default().custom_status =
            Some(status.to_string());
    }
}

#[async_trait]
impl TaskTracker for MemoryRegistry {
    async fn add_active(&self, file_id: FileId) {
        self.files.write().await.entry(file_id).or_default().active = true;
    }

    async fn set_progress(&self, file_id: FileId, percent: u8) {
        self.files.write().await.entry(file_id).or_default().progress = percent.min(100);
    }

    async fn finish_file(&self, file_id: FileId) {
        self.files.write().await.entry(file_id).or_default().active = false;
    }
}
