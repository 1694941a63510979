//! Traits and types shared by every archive backend

use async_trait::async_trait;
use std::path::{Path, PathBuf};
use tokio::sync::mpsc;

use crate::config::Config;
use crate::types::Target;

/// Outcome of a verify or extract stage
///
/// Each stage reports which branch of the password/repair sequence applies
/// instead of failing with an error the caller has to take apart.
#[must_use]
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum StageResult {
    /// The stage succeeded
    Ok,
    /// The archive is encrypted and the password was rejected
    WrongPassword,
    /// Checksum mismatch; the archive is damaged and may be repairable
    Corrupt(String),
    /// Any other failure (truncated headers, unsupported method, I/O, tool crash)
    Structural(String),
}

impl StageResult {
    /// Whether the stage succeeded
    pub fn is_ok(&self) -> bool {
        matches!(self, StageResult::Ok)
    }
}

/// Extraction settings handed to an archive when it is opened
#[derive(Debug, Clone, Default)]
pub struct ArchiveOptions {
    /// Keep the directory structure stored in the archive
    pub fullpath: bool,
    /// Replace files that already exist in the destination
    pub overwrite: bool,
    /// Glob patterns of members to skip
    pub excludefiles: Vec<String>,
    /// `nice` value for external tools (0 leaves the priority alone)
    pub priority: i32,
    /// Keep files extracted from a broken archive
    pub keepbroken: bool,
}

impl ArchiveOptions {
    /// Build the options from the pipeline configuration
    pub fn from_config(config: &Config) -> Self {
        Self {
            fullpath: config.fullpath,
            overwrite: config.overwrite,
            excludefiles: config.exclude_list(),
            priority: config.priority,
            keepbroken: config.keepbroken,
        }
    }

    /// Whether an archive member is excluded by `excludefiles`
    ///
    /// Patterns are matched against the full member name and its file name.
    pub fn is_excluded(&self, member: &str) -> bool {
        let file_name = Path::new(member)
            .file_name()
            .and_then(|n| n.to_str())
            .unwrap_or(member);

        self.excludefiles.iter().any(|pattern| {
            glob::Pattern::new(pattern)
                .map(|p| p.matches(member) || p.matches(file_name))
                .unwrap_or(false)
        })
    }
}

/// Sink for stage progress in percent
///
/// Cloning is cheap. A progress without a receiver discards every report.
#[derive(Debug, Clone, Default)]
pub struct Progress {
    tx: Option<mpsc::UnboundedSender<u8>>,
}

impl Progress {
    /// Progress reporting into `tx`
    pub fn new(tx: mpsc::UnboundedSender<u8>) -> Self {
        Self { tx: Some(tx) }
    }

    /// Progress that goes nowhere
    pub fn none() -> Self {
        Self::default()
    }

    /// Report `percent` (clamped to 100)
    pub fn report(&self, percent: u8) {
        if let Some(tx) = &self.tx {
            let _ = tx.send(percent.min(100));
        }
    }
}

/// One archive format backend
///
/// Backends are registered once and probed with [`is_available`](Self::is_available);
/// unavailable backends are skipped by the pipeline. All methods except
/// [`open`](Self::open) are pure classification over file names.
pub trait Extractor: Send + Sync {
    /// Human-readable name for logging
    fn name(&self) -> &'static str;

    /// Whether the backend can repair damaged archives
    fn can_repair(&self) -> bool;

    /// Whether the backend can run on this system
    ///
    /// Probing happens at most once per backend instance.
    fn is_available(&self) -> bool;

    /// Format tag of `path` if this backend handles it
    ///
    /// Tags are compared against the configured extension allow-list.
    fn archive_type(&self, path: &Path) -> Option<&'static str>;

    /// Entry points among `candidates` handled by this backend
    ///
    /// Multi-volume sets are represented by their first volume only.
    /// `candidates` must be sorted by path.
    fn get_targets(&self, candidates: &[Target]) -> Vec<Target>;

    /// Open `target` for verification and extraction
    fn open(
        &self,
        target: &Target,
        options: &ArchiveOptions,
        progress: Progress,
    ) -> Box<dyn Archive>;
}

/// An opened extraction target
#[async_trait]
pub trait Archive: Send {
    /// Entry-point file of the archive
    fn path(&self) -> &Path;

    /// Test the archive with `password` (empty for none)
    async fn verify(&mut self, password: &str) -> StageResult;

    /// Repair a damaged archive in place
    ///
    /// Returns whether the repair succeeded.
    async fn repair(&mut self) -> crate::Result<bool>;

    /// Extract the archive with `password` (empty for none)
    async fn extract(&mut self, password: &str) -> StageResult;

    /// Files written by the last successful [`extract`](Self::extract)
    fn files(&self) -> &[PathBuf];

    /// Output paths the archive would extract to
    async fn list(&mut self, password: &str) -> crate::Result<Vec<PathBuf>>;

    /// Every physical file belonging to this archive, entry point included
    fn chunks(&self) -> Vec<PathBuf>;
}
