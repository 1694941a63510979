//! Core types for extract-archive

use serde::{Deserialize, Serialize};
use std::path::PathBuf;

/// Unique identifier of a package in the host's download registry
#[derive(Clone, Copy, Debug, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct PackageId(pub i64);

impl PackageId {
    /// Create a new PackageId
    pub fn new(id: i64) -> Self {
        Self(id)
    }

    /// Get the inner i64 value
    pub fn get(&self) -> i64 {
        self.0
    }
}

impl From<i64> for PackageId {
    fn from(id: i64) -> Self {
        Self(id)
    }
}

impl std::fmt::Display for PackageId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Unique identifier of a file in the host's download registry
#[derive(Clone, Copy, Debug, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct FileId(pub i64);

impl From<i64> for FileId {
    fn from(id: i64) -> Self {
        Self(id)
    }
}

impl std::fmt::Display for FileId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Processing status of a downloaded file
///
/// Owned by the download engine; this crate only writes it while a file is
/// being extracted (queued -> processing -> finished/failed).
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum FileStatus {
    /// Waiting for extraction
    #[default]
    Queued,
    /// Being tested, repaired or extracted
    Processing,
    /// Extraction finished
    Finished,
    /// Extraction failed
    Failed,
}

/// A downloaded file belonging to a package
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct PackageFile {
    /// File ID
    pub id: FileId,
    /// File name, relative to the package download folder
    pub name: String,
    /// Current status
    #[serde(default)]
    pub status: FileStatus,
}

/// A logical group of downloaded files sharing a destination folder
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct Package {
    /// Package ID
    pub id: PackageId,
    /// Display name
    pub name: String,
    /// Folder below the download directory holding the package files
    pub folder: String,
    /// Password hint supplied with the package (empty when none)
    #[serde(default)]
    pub password: String,
    /// Destination chosen by the download engine
    #[serde(default)]
    pub destination: String,
    /// Files of the package
    #[serde(default)]
    pub files: Vec<PackageFile>,
}

/// One logical archive to extract: its entry-point file and output folder
///
/// Derived fresh on every scan pass, never persisted.
#[derive(Clone, Debug, PartialEq, Eq, Hash)]
pub struct Target {
    /// Registry file the target was derived from
    pub file_id: FileId,
    /// Absolute path of the entry-point file (first volume for multi-part sets)
    pub path: PathBuf,
    /// Folder the archive is extracted into
    pub destination: PathBuf,
}

impl Target {
    /// Create a new target
    pub fn new(file_id: FileId, path: impl Into<PathBuf>, destination: impl Into<PathBuf>) -> Self {
        Self {
            file_id,
            path: path.into(),
            destination: destination.into(),
        }
    }

    /// File name of the entry-point file, for log lines
    pub fn name(&self) -> String {
        self.path
            .file_name()
            .map(|n| n.to_string_lossy().into_owned())
            .unwrap_or_else(|| self.path.display().to_string())
    }
}

/// Lifecycle event emitted by the extraction manager
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum Event {
    /// A single archive was extracted
    ArchiveExtracted {
        /// Package the archive belongs to
        package_id: PackageId,
        /// File the archive target was derived from
        file_id: FileId,
        /// Entry-point file of the archive
        archive: PathBuf,
        /// Files produced by the extraction
        files: Vec<PathBuf>,
    },

    /// A single archive failed to extract
    ArchiveExtractFailed {
        /// Package the archive belongs to
        package_id: PackageId,
        /// File the archive target was derived from
        file_id: FileId,
        /// Entry-point file of the archive
        archive: PathBuf,
        /// Error message
        error: String,
    },

    /// Every archive of a package was extracted
    PackageExtracted {
        /// Package ID
        package_id: PackageId,
        /// Package name
        name: String,
    },

    /// At least one archive of a package failed
    PackageExtractFailed {
        /// Package ID
        package_id: PackageId,
        /// Package name
        name: String,
    },

    /// The final pass after all downloads finished without any failure
    AllArchivesExtracted,

    /// The final pass after all downloads finished
    AllArchivesProcessed,
}

impl Event {
    /// Event name as published on the host event bus
    pub fn name(&self) -> &'static str {
        match self {
            Event::ArchiveExtracted { .. } => "archive_extracted",
            Event::ArchiveExtractFailed { .. } => "archive_extract_failed",
            Event::PackageExtracted { .. } => "package_extracted",
            Event::PackageExtractFailed { .. } => "package_extract_failed",
            Event::AllArchivesExtracted => "all_archives_extracted",
            Event::AllArchivesProcessed => "all_archives_processed",
        }
    }
}

/// Notification consumed from the download engine
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum Notification {
    /// All files of a package finished downloading
    PackageFinished {
        /// Package ID
        package_id: PackageId,
    },
    /// A package was removed from the registry
    PackageDeleted {
        /// Package ID
        package_id: PackageId,
    },
    /// The download queue is empty and every download was processed
    AllDownloadsProcessed,
}

// unwrap/expect are acceptable in tests for concise failure-on-error assertions
#[allow(clippy::unwrap_used, clippy::expect_used)]
#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn event_serializes_with_snake_case_tag() {
        let event = Event::PackageExtracted {
            package_id: PackageId(7),
            name: "Movie".to_string(),
        };
        let json = serde_json::to_value(&event).unwrap();
        assert_eq!(json["type"], "package_extracted");
        assert_eq!(json["package_id"], 7);
        assert_eq!(event.name(), "package_extracted");
    }

    #[test]
    fn notification_round_trips_through_json() {
        let json = r#"{"type":"package_finished","package_id":3}"#;
        let n: Notification = serde_json::from_str(json).unwrap();
        assert_eq!(
            n,
            Notification::PackageFinished {
                package_id: PackageId(3)
            }
        );
    }

    #[test]
    fn target_name_is_file_name() {
        let t = Target::new(FileId(1), "/dl/pack/a.part1.rar", "/dl/pack");
        assert_eq!(t.name(), "a.part1.rar");
    }
}
