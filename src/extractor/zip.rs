//! ZIP backend using the in-process zip crate

use async_trait::async_trait;
use std::io::Read;
use std::path::{Path, PathBuf};
use tokio::task::spawn_blocking;
use tracing::{debug, warn};

use super::traits::{Archive, ArchiveOptions, Extractor, Progress, StageResult};
use super::{lower_file_name, member_path};
use crate::types::Target;
use crate::{Error, Result};

/// ZIP backend
///
/// Always available. Repair is not supported.
#[derive(Debug, Default)]
pub struct ZipExtractor;

impl ZipExtractor {
    /// Create the backend
    pub fn new() -> Self {
        Self
    }
}

impl Extractor for ZipExtractor {
    fn name(&self) -> &'static str {
        "Zip"
    }

    fn can_repair(&self) -> bool {
        false
    }

    fn is_available(&self) -> bool {
        true
    }

    fn archive_type(&self, path: &Path) -> Option<&'static str> {
        lower_file_name(path)?.ends_with(".zip").then_some("zip")
    }

    fn get_targets(&self, candidates: &[Target]) -> Vec<Target> {
        candidates
            .iter()
            .filter(|t| self.archive_type(&t.path).is_some())
            .cloned()
            .collect()
    }

    fn open(
        &self,
        target: &Target,
        options: &ArchiveOptions,
        progress: Progress,
    ) -> Box<dyn Archive> {
        Box::new(ZipFileArchive {
            target: target.clone(),
            options: options.clone(),
            progress,
            files: Vec::new(),
        })
    }
}

/// What to do with each decoded entry
enum Mode<'a> {
    /// Decode into a sink to check checksums
    Test,
    /// Write entries below `destination`
    Extract {
        destination: &'a Path,
        options: &'a ArchiveOptions,
    },
}

/// Outcome of reading one entry's data
fn read_failure(e: &std::io::Error, encrypted: bool) -> StageResult {
    // ZipCrypto only checks one byte of the key, so a wrong password often
    // surfaces as a checksum mismatch on the decrypted data
    if encrypted {
        return StageResult::WrongPassword;
    }
    let message = e.to_string();
    if message.to_lowercase().contains("checksum") {
        StageResult::Corrupt(message)
    } else {
        StageResult::Structural(format!("failed to read ZIP entry: {}", message))
    }
}

fn open_failure(e: &zip::result::ZipError) -> StageResult {
    let message = e.to_string();
    let lower = message.to_lowercase();
    if lower.contains("password") || lower.contains("encrypted") {
        StageResult::WrongPassword
    } else {
        StageResult::Structural(format!("failed to read ZIP entry: {}", message))
    }
}

/// An opened ZIP archive
pub struct ZipFileArchive {
    target: Target,
    options: ArchiveOptions,
    progress: Progress,
    files: Vec<PathBuf>,
}

impl ZipFileArchive {
    fn walk_blocking(
        archive_path: &Path,
        password: &str,
        mode: Mode<'_>,
        progress: &Progress,
    ) -> std::result::Result<Vec<PathBuf>, StageResult> {
        let file = std::fs::File::open(archive_path).map_err(|e| {
            StageResult::Structural(format!("failed to open ZIP archive: {}", e))
        })?;
        let mut archive = zip::ZipArchive::new(file).map_err(|e| {
            StageResult::Structural(format!("failed to read ZIP archive: {}", e))
        })?;

        if let Mode::Extract { destination, .. } = &mode {
            std::fs::create_dir_all(destination).map_err(|e| {
                StageResult::Structural(format!("failed to create destination: {}", e))
            })?;
        }

        let total = archive.len().max(1);
        let mut written = Vec::new();

        for i in 0..archive.len() {
            progress.report((i * 100 / total) as u8);

            let encrypted = archive
                .by_index_raw(i)
                .map(|f| f.encrypted())
                .map_err(|e| open_failure(&e))?;

            if encrypted && password.is_empty() {
                return Err(StageResult::WrongPassword);
            }

            let mut entry = if encrypted {
                archive
                    .by_index_decrypt(i, password.as_bytes())
                    .map_err(|e| open_failure(&e))?
            } else {
                archive.by_index(i).map_err(|e| open_failure(&e))?
            };

            match &mode {
                Mode::Test => {
                    std::io::copy(&mut entry, &mut std::io::sink())
                        .map_err(|e| read_failure(&e, encrypted))?;
                }
                Mode::Extract {
                    destination,
                    options,
                } => {
                    if let Some(path) =
                        Self::extract_entry(&mut entry, destination, options, encrypted)?
                    {
                        written.push(path);
                    }
                }
            }
        }

        progress.report(100);
        Ok(written)
    }

    /// Write one entry, returning the file written (`None` for skipped entries and folders)
    fn extract_entry(
        entry: &mut zip::read::ZipFile<'_>,
        destination: &Path,
        options: &ArchiveOptions,
        encrypted: bool,
    ) -> std::result::Result<Option<PathBuf>, StageResult> {
        let name = entry.name().to_string();

        if options.is_excluded(&name) {
            debug!(entry = %name, "skipping excluded entry");
            return Ok(None);
        }

        let Some(file_path) = entry
            .enclosed_name()
            .and_then(|p| p.to_str().map(str::to_string))
            .and_then(|p| member_path(destination, &p, options.fullpath))
        else {
            warn!(entry = %name, "skipping entry with unsafe path");
            return Ok(None);
        };

        if entry.is_dir() {
            if options.fullpath {
                std::fs::create_dir_all(&file_path).map_err(|e| {
                    StageResult::Structural(format!("failed to create directory: {}", e))
                })?;
            }
            return Ok(None);
        }

        if file_path.exists() && !options.overwrite {
            debug!(path = ?file_path, "file exists, not overwriting");
            return Ok(None);
        }

        if let Some(parent) = file_path.parent() {
            std::fs::create_dir_all(parent).map_err(|e| {
                StageResult::Structural(format!("failed to create parent directories: {}", e))
            })?;
        }

        // Decode fully before touching the output so a wrong password leaves no file behind
        let mut data = Vec::new();
        entry
            .read_to_end(&mut data)
            .map_err(|e| read_failure(&e, encrypted))?;

        std::fs::write(&file_path, data).map_err(|e| {
            StageResult::Structural(format!("failed to write {}: {}", file_path.display(), e))
        })?;

        Ok(Some(file_path))
    }
}

#[async_trait]
impl Archive for ZipFileArchive {
    fn path(&self) -> &Path {
        &self.target.path
    }

    async fn verify(&mut self, password: &str) -> StageResult {
        let path = self.target.path.clone();
        let password = password.to_string();
        let progress = self.progress.clone();

        let result =
            spawn_blocking(move || Self::walk_blocking(&path, &password, Mode::Test, &progress))
                .await;

        match result {
            Ok(Ok(_)) => StageResult::Ok,
            Ok(Err(stage)) => stage,
            Err(e) => StageResult::Structural(format!("ZIP test task panicked: {}", e)),
        }
    }

    async fn repair(&mut self) -> Result<bool> {
        Err(Error::NotSupported("ZIP archives cannot be repaired".to_string()))
    }

    async fn extract(&mut self, password: &str) -> StageResult {
        let path = self.target.path.clone();
        let destination = self.target.destination.clone();
        let password = password.to_string();
        let options = self.options.clone();
        let progress = self.progress.clone();

        let result = spawn_blocking(move || {
            Self::walk_blocking(
                &path,
                &password,
                Mode::Extract {
                    destination: &destination,
                    options: &options,
                },
                &progress,
            )
        })
        .await;

        match result {
            Ok(Ok(files)) => {
                debug!(
                    archive = ?self.target.path,
                    extracted_count = files.len(),
                    "ZIP extraction successful"
                );
                self.files = files;
                StageResult::Ok
            }
            Ok(Err(stage)) => stage,
            Err(e) => StageResult::Structural(format!("ZIP extraction task panicked: {}", e)),
        }
    }

    fn files(&self) -> &[PathBuf] {
        &self.files
    }

    async fn list(&mut self, _password: &str) -> Result<Vec<PathBuf>> {
        let path = self.target.path.clone();
        let destination = self.target.destination.clone();
        let options = self.options.clone();

        spawn_blocking(move || -> Result<Vec<PathBuf>> {
            let file = std::fs::File::open(&path)?;
            let archive = zip::ZipArchive::new(file).map_err(|e| {
                Error::ExternalTool(format!("failed to read ZIP archive: {}", e))
            })?;

            Ok(archive
                .file_names()
                .filter(|name| !name.ends_with('/') && !options.is_excluded(name))
                .filter_map(|name| member_path(&destination, name, options.fullpath))
                .collect())
        })
        .await
        .map_err(|e| Error::Other(format!("ZIP listing task panicked: {}", e)))?
    }

    fn chunks(&self) -> Vec<PathBuf> {
        vec![self.target.path.clone()]
    }
}
