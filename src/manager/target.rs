//! Verify / repair / extract sequence for one target

use std::path::{Path, PathBuf};
use tokio::sync::mpsc;
use tracing::{debug, error, info, warn};

use super::ExtractionManager;
use crate::error::ExtractError;
use crate::extractor::{Archive, ArchiveOptions, Extractor, Progress, StageResult};
use crate::types::{Event, FileId, FileStatus, Package, Target};
use crate::utils::uniqify;

/// Result of extracting one target
pub(crate) struct TargetOutcome {
    /// Every physical file of the archive, known even when extraction failed
    pub(crate) chunks: Vec<PathBuf>,
    /// Files produced by the extraction
    pub(crate) result: std::result::Result<Vec<PathBuf>, ExtractError>,
}

impl ExtractionManager {
    /// Extract one target, containing every failure at the target boundary
    ///
    /// Marks the file active while it runs, forwards stage progress to the
    /// tracker and leaves the file finished or failed.
    pub(crate) async fn extract_one(
        &self,
        package: &Package,
        extractor: &dyn Extractor,
        target: &Target,
    ) -> TargetOutcome {
        let file_id = target.file_id;
        let (tx, mut rx) = mpsc::unbounded_channel::<u8>();

        let tracker = std::sync::Arc::clone(&self.tracker);
        let forwarder = tokio::spawn(async move {
            while let Some(percent) = rx.recv().await {
                tracker.set_progress(file_id, percent).await;
            }
        });

        self.tracker.add_active(file_id).await;

        let options = ArchiveOptions::from_config(&self.config);
        let mut archive = extractor.open(target, &options, Progress::new(tx));
        let chunks = archive.chunks();

        let result = self
            .run_stages(package, extractor, target, archive.as_mut())
            .await;

        // Dropping the archive closes the progress channel and ends the forwarder
        drop(archive);
        if let Err(e) = forwarder.await {
            debug!(file_id = file_id.0, error = %e, "progress forwarder ended abnormally");
        }

        self.tracker.set_progress(file_id, 100).await;
        self.tracker.finish_file(file_id).await;

        match &result {
            Ok(_) => {
                self.registry
                    .set_file_status(file_id, FileStatus::Finished)
                    .await;
            }
            Err(e) => {
                self.registry.set_file_status(file_id, FileStatus::Failed).await;
                error!(
                    package_id = package.id.0,
                    file_id = file_id.0,
                    archive = %target.name(),
                    error = %e,
                    "{}",
                    e.label()
                );
                debug!(archive = %target.name(), error = ?e, "extraction failure detail");
                self.emit_event(Event::ArchiveExtractFailed {
                    package_id: package.id,
                    file_id,
                    archive: target.path.clone(),
                    error: e.to_string(),
                });
            }
        }

        TargetOutcome { chunks, result }
    }

    /// Password candidates for a package, hint first
    async fn password_candidates(&self, package: &Package) -> Vec<String> {
        let mut candidates = vec![package.password.clone()];
        if self.config.usepasswordfile {
            candidates.extend(self.passwords.list(false).await);
        }
        uniqify(candidates)
    }

    async fn run_stages(
        &self,
        package: &Package,
        extractor: &dyn Extractor,
        target: &Target,
        archive: &mut dyn Archive,
    ) -> std::result::Result<Vec<PathBuf>, ExtractError> {
        let file_id = target.file_id;
        let archive_path = target.path.clone();

        self.registry
            .set_file_status(file_id, FileStatus::Processing)
            .await;

        let candidates = self.password_candidates(package).await;
        let repair = self.repair_enabled() && extractor.can_repair();

        let mut encrypted = false;
        let mut password: Option<String> = None;

        self.set_stage(file_id, "archive testing").await;
        for candidate in &candidates {
            match archive.verify(candidate).await {
                StageResult::Ok => {
                    password = Some(candidate.clone());
                    break;
                }
                StageResult::WrongPassword => {
                    if !encrypted {
                        info!(archive = %target.name(), "Password protected");
                        encrypted = true;
                    }
                    debug!(archive = %target.name(), "Password rejected, trying next candidate");
                }
                StageResult::Corrupt(reason) => {
                    debug!(archive = %target.name(), %reason, "verify reported damage");
                    info!(archive = %target.name(), "Archive damaged");
                    if !repair {
                        return Err(ExtractError::Crc {
                            archive: archive_path,
                            reason,
                        });
                    }

                    self.set_stage(file_id, "archive repairing").await;
                    let repaired = match archive.repair().await {
                        Ok(repaired) => repaired,
                        Err(e) => {
                            warn!(archive = %target.name(), error = %e, "repair failed");
                            false
                        }
                    };
                    self.tracker.set_progress(file_id, 100).await;

                    if !repaired && !self.config.keepbroken {
                        return Err(ExtractError::Crc {
                            archive: archive_path,
                            reason,
                        });
                    }
                    password = Some(candidate.clone());
                    break;
                }
                StageResult::Structural(reason) => {
                    return Err(ExtractError::Archive {
                        archive: archive_path,
                        reason,
                    });
                }
            }
        }

        let Some(password) = password else {
            return Err(if package.password.is_empty() {
                ExtractError::NoPasswordFound {
                    archive: archive_path,
                }
            } else {
                ExtractError::WrongPassword {
                    archive: archive_path,
                }
            });
        };

        self.set_stage(file_id, "archive extracting").await;

        let used = if !encrypted || !self.config.usepasswordfile {
            let result = archive.extract(&password).await;
            stage_to_result(result, &archive_path)?;
            password
        } else {
            let mut used = None;
            let attempts: Vec<String> = uniqify(std::iter::once(password).chain(candidates))
                .into_iter()
                .filter(|p| !p.is_empty())
                .collect();

            for candidate in attempts {
                match archive.extract(&candidate).await {
                    StageResult::Ok => {
                        if let Err(e) = self.passwords.add(&candidate).await {
                            warn!(error = %e, "password not persisted");
                        }
                        used = Some(candidate);
                        break;
                    }
                    StageResult::WrongPassword => {
                        debug!(archive = %target.name(), "Password rejected during extraction");
                    }
                    other => stage_to_result(other, &archive_path)?,
                }
            }

            used.ok_or_else(|| ExtractError::WrongPassword {
                archive: archive_path.clone(),
            })?
        };

        let mut files = archive.files().to_vec();
        if files.is_empty() {
            files = archive
                .list(&used)
                .await
                .map_err(|e| ExtractError::Archive {
                    archive: archive_path.clone(),
                    reason: e.to_string(),
                })?;
        }

        if self.config.delete {
            self.delete_chunks(&archive.chunks()).await;
        }

        info!(
            package_id = package.id.0,
            archive = %target.name(),
            extracted_count = files.len(),
            "Extracting finished"
        );
        Ok(files)
    }

    async fn set_stage(&self, file_id: FileId, status: &str) {
        self.registry.set_file_custom_status(file_id, status).await;
        self.tracker.set_progress(file_id, 0).await;
    }

    /// Remove every volume of an extracted archive, permanently or into the trash
    ///
    /// Failures leave the file in place and are only logged.
    async fn delete_chunks(&self, chunks: &[PathBuf]) {
        let mut deleted = 0usize;

        for chunk in chunks {
            if !chunk.exists() {
                continue;
            }
            if self.config.deltotrash {
                if move_to_trash(chunk).await {
                    deleted += 1;
                }
            } else {
                match tokio::fs::remove_file(chunk).await {
                    Ok(()) => deleted += 1,
                    Err(e) => warn!(path = ?chunk, error = %e, "Unable to delete archive file"),
                }
            }
        }

        info!(
            "Deleted {} files{}",
            deleted,
            if self.config.deltotrash { " to trash" } else { "" }
        );
    }
}

async fn move_to_trash(path: &Path) -> bool {
    let owned = path.to_path_buf();
    match tokio::task::spawn_blocking(move || trash::delete(&owned)).await {
        Ok(Ok(())) => true,
        Ok(Err(e)) => {
            warn!(path = ?path, error = %e, "Trash unavailable, archive file left in place");
            false
        }
        Err(e) => {
            warn!(path = ?path, error = %e, "trash task failed");
            false
        }
    }
}

fn stage_to_result(
    result: StageResult,
    archive: &Path,
) -> std::result::Result<(), ExtractError> {
    match result {
        StageResult::Ok => Ok(()),
        StageResult::WrongPassword => Err(ExtractError::WrongPassword {
            archive: archive.to_path_buf(),
        }),
        StageResult::Corrupt(reason) => Err(ExtractError::Crc {
            archive: archive.to_path_buf(),
            reason,
        }),
        StageResult::Structural(reason) => Err(ExtractError::Archive {
            archive: archive.to_path_buf(),
            reason,
        }),
    }
}
