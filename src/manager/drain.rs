//! Single-flight queue draining and the per-package discovery pass

use std::collections::HashSet;
use std::path::{Path, PathBuf};
use std::sync::atomic::Ordering;
use tokio::task::JoinHandle;
use tracing::{debug, error, info, warn};

use super::ExtractionManager;
use crate::extractor::Extractor;
use crate::types::{Event, Package, PackageId, Target};
use crate::utils::{is_empty_dir, remove_empty_dir, safe_name, set_permissions, uniqify};
use std::sync::Arc;

/// Result of one package pass
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum PackageOutcome {
    /// Every matched target was extracted
    Extracted,
    /// At least one matched target failed
    Failed,
    /// No file of the package was an archive
    NothingToExtract,
}

impl ExtractionManager {
    /// Start a drain task unless one is already running
    ///
    /// Returns `None` when a drain is in flight (it will observe any newly
    /// queued package) or when no backend is active.
    pub async fn extract_queued(&self) -> Option<JoinHandle<()>> {
        if !self.is_active().await {
            debug!("no active extraction backend, not draining");
            return None;
        }

        if self
            .state
            .draining
            .compare_exchange(false, true, Ordering::AcqRel, Ordering::Acquire)
            .is_err()
        {
            debug!("extraction already running, queued packages will be picked up");
            return None;
        }

        let manager = self.clone();
        self.state.drain_tasks.send_modify(|running| *running += 1);
        Some(tokio::spawn(async move {
            manager.drain().await;
            manager
                .state
                .drain_tasks
                .send_modify(|running| *running = running.saturating_sub(1));
        }))
    }

    /// Process the queue until it is observed empty
    ///
    /// Must only run while holding the `draining` flag.
    async fn drain(&self) {
        // Last batch handed to `extract`, kept across re-arms so a queue that
        // cannot be shrunk (failing store writes) ends the task
        let mut previous: Option<Vec<PackageId>> = None;

        loop {
            loop {
                let packages = match self.queue.get().await {
                    Ok(p) => p,
                    Err(e) => {
                        error!(error = %e, "failed to read extraction queue");
                        break;
                    }
                };
                if packages.is_empty() {
                    break;
                }
                if previous.as_ref() == Some(&packages) {
                    warn!(?packages, "extraction queue did not shrink, stopping drain");
                    break;
                }

                if self.state.last_package.swap(false, Ordering::AcqRel) {
                    if self.extract(&packages).await {
                        self.emit_event(Event::AllArchivesExtracted);
                    }
                    self.emit_event(Event::AllArchivesProcessed);
                } else {
                    self.extract(&packages).await;
                }

                previous = Some(packages);
            }

            self.state.draining.store(false, Ordering::Release);

            // A package queued after the last read but before the flag was
            // cleared saw the drain as running and did not start one
            let pending = match self.queue.get().await {
                Ok(p) if !p.is_empty() => p,
                _ => break,
            };
            if previous.as_ref() == Some(&pending) {
                break;
            }
            if self
                .state
                .draining
                .compare_exchange(false, true, Ordering::AcqRel, Ordering::Acquire)
                .is_err()
            {
                break;
            }
        }
    }

    /// Extract the given packages now
    ///
    /// Stale IDs are dropped from the queue. Every processed package is removed
    /// from the queue whatever the outcome; failed ones are added to the failed
    /// set and extracted ones leave it. Returns `true` only if no package failed.
    pub async fn extract(&self, ids: &[PackageId]) -> bool {
        if ids.is_empty() {
            return false;
        }

        let extensions = self.config.extension_list();
        if !extensions.is_empty() {
            debug!("Use for extensions: .{}", extensions.join("|."));
        }

        // Pick up passwords edited by hand since the last pass
        self.passwords.list(true).await;

        let extractors = self.extractors().await;
        let mut failed = Vec::new();

        for &id in ids {
            let Some(package) = self.registry.package(id).await else {
                debug!(package_id = id.0, "discarding stale package id");
                self.dequeue(id).await;
                continue;
            };

            info!(package_id = id.0, "Check package: {}", package.name);

            match self.extract_package_files(&package, &extractors, &extensions).await {
                PackageOutcome::Extracted => {
                    self.emit_event(Event::PackageExtracted {
                        package_id: id,
                        name: package.name.clone(),
                    });
                    if let Err(e) = self.failed.remove(id).await {
                        warn!(package_id = id.0, error = %e, "failed to clear failed package");
                    }
                }
                PackageOutcome::Failed => {
                    failed.push(id);
                    self.emit_event(Event::PackageExtractFailed {
                        package_id: id,
                        name: package.name.clone(),
                    });
                    if let Err(e) = self.failed.add(id).await {
                        warn!(package_id = id.0, error = %e, "failed to record failed package");
                    }
                }
                PackageOutcome::NothingToExtract => {
                    info!(package_id = id.0, "No files found to extract");
                }
            }

            self.dequeue(id).await;
        }

        failed.is_empty()
    }

    async fn dequeue(&self, id: PackageId) {
        if let Err(e) = self.queue.remove(id).await {
            warn!(package_id = id.0, error = %e, "failed to remove package from queue");
        }
    }

    /// Output folder of a package
    ///
    /// `<download_dir>/<folder>/<destination>`, plus a per-package subfolder
    /// when `subfolder` is set. An absolute `destination` replaces the package
    /// download folder.
    pub(crate) fn extract_folder(&self, package: &Package) -> (PathBuf, PathBuf) {
        let pack_dl_folder = self.config.download_dir.join(&package.folder);
        let mut extract_folder = pack_dl_folder.join(&self.config.destination);

        if self.config.subfolder {
            let name = if package.folder.is_empty() {
                safe_name(&package.name.replace("http://", ""))
            } else {
                package.folder.clone()
            };
            extract_folder = extract_folder.join(name);
        }

        (pack_dl_folder, extract_folder)
    }

    /// One pass over a package: discover targets, extract, recurse into output
    async fn extract_package_files(
        &self,
        package: &Package,
        extractors: &[Arc<dyn Extractor>],
        extensions: &[String],
    ) -> PackageOutcome {
        let (pack_dl_folder, extract_folder) = self.extract_folder(package);

        if let Err(e) = tokio::fs::create_dir_all(&extract_folder).await {
            error!(
                package_id = package.id.0,
                folder = ?extract_folder,
                error = %e,
                "failed to create extraction folder"
            );
            return PackageOutcome::Failed;
        }
        if self.config.subfolder {
            set_permissions(&extract_folder, &self.config.permissions);
        }

        // One candidate per file name; a later entry replaces an earlier one in place
        let mut candidates: Vec<Target> = Vec::new();
        for file in &package.files {
            let target = Target::new(file.id, pack_dl_folder.join(&file.name), &extract_folder);
            match candidates.iter_mut().find(|t| t.path == target.path) {
                Some(existing) => *existing = target,
                None => candidates.push(target),
            }
        }

        let mut matched = false;
        let mut success = true;
        let mut seen: HashSet<PathBuf> = HashSet::new();

        while !candidates.is_empty() {
            let mut new_candidates: Vec<Target> = Vec::new();

            if !extensions.is_empty() {
                candidates.retain(|t| {
                    extractors.iter().any(|e| {
                        e.archive_type(&t.path)
                            .is_some_and(|tag| extensions.iter().any(|ext| ext == tag))
                    })
                });
            }

            // First volumes sort before their siblings, so multi-part sets are entered at part one
            candidates.sort_by(|a, b| a.path.cmp(&b.path));

            for extractor in extractors {
                let targets = extractor.get_targets(&candidates);
                if targets.is_empty() {
                    continue;
                }
                debug!(
                    extractor = extractor.name(),
                    targets = ?targets.iter().map(|t| t.name()).collect::<Vec<_>>(),
                    "Targets for {}",
                    extractor.name()
                );
                matched = true;

                for target in targets {
                    if !seen.insert(target.path.clone()) {
                        continue;
                    }
                    if !target.path.exists() {
                        debug!(archive = %target.name(), "File not found");
                        continue;
                    }

                    info!(
                        package_id = package.id.0,
                        archive = %target.name(),
                        "Extract to: {}",
                        target.destination.display()
                    );

                    let outcome = self.extract_one(package, extractor.as_ref(), &target).await;

                    // Sibling volumes are never offered again, whatever the outcome
                    candidates.retain(|c| !outcome.chunks.contains(&c.path));

                    let new_files = match outcome.result {
                        Ok(files) => files,
                        Err(e) => {
                            error!(
                                package_id = package.id.0,
                                archive = %target.name(),
                                error = %e,
                                "Extract failed"
                            );
                            success = false;
                            continue;
                        }
                    };

                    debug!(archive = %target.name(), files = ?new_files, "Extracted files");
                    self.normalize_permissions(&new_files);

                    for file in &new_files {
                        if !file.exists() {
                            debug!(path = ?file, "New file does not exist");
                            continue;
                        }
                        if self.config.recursive && file.is_file() {
                            let folder = file.parent().unwrap_or(target.destination.as_path());
                            new_candidates.push(Target::new(target.file_id, file, folder));
                        }
                    }

                    self.emit_event(Event::ArchiveExtracted {
                        package_id: package.id,
                        file_id: target.file_id,
                        archive: target.path.clone(),
                        files: new_files,
                    });
                }
            }

            candidates = new_candidates;
        }

        let outcome = match (matched, success) {
            (false, _) => PackageOutcome::NothingToExtract,
            (true, true) => {
                self.cleanup_pack_folder(&pack_dl_folder, &extract_folder);
                PackageOutcome::Extracted
            }
            (true, false) => PackageOutcome::Failed,
        };

        if !matched || (!success && self.config.subfolder) {
            remove_empty_dir(&extract_folder);
        }

        outcome
    }

    /// Apply configured permissions to new files and the folders holding them
    fn normalize_permissions(&self, files: &[PathBuf]) {
        let folders = uniqify(files.iter().filter_map(|f| f.parent()));
        for folder in folders {
            set_permissions(folder, &self.config.permissions);
        }
        for file in files {
            set_permissions(file, &self.config.permissions);
        }
    }

    /// Remove an emptied package download folder after a successful pass
    ///
    /// Only considered when archives are deleted and the host keeps one folder
    /// per package. The folder is removed only if the extraction folder does
    /// not lie inside it.
    fn cleanup_pack_folder(&self, pack_dl_folder: &Path, extract_folder: &Path) {
        if !(self.config.delete && self.config.folder_per_package) {
            return;
        }
        if extract_folder.starts_with(pack_dl_folder) {
            return;
        }

        if !pack_dl_folder.exists() {
            return;
        }
        if !is_empty_dir(pack_dl_folder) {
            warn!(folder = ?pack_dl_folder, "Not deleting pack folder, folder not empty");
            return;
        }

        match std::fs::remove_dir(pack_dl_folder) {
            Ok(()) => debug!(folder = ?pack_dl_folder, "Successfully deleted pack folder"),
            Err(e) => warn!(folder = ?pack_dl_folder, error = %e, "Unable to delete pack folder"),
        }
    }
}
