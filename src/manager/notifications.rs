//! Host notifications and remote-callable operations

use std::sync::atomic::Ordering;
use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tracing::{debug, warn};

use super::ExtractionManager;
use crate::types::{Notification, PackageId};
use crate::Result;

impl ExtractionManager {
    /// Route a host notification to its handler
    ///
    /// Ignored while `activated` is off. Returns the handle of the drain task
    /// when the notification started one.
    pub async fn handle(&self, notification: Notification) -> Option<JoinHandle<()>> {
        if !self.config.activated {
            debug!(?notification, "extraction disabled, ignoring notification");
            return None;
        }

        match notification {
            Notification::PackageFinished { package_id } => self.package_finished(package_id).await,
            Notification::PackageDeleted { package_id } => {
                self.package_deleted(package_id).await;
                None
            }
            Notification::AllDownloadsProcessed => self.all_downloads_processed().await,
        }
    }

    /// Forward every notification from `rx` to [`handle`](Self::handle)
    ///
    /// The returned task ends when the sender side is dropped.
    pub fn listen(&self, mut rx: mpsc::Receiver<Notification>) -> JoinHandle<()> {
        let manager = self.clone();
        tokio::spawn(async move {
            while let Some(notification) = rx.recv().await {
                manager.handle(notification).await;
            }
            debug!("notification channel closed");
        })
    }

    async fn package_finished(&self, id: PackageId) -> Option<JoinHandle<()>> {
        if let Err(e) = self.queue.add(id).await {
            warn!(package_id = id.0, error = %e, "failed to queue package for extraction");
            return None;
        }
        if self.config.waitall {
            return None;
        }
        self.extract_queued().await
    }

    async fn package_deleted(&self, id: PackageId) {
        if let Err(e) = self.queue.remove(id).await {
            warn!(package_id = id.0, error = %e, "failed to remove deleted package from queue");
        }
    }

    async fn all_downloads_processed(&self) -> Option<JoinHandle<()>> {
        self.state.last_package.store(true, Ordering::Release);
        if !self.config.waitall {
            return None;
        }
        self.extract_queued().await
    }

    /// Queue packages for extraction and start a drain unless `waitall` is set
    ///
    /// Returns the handle of the drain task when one was started; `None` when a
    /// drain is already running (it picks the new packages up) or when
    /// extraction waits for all downloads.
    pub async fn extract_package(&self, ids: &[PackageId]) -> Result<Option<JoinHandle<()>>> {
        for id in ids {
            self.queue.add(*id).await?;
        }
        if self.config.waitall {
            return Ok(None);
        }
        Ok(self.extract_queued().await)
    }

    /// Known passwords, reloading the password file first when `reload` is set
    pub async fn get_passwords(&self, reload: bool) -> Vec<String> {
        self.passwords.list(reload).await
    }

    /// Add a password to the front of the password list and persist it
    pub async fn add_password(&self, password: &str) -> Result<()> {
        self.passwords.add(password).await
    }
}
