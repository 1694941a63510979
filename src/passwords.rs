//! File-backed list of known archive passwords.

use std::path::{Path, PathBuf};

use tokio::sync::Mutex;
use tracing::{debug, warn};

use crate::Result;

/// Ordered, duplicate-free list of archive passwords persisted one per line
///
/// The most recently successful password sits at the front. The file is the
/// source of truth: [`load`](Self::load) replaces the in-memory list with its
/// contents, and [`add`](Self::add) rewrites it in full.
#[derive(Debug)]
pub struct PasswordStore {
    path: PathBuf,
    passwords: Mutex<Vec<String>>,
}

impl PasswordStore {
    /// Create a store for the given password file without reading it
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self {
            path: path.into(),
            passwords: Mutex::new(Vec::new()),
        }
    }

    /// Path of the password file
    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Reload the password file, replacing the in-memory list
    ///
    /// A missing file is created empty. Any other I/O error is logged and
    /// returned; the in-memory list is left untouched in that case.
    pub async fn load(&self) -> Result<()> {
        let mut passwords = self.passwords.lock().await;

        match tokio::fs::read_to_string(&self.path).await {
            Ok(content) => {
                let mut loaded: Vec<String> = Vec::new();
                for line in content.lines().filter(|l| !l.is_empty()) {
                    if !loaded.iter().any(|p| p == line) {
                        loaded.push(line.to_string());
                    }
                }
                debug!(
                    path = ?self.path,
                    count = loaded.len(),
                    "loaded {} password(s)",
                    loaded.len()
                );
                *passwords = loaded;
                Ok(())
            }
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
                debug!(path = ?self.path, "password file missing, creating it");
                if let Err(e) = tokio::fs::write(&self.path, b"").await {
                    warn!(path = ?self.path, error = %e, "failed to create password file");
                    return Err(e.into());
                }
                passwords.clear();
                Ok(())
            }
            Err(e) => {
                warn!(path = ?self.path, error = %e, "failed to read password file");
                Err(e.into())
            }
        }
    }

    /// Current passwords, optionally reloading the file first
    ///
    /// A failed reload is logged by [`load`](Self::load) and the previous
    /// in-memory list is returned.
    pub async fn list(&self, reload: bool) -> Vec<String> {
        if reload {
            let _ = self.load().await;
        }
        self.passwords.lock().await.clone()
    }

    /// Put `password` at the front of the list and rewrite the file
    ///
    /// Matching is exact and case-sensitive. If the file cannot be written the
    /// password is still kept in memory and the error is logged and returned.
    pub async fn add(&self, password: &str) -> Result<()> {
        let mut passwords = self.passwords.lock().await;

        passwords.retain(|p| p != password);
        passwords.insert(0, password.to_string());

        let mut content = String::new();
        for pw in passwords.iter() {
            content.push_str(pw);
            content.push('\n');
        }

        if let Err(e) = tokio::fs::write(&self.path, content).await {
            warn!(
                path = ?self.path,
                error = %e,
                "failed to write password file, password kept in memory only"
            );
            return Err(e.into());
        }

        debug!(path = ?self.path, count = passwords.len(), "saved password list");
        Ok(())
    }
}

// unwrap/expect are acceptable in tests for concise failure-on-error assertions
#[allow(clippy::unwrap_used, clippy::expect_used)]
#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    #[tokio::test]
    async fn load_creates_missing_file() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("passwords.txt");
        let store = PasswordStore::new(&path);

        store.load().await.unwrap();

        assert!(path.exists());
        assert!(store.list(false).await.is_empty());
    }

    #[tokio::test]
    async fn load_reads_one_password_per_line() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("passwords.txt");
        std::fs::write(&path, "first\r\nsecond\n\nthird\nfirst\n").unwrap();

        let store = PasswordStore::new(&path);
        store.load().await.unwrap();

        assert_eq!(store.list(false).await, vec!["first", "second", "third"]);
    }

    #[tokio::test]
    async fn add_moves_password_to_front_once() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("passwords.txt");
        std::fs::write(&path, "a\nb\nc\n").unwrap();

        let store = PasswordStore::new(&path);
        store.load().await.unwrap();
        store.add("c").await.unwrap();

        let list = store.list(false).await;
        assert_eq!(list, vec!["c", "a", "b"]);
        assert_eq!(list.iter().filter(|p| *p == "c").count(), 1);

        // The file was rewritten in the same order
        assert_eq!(std::fs::read_to_string(&path).unwrap(), "c\na\nb\n");
    }

    #[tokio::test]
    async fn add_is_case_sensitive() {
        let dir = TempDir::new().unwrap();
        let store = PasswordStore::new(dir.path().join("passwords.txt"));

        store.add("Secret").await.unwrap();
        store.add("secret").await.unwrap();

        assert_eq!(store.list(false).await, vec!["secret", "Secret"]);
    }

    #[tokio::test]
    async fn list_with_reload_picks_up_external_edits() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("passwords.txt");
        let store = PasswordStore::new(&path);
        store.add("old").await.unwrap();

        std::fs::write(&path, "new\nold\n").unwrap();

        assert_eq!(store.list(false).await, vec!["old"]);
        assert_eq!(store.list(true).await, vec!["new", "old"]);
    }

    #[tokio::test]
    async fn failed_write_keeps_password_in_memory() {
        let dir = TempDir::new().unwrap();
        // Parent directory does not exist, so the write fails
        let store = PasswordStore::new(dir.path().join("missing").join("passwords.txt"));

        assert!(store.add("kept").await.is_err());
        assert_eq!(store.list(false).await, vec!["kept"]);
    }

    #[tokio::test]
    async fn failed_read_leaves_list_unchanged() {
        let dir = TempDir::new().unwrap();
        // A directory cannot be read as a file
        let store = PasswordStore::new(dir.path());

        assert!(store.add("kept").await.is_err());
        assert!(store.load().await.is_err());
        assert_eq!(store.list(true).await, vec!["kept"]);
    }
}
