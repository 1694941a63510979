//! Utility functions for file operations and path manipulation

use crate::config::PermissionsConfig;
use std::path::Path;
use tracing::{debug, warn};

/// Remove duplicates while keeping the first occurrence of each item
///
/// # Examples
///
/// ```
/// use extract_archive::utils::uniqify;
///
/// let items = uniqify(vec!["b", "a", "b", "c", "a"]);
/// assert_eq!(items, vec!["b", "a", "c"]);
/// ```
pub fn uniqify<T, I>(items: I) -> Vec<T>
where
    T: PartialEq,
    I: IntoIterator<Item = T>,
{
    let mut out: Vec<T> = Vec::new();
    for item in items {
        if !out.contains(&item) {
            out.push(item);
        }
    }
    out
}

/// Make a string usable as a single path component
///
/// Path separators, characters rejected by common filesystems and control
/// characters are replaced with `_`; surrounding whitespace and trailing dots are
/// trimmed.
///
/// # Examples
///
/// ```
/// use extract_archive::utils::safe_name;
///
/// assert_eq!(safe_name("Show: S01/E02?"), "Show_ S01_E02_");
/// assert_eq!(safe_name("  name. "), "name");
/// ```
#[must_use]
pub fn safe_name(name: &str) -> String {
    let replaced: String = name
        .chars()
        .map(|c| match c {
            '/' | '\\' | ':' | '*' | '?' | '"' | '<' | '>' | '|' => '_',
            c if c.is_control() => '_',
            c => c,
        })
        .collect();

    replaced.trim().trim_end_matches('.').trim_end().to_string()
}

/// Apply the configured file or folder mode to `path`
///
/// Does nothing unless `permissions.chmod` is set. Failures are logged and
/// otherwise ignored; a wrong mode never fails an extraction.
pub fn set_permissions(path: &Path, permissions: &PermissionsConfig) {
    if !permissions.chmod {
        return;
    }

    #[cfg(unix)]
    {
        use std::os::unix::fs::PermissionsExt;

        let metadata = match std::fs::symlink_metadata(path) {
            Ok(m) => m,
            Err(e) => {
                debug!(?path, error = %e, "cannot stat path for chmod");
                return;
            }
        };

        // Symlinks would change their target's mode
        if metadata.file_type().is_symlink() {
            return;
        }

        let mode = if metadata.is_dir() {
            permissions.folder_mode
        } else {
            permissions.file_mode
        };

        if let Err(e) = std::fs::set_permissions(path, std::fs::Permissions::from_mode(mode)) {
            warn!(?path, mode = format!("{:o}", mode), error = %e, "failed to set permissions");
        }
    }

    #[cfg(not(unix))]
    {
        debug!(?path, "permission normalization is only supported on unix");
    }
}

/// Remove `dir` if it is empty
///
/// Returns whether the directory was removed. A non-empty or missing directory
/// is an expected outcome and not reported as an error.
pub fn remove_empty_dir(dir: &Path) -> bool {
    match std::fs::remove_dir(dir) {
        Ok(()) => {
            debug!(?dir, "removed empty folder");
            true
        }
        Err(e) => {
            debug!(?dir, error = %e, "folder not removed");
            false
        }
    }
}

/// Whether `dir` exists and contains no entries
pub fn is_empty_dir(dir: &Path) -> bool {
    std::fs::read_dir(dir)
        .map(|mut entries| entries.next().is_none())
        .unwrap_or(false)
}
