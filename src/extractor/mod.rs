//! Archive format backends
//!
//! Each backend implements [`Extractor`] (classification and grouping of
//! candidate files) and hands out [`Archive`] handles that run the
//! verify / repair / extract stages. [`default_extractors`] returns the closed
//! set of backends in priority order: RAR, 7-Zip, ZIP, TAR.

use std::path::{Component, Path, PathBuf};
use std::sync::Arc;

use crate::config::Config;

mod cli;
mod rar;
mod sevenz;
mod tar;
mod traits;
mod zip;

pub use rar::RarExtractor;
pub use sevenz::SevenZipExtractor;
pub use tar::TarExtractor;
pub use traits::{Archive, ArchiveOptions, Extractor, Progress, StageResult};
pub use zip::ZipExtractor;

/// All known backends, highest priority first
pub fn default_extractors(config: &Config) -> Vec<Arc<dyn Extractor>> {
    vec![
        Arc::new(RarExtractor::new(&config.tools)),
        Arc::new(SevenZipExtractor::new()),
        Arc::new(ZipExtractor::new()),
        Arc::new(TarExtractor::new(&config.tools)),
    ]
}

/// Lower-cased file name of `path`
pub(crate) fn lower_file_name(path: &Path) -> Option<String> {
    path.file_name()
        .and_then(|n| n.to_str())
        .map(str::to_lowercase)
}

/// Output path of an archive member, or `None` for unsafe names
///
/// Absolute names and `..` components are rejected. Without `fullpath` only the
/// member's file name is kept.
pub(crate) fn member_path(destination: &Path, member: &str, fullpath: bool) -> Option<PathBuf> {
    let member = member.replace('\\', "/");
    let relative = Path::new(&member);

    let mut clean = PathBuf::new();
    for component in relative.components() {
        match component {
            Component::Normal(part) => clean.push(part),
            Component::CurDir => {}
            Component::ParentDir | Component::RootDir | Component::Prefix(_) => return None,
        }
    }

    if clean.as_os_str().is_empty() {
        return None;
    }

    if fullpath {
        Some(destination.join(clean))
    } else {
        clean.file_name().map(|name| destination.join(name))
    }
}

// unwrap/expect are acceptable in tests for concise failure-on-error assertions
#[allow(clippy::unwrap_used, clippy::expect_used)]
#[cfg(test)]
mod tests;
