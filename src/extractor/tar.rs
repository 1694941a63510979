//! TAR family backend driving the external `tar` binary

use async_trait::async_trait;
use std::ffi::OsString;
use std::path::{Path, PathBuf};
use std::sync::OnceLock;
use tracing::debug;

use super::cli::{classify, find_tool, run_tool, ToolOutput};
use super::traits::{Archive, ArchiveOptions, Extractor, Progress, StageResult};
use super::{lower_file_name, member_path};
use crate::config::ToolsConfig;
use crate::error::ExtractError;
use crate::types::Target;
use crate::{Error, Result};

/// File name suffixes handled by `tar`, longest first, with their format tag
///
/// Bare compressor suffixes (`.gz`, `.xz`, ...) are only claimed after a
/// `.tar` component. A lone `dump.sql.gz` is a compressed file, not a tarball,
/// and `tar` would "extract" it to nothing.
const SUFFIXES: &[(&str, &str)] = &[
    (".tar.bzip2", "bzip2"),
    (".tar.gzip", "gzip"),
    (".tar.lzma", "lzma"),
    (".tar.bz2", "bz2"),
    (".tar.gz", "gz"),
    (".tar.xz", "xz"),
    (".tar.z", "z"),
    (".tbz2", "tbz2"),
    (".tar", "tar"),
    (".taz", "taz"),
    (".tbz", "tbz"),
    (".tgz", "tgz"),
];

/// TAR backend (plain and compressed tarballs)
///
/// Compression is detected by `tar` itself. Tarballs carry no encryption, so
/// the password is ignored, and repair is not supported.
pub struct TarExtractor {
    explicit_path: Option<PathBuf>,
    search_path: bool,
    binary: OnceLock<Option<PathBuf>>,
}

impl TarExtractor {
    /// Create the backend; the binary is located on first use
    pub fn new(tools: &ToolsConfig) -> Self {
        Self {
            explicit_path: tools.tar_path.clone(),
            search_path: tools.search_path,
            binary: OnceLock::new(),
        }
    }

    fn binary(&self) -> Option<&Path> {
        self.binary
            .get_or_init(|| {
                find_tool(self.explicit_path.as_deref(), self.search_path, &["tar"])
            })
            .as_deref()
    }
}

impl Extractor for TarExtractor {
    fn name(&self) -> &'static str {
        "Tar"
    }

    fn can_repair(&self) -> bool {
        false
    }

    fn is_available(&self) -> bool {
        self.binary().is_some()
    }

    fn archive_type(&self, path: &Path) -> Option<&'static str> {
        let name = lower_file_name(path)?;
        SUFFIXES
            .iter()
            .find(|(suffix, _)| name.ends_with(suffix) && name.len() > suffix.len())
            .map(|(_, tag)| *tag)
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
        Box::new(TarArchive {
            binary: self.binary().map(Path::to_path_buf),
            target: target.clone(),
            options: options.clone(),
            progress,
            files: Vec::new(),
        })
    }
}

/// An opened tarball
pub struct TarArchive {
    binary: Option<PathBuf>,
    target: Target,
    options: ArchiveOptions,
    progress: Progress,
    files: Vec<PathBuf>,
}

impl TarArchive {
    async fn run(&self, args: Vec<OsString>) -> Result<ToolOutput> {
        let binary = self.binary.as_deref().ok_or_else(|| {
            Error::Extract(ExtractError::ToolUnavailable {
                tool: "tar".to_string(),
            })
        })?;
        run_tool(binary, &args, None, self.options.priority, &self.progress).await
    }

    fn list_args(&self) -> Vec<OsString> {
        vec![
            OsString::from("-t"),
            OsString::from("-f"),
            self.target.path.clone().into_os_string(),
        ]
    }
}

#[async_trait]
impl Archive for TarArchive {
    fn path(&self) -> &Path {
        &self.target.path
    }

    async fn verify(&mut self, _password: &str) -> StageResult {
        // Listing decompresses the whole stream and catches truncation
        match self.run(self.list_args()).await {
            Ok(output) => classify(&output),
            Err(e) => StageResult::Structural(e.to_string()),
        }
    }

    async fn repair(&mut self) -> Result<bool> {
        Err(Error::NotSupported("tar archives cannot be repaired".to_string()))
    }

    async fn extract(&mut self, password: &str) -> StageResult {
        if let Err(e) = tokio::fs::create_dir_all(&self.target.destination).await {
            return StageResult::Structural(format!("failed to create destination: {}", e));
        }

        let mut args = vec![
            OsString::from("-x"),
            OsString::from("-f"),
            self.target.path.clone().into_os_string(),
            OsString::from("-C"),
            self.target.destination.clone().into_os_string(),
        ];
        if !self.options.overwrite {
            args.push(OsString::from("--skip-old-files"));
        }
        if !self.options.fullpath {
            args.push(OsString::from("--transform=s,.*/,,"));
        }
        for pattern in &self.options.excludefiles {
            args.push(OsString::from(format!("--exclude={}", pattern)));
        }

        self.progress.report(0);
        let result = match self.run(args).await {
            Ok(output) => classify(&output),
            Err(e) => StageResult::Structural(e.to_string()),
        };
        self.progress.report(100);

        if result.is_ok() {
            self.files = self.list(password).await.unwrap_or_default();
            debug!(
                archive = ?self.target.path,
                extracted_count = self.files.len(),
                "tar extraction successful"
            );
        }
        result
    }

    fn files(&self) -> &[PathBuf] {
        &self.files
    }

    async fn list(&mut self, _password: &str) -> Result<Vec<PathBuf>> {
        let output = self.run(self.list_args()).await?;
        if !output.success {
            return Err(Error::ExternalTool(format!(
                "tar listing failed: {}",
                output.message()
            )));
        }

        Ok(output
            .stdout
            .lines()
            .map(str::trim)
            .filter(|line| !line.is_empty() && !line.ends_with('/'))
            .filter(|line| !self.options.is_excluded(line))
            .filter_map(|line| {
                member_path(&self.target.destination, line, self.options.fullpath)
            })
            .collect())
    }

    fn chunks(&self) -> Vec<PathBuf> {
        vec![self.target.path.clone()]
    }
}

// unwrap/expect are acceptable in tests for concise failure-on-error assertions
#[allow(clippy::unwrap_used, clippy::expect_used)]
#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::FileId;

    #[test]
    fn archive_type_recognizes_compressed_tarballs() {
        let extractor = TarExtractor::new(&ToolsConfig::default());
        assert_eq!(extractor.archive_type(Path::new("/d/a.tar")), Some("tar"));
        assert_eq!(extractor.archive_type(Path::new("/d/a.tar.gz")), Some("gz"));
        assert_eq!(extractor.archive_type(Path::new("/d/a.TGZ")), Some("tgz"));
        assert_eq!(extractor.archive_type(Path::new("/d/a.tar.bz2")), Some("bz2"));
        assert_eq!(extractor.archive_type(Path::new("/d/a.zip")), None);
        assert_eq!(extractor.archive_type(Path::new("/d/.gz")), None);
        assert_eq!(extractor.archive_type(Path::new("/d/.tar")), None);
    }

    #[test]
    fn bare_compressed_files_are_not_tarballs() {
        let extractor = TarExtractor::new(&ToolsConfig::default());
        for name in ["dump.sql.gz", "log.bz2", "image.xz", "data.lzma", "old.z", "x.gzip"] {
            assert_eq!(extractor.archive_type(Path::new(name)), None, "{}", name);
        }

        let candidates = vec![
            Target::new(FileId(1), "/d/dump.sql.gz", "/d"),
            Target::new(FileId(2), "/d/site.tar.gz", "/d"),
        ];
        let targets = extractor.get_targets(&candidates);
        assert_eq!(targets.len(), 1);
        assert_eq!(targets[0].path, PathBuf::from("/d/site.tar.gz"));
    }

    #[tokio::test]
    #[ignore] // Requires gzip binary in PATH
    async fn real_gzip_file_is_left_alone() {
        let Ok(gzip) = which::which("gzip") else {
            println!("Skipping test: gzip binary not found in PATH");
            return;
        };

        let dir = tempfile::tempdir().unwrap();
        let plain = dir.path().join("dump.sql");
        std::fs::write(&plain, b"select 1;").unwrap();
        let status = std::process::Command::new(gzip).arg(&plain).status().unwrap();
        assert!(status.success());

        let compressed = dir.path().join("dump.sql.gz");
        assert!(compressed.exists());

        let extractor = TarExtractor::new(&ToolsConfig::default());
        let candidates = vec![Target::new(FileId(1), &compressed, dir.path())];
        assert!(extractor.get_targets(&candidates).is_empty());
        assert!(compressed.exists());
    }

    #[tokio::test]
    async fn missing_binary_is_structural() {
        let extractor = TarExtractor::new(&ToolsConfig {
            tar_path: Some(PathBuf::from("/nonexistent/tar-xyz")),
            ..Default::default()
        });
        assert!(!extractor.is_available());

        let target = Target::new(FileId(1), "/tmp/a.tar", "/tmp/out");
        let mut archive = extractor.open(&target, &ArchiveOptions::default(), Progress::none());
        assert!(matches!(archive.verify("").await, StageResult::Structural(_)));
    }

    #[tokio::test]
    #[ignore] // Requires tar binary in PATH
    async fn extracts_real_tarball() {
        let extractor = TarExtractor::new(&ToolsConfig::default());
        let Some(tar) = extractor.binary().map(Path::to_path_buf) else {
            println!("Skipping test: tar binary not found in PATH");
            return;
        };

        let dir = tempfile::tempdir().unwrap();
        let src = dir.path().join("src");
        std::fs::create_dir_all(src.join("inner")).unwrap();
        std::fs::write(src.join("inner").join("file.txt"), b"tarred").unwrap();

        let tarball = dir.path().join("bundle.tar");
        let status = std::process::Command::new(tar)
            .arg("-c")
            .arg("-f")
            .arg(&tarball)
            .arg("-C")
            .arg(&src)
            .arg("inner")
            .status()
            .unwrap();
        assert!(status.success());

        let out = dir.path().join("out");
        let target = Target::new(FileId(1), &tarball, &out);
        let options = ArchiveOptions {
            fullpath: true,
            ..Default::default()
        };
        let mut archive = extractor.open(&target, &options, Progress::none());

        assert_eq!(archive.verify("").await, StageResult::Ok);
        assert_eq!(archive.extract("").await, StageResult::Ok);
        assert_eq!(
            std::fs::read_to_string(out.join("inner").join("file.txt")).unwrap(),
            "tarred"
        );
        assert_eq!(archive.files(), &[out.join("inner").join("file.txt")]);
    }

    #[tokio::test]
    #[ignore] // Requires tar binary in PATH
    async fn existing_output_is_kept_without_overwrite() {
        let extractor = TarExtractor::new(&ToolsConfig::default());
        let Some(tar) = extractor.binary().map(Path::to_path_buf) else {
            println!("Skipping test: tar binary not found in PATH");
            return;
        };

        let dir = tempfile::tempdir().unwrap();
        let src = dir.path().join("src");
        std::fs::create_dir_all(&src).unwrap();
        std::fs::write(src.join("file.txt"), b"from archive").unwrap();
        std::fs::write(src.join("other.txt"), b"new").unwrap();

        let tarball = dir.path().join("bundle.tar");
        let status = std::process::Command::new(tar)
            .arg("-c")
            .arg("-f")
            .arg(&tarball)
            .arg("-C")
            .arg(&src)
            .arg("file.txt")
            .arg("other.txt")
            .status()
            .unwrap();
        assert!(status.success());

        let out = dir.path().join("out");
        std::fs::create_dir_all(&out).unwrap();
        std::fs::write(out.join("file.txt"), b"already here").unwrap();

        let target = Target::new(FileId(1), &tarball, &out);
        let options = ArchiveOptions {
            fullpath: true,
            overwrite: false,
            ..Default::default()
        };
        let mut archive = extractor.open(&target, &options, Progress::none());

        assert_eq!(archive.extract("").await, StageResult::Ok);
        assert_eq!(
            std::fs::read_to_string(out.join("file.txt")).unwrap(),
            "already here"
        );
        assert_eq!(std::fs::read_to_string(out.join("other.txt")).unwrap(), "new");
    }
}
