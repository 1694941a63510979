//! RAR backend driving the external `unrar` / `rar` binary

use async_trait::async_trait;
use regex::Regex;
use std::ffi::OsString;
use std::path::{Path, PathBuf};
use std::sync::OnceLock;
use tracing::{debug, warn};

use super::cli::{classify, find_tool, run_tool, ToolOutput};
use super::traits::{Archive, ArchiveOptions, Extractor, Progress, StageResult};
use super::{lower_file_name, member_path};
use crate::config::ToolsConfig;
use crate::types::Target;
use crate::{Error, Result};

/// unrar exit code for a wrong password
const EXIT_BAD_PASSWORD: i32 = 11;
/// unrar exit code for a CRC error
const EXIT_CRC: i32 = 3;

/// Check if a filename is the first volume of a RAR archive set.
///
/// Recognizes these naming conventions:
/// - `archive.rar` (single file or first volume of old-style naming)
/// - `archive.part1.rar`, `archive.part01.rar`, `archive.part001.rar`
///
/// Old-style continuation volumes (`.r00`, `.r01`, ...) and `.partNN.rar`
/// with a number other than one are never first volumes.
pub(crate) fn is_first_rar_volume(filename: &str) -> bool {
    let lower = filename.to_lowercase();

    let Some(stem) = lower.strip_suffix(".rar") else {
        return false;
    };

    if let Some(part_idx) = stem.rfind(".part") {
        let num_str = &stem[part_idx + 5..];
        if !num_str.is_empty() && num_str.chars().all(|c| c.is_ascii_digit()) {
            return num_str.parse::<u32>().map(|n| n == 1).unwrap_or(false);
        }
    }

    true
}

/// Check if a filename is any volume of a RAR archive set.
pub(crate) fn is_rar_file(filename: &str) -> bool {
    let lower = filename.to_lowercase();

    if lower.ends_with(".rar") {
        return true;
    }

    // Old-style split: .r00 .. .r999
    match lower.rfind(".r") {
        Some(idx) => {
            let digits = &lower[idx + 2..];
            (2..=3).contains(&digits.len()) && digits.chars().all(|c| c.is_ascii_digit())
        }
        None => false,
    }
}

/// Pattern matching every volume file name of the set `first_volume` starts
///
/// Matching is done on lower-cased names.
fn volume_set_regex(first_volume: &str) -> Option<Regex> {
    let lower = first_volume.to_lowercase();
    let stem = lower.strip_suffix(".rar")?;

    let pattern = match stem.rfind(".part") {
        Some(idx)
            if !stem[idx + 5..].is_empty()
                && stem[idx + 5..].chars().all(|c| c.is_ascii_digit()) =>
        {
            format!(r"^{}\.part\d+\.rar$", regex::escape(&stem[..idx]))
        }
        _ => format!(r"^{}\.(rar|r\d{{2,3}})$", regex::escape(stem)),
    };

    Regex::new(&pattern).ok()
}

/// RAR backend
///
/// Verification, extraction and listing work with either `unrar` or `rar`;
/// repair needs the full `rar` binary. `rar` is preferred when both are
/// installed.
pub struct RarExtractor {
    explicit_path: Option<PathBuf>,
    search_path: bool,
    binary: OnceLock<Option<PathBuf>>,
}

impl RarExtractor {
    /// Create the backend; the binary is located on first use
    pub fn new(tools: &ToolsConfig) -> Self {
        Self {
            explicit_path: tools.unrar_path.clone(),
            search_path: tools.search_path,
            binary: OnceLock::new(),
        }
    }

    /// Create the backend with an explicit binary path
    pub fn with_binary(binary_path: PathBuf) -> Self {
        Self {
            explicit_path: Some(binary_path),
            search_path: false,
            binary: OnceLock::new(),
        }
    }

    fn binary(&self) -> Option<&Path> {
        self.binary
            .get_or_init(|| {
                let found = find_tool(
                    self.explicit_path.as_deref(),
                    self.search_path,
                    &["rar", "unrar"],
                );
                match &found {
                    Some(path) => debug!(?path, "found RAR binary"),
                    None => debug!("no RAR binary found"),
                }
                found
            })
            .as_deref()
    }
}

impl Extractor for RarExtractor {
    fn name(&self) -> &'static str {
        "UnRar"
    }

    fn can_repair(&self) -> bool {
        self.binary()
            .and_then(|b| b.file_stem())
            .and_then(|s| s.to_str())
            .is_some_and(|s| s.eq_ignore_ascii_case("rar"))
    }

    fn is_available(&self) -> bool {
        self.binary().is_some()
    }

    fn archive_type(&self, path: &Path) -> Option<&'static str> {
        let name = lower_file_name(path)?;
        is_rar_file(&name).then_some("rar")
    }

    fn get_targets(&self, candidates: &[Target]) -> Vec<Target> {
        candidates
            .iter()
            .filter(|t| {
                t.path
                    .file_name()
                    .and_then(|n| n.to_str())
                    .is_some_and(is_first_rar_volume)
            })
            .cloned()
            .collect()
    }

    fn open(
        &self,
        target: &Target,
        options: &ArchiveOptions,
        progress: Progress,
    ) -> Box<dyn Archive> {
        Box::new(RarArchive {
            binary: self.binary().map(Path::to_path_buf),
            can_repair: self.can_repair(),
            target: target.clone(),
            options: options.clone(),
            progress,
            files: Vec::new(),
        })
    }
}

/// An opened RAR archive (possibly multi-volume)
pub struct RarArchive {
    binary: Option<PathBuf>,
    can_repair: bool,
    target: Target,
    options: ArchiveOptions,
    progress: Progress,
    files: Vec<PathBuf>,
}

impl RarArchive {
    fn password_arg(password: &str) -> OsString {
        if password.is_empty() {
            OsString::from("-p-")
        } else {
            OsString::from(format!("-p{}", password))
        }
    }

    async fn run(&self, args: Vec<OsString>, current_dir: Option<&Path>) -> Result<ToolOutput> {
        let binary = self.binary.as_deref().ok_or_else(|| {
            Error::Extract(crate::error::ExtractError::ToolUnavailable {
                tool: "unrar".to_string(),
            })
        })?;
        run_tool(binary, &args, current_dir, self.options.priority, &self.progress).await
    }

    fn classify(output: &ToolOutput) -> StageResult {
        match output.code {
            Some(EXIT_BAD_PASSWORD) if !output.success => StageResult::WrongPassword,
            Some(EXIT_CRC) if !output.success => match classify(output) {
                StageResult::WrongPassword => StageResult::WrongPassword,
                _ => StageResult::Corrupt(output.message()),
            },
            _ => classify(output),
        }
    }

    /// Classify an extraction run
    ///
    /// With `-kb` unrar keeps the damaged files but still exits with the CRC
    /// code, so a corrupt result counts as success when broken files are kept.
    fn classify_extract(output: &ToolOutput, keepbroken: bool) -> StageResult {
        match Self::classify(output) {
            StageResult::Corrupt(reason) if keepbroken => {
                warn!(reason = %reason, "CRC errors during extraction, keeping broken files");
                StageResult::Ok
            }
            result => result,
        }
    }
}

#[async_trait]
impl Archive for RarArchive {
    fn path(&self) -> &Path {
        &self.target.path
    }

    async fn verify(&mut self, password: &str) -> StageResult {
        let args = vec![
            OsString::from("t"),
            OsString::from("-y"),
            Self::password_arg(password),
            self.target.path.clone().into_os_string(),
        ];

        match self.run(args, None).await {
            Ok(output) => Self::classify(&output),
            Err(e) => StageResult::Structural(e.to_string()),
        }
    }

    async fn repair(&mut self) -> Result<bool> {
        if !self.can_repair {
            return Err(Error::NotSupported(
                "RAR repair needs the rar binary".to_string(),
            ));
        }

        let args = vec![
            OsString::from("r"),
            OsString::from("-y"),
            self.target.path.clone().into_os_string(),
        ];
        let output = self.run(args, self.target.path.parent()).await?;

        if !output.success {
            warn!(archive = ?self.target.path, message = %output.message(), "RAR repair failed");
        }
        Ok(output.success)
    }

    async fn extract(&mut self, password: &str) -> StageResult {
        if let Err(e) = tokio::fs::create_dir_all(&self.target.destination).await {
            return StageResult::Structural(format!("failed to create destination: {}", e));
        }

        let mut args = vec![
            OsString::from(if self.options.fullpath { "x" } else { "e" }),
            OsString::from("-y"),
            OsString::from("-c-"),
            OsString::from(if self.options.overwrite { "-o+" } else { "-o-" }),
        ];
        if self.options.keepbroken {
            args.push(OsString::from("-kb"));
        }
        for pattern in &self.options.excludefiles {
            args.push(OsString::from(format!("-x{}", pattern)));
        }
        args.push(Self::password_arg(password));
        args.push(self.target.path.clone().into_os_string());

        // Trailing separator makes unrar treat the destination as a folder
        let mut destination = self.target.destination.clone().into_os_string();
        destination.push(std::path::MAIN_SEPARATOR_STR);
        args.push(destination);

        let result = match self.run(args, None).await {
            Ok(output) => Self::classify_extract(&output, self.options.keepbroken),
            Err(e) => StageResult::Structural(e.to_string()),
        };

        if result.is_ok() {
            self.files = self.list(password).await.unwrap_or_default();
        }
        result
    }

    fn files(&self) -> &[PathBuf] {
        &self.files
    }

    async fn list(&mut self, password: &str) -> Result<Vec<PathBuf>> {
        let args = vec![
            OsString::from("lb"),
            OsString::from("-y"),
            Self::password_arg(password),
            self.target.path.clone().into_os_string(),
        ];
        let output = self.run(args, None).await?;
        if !output.success {
            return Err(Error::ExternalTool(format!(
                "unrar listing failed: {}",
                output.message()
            )));
        }

        Ok(output
            .stdout
            .lines()
            .map(str::trim)
            .filter(|line| !line.is_empty() && !self.options.is_excluded(line))
            .filter_map(|line| {
                member_path(&self.target.destination, line, self.options.fullpath)
            })
            .collect())
    }

    fn chunks(&self) -> Vec<PathBuf> {
        let Some(dir) = self.target.path.parent() else {
            return vec![self.target.path.clone()];
        };
        let Some(set) = self
            .target
            .path
            .file_name()
            .and_then(|n| n.to_str())
            .and_then(volume_set_regex)
        else {
            return vec![self.target.path.clone()];
        };

        let mut chunks: Vec<PathBuf> = match std::fs::read_dir(dir) {
            Ok(entries) => entries
                .filter_map(|entry| entry.ok())
                .map(|entry| entry.path())
                .filter(|path| {
                    lower_file_name(path).is_some_and(|name| set.is_match(&name))
                })
                .collect(),
            Err(e) => {
                debug!(?dir, error = %e, "cannot list archive folder");
                Vec::new()
            }
        };

        if !chunks.contains(&self.target.path) {
            chunks.push(self.target.path.clone());
        }
        chunks.sort();
        chunks
    }
}
