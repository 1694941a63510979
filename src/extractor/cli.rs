//! Running external archive tools

use regex::Regex;
use std::ffi::OsString;
use std::path::{Path, PathBuf};
use std::process::Stdio;
use std::sync::OnceLock;
use tokio::io::{AsyncRead, AsyncReadExt};
use tokio::process::Command;
use tracing::debug;

use super::traits::{Progress, StageResult};

#[allow(clippy::expect_used)]
fn percent_regex() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| Regex::new(r"(\d{1,3})%").expect("percent regex"))
}

#[allow(clippy::expect_used)]
fn password_regex() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| Regex::new(r"(?i)password|encrypted").expect("password regex"))
}

#[allow(clippy::expect_used)]
fn crc_regex() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| {
        Regex::new(r"(?i)CRC failed|checksum error|unexpected end of archive|corrupt|damaged")
            .expect("crc regex")
    })
}

/// Captured result of a finished tool run
#[derive(Debug, Clone, Default)]
pub(crate) struct ToolOutput {
    /// Whether the tool exited with status 0
    pub success: bool,
    /// Exit code, `None` when killed by a signal
    pub code: Option<i32>,
    pub stdout: String,
    pub stderr: String,
}

impl ToolOutput {
    /// Stderr if present, stdout otherwise, trimmed for log lines and errors
    pub fn message(&self) -> String {
        let text = if self.stderr.trim().is_empty() {
            &self.stdout
        } else {
            &self.stderr
        };
        text.trim().lines().last().unwrap_or_default().to_string()
    }
}

/// Locate a tool: explicit path first, then PATH lookups in order
pub(crate) fn find_tool(explicit: Option<&Path>, search_path: bool, names: &[&str]) -> Option<PathBuf> {
    if let Some(path) = explicit {
        return path.exists().then(|| path.to_path_buf());
    }
    if !search_path {
        return None;
    }
    names.iter().find_map(|name| which::which(name).ok())
}

/// Run `binary` with `args`, streaming percentages from stdout into `progress`
///
/// A non-zero `priority` runs the tool under `nice -n <priority>` when `nice` is
/// installed.
pub(crate) async fn run_tool(
    binary: &Path,
    args: &[OsString],
    current_dir: Option<&Path>,
    priority: i32,
    progress: &Progress,
) -> crate::Result<ToolOutput> {
    let mut command = match (priority, which::which("nice")) {
        (0, _) | (_, Err(_)) => Command::new(binary),
        (priority, Ok(nice)) => {
            let mut cmd = Command::new(nice);
            cmd.arg("-n").arg(priority.to_string()).arg(binary);
            cmd
        }
    };

    command
        .args(args)
        .stdin(Stdio::null())
        .stdout(Stdio::piped())
        .stderr(Stdio::piped())
        .kill_on_drop(true);

    if let Some(dir) = current_dir {
        command.current_dir(dir);
    }

    debug!(?binary, ?args, "running external tool");

    let mut child = command.spawn().map_err(|e| {
        crate::Error::ExternalTool(format!("Failed to execute {}: {}", binary.display(), e))
    })?;

    let stderr_task = child.stderr.take().map(|stderr| {
        tokio::spawn(async move {
            let mut buf = Vec::new();
            let mut stderr = stderr;
            let _ = stderr.read_to_end(&mut buf).await;
            String::from_utf8_lossy(&buf).into_owned()
        })
    });

    let stdout = match child.stdout.take() {
        Some(stdout) => pump_progress(stdout, progress).await,
        None => String::new(),
    };

    let stderr = match stderr_task {
        Some(task) => task.await.unwrap_or_default(),
        None => String::new(),
    };

    let status = child.wait().await.map_err(|e| {
        crate::Error::ExternalTool(format!("Failed to wait for {}: {}", binary.display(), e))
    })?;

    Ok(ToolOutput {
        success: status.success(),
        code: status.code(),
        stdout,
        stderr,
    })
}

/// Read a stream to the end, reporting the last percentage seen in each chunk
///
/// Tools redraw their percentage with backspaces instead of newlines, so the
/// stream is scanned chunk by chunk rather than line by line.
async fn pump_progress<R: AsyncRead + Unpin>(mut reader: R, progress: &Progress) -> String {
    let mut collected = Vec::new();
    let mut buf = [0u8; 4096];

    loop {
        match reader.read(&mut buf).await {
            Ok(0) | Err(_) => break,
            Ok(n) => {
                let chunk = String::from_utf8_lossy(&buf[..n]);
                if let Some(percent) = last_percent(&chunk) {
                    progress.report(percent);
                }
                collected.extend_from_slice(&buf[..n]);
            }
        }
    }

    String::from_utf8_lossy(&collected).into_owned()
}

/// Last `NN%` value in `text`
pub(crate) fn last_percent(text: &str) -> Option<u8> {
    percent_regex()
        .captures_iter(text)
        .filter_map(|c| c.get(1)?.as_str().parse::<u8>().ok())
        .filter(|p| *p <= 100)
        .last()
}

/// Map a finished tool run onto a stage outcome
///
/// Password complaints win over checksum complaints: tools report a wrong
/// password on encrypted members as a CRC failure mentioning the password.
pub(crate) fn classify(output: &ToolOutput) -> StageResult {
    let text = format!("{}\n{}", output.stderr, output.stdout);

    if output.success {
        return StageResult::Ok;
    }
    if password_regex().is_match(&text) {
        return StageResult::WrongPassword;
    }
    if crc_regex().is_match(&text) {
        return StageResult::Corrupt(output.message());
    }
    StageResult::Structural(match output.code {
        Some(code) => format!("exit code {}: {}", code, output.message()),
        None => format!("terminated by signal: {}", output.message()),
    })
}
