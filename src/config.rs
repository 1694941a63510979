//! Configuration types for extract-archive
//!
//! [`Config`] mirrors the option surface a host exposes for the extraction addon
//! (`activated`, `fullpath`, `overwrite`, ...). Every field has a serde default, so
//! a host can deserialize a partial document and get the stock behavior for
//! everything it leaves out.

use serde::{Deserialize, Serialize};
use std::path::PathBuf;

/// Extraction pipeline configuration
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct Config {
    /// Master switch; notifications and activation are ignored while false
    #[serde(default)]
    pub activated: bool,

    /// Extract with full paths (default: true)
    #[serde(default = "default_true")]
    pub fullpath: bool,

    /// Overwrite existing files (default: false)
    #[serde(default)]
    pub overwrite: bool,

    /// Try to extract broken archives (default: false)
    #[serde(default)]
    pub keepbroken: bool,

    /// Repair broken archives when the backend supports it (default: false)
    #[serde(default)]
    pub repair: bool,

    /// Try passwords from the password file (default: true)
    #[serde(default = "default_true")]
    pub usepasswordfile: bool,

    /// Password file, one password per line (default: "passwords.txt")
    #[serde(default = "default_password_file")]
    pub passwordfile: PathBuf,

    /// Delete archive volumes after extraction (default: true)
    #[serde(default = "default_true")]
    pub delete: bool,

    /// Move deleted volumes to the trash instead of unlinking them (default: true)
    #[serde(default = "default_true")]
    pub deltotrash: bool,

    /// Create a subfolder per package inside the destination (default: false)
    #[serde(default)]
    pub subfolder: bool,

    /// Extraction folder, relative to the package folder unless absolute (default: "")
    #[serde(default)]
    pub destination: PathBuf,

    /// Archive extensions to extract, separated by `,`, `;`, `|` or whitespace
    #[serde(default = "default_extensions")]
    pub extensions: String,

    /// Glob patterns of archive members not to extract
    #[serde(default = "default_exclude_files")]
    pub excludefiles: String,

    /// Extract archives found inside extracted archives (default: true)
    #[serde(default = "default_true")]
    pub recursive: bool,

    /// Wait until all downloads were processed before extracting (default: false)
    #[serde(default)]
    pub waitall: bool,

    /// Process priority handed to external extractor tools (`nice` value, default: 0)
    #[serde(default)]
    pub priority: i32,

    /// Host download directory (default: "./downloads")
    #[serde(default = "default_download_dir")]
    pub download_dir: PathBuf,

    /// Whether the host stores every package in its own folder (default: true)
    #[serde(default = "default_true")]
    pub folder_per_package: bool,

    /// External tool locations
    #[serde(default)]
    pub tools: ToolsConfig,

    /// Permissions applied to extracted files and folders
    #[serde(default)]
    pub permissions: PermissionsConfig,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            activated: false,
            fullpath: true,
            overwrite: false,
            keepbroken: false,
            repair: false,
            usepasswordfile: true,
            passwordfile: default_password_file(),
            delete: true,
            deltotrash: true,
            subfolder: false,
            destination: PathBuf::new(),
            extensions: default_extensions(),
            excludefiles: default_exclude_files(),
            recursive: true,
            waitall: false,
            priority: 0,
            download_dir: default_download_dir(),
            folder_per_package: true,
            tools: ToolsConfig::default(),
            permissions: PermissionsConfig::default(),
        }
    }
}

impl Config {
    /// Allowed archive extensions: lower-cased, without leading dots
    pub fn extension_list(&self) -> Vec<String> {
        to_list(&self.extensions)
            .into_iter()
            .map(|ext| ext.trim_start_matches('.').to_lowercase())
            .filter(|ext| !ext.is_empty())
            .collect()
    }

    /// Member exclusion patterns
    pub fn exclude_list(&self) -> Vec<String> {
        to_list(&self.excludefiles)
    }
}

/// External tool paths
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct ToolsConfig {
    /// Path to the unrar (or rar) executable (auto-detected if None)
    #[serde(default)]
    pub unrar_path: Option<PathBuf>,

    /// Path to the tar executable (auto-detected if None)
    #[serde(default)]
    pub tar_path: Option<PathBuf>,

    /// Whether to search PATH for external binaries if explicit paths not set (default: true)
    #[serde(default = "default_true")]
    pub search_path: bool,
}

impl Default for ToolsConfig {
    fn default() -> Self {
        Self {
            unrar_path: None,
            tar_path: None,
            search_path: true,
        }
    }
}

/// Permission normalization for extracted output (unix only)
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct PermissionsConfig {
    /// Apply the modes below (default: false, leave the tool's modes alone)
    #[serde(default)]
    pub chmod: bool,

    /// Mode for extracted files (default: 0o644)
    #[serde(default = "default_file_mode")]
    pub file_mode: u32,

    /// Mode for extracted folders (default: 0o755)
    #[serde(default = "default_folder_mode")]
    pub folder_mode: u32,
}

impl Default for PermissionsConfig {
    fn default() -> Self {
        Self {
            chmod: false,
            file_mode: default_file_mode(),
            folder_mode: default_folder_mode(),
        }
    }
}

/// Split an option string on `,`, `;`, `|` and whitespace, dropping empty items
pub fn to_list(value: &str) -> Vec<String> {
    value
        .split(|c: char| matches!(c, ',' | ';' | '|') || c.is_whitespace())
        .filter(|item| !item.is_empty())
        .map(str::to_string)
        .collect()
}

fn default_true() -> bool {
    true
}

fn default_password_file() -> PathBuf {
    PathBuf::from("passwords.txt")
}

fn default_extensions() -> String {
    "7z,bz2,bzip2,gz,gzip,lha,lzh,lzma,rar,tar,taz,tbz,tbz2,tgz,xar,xz,z,zip".to_string()
}

fn default_exclude_files() -> String {
    "*.nfo,*.DS_Store,index.dat,thumb.db".to_string()
}

fn default_download_dir() -> PathBuf {
    PathBuf::from("./downloads")
}

fn default_file_mode() -> u32 {
    0o644
}

fn default_folder_mode() -> u32 {
    0o755
}
