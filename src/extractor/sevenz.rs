//! 7-Zip backend using the in-process sevenz-rust decoder

use async_trait::async_trait;
use sevenz_rust::{Password, SevenZReader};
use std::io::{Read, Seek, SeekFrom};
use std::path::{Path, PathBuf};
use tokio::task::spawn_blocking;
use tracing::{debug, warn};

use super::traits::{Archive, ArchiveOptions, Extractor, Progress, StageResult};
use super::{lower_file_name, member_path};
use crate::types::Target;
use crate::{Error, Result};

/// Stem of a split volume name: `movie.7z.001` gives `movie.7z`
///
/// Expects a lower-cased file name.
fn split_stem(name: &str) -> Option<&str> {
    let (stem, number) = name.rsplit_once('.')?;
    (number.len() == 3 && number.bytes().all(|b| b.is_ascii_digit()) && stem.ends_with(".7z"))
        .then_some(stem)
}

/// Every physical file of the archive starting at `path`, in volume order
///
/// A plain `.7z` file is its own set. Split sets are found by listing the
/// folder for `<stem>.NNN` siblings.
fn volume_set(path: &Path) -> Vec<PathBuf> {
    let single = vec![path.to_path_buf()];
    let (Some(dir), Some(name)) = (path.parent(), lower_file_name(path)) else {
        return single;
    };
    let Some(stem) = split_stem(&name) else {
        return single;
    };

    let mut volumes: Vec<PathBuf> = match std::fs::read_dir(dir) {
        Ok(entries) => entries
            .filter_map(|entry| entry.ok())
            .map(|entry| entry.path())
            .filter(|p| {
                lower_file_name(p).is_some_and(|n| split_stem(&n) == Some(stem))
            })
            .collect(),
        Err(e) => {
            debug!(?dir, error = %e, "cannot list archive folder");
            return single;
        }
    };

    if !volumes.iter().any(|v| v == path) {
        volumes.push(path.to_path_buf());
    }
    volumes.sort();
    volumes
}

/// Split volumes read back to back as one seekable stream
struct VolumeReader {
    volumes: Vec<(std::fs::File, u64)>,
    len: u64,
    pos: u64,
}

impl VolumeReader {
    fn open(paths: &[PathBuf]) -> std::io::Result<Self> {
        let mut volumes = Vec::with_capacity(paths.len());
        let mut len = 0u64;
        for path in paths {
            let file = std::fs::File::open(path)?;
            let size = file.metadata()?.len();
            len += size;
            volumes.push((file, size));
        }
        Ok(Self {
            volumes,
            len,
            pos: 0,
        })
    }
}

impl Read for VolumeReader {
    fn read(&mut self, buf: &mut [u8]) -> std::io::Result<usize> {
        let mut start = 0u64;
        for (file, size) in self.volumes.iter_mut() {
            if self.pos < start + *size {
                let offset = self.pos - start;
                file.seek(SeekFrom::Start(offset))?;
                let max = (*size - offset).min(buf.len() as u64) as usize;
                let n = file.read(&mut buf[..max])?;
                self.pos += n as u64;
                return Ok(n);
            }
            start += *size;
        }
        Ok(0)
    }
}

impl Seek for VolumeReader {
    fn seek(&mut self, pos: SeekFrom) -> std::io::Result<u64> {
        let target = match pos {
            SeekFrom::Start(n) => Some(n),
            SeekFrom::End(delta) => self.len.checked_add_signed(delta),
            SeekFrom::Current(delta) => self.pos.checked_add_signed(delta),
        }
        .ok_or_else(|| {
            std::io::Error::new(
                std::io::ErrorKind::InvalidInput,
                "seek before the start of the volume set",
            )
        })?;
        self.pos = target;
        Ok(target)
    }
}

/// Open the archive starting at `path`, joining split volumes
fn open_reader(
    path: &Path,
    password: &str,
) -> std::result::Result<SevenZReader<VolumeReader>, sevenz_rust::Error> {
    let reader = VolumeReader::open(&volume_set(path))?;
    let len = reader.len;
    SevenZReader::new(reader, len, to_password(password))
}

/// 7-Zip backend
///
/// Always available. Repair is not supported. Split sets (`.7z.001`,
/// `.7z.002`, ...) are opened from their first volume.
#[derive(Debug, Default)]
pub struct SevenZipExtractor;

impl SevenZipExtractor {
    /// Create the backend
    pub fn new() -> Self {
        Self
    }
}

impl Extractor for SevenZipExtractor {
    fn name(&self) -> &'static str {
        "SevenZip"
    }

    fn can_repair(&self) -> bool {
        false
    }

    fn is_available(&self) -> bool {
        true
    }

    fn archive_type(&self, path: &Path) -> Option<&'static str> {
        let name = lower_file_name(path)?;
        (name.ends_with(".7z") || split_stem(&name).is_some()).then_some("7z")
    }

    fn get_targets(&self, candidates: &[Target]) -> Vec<Target> {
        candidates
            .iter()
            .filter(|t| {
                lower_file_name(&t.path).is_some_and(|name| {
                    name.ends_with(".7z")
                        || (split_stem(&name).is_some() && name.ends_with(".001"))
                })
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
        Box::new(SevenZipArchive {
            target: target.clone(),
            options: options.clone(),
            progress,
            files: Vec::new(),
        })
    }
}

/// Map a decoder error onto a stage outcome
///
/// The decoder reports a missing or wrong password either explicitly or as a
/// data error while decrypting; both count as a password problem.
fn classify_error(e: &sevenz_rust::Error) -> StageResult {
    let debug_repr = format!("{:?}", e);
    let message = e.to_string();
    let lower = format!("{} {}", debug_repr, message).to_lowercase();

    if lower.contains("passwordrequired")
        || lower.contains("maybebadpassword")
        || lower.contains("password")
    {
        StageResult::WrongPassword
    } else if lower.contains("checksum") || lower.contains("crc") {
        StageResult::Corrupt(message)
    } else {
        StageResult::Structural(message)
    }
}

fn to_password(password: &str) -> Password {
    if password.is_empty() {
        Password::empty()
    } else {
        Password::from(password)
    }
}

/// An opened 7z archive
pub struct SevenZipArchive {
    target: Target,
    options: ArchiveOptions,
    progress: Progress,
    files: Vec<PathBuf>,
}

impl SevenZipArchive {
    /// Decode every entry into a sink, reporting progress per entry
    fn test_blocking(path: &Path, password: &str, progress: &Progress) -> StageResult {
        let mut reader = match open_reader(path, password) {
            Ok(r) => r,
            Err(e) => return classify_error(&e),
        };

        let total = reader.archive().files.len().max(1);
        let mut done = 0usize;

        let result = reader.for_each_entries(|_entry, data| {
            std::io::copy(data, &mut std::io::sink())?;
            done += 1;
            progress.report((done * 100 / total) as u8);
            Ok(true)
        });

        match result {
            Ok(()) => StageResult::Ok,
            Err(e) => classify_error(&e),
        }
    }

    /// Decode every entry into `destination`
    fn extract_blocking(
        path: &Path,
        password: &str,
        destination: &Path,
        options: &ArchiveOptions,
        progress: &Progress,
    ) -> std::result::Result<Vec<PathBuf>, StageResult> {
        std::fs::create_dir_all(destination).map_err(|e| {
            StageResult::Structural(format!("failed to create destination: {}", e))
        })?;

        let mut reader = open_reader(path, password).map_err(|e| classify_error(&e))?;

        let total = reader.archive().files.len().max(1);
        let mut done = 0usize;
        let mut written = Vec::new();

        reader
            .for_each_entries(|entry, data| {
                done += 1;
                progress.report((done * 100 / total) as u8);

                let name = entry.name();
                if options.is_excluded(name) {
                    debug!(entry = name, "skipping excluded entry");
                    std::io::copy(data, &mut std::io::sink())?;
                    return Ok(true);
                }

                let Some(out_path) = member_path(destination, name, options.fullpath) else {
                    warn!(entry = name, "skipping entry with unsafe path");
                    std::io::copy(data, &mut std::io::sink())?;
                    return Ok(true);
                };

                if entry.is_directory() {
                    if options.fullpath {
                        std::fs::create_dir_all(&out_path)?;
                    }
                    return Ok(true);
                }

                if out_path.exists() && !options.overwrite {
                    debug!(path = ?out_path, "file exists, not overwriting");
                    std::io::copy(data, &mut std::io::sink())?;
                    return Ok(true);
                }

                if let Some(parent) = out_path.parent() {
                    std::fs::create_dir_all(parent)?;
                }
                let mut out = std::fs::File::create(&out_path)?;
                std::io::copy(data, &mut out)?;
                written.push(out_path);
                Ok(true)
            })
            .map_err(|e| classify_error(&e))?;

        Ok(written)
    }
}

#[async_trait]
impl Archive for SevenZipArchive {
    fn path(&self) -> &Path {
        &self.target.path
    }

    async fn verify(&mut self, password: &str) -> StageResult {
        let path = self.target.path.clone();
        let password = password.to_string();
        let progress = self.progress.clone();

        spawn_blocking(move || Self::test_blocking(&path, &password, &progress))
            .await
            .unwrap_or_else(|e| StageResult::Structural(format!("7z test task panicked: {}", e)))
    }

    async fn repair(&mut self) -> Result<bool> {
        Err(Error::NotSupported("7z archives cannot be repaired".to_string()))
    }

    async fn extract(&mut self, password: &str) -> StageResult {
        let path = self.target.path.clone();
        let destination = self.target.destination.clone();
        let password = password.to_string();
        let options = self.options.clone();
        let progress = self.progress.clone();

        let result = spawn_blocking(move || {
            Self::extract_blocking(&path, &password, &destination, &options, &progress)
        })
        .await;

        match result {
            Ok(Ok(files)) => {
                debug!(
                    archive = ?self.target.path,
                    extracted_count = files.len(),
                    "7z extraction successful"
                );
                self.files = files;
                StageResult::Ok
            }
            Ok(Err(stage)) => stage,
            Err(e) => StageResult::Structural(format!("7z extraction task panicked: {}", e)),
        }
    }

    fn files(&self) -> &[PathBuf] {
        &self.files
    }

    async fn list(&mut self, password: &str) -> Result<Vec<PathBuf>> {
        let path = self.target.path.clone();
        let destination = self.target.destination.clone();
        let password = password.to_string();
        let options = self.options.clone();

        spawn_blocking(move || -> Result<Vec<PathBuf>> {
            let reader = open_reader(&path, &password).map_err(|e| {
                Error::ExternalTool(format!("failed to read 7z archive: {}", e))
            })?;

            Ok(reader
                .archive()
                .files
                .iter()
                .filter(|entry| !entry.is_directory() && !options.is_excluded(entry.name()))
                .filter_map(|entry| member_path(&destination, entry.name(), options.fullpath))
                .collect())
        })
        .await
        .map_err(|e| Error::Other(format!("7z listing task panicked: {}", e)))?
    }

    fn chunks(&self) -> Vec<PathBuf> {
        volume_set(&self.target.path)
    }
}
