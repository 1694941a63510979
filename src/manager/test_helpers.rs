//! Shared test helpers: a scripted backend and a manager wired to in-memory collaborators.

use async_trait::async_trait;
use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex};
use std::time::Duration;
use tempfile::TempDir;
use tokio::sync::broadcast;

use crate::config::Config;
use crate::db::{KeyValueStore, MemoryStore};
use crate::extractor::{Archive, ArchiveOptions, Extractor, Progress, StageResult};
use crate::host::MemoryRegistry;
use crate::manager::ExtractionManager;
use crate::types::{Event, FileId, FileStatus, Package, PackageFile, PackageId, Target};

/// Behavior of one scripted archive, keyed by its entry-point file name
#[derive(Clone, Debug, Default)]
pub(crate) struct Script {
    /// Password the archive is encrypted with
    pub password: Option<String>,
    /// Verify reports a CRC error until the archive is repaired
    pub corrupt: bool,
    /// Whether repair succeeds
    pub repairable: bool,
    /// Verify and extract fail with this structural error
    pub structural: Option<String>,
    /// Members written on extraction: (relative name, contents)
    pub members: Vec<(String, Vec<u8>)>,
    /// Sibling volume file names belonging to the same archive
    pub volumes: Vec<String>,
}

impl Script {
    pub fn members(names: &[(&str, &[u8])]) -> Self {
        Self {
            members: names
                .iter()
                .map(|(n, c)| (n.to_string(), c.to_vec()))
                .collect(),
            ..Default::default()
        }
    }

    pub fn with_password(mut self, password: &str) -> Self {
        self.password = Some(password.to_string());
        self
    }

    pub fn corrupt(mut self, repairable: bool) -> Self {
        self.corrupt = true;
        self.repairable = repairable;
        self
    }

    pub fn with_volumes(mut self, volumes: &[&str]) -> Self {
        self.volumes = volumes.iter().map(|v| v.to_string()).collect();
        self
    }
}

/// In-memory backend driven by per-file [`Script`]s
///
/// Claims every `.sim` file that has a script. Records each stage call as
/// `"<stage>:<file name>:<password>"`.
#[derive(Clone)]
pub(crate) struct ScriptedExtractor {
    scripts: Arc<Mutex<HashMap<String, Script>>>,
    pub calls: Arc<Mutex<Vec<String>>>,
    pub repair_support: bool,
    pub available: bool,
    pub extract_delay: Option<Duration>,
}

impl ScriptedExtractor {
    pub fn new() -> Self {
        Self {
            scripts: Arc::new(Mutex::new(HashMap::new())),
            calls: Arc::new(Mutex::new(Vec::new())),
            repair_support: false,
            available: true,
            extract_delay: None,
        }
    }

    pub fn script(&self, name: &str, script: Script) {
        self.scripts.lock().unwrap().insert(name.to_string(), script);
    }

    pub fn calls(&self) -> Vec<String> {
        self.calls.lock().unwrap().clone()
    }

    pub fn calls_with(&self, prefix: &str) -> Vec<String> {
        self.calls()
            .into_iter()
            .filter(|c| c.starts_with(prefix))
            .collect()
    }
}

impl Extractor for ScriptedExtractor {
    fn name(&self) -> &'static str {
        "Scripted"
    }

    fn can_repair(&self) -> bool {
        self.repair_support
    }

    fn is_available(&self) -> bool {
        self.available
    }

    fn archive_type(&self, path: &Path) -> Option<&'static str> {
        path.extension()
            .is_some_and(|e| e == "sim")
            .then_some("sim")
    }

    fn get_targets(&self, candidates: &[Target]) -> Vec<Target> {
        let scripts = self.scripts.lock().unwrap();
        candidates
            .iter()
            .filter(|t| self.archive_type(&t.path).is_some())
            .filter(|t| scripts.contains_key(&t.name()))
            .cloned()
            .collect()
    }

    fn open(
        &self,
        target: &Target,
        options: &ArchiveOptions,
        progress: Progress,
    ) -> Box<dyn Archive> {
        let script = self
            .scripts
            .lock()
            .unwrap()
            .get(&target.name())
            .cloned()
            .unwrap_or_default();
        Box::new(ScriptedArchive {
            target: target.clone(),
            script,
            keepbroken: options.keepbroken,
            repaired: false,
            files: Vec::new(),
            calls: Arc::clone(&self.calls),
            delay: self.extract_delay,
            progress,
        })
    }
}

struct ScriptedArchive {
    target: Target,
    script: Script,
    keepbroken: bool,
    repaired: bool,
    files: Vec<PathBuf>,
    calls: Arc<Mutex<Vec<String>>>,
    delay: Option<Duration>,
    progress: Progress,
}

impl ScriptedArchive {
    fn record(&self, stage: &str, password: &str) {
        self.calls
            .lock()
            .unwrap()
            .push(format!("{}:{}:{}", stage, self.target.name(), password));
    }

    fn password_ok(&self, password: &str) -> bool {
        self.script.password.as_deref().is_none_or(|p| p == password)
    }

    fn outputs(&self) -> Vec<PathBuf> {
        self.script
            .members
            .iter()
            .map(|(name, _)| self.target.destination.join(name))
            .collect()
    }
}

#[async_trait]
impl Archive for ScriptedArchive {
    fn path(&self) -> &Path {
        &self.target.path
    }

    async fn verify(&mut self, password: &str) -> StageResult {
        self.record("verify", password);
        if let Some(reason) = &self.script.structural {
            return StageResult::Structural(reason.clone());
        }
        if !self.password_ok(password) {
            return StageResult::WrongPassword;
        }
        if self.script.corrupt && !self.repaired {
            return StageResult::Corrupt("CRC failed".to_string());
        }
        StageResult::Ok
    }

    async fn repair(&mut self) -> crate::Result<bool> {
        self.record("repair", "");
        self.repaired = self.script.repairable;
        Ok(self.repaired)
    }

    async fn extract(&mut self, password: &str) -> StageResult {
        self.record("extract", password);
        if let Some(delay) = self.delay {
            tokio::time::sleep(delay).await;
        }
        if let Some(reason) = &self.script.structural {
            return StageResult::Structural(reason.clone());
        }
        if !self.password_ok(password) {
            return StageResult::WrongPassword;
        }
        if self.script.corrupt && !self.repaired && !self.keepbroken {
            return StageResult::Corrupt("CRC failed".to_string());
        }

        self.progress.report(50);
        for (name, contents) in &self.script.members {
            let out = self.target.destination.join(name);
            if let Some(parent) = out.parent() {
                std::fs::create_dir_all(parent).unwrap();
            }
            std::fs::write(&out, contents).unwrap();
        }
        self.files = self.outputs();
        StageResult::Ok
    }

    fn files(&self) -> &[PathBuf] {
        &self.files
    }

    async fn list(&mut self, _password: &str) -> crate::Result<Vec<PathBuf>> {
        Ok(self.outputs())
    }

    fn chunks(&self) -> Vec<PathBuf> {
        let dir = self.target.path.parent().unwrap_or(Path::new(""));
        std::iter::once(self.target.path.clone())
            .chain(self.script.volumes.iter().map(|v| dir.join(v)))
            .collect()
    }
}

/// A manager over in-memory collaborators rooted in a temp dir
pub(crate) struct Harness {
    pub manager: ExtractionManager,
    pub registry: Arc<MemoryRegistry>,
    pub config: Config,
    /// Kept alive for the lifetime of the harness
    pub dir: TempDir,
}

/// Activated config rooted in `dir`, deleting archives permanently
pub(crate) fn test_config(dir: &Path) -> Config {
    Config {
        activated: true,
        download_dir: dir.join("downloads"),
        passwordfile: dir.join("passwords.txt"),
        deltotrash: false,
        extensions: String::new(),
        ..Default::default()
    }
}

/// Build a harness; `configure` adjusts the default test config
pub(crate) fn harness(
    configure: impl FnOnce(&mut Config),
    extractors: Vec<Arc<dyn Extractor>>,
) -> Harness {
    harness_with_store(configure, extractors, Arc::new(MemoryStore::new()))
}

/// Build a harness over a caller-provided queue store
pub(crate) fn harness_with_store(
    configure: impl FnOnce(&mut Config),
    extractors: Vec<Arc<dyn Extractor>>,
    store: Arc<dyn KeyValueStore>,
) -> Harness {
    let dir = tempfile::tempdir().unwrap();
    let mut config = test_config(dir.path());
    configure(&mut config);
    std::fs::create_dir_all(&config.download_dir).unwrap();

    let registry = Arc::new(MemoryRegistry::new());
    let manager = ExtractionManager::with_extractors(
        config.clone(),
        store,
        registry.clone(),
        registry.clone(),
        extractors,
    );

    Harness {
        manager,
        registry,
        config,
        dir,
    }
}

impl Harness {
    /// Package folder inside the download directory
    pub fn package_dir(&self, folder: &str) -> PathBuf {
        self.config.download_dir.join(folder)
    }

    /// Register a package whose files are created on disk with dummy contents
    pub async fn add_package(&self, id: i64, folder: &str, files: &[&str], password: &str) -> Package {
        let dir = self.package_dir(folder);
        std::fs::create_dir_all(&dir).unwrap();

        let package = Package {
            id: PackageId(id),
            name: folder.to_string(),
            folder: folder.to_string(),
            password: password.to_string(),
            destination: String::new(),
            files: files
                .iter()
                .enumerate()
                .map(|(i, name)| {
                    std::fs::write(dir.join(name), b"volume").unwrap();
                    PackageFile {
                        id: FileId(id * 100 + i as i64),
                        name: name.to_string(),
                        status: FileStatus::Queued,
                    }
                })
                .collect(),
        };

        self.registry.insert_package(package.clone()).await;
        package
    }
}

/// Drain every event currently buffered in `rx`
pub(crate) fn drain_events(rx: &mut broadcast::Receiver<Event>) -> Vec<Event> {
    let mut events = Vec::new();
    while let Ok(event) = rx.try_recv() {
        events.push(event);
    }
    events
}

/// Event names, for order assertions
pub(crate) fn event_names(events: &[Event]) -> Vec<&'static str> {
    events.iter().map(Event::name).collect()
}
