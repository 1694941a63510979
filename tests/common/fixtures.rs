//! Test fixtures: real archives on disk and a manager wired to in-memory collaborators

use extract_archive::{
    Config, ExtractionManager, FileId, FileStatus, KeyValueStore, MemoryRegistry, MemoryStore,
    Package, PackageFile, PackageId, ZipExtractor,
};
use std::io::Write;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tempfile::TempDir;

/// Write a ZIP archive with the given (name, contents) entries
pub fn write_zip(path: &Path, entries: &[(&str, &[u8])]) {
    let file = std::fs::File::create(path).unwrap();
    let mut zip = zip::ZipWriter::new(file);
    let options: zip::write::SimpleFileOptions = zip::write::FileOptions::default();
    for (name, data) in entries {
        zip.start_file(*name, options).unwrap();
        zip.write_all(data).unwrap();
    }
    zip.finish().unwrap();
}

/// Build a ZIP archive in memory
pub fn zip_bytes(entries: &[(&str, &[u8])]) -> Vec<u8> {
    let mut zip = zip::ZipWriter::new(std::io::Cursor::new(Vec::new()));
    let options: zip::write::SimpleFileOptions = zip::write::FileOptions::default();
    for (name, data) in entries {
        zip.start_file(*name, options).unwrap();
        zip.write_all(data).unwrap();
    }
    zip.finish().unwrap().into_inner()
}

/// Activated config rooted in `dir` that deletes archives permanently
pub fn test_config(dir: &Path) -> Config {
    Config {
        activated: true,
        download_dir: dir.join("downloads"),
        passwordfile: dir.join("passwords.txt"),
        deltotrash: false,
        ..Default::default()
    }
}

/// A manager with the ZIP backend over in-memory collaborators
pub struct TestEnv {
    pub manager: ExtractionManager,
    pub registry: Arc<MemoryRegistry>,
    pub config: Config,
    pub dir: TempDir,
}

impl TestEnv {
    /// Environment with an in-memory queue store
    pub fn new(configure: impl FnOnce(&mut Config)) -> Self {
        let dir = tempfile::tempdir().unwrap();
        Self::with_store(dir, Arc::new(MemoryStore::new()), configure)
    }

    /// Environment over an existing temp dir and queue store
    pub fn with_store(
        dir: TempDir,
        store: Arc<dyn KeyValueStore>,
        configure: impl FnOnce(&mut Config),
    ) -> Self {
        let mut config = test_config(dir.path());
        configure(&mut config);
        std::fs::create_dir_all(&config.download_dir).unwrap();

        let registry = Arc::new(MemoryRegistry::new());
        let manager = ExtractionManager::with_extractors(
            config.clone(),
            store,
            registry.clone(),
            registry.clone(),
            vec![Arc::new(ZipExtractor::new())],
        );

        Self {
            manager,
            registry,
            config,
            dir,
        }
    }

    /// Download folder of a package
    pub fn package_dir(&self, folder: &str) -> PathBuf {
        self.config.download_dir.join(folder)
    }

    /// Write files into a package folder and register the package
    pub async fn add_package(&self, id: i64, folder: &str, files: &[(&str, Vec<u8>)]) {
        let dir = self.package_dir(folder);
        std::fs::create_dir_all(&dir).unwrap();

        let mut package_files = Vec::new();
        for (i, (name, contents)) in files.iter().enumerate() {
            std::fs::write(dir.join(name), contents).unwrap();
            package_files.push(PackageFile {
                id: FileId(id * 100 + i as i64),
                name: name.to_string(),
                status: FileStatus::Queued,
            });
        }

        self.registry
            .insert_package(Package {
                id: PackageId(id),
                name: folder.to_string(),
                folder: folder.to_string(),
                password: String::new(),
                destination: String::new(),
                files: package_files,
            })
            .await;
    }
}
