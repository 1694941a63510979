use super::*;
use crate::types::{FileId, Target};

fn targets(dir: &Path, names: &[&str]) -> Vec<Target> {
    let mut targets: Vec<Target> = names
        .iter()
        .enumerate()
        .map(|(i, name)| Target::new(FileId(i as i64), dir.join(name), dir))
        .collect();
    targets.sort_by(|a, b| a.path.cmp(&b.path));
    targets
}

#[test]
fn default_extractors_are_in_priority_order() {
    let names: Vec<&str> = default_extractors(&Config::default())
        .iter()
        .map(|e| e.name())
        .collect();
    assert_eq!(names, vec!["UnRar", "SevenZip", "Zip", "Tar"]);
}

#[test]
fn nfo_is_never_a_target() {
    let dir = Path::new("/downloads/pack");
    let candidates = targets(dir, &["readme.nfo", "movie.zip", "movie.part1.rar"]);
    let extensions = Config::default().extension_list();

    for extractor in default_extractors(&Config::default()) {
        let selected = extractor.get_targets(&candidates);
        assert!(
            selected.iter().all(|t| !t.path.ends_with("readme.nfo")),
            "{} selected readme.nfo",
            extractor.name()
        );
        assert!(
            extractor
                .archive_type(&dir.join("readme.nfo"))
                .is_none_or(|tag| !extensions.iter().any(|e| e == tag))
        );
    }
}

#[test]
fn each_backend_claims_its_own_formats() {
    let dir = Path::new("/downloads/pack");
    let candidates = targets(dir, &["a.7z", "b.zip", "c.tar.gz", "d.rar", "d.r00"]);
    let extractors = default_extractors(&Config::default());

    let claimed: Vec<Vec<PathBuf>> = extractors
        .iter()
        .map(|e| e.get_targets(&candidates).into_iter().map(|t| t.path).collect())
        .collect();

    assert_eq!(claimed[0], vec![dir.join("d.rar")]);
    assert_eq!(claimed[1], vec![dir.join("a.7z")]);
    assert_eq!(claimed[2], vec![dir.join("b.zip")]);
    assert_eq!(claimed[3], vec![dir.join("c.tar.gz")]);
}

#[test]
fn member_path_rejects_escaping_names() {
    let dest = Path::new("/out");
    assert_eq!(member_path(dest, "../etc/passwd", true), None);
    assert_eq!(member_path(dest, "/etc/passwd", true), None);
    assert_eq!(member_path(dest, "", true), None);
    assert_eq!(
        member_path(dest, "a/./b.txt", true),
        Some(PathBuf::from("/out/a/b.txt"))
    );
    assert_eq!(
        member_path(dest, "a\\b.txt", true),
        Some(PathBuf::from("/out/a/b.txt"))
    );
}

#[test]
fn member_path_without_fullpath_keeps_file_name() {
    assert_eq!(
        member_path(Path::new("/out"), "deep/dir/file.bin", false),
        Some(PathBuf::from("/out/file.bin"))
    );
}

#[test]
fn exclude_patterns_match_name_or_file_name() {
    let options = ArchiveOptions::from_config(&Config::default());
    assert!(options.is_excluded("info.nfo"));
    assert!(options.is_excluded("sub/info.nfo"));
    assert!(options.is_excluded("thumb.db"));
    assert!(!options.is_excluded("movie.mkv"));
}

#[test]
fn options_follow_config() {
    let config = Config {
        fullpath: false,
        overwrite: true,
        keepbroken: true,
        priority: 5,
        excludefiles: "*.txt".to_string(),
        ..Default::default()
    };
    let options = ArchiveOptions::from_config(&config);
    assert!(!options.fullpath);
    assert!(options.overwrite);
    assert!(options.keepbroken);
    assert_eq!(options.priority, 5);
    assert_eq!(options.excludefiles, vec!["*.txt"]);
}

#[test]
fn stage_result_is_ok_only_for_ok() {
    assert!(StageResult::Ok.is_ok());
    assert!(!StageResult::WrongPassword.is_ok());
    assert!(!StageResult::Corrupt("crc".into()).is_ok());
    assert!(!StageResult::Structural("io".into()).is_ok());
}
