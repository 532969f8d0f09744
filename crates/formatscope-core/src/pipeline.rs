//! Parallel identification over files and directory trees.

use std::path::{Path, PathBuf};
use std::sync::Arc;

use ignore::WalkBuilder;
use rayon::iter::{ParallelBridge, ParallelIterator};
use tracing::debug;

use crate::config::ExcludeRule;
use crate::diagnostics::CoreResult;
use crate::engine::Engine;
use crate::format::FormatId;
use crate::signature::Classification;

/// Per-file outcome. Failures are reported per file; one unreadable file
/// never aborts the rest of the walk.
#[derive(Debug)]
pub struct PathReport<T> {
    pub path: PathBuf,
    pub result: CoreResult<T>,
}

impl<T> PathReport<T> {
    pub fn is_ok(&self) -> bool {
        self.result.is_ok()
    }
}

/// Signature classification of every file under `paths`, sorted by path.
pub fn classify_paths(
    engine: &Engine,
    paths: &[PathBuf],
) -> CoreResult<Vec<PathReport<Classification>>> {
    for_each_file(engine, paths, |engine, path| engine.classify_path(path))
}

/// Layered detection of every file under `paths`, sorted by path.
///
/// Reports carry the detected layers; the decoded streams are dropped.
pub fn detect_paths(
    engine: &Engine,
    paths: &[PathBuf],
) -> CoreResult<Vec<PathReport<Vec<FormatId>>>> {
    for_each_file(engine, paths, |engine, path| {
        engine.detect_path(path).map(|detection| detection.layers)
    })
}

fn for_each_file<T, F>(engine: &Engine, paths: &[PathBuf], op: F) -> CoreResult<Vec<PathReport<T>>>
where
    T: Send,
    F: Fn(&Engine, &Path) -> CoreResult<T> + Sync,
{
    let exclude_rules = Arc::new(engine.config().exclude_rules()?);

    let mut reports: Vec<PathReport<T>> = paths
        .iter()
        .flat_map(|root| walk(root, Arc::clone(&exclude_rules)))
        .par_bridge()
        .map(|path| {
            let result = op(engine, &path);
            PathReport { path, result }
        })
        .collect();
    reports.sort_by(|a, b| a.path.cmp(&b.path));

    debug!(files = reports.len(), "walk complete");
    Ok(reports)
}

/// Files under `root`, or `root` itself when it is not a directory.
///
/// An explicitly named file is never excluded. A missing root is still
/// yielded so that its read error lands in the report.
fn walk(root: &Path, rules: Arc<Vec<ExcludeRule>>) -> Box<dyn Iterator<Item = PathBuf> + Send> {
    if !root.is_dir() {
        return Box::new(std::iter::once(root.to_path_buf()));
    }

    let root_path = root.to_path_buf();
    let filter_root = root_path.clone();
    let filter_rules = Arc::clone(&rules);
    let files = WalkBuilder::new(root)
        .hidden(false)
        .git_ignore(true)
        .filter_entry(move |entry| {
            let entry_path = entry.path();
            if entry_path == filter_root || !entry.file_type().is_some_and(|ft| ft.is_dir()) {
                return true;
            }
            let rel_dir = normalize_rel_path(entry_path, &filter_root);
            !filter_rules.iter().any(|rule| rule.prunes_dir(&rel_dir))
        })
        .build()
        .filter_map(|entry| entry.ok())
        .filter(|entry| entry.file_type().is_some_and(|ft| ft.is_file()))
        .filter(move |entry| {
            let rel_path = normalize_rel_path(entry.path(), &root_path);
            !rules.iter().any(|rule| rule.excludes_file(&rel_path))
        })
        .map(|entry| entry.into_path());
    Box::new(files)
}

/// `entry_path` relative to `root`, `/`-separated, as exclude rules see it.
fn normalize_rel_path(entry_path: &Path, root: &Path) -> String {
    let rel_path = entry_path.strip_prefix(root).unwrap_or(entry_path);
    let path_str = rel_path.to_string_lossy().replace('\\', "/");
    match path_str.strip_prefix("./") {
        Some(stripped) => stripped.to_string(),
        None => path_str,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::ScopeConfig;
    use crate::diagnostics::CoreError;
    use std::fs;

    #[test]
    fn test_rel_paths_use_forward_slashes() {
        let root = Path::new("root");
        assert_eq!(normalize_rel_path(&root.join("a").join("b.zip"), root), "a/b.zip");
        assert_eq!(normalize_rel_path(Path::new("./x.bin"), Path::new("elsewhere")), "x.bin");
    }

    fn fixture() -> tempfile::TempDir {
        let dir = tempfile::tempdir().unwrap();
        fs::write(dir.path().join("b.zip"), b"PK\x03\x04rest of archive").unwrap();
        fs::write(dir.path().join("a.gz"), b"\x1f\x8b\x08\x00\x00\x00\x00\x00\x00\x03").unwrap();
        fs::create_dir(dir.path().join("skipped")).unwrap();
        fs::write(dir.path().join("skipped").join("c.pdf"), b"%PDF-1.7\n%%EOF").unwrap();
        fs::create_dir(dir.path().join("nested")).unwrap();
        fs::write(dir.path().join("nested").join("notes.txt"), b"plain words").unwrap();
        dir
    }

    #[test]
    fn test_classify_paths_walks_sorted_and_excludes() {
        let dir = fixture();
        let config = ScopeConfig::builder()
            .exclude(vec!["skipped/**".to_string()])
            .build()
            .unwrap();
        let engine = Engine::from_config(&config).unwrap();
        let reports = classify_paths(&engine, &[dir.path().to_path_buf()]).unwrap();

        let names: Vec<_> = reports
            .iter()
            .map(|r| normalize_rel_path(&r.path, dir.path()))
            .collect();
        assert_eq!(names, vec!["a.gz", "b.zip", "nested/notes.txt"]);
        assert!(reports.iter().all(PathReport::is_ok));

        let tags: Vec<_> = reports
            .iter()
            .map(|r| {
                let classification = r.result.as_ref().unwrap();
                classification.best().map(|hit| hit.format_id.tag.as_str().to_string())
            })
            .collect();
        assert_eq!(
            tags,
            vec![
                Some("gzip".to_string()),
                Some("zip".to_string()),
                Some("txt".to_string())
            ]
        );
    }

    #[test]
    fn test_detect_paths_reports_layers() {
        let dir = fixture();
        let engine = Engine::with_defaults().unwrap();
        let zip = dir.path().join("b.zip");
        let reports = detect_paths(&engine, &[zip.clone()]).unwrap();
        assert_eq!(reports.len(), 1);
        assert_eq!(reports[0].path, zip);
        assert_eq!(
            reports[0].result.as_ref().unwrap(),
            &vec![FormatId::tag_only("zip")]
        );
    }

    #[test]
    fn test_missing_path_is_reported_not_fatal() {
        let dir = fixture();
        let engine = Engine::with_defaults().unwrap();
        let missing = dir.path().join("missing.bin");
        let reports =
            classify_paths(&engine, &[missing.clone(), dir.path().join("b.zip")]).unwrap();
        assert_eq!(reports.len(), 2);
        let failed = reports.iter().find(|r| r.path == missing).unwrap();
        assert!(matches!(failed.result, Err(CoreError::FileRead { .. })));
    }

    #[test]
    fn test_explicit_file_is_not_excluded() {
        let dir = fixture();
        let config = ScopeConfig::builder()
            .exclude(vec!["**/*.zip".to_string()])
            .build()
            .unwrap();
        let engine = Engine::from_config(&config).unwrap();
        let reports = classify_paths(&engine, &[dir.path().join("b.zip")]).unwrap();
        assert_eq!(reports.len(), 1);
    }
}
