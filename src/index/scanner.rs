//! Folder enumeration and reconciliation diffing
//!
//! Enumeration goes through the [`FileEnumerator`] trait so tests can
//! inject synthetic listings. The default scanner walks the tree with
//! std and skips hidden and system files (leading dot). Diffing is
//! plain set difference: `new = found − known`, `stale = known − found`.

use crate::error::{ScanError, ScanResult};
use std::collections::HashSet;
use std::fs;
use std::path::{Path, PathBuf};

/// Lists the files below a folder as relative paths
pub trait FileEnumerator {
    fn list(&self, folder: &Path, recursive: bool) -> ScanResult<Vec<PathBuf>>;
}

/// Default enumerator walking the local filesystem
#[derive(Debug, Default)]
pub struct FileScanner;

impl FileScanner {
    fn walk(root: &Path, dir: &Path, recursive: bool, out: &mut Vec<PathBuf>) -> ScanResult<()> {
        for entry in fs::read_dir(dir)? {
            let entry = entry?;
            let path = entry.path();
            if is_hidden(&path) {
                continue;
            }
            let file_type = entry.file_type()?;
            if file_type.is_dir() {
                if recursive {
                    Self::walk(root, &path, recursive, out)?;
                }
            } else if file_type.is_file() {
                if let Ok(relative) = path.strip_prefix(root) {
                    out.push(relative.to_path_buf());
                }
            }
        }
        Ok(())
    }
}

impl FileEnumerator for FileScanner {
    fn list(&self, folder: &Path, recursive: bool) -> ScanResult<Vec<PathBuf>> {
        if !folder.is_dir() {
            return Err(ScanError::NotADirectory(folder.to_path_buf()));
        }
        let mut files = Vec::new();
        Self::walk(folder, folder, recursive, &mut files)?;
        Ok(files)
    }
}

fn is_hidden(path: &Path) -> bool {
    path.file_name()
        .and_then(|name| name.to_str())
        .map(|name| name.starts_with('.'))
        .unwrap_or(false)
}

/// Set difference between the folder's current file list and the
/// persisted one: (new files to ingest, stale entries to remove)
pub fn compare(found: &[PathBuf], known: &[PathBuf]) -> (Vec<PathBuf>, Vec<PathBuf>) {
    let found_set: HashSet<&PathBuf> = found.iter().collect();
    let known_set: HashSet<&PathBuf> = known.iter().collect();

    let new_files = found
        .iter()
        .filter(|file| !known_set.contains(*file))
        .cloned()
        .collect();
    let stale = known
        .iter()
        .filter(|file| !found_set.contains(*file))
        .cloned()
        .collect();
    (new_files, stale)
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::fs::File;
    use tempfile::tempdir;

    #[test]
    fn test_lists_relative_paths_recursively() {
        let dir = tempdir().unwrap();
        File::create(dir.path().join("a.dcm")).unwrap();
        fs::create_dir(dir.path().join("sub")).unwrap();
        File::create(dir.path().join("sub").join("b.dcm")).unwrap();

        let mut files = FileScanner.list(dir.path(), true).unwrap();
        files.sort();
        assert_eq!(
            files,
            vec![PathBuf::from("a.dcm"), PathBuf::from("sub/b.dcm")]
        );
    }

    #[test]
    fn test_skips_hidden_files_and_dirs() {
        let dir = tempdir().unwrap();
        File::create(dir.path().join(".DS_Store")).unwrap();
        fs::create_dir(dir.path().join(".git")).unwrap();
        File::create(dir.path().join(".git").join("config")).unwrap();
        File::create(dir.path().join("scan.dcm")).unwrap();

        let files = FileScanner.list(dir.path(), true).unwrap();
        assert_eq!(files, vec![PathBuf::from("scan.dcm")]);
    }

    #[test]
    fn test_non_recursive_skips_subdirs() {
        let dir = tempdir().unwrap();
        fs::create_dir(dir.path().join("sub")).unwrap();
        File::create(dir.path().join("sub").join("b.dcm")).unwrap();

        let files = FileScanner.list(dir.path(), false).unwrap();
        assert!(files.is_empty());
    }

    #[test]
    fn test_compare() {
        let found: Vec<PathBuf> = ["b", "c", "d"].iter().map(PathBuf::from).collect();
        let known: Vec<PathBuf> = ["a", "b", "c"].iter().map(PathBuf::from).collect();

        let (new_files, stale) = compare(&found, &known);
        assert_eq!(new_files, vec![PathBuf::from("d")]);
        assert_eq!(stale, vec![PathBuf::from("a")]);
    }
}
