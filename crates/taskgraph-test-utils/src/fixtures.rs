use std::path::{Path, PathBuf};

use tempfile::TempDir;

/// Write `content` to `dir/name` and return the path.
pub fn write_file(dir: &Path, name: &str, content: &str) -> PathBuf {
    let path = dir.join(name);
    std::fs::write(&path, content).expect("write fixture file");
    path
}

/// A fresh temp dir holding one file. Keep the `TempDir` alive while the
/// path is in use.
pub fn temp_file(name: &str, content: &str) -> (TempDir, PathBuf) {
    let dir = tempfile::tempdir().expect("create temp dir");
    let path = write_file(dir.path(), name, content);
    (dir, path)
}
