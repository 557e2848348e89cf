use std::path::{Path, PathBuf};

use futures::future::BoxFuture;
use tokio::io::AsyncWriteExt;
use tracing::debug;

use taskgraph_core::error::{Result, TaskgraphError};
use taskgraph_core::traits::FileStore;

/// `FileStore` on the local filesystem.
///
/// Relative paths resolve against the store's base directory.
pub struct LocalFileStore {
    base_dir: PathBuf,
}

impl LocalFileStore {
    pub fn new(base_dir: impl Into<PathBuf>) -> Self {
        Self {
            base_dir: base_dir.into(),
        }
    }

    fn resolve(&self, p: &Path) -> PathBuf {
        if p.is_absolute() {
            p.to_path_buf()
        } else {
            self.base_dir.join(p)
        }
    }
}

fn failure(path: &Path, e: std::io::Error) -> TaskgraphError {
    TaskgraphError::IntegrationFailure {
        integration: "file".into(),
        message: format!("{}: {}", path.display(), e),
    }
}

async fn create_parent(path: &Path) -> Result<()> {
    if let Some(parent) = path.parent() {
        if !parent.as_os_str().is_empty() {
            tokio::fs::create_dir_all(parent)
                .await
                .map_err(|e| failure(parent, e))?;
        }
    }
    Ok(())
}

impl FileStore for LocalFileStore {
    fn read(&self, path: PathBuf) -> BoxFuture<'_, Result<String>> {
        Box::pin(async move {
            let path = self.resolve(&path);
            debug!(path = %path.display(), "Reading file");
            tokio::fs::read_to_string(&path)
                .await
                .map_err(|e| failure(&path, e))
        })
    }

    fn write(&self, path: PathBuf, content: String) -> BoxFuture<'_, Result<usize>> {
        Box::pin(async move {
            let path = self.resolve(&path);
            debug!(path = %path.display(), "Writing file");
            create_parent(&path).await?;
            tokio::fs::write(&path, content.as_bytes())
                .await
                .map_err(|e| failure(&path, e))?;
            Ok(content.len())
        })
    }

    fn append(&self, path: PathBuf, content: String) -> BoxFuture<'_, Result<usize>> {
        Box::pin(async move {
            let path = self.resolve(&path);
            debug!(path = %path.display(), "Appending to file");
            create_parent(&path).await?;
            let mut file = tokio::fs::OpenOptions::new()
                .create(true)
                .append(true)
                .open(&path)
                .await
                .map_err(|e| failure(&path, e))?;
            file.write_all(content.as_bytes())
                .await
                .map_err(|e| failure(&path, e))?;
            file.flush().await.map_err(|e| failure(&path, e))?;
            Ok(content.len())
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn write_then_read_relative() {
        let dir = tempfile::tempdir().unwrap();
        let store = LocalFileStore::new(dir.path());

        let written = store
            .write("out/report.txt".into(), "hello".into())
            .await
            .unwrap();
        assert_eq!(written, 5);

        let content = store.read("out/report.txt".into()).await.unwrap();
        assert_eq!(content, "hello");
        assert!(dir.path().join("out/report.txt").exists());
    }

    #[tokio::test]
    async fn append_creates_and_extends() {
        let dir = tempfile::tempdir().unwrap();
        let store = LocalFileStore::new(dir.path());

        store.append("log.txt".into(), "one\n".into()).await.unwrap();
        let n = store.append("log.txt".into(), "two\n".into()).await.unwrap();
        assert_eq!(n, 4);

        let content = store.read("log.txt".into()).await.unwrap();
        assert_eq!(content, "one\ntwo\n");
    }

    #[tokio::test]
    async fn missing_file_is_integration_failure() {
        let dir = tempfile::tempdir().unwrap();
        let store = LocalFileStore::new(dir.path());

        let err = store.read("nope.txt".into()).await.unwrap_err();
        assert!(matches!(
            err,
            TaskgraphError::IntegrationFailure { ref integration, .. } if integration == "file"
        ));
    }

    #[tokio::test]
    async fn absolute_paths_bypass_base_dir() {
        let dir = tempfile::tempdir().unwrap();
        let store = LocalFileStore::new("/definitely/not/here");
        let target = dir.path().join("abs.txt");

        store
            .write(target.clone(), "abs".into())
            .await
            .unwrap();
        assert_eq!(std::fs::read_to_string(target).unwrap(), "abs");
    }
}
