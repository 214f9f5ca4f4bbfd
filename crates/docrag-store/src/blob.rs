//! Filesystem blob store for uploaded files.

use std::path::{Component, Path, PathBuf};

use async_trait::async_trait;
use tracing::debug;

use docrag_core::{BlobStore, RagError, Result};

/// Stores blobs as files under a root directory, addressed by relative key.
pub struct FsBlobStore {
    root: PathBuf,
}

impl FsBlobStore {
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self { root: root.into() }
    }

    /// Root directory of the store.
    pub fn root(&self) -> &Path {
        &self.root
    }

    /// Resolve a key to a path, rejecting keys that escape the root.
    fn path_for(&self, key: &str) -> Result<PathBuf> {
        let relative = Path::new(key);
        let valid = !key.is_empty()
            && relative
                .components()
                .all(|c| matches!(c, Component::Normal(_)));

        if !valid {
            return Err(RagError::invalid_argument(format!("invalid blob key '{}'", key)));
        }
        Ok(self.root.join(relative))
    }
}

#[async_trait]
impl BlobStore for FsBlobStore {
    async fn read(&self, key: &str) -> Result<Vec<u8>> {
        let path = self.path_for(key)?;
        tokio::fs::read(&path)
            .await
            .map_err(|e| RagError::blob(format!("Failed to read blob '{}': {}", key, e)))
    }

    async fn write(&self, key: &str, bytes: &[u8]) -> Result<()> {
        let path = self.path_for(key)?;
        if let Some(parent) = path.parent() {
            tokio::fs::create_dir_all(parent).await?;
        }

        tokio::fs::write(&path, bytes)
            .await
            .map_err(|e| RagError::blob(format!("Failed to write blob '{}': {}", key, e)))?;

        debug!("Stored blob {} ({} bytes)", key, bytes.len());
        Ok(())
    }

    async fn delete(&self, key: &str) -> Result<()> {
        let path = self.path_for(key)?;
        match tokio::fs::remove_file(&path).await {
            Ok(()) => {
                debug!("Deleted blob {}", key);
                Ok(())
            }
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(()),
            Err(e) => Err(RagError::blob(format!("Failed to delete blob '{}': {}", key, e))),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_write_read_delete() {
        let dir = tempfile::tempdir().unwrap();
        let blobs = FsBlobStore::new(dir.path());

        blobs.write("documents/a/notes.txt", b"hello").await.unwrap();
        assert_eq!(blobs.read("documents/a/notes.txt").await.unwrap(), b"hello");

        blobs.delete("documents/a/notes.txt").await.unwrap();
        assert!(blobs.read("documents/a/notes.txt").await.is_err());

        // Deleting again is fine
        blobs.delete("documents/a/notes.txt").await.unwrap();
    }

    #[tokio::test]
    async fn test_rejects_escaping_keys() {
        let dir = tempfile::tempdir().unwrap();
        let blobs = FsBlobStore::new(dir.path());

        for key in ["", "../outside.txt", "/etc/passwd", "a/../../b"] {
            let err = blobs.write(key, b"x").await.unwrap_err();
            assert!(matches!(err, RagError::InvalidArgument { .. }), "key {:?}", key);
        }
    }
}
