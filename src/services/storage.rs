//! On-disk storage for uploaded medical files.

use std::{
    io::ErrorKind,
    path::{Path, PathBuf},
};

use tokio::fs;
use uuid::Uuid;

use crate::errors::{AppError, AppResult};

#[derive(Debug, Clone)]
pub struct FileStorage {
    root: PathBuf,
}

/// A file written by [`FileStorage::store`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StoredFile {
    pub filename: String,
    pub path:     String,
}

impl FileStorage {
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self { root: root.into() }
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    /// Write `bytes` under a generated name that keeps the original extension.
    pub async fn store(&self, original_name: &str, bytes: &[u8]) -> AppResult<StoredFile> {
        fs::create_dir_all(&self.root).await
            .map_err(|e| AppError::internal(format!("Could not create upload dir: {e}")))?;

        let ext = Path::new(original_name)
            .extension()
            .and_then(|e| e.to_str())
            .filter(|e| !e.is_empty() && e.chars().all(|c| c.is_ascii_alphanumeric()))
            .map(|e| e.to_ascii_lowercase());

        let stem = format!("{}-{}", chrono::Utc::now().timestamp_millis(), Uuid::new_v4().simple());
        let filename = match ext {
            Some(ext) => format!("{stem}.{ext}"),
            None      => stem,
        };
        let path = self.root.join(&filename);

        fs::write(&path, bytes).await
            .map_err(|e| AppError::internal(format!("Write failed: {e}")))?;

        Ok(StoredFile { filename, path: path.to_string_lossy().into_owned() })
    }

    pub async fn exists(&self, path: &str) -> bool {
        fs::try_exists(path).await.unwrap_or(false)
    }

    pub async fn open(&self, path: &str) -> AppResult<fs::File> {
        match fs::File::open(path).await {
            Ok(file) => Ok(file),
            Err(e) if e.kind() == ErrorKind::NotFound => Err(AppError::NotFound("File")),
            Err(e) => Err(AppError::internal(format!("Open failed: {e}"))),
        }
    }

    /// Remove a stored file. A file that is already gone counts as removed.
    pub async fn remove(&self, path: &str) -> AppResult<()> {
        match fs::remove_file(path).await {
            Ok(()) => Ok(()),
            Err(e) if e.kind() == ErrorKind::NotFound => Ok(()),
            Err(e) => Err(AppError::internal(format!("Remove failed: {e}"))),
        }
    }
}

#[cfg(test)]
pub(crate) mod tests {
    use super::*;

    /// Fresh storage rooted in a unique directory under the system temp dir.
    pub(crate) fn temp_storage() -> FileStorage {
        FileStorage::new(std::env::temp_dir().join(format!("hospital-files-{}", Uuid::new_v4())))
    }

    #[tokio::test]
    async fn store_keeps_extension_and_content() {
        let storage = temp_storage();
        let stored = storage.store("Exame Sangue.PDF", b"%PDF-1.7").await.unwrap();

        assert!(stored.filename.ends_with(".pdf"));
        assert!(storage.exists(&stored.path).await);
        assert_eq!(fs::read(&stored.path).await.unwrap(), b"%PDF-1.7");

        let _ = fs::remove_dir_all(storage.root()).await;
    }

    #[tokio::test]
    async fn names_never_collide() {
        let storage = temp_storage();
        let a = storage.store("x.png", b"a").await.unwrap();
        let b = storage.store("x.png", b"b").await.unwrap();
        assert_ne!(a.path, b.path);
        let _ = fs::remove_dir_all(storage.root()).await;
    }

    #[tokio::test]
    async fn remove_is_idempotent() {
        let storage = temp_storage();
        let stored = storage.store("notes", b"hello").await.unwrap();
        storage.remove(&stored.path).await.unwrap();
        storage.remove(&stored.path).await.unwrap();
        assert!(!storage.exists(&stored.path).await);
        assert!(matches!(storage.open(&stored.path).await, Err(AppError::NotFound(_))));
        let _ = fs::remove_dir_all(storage.root()).await;
    }
}
