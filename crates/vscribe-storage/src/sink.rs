//! Result artifact sinks.
//!
//! The worker writes its finished workbook through a `ResultSink`:
//! the object store in production, the local filesystem in
//! development. The two are never mixed at runtime.

use std::path::{Path, PathBuf};

use async_trait::async_trait;
use tracing::info;

use crate::client::R2Client;
use crate::error::{StorageError, StorageResult};

/// Content type of the result workbook.
pub const XLSX_CONTENT_TYPE: &str =
    "application/vnd.openxmlformats-officedocument.spreadsheetml.sheet";

/// Destination for finished result artifacts.
#[async_trait]
pub trait ResultSink: Send + Sync {
    /// Store the artifact under `key` and return the key.
    async fn store(&self, key: &str, path: &Path) -> StorageResult<String>;

    /// Load the artifact bytes for `key` (dev download endpoint).
    async fn load(&self, key: &str) -> StorageResult<Vec<u8>>;
}

/// Production sink: the R2 bucket.
#[derive(Clone)]
pub struct R2ResultSink {
    client: R2Client,
}

impl R2ResultSink {
    pub fn new(client: R2Client) -> Self {
        Self { client }
    }
}

#[async_trait]
impl ResultSink for R2ResultSink {
    async fn store(&self, key: &str, path: &Path) -> StorageResult<String> {
        self.client.upload_file(path, key, XLSX_CONTENT_TYPE).await?;
        Ok(key.to_string())
    }

    async fn load(&self, key: &str) -> StorageResult<Vec<u8>> {
        self.client.download_bytes(key).await
    }
}

/// Development sink: a local directory mirroring the key layout.
#[derive(Clone)]
pub struct FsResultSink {
    root: PathBuf,
}

impl FsResultSink {
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self { root: root.into() }
    }

    fn path_for(&self, key: &str) -> PathBuf {
        self.root.join(key)
    }
}

#[async_trait]
impl ResultSink for FsResultSink {
    async fn store(&self, key: &str, path: &Path) -> StorageResult<String> {
        let dest = self.path_for(key);
        if let Some(parent) = dest.parent() {
            tokio::fs::create_dir_all(parent).await?;
        }
        tokio::fs::copy(path, &dest).await?;
        info!("Stored result at {}", dest.display());
        Ok(key.to_string())
    }

    async fn load(&self, key: &str) -> StorageResult<Vec<u8>> {
        let path = self.path_for(key);
        match tokio::fs::read(&path).await {
            Ok(bytes) => Ok(bytes),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
                Err(StorageError::not_found(key))
            }
            Err(e) => Err(e.into()),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    #[tokio::test]
    async fn test_fs_sink_roundtrip() {
        let dir = TempDir::new().unwrap();
        let sink = FsResultSink::new(dir.path());

        let artifact = dir.path().join("report.xlsx");
        tokio::fs::write(&artifact, b"workbook bytes").await.unwrap();

        let key = "results/u1/up-1/demo.xlsx";
        let stored = sink.store(key, &artifact).await.unwrap();
        assert_eq!(stored, key);

        let bytes = sink.load(key).await.unwrap();
        assert_eq!(bytes, b"workbook bytes");
    }

    #[tokio::test]
    async fn test_fs_sink_missing_key() {
        let dir = TempDir::new().unwrap();
        let sink = FsResultSink::new(dir.path());

        let err = sink.load("results/u1/none.xlsx").await.unwrap_err();
        assert!(err.is_not_found());
    }
}
