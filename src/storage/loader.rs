// src/storage/loader.rs
//! Byte-stream loader for local and `file://` sources

use crate::storage::paths;
use crate::storage::Loader;
use crate::utils::errors::{RecorderError, Result};
use async_trait::async_trait;
use std::path::PathBuf;
use tokio::fs::File;
use tokio::io::AsyncRead;
use tracing::debug;

/// Loads `local://`, `file://` and bare filesystem locations
#[derive(Debug, Clone, Default)]
pub struct LocalLoader;

impl LocalLoader {
    pub fn new() -> Self {
        Self
    }
}

#[async_trait]
impl Loader for LocalLoader {
    async fn load(&self, url: &str) -> Result<Box<dyn AsyncRead + Send + Unpin>> {
        let path = match url.strip_prefix("file://") {
            Some(path) => PathBuf::from(path),
            None => paths::local_path(url).ok_or_else(|| {
                RecorderError::StorageFailed(format!("Unsupported source location: {}", url))
            })?,
        };

        debug!("Loading {:?}", path);

        let file = File::open(&path).await.map_err(|e| {
            if e.kind() == std::io::ErrorKind::NotFound {
                RecorderError::NotFound(url.to_string())
            } else {
                RecorderError::Io(e)
            }
        })?;

        Ok(Box::new(file))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tokio::io::AsyncReadExt;

    #[tokio::test]
    async fn test_load_local_and_file_urls() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("a.warc");
        tokio::fs::write(&path, b"WARC/1.0").await.unwrap();

        let loader = LocalLoader::new();
        for url in [
            paths::add_local_store_prefix(&path),
            format!("file://{}", path.display()),
        ] {
            let mut reader = loader.load(&url).await.unwrap();
            let mut buf = Vec::new();
            reader.read_to_end(&mut buf).await.unwrap();
            assert_eq!(buf, b"WARC/1.0");
        }
    }

    #[tokio::test]
    async fn test_load_errors() {
        let loader = LocalLoader::new();
        assert!(matches!(
            loader.load("local:///nonexistent/a.warc").await,
            Err(RecorderError::NotFound(_))
        ));
        assert!(matches!(
            loader.load("s3://bucket/a.warc").await,
            Err(RecorderError::StorageFailed(_))
        ));
    }
}
