// src/storage/mod.rs
//! Remote storage and byte loading
//!
//! - **Storage**: upload / lookup / delete contract of a remote backend
//! - **Loader**: opens a byte stream for a local or remote location
//! - **DirectoryStorage**: filesystem backend with a SQLite upload ledger
//! - **LocalLoader**: loader for `local://`, `file://` and bare paths
//! - **paths**: local-store location markers

pub mod directory;
pub mod loader;
pub mod paths;

pub use directory::{DirectoryStorage, StorageStats, UploadRecord};
pub use loader::LocalLoader;

use crate::recording::{Collection, User};
use crate::utils::errors::Result;
use async_trait::async_trait;
use std::fmt;
use std::path::Path;
use tokio::io::AsyncRead;

/// Kind of file being committed
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum FileKind {
    /// Derived index file, never held open by a writer
    Index,

    /// Capture file, possibly still open in a writer
    Warc,
}

impl FileKind {
    /// Storage folder name for this kind
    pub fn as_str(&self) -> &'static str {
        match self {
            FileKind::Index => "indexes",
            FileKind::Warc => "warcs",
        }
    }
}

impl fmt::Display for FileKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Remote storage backend
///
/// Uploads may complete asynchronously: `upload_file` returning `true` only
/// means the backend accepted the file, `get_upload_url` reports when it is
/// actually retrievable.
#[async_trait]
pub trait Storage: Send + Sync + 'static {
    /// Start uploading a local file. Returns false if the backend rejected it.
    async fn upload_file(
        &self,
        user: &dyn User,
        collection: &dyn Collection,
        recording_id: &str,
        filename: &str,
        local_path: &Path,
        kind: FileKind,
    ) -> bool;

    /// Remote URL of an uploaded file, once available
    async fn get_upload_url(&self, filename: &str) -> Option<String>;

    /// Delete a file by its registry location (local or remote)
    async fn delete_file(&self, location: &str) -> bool;
}

/// Opens byte streams for copy operations
#[async_trait]
pub trait Loader: Send + Sync + 'static {
    async fn load(&self, url: &str) -> Result<Box<dyn AsyncRead + Send + Unpin>>;
}
