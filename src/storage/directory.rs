// src/storage/directory.rs
//! Directory-backed storage
//!
//! Committed files are copied under `<base_dir>/<kind>/<recording>/` and every
//! upload is recorded in a SQLite ledger, which is what `get_upload_url`
//! consults. A filename looked up without its recording resolves to the most
//! recent upload of that name.

use crate::recording::{Collection, User};
use crate::storage::{paths, FileKind, Storage};
use crate::utils::config::StorageConfig;
use crate::utils::errors::{RecorderError, Result};
use async_trait::async_trait;
use rusqlite::{params, Connection, OptionalExtension};
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tokio::fs;
use tokio::sync::Mutex;
use tracing::{debug, info, warn};

/// Storage backend writing into a local directory tree
pub struct DirectoryStorage {
    config: StorageConfig,
    db: Arc<Mutex<Connection>>,
}

impl DirectoryStorage {
    /// Create the directory tree and open the upload ledger
    pub async fn new(config: StorageConfig) -> Result<Self> {
        for kind in [FileKind::Warc, FileKind::Index] {
            fs::create_dir_all(config.base_dir.join(kind.as_str()))
                .await
                .map_err(|e| {
                    RecorderError::StorageFailed(format!("Failed to create directory: {}", e))
                })?;
        }

        let db_path = config.base_dir.join(&config.db_name);
        let conn = Connection::open(&db_path).map_err(|e| {
            RecorderError::StorageFailed(format!("Failed to open database: {}", e))
        })?;

        let storage = Self {
            config,
            db: Arc::new(Mutex::new(conn)),
        };

        storage.init_schema().await?;

        info!("Directory storage initialized at {:?}", storage.config.base_dir);

        Ok(storage)
    }

    async fn init_schema(&self) -> Result<()> {
        let db = self.db.lock().await;

        db.execute(
            r#"
            CREATE TABLE IF NOT EXISTS uploads (
                id INTEGER PRIMARY KEY AUTOINCREMENT,
                filename TEXT NOT NULL,
                kind TEXT NOT NULL,
                collection TEXT NOT NULL,
                recording TEXT NOT NULL,
                remote_path TEXT NOT NULL,
                size INTEGER NOT NULL,
                created_at INTEGER NOT NULL,
                UNIQUE (recording, filename)
            )
            "#,
            [],
        )
        .map_err(|e| RecorderError::StorageFailed(format!("Schema creation failed: {}", e)))?;

        Ok(())
    }

    /// Base directory of this backend
    pub fn base_dir(&self) -> &Path {
        &self.config.base_dir
    }

    fn remote_path(&self, kind: FileKind, recording: &str, filename: &str) -> PathBuf {
        self.config
            .base_dir
            .join(kind.as_str())
            .join(recording)
            .join(filename)
    }

    fn remote_url(path: &Path) -> String {
        format!("file://{}", path.to_string_lossy().replace(std::path::MAIN_SEPARATOR, "/"))
    }

    async fn copy_in(
        &self,
        local_path: &Path,
        kind: FileKind,
        recording: &str,
        filename: &str,
    ) -> Result<(PathBuf, u64)> {
        if !is_single_component(recording) || !is_single_component(filename) {
            return Err(RecorderError::StorageFailed(format!(
                "Invalid storage name: {}/{}",
                recording, filename
            )));
        }

        let target = self.remote_path(kind, recording, filename);
        if let Some(parent) = target.parent() {
            fs::create_dir_all(parent).await.map_err(|e| {
                RecorderError::StorageFailed(format!("Failed to create directory: {}", e))
            })?;
        }
        let size = fs::copy(local_path, &target).await.map_err(|e| {
            RecorderError::StorageFailed(format!("Failed to copy {:?}: {}", local_path, e))
        })?;
        Ok((target, size))
    }

    async fn record_upload(
        &self,
        filename: &str,
        kind: FileKind,
        collection: &str,
        recording: &str,
        remote_path: &Path,
        size: u64,
    ) -> Result<()> {
        let db = self.db.lock().await;
        db.execute(
            r#"
            INSERT OR REPLACE INTO uploads (filename, kind, collection, recording, remote_path, size, created_at)
            VALUES (?, ?, ?, ?, ?, ?, ?)
            "#,
            params![
                filename,
                kind.as_str(),
                collection,
                recording,
                remote_path.to_string_lossy().into_owned(),
                size as i64,
                chrono::Utc::now().timestamp(),
            ],
        )
        .map_err(|e| RecorderError::StorageFailed(format!("Failed to record upload: {}", e)))?;
        Ok(())
    }

    /// List all recorded uploads
    pub async fn list_uploads(&self) -> Result<Vec<UploadRecord>> {
        let db = self.db.lock().await;

        let mut stmt = db
            .prepare(
                "SELECT filename, kind, collection, recording, remote_path, size, created_at FROM uploads ORDER BY id",
            )
            .map_err(|e| {
                RecorderError::StorageFailed(format!("Query preparation failed: {}", e))
            })?;

        let uploads = stmt
            .query_map([], |row| {
                Ok(UploadRecord {
                    filename: row.get(0)?,
                    kind: row.get(1)?,
                    collection: row.get(2)?,
                    recording: row.get(3)?,
                    remote_path: row.get(4)?,
                    size: row.get(5)?,
                    created_at: row.get(6)?,
                })
            })
            .map_err(|e| RecorderError::StorageFailed(format!("Query execution failed: {}", e)))?
            .collect::<std::result::Result<Vec<_>, _>>()
            .map_err(|e| {
                RecorderError::StorageFailed(format!("Result collection failed: {}", e))
            })?;

        Ok(uploads)
    }

    /// Get storage statistics
    pub async fn stats(&self) -> Result<StorageStats> {
        let db = self.db.lock().await;

        let (total_files, total_size): (i64, i64) = db
            .query_row(
                "SELECT COUNT(*), COALESCE(SUM(size), 0) FROM uploads",
                [],
                |row| Ok((row.get(0)?, row.get(1)?)),
            )
            .map_err(|e| RecorderError::StorageFailed(format!("Stats query failed: {}", e)))?;

        Ok(StorageStats {
            total_files: total_files as u64,
            total_size_bytes: total_size as u64,
        })
    }
}

#[async_trait]
impl Storage for DirectoryStorage {
    async fn upload_file(
        &self,
        _user: &dyn User,
        collection: &dyn Collection,
        recording_id: &str,
        filename: &str,
        local_path: &Path,
        kind: FileKind,
    ) -> bool {
        let (target, size) = match self.copy_in(local_path, kind, recording_id, filename).await {
            Ok(copied) => copied,
            Err(e) => {
                warn!("Upload of {} failed: {}", filename, e);
                return false;
            }
        };

        if let Err(e) = self
            .record_upload(filename, kind, collection.id(), recording_id, &target, size)
            .await
        {
            warn!("Upload of {} not recorded: {}", filename, e);
            let _ = fs::remove_file(&target).await;
            return false;
        }

        debug!("Stored {} ({} bytes) at {:?}", filename, size, target);
        true
    }

    async fn get_upload_url(&self, filename: &str) -> Option<String> {
        let db = self.db.lock().await;
        let remote_path: Option<String> = db
            .query_row(
                "SELECT remote_path FROM uploads WHERE filename = ? ORDER BY id DESC LIMIT 1",
                params![filename],
                |row| row.get(0),
            )
            .optional()
            .unwrap_or_else(|e| {
                warn!("Upload lookup for {} failed: {}", filename, e);
                None
            });

        remote_path.map(|path| Self::remote_url(Path::new(&path)))
    }

    async fn delete_file(&self, location: &str) -> bool {
        if let Some(path) = paths::local_path(location) {
            return match fs::remove_file(&path).await {
                Ok(()) => true,
                Err(e) => {
                    warn!("Failed to delete local file {:?}: {}", path, e);
                    false
                }
            };
        }

        let Some(remote) = location.strip_prefix("file://") else {
            warn!("Not a location of this storage: {}", location);
            return false;
        };
        let remote = PathBuf::from(remote);
        if !remote.starts_with(&self.config.base_dir) {
            warn!("Refusing to delete outside storage root: {}", location);
            return false;
        }

        if let Err(e) = fs::remove_file(&remote).await {
            warn!("Failed to delete {:?}: {}", remote, e);
            return false;
        }

        let db = self.db.lock().await;
        if let Err(e) = db.execute(
            "DELETE FROM uploads WHERE remote_path = ?",
            params![remote.to_string_lossy().into_owned()],
        ) {
            warn!("Failed to remove ledger entry for {:?}: {}", remote, e);
        }
        true
    }
}

fn is_single_component(name: &str) -> bool {
    let mut components = Path::new(name).components();
    matches!(
        (components.next(), components.next()),
        (Some(std::path::Component::Normal(_)), None)
    )
}

/// One row of the upload ledger
#[derive(Debug, Clone)]
pub struct UploadRecord {
    pub filename: String,
    pub kind: String,
    pub collection: String,
    pub recording: String,
    pub remote_path: String,
    pub size: i64,
    pub created_at: i64,
}

/// Storage statistics
#[derive(Debug, Clone)]
pub struct StorageStats {
    pub total_files: u64,
    pub total_size_bytes: u64,
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::testing::{TestCollection, TestUser};
    use tempfile::tempdir;

    async fn storage_in(dir: &Path) -> DirectoryStorage {
        let config = StorageConfig {
            base_dir: dir.join("storage"),
            ..Default::default()
        };
        DirectoryStorage::new(config).await.unwrap()
    }

    #[tokio::test]
    async fn test_storage_creation() {
        let dir = tempdir().unwrap();
        let storage = storage_in(dir.path()).await;
        assert!(storage.base_dir().join("warcs").is_dir());
        assert!(storage.base_dir().join("indexes").is_dir());
    }

    #[tokio::test]
    async fn test_upload_and_lookup() {
        let dir = tempdir().unwrap();
        let storage = storage_in(dir.path()).await;
        let user = TestUser::new("alice", dir.path().join("tmp"));
        let collection = TestCollection::new("coll", Arc::new(user.clone()), None);

        let local = dir.path().join("rec-1.warc");
        fs::write(&local, b"WARC/1.0 data").await.unwrap();

        assert!(storage.get_upload_url("rec-1.warc").await.is_none());
        assert!(
            storage
                .upload_file(&user, collection.as_ref(), "rec", "rec-1.warc", &local, FileKind::Warc)
                .await
        );

        let url = storage.get_upload_url("rec-1.warc").await.unwrap();
        assert!(url.starts_with("file://"));
        assert!(url.ends_with("/warcs/rec/rec-1.warc"));

        let uploads = storage.list_uploads().await.unwrap();
        assert_eq!(uploads.len(), 1);
        assert_eq!(uploads[0].collection, "coll");
        assert_eq!(uploads[0].size, 13);

        let stats = storage.stats().await.unwrap();
        assert_eq!(stats.total_files, 1);
        assert_eq!(stats.total_size_bytes, 13);
    }

    #[tokio::test]
    async fn test_upload_missing_file_fails() {
        let dir = tempdir().unwrap();
        let storage = storage_in(dir.path()).await;
        let user = TestUser::new("alice", dir.path().join("tmp"));
        let collection = TestCollection::new("coll", Arc::new(user.clone()), None);

        let missing = dir.path().join("missing.warc");
        assert!(
            !storage
                .upload_file(&user, collection.as_ref(), "rec", "missing.warc", &missing, FileKind::Warc)
                .await
        );
        assert!(storage.get_upload_url("missing.warc").await.is_none());
    }

    #[tokio::test]
    async fn test_delete_remote_and_local() {
        let dir = tempdir().unwrap();
        let storage = storage_in(dir.path()).await;
        let user = TestUser::new("alice", dir.path().join("tmp"));
        let collection = TestCollection::new("coll", Arc::new(user.clone()), None);

        let local = dir.path().join("rec-2.warc");
        fs::write(&local, b"data").await.unwrap();
        storage
            .upload_file(&user, collection.as_ref(), "rec", "rec-2.warc", &local, FileKind::Warc)
            .await;

        let url = storage.get_upload_url("rec-2.warc").await.unwrap();
        assert!(storage.delete_file(&url).await);
        assert!(storage.get_upload_url("rec-2.warc").await.is_none());
        assert!(!storage.delete_file(&url).await);

        assert!(storage.delete_file(&paths::add_local_store_prefix(&local)).await);
        assert!(!local.exists());

        assert!(!storage.delete_file("file:///etc/hostname").await);
    }

    #[tokio::test]
    async fn test_same_filename_in_two_recordings() {
        let dir = tempdir().unwrap();
        let storage = storage_in(dir.path()).await;
        let user = TestUser::new("alice", dir.path().join("tmp"));
        let collection = TestCollection::new("coll", Arc::new(user.clone()), None);

        let first = dir.path().join("first.warc");
        let second = dir.path().join("second.warc");
        fs::write(&first, b"first").await.unwrap();
        fs::write(&second, b"second copy").await.unwrap();

        for (rec, local) in [("rec-a", &first), ("rec-b", &second)] {
            assert!(
                storage
                    .upload_file(&user, collection.as_ref(), rec, "data.warc", local, FileKind::Warc)
                    .await
            );
        }

        let stored_a = storage.base_dir().join("warcs").join("rec-a").join("data.warc");
        let stored_b = storage.base_dir().join("warcs").join("rec-b").join("data.warc");
        assert_eq!(fs::read(&stored_a).await.unwrap(), b"first");
        assert_eq!(fs::read(&stored_b).await.unwrap(), b"second copy");

        assert_eq!(storage.list_uploads().await.unwrap().len(), 2);
        let url = storage.get_upload_url("data.warc").await.unwrap();
        assert!(url.ends_with("/warcs/rec-b/data.warc"));
    }

    #[tokio::test]
    async fn test_rejects_path_like_names() {
        let dir = tempdir().unwrap();
        let storage = storage_in(dir.path()).await;
        let user = TestUser::new("alice", dir.path().join("tmp"));
        let collection = TestCollection::new("coll", Arc::new(user.clone()), None);

        let local = dir.path().join("x.warc");
        fs::write(&local, b"x").await.unwrap();
        assert!(
            !storage
                .upload_file(&user, collection.as_ref(), "../escape", "x.warc", &local, FileKind::Warc)
                .await
        );
        assert!(storage.list_uploads().await.unwrap().is_empty());
    }
}
