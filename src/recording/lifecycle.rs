// src/recording/lifecycle.rs
//! Recording creation, open lease, info and deletion

use crate::recording::collaborators::{AccessControl, Collection, KeyCanonicalizer};
use crate::recording::keys;
use crate::recording::pages::ListedPage;
use crate::storage::{Loader, Storage};
use crate::store::MetadataStore;
use crate::utils::config::RecordingConfig;
use crate::utils::errors::{RecorderError, Result};
use crate::utils::time;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::sync::{Arc, Weak};
use tracing::{debug, info, warn};

/// Shared services every recording handle uses
#[derive(Clone)]
pub struct RecordingContext {
    pub store: Arc<dyn MetadataStore>,
    pub access: Arc<dyn AccessControl>,
    pub loader: Arc<dyn Loader>,
    pub canonicalizer: Arc<dyn KeyCanonicalizer>,
    pub config: RecordingConfig,
}

/// Handle to one recording
///
/// Cheap to clone; all state lives in the metadata store. The owning
/// collection is held weakly.
#[derive(Clone)]
pub struct Recording {
    id: String,
    ctx: RecordingContext,
    owner: Weak<dyn Collection>,
}

/// Stored recording info
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct RecordingInfo {
    pub desc: String,
    pub rec_type: Option<String>,
    pub size: u64,
    pub created_at: Option<i64>,
    pub updated_at: Option<i64>,
}

impl RecordingInfo {
    fn from_hash(hash: &BTreeMap<String, String>) -> Self {
        let int = |field: &str| hash.get(field).and_then(|v| v.parse::<i64>().ok());
        Self {
            desc: hash.get("desc").cloned().unwrap_or_default(),
            rec_type: hash.get("rec_type").cloned(),
            size: int("size").map_or(0, |size| size.max(0) as u64),
            created_at: int("created_at"),
            updated_at: int("updated_at"),
        }
    }
}

/// Serialized view of a recording
#[derive(Debug, Clone, Serialize)]
pub struct RecordingSummary {
    pub id: String,
    #[serde(flatten)]
    pub info: RecordingInfo,
    pub title: String,
    pub pages: Vec<ListedPage>,
    pub ra_sources: Vec<String>,
}

/// Result of destroying a recording
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct DeleteReport {
    /// Locations the storage backend failed to delete
    pub failed_files: Vec<String>,

    /// Whether the recording's info existed
    pub found: bool,
}

impl DeleteReport {
    pub fn into_result(self) -> Result<()> {
        if !self.failed_files.is_empty() {
            return Err(RecorderError::PartialDelete(self.failed_files));
        }
        if !self.found {
            return Err(RecorderError::NotFound("recording".to_string()));
        }
        Ok(())
    }
}

impl Recording {
    /// Create a new open recording owned by `owner`
    pub async fn create(
        ctx: RecordingContext,
        owner: &Arc<dyn Collection>,
        desc: &str,
        rec_type: Option<&str>,
        ra_sources: &[String],
    ) -> Result<Self> {
        let id = ulid::Ulid::new().to_string().to_lowercase();
        let now = time::unix_now().to_string();

        let mut info = BTreeMap::new();
        info.insert("desc".to_string(), desc.to_string());
        info.insert("size".to_string(), "0".to_string());
        info.insert("created_at".to_string(), now.clone());
        info.insert("updated_at".to_string(), now);
        if let Some(rec_type) = rec_type {
            info.insert("rec_type".to_string(), rec_type.to_string());
        }

        ctx.store.hset_many(&keys::info_key(&id), &info).await?;

        if !ra_sources.is_empty() {
            ctx.store.sadd(&keys::ra_key(&id), ra_sources).await?;
        }

        ctx.store
            .set_ex(&keys::open_key(&id), "1", ctx.config.open_rec_ttl())
            .await?;

        info!("Created recording {} in collection {}", id, owner.id());

        Ok(Self {
            id,
            ctx,
            owner: Arc::downgrade(owner),
        })
    }

    /// Handle to an existing recording
    pub fn open(ctx: RecordingContext, owner: &Arc<dyn Collection>, id: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            ctx,
            owner: Arc::downgrade(owner),
        }
    }

    pub fn id(&self) -> &str {
        &self.id
    }

    pub fn context(&self) -> &RecordingContext {
        &self.ctx
    }

    pub(crate) fn store(&self) -> &dyn MetadataStore {
        self.ctx.store.as_ref()
    }

    /// Owning collection
    pub fn owner(&self) -> Result<Arc<dyn Collection>> {
        self.owner
            .upgrade()
            .ok_or_else(|| RecorderError::OwnerGone(self.id.clone()))
    }

    /// Whether the open lease is live. With `extend`, also renews it.
    pub async fn is_open(&self, extend: bool) -> Result<bool> {
        let key = keys::open_key(&self.id);
        let open = if extend {
            self.store().expire(&key, self.ctx.config.open_rec_ttl()).await?
        } else {
            self.store().exists(&key).await?
        };
        Ok(open)
    }

    /// Drop the open lease
    pub async fn set_closed(&self) -> Result<()> {
        self.store().delete(&keys::open_key(&self.id)).await?;
        debug!("Recording {} closed", self.id);
        Ok(())
    }

    pub async fn info(&self) -> Result<RecordingInfo> {
        let hash = self.store().hgetall(&keys::info_key(&self.id)).await?;
        if hash.is_empty() {
            return Err(RecorderError::NotFound(format!("recording {}", self.id)));
        }
        Ok(RecordingInfo::from_hash(&hash))
    }

    pub async fn size(&self) -> Result<u64> {
        let size = self.store().hget(&keys::info_key(&self.id), "size").await?;
        Ok(size.and_then(|s| s.parse().ok()).unwrap_or(0))
    }

    /// Add `bytes` to the recording size. Returns the new size.
    pub async fn incr_size(&self, bytes: u64) -> Result<u64> {
        let info_key = keys::info_key(&self.id);
        let size = self.store().hincrby(&info_key, "size", bytes as i64).await?;
        self.store()
            .hset(&info_key, "updated_at", &time::unix_now().to_string())
            .await?;
        Ok(size.max(0) as u64)
    }

    pub async fn title(&self) -> Result<String> {
        let created_at = self
            .store()
            .hget(&keys::info_key(&self.id), "created_at")
            .await?
            .and_then(|v| v.parse::<i64>().ok())
            .and_then(time::to_iso_date)
            .unwrap_or_else(|| "<unknown>".to_string());
        Ok(format!("Recording on {}", created_at))
    }

    /// Record a remote archive this recording pulled from
    pub async fn track_remote_archive(&self, source_id: &str) -> Result<()> {
        self.store()
            .sadd(&keys::ra_key(&self.id), &[source_id.to_string()])
            .await?;
        Ok(())
    }

    pub async fn ra_sources(&self) -> Result<Vec<String>> {
        Ok(self.store().smembers(&keys::ra_key(&self.id)).await?)
    }

    /// Info plus pages and remote-archive sources
    pub async fn serialize(&self) -> Result<RecordingSummary> {
        Ok(RecordingSummary {
            id: self.id.clone(),
            info: self.info().await?,
            title: self.title().await?,
            pages: self.list_pages().await?,
            ra_sources: self.ra_sources().await?,
        })
    }

    /// Delete every file through `storage`, then every metadata key
    pub async fn delete_me(&self, storage: Option<&dyn Storage>) -> Result<DeleteReport> {
        let owner = self.owner()?;
        self.ctx.access.assert_can_admin_coll(owner.as_ref())?;

        let storage = storage.ok_or_else(|| RecorderError::StorageUnavailable(owner.id().to_string()))?;

        let failed_files = self.delete_files(storage).await?;
        let found = self.delete_object().await?;

        info!(
            "Deleted recording {} ({} file(s) failed)",
            self.id,
            failed_files.len()
        );

        Ok(DeleteReport { failed_files, found })
    }

    async fn delete_files(&self, storage: &dyn Storage) -> Result<Vec<String>> {
        let mut failed = Vec::new();
        for entry in self.iter_files(true).await? {
            if !storage.delete_file(&entry.location).await {
                warn!("Failed to delete {} ({})", entry.name, entry.location);
                failed.push(entry.location);
            }
        }
        Ok(failed)
    }

    async fn delete_object(&self) -> Result<bool> {
        let mut found = false;
        for key in keys::all_keys(&self.id) {
            let existed = self.store().delete(&key).await?;
            if key == keys::info_key(&self.id) {
                found = existed;
            }
        }
        Ok(found)
    }
}
