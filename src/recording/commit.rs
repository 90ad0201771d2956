// src/recording/commit.rs
//! Commit protocol: move a recording's files from local disk into storage
//!
//! Per file:
//!
//! ```text
//! local? ──no──> AlreadyRemote / NotReady
//!   │
//! set_nx_ex(w:<path>, commit_wait) ──held──┐
//!   │ acquired                            │
//! upload_file ──fail──> release, UploadFailed
//!   │ ok (lease left to expire)           │
//!   ▼                                     ▼
//! get_upload_url ──none──> NotYetAvailable
//!   │ url
//! registry[name] = url
//!   │
//! index: remove local copy    warc: publish handle_delete_file
//!   ▼
//! Committed
//! ```
//!
//! No step blocks on another process. A pass that leaves stragglers is simply
//! run again later; files already committed are skipped.

use crate::observability::metric_names;
use crate::recording::collaborators::{Collection, User};
use crate::recording::keys::{self, INDEX_FILE_KEY};
use crate::recording::Recording;
use crate::storage::{paths, FileKind, Storage};
use crate::utils::errors::{RecorderError, Result};
use tokio::fs;
use tracing::{debug, info, warn};

/// Result of committing one file
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CommitOutcome {
    /// Remote copy confirmed, registry updated, local deletion requested
    Committed,

    /// Location is already remote
    AlreadyRemote,

    /// Local file does not exist (yet)
    NotReady,

    /// Storage rejected the upload; lease released for a retry
    UploadFailed,

    /// Upload accepted but not retrievable yet
    NotYetAvailable,
}

impl CommitOutcome {
    /// Whether the file needs no further commit work
    pub fn is_done(&self) -> bool {
        matches!(self, CommitOutcome::Committed | CommitOutcome::AlreadyRemote)
    }
}

/// Who and where a commit pass uploads for
pub struct CommitScope<'a> {
    pub user: &'a dyn User,
    pub collection: &'a dyn Collection,
    pub storage: &'a dyn Storage,
}

impl<'a> CommitScope<'a> {
    pub fn new(user: &'a dyn User, collection: &'a dyn Collection, storage: &'a dyn Storage) -> Self {
        Self {
            user,
            collection,
            storage,
        }
    }
}

/// Summary of one `commit_to_storage` pass
#[derive(Debug, Clone, Default)]
pub struct CommitReport {
    pub recording_id: String,

    /// False when the owner has no storage; nothing was committed
    pub storage_configured: bool,

    /// Outcome per file, index first
    pub outcomes: Vec<(String, CommitOutcome)>,

    /// Whether the live record index was deleted after a complete pass
    pub index_discarded: bool,
}

impl CommitReport {
    fn new(recording_id: &str, storage_configured: bool) -> Self {
        Self {
            recording_id: recording_id.to_string(),
            storage_configured,
            ..Default::default()
        }
    }

    /// Every file reached a done state in this pass
    pub fn is_complete(&self) -> bool {
        self.storage_configured && self.outcomes.iter().all(|(_, outcome)| outcome.is_done())
    }

    /// Files that still need another pass
    pub fn pending(&self) -> impl Iterator<Item = &(String, CommitOutcome)> {
        self.outcomes.iter().filter(|(_, outcome)| !outcome.is_done())
    }

    /// Turn the first straggler into an error
    pub fn ensure_complete(&self) -> Result<()> {
        if !self.storage_configured {
            return Err(RecorderError::StorageUnavailable(self.recording_id.clone()));
        }
        match self.pending().next() {
            None => Ok(()),
            Some((name, CommitOutcome::UploadFailed)) => {
                Err(RecorderError::UploadFailed(name.clone()))
            }
            Some((name, _)) => Err(RecorderError::NotYetAvailable(name.clone())),
        }
    }
}

impl Recording {
    /// Commit one file to storage
    ///
    /// `filename` is the storage-side name; `location` the registry value.
    /// Index files are deleted directly once committed. Capture files may still
    /// be open in a writer, so their deletion is requested on
    /// `handle_delete_file` instead.
    pub async fn commit_file(
        &self,
        scope: &CommitScope<'_>,
        filename: &str,
        location: &str,
        kind: FileKind,
    ) -> Result<CommitOutcome> {
        let Some(local_path) = paths::local_path(location) else {
            debug!("{} already remote at {}", filename, location);
            return Ok(CommitOutcome::AlreadyRemote);
        };

        let is_file = fs::metadata(&local_path)
            .await
            .map(|meta| meta.is_file())
            .unwrap_or(false);
        if !is_file {
            debug!("{:?} not present, skipping", local_path);
            return Ok(CommitOutcome::NotReady);
        }

        let local_str = local_path.to_string_lossy().into_owned();
        let commit_wait = keys::commit_wait_key(&local_str);

        metrics::counter!(metric_names::COMMIT_ATTEMPTS).increment(1);

        if self
            .store()
            .set_nx_ex(&commit_wait, "1", self.context().config.commit_wait())
            .await?
        {
            debug!("Uploading {} ({})", filename, kind);
            let uploaded = scope
                .storage
                .upload_file(
                    scope.user,
                    scope.collection,
                    self.id(),
                    filename,
                    &local_path,
                    kind,
                )
                .await;

            if !uploaded {
                self.store().delete(&commit_wait).await?;
                metrics::counter!(metric_names::UPLOADS_FAILED).increment(1);
                warn!("Upload failed: {}", local_str);
                return Ok(CommitOutcome::UploadFailed);
            }
        } else {
            debug!("Commit of {} already in flight", local_str);
        }

        let Some(remote_url) = scope.storage.get_upload_url(filename).await else {
            info!("Not yet available: {}", local_str);
            return Ok(CommitOutcome::NotYetAvailable);
        };

        info!("Committed {} -> {}", local_str, remote_url);

        let registry_field = match kind {
            FileKind::Index => INDEX_FILE_KEY,
            FileKind::Warc => filename,
        };
        self.store()
            .hset(&keys::warc_key(self.id()), registry_field, &remote_url)
            .await?;

        match kind {
            FileKind::Index => {
                if let Err(e) = fs::remove_file(&local_path).await {
                    warn!("Failed to remove committed index {}: {}", local_str, e);
                }
            }
            FileKind::Warc => {
                let listeners = self
                    .store()
                    .publish(keys::DELETE_FILE_CHANNEL, &local_str)
                    .await?;
                if listeners < 1 {
                    warn!("No delete listener for {}", local_str);
                }
            }
        }

        metrics::counter!(metric_names::FILES_COMMITTED).increment(1);
        Ok(CommitOutcome::Committed)
    }

    /// Announce the close, then commit the index file and every capture file
    ///
    /// The live record index is dropped only after a pass in which every
    /// file is done.
    pub async fn commit_to_storage(&self) -> Result<CommitReport> {
        let collection = self.owner()?;
        let user = collection.owner();

        let storage = if user.is_anonymous() {
            None
        } else {
            collection.storage()
        };

        let info_key = keys::info_key(self.id());
        self.store()
            .publish(keys::CLOSE_REC_CHANNEL, &info_key)
            .await?;

        let Some(storage) = storage else {
            debug!("No storage for {}, close announced only", self.id());
            return Ok(CommitReport::new(self.id(), false));
        };

        let mut report = CommitReport::new(self.id(), true);
        let scope = CommitScope::new(user.as_ref(), collection.as_ref(), storage.as_ref());

        let index = self.resolve_or_build_index_file(user.as_ref()).await?;
        let outcome = self
            .commit_file(&scope, &index.filename, &index.location, FileKind::Index)
            .await?;
        report.outcomes.push((index.filename, outcome));

        for entry in self.iter_files(false).await? {
            let outcome = self
                .commit_file(&scope, &entry.name, &entry.location, FileKind::Warc)
                .await?;
            report.outcomes.push((entry.name, outcome));
        }

        if report.is_complete() {
            debug!("Discarding live index of {}", self.id());
            self.store().delete(&keys::cdxj_key(self.id())).await?;
            report.index_discarded = true;
        } else {
            info!(
                "Commit of {} incomplete: {} file(s) pending",
                self.id(),
                report.pending().count()
            );
        }

        Ok(report)
    }
}
