// src/recording/copy.rs
//! Merge one recording's data into another

use crate::observability::metric_names;
use crate::recording::keys;
use crate::recording::Recording;
use crate::storage::paths;
use crate::utils::errors::{RecorderError, Result};
use crate::utils::time;
use std::path::Path;
use tokio::fs;
use tokio::io::{self, AsyncWriteExt};
use tracing::{error, info, warn};

impl Recording {
    /// Copy every file, index record, page and remote-archive source of
    /// `source` into this recording
    ///
    /// Files are re-materialized under the owner's temp directory and
    /// registered as local so a later commit uploads them. Per-file failures
    /// are logged and the copy continues; the source is only removed when
    /// `delete_source` is set and no file failed. Returns whether every file
    /// copied.
    pub async fn copy_data_from_recording(
        &self,
        source: &Recording,
        delete_source: bool,
    ) -> Result<bool> {
        if !self.is_open(true).await? {
            return Err(RecorderError::NotOpen(self.id().to_string()));
        }

        let collection = self.owner()?;
        let temp_dir = collection.owner().temp_write_path();
        fs::create_dir_all(&temp_dir).await?;

        let mut errored = false;

        for entry in source.iter_files(true).await? {
            let base_name = if entry.is_index() {
                paths::file_name(&entry.location)
            } else {
                entry.name.clone()
            };
            let target = temp_dir.join(format!("{}.{}", base_name, time::timestamp20_now()));

            match self.copy_one(&entry.location, &target).await {
                Ok(bytes) => {
                    metrics::counter!(metric_names::BYTES_COPIED).increment(bytes);
                    if !entry.is_index() {
                        self.incr_size(bytes).await?;
                    }
                    // raw hset so the index file keeps its reserved field
                    self.store()
                        .hset(
                            &keys::warc_key(self.id()),
                            &entry.name,
                            &paths::add_local_store_prefix(&target),
                        )
                        .await?;
                }
                Err(e) => {
                    error!(
                        "Copy of {} from {} failed: {}",
                        entry.location,
                        source.id(),
                        e
                    );
                    errored = true;
                }
            }
        }

        let cdxj_key = keys::cdxj_key(self.id());
        let source_cdxj = keys::cdxj_key(source.id());
        self.store()
            .zunionstore(&cdxj_key, &[cdxj_key.as_str(), source_cdxj.as_str()])
            .await?;

        let pages = self.store().hgetall(&keys::page_key(source.id())).await?;
        if !pages.is_empty() {
            self.store()
                .hset_many(&keys::page_key(self.id()), &pages)
                .await?;
        }

        let ra_key = keys::ra_key(self.id());
        let source_ra = keys::ra_key(source.id());
        self.store()
            .sunionstore(&ra_key, &[ra_key.as_str(), source_ra.as_str()])
            .await?;

        collection.sync_index(true, true);

        if errored {
            warn!(
                "Copy from {} into {} incomplete, source kept",
                source.id(),
                self.id()
            );
        } else if delete_source {
            let source_owner = source.owner()?;
            source_owner.remove_recording(source, true).await?;
        }

        info!("Copied {} into {}", source.id(), self.id());
        Ok(!errored)
    }

    async fn copy_one(&self, location: &str, target: &Path) -> Result<u64> {
        let mut reader = self.context().loader.load(location).await?;
        let mut out = fs::File::create(target).await?;
        let bytes = io::copy(&mut reader, &mut out).await?;
        out.flush().await?;
        Ok(bytes)
    }
}
