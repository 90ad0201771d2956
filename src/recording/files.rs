// src/recording/files.rs
//! File registry: which files a recording owns and where each one lives
//!
//! The registry is a `name -> location` hash. The derived index file is kept
//! in the same hash under the reserved `@index_file` field.

use crate::recording::collaborators::User;
use crate::recording::keys::{self, INDEX_FILE_KEY};
use crate::recording::Recording;
use crate::storage::paths;
use crate::utils::errors::{RecorderError, Result};
use crate::utils::time;
use rand::Rng;
use std::collections::btree_map;
use std::path::{Path, PathBuf};
use tokio::fs;
use tokio::io::{AsyncWriteExt, BufWriter};
use tracing::{debug, info};

const BASE32_ALPHABET: &[u8] = b"ABCDEFGHIJKLMNOPQRSTUVWXYZ234567";

/// One registered file
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FileEntry {
    pub name: String,
    pub location: String,
}

impl FileEntry {
    pub fn is_index(&self) -> bool {
        self.name == INDEX_FILE_KEY
    }

    /// Filesystem path while the file is still local
    pub fn local_path(&self) -> Option<PathBuf> {
        paths::local_path(&self.location)
    }
}

/// Snapshot iterator over a recording's files
///
/// Each call to `Recording::iter_files` starts a fresh enumeration.
pub struct FileIter {
    inner: btree_map::IntoIter<String, String>,
    include_index: bool,
}

impl Iterator for FileIter {
    type Item = FileEntry;

    fn next(&mut self) -> Option<FileEntry> {
        for (name, location) in self.inner.by_ref() {
            if !self.include_index && name == INDEX_FILE_KEY {
                continue;
            }
            return Some(FileEntry { name, location });
        }
        None
    }
}

/// Location of the recording's index file
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct IndexFile {
    pub filename: String,
    pub location: String,
}

impl Recording {
    /// Upsert a `name -> location` mapping
    pub async fn register_file(&self, name: &str, location: &str) -> Result<()> {
        if name == INDEX_FILE_KEY {
            return Err(RecorderError::ReservedName(INDEX_FILE_KEY.to_string()));
        }
        self.store()
            .hset(&keys::warc_key(self.id()), name, location)
            .await?;
        debug!("Registered {} -> {} for {}", name, location, self.id());
        Ok(())
    }

    /// Register a file still on local disk
    pub async fn register_local_file(&self, name: &str, path: &Path) -> Result<()> {
        self.register_file(name, &paths::add_local_store_prefix(path)).await
    }

    pub async fn file_location(&self, name: &str) -> Result<Option<String>> {
        Ok(self
            .store()
            .hget(&keys::warc_key(self.id()), name)
            .await?)
    }

    /// Enumerate registered files, optionally including the index file
    pub async fn iter_files(&self, include_index: bool) -> Result<FileIter> {
        let all = self.store().hgetall(&keys::warc_key(self.id())).await?;
        Ok(FileIter {
            inner: all.into_iter(),
            include_index,
        })
    }

    /// Append lines to the live record index
    pub async fn add_index_records(&self, lines: &[String]) -> Result<usize> {
        Ok(self.store().zadd(&keys::cdxj_key(self.id()), lines).await?)
    }

    /// Live record index lines in key order
    pub async fn index_records(&self) -> Result<Vec<String>> {
        Ok(self.store().zrange_all(&keys::cdxj_key(self.id())).await?)
    }

    /// Existing index file, or a new one written from the live record index
    pub async fn resolve_or_build_index_file(&self, user: &dyn User) -> Result<IndexFile> {
        let warc_key = keys::warc_key(self.id());

        if let Some(location) = self.store().hget(&warc_key, INDEX_FILE_KEY).await? {
            return Ok(IndexFile {
                filename: paths::file_name(&location),
                location,
            });
        }

        let dir = user.temp_write_path();
        fs::create_dir_all(&dir).await?;

        let filename = format!(
            "index-{}-{}.{}",
            time::timestamp_now(),
            random_suffix(),
            self.context().config.index_ext
        );
        let path = dir.join(&filename);

        let lines = self.index_records().await?;

        let file = fs::File::create(&path).await?;
        let mut out = BufWriter::new(file);
        for line in &lines {
            out.write_all(line.as_bytes()).await?;
            out.write_all(b"\n").await?;
        }
        out.flush().await?;

        let location = paths::add_local_store_prefix(&path);
        self.store().hset(&warc_key, INDEX_FILE_KEY, &location).await?;

        info!(
            "Wrote index {} ({} records) for {}",
            filename,
            lines.len(),
            self.id()
        );

        Ok(IndexFile { filename, location })
    }
}

/// Eight base32 characters (40 random bits)
fn random_suffix() -> String {
    let mut rng = rand::thread_rng();
    (0..8)
        .map(|_| BASE32_ALPHABET[rng.gen_range(0..BASE32_ALPHABET.len())] as char)
        .collect()
}
