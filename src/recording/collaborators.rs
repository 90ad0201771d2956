// src/recording/collaborators.rs
//! Contracts of the systems a recording depends on but does not own:
//! access control, the owning collection and user, and the index-key format.

use crate::recording::Recording;
use crate::storage::Storage;
use crate::utils::errors::{RecorderError, Result};
use async_trait::async_trait;
use std::path::PathBuf;
use std::sync::Arc;

/// Owner of a collection
pub trait User: Send + Sync + 'static {
    fn name(&self) -> &str;

    /// Anonymous users never have remote storage
    fn is_anonymous(&self) -> bool;

    /// Per-writer directory for temporary files
    fn temp_write_path(&self) -> PathBuf;
}

/// Collection owning a set of recordings
#[async_trait]
pub trait Collection: Send + Sync + 'static {
    fn id(&self) -> &str;

    fn owner(&self) -> Arc<dyn User>;

    /// Remote storage configured for this collection, if any
    fn storage(&self) -> Option<Arc<dyn Storage>>;

    /// Detach a recording, deleting its data when `delete` is set
    async fn remove_recording(&self, recording: &Recording, delete: bool) -> Result<()>;

    /// Rebuild the collection-wide index from its recordings.
    /// With `do_async` the rebuild is scheduled and this returns immediately.
    fn sync_index(&self, exists: bool, do_async: bool);
}

/// Access control checks on a collection
pub trait AccessControl: Send + Sync + 'static {
    fn can_read_coll(&self, collection: &dyn Collection) -> bool;

    fn can_write_coll(&self, collection: &dyn Collection) -> bool;

    fn can_admin_coll(&self, collection: &dyn Collection) -> bool;

    fn assert_can_read_coll(&self, collection: &dyn Collection) -> Result<()> {
        if self.can_read_coll(collection) {
            Ok(())
        } else {
            Err(RecorderError::PermissionDenied(format!(
                "no read access to collection {}",
                collection.id()
            )))
        }
    }

    fn assert_can_write_coll(&self, collection: &dyn Collection) -> Result<()> {
        if self.can_write_coll(collection) {
            Ok(())
        } else {
            Err(RecorderError::PermissionDenied(format!(
                "no write access to collection {}",
                collection.id()
            )))
        }
    }

    fn assert_can_admin_coll(&self, collection: &dyn Collection) -> Result<()> {
        if self.can_admin_coll(collection) {
            Ok(())
        } else {
            Err(RecorderError::PermissionDenied(format!(
                "no admin access to collection {}",
                collection.id()
            )))
        }
    }
}

/// Maps URLs onto the sortable keys of index records
pub trait KeyCanonicalizer: Send + Sync + 'static {
    /// Lexicographic range `[start, end)` covering every record of `url`
    fn search_range(&self, url: &str) -> Option<(String, String)>;

    /// Capture timestamp of a stored index line
    fn timestamp_of(&self, line: &str) -> Option<String>;
}

/// One captured-request index line: `<key> <timestamp> <json fields>`
#[derive(Debug, Clone, PartialEq)]
pub struct IndexRecord {
    pub key: String,
    pub timestamp: String,
    pub fields: serde_json::Value,
}

impl IndexRecord {
    pub fn new(key: impl Into<String>, timestamp: impl Into<String>, fields: serde_json::Value) -> Self {
        Self {
            key: key.into(),
            timestamp: timestamp.into(),
            fields,
        }
    }

    /// Render as a stored index line
    pub fn to_line(&self) -> String {
        format!("{} {} {}", self.key, self.timestamp, self.fields)
    }

    /// Parse a stored index line
    pub fn parse(line: &str) -> Option<Self> {
        let mut parts = line.splitn(3, ' ');
        let key = parts.next().filter(|k| !k.is_empty())?;
        let timestamp = parts.next().filter(|t| !t.is_empty())?;
        let fields = match parts.next() {
            Some(raw) => serde_json::from_str(raw).ok()?,
            None => serde_json::Value::Null,
        };
        Some(Self::new(key, timestamp, fields))
    }
}

/// Lowercased, scheme-less, `www.`-less URL keys
#[derive(Debug, Clone, Copy, Default)]
pub struct SimpleCanonicalizer;

impl SimpleCanonicalizer {
    pub fn canonicalize(&self, url: &str) -> Option<String> {
        let rest = url
            .split_once("://")
            .map(|(_, rest)| rest)
            .unwrap_or(url)
            .trim();
        let (host, path) = match rest.find('/') {
            Some(idx) => rest.split_at(idx),
            None => (rest, "/"),
        };
        let host = host.to_ascii_lowercase();
        let host = host.strip_prefix("www.").unwrap_or(&host);
        if host.is_empty() || host.contains(' ') || path.contains(' ') {
            return None;
        }
        Some(format!("{}{}", host, path))
    }

    /// Index record for a capture of `url`
    pub fn record(&self, url: &str, timestamp: &str, fields: serde_json::Value) -> Option<IndexRecord> {
        Some(IndexRecord::new(self.canonicalize(url)?, timestamp, fields))
    }
}

impl KeyCanonicalizer for SimpleCanonicalizer {
    fn search_range(&self, url: &str) -> Option<(String, String)> {
        let key = self.canonicalize(url)?;
        // ' ' separates key and timestamp; '!' is the next byte up
        Some((format!("{} ", key), format!("{}!", key)))
    }

    fn timestamp_of(&self, line: &str) -> Option<String> {
        IndexRecord::parse(line).map(|record| record.timestamp)
    }
}
