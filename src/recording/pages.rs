// src/recording/pages.rs
//! Page index: visited-page metadata keyed by `url + " " + timestamp`

use crate::recording::keys;
use crate::recording::Recording;
use crate::utils::errors::{RecorderError, Result};
use crate::utils::time;
use base16ct::lower::encode_string;
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use md5::{Digest, Md5};
use std::collections::BTreeMap;
use std::ops::Bound;
use tracing::debug;

const PAGE_ID_LEN: usize = 10;

/// One visited page
///
/// Attributes other than `url`, `timestamp` and `hidden` are carried through
/// read-modify-write cycles untouched.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PageEntry {
    pub url: String,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub timestamp: Option<String>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub hidden: Option<Value>,

    #[serde(flatten)]
    pub extra: Map<String, Value>,
}

impl PageEntry {
    pub fn new(url: impl Into<String>) -> Self {
        Self {
            url: url.into(),
            timestamp: None,
            hidden: None,
            extra: Map::new(),
        }
    }

    pub fn with_timestamp(mut self, timestamp: impl Into<String>) -> Self {
        self.timestamp = Some(timestamp.into());
        self
    }

    pub fn with_hidden(mut self, hidden: bool) -> Self {
        self.hidden = Some(Value::String(if hidden { "1" } else { "0" }.to_string()));
        self
    }

    pub fn with_attr(mut self, key: impl Into<String>, value: Value) -> Self {
        self.extra.insert(key.into(), value);
        self
    }

    pub fn is_hidden(&self) -> bool {
        match &self.hidden {
            Some(Value::String(s)) => s == "1",
            Some(Value::Bool(b)) => *b,
            Some(Value::Number(n)) => n.as_i64() == Some(1),
            _ => false,
        }
    }

    /// Explicit timestamp, falling back to the alternate `ts` attribute
    fn explicit_timestamp(&self) -> Option<String> {
        self.timestamp
            .clone()
            .filter(|ts| !ts.is_empty())
            .or_else(|| match self.extra.get("ts") {
                Some(Value::String(ts)) if !ts.is_empty() => Some(ts.clone()),
                _ => None,
            })
    }
}

/// A page as listed, with its derived id
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ListedPage {
    pub id: String,

    #[serde(flatten)]
    pub page: PageEntry,
}

/// Hash key of a page
pub fn identity_key(url: &str, timestamp: &str) -> String {
    format!("{} {}", url, timestamp)
}

/// Short stable id derived from url and timestamp
pub fn page_id(url: &str, timestamp: &str) -> String {
    let mut hasher = Md5::new();
    hasher.update(url.as_bytes());
    hasher.update(timestamp.as_bytes());
    let digest: [u8; 16] = hasher.finalize().into();
    let mut id = encode_string(&digest);
    id.truncate(PAGE_ID_LEN);
    id
}

impl Recording {
    /// Timestamp of the latest indexed capture of `url`
    pub async fn latest_capture_timestamp(&self, url: &str) -> Result<Option<String>> {
        let canonicalizer = &self.context().canonicalizer;
        let Some((start, end)) = canonicalizer.search_range(url) else {
            return Ok(None);
        };

        let matches = self
            .store()
            .zrange_by_lex(
                &keys::cdxj_key(self.id()),
                Bound::Included(start.as_str()),
                Bound::Excluded(end.as_str()),
            )
            .await?;

        Ok(matches
            .last()
            .and_then(|line| canonicalizer.timestamp_of(line)))
    }

    /// Fill in the timestamp and encode. Returns `(identity key, json)`.
    async fn prepare_page(&self, mut page: PageEntry) -> Result<(String, String)> {
        let timestamp = match page.explicit_timestamp() {
            Some(ts) => ts,
            None => match self.latest_capture_timestamp(&page.url).await? {
                Some(ts) => ts,
                None => time::timestamp_now(),
            },
        };

        let hkey = identity_key(&page.url, &timestamp);
        page.timestamp = Some(timestamp);
        Ok((hkey, serde_json::to_string(&page)?))
    }

    /// Add or replace a page. The recording must be open.
    pub async fn add_page(&self, page: PageEntry) -> Result<()> {
        let owner = self.owner()?;
        self.context().access.assert_can_write_coll(owner.as_ref())?;

        if !self.is_open(true).await? {
            return Err(RecorderError::NotOpen(self.id().to_string()));
        }

        let (hkey, json) = self.prepare_page(page).await?;
        self.store()
            .hset(&keys::page_key(self.id()), &hkey, &json)
            .await?;

        debug!("Added page {} to {}", hkey, self.id());
        Ok(())
    }

    /// Bulk add with a single upsert. Returns the number of distinct pages written.
    pub async fn import_pages(&self, pages: Vec<PageEntry>) -> Result<usize> {
        let owner = self.owner()?;
        self.context().access.assert_can_admin_coll(owner.as_ref())?;

        let mut pagemap = BTreeMap::new();
        for page in pages {
            let (hkey, json) = self.prepare_page(page).await?;
            pagemap.insert(hkey, json);
        }

        self.store()
            .hset_many(&keys::page_key(self.id()), &pagemap)
            .await?;

        debug!("Imported {} pages into {}", pagemap.len(), self.id());
        Ok(pagemap.len())
    }

    /// Merge `patch` into the page with the same url and timestamp
    pub async fn modify_page(&self, patch: PageEntry) -> Result<()> {
        let owner = self.owner()?;
        self.context().access.assert_can_admin_coll(owner.as_ref())?;

        let Some(timestamp) = patch.timestamp.clone() else {
            return Err(RecorderError::NotFound(format!(
                "page {} without timestamp",
                patch.url
            )));
        };

        let page_key = keys::page_key(self.id());
        let hkey = identity_key(&patch.url, &timestamp);

        let existing = self
            .store()
            .hget(&page_key, &hkey)
            .await?
            .ok_or_else(|| RecorderError::NotFound(format!("page {}", hkey)))?;

        let mut merged: Map<String, Value> = serde_json::from_str(&existing)?;
        if let Value::Object(fields) = serde_json::to_value(&patch)? {
            merged.extend(fields);
        }

        let merged: PageEntry = serde_json::from_value(Value::Object(merged))?;
        self.store()
            .hset(&page_key, &hkey, &serde_json::to_string(&merged)?)
            .await?;
        Ok(())
    }

    pub async fn delete_page(&self, url: &str, timestamp: &str) -> Result<()> {
        let owner = self.owner()?;
        self.context().access.assert_can_admin_coll(owner.as_ref())?;

        let hkey = identity_key(url, timestamp);
        if self.store().hdel(&keys::page_key(self.id()), &hkey).await? {
            Ok(())
        } else {
            Err(RecorderError::NotFound(format!("page {}", hkey)))
        }
    }

    /// All pages with derived ids. Hidden pages are only shown to admins.
    pub async fn list_pages(&self) -> Result<Vec<ListedPage>> {
        let owner = self.owner()?;
        let access = &self.context().access;
        access.assert_can_read_coll(owner.as_ref())?;

        let include_hidden = access.can_admin_coll(owner.as_ref());

        let raw = self.store().hvals(&keys::page_key(self.id())).await?;
        let mut pages = Vec::with_capacity(raw.len());
        for json in raw {
            let page: PageEntry = serde_json::from_str(&json)?;
            if !include_hidden && page.is_hidden() {
                continue;
            }
            let id = page_id(&page.url, page.timestamp.as_deref().unwrap_or_default());
            pages.push(ListedPage { id, page });
        }
        Ok(pages)
    }

    pub async fn count_pages(&self) -> Result<usize> {
        let owner = self.owner()?;
        self.context().access.assert_can_read_coll(owner.as_ref())?;

        Ok(self.store().hlen(&keys::page_key(self.id())).await?)
    }

    pub async fn has_page(&self, url: &str, timestamp: &str) -> Result<bool> {
        let owner = self.owner()?;
        self.context().access.assert_can_read_coll(owner.as_ref())?;

        Ok(self
            .store()
            .hget(&keys::page_key(self.id()), &identity_key(url, timestamp))
            .await?
            .is_some())
    }
}
