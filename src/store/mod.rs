// src/store/mod.rs
//! Metadata store contract
//!
//! Recording state, file locations, pages and the live record index all live
//! in a key-value store with hash, sorted-set and set values plus a broadcast
//! channel. Every primitive is atomic on its own; callers never rely on
//! multi-key transactions.
//!
//! - **MetadataStore**: the primitive operations the engine consumes
//! - **MemoryStore**: in-process implementation with TTL expiry and pub/sub

pub mod memory;

pub use memory::MemoryStore;

use async_trait::async_trait;
use std::collections::BTreeMap;
use std::ops::Bound;
use std::time::Duration;
use thiserror::Error;
use tokio::sync::broadcast;

/// Metadata store errors
#[derive(Debug, Error)]
pub enum StoreError {
    /// Operation against a key holding another kind of value
    #[error("wrong value type at key {0}")]
    WrongType(String),

    /// Stored value could not be interpreted
    #[error("invalid value at key {0}: {1}")]
    InvalidValue(String, String),

    /// Backend connection or protocol failure
    #[error("backend failure: {0}")]
    Backend(String),
}

pub type StoreResult<T> = std::result::Result<T, StoreError>;

/// Key-value/hash/sorted-set/set store with TTLs and pub/sub
#[async_trait]
pub trait MetadataStore: Send + Sync + 'static {
    /// Set `key` only if absent, expiring after `ttl`. Returns whether it was set.
    async fn set_nx_ex(&self, key: &str, value: &str, ttl: Duration) -> StoreResult<bool>;

    /// Set `key`, expiring after `ttl`
    async fn set_ex(&self, key: &str, value: &str, ttl: Duration) -> StoreResult<()>;

    async fn get(&self, key: &str) -> StoreResult<Option<String>>;

    async fn set(&self, key: &str, value: &str) -> StoreResult<()>;

    /// Delete `key` of any type. Returns whether it existed.
    async fn delete(&self, key: &str) -> StoreResult<bool>;

    async fn exists(&self, key: &str) -> StoreResult<bool>;

    /// Reset the TTL of an existing key. Returns false when the key is absent.
    async fn expire(&self, key: &str, ttl: Duration) -> StoreResult<bool>;

    async fn hget(&self, key: &str, field: &str) -> StoreResult<Option<String>>;

    async fn hset(&self, key: &str, field: &str, value: &str) -> StoreResult<()>;

    async fn hset_many(&self, key: &str, entries: &BTreeMap<String, String>) -> StoreResult<()>;

    /// Remove a field. Returns whether it existed.
    async fn hdel(&self, key: &str, field: &str) -> StoreResult<bool>;

    async fn hgetall(&self, key: &str) -> StoreResult<BTreeMap<String, String>>;

    async fn hvals(&self, key: &str) -> StoreResult<Vec<String>>;

    async fn hlen(&self, key: &str) -> StoreResult<usize>;

    /// Add `delta` to an integer field, creating it at 0. Returns the new value.
    async fn hincrby(&self, key: &str, field: &str, delta: i64) -> StoreResult<i64>;

    /// Add members to a lexicographically ordered set. Returns how many were new.
    async fn zadd(&self, key: &str, members: &[String]) -> StoreResult<usize>;

    /// All members in ascending order
    async fn zrange_all(&self, key: &str) -> StoreResult<Vec<String>>;

    /// Members within the lexicographic range, ascending
    async fn zrange_by_lex(
        &self,
        key: &str,
        min: Bound<&str>,
        max: Bound<&str>,
    ) -> StoreResult<Vec<String>>;

    /// Store the union of `sources` at `dest`. Returns the resulting size.
    async fn zunionstore(&self, dest: &str, sources: &[&str]) -> StoreResult<usize>;

    async fn sadd(&self, key: &str, members: &[String]) -> StoreResult<usize>;

    async fn smembers(&self, key: &str) -> StoreResult<Vec<String>>;

    /// Store the union of `sources` at `dest`. Returns the resulting size.
    async fn sunionstore(&self, dest: &str, sources: &[&str]) -> StoreResult<usize>;

    /// Broadcast `message` on `channel`. Returns how many subscribers received it.
    async fn publish(&self, channel: &str, message: &str) -> StoreResult<usize>;

    /// Subscribe to `channel`
    fn subscribe(&self, channel: &str) -> broadcast::Receiver<String>;
}
