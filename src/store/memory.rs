// src/store/memory.rs
//! In-process metadata store
//!
//! A single mutex over the keyspace makes every primitive atomic. Expiry is
//! evaluated lazily against `tokio::time::Instant`, so a paused test clock
//! drives TTLs deterministically.

use crate::store::{MetadataStore, StoreError, StoreResult};
use async_trait::async_trait;
use dashmap::DashMap;
use parking_lot::Mutex;
use std::collections::{BTreeMap, BTreeSet, HashMap};
use std::ops::Bound;
use std::time::Duration;
use tokio::sync::broadcast;
use tokio::time::Instant;
use tracing::trace;

const DEFAULT_CHANNEL_CAPACITY: usize = 1024;

#[derive(Debug, Clone)]
enum Value {
    Str(String),
    Hash(BTreeMap<String, String>),
    SortedSet(BTreeSet<String>),
    Set(BTreeSet<String>),
}

#[derive(Debug)]
struct Entry {
    value: Value,
    expires_at: Option<Instant>,
}

impl Entry {
    fn new(value: Value) -> Self {
        Self {
            value,
            expires_at: None,
        }
    }

    fn is_expired(&self, now: Instant) -> bool {
        self.expires_at.map_or(false, |deadline| deadline <= now)
    }
}

type Keyspace = HashMap<String, Entry>;

/// In-memory `MetadataStore`
pub struct MemoryStore {
    keys: Mutex<Keyspace>,
    channels: DashMap<String, broadcast::Sender<String>>,
    channel_capacity: usize,
}

impl MemoryStore {
    /// Create an empty store
    pub fn new() -> Self {
        Self::with_channel_capacity(DEFAULT_CHANNEL_CAPACITY)
    }

    /// Create an empty store whose pub/sub channels buffer `capacity` messages
    pub fn with_channel_capacity(capacity: usize) -> Self {
        Self {
            keys: Mutex::new(HashMap::new()),
            channels: DashMap::new(),
            channel_capacity: capacity.max(1),
        }
    }

    /// Live (unexpired) keys, sorted
    pub fn keys(&self) -> Vec<String> {
        let now = Instant::now();
        let keys = self.keys.lock();
        let mut live: Vec<String> = keys
            .iter()
            .filter(|(_, entry)| !entry.is_expired(now))
            .map(|(key, _)| key.clone())
            .collect();
        live.sort();
        live
    }
}

impl Default for MemoryStore {
    fn default() -> Self {
        Self::new()
    }
}

fn live<'a>(keys: &'a mut Keyspace, key: &str) -> Option<&'a mut Entry> {
    let now = Instant::now();
    if keys.get(key).map_or(false, |entry| entry.is_expired(now)) {
        trace!("Key expired: {}", key);
        keys.remove(key);
    }
    keys.get_mut(key)
}

fn hash_ref<'a>(keys: &'a mut Keyspace, key: &str) -> StoreResult<Option<&'a BTreeMap<String, String>>> {
    match live(keys, key) {
        None => Ok(None),
        Some(Entry {
            value: Value::Hash(hash),
            ..
        }) => Ok(Some(hash)),
        Some(_) => Err(StoreError::WrongType(key.to_string())),
    }
}

fn hash_mut<'a>(keys: &'a mut Keyspace, key: &str) -> StoreResult<&'a mut BTreeMap<String, String>> {
    if live(keys, key).is_none() {
        keys.insert(key.to_string(), Entry::new(Value::Hash(BTreeMap::new())));
    }
    match keys.get_mut(key).map(|entry| &mut entry.value) {
        Some(Value::Hash(hash)) => Ok(hash),
        _ => Err(StoreError::WrongType(key.to_string())),
    }
}

fn sorted_set_ref<'a>(keys: &'a mut Keyspace, key: &str) -> StoreResult<Option<&'a BTreeSet<String>>> {
    match live(keys, key) {
        None => Ok(None),
        Some(Entry {
            value: Value::SortedSet(set),
            ..
        }) => Ok(Some(set)),
        Some(_) => Err(StoreError::WrongType(key.to_string())),
    }
}

fn set_ref<'a>(keys: &'a mut Keyspace, key: &str) -> StoreResult<Option<&'a BTreeSet<String>>> {
    match live(keys, key) {
        None => Ok(None),
        Some(Entry {
            value: Value::Set(set),
            ..
        }) => Ok(Some(set)),
        Some(_) => Err(StoreError::WrongType(key.to_string())),
    }
}

/// Store a union result at `dest`; an empty union removes `dest`
fn store_union(keys: &mut Keyspace, dest: &str, value: Value, len: usize) -> usize {
    if len == 0 {
        keys.remove(dest);
    } else {
        keys.insert(dest.to_string(), Entry::new(value));
    }
    len
}

fn is_valid_lex_range(min: Bound<&str>, max: Bound<&str>) -> bool {
    let (lo, lo_excluded) = match min {
        Bound::Included(s) => (s, false),
        Bound::Excluded(s) => (s, true),
        Bound::Unbounded => return true,
    };
    let (hi, hi_excluded) = match max {
        Bound::Included(s) => (s, false),
        Bound::Excluded(s) => (s, true),
        Bound::Unbounded => return true,
    };
    lo < hi || (lo == hi && !(lo_excluded && hi_excluded))
}

#[async_trait]
impl MetadataStore for MemoryStore {
    async fn set_nx_ex(&self, key: &str, value: &str, ttl: Duration) -> StoreResult<bool> {
        let mut keys = self.keys.lock();
        if live(&mut keys, key).is_some() {
            return Ok(false);
        }
        keys.insert(
            key.to_string(),
            Entry {
                value: Value::Str(value.to_string()),
                expires_at: Some(Instant::now() + ttl),
            },
        );
        Ok(true)
    }

    async fn set_ex(&self, key: &str, value: &str, ttl: Duration) -> StoreResult<()> {
        let mut keys = self.keys.lock();
        keys.insert(
            key.to_string(),
            Entry {
                value: Value::Str(value.to_string()),
                expires_at: Some(Instant::now() + ttl),
            },
        );
        Ok(())
    }

    async fn get(&self, key: &str) -> StoreResult<Option<String>> {
        let mut keys = self.keys.lock();
        match live(&mut keys, key) {
            None => Ok(None),
            Some(Entry {
                value: Value::Str(s),
                ..
            }) => Ok(Some(s.clone())),
            Some(_) => Err(StoreError::WrongType(key.to_string())),
        }
    }

    async fn set(&self, key: &str, value: &str) -> StoreResult<()> {
        let mut keys = self.keys.lock();
        keys.insert(key.to_string(), Entry::new(Value::Str(value.to_string())));
        Ok(())
    }

    async fn delete(&self, key: &str) -> StoreResult<bool> {
        let mut keys = self.keys.lock();
        let existed = live(&mut keys, key).is_some();
        keys.remove(key);
        Ok(existed)
    }

    async fn exists(&self, key: &str) -> StoreResult<bool> {
        let mut keys = self.keys.lock();
        Ok(live(&mut keys, key).is_some())
    }

    async fn expire(&self, key: &str, ttl: Duration) -> StoreResult<bool> {
        let mut keys = self.keys.lock();
        match live(&mut keys, key) {
            Some(entry) => {
                entry.expires_at = Some(Instant::now() + ttl);
                Ok(true)
            }
            None => Ok(false),
        }
    }

    async fn hget(&self, key: &str, field: &str) -> StoreResult<Option<String>> {
        let mut keys = self.keys.lock();
        Ok(hash_ref(&mut keys, key)?.and_then(|hash| hash.get(field).cloned()))
    }

    async fn hset(&self, key: &str, field: &str, value: &str) -> StoreResult<()> {
        let mut keys = self.keys.lock();
        hash_mut(&mut keys, key)?.insert(field.to_string(), value.to_string());
        Ok(())
    }

    async fn hset_many(&self, key: &str, entries: &BTreeMap<String, String>) -> StoreResult<()> {
        if entries.is_empty() {
            return Ok(());
        }
        let mut keys = self.keys.lock();
        let hash = hash_mut(&mut keys, key)?;
        for (field, value) in entries {
            hash.insert(field.clone(), value.clone());
        }
        Ok(())
    }

    async fn hdel(&self, key: &str, field: &str) -> StoreResult<bool> {
        let mut keys = self.keys.lock();
        let (removed, now_empty) = match live(&mut keys, key) {
            None => return Ok(false),
            Some(Entry {
                value: Value::Hash(hash),
                ..
            }) => (hash.remove(field).is_some(), hash.is_empty()),
            Some(_) => return Err(StoreError::WrongType(key.to_string())),
        };
        if now_empty {
            keys.remove(key);
        }
        Ok(removed)
    }

    async fn hgetall(&self, key: &str) -> StoreResult<BTreeMap<String, String>> {
        let mut keys = self.keys.lock();
        Ok(hash_ref(&mut keys, key)?.cloned().unwrap_or_default())
    }

    async fn hvals(&self, key: &str) -> StoreResult<Vec<String>> {
        let mut keys = self.keys.lock();
        Ok(hash_ref(&mut keys, key)?
            .map(|hash| hash.values().cloned().collect())
            .unwrap_or_default())
    }

    async fn hlen(&self, key: &str) -> StoreResult<usize> {
        let mut keys = self.keys.lock();
        Ok(hash_ref(&mut keys, key)?.map_or(0, |hash| hash.len()))
    }

    async fn hincrby(&self, key: &str, field: &str, delta: i64) -> StoreResult<i64> {
        let mut keys = self.keys.lock();
        let hash = hash_mut(&mut keys, key)?;
        let current = match hash.get(field) {
            Some(raw) => raw.parse::<i64>().map_err(|e| {
                StoreError::InvalidValue(format!("{}/{}", key, field), e.to_string())
            })?,
            None => 0,
        };
        let updated = current + delta;
        hash.insert(field.to_string(), updated.to_string());
        Ok(updated)
    }

    async fn zadd(&self, key: &str, members: &[String]) -> StoreResult<usize> {
        let mut keys = self.keys.lock();
        if live(&mut keys, key).is_none() {
            keys.insert(key.to_string(), Entry::new(Value::SortedSet(BTreeSet::new())));
        }
        match keys.get_mut(key).map(|entry| &mut entry.value) {
            Some(Value::SortedSet(set)) => Ok(members
                .iter()
                .filter(|member| set.insert((*member).clone()))
                .count()),
            _ => Err(StoreError::WrongType(key.to_string())),
        }
    }

    async fn zrange_all(&self, key: &str) -> StoreResult<Vec<String>> {
        let mut keys = self.keys.lock();
        Ok(sorted_set_ref(&mut keys, key)?
            .map(|set| set.iter().cloned().collect())
            .unwrap_or_default())
    }

    async fn zrange_by_lex(
        &self,
        key: &str,
        min: Bound<&str>,
        max: Bound<&str>,
    ) -> StoreResult<Vec<String>> {
        if !is_valid_lex_range(min, max) {
            return Ok(Vec::new());
        }
        let mut keys = self.keys.lock();
        Ok(sorted_set_ref(&mut keys, key)?
            .map(|set| set.range::<str, _>((min, max)).cloned().collect())
            .unwrap_or_default())
    }

    async fn zunionstore(&self, dest: &str, sources: &[&str]) -> StoreResult<usize> {
        let mut keys = self.keys.lock();
        let mut union = BTreeSet::new();
        for source in sources {
            if let Some(set) = sorted_set_ref(&mut keys, source)? {
                union.extend(set.iter().cloned());
            }
        }
        let len = union.len();
        Ok(store_union(&mut keys, dest, Value::SortedSet(union), len))
    }

    async fn sadd(&self, key: &str, members: &[String]) -> StoreResult<usize> {
        let mut keys = self.keys.lock();
        if live(&mut keys, key).is_none() {
            keys.insert(key.to_string(), Entry::new(Value::Set(BTreeSet::new())));
        }
        match keys.get_mut(key).map(|entry| &mut entry.value) {
            Some(Value::Set(set)) => Ok(members
                .iter()
                .filter(|member| set.insert((*member).clone()))
                .count()),
            _ => Err(StoreError::WrongType(key.to_string())),
        }
    }

    async fn smembers(&self, key: &str) -> StoreResult<Vec<String>> {
        let mut keys = self.keys.lock();
        Ok(set_ref(&mut keys, key)?
            .map(|set| set.iter().cloned().collect())
            .unwrap_or_default())
    }

    async fn sunionstore(&self, dest: &str, sources: &[&str]) -> StoreResult<usize> {
        let mut keys = self.keys.lock();
        let mut union = BTreeSet::new();
        for source in sources {
            if let Some(set) = set_ref(&mut keys, source)? {
                union.extend(set.iter().cloned());
            }
        }
        let len = union.len();
        Ok(store_union(&mut keys, dest, Value::Set(union), len))
    }

    async fn publish(&self, channel: &str, message: &str) -> StoreResult<usize> {
        let delivered = match self.channels.get(channel) {
            Some(sender) => sender.send(message.to_string()).unwrap_or(0),
            None => 0,
        };
        trace!("Published to {} ({} receivers)", channel, delivered);
        Ok(delivered)
    }

    fn subscribe(&self, channel: &str) -> broadcast::Receiver<String> {
        self.channels
            .entry(channel.to_string())
            .or_insert_with(|| broadcast::channel(self.channel_capacity).0)
            .subscribe()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Arc;

    #[tokio::test]
    async fn test_set_nx_ex_single_winner() {
        let store = MemoryStore::new();
        let ttl = Duration::from_secs(30);

        assert!(store.set_nx_ex("w:/tmp/a.warc", "1", ttl).await.unwrap());
        assert!(!store.set_nx_ex("w:/tmp/a.warc", "1", ttl).await.unwrap());
    }

    #[tokio::test]
    async fn test_concurrent_lease_has_one_winner() {
        let store = Arc::new(MemoryStore::new());
        let mut handles = vec![];

        for _ in 0..16 {
            let store = Arc::clone(&store);
            handles.push(tokio::spawn(async move {
                store
                    .set_nx_ex("w:/tmp/race.warc", "1", Duration::from_secs(30))
                    .await
                    .unwrap()
            }));
        }

        let mut winners = 0;
        for handle in handles {
            if handle.await.unwrap() {
                winners += 1;
            }
        }
        assert_eq!(winners, 1);
    }

    #[tokio::test(start_paused = true)]
    async fn test_ttl_expiry() {
        let store = MemoryStore::new();
        store
            .set_ex("r:1:open", "1", Duration::from_secs(10))
            .await
            .unwrap();
        assert!(store.exists("r:1:open").await.unwrap());

        tokio::time::advance(Duration::from_secs(5)).await;
        assert!(store.expire("r:1:open", Duration::from_secs(10)).await.unwrap());

        tokio::time::advance(Duration::from_secs(8)).await;
        assert!(store.exists("r:1:open").await.unwrap());

        tokio::time::advance(Duration::from_secs(3)).await;
        assert!(!store.exists("r:1:open").await.unwrap());
        assert!(!store.expire("r:1:open", Duration::from_secs(10)).await.unwrap());

        // expired lease can be re-acquired
        assert!(store
            .set_nx_ex("r:1:open", "1", Duration::from_secs(10))
            .await
            .unwrap());
    }

    #[tokio::test]
    async fn test_hash_operations() {
        let store = MemoryStore::new();
        store.hset("r:1:warc", "a.warc", "local:///tmp/a").await.unwrap();
        store.hset("r:1:warc", "b.warc", "local:///tmp/b").await.unwrap();

        assert_eq!(store.hlen("r:1:warc").await.unwrap(), 2);
        assert_eq!(
            store.hget("r:1:warc", "a.warc").await.unwrap().as_deref(),
            Some("local:///tmp/a")
        );
        assert!(store.hdel("r:1:warc", "a.warc").await.unwrap());
        assert!(!store.hdel("r:1:warc", "a.warc").await.unwrap());
        assert_eq!(store.hvals("r:1:warc").await.unwrap(), vec!["local:///tmp/b"]);

        assert_eq!(store.hincrby("r:1:info", "size", 10).await.unwrap(), 10);
        assert_eq!(store.hincrby("r:1:info", "size", 5).await.unwrap(), 15);
    }

    #[tokio::test]
    async fn test_wrong_type() {
        let store = MemoryStore::new();
        store.set("plain", "1").await.unwrap();

        let err = store.hget("plain", "field").await.unwrap_err();
        assert!(matches!(err, StoreError::WrongType(_)));
    }

    #[tokio::test]
    async fn test_zrange_by_lex() {
        let store = MemoryStore::new();
        let members = vec![
            "com,example)/ 20230101000000 {}".to_string(),
            "com,example)/ 20230102000000 {}".to_string(),
            "com,example)/page 20230101000000 {}".to_string(),
        ];
        assert_eq!(store.zadd("r:1:cdxj", &members).await.unwrap(), 3);
        assert_eq!(store.zadd("r:1:cdxj", &members[..1]).await.unwrap(), 0);

        let exact = store
            .zrange_by_lex(
                "r:1:cdxj",
                Bound::Included("com,example)/ "),
                Bound::Excluded("com,example)/!"),
            )
            .await
            .unwrap();
        assert_eq!(exact.len(), 2);
        assert!(exact[1].contains("20230102000000"));

        let inverted = store
            .zrange_by_lex("r:1:cdxj", Bound::Included("z"), Bound::Included("a"))
            .await
            .unwrap();
        assert!(inverted.is_empty());
    }

    #[tokio::test]
    async fn test_unionstore() {
        let store = MemoryStore::new();
        store.zadd("src", &["a".to_string(), "b".to_string()]).await.unwrap();
        store.zadd("dst", &["b".to_string(), "c".to_string()]).await.unwrap();

        let len = store.zunionstore("dst", &["dst", "src"]).await.unwrap();
        assert_eq!(len, 3);
        assert_eq!(store.zrange_all("dst").await.unwrap(), vec!["a", "b", "c"]);

        store.sadd("ra:src", &["ia".to_string()]).await.unwrap();
        let len = store.sunionstore("ra:dst", &["ra:dst", "ra:src"]).await.unwrap();
        assert_eq!(len, 1);
        assert_eq!(store.smembers("ra:dst").await.unwrap(), vec!["ia"]);
    }

    #[tokio::test]
    async fn test_publish_subscribe() {
        let store = MemoryStore::new();
        assert_eq!(store.publish("close_rec", "r:1:info").await.unwrap(), 0);

        let mut rx = store.subscribe("close_rec");
        assert_eq!(store.publish("close_rec", "r:1:info").await.unwrap(), 1);
        assert_eq!(rx.recv().await.unwrap(), "r:1:info");

        drop(rx);
        assert_eq!(store.publish("close_rec", "r:2:info").await.unwrap(), 0);
    }

    #[tokio::test]
    async fn test_keys_and_delete() {
        let store = MemoryStore::new();
        store.set("a", "1").await.unwrap();
        store.hset("b", "f", "v").await.unwrap();
        assert_eq!(store.keys(), vec!["a", "b"]);

        assert!(store.delete("a").await.unwrap());
        assert!(!store.delete("a").await.unwrap());
        assert_eq!(store.keys(), vec!["b"]);
    }
}
