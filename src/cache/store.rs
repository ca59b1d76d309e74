//! Embedded key/value store speaking both remote client protocols.
//!
//! Lets the `MEMCACHED` and `REDIS` controllers run without a server, and
//! can inject latency, outages and failed deletes to exercise the
//! degradation paths.

use super::memcached::MemcachedClient;
use super::redis::RedisClient;
use crate::core::{MapperError, Result};
use async_trait::async_trait;
use regex::Regex;
use std::collections::HashMap;
use std::sync::Mutex;
use std::sync::atomic::{AtomicBool, AtomicU32, Ordering};
use std::time::{Duration, Instant};

#[derive(Debug, Clone)]
struct StoredEntry {
    bytes: Vec<u8>,
    expires_at: Option<Instant>,
}

impl StoredEntry {
    fn is_live(&self, now: Instant) -> bool {
        self.expires_at.is_none_or(|at| at > now)
    }
}

#[derive(Debug)]
pub struct InProcessStore {
    entries: Mutex<HashMap<String, StoredEntry>>,
    latency: Mutex<Option<Duration>>,
    available: AtomicBool,
    failing_deletes: AtomicU32,
}

impl InProcessStore {
    pub fn new() -> Self {
        Self {
            entries: Mutex::new(HashMap::new()),
            latency: Mutex::new(None),
            available: AtomicBool::new(true),
            failing_deletes: AtomicU32::new(0),
        }
    }

    /// Delay applied before every operation.
    pub fn set_latency(&self, latency: Option<Duration>) -> Result<()> {
        *self.latency.lock()? = latency;
        Ok(())
    }

    /// While unavailable every operation fails with a backend error.
    pub fn set_available(&self, available: bool) {
        self.available.store(available, Ordering::SeqCst);
    }

    /// The next `count` deletes report that nothing was deleted.
    pub fn fail_next_deletes(&self, count: u32) {
        self.failing_deletes.store(count, Ordering::SeqCst);
    }

    /// Drops a key behind the clients' backs, as an eviction would.
    pub fn evict(&self, key: &str) -> Result<bool> {
        Ok(self.entries.lock()?.remove(key).is_some())
    }

    pub fn contains(&self, key: &str) -> Result<bool> {
        let now = Instant::now();
        Ok(self
            .entries
            .lock()?
            .get(key)
            .is_some_and(|entry| entry.is_live(now)))
    }

    pub fn len(&self) -> Result<usize> {
        let now = Instant::now();
        Ok(self
            .entries
            .lock()?
            .values()
            .filter(|entry| entry.is_live(now))
            .count())
    }

    pub fn is_empty(&self) -> Result<bool> {
        Ok(self.len()? == 0)
    }

    async fn before_operation(&self) -> Result<()> {
        let latency = *self.latency.lock()?;
        if let Some(delay) = latency {
            tokio::time::sleep(delay).await;
        }
        if !self.available.load(Ordering::SeqCst) {
            return Err(MapperError::CacheBackend(
                "in-process store is unavailable".to_string(),
            ));
        }
        Ok(())
    }

    fn read(&self, key: &str) -> Result<Option<Vec<u8>>> {
        let now = Instant::now();
        let mut entries = self.entries.lock()?;
        match entries.get(key) {
            Some(entry) if entry.is_live(now) => Ok(Some(entry.bytes.clone())),
            Some(_) => {
                entries.remove(key);
                Ok(None)
            }
            None => Ok(None),
        }
    }

    fn write(&self, key: &str, bytes: Vec<u8>, ttl: Option<Duration>) -> Result<()> {
        let expires_at = ttl.map(|ttl| Instant::now() + ttl);
        self.entries
            .lock()?
            .insert(key.to_string(), StoredEntry { bytes, expires_at });
        Ok(())
    }

    fn delete_one(&self, key: &str) -> Result<bool> {
        let pending = self.failing_deletes.load(Ordering::SeqCst);
        if pending > 0 {
            self.failing_deletes.store(pending - 1, Ordering::SeqCst);
            return Ok(false);
        }
        let now = Instant::now();
        Ok(self
            .entries
            .lock()?
            .remove(key)
            .is_some_and(|entry| entry.is_live(now)))
    }
}

impl Default for InProcessStore {
    fn default() -> Self {
        Self::new()
    }
}

/// Translates a `*`/`?` glob into an anchored regex.
fn glob_to_regex(pattern: &str) -> Result<Regex> {
    let mut expr = String::with_capacity(pattern.len() + 2);
    expr.push('^');
    for c in pattern.chars() {
        match c {
            '*' => expr.push_str(".*"),
            '?' => expr.push('.'),
            c => expr.push_str(&regex::escape(&c.to_string())),
        }
    }
    expr.push('$');
    Regex::new(&expr).map_err(|e| MapperError::CacheBackend(format!("Bad key pattern: {}", e)))
}

#[async_trait]
impl MemcachedClient for InProcessStore {
    async fn get(&self, key: &str) -> Result<Option<Vec<u8>>> {
        self.before_operation().await?;
        self.read(key)
    }

    async fn set(&self, key: &str, value: Vec<u8>, ttl_secs: u32) -> Result<()> {
        self.before_operation().await?;
        let ttl = (ttl_secs > 0).then(|| Duration::from_secs(u64::from(ttl_secs)));
        self.write(key, value, ttl)
    }

    async fn delete(&self, key: &str) -> Result<bool> {
        self.before_operation().await?;
        self.delete_one(key)
    }
}

#[async_trait]
impl RedisClient for InProcessStore {
    async fn get(&self, key: &str) -> Result<Option<Vec<u8>>> {
        self.before_operation().await?;
        self.read(key)
    }

    async fn set(&self, key: &str, value: Vec<u8>, ttl: Option<Duration>) -> Result<()> {
        self.before_operation().await?;
        self.write(key, value, ttl)
    }

    async fn del(&self, keys: &[String]) -> Result<u64> {
        self.before_operation().await?;
        let mut deleted = 0;
        for key in keys {
            if self.delete_one(key)? {
                deleted += 1;
            }
        }
        Ok(deleted)
    }

    async fn keys(&self, pattern: &str) -> Result<Vec<String>> {
        self.before_operation().await?;
        let matcher = glob_to_regex(pattern)?;
        let now = Instant::now();
        let mut keys: Vec<String> = self
            .entries
            .lock()?
            .iter()
            .filter(|(key, entry)| entry.is_live(now) && matcher.is_match(key))
            .map(|(key, _)| key.clone())
            .collect();
        keys.sort();
        Ok(keys)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_expiry() {
        let store = InProcessStore::new();
        RedisClient::set(&store, "k", vec![1], Some(Duration::from_millis(20)))
            .await
            .unwrap();
        assert!(store.contains("k").unwrap());
        tokio::time::sleep(Duration::from_millis(40)).await;
        assert_eq!(RedisClient::get(&store, "k").await.unwrap(), None);
    }

    #[tokio::test]
    async fn test_glob_keys() {
        let store = InProcessStore::new();
        for key in ["ns:a:1", "ns:a:2", "ns:b:1", "ns:ab:1"] {
            RedisClient::set(&store, key, vec![0], None).await.unwrap();
        }
        let keys = store.keys("ns:a:*").await.unwrap();
        assert_eq!(keys, vec!["ns:a:1".to_string(), "ns:a:2".to_string()]);
    }

    #[tokio::test]
    async fn test_unavailable_and_failed_deletes() {
        let store = InProcessStore::new();
        MemcachedClient::set(&store, "k", vec![1], 0).await.unwrap();

        store.fail_next_deletes(1);
        assert!(!store.delete("k").await.unwrap());
        assert!(store.delete("k").await.unwrap());

        store.set_available(false);
        assert!(MemcachedClient::get(&store, "k").await.unwrap_err().is_cache_backend());
    }
}
