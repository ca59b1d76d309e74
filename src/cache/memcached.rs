//! Controller for a memcached-style backend.
//!
//! Memcached cannot list keys, so the controller keeps a set of live keys
//! per model under `{namespace}:keyset:{model_id}` and flushes by walking
//! it. The index only has to be good enough for flush: a hit on a key that
//! is missing from it puts the key back.

use super::controller::{CacheController, CacheScope, CachedValue, Properties, numeric_property};
use crate::core::Result;
use async_trait::async_trait;
use std::collections::BTreeSet;
use std::fmt;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::Mutex;
use tracing::{debug, error, warn};

const DEFAULT_DELETE_RETRIES: u64 = 3;
const DEFAULT_RETRY_DELAY_MS: u64 = 500;

#[async_trait]
pub trait MemcachedClient: Send + Sync + fmt::Debug {
    async fn get(&self, key: &str) -> Result<Option<Vec<u8>>>;

    /// `ttl_secs == 0` never expires.
    async fn set(&self, key: &str, value: Vec<u8>, ttl_secs: u32) -> Result<()>;

    /// False when the backend did not delete the key.
    async fn delete(&self, key: &str) -> Result<bool>;
}

pub struct MemcachedController {
    client: Arc<dyn MemcachedClient>,
    delete_retries: u64,
    retry_delay: Duration,
    /// Serializes read-modify-write of the key index within this process.
    index_lock: Mutex<()>,
}

impl MemcachedController {
    pub fn new(client: Arc<dyn MemcachedClient>, props: &Properties) -> Result<Self> {
        let delete_retries =
            numeric_property(props, "delete_retries")?.unwrap_or(DEFAULT_DELETE_RETRIES);
        let retry_delay_ms =
            numeric_property(props, "retry_delay_ms")?.unwrap_or(DEFAULT_RETRY_DELAY_MS);

        Ok(Self {
            client,
            delete_retries: delete_retries.max(1),
            retry_delay: Duration::from_millis(retry_delay_ms),
            index_lock: Mutex::new(()),
        })
    }

    fn index_key(scope: &CacheScope) -> String {
        format!("{}:keyset:{}", scope.namespace, scope.model_id)
    }

    /// Expiry in whole seconds, rounded up so short intervals still expire.
    fn ttl_secs(scope: &CacheScope) -> u32 {
        scope.ttl.map_or(0, |ttl| {
            let millis = ttl.as_millis();
            let secs = millis.div_ceil(1000).max(1);
            u32::try_from(secs).unwrap_or(u32::MAX)
        })
    }

    async fn read_index(&self, scope: &CacheScope) -> Result<BTreeSet<String>> {
        match self.client.get(&Self::index_key(scope)).await? {
            Some(bytes) => match rmp_serde::from_slice(&bytes) {
                Ok(keys) => Ok(keys),
                Err(e) => {
                    warn!(model = %scope.model_id, "Discarding unreadable key index: {}", e);
                    Ok(BTreeSet::new())
                }
            },
            None => Ok(BTreeSet::new()),
        }
    }

    async fn write_index(&self, scope: &CacheScope, keys: &BTreeSet<String>) -> Result<()> {
        let bytes = rmp_serde::to_vec(keys)?;
        self.client.set(&Self::index_key(scope), bytes, 0).await
    }

    async fn index_insert(&self, scope: &CacheScope, key: &str) -> Result<()> {
        let _guard = self.index_lock.lock().await;
        let mut keys = self.read_index(scope).await?;
        if keys.insert(key.to_string()) {
            self.write_index(scope, &keys).await?;
        }
        Ok(())
    }

    async fn index_remove(&self, scope: &CacheScope, key: &str) -> Result<()> {
        let _guard = self.index_lock.lock().await;
        let mut keys = self.read_index(scope).await?;
        if keys.remove(key) {
            self.write_index(scope, &keys).await?;
        }
        Ok(())
    }

    async fn index_contains(&self, scope: &CacheScope, key: &str) -> Result<bool> {
        Ok(self.read_index(scope).await?.contains(key))
    }

    /// Deletes `key`, retrying while the backend reports nothing deleted.
    async fn delete_with_retry(&self, scope: &CacheScope, key: &str) -> Result<bool> {
        for attempt in 0..self.delete_retries {
            if self.client.delete(key).await? {
                return Ok(true);
            }
            if attempt + 1 < self.delete_retries {
                error!(
                    model = %scope.model_id,
                    key = %key,
                    "Cache delete did not succeed, retrying ({}/{})",
                    attempt + 1,
                    self.delete_retries
                );
                tokio::time::sleep(self.retry_delay).await;
            }
        }
        Ok(false)
    }
}

impl fmt::Debug for MemcachedController {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("MemcachedController")
            .field("client", &self.client)
            .field("delete_retries", &self.delete_retries)
            .field("retry_delay", &self.retry_delay)
            .finish()
    }
}

#[async_trait]
impl CacheController for MemcachedController {
    fn name(&self) -> &str {
        "MEMCACHED"
    }

    async fn get(&self, scope: &CacheScope, key: &str) -> Result<Option<CachedValue>> {
        let Some(bytes) = self.client.get(key).await? else {
            return Ok(None);
        };
        let value = CachedValue::decode(&bytes)?;

        if !self.index_contains(scope, key).await? {
            debug!(model = %scope.model_id, key = %key, "Restoring key missing from index");
            self.index_insert(scope, key).await?;
        }
        Ok(Some(value))
    }

    async fn put(&self, scope: &CacheScope, key: &str, value: CachedValue) -> Result<()> {
        let bytes = value.encode()?;
        // Index first: a put cut short afterwards leaves a stale index entry,
        // which flush tolerates, never an entry flush cannot find.
        self.index_insert(scope, key).await?;
        self.client.set(key, bytes, Self::ttl_secs(scope)).await
    }

    async fn remove(&self, scope: &CacheScope, key: &str) -> Result<Option<CachedValue>> {
        let previous = match self.client.get(key).await? {
            Some(bytes) => Some(CachedValue::decode(&bytes)?),
            None => None,
        };

        if previous.is_none() {
            self.index_remove(scope, key).await?;
            return Ok(None);
        }

        if self.delete_with_retry(scope, key).await? {
            self.index_remove(scope, key).await?;
        } else {
            error!(
                model = %scope.model_id,
                key = %key,
                "Cache delete failed after {} attempts",
                self.delete_retries
            );
        }
        Ok(previous)
    }

    async fn flush(&self, scope: &CacheScope) -> Result<()> {
        let keys = self.read_index(scope).await?;
        debug!(model = %scope.model_id, keys = keys.len(), "Flushing indexed keys");
        for key in keys {
            self.remove(scope, &key).await?;
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::cache::store::InProcessStore;
    use crate::result::QueryResult;

    fn value(n: i64) -> CachedValue {
        CachedValue::Rows(Arc::new(QueryResult::new(
            vec!["n".into()],
            vec![vec![crate::core::Value::Integer(n)]],
        )))
    }

    fn fast_retries() -> Properties {
        let mut props = Properties::new();
        props.insert("retry_delay_ms".into(), "1".into());
        props
    }

    #[tokio::test]
    async fn test_flush_walks_index() {
        let store = Arc::new(InProcessStore::new());
        let controller = MemcachedController::new(store.clone(), &fast_retries()).unwrap();
        let scope = CacheScope::new("ns", "orders", None);

        controller.put(&scope, "ns:orders:a", value(1)).await.unwrap();
        controller.put(&scope, "ns:orders:b", value(2)).await.unwrap();
        assert!(store.contains("ns:keyset:orders").unwrap());

        controller.flush(&scope).await.unwrap();
        assert!(controller.get(&scope, "ns:orders:a").await.unwrap().is_none());
        assert!(controller.get(&scope, "ns:orders:b").await.unwrap().is_none());
        assert!(controller.read_index(&scope).await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_interrupted_put_stays_flushable() {
        let store = Arc::new(InProcessStore::new());
        let controller = MemcachedController::new(store.clone(), &fast_retries()).unwrap();
        let scope = CacheScope::new("ns", "orders", None);

        // Index read and write finish at 80ms; the data write is still pending at 100ms.
        store.set_latency(Some(Duration::from_millis(40))).unwrap();
        let cut = tokio::time::timeout(
            Duration::from_millis(100),
            controller.put(&scope, "ns:orders:a", value(1)),
        )
        .await;
        assert!(cut.is_err());
        store.set_latency(None).unwrap();

        controller.flush(&scope).await.unwrap();
        assert!(!store.contains("ns:orders:a").unwrap());
        assert!(controller.read_index(&scope).await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_hit_repairs_lost_index() {
        let store = Arc::new(InProcessStore::new());
        let controller = MemcachedController::new(store.clone(), &fast_retries()).unwrap();
        let scope = CacheScope::new("ns", "orders", None);

        controller.put(&scope, "ns:orders:a", value(1)).await.unwrap();
        store.evict("ns:keyset:orders").unwrap();

        assert!(controller.get(&scope, "ns:orders:a").await.unwrap().is_some());
        assert!(controller.index_contains(&scope, "ns:orders:a").await.unwrap());

        controller.flush(&scope).await.unwrap();
        assert!(!store.contains("ns:orders:a").unwrap());
    }

    #[tokio::test]
    async fn test_remove_retries_failed_delete() {
        let store = Arc::new(InProcessStore::new());
        let controller = MemcachedController::new(store.clone(), &fast_retries()).unwrap();
        let scope = CacheScope::new("ns", "orders", None);

        controller.put(&scope, "ns:orders:a", value(1)).await.unwrap();
        store.fail_next_deletes(2);

        assert_eq!(controller.remove(&scope, "ns:orders:a").await.unwrap(), Some(value(1)));
        assert!(!store.contains("ns:orders:a").unwrap());
        assert!(!controller.index_contains(&scope, "ns:orders:a").await.unwrap());
    }

    #[test]
    fn test_ttl_rounds_up() {
        let scope = CacheScope::new("ns", "m", Some(Duration::from_millis(1500)));
        assert_eq!(MemcachedController::ttl_secs(&scope), 2);
        let scope = CacheScope::new("ns", "m", Some(Duration::from_millis(1)));
        assert_eq!(MemcachedController::ttl_secs(&scope), 1);
        let scope = CacheScope::new("ns", "m", None);
        assert_eq!(MemcachedController::ttl_secs(&scope), 0);
    }
}
