//! Controller for a redis-style backend with native per-key expiry and key
//! listing by pattern.

use super::controller::{CacheController, CacheScope, CachedValue, Properties};
use crate::core::Result;
use async_trait::async_trait;
use std::fmt;
use std::sync::Arc;
use std::time::Duration;
use tracing::debug;

#[async_trait]
pub trait RedisClient: Send + Sync + fmt::Debug {
    async fn get(&self, key: &str) -> Result<Option<Vec<u8>>>;

    /// `None` stores without expiry.
    async fn set(&self, key: &str, value: Vec<u8>, ttl: Option<Duration>) -> Result<()>;

    async fn del(&self, keys: &[String]) -> Result<u64>;

    /// Keys matching a `*` glob.
    async fn keys(&self, pattern: &str) -> Result<Vec<String>>;
}

#[derive(Debug)]
pub struct RedisController {
    client: Arc<dyn RedisClient>,
}

impl RedisController {
    pub fn new(client: Arc<dyn RedisClient>, _props: &Properties) -> Result<Self> {
        Ok(Self { client })
    }
}

#[async_trait]
impl CacheController for RedisController {
    fn name(&self) -> &str {
        "REDIS"
    }

    async fn get(&self, _scope: &CacheScope, key: &str) -> Result<Option<CachedValue>> {
        match self.client.get(key).await? {
            Some(bytes) => Ok(Some(CachedValue::decode(&bytes)?)),
            None => Ok(None),
        }
    }

    async fn put(&self, scope: &CacheScope, key: &str, value: CachedValue) -> Result<()> {
        let bytes = value.encode()?;
        self.client.set(key, bytes, scope.ttl).await
    }

    async fn remove(&self, scope: &CacheScope, key: &str) -> Result<Option<CachedValue>> {
        let previous = self.get(scope, key).await?;
        self.client.del(&[key.to_string()]).await?;
        Ok(previous)
    }

    async fn flush(&self, scope: &CacheScope) -> Result<()> {
        let pattern = format!("{}*", scope.key_prefix());
        let keys = self.client.keys(&pattern).await?;
        if keys.is_empty() {
            return Ok(());
        }
        let deleted = self.client.del(&keys).await?;
        debug!(model = %scope.model_id, deleted, "Flushed keys by pattern");
        Ok(())
    }
}

#[cfg(feature = "redis")]
pub use connection::RedisConnectionClient;

#[cfg(feature = "redis")]
mod connection {
    use super::RedisClient;
    use crate::core::{MapperError, Result};
    use async_trait::async_trait;
    use redis::AsyncCommands;
    use redis::aio::ConnectionManager;
    use std::fmt;
    use std::time::Duration;
    use tracing::{error, info};

    /// [`RedisClient`] over a real server, reconnecting automatically.
    #[derive(Clone)]
    pub struct RedisConnectionClient {
        manager: ConnectionManager,
    }

    impl RedisConnectionClient {
        pub async fn connect(url: &str) -> Result<Self> {
            info!("Connecting to Redis at {}", url);
            let client = redis::Client::open(url).map_err(|e| {
                MapperError::Configuration(format!("Invalid Redis URL '{}': {}", url, e))
            })?;
            let manager = ConnectionManager::new(client)
                .await
                .map_err(|e| backend_error("connect", e))?;
            Ok(Self { manager })
        }
    }

    impl fmt::Debug for RedisConnectionClient {
        fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
            f.write_str("RedisConnectionClient")
        }
    }

    fn backend_error(operation: &str, err: redis::RedisError) -> MapperError {
        error!("Redis {} failed: {}", operation, err);
        MapperError::CacheBackend(format!("Redis {} failed: {}", operation, err))
    }

    #[async_trait]
    impl RedisClient for RedisConnectionClient {
        async fn get(&self, key: &str) -> Result<Option<Vec<u8>>> {
            let mut conn = self.manager.clone();
            conn.get(key).await.map_err(|e| backend_error("GET", e))
        }

        async fn set(&self, key: &str, value: Vec<u8>, ttl: Option<Duration>) -> Result<()> {
            let mut conn = self.manager.clone();
            match ttl {
                Some(ttl) => {
                    let millis = u64::try_from(ttl.as_millis()).unwrap_or(u64::MAX).max(1);
                    conn.pset_ex::<_, _, ()>(key, value, millis)
                        .await
                        .map_err(|e| backend_error("PSETEX", e))
                }
                None => conn
                    .set::<_, _, ()>(key, value)
                    .await
                    .map_err(|e| backend_error("SET", e)),
            }
        }

        async fn del(&self, keys: &[String]) -> Result<u64> {
            let mut conn = self.manager.clone();
            conn.del(keys).await.map_err(|e| backend_error("DEL", e))
        }

        async fn keys(&self, pattern: &str) -> Result<Vec<String>> {
            let mut conn = self.manager.clone();
            let mut found = Vec::new();
            let mut cursor = 0u64;
            loop {
                let (next, batch): (u64, Vec<String>) = redis::cmd("SCAN")
                    .arg(cursor)
                    .arg("MATCH")
                    .arg(pattern)
                    .arg("COUNT")
                    .arg(100)
                    .query_async(&mut conn)
                    .await
                    .map_err(|e| backend_error("SCAN", e))?;
                found.extend(batch);
                cursor = next;
                if cursor == 0 {
                    break;
                }
            }
            Ok(found)
        }
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

    #[tokio::test]
    async fn test_flush_only_touches_own_model() {
        let store = Arc::new(InProcessStore::new());
        let controller = RedisController::new(store.clone(), &Properties::new()).unwrap();
        let orders = CacheScope::new("ns", "orders", None);
        let users = CacheScope::new("ns", "users", None);

        controller.put(&orders, "ns:orders:1", value(1)).await.unwrap();
        controller.put(&users, "ns:users:1", value(2)).await.unwrap();
        controller.flush(&orders).await.unwrap();

        assert!(controller.get(&orders, "ns:orders:1").await.unwrap().is_none());
        assert_eq!(controller.get(&users, "ns:users:1").await.unwrap(), Some(value(2)));
    }

    #[tokio::test]
    async fn test_native_expiry() {
        let store = Arc::new(InProcessStore::new());
        let controller = RedisController::new(store, &Properties::new()).unwrap();
        let scope = CacheScope::new("ns", "m", Some(Duration::from_millis(20)));

        controller.put(&scope, "ns:m:1", value(1)).await.unwrap();
        assert!(controller.get(&scope, "ns:m:1").await.unwrap().is_some());
        tokio::time::sleep(Duration::from_millis(40)).await;
        assert!(controller.get(&scope, "ns:m:1").await.unwrap().is_none());
    }
}
