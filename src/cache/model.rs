use super::controller::{
    CacheController, CacheScope, CachedValue, ControllerFactory, Properties, numeric_property,
};
use super::key::{CacheKey, backend_key};
use crate::core::{MapperError, Result};
use crate::result::QueryResult;
use std::fmt;
use std::future::Future;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex, MutexGuard};
use std::time::{Duration, Instant};
use tracing::{debug, warn};

pub const DEFAULT_NAMESPACE: &str = "sqlmapper";
pub const DEFAULT_TIMEOUT_MS: u64 = 500;

/// Settings of one cache model.
#[derive(Debug, Clone)]
pub struct CacheModelConfig {
    pub id: String,

    /// Registered controller name, e.g. `LRU` or `REDIS`.
    pub controller_type: String,

    /// Hand out shared results instead of copies.
    pub read_only: bool,

    /// Store serialized rows for models that copy on read.
    pub serialize: bool,

    /// Entry lifetime and whole-model flush period.
    pub flush_interval: Option<Duration>,

    /// Statements whose execution flushes this model.
    pub flush_on_execute: Vec<String>,

    pub properties: Properties,
}

impl CacheModelConfig {
    pub fn new(id: &str, controller_type: &str) -> Self {
        Self {
            id: id.to_string(),
            controller_type: controller_type.to_string(),
            read_only: true,
            serialize: false,
            flush_interval: None,
            flush_on_execute: Vec::new(),
            properties: Properties::new(),
        }
    }

    pub fn read_only(mut self, read_only: bool) -> Self {
        self.read_only = read_only;
        self
    }

    pub fn serialize(mut self, serialize: bool) -> Self {
        self.serialize = serialize;
        self
    }

    pub fn flush_interval(mut self, interval: Duration) -> Self {
        self.flush_interval = Some(interval);
        self
    }

    pub fn flush_on_execute(mut self, statement_id: &str) -> Self {
        self.flush_on_execute.push(statement_id.to_string());
        self
    }

    pub fn property(mut self, name: &str, value: &str) -> Self {
        self.properties.insert(name.to_string(), value.to_string());
        self
    }
}

/// Request counters of a model.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct CacheStats {
    pub requests: u64,
    pub hits: u64,
}

impl CacheStats {
    pub fn hit_ratio(&self) -> f64 {
        if self.requests == 0 {
            0.0
        } else {
            self.hits as f64 / self.requests as f64
        }
    }
}

/// A named cache scope over one controller.
///
/// Backend failures and timeouts never reach the caller: a failed read is a
/// miss, a failed write, remove or flush is logged and dropped.
pub struct CacheModel {
    id: String,
    read_only: bool,
    serialize: bool,
    flush_interval: Option<Duration>,
    flush_on_execute: Vec<String>,
    scope: CacheScope,
    timeout: Duration,
    controller: Arc<dyn CacheController>,
    last_flush: Mutex<Instant>,
    requests: AtomicU64,
    hits: AtomicU64,
}

impl CacheModel {
    pub fn new(config: CacheModelConfig, controller: Arc<dyn CacheController>) -> Result<Self> {
        if let Some(interval) = config.flush_interval {
            if interval < Duration::from_millis(1) {
                return Err(MapperError::Configuration(format!(
                    "Cache model '{}': A flush interval must specify one or more of \
                     milliseconds, seconds, minutes or hours.",
                    config.id
                )));
            }
        }

        let timeout_ms = numeric_property(&config.properties, "timeout_ms")?
            .unwrap_or(DEFAULT_TIMEOUT_MS);
        if timeout_ms == 0 {
            return Err(MapperError::Configuration(format!(
                "Cache model '{}': timeout_ms must be greater than zero",
                config.id
            )));
        }

        let namespace = config
            .properties
            .get("namespace")
            .cloned()
            .unwrap_or_else(|| DEFAULT_NAMESPACE.to_string());

        Ok(Self {
            scope: CacheScope::new(namespace, config.id.clone(), config.flush_interval),
            id: config.id,
            read_only: config.read_only,
            serialize: config.serialize,
            flush_interval: config.flush_interval,
            flush_on_execute: config.flush_on_execute,
            timeout: Duration::from_millis(timeout_ms),
            controller,
            last_flush: Mutex::new(Instant::now()),
            requests: AtomicU64::new(0),
            hits: AtomicU64::new(0),
        })
    }

    /// Builds the controller named by `config.controller_type`.
    pub fn from_config(config: CacheModelConfig, factory: &ControllerFactory) -> Result<Self> {
        let controller = factory
            .create(&config.controller_type, &config.properties)
            .map_err(|e| match e {
                MapperError::Configuration(msg) => {
                    MapperError::Configuration(format!("Cache model '{}': {}", config.id, msg))
                }
                other => other,
            })?;
        Self::new(config, controller)
    }

    pub fn id(&self) -> &str {
        &self.id
    }

    pub fn is_read_only(&self) -> bool {
        self.read_only
    }

    pub fn is_serialize(&self) -> bool {
        self.serialize
    }

    pub fn flush_interval(&self) -> Option<Duration> {
        self.flush_interval
    }

    pub fn flush_on_execute(&self) -> &[String] {
        &self.flush_on_execute
    }

    pub fn controller_name(&self) -> &str {
        self.controller.name()
    }

    pub fn namespace(&self) -> &str {
        &self.scope.namespace
    }

    pub fn timeout(&self) -> Duration {
        self.timeout
    }

    pub fn backend_key(&self, key: &CacheKey) -> String {
        backend_key(&self.scope.namespace, &self.id, key)
    }

    pub fn stats(&self) -> CacheStats {
        CacheStats {
            requests: self.requests.load(Ordering::Relaxed),
            hits: self.hits.load(Ordering::Relaxed),
        }
    }

    pub async fn get(&self, key: &CacheKey) -> Option<Arc<QueryResult>> {
        self.flush_if_due().await;
        self.requests.fetch_add(1, Ordering::Relaxed);

        let backend_key = self.backend_key(key);
        let cached = self
            .bounded("get", &backend_key, self.controller.get(&self.scope, &backend_key))
            .await
            .flatten()?;

        match self.to_result(cached) {
            Ok(rows) => {
                self.hits.fetch_add(1, Ordering::Relaxed);
                Some(rows)
            }
            Err(e) => {
                warn!(model = %self.id, key = %backend_key, "Unreadable cache entry: {}", e);
                None
            }
        }
    }

    pub async fn put(&self, key: &CacheKey, rows: Arc<QueryResult>) {
        self.flush_if_due().await;

        let backend_key = self.backend_key(key);
        let value = match self.to_cached(rows) {
            Ok(value) => value,
            Err(e) => {
                warn!(model = %self.id, key = %backend_key, "Could not serialize cache entry: {}", e);
                return;
            }
        };
        self.bounded("put", &backend_key, self.controller.put(&self.scope, &backend_key, value))
            .await;
    }

    pub async fn remove(&self, key: &CacheKey) -> Option<Arc<QueryResult>> {
        let backend_key = self.backend_key(key);
        let previous = self
            .bounded("remove", &backend_key, self.controller.remove(&self.scope, &backend_key))
            .await
            .flatten()?;
        self.to_result(previous).ok()
    }

    pub async fn flush(&self) {
        *self.last_flush_guard() = Instant::now();
        self.flush_controller().await;
    }

    async fn flush_controller(&self) {
        debug!(model = %self.id, "Flushing cache model");
        let prefix = self.scope.key_prefix();
        self.bounded("flush", &prefix, self.controller.flush(&self.scope))
            .await;
    }

    async fn flush_if_due(&self) {
        let Some(interval) = self.flush_interval else {
            return;
        };
        let due = {
            let mut last = self.last_flush_guard();
            if last.elapsed() >= interval {
                *last = Instant::now();
                true
            } else {
                false
            }
        };
        if due {
            self.flush_controller().await;
        }
    }

    fn last_flush_guard(&self) -> MutexGuard<'_, Instant> {
        self.last_flush
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
    }

    fn to_cached(&self, rows: Arc<QueryResult>) -> Result<CachedValue> {
        if self.serialize && !self.read_only {
            Ok(CachedValue::Bytes(rmp_serde::to_vec(rows.as_ref())?))
        } else {
            Ok(CachedValue::Rows(rows))
        }
    }

    fn to_result(&self, value: CachedValue) -> Result<Arc<QueryResult>> {
        match value {
            CachedValue::Rows(rows) if self.read_only => Ok(rows),
            CachedValue::Rows(rows) => Ok(Arc::new(rows.as_ref().clone())),
            CachedValue::Bytes(bytes) => Ok(Arc::new(rmp_serde::from_slice(&bytes)?)),
        }
    }

    /// Runs a controller call with the model's bounded wait.
    async fn bounded<T, F>(&self, operation: &str, key: &str, call: F) -> Option<T>
    where
        F: Future<Output = Result<T>>,
    {
        match tokio::time::timeout(self.timeout, call).await {
            Ok(Ok(value)) => Some(value),
            Ok(Err(e)) => {
                warn!(model = %self.id, key = %key, "Cache {} failed: {}", operation, e);
                None
            }
            Err(_) => {
                let e = MapperError::CacheTimeout(self.timeout);
                warn!(model = %self.id, key = %key, "Cache {} abandoned: {}", operation, e);
                None
            }
        }
    }
}

impl fmt::Debug for CacheModel {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("CacheModel")
            .field("id", &self.id)
            .field("controller", &self.controller)
            .field("read_only", &self.read_only)
            .field("serialize", &self.serialize)
            .field("flush_interval", &self.flush_interval)
            .field("flush_on_execute", &self.flush_on_execute)
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::cache::memory::MemoryController;
    use crate::core::Value;

    fn rows() -> Arc<QueryResult> {
        Arc::new(QueryResult::new(
            vec!["id".into()],
            vec![vec![Value::Integer(1)]],
        ))
    }

    fn key(n: i64) -> CacheKey {
        let mut key = CacheKey::new();
        key.update_str("Orders.find").update_number(n);
        key
    }

    fn memory() -> Arc<dyn CacheController> {
        Arc::new(MemoryController::default())
    }

    #[test]
    fn test_zero_flush_interval_rejected() {
        let config = CacheModelConfig::new("m", "MEMORY").flush_interval(Duration::ZERO);
        let err = CacheModel::new(config, memory()).unwrap_err();
        assert!(err.to_string().contains("flush interval"));
    }

    #[test]
    fn test_unknown_controller_names_model() {
        let config = CacheModelConfig::new("orders", "NOPE");
        let err = CacheModel::from_config(config, &ControllerFactory::new()).unwrap_err();
        assert!(err.to_string().contains("'orders'"));
    }

    #[tokio::test]
    async fn test_read_only_shares_entry() {
        let model = CacheModel::new(CacheModelConfig::new("m", "MEMORY"), memory()).unwrap();
        model.put(&key(1), rows()).await;
        let first = model.get(&key(1)).await.unwrap();
        let second = model.get(&key(1)).await.unwrap();
        assert!(Arc::ptr_eq(&first, &second));
        assert_eq!(model.stats(), CacheStats { requests: 2, hits: 2 });
    }

    #[tokio::test]
    async fn test_writable_model_copies() {
        for serialize in [false, true] {
            let config = CacheModelConfig::new("m", "MEMORY")
                .read_only(false)
                .serialize(serialize);
            let model = CacheModel::new(config, memory()).unwrap();
            model.put(&key(1), rows()).await;

            let mut first = model.get(&key(1)).await.unwrap();
            Arc::make_mut(&mut first).rows[0][0] = Value::Integer(99);

            let second = model.get(&key(1)).await.unwrap();
            assert_eq!(second.rows[0][0], Value::Integer(1));
        }
    }

    #[tokio::test]
    async fn test_interval_flushes_whole_model() {
        let config = CacheModelConfig::new("m", "MEMORY").flush_interval(Duration::from_millis(30));
        let model = CacheModel::new(config, memory()).unwrap();
        model.put(&key(1), rows()).await;
        assert!(model.get(&key(1)).await.is_some());

        tokio::time::sleep(Duration::from_millis(50)).await;
        assert!(model.get(&key(1)).await.is_none());
        assert!((model.stats().hit_ratio() - 0.5).abs() < f64::EPSILON);
    }
}
