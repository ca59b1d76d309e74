use super::memcached::MemcachedController;
use super::memory::{FifoController, LruController, MemoryController};
use super::redis::RedisController;
use super::store::InProcessStore;
use crate::core::{MapperError, Result};
use crate::result::QueryResult;
use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, HashMap};
use std::fmt;
use std::sync::Arc;
use std::time::Duration;

/// Free-form controller settings from configuration.
pub type Properties = BTreeMap<String, String>;

/// Reads an optional numeric property.
pub fn numeric_property(props: &Properties, name: &str) -> Result<Option<u64>> {
    match props.get(name) {
        None => Ok(None),
        Some(raw) => raw.trim().parse::<u64>().map(Some).map_err(|_| {
            MapperError::Configuration(format!(
                "Cache property '{}' must be a non-negative integer, got '{}'",
                name, raw
            ))
        }),
    }
}

/// What a controller stores for one key.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum CachedValue {
    Rows(Arc<QueryResult>),
    /// Serialized rows, for models that copy on every read.
    Bytes(Vec<u8>),
}

impl CachedValue {
    pub fn encode(&self) -> Result<Vec<u8>> {
        Ok(rmp_serde::to_vec(self)?)
    }

    pub fn decode(bytes: &[u8]) -> Result<Self> {
        Ok(rmp_serde::from_slice(bytes)?)
    }
}

/// The part of a cache model a controller sees.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CacheScope {
    pub namespace: String,
    pub model_id: String,
    pub ttl: Option<Duration>,
}

impl CacheScope {
    pub fn new(namespace: impl Into<String>, model_id: impl Into<String>, ttl: Option<Duration>) -> Self {
        Self {
            namespace: namespace.into(),
            model_id: model_id.into(),
            ttl,
        }
    }

    /// Prefix shared by every backend key of the model.
    pub fn key_prefix(&self) -> String {
        format!("{}:{}:", self.namespace, self.model_id)
    }
}

/// Storage backend of a cache model.
///
/// Keys arrive already canonicalized and hashed, so every backend sees the
/// same key for the same logical query.
#[async_trait]
pub trait CacheController: Send + Sync + fmt::Debug {
    fn name(&self) -> &str;

    async fn get(&self, scope: &CacheScope, key: &str) -> Result<Option<CachedValue>>;

    async fn put(&self, scope: &CacheScope, key: &str, value: CachedValue) -> Result<()>;

    async fn remove(&self, scope: &CacheScope, key: &str) -> Result<Option<CachedValue>>;

    async fn flush(&self, scope: &CacheScope) -> Result<()>;
}

type ControllerConstructor =
    Arc<dyn Fn(&Properties) -> Result<Arc<dyn CacheController>> + Send + Sync>;

/// Controller constructors by configured type name.
#[derive(Clone)]
pub struct ControllerFactory {
    constructors: HashMap<String, ControllerConstructor>,
}

impl ControllerFactory {
    pub fn empty() -> Self {
        Self {
            constructors: HashMap::new(),
        }
    }

    /// Built-in controllers. `MEMCACHED` and `REDIS` share one in-process
    /// store until replaced through [`register`](Self::register).
    pub fn new() -> Self {
        let store = Arc::new(InProcessStore::new());
        Self::with_store(store)
    }

    pub fn with_store(store: Arc<InProcessStore>) -> Self {
        let mut factory = Self::empty();

        factory.register("MEMORY", |props| {
            Ok(Arc::new(MemoryController::new(props)?) as Arc<dyn CacheController>)
        });
        factory.register("LRU", |props| {
            Ok(Arc::new(LruController::new(props)?) as Arc<dyn CacheController>)
        });
        factory.register("FIFO", |props| {
            Ok(Arc::new(FifoController::new(props)?) as Arc<dyn CacheController>)
        });

        let memcached_store = Arc::clone(&store);
        factory.register("MEMCACHED", move |props| {
            let client = Arc::clone(&memcached_store);
            Ok(Arc::new(MemcachedController::new(client, props)?) as Arc<dyn CacheController>)
        });

        factory.register("REDIS", move |props| {
            let client = Arc::clone(&store);
            Ok(Arc::new(RedisController::new(client, props)?) as Arc<dyn CacheController>)
        });

        factory
    }

    /// Names are matched case-insensitively.
    pub fn register<F>(&mut self, name: &str, constructor: F) -> &mut Self
    where
        F: Fn(&Properties) -> Result<Arc<dyn CacheController>> + Send + Sync + 'static,
    {
        self.constructors
            .insert(name.to_ascii_uppercase(), Arc::new(constructor));
        self
    }

    pub fn contains(&self, name: &str) -> bool {
        self.constructors.contains_key(&name.to_ascii_uppercase())
    }

    pub fn create(&self, name: &str, props: &Properties) -> Result<Arc<dyn CacheController>> {
        let constructor = self
            .constructors
            .get(&name.to_ascii_uppercase())
            .ok_or_else(|| {
                MapperError::Configuration(format!("Unknown cache controller type '{}'", name))
            })?;
        constructor(props)
    }
}

impl Default for ControllerFactory {
    fn default() -> Self {
        Self::new()
    }
}

impl fmt::Debug for ControllerFactory {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let mut names: Vec<&String> = self.constructors.keys().collect();
        names.sort();
        f.debug_struct("ControllerFactory").field("names", &names).finish()
    }
}
