//! In-process controllers. Entries live in this process only and are never
//! serialized unless the model asks for it.
//!
//! None of them honor `CacheScope::ttl`. Entries have no expiry of their own
//! and leave only when the model flushes, including the whole-model flush
//! once its interval has elapsed.

use super::controller::{CacheController, CacheScope, CachedValue, Properties, numeric_property};
use crate::core::{MapperError, Result};
use async_trait::async_trait;
use lru::LruCache;
use std::collections::{HashMap, VecDeque};
use std::num::NonZeroUsize;
use std::sync::Mutex;

const DEFAULT_SIZE: usize = 100;

fn size_property(props: &Properties) -> Result<NonZeroUsize> {
    let size = numeric_property(props, "size")?.map_or(DEFAULT_SIZE, |s| s as usize);
    NonZeroUsize::new(size).ok_or_else(|| {
        MapperError::Configuration("Cache property 'size' must be greater than zero".to_string())
    })
}

/// Unbounded map.
#[derive(Debug, Default)]
pub struct MemoryController {
    entries: Mutex<HashMap<String, CachedValue>>,
}

impl MemoryController {
    pub fn new(_props: &Properties) -> Result<Self> {
        Ok(Self::default())
    }

    pub fn len(&self) -> Result<usize> {
        Ok(self.entries.lock()?.len())
    }
}

#[async_trait]
impl CacheController for MemoryController {
    fn name(&self) -> &str {
        "MEMORY"
    }

    async fn get(&self, _scope: &CacheScope, key: &str) -> Result<Option<CachedValue>> {
        Ok(self.entries.lock()?.get(key).cloned())
    }

    async fn put(&self, _scope: &CacheScope, key: &str, value: CachedValue) -> Result<()> {
        self.entries.lock()?.insert(key.to_string(), value);
        Ok(())
    }

    async fn remove(&self, _scope: &CacheScope, key: &str) -> Result<Option<CachedValue>> {
        Ok(self.entries.lock()?.remove(key))
    }

    async fn flush(&self, _scope: &CacheScope) -> Result<()> {
        self.entries.lock()?.clear();
        Ok(())
    }
}

/// Bounded by `size`; the least recently read entry is evicted first.
#[derive(Debug)]
pub struct LruController {
    entries: Mutex<LruCache<String, CachedValue>>,
}

impl LruController {
    pub fn new(props: &Properties) -> Result<Self> {
        Ok(Self {
            entries: Mutex::new(LruCache::new(size_property(props)?)),
        })
    }
}

#[async_trait]
impl CacheController for LruController {
    fn name(&self) -> &str {
        "LRU"
    }

    async fn get(&self, _scope: &CacheScope, key: &str) -> Result<Option<CachedValue>> {
        Ok(self.entries.lock()?.get(key).cloned())
    }

    async fn put(&self, _scope: &CacheScope, key: &str, value: CachedValue) -> Result<()> {
        self.entries.lock()?.put(key.to_string(), value);
        Ok(())
    }

    async fn remove(&self, _scope: &CacheScope, key: &str) -> Result<Option<CachedValue>> {
        Ok(self.entries.lock()?.pop(key))
    }

    async fn flush(&self, _scope: &CacheScope) -> Result<()> {
        self.entries.lock()?.clear();
        Ok(())
    }
}

#[derive(Debug, Default)]
struct FifoState {
    entries: HashMap<String, CachedValue>,
    order: VecDeque<String>,
}

/// Bounded by `size`; the oldest insertion is evicted first.
#[derive(Debug)]
pub struct FifoController {
    capacity: usize,
    state: Mutex<FifoState>,
}

impl FifoController {
    pub fn new(props: &Properties) -> Result<Self> {
        Ok(Self {
            capacity: size_property(props)?.get(),
            state: Mutex::new(FifoState::default()),
        })
    }
}

#[async_trait]
impl CacheController for FifoController {
    fn name(&self) -> &str {
        "FIFO"
    }

    async fn get(&self, _scope: &CacheScope, key: &str) -> Result<Option<CachedValue>> {
        Ok(self.state.lock()?.entries.get(key).cloned())
    }

    async fn put(&self, _scope: &CacheScope, key: &str, value: CachedValue) -> Result<()> {
        let mut state = self.state.lock()?;
        if state.entries.insert(key.to_string(), value).is_none() {
            state.order.push_back(key.to_string());
        }
        while state.order.len() > self.capacity {
            if let Some(oldest) = state.order.pop_front() {
                state.entries.remove(&oldest);
            }
        }
        Ok(())
    }

    async fn remove(&self, _scope: &CacheScope, key: &str) -> Result<Option<CachedValue>> {
        let mut state = self.state.lock()?;
        let removed = state.entries.remove(key);
        if removed.is_some() {
            state.order.retain(|k| k != key);
        }
        Ok(removed)
    }

    async fn flush(&self, _scope: &CacheScope) -> Result<()> {
        let mut state = self.state.lock()?;
        state.entries.clear();
        state.order.clear();
        Ok(())
    }
}
