//! Cache models and their pluggable storage controllers.
//!
//! A [`CacheModel`] turns a [`CacheKey`] into a canonical backend key, bounds
//! every controller call with a timeout and absorbs backend failures, so a
//! broken cache only ever costs a trip to the database.

pub mod controller;
pub mod key;
pub mod memcached;
pub mod memory;
pub mod model;
pub mod redis;
pub mod store;

pub use controller::{CacheController, CacheScope, CachedValue, ControllerFactory, Properties};
pub use key::{CacheKey, backend_key};
pub use memcached::{MemcachedClient, MemcachedController};
pub use memory::{FifoController, LruController, MemoryController};
pub use model::{CacheModel, CacheModelConfig, CacheStats};
pub use redis::{RedisClient, RedisController};
pub use store::InProcessStore;

#[cfg(feature = "redis")]
pub use redis::RedisConnectionClient;
