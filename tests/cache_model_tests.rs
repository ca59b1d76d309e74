use sqlmapper::cache::{CacheKey, CacheModel, CacheModelConfig, ControllerFactory, InProcessStore};
use sqlmapper::core::Value;
use sqlmapper::result::QueryResult;
use std::sync::Arc;
use std::time::Duration;

fn key(statement: &str, tag: u64, id: i64) -> CacheKey {
    let mut key = CacheKey::new();
    key.update_str(statement)
        .update_instance_tag(tag)
        .update_str("SELECT * FROM orders WHERE id = ?")
        .update_value(&Value::Integer(id));
    key
}

fn rows(id: i64) -> Arc<QueryResult> {
    Arc::new(QueryResult::new(
        vec!["ID".to_string(), "NOTE".to_string()],
        vec![vec![Value::Integer(id), Value::from(format!("order {}", id))]],
    ))
}

fn model(config: CacheModelConfig, store: &Arc<InProcessStore>) -> CacheModel {
    CacheModel::from_config(config, &ControllerFactory::with_store(Arc::clone(store))).unwrap()
}

#[tokio::test]
async fn test_put_then_get_hits() {
    let store = Arc::new(InProcessStore::new());
    let cache = model(CacheModelConfig::new("Orders.cache", "MEMORY"), &store);

    assert!(cache.get(&key("Orders.find", 1, 7)).await.is_none());
    cache.put(&key("Orders.find", 1, 7), rows(7)).await;

    let hit = cache.get(&key("Orders.find", 1, 7)).await.unwrap();
    assert_eq!(hit.first_value(), Some(&Value::Integer(7)));
    assert!(cache.get(&key("Orders.find", 1, 8)).await.is_none());

    let stats = cache.stats();
    assert_eq!(stats.requests, 3);
    assert_eq!(stats.hits, 1);
}

#[tokio::test]
async fn test_read_only_model_shares_entries() {
    let store = Arc::new(InProcessStore::new());
    let cache = model(CacheModelConfig::new("Orders.cache", "MEMORY"), &store);
    let stored = rows(1);
    cache.put(&key("Orders.find", 1, 1), Arc::clone(&stored)).await;

    let first = cache.get(&key("Orders.find", 1, 1)).await.unwrap();
    let second = cache.get(&key("Orders.find", 1, 1)).await.unwrap();
    assert!(Arc::ptr_eq(&first, &stored));
    assert!(Arc::ptr_eq(&first, &second));
}

#[tokio::test]
async fn test_writable_models_hand_out_copies() {
    let store = Arc::new(InProcessStore::new());
    for serialize in [false, true] {
        let cache = model(
            CacheModelConfig::new("Orders.cache", "LRU")
                .read_only(false)
                .serialize(serialize),
            &store,
        );
        cache.put(&key("Orders.find", 1, 1), rows(1)).await;

        let mut copy = cache.get(&key("Orders.find", 1, 1)).await.unwrap();
        Arc::make_mut(&mut copy).rows[0][0] = Value::Integer(99);

        let again = cache.get(&key("Orders.find", 1, 1)).await.unwrap();
        assert_eq!(again.first_value(), Some(&Value::Integer(1)));
        assert!(!Arc::ptr_eq(&copy, &again));
    }
}

#[tokio::test]
async fn test_instance_tag_does_not_change_backend_key() {
    let store = Arc::new(InProcessStore::new());
    let cache = model(CacheModelConfig::new("Orders.cache", "MEMCACHED"), &store);

    let from_first_instance = key("Orders.find", 3, 5);
    let from_second_instance = key("Orders.find", 12, 5);
    assert_ne!(from_first_instance, from_second_instance);
    assert_eq!(
        cache.backend_key(&from_first_instance),
        cache.backend_key(&from_second_instance)
    );

    cache.put(&from_first_instance, rows(5)).await;
    assert!(cache.get(&from_second_instance).await.is_some());
}

fn text_key(values: &[&str]) -> CacheKey {
    let mut key = CacheKey::new();
    key.update_str("Orders.search").update_instance_tag(1);
    for value in values {
        key.update_value(&Value::from(*value));
    }
    key
}

#[tokio::test]
async fn test_separators_inside_values_do_not_collide() {
    let store = Arc::new(InProcessStore::new());
    let cache = model(CacheModelConfig::new("Orders.cache", "MEMCACHED"), &store);

    let a = text_key(&["x|s:y", "z"]);
    let b = text_key(&["x", "y|s:z"]);
    assert_ne!(cache.backend_key(&a), cache.backend_key(&b));

    let c = text_key(&["p|Ab.cd|5|q"]);
    let d = text_key(&["p|Ab.cd|6|q"]);
    assert_ne!(cache.backend_key(&c), cache.backend_key(&d));

    cache.put(&a, rows(1)).await;
    cache.put(&c, rows(2)).await;
    assert!(cache.get(&b).await.is_none());
    assert!(cache.get(&d).await.is_none());
    assert!(cache.get(&a).await.is_some());
}

#[tokio::test]
async fn test_backend_key_layout() {
    let store = Arc::new(InProcessStore::new());
    let cache = model(
        CacheModelConfig::new("Orders.cache", "REDIS").property("namespace", "tenant1"),
        &store,
    );
    let backend_key = cache.backend_key(&key("Orders.find", 1, 1));
    let digest = backend_key.strip_prefix("tenant1:Orders.cache:").unwrap();
    assert_eq!(digest.len(), 64);
    assert!(digest.chars().all(|c| c.is_ascii_hexdigit()));
}

#[tokio::test]
async fn test_memcached_flush_walks_key_index() {
    let store = Arc::new(InProcessStore::new());
    let cache = model(CacheModelConfig::new("Orders.cache", "MEMCACHED"), &store);

    let keys: Vec<_> = (1..=3).map(|id| key("Orders.find", 1, id)).collect();
    for (id, k) in keys.iter().enumerate() {
        cache.put(k, rows(id as i64)).await;
    }
    for k in &keys {
        assert!(store.contains(&cache.backend_key(k)).unwrap());
    }

    cache.flush().await;
    for k in &keys {
        assert!(!store.contains(&cache.backend_key(k)).unwrap());
        assert!(cache.get(k).await.is_none());
    }
}

#[tokio::test]
async fn test_flush_reaches_entries_from_abandoned_puts() {
    let store = Arc::new(InProcessStore::new());
    let cache = model(
        CacheModelConfig::new("Orders.cache", "MEMCACHED").property("timeout_ms", "50"),
        &store,
    );
    store.set_latency(Some(Duration::from_millis(30))).unwrap();
    cache.put(&key("Orders.find", 1, 1), rows(1)).await;

    store.set_latency(None).unwrap();
    cache.flush().await;
    assert!(!store.contains(&cache.backend_key(&key("Orders.find", 1, 1))).unwrap());
    assert!(cache.get(&key("Orders.find", 1, 1)).await.is_none());
}

#[tokio::test]
async fn test_redis_flush_only_touches_its_model() {
    let store = Arc::new(InProcessStore::new());
    let orders = model(CacheModelConfig::new("Orders.cache", "REDIS"), &store);
    let accounts = model(CacheModelConfig::new("Accounts.cache", "REDIS"), &store);

    orders.put(&key("Orders.find", 1, 1), rows(1)).await;
    accounts.put(&key("Accounts.find", 1, 1), rows(2)).await;

    orders.flush().await;
    assert!(orders.get(&key("Orders.find", 1, 1)).await.is_none());
    assert!(accounts.get(&key("Accounts.find", 1, 1)).await.is_some());
}

#[tokio::test]
async fn test_slow_backend_degrades_to_miss() {
    let store = Arc::new(InProcessStore::new());
    let cache = model(
        CacheModelConfig::new("Orders.cache", "MEMCACHED").property("timeout_ms", "20"),
        &store,
    );
    store.set_latency(Some(Duration::from_millis(500))).unwrap();

    let started = tokio::time::Instant::now();
    cache.put(&key("Orders.find", 1, 1), rows(1)).await;
    assert!(cache.get(&key("Orders.find", 1, 1)).await.is_none());
    assert!(started.elapsed() < Duration::from_millis(400));

    store.set_latency(None).unwrap();
    assert!(cache.get(&key("Orders.find", 1, 1)).await.is_none());
}

#[tokio::test]
async fn test_unavailable_backend_degrades_to_miss() {
    let store = Arc::new(InProcessStore::new());
    let cache = model(CacheModelConfig::new("Orders.cache", "REDIS"), &store);
    cache.put(&key("Orders.find", 1, 1), rows(1)).await;

    store.set_available(false);
    assert!(cache.get(&key("Orders.find", 1, 1)).await.is_none());
    cache.put(&key("Orders.find", 1, 2), rows(2)).await;
    cache.flush().await;

    store.set_available(true);
    assert!(cache.get(&key("Orders.find", 1, 1)).await.is_some());
    assert!(cache.get(&key("Orders.find", 1, 2)).await.is_none());
}

#[tokio::test]
async fn test_flush_interval_expires_whole_model() {
    let store = Arc::new(InProcessStore::new());
    let cache = model(
        CacheModelConfig::new("Orders.cache", "FIFO").flush_interval(Duration::from_millis(30)),
        &store,
    );
    cache.put(&key("Orders.find", 1, 1), rows(1)).await;
    assert!(cache.get(&key("Orders.find", 1, 1)).await.is_some());

    tokio::time::sleep(Duration::from_millis(60)).await;
    assert!(cache.get(&key("Orders.find", 1, 1)).await.is_none());
}

#[tokio::test]
async fn test_lru_model_evicts_least_recent() {
    let store = Arc::new(InProcessStore::new());
    let cache = model(
        CacheModelConfig::new("Orders.cache", "LRU").property("size", "2"),
        &store,
    );
    cache.put(&key("Orders.find", 1, 1), rows(1)).await;
    cache.put(&key("Orders.find", 1, 2), rows(2)).await;
    assert!(cache.get(&key("Orders.find", 1, 1)).await.is_some());

    cache.put(&key("Orders.find", 1, 3), rows(3)).await;
    assert!(cache.get(&key("Orders.find", 1, 2)).await.is_none());
    assert!(cache.get(&key("Orders.find", 1, 1)).await.is_some());
    assert!(cache.get(&key("Orders.find", 1, 3)).await.is_some());
}

#[test]
fn test_invalid_model_configurations() {
    let factory = ControllerFactory::new();

    let err = CacheModel::from_config(CacheModelConfig::new("Orders.cache", "ETCD"), &factory)
        .unwrap_err();
    assert!(err.to_string().contains("Orders.cache"));

    let err = CacheModel::from_config(
        CacheModelConfig::new("Orders.cache", "MEMORY").flush_interval(Duration::ZERO),
        &factory,
    )
    .unwrap_err();
    assert!(err.to_string().contains("A flush interval must specify"));

    let err = CacheModel::from_config(
        CacheModelConfig::new("Orders.cache", "MEMORY").property("timeout_ms", "0"),
        &factory,
    )
    .unwrap_err();
    assert!(err.is_configuration());
}
