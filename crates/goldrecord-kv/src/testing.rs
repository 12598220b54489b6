//! A conformance suite any [`KvStore`] backend should pass, composed of
//! small independent `test_xxx` helpers so a backend's own test module can
//! call `run_kv_conformance_tests(&backend).await` and get the same
//! guarantees the in-memory backend is tested against.

use std::time::Duration;

use crate::store::KvStore;

pub async fn run_kv_conformance_tests(store: &dyn KvStore) {
    test_string_roundtrip(store).await;
    test_string_ttl_expires(store).await;
    test_del_removes_key(store).await;
    test_list_push_and_range(store).await;
    test_list_brpop_returns_none_on_empty_timeout(store).await;
    test_lrem_removes_matching(store).await;
    test_hash_roundtrip(store).await;
    test_set_roundtrip_and_card(store).await;
    test_expire_nonexistent_key_returns_false(store).await;
}

async fn test_string_roundtrip(store: &dyn KvStore) {
    let key = unique_key("str");
    assert_eq!(store.get(&key).await.unwrap(), None);
    store.set(&key, "hello", None).await.unwrap();
    assert_eq!(store.get(&key).await.unwrap(), Some("hello".to_string()));
}

async fn test_string_ttl_expires(store: &dyn KvStore) {
    let key = unique_key("ttl");
    store.set(&key, "soon-gone", Some(Duration::from_millis(20))).await.unwrap();
    assert_eq!(store.get(&key).await.unwrap(), Some("soon-gone".to_string()));
    tokio::time::sleep(Duration::from_millis(60)).await;
    assert_eq!(store.get(&key).await.unwrap(), None);
}

async fn test_del_removes_key(store: &dyn KvStore) {
    let key = unique_key("del");
    store.set(&key, "x", None).await.unwrap();
    assert!(store.del(&key).await.unwrap());
    assert!(!store.del(&key).await.unwrap());
    assert_eq!(store.get(&key).await.unwrap(), None);
}

async fn test_list_push_and_range(store: &dyn KvStore) {
    let key = unique_key("list");
    store.lpush(&key, "a").await.unwrap();
    store.lpush(&key, "b").await.unwrap();
    store.lpush(&key, "c").await.unwrap();
    assert_eq!(store.llen(&key).await.unwrap(), 3);
    // lpush is a left-push; the full range reads newest-to-oldest.
    assert_eq!(store.lrange(&key, 0, -1).await.unwrap(), vec!["c", "b", "a"]);
    let popped = store.brpop(&key, Duration::from_millis(100)).await.unwrap();
    assert_eq!(popped, Some("a".to_string()));
}

async fn test_list_brpop_returns_none_on_empty_timeout(store: &dyn KvStore) {
    let key = unique_key("empty-list");
    let started = tokio::time::Instant::now();
    let popped = store.brpop(&key, Duration::from_millis(50)).await.unwrap();
    assert_eq!(popped, None);
    assert!(started.elapsed() >= Duration::from_millis(40));
}

async fn test_lrem_removes_matching(store: &dyn KvStore) {
    let key = unique_key("lrem");
    for v in ["x", "y", "x", "z", "x"] {
        store.lpush(&key, v).await.unwrap();
    }
    let removed = store.lrem(&key, 2, "x").await.unwrap();
    assert_eq!(removed, 2);
    let remaining = store.lrange(&key, 0, -1).await.unwrap();
    assert_eq!(remaining.iter().filter(|v| *v == "x").count(), 1);
}

async fn test_hash_roundtrip(store: &dyn KvStore) {
    let key = unique_key("hash");
    store.hset(&key, "status", "queued").await.unwrap();
    store.hset(&key, "provider", "FastPeopleSearch").await.unwrap();
    assert_eq!(store.hget(&key, "status").await.unwrap(), Some("queued".to_string()));
    let mut all = store.hgetall(&key).await.unwrap();
    all.sort();
    assert_eq!(
        all,
        vec![
            ("provider".to_string(), "FastPeopleSearch".to_string()),
            ("status".to_string(), "queued".to_string()),
        ]
    );
    assert!(store.hdel(&key, "status").await.unwrap());
    assert_eq!(store.hget(&key, "status").await.unwrap(), None);
}

async fn test_set_roundtrip_and_card(store: &dyn KvStore) {
    let key = unique_key("set");
    assert!(store.sadd(&key, "lead-1").await.unwrap());
    assert!(!store.sadd(&key, "lead-1").await.unwrap());
    store.sadd(&key, "lead-2").await.unwrap();
    assert_eq!(store.scard(&key).await.unwrap(), 2);
    assert!(store.srem(&key, "lead-1").await.unwrap());
    assert_eq!(store.scard(&key).await.unwrap(), 1);
}

async fn test_expire_nonexistent_key_returns_false(store: &dyn KvStore) {
    let key = unique_key("missing");
    assert!(!store.expire(&key, Duration::from_secs(1)).await.unwrap());
}

fn unique_key(label: &str) -> String {
    use std::sync::atomic::{AtomicU64, Ordering};
    static COUNTER: AtomicU64 = AtomicU64::new(0);
    let n = COUNTER.fetch_add(1, Ordering::Relaxed);
    format!("conformance:{label}:{n}")
}
