//! C1: the Redis-like `KeyValueStore` collaborator every other component is built on.
//!
//! This is the only shared mutable substrate in the pipeline (§5): atomic get/set with TTL,
//! ordered lists with trim, hashes, sorted sets by score, and prefix scan. Two backends are
//! provided — an in-memory store for tests and single-process runs, and a `sled`-backed store
//! for durability across restarts.

mod memory;
mod sled_store;

use async_trait::async_trait;
use autopilot_common::{ComponentHealth, Config, Result};
use std::sync::Arc;
use std::time::Duration;

pub use memory::MemoryStore;
pub use sled_store::SledStore;

/// The collaborator contract every component depends on for persistence (§6).
#[async_trait]
pub trait KeyValueStore: Send + Sync {
    /// Read a raw value, or `None` if absent or expired.
    async fn get(&self, key: &str) -> Result<Option<Vec<u8>>>;

    /// Write a value, optionally with a TTL.
    async fn set(&self, key: &str, value: Vec<u8>, ttl: Option<Duration>) -> Result<()>;

    /// Write a value with a mandatory TTL.
    async fn set_ex(&self, key: &str, ttl: Duration, value: Vec<u8>) -> Result<()> {
        self.set(key, value, Some(ttl)).await
    }

    /// Remove a key outright.
    async fn delete(&self, key: &str) -> Result<()>;

    /// Set or refresh a key's TTL regardless of its value type (list, hash, sorted set, ...).
    async fn expire(&self, key: &str, ttl: Duration) -> Result<()>;

    /// Push a value onto the head of a list, creating it if absent.
    async fn lpush(&self, key: &str, value: Vec<u8>) -> Result<()>;

    /// Read a contiguous slice of a list. Negative indices count from the tail, Redis-style.
    async fn lrange(&self, key: &str, start: i64, stop: i64) -> Result<Vec<Vec<u8>>>;

    /// Trim a list to the given inclusive range.
    async fn ltrim(&self, key: &str, start: i64, stop: i64) -> Result<()>;

    /// Remove every occurrence of `value` from a list, returning the count removed.
    async fn lrem(&self, key: &str, value: &[u8]) -> Result<u32>;

    /// Length of a list (0 if absent).
    async fn llen(&self, key: &str) -> Result<u32>;

    /// Pop a value from the tail of a list.
    async fn rpop(&self, key: &str) -> Result<Option<Vec<u8>>>;

    /// Set a field within a hash.
    async fn hset(&self, key: &str, field: &str, value: Vec<u8>) -> Result<()>;

    /// Read a field from a hash.
    async fn hget(&self, key: &str, field: &str) -> Result<Option<Vec<u8>>>;

    /// Atomically increment an integer hash field, returning the new value.
    async fn hincr_by(&self, key: &str, field: &str, delta: i64) -> Result<i64>;

    /// Add or update a member's score in a sorted set.
    async fn zadd(&self, key: &str, member: &str, score: f64) -> Result<()>;

    /// Read members with score in `[min, max]`, ascending.
    async fn zrange_by_score(&self, key: &str, min: f64, max: f64) -> Result<Vec<(String, f64)>>;

    /// List every key (no pattern matching beyond an optional prefix).
    async fn keys(&self, prefix: &str) -> Result<Vec<String>>;

    /// Alias for `keys`; kept distinct in the trait per the collaborator contract's naming (§6).
    async fn scan(&self, prefix: &str) -> Result<Vec<String>> {
        self.keys(prefix).await
    }

    async fn health_check(&self) -> Result<ComponentHealth>;
}

/// Construct the configured `KeyValueStore` backend.
pub async fn create_store(config: Arc<Config>) -> Result<Arc<dyn KeyValueStore>> {
    match &config.store.backend {
        autopilot_common::config::StoreBackend::Memory => Ok(Arc::new(MemoryStore::new())),
        autopilot_common::config::StoreBackend::Sled { path } => {
            Ok(Arc::new(SledStore::new(path).await?))
        }
    }
}

#[cfg(test)]
mod contract_tests {
    use super::*;
    use std::time::Duration;

    async fn exercise(store: &dyn KeyValueStore) {
        assert_eq!(store.get("missing").await.unwrap(), None);

        store.set("k1", b"v1".to_vec(), None).await.unwrap();
        assert_eq!(store.get("k1").await.unwrap(), Some(b"v1".to_vec()));

        store.set_ex("k2", Duration::from_millis(20), b"v2".to_vec()).await.unwrap();
        assert_eq!(store.get("k2").await.unwrap(), Some(b"v2".to_vec()));
        tokio::time::sleep(Duration::from_millis(40)).await;
        assert_eq!(store.get("k2").await.unwrap(), None);

        store.lpush("list", b"a".to_vec()).await.unwrap();
        store.lpush("list", b"b".to_vec()).await.unwrap();
        store.lpush("list", b"c".to_vec()).await.unwrap();
        assert_eq!(store.llen("list").await.unwrap(), 3);
        let range = store.lrange("list", 0, -1).await.unwrap();
        assert_eq!(range, vec![b"c".to_vec(), b"b".to_vec(), b"a".to_vec()]);

        store.ltrim("list", 0, 1).await.unwrap();
        assert_eq!(store.llen("list").await.unwrap(), 2);

        let popped = store.rpop("list").await.unwrap();
        assert_eq!(popped, Some(b"b".to_vec()));

        let removed = store.lrem("list", b"c").await.unwrap();
        assert_eq!(removed, 1);
        assert_eq!(store.llen("list").await.unwrap(), 0);

        store.hset("h", "field", b"1".to_vec()).await.unwrap();
        assert_eq!(store.hget("h", "field").await.unwrap(), Some(b"1".to_vec()));
        let new_val = store.hincr_by("h", "counter", 5).await.unwrap();
        assert_eq!(new_val, 5);
        let new_val = store.hincr_by("h", "counter", 3).await.unwrap();
        assert_eq!(new_val, 8);

        store.zadd("z", "a", 1.0).await.unwrap();
        store.zadd("z", "b", 2.0).await.unwrap();
        store.zadd("z", "c", 3.0).await.unwrap();
        let range = store.zrange_by_score("z", 1.5, 3.0).await.unwrap();
        assert_eq!(range, vec![("b".to_string(), 2.0), ("c".to_string(), 3.0)]);

        store.set("prefix:1", b"x".to_vec(), None).await.unwrap();
        store.set("prefix:2", b"y".to_vec(), None).await.unwrap();
        let mut keys = store.keys("prefix:").await.unwrap();
        keys.sort();
        assert_eq!(keys, vec!["prefix:1".to_string(), "prefix:2".to_string()]);

        store.lpush("expiring_list", b"x".to_vec()).await.unwrap();
        store.expire("expiring_list", Duration::from_millis(20)).await.unwrap();
        tokio::time::sleep(Duration::from_millis(40)).await;
        assert_eq!(store.llen("expiring_list").await.unwrap(), 0);
    }

    #[tokio::test]
    async fn memory_store_satisfies_contract() {
        let store = MemoryStore::new();
        exercise(&store).await;
    }

    #[tokio::test]
    async fn sled_store_satisfies_contract() {
        let dir = tempfile::tempdir().unwrap();
        let store = SledStore::new(dir.path().join("store.db")).await.unwrap();
        exercise(&store).await;
    }
}
