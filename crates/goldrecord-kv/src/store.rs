use std::time::Duration;

use async_trait::async_trait;

use crate::error::KvError;

/// A key-value, list, hash and set store, scoped to exactly the operations
/// the pipeline issues against Redis. Implementations must be safe to share
/// across concurrently running pipeline tasks (`Send + Sync`); no method
/// here implies cross-client locking — callers that need atomicity rely on
/// the underlying backend's native atomic commands (e.g. `SADD`+`SCARD`),
/// not on anything this trait adds.
#[async_trait]
pub trait KvStore: Send + Sync {
    // -- strings --
    async fn get(&self, key: &str) -> Result<Option<String>, KvError>;
    async fn set(&self, key: &str, value: &str, ttl: Option<Duration>) -> Result<(), KvError>;
    async fn del(&self, key: &str) -> Result<bool, KvError>;
    async fn expire(&self, key: &str, ttl: Duration) -> Result<bool, KvError>;
    async fn exists(&self, key: &str) -> Result<bool, KvError>;

    // -- lists --
    async fn lpush(&self, key: &str, value: &str) -> Result<u64, KvError>;
    /// Blocking-pop-with-timeout from the right of the list. `timeout ==
    /// Duration::ZERO` means block indefinitely, matching Redis's `BRPOP`
    /// convention.
    async fn brpop(&self, key: &str, timeout: Duration) -> Result<Option<String>, KvError>;
    async fn llen(&self, key: &str) -> Result<u64, KvError>;
    async fn lrange(&self, key: &str, start: i64, stop: i64) -> Result<Vec<String>, KvError>;
    async fn lrem(&self, key: &str, count: i64, value: &str) -> Result<u64, KvError>;

    // -- hashes --
    async fn hset(&self, key: &str, field: &str, value: &str) -> Result<(), KvError>;
    async fn hget(&self, key: &str, field: &str) -> Result<Option<String>, KvError>;
    async fn hgetall(&self, key: &str) -> Result<Vec<(String, String)>, KvError>;
    async fn hdel(&self, key: &str, field: &str) -> Result<bool, KvError>;

    // -- sets --
    async fn sadd(&self, key: &str, member: &str) -> Result<bool, KvError>;
    async fn smembers(&self, key: &str) -> Result<Vec<String>, KvError>;
    async fn srem(&self, key: &str, member: &str) -> Result<bool, KvError>;
    async fn scard(&self, key: &str) -> Result<u64, KvError>;

    // -- pub/sub --
    /// Best-effort fire-and-forget publish; no subscriber is required to be
    /// listening. Used for the "mapping required" notification only.
    async fn publish(&self, channel: &str, message: &str) -> Result<(), KvError>;
}
