use std::time::Duration;

use async_trait::async_trait;
use deadpool_redis::{Config, Connection, Pool, Runtime};
use goldrecord_kv::{KvError, KvStore};
use redis::cmd;

use crate::config::RedisConfig;

/// Redis-backed [`KvStore`]. Every method builds its command explicitly via
/// `redis::cmd` rather than the `AsyncCommands` convenience trait, so the
/// mapping from this crate's operations to the underlying wire commands
/// stays legible at the call site.
pub struct RedisBackend {
    pool: Pool,
}

impl RedisBackend {
    pub fn new(config: &RedisConfig) -> Result<Self, KvError> {
        let mut cfg = Config::from_url(&config.url);
        cfg.pool = Some(deadpool_redis::PoolConfig::new(config.pool_max_size));
        let pool = cfg
            .create_pool(Some(Runtime::Tokio1))
            .map_err(|e| KvError::Unavailable(e.to_string()))?;
        Ok(Self { pool })
    }

    async fn conn(&self) -> Result<Connection, KvError> {
        self.pool.get().await.map_err(|e| KvError::Unavailable(e.to_string()))
    }
}

fn map_err(e: redis::RedisError) -> KvError {
    KvError::Unavailable(e.to_string())
}

#[async_trait]
impl KvStore for RedisBackend {
    async fn get(&self, key: &str) -> Result<Option<String>, KvError> {
        let mut conn = self.conn().await?;
        cmd("GET").arg(key).query_async(&mut conn).await.map_err(map_err)
    }

    async fn set(&self, key: &str, value: &str, ttl: Option<Duration>) -> Result<(), KvError> {
        let mut conn = self.conn().await?;
        let mut c = cmd("SET");
        c.arg(key).arg(value);
        if let Some(d) = ttl {
            c.arg("EX").arg(d.as_secs().max(1));
        }
        c.query_async(&mut conn).await.map_err(map_err)
    }

    async fn del(&self, key: &str) -> Result<bool, KvError> {
        let mut conn = self.conn().await?;
        let removed: i64 = cmd("DEL").arg(key).query_async(&mut conn).await.map_err(map_err)?;
        Ok(removed > 0)
    }

    async fn expire(&self, key: &str, ttl: Duration) -> Result<bool, KvError> {
        let mut conn = self.conn().await?;
        let ok: i64 = cmd("EXPIRE")
            .arg(key)
            .arg(ttl.as_secs().max(1))
            .query_async(&mut conn)
            .await
            .map_err(map_err)?;
        Ok(ok == 1)
    }

    async fn exists(&self, key: &str) -> Result<bool, KvError> {
        let mut conn = self.conn().await?;
        let n: i64 = cmd("EXISTS").arg(key).query_async(&mut conn).await.map_err(map_err)?;
        Ok(n > 0)
    }

    async fn lpush(&self, key: &str, value: &str) -> Result<u64, KvError> {
        let mut conn = self.conn().await?;
        cmd("LPUSH").arg(key).arg(value).query_async(&mut conn).await.map_err(map_err)
    }

    async fn brpop(&self, key: &str, timeout: Duration) -> Result<Option<String>, KvError> {
        let mut conn = self.conn().await?;
        let reply: Option<(String, String)> = cmd("BRPOP")
            .arg(key)
            .arg(timeout.as_secs_f64())
            .query_async(&mut conn)
            .await
            .map_err(map_err)?;
        Ok(reply.map(|(_, value)| value))
    }

    async fn llen(&self, key: &str) -> Result<u64, KvError> {
        let mut conn = self.conn().await?;
        cmd("LLEN").arg(key).query_async(&mut conn).await.map_err(map_err)
    }

    async fn lrange(&self, key: &str, start: i64, stop: i64) -> Result<Vec<String>, KvError> {
        let mut conn = self.conn().await?;
        cmd("LRANGE").arg(key).arg(start).arg(stop).query_async(&mut conn).await.map_err(map_err)
    }

    async fn lrem(&self, key: &str, count: i64, value: &str) -> Result<u64, KvError> {
        let mut conn = self.conn().await?;
        cmd("LREM").arg(key).arg(count).arg(value).query_async(&mut conn).await.map_err(map_err)
    }

    async fn hset(&self, key: &str, field: &str, value: &str) -> Result<(), KvError> {
        let mut conn = self.conn().await?;
        cmd("HSET").arg(key).arg(field).arg(value).query_async(&mut conn).await.map_err(map_err)
    }

    async fn hget(&self, key: &str, field: &str) -> Result<Option<String>, KvError> {
        let mut conn = self.conn().await?;
        cmd("HGET").arg(key).arg(field).query_async(&mut conn).await.map_err(map_err)
    }

    async fn hgetall(&self, key: &str) -> Result<Vec<(String, String)>, KvError> {
        let mut conn = self.conn().await?;
        let pairs: Vec<(String, String)> = cmd("HGETALL").arg(key).query_async(&mut conn).await.map_err(map_err)?;
        Ok(pairs)
    }

    async fn hdel(&self, key: &str, field: &str) -> Result<bool, KvError> {
        let mut conn = self.conn().await?;
        let n: i64 = cmd("HDEL").arg(key).arg(field).query_async(&mut conn).await.map_err(map_err)?;
        Ok(n > 0)
    }

    async fn sadd(&self, key: &str, member: &str) -> Result<bool, KvError> {
        let mut conn = self.conn().await?;
        let n: i64 = cmd("SADD").arg(key).arg(member).query_async(&mut conn).await.map_err(map_err)?;
        Ok(n > 0)
    }

    async fn smembers(&self, key: &str) -> Result<Vec<String>, KvError> {
        let mut conn = self.conn().await?;
        cmd("SMEMBERS").arg(key).query_async(&mut conn).await.map_err(map_err)
    }

    async fn srem(&self, key: &str, member: &str) -> Result<bool, KvError> {
        let mut conn = self.conn().await?;
        let n: i64 = cmd("SREM").arg(key).arg(member).query_async(&mut conn).await.map_err(map_err)?;
        Ok(n > 0)
    }

    async fn scard(&self, key: &str) -> Result<u64, KvError> {
        let mut conn = self.conn().await?;
        cmd("SCARD").arg(key).query_async(&mut conn).await.map_err(map_err)
    }

    async fn publish(&self, channel: &str, message: &str) -> Result<(), KvError> {
        let mut conn = self.conn().await?;
        let _: i64 = cmd("PUBLISH")
            .arg(channel)
            .arg(message)
            .query_async(&mut conn)
            .await
            .map_err(map_err)?;
        Ok(())
    }
}
