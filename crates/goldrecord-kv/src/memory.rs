use std::collections::{HashMap, HashSet, VecDeque};
use std::sync::Mutex;
use std::time::{Duration, Instant};

use async_trait::async_trait;
use tokio::sync::Notify;

use crate::error::KvError;
use crate::store::KvStore;

/// Real Redis shares one keyspace across strings/lists/hashes/sets, and
/// `EXPIRE` applies to whatever is at a key regardless of its type. The
/// in-memory backend mirrors that with a single expirations map consulted
/// before every read, rather than per-type TTLs, so `expire("mission:x")`
/// works the same whether `mission:x` is a hash or a string.
#[derive(Default)]
struct Inner {
    strings: HashMap<String, String>,
    lists: HashMap<String, VecDeque<String>>,
    hashes: HashMap<String, HashMap<String, String>>,
    sets: HashMap<String, HashSet<String>>,
    expirations: HashMap<String, Instant>,
}

impl Inner {
    fn is_expired(&self, key: &str) -> bool {
        self.expirations.get(key).is_some_and(|at| Instant::now() >= *at)
    }

    fn sweep(&mut self, key: &str) {
        if self.is_expired(key) {
            self.strings.remove(key);
            self.lists.remove(key);
            self.hashes.remove(key);
            self.sets.remove(key);
            self.expirations.remove(key);
        }
    }

    fn key_exists(&self, key: &str) -> bool {
        self.strings.contains_key(key)
            || self.lists.contains_key(key)
            || self.hashes.contains_key(key)
            || self.sets.contains_key(key)
    }
}

/// In-process reference implementation of [`KvStore`]. Used directly by unit
/// tests across the workspace and as the default backend when no Redis URL
/// is configured.
pub struct MemoryBackend {
    inner: Mutex<Inner>,
    list_notify: Notify,
}

impl Default for MemoryBackend {
    fn default() -> Self {
        Self::new()
    }
}

impl MemoryBackend {
    pub fn new() -> Self {
        Self {
            inner: Mutex::new(Inner::default()),
            list_notify: Notify::new(),
        }
    }

    fn lock(&self) -> std::sync::MutexGuard<'_, Inner> {
        self.inner.lock().expect("memory backend lock poisoned")
    }
}

#[async_trait]
impl KvStore for MemoryBackend {
    async fn get(&self, key: &str) -> Result<Option<String>, KvError> {
        let mut inner = self.lock();
        inner.sweep(key);
        Ok(inner.strings.get(key).cloned())
    }

    async fn set(&self, key: &str, value: &str, ttl: Option<Duration>) -> Result<(), KvError> {
        let mut inner = self.lock();
        inner.strings.insert(key.to_string(), value.to_string());
        match ttl {
            Some(d) => {
                inner.expirations.insert(key.to_string(), Instant::now() + d);
            }
            None => {
                inner.expirations.remove(key);
            }
        }
        Ok(())
    }

    async fn del(&self, key: &str) -> Result<bool, KvError> {
        let mut inner = self.lock();
        inner.sweep(key);
        let existed = inner.key_exists(key);
        inner.strings.remove(key);
        inner.lists.remove(key);
        inner.hashes.remove(key);
        inner.sets.remove(key);
        inner.expirations.remove(key);
        Ok(existed)
    }

    async fn expire(&self, key: &str, ttl: Duration) -> Result<bool, KvError> {
        let mut inner = self.lock();
        inner.sweep(key);
        if !inner.key_exists(key) {
            return Ok(false);
        }
        inner.expirations.insert(key.to_string(), Instant::now() + ttl);
        Ok(true)
    }

    async fn exists(&self, key: &str) -> Result<bool, KvError> {
        let mut inner = self.lock();
        inner.sweep(key);
        Ok(inner.key_exists(key))
    }

    async fn lpush(&self, key: &str, value: &str) -> Result<u64, KvError> {
        let len = {
            let mut inner = self.lock();
            inner.sweep(key);
            let list = inner.lists.entry(key.to_string()).or_default();
            list.push_front(value.to_string());
            list.len() as u64
        };
        self.list_notify.notify_waiters();
        Ok(len)
    }

    async fn brpop(&self, key: &str, timeout: Duration) -> Result<Option<String>, KvError> {
        let deadline = if timeout.is_zero() {
            None
        } else {
            Some(Instant::now() + timeout)
        };
        loop {
            if let Some(value) = {
                let mut inner = self.lock();
                inner.sweep(key);
                inner.lists.get_mut(key).and_then(VecDeque::pop_back)
            } {
                return Ok(Some(value));
            }
            let notified = self.list_notify.notified();
            match deadline {
                None => notified.await,
                Some(deadline) => {
                    let remaining = deadline.saturating_duration_since(Instant::now());
                    if remaining.is_zero() {
                        return Ok(None);
                    }
                    if tokio::time::timeout(remaining, notified).await.is_err() {
                        return Ok(None);
                    }
                }
            }
        }
    }

    async fn llen(&self, key: &str) -> Result<u64, KvError> {
        let mut inner = self.lock();
        inner.sweep(key);
        Ok(inner.lists.get(key).map_or(0, |l| l.len() as u64))
    }

    async fn lrange(&self, key: &str, start: i64, stop: i64) -> Result<Vec<String>, KvError> {
        let mut inner = self.lock();
        inner.sweep(key);
        let Some(list) = inner.lists.get(key) else {
            return Ok(Vec::new());
        };
        let len = list.len() as i64;
        let normalize = |idx: i64| -> i64 {
            if idx < 0 {
                (len + idx).max(0)
            } else {
                idx.min(len)
            }
        };
        let start = normalize(start);
        let stop = (normalize(stop) + 1).min(len);
        if start >= stop {
            return Ok(Vec::new());
        }
        Ok(list.iter().skip(start as usize).take((stop - start) as usize).cloned().collect())
    }

    async fn lrem(&self, key: &str, count: i64, value: &str) -> Result<u64, KvError> {
        let mut inner = self.lock();
        inner.sweep(key);
        let Some(list) = inner.lists.get_mut(key) else {
            return Ok(0);
        };
        let mut removed = 0u64;
        let limit = if count == 0 { usize::MAX } else { count.unsigned_abs() as usize };
        if count >= 0 {
            let mut i = 0;
            while i < list.len() && (removed as usize) < limit {
                if list[i] == value {
                    list.remove(i);
                    removed += 1;
                } else {
                    i += 1;
                }
            }
        } else {
            let mut i = list.len();
            while i > 0 && (removed as usize) < limit {
                i -= 1;
                if list[i] == value {
                    list.remove(i);
                    removed += 1;
                }
            }
        }
        Ok(removed)
    }

    async fn hset(&self, key: &str, field: &str, value: &str) -> Result<(), KvError> {
        let mut inner = self.lock();
        inner.sweep(key);
        inner
            .hashes
            .entry(key.to_string())
            .or_default()
            .insert(field.to_string(), value.to_string());
        Ok(())
    }

    async fn hget(&self, key: &str, field: &str) -> Result<Option<String>, KvError> {
        let mut inner = self.lock();
        inner.sweep(key);
        Ok(inner.hashes.get(key).and_then(|h| h.get(field).cloned()))
    }

    async fn hgetall(&self, key: &str) -> Result<Vec<(String, String)>, KvError> {
        let mut inner = self.lock();
        inner.sweep(key);
        Ok(inner
            .hashes
            .get(key)
            .map(|h| h.iter().map(|(k, v)| (k.clone(), v.clone())).collect())
            .unwrap_or_default())
    }

    async fn hdel(&self, key: &str, field: &str) -> Result<bool, KvError> {
        let mut inner = self.lock();
        inner.sweep(key);
        Ok(inner.hashes.get_mut(key).map(|h| h.remove(field).is_some()).unwrap_or(false))
    }

    async fn sadd(&self, key: &str, member: &str) -> Result<bool, KvError> {
        let mut inner = self.lock();
        inner.sweep(key);
        Ok(inner.sets.entry(key.to_string()).or_default().insert(member.to_string()))
    }

    async fn smembers(&self, key: &str) -> Result<Vec<String>, KvError> {
        let mut inner = self.lock();
        inner.sweep(key);
        Ok(inner.sets.get(key).map(|s| s.iter().cloned().collect()).unwrap_or_default())
    }

    async fn srem(&self, key: &str, member: &str) -> Result<bool, KvError> {
        let mut inner = self.lock();
        inner.sweep(key);
        Ok(inner.sets.get_mut(key).map(|s| s.remove(member)).unwrap_or(false))
    }

    async fn scard(&self, key: &str) -> Result<u64, KvError> {
        let mut inner = self.lock();
        inner.sweep(key);
        Ok(inner.sets.get(key).map_or(0, |s| s.len() as u64))
    }

    async fn publish(&self, _channel: &str, _message: &str) -> Result<(), KvError> {
        // No in-process subscriber model; publishing against the memory
        // backend is a deliberate no-op so tests exercising the call path
        // don't need a subscriber wired up.
        Ok(())
    }
}
