/// Connection settings for [`crate::RedisBackend`]. Kept intentionally small
/// — pool sizing beyond `deadpool-redis`'s defaults has not been needed in
/// production here; add fields as real tuning need arises rather than
/// speculatively.
#[derive(Debug, Clone)]
pub struct RedisConfig {
    pub url: String,
    pub pool_max_size: usize,
}

impl RedisConfig {
    pub fn new(url: impl Into<String>) -> Self {
        Self {
            url: url.into(),
            pool_max_size: 16,
        }
    }
}

impl Default for RedisConfig {
    fn default() -> Self {
        Self::new("redis://127.0.0.1:6379")
    }
}
