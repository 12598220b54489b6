//! The minimal Redis-shaped surface the pipeline needs: strings with TTL,
//! lists (for the mission/result/work queues), hashes (for blueprints and
//! health records) and sets (for blacklists and poison tracking).
//!
//! One trait, [`KvStore`], covers all four; a backend only has to exist
//! once. [`memory::MemoryBackend`] is the in-process reference
//! implementation used by unit tests and the [`testing`] conformance suite
//! that any backend (including the Redis one in `goldrecord-kv-redis`) is
//! expected to pass.

mod error;
mod memory;
mod store;

pub mod testing;

pub use error::KvError;
pub use memory::MemoryBackend;
pub use store::KvStore;
