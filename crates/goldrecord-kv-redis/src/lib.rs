//! Redis-backed [`goldrecord_kv::KvStore`], pooled via `deadpool-redis`.
//! Integration tests (gated behind `--features integration`) run the shared
//! conformance suite from `goldrecord_kv::testing` against a real Redis
//! instance; see `tests/conformance.rs`.

mod config;
mod store;

pub use config::RedisConfig;
pub use store::RedisBackend;
