//! Queue worker loop, run registry, live streaming, and the config/logging
//! glue that turns the `goldrecord-*` library crates into a standalone
//! process: pop leads off `leads_to_enrich`, run them through a station
//! route, mirror progress into `enrich:run:{run_id}`, retry failures with
//! backoff, dead-letter the rest.

pub mod config;
pub mod error;
pub mod failure_mode;
pub mod logging;
pub mod registry;
pub mod route;
pub mod worker;

pub use config::{WorkerConfig, WorkerTomlConfig};
pub use error::WorkerError;
pub use registry::{attach, RunHandle, RunRegistry};
pub use route::build_route;
pub use worker::QueueWorker;
