//! Tracked task execution

pub mod worker_pool;

pub use worker_pool::{PoolStats, WorkerPool};
