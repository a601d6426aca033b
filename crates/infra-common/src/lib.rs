//! # NPAC Infrastructure Common
//!
//! Shared infrastructure for the NPAC adapter workspace:
//!
//! - [`errors`]: the infrastructure error type and component/operation context
//! - [`logging`]: `tracing` subscriber setup and contextual spans
//! - [`tasks`]: a bounded, cancellable worker pool for tracked async work
//!
//! Everything protocol-specific lives in `npac-core`; this crate knows nothing
//! about sessions, regions or recovery.

pub mod errors;
pub mod logging;
pub mod tasks;

pub use errors::{Error, ErrorContext, ErrorExt, Result};
pub use logging::{log_welcome, setup_logging, LogContext, LoggingConfig};
pub use tasks::{PoolStats, WorkerPool};
