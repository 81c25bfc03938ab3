//! Shared foundation for the EtherCAT cyclic exchange workspace.
//!
//! This crate holds the leaf utilities every other crate builds on:
//!
//! - [`telem`] - Typed sample values, series, and frames crossing the
//!   engine boundary
//! - [`error`] - The workspace-wide error enum and result alias
//! - [`breaker`] - Cooperative cancellation with exponential retry backoff
//! - [`timer`] - Precise sleep-then-spin cycle timer
//! - [`rt`] - Real-time thread configuration (scheduling, affinity,
//!   memory locking), capability-queried per platform
//! - [`exec`] - Execution-mode selection for auxiliary periodic loops

#![deny(missing_docs)]
#![warn(clippy::all)]

pub mod breaker;
pub mod error;
pub mod exec;
pub mod rt;
pub mod telem;
pub mod timer;

pub use breaker::Breaker;
pub use error::{Error, Result};
pub use telem::{DataType, Frame, Rate, SampleValue, Series};
pub use timer::Timer;

/// Initialize tracing for RT-safe logging.
pub fn init_tracing() {
    use tracing_subscriber::{EnvFilter, fmt};

    let subscriber = fmt::Subscriber::builder()
        .with_env_filter(EnvFilter::from_default_env())
        .with_target(false)
        .with_thread_ids(true)
        .finish();

    let _ = tracing::subscriber::set_global_default(subscriber);
}
