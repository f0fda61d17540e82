pub mod backfill;
pub mod classify;
pub mod config;
pub mod dataset;
pub mod ens;
pub mod error;
pub mod identity;
pub mod merge;
pub mod participant;
pub mod pipeline;
pub mod report;
pub mod rpc;
pub mod transcript;

pub use error::*;

use tracing_subscriber::EnvFilter;

/// Install the global log subscriber. `RUST_LOG` wins over `default_level`.
///
/// Safe to call more than once; later calls are ignored.
pub fn init_tracing(default_level: &str) {
    let filter =
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default_level));
    let _ = tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_target(false)
        .with_writer(std::io::stderr)
        .try_init();
}
